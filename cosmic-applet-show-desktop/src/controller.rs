// Copyright 2025 System76 <info@system76.com>
// SPDX-License-Identifier: GPL-3.0-only

//! Keeps the panel toggle and a screen's "showing desktop" mode in agreement.
//!
//! Two event sources feed [`ShowDesktop`]: presses on the toggle button and
//! change notifications from the tracked screen. Whichever fires last wins and
//! the other side is updated to match. Redundant updates are no-ops, so the
//! toggled notification emitted while mirroring the screen never loops back
//! into a second request.

use crate::fl;
use std::fmt::Debug;

/// Widget name the toggle registers with the host.
pub const BUTTON_NAME: &str = "showdesktop-button";

/// Unwraps a handler precondition or returns early. Debug builds panic,
/// release builds log the violation.
macro_rules! return_if_fail {
    ($value:expr, $msg:literal) => {
        match $value {
            Some(value) => value,
            None => {
                tracing::error!($msg);
                debug_assert!(false, $msg);
                return;
            }
        }
    };
}

/// Handle for a connected notification, used to disconnect it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalHandlerId(u64);

#[derive(Debug, Default)]
pub struct HandlerIds {
    last: u64,
}

impl HandlerIds {
    pub fn next(&mut self) -> SignalHandlerId {
        self.last += 1;
        SignalHandlerId(self.last)
    }
}

/// The panel surface hosting the applet.
pub trait PanelHost {
    /// Subscribe to screen changes of the hosting surface.
    fn connect_context_changed(&mut self) -> SignalHandlerId;

    fn disconnect_context_changed(&mut self, id: SignalHandlerId);

    /// Let the widget take part in keyboard and menu activation.
    fn add_action_widget(&mut self, name: &'static str);

    fn set_size_request(&mut self, width: u32, height: u32);
}

/// Source of screens and their showing-desktop state.
pub trait ScreenProvider {
    type Context: Clone + PartialEq + Debug;

    fn is_valid(&self, context: &Self::Context) -> bool;

    fn showing_desktop(&self, context: &Self::Context) -> bool;

    fn toggle_showing_desktop(&mut self, context: &Self::Context, show: bool);

    fn connect_showing_desktop_changed(&mut self, context: &Self::Context) -> SignalHandlerId;

    fn disconnect_showing_desktop_changed(&mut self, context: &Self::Context, id: SignalHandlerId);
}

/// Lifecycle hooks the host drives.
pub trait PanelPlugin {
    fn initialize(&mut self);

    fn teardown(&mut self);

    /// Returns `true` once the new size has been handled.
    fn on_resize(&mut self, size: u32) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessibleInfo {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Default)]
pub struct ToggleButton {
    active: bool,
    tooltip: Option<String>,
    accessible: Option<AccessibleInfo>,
}

impl ToggleButton {
    pub fn active(&self) -> bool {
        self.active
    }

    pub fn tooltip(&self) -> Option<&str> {
        self.tooltip.as_deref()
    }

    pub fn accessible(&self) -> Option<&AccessibleInfo> {
        self.accessible.as_ref()
    }

    /// Returns `true` when the state changed, which is when the button
    /// emits its toggled notification.
    fn set_active(&mut self, active: bool) -> bool {
        if self.active == active {
            return false;
        }
        self.active = active;
        true
    }
}

/// What pressing the button will do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    ShowDesktop,
    RestoreWindows,
}

impl Action {
    pub fn for_state(active: bool) -> Self {
        if active {
            Self::RestoreWindows
        } else {
            Self::ShowDesktop
        }
    }

    pub fn description(self) -> String {
        match self {
            Self::ShowDesktop => fl!("show-desktop-description"),
            Self::RestoreWindows => fl!("restore-windows"),
        }
    }
}

#[derive(Debug)]
struct Tracked<C> {
    context: C,
    handler: SignalHandlerId,
}

#[derive(Debug)]
pub struct ShowDesktop<H: PanelHost, P: ScreenProvider> {
    host: H,
    provider: P,
    button: ToggleButton,
    context_handler: Option<SignalHandlerId>,
    screen: Option<Tracked<P::Context>>,
}

impl<H: PanelHost, P: ScreenProvider> ShowDesktop<H, P> {
    pub fn new(host: H, provider: P) -> Self {
        Self {
            host,
            provider,
            button: ToggleButton::default(),
            context_handler: None,
            screen: None,
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn provider_mut(&mut self) -> &mut P {
        &mut self.provider
    }

    pub fn button(&self) -> &ToggleButton {
        &self.button
    }

    pub fn context(&self) -> Option<&P::Context> {
        self.screen.as_ref().map(|s| &s.context)
    }

    pub fn is_tracking(&self) -> bool {
        self.screen.is_some()
    }

    /// The hosting surface moved to `context`.
    pub fn on_context_changed(&mut self, context: Option<P::Context>) {
        let Some(context) = context.filter(|c| self.provider.is_valid(c)) else {
            tracing::debug!("ignoring change to an invalid screen");
            return;
        };

        if self.context() == Some(&context) {
            return;
        }

        if let Some(previous) = self.screen.take() {
            self.provider
                .disconnect_showing_desktop_changed(&previous.context, previous.handler);
        }

        let handler = self.provider.connect_showing_desktop_changed(&context);
        self.screen = Some(Tracked {
            context: context.clone(),
            handler,
        });

        // follow the new screen, or only refresh the text if they already agree
        if self.button.active() != self.provider.showing_desktop(&context) {
            self.on_showing_desktop_changed(&context);
        } else {
            self.toggled();
        }
    }

    /// The button now reports `active`.
    pub fn on_toggle_clicked(&mut self, active: bool) {
        self.button.active = active;
        self.toggled();
    }

    /// A press on the button flips it.
    pub fn click(&mut self) {
        self.on_toggle_clicked(!self.button.active());
    }

    /// `context` reported a new showing-desktop state.
    pub fn on_showing_desktop_changed(&mut self, context: &P::Context) {
        if self.context() != Some(context) {
            tracing::debug!(?context, "ignoring showing-desktop change of untracked screen");
            return;
        }

        let showing = self.provider.showing_desktop(context);
        if self.button.set_active(showing) {
            self.toggled();
        }
    }

    /// Stops tracking the current screen. The button goes back to its
    /// initial state until the next context change.
    pub fn release_screen(&mut self) {
        if let Some(screen) = self.screen.take() {
            self.provider
                .disconnect_showing_desktop_changed(&screen.context, screen.handler);
        }
        self.button = ToggleButton::default();
    }

    /// `context` no longer exists.
    pub fn on_screen_removed(&mut self, context: &P::Context) {
        if self.context() == Some(context) {
            tracing::debug!(?context, "tracked screen removed");
            self.release_screen();
        }
    }

    fn toggled(&mut self) {
        let screen = return_if_fail!(
            self.screen.as_ref(),
            "button toggled without a tracked screen"
        );

        let active = self.button.active();
        if active != self.provider.showing_desktop(&screen.context) {
            self.provider.toggle_showing_desktop(&screen.context, active);
        }

        let text = Action::for_state(active).description();
        self.button.accessible = Some(AccessibleInfo {
            name: fl!("show-desktop"),
            description: text.clone(),
        });
        self.button.tooltip = Some(text);
    }
}

impl<H: PanelHost, P: ScreenProvider> PanelPlugin for ShowDesktop<H, P> {
    fn initialize(&mut self) {
        if self.context_handler.is_none() {
            self.context_handler = Some(self.host.connect_context_changed());
        }
        self.host.add_action_widget(BUTTON_NAME);
    }

    fn teardown(&mut self) {
        if let Some(id) = self.context_handler.take() {
            self.host.disconnect_context_changed(id);
        }
        self.release_screen();
    }

    fn on_resize(&mut self, size: u32) -> bool {
        // keep the button squared
        self.host.set_size_request(size, size);
        true
    }
}
