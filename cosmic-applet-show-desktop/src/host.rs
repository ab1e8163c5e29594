// Copyright 2025 System76 <info@system76.com>
// SPDX-License-Identifier: GPL-3.0-only

use crate::controller::{HandlerIds, PanelHost, SignalHandlerId};

/// The applet's side of the panel: screen change subscribers, activatable
/// widgets and the size the button asked for.
#[derive(Debug, Default)]
pub struct PanelSurface {
    ids: HandlerIds,
    context_handlers: Vec<SignalHandlerId>,
    action_widgets: Vec<&'static str>,
    size_request: Option<(u32, u32)>,
}

impl PanelSurface {
    /// Whether anyone listens for screen changes.
    pub fn tracks_context(&self) -> bool {
        !self.context_handlers.is_empty()
    }

    pub fn is_action_widget(&self, name: &str) -> bool {
        self.action_widgets.iter().any(|w| *w == name)
    }

    pub fn size_request(&self) -> Option<(u32, u32)> {
        self.size_request
    }

    /// Whether the last size request matches a button of `size`.
    pub fn is_sized_for(&self, size: u32) -> bool {
        self.size_request() == Some((size, size))
    }
}

impl PanelHost for PanelSurface {
    fn connect_context_changed(&mut self) -> SignalHandlerId {
        let id = self.ids.next();
        self.context_handlers.push(id);
        id
    }

    fn disconnect_context_changed(&mut self, id: SignalHandlerId) {
        self.context_handlers.retain(|h| *h != id);
    }

    fn add_action_widget(&mut self, name: &'static str) {
        if !self.is_action_widget(name) {
            self.action_widgets.push(name);
        }
    }

    fn set_size_request(&mut self, width: u32, height: u32) {
        self.size_request = Some((width, height));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        controller::{BUTTON_NAME, PanelPlugin, ShowDesktop},
        screen::Screens,
    };

    #[test]
    fn context_subscription_follows_connect_and_disconnect() {
        let mut surface = PanelSurface::default();
        assert!(!surface.tracks_context());

        let id = surface.connect_context_changed();
        assert!(surface.tracks_context());

        surface.disconnect_context_changed(id);
        assert!(!surface.tracks_context());
    }

    #[test]
    fn action_widgets_register_once() {
        let mut surface = PanelSurface::default();
        surface.add_action_widget(BUTTON_NAME);
        surface.add_action_widget(BUTTON_NAME);

        assert!(surface.is_action_widget(BUTTON_NAME));
        assert!(!surface.is_action_widget("other"));
        assert_eq!(surface.action_widgets.len(), 1);
    }

    #[test]
    fn size_request_follows_panel_resizes() {
        let mut controller = ShowDesktop::new(PanelSurface::default(), Screens::<&str>::default());
        assert!(!controller.host().is_sized_for(32));

        controller.on_resize(32);
        assert!(controller.host().is_sized_for(32));
        assert!(!controller.host().is_sized_for(40));

        controller.on_resize(40);
        assert_eq!(controller.host().size_request(), Some((40, 40)));
    }

    #[test]
    fn removed_output_leaves_button_inert() {
        let mut controller = ShowDesktop::new(PanelSurface::default(), Screens::default());
        controller.initialize();
        controller.provider_mut().insert("DP-1");
        controller.on_context_changed(Some("DP-1"));
        controller.click();
        controller.provider_mut().take_requests();

        controller.on_screen_removed(&"DP-1");
        controller.provider_mut().remove(&"DP-1");

        assert!(!controller.is_tracking());
        assert!(!controller.button().active());
        assert_eq!(controller.provider().subscriber_count(), 0);
        assert!(controller.provider_mut().take_requests().is_empty());

        // the output comes back under a new id
        controller.provider_mut().insert("DP-1'");
        controller.on_context_changed(Some("DP-1'"));
        controller.click();
        assert_eq!(controller.provider_mut().take_requests(), [("DP-1'", true)]);
        assert!(controller.button().active());
    }

    #[test]
    fn applet_lifecycle_leaves_nothing_connected() {
        let mut controller = ShowDesktop::new(PanelSurface::default(), Screens::default());
        controller.initialize();
        assert!(controller.on_resize(32));
        assert_eq!(controller.host().size_request(), Some((32, 32)));

        controller.provider_mut().insert("DP-1");
        controller.on_context_changed(Some("DP-1"));
        controller.click();
        assert_eq!(controller.provider_mut().take_requests(), [("DP-1", true)]);

        let notify = controller.provider_mut().set_showing_desktop(&"DP-1", false);
        assert_eq!(notify.len(), 1);
        controller.on_showing_desktop_changed(&"DP-1");
        assert!(!controller.button().active());
        assert!(controller.provider_mut().take_requests().is_empty());

        controller.teardown();
        assert!(!controller.host().tracks_context());
        assert_eq!(controller.provider().subscriber_count(), 0);
    }
}
