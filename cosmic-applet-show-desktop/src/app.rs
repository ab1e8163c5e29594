// Copyright 2025 System76 <info@system76.com>
// SPDX-License-Identifier: GPL-3.0-only

use crate::{
    config::{APP_ID, ShowDesktopConfig},
    controller::{BUTTON_NAME, PanelPlugin, ShowDesktop},
    host::PanelSurface,
    screen::Screens,
    wayland::{WaylandEvent, WaylandRequest},
    wayland_subscription::{WaylandUpdate, wayland_subscription},
};
use cctk::sctk::reexports::{calloop::channel::SyncSender, client::backend::ObjectId};
use cosmic::{
    Element, Task, app,
    iced::{Length, Subscription},
    surface,
    widget::container,
};

pub fn run() -> cosmic::iced::Result {
    cosmic::applet::run::<ShowDesktopApplet>(())
}

struct ShowDesktopApplet {
    core: cosmic::app::Core,
    config: ShowDesktopConfig,
    controller: ShowDesktop<PanelSurface, Screens<ObjectId>>,
    wayland_tx: Option<SyncSender<WaylandRequest>>,
}

#[derive(Debug, Clone)]
enum Message {
    Toggle,
    Wayland(WaylandUpdate),
    ConfigChanged(ShowDesktopConfig),
    Surface(surface::Action),
}

impl ShowDesktopApplet {
    fn handle_wayland_event(&mut self, event: WaylandEvent) {
        match event {
            WaylandEvent::OutputAdded { output, name } => {
                self.controller.provider_mut().insert(output.clone());
                if name == self.core.applet.output_name && self.controller.host().tracks_context()
                {
                    self.controller.on_context_changed(Some(output));
                }
            }
            WaylandEvent::OutputRemoved(output) => {
                self.controller.on_screen_removed(&output);
                self.controller.provider_mut().remove(&output);
            }
            WaylandEvent::ShowingDesktop { output, showing } => {
                let handlers = self
                    .controller
                    .provider_mut()
                    .set_showing_desktop(&output, showing);
                for _ in handlers {
                    self.controller.on_showing_desktop_changed(&output);
                }
            }
        }
    }

    fn button_size(&self) -> u32 {
        let (width, _) = self.core.applet.suggested_size(true);
        let (padding, _) = self.core.applet.suggested_padding(true);
        u32::from(width) + 2 * u32::from(padding)
    }

    fn sync_size(&mut self) {
        let size = self.button_size();
        if !self.controller.host().is_sized_for(size) {
            self.controller.on_resize(size);
        }
    }

    /// Forwards queued toggles to the wayland thread.
    fn flush_requests(&mut self) {
        let requests = self.controller.provider_mut().take_requests();
        if requests.is_empty() {
            return;
        }
        let Some(tx) = self.wayland_tx.as_ref() else {
            tracing::warn!("Wayland thread not running, dropping show desktop requests");
            return;
        };
        for (output, show) in requests {
            if let Err(err) = tx.try_send(WaylandRequest::ShowDesktop {
                output,
                show,
                restore_focus: self.config.restore_focus,
            }) {
                tracing::error!(?err, "Failed to send show desktop request");
            }
        }
    }
}

impl cosmic::Application for ShowDesktopApplet {
    type Message = Message;
    type Executor = cosmic::SingleThreadExecutor;
    type Flags = ();
    const APP_ID: &'static str = APP_ID;

    fn init(core: cosmic::app::Core, _flags: Self::Flags) -> (Self, app::Task<Self::Message>) {
        let mut controller = ShowDesktop::new(PanelSurface::default(), Screens::default());
        controller.initialize();

        let mut applet = Self {
            core,
            config: ShowDesktopConfig::load(),
            controller,
            wayland_tx: None,
        };
        applet.sync_size();

        (applet, Task::none())
    }

    fn core(&self) -> &cosmic::app::Core {
        &self.core
    }

    fn core_mut(&mut self) -> &mut cosmic::app::Core {
        &mut self.core
    }

    fn update(&mut self, message: Self::Message) -> app::Task<Self::Message> {
        match message {
            Message::Toggle => self.controller.click(),
            Message::Wayland(update) => match update {
                WaylandUpdate::Started(tx) => {
                    self.wayland_tx = Some(tx);
                }
                WaylandUpdate::Event(event) => self.handle_wayland_event(event),
                WaylandUpdate::Errored => {
                    tracing::error!("Show desktop wayland subscription failed");
                    self.wayland_tx = None;
                    self.controller.release_screen();
                }
            },
            Message::ConfigChanged(config) => {
                self.config = config;
            }
            Message::Surface(a) => {
                return cosmic::task::message(cosmic::Action::Cosmic(
                    cosmic::app::Action::Surface(a),
                ));
            }
        }
        self.flush_requests();
        self.sync_size();
        Task::none()
    }

    fn view(&self) -> Element<'_, Message> {
        let toggle = self.controller.button();
        let mut button = self
            .core
            .applet
            .icon_button(&self.config.icon_name)
            .selected(toggle.active());
        // inert until it can act on a screen
        if self.wayland_tx.is_some()
            && self.controller.is_tracking()
            && self.controller.host().is_action_widget(BUTTON_NAME)
        {
            button = button.on_press_down(Message::Toggle);
        }

        // panel size changes can land between updates
        let size = Length::Fixed(self.button_size() as f32);
        let content: Element<'_, Message> = container(button).center_x(size).center_y(size).into();

        match toggle.tooltip() {
            Some(text) => self
                .core
                .applet
                .applet_tooltip::<Message>(content, text.to_owned(), false, Message::Surface, None)
                .into(),
            None => content,
        }
    }

    fn subscription(&self) -> Subscription<Message> {
        Subscription::batch([
            wayland_subscription().map(Message::Wayland),
            self.core.watch_config(APP_ID).map(|u| {
                for why in u.errors {
                    tracing::error!(why = why.to_string(), "Error watching config");
                }
                Message::ConfigChanged(u.config)
            }),
        ])
    }

    fn style(&self) -> Option<cosmic::iced_runtime::Appearance> {
        Some(cosmic::applet::style())
    }
}

impl Drop for ShowDesktopApplet {
    fn drop(&mut self) {
        self.controller.teardown();
        debug_assert_eq!(self.controller.provider().subscriber_count(), 0);
    }
}
