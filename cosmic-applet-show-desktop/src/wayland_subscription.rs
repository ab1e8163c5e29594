// Copyright 2025 System76 <info@system76.com>
// SPDX-License-Identifier: GPL-3.0-only

use crate::wayland::{self, WaylandEvent, WaylandRequest};
use cctk::sctk::reexports::calloop::channel::SyncSender;
use cosmic::iced::{
    self, Subscription,
    futures::{self, SinkExt, StreamExt, channel::mpsc},
    stream,
};
use std::sync::LazyLock;
use tokio::sync::Mutex;

pub static WAYLAND_RX: LazyLock<Mutex<Option<mpsc::Receiver<WaylandEvent>>>> =
    LazyLock::new(|| Mutex::new(None));

#[derive(Debug, Clone)]
pub enum WaylandUpdate {
    Event(WaylandEvent),
    Started(SyncSender<WaylandRequest>),
    Errored,
}

pub fn wayland_subscription() -> iced::Subscription<WaylandUpdate> {
    Subscription::run_with_id(
        std::any::TypeId::of::<WaylandUpdate>(),
        stream::channel(50, move |mut output| async move {
            let mut state = State::Waiting;

            loop {
                state = start_listening(state, &mut output).await;
            }
        }),
    )
}

async fn start_listening(
    state: State,
    output: &mut futures::channel::mpsc::Sender<WaylandUpdate>,
) -> State {
    match state {
        State::Waiting => {
            let mut guard = WAYLAND_RX.lock().await;
            if guard.is_none() {
                match ShowDesktopWatcher::new() {
                    Ok(ShowDesktopWatcher { rx, tx }) => {
                        *guard = Some(rx);
                        _ = output.send(WaylandUpdate::Started(tx)).await;
                    }
                    Err(err) => {
                        tracing::error!(?err, "Failed to start show desktop watcher");
                        _ = output.send(WaylandUpdate::Errored).await;
                        return State::Error;
                    }
                }
            }
            let Some(rx) = guard.as_mut() else {
                return State::Error;
            };
            if let Some(event) = rx.next().await {
                _ = output.send(WaylandUpdate::Event(event)).await;
                State::Waiting
            } else {
                _ = output.send(WaylandUpdate::Errored).await;
                State::Error
            }
        }
        State::Error => cosmic::iced::futures::future::pending().await,
    }
}

pub enum State {
    Waiting,
    Error,
}

pub struct ShowDesktopWatcher {
    rx: mpsc::Receiver<WaylandEvent>,
    tx: SyncSender<WaylandRequest>,
}

impl ShowDesktopWatcher {
    pub fn new() -> anyhow::Result<Self> {
        let (tx, rx) = mpsc::channel(20);
        let tx = wayland::spawn_show_desktop(tx)?;
        Ok(Self { rx, tx })
    }
}
