// Copyright 2025 System76 <info@system76.com>
// SPDX-License-Identifier: GPL-3.0-only

use crate::controller::{HandlerIds, ScreenProvider, SignalHandlerId};
use rustc_hash::FxHashMap;
use std::{fmt::Debug, hash::Hash, mem};

#[derive(Debug, Default)]
struct Screen {
    showing_desktop: bool,
    handlers: Vec<SignalHandlerId>,
}

/// Local view of the outputs known to the compositor.
///
/// Toggle requests are applied here right away and queued for the wayland
/// thread. The compositor stays authoritative: its updates overwrite the
/// local state and wake the subscribers when they change it.
#[derive(Debug)]
pub struct Screens<K> {
    screens: FxHashMap<K, Screen>,
    ids: HandlerIds,
    requests: Vec<(K, bool)>,
}

impl<K> Default for Screens<K> {
    fn default() -> Self {
        Self {
            screens: FxHashMap::default(),
            ids: HandlerIds::default(),
            requests: Vec::new(),
        }
    }
}

impl<K: Clone + Eq + Hash + Debug> Screens<K> {
    /// Returns `false` if the screen was already known.
    pub fn insert(&mut self, key: K) -> bool {
        if self.screens.contains_key(&key) {
            return false;
        }
        self.screens.insert(key, Screen::default());
        true
    }

    pub fn remove(&mut self, key: &K) {
        if let Some(screen) = self.screens.remove(key) {
            if !screen.handlers.is_empty() {
                tracing::debug!(?key, "removed screen still had subscribers");
            }
        }
        self.requests.retain(|(k, _)| k != key);
    }

    /// Applies a state reported by the compositor and returns the handlers
    /// to notify.
    pub fn set_showing_desktop(&mut self, key: &K, showing: bool) -> Vec<SignalHandlerId> {
        let Some(screen) = self.screens.get_mut(key) else {
            tracing::debug!(?key, "showing-desktop update for unknown screen");
            return Vec::new();
        };
        if mem::replace(&mut screen.showing_desktop, showing) == showing {
            return Vec::new();
        }
        screen.handlers.clone()
    }

    /// Drains the toggles waiting to be sent to the compositor.
    pub fn take_requests(&mut self) -> Vec<(K, bool)> {
        mem::take(&mut self.requests)
    }

    pub fn subscriber_count(&self) -> usize {
        self.screens.values().map(|s| s.handlers.len()).sum()
    }
}

impl<K: Clone + Eq + Hash + Debug> ScreenProvider for Screens<K> {
    type Context = K;

    fn is_valid(&self, context: &K) -> bool {
        self.screens.contains_key(context)
    }

    fn showing_desktop(&self, context: &K) -> bool {
        self.screens
            .get(context)
            .is_some_and(|s| s.showing_desktop)
    }

    fn toggle_showing_desktop(&mut self, context: &K, show: bool) {
        let Some(screen) = self.screens.get_mut(context) else {
            tracing::warn!(?context, "cannot toggle the desktop of an unknown screen");
            return;
        };
        screen.showing_desktop = show;
        self.requests.push((context.clone(), show));
    }

    fn connect_showing_desktop_changed(&mut self, context: &K) -> SignalHandlerId {
        let id = self.ids.next();
        if let Some(screen) = self.screens.get_mut(context) {
            screen.handlers.push(id);
        }
        id
    }

    fn disconnect_showing_desktop_changed(&mut self, context: &K, id: SignalHandlerId) {
        if let Some(screen) = self.screens.get_mut(context) {
            screen.handlers.retain(|h| *h != id);
        }
    }
}
