// Copyright 2025 System76 <info@system76.com>
// SPDX-License-Identifier: GPL-3.0-only

use calloop::channel::*;
use cctk::{
    sctk::{
        self,
        output::{OutputHandler, OutputState},
        reexports::{calloop, calloop_wayland_source::WaylandSource, client::backend::ObjectId},
        registry::{ProvidesRegistryState, RegistryState},
        seat::{SeatHandler, SeatState},
    },
    toplevel_info::{ToplevelInfoHandler, ToplevelInfoState},
    toplevel_management::{ToplevelManagerHandler, ToplevelManagerState},
    wayland_client::{
        Connection, Proxy, QueueHandle, WEnum,
        globals::registry_queue_init,
        protocol::{wl_output::WlOutput, wl_seat::WlSeat},
    },
    wayland_protocols::ext::{
        foreign_toplevel_list::v1::client::ext_foreign_toplevel_handle_v1::ExtForeignToplevelHandleV1,
        workspace::v1::client::ext_workspace_handle_v1::{
            ExtWorkspaceHandleV1, State as WorkspaceUpdateState,
        },
    },
    workspace::{WorkspaceHandler, WorkspaceState},
};
use cosmic::iced::futures::{SinkExt, channel::mpsc, executor::block_on};
use cosmic_protocols::{
    toplevel_info::v1::client::zcosmic_toplevel_handle_v1::{
        State as ToplevelState, ZcosmicToplevelHandleV1,
    },
    toplevel_management::v1::client::zcosmic_toplevel_manager_v1,
};
use rustc_hash::{FxHashMap, FxHashSet};
use std::{
    hash::Hash,
    os::{
        fd::{FromRawFd, RawFd},
        unix::net::UnixStream,
    },
};

#[derive(Debug, Clone)]
pub enum WaylandEvent {
    OutputAdded { output: ObjectId, name: String },
    OutputRemoved(ObjectId),
    ShowingDesktop { output: ObjectId, showing: bool },
}

#[derive(Debug, Clone)]
pub enum WaylandRequest {
    ShowDesktop {
        output: ObjectId,
        show: bool,
        restore_focus: bool,
    },
}

/// Windows the applet minimized on one output.
#[derive(Debug)]
struct HiddenWindows<T = ExtForeignToplevelHandleV1> {
    minimized: Vec<T>,
    // minimize requests the compositor has not confirmed yet
    pending: FxHashSet<T>,
    focused: Option<T>,
}

impl<T> Default for HiddenWindows<T> {
    fn default() -> Self {
        Self {
            minimized: Vec::new(),
            pending: FxHashSet::default(),
            focused: None,
        }
    }
}

impl<T: Clone + Eq + Hash> HiddenWindows<T> {
    /// Records a window whose minimize request was just sent.
    fn hide(&mut self, toplevel: T, focused: bool) {
        if focused {
            self.focused = Some(toplevel.clone());
        }
        self.pending.insert(toplevel.clone());
        self.minimized.push(toplevel);
    }

    /// Applies a state update of `toplevel`. Returns `true` when it became
    /// visible on this output, which ends show-desktop mode.
    fn update(&mut self, toplevel: &T, minimized: bool, shown_here: bool) -> bool {
        if minimized {
            self.pending.remove(toplevel);
            return false;
        }
        shown_here && !self.pending.contains(toplevel)
    }

    fn forget(&mut self, toplevel: &T) {
        self.minimized.retain(|t| t != toplevel);
        self.pending.remove(toplevel);
        if self.focused.as_ref() == Some(toplevel) {
            self.focused = None;
        }
    }
}

/// Whether a window on `workspaces` is on one of the `active` ones. With no
/// workspace information every window counts as shown.
fn on_active_workspace<'a, W: PartialEq + 'a>(
    workspaces: impl IntoIterator<Item = &'a W>,
    active: &[W],
) -> bool {
    active.is_empty() || workspaces.into_iter().any(|w| active.contains(w))
}

pub fn spawn_show_desktop(
    tx: mpsc::Sender<WaylandEvent>,
) -> anyhow::Result<SyncSender<WaylandRequest>> {
    let (requests_tx, requests_rx) = calloop::channel::sync_channel(100);

    let socket = std::env::var("X_PRIVILEGED_WAYLAND_SOCKET")
        .ok()
        .and_then(|fd| {
            fd.parse::<RawFd>()
                .ok()
                .map(|fd| unsafe { UnixStream::from_raw_fd(fd) })
        });

    let conn = if let Some(socket) = socket {
        Connection::from_socket(socket)?
    } else {
        Connection::connect_to_env()?
    };

    std::thread::spawn(move || {
        if let Err(err) = run_event_loop(conn, tx, requests_rx) {
            tracing::error!(?err, "Show desktop wayland thread stopped");
        }
    });

    Ok(requests_tx)
}

fn run_event_loop(
    conn: Connection,
    tx: mpsc::Sender<WaylandEvent>,
    requests_rx: Channel<WaylandRequest>,
) -> anyhow::Result<()> {
    let mut event_loop = calloop::EventLoop::<State>::try_new()?;
    let loop_handle = event_loop.handle();
    let (globals, event_queue) = registry_queue_init(&conn)?;
    let qhandle = event_queue.handle();

    WaylandSource::new(conn, event_queue)
        .insert(loop_handle.clone())
        .map_err(|err| anyhow::anyhow!("failed to insert wayland source: {}", err.error))?;

    loop_handle
        .insert_source(requests_rx, |event, _, state| match event {
            Event::Msg(WaylandRequest::ShowDesktop {
                output,
                show,
                restore_focus,
            }) => {
                if show {
                    state.show_desktop(output);
                } else {
                    state.restore_windows(output, restore_focus);
                }
            }
            Event::Closed => {
                state.running = false;
            }
        })
        .map_err(|err| anyhow::anyhow!("failed to insert request channel: {}", err.error))?;

    let registry_state = RegistryState::new(&globals);
    let mut state = State {
        running: true,
        tx,
        output_state: OutputState::new(&globals, &qhandle),
        seat_state: SeatState::new(&globals, &qhandle),
        toplevel_info_state: ToplevelInfoState::new(&registry_state, &qhandle),
        toplevel_manager_state: ToplevelManagerState::new(&registry_state, &qhandle),
        workspace_state: WorkspaceState::new(&registry_state, &qhandle),
        registry_state,
        active_workspaces: Vec::new(),
        outputs: Vec::new(),
        hidden: FxHashMap::default(),
    };

    while state.running {
        event_loop.dispatch(None, &mut state)?;
    }

    Ok(())
}

struct State {
    running: bool,
    tx: mpsc::Sender<WaylandEvent>,
    output_state: OutputState,
    registry_state: RegistryState,
    seat_state: SeatState,
    toplevel_info_state: ToplevelInfoState,
    toplevel_manager_state: ToplevelManagerState,
    workspace_state: WorkspaceState,
    active_workspaces: Vec<ExtWorkspaceHandleV1>,
    outputs: Vec<WlOutput>,
    /// Outputs currently showing the desktop.
    hidden: FxHashMap<ObjectId, HiddenWindows>,
}

impl State {
    fn send(&mut self, event: WaylandEvent) {
        if block_on(self.tx.send(event)).is_err() {
            self.running = false;
        }
    }

    fn cosmic_toplevel(&self, handle: &ExtForeignToplevelHandleV1) -> Option<ZcosmicToplevelHandleV1> {
        self.toplevel_info_state
            .info(handle)?
            .cosmic_toplevel
            .clone()
    }

    fn show_desktop(&mut self, output: ObjectId) {
        let Some(wl_output) = self.outputs.iter().find(|o| o.id() == output).cloned() else {
            tracing::warn!(?output, "Cannot show the desktop of an unknown output");
            return;
        };
        if self.hidden.contains_key(&output) {
            return;
        }

        let manager = &self.toplevel_manager_state.manager;
        let mut hidden: HiddenWindows = HiddenWindows::default();
        for info in self.toplevel_info_state.toplevels() {
            if !info.output.contains(&wl_output)
                || !on_active_workspace(&info.workspace, &self.active_workspaces)
                || info.state.contains(&ToplevelState::Minimized)
            {
                continue;
            }
            let Some(cosmic_toplevel) = info.cosmic_toplevel.as_ref() else {
                continue;
            };
            manager.set_minimized(cosmic_toplevel);
            hidden.hide(
                info.foreign_toplevel.clone(),
                info.state.contains(&ToplevelState::Activated),
            );
        }

        tracing::debug!(?output, count = hidden.minimized.len(), "Minimized windows");
        self.hidden.insert(output.clone(), hidden);
        self.send(WaylandEvent::ShowingDesktop {
            output,
            showing: true,
        });
    }

    fn restore_windows(&mut self, output: ObjectId, restore_focus: bool) {
        let Some(hidden) = self.hidden.remove(&output) else {
            // nothing to restore, but the applet may still think otherwise
            self.send(WaylandEvent::ShowingDesktop {
                output,
                showing: false,
            });
            return;
        };

        let manager = &self.toplevel_manager_state.manager;
        for handle in &hidden.minimized {
            if let Some(cosmic_toplevel) = self.cosmic_toplevel(handle) {
                manager.unset_minimized(&cosmic_toplevel);
            }
        }

        if restore_focus {
            if let (Some(focused), Some(seat)) = (
                hidden.focused.as_ref().and_then(|f| self.cosmic_toplevel(f)),
                self.seat_state.seats().next(),
            ) {
                manager.activate(&focused, &seat);
            }
        }

        self.send(WaylandEvent::ShowingDesktop {
            output,
            showing: false,
        });
    }

    /// Leaves show-desktop mode on every output where `toplevel` became visible.
    fn toplevel_changed(&mut self, toplevel: &ExtForeignToplevelHandleV1) {
        let Some(info) = self.toplevel_info_state.info(toplevel) else {
            return;
        };
        let minimized = info.state.contains(&ToplevelState::Minimized);
        let shown = on_active_workspace(&info.workspace, &self.active_workspaces);
        let outputs: Vec<ObjectId> = info.output.iter().map(|o| o.id()).collect();

        let mut left = Vec::new();
        for (output, hidden) in &mut self.hidden {
            if hidden.update(toplevel, minimized, shown && outputs.contains(output)) {
                left.push(output.clone());
            }
        }

        for output in left {
            tracing::debug!(?output, "A window appeared, leaving show desktop mode");
            self.hidden.remove(&output);
            self.send(WaylandEvent::ShowingDesktop {
                output,
                showing: false,
            });
        }
    }
}

impl ProvidesRegistryState for State {
    fn registry(&mut self) -> &mut RegistryState {
        &mut self.registry_state
    }

    sctk::registry_handlers![OutputState, SeatState];
}

impl OutputHandler for State {
    fn output_state(&mut self) -> &mut OutputState {
        &mut self.output_state
    }

    fn new_output(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, output: WlOutput) {
        let Some(name) = self.output_state.info(&output).and_then(|info| info.name) else {
            return;
        };
        self.outputs.push(output.clone());
        self.send(WaylandEvent::OutputAdded {
            output: output.id(),
            name,
        });
    }

    fn update_output(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _output: WlOutput) {}

    fn output_destroyed(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, output: WlOutput) {
        let id = output.id();
        self.outputs.retain(|o| o.id() != id);
        self.hidden.remove(&id);
        self.send(WaylandEvent::OutputRemoved(id));
    }
}

impl SeatHandler for State {
    fn seat_state(&mut self) -> &mut SeatState {
        &mut self.seat_state
    }

    fn new_seat(&mut self, _: &Connection, _: &QueueHandle<Self>, _: WlSeat) {}

    fn new_capability(
        &mut self,
        _: &Connection,
        _: &QueueHandle<Self>,
        _: WlSeat,
        _: sctk::seat::Capability,
    ) {
    }

    fn remove_capability(
        &mut self,
        _: &Connection,
        _: &QueueHandle<Self>,
        _: WlSeat,
        _: sctk::seat::Capability,
    ) {
    }

    fn remove_seat(&mut self, _: &Connection, _: &QueueHandle<Self>, _: WlSeat) {}
}

impl WorkspaceHandler for State {
    fn workspace_state(&mut self) -> &mut WorkspaceState {
        &mut self.workspace_state
    }

    fn done(&mut self) {
        self.active_workspaces = self
            .workspace_state
            .workspace_groups()
            .filter_map(|group| {
                group
                    .workspaces
                    .iter()
                    .filter_map(|handle| self.workspace_state.workspace_info(handle))
                    .find(|w| w.state.contains(WorkspaceUpdateState::Active))
                    .map(|w| w.handle.clone())
            })
            .collect();
    }
}

impl ToplevelManagerHandler for State {
    fn toplevel_manager_state(&mut self) -> &mut ToplevelManagerState {
        &mut self.toplevel_manager_state
    }

    fn capabilities(
        &mut self,
        _: &Connection,
        _: &QueueHandle<Self>,
        _: Vec<WEnum<zcosmic_toplevel_manager_v1::ZcosmicToplelevelManagementCapabilitiesV1>>,
    ) {
    }
}

impl ToplevelInfoHandler for State {
    fn toplevel_info_state(&mut self) -> &mut ToplevelInfoState {
        &mut self.toplevel_info_state
    }

    fn new_toplevel(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        toplevel: &ExtForeignToplevelHandleV1,
    ) {
        self.toplevel_changed(toplevel);
    }

    fn update_toplevel(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        toplevel: &ExtForeignToplevelHandleV1,
    ) {
        self.toplevel_changed(toplevel);
    }

    fn toplevel_closed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        toplevel: &ExtForeignToplevelHandleV1,
    ) {
        for hidden in self.hidden.values_mut() {
            hidden.forget(toplevel);
        }
    }
}

sctk::delegate_output!(State);
sctk::delegate_registry!(State);
sctk::delegate_seat!(State);
cctk::delegate_toplevel_info!(State);
cctk::delegate_toplevel_manager!(State);
cctk::delegate_workspace!(State);

#[cfg(test)]
mod tests {
    use super::*;

    fn hidden(windows: &[(u32, bool)]) -> HiddenWindows<u32> {
        let mut hidden = HiddenWindows::default();
        for &(id, focused) in windows {
            hidden.hide(id, focused);
        }
        hidden
    }

    #[test]
    fn pending_minimize_does_not_end_the_mode() {
        let mut hidden = hidden(&[(1, true), (2, false)]);
        // compositor echoes the old, unminimized state before applying ours
        assert!(!hidden.update(&1, false, true));
        assert!(!hidden.update(&2, false, true));
        assert_eq!(hidden.focused, Some(1));
    }

    #[test]
    fn confirmed_minimize_clears_pending() {
        let mut hidden = hidden(&[(1, false)]);
        assert!(!hidden.update(&1, true, true));
        assert!(hidden.pending.is_empty());
        assert_eq!(hidden.minimized, [1]);

        // unminimized by someone else afterwards
        assert!(hidden.update(&1, false, true));
    }

    #[test]
    fn visible_window_on_output_ends_the_mode() {
        let mut hidden = hidden(&[(1, false)]);
        assert!(hidden.update(&7, false, true));
        assert!(!hidden.update(&8, false, false));
        assert!(!hidden.update(&9, true, true));
    }

    #[test]
    fn closed_window_is_forgotten() {
        let mut hidden = hidden(&[(1, true), (2, false)]);
        hidden.forget(&1);

        assert_eq!(hidden.minimized, [2]);
        assert!(!hidden.pending.contains(&1));
        assert_eq!(hidden.focused, None);
    }

    #[test]
    fn only_windows_on_active_workspaces_are_shown() {
        assert!(on_active_workspace(&[3], &[1, 3]));
        assert!(!on_active_workspace(&[2], &[1, 3]));
        assert!(!on_active_workspace(&[] as &[u32], &[1]));
        assert!(on_active_workspace(&[2], &[]));
    }
}
