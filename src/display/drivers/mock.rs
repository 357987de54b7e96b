/*
 *  display/drivers/mock.rs
 *
 *  vmu-screen - second screen for the VMU
 *  (c) 2020-26 Stuart Hunter
 *
 *  Mock pixel source and display host for testing without an emulator
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */

use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::constants::MAX_INSTANCES;
use crate::display::error::DisplayError;
use crate::display::framebuffer::{RawFrame, SurfaceFrame};
use crate::display::traits::{
    DisplayHost, InstanceId, PixelSource, Placement, TargetEvent, TargetId, TargetInfo, VmuButton,
};

/// Scriptable pixel source
///
/// Clones share state, so a test can keep one handle and give the other to
/// the code under test.
#[derive(Debug, Clone, Default)]
pub struct MockPixelSource {
    state: Arc<Mutex<MockSourceState>>,
}

/// Internal state for the mock source (shared for inspection in tests)
#[derive(Debug, Default)]
pub struct MockSourceState {
    pub active: [bool; MAX_INSTANCES],
    pub dirty: [bool; MAX_INSTANCES],
    pub frames: [RawFrame; MAX_INSTANCES],

    /// Number of times init() was called
    pub init_count: usize,
    /// Number of times terminate() was called
    pub terminate_count: usize,
    /// Every set_enabled() argument, in order
    pub enabled_calls: Vec<bool>,

    /// Number of is_dirty() queries
    pub dirty_queries: usize,
    /// Number of successful copy_framebuffer() calls
    pub copies: usize,
    /// Every send_button() call
    pub buttons: Vec<(InstanceId, VmuButton, bool)>,

    /// Simulate failures (for error testing)
    pub simulate_copy_failure: bool,
}

impl MockPixelSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the shared state for inspection
    pub fn state(&self) -> MutexGuard<'_, MockSourceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_active(&self, id: InstanceId, active: bool) {
        self.state().active[id] = active;
    }

    /// Publish a new LCD for `id`; marks it active and dirty
    pub fn push_frame(&self, id: InstanceId, frame: RawFrame) {
        let mut state = self.state();
        state.active[id] = true;
        state.dirty[id] = true;
        state.frames[id] = frame;
    }

    pub fn set_dirty(&self, id: InstanceId) {
        self.state().dirty[id] = true;
    }

    pub fn set_copy_failure(&self, fail: bool) {
        self.state().simulate_copy_failure = fail;
    }
}

impl PixelSource for MockPixelSource {
    fn init(&self) {
        self.state().init_count += 1;
    }

    fn set_enabled(&self, enabled: bool) {
        self.state().enabled_calls.push(enabled);
    }

    fn terminate(&self) {
        self.state().terminate_count += 1;
    }

    fn is_active(&self, id: InstanceId) -> bool {
        id < MAX_INSTANCES && self.state().active[id]
    }

    fn is_dirty(&self, id: InstanceId) -> bool {
        let mut state = self.state();
        state.dirty_queries += 1;
        id < MAX_INSTANCES && std::mem::take(&mut state.dirty[id])
    }

    fn copy_framebuffer(&self, id: InstanceId, dest: &mut RawFrame) -> Result<(), DisplayError> {
        let mut state = self.state();
        if id >= MAX_INSTANCES || !state.active[id] {
            return Err(DisplayError::SourceUnavailable(id));
        }
        if state.simulate_copy_failure {
            // leave a torn write behind, the caller must not use it
            dest.as_mut_slice()[0] = 0xDEAD_BEEF;
            return Err(DisplayError::SourceUnavailable(id));
        }
        dest.as_mut_slice().copy_from_slice(state.frames[id].as_slice());
        state.copies += 1;
        Ok(())
    }

    fn send_button(&self, id: InstanceId, button: VmuButton, pressed: bool) {
        self.state().buttons.push((id, button, pressed));
    }
}

/// Scriptable windowing host
///
/// The router owns the host, so tests drive hotplug through a
/// `MockHostHandle` taken with `handle()` before handing the host over.
#[derive(Debug, Default)]
pub struct MockHost {
    state: Arc<Mutex<MockHostState>>,
}

/// Internal state for the mock host (shared for inspection in tests)
#[derive(Debug, Default)]
pub struct MockHostState {
    pub targets: Vec<TargetInfo>,
    pub listener: Option<Sender<TargetEvent>>,

    /// Largest box the primary screen grants, `None` = whatever is asked
    pub primary_limit: Option<(u32, u32)>,

    /// Placements currently holding a box
    pub attached: Vec<Placement>,
    /// Every attach: placement, requested size, granted size
    pub attach_log: Vec<(Placement, (u32, u32), (u32, u32))>,
    pub detach_log: Vec<Placement>,

    /// Number of frames presented per placement, in order
    pub presents: Vec<Placement>,
    pub last_frame: Option<SurfaceFrame>,

    pub unregister_count: usize,

    /// Simulate failures (for error testing)
    pub simulate_secondary_failure: bool,
    /// Targets that are listed but whose size query fails
    pub hidden_sizes: Vec<TargetId>,
}

/// Test-side handle onto a `MockHost`
#[derive(Debug, Clone)]
pub struct MockHostHandle {
    state: Arc<Mutex<MockHostState>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&self) -> MockHostHandle {
        MockHostHandle { state: Arc::clone(&self.state) }
    }

    fn state(&self) -> MutexGuard<'_, MockHostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MockHostHandle {
    pub fn state(&self) -> MutexGuard<'_, MockHostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Plug in a target; notifies the listener if one is registered
    pub fn add_target(&self, id: TargetId, width: u32, height: u32) {
        let mut state = self.state();
        state.targets.push(TargetInfo { id, name: format!("mock-{}", id), width, height });
        if let Some(tx) = &state.listener {
            let _ = tx.send(TargetEvent::Added(id));
        }
    }

    pub fn remove_target(&self, id: TargetId) {
        let mut state = self.state();
        state.targets.retain(|t| t.id != id);
        state.attached.retain(|p| *p != Placement::Secondary(id));
        if let Some(tx) = &state.listener {
            let _ = tx.send(TargetEvent::Removed(id));
        }
    }

    pub fn resize_target(&self, id: TargetId, width: u32, height: u32) {
        let mut state = self.state();
        if let Some(t) = state.targets.iter_mut().find(|t| t.id == id) {
            t.width = width;
            t.height = height;
        }
        if let Some(tx) = &state.listener {
            let _ = tx.send(TargetEvent::Resized { id, width, height });
        }
    }

    pub fn set_primary_limit(&self, limit: Option<(u32, u32)>) {
        self.state().primary_limit = limit;
    }

    pub fn set_secondary_failure(&self, fail: bool) {
        self.state().simulate_secondary_failure = fail;
    }

    /// Make `target_size` report `id` as gone while it stays enumerated
    pub fn hide_size(&self, id: TargetId) {
        self.state().hidden_sizes.push(id);
    }

    pub fn attached(&self) -> Vec<Placement> {
        self.state().attached.clone()
    }

    pub fn present_count(&self, placement: Placement) -> usize {
        self.state().presents.iter().filter(|p| **p == placement).count()
    }
}

impl DisplayHost for MockHost {
    fn secondary_targets(&self) -> Vec<TargetInfo> {
        self.state().targets.clone()
    }

    fn target_size(&self, id: TargetId) -> Option<(u32, u32)> {
        let state = self.state();
        if state.hidden_sizes.contains(&id) {
            return None;
        }
        state
            .targets
            .iter()
            .find(|t| t.id == id)
            .map(|t| (t.width, t.height))
    }

    fn register_target_listener(&mut self, events: Sender<TargetEvent>) {
        self.state().listener = Some(events);
    }

    fn unregister_target_listener(&mut self) {
        let mut state = self.state();
        state.listener = None;
        state.unregister_count += 1;
    }

    fn attach_surface(&mut self, placement: Placement, preferred: (u32, u32)) -> Result<(u32, u32), DisplayError> {
        let mut state = self.state();
        let granted = match placement {
            Placement::Primary => match state.primary_limit {
                Some((w, h)) => (preferred.0.min(w), preferred.1.min(h)),
                None => preferred,
            },
            Placement::Secondary(id) => {
                if state.simulate_secondary_failure {
                    return Err(DisplayError::HostFailure("simulated presentation failure".to_string()));
                }
                state
                    .targets
                    .iter()
                    .find(|t| t.id == id)
                    .map(|t| (t.width, t.height))
                    .ok_or(DisplayError::TargetUnavailable(id))?
            }
        };
        if !state.attached.contains(&placement) {
            state.attached.push(placement);
        }
        state.attach_log.push((placement, preferred, granted));
        Ok(granted)
    }

    fn detach_surface(&mut self, placement: Placement) {
        let mut state = self.state();
        state.attached.retain(|p| *p != placement);
        state.detach_log.push(placement);
    }

    fn present(&mut self, placement: Placement, frame: &SurfaceFrame) {
        let mut state = self.state();
        state.presents.push(placement);
        state.last_frame = Some(frame.clone());
    }
}
