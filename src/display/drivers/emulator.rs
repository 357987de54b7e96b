/*
 *  display/drivers/emulator.rs
 *
 *  vmu-screen - second screen for the VMU
 *  (c) 2020-26 Stuart Hunter
 *
 *  Desktop host: a simulated main screen and one pluggable monitor
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

use crate::display::drivers::headless::HeadlessHost;
use crate::display::error::DisplayError;
use crate::display::framebuffer::SurfaceFrame;
use crate::display::traits::{DisplayHost, Placement, TargetEvent, TargetId, TargetInfo};

/// Simulated main screen
pub const SCREEN_SIZE: (u32, u32) = (640, 480);
/// Panel to the right of the main screen where the monitor appears
pub const PANEL_SIZE: (u32, u32) = (480, 480);
/// Size of the simulated monitor inside the panel
pub const MONITOR_SIZE: (u32, u32) = (480, 360);

const SCREEN_BG: [u8; 4] = [32, 40, 48, 255];
const PANEL_BG: [u8; 4] = [12, 12, 12, 255];
const MONITOR_BG: [u8; 4] = [0, 0, 0, 255];

/// Host behind the emulator window
///
/// Bookkeeping is delegated to a `HeadlessHost`; this type adds the
/// desktop layout: main screen on the left, monitor panel on the right.
pub struct EmulatorHost {
    inner: HeadlessHost,
}

impl Default for EmulatorHost {
    fn default() -> Self {
        Self::new()
    }
}

impl EmulatorHost {
    pub fn new() -> Self {
        Self { inner: HeadlessHost::new(SCREEN_SIZE.0, SCREEN_SIZE.1) }
    }

    /// Pixel size of the whole desktop
    pub fn canvas_size() -> (u32, u32) {
        (SCREEN_SIZE.0 + PANEL_SIZE.0, SCREEN_SIZE.1.max(PANEL_SIZE.1))
    }

    fn monitor(&self) -> Option<TargetInfo> {
        self.inner.secondary_targets().into_iter().next()
    }

    /// Plug the monitor; `None` if it is already plugged
    pub fn plug_monitor(&mut self) -> Option<TargetId> {
        if self.monitor().is_some() {
            return None;
        }
        Some(self.inner.plug_target("monitor", MONITOR_SIZE.0, MONITOR_SIZE.1))
    }

    pub fn unplug_monitor(&mut self) -> bool {
        match self.monitor() {
            Some(target) => self.inner.unplug_target(target.id),
            None => false,
        }
    }

    pub fn has_monitor(&self) -> bool {
        self.monitor().is_some()
    }

    fn overlay_rect(&self) -> Option<(u32, u32, u32, u32)> {
        let frame = self.inner.frame(Placement::Primary)?;
        let (w, h) = frame.dimensions();
        let (x, y) = self.inner.overlay_origin(w, h);
        Some((x, y, w, h))
    }

    fn monitor_rect(&self) -> Option<(TargetId, u32, u32, u32, u32)> {
        let target = self.monitor()?;
        let x = SCREEN_SIZE.0 + PANEL_SIZE.0.saturating_sub(target.width) / 2;
        let y = PANEL_SIZE.1.saturating_sub(target.height) / 2;
        Some((target.id, x, y, target.width, target.height))
    }

    /// Paint the desktop into an RGBA canvas of `canvas_size()`
    pub fn compose(&self, canvas: &mut [u8]) {
        let (cw, _) = Self::canvas_size();
        for (i, px) in canvas.chunks_exact_mut(4).enumerate() {
            let x = i as u32 % cw;
            px.copy_from_slice(if x < SCREEN_SIZE.0 { &SCREEN_BG } else { &PANEL_BG });
        }

        if let Some((id, x, y, w, h)) = self.monitor_rect() {
            fill_rect(canvas, cw, (x, y, w, h), MONITOR_BG);
            if let Some(frame) = self.inner.frame(Placement::Secondary(id)) {
                blit_frame(canvas, cw, frame, x, y);
            }
        }
        if let (Some((x, y, _, _)), Some(frame)) = (self.overlay_rect(), self.inner.frame(Placement::Primary)) {
            blit_frame(canvas, cw, frame, x, y);
        }
    }

    /// Which surface sits under canvas pixel `(x, y)`, in surface coordinates
    pub fn hit_test(&self, x: u32, y: u32) -> Option<(Placement, f32, f32)> {
        if let Some((ox, oy, w, h)) = self.overlay_rect() {
            if x >= ox && x < ox + w && y >= oy && y < oy + h {
                return Some((Placement::Primary, (x - ox) as f32, (y - oy) as f32));
            }
        }
        let (id, mx, my, w, h) = self.monitor_rect()?;
        if x >= mx && x < mx + w && y >= my && y < my + h {
            return Some((Placement::Secondary(id), (x - mx) as f32, (y - my) as f32));
        }
        None
    }
}

fn fill_rect(canvas: &mut [u8], stride: u32, (x, y, w, h): (u32, u32, u32, u32), rgba: [u8; 4]) {
    for row in y..y + h {
        let start = (row as usize * stride as usize + x as usize) * 4;
        let end = start + w as usize * 4;
        if let Some(line) = canvas.get_mut(start..end) {
            line.chunks_exact_mut(4).for_each(|px| px.copy_from_slice(&rgba));
        }
    }
}

fn blit_frame(canvas: &mut [u8], stride: u32, frame: &SurfaceFrame, x: u32, y: u32) {
    let (w, h) = frame.dimensions();
    let src = frame.as_bytes();
    let row_bytes = w as usize * 4;
    for row in 0..h {
        let dst_start = ((y + row) as usize * stride as usize + x as usize) * 4;
        let src_start = row as usize * row_bytes;
        if let (Some(dst), Some(line)) = (
            canvas.get_mut(dst_start..dst_start + row_bytes),
            src.get(src_start..src_start + row_bytes),
        ) {
            dst.copy_from_slice(line);
        }
    }
}

impl DisplayHost for EmulatorHost {
    fn secondary_targets(&self) -> Vec<TargetInfo> {
        self.inner.secondary_targets()
    }

    fn target_size(&self, id: TargetId) -> Option<(u32, u32)> {
        self.inner.target_size(id)
    }

    fn register_target_listener(&mut self, events: Sender<TargetEvent>) {
        self.inner.register_target_listener(events);
    }

    fn unregister_target_listener(&mut self) {
        self.inner.unregister_target_listener();
    }

    fn attach_surface(&mut self, placement: Placement, preferred: (u32, u32)) -> Result<(u32, u32), DisplayError> {
        self.inner.attach_surface(placement, preferred)
    }

    fn detach_surface(&mut self, placement: Placement) {
        self.inner.detach_surface(placement);
    }

    fn present(&mut self, placement: Placement, frame: &SurfaceFrame) {
        self.inner.present(placement, frame);
    }
}
