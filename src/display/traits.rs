/*
 *  display/traits.rs
 *
 *  vmu-screen - second screen for the VMU
 *  (c) 2020-26 Stuart Hunter
 *
 *  Seams to the emulation core (pixel source) and the windowing host
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

use std::fmt;
use std::sync::mpsc::Sender;

use crate::display::error::DisplayError;
use crate::display::framebuffer::{RawFrame, SurfaceFrame};

/// VMU slot, `bus * 2 + port`, always below `MAX_INSTANCES`
pub type InstanceId = usize;

/// Host-assigned identifier of a secondary render target
pub type TargetId = u32;

/// VMU buttons, values match the hardware bitmask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum VmuButton {
    Mode = 0x01,
    Sleep = 0x02,
    Up = 0x04,
    Down = 0x08,
    Left = 0x10,
    Right = 0x20,
    A = 0x40,
    B = 0x80,
}

impl VmuButton {
    #[inline]
    pub fn mask(self) -> u8 {
        self as u8
    }
}

/// Per-instance LCD data exported by the emulation core
///
/// Every query may fail because the instance can vanish at any time; callers
/// treat a failure as "nothing new this cycle". Implementations synchronise
/// against the emulation thread themselves, hence `&self` everywhere.
pub trait PixelSource: Send + Sync {
    /// Subsystem start-up, called once when the router is built
    fn init(&self);

    /// Called on every enabled/disabled transition of the display
    fn set_enabled(&self, enabled: bool);

    /// Subsystem shutdown, called when the router is released
    fn terminate(&self);

    fn is_active(&self, id: InstanceId) -> bool;

    /// Test-and-clear: true if the LCD changed since the last query
    fn is_dirty(&self, id: InstanceId) -> bool;

    /// Copy the whole LCD of `id` into `dest`
    ///
    /// On error `dest` may hold a partial write and must not be trusted.
    fn copy_framebuffer(&self, id: InstanceId, dest: &mut RawFrame) -> Result<(), DisplayError>;

    /// Fire-and-forget button state change
    fn send_button(&self, id: InstanceId, button: VmuButton, pressed: bool);
}

/// Where a surface is shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placement {
    /// Overlay on the main screen
    Primary,
    /// Full-screen on a secondary target
    Secondary(TargetId),
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placement::Primary => write!(f, "primary overlay"),
            Placement::Secondary(id) => write!(f, "secondary target {}", id),
        }
    }
}

/// Description of a secondary target as enumerated by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetInfo {
    pub id: TargetId,
    pub name: String,
    pub width: u32,
    pub height: u32,
}

/// Target availability notifications, delivered asynchronously
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetEvent {
    Added(TargetId),
    Removed(TargetId),
    Resized { id: TargetId, width: u32, height: u32 },
}

/// The windowing layer: primary screen plus zero or more secondary targets
pub trait DisplayHost {
    /// Secondary targets in a stable order; the first one is preferred
    fn secondary_targets(&self) -> Vec<TargetInfo>;

    /// Current size of a target in pixels, `None` once it is gone
    fn target_size(&self, id: TargetId) -> Option<(u32, u32)>;

    /// Register for add/remove/resize notifications
    fn register_target_listener(&mut self, events: Sender<TargetEvent>);

    /// Drop the registration made by `register_target_listener`
    fn unregister_target_listener(&mut self);

    /// Reserve a box for a surface on `placement`
    ///
    /// `preferred` is what the surface asks for; the host decides and
    /// returns the final pixel size.
    fn attach_surface(&mut self, placement: Placement, preferred: (u32, u32)) -> Result<(u32, u32), DisplayError>;

    /// Release the box reserved by `attach_surface`; detaching twice is harmless
    fn detach_surface(&mut self, placement: Placement);

    /// Show a freshly rendered surface frame
    fn present(&mut self, placement: Placement, frame: &SurfaceFrame);
}

/// Optional observer of acquisition events
pub trait DisplayListener {
    fn on_connected(&mut self, id: InstanceId);
    fn on_disconnected(&mut self);
    fn on_updated(&mut self, _id: InstanceId) {}
}
