/*
 *  display/mod.rs
 *
 *  vmu-screen - second screen for the VMU
 *  (c) 2020-26 Stuart Hunter
 *
 *  Display subsystem - acquisition, rendering and routing of the VMU LCD
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

// Core trait definitions
pub mod traits;
pub mod error;
pub mod color;
pub mod framebuffer;

// Tick path
pub mod acquirer;
pub mod surface;

// Placement
pub mod presenter;
pub mod router;

// Display hosts (mock, headless, emulator)
pub mod drivers;

// Emulator window (only with emulator feature)
#[cfg(feature = "emulator")]
pub mod emulator_window;

// Re-exports for convenience
pub use acquirer::{AcquirerEvent, FrameAcquirer, TickEvents};
pub use color::{ColorPreset, Palette, Rgb};
pub use error::DisplayError;
pub use framebuffer::{Filter, LcdImage, RawFrame, SurfaceFrame};
pub use presenter::{compute_scale, SecondaryPresenter};
pub use router::{DisplayRouter, RouteState};
pub use surface::{MeasureSpec, RenderSurface, TouchPhase};
pub use traits::{
    DisplayHost, DisplayListener, InstanceId, PixelSource, Placement, TargetEvent, TargetId, TargetInfo, VmuButton,
};
