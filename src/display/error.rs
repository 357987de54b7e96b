/*
 *  display/error.rs
 *
 *  vmu-screen - second screen for the VMU
 *  (c) 2020-26 Stuart Hunter
 *
 *  Unified error types for display subsystem
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

use thiserror::Error;

use crate::display::traits::{InstanceId, TargetId};

/// Unified error type for all display operations
///
/// None of these escape the tick or routing paths; they are logged and
/// turned into "skip this cycle" or a fallback transition.
#[derive(Debug, Error)]
pub enum DisplayError {
    /// Instance inactive, out of range or gone mid-read
    #[error("VMU {0} is not available")]
    SourceUnavailable(InstanceId),

    /// Secondary target missing or already removed
    #[error("display target {0} is not available")]
    TargetUnavailable(TargetId),

    /// Windowing layer refused an operation
    #[error("display host error: {0}")]
    HostFailure(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}
