/*
 *  pacer.rs
 *
 *  vmu-screen - second screen for the VMU
 *	(c) 2020-26 Stuart Hunter
 *
 *	This program is free software: you can redistribute it and/or modify
 *	it under the terms of the GNU General Public License as published by
 *	the Free Software Foundation, either version 3 of the License, or
 *	(at your option) any later version.
 *
 *	This program is distributed in the hope that it will be useful,
 *	but WITHOUT ANY WARRANTY; without even the implied warranty of
 *	MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *	GNU General Public License for more details.
 *
 *	See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *	Public License.
 *
 */
use std::time::{Duration, Instant};

/// Cooperative tick schedule for the UI thread
///
/// One pending deadline at most. After a tick runs the next deadline is
/// `now + interval`, measured from when the tick finished, so a slow tick
/// stretches the cadence instead of queueing catch-up ticks.
#[derive(Debug, Clone)]
pub struct TickPacer {
    next_deadline: Option<Instant>,
    interval: Duration,
}

impl TickPacer {
    pub fn new(interval: Duration) -> Self {
        Self { next_deadline: None, interval }
    }

    #[inline]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Takes effect from the next reschedule; a pending deadline is kept
    #[inline]
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    #[inline]
    pub fn is_scheduled(&self) -> bool {
        self.next_deadline.is_some()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.next_deadline
    }

    /// Arm the first tick one interval from `now`; no-op if already armed
    pub fn schedule(&mut self, now: Instant) {
        if self.next_deadline.is_none() {
            self.next_deadline = Some(now + self.interval);
        }
    }

    /// Drop the pending tick; nothing fires until `schedule` is called again
    pub fn cancel(&mut self) {
        self.next_deadline = None;
    }

    /// Returns true if a tick is due; the caller must run it and then call
    /// `reschedule` with the time the tick completed.
    #[inline]
    pub fn is_due(&self, now: Instant) -> bool {
        matches!(self.next_deadline, Some(deadline) if now >= deadline)
    }

    /// Arm the next tick after one has run; ignored when cancelled meanwhile
    #[inline]
    pub fn reschedule(&mut self, finished: Instant) {
        if self.next_deadline.is_some() {
            self.next_deadline = Some(finished + self.interval);
        }
    }
}
