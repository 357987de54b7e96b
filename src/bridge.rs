/*
 *  bridge.rs
 *
 *  vmu-screen - second screen for the VMU
 *  (c) 2020-26 Stuart Hunter
 *
 *  Shared VMU LCD state between the emulation thread and the display
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

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};

use crate::constants::{LCD_PIXELS, MAX_INSTANCES};
use crate::display::error::DisplayError;
use crate::display::framebuffer::RawFrame;
use crate::display::traits::{InstanceId, PixelSource, VmuButton};

/// Called on the emulation thread after every LCD write
pub type UpdateCallback = Arc<dyn Fn(InstanceId, &RawFrame, u64) + Send + Sync>;

#[derive(Default)]
struct Slot {
    dirty: AtomicBool,
    connected: AtomicBool,
    buttons: AtomicU8,
    last_update: AtomicU64,
    frame: Mutex<RawFrame>,
}

impl Slot {
    fn frame(&self) -> MutexGuard<'_, RawFrame> {
        self.frame.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn reset(&self) {
        self.dirty.store(false, Ordering::Release);
        self.connected.store(false, Ordering::Release);
        self.buttons.store(0, Ordering::Release);
        self.last_update.store(0, Ordering::Release);
        *self.frame() = RawFrame::new();
    }
}

/// Per-instance LCD mailbox
///
/// The emulation thread writes through `on_display_update` and
/// `on_connection_change`; the display thread reads through `PixelSource`.
/// Each frame is copied under its own lock so a reader never sees a torn
/// frame, flags are plain atomics.
pub struct VmuBridge {
    slots: [Slot; MAX_INSTANCES],
    initialized: AtomicBool,
    enabled: AtomicBool,
    callback: Mutex<Option<UpdateCallback>>,
}

impl Default for VmuBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl VmuBridge {
    pub fn new() -> Self {
        Self {
            slots: Default::default(),
            initialized: AtomicBool::new(false),
            enabled: AtomicBool::new(false),
            callback: Mutex::new(None),
        }
    }

    fn slot(&self, id: InstanceId) -> Option<&Slot> {
        self.slots.get(id)
    }

    fn callback(&self) -> MutexGuard<'_, Option<UpdateCallback>> {
        self.callback.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_enabled(&self) -> bool {
        self.initialized.load(Ordering::Acquire) && self.enabled.load(Ordering::Acquire)
    }

    pub fn connected_count(&self) -> usize {
        self.slots.iter().filter(|s| s.connected.load(Ordering::Acquire)).count()
    }

    /// Timestamp passed with the last update of `id`, 0 if none
    pub fn last_update(&self, id: InstanceId) -> u64 {
        self.slot(id).map_or(0, |s| s.last_update.load(Ordering::Acquire))
    }

    /// Currently held buttons of `id` as a hardware bitmask
    pub fn button_state(&self, id: InstanceId) -> u8 {
        self.slot(id).map_or(0, |s| s.buttons.load(Ordering::Acquire))
    }

    /// Replace the update hook; `None` removes it
    pub fn register_update_callback(&self, callback: Option<UpdateCallback>) {
        debug!("VMU bridge: update callback {}", if callback.is_some() { "registered" } else { "unregistered" });
        *self.callback() = callback;
    }

    /// Emulation side: the LCD of `id` was rewritten
    ///
    /// Ignored while the bridge is not initialised or disabled.
    pub fn on_display_update(&self, id: InstanceId, samples: &[u32], timestamp: u64) {
        if !self.is_enabled() {
            return;
        }
        let Some(slot) = self.slot(id) else {
            return;
        };
        if samples.len() != LCD_PIXELS {
            warn!("VMU {}: dropping frame of {} samples", id, samples.len());
            return;
        }

        let snapshot = {
            let mut frame = slot.frame();
            frame.as_mut_slice().copy_from_slice(samples);
            frame.clone()
        };
        slot.last_update.store(timestamp, Ordering::Release);
        slot.connected.store(true, Ordering::Release);
        slot.dirty.store(true, Ordering::Release);

        // run the hook without holding the lock
        let callback = self.callback().clone();
        if let Some(callback) = callback {
            callback(id, &snapshot, timestamp);
        }
    }

    /// Emulation side: a VMU was plugged in or pulled out
    pub fn on_connection_change(&self, id: InstanceId, connected: bool) {
        if !self.initialized.load(Ordering::Acquire) {
            return;
        }
        let Some(slot) = self.slot(id) else {
            return;
        };
        slot.connected.store(connected, Ordering::Release);
        if !connected {
            *slot.frame() = RawFrame::new();
        }
        debug!("VMU bridge: VMU {} {}", id, if connected { "connected" } else { "disconnected" });
    }
}

impl PixelSource for VmuBridge {
    fn init(&self) {
        if self.initialized.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("VMU bridge: initializing");
        self.slots.iter().for_each(Slot::reset);
        self.enabled.store(true, Ordering::Release);
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
        debug!("VMU bridge: {}", if enabled { "enabled" } else { "disabled" });
    }

    fn terminate(&self) {
        if !self.initialized.swap(false, Ordering::AcqRel) {
            return;
        }
        info!("VMU bridge: terminating");
        self.enabled.store(false, Ordering::Release);
        *self.callback() = None;
    }

    fn is_active(&self, id: InstanceId) -> bool {
        self.slot(id).is_some_and(|s| s.connected.load(Ordering::Acquire))
    }

    fn is_dirty(&self, id: InstanceId) -> bool {
        self.slot(id).is_some_and(|s| s.dirty.swap(false, Ordering::AcqRel))
    }

    fn copy_framebuffer(&self, id: InstanceId, dest: &mut RawFrame) -> Result<(), DisplayError> {
        match self.slot(id) {
            Some(slot) if slot.connected.load(Ordering::Acquire) => {
                dest.as_mut_slice().copy_from_slice(slot.frame().as_slice());
                Ok(())
            }
            _ => Err(DisplayError::SourceUnavailable(id)),
        }
    }

    fn send_button(&self, id: InstanceId, button: VmuButton, pressed: bool) {
        let Some(slot) = self.slot(id) else {
            return;
        };
        let mask = button.mask();
        if pressed {
            slot.buttons.fetch_or(mask, Ordering::AcqRel);
        } else {
            slot.buttons.fetch_and(!mask, Ordering::AcqRel);
        }
        debug!("VMU bridge: VMU {} button {:02X} {}", id, mask, if pressed { "pressed" } else { "released" });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::thread;

    fn ready() -> VmuBridge {
        let bridge = VmuBridge::new();
        bridge.init();
        bridge
    }

    #[test]
    fn test_update_ignored_until_init() {
        let bridge = VmuBridge::new();
        bridge.on_display_update(0, &[0xFFFF_FFFF; LCD_PIXELS], 1);
        assert!(!bridge.is_active(0));

        bridge.init();
        bridge.set_enabled(false);
        bridge.on_display_update(0, &[0xFFFF_FFFF; LCD_PIXELS], 1);
        assert!(!bridge.is_active(0));
    }

    #[test]
    fn test_update_marks_dirty_once() {
        let bridge = ready();
        bridge.on_display_update(2, &[0xFFFF_FFFF; LCD_PIXELS], 42);
        assert!(bridge.is_active(2));
        assert!(bridge.is_dirty(2));
        assert!(!bridge.is_dirty(2));
        assert_eq!(bridge.last_update(2), 42);
        assert_eq!(bridge.connected_count(), 1);

        let mut dest = RawFrame::new();
        bridge.copy_framebuffer(2, &mut dest).unwrap();
        assert_eq!(dest, RawFrame::filled(0xFFFF_FFFF));
    }

    #[test]
    fn test_wrong_length_and_range_rejected() {
        let bridge = ready();
        bridge.on_display_update(0, &[0; 10], 1);
        bridge.on_display_update(MAX_INSTANCES, &[0; LCD_PIXELS], 1);
        assert_eq!(bridge.connected_count(), 0);
        assert!(!bridge.is_dirty(MAX_INSTANCES));
        assert!(bridge.copy_framebuffer(MAX_INSTANCES, &mut RawFrame::new()).is_err());
    }

    #[test]
    fn test_disconnect_zeroes_frame() {
        let bridge = ready();
        bridge.on_display_update(1, &[0xFFFF_FFFF; LCD_PIXELS], 1);
        bridge.on_connection_change(1, false);
        assert!(!bridge.is_active(1));
        assert!(bridge.copy_framebuffer(1, &mut RawFrame::new()).is_err());

        bridge.on_connection_change(1, true);
        let mut dest = RawFrame::filled(7);
        bridge.copy_framebuffer(1, &mut dest).unwrap();
        assert_eq!(dest, RawFrame::new());
    }

    #[test]
    fn test_button_mask() {
        let bridge = ready();
        bridge.send_button(0, VmuButton::A, true);
        bridge.send_button(0, VmuButton::Up, true);
        assert_eq!(bridge.button_state(0), 0x44);
        bridge.send_button(0, VmuButton::A, false);
        assert_eq!(bridge.button_state(0), 0x04);
        bridge.send_button(99, VmuButton::B, true);
    }

    #[test]
    fn test_callback_dropped_on_terminate() {
        let bridge = ready();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        bridge.register_update_callback(Some(Arc::new(move |_: InstanceId, _: &RawFrame, _: u64| {
            counter.fetch_add(1, Ordering::SeqCst);
        })));

        bridge.on_display_update(0, &[0; LCD_PIXELS], 1);
        bridge.terminate();
        bridge.terminate();
        bridge.init();
        bridge.on_display_update(0, &[0; LCD_PIXELS], 2);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_writer_never_tears() {
        let bridge = Arc::new(ready());
        let writer = {
            let bridge = Arc::clone(&bridge);
            thread::spawn(move || {
                for i in 0..200u64 {
                    let sample = if i % 2 == 0 { 0xFFFF_FFFF } else { 0xFF00_0000 };
                    bridge.on_display_update(0, &[sample; LCD_PIXELS], i);
                }
            })
        };

        let mut dest = RawFrame::new();
        for _ in 0..200 {
            if bridge.copy_framebuffer(0, &mut dest).is_ok() {
                let first = dest.as_slice()[0];
                assert!(dest.as_slice().iter().all(|s| *s == first));
            }
        }
        writer.join().unwrap();
    }
}
