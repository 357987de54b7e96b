/*
 *  display/drivers/headless.rs
 *
 *  vmu-screen - second screen for the VMU
 *  (c) 2020-26 Stuart Hunter
 *
 *  In-memory display host: one primary screen plus pluggable targets
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

use std::collections::HashMap;
use std::sync::mpsc::Sender;

use log::{debug, info, trace};

use crate::constants::OVERLAY_MARGIN;
use crate::display::error::DisplayError;
use crate::display::framebuffer::SurfaceFrame;
use crate::display::surface::MeasureSpec;
use crate::display::traits::{DisplayHost, Placement, TargetEvent, TargetId, TargetInfo};

/// Display host without any real window system
///
/// Keeps the last presented frame of every attached surface so a window
/// (or a test) can composite them. Targets are plugged and unplugged
/// programmatically.
#[derive(Debug)]
pub struct HeadlessHost {
    screen: (u32, u32),
    targets: Vec<TargetInfo>,
    next_id: TargetId,
    listener: Option<Sender<TargetEvent>>,
    boxes: HashMap<Placement, (u32, u32)>,
    frames: HashMap<Placement, SurfaceFrame>,
    presented: u64,
}

impl HeadlessHost {
    /// Host whose primary screen is `width` x `height`
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            screen: (width, height),
            targets: Vec::new(),
            next_id: 1,
            listener: None,
            boxes: HashMap::new(),
            frames: HashMap::new(),
            presented: 0,
        }
    }

    pub fn screen_size(&self) -> (u32, u32) {
        self.screen
    }

    fn notify(&self, event: TargetEvent) {
        if let Some(tx) = &self.listener {
            // receiver gone means the router was released
            let _ = tx.send(event);
        }
    }

    /// Connect a new target; returns its id
    pub fn plug_target(&mut self, name: &str, width: u32, height: u32) -> TargetId {
        let id = self.next_id;
        self.next_id += 1;
        info!("display target {} '{}' plugged ({}x{})", id, name, width, height);
        self.targets.push(TargetInfo { id, name: name.to_string(), width, height });
        self.notify(TargetEvent::Added(id));
        id
    }

    pub fn unplug_target(&mut self, id: TargetId) -> bool {
        let before = self.targets.len();
        self.targets.retain(|t| t.id != id);
        if self.targets.len() == before {
            return false;
        }
        info!("display target {} unplugged", id);
        self.boxes.remove(&Placement::Secondary(id));
        self.frames.remove(&Placement::Secondary(id));
        self.notify(TargetEvent::Removed(id));
        true
    }

    pub fn resize_target(&mut self, id: TargetId, width: u32, height: u32) -> bool {
        let Some(target) = self.targets.iter_mut().find(|t| t.id == id) else {
            return false;
        };
        target.width = width;
        target.height = height;
        self.notify(TargetEvent::Resized { id, width, height });
        true
    }

    /// Last frame presented on `placement`
    pub fn frame(&self, placement: Placement) -> Option<&SurfaceFrame> {
        self.frames.get(&placement)
    }

    pub fn is_attached(&self, placement: Placement) -> bool {
        self.boxes.contains_key(&placement)
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    /// Top-left corner of a `width` x `height` overlay, bottom-right of the screen
    pub fn overlay_origin(&self, width: u32, height: u32) -> (u32, u32) {
        (
            self.screen.0.saturating_sub(width + OVERLAY_MARGIN),
            self.screen.1.saturating_sub(height + OVERLAY_MARGIN),
        )
    }
}

impl DisplayHost for HeadlessHost {
    fn secondary_targets(&self) -> Vec<TargetInfo> {
        self.targets.clone()
    }

    fn target_size(&self, id: TargetId) -> Option<(u32, u32)> {
        self.targets.iter().find(|t| t.id == id).map(|t| (t.width, t.height))
    }

    fn register_target_listener(&mut self, events: Sender<TargetEvent>) {
        self.listener = Some(events);
    }

    fn unregister_target_listener(&mut self) {
        self.listener = None;
    }

    fn attach_surface(&mut self, placement: Placement, preferred: (u32, u32)) -> Result<(u32, u32), DisplayError> {
        let size = match placement {
            Placement::Primary => {
                if preferred.0 == 0 || preferred.1 == 0 {
                    return Err(DisplayError::InvalidConfiguration(format!(
                        "overlay size {}x{}",
                        preferred.0, preferred.1
                    )));
                }
                // the overlay never covers more than the screen minus margins
                let max_w = self.screen.0.saturating_sub(2 * OVERLAY_MARGIN);
                let max_h = self.screen.1.saturating_sub(2 * OVERLAY_MARGIN);
                (MeasureSpec::AtMost(max_w).resolve(preferred.0), MeasureSpec::AtMost(max_h).resolve(preferred.1))
            }
            Placement::Secondary(id) => self.target_size(id).ok_or(DisplayError::TargetUnavailable(id))?,
        };
        debug!("{} attached at {}x{}", placement, size.0, size.1);
        self.boxes.insert(placement, size);
        Ok(size)
    }

    fn detach_surface(&mut self, placement: Placement) {
        if self.boxes.remove(&placement).is_some() {
            debug!("{} detached", placement);
        }
        self.frames.remove(&placement);
    }

    fn present(&mut self, placement: Placement, frame: &SurfaceFrame) {
        if !self.boxes.contains_key(&placement) {
            trace!("dropping frame for detached {}", placement);
            return;
        }
        self.presented += 1;
        self.frames.insert(placement, frame.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;

    #[test]
    fn test_primary_box_is_clamped() {
        let mut host = HeadlessHost::new(200, 100);
        assert_eq!(host.attach_surface(Placement::Primary, (192, 128)).unwrap(), (168, 68));
        assert_eq!(host.overlay_origin(168, 68), (16, 16));
        assert!(matches!(
            host.attach_surface(Placement::Primary, (0, 0)),
            Err(DisplayError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_plug_and_unplug() {
        let mut host = HeadlessHost::new(640, 480);
        let (tx, rx) = channel();
        host.register_target_listener(tx);

        let id = host.plug_target("hdmi", 1280, 720);
        assert_eq!(host.attach_surface(Placement::Secondary(id), (1, 1)).unwrap(), (1280, 720));
        assert!(host.unplug_target(id));
        assert!(!host.unplug_target(id));
        assert!(!host.is_attached(Placement::Secondary(id)));

        assert_eq!(rx.try_recv().unwrap(), TargetEvent::Added(id));
        assert_eq!(rx.try_recv().unwrap(), TargetEvent::Removed(id));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_present_requires_attach() {
        let mut host = HeadlessHost::new(640, 480);
        let frame = SurfaceFrame::new(4, 4);
        host.present(Placement::Primary, &frame);
        assert_eq!(host.presented(), 0);

        host.attach_surface(Placement::Primary, (4, 4)).unwrap();
        host.present(Placement::Primary, &frame);
        assert_eq!(host.frame(Placement::Primary), Some(&frame));
        host.detach_surface(Placement::Primary);
        assert!(host.frame(Placement::Primary).is_none());
    }
}
