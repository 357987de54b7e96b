/*
 *  display/acquirer.rs
 *
 *  vmu-screen - second screen for the VMU
 *  (c) 2020-26 Stuart Hunter
 *
 *  Polls the pixel source and keeps the recolored LCD image
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

use std::sync::Arc;

use arrayvec::ArrayVec;
use log::{debug, info, trace};

use crate::config::VmuConfig;
use crate::constants::MAX_INSTANCES;
use crate::display::framebuffer::{LcdImage, RawFrame};
use crate::display::traits::{DisplayListener, InstanceId, PixelSource};

/// What a single tick observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquirerEvent {
    /// A different instance became the active one
    Connected(InstanceId),
    /// No instance is active any more
    Disconnected,
    /// A fresh frame was copied and recolored
    Updated(InstanceId),
}

impl AcquirerEvent {
    /// Forward to a listener
    pub fn dispatch(self, listener: &mut dyn DisplayListener) {
        match self {
            AcquirerEvent::Connected(id) => listener.on_connected(id),
            AcquirerEvent::Disconnected => listener.on_disconnected(),
            AcquirerEvent::Updated(id) => listener.on_updated(id),
        }
    }

    /// Events after which the rendered image differs
    pub fn changes_image(self) -> bool {
        matches!(self, AcquirerEvent::Disconnected | AcquirerEvent::Updated(_))
    }
}

/// A tick emits at most a connect plus an update
pub type TickEvents = ArrayVec<AcquirerEvent, 2>;

/// Last frame of a surface being replaced, and the instance it came from
pub type Handover = (InstanceId, RawFrame);

/// The instance to display for `config`, or `None` when nothing is active
///
/// An explicit selection wins only while that instance is active; otherwise
/// the lowest-numbered active instance is used.
pub fn resolve_active_instance(source: &dyn PixelSource, config: &VmuConfig) -> Option<InstanceId> {
    if let Some(id) = config.selected() {
        if source.is_active(id) {
            return Some(id);
        }
    }
    (0..MAX_INSTANCES).find(|&id| source.is_active(id))
}

/// Turns the source's raw frames into a two-color image, one tick at a time
pub struct FrameAcquirer {
    source: Arc<dyn PixelSource>,
    config: VmuConfig,
    active: Option<InstanceId>,
    /// last frame copied in full
    raw: Option<RawFrame>,
    /// copy target, only promoted to `raw` on success
    scratch: RawFrame,
    image: LcdImage,
    /// frame inherited from a torn-down surface, used once
    handover: Option<Handover>,
}

impl FrameAcquirer {
    pub fn new(source: Arc<dyn PixelSource>, config: VmuConfig) -> Self {
        let image = LcdImage::filled(config.off_color);
        Self {
            source,
            config,
            active: None,
            raw: None,
            scratch: RawFrame::new(),
            image,
            handover: None,
        }
    }

    pub fn config(&self) -> &VmuConfig {
        &self.config
    }

    pub fn source(&self) -> &Arc<dyn PixelSource> {
        &self.source
    }

    #[inline]
    pub fn active_instance(&self) -> Option<InstanceId> {
        self.active
    }

    /// The image the surface should draw
    #[inline]
    pub fn image(&self) -> &LcdImage {
        &self.image
    }

    /// Most recent successfully copied frame, if any
    pub fn last_raw(&self) -> Option<&RawFrame> {
        self.raw.as_ref()
    }

    pub fn resolve_active_instance(&self) -> Option<InstanceId> {
        resolve_active_instance(self.source.as_ref(), &self.config)
    }

    /// What a successor surface needs to show the current frame at once
    pub fn handover(&self) -> Option<Handover> {
        Some((self.active?, self.raw.clone()?))
    }

    /// Inherit the frame of a previous surface
    ///
    /// The source's dirty flag was already consumed by the previous owner,
    /// so a static LCD would otherwise stay blank here until the core
    /// redraws. Only used if the same instance connects on the next tick.
    pub fn seed(&mut self, handover: Option<Handover>) {
        self.handover = handover;
    }

    /// One acquisition cycle
    ///
    /// A disabled config makes this a no-op. A newly resolved instance is
    /// reported first, then checked for a fresh frame in the same tick.
    pub fn tick(&mut self) -> TickEvents {
        let mut events = TickEvents::new();
        if !self.config.enabled {
            return events;
        }

        let Some(id) = self.resolve_active_instance() else {
            self.handover = None;
            if self.active.take().is_some() {
                info!("VMU disconnected");
                self.clear_to_off_color();
                events.push(AcquirerEvent::Disconnected);
            }
            return events;
        };

        if self.active != Some(id) {
            info!("VMU {} connected", id);
            self.active = Some(id);
            // the old frame belongs to another instance
            self.raw = None;
            events.push(AcquirerEvent::Connected(id));
        }

        let inherited = self
            .handover
            .take()
            .filter(|(from, _)| *from == id)
            .map(|(_, raw)| raw);

        if self.source.is_dirty(id) {
            match self.source.copy_framebuffer(id, &mut self.scratch) {
                Ok(()) => {
                    let raw = self.raw.get_or_insert_with(RawFrame::new);
                    std::mem::swap(raw, &mut self.scratch);
                }
                Err(e) => {
                    debug!("frame copy from VMU {} failed: {}", id, e);
                    let Some(raw) = inherited else {
                        return events;
                    };
                    self.raw = Some(raw);
                }
            }
        } else {
            let Some(raw) = inherited else {
                return events;
            };
            trace!("VMU {} showing inherited frame", id);
            self.raw = Some(raw);
        }

        if let Some(raw) = &self.raw {
            self.image = LcdImage::from_raw(raw, &self.config.palette());
            events.push(AcquirerEvent::Updated(id));
        }
        events
    }

    /// Run a cycle right now; same contract as `tick`
    pub fn force_update(&mut self) -> TickEvents {
        self.tick()
    }

    /// Reapply the current palette to the last copied frame
    ///
    /// The result equals what a fresh tick over the same raw frame would
    /// produce. Does nothing while no instance is active.
    pub fn recolor_current_image(&mut self) -> bool {
        match (self.active, &self.raw) {
            (Some(_), Some(raw)) => {
                self.image = LcdImage::from_raw(raw, &self.config.palette());
                true
            }
            _ => false,
        }
    }

    /// Blank the image and forget the last frame
    pub fn clear_to_off_color(&mut self) {
        self.raw = None;
        self.image = LcdImage::filled(self.config.off_color);
    }

    /// Swap in a new config; returns true if the image was recolored
    pub fn set_config(&mut self, config: VmuConfig) -> bool {
        let recolor = config.palette() != self.config.palette();
        self.config = config;
        recolor && self.recolor_current_image()
    }
}
