/*
 *  display/surface.rs
 *
 *  vmu-screen - second screen for the VMU
 *  (c) 2020-26 Stuart Hunter
 *
 *  Render surface: paces the acquirer, scales the LCD, maps touches
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
use std::time::Instant;

use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Line, PrimitiveStyle, Rectangle};
use log::{debug, trace};

use crate::config::VmuConfig;
use crate::constants::TOUCH_GRID;
use crate::display::acquirer::{FrameAcquirer, Handover, TickEvents};
use crate::display::framebuffer::{Filter, LcdImage, SurfaceFrame, Viewport};
use crate::display::traits::{DisplayListener, PixelSource, VmuButton};
use crate::pacer::TickPacer;

/// Layout constraint handed down by the host, one per axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasureSpec {
    /// Must be exactly this size
    Exactly(u32),
    /// Up to this size
    AtMost(u32),
    /// Whatever the surface wants
    Unspecified,
}

impl MeasureSpec {
    pub fn resolve(self, desired: u32) -> u32 {
        match self {
            MeasureSpec::Exactly(size) => size,
            MeasureSpec::AtMost(size) => desired.min(size),
            MeasureSpec::Unspecified => desired,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchPhase {
    Down,
    Move,
    Up,
    Cancel,
}

impl TouchPhase {
    fn pressed(self) -> bool {
        matches!(self, TouchPhase::Down | TouchPhase::Move)
    }
}

/// Where the scaled LCD sits inside the allotted box
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentLayout {
    /// Largest aspect-correct box that fits
    Fit,
    /// Exact size, centered; the rest is background
    Centered(u32, u32),
}

/// Button in each cell of the 3x3 touch grid, `(column, row)`
fn button_at(col: u32, row: u32) -> Option<VmuButton> {
    match (col, row) {
        (1, 0) => Some(VmuButton::Up),
        (1, 2) => Some(VmuButton::Down),
        (0, 1) => Some(VmuButton::Left),
        (2, 1) => Some(VmuButton::Right),
        (0, 2) => Some(VmuButton::A),
        (2, 2) => Some(VmuButton::B),
        _ => None,
    }
}

/// One visible instance of the LCD
///
/// Owns its acquirer and its tick schedule. The host tells it how big it
/// is; it renders into an RGBA frame of exactly that size.
pub struct RenderSurface {
    acquirer: FrameAcquirer,
    config: VmuConfig,
    pacer: TickPacer,
    layout: ContentLayout,
    frame: SurfaceFrame,
    listener: Option<Box<dyn DisplayListener>>,
    running: bool,
    released: bool,
    needs_render: bool,
}

impl RenderSurface {
    pub fn new(source: Arc<dyn PixelSource>, config: VmuConfig) -> Self {
        let pacer = TickPacer::new(config.update_interval());
        Self {
            acquirer: FrameAcquirer::new(source, config.clone()),
            config,
            pacer,
            layout: ContentLayout::Fit,
            frame: SurfaceFrame::new(0, 0),
            listener: None,
            running: false,
            released: false,
            needs_render: true,
        }
    }

    pub fn with_layout(mut self, layout: ContentLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn set_layout(&mut self, layout: ContentLayout) {
        if self.layout != layout {
            self.layout = layout;
            self.needs_render = true;
        }
    }

    pub fn set_listener(&mut self, listener: Box<dyn DisplayListener>) {
        self.listener = Some(listener);
    }

    pub fn config(&self) -> &VmuConfig {
        &self.config
    }

    pub fn acquirer(&self) -> &FrameAcquirer {
        &self.acquirer
    }

    pub fn image(&self) -> &LcdImage {
        self.acquirer.image()
    }

    pub fn frame(&self) -> &SurfaceFrame {
        &self.frame
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn pacer(&self) -> &TickPacer {
        &self.pacer
    }

    /// Size the surface asks for: the LCD times the scale factor
    pub fn preferred_size(&self) -> (u32, u32) {
        (self.config.scaled_width(), self.config.scaled_height())
    }

    pub fn measure(&self, width: MeasureSpec, height: MeasureSpec) -> (u32, u32) {
        let (w, h) = self.preferred_size();
        (width.resolve(w), height.resolve(h))
    }

    /// The box the host granted
    pub fn set_allotted_size(&mut self, width: u32, height: u32) {
        if self.frame.dimensions() != (width, height) {
            debug!("surface resized to {}x{}", width, height);
            self.frame.resize(width, height);
            self.needs_render = true;
        }
    }

    /// Hand the previous surface's frame to this one's acquirer
    pub fn seed(&mut self, handover: Option<Handover>) {
        self.acquirer.seed(handover);
    }

    /// Begin ticking; a second start while running is ignored
    pub fn start(&mut self, now: Instant) {
        if self.running || self.released {
            return;
        }
        self.running = true;
        self.pacer.schedule(now);
    }

    /// Cancel the pending tick; no tick fires after this returns
    pub fn stop(&mut self) {
        self.running = false;
        self.pacer.cancel();
    }

    /// Run the tick if one is due
    ///
    /// Returns true when the frame was re-rendered and should be presented.
    pub fn pump(&mut self, now: Instant) -> bool {
        if !self.running || !self.pacer.is_due(now) {
            return false;
        }
        let started = Instant::now();
        self.run_tick();
        self.pacer.reschedule(now + started.elapsed());
        self.render_if_needed()
    }

    /// Tick immediately, outside the schedule
    pub fn force_update(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.run_tick();
        self.render_if_needed()
    }

    fn run_tick(&mut self) -> TickEvents {
        let events = self.acquirer.tick();
        for event in events.iter().copied() {
            if event.changes_image() {
                self.needs_render = true;
            }
            if let Some(listener) = self.listener.as_deref_mut() {
                event.dispatch(listener);
            }
        }
        events
    }

    /// Render if anything changed since the last render
    pub fn render_if_needed(&mut self) -> bool {
        if !self.needs_render || self.released {
            return false;
        }
        self.render();
        true
    }

    fn viewport(&self) -> Viewport {
        let (fw, fh) = self.frame.dimensions();
        match self.layout {
            ContentLayout::Fit => self.frame.fit_viewport(),
            ContentLayout::Centered(w, h) => Viewport {
                x: fw.saturating_sub(w) / 2,
                y: fh.saturating_sub(h) / 2,
                width: w.min(fw),
                height: h.min(fh),
            },
        }
    }

    /// Draw the current LCD image into the frame
    pub fn render(&mut self) {
        let view = self.viewport();
        let filter = if self.config.use_nearest_neighbor { Filter::Nearest } else { Filter::Smooth };

        self.frame.fill(self.config.off_color);
        self.frame.blit(self.acquirer.image(), view, filter);
        if self.config.show_button_overlay {
            self.draw_overlay(view);
        }
        self.needs_render = false;
    }

    /// Faint outline of the touch grid
    fn draw_overlay(&mut self, view: Viewport) {
        let color: Rgb888 = self.config.off_color.lerp(self.config.on_color, 0.25).to_rgb888();
        let style = PrimitiveStyle::with_stroke(color, 1);
        let (x0, y0) = (view.x as i32, view.y as i32);
        let (w, h) = (view.width as i32, view.height as i32);
        let grid = TOUCH_GRID as i32;

        let _ = Rectangle::new(Point::new(x0, y0), Size::new(view.width, view.height))
            .into_styled(style)
            .draw(&mut self.frame);
        for i in 1..grid {
            let x = x0 + w * i / grid;
            let y = y0 + h * i / grid;
            let _ = Line::new(Point::new(x, y0), Point::new(x, y0 + h - 1))
                .into_styled(style)
                .draw(&mut self.frame);
            let _ = Line::new(Point::new(x0, y), Point::new(x0 + w - 1, y))
                .into_styled(style)
                .draw(&mut self.frame);
        }
    }

    /// Map a touch inside the surface to a VMU button
    ///
    /// Returns true if the touch was consumed. Touches are ignored while
    /// the overlay is off or no instance is active.
    pub fn handle_touch(&mut self, x: f32, y: f32, phase: TouchPhase) -> bool {
        if !self.config.show_button_overlay {
            return false;
        }
        let Some(id) = self.acquirer.active_instance() else {
            return true;
        };
        let (w, h) = self.frame.dimensions();
        if w == 0 || h == 0 || x < 0.0 || y < 0.0 {
            return true;
        }

        let col = (x / w as f32 * TOUCH_GRID as f32) as u32;
        let row = (y / h as f32 * TOUCH_GRID as f32) as u32;
        if let Some(button) = button_at(col, row) {
            trace!("touch {:?} at ({}, {}) -> {:?}", phase, col, row, button);
            self.acquirer.source().send_button(id, button, phase.pressed());
        }
        true
    }

    /// Apply a new config in place: palette, scale, filter and rate
    pub fn set_config(&mut self, config: VmuConfig) {
        self.pacer.set_interval(config.update_interval());
        self.acquirer.set_config(config.clone());
        self.config = config;
        self.needs_render = true;
    }

    /// Stop ticking and drop the frame; safe to call more than once
    pub fn teardown(&mut self) {
        if self.released {
            return;
        }
        self.stop();
        self.listener = None;
        self.frame = SurfaceFrame::new(0, 0);
        self.released = true;
    }
}

impl Drop for RenderSurface {
    fn drop(&mut self) {
        self.teardown();
    }
}
