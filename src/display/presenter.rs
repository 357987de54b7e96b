/*
 *  display/presenter.rs
 *
 *  vmu-screen - second screen for the VMU
 *  (c) 2020-26 Stuart Hunter
 *
 *  Full-screen presentation of the LCD on a secondary target
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

use log::info;

use crate::config::VmuConfig;
use crate::constants::{LCD_HEIGHT, LCD_WIDTH, SECONDARY_MARGIN_DEN, SECONDARY_MARGIN_NUM};
use crate::display::surface::{ContentLayout, RenderSurface};
use crate::display::traits::{PixelSource, TargetId, TargetInfo};

/// Largest integer scale that keeps the LCD within 90% of the target, at least 1
pub fn compute_scale(width: u32, height: u32) -> u32 {
    let by_width = width as u64 * SECONDARY_MARGIN_NUM / (SECONDARY_MARGIN_DEN * LCD_WIDTH as u64);
    let by_height = height as u64 * SECONDARY_MARGIN_NUM / (SECONDARY_MARGIN_DEN * LCD_HEIGHT as u64);
    by_width.min(by_height).max(1) as u32
}

/// Owns the surface shown on one secondary target
///
/// The surface runs at an integer scale derived from the target size,
/// overriding the configured scale; the LCD is centered and the rest of the
/// target is filled with the off color.
pub struct SecondaryPresenter {
    target: TargetInfo,
    config: VmuConfig,
    scale: u32,
    surface: RenderSurface,
    shown: bool,
}

impl SecondaryPresenter {
    pub fn new(target: TargetInfo, source: Arc<dyn PixelSource>, config: VmuConfig) -> Self {
        let scale = compute_scale(target.width, target.height);
        let surface = RenderSurface::new(source, config.clone().with_scale(scale as f32))
            .with_layout(Self::layout(scale));
        Self { target, config, scale, surface, shown: false }
    }

    fn layout(scale: u32) -> ContentLayout {
        ContentLayout::Centered(LCD_WIDTH as u32 * scale, LCD_HEIGHT as u32 * scale)
    }

    pub fn target_id(&self) -> TargetId {
        self.target.id
    }

    pub fn target(&self) -> &TargetInfo {
        &self.target
    }

    #[inline]
    pub fn scale(&self) -> u32 {
        self.scale
    }

    pub fn is_shown(&self) -> bool {
        self.shown
    }

    pub fn surface(&self) -> &RenderSurface {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut RenderSurface {
        &mut self.surface
    }

    /// Fill the target and start ticking
    pub fn show(&mut self, now: Instant) {
        if self.shown {
            return;
        }
        self.surface.set_allotted_size(self.target.width, self.target.height);
        self.surface.start(now);
        self.shown = true;
        info!("{}", self.display_info());
    }

    /// Tear the surface down; the presenter cannot be shown again
    pub fn dismiss(&mut self) {
        if self.shown {
            info!("dismissing VMU presentation on {}", self.target.name);
        }
        self.shown = false;
        self.surface.teardown();
    }

    /// Target changed size: new scale, new layout
    pub fn on_target_resized(&mut self, width: u32, height: u32) {
        self.target.width = width;
        self.target.height = height;
        self.scale = compute_scale(width, height);
        self.surface.set_config(self.config.clone().with_scale(self.scale as f32));
        self.surface.set_layout(Self::layout(self.scale));
        self.surface.set_allotted_size(width, height);
    }

    /// Palette, filter and rate changes; the scale stays target-derived
    pub fn update_config(&mut self, config: VmuConfig) {
        self.surface.set_config(config.clone().with_scale(self.scale as f32));
        self.config = config;
    }

    pub fn display_info(&self) -> String {
        format!(
            "VMU on {} ({}x{}) at {}x scale ({}x{})",
            self.target.name,
            self.target.width,
            self.target.height,
            self.scale,
            LCD_WIDTH as u32 * self.scale,
            LCD_HEIGHT as u32 * self.scale,
        )
    }
}
