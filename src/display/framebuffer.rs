/*
 *  display/framebuffer.rs
 *
 *  vmu-screen - second screen for the VMU
 *  (c) 2020-26 Stuart Hunter
 *
 *  Raw LCD samples, the two-color LCD image and the scaled RGBA surface
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

use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;

use crate::constants::{LCD_HEIGHT, LCD_PIXELS, LCD_WIDTH};
use crate::display::color::{Palette, Rgb};

/// One LCD frame as exported by the core: 48x32 packed samples
///
/// Each sample is `0xAABBGGRR`-style packed color; only the three low
/// channel bytes matter, alpha is always opaque.
#[derive(Clone, PartialEq, Eq)]
pub struct RawFrame {
    samples: [u32; LCD_PIXELS],
}

impl RawFrame {
    pub fn new() -> Self {
        Self { samples: [0; LCD_PIXELS] }
    }

    /// Frame with every sample set to `sample`
    pub fn filled(sample: u32) -> Self {
        Self { samples: [sample; LCD_PIXELS] }
    }

    #[inline]
    pub fn as_slice(&self) -> &[u32] {
        &self.samples
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u32] {
        &mut self.samples
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u32 {
        self.samples[y * LCD_WIDTH + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, sample: u32) {
        self.samples[y * LCD_WIDTH + x] = sample;
    }
}

impl Default for RawFrame {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lit = self.samples.iter().filter(|s| crate::display::color::is_lit(**s)).count();
        f.debug_struct("RawFrame").field("lit", &lit).finish()
    }
}

/// The recolored 48x32 image: every pixel is either the on or the off color
#[derive(Clone, PartialEq, Eq)]
pub struct LcdImage {
    pixels: [Rgb; LCD_PIXELS],
}

impl LcdImage {
    /// Uniform image, used on disconnect/disable
    pub fn filled(color: Rgb) -> Self {
        Self { pixels: [color; LCD_PIXELS] }
    }

    /// Apply the threshold law to every sample of `raw`
    pub fn from_raw(raw: &RawFrame, palette: &Palette) -> Self {
        let mut pixels = [palette.off; LCD_PIXELS];
        for (dst, &sample) in pixels.iter_mut().zip(raw.as_slice()) {
            *dst = palette.map(sample);
        }
        Self { pixels }
    }

    #[inline]
    pub fn get_pixel(&self, x: usize, y: usize) -> Rgb {
        self.pixels[y * LCD_WIDTH + x]
    }

    pub fn as_slice(&self) -> &[Rgb] {
        &self.pixels
    }

    pub fn count(&self, color: Rgb) -> usize {
        self.pixels.iter().filter(|&&p| p == color).count()
    }
}

impl std::fmt::Debug for LcdImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LcdImage").field("first", &self.pixels[0]).finish()
    }
}

/// Sampling mode used when scaling the LCD image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Filter {
    Nearest,
    Smooth,
}

/// Placement of the scaled image inside a `SurfaceFrame`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Bytes needed for a `width` x `height` RGBA buffer
#[inline]
fn rgba_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 4
}

/// Byte offset of pixel `(x, y)` in a row-major RGBA buffer
#[inline]
fn rgba_index(stride: u32, x: u32, y: u32) -> usize {
    (y as usize * stride as usize + x as usize) * 4
}

/// RGBA output of a render surface, sized to whatever box the host allotted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceFrame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl SurfaceFrame {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; rgba_len(width, height)],
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if (width, height) != (self.width, self.height) {
            self.width = width;
            self.height = height;
            self.data = vec![0; rgba_len(width, height)];
        }
    }

    /// RGBA bytes, row-major
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = rgba_index(self.width, x, y);
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.data[idx..idx + 4]);
        Some(px)
    }

    #[inline]
    fn put(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let idx = rgba_index(self.width, x, y);
        self.data[idx..idx + 4].copy_from_slice(&rgba);
    }

    pub fn fill(&mut self, color: Rgb) {
        let rgba = color.to_rgba();
        for px in self.data.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }

    /// Largest box with the LCD aspect ratio that fits, centered
    pub fn fit_viewport(&self) -> Viewport {
        let (w, h) = (self.width as u64, self.height as u64);
        // compare w/48 against h/32 without floats
        let (width, height) = if w * LCD_HEIGHT as u64 <= h * LCD_WIDTH as u64 {
            (w, w * LCD_HEIGHT as u64 / LCD_WIDTH as u64)
        } else {
            (h * LCD_WIDTH as u64 / LCD_HEIGHT as u64, h)
        };
        Viewport {
            x: ((w - width) / 2) as u32,
            y: ((h - height) / 2) as u32,
            width: width as u32,
            height: height as u32,
        }
    }

    /// Scale `image` into `view`; pixels outside `view` are untouched
    pub fn blit(&mut self, image: &LcdImage, view: Viewport, filter: Filter) {
        if view.width == 0 || view.height == 0 {
            return;
        }
        let x_end = (view.x + view.width).min(self.width);
        let y_end = (view.y + view.height).min(self.height);

        for dy in view.y..y_end {
            let ly = dy - view.y;
            for dx in view.x..x_end {
                let lx = dx - view.x;
                let color = match filter {
                    Filter::Nearest => sample_nearest(image, lx, ly, view),
                    Filter::Smooth => sample_bilinear(image, lx, ly, view),
                };
                self.put(dx, dy, color.to_rgba());
            }
        }
    }
}

#[inline]
fn sample_nearest(image: &LcdImage, x: u32, y: u32, view: Viewport) -> Rgb {
    let sx = (x as usize * LCD_WIDTH / view.width as usize).min(LCD_WIDTH - 1);
    let sy = (y as usize * LCD_HEIGHT / view.height as usize).min(LCD_HEIGHT - 1);
    image.get_pixel(sx, sy)
}

fn sample_bilinear(image: &LcdImage, x: u32, y: u32, view: Viewport) -> Rgb {
    // pixel centers, clamped to the image edge
    let fx = ((x as f32 + 0.5) * LCD_WIDTH as f32 / view.width as f32 - 0.5)
        .clamp(0.0, (LCD_WIDTH - 1) as f32);
    let fy = ((y as f32 + 0.5) * LCD_HEIGHT as f32 / view.height as f32 - 0.5)
        .clamp(0.0, (LCD_HEIGHT - 1) as f32);

    let x0 = fx.floor() as usize;
    let y0 = fy.floor() as usize;
    let x1 = (x0 + 1).min(LCD_WIDTH - 1);
    let y1 = (y0 + 1).min(LCD_HEIGHT - 1);
    let tx = fx - x0 as f32;
    let ty = fy - y0 as f32;

    let top = image.get_pixel(x0, y0).lerp(image.get_pixel(x1, y0), tx);
    let bottom = image.get_pixel(x0, y1).lerp(image.get_pixel(x1, y1), tx);
    top.lerp(bottom, ty)
}

impl DrawTarget for SurfaceFrame {
    type Color = Rgb888;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if point.x < 0 || point.y < 0 {
                continue;
            }
            let (x, y) = (point.x as u32, point.y as u32);
            if x < self.width && y < self.height {
                self.put(x, y, [color.r(), color.g(), color.b(), 0xFF]);
            }
        }
        Ok(())
    }
}

impl OriginDimensions for SurfaceFrame {
    fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}
