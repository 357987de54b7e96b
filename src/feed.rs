/*
 *  feed.rs
 *
 *  vmu-screen - second screen for the VMU
 *  (c) 2020-26 Stuart Hunter
 *
 *  Stand-in for the emulation thread: draws a little clock scene into
 *  the bridge for a few VMU slots
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

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Local;
use embedded_graphics::mono_font::{ascii::FONT_6X10, MonoTextStyle};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{PrimitiveStyle, Rectangle};
use embedded_graphics::text::{Baseline, Text};
use log::{debug, info};

use crate::bridge::VmuBridge;
use crate::constants::{LCD_HEIGHT, LCD_WIDTH};
use crate::display::framebuffer::RawFrame;
use crate::display::traits::InstanceId;

const LIT: u32 = 0xFFFF_FFFF;
const UNLIT: u32 = 0xFF00_0000;

/// Raw LCD frame as a monochrome draw target
struct LcdCanvas<'a>(&'a mut RawFrame);

impl DrawTarget for LcdCanvas<'_> {
    type Color = BinaryColor;
    type Error = core::convert::Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if (0..LCD_WIDTH as i32).contains(&point.x) && (0..LCD_HEIGHT as i32).contains(&point.y) {
                let sample = if color.is_on() { LIT } else { UNLIT };
                self.0.set(point.x as usize, point.y as usize, sample);
            }
        }
        Ok(())
    }
}

impl OriginDimensions for LcdCanvas<'_> {
    fn size(&self) -> Size {
        Size::new(LCD_WIDTH as u32, LCD_HEIGHT as u32)
    }
}

/// One frame of the demo scene: time on top, slot label, a bouncing block
pub fn demo_frame(instance: InstanceId, clock: &str, step: u64) -> RawFrame {
    let mut raw = RawFrame::filled(UNLIT);
    let mut canvas = LcdCanvas(&mut raw);
    let style = MonoTextStyle::new(&FONT_6X10, BinaryColor::On);

    let _ = Text::with_baseline(clock, Point::new(0, 0), style, Baseline::Top).draw(&mut canvas);
    let label = format!("VMU {}", instance);
    let _ = Text::with_baseline(&label, Point::new(0, 11), style, Baseline::Top).draw(&mut canvas);

    // block runs back and forth along the bottom
    let span = (LCD_WIDTH - 4) as u64;
    let pos = step % (2 * span);
    let x = if pos < span { pos } else { 2 * span - pos };
    let _ = Rectangle::new(Point::new(x as i32, 26), Size::new(4, 4))
        .into_styled(PrimitiveStyle::with_fill(BinaryColor::On))
        .draw(&mut canvas);
    raw
}

/// Background writer feeding the bridge at a fixed period
pub struct DemoFeed {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl DemoFeed {
    /// Connect `instances` and start writing frames every `period`
    pub fn spawn(bridge: Arc<VmuBridge>, instances: Vec<InstanceId>, period: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);

        let handle = thread::spawn(move || {
            info!("demo feed running for VMU {:?}", instances);
            for &id in &instances {
                bridge.on_connection_change(id, true);
            }
            let started = Instant::now();
            let mut step = 0u64;
            while !flag.load(Ordering::Acquire) {
                let clock = Local::now().format("%H:%M:%S").to_string();
                let timestamp = started.elapsed().as_millis() as u64;
                for &id in &instances {
                    let frame = demo_frame(id, &clock, step);
                    bridge.on_display_update(id, frame.as_slice(), timestamp);
                }
                step += 1;
                thread::sleep(period);
            }
            for &id in &instances {
                bridge.on_connection_change(id, false);
            }
            debug!("demo feed stopped after {} frames", step);
        });

        Self { stop, handle: Some(handle) }
    }

    /// Stop writing and wait for the thread; safe to call twice
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DemoFeed {
    fn drop(&mut self) {
        self.stop();
    }
}
