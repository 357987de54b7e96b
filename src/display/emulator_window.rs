/*
 *  display/emulator_window.rs
 *
 *  vmu-screen - second screen for the VMU
 *  (c) 2020-26 Stuart Hunter
 *
 *  Emulator window management
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

use std::time::Instant;

use log::{error, info};
use pixels::{Pixels, SurfaceTexture};
use winit::{
    dpi::PhysicalSize,
    event::{Event, VirtualKeyCode, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    window::WindowBuilder,
};
use winit_input_helper::WinitInputHelper;

use crate::config::VmuConfig;
use crate::display::color::ColorPreset;
use crate::display::drivers::emulator::EmulatorHost;
use crate::display::router::DisplayRouter;
use crate::display::surface::TouchPhase;
use crate::display::traits::Placement;

/// Desktop window around a router driving an `EmulatorHost`
pub struct EmulatorWindow {
    router: DisplayRouter<EmulatorHost>,
    preset: ColorPreset,
    /// surface and last position of the pointer-down, gets the matching up
    pressed_on: Option<(Placement, f32, f32)>,
}

impl EmulatorWindow {
    pub fn new(router: DisplayRouter<EmulatorHost>, preset: ColorPreset) -> Self {
        Self { router, preset, pressed_on: None }
    }

    fn title(&self) -> String {
        format!(
            "vmu-screen - {} - {}{}",
            self.router.state(),
            if self.router.has_secondary_target() { "monitor plugged" } else { "no monitor" },
            if self.router.config().prefer_secondary { " (prefer secondary)" } else { "" },
        )
    }

    fn update_config(&mut self, edit: impl FnOnce(&mut VmuConfig)) {
        let mut config = self.router.config().clone();
        edit(&mut config);
        self.router.set_config(config);
    }

    /// Run the event loop; returns only on error
    pub fn run(mut self) -> Result<(), Box<dyn std::error::Error>> {
        let (width, height) = EmulatorHost::canvas_size();
        let event_loop = EventLoop::new();
        let mut input = WinitInputHelper::new();

        // Use PhysicalSize to avoid Wayland DPI scaling issues
        let window = WindowBuilder::new()
            .with_title(self.title())
            .with_inner_size(PhysicalSize::new(width, height))
            .with_resizable(false)
            .build(&event_loop)?;

        let window_size = window.inner_size();
        let surface_texture = SurfaceTexture::new(window_size.width, window_size.height, &window);
        let mut pixels = Pixels::new(width, height, surface_texture)?;

        info!("emulator window {}x{}", width, height);
        info!("  N plug monitor    D unplug monitor");
        info!("  S prefer secondary  P next preset  O touch overlay  E enable");
        info!("  ESC / Q quit");

        self.router.start();

        event_loop.run(move |event, _, control_flow| {
            *control_flow = ControlFlow::Poll;

            if let Event::RedrawRequested(_) = event {
                self.router.host().compose(pixels.frame_mut());
                if let Err(err) = pixels.render() {
                    error!("pixels.render() failed: {}", err);
                    self.router.release();
                    *control_flow = ControlFlow::Exit;
                    return;
                }
            }

            if let Event::WindowEvent { event: WindowEvent::CloseRequested, .. } = &event {
                self.router.release();
                *control_flow = ControlFlow::Exit;
                return;
            }

            if input.update(&event) {
                if input.key_pressed(VirtualKeyCode::Escape) || input.key_pressed(VirtualKeyCode::Q) {
                    self.router.release();
                    *control_flow = ControlFlow::Exit;
                    return;
                }

                if input.key_pressed(VirtualKeyCode::N) && self.router.host_mut().plug_monitor().is_none() {
                    info!("monitor already plugged");
                }
                if input.key_pressed(VirtualKeyCode::D) && !self.router.host_mut().unplug_monitor() {
                    info!("no monitor to unplug");
                }
                if input.key_pressed(VirtualKeyCode::S) {
                    self.update_config(|c| c.prefer_secondary = !c.prefer_secondary);
                }
                if input.key_pressed(VirtualKeyCode::P) {
                    self.preset = self.preset.next();
                    let preset = self.preset;
                    info!("color preset {:?}", preset);
                    self.update_config(|c| *c = c.clone().with_preset(preset));
                }
                if input.key_pressed(VirtualKeyCode::O) {
                    self.update_config(|c| c.show_button_overlay = !c.show_button_overlay);
                }
                if input.key_pressed(VirtualKeyCode::E) {
                    self.update_config(|c| c.enabled = !c.enabled);
                }

                self.handle_mouse(&input, &pixels);
                window.set_title(&self.title());
            }

            self.router.pump(Instant::now());
            window.request_redraw();
        });
    }

    fn handle_mouse(&mut self, input: &WinitInputHelper, pixels: &Pixels) {
        let phase = if input.mouse_pressed(0) {
            TouchPhase::Down
        } else if input.mouse_released(0) {
            TouchPhase::Up
        } else if input.mouse_held(0) {
            TouchPhase::Move
        } else {
            return;
        };

        let hit = input
            .mouse()
            .and_then(|pos| pixels.window_pos_to_pixel(pos).ok())
            .and_then(|(x, y)| self.router.host().hit_test(x as u32, y as u32));

        match (phase, hit) {
            (TouchPhase::Down, Some((placement, x, y))) => {
                self.pressed_on = Some((placement, x, y));
                self.router.touch(placement, x, y, TouchPhase::Down);
            }
            (TouchPhase::Move, Some((placement, x, y))) => {
                if let Some((p, _, _)) = self.pressed_on {
                    if p == placement {
                        self.pressed_on = Some((placement, x, y));
                        self.router.touch(placement, x, y, TouchPhase::Move);
                    }
                }
            }
            (TouchPhase::Up, hit) => {
                if let Some((placement, last_x, last_y)) = self.pressed_on.take() {
                    match hit {
                        Some((p, x, y)) if p == placement => {
                            self.router.touch(placement, x, y, TouchPhase::Up);
                        }
                        // released outside: cancel where the pointer last was
                        _ => {
                            self.router.touch(placement, last_x, last_y, TouchPhase::Cancel);
                        }
                    }
                }
            }
            _ => {}
        }
    }
}
