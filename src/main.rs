/*
 *  main.rs
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

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use env_logger::Env;
use log::{info, warn};

use vmu_screen::bridge::VmuBridge;
use vmu_screen::config::{self, Settings};
use vmu_screen::display::drivers::headless::HeadlessHost;
use vmu_screen::display::DisplayRouter;
use vmu_screen::feed::DemoFeed;

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

/// Slots the simulated emulator writes to
const DEMO_INSTANCES: [usize; 2] = [0, 1];
const FEED_PERIOD: Duration = Duration::from_millis(50);
/// Main screen of the headless host
const HEADLESS_SCREEN: (u32, u32) = (1280, 720);

fn main() -> Result<()> {
    let settings = config::load()?;

    if settings.dump_config {
        print!("{}", settings.to_yaml()?);
        return Ok(());
    }

    env_logger::Builder::from_env(Env::default().default_filter_or(settings.log_level.as_str()))
        .format_timestamp_secs()
        .init();

    info!("{} - second screen for the VMU", env!("CARGO_PKG_NAME"));
    info!("v.{} built {}", env!("CARGO_PKG_VERSION"), BUILD_DATE);

    if !settings.display.enabled {
        warn!("VMU display is disabled, pass --enabled true to show it");
    }

    let bridge = Arc::new(VmuBridge::new());

    if settings.window {
        return run_window(&settings, bridge);
    }
    run_headless(&settings, bridge)
}

/// Pump a headless router for `--frames` frames, plugging a monitor a third
/// of the way in and pulling it at two thirds.
fn run_headless(settings: &Settings, bridge: Arc<VmuBridge>) -> Result<()> {
    let host = HeadlessHost::new(HEADLESS_SCREEN.0, HEADLESS_SCREEN.1);
    // router init must come first, the bridge drops writes until then
    let mut router = DisplayRouter::new(bridge.clone(), host, settings.display.clone());
    let mut feed = DemoFeed::spawn(bridge, DEMO_INSTANCES.to_vec(), FEED_PERIOD);

    router.start();
    let plug_at = settings.frames / 3;
    let unplug_at = 2 * settings.frames / 3;
    let frame_time = settings.display.update_interval();
    let mut monitor = None;
    let mut route = router.state();
    info!("route: {}", route);

    for frame in 0..settings.frames {
        if frame == plug_at {
            monitor = Some(router.host_mut().plug_target("hdmi", 1920, 1080));
        }
        if frame == unplug_at {
            if let Some(id) = monitor.take() {
                router.host_mut().unplug_target(id);
            }
        }

        router.pump(Instant::now());

        if router.state() != route {
            info!("route: {} -> {}", route, router.state());
            route = router.state();
        }
        thread::sleep(frame_time);
    }

    info!("{} frames presented", router.host().presented());
    router.release();
    feed.stop();
    Ok(())
}

#[cfg(feature = "emulator")]
fn run_window(settings: &Settings, bridge: Arc<VmuBridge>) -> Result<()> {
    use vmu_screen::display::color::ColorPreset;
    use vmu_screen::display::drivers::emulator::EmulatorHost;
    use vmu_screen::display::emulator_window::EmulatorWindow;

    let router = DisplayRouter::new(bridge.clone(), EmulatorHost::new(), settings.display.clone());
    let _feed = DemoFeed::spawn(bridge, DEMO_INSTANCES.to_vec(), FEED_PERIOD);

    EmulatorWindow::new(router, ColorPreset::default())
        .run()
        .map_err(|e| anyhow::anyhow!("emulator window failed: {}", e))
}

#[cfg(not(feature = "emulator"))]
fn run_window(_settings: &Settings, _bridge: Arc<VmuBridge>) -> Result<()> {
    anyhow::bail!("--window requires the 'emulator' feature (cargo run --features emulator)")
}
