/*
 *  tests/display_integration.rs
 *
 *  Integration tests for the VMU display pipeline
 *
 *  vmu-screen - second screen for the VMU
 *  (c) 2020-26 Stuart Hunter
 */

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use vmu_screen::bridge::VmuBridge;
use vmu_screen::config::VmuConfig;
use vmu_screen::constants::{LCD_HEIGHT, LCD_PIXELS, LCD_WIDTH};
use vmu_screen::display::drivers::headless::HeadlessHost;
use vmu_screen::display::drivers::mock::{MockHost, MockPixelSource};
use vmu_screen::display::{
    AcquirerEvent, ColorPreset, DisplayListener, DisplayRouter, FrameAcquirer, InstanceId, Placement,
    RawFrame, RenderSurface, RouteState, TouchPhase, VmuButton,
};

const LIT: u32 = 0xFFFF_FFFF;
const UNLIT: u32 = 0xFF00_0000;

fn enabled() -> VmuConfig {
    VmuConfig { enabled: true, ..VmuConfig::default() }
}

/// Left half lit, right half dark
fn half_lit() -> RawFrame {
    let mut raw = RawFrame::filled(UNLIT);
    for y in 0..LCD_HEIGHT {
        for x in 0..LCD_WIDTH / 2 {
            raw.set(x, y, LIT);
        }
    }
    raw
}

/// `n` seconds after `t0`, far past any tick interval
fn at(t0: Instant, n: u64) -> Instant {
    t0 + Duration::from_secs(n)
}

#[derive(Default)]
struct Counts {
    connected: Vec<InstanceId>,
    disconnected: usize,
    updated: usize,
}

struct CountingListener(Arc<Mutex<Counts>>);

impl DisplayListener for CountingListener {
    fn on_connected(&mut self, id: InstanceId) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).connected.push(id);
    }

    fn on_disconnected(&mut self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).disconnected += 1;
    }

    fn on_updated(&mut self, _id: InstanceId) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).updated += 1;
    }
}

#[test]
fn test_disabled_config_touches_nothing() {
    let source = MockPixelSource::new();
    source.push_frame(0, half_lit());
    let mut acq = FrameAcquirer::new(Arc::new(source.clone()), VmuConfig::default());

    for _ in 0..3 {
        assert!(acq.tick().is_empty());
    }
    let state = source.state();
    assert_eq!(state.dirty_queries, 0);
    assert_eq!(state.copies, 0);
    assert!(acq.active_instance().is_none());
}

#[test]
fn test_auto_select_picks_lowest_active() {
    let source = MockPixelSource::new();
    source.set_active(5, true);
    source.set_active(2, true);

    let acq = FrameAcquirer::new(Arc::new(source.clone()), enabled());
    assert_eq!(acq.resolve_active_instance(), Some(2));

    // an inactive explicit choice falls back to the scan
    let cfg = VmuConfig { selected_instance: 6, ..enabled() };
    let acq = FrameAcquirer::new(Arc::new(source.clone()), cfg);
    assert_eq!(acq.resolve_active_instance(), Some(2));

    let cfg = VmuConfig { selected_instance: 5, ..enabled() };
    let acq = FrameAcquirer::new(Arc::new(source), cfg);
    assert_eq!(acq.resolve_active_instance(), Some(5));
}

#[test]
fn test_clean_frame_is_not_copied() {
    let source = MockPixelSource::new();
    source.push_frame(0, half_lit());
    let mut acq = FrameAcquirer::new(Arc::new(source.clone()), enabled());

    assert_eq!(acq.tick().as_slice(), &[AcquirerEvent::Connected(0), AcquirerEvent::Updated(0)]);
    assert!(acq.tick().is_empty());
    assert!(acq.tick().is_empty());
    assert_eq!(source.state().copies, 1);
}

#[test]
fn test_threshold_is_strict_and_ignores_alpha() {
    let source = MockPixelSource::new();
    let mut raw = RawFrame::filled(UNLIT);
    raw.set(0, 0, 0xFF80_8080); // sum 384
    raw.set(1, 0, 0x0080_8081); // sum 385, alpha zero
    raw.set(2, 0, 0xFF00_00FF); // sum 255
    source.push_frame(1, raw);

    let palette = ColorPreset::HighContrast.palette();
    let cfg = enabled().with_preset(ColorPreset::HighContrast);
    let mut acq = FrameAcquirer::new(Arc::new(source), cfg);
    acq.tick();
    acq.tick();

    let image = acq.image();
    assert_eq!(image.get_pixel(0, 0), palette.off);
    assert_eq!(image.get_pixel(1, 0), palette.on);
    assert_eq!(image.get_pixel(2, 0), palette.off);
    assert_eq!(image.count(palette.on), 1);
}

#[test]
fn test_recolor_matches_fresh_cycle() {
    let source = MockPixelSource::new();
    source.push_frame(0, half_lit());
    let mut recolored = FrameAcquirer::new(Arc::new(source.clone()), enabled());
    recolored.tick();
    recolored.tick();
    assert!(recolored.set_config(enabled().with_preset(ColorPreset::Amber)));

    source.set_dirty(0);
    let mut fresh = FrameAcquirer::new(Arc::new(source), enabled().with_preset(ColorPreset::Amber));
    fresh.tick();
    fresh.tick();

    assert_eq!(recolored.image(), fresh.image());
    assert_eq!(fresh.image().count(ColorPreset::Amber.palette().on), LCD_PIXELS / 2);
}

#[test]
fn test_disconnect_reports_once_and_clears() {
    let source = MockPixelSource::new();
    source.push_frame(3, half_lit());
    let counts = Arc::new(Mutex::new(Counts::default()));

    let cfg = enabled();
    let off = cfg.off_color;
    let mut surface = RenderSurface::new(Arc::new(source.clone()), cfg);
    surface.set_listener(Box::new(CountingListener(Arc::clone(&counts))));
    surface.set_allotted_size(96, 64);
    let t0 = Instant::now();
    surface.start(t0);

    assert!(surface.pump(at(t0, 1)));
    assert_ne!(surface.image().count(off), LCD_PIXELS);
    assert!(!surface.pump(at(t0, 2)));

    source.set_active(3, false);
    assert!(surface.pump(at(t0, 3)));
    assert!(!surface.pump(at(t0, 4)));
    assert_eq!(surface.image().count(off), LCD_PIXELS);
    assert_eq!(surface.frame().pixel(0, 0), Some(off.to_rgba()));

    let counts = counts.lock().unwrap_or_else(PoisonError::into_inner);
    assert_eq!(counts.connected, vec![3]);
    assert_eq!(counts.updated, 1);
    assert_eq!(counts.disconnected, 1);
}

#[test]
fn test_falls_back_to_primary_then_migrates() {
    let source = MockPixelSource::new();
    let host = MockHost::new();
    let handle = host.handle();
    let cfg = VmuConfig { prefer_secondary: true, ..enabled() };
    let mut router = DisplayRouter::new(Arc::new(source), host, cfg);

    let t0 = Instant::now();
    router.start_at(t0);
    assert_eq!(router.state(), RouteState::ShowingOnPrimary);

    handle.add_target(7, 1000, 2000);
    router.pump(at(t0, 1));
    assert_eq!(router.state(), RouteState::ShowingOnSecondary(7));
    assert_eq!(handle.attached(), vec![Placement::Secondary(7)]);
    assert_eq!(handle.state().detach_log, vec![Placement::Primary]);

    // 1000x2000 target: min(900 / 48, 1800 / 32) = 18
    let surface = router.surface().expect("secondary surface");
    assert_eq!(surface.config().scale_factor, 18.0);
    assert_eq!(surface.frame().dimensions(), (1000, 2000));

    handle.remove_target(7);
    router.pump(at(t0, 2));
    assert_eq!(router.state(), RouteState::ShowingOnPrimary);
}

#[test]
fn test_reconnect_does_not_repaint_old_frame() {
    let source = MockPixelSource::new();
    source.push_frame(0, half_lit());
    let mut acq = FrameAcquirer::new(Arc::new(source.clone()), enabled());
    acq.tick();

    source.set_active(0, false);
    acq.tick();
    source.set_active(0, true);
    assert_eq!(acq.tick().as_slice(), &[AcquirerEvent::Connected(0)]);

    let amber = enabled().with_preset(ColorPreset::Amber);
    assert!(!acq.set_config(amber));
    assert_eq!(acq.image().count(ColorPreset::Amber.palette().on), 0);
}

#[test]
fn test_touch_sends_button_to_active_instance() {
    let source = MockPixelSource::new();
    source.push_frame(4, half_lit());
    let cfg = VmuConfig { show_button_overlay: true, ..enabled() };
    let mut router = DisplayRouter::new(Arc::new(source.clone()), MockHost::new(), cfg);
    let t0 = Instant::now();
    router.start_at(t0);
    router.pump(at(t0, 1));

    // 192x128 overlay, top-middle cell is Up
    assert!(router.touch(Placement::Primary, 96.0, 2.0, TouchPhase::Down));
    assert!(router.touch(Placement::Primary, 96.0, 2.0, TouchPhase::Up));
    assert!(!router.touch(Placement::Secondary(1), 96.0, 2.0, TouchPhase::Down));

    assert_eq!(source.state().buttons, vec![(4, VmuButton::Up, true), (4, VmuButton::Up, false)]);
}

#[test]
fn test_bridge_to_headless_host() {
    let bridge = Arc::new(VmuBridge::new());
    let host = HeadlessHost::new(1280, 720);
    let cfg = enabled().with_preset(ColorPreset::HighContrast);
    let palette = cfg.palette();
    let mut router = DisplayRouter::new(bridge.clone(), host, cfg.clone());

    let t0 = Instant::now();
    router.start_at(t0);
    bridge.on_connection_change(0, true);
    bridge.on_display_update(0, RawFrame::filled(LIT).as_slice(), 1);

    assert!(router.pump(at(t0, 1)));
    assert!(!router.pump(at(t0, 2)));

    let frame = router.host().frame(Placement::Primary).expect("primary frame");
    assert_eq!(frame.dimensions(), (192, 128));
    assert_eq!(frame.pixel(100, 60), Some(palette.on.to_rgba()));

    // plug a monitor and prefer it
    let id = router.host_mut().plug_target("hdmi", 1920, 1080);
    router.set_config_at(VmuConfig { prefer_secondary: true, ..cfg }, at(t0, 3));
    assert_eq!(router.state(), RouteState::ShowingOnSecondary(id));
    assert!(!router.host().is_attached(Placement::Primary));

    // no redraw since the first frame; the new surface still shows it
    assert!(router.pump(at(t0, 4)));

    // 30x scale: 1440x960 centered on 1920x1080
    let frame = router.host().frame(Placement::Secondary(id)).expect("secondary frame");
    assert_eq!(frame.dimensions(), (1920, 1080));
    assert_eq!(frame.pixel(960, 540), Some(palette.on.to_rgba()));
    assert_eq!(frame.pixel(100, 540), Some(palette.off.to_rgba()));

    router.release();
    assert!(!bridge.is_enabled());
}
