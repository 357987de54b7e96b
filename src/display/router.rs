/*
 *  display/router.rs
 *
 *  vmu-screen - second screen for the VMU
 *  (c) 2020-26 Stuart Hunter
 *
 *  Decides where the LCD is shown and moves it when targets come and go
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

use std::fmt;
use std::sync::Arc;
use std::sync::mpsc::{channel, Receiver, TryRecvError};
use std::time::Instant;

use log::{debug, error, info, trace, warn};

use crate::config::VmuConfig;
use crate::display::acquirer::Handover;
use crate::display::framebuffer::LcdImage;
use crate::display::presenter::SecondaryPresenter;
use crate::display::surface::{RenderSurface, TouchPhase};
use crate::display::traits::{
    DisplayHost, DisplayListener, InstanceId, PixelSource, Placement, TargetEvent, TargetId, TargetInfo,
};

/// Where the display currently lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    /// No surface exists
    Stopped,
    ShowingOnPrimary,
    ShowingOnSecondary(TargetId),
}

impl fmt::Display for RouteState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteState::Stopped => write!(f, "stopped"),
            RouteState::ShowingOnPrimary => write!(f, "primary"),
            RouteState::ShowingOnSecondary(id) => write!(f, "secondary {}", id),
        }
    }
}

/// The one live surface, if any
enum ActiveSurface {
    Primary(RenderSurface),
    Secondary(SecondaryPresenter),
}

impl ActiveSurface {
    fn placement(&self) -> Placement {
        match self {
            ActiveSurface::Primary(_) => Placement::Primary,
            ActiveSurface::Secondary(p) => Placement::Secondary(p.target_id()),
        }
    }

    fn surface(&self) -> &RenderSurface {
        match self {
            ActiveSurface::Primary(s) => s,
            ActiveSurface::Secondary(p) => p.surface(),
        }
    }

    fn surface_mut(&mut self) -> &mut RenderSurface {
        match self {
            ActiveSurface::Primary(s) => s,
            ActiveSurface::Secondary(p) => p.surface_mut(),
        }
    }

    fn teardown(&mut self) {
        match self {
            ActiveSurface::Primary(s) => s.teardown(),
            ActiveSurface::Secondary(p) => p.dismiss(),
        }
    }
}

/// Logs connection changes of whatever surface is live
struct LogListener {
    placement: Placement,
}

impl DisplayListener for LogListener {
    fn on_connected(&mut self, id: InstanceId) {
        info!("VMU {} now showing on {}", id, self.placement);
    }

    fn on_disconnected(&mut self) {
        info!("VMU gone from {}", self.placement);
    }

    fn on_updated(&mut self, id: InstanceId) {
        trace!("VMU {} frame on {}", id, self.placement);
    }
}

/// Routes the LCD to the primary overlay or a secondary target
///
/// Single-threaded: target notifications land in a channel and are drained
/// by `pump`, so a transition is never interrupted by another one. At most
/// one surface exists at any time.
pub struct DisplayRouter<H: DisplayHost> {
    source: Arc<dyn PixelSource>,
    host: H,
    config: VmuConfig,
    active: Option<ActiveSurface>,
    events: Receiver<TargetEvent>,
    running: bool,
    released: bool,
}

impl<H: DisplayHost> DisplayRouter<H> {
    /// Initialise the source and subscribe to target changes
    pub fn new(source: Arc<dyn PixelSource>, mut host: H, config: VmuConfig) -> Self {
        source.init();
        let (tx, events) = channel();
        host.register_target_listener(tx);
        Self {
            source,
            host,
            config,
            active: None,
            events,
            running: false,
            released: false,
        }
    }

    pub fn config(&self) -> &VmuConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn state(&self) -> RouteState {
        match &self.active {
            None => RouteState::Stopped,
            Some(ActiveSurface::Primary(_)) => RouteState::ShowingOnPrimary,
            Some(ActiveSurface::Secondary(p)) => RouteState::ShowingOnSecondary(p.target_id()),
        }
    }

    /// The live surface, for inspection
    pub fn surface(&self) -> Option<&RenderSurface> {
        self.active.as_ref().map(ActiveSurface::surface)
    }

    pub fn image(&self) -> Option<&LcdImage> {
        self.surface().map(RenderSurface::image)
    }

    pub fn secondary_targets(&self) -> Vec<TargetInfo> {
        self.host.secondary_targets()
    }

    pub fn has_secondary_target(&self) -> bool {
        !self.host.secondary_targets().is_empty()
    }

    pub fn start(&mut self) {
        self.start_at(Instant::now());
    }

    /// Enable the source and show the display if the config says so
    pub fn start_at(&mut self, now: Instant) {
        if self.running || self.released {
            return;
        }
        info!("starting VMU display");
        self.running = true;
        self.source.set_enabled(true);
        if self.config.enabled {
            self.show(now);
        }
    }

    /// Hide everything and disable the source; start() may follow
    pub fn stop(&mut self) {
        if !self.running {
            return;
        }
        info!("stopping VMU display");
        self.hide();
        self.running = false;
        self.source.set_enabled(false);
    }

    /// Final shutdown; later calls do nothing
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.stop();
        self.host.unregister_target_listener();
        self.source.terminate();
        self.released = true;
        debug!("VMU display released");
    }

    /// Replace the whole config
    ///
    /// A change of `enabled` or `prefer_secondary` rebuilds the route from
    /// scratch; anything else is forwarded to the live surface.
    pub fn set_config(&mut self, config: VmuConfig) {
        self.set_config_at(config, Instant::now());
    }

    pub fn set_config_at(&mut self, config: VmuConfig, now: Instant) {
        let old = std::mem::replace(&mut self.config, config);
        if !self.running {
            return;
        }

        if old.enabled != self.config.enabled {
            self.source.set_enabled(self.config.enabled);
            if self.config.enabled {
                self.show(now);
            } else {
                self.hide();
            }
            return;
        }
        if !self.config.enabled {
            return;
        }

        if old.prefer_secondary != self.config.prefer_secondary
            && self.desired_placement() != self.active.as_ref().map(ActiveSurface::placement)
        {
            self.show(now);
            return;
        }
        self.forward_config(&old);
    }

    fn forward_config(&mut self, old: &VmuConfig) {
        let config = self.config.clone();
        let Some(active) = self.active.as_mut() else {
            return;
        };
        match active {
            ActiveSurface::Primary(surface) => {
                surface.set_config(config);
                if old.scaled_width() != surface.config().scaled_width()
                    || old.scaled_height() != surface.config().scaled_height()
                {
                    match self.host.attach_surface(Placement::Primary, surface.preferred_size()) {
                        Ok((w, h)) => surface.set_allotted_size(w, h),
                        Err(e) => warn!("primary overlay relayout failed: {}", e),
                    }
                }
            }
            ActiveSurface::Secondary(presenter) => presenter.update_config(config),
        }
        self.present_if_rendered();
    }

    /// Placement the current config and targets ask for
    fn desired_placement(&self) -> Option<Placement> {
        if !self.config.enabled {
            return None;
        }
        if self.config.prefer_secondary {
            if let Some(target) = self.host.secondary_targets().first() {
                return Some(Placement::Secondary(target.id));
            }
        }
        Some(Placement::Primary)
    }

    fn show(&mut self, now: Instant) {
        if !self.config.prefer_secondary {
            self.show_on_primary(now);
            return;
        }
        match self.host.secondary_targets().into_iter().next() {
            Some(target) => self.show_on_secondary(target, now),
            None => {
                warn!("no secondary display available, using primary overlay");
                self.show_on_primary(now);
            }
        }
    }

    /// Last frame of the live surface, for its successor
    fn handover(&self) -> Option<Handover> {
        self.surface().and_then(|s| s.acquirer().handover())
    }

    fn show_on_primary(&mut self, now: Instant) {
        if matches!(self.active, Some(ActiveSurface::Primary(_))) {
            return;
        }
        let handover = self.handover();
        self.hide();
        self.attach_primary(handover, now);
    }

    fn attach_primary(&mut self, handover: Option<Handover>, now: Instant) {
        let mut surface = RenderSurface::new(Arc::clone(&self.source), self.config.clone());
        match self.host.attach_surface(Placement::Primary, surface.preferred_size()) {
            Ok((w, h)) => {
                surface.set_allotted_size(w, h);
                surface.set_listener(Box::new(LogListener { placement: Placement::Primary }));
                surface.seed(handover);
                surface.start(now);
                info!("VMU overlay shown on primary ({}x{})", w, h);
                self.active = Some(ActiveSurface::Primary(surface));
            }
            Err(e) => error!("cannot show VMU overlay: {}", e),
        }
    }

    fn show_on_secondary(&mut self, target: TargetInfo, now: Instant) {
        if self.state() == RouteState::ShowingOnSecondary(target.id) {
            return;
        }
        let handover = self.handover();
        self.hide();

        // enumeration may be stale by now
        let Some(size) = self.host.target_size(target.id) else {
            warn!("secondary display {} went away, using primary overlay", target.name);
            self.attach_primary(handover, now);
            return;
        };

        let placement = Placement::Secondary(target.id);
        match self.host.attach_surface(placement, size) {
            Ok((w, h)) => {
                let target = TargetInfo { width: w, height: h, ..target };
                let mut presenter =
                    SecondaryPresenter::new(target, Arc::clone(&self.source), self.config.clone());
                presenter.surface_mut().set_listener(Box::new(LogListener { placement }));
                presenter.surface_mut().seed(handover);
                presenter.show(now);
                self.active = Some(ActiveSurface::Secondary(presenter));
            }
            Err(e) => {
                warn!("cannot present on {}: {}, falling back to primary", target.name, e);
                self.attach_primary(handover, now);
            }
        }
    }

    /// Tear down the live surface, if any
    fn hide(&mut self) {
        if let Some(mut active) = self.active.take() {
            let placement = active.placement();
            active.teardown();
            self.host.detach_surface(placement);
            debug!("VMU surface removed from {}", placement);
        }
    }

    /// React to one target notification; repeats are harmless
    pub fn handle_target_event(&mut self, event: TargetEvent) {
        self.handle_target_event_at(event, Instant::now());
    }

    fn handle_target_event_at(&mut self, event: TargetEvent, now: Instant) {
        debug!("target event {:?} in state {}", event, self.state());
        if !self.running || !self.config.enabled {
            return;
        }

        match (event, self.state()) {
            (TargetEvent::Added(_), RouteState::ShowingOnPrimary) if self.config.prefer_secondary => {
                if let Some(target) = self.host.secondary_targets().into_iter().next() {
                    info!("secondary display {} attached, moving VMU", target.name);
                    self.show_on_secondary(target, now);
                }
            }
            (TargetEvent::Added(_), RouteState::Stopped) => self.show(now),
            (TargetEvent::Removed(id), RouteState::ShowingOnSecondary(current)) if id == current => {
                info!("secondary display {} removed", id);
                self.show(now);
            }
            (TargetEvent::Resized { id, width, height }, RouteState::ShowingOnSecondary(current))
                if id == current =>
            {
                if let Some(ActiveSurface::Secondary(presenter)) = self.active.as_mut() {
                    presenter.on_target_resized(width, height);
                }
                self.present_if_rendered();
            }
            _ => {}
        }
    }

    /// Handle pending target events, then run the surface tick if due
    ///
    /// Returns true if a new frame was presented.
    pub fn pump(&mut self, now: Instant) -> bool {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.handle_target_event_at(event, now),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        let Some(active) = self.active.as_mut() else {
            return false;
        };
        let placement = active.placement();
        let surface = active.surface_mut();
        if surface.pump(now) {
            self.host.present(placement, surface.frame());
            return true;
        }
        false
    }

    fn present_if_rendered(&mut self) {
        if let Some(active) = self.active.as_mut() {
            let placement = active.placement();
            let surface = active.surface_mut();
            if surface.render_if_needed() {
                self.host.present(placement, surface.frame());
            }
        }
    }

    /// Touch on `placement`; false if nothing there consumed it
    pub fn touch(&mut self, placement: Placement, x: f32, y: f32, phase: TouchPhase) -> bool {
        match self.active.as_mut() {
            Some(active) if active.placement() == placement => active.surface_mut().handle_touch(x, y, phase),
            _ => false,
        }
    }

    /// Tick the live surface outside its schedule and present the result
    pub fn force_update(&mut self) {
        if let Some(active) = self.active.as_mut() {
            let placement = active.placement();
            let surface = active.surface_mut();
            if surface.force_update() {
                self.host.present(placement, surface.frame());
            }
        }
    }
}

impl<H: DisplayHost> Drop for DisplayRouter<H> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::drivers::mock::{MockHost, MockHostHandle, MockPixelSource};
    use crate::display::framebuffer::RawFrame;
    use std::time::Duration;

    fn router(config: VmuConfig) -> (DisplayRouter<MockHost>, MockPixelSource, MockHostHandle) {
        let source = MockPixelSource::new();
        let host = MockHost::new();
        let handle = host.handle();
        let router = DisplayRouter::new(Arc::new(source.clone()), host, config);
        (router, source, handle)
    }

    fn enabled() -> VmuConfig {
        VmuConfig { enabled: true, ..VmuConfig::default() }
    }

    #[test]
    fn test_new_inits_and_release_terminates_once() {
        let (mut r, source, handle) = router(enabled());
        assert_eq!(source.state().init_count, 1);
        r.release();
        r.release();
        drop(r);
        assert_eq!(source.state().terminate_count, 1);
        assert_eq!(handle.state().unregister_count, 1);
    }

    #[test]
    fn test_start_disabled_shows_nothing() {
        let (mut r, source, handle) = router(VmuConfig::default());
        r.start();
        assert!(r.is_running());
        assert_eq!(r.state(), RouteState::Stopped);
        assert_eq!(source.state().enabled_calls, vec![true]);
        assert!(handle.attached().is_empty());
    }

    #[test]
    fn test_start_stop_start() {
        let (mut r, source, handle) = router(enabled());
        r.start();
        r.start();
        assert_eq!(r.state(), RouteState::ShowingOnPrimary);
        r.stop();
        r.stop();
        assert_eq!(r.state(), RouteState::Stopped);
        assert!(handle.attached().is_empty());
        r.start();
        assert_eq!(r.state(), RouteState::ShowingOnPrimary);
        assert_eq!(source.state().enabled_calls, vec![true, false, true]);
    }

    #[test]
    fn test_toggle_enabled_rebuilds() {
        let (mut r, source, handle) = router(enabled());
        r.start();
        r.set_config(VmuConfig::default());
        assert_eq!(r.state(), RouteState::Stopped);
        assert!(handle.attached().is_empty());

        r.set_config(enabled());
        assert_eq!(r.state(), RouteState::ShowingOnPrimary);
        assert_eq!(source.state().enabled_calls, vec![true, false, true]);
    }

    #[test]
    fn test_palette_change_keeps_surface() {
        let (mut r, _source, handle) = router(enabled());
        r.start();
        let attaches = handle.state().attach_log.len();

        let cfg = VmuConfig { on_color: crate::display::color::Rgb::new(1, 2, 3), ..enabled() };
        r.set_config(cfg);
        assert_eq!(r.state(), RouteState::ShowingOnPrimary);
        assert_eq!(handle.state().attach_log.len(), attaches);
        assert!(handle.state().detach_log.is_empty());
    }

    #[test]
    fn test_scale_change_renegotiates_primary_box() {
        let (mut r, _source, handle) = router(enabled());
        r.start();
        r.set_config(enabled().with_scale(2.0));
        let log = handle.state().attach_log.clone();
        assert_eq!(log.last(), Some(&(Placement::Primary, (96, 64), (96, 64))));
        assert_eq!(r.surface().map(|s| s.frame().dimensions()), Some((96, 64)));
    }

    #[test]
    fn test_prefer_secondary_toggle_moves_surface() {
        let (mut r, _source, handle) = router(enabled());
        handle.add_target(9, 1920, 1080);
        r.start();
        assert_eq!(r.state(), RouteState::ShowingOnPrimary);

        r.set_config(VmuConfig { prefer_secondary: true, ..enabled() });
        assert_eq!(r.state(), RouteState::ShowingOnSecondary(9));
        assert_eq!(handle.attached(), vec![Placement::Secondary(9)]);

        r.set_config(enabled());
        assert_eq!(r.state(), RouteState::ShowingOnPrimary);
        assert_eq!(handle.attached(), vec![Placement::Primary]);
    }

    #[test]
    fn test_prefer_secondary_without_target_stays_on_primary() {
        let (mut r, _source, handle) = router(enabled());
        r.start();
        r.set_config(VmuConfig { prefer_secondary: true, ..enabled() });
        assert_eq!(r.state(), RouteState::ShowingOnPrimary);
        assert!(handle.state().detach_log.is_empty());
    }

    #[test]
    fn test_presentation_failure_falls_back() {
        let (mut r, _source, handle) = router(VmuConfig { prefer_secondary: true, ..enabled() });
        handle.add_target(3, 800, 600);
        handle.set_secondary_failure(true);
        r.start();
        assert_eq!(r.state(), RouteState::ShowingOnPrimary);
    }

    #[test]
    fn test_hotplug_round_trip() {
        let (mut r, _source, handle) = router(VmuConfig { prefer_secondary: true, ..enabled() });
        r.start();
        assert_eq!(r.state(), RouteState::ShowingOnPrimary);
        let t0 = Instant::now();

        handle.add_target(4, 1000, 2000);
        r.pump(t0);
        assert_eq!(r.state(), RouteState::ShowingOnSecondary(4));

        // duplicate notification changes nothing
        r.handle_target_event(TargetEvent::Added(4));
        assert_eq!(handle.state().attach_log.len(), 2);

        handle.remove_target(4);
        r.pump(t0 + Duration::from_millis(1));
        assert_eq!(r.state(), RouteState::ShowingOnPrimary);
        assert_eq!(handle.attached(), vec![Placement::Primary]);

        r.handle_target_event(TargetEvent::Removed(4));
        assert_eq!(r.state(), RouteState::ShowingOnPrimary);
    }

    #[test]
    fn test_removing_other_target_is_ignored() {
        let (mut r, _source, handle) = router(VmuConfig { prefer_secondary: true, ..enabled() });
        handle.add_target(1, 800, 600);
        handle.add_target(2, 800, 600);
        r.start();
        assert_eq!(r.state(), RouteState::ShowingOnSecondary(1));

        handle.remove_target(2);
        r.pump(Instant::now());
        assert_eq!(r.state(), RouteState::ShowingOnSecondary(1));

        handle.remove_target(1);
        r.pump(Instant::now());
        assert_eq!(r.state(), RouteState::ShowingOnPrimary);
    }

    #[test]
    fn test_resize_updates_scale() {
        let (mut r, _source, handle) = router(VmuConfig { prefer_secondary: true, ..enabled() });
        handle.add_target(1, 1000, 2000);
        r.start();
        handle.resize_target(1, 1920, 1080);
        r.pump(Instant::now());
        assert_eq!(r.surface().map(|s| s.config().scale_factor), Some(30.0));
        assert_eq!(r.surface().map(|s| s.frame().dimensions()), Some((1920, 1080)));
    }

    #[test]
    fn test_pump_presents_frames() {
        let (mut r, source, handle) = router(enabled());
        source.push_frame(0, RawFrame::filled(0xFFFF_FFFF));
        let t0 = Instant::now();
        r.start_at(t0);

        assert!(r.pump(t0 + Duration::from_secs(1)));
        assert!(!r.pump(t0 + Duration::from_secs(2)));
        source.push_frame(0, RawFrame::filled(0xFFFF_FFFF));
        assert!(r.pump(t0 + Duration::from_secs(3)));
        assert_eq!(handle.present_count(Placement::Primary), 2);
        let on = r.config().on_color;
        assert_eq!(r.image().map(|img| img.get_pixel(0, 0)), Some(on));
    }

    #[test]
    fn test_migration_keeps_static_frame() {
        let (mut r, source, handle) = router(VmuConfig { prefer_secondary: true, ..enabled() });
        source.push_frame(0, RawFrame::filled(0xFFFF_FFFF));
        let t0 = Instant::now();
        r.start_at(t0);
        assert!(r.pump(t0 + Duration::from_secs(1)));

        // the LCD does not change again
        handle.add_target(5, 480, 320);
        r.pump(t0 + Duration::from_secs(2));
        assert_eq!(r.state(), RouteState::ShowingOnSecondary(5));
        assert!(r.pump(t0 + Duration::from_secs(3)));
        let on = r.config().on_color;
        assert_eq!(r.image().map(|img| img.count(on)), Some(crate::constants::LCD_PIXELS));
        assert_eq!(handle.present_count(Placement::Secondary(5)), 1);
        assert_eq!(source.state().copies, 1);

        handle.remove_target(5);
        r.pump(t0 + Duration::from_secs(4));
        assert_eq!(r.state(), RouteState::ShowingOnPrimary);
        assert!(r.pump(t0 + Duration::from_secs(5)));
        assert_eq!(r.image().map(|img| img.count(on)), Some(crate::constants::LCD_PIXELS));
    }

    #[test]
    fn test_secondary_uses_current_target_size() {
        let (mut r, _source, handle) = router(enabled());
        handle.add_target(2, 800, 600);
        let targets = r.secondary_targets();
        handle.resize_target(2, 1920, 1080);
        r.start();

        r.show_on_secondary(targets[0].clone(), Instant::now());
        assert_eq!(r.state(), RouteState::ShowingOnSecondary(2));
        let log = handle.state().attach_log.clone();
        assert_eq!(log.last(), Some(&(Placement::Secondary(2), (1920, 1080), (1920, 1080))));
        assert_eq!(r.surface().map(|s| s.frame().dimensions()), Some((1920, 1080)));
    }

    #[test]
    fn test_secondary_without_size_falls_back() {
        let (mut r, _source, handle) = router(VmuConfig { prefer_secondary: true, ..enabled() });
        handle.add_target(6, 800, 600);
        handle.hide_size(6);
        r.start();
        assert_eq!(r.state(), RouteState::ShowingOnPrimary);
        assert_eq!(handle.attached(), vec![Placement::Primary]);
    }

    #[test]
    fn test_events_ignored_while_stopped() {
        let (mut r, _source, handle) = router(VmuConfig { prefer_secondary: true, ..enabled() });
        handle.add_target(1, 800, 600);
        r.pump(Instant::now());
        assert_eq!(r.state(), RouteState::Stopped);
        assert!(handle.attached().is_empty());
    }
}
