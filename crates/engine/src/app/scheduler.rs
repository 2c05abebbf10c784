use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::event_bus::EventBus;
use super::events::{Event, FrameStats, PhaseTimings, SystemPhase};
use super::metrics::{duration_to_ms, FrameMetrics, LoopMetricsSnapshot, MetricsAccumulator};
use super::world_state::{StateError, WorldState};
use crate::config::SchedulerConfig;
use crate::sim::ModeError;

#[derive(Debug, Error)]
pub enum SystemError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Mode(#[from] ModeError),
    #[error("system '{0}' is already borrowed")]
    Busy(String),
}

impl SystemError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

/// Anything the loop runs once per tick during the update phase.
pub trait System {
    fn name(&self) -> &str;
    fn update(&mut self, dt: f32) -> Result<(), SystemError>;
}

/// A system that also takes part in the render phase.
pub trait RenderSystem: System {
    fn render(&mut self, dt: f32) -> Result<(), SystemError>;
}

/// Lets a system stay reachable from outside the loop (requests, queries)
/// while the loop owns its scheduling slot.
pub struct SharedSystem<T> {
    name: String,
    inner: Rc<RefCell<T>>,
}

impl<T: System> SharedSystem<T> {
    pub fn new(inner: Rc<RefCell<T>>) -> Self {
        let name = inner.borrow().name().to_string();
        Self { name, inner }
    }
}

impl<T: System> System for SharedSystem<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn update(&mut self, dt: f32) -> Result<(), SystemError> {
        let mut inner = self
            .inner
            .try_borrow_mut()
            .map_err(|_| SystemError::Busy(self.name.clone()))?;
        inner.update(dt)
    }
}

impl<T: RenderSystem> RenderSystem for SharedSystem<T> {
    fn render(&mut self, dt: f32) -> Result<(), SystemError> {
        let mut inner = self
            .inner
            .try_borrow_mut()
            .map_err(|_| SystemError::Busy(self.name.clone()))?;
        inner.render(dt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Stopped,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SystemId(u64);

enum SystemSlot {
    Update(Box<dyn System>),
    UpdateRender(Box<dyn RenderSystem>),
}

impl SystemSlot {
    fn name(&self) -> &str {
        match self {
            Self::Update(system) => system.name(),
            Self::UpdateRender(system) => system.name(),
        }
    }

    fn update(&mut self, dt: f32) -> Result<(), SystemError> {
        match self {
            Self::Update(system) => system.update(dt),
            Self::UpdateRender(system) => system.update(dt),
        }
    }

    fn render(&mut self, dt: f32) -> Option<Result<(), SystemError>> {
        match self {
            Self::Update(_) => None,
            Self::UpdateRender(system) => Some(system.render(dt)),
        }
    }
}

struct SystemEntry {
    id: SystemId,
    priority: i32,
    enabled: bool,
    slot: SystemSlot,
}

/// Per-frame driver. Each tick clamps the elapsed time to `max_dt`, runs every
/// enabled system's update in descending priority, then every render-capable
/// system's render, publishing the phase events in between.
pub struct GameLoop {
    bus: EventBus,
    state: WorldState,
    systems: Vec<SystemEntry>,
    next_id: u64,
    loop_state: LoopState,
    last_time: Option<Instant>,
    max_dt: Duration,
    frame_count: u64,
    metrics: FrameMetrics,
    log_accumulator: MetricsAccumulator,
}

impl GameLoop {
    pub fn new(bus: EventBus, state: WorldState, config: &SchedulerConfig) -> Self {
        Self {
            bus,
            state,
            systems: Vec::new(),
            next_id: 0,
            loop_state: LoopState::Stopped,
            last_time: None,
            max_dt: normalize_non_zero_duration(config.max_dt(), Duration::from_millis(50)),
            frame_count: 0,
            metrics: FrameMetrics::default(),
            log_accumulator: MetricsAccumulator::new(config.metrics_log_interval()),
        }
    }

    pub fn add_system(&mut self, system: Box<dyn System>, priority: i32) -> SystemId {
        self.insert(SystemSlot::Update(system), priority)
    }

    pub fn add_render_system(&mut self, system: Box<dyn RenderSystem>, priority: i32) -> SystemId {
        self.insert(SystemSlot::UpdateRender(system), priority)
    }

    pub fn remove_system(&mut self, id: SystemId) -> bool {
        let before = self.systems.len();
        self.systems.retain(|entry| entry.id != id);
        before != self.systems.len()
    }

    /// Disabling skips both update and render without unregistering.
    pub fn set_enabled(&mut self, id: SystemId, enabled: bool) -> bool {
        match self.systems.iter_mut().find(|entry| entry.id == id) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn is_enabled(&self, id: SystemId) -> Option<bool> {
        self.systems
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.enabled)
    }

    /// System names in execution order.
    pub fn system_order(&self) -> Vec<&str> {
        self.systems.iter().map(|entry| entry.slot.name()).collect()
    }

    pub fn state(&self) -> LoopState {
        self.loop_state
    }

    pub fn is_running(&self) -> bool {
        self.loop_state == LoopState::Running
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Restarts frame numbering; the next frame is frame 1 again.
    pub fn reset_frame_count(&mut self) {
        debug!(frames = self.frame_count, "frame_count_reset");
        self.frame_count = 0;
    }

    pub fn max_dt(&self) -> Duration {
        self.max_dt
    }

    pub fn metrics(&self) -> LoopMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn start(&mut self, now: Instant) -> bool {
        if self.loop_state == LoopState::Running {
            warn!("loop_already_running");
            return false;
        }
        self.loop_state = LoopState::Running;
        self.last_time = Some(now);
        info!(
            systems = self.systems.len(),
            max_dt_ms = self.max_dt.as_millis() as u64,
            "loop_started"
        );
        self.bus.publish(Event::LoopStarted);
        true
    }

    /// Cancels the next tick. Redundant calls are a logged no-op.
    pub fn stop(&mut self) -> bool {
        if self.loop_state == LoopState::Stopped {
            warn!("loop_already_stopped");
            return false;
        }
        self.loop_state = LoopState::Stopped;
        self.last_time = None;
        info!(frames = self.frame_count, "loop_stopped");
        self.bus.publish(Event::LoopStopped {
            frames: self.frame_count,
        });
        true
    }

    pub fn pause(&mut self) -> bool {
        self.stop()
    }

    pub fn resume(&mut self, now: Instant) -> bool {
        self.start(now)
    }

    /// Runs one scheduled tick at wall time `now`; `None` when stopped.
    pub fn tick(&mut self, now: Instant) -> Option<FrameStats> {
        if self.loop_state != LoopState::Running {
            return None;
        }
        let raw_dt = self
            .last_time
            .map_or(Duration::ZERO, |last| now.saturating_duration_since(last));
        self.last_time = Some(now);
        Some(self.run_frame(clamp_frame_delta(raw_dt, self.max_dt)))
    }

    /// Runs one frame with an explicit elapsed time, independent of the
    /// running state. Used by headless drivers and tests.
    pub fn step(&mut self, dt: Duration) -> FrameStats {
        self.run_frame(clamp_frame_delta(dt, self.max_dt))
    }

    fn run_frame(&mut self, dt: Duration) -> FrameStats {
        let dt_seconds = dt.as_secs_f32();
        let frame_start = Instant::now();
        self.frame_count = self.frame_count.saturating_add(1);
        let frame = self.frame_count;
        self.state.write(|data| {
            data.clock.frame = frame;
            data.clock.elapsed += dt.as_secs_f64();
        });

        self.bus.publish(Event::PreUpdate { dt: dt_seconds });
        for entry in self.systems.iter_mut().filter(|entry| entry.enabled) {
            if let Err(error) = entry.slot.update(dt_seconds) {
                report_system_failure(&self.bus, entry.slot.name(), SystemPhase::Update, &error);
            }
        }
        self.bus.publish(Event::PhysicsUpdate { dt: dt_seconds });
        self.bus.publish(Event::PostUpdate { dt: dt_seconds });
        let update_done = Instant::now();

        for entry in self.systems.iter_mut().filter(|entry| entry.enabled) {
            if let Some(Err(error)) = entry.slot.render(dt_seconds) {
                report_system_failure(&self.bus, entry.slot.name(), SystemPhase::Render, &error);
            }
        }
        self.bus.publish(Event::PostRender { dt: dt_seconds });
        let render_done = Instant::now();

        let timings = PhaseTimings {
            update_ms: duration_to_ms(update_done.saturating_duration_since(frame_start)),
            render_ms: duration_to_ms(render_done.saturating_duration_since(update_done)),
            total_ms: duration_to_ms(render_done.saturating_duration_since(frame_start)),
        };
        self.metrics.record_frame(dt, timings);
        let stats = FrameStats {
            frame,
            fps: self.metrics.fps(),
            dt: dt_seconds,
            timings,
        };
        self.bus.publish(Event::FrameComplete(stats));

        if let Some(fps) = self.log_accumulator.record_frame(dt) {
            let snapshot = self.metrics.snapshot();
            info!(
                fps,
                frame,
                frame_time_ms = snapshot.frame_time.avg_ms,
                update_ms = snapshot.update.avg_ms,
                render_ms = snapshot.render.avg_ms,
                "loop_metrics"
            );
        }

        stats
    }

    fn insert(&mut self, slot: SystemSlot, priority: i32) -> SystemId {
        let id = SystemId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        debug!(system = slot.name(), priority, "system_registered");
        let index = self
            .systems
            .iter()
            .position(|existing| existing.priority < priority)
            .unwrap_or(self.systems.len());
        self.systems.insert(
            index,
            SystemEntry {
                id,
                priority,
                enabled: true,
                slot,
            },
        );
        id
    }
}

fn report_system_failure(bus: &EventBus, system: &str, phase: SystemPhase, error: &SystemError) {
    warn!(system, ?phase, error = %error, "system_failed");
    bus.publish(Event::SystemError {
        system: system.to_string(),
        phase,
        message: error.to_string(),
    });
}

fn clamp_frame_delta(frame_dt: Duration, max_frame_delta: Duration) -> Duration {
    frame_dt.min(max_frame_delta)
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::app::EventKind;
    use crate::sim::WorldData;

    type Log = Rc<RefCell<Vec<String>>>;

    struct Recorder {
        name: &'static str,
        log: Log,
        fail_update: bool,
        fail_render: bool,
        seen_dt: Rc<RefCell<Vec<f32>>>,
    }

    impl Recorder {
        fn new(name: &'static str, log: &Log) -> Self {
            Self {
                name,
                log: Rc::clone(log),
                fail_update: false,
                fail_render: false,
                seen_dt: Rc::new(RefCell::new(Vec::new())),
            }
        }
    }

    impl System for Recorder {
        fn name(&self) -> &str {
            self.name
        }

        fn update(&mut self, dt: f32) -> Result<(), SystemError> {
            self.seen_dt.borrow_mut().push(dt);
            self.log.borrow_mut().push(format!("update:{}", self.name));
            if self.fail_update {
                return Err(SystemError::msg("update exploded"));
            }
            Ok(())
        }
    }

    impl RenderSystem for Recorder {
        fn render(&mut self, _dt: f32) -> Result<(), SystemError> {
            self.log.borrow_mut().push(format!("render:{}", self.name));
            if self.fail_render {
                return Err(SystemError::msg("render exploded"));
            }
            Ok(())
        }
    }

    fn new_loop() -> (GameLoop, EventBus, Log) {
        let bus = EventBus::default();
        let state = WorldState::new(bus.clone(), WorldData::default(), 0);
        let game_loop = GameLoop::new(bus.clone(), state, &SchedulerConfig::default());
        (game_loop, bus, Rc::new(RefCell::new(Vec::new())))
    }

    fn log_events(bus: &EventBus, log: &Log, kinds: &[EventKind]) {
        for kind in kinds {
            let log = Rc::clone(log);
            bus.on(*kind, move |event| {
                log.borrow_mut().push(event.name().to_string());
                Ok(())
            });
        }
    }

    #[test]
    fn clamp_frame_delta_caps_large_frame() {
        let max_frame_delta = Duration::from_millis(50);
        assert_eq!(
            clamp_frame_delta(Duration::from_secs(5), max_frame_delta),
            max_frame_delta
        );
        assert_eq!(
            clamp_frame_delta(Duration::from_millis(16), max_frame_delta),
            Duration::from_millis(16)
        );
    }

    #[test]
    fn tick_never_advances_more_than_max_dt() {
        let (mut game_loop, _bus, log) = new_loop();
        let recorder = Recorder::new("recorder", &log);
        let seen = Rc::clone(&recorder.seen_dt);
        game_loop.add_system(Box::new(recorder), 0);

        let base = Instant::now();
        game_loop.start(base);
        game_loop.tick(base + Duration::from_millis(16));
        let stats = game_loop
            .tick(base + Duration::from_millis(16) + Duration::from_secs(5))
            .expect("running");

        assert!((stats.dt - 0.05).abs() < 1.0e-6);
        let seen = seen.borrow();
        assert!((seen[0] - 0.016).abs() < 1.0e-6);
        assert!(seen.iter().all(|dt| *dt <= 0.05 + 1.0e-6));
    }

    #[test]
    fn systems_run_by_descending_priority_with_phase_events() {
        let (mut game_loop, bus, log) = new_loop();
        log_events(
            &bus,
            &log,
            &[
                EventKind::PreUpdate,
                EventKind::PhysicsUpdate,
                EventKind::PostUpdate,
                EventKind::PostRender,
                EventKind::FrameComplete,
            ],
        );
        game_loop.add_system(Box::new(Recorder::new("collision", &log)), 80);
        game_loop.add_render_system(Box::new(Recorder::new("physics", &log)), 90);
        game_loop.add_system(Box::new(Recorder::new("input", &log)), 100);

        game_loop.step(Duration::from_millis(16));

        assert_eq!(game_loop.system_order(), vec!["input", "physics", "collision"]);
        assert_eq!(
            *log.borrow(),
            vec![
                "pre-update",
                "update:input",
                "update:physics",
                "update:collision",
                "physics-update",
                "post-update",
                "render:physics",
                "post-render",
                "frame-complete",
            ]
        );
    }

    #[test]
    fn failing_system_is_isolated_and_reported() {
        let (mut game_loop, bus, log) = new_loop();
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&errors);
        bus.on(EventKind::SystemError, move |event| {
            if let Event::SystemError { system, phase, .. } = event {
                sink.borrow_mut().push((system.clone(), *phase));
            }
            Ok(())
        });
        let mut broken = Recorder::new("broken", &log);
        broken.fail_update = true;
        broken.fail_render = true;
        game_loop.add_render_system(Box::new(broken), 10);
        game_loop.add_render_system(Box::new(Recorder::new("healthy", &log)), 5);

        game_loop.step(Duration::from_millis(16));

        assert_eq!(
            *log.borrow(),
            vec![
                "update:broken",
                "update:healthy",
                "render:broken",
                "render:healthy"
            ]
        );
        assert_eq!(
            *errors.borrow(),
            vec![
                ("broken".to_string(), SystemPhase::Update),
                ("broken".to_string(), SystemPhase::Render)
            ]
        );
    }

    #[test]
    fn disabled_system_skips_update_and_render() {
        let (mut game_loop, _bus, log) = new_loop();
        let id = game_loop.add_render_system(Box::new(Recorder::new("sleepy", &log)), 0);
        assert!(game_loop.set_enabled(id, false));

        game_loop.step(Duration::from_millis(16));
        assert!(log.borrow().is_empty());
        assert_eq!(game_loop.is_enabled(id), Some(false));

        game_loop.set_enabled(id, true);
        game_loop.step(Duration::from_millis(16));
        assert_eq!(*log.borrow(), vec!["update:sleepy", "render:sleepy"]);
    }

    #[test]
    fn stopped_loop_does_not_tick_and_redundant_stop_is_noop() {
        let (mut game_loop, _bus, log) = new_loop();
        game_loop.add_system(Box::new(Recorder::new("counter", &log)), 0);
        let base = Instant::now();

        assert!(game_loop.tick(base).is_none());
        assert!(!game_loop.stop());

        assert!(game_loop.start(base));
        assert!(!game_loop.start(base));
        assert!(game_loop.tick(base + Duration::from_millis(10)).is_some());
        assert!(game_loop.pause());
        assert!(game_loop
            .tick(base + Duration::from_millis(20))
            .is_none());
        assert!(game_loop.resume(base + Duration::from_millis(30)));
        assert_eq!(game_loop.state(), LoopState::Running);
        assert_eq!(game_loop.frame_count(), 1);
    }

    #[test]
    fn resume_does_not_replay_paused_time() {
        let (mut game_loop, _bus, _log) = new_loop();
        let base = Instant::now();
        game_loop.start(base);
        game_loop.pause();
        game_loop.resume(base + Duration::from_secs(3));
        let stats = game_loop
            .tick(base + Duration::from_secs(3) + Duration::from_millis(10))
            .expect("running");
        assert!((stats.dt - 0.010).abs() < 1.0e-6);
    }

    #[test]
    fn removed_system_no_longer_runs() {
        let (mut game_loop, _bus, log) = new_loop();
        let id = game_loop.add_system(Box::new(Recorder::new("gone", &log)), 0);
        assert!(game_loop.remove_system(id));
        assert!(!game_loop.remove_system(id));
        game_loop.step(Duration::from_millis(16));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn frame_complete_carries_frame_count_and_fps() {
        let (mut game_loop, bus, _log) = new_loop();
        let frames = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&frames);
        bus.on(EventKind::FrameComplete, move |event| {
            if let Event::FrameComplete(stats) = event {
                sink.borrow_mut().push(*stats);
            }
            Ok(())
        });

        for _ in 0..3 {
            game_loop.step(Duration::from_millis(20));
        }

        let frames = frames.borrow();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[2].frame, 3);
        assert!((frames[2].fps - 50.0).abs() < 0.01);
    }

    #[test]
    fn shared_system_reports_busy_when_borrowed() {
        let log: Log = Rc::new(RefCell::new(Vec::new()));
        let inner = Rc::new(RefCell::new(Recorder::new("shared", &log)));
        let mut shared = SharedSystem::new(Rc::clone(&inner));
        assert_eq!(shared.name(), "shared");

        let _guard = inner.borrow_mut();
        assert!(matches!(shared.update(0.016), Err(SystemError::Busy(_))));
    }
}
