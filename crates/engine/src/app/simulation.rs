use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::info;

use super::event_bus::EventBus;
use super::events::{Event, FrameStats};
use super::input::{InputFeed, InputSystem};
use super::metrics::LoopMetricsSnapshot;
use super::scheduler::{GameLoop, RenderSystem, SharedSystem, System, SystemId};
use super::world_state::WorldState;
use crate::config::{ConfigError, SimConfig};
use crate::content::WorldContent;
use crate::sim::{
    CollisionDetector, CollisionRecord, GameMode, GhostSystem, ModeEnterOptions, ModeError,
    ModeMachine, ModeRequest, ModeRequests, PhysicsSystem, RoadMode, TimelineMode, WorldData,
};

pub const INPUT_PRIORITY: i32 = 100;
pub const PHYSICS_PRIORITY: i32 = 90;
pub const COLLISION_PRIORITY: i32 = 80;
pub const MODE_PRIORITY: i32 = 70;
pub const GHOST_PRIORITY: i32 = 60;

#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Mode(#[from] ModeError),
    #[error("{0} is busy; call outside of a tick")]
    Busy(&'static str),
}

/// One self-contained simulation: its own bus, world state, mode machine and
/// scheduled systems. Several can coexist in one process.
pub struct Simulation {
    config: SimConfig,
    bus: EventBus,
    state: WorldState,
    input: InputFeed,
    content: Rc<WorldContent>,
    game_loop: GameLoop,
    modes: Rc<RefCell<ModeMachine>>,
    mode_requests: ModeRequests,
    collision: Rc<RefCell<CollisionDetector>>,
}

impl Simulation {
    pub fn new(config: SimConfig, content: WorldContent) -> Result<Self, SimError> {
        config.validate()?;
        let bus = EventBus::new(config.bus.listener_soft_cap);
        let state = WorldState::new(
            bus.clone(),
            WorldData::from_config(&config),
            config.state.history_limit,
        );
        let content = Rc::new(content);
        let input = InputFeed::default();

        let mut modes = ModeMachine::new(state.clone(), bus.clone(), &config.modes);
        modes.register(Box::new(RoadMode::new(state.clone(), bus.clone())));
        modes.register(Box::new(TimelineMode::new(state.clone(), bus.clone())));
        modes.enter_initial()?;
        let mode_requests = modes.requests();
        let modes = Rc::new(RefCell::new(modes));

        let collision = Rc::new(RefCell::new(CollisionDetector::new(
            state.clone(),
            bus.clone(),
            Rc::clone(&content),
            config.collision.clone(),
        )));

        let mut game_loop = GameLoop::new(bus.clone(), state.clone(), &config.scheduler);
        game_loop.add_system(
            Box::new(InputSystem::new(
                input.clone(),
                state.clone(),
                config.physics.throttle_decay,
            )),
            INPUT_PRIORITY,
        );
        game_loop.add_system(
            Box::new(PhysicsSystem::new(
                state.clone(),
                bus.clone(),
                config.physics.clone(),
            )),
            PHYSICS_PRIORITY,
        );
        game_loop.add_system(
            Box::new(SharedSystem::new(Rc::clone(&collision))),
            COLLISION_PRIORITY,
        );
        game_loop.add_system(Box::new(SharedSystem::new(Rc::clone(&modes))), MODE_PRIORITY);
        game_loop.add_system(
            Box::new(GhostSystem::new(state.clone(), &config.ghost)),
            GHOST_PRIORITY,
        );

        info!(
            content = content.len(),
            initial_mode = %config.modes.initial,
            "simulation_created"
        );
        Ok(Self {
            config,
            bus,
            state,
            input,
            content,
            game_loop,
            modes,
            mode_requests,
            collision,
        })
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn state(&self) -> &WorldState {
        &self.state
    }

    pub fn input(&self) -> &InputFeed {
        &self.input
    }

    pub fn content(&self) -> &WorldContent {
        &self.content
    }

    pub fn add_system(&mut self, system: Box<dyn System>, priority: i32) -> SystemId {
        self.game_loop.add_system(system, priority)
    }

    pub fn add_render_system(&mut self, system: Box<dyn RenderSystem>, priority: i32) -> SystemId {
        self.game_loop.add_render_system(system, priority)
    }

    pub fn set_system_enabled(&mut self, id: SystemId, enabled: bool) -> bool {
        self.game_loop.set_enabled(id, enabled)
    }

    pub fn system_order(&self) -> Vec<&str> {
        self.game_loop.system_order()
    }

    pub fn start(&mut self, now: Instant) -> bool {
        self.game_loop.start(now)
    }

    pub fn stop(&mut self) -> bool {
        self.game_loop.stop()
    }

    pub fn pause(&mut self) -> bool {
        self.game_loop.pause()
    }

    pub fn resume(&mut self, now: Instant) -> bool {
        self.game_loop.resume(now)
    }

    pub fn is_running(&self) -> bool {
        self.game_loop.is_running()
    }

    pub fn tick(&mut self, now: Instant) -> Option<FrameStats> {
        self.game_loop.tick(now)
    }

    pub fn step(&mut self, dt: Duration) -> FrameStats {
        self.game_loop.step(dt)
    }

    pub fn frame_count(&self) -> u64 {
        self.game_loop.frame_count()
    }

    pub fn metrics(&self) -> LoopMetricsSnapshot {
        self.game_loop.metrics()
    }

    pub fn current_mode(&self) -> GameMode {
        self.state.read(|data| data.mode.current)
    }

    pub fn is_transitioning(&self) -> bool {
        self.state.read(|data| data.mode.is_transitioning())
    }

    /// See [`ModeMachine::request_mode_change`]. If the machine is mid-update
    /// the request is queued for its next update and reported as accepted.
    pub fn request_mode_change(&mut self, target: GameMode, reason: &str, immediate: bool) -> bool {
        match self.modes.try_borrow_mut() {
            Ok(mut modes) => modes.request_mode_change(target, reason, immediate),
            Err(_) => {
                self.mode_requests.push(ModeRequest::Mode {
                    target,
                    reason: reason.to_string(),
                    immediate,
                    options: ModeEnterOptions::default(),
                });
                true
            }
        }
    }

    pub fn force_mode(&mut self, target: GameMode) -> Result<bool, SimError> {
        let mut modes = self
            .modes
            .try_borrow_mut()
            .map_err(|_| SimError::Busy("mode machine"))?;
        Ok(modes.force_mode(target, ModeEnterOptions::default()))
    }

    pub fn request_world_transition(&mut self, target_world: u32) -> bool {
        match self.modes.try_borrow_mut() {
            Ok(mut modes) => modes.request_world_transition(target_world),
            Err(_) => {
                self.mode_requests.push(ModeRequest::World { target_world });
                true
            }
        }
    }

    pub fn active_collisions(&self) -> Vec<String> {
        self.collision
            .try_borrow()
            .map(|collision| collision.active_ids())
            .unwrap_or_default()
    }

    pub fn recent_collisions(&self) -> Vec<CollisionRecord> {
        self.collision
            .try_borrow()
            .map(|collision| collision.recent_records().cloned().collect())
            .unwrap_or_default()
    }

    /// Starts a new session: fresh world state, session counter bumped,
    /// frame numbering restarted, initial mode re-entered and
    /// `game:restarted` published. The previous
    /// session's motion becomes the ghost track.
    pub fn restart(&mut self) -> Result<(), SimError> {
        let (session, near_object) = self.state.read(|data| {
            (
                data.session.saturating_add(1),
                data.interaction.near_object.clone(),
            )
        });
        let mut collision = self
            .collision
            .try_borrow_mut()
            .map_err(|_| SimError::Busy("collision detector"))?;
        let mut modes = self
            .modes
            .try_borrow_mut()
            .map_err(|_| SimError::Busy("mode machine"))?;

        self.state.reset();
        self.state.write(|data| data.session = session);
        collision.clear_all();
        modes.reset(self.config.modes.initial)?;
        drop(modes);
        drop(collision);
        self.game_loop.reset_frame_count();

        // The reset wiped the collision detector's proximity record.
        if let Some(object) = near_object {
            self.bus.publish(Event::NearObjectExit { object });
        }
        info!(session, "game_restarted");
        self.bus.publish(Event::GameRestarted { session });
        Ok(())
    }
}
