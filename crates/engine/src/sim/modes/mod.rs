mod road;
mod timeline;

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::entity::Vec2;
use super::world::{FadeDirection, TransitionView};
use crate::app::{
    Event, EventBus, EventKind, StateError, Subscription, System, SystemError, WorldState,
};
use crate::config::ModesConfig;

pub use road::RoadMode;
pub use timeline::TimelineMode;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    #[default]
    Road,
    Timeline,
}

impl GameMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Road => "road",
            Self::Timeline => "timeline",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ModeError {
    #[error("no handler registered for mode '{0}'")]
    UnknownMode(GameMode),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("{0}")]
    Message(String),
}

/// Arguments handed to [`ModeHandler::enter`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModeEnterOptions {
    pub branch_id: Option<String>,
    /// Road x to place the player at; `None` keeps the current x.
    pub spawn_x: Option<f32>,
}

/// One gameplay rule set. A handler reads and writes the shared world state
/// through the handle it was built with.
pub trait ModeHandler {
    fn mode(&self) -> GameMode;
    fn enter(&mut self, options: &ModeEnterOptions) -> Result<(), ModeError>;
    /// Must leave the world state in a shape the next mode can start from.
    fn exit(&mut self) -> Result<(), ModeError>;
    fn update(&mut self, dt: f32) -> Result<(), ModeError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModeRequest {
    Mode {
        target: GameMode,
        reason: String,
        immediate: bool,
        options: ModeEnterOptions,
    },
    World {
        target_world: u32,
    },
}

/// Queue of requests that arrived while the machine could not be borrowed
/// (event callbacks, re-entrant calls). Drained at the start of each update.
#[derive(Debug, Clone, Default)]
pub struct ModeRequests {
    queue: Rc<RefCell<VecDeque<ModeRequest>>>,
}

impl ModeRequests {
    pub fn push(&self, request: ModeRequest) {
        self.queue.borrow_mut().push_back(request);
    }

    pub fn len(&self) -> usize {
        self.queue.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.borrow().is_empty()
    }

    fn drain(&self) -> Vec<ModeRequest> {
        self.queue.borrow_mut().drain(..).collect()
    }

    fn clear(&self) {
        self.queue.borrow_mut().clear();
    }
}

enum TransitionKind {
    Mode {
        from: GameMode,
        to: GameMode,
        options: ModeEnterOptions,
    },
    World {
        from_world: u32,
        to_world: u32,
    },
}

struct Transition {
    kind: TransitionKind,
    reason: String,
    elapsed: Duration,
    swapped: bool,
}

/// Owns the mode handlers and drives timed transitions.
///
/// A transition lasts `transition_ms`. The first half fades out, the swap
/// happens at the midpoint (outgoing `exit`, incoming `enter`, `mode:changed`),
/// the second half fades in, then `transition:complete` is published. Phase is
/// tracked from accumulated `dt`; nothing is deferred.
pub struct ModeMachine {
    state: WorldState,
    bus: EventBus,
    handlers: HashMap<GameMode, Box<dyn ModeHandler>>,
    current: GameMode,
    transition: Option<Transition>,
    duration: Duration,
    requests: ModeRequests,
    subscriptions: Vec<Subscription>,
}

impl ModeMachine {
    pub fn new(state: WorldState, bus: EventBus, config: &ModesConfig) -> Self {
        let requests = ModeRequests::default();
        let subscriptions = listen_for_requests(&bus, &requests);
        Self {
            state,
            bus,
            handlers: HashMap::new(),
            current: config.initial,
            transition: None,
            duration: Duration::from_millis(config.transition_ms.max(2)),
            requests,
            subscriptions,
        }
    }

    pub fn register(&mut self, handler: Box<dyn ModeHandler>) {
        let mode = handler.mode();
        if self.handlers.insert(mode, handler).is_some() {
            warn!(mode = %mode, "mode_handler_replaced");
        }
    }

    pub fn current(&self) -> GameMode {
        self.current
    }

    pub fn is_transitioning(&self) -> bool {
        self.transition.is_some()
    }

    pub fn transition_duration(&self) -> Duration {
        self.duration
    }

    pub fn requests(&self) -> ModeRequests {
        self.requests.clone()
    }

    /// Enters the current mode's handler without any transition.
    pub fn enter_initial(&mut self) -> Result<(), ModeError> {
        let mode = self.current;
        self.state.write(|data| {
            data.mode.current = mode;
            data.mode.transition = None;
            data.player.mode = mode;
        });
        let handler = self
            .handlers
            .get_mut(&mode)
            .ok_or(ModeError::UnknownMode(mode))?;
        handler.enter(&ModeEnterOptions::default())
    }

    pub fn request_mode_change(&mut self, target: GameMode, reason: &str, immediate: bool) -> bool {
        self.request_mode_change_with(target, reason, immediate, ModeEnterOptions::default())
    }

    /// Returns `false` for unknown modes and for non-immediate requests made
    /// while a transition is running. Requesting the current mode succeeds
    /// without doing anything.
    pub fn request_mode_change_with(
        &mut self,
        target: GameMode,
        reason: &str,
        immediate: bool,
        options: ModeEnterOptions,
    ) -> bool {
        if !self.handlers.contains_key(&target) {
            warn!(mode = %target, reason, "mode_change_rejected_unknown_mode");
            return false;
        }
        if self.transition.is_some() {
            if !immediate {
                warn!(mode = %target, reason, "mode_change_rejected_in_transition");
                return false;
            }
            self.cancel_transition();
        }
        if target == self.current {
            debug!(mode = %target, reason, "mode_change_already_current");
            return true;
        }

        if immediate {
            let from = self.current;
            if let Err(error) = self.swap_mode(from, target, reason, &options) {
                warn!(mode = %target, error = %error, "mode_enter_failed");
            }
            self.bus.publish(Event::TransitionComplete {
                mode: self.current,
                reason: reason.to_string(),
            });
            return true;
        }

        let from = self.current;
        self.transition = Some(Transition {
            kind: TransitionKind::Mode {
                from,
                to: target,
                options,
            },
            reason: reason.to_string(),
            elapsed: Duration::ZERO,
            swapped: false,
        });
        self.write_view();
        info!(from = %from, to = %target, reason, "mode_transition_started");
        self.bus.publish(Event::TransitionStart {
            from,
            to: target,
            reason: reason.to_string(),
            duration_ms: self.duration.as_millis() as u64,
        });
        true
    }

    /// Swaps straight to `target`, cancelling any running transition. Only
    /// `mode:changed` is published.
    pub fn force_mode(&mut self, target: GameMode, options: ModeEnterOptions) -> bool {
        if !self.handlers.contains_key(&target) {
            warn!(mode = %target, "force_mode_rejected_unknown_mode");
            return false;
        }
        self.cancel_transition();
        if target == self.current {
            return true;
        }
        let from = self.current;
        if let Err(error) = self.swap_mode(from, target, "forced", &options) {
            warn!(mode = %target, error = %error, "mode_enter_failed");
        }
        true
    }

    /// Runs the fade timeline for a world swap. Only allowed on the road.
    pub fn request_world_transition(&mut self, target_world: u32) -> bool {
        if self.transition.is_some() {
            warn!(target_world, "world_transition_rejected_in_transition");
            return false;
        }
        if self.current != GameMode::Road {
            warn!(target_world, mode = %self.current, "world_transition_rejected_off_road");
            return false;
        }
        let from_world = self.state.read(|data| data.world.index);
        if from_world == target_world {
            return true;
        }

        let reason = format!("world-{target_world}");
        self.transition = Some(Transition {
            kind: TransitionKind::World {
                from_world,
                to_world: target_world,
            },
            reason: reason.clone(),
            elapsed: Duration::ZERO,
            swapped: false,
        });
        self.write_view();
        info!(from_world, to_world = target_world, "world_transition_started");
        self.bus.publish(Event::WorldTransitionStarted {
            from_world,
            to_world: target_world,
        });
        self.bus.publish(Event::TransitionStart {
            from: self.current,
            to: self.current,
            reason,
            duration_ms: self.duration.as_millis() as u64,
        });
        true
    }

    /// Drops any transition and queued request and re-enters `initial`.
    pub fn reset(&mut self, initial: GameMode) -> Result<(), ModeError> {
        self.transition = None;
        self.requests.clear();
        self.current = initial;
        self.state.write(|data| {
            data.mode.current = initial;
            data.mode.previous = None;
            data.mode.transition = None;
        });
        info!(mode = %initial, "mode_machine_reset");
        self.enter_initial()
    }

    /// One tick: queued requests, transition phase, then the current handler.
    pub fn advance(&mut self, dt: f32) -> Result<(), ModeError> {
        for request in self.requests.drain() {
            self.apply_request(request);
        }
        let transition_result = self.advance_transition(dt);
        let handler_result = match self.handlers.get_mut(&self.current) {
            Some(handler) => handler.update(dt),
            None => Err(ModeError::UnknownMode(self.current)),
        };
        transition_result.and(handler_result)
    }

    fn apply_request(&mut self, request: ModeRequest) {
        match request {
            ModeRequest::Mode {
                target,
                reason,
                immediate,
                options,
            } => {
                self.request_mode_change_with(target, &reason, immediate, options);
            }
            ModeRequest::World { target_world } => {
                self.request_world_transition(target_world);
            }
        }
    }

    fn advance_transition(&mut self, dt: f32) -> Result<(), ModeError> {
        let Some(mut transition) = self.transition.take() else {
            return Ok(());
        };
        transition.elapsed += Duration::from_secs_f32(dt.max(0.0));

        let mut result = Ok(());
        if !transition.swapped && transition.elapsed >= self.duration / 2 {
            transition.swapped = true;
            result = match &transition.kind {
                TransitionKind::Mode { from, to, options } => {
                    self.swap_mode(*from, *to, &transition.reason, options)
                }
                TransitionKind::World {
                    from_world,
                    to_world,
                } => {
                    self.swap_world(*from_world, *to_world);
                    Ok(())
                }
            };
        }

        if transition.elapsed >= self.duration {
            self.finish(transition);
        } else {
            self.transition = Some(transition);
            self.write_view();
        }
        result
    }

    fn swap_mode(
        &mut self,
        from: GameMode,
        to: GameMode,
        reason: &str,
        options: &ModeEnterOptions,
    ) -> Result<(), ModeError> {
        if let Some(handler) = self.handlers.get_mut(&from) {
            if let Err(error) = handler.exit() {
                warn!(mode = %from, error = %error, "mode_exit_failed");
            }
        }
        let entered = match self.handlers.get_mut(&to) {
            Some(handler) => handler.enter(options),
            None => Err(ModeError::UnknownMode(to)),
        };

        self.current = to;
        self.state.write(|data| {
            data.mode.previous = Some(from);
            data.mode.current = to;
            data.player.mode = to;
        });
        info!(mode = %to, previous = %from, reason, "mode_changed");
        self.bus.publish(Event::ModeChanged {
            mode: to,
            previous_mode: from,
            reason: reason.to_string(),
        });
        entered
    }

    fn swap_world(&mut self, from_world: u32, to_world: u32) {
        self.state.write(|data| {
            data.world.index = to_world;
            let spawn_x = data.world.spawn_x;
            data.player.position = Vec2::new(spawn_x, data.world.road_y);
            data.player.velocity = Vec2::ZERO;
            data.player.acceleration = Vec2::ZERO;
            data.camera.x = (spawn_x - data.world.center_x()).max(data.world.min_x);
            data.interaction.prompt_visible = false;
            if let Some(gate) = data.gate.as_mut() {
                gate.target_world = to_world + 1;
            }
        });
        info!(from_world, to_world, "world_swapped");
    }

    fn finish(&mut self, transition: Transition) {
        self.state.write(|data| data.mode.transition = None);
        if let TransitionKind::World { to_world, .. } = transition.kind {
            info!(world = to_world, "world_transition_completed");
            self.bus
                .publish(Event::WorldTransitionCompleted { world: to_world });
        } else {
            info!(mode = %self.current, reason = %transition.reason, "mode_transition_completed");
        }
        self.bus.publish(Event::TransitionComplete {
            mode: self.current,
            reason: transition.reason,
        });
    }

    /// Every `transition:start` gets a `transition:complete`, cancelled ones
    /// included; it carries the mode the machine is left in.
    fn cancel_transition(&mut self) {
        if let Some(transition) = self.transition.take() {
            info!(reason = %transition.reason, mode = %self.current, "transition_cancelled");
            self.state.write(|data| data.mode.transition = None);
            self.bus.publish(Event::TransitionComplete {
                mode: self.current,
                reason: transition.reason,
            });
        }
    }

    fn write_view(&self) {
        let view = self.transition.as_ref().map(|transition| {
            let half = (self.duration.as_secs_f32() * 0.5).max(f32::EPSILON);
            let elapsed = transition.elapsed.as_secs_f32();
            let (fade, progress) = if transition.swapped {
                (FadeDirection::In, 1.0 - (elapsed - half) / half)
            } else {
                (FadeDirection::Out, elapsed / half)
            };
            let (from, to) = match transition.kind {
                TransitionKind::Mode { from, to, .. } => (from, to),
                TransitionKind::World { .. } => (self.current, self.current),
            };
            TransitionView {
                from,
                to,
                reason: transition.reason.clone(),
                fade,
                progress: progress.clamp(0.0, 1.0),
            }
        });
        self.state.write(|data| data.mode.transition = view);
    }
}

impl Drop for ModeMachine {
    fn drop(&mut self) {
        for subscription in &self.subscriptions {
            subscription.unsubscribe();
        }
    }
}

impl System for ModeMachine {
    fn name(&self) -> &str {
        "modes"
    }

    fn update(&mut self, dt: f32) -> Result<(), SystemError> {
        self.advance(dt).map_err(SystemError::from)
    }
}

fn listen_for_requests(bus: &EventBus, requests: &ModeRequests) -> Vec<Subscription> {
    let mut subscriptions = Vec::with_capacity(4);

    let queue = requests.clone();
    subscriptions.push(bus.on(EventKind::BranchEntered, move |event| {
        if let Event::BranchEntered { branch_id } = event {
            queue.push(ModeRequest::Mode {
                target: GameMode::Timeline,
                reason: format!("branch-{branch_id}"),
                immediate: false,
                options: ModeEnterOptions {
                    branch_id: Some(branch_id.clone()),
                    spawn_x: None,
                },
            });
        }
        Ok(())
    }));

    let queue = requests.clone();
    subscriptions.push(bus.on(EventKind::TimelineExitRequested, move |_| {
        queue.push(ModeRequest::Mode {
            target: GameMode::Road,
            reason: "timeline-exit".to_string(),
            immediate: false,
            options: ModeEnterOptions::default(),
        });
        Ok(())
    }));

    let queue = requests.clone();
    subscriptions.push(bus.on(EventKind::CollisionPlayerGate, move |event| {
        if let Event::CollisionPlayerGate { target_world, .. } = event {
            queue.push(ModeRequest::World {
                target_world: *target_world,
            });
        }
        Ok(())
    }));

    let queue = requests.clone();
    subscriptions.push(bus.on(EventKind::ModeChangeRequested, move |event| {
        if let Event::ModeChangeRequested {
            mode,
            reason,
            immediate,
        } = event
        {
            queue.push(ModeRequest::Mode {
                target: *mode,
                reason: reason.clone(),
                immediate: *immediate,
                options: ModeEnterOptions::default(),
            });
        }
        Ok(())
    }));

    subscriptions
}
