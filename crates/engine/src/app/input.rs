use std::cell::RefCell;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::scheduler::{System, SystemError};
use super::world_state::WorldState;

const THROTTLE_SNAP_EPSILON: f32 = 1.0e-3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputAction {
    Left,
    Right,
    Up,
    Down,
    Interact,
    Jump,
}

const ACTION_COUNT: usize = 6;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ActionStates {
    down: [bool; ACTION_COUNT],
}

impl ActionStates {
    pub(crate) fn set(&mut self, action: InputAction, is_down: bool) {
        self.down[action.index()] = is_down;
    }

    pub(crate) fn is_down(&self, action: InputAction) -> bool {
        self.down[action.index()]
    }
}

impl InputAction {
    pub const ALL: [InputAction; ACTION_COUNT] = [
        InputAction::Left,
        InputAction::Right,
        InputAction::Up,
        InputAction::Down,
        InputAction::Interact,
        InputAction::Jump,
    ];

    const fn index(self) -> usize {
        match self {
            InputAction::Left => 0,
            InputAction::Right => 1,
            InputAction::Up => 2,
            InputAction::Down => 3,
            InputAction::Interact => 4,
            InputAction::Jump => 5,
        }
    }
}

/// Normalized key flags as stored in `WorldState.keys`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyState {
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub interact: bool,
    pub jump: bool,
}

impl KeyState {
    fn from_actions(actions: &ActionStates) -> Self {
        Self {
            left: actions.is_down(InputAction::Left),
            right: actions.is_down(InputAction::Right),
            up: actions.is_down(InputAction::Up),
            down: actions.is_down(InputAction::Down),
            interact: actions.is_down(InputAction::Interact),
            jump: actions.is_down(InputAction::Jump),
        }
    }

    pub fn horizontal_axis(&self) -> f32 {
        axis(self.left, self.right)
    }

    /// Positive is downwards (towards the end of the timeline).
    pub fn vertical_axis(&self) -> f32 {
        axis(self.up, self.down)
    }
}

fn axis(negative: bool, positive: bool) -> f32 {
    match (negative, positive) {
        (true, false) => -1.0,
        (false, true) => 1.0,
        _ => 0.0,
    }
}

/// Analog touch throttle, each channel in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Throttle {
    pub left: f32,
    pub right: f32,
}

impl Throttle {
    pub fn clamped(self) -> Self {
        Self {
            left: clamp_unit(self.left),
            right: clamp_unit(self.right),
        }
    }

    pub fn axis(&self) -> f32 {
        self.right - self.left
    }

    pub fn is_idle(&self) -> bool {
        self.left == 0.0 && self.right == 0.0
    }

    fn decayed(self, rate: f32, dt: f32) -> Self {
        let factor = (-rate.max(0.0) * dt.max(0.0)).exp();
        Self {
            left: snap_to_zero(self.left * factor),
            right: snap_to_zero(self.right * factor),
        }
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

fn snap_to_zero(value: f32) -> f32 {
    if value < THROTTLE_SNAP_EPSILON {
        0.0
    } else {
        value
    }
}

#[derive(Debug, Default)]
struct FeedState {
    actions: ActionStates,
    driven_throttle: Option<Throttle>,
}

/// Write side for the external input layer. Cloned handles share one state.
#[derive(Debug, Clone, Default)]
pub struct InputFeed {
    state: Rc<RefCell<FeedState>>,
}

impl InputFeed {
    pub fn set_action(&self, action: InputAction, is_down: bool) {
        self.state.borrow_mut().actions.set(action, is_down);
    }

    pub fn is_down(&self, action: InputAction) -> bool {
        self.state.borrow().actions.is_down(action)
    }

    pub fn release_all(&self) {
        let mut state = self.state.borrow_mut();
        state.actions = ActionStates::default();
        state.driven_throttle = None;
    }

    /// Holds the throttle at `throttle` until [`release_throttle`](Self::release_throttle).
    pub fn drive_throttle(&self, throttle: Throttle) {
        self.state.borrow_mut().driven_throttle = Some(throttle.clamped());
    }

    pub fn release_throttle(&self) {
        self.state.borrow_mut().driven_throttle = None;
    }

    fn key_state(&self) -> KeyState {
        KeyState::from_actions(&self.state.borrow().actions)
    }

    fn driven_throttle(&self) -> Option<Throttle> {
        self.state.borrow().driven_throttle
    }
}

/// First system of every tick: copies the feed into `WorldState.keys` and
/// `WorldState.throttle`, decaying an undriven throttle towards zero.
pub struct InputSystem {
    feed: InputFeed,
    state: WorldState,
    throttle_decay: f32,
}

impl InputSystem {
    pub fn new(feed: InputFeed, state: WorldState, throttle_decay: f32) -> Self {
        Self {
            feed,
            state,
            throttle_decay,
        }
    }
}

impl System for InputSystem {
    fn name(&self) -> &str {
        "input"
    }

    fn update(&mut self, dt: f32) -> Result<(), SystemError> {
        let keys = self.feed.key_state();
        let driven = self.feed.driven_throttle();
        let decay = self.throttle_decay;
        self.state.write(|data| {
            data.keys = keys;
            data.throttle = match driven {
                Some(throttle) => throttle,
                None => data.throttle.decayed(decay, dt),
            };
        });
        trace!(?keys, "input_sampled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::EventBus;
    use crate::sim::WorldData;

    fn system_with_feed() -> (InputSystem, InputFeed, WorldState) {
        let feed = InputFeed::default();
        let state = WorldState::new(EventBus::default(), WorldData::default(), 0);
        let system = InputSystem::new(feed.clone(), state.clone(), 4.0);
        (system, feed, state)
    }

    #[test]
    fn actions_map_to_key_flags() {
        let (mut system, feed, state) = system_with_feed();
        feed.set_action(InputAction::Right, true);
        feed.set_action(InputAction::Interact, true);
        system.update(0.016).expect("update");

        let keys = state.read(|data| data.keys);
        assert!(keys.right);
        assert!(keys.interact);
        assert!(!keys.left);
        assert_eq!(keys.horizontal_axis(), 1.0);
    }

    #[test]
    fn opposing_keys_cancel() {
        let keys = KeyState {
            left: true,
            right: true,
            ..KeyState::default()
        };
        assert_eq!(keys.horizontal_axis(), 0.0);
    }

    #[test]
    fn key_release_clears_flag() {
        let (mut system, feed, state) = system_with_feed();
        feed.set_action(InputAction::Up, true);
        system.update(0.016).expect("update");
        feed.set_action(InputAction::Up, false);
        system.update(0.016).expect("update");
        assert!(!state.read(|data| data.keys.up));
    }

    #[test]
    fn driven_throttle_is_held_then_decays_to_zero() {
        let (mut system, feed, state) = system_with_feed();
        feed.drive_throttle(Throttle {
            left: 0.0,
            right: 1.5,
        });
        system.update(0.016).expect("update");
        assert_eq!(state.read(|data| data.throttle.right), 1.0);

        feed.release_throttle();
        system.update(0.1).expect("update");
        let after_one = state.read(|data| data.throttle.right);
        assert!(after_one < 1.0 && after_one > 0.0);

        for _ in 0..200 {
            system.update(0.05).expect("update");
        }
        assert!(state.read(|data| data.throttle.is_idle()));
    }
}
