use serde::{Deserialize, Serialize};

use super::entity::{Entity, Vec2};
use super::GameMode;
use crate::app::{KeyState, Throttle};
use crate::config::SimConfig;
use crate::content::ContentRef;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraState {
    pub x: f32,
    pub y: f32,
    pub zoom: f32,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FadeDirection {
    Out,
    In,
}

/// Renderer-facing view of an in-flight transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionView {
    pub from: GameMode,
    pub to: GameMode,
    pub reason: String,
    pub fade: FadeDirection,
    /// Screen darkness in `[0, 1]`: rises during the fade-out, falls during the fade-in.
    pub progress: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModeState {
    pub current: GameMode,
    pub previous: Option<GameMode>,
    pub transition: Option<TransitionView>,
}

impl ModeState {
    pub fn is_transitioning(&self) -> bool {
        self.transition.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineState {
    pub active_branch: Option<String>,
    pub top: f32,
    pub length: f32,
    pub entry_offset: f32,
    pub scroll: f32,
    pub scroll_target: f32,
    /// Road x to return the player to once the timeline is left.
    pub return_x: f32,
    pub progress: f32,
    pub exit_requested: bool,
}

impl TimelineState {
    /// Scroll offset that centres `player_y` in a viewport of the given height,
    /// clamped so the view never leaves the corridor.
    pub fn scroll_target_for(&self, player_y: f32, viewport_height: f32) -> f32 {
        let max_scroll = (self.length - viewport_height).max(self.top);
        (player_y - viewport_height * 0.5).clamp(self.top, max_scroll)
    }

    /// Fraction of the corridor travelled, in `[0, 1]`.
    pub fn progress_at(&self, player_y: f32) -> f32 {
        let span = self.length - self.top;
        if span <= f32::EPSILON {
            return 0.0;
        }
        ((player_y - self.top) / span).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldBounds {
    pub index: u32,
    pub min_x: f32,
    pub max_x: f32,
    pub road_y: f32,
    pub viewport_width: f32,
    pub viewport_height: f32,
    pub spawn_x: f32,
}

impl WorldBounds {
    pub fn center_x(&self) -> f32 {
        self.viewport_width * 0.5
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GhostState {
    pub active: bool,
    pub body: Entity,
    pub playback_time: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherKind {
    #[default]
    Clear,
    Rain,
    Snow,
    Fog,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WeatherState {
    pub kind: WeatherKind,
    pub intensity: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateState {
    pub open: bool,
    pub position: Vec2,
    pub half_extents: Vec2,
    pub target_world: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionState {
    pub near_object: Option<ContentRef>,
    pub prompt_visible: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    pub position: Vec2,
    pub velocity: Vec2,
    pub ttl: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClockState {
    pub frame: u64,
    pub elapsed: f64,
}

/// The whole mutable simulation state. One instance lives inside the
/// simulation's `WorldState`; every other component reads and writes through it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldData {
    pub player: Entity,
    pub camera: CameraState,
    pub mode: ModeState,
    pub timeline: TimelineState,
    pub keys: KeyState,
    pub throttle: Throttle,
    pub world: WorldBounds,
    pub ghost: GhostState,
    pub weather: WeatherState,
    pub gate: Option<GateState>,
    pub interaction: InteractionState,
    pub particles: Vec<Particle>,
    pub clock: ClockState,
    pub session: u32,
}

impl Default for WorldData {
    fn default() -> Self {
        Self::from_config(&SimConfig::default())
    }
}

impl WorldData {
    pub fn from_config(config: &SimConfig) -> Self {
        let world = &config.world;
        let initial_mode = config.modes.initial;
        let mut player = Entity::at(
            Vec2::new(world.player_spawn_x, world.road_y),
            world.player_half_extents,
        );
        player.mode = initial_mode;

        let bounds = WorldBounds {
            index: 0,
            min_x: world.min_x,
            max_x: world.max_x,
            road_y: world.road_y,
            viewport_width: world.viewport_width,
            viewport_height: world.viewport_height,
            spawn_x: world.player_spawn_x,
        };

        Self {
            player,
            camera: CameraState {
                x: (world.player_spawn_x - bounds.center_x()).max(world.min_x),
                ..CameraState::default()
            },
            mode: ModeState {
                current: initial_mode,
                previous: None,
                transition: None,
            },
            timeline: TimelineState {
                active_branch: None,
                top: world.timeline_top,
                length: world.timeline_length,
                entry_offset: world.timeline_entry_offset,
                scroll: 0.0,
                scroll_target: 0.0,
                return_x: world.player_spawn_x,
                progress: 0.0,
                exit_requested: false,
            },
            keys: KeyState::default(),
            throttle: Throttle::default(),
            world: bounds,
            ghost: GhostState {
                active: false,
                body: Entity::at(player.position, world.player_half_extents),
                playback_time: 0.0,
            },
            weather: WeatherState::default(),
            gate: world.gate_x.map(|x| GateState {
                open: true,
                position: Vec2::new(x, world.road_y),
                half_extents: Vec2::new(40.0, 120.0),
                target_world: 1,
            }),
            interaction: InteractionState::default(),
            particles: Vec::new(),
            clock: ClockState::default(),
            session: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_world_places_player_on_the_road() {
        let data = WorldData::default();
        assert_eq!(data.player.position.y, data.world.road_y);
        assert_eq!(data.mode.current, GameMode::Road);
        assert!(!data.mode.is_transitioning());
        assert!(data.gate.is_some());
    }

    #[test]
    fn world_data_serializes_with_named_fields() {
        let value = serde_json::to_value(WorldData::default()).expect("serialize");
        assert_eq!(value["mode"]["current"], "road");
        assert!(value["player"]["position"]["x"].is_number());
    }
}
