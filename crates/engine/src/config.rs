use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sim::{GameMode, Vec2};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse config json: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("parse config json at {path}: {source}")]
    ParseAt {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("validation failed at {path}: {message}")]
    Invalid { path: &'static str, message: String },
}

/// `{acceleration, friction, max_speed}` for one mode, in world units per second.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionParams {
    pub acceleration: f32,
    pub friction: f32,
    pub max_speed: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub max_dt_ms: u64,
    pub metrics_log_interval_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_dt_ms: 50,
            metrics_log_interval_ms: 1_000,
        }
    }
}

impl SchedulerConfig {
    pub fn max_dt(&self) -> Duration {
        Duration::from_millis(self.max_dt_ms)
    }

    pub fn metrics_log_interval(&self) -> Duration {
        Duration::from_millis(self.metrics_log_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    pub listener_soft_cap: usize,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            listener_soft_cap: crate::app::DEFAULT_LISTENER_SOFT_CAP,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub history_limit: usize,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self { history_limit: 100 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModesConfig {
    pub initial: GameMode,
    pub transition_ms: u64,
}

impl Default for ModesConfig {
    fn default() -> Self {
        Self {
            initial: GameMode::Road,
            transition_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    pub road: MotionParams,
    pub timeline: MotionParams,
    /// Exponential ease constant (1/s) for the timeline camera.
    pub camera_ease: f32,
    /// Exponential decay rate (1/s) for an undriven analog throttle.
    pub throttle_decay: f32,
    pub particle_gravity: f32,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            road: MotionParams {
                acceleration: 1_200.0,
                friction: 1_600.0,
                max_speed: 400.0,
            },
            timeline: MotionParams {
                acceleration: 1_000.0,
                friction: 1_400.0,
                max_speed: 300.0,
            },
            camera_ease: 5.0,
            throttle_decay: 4.0,
            particle_gravity: 600.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionConfig {
    pub throttle_ms: u64,
    pub proximity_threshold: f32,
    pub active_soft_cap: usize,
    pub record_window_ms: u64,
    /// Drop an active-collision identifier as soon as its pair stops overlapping.
    pub clear_on_separation: bool,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            throttle_ms: 16,
            proximity_threshold: 150.0,
            active_soft_cap: 50,
            record_window_ms: 5_000,
            clear_on_separation: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldConfig {
    pub viewport_width: f32,
    pub viewport_height: f32,
    pub road_y: f32,
    pub min_x: f32,
    pub max_x: f32,
    pub timeline_top: f32,
    pub timeline_length: f32,
    pub timeline_entry_offset: f32,
    pub player_spawn_x: f32,
    pub player_half_extents: Vec2,
    pub gate_x: Option<f32>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            viewport_width: 1280.0,
            viewport_height: 720.0,
            road_y: 520.0,
            min_x: 0.0,
            max_x: 10_000.0,
            timeline_top: 0.0,
            timeline_length: 4_000.0,
            timeline_entry_offset: 120.0,
            player_spawn_x: 200.0,
            player_half_extents: Vec2::new(24.0, 32.0),
            gate_x: Some(9_600.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GhostConfig {
    pub enabled: bool,
    pub capacity: usize,
}

impl Default for GhostConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: crate::sim::DEFAULT_RECORDER_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub scheduler: SchedulerConfig,
    pub bus: BusConfig,
    pub state: StateConfig,
    pub modes: ModesConfig,
    pub physics: PhysicsConfig,
    pub collision: CollisionConfig,
    pub world: WorldConfig,
    pub ghost: GhostConfig,
}

impl SimConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let mut deserializer = serde_json::Deserializer::from_str(raw);
        let config = match serde_path_to_error::deserialize::<_, SimConfig>(&mut deserializer) {
            Ok(config) => config,
            Err(error) => {
                let path = error.path().to_string();
                let source = error.into_inner();
                return if path.is_empty() || path == "." {
                    Err(ConfigError::Parse(source))
                } else {
                    Err(ConfigError::ParseAt { path, source })
                };
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.max_dt_ms == 0 {
            return Err(expected_actual("scheduler.max_dt_ms", "> 0", 0));
        }
        if self.modes.transition_ms == 0 {
            return Err(expected_actual("modes.transition_ms", "> 0", 0));
        }
        validate_motion("physics.road", &self.physics.road)?;
        validate_motion("physics.timeline", &self.physics.timeline)?;
        non_negative("physics.camera_ease", self.physics.camera_ease)?;
        non_negative("physics.throttle_decay", self.physics.throttle_decay)?;
        finite("physics.particle_gravity", self.physics.particle_gravity)?;
        non_negative(
            "collision.proximity_threshold",
            self.collision.proximity_threshold,
        )?;
        if self.collision.active_soft_cap == 0 {
            return Err(expected_actual("collision.active_soft_cap", "> 0", 0));
        }
        if self.ghost.capacity == 0 {
            return Err(expected_actual("ghost.capacity", "> 0", 0));
        }

        let world = &self.world;
        if !(world.max_x > world.min_x) {
            return Err(expected_actual(
                "world.max_x",
                format!("> world.min_x ({})", world.min_x),
                world.max_x,
            ));
        }
        if !(world.timeline_length > world.timeline_top) {
            return Err(expected_actual(
                "world.timeline_length",
                format!("> world.timeline_top ({})", world.timeline_top),
                world.timeline_length,
            ));
        }
        non_negative("world.viewport_width", world.viewport_width)?;
        non_negative("world.viewport_height", world.viewport_height)?;
        non_negative("world.player_half_extents.x", world.player_half_extents.x)?;
        non_negative("world.player_half_extents.y", world.player_half_extents.y)?;
        finite("world.road_y", world.road_y)?;
        finite("world.timeline_entry_offset", world.timeline_entry_offset)?;
        finite("world.player_spawn_x", world.player_spawn_x)?;
        Ok(())
    }
}

fn validate_motion(path: &'static str, params: &MotionParams) -> Result<(), ConfigError> {
    for (value, field) in [
        (params.acceleration, "acceleration"),
        (params.friction, "friction"),
        (params.max_speed, "max_speed"),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(ConfigError::Invalid {
                path,
                message: format!("{field}: expected finite number >= 0, got {value}"),
            });
        }
    }
    Ok(())
}

fn non_negative(path: &'static str, value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(expected_actual(path, "finite number >= 0", value));
    }
    Ok(())
}

fn finite(path: &'static str, value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(expected_actual(path, "finite number", value));
    }
    Ok(())
}

fn expected_actual(path: &'static str, expected: impl Display, actual: impl Display) -> ConfigError {
    ConfigError::Invalid {
        path,
        message: format!("expected {expected}, got {actual}"),
    }
}
