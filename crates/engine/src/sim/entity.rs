use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::GameMode;

pub const DEFAULT_RECORDER_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Vec2) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    pub fn lerp(self, other: Vec2, t: f32) -> Vec2 {
        Vec2 {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    Left,
    #[default]
    Right,
    Up,
    Down,
}

/// Kinematic body shared by the player and the ghost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub position: Vec2,
    pub velocity: Vec2,
    pub acceleration: Vec2,
    pub half_extents: Vec2,
    pub facing: Facing,
    pub mode: GameMode,
}

impl Default for Entity {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            velocity: Vec2::ZERO,
            acceleration: Vec2::ZERO,
            half_extents: Vec2::new(24.0, 32.0),
            facing: Facing::Right,
            mode: GameMode::Road,
        }
    }
}

impl Entity {
    pub fn at(position: Vec2, half_extents: Vec2) -> Self {
        Self {
            position,
            half_extents,
            ..Self::default()
        }
    }

    /// Updates `facing` from the dominant velocity component, keeping the
    /// previous facing while the body is (nearly) at rest.
    pub fn face_velocity(&mut self) {
        const REST: f32 = 1.0e-3;
        let Vec2 { x, y } = self.velocity;
        if x.abs() < REST && y.abs() < REST {
            return;
        }
        self.facing = if x.abs() >= y.abs() {
            if x < 0.0 {
                Facing::Left
            } else {
                Facing::Right
            }
        } else if y < 0.0 {
            Facing::Up
        } else {
            Facing::Down
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MotionSample {
    pub position: Vec2,
    pub velocity: Vec2,
    pub facing: Facing,
    pub mode: GameMode,
    pub timestamp: f64,
}

impl MotionSample {
    pub fn of(entity: &Entity, timestamp: f64) -> Self {
        Self {
            position: entity.position,
            velocity: entity.velocity,
            facing: entity.facing,
            mode: entity.mode,
            timestamp,
        }
    }
}

/// Bounded ring of motion samples; the oldest sample is evicted when full.
#[derive(Debug, Clone)]
pub struct MotionRecorder {
    samples: VecDeque<MotionSample>,
    capacity: usize,
}

impl Default for MotionRecorder {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_RECORDER_CAPACITY)
    }
}

impl MotionRecorder {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    pub fn record(&mut self, sample: MotionSample) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Moves the recording out, leaving the recorder empty with the same capacity.
    pub fn take(&mut self) -> Vec<MotionSample> {
        self.samples.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MotionSample> {
        self.samples.iter()
    }
}
