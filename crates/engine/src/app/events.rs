use serde::Serialize;
use serde_json::Value;

use crate::content::ContentRef;
use crate::sim::{GameMode, Vec2};

/// Phase a scheduled system was running when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemPhase {
    Update,
    Render,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PhaseTimings {
    pub update_ms: f32,
    pub render_ms: f32,
    pub total_ms: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FrameStats {
    pub frame: u64,
    pub fps: f32,
    pub dt: f32,
    pub timings: PhaseTimings,
}

/// Payload of `state:changed`. `path` is `"*"` for whole-tree updates and resets,
/// in which case `previous`/`current` are full snapshots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateChange {
    pub path: String,
    pub previous: Value,
    pub current: Value,
}

impl StateChange {
    pub fn is_wildcard(&self) -> bool {
        self.path == "*"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundarySide {
    Left,
    Right,
    Top,
    Bottom,
}

impl BoundarySide {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Top => "top",
            Self::Bottom => "bottom",
        }
    }
}

/// Every message that crosses a component boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    PreUpdate { dt: f32 },
    PhysicsUpdate { dt: f32 },
    PostUpdate { dt: f32 },
    PostRender { dt: f32 },
    FrameComplete(FrameStats),
    SystemError {
        system: String,
        phase: SystemPhase,
        message: String,
    },
    StateChanged(StateChange),
    TransitionStart {
        from: GameMode,
        to: GameMode,
        reason: String,
        duration_ms: u64,
    },
    ModeChanged {
        mode: GameMode,
        previous_mode: GameMode,
        reason: String,
    },
    TransitionComplete {
        mode: GameMode,
        reason: String,
    },
    ModeChangeRequested {
        mode: GameMode,
        reason: String,
        immediate: bool,
    },
    TimelineExitRequested { player_y: f32 },
    BranchEntered { branch_id: String },
    BranchCompleted { branch_id: String },
    WorldTransitionStarted { from_world: u32, to_world: u32 },
    WorldTransitionCompleted { world: u32 },
    CollisionPlayerBranch { branch_id: String, timestamp: f64 },
    CollisionPlayerBillboard { billboard_id: String, timestamp: f64 },
    CollisionPlayerGhost { timestamp: f64 },
    CollisionPlayerGate { target_world: u32, timestamp: f64 },
    BoundaryHit { side: BoundarySide, position: Vec2 },
    NearObjectEnter { object: ContentRef, distance: f32 },
    NearObjectExit { object: ContentRef },
    GameRestarted { session: u32 },
    LoopStarted,
    LoopStopped { frames: u64 },
    Debug { label: String, data: Value },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PreUpdate,
    PhysicsUpdate,
    PostUpdate,
    PostRender,
    FrameComplete,
    SystemError,
    StateChanged,
    TransitionStart,
    ModeChanged,
    TransitionComplete,
    ModeChangeRequested,
    TimelineExitRequested,
    BranchEntered,
    BranchCompleted,
    WorldTransitionStarted,
    WorldTransitionCompleted,
    CollisionPlayerBranch,
    CollisionPlayerBillboard,
    CollisionPlayerGhost,
    CollisionPlayerGate,
    BoundaryHit,
    NearObjectEnter,
    NearObjectExit,
    GameRestarted,
    LoopStarted,
    LoopStopped,
    Debug,
}

impl EventKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::PreUpdate => "pre-update",
            Self::PhysicsUpdate => "physics-update",
            Self::PostUpdate => "post-update",
            Self::PostRender => "post-render",
            Self::FrameComplete => "frame-complete",
            Self::SystemError => "system:error",
            Self::StateChanged => "state:changed",
            Self::TransitionStart => "transition:start",
            Self::ModeChanged => "mode:changed",
            Self::TransitionComplete => "transition:complete",
            Self::ModeChangeRequested => "mode:change-requested",
            Self::TimelineExitRequested => "timeline:exit-requested",
            Self::BranchEntered => "branch:entered",
            Self::BranchCompleted => "branch:completed",
            Self::WorldTransitionStarted => "world:transition-started",
            Self::WorldTransitionCompleted => "world:transition-completed",
            Self::CollisionPlayerBranch => "collision:player-branch",
            Self::CollisionPlayerBillboard => "collision:player-billboard",
            Self::CollisionPlayerGhost => "collision:player-ghost",
            Self::CollisionPlayerGate => "collision:player-gate",
            Self::BoundaryHit => "boundary:hit",
            Self::NearObjectEnter => "near-object:enter",
            Self::NearObjectExit => "near-object:exit",
            Self::GameRestarted => "game:restarted",
            Self::LoopStarted => "loop:started",
            Self::LoopStopped => "loop:stopped",
            Self::Debug => "debug",
        }
    }
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::PreUpdate { .. } => EventKind::PreUpdate,
            Self::PhysicsUpdate { .. } => EventKind::PhysicsUpdate,
            Self::PostUpdate { .. } => EventKind::PostUpdate,
            Self::PostRender { .. } => EventKind::PostRender,
            Self::FrameComplete(_) => EventKind::FrameComplete,
            Self::SystemError { .. } => EventKind::SystemError,
            Self::StateChanged(_) => EventKind::StateChanged,
            Self::TransitionStart { .. } => EventKind::TransitionStart,
            Self::ModeChanged { .. } => EventKind::ModeChanged,
            Self::TransitionComplete { .. } => EventKind::TransitionComplete,
            Self::ModeChangeRequested { .. } => EventKind::ModeChangeRequested,
            Self::TimelineExitRequested { .. } => EventKind::TimelineExitRequested,
            Self::BranchEntered { .. } => EventKind::BranchEntered,
            Self::BranchCompleted { .. } => EventKind::BranchCompleted,
            Self::WorldTransitionStarted { .. } => EventKind::WorldTransitionStarted,
            Self::WorldTransitionCompleted { .. } => EventKind::WorldTransitionCompleted,
            Self::CollisionPlayerBranch { .. } => EventKind::CollisionPlayerBranch,
            Self::CollisionPlayerBillboard { .. } => EventKind::CollisionPlayerBillboard,
            Self::CollisionPlayerGhost { .. } => EventKind::CollisionPlayerGhost,
            Self::CollisionPlayerGate { .. } => EventKind::CollisionPlayerGate,
            Self::BoundaryHit { .. } => EventKind::BoundaryHit,
            Self::NearObjectEnter { .. } => EventKind::NearObjectEnter,
            Self::NearObjectExit { .. } => EventKind::NearObjectExit,
            Self::GameRestarted { .. } => EventKind::GameRestarted,
            Self::LoopStarted => EventKind::LoopStarted,
            Self::LoopStopped { .. } => EventKind::LoopStopped,
            Self::Debug { .. } => EventKind::Debug,
        }
    }

    pub fn name(&self) -> &'static str {
        self.kind().name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_use_colon_namespaces() {
        let event = Event::ModeChanged {
            mode: GameMode::Timeline,
            previous_mode: GameMode::Road,
            reason: "branch-phase1".to_string(),
        };
        assert_eq!(event.name(), "mode:changed");
        assert_eq!(EventKind::FrameComplete.name(), "frame-complete");
    }

    #[test]
    fn events_serialize_with_tag() {
        let event = Event::BranchEntered {
            branch_id: "phase1".to_string(),
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["event"], "branch_entered");
        assert_eq!(json["branch_id"], "phase1");
    }
}
