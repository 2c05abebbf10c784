mod collision;
mod entity;
mod ghost;
mod modes;
mod physics;
mod world;

pub use collision::{Aabb, CollisionDetector, CollisionKind, CollisionRecord};
pub use entity::{
    Entity, Facing, MotionRecorder, MotionSample, Vec2, DEFAULT_RECORDER_CAPACITY,
};
pub use ghost::GhostSystem;
pub use modes::{
    GameMode, ModeEnterOptions, ModeError, ModeHandler, ModeMachine, ModeRequest, ModeRequests,
    RoadMode, TimelineMode,
};
pub use physics::{approach_velocity, PhysicsSystem};
pub use world::{
    CameraState, ClockState, FadeDirection, GateState, GhostState, InteractionState, ModeState,
    Particle, TimelineState, TransitionView, WeatherKind, WeatherState, WorldBounds, WorldData,
};
