pub mod app;
pub mod config;
pub mod content;
pub mod sim;

pub use app::{
    BoundarySide, Event, EventBus, EventKind, FrameStats, GameLoop, HandlerError, HandlerResult,
    InputAction, InputFeed, KeyState, LoopMetricsSnapshot, LoopState, RenderSystem, SharedSystem,
    SimError, Simulation, StateChange, StateError, SubscribeOptions, Subscription, System,
    SystemError, SystemId, SystemPhase, Throttle, WorldState,
};
pub use config::{
    BusConfig, CollisionConfig, ConfigError, GhostConfig, ModesConfig, MotionParams,
    PhysicsConfig, SchedulerConfig, SimConfig, StateConfig, WorldConfig,
};
pub use content::{ContentError, ContentItem, ContentKind, ContentRef, WorldContent};
pub use sim::{
    approach_velocity, Aabb, CollisionKind, CollisionRecord, Entity, Facing, GameMode,
    ModeEnterOptions, ModeError, MotionRecorder, MotionSample, Vec2, WorldData,
};
