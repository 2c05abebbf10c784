mod event_bus;
mod events;
mod input;
mod metrics;
mod scheduler;
mod simulation;
mod world_state;

pub use event_bus::{
    EventBus, HandlerError, HandlerResult, SubscribeOptions, Subscription, SubscriptionId,
    DEFAULT_LISTENER_SOFT_CAP,
};
pub use events::{
    BoundarySide, Event, EventKind, FrameStats, PhaseTimings, StateChange, SystemPhase,
};
pub use input::{InputAction, InputFeed, InputSystem, KeyState, Throttle};
pub use metrics::{LoopMetricsSnapshot, RollingMsStats};
pub use scheduler::{GameLoop, LoopState, RenderSystem, SharedSystem, System, SystemError, SystemId};
pub use simulation::{
    SimError, Simulation, COLLISION_PRIORITY, GHOST_PRIORITY, INPUT_PRIORITY, MODE_PRIORITY,
    PHYSICS_PRIORITY,
};
pub use world_state::{StateError, WorldState, DEFAULT_HISTORY_LIMIT, WILDCARD};
