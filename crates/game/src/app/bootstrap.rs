use std::env;
use std::path::PathBuf;
use std::time::Duration;

use roadtrip_engine::{EventBus, EventKind, HandlerError, SimConfig, Simulation, WorldContent};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use super::autopilot::InputScript;
use super::error::AppError;
use super::trace_render::TraceRenderer;

const CONFIG_ENV_VAR: &str = "ROADTRIP_CONFIG";
const CONTENT_ENV_VAR: &str = "ROADTRIP_CONTENT";
const SCRIPT_ENV_VAR: &str = "ROADTRIP_SCRIPT";
const RUN_SECONDS_ENV_VAR: &str = "ROADTRIP_RUN_SECONDS";
const DEFAULT_RUN_SECONDS: u64 = 12;
const TARGET_FPS: u32 = 60;
const TRACE_RENDER_PRIORITY: i32 = 0;

const LIFECYCLE_EVENTS: [EventKind; 9] = [
    EventKind::LoopStarted,
    EventKind::LoopStopped,
    EventKind::ModeChanged,
    EventKind::BranchEntered,
    EventKind::BranchCompleted,
    EventKind::WorldTransitionStarted,
    EventKind::WorldTransitionCompleted,
    EventKind::GameRestarted,
    EventKind::SystemError,
];

const DETAIL_EVENTS: [EventKind; 5] = [
    EventKind::NearObjectEnter,
    EventKind::NearObjectExit,
    EventKind::BoundaryHit,
    EventKind::CollisionPlayerBillboard,
    EventKind::CollisionPlayerGhost,
];

pub(crate) struct AppWiring {
    pub(crate) sim: Simulation,
    pub(crate) script: InputScript,
    pub(crate) run_for: Duration,
    pub(crate) frame_target: Option<Duration>,
}

pub(crate) fn build_app() -> Result<AppWiring, AppError> {
    init_tracing();
    info!("=== Roadtrip Startup ===");

    let config = match env_path(CONFIG_ENV_VAR) {
        Some(path) => {
            info!(path = %path.display(), "config_loading");
            SimConfig::load(&path)?
        }
        None => SimConfig::default(),
    };
    let content = match env_path(CONTENT_ENV_VAR) {
        Some(path) => {
            info!(path = %path.display(), "content_loading");
            WorldContent::load(&path)?
        }
        None => WorldContent::demo(config.world.road_y),
    };
    let script = match env_path(SCRIPT_ENV_VAR) {
        Some(path) => InputScript::load(&path)?,
        None => InputScript::autopilot(),
    };
    let run_for = resolve_run_duration(env::var(RUN_SECONDS_ENV_VAR).ok().as_deref());

    let mut sim = Simulation::new(config, content)?;
    let renderer = TraceRenderer::new(sim.state().clone());
    sim.add_render_system(Box::new(renderer), TRACE_RENDER_PRIORITY);
    install_event_logging(sim.bus());

    info!(
        content_items = sim.content().len(),
        script_steps = script.len(),
        run_seconds = run_for.as_secs_f32(),
        systems = ?sim.system_order(),
        "simulation_ready"
    );

    Ok(AppWiring {
        sim,
        script,
        run_for,
        frame_target: target_frame_duration(Some(TARGET_FPS)),
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn env_path(var: &str) -> Option<PathBuf> {
    env::var_os(var)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn resolve_run_duration(raw: Option<&str>) -> Duration {
    let Some(value) = raw else {
        return Duration::from_secs(DEFAULT_RUN_SECONDS);
    };
    match value.trim().parse::<f64>() {
        Ok(seconds) if seconds.is_finite() && seconds > 0.0 => Duration::from_secs_f64(seconds),
        _ => {
            warn!(
                env_var = RUN_SECONDS_ENV_VAR,
                value,
                "invalid run-seconds env var value; falling back to default"
            );
            Duration::from_secs(DEFAULT_RUN_SECONDS)
        }
    }
}

pub(crate) fn target_frame_duration(max_fps: Option<u32>) -> Option<Duration> {
    max_fps
        .filter(|fps| *fps > 0)
        .map(|fps| Duration::from_secs_f64(1.0 / fps as f64))
}

fn install_event_logging(bus: &EventBus) {
    for kind in LIFECYCLE_EVENTS {
        bus.on(kind, move |event| {
            let payload = serde_json::to_string(event)
                .map_err(|err| HandlerError::msg(err.to_string()))?;
            info!(event = kind.name(), %payload, "sim_event");
            Ok(())
        });
    }
    for kind in DETAIL_EVENTS {
        bus.on(kind, move |event| {
            debug!(event = kind.name(), detail = ?event, "sim_event");
            Ok(())
        });
    }
}
