use roadtrip_engine::{RenderSystem, System, SystemError, WorldState};
use tracing::info;

const SUMMARY_INTERVAL_SECONDS: f32 = 1.0;

/// Stands in for a renderer: logs one line describing the world each second.
pub(crate) struct TraceRenderer {
    state: WorldState,
    since_summary: f32,
    frames: u64,
    summaries: u64,
}

impl TraceRenderer {
    pub(crate) fn new(state: WorldState) -> Self {
        Self {
            state,
            since_summary: 0.0,
            frames: 0,
            summaries: 0,
        }
    }

    #[cfg(test)]
    fn summaries(&self) -> u64 {
        self.summaries
    }
}

impl System for TraceRenderer {
    fn name(&self) -> &str {
        "trace_renderer"
    }

    fn update(&mut self, _dt: f32) -> Result<(), SystemError> {
        Ok(())
    }
}

impl RenderSystem for TraceRenderer {
    fn render(&mut self, dt: f32) -> Result<(), SystemError> {
        self.frames += 1;
        self.since_summary += dt.max(0.0);
        if self.since_summary < SUMMARY_INTERVAL_SECONDS {
            return Ok(());
        }
        self.since_summary -= SUMMARY_INTERVAL_SECONDS;
        self.summaries += 1;

        self.state.read(|data| {
            info!(
                frames = self.frames,
                elapsed = data.clock.elapsed,
                mode = %data.mode.current,
                transitioning = data.mode.is_transitioning(),
                world = data.world.index,
                x = data.player.position.x.round(),
                y = data.player.position.y.round(),
                vx = data.player.velocity.x.round(),
                near = %data
                    .interaction
                    .near_object
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "none".to_string()),
                ghost = data.ghost.active,
                session = data.session,
                "frame_summary"
            );
        });
        Ok(())
    }
}
