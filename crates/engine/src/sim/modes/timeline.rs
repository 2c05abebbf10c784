use tracing::{debug, info};

use super::{GameMode, ModeEnterOptions, ModeError, ModeHandler};
use crate::app::{Event, EventBus, WorldState};
use crate::sim::Vec2;

/// Vertical corridor for one branch. The player is held at the horizontal
/// centre of the viewport and moves up and down the timeline; pushing past
/// the top asks to go back to the road.
pub struct TimelineMode {
    state: WorldState,
    bus: EventBus,
}

impl TimelineMode {
    pub fn new(state: WorldState, bus: EventBus) -> Self {
        Self { state, bus }
    }
}

impl ModeHandler for TimelineMode {
    fn mode(&self) -> GameMode {
        GameMode::Timeline
    }

    fn enter(&mut self, options: &ModeEnterOptions) -> Result<(), ModeError> {
        let branch_id = options.branch_id.clone();
        self.state.write(|data| {
            let timeline = &mut data.timeline;
            timeline.return_x = data.player.position.x;
            timeline.active_branch = branch_id.clone();
            timeline.exit_requested = false;

            let y = timeline.top + timeline.entry_offset;
            data.player.position = Vec2::new(data.world.center_x(), y);
            data.player.velocity = Vec2::ZERO;
            data.player.acceleration = Vec2::ZERO;
            data.player.mode = GameMode::Timeline;

            let scroll = timeline.scroll_target_for(y, data.world.viewport_height);
            timeline.scroll = scroll;
            timeline.scroll_target = scroll;
            timeline.progress = timeline.progress_at(y);
            data.camera.x = 0.0;
            data.camera.y = scroll;
            data.interaction.prompt_visible = false;
        });
        debug!(branch = ?branch_id, "timeline_entered");
        Ok(())
    }

    fn exit(&mut self) -> Result<(), ModeError> {
        let finished = self.state.write(|data| {
            let timeline = &mut data.timeline;
            let y = data.player.position.y.clamp(timeline.top, timeline.length);
            let scroll = timeline.scroll_target_for(y, data.world.viewport_height);
            timeline.scroll = scroll;
            timeline.scroll_target = scroll;
            timeline.exit_requested = false;

            data.player.position = Vec2::new(timeline.return_x, y);
            data.player.velocity = Vec2::ZERO;
            data.camera.y = 0.0;
            timeline.active_branch.take()
        });
        if let Some(branch_id) = finished {
            info!(branch = %branch_id, "branch_completed");
            self.bus.publish(Event::BranchCompleted { branch_id });
        }
        Ok(())
    }

    fn update(&mut self, _dt: f32) -> Result<(), ModeError> {
        self.state.write(|data| {
            data.timeline.progress = data.timeline.progress_at(data.player.position.y);
        });
        Ok(())
    }
}
