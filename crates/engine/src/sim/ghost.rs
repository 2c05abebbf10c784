use tracing::info;

use super::entity::{MotionRecorder, MotionSample};
use crate::app::{System, SystemError, WorldState};
use crate::config::GhostConfig;

/// Records the player every tick and, once a new session starts, replays the
/// previous session's recording through `ghost.*`.
pub struct GhostSystem {
    state: WorldState,
    enabled: bool,
    recorder: MotionRecorder,
    track: Vec<MotionSample>,
    cursor: usize,
    playback_start: f64,
    session: u32,
}

impl GhostSystem {
    pub fn new(state: WorldState, config: &GhostConfig) -> Self {
        let session = state.read(|data| data.session);
        Self {
            state,
            enabled: config.enabled,
            recorder: MotionRecorder::with_capacity(config.capacity),
            track: Vec::new(),
            cursor: 0,
            playback_start: 0.0,
            session,
        }
    }

    pub fn recorded_len(&self) -> usize {
        self.recorder.len()
    }

    pub fn is_replaying(&self) -> bool {
        !self.track.is_empty()
    }

    fn begin_playback(&mut self, now: f64) {
        self.track = self.recorder.take();
        self.cursor = 0;
        self.playback_start = now;
        info!(samples = self.track.len(), session = self.session, "ghost_playback_started");
    }

    fn replay(&mut self, now: f64) {
        let Some(first) = self.track.first() else {
            return;
        };
        let playback_time = now - self.playback_start;
        let target = first.timestamp + playback_time;
        while self.cursor + 1 < self.track.len() && self.track[self.cursor + 1].timestamp <= target {
            self.cursor += 1;
        }

        let from = self.track[self.cursor];
        let Some(to) = self.track.get(self.cursor + 1).copied() else {
            self.track.clear();
            self.state.write(|data| {
                data.ghost.active = false;
                data.ghost.playback_time = playback_time;
            });
            info!("ghost_playback_finished");
            return;
        };

        let span = to.timestamp - from.timestamp;
        let t = if span > 0.0 {
            ((target - from.timestamp) / span).clamp(0.0, 1.0) as f32
        } else {
            1.0
        };
        self.state.write(|data| {
            let ghost = &mut data.ghost;
            ghost.active = true;
            ghost.playback_time = playback_time;
            ghost.body.position = from.position.lerp(to.position, t);
            ghost.body.velocity = from.velocity.lerp(to.velocity, t);
            ghost.body.facing = from.facing;
            ghost.body.mode = from.mode;
        });
    }
}

impl System for GhostSystem {
    fn name(&self) -> &str {
        "ghost"
    }

    fn update(&mut self, _dt: f32) -> Result<(), SystemError> {
        if !self.enabled {
            return Ok(());
        }
        let (player, now, session) =
            self.state
                .read(|data| (data.player, data.clock.elapsed, data.session));
        if session != self.session {
            self.session = session;
            self.begin_playback(now);
        }
        self.recorder.record(MotionSample::of(&player, now));
        self.replay(now);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::EventBus;
    use crate::sim::WorldData;

    fn ghost(config: &GhostConfig) -> (GhostSystem, WorldState) {
        let state = WorldState::new(EventBus::default(), WorldData::default(), 0);
        (GhostSystem::new(state.clone(), config), state)
    }

    fn tick(system: &mut GhostSystem, state: &WorldState, dt: f64, player_x: f32) {
        state.write(|data| {
            data.clock.elapsed += dt;
            data.player.position.x = player_x;
        });
        system.update(dt as f32).expect("update");
    }

    #[test]
    fn records_every_tick_without_playback_in_first_session() {
        let (mut system, state) = ghost(&GhostConfig::default());
        for step in 0..5 {
            tick(&mut system, &state, 0.1, step as f32 * 10.0);
        }
        assert_eq!(system.recorded_len(), 5);
        assert!(!state.read(|data| data.ghost.active));
    }

    #[test]
    fn new_session_replays_previous_recording_then_stops() {
        let (mut system, state) = ghost(&GhostConfig::default());
        for step in 0..=4 {
            tick(&mut system, &state, 0.1, 100.0 + step as f32 * 10.0);
        }

        state.write(|data| {
            data.session += 1;
            data.clock.elapsed = 0.0;
        });
        system.update(0.0).expect("update");
        assert!(system.is_replaying());
        state.read(|data| {
            assert!(data.ghost.active);
            assert!((data.ghost.body.position.x - 100.0).abs() < 1.0e-3);
        });

        tick(&mut system, &state, 0.15, 0.0);
        let x = state.read(|data| data.ghost.body.position.x);
        assert!((x - 115.0).abs() < 1.0e-2, "ghost at {x}");

        for _ in 0..5 {
            tick(&mut system, &state, 0.1, 0.0);
        }
        assert!(!system.is_replaying());
        assert!(!state.read(|data| data.ghost.active));
    }

    #[test]
    fn disabled_ghost_does_nothing() {
        let config = GhostConfig {
            enabled: false,
            ..GhostConfig::default()
        };
        let (mut system, state) = ghost(&config);
        tick(&mut system, &state, 0.1, 10.0);
        assert_eq!(system.recorded_len(), 0);
    }

    #[test]
    fn recorder_capacity_comes_from_config() {
        let config = GhostConfig {
            capacity: 3,
            ..GhostConfig::default()
        };
        let (mut system, state) = ghost(&config);
        for step in 0..10 {
            tick(&mut system, &state, 0.1, step as f32);
        }
        assert_eq!(system.recorded_len(), 3);
    }
}
