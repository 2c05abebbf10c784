use tracing::debug;

use super::world::{Particle, WorldData};
use super::GameMode;
use crate::app::{Event, EventBus, System, SystemError, WorldState};
use crate::config::{MotionParams, PhysicsConfig};

/// Moves `current` toward `direction * max_speed` with a frame-rate independent
/// exponential blend. The rate is `acceleration / max_speed` while input is
/// held and `friction / max_speed` otherwise. A zero `max_speed` stops the
/// body outright.
pub fn approach_velocity(current: f32, direction: f32, params: &MotionParams, dt: f32) -> f32 {
    let max_speed = params.max_speed;
    if max_speed <= 0.0 || !current.is_finite() {
        return 0.0;
    }
    let direction = direction.clamp(-1.0, 1.0);
    let driving = direction != 0.0;
    let (target, rate) = if driving {
        (direction * max_speed, params.acceleration / max_speed)
    } else {
        (0.0, params.friction / max_speed)
    };
    let blend = 1.0 - (-rate * dt.max(0.0)).exp();
    let mut next = current + (target - current) * blend;
    if !driving && next.signum() != current.signum() {
        next = 0.0;
    }
    next.clamp(-max_speed, max_speed)
}

/// Integrates the player according to the current mode, eases the timeline
/// camera and advances particles.
pub struct PhysicsSystem {
    state: WorldState,
    bus: EventBus,
    config: PhysicsConfig,
}

impl PhysicsSystem {
    pub fn new(state: WorldState, bus: EventBus, config: PhysicsConfig) -> Self {
        Self { state, bus, config }
    }
}

impl System for PhysicsSystem {
    fn name(&self) -> &str {
        "physics"
    }

    fn update(&mut self, dt: f32) -> Result<(), SystemError> {
        let config = &self.config;
        let exit_at = self.state.write(|data| {
            let exit_at = match data.mode.current {
                GameMode::Road => {
                    integrate_road(data, &config.road, dt);
                    None
                }
                GameMode::Timeline => integrate_timeline(data, config, dt),
            };
            data.player.face_velocity();
            integrate_particles(&mut data.particles, config.particle_gravity, dt);
            exit_at
        });

        if let Some(player_y) = exit_at {
            debug!(player_y, "timeline_exit_requested");
            self.bus.publish(Event::TimelineExitRequested { player_y });
        }
        Ok(())
    }
}

fn integrate_road(data: &mut WorldData, params: &MotionParams, dt: f32) {
    let direction = if data.mode.is_transitioning() {
        0.0
    } else {
        (data.keys.horizontal_axis() + data.throttle.axis()).clamp(-1.0, 1.0)
    };
    let player = &mut data.player;
    let previous = player.velocity.x;
    player.velocity.x = approach_velocity(previous, direction, params, dt);
    player.acceleration.x = rate_of_change(previous, player.velocity.x, dt);
    player.position.x += player.velocity.x * dt;

    player.position.y = data.world.road_y;
    player.velocity.y = 0.0;
    player.acceleration.y = 0.0;
}

/// Returns the player's y when this tick crossed the top of the corridor
/// while moving up.
fn integrate_timeline(data: &mut WorldData, config: &PhysicsConfig, dt: f32) -> Option<f32> {
    let transitioning = data.mode.is_transitioning();
    let direction = if transitioning {
        0.0
    } else {
        data.keys.vertical_axis()
    };
    let timeline = &mut data.timeline;
    let player = &mut data.player;

    let previous = player.velocity.y;
    player.velocity.y = approach_velocity(previous, direction, &config.timeline, dt);
    player.acceleration.y = rate_of_change(previous, player.velocity.y, dt);
    player.position.y += player.velocity.y * dt;

    player.position.x = data.world.center_x();
    player.velocity.x = 0.0;
    player.acceleration.x = 0.0;

    let mut exit_at = None;
    if player.position.y < timeline.top {
        if player.velocity.y < 0.0 && !timeline.exit_requested && !transitioning {
            timeline.exit_requested = true;
            exit_at = Some(player.position.y);
        }
        player.position.y = timeline.top;
        player.velocity.y = 0.0;
    }
    player.position.y = player.position.y.min(timeline.length);

    timeline.scroll_target = timeline.scroll_target_for(player.position.y, data.world.viewport_height);
    let ease = 1.0 - (-config.camera_ease * dt.max(0.0)).exp();
    timeline.scroll += (timeline.scroll_target - timeline.scroll) * ease;
    data.camera.x = 0.0;
    data.camera.y = timeline.scroll;

    exit_at
}

fn integrate_particles(particles: &mut Vec<Particle>, gravity: f32, dt: f32) {
    for particle in particles.iter_mut() {
        particle.velocity.y += gravity * dt;
        particle.position.x += particle.velocity.x * dt;
        particle.position.y += particle.velocity.y * dt;
        particle.ttl -= dt;
    }
    particles.retain(|particle| particle.ttl > 0.0);
}

fn rate_of_change(previous: f32, current: f32, dt: f32) -> f32 {
    if dt <= 0.0 {
        0.0
    } else {
        (current - previous) / dt
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::app::EventKind;
    use crate::sim::{TransitionView, FadeDirection, Vec2};

    const ROAD: MotionParams = MotionParams {
        acceleration: 1_200.0,
        friction: 1_600.0,
        max_speed: 400.0,
    };

    fn physics() -> (PhysicsSystem, WorldState, EventBus) {
        let bus = EventBus::default();
        let state = WorldState::new(bus.clone(), WorldData::default(), 0);
        let system = PhysicsSystem::new(state.clone(), bus.clone(), PhysicsConfig::default());
        (system, state, bus)
    }

    #[test]
    fn zero_input_from_rest_stays_exactly_zero() {
        for dt in [0.0, 0.001, 0.016, 0.05, 10.0] {
            assert_eq!(approach_velocity(0.0, 0.0, &ROAD, dt), 0.0);
        }
    }

    #[test]
    fn held_input_converges_to_max_speed_without_exceeding_it() {
        let mut velocity = 0.0;
        for _ in 0..1_000 {
            velocity = approach_velocity(velocity, 1.0, &ROAD, 0.016);
            assert!(velocity <= ROAD.max_speed);
        }
        assert!((velocity - ROAD.max_speed).abs() < 1.0e-3);

        let mut reverse = 0.0;
        for _ in 0..1_000 {
            reverse = approach_velocity(reverse, -1.0, &ROAD, 0.05);
            assert!(reverse >= -ROAD.max_speed);
        }
        assert!((reverse + ROAD.max_speed).abs() < 1.0e-3);
    }

    #[test]
    fn friction_decays_toward_zero_without_changing_sign() {
        let mut velocity = 300.0;
        for _ in 0..500 {
            velocity = approach_velocity(velocity, 0.0, &ROAD, 0.05);
            assert!(velocity >= 0.0);
        }
        assert!(velocity < 1.0e-3);
    }

    #[test]
    fn zero_max_speed_stops_immediately() {
        let frozen = MotionParams {
            acceleration: 100.0,
            friction: 100.0,
            max_speed: 0.0,
        };
        assert_eq!(approach_velocity(250.0, 1.0, &frozen, 0.016), 0.0);
        assert_eq!(approach_velocity(-3.0, 0.0, &frozen, 0.016), 0.0);
    }

    #[test]
    fn road_input_moves_player_along_road_line() {
        let (mut system, state, _) = physics();
        state.write(|data| {
            data.keys.right = true;
            data.player.position.y = 0.0;
            data.player.velocity.y = 90.0;
        });
        let start_x = state.read(|data| data.player.position.x);

        for _ in 0..30 {
            system.update(0.016).expect("update");
        }

        state.read(|data| {
            assert!(data.player.position.x > start_x);
            assert!(data.player.velocity.x > 0.0);
            assert_eq!(data.player.position.y, data.world.road_y);
            assert_eq!(data.player.velocity.y, 0.0);
        });
    }

    #[test]
    fn throttle_drives_road_movement() {
        let (mut system, state, _) = physics();
        state.write(|data| data.throttle.left = 1.0);
        system.update(0.1).expect("update");
        assert!(state.read(|data| data.player.velocity.x) < 0.0);
    }

    #[test]
    fn input_is_ignored_during_transition() {
        let (mut system, state, _) = physics();
        state.write(|data| {
            data.keys.right = true;
            data.mode.transition = Some(TransitionView {
                from: GameMode::Road,
                to: GameMode::Timeline,
                reason: "test".to_string(),
                fade: FadeDirection::Out,
                progress: 0.2,
            });
        });
        system.update(0.016).expect("update");
        assert_eq!(state.read(|data| data.player.velocity.x), 0.0);
    }

    #[test]
    fn timeline_locks_x_and_requests_exit_once_at_top() {
        let (mut system, state, bus) = physics();
        let exits = Rc::new(RefCell::new(0));
        let sink = Rc::clone(&exits);
        bus.on(EventKind::TimelineExitRequested, move |_| {
            *sink.borrow_mut() += 1;
            Ok(())
        });
        state.write(|data| {
            data.mode.current = GameMode::Timeline;
            data.player.position = Vec2::new(77.0, 30.0);
            data.keys.up = true;
        });

        for _ in 0..60 {
            system.update(0.016).expect("update");
        }

        assert_eq!(*exits.borrow(), 1);
        state.read(|data| {
            assert_eq!(data.player.position.x, data.world.center_x());
            assert_eq!(data.player.position.y, data.timeline.top);
            assert!(data.timeline.exit_requested);
        });
    }

    #[test]
    fn timeline_clamps_bottom_and_eases_camera() {
        let (mut system, state, _) = physics();
        state.write(|data| {
            data.mode.current = GameMode::Timeline;
            data.player.position.y = data.timeline.length - 1.0;
            data.player.velocity.y = 300.0;
            data.keys.down = true;
        });

        system.update(0.05).expect("update");

        state.read(|data| {
            assert_eq!(data.player.position.y, data.timeline.length);
            assert!(data.timeline.scroll > 0.0);
            assert!(data.timeline.scroll < data.timeline.scroll_target);
            assert_eq!(data.camera.y, data.timeline.scroll);
        });
    }

    #[test]
    fn particles_fall_and_expire() {
        let (mut system, state, _) = physics();
        state.write(|data| {
            data.particles = vec![
                Particle {
                    position: Vec2::ZERO,
                    velocity: Vec2::new(10.0, 0.0),
                    ttl: 1.0,
                },
                Particle {
                    position: Vec2::ZERO,
                    velocity: Vec2::ZERO,
                    ttl: 0.01,
                },
            ];
        });
        system.update(0.05).expect("update");
        state.read(|data| {
            assert_eq!(data.particles.len(), 1);
            assert!(data.particles[0].velocity.y > 0.0);
            assert!(data.particles[0].position.x > 0.0);
        });
    }
}
