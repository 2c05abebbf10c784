use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use roadtrip_engine::{Simulation, Throttle};
use tracing::{error, info};

use super::autopilot::{InputScript, ScriptCommand};
use super::bootstrap::AppWiring;
use super::error::AppError;

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let AppWiring {
        mut sim,
        mut script,
        run_for,
        frame_target,
    } = app;

    let started = Instant::now();
    sim.start(started);
    let mut exit = ExitCode::SUCCESS;

    loop {
        let frame_start = Instant::now();
        let run_time = frame_start.duration_since(started);
        if run_time >= run_for {
            break;
        }
        if let Err(err) = apply_due_commands(&mut sim, &mut script, run_time) {
            error!(error = %err, "script_failed");
            exit = ExitCode::FAILURE;
            break;
        }
        sim.tick(frame_start);
        thread::sleep(compute_cap_sleep(frame_start.elapsed(), frame_target));
    }

    sim.stop();
    let metrics = sim.metrics();
    info!(
        frames = sim.frame_count(),
        fps = metrics.fps,
        frame_avg_ms = metrics.frame_time.avg_ms,
        update_max_ms = metrics.update.max_ms,
        script_finished = script.is_finished(),
        "shutdown"
    );
    exit
}

fn apply_due_commands(
    sim: &mut Simulation,
    script: &mut InputScript,
    run_time: Duration,
) -> Result<(), AppError> {
    for command in script.due(run_time.as_secs_f64()) {
        apply_command(sim, &command)?;
    }
    Ok(())
}

fn apply_command(sim: &mut Simulation, command: &ScriptCommand) -> Result<(), AppError> {
    match command {
        ScriptCommand::Key { action, down } => sim.input().set_action(*action, *down),
        ScriptCommand::Throttle { left, right } => sim.input().drive_throttle(Throttle {
            left: *left,
            right: *right,
        }),
        ScriptCommand::ReleaseAll => {
            sim.input().release_all();
            sim.input().release_throttle();
        }
        ScriptCommand::Restart => {
            sim.restart()?;
            info!(session = sim.state().read(|data| data.session), "restarted_by_script");
        }
    }
    Ok(())
}

fn compute_cap_sleep(elapsed: Duration, target: Option<Duration>) -> Duration {
    match target {
        Some(frame_target) if elapsed < frame_target => frame_target - elapsed,
        _ => Duration::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use roadtrip_engine::{InputAction, SimConfig, WorldContent};

    use super::*;
    use crate::app::autopilot::ScriptStep;
    use crate::app::bootstrap::target_frame_duration;

    fn sim() -> Simulation {
        Simulation::new(SimConfig::default(), WorldContent::demo(520.0)).expect("sim")
    }

    #[test]
    fn compute_cap_sleep_zero_when_over_budget() {
        let sleep = compute_cap_sleep(Duration::from_millis(20), target_frame_duration(Some(60)));
        assert_eq!(sleep, Duration::ZERO);
    }

    #[test]
    fn compute_cap_sleep_positive_when_under_budget() {
        let sleep = compute_cap_sleep(Duration::from_millis(5), target_frame_duration(Some(60)));
        assert!(sleep > Duration::ZERO);
        assert_eq!(compute_cap_sleep(Duration::from_millis(5), None), Duration::ZERO);
    }

    #[test]
    fn due_commands_drive_input_and_restart() {
        let mut sim = sim();
        let mut script = InputScript::new(vec![
            ScriptStep {
                at_seconds: 0.0,
                command: ScriptCommand::Key {
                    action: InputAction::Right,
                    down: true,
                },
            },
            ScriptStep {
                at_seconds: 1.0,
                command: ScriptCommand::ReleaseAll,
            },
            ScriptStep {
                at_seconds: 2.0,
                command: ScriptCommand::Restart,
            },
        ])
        .expect("script");

        apply_due_commands(&mut sim, &mut script, Duration::ZERO).expect("apply");
        assert!(sim.input().is_down(InputAction::Right));
        for _ in 0..10 {
            sim.step(Duration::from_millis(16));
        }
        assert!(sim.state().read(|data| data.player.velocity.x) > 0.0);

        apply_due_commands(&mut sim, &mut script, Duration::from_secs(1)).expect("apply");
        assert!(!sim.input().is_down(InputAction::Right));

        apply_due_commands(&mut sim, &mut script, Duration::from_secs(3)).expect("apply");
        assert_eq!(sim.state().read(|data| data.session), 1);
        assert!(script.is_finished());
    }

    #[test]
    fn throttle_command_feeds_analog_input() {
        let mut sim = sim();
        let command = ScriptCommand::Throttle {
            left: 0.0,
            right: 1.0,
        };
        apply_command(&mut sim, &command).expect("apply");
        sim.step(Duration::from_millis(100));
        assert!(sim.state().read(|data| data.player.velocity.x) > 0.0);
    }
}
