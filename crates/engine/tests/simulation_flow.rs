use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use roadtrip_engine::{
    Event, EventKind, GameMode, InputAction, SimConfig, Simulation, System, SystemError,
    SystemPhase, WorldContent,
};

const FRAME: Duration = Duration::from_millis(16);

type Journal = Rc<RefCell<Vec<String>>>;

fn journal(sim: &Simulation, kinds: &[EventKind]) -> Journal {
    let entries: Journal = Rc::new(RefCell::new(Vec::new()));
    for kind in kinds {
        let sink = Rc::clone(&entries);
        sim.bus().on(*kind, move |event| {
            let entry = match event {
                Event::ModeChanged { mode, .. } => format!("{}:{mode}", event.name()),
                Event::BranchEntered { branch_id } | Event::BranchCompleted { branch_id } => {
                    format!("{}:{branch_id}", event.name())
                }
                _ => event.name().to_string(),
            };
            sink.borrow_mut().push(entry);
            Ok(())
        });
    }
    entries
}

fn run_frames(sim: &mut Simulation, frames: usize) {
    for _ in 0..frames {
        sim.step(FRAME);
    }
}

#[test]
fn road_branch_timeline_and_back() {
    let mut sim = Simulation::new(SimConfig::default(), WorldContent::demo(520.0)).expect("sim");
    let entries = journal(
        &sim,
        &[
            EventKind::BranchEntered,
            EventKind::TransitionStart,
            EventKind::ModeChanged,
            EventKind::TransitionComplete,
            EventKind::TimelineExitRequested,
            EventKind::BranchCompleted,
        ],
    );

    sim.state().write(|data| data.player.position.x = 900.0);
    run_frames(&mut sim, 2);
    assert!(sim
        .active_collisions()
        .contains(&"player-branch-early-years".to_string()));
    assert!(sim.state().read(|data| data.interaction.prompt_visible));

    sim.input().set_action(InputAction::Interact, true);
    run_frames(&mut sim, 70);
    sim.input().set_action(InputAction::Interact, false);

    assert_eq!(sim.current_mode(), GameMode::Timeline);
    sim.state().read(|data| {
        assert_eq!(data.timeline.active_branch.as_deref(), Some("early-years"));
        assert_eq!(data.player.position.x, data.world.center_x());
        assert!((data.timeline.return_x - 900.0).abs() < 1.0e-3);
    });
    assert!(sim.active_collisions().is_empty());

    sim.input().set_action(InputAction::Up, true);
    run_frames(&mut sim, 150);
    sim.input().set_action(InputAction::Up, false);

    assert_eq!(sim.current_mode(), GameMode::Road);
    sim.state().read(|data| {
        assert!((data.player.position.x - 900.0).abs() < 1.0e-3);
        assert_eq!(data.player.position.y, data.world.road_y);
        assert!(data.timeline.active_branch.is_none());
        assert!(data.mode.transition.is_none());
    });

    let entries = entries.borrow();
    let expected = [
        "branch:entered:early-years",
        "transition:start",
        "mode:changed:timeline",
        "transition:complete",
        "timeline:exit-requested",
        "transition:start",
        "branch:completed:early-years",
        "mode:changed:road",
        "transition:complete",
    ];
    assert_eq!(entries.as_slice(), &expected[..]);
}

#[test]
fn near_object_enter_and_exit_pair_across_branch_entry() {
    let mut sim = Simulation::new(SimConfig::default(), WorldContent::demo(520.0)).expect("sim");
    let entries = journal(&sim, &[EventKind::NearObjectEnter, EventKind::NearObjectExit]);

    sim.state().write(|data| data.player.position.x = 900.0);
    sim.input().set_action(InputAction::Interact, true);
    run_frames(&mut sim, 70);
    sim.input().set_action(InputAction::Interact, false);

    assert_eq!(sim.current_mode(), GameMode::Timeline);
    assert_eq!(
        *entries.borrow(),
        vec!["near-object:enter", "near-object:exit"]
    );
    sim.state().read(|data| {
        assert!(data.interaction.near_object.is_none());
        assert!(!data.interaction.prompt_visible);
    });

    sim.input().set_action(InputAction::Up, true);
    run_frames(&mut sim, 150);
    sim.input().set_action(InputAction::Up, false);

    assert_eq!(sim.current_mode(), GameMode::Road);
    assert_eq!(
        *entries.borrow(),
        vec!["near-object:enter", "near-object:exit", "near-object:enter"]
    );
    assert!(sim.state().read(|data| data.interaction.prompt_visible));
}

#[test]
fn wall_clock_stall_is_clamped_to_max_dt() {
    let mut sim = Simulation::new(SimConfig::default(), WorldContent::default()).expect("sim");
    let base = Instant::now();
    sim.start(base);
    sim.tick(base + Duration::from_millis(16));
    let stats = sim
        .tick(base + Duration::from_millis(16) + Duration::from_secs(5))
        .expect("running");
    assert!(stats.dt <= 0.05 + 1.0e-6);

    let elapsed = sim.state().read(|data| data.clock.elapsed);
    assert!(elapsed <= 0.066 + 1.0e-6, "elapsed {elapsed}");
}

struct Faulty;

impl System for Faulty {
    fn name(&self) -> &str {
        "faulty"
    }

    fn update(&mut self, _dt: f32) -> Result<(), SystemError> {
        Err(SystemError::msg("always broken"))
    }
}

#[test]
fn faulty_system_does_not_stop_the_frame() {
    let mut sim = Simulation::new(SimConfig::default(), WorldContent::default()).expect("sim");
    sim.add_system(Box::new(Faulty), 95);
    let failures = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&failures);
    sim.bus().on(EventKind::SystemError, move |event| {
        if let Event::SystemError { system, phase, .. } = event {
            sink.borrow_mut().push((system.clone(), *phase));
        }
        Ok(())
    });

    sim.input().set_action(InputAction::Right, true);
    let start_x = sim.state().read(|data| data.player.position.x);
    run_frames(&mut sim, 10);

    assert_eq!(failures.borrow().len(), 10);
    assert_eq!(failures.borrow()[0], ("faulty".to_string(), SystemPhase::Update));
    assert!(sim.state().read(|data| data.player.position.x) > start_x);
}

#[test]
fn gate_moves_player_into_next_world() {
    let mut sim = Simulation::new(SimConfig::default(), WorldContent::default()).expect("sim");
    let entries = journal(
        &sim,
        &[
            EventKind::WorldTransitionStarted,
            EventKind::TransitionComplete,
        ],
    );
    let gate_x = sim
        .state()
        .read(|data| data.gate.map(|gate| gate.position.x))
        .expect("gate");
    sim.state().write(|data| data.player.position.x = gate_x);

    run_frames(&mut sim, 80);

    sim.state().read(|data| {
        assert_eq!(data.world.index, 1);
        assert_eq!(data.player.position.x, data.world.spawn_x);
    });
    assert_eq!(
        *entries.borrow(),
        vec!["world:transition-started", "transition:complete"]
    );
}
