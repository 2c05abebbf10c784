use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, info};

use super::{GameMode, ModeEnterOptions, ModeError, ModeHandler};
use crate::app::{Event, EventBus, EventKind, Subscription, WorldState};
use crate::sim::WorldBounds;

/// Side-scrolling drive along the road line. The camera tracks the player
/// horizontally; pressing interact or jump next to a branch enters it.
///
/// Which branch is in reach comes from `near-object:enter` and
/// `near-object:exit`; the collision detector is the only writer of
/// `interaction.near_object`.
pub struct RoadMode {
    state: WorldState,
    bus: EventBus,
    action_held: bool,
    near_branch: Rc<RefCell<Option<String>>>,
    subscriptions: Vec<Subscription>,
}

impl RoadMode {
    pub fn new(state: WorldState, bus: EventBus) -> Self {
        let near_branch = Rc::new(RefCell::new(None));
        let subscriptions = track_near_branch(&bus, &near_branch);
        Self {
            state,
            bus,
            action_held: false,
            near_branch,
            subscriptions,
        }
    }
}

fn track_near_branch(
    bus: &EventBus,
    near_branch: &Rc<RefCell<Option<String>>>,
) -> Vec<Subscription> {
    let entered = Rc::clone(near_branch);
    let on_enter = bus.on(EventKind::NearObjectEnter, move |event| {
        if let Event::NearObjectEnter { object, .. } = event {
            *entered.borrow_mut() = object.is_branch().then(|| object.id.clone());
        }
        Ok(())
    });
    let exited = Rc::clone(near_branch);
    let on_exit = bus.on(EventKind::NearObjectExit, move |event| {
        if let Event::NearObjectExit { object } = event {
            let mut near = exited.borrow_mut();
            if near.as_deref() == Some(object.id.as_str()) && object.is_branch() {
                *near = None;
            }
        }
        Ok(())
    });
    vec![on_enter, on_exit]
}

impl Drop for RoadMode {
    fn drop(&mut self) {
        for subscription in &self.subscriptions {
            subscription.unsubscribe();
        }
    }
}

impl ModeHandler for RoadMode {
    fn mode(&self) -> GameMode {
        GameMode::Road
    }

    fn enter(&mut self, options: &ModeEnterOptions) -> Result<(), ModeError> {
        let spawn_x = options.spawn_x;
        let held = self.state.write(|data| {
            if let Some(x) = spawn_x {
                data.player.position.x = x;
            }
            data.player.position.y = data.world.road_y;
            data.player.velocity.y = 0.0;
            data.player.mode = GameMode::Road;
            data.camera.x = road_camera_x(&data.world, data.player.position.x);
            data.camera.y = 0.0;
            data.interaction.prompt_visible = false;
            data.keys.interact || data.keys.jump
        });
        // A press carried over from the previous mode must be released first.
        self.action_held = held;
        debug!("road_entered");
        Ok(())
    }

    fn exit(&mut self) -> Result<(), ModeError> {
        self.state.write(|data| {
            data.player.position.y = data.world.road_y;
            data.player.velocity.y = 0.0;
            data.interaction.prompt_visible = false;
        });
        debug!("road_exited");
        Ok(())
    }

    fn update(&mut self, _dt: f32) -> Result<(), ModeError> {
        let near_branch = self.near_branch.borrow().clone();
        let near = near_branch.is_some();
        let (pressed, transitioning) = self.state.write(|data| {
            data.camera.x = road_camera_x(&data.world, data.player.position.x);
            let transitioning = data.mode.is_transitioning();
            data.interaction.prompt_visible = near && !transitioning;
            (data.keys.interact || data.keys.jump, transitioning)
        });

        let fresh_press = pressed && !self.action_held;
        self.action_held = pressed;
        if !fresh_press || transitioning {
            return Ok(());
        }
        if let Some(branch_id) = near_branch {
            info!(branch = %branch_id, "branch_entered");
            self.bus.publish(Event::BranchEntered { branch_id });
        }
        Ok(())
    }
}

fn road_camera_x(world: &WorldBounds, player_x: f32) -> f32 {
    let max_camera_x = (world.max_x - world.viewport_width).max(world.min_x);
    (player_x - world.center_x()).clamp(world.min_x, max_camera_x)
}
