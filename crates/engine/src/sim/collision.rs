use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

use serde::Serialize;
use tracing::{debug, trace, warn};

use super::entity::{Entity, Vec2};
use super::GameMode;
use crate::app::{
    BoundarySide, Event, EventBus, EventKind, Subscription, System, SystemError, WorldState,
};
use crate::config::CollisionConfig;
use crate::content::WorldContent;

const PLAYER: &str = "player";
const THROTTLE_EPSILON_MS: f32 = 1.0e-3;

/// Axis-aligned box given by its top-left corner and size.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Aabb {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Aabb {
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }

    pub fn from_center(center: Vec2, half_extents: Vec2) -> Self {
        Self {
            x: center.x - half_extents.x,
            y: center.y - half_extents.y,
            w: half_extents.x * 2.0,
            h: half_extents.y * 2.0,
        }
    }

    pub fn of(entity: &Entity) -> Self {
        Self::from_center(entity.position, entity.half_extents)
    }

    pub fn max_x(&self) -> f32 {
        self.x + self.w
    }

    pub fn max_y(&self) -> f32 {
        self.y + self.h
    }

    /// Strict on both axes: boxes that only share an edge do not overlap.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        self.x < other.max_x()
            && other.x < self.max_x()
            && self.y < other.max_y()
            && other.y < self.max_y()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CollisionKind {
    PlayerBranch,
    PlayerBillboard,
    PlayerGhost,
    PlayerGate,
    PlayerBoundary,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollisionRecord {
    pub kind: CollisionKind,
    pub entity_a: String,
    pub entity_b: String,
    pub timestamp: f64,
}

struct Contact {
    id: String,
    kind: CollisionKind,
    other: String,
    event: Event,
}

/// Post-physics overlap tests, boundary clamping and nearest-object tracking.
///
/// A pair keyed `player-<kind>-<id>` is reported once when it starts
/// overlapping and stays in the active set until it separates (when
/// `clear_on_separation` is on), a consumer clears it, or the soft-cap sweep
/// empties the set.
pub struct CollisionDetector {
    state: WorldState,
    bus: EventBus,
    content: Rc<WorldContent>,
    config: CollisionConfig,
    since_last_check_ms: f32,
    active: HashSet<String>,
    records: VecDeque<CollisionRecord>,
    pending_clears: Rc<RefCell<Vec<String>>>,
    subscription: Subscription,
}

impl CollisionDetector {
    pub fn new(
        state: WorldState,
        bus: EventBus,
        content: Rc<WorldContent>,
        config: CollisionConfig,
    ) -> Self {
        let pending_clears = Rc::new(RefCell::new(Vec::new()));
        let queue = Rc::clone(&pending_clears);
        let subscription = bus.on(EventKind::BranchCompleted, move |event| {
            if let Event::BranchCompleted { branch_id } = event {
                queue.borrow_mut().push(branch_key(branch_id));
            }
            Ok(())
        });
        Self {
            state,
            bus,
            content,
            config,
            // The first tick always runs a check.
            since_last_check_ms: f32::INFINITY,
            active: HashSet::new(),
            records: VecDeque::new(),
            pending_clears,
            subscription,
        }
    }

    pub fn is_active(&self, id: &str) -> bool {
        self.active.contains(id)
    }

    /// Active identifiers, sorted.
    pub fn active_ids(&self) -> Vec<String> {
        let mut ids = self.active.iter().cloned().collect::<Vec<_>>();
        ids.sort();
        ids
    }

    pub fn clear_active(&mut self, id: &str) -> bool {
        self.active.remove(id)
    }

    pub fn clear_all(&mut self) {
        self.active.clear();
        self.records.clear();
        self.pending_clears.borrow_mut().clear();
        self.since_last_check_ms = f32::INFINITY;
    }

    /// Records from the retention window, oldest first.
    pub fn recent_records(&self) -> impl Iterator<Item = &CollisionRecord> {
        self.records.iter()
    }

    pub fn detect(&mut self, dt: f32) {
        for id in self.pending_clears.borrow_mut().drain(..) {
            if self.active.remove(&id) {
                debug!(collision = %id, "collision_cleared_by_consumer");
            }
        }

        self.since_last_check_ms += dt.max(0.0) * 1_000.0;
        if self.since_last_check_ms + THROTTLE_EPSILON_MS < self.config.throttle_ms as f32 {
            return;
        }
        self.since_last_check_ms = 0.0;

        let now = self.state.read(|data| data.clock.elapsed);
        let mut contacts = self.overlap_contacts(now);
        contacts.extend(self.clamp_to_bounds());

        let touching = contacts
            .iter()
            .map(|contact| contact.id.clone())
            .collect::<HashSet<_>>();
        let mut events = Vec::new();
        for contact in contacts {
            if !self.active.insert(contact.id.clone()) {
                continue;
            }
            trace!(collision = %contact.id, "collision_started");
            self.records.push_back(CollisionRecord {
                kind: contact.kind,
                entity_a: PLAYER.to_string(),
                entity_b: contact.other,
                timestamp: now,
            });
            events.push(contact.event);
        }
        if self.config.clear_on_separation {
            self.active.retain(|id| touching.contains(id));
        }
        if self.active.len() > self.config.active_soft_cap {
            // Only stale identifiers go; live pairs must not re-report.
            let before = self.active.len();
            self.active.retain(|id| touching.contains(id));
            warn!(
                active = before,
                retained = self.active.len(),
                cap = self.config.active_soft_cap,
                "active_collision_soft_cap_exceeded"
            );
        }
        self.prune_records(now);

        events.extend(self.track_nearest());
        for event in events {
            self.bus.publish(event);
        }
    }

    fn overlap_contacts(&self, timestamp: f64) -> Vec<Contact> {
        let (player, mode, ghost, gate) = self.state.read(|data| {
            let ghost = data.ghost.active.then_some(data.ghost.body);
            (data.player, data.mode.current, ghost, data.gate)
        });
        let player_box = Aabb::of(&player);
        let mut contacts = Vec::new();

        if mode == GameMode::Road {
            for branch in self.content.branches() {
                if player_box.overlaps(&branch.bounds()) {
                    contacts.push(Contact {
                        id: branch_key(&branch.id),
                        kind: CollisionKind::PlayerBranch,
                        other: format!("branch:{}", branch.id),
                        event: Event::CollisionPlayerBranch {
                            branch_id: branch.id.clone(),
                            timestamp,
                        },
                    });
                }
            }
            for billboard in self.content.billboards() {
                if player_box.overlaps(&billboard.bounds()) {
                    contacts.push(Contact {
                        id: format!("player-billboard-{}", billboard.id),
                        kind: CollisionKind::PlayerBillboard,
                        other: format!("billboard:{}", billboard.id),
                        event: Event::CollisionPlayerBillboard {
                            billboard_id: billboard.id.clone(),
                            timestamp,
                        },
                    });
                }
            }
            if let Some(gate) = gate.filter(|gate| gate.open) {
                if player_box.overlaps(&Aabb::from_center(gate.position, gate.half_extents)) {
                    contacts.push(Contact {
                        id: format!("player-gate-{}", gate.target_world),
                        kind: CollisionKind::PlayerGate,
                        other: format!("gate:{}", gate.target_world),
                        event: Event::CollisionPlayerGate {
                            target_world: gate.target_world,
                            timestamp,
                        },
                    });
                }
            }
        }

        if let Some(ghost) = ghost {
            if player_box.overlaps(&Aabb::of(&ghost)) {
                contacts.push(Contact {
                    id: "player-ghost".to_string(),
                    kind: CollisionKind::PlayerGhost,
                    other: "ghost".to_string(),
                    event: Event::CollisionPlayerGhost { timestamp },
                });
            }
        }
        contacts
    }

    /// Clamps the player into the current mode's bounds. A side counts as hit
    /// while the player is outside it or resting on it and pushing outward.
    fn clamp_to_bounds(&self) -> Vec<Contact> {
        let hits = self.state.write(|data| {
            let player = &mut data.player;
            let mut hits = Vec::new();
            match data.mode.current {
                GameMode::Road => {
                    let min = data.world.min_x + player.half_extents.x;
                    let max = data.world.max_x - player.half_extents.x;
                    if player.position.x < min || (player.position.x <= min && player.velocity.x < 0.0) {
                        player.position.x = min;
                        player.velocity.x = 0.0;
                        hits.push((BoundarySide::Left, player.position));
                    } else if player.position.x > max
                        || (player.position.x >= max && player.velocity.x > 0.0)
                    {
                        player.position.x = max;
                        player.velocity.x = 0.0;
                        hits.push((BoundarySide::Right, player.position));
                    }
                }
                GameMode::Timeline => {
                    let max = data.timeline.length;
                    if player.position.y > max || (player.position.y >= max && player.velocity.y > 0.0) {
                        player.position.y = max;
                        player.velocity.y = 0.0;
                        hits.push((BoundarySide::Bottom, player.position));
                    }
                }
            }
            hits
        });

        hits.into_iter()
            .map(|(side, position)| Contact {
                id: format!("player-boundary-{}", side.as_str()),
                kind: CollisionKind::PlayerBoundary,
                other: format!("boundary:{}", side.as_str()),
                event: Event::BoundaryHit { side, position },
            })
            .collect()
    }

    fn track_nearest(&self) -> Vec<Event> {
        let threshold = self.config.proximity_threshold;
        let (position, mode, previous) = self.state.read(|data| {
            (
                data.player.position,
                data.mode.current,
                data.interaction.near_object.clone(),
            )
        });

        let nearest = if mode == GameMode::Road {
            self.content
                .iter()
                .map(|(reference, item)| (reference, item.position.distance(position)))
                .filter(|(_, distance)| *distance <= threshold)
                .min_by(|a, b| a.1.total_cmp(&b.1))
        } else {
            None
        };
        let current = nearest.as_ref().map(|(reference, _)| reference.clone());
        if current == previous {
            return Vec::new();
        }

        self.state
            .write(|data| data.interaction.near_object = current.clone());
        let mut events = Vec::with_capacity(2);
        if let Some(object) = previous {
            debug!(object = %object, "near_object_exit");
            events.push(Event::NearObjectExit { object });
        }
        if let Some((object, distance)) = nearest {
            debug!(object = %object, distance, "near_object_enter");
            events.push(Event::NearObjectEnter { object, distance });
        }
        events
    }

    fn prune_records(&mut self, now: f64) {
        let window = self.config.record_window_ms as f64 / 1_000.0;
        while self
            .records
            .front()
            .is_some_and(|record| now - record.timestamp > window)
        {
            self.records.pop_front();
        }
    }
}

impl Drop for CollisionDetector {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}

impl System for CollisionDetector {
    fn name(&self) -> &str {
        "collision"
    }

    fn update(&mut self, dt: f32) -> Result<(), SystemError> {
        self.detect(dt);
        Ok(())
    }
}

fn branch_key(branch_id: &str) -> String {
    format!("player-branch-{branch_id}")
}
