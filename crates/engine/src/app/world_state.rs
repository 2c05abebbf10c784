use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use super::event_bus::{EventBus, HandlerResult, Subscription};
use super::events::{Event, EventKind, StateChange};
use crate::sim::WorldData;

pub const DEFAULT_HISTORY_LIMIT: usize = 100;
pub const WILDCARD: &str = "*";

#[derive(Debug, Error)]
pub enum StateError {
    #[error("unknown state path '{0}'")]
    UnknownPath(String),
    #[error("'{0}' is not a settable path; use update() for whole-tree changes")]
    NotSettable(String),
    #[error("update expects a JSON object of top-level fields")]
    NotAnObject,
    #[error("encode world state: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("invalid value for '{path}': {source}")]
    InvalidValue {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

struct StateInner {
    data: RefCell<WorldData>,
    template: WorldData,
    history: RefCell<VecDeque<WorldData>>,
    history_limit: usize,
    bus: EventBus,
}

/// Shared handle onto the single world-state tree of a simulation.
///
/// Two access styles are offered:
/// - [`read`](Self::read) / [`write`](Self::write) borrow the typed tree directly
///   for per-tick owners (physics, collision, modes). Writes are silent.
/// - [`get`](Self::get) / [`set`](Self::set) / [`update`](Self::update) address
///   fields by dotted path (`"player.position.x"`) and publish `state:changed`.
///
/// Mutations are fully applied before any notification goes out, so a
/// subscriber never observes a half-applied change.
#[derive(Clone)]
pub struct WorldState {
    inner: Rc<StateInner>,
}

impl std::fmt::Debug for WorldState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldState")
            .field("history_len", &self.history_len())
            .field("history_limit", &self.inner.history_limit)
            .finish_non_exhaustive()
    }
}

impl WorldState {
    pub fn new(bus: EventBus, initial: WorldData, history_limit: usize) -> Self {
        Self {
            inner: Rc::new(StateInner {
                data: RefCell::new(initial.clone()),
                template: initial,
                history: RefCell::new(VecDeque::new()),
                history_limit,
                bus,
            }),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&WorldData) -> R) -> R {
        f(&self.inner.data.borrow())
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut WorldData) -> R) -> R {
        f(&mut self.inner.data.borrow_mut())
    }

    pub fn snapshot(&self) -> WorldData {
        self.inner.data.borrow().clone()
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        let tree = self.encode().ok()?;
        if path.is_empty() || path == WILDCARD {
            return Some(tree);
        }
        tree.pointer(&to_pointer(path)).cloned()
    }

    pub fn set(&self, path: &str, value: Value, silent: bool) -> Result<(), StateError> {
        if path.is_empty() || path == WILDCARD {
            return Err(StateError::NotSettable(path.to_string()));
        }
        let mut tree = self.encode()?;
        let slot = tree
            .pointer_mut(&to_pointer(path))
            .ok_or_else(|| StateError::UnknownPath(path.to_string()))?;
        let previous = std::mem::replace(slot, value.clone());
        let next = serde_json::from_value::<WorldData>(tree).map_err(|source| {
            StateError::InvalidValue {
                path: path.to_string(),
                source,
            }
        })?;

        *self.inner.data.borrow_mut() = next;

        if !silent {
            self.inner.bus.publish(Event::StateChanged(StateChange {
                path: path.to_string(),
                previous,
                current: value,
            }));
        }
        Ok(())
    }

    pub fn set_value<T: Serialize>(
        &self,
        path: &str,
        value: &T,
        silent: bool,
    ) -> Result<(), StateError> {
        let value = serde_json::to_value(value).map_err(StateError::Encode)?;
        self.set(path, value, silent)
    }

    /// Replaces the named top-level fields at once. The pre-update tree is kept
    /// in history; subscribers get one change per field, then a wildcard change
    /// carrying both full snapshots.
    pub fn update(&self, partial: Value, silent: bool) -> Result<(), StateError> {
        let Value::Object(fields) = partial else {
            return Err(StateError::NotAnObject);
        };
        let before = self.encode()?;
        let mut after = before.clone();
        {
            let Some(root) = after.as_object_mut() else {
                return Err(StateError::NotAnObject);
            };
            for (key, value) in &fields {
                if !root.contains_key(key) {
                    return Err(StateError::UnknownPath(key.clone()));
                }
                root.insert(key.clone(), value.clone());
            }
        }
        let next = serde_json::from_value::<WorldData>(after.clone()).map_err(|source| {
            StateError::InvalidValue {
                path: fields.keys().cloned().collect::<Vec<_>>().join(","),
                source,
            }
        })?;

        let previous_data = std::mem::replace(&mut *self.inner.data.borrow_mut(), next);
        self.push_history(previous_data);

        if silent {
            return Ok(());
        }
        for key in fields.keys() {
            self.inner.bus.publish(Event::StateChanged(StateChange {
                path: key.clone(),
                previous: before.get(key).cloned().unwrap_or(Value::Null),
                current: after.get(key).cloned().unwrap_or(Value::Null),
            }));
        }
        self.inner.bus.publish(Event::StateChanged(StateChange {
            path: WILDCARD.to_string(),
            previous: before,
            current: after,
        }));
        Ok(())
    }

    /// Registers `callback` for changes at `path`, beneath it, or above it.
    /// `"*"` receives every change including whole-tree ones.
    pub fn subscribe<F>(&self, path: &str, mut callback: F) -> Subscription
    where
        F: FnMut(&StateChange) -> HandlerResult + 'static,
    {
        let watched = path.to_string();
        self.inner.bus.on(EventKind::StateChanged, move |event| {
            let Event::StateChanged(change) = event else {
                return Ok(());
            };
            if path_matches(&watched, &change.path) {
                callback(change)
            } else {
                Ok(())
            }
        })
    }

    /// Replaces the entire tree with a freshly constructed default.
    pub fn reset(&self) {
        let fresh = self.inner.template.clone();
        let previous = std::mem::replace(&mut *self.inner.data.borrow_mut(), fresh);
        info!("world_state_reset");
        self.publish_wildcard(&previous);
    }

    /// Puts a previously captured snapshot back in place (rewind tooling).
    pub fn restore(&self, snapshot: WorldData) {
        let previous = std::mem::replace(&mut *self.inner.data.borrow_mut(), snapshot);
        debug!("world_state_restored");
        self.publish_wildcard(&previous);
    }

    pub fn history_len(&self) -> usize {
        self.inner.history.borrow().len()
    }

    /// Pre-update snapshots, oldest first.
    pub fn history(&self) -> Vec<WorldData> {
        self.inner.history.borrow().iter().cloned().collect()
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    fn publish_wildcard(&self, previous: &WorldData) {
        let (Ok(previous), Ok(current)) = (serde_json::to_value(previous), self.encode()) else {
            return;
        };
        self.inner.bus.publish(Event::StateChanged(StateChange {
            path: WILDCARD.to_string(),
            previous,
            current,
        }));
    }

    fn push_history(&self, snapshot: WorldData) {
        if self.inner.history_limit == 0 {
            return;
        }
        let mut history = self.inner.history.borrow_mut();
        while history.len() >= self.inner.history_limit {
            history.pop_front();
        }
        history.push_back(snapshot);
    }

    fn encode(&self) -> Result<Value, StateError> {
        serde_json::to_value(&*self.inner.data.borrow()).map_err(StateError::Encode)
    }
}

fn to_pointer(path: &str) -> String {
    let mut pointer = String::with_capacity(path.len() + 1);
    for segment in path.split('.') {
        pointer.push('/');
        pointer.push_str(&segment.replace('~', "~0").replace('/', "~1"));
    }
    pointer
}

fn path_matches(watched: &str, changed: &str) -> bool {
    if watched == WILDCARD {
        return true;
    }
    if changed == WILDCARD {
        return false;
    }
    watched == changed || is_ancestor(watched, changed) || is_ancestor(changed, watched)
}

fn is_ancestor(ancestor: &str, path: &str) -> bool {
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'.'
}
