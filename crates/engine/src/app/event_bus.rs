use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use thiserror::Error;
use tracing::{trace, warn};

use super::events::{Event, EventKind};
use super::world_state::StateError;

pub const DEFAULT_LISTENER_SOFT_CAP: usize = 100;

/// Failure reported by a subscriber. The bus logs it and keeps delivering.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    State(#[from] StateError),
}

impl HandlerError {
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

pub type HandlerResult = Result<(), HandlerError>;

type Callback = Box<dyn FnMut(&Event) -> HandlerResult>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscribeOptions {
    pub priority: i32,
    pub once: bool,
}

impl SubscribeOptions {
    pub fn priority(priority: i32) -> Self {
        Self {
            priority,
            once: false,
        }
    }

    pub fn once() -> Self {
        Self {
            priority: 0,
            once: true,
        }
    }
}

struct SubscriberEntry {
    id: SubscriptionId,
    priority: i32,
    once: bool,
    callback: Rc<RefCell<Callback>>,
}

struct BusInner {
    subscribers: RefCell<HashMap<EventKind, Vec<SubscriberEntry>>>,
    next_id: Cell<u64>,
    listener_soft_cap: usize,
}

/// Synchronous publish/subscribe hub shared by every component of one simulation.
///
/// Cloning is cheap and yields another handle onto the same subscriber table.
/// Delivery within a single `publish` runs by descending priority, ties in
/// registration order. Callbacks may publish or subscribe re-entrantly.
#[derive(Clone)]
pub struct EventBus {
    inner: Rc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_LISTENER_SOFT_CAP)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listener_soft_cap", &self.inner.listener_soft_cap)
            .finish_non_exhaustive()
    }
}

/// Handle returned by [`EventBus::subscribe`]. Dropping it keeps the
/// subscription alive; call [`Subscription::unsubscribe`] to remove it.
#[derive(Debug, Clone)]
pub struct Subscription {
    bus: Weak<BusInner>,
    kind: EventKind,
    id: SubscriptionId,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Idempotent; returns whether this call removed the subscriber.
    pub fn unsubscribe(&self) -> bool {
        match self.bus.upgrade() {
            Some(inner) => remove_subscriber(&inner, self.kind, self.id),
            None => false,
        }
    }
}

impl EventBus {
    pub fn new(listener_soft_cap: usize) -> Self {
        Self {
            inner: Rc::new(BusInner {
                subscribers: RefCell::new(HashMap::new()),
                next_id: Cell::new(0),
                listener_soft_cap: listener_soft_cap.max(1),
            }),
        }
    }

    pub fn subscribe<F>(&self, kind: EventKind, options: SubscribeOptions, callback: F) -> Subscription
    where
        F: FnMut(&Event) -> HandlerResult + 'static,
    {
        let id = SubscriptionId(self.inner.next_id.get());
        self.inner.next_id.set(id.0.saturating_add(1));

        let entry = SubscriberEntry {
            id,
            priority: options.priority,
            once: options.once,
            callback: Rc::new(RefCell::new(Box::new(callback))),
        };

        let listener_count = {
            let mut subscribers = self.inner.subscribers.borrow_mut();
            let list = subscribers.entry(kind).or_default();
            // Insert after every entry of equal or higher priority.
            let index = list
                .iter()
                .position(|existing| existing.priority < entry.priority)
                .unwrap_or(list.len());
            list.insert(index, entry);
            list.len()
        };

        if listener_count > self.inner.listener_soft_cap {
            warn!(
                event = kind.name(),
                listeners = listener_count,
                soft_cap = self.inner.listener_soft_cap,
                "listener_soft_cap_exceeded"
            );
        }

        Subscription {
            bus: Rc::downgrade(&self.inner),
            kind,
            id,
        }
    }

    pub fn on<F>(&self, kind: EventKind, callback: F) -> Subscription
    where
        F: FnMut(&Event) -> HandlerResult + 'static,
    {
        self.subscribe(kind, SubscribeOptions::default(), callback)
    }

    pub fn once<F>(&self, kind: EventKind, callback: F) -> Subscription
    where
        F: FnMut(&Event) -> HandlerResult + 'static,
    {
        self.subscribe(kind, SubscribeOptions::once(), callback)
    }

    /// Delivers `event` to every current subscriber of its kind and reports
    /// whether there were any. Subscriber failures are logged, never returned.
    pub fn publish(&self, event: Event) -> bool {
        let kind = event.kind();
        let batch = {
            let mut subscribers = self.inner.subscribers.borrow_mut();
            let Some(list) = subscribers.get_mut(&kind) else {
                return false;
            };
            if list.is_empty() {
                return false;
            }
            let batch = list
                .iter()
                .map(|entry| (entry.id, entry.once, Rc::clone(&entry.callback)))
                .collect::<Vec<_>>();
            // Once-subscribers leave the table before any callback runs so a
            // re-entrant publish cannot reach them again.
            list.retain(|entry| !entry.once);
            batch
        };

        trace!(event = kind.name(), listeners = batch.len(), "publish");

        for (id, once, cell) in batch {
            if !once && !self.is_subscribed(kind, id) {
                continue;
            }
            let Ok(mut callback) = cell.try_borrow_mut() else {
                warn!(
                    event = kind.name(),
                    subscription = id.0,
                    "reentrant_delivery_skipped"
                );
                continue;
            };
            if let Err(error) = (*callback)(&event) {
                warn!(
                    event = kind.name(),
                    subscription = id.0,
                    error = %error,
                    "subscriber_failed"
                );
            }
        }

        true
    }

    /// Removes every subscriber of `kind`, or of every kind when `None`.
    pub fn unsubscribe_all(&self, kind: Option<EventKind>) {
        let mut subscribers = self.inner.subscribers.borrow_mut();
        match kind {
            Some(kind) => {
                subscribers.remove(&kind);
            }
            None => subscribers.clear(),
        }
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.inner
            .subscribers
            .borrow()
            .get(&kind)
            .map_or(0, Vec::len)
    }

    pub fn has_listeners(&self, kind: EventKind) -> bool {
        self.listener_count(kind) > 0
    }

    fn is_subscribed(&self, kind: EventKind, id: SubscriptionId) -> bool {
        self.inner
            .subscribers
            .borrow()
            .get(&kind)
            .is_some_and(|list| list.iter().any(|entry| entry.id == id))
    }
}

fn remove_subscriber(inner: &BusInner, kind: EventKind, id: SubscriptionId) -> bool {
    let mut subscribers = inner.subscribers.borrow_mut();
    let Some(list) = subscribers.get_mut(&kind) else {
        return false;
    };
    let before = list.len();
    list.retain(|entry| entry.id != id);
    before != list.len()
}
