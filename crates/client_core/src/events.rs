use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, Weak,
    },
};

pub use shared::protocol::EventKind;
use shared::protocol::ServerEvent;
use tracing::debug;

type Handler = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<EventKind, Vec<(u64, Handler)>>>,
}

#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut handlers) = self.inner.handlers.lock() {
            handlers
                .entry(kind)
                .or_default()
                .push((id, Arc::new(handler)));
        }
        Subscription {
            bus: Arc::downgrade(&self.inner),
            kind,
            id,
        }
    }

    /// Runs every handler registered for the event's kind and returns how many ran.
    /// The handler list is snapshotted first, so a handler may (un)subscribe freely.
    pub fn dispatch(&self, event: &ServerEvent) -> usize {
        let kind = event.kind();
        let snapshot: Vec<Handler> = match self.inner.handlers.lock() {
            Ok(handlers) => handlers
                .get(&kind)
                .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        if snapshot.is_empty() {
            debug!(event = kind.name(), "events: no subscribers");
        }
        for handler in &snapshot {
            handler(event);
        }
        snapshot.len()
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.inner
            .handlers
            .lock()
            .map(|handlers| handlers.get(&kind).map_or(0, Vec::len))
            .unwrap_or(0)
    }
}

/// Handle returned by [`EventBus::subscribe`]; call [`Subscription::unsubscribe`]
/// to stop receiving events. Dropping the handle keeps the handler registered.
#[must_use = "keep the subscription to be able to unsubscribe"]
pub struct Subscription {
    bus: Weak<BusInner>,
    kind: EventKind,
    id: u64,
}

impl Subscription {
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn unsubscribe(self) {
        let Some(bus) = self.bus.upgrade() else {
            return;
        };
        let Ok(mut handlers) = bus.handlers.lock() else {
            return;
        };
        if let Some(list) = handlers.get_mut(&self.kind) {
            list.retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
#[path = "tests/events_tests.rs"]
mod tests;
