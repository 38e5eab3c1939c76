//! Conversation-list change notification
//!
//! The notifier is created by [`ThreadDatabase`](crate::thread_db::ThreadDatabase)
//! and dropped with it. The thread index publishes one [`ChangeEvent`] per
//! committed create/update/delete; events are delivered synchronously on the
//! publishing thread, so listeners must return quickly or hand the event off
//! to another executor themselves.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "thread_id", rename_all = "snake_case")]
pub enum ChangeEvent {
    Created(i64),
    Updated(i64),
    Deleted(i64),
}

impl ChangeEvent {
    pub fn thread_id(&self) -> i64 {
        match *self {
            ChangeEvent::Created(id) | ChangeEvent::Updated(id) | ChangeEvent::Deleted(id) => id,
        }
    }
}

pub trait ChangeListener: Send + Sync {
    fn on_change(&self, event: &ChangeEvent);
}

impl<F> ChangeListener for F
where
    F: Fn(&ChangeEvent) + Send + Sync,
{
    fn on_change(&self, event: &ChangeEvent) {
        self(event)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub struct ChangeNotifier {
    listeners: DashMap<u64, Arc<dyn ChangeListener>>,
    next_id: AtomicU64,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self {
            listeners: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self, listener: Arc<dyn ChangeListener>) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.insert(id, listener);
        debug!("Change listener {} subscribed", id);
        SubscriptionId(id)
    }

    /// Returns false if the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.listeners.remove(&id.0).is_some();
        if removed {
            debug!("Change listener {} unsubscribed", id.0);
        }
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Fan `event` out to every current listener.
    pub fn publish(&self, event: ChangeEvent) {
        // snapshot: listeners may (un)subscribe from inside their callback
        let listeners: Vec<Arc<dyn ChangeListener>> = self
            .listeners
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        for listener in listeners {
            listener.on_change(&event);
        }
    }

    pub(crate) fn clear(&self) {
        self.listeners.clear();
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}
