//! In-process publish/subscribe keyed by event name.
//!
//! Listeners run synchronously inside `publish`, in the order they subscribed.
//! A listener that returns an error or panics is logged and skipped; delivery
//! continues with the next one. Subscriptions are RAII handles: dropping the
//! handle deregisters the listener.

use std::{
    collections::{BTreeMap, HashMap},
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
};
use tracing::{debug, warn};

pub type ListenerResult = Result<(), String>;

type Listener<T> = Arc<dyn Fn(&T) -> ListenerResult + Send + Sync>;
type ListenerMap<T> = HashMap<String, BTreeMap<u64, Listener<T>>>;

struct Inner<T> {
    next_id: AtomicU64,
    listeners: Mutex<ListenerMap<T>>,
}

impl<T> Inner<T> {
    fn listeners(&self) -> MutexGuard<'_, ListenerMap<T>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, event: &str, id: u64) -> bool {
        let mut listeners = self.listeners();
        let Some(event_listeners) = listeners.get_mut(event) else {
            return false;
        };
        let removed = event_listeners.remove(&id).is_some();
        if event_listeners.is_empty() {
            listeners.remove(event);
        }
        removed
    }
}

/// Cloning yields another handle to the same bus.
pub struct UpdateBus<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for UpdateBus<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Default for UpdateBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> UpdateBus<T> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                next_id: AtomicU64::new(0),
                listeners: Mutex::default(),
            }),
        }
    }

    pub fn subscribe<F>(&self, event: impl Into<String>, listener: F) -> Subscription<T>
    where
        F: Fn(&T) -> ListenerResult + Send + Sync + 'static,
    {
        let event = event.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners()
            .entry(event.clone())
            .or_default()
            .insert(id, Arc::new(listener));
        debug!(%event, id, "Listener subscribed");

        Subscription {
            bus: Arc::downgrade(&self.inner),
            event,
            id,
        }
    }

    /// Delivers `payload` to every listener of `event` and returns how many
    /// listeners accepted it.
    pub fn publish(&self, event: &str, payload: &T) -> usize {
        // Snapshot so listeners may (un)subscribe without deadlocking.
        let listeners: Vec<(u64, Listener<T>)> = match self.inner.listeners().get(event) {
            Some(listeners) => listeners
                .iter()
                .map(|(id, listener)| (*id, listener.clone()))
                .collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for (id, listener) in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(payload))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(err)) => warn!(event, id, %err, "Listener failed"),
                Err(_) => warn!(event, id, "Listener panicked"),
            }
        }
        delivered
    }

    /// Drops every listener and returns how many there were. Outstanding
    /// [`Subscription`]s become inert.
    pub fn clear(&self) -> usize {
        let listeners = std::mem::take(&mut *self.inner.listeners());
        listeners.values().map(BTreeMap::len).sum()
    }

    #[cfg(test)]
    pub fn listener_count(&self, event: &str) -> usize {
        self.inner.listeners().get(event).map_or(0, BTreeMap::len)
    }
}

/// Keeps a listener registered for as long as it is alive.
pub struct Subscription<T> {
    bus: Weak<Inner<T>>,
    event: String,
    id: u64,
}

impl<T> Subscription<T> {
    #[cfg(test)]
    pub fn event(&self) -> &str {
        &self.event
    }

    #[cfg(test)]
    pub fn unsubscribe(self) {
        // Drop does the work
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            if bus.remove(&self.event, self.id) {
                debug!(event = %self.event, id = self.id, "Listener unsubscribed");
            }
        }
    }
}
