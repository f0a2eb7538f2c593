//! In-memory newest-wins store for replaceable events.

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::event::{Event, EventKey};

/// Deduplicating event store keyed by composite identity.
///
/// Holds at most one event per [`EventKey`]: the one with the greatest
/// `created_at`. Ties keep the first event seen, so re-offering a retained
/// event is a no-op. `offer` is the sole mutation path besides `clear`.
///
/// The store itself does no locking; concurrent subscriptions serialize
/// through [`SharedStore`].
#[derive(Debug)]
pub struct ReplaceableEventStore {
    parameterized_kinds: HashSet<u32>,
    events: HashMap<EventKey, Event>,
}

impl ReplaceableEventStore {
    /// Create an empty store treating `parameterized_kinds` as addressable.
    pub fn new(parameterized_kinds: HashSet<u32>) -> Self {
        Self {
            parameterized_kinds,
            events: HashMap::new(),
        }
    }

    /// Insert `event` if it is new or strictly newer than the held version.
    ///
    /// Returns `true` when the store changed. An existing entry with the same
    /// or a newer `created_at` wins, so equal timestamps keep the first event
    /// offered.
    pub fn offer(&mut self, event: &Event) -> bool {
        let key = event.identity(&self.parameterized_kinds);
        match self.events.get(&key) {
            Some(existing) if existing.created_at >= event.created_at => false,
            _ => {
                self.events.insert(key, event.clone());
                true
            }
        }
    }

    /// Snapshot of the current events, in no particular order.
    pub fn all(&self) -> Vec<Event> {
        self.events.values().cloned().collect()
    }

    /// Drop every event; used on explicit refresh.
    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Number of distinct identities held.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// True when no events are held.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Store shared by every subscription of one feed.
///
/// Wraps a [`ReplaceableEventStore`] in a mutex so offers arriving from
/// interleaved relay callbacks stay a single synchronous step, and bumps a
/// revision counter on every mutation so views know to recompute.
pub struct SharedStore {
    inner: Mutex<ReplaceableEventStore>,
    revision: watch::Sender<u64>,
}

impl SharedStore {
    /// Create a shared store treating `parameterized_kinds` as addressable.
    pub fn new(parameterized_kinds: HashSet<u32>) -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            inner: Mutex::new(ReplaceableEventStore::new(parameterized_kinds)),
            revision,
        }
    }

    /// Offer an event; bumps the revision when the store changed.
    pub fn offer(&self, event: &Event) -> bool {
        let accepted = self.inner.lock().offer(event);
        if accepted {
            self.revision.send_modify(|r| *r += 1);
        }
        accepted
    }

    /// Snapshot of the current events, in no particular order.
    pub fn all(&self) -> Vec<Event> {
        self.inner.lock().all()
    }

    /// Drop every event and signal dependent views.
    pub fn clear(&self) {
        self.inner.lock().clear();
        self.revision.send_modify(|r| *r += 1);
    }

    /// Number of distinct identities held.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// True when no events are held.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }

    /// Receiver resolving whenever the store mutates.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    /// Current mutation counter.
    pub fn revision(&self) -> u64 {
        *self.revision.borrow()
    }
}
