//! Local event cache collaborator and an in-memory implementation.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;

use crate::event::{Event, EventKey};

/// Persisted key-value event store used to pre-seed feeds before the network
/// answers, and to absorb accepted events fire-and-forget.
///
/// Writes are best effort: failures are logged by callers, never propagated
/// into the live stream. Upserts must be idempotent so racing writers with
/// the same identity and timestamp converge on the same stored value.
#[async_trait]
pub trait EventCache: Send + Sync {
    /// Events authored by any of `pubkeys` with the given kind.
    async fn events_by_pubkey_and_kind(&self, pubkeys: &[String], kind: u32) -> Result<Vec<Event>>;

    /// Current version of a parameterized-replaceable event, if cached.
    async fn parameterized_replaceable_event(
        &self,
        pubkey: &str,
        kind: u32,
        d_tag: &str,
    ) -> Result<Option<Event>>;

    /// Upsert an event, newest version per identity winning.
    async fn save_event(&self, event: &Event) -> Result<()>;
}

/// In-memory cache applying the same newest-wins rule as the feed store.
///
/// Suitable for tests and as a session-lifetime cache in front of a slower
/// persistent layer.
pub struct MemoryCache {
    parameterized_kinds: HashSet<u32>,
    events: Mutex<HashMap<EventKey, Event>>,
}

impl MemoryCache {
    /// Create an empty cache treating `parameterized_kinds` as addressable.
    pub fn new(parameterized_kinds: HashSet<u32>) -> Self {
        Self {
            parameterized_kinds,
            events: Mutex::new(HashMap::new()),
        }
    }

    /// Number of cached events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

#[async_trait]
impl EventCache for MemoryCache {
    async fn events_by_pubkey_and_kind(&self, pubkeys: &[String], kind: u32) -> Result<Vec<Event>> {
        let events = self.events.lock();
        Ok(events
            .values()
            .filter(|ev| ev.kind == kind && pubkeys.contains(&ev.pubkey))
            .cloned()
            .collect())
    }

    async fn parameterized_replaceable_event(
        &self,
        pubkey: &str,
        kind: u32,
        d_tag: &str,
    ) -> Result<Option<Event>> {
        let key = EventKey::Addressable {
            pubkey: pubkey.to_string(),
            d_tag: d_tag.to_string(),
        };
        let events = self.events.lock();
        Ok(events.get(&key).filter(|ev| ev.kind == kind).cloned())
    }

    async fn save_event(&self, event: &Event) -> Result<()> {
        let key = event.identity(&self.parameterized_kinds);
        let mut events = self.events.lock();
        match events.get(&key) {
            Some(existing) if existing.created_at >= event.created_at => {}
            _ => {
                events.insert(key, event.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Tag;

    fn addressable(id: &str, pubkey: &str, d: &str, created_at: u64) -> Event {
        Event {
            id: id.into(),
            pubkey: pubkey.into(),
            kind: 30023,
            created_at,
            tags: vec![Tag(vec!["d".into(), d.into()])],
            content: String::new(),
            sig: String::new(),
        }
    }

    #[tokio::test]
    async fn save_is_idempotent() {
        let cache = MemoryCache::new([30023].into());
        let ev = addressable("aa", "p1", "x", 100);
        cache.save_event(&ev).await.unwrap();
        cache.save_event(&ev).await.unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn save_keeps_newest_version() {
        let cache = MemoryCache::new([30023].into());
        cache.save_event(&addressable("aa", "p1", "x", 100)).await.unwrap();
        cache.save_event(&addressable("bb", "p1", "x", 200)).await.unwrap();
        cache.save_event(&addressable("cc", "p1", "x", 150)).await.unwrap();
        let found = cache
            .parameterized_replaceable_event("p1", 30023, "x")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, "bb");
    }

    #[tokio::test]
    async fn lookup_by_pubkey_and_kind() {
        let cache = MemoryCache::new([30023].into());
        cache.save_event(&addressable("aa", "p1", "x", 100)).await.unwrap();
        cache.save_event(&addressable("bb", "p2", "y", 100)).await.unwrap();
        let hits = cache
            .events_by_pubkey_and_kind(&["p1".to_string()], 30023)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "aa");
        let misses = cache
            .events_by_pubkey_and_kind(&["p1".to_string()], 1)
            .await
            .unwrap();
        assert!(misses.is_empty());
    }

    #[tokio::test]
    async fn replaceable_lookup_checks_kind() {
        let cache = MemoryCache::new([30023].into());
        cache.save_event(&addressable("aa", "p1", "x", 100)).await.unwrap();
        assert!(cache
            .parameterized_replaceable_event("p1", 30030, "x")
            .await
            .unwrap()
            .is_none());
    }
}
