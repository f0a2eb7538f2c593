//! Moderation predicates applied before events reach a store.

use std::collections::HashSet;

use crate::event::Event;

/// Pass/reject predicate backed by user-curated block lists.
///
/// Events failing either check are dropped before they reach the store or the
/// local cache, so blocked content is never persisted or counted.
pub trait Moderation: Send + Sync {
    /// Whether the author's pubkey is on a mute list.
    fn is_author_blocked(&self, pubkey: &str) -> bool;

    /// Whether the event itself is blocked (e.g. reported content).
    fn is_content_blocked(&self, event: &Event) -> bool;

    /// Composite check: an event passes only when neither predicate blocks it.
    fn allows(&self, event: &Event) -> bool {
        !self.is_author_blocked(&event.pubkey) && !self.is_content_blocked(event)
    }
}

/// Moderation that blocks nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Moderation for AllowAll {
    fn is_author_blocked(&self, _pubkey: &str) -> bool {
        false
    }

    fn is_content_blocked(&self, _event: &Event) -> bool {
        false
    }
}

/// Set-backed mute lists for authors and individual events.
#[derive(Debug, Clone, Default)]
pub struct Blocklist {
    /// Muted author pubkeys.
    pub authors: HashSet<String>,
    /// Blocked event IDs.
    pub event_ids: HashSet<String>,
}

impl Moderation for Blocklist {
    fn is_author_blocked(&self, pubkey: &str) -> bool {
        self.authors.contains(pubkey)
    }

    fn is_content_blocked(&self, event: &Event) -> bool {
        self.event_ids.contains(&event.id)
    }
}
