//! Nostr event model and identity derivation.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Wrapper for a Nostr tag expressed as an array of strings.
///
/// The first element names the tag and the remaining elements carry its data.
/// The tags this crate cares about:
///
/// - `d` – distinguishing identifier for parameterized-replaceable events
/// - `title` – display title used for alphabetical sorting
///
/// Tags are kept verbatim so uncommon or custom tags survive a round trip.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tag(pub Vec<String>);

impl Tag {
    /// Tag name (first element), if present.
    pub fn name(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Tag value (second element), if present.
    pub fn value(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }
}

/// Immutable Nostr event as received from relays or a local cache.
///
/// Events are produced and signed elsewhere; this crate treats them as
/// read-only values and never validates signatures.
///
/// ```json
/// {
///   "id": "aa11",
///   "pubkey": "deadbeef",
///   "kind": 30023,
///   "created_at": 1700000000,
///   "tags": [["d", "slug"], ["title", "Hello"]],
///   "content": "...",
///   "sig": "cafe"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Event {
    /// Event identifier (hex of the content hash).
    pub id: String,
    /// Author public key (hex).
    pub pubkey: String,
    /// Kind number, e.g. `30023` for long-form articles.
    pub kind: u32,
    /// Unix timestamp of creation, in seconds.
    pub created_at: u64,
    /// Ordered tag list.
    pub tags: Vec<Tag>,
    /// Event content body.
    pub content: String,
    /// Schnorr signature (opaque here).
    pub sig: String,
}

impl Event {
    /// Value of the first tag named `name`, if any.
    ///
    /// A tag carrying the name but no value is treated as absent.
    pub fn first_tag_value(&self, name: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|tag| tag.name() == Some(name))
            .and_then(Tag::value)
    }

    /// Composite identity used for replaceable-event deduplication.
    ///
    /// Kinds in `parameterized_kinds` are addressed by `(pubkey, d)` with the
    /// `d` tag defaulting to the empty string when absent or malformed; every
    /// other kind is identified by its `id` alone.
    pub fn identity(&self, parameterized_kinds: &HashSet<u32>) -> EventKey {
        if parameterized_kinds.contains(&self.kind) {
            EventKey::Addressable {
                pubkey: self.pubkey.clone(),
                d_tag: self.first_tag_value("d").unwrap_or_default().to_string(),
            }
        } else {
            EventKey::Id(self.id.clone())
        }
    }
}

/// Stable key under which a store holds at most one event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKey {
    /// Plain events keep their content-hash identity.
    Id(String),
    /// Parameterized-replaceable events are addressed by author and `d` tag.
    Addressable { pubkey: String, d_tag: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: u32, tags: Vec<Tag>) -> Event {
        Event {
            id: "aa11".into(),
            pubkey: "p1".into(),
            kind,
            created_at: 1,
            tags,
            content: String::new(),
            sig: String::new(),
        }
    }

    #[test]
    fn parameterized_kind_keys_on_pubkey_and_d() {
        let kinds: HashSet<u32> = [30023].into();
        let ev = event(30023, vec![Tag(vec!["d".into(), "slug".into()])]);
        assert_eq!(
            ev.identity(&kinds),
            EventKey::Addressable {
                pubkey: "p1".into(),
                d_tag: "slug".into()
            }
        );
    }

    #[test]
    fn missing_d_tag_defaults_to_empty() {
        let kinds: HashSet<u32> = [30023].into();
        let ev = event(30023, vec![]);
        assert_eq!(
            ev.identity(&kinds),
            EventKey::Addressable {
                pubkey: "p1".into(),
                d_tag: String::new()
            }
        );
    }

    #[test]
    fn malformed_d_tag_degrades_to_empty() {
        let kinds: HashSet<u32> = [30023].into();
        // tag with a name but no value
        let ev = event(30023, vec![Tag(vec!["d".into()])]);
        assert_eq!(
            ev.identity(&kinds),
            EventKey::Addressable {
                pubkey: "p1".into(),
                d_tag: String::new()
            }
        );
    }

    #[test]
    fn plain_kind_keys_on_id() {
        let kinds: HashSet<u32> = [30023].into();
        let ev = event(1, vec![Tag(vec!["d".into(), "slug".into()])]);
        assert_eq!(ev.identity(&kinds), EventKey::Id("aa11".into()));
    }

    #[test]
    fn first_tag_value_takes_first_match() {
        let ev = event(
            1,
            vec![
                Tag(vec!["title".into(), "one".into()]),
                Tag(vec!["title".into(), "two".into()]),
            ],
        );
        assert_eq!(ev.first_tag_value("title"), Some("one"));
        assert_eq!(ev.first_tag_value("missing"), None);
    }
}
