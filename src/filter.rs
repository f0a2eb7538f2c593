//! Subscription filters matching the NIP-01 `REQ` object shape.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::event::Event;

/// Criteria for one relay subscription.
///
/// Immutable once a subscription has been issued with it; sessions clone and
/// adjust rather than mutate in place. Empty lists mean "no constraint" and
/// are omitted from the wire form, mirroring how relays interpret them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FilterCriteria {
    /// Restrict to explicit event IDs.
    pub ids: Option<Vec<String>>,
    /// Restrict to specific authors.
    pub authors: Option<Vec<String>>,
    /// Restrict to event kinds.
    pub kinds: Option<Vec<u32>>,
    /// Tag-equality constraints keyed by tag name (`d`, `k`, `t`, ...).
    #[serde(default)]
    pub tags: BTreeMap<String, Vec<String>>,
    /// Lower bound for `created_at`.
    pub since: Option<u64>,
    /// Upper bound for `created_at`.
    pub until: Option<u64>,
    /// Maximum number of events requested.
    pub limit: Option<u32>,
}

impl FilterCriteria {
    /// Filter restricted to the given kinds.
    pub fn for_kinds(kinds: Vec<u32>) -> Self {
        Self {
            kinds: Some(kinds),
            ..Self::default()
        }
    }

    /// Restrict to the given authors.
    pub fn with_authors(mut self, authors: Vec<String>) -> Self {
        self.authors = Some(authors);
        self
    }

    /// Add a tag-equality constraint.
    pub fn with_tag(mut self, name: impl Into<String>, values: Vec<String>) -> Self {
        self.tags.insert(name.into(), values);
        self
    }

    /// Cap the number of events requested.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Render the filter as the JSON object carried in a `REQ` message.
    ///
    /// Empty lists are skipped entirely so they read as "unconstrained".
    pub fn to_json(&self) -> Map<String, Value> {
        let mut map = Map::new();
        if let Some(ids) = &self.ids {
            if !ids.is_empty() {
                map.insert(
                    "ids".into(),
                    Value::Array(ids.iter().cloned().map(Value::String).collect()),
                );
            }
        }
        if let Some(authors) = &self.authors {
            if !authors.is_empty() {
                map.insert(
                    "authors".into(),
                    Value::Array(authors.iter().cloned().map(Value::String).collect()),
                );
            }
        }
        if let Some(kinds) = &self.kinds {
            if !kinds.is_empty() {
                map.insert(
                    "kinds".into(),
                    Value::Array(kinds.iter().map(|k| Value::Number((*k).into())).collect()),
                );
            }
        }
        for (tag, values) in &self.tags {
            if values.is_empty() {
                continue;
            }
            let key = if tag.starts_with('#') {
                tag.clone()
            } else {
                format!("#{tag}")
            };
            map.insert(
                key,
                Value::Array(values.iter().cloned().map(Value::String).collect()),
            );
        }
        if let Some(since) = self.since {
            map.insert("since".into(), Value::Number(since.into()));
        }
        if let Some(until) = self.until {
            map.insert("until".into(), Value::Number(until.into()));
        }
        if let Some(limit) = self.limit {
            map.insert("limit".into(), Value::Number(limit.into()));
        }
        map
    }

    /// Parse a Nostr filter JSON object.
    ///
    /// Unknown keys are ignored; `#x` keys become tag constraints named `x`.
    pub fn from_value(val: &Value) -> Self {
        let string_array = |v: &Value| -> Option<Vec<String>> {
            v.as_array().map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
        };
        let ids = val.get("ids").and_then(string_array);
        let authors = val.get("authors").and_then(string_array);
        let kinds = val.get("kinds").and_then(|v| v.as_array()).map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_u64().map(|u| u as u32))
                .collect()
        });
        let mut tags = BTreeMap::new();
        if let Some(obj) = val.as_object() {
            for (key, v) in obj {
                if let Some(name) = key.strip_prefix('#') {
                    if let Some(values) = string_array(v) {
                        tags.insert(name.to_string(), values);
                    }
                }
            }
        }
        let since = val.get("since").and_then(Value::as_u64);
        let until = val.get("until").and_then(Value::as_u64);
        let limit = val.get("limit").and_then(Value::as_u64).map(|v| v as u32);
        Self {
            ids,
            authors,
            kinds,
            tags,
            since,
            until,
            limit,
        }
    }

    /// Local evaluation of the filter against an event.
    ///
    /// Used by cache implementations and test relays; `limit` is a request
    /// cap, not a predicate, and is not checked here.
    pub fn matches(&self, ev: &Event) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.is_empty() && !ids.contains(&ev.id) {
                return false;
            }
        }
        if let Some(authors) = &self.authors {
            if !authors.is_empty() && !authors.contains(&ev.pubkey) {
                return false;
            }
        }
        if let Some(kinds) = &self.kinds {
            if !kinds.is_empty() && !kinds.contains(&ev.kind) {
                return false;
            }
        }
        for (name, values) in &self.tags {
            if values.is_empty() {
                continue;
            }
            let hit = ev
                .tags
                .iter()
                .any(|tag| tag.name() == Some(name) && tag.value().is_some_and(|v| values.iter().any(|w| w == v)));
            if !hit {
                return false;
            }
        }
        if self.since.is_some_and(|s| ev.created_at < s) {
            return false;
        }
        if self.until.is_some_and(|u| ev.created_at > u) {
            return false;
        }
        true
    }
}
