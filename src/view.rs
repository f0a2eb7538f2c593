//! Sorted, filtered, paginated projections over a store snapshot.

use std::cmp::Reverse;
use std::collections::HashSet;
use std::time::{Duration, Instant};

use crate::event::Event;

/// Sort order applied before pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Descending `created_at`.
    Recency,
    /// Ascending case-normalized title tag; missing titles sort first.
    Alphabetical,
    /// Ascending secondary tag (e.g. artist), falling back to `pubkey`.
    SecondaryField,
}

/// Subset of the store a view projects.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterSelector {
    /// Project every event.
    All,
    /// Only events authored by one of the given pubkeys.
    AuthoredBy(HashSet<String>),
    /// Everything except the given author, e.g. hiding the viewer's own
    /// events on a "public" feed.
    NotAuthoredBy(String),
}

/// What triggered a load-more request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadTrigger {
    /// Intersection-observer style scroll-to-bottom; subject to the cooldown.
    Scroll,
    /// Explicit button press; exempt from the cooldown.
    Manual,
}

/// One computed page.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    /// Events visible at the current display limit, sorted.
    pub events: Vec<Event>,
    /// Whether the filtered set extends past the display limit.
    pub has_more: bool,
}

/// Incremental projection state for one feed view.
///
/// `project` is a pure recomputation from the snapshot it is handed; the
/// struct itself only tracks the display limit and load-more gating, so a
/// caller re-projects after every store mutation and gets a stable page.
pub struct PaginatedView {
    selector: FilterSelector,
    sort_key: SortKey,
    title_tag: String,
    secondary_tag: String,
    display_limit: usize,
    page_size: usize,
    cooldown: Duration,
    pending: bool,
    last_scroll_load: Option<Instant>,
}

impl PaginatedView {
    /// Create a view showing one page of `page_size` events.
    pub fn new(
        selector: FilterSelector,
        sort_key: SortKey,
        page_size: usize,
        cooldown: Duration,
    ) -> Self {
        Self {
            selector,
            sort_key,
            title_tag: "title".into(),
            secondary_tag: "artist".into(),
            display_limit: page_size,
            page_size,
            cooldown,
            pending: false,
            last_scroll_load: None,
        }
    }

    /// Tag consulted for alphabetical sorting (default `title`).
    pub fn with_title_tag(mut self, tag: impl Into<String>) -> Self {
        self.title_tag = tag.into();
        self
    }

    /// Tag consulted for secondary-field sorting (default `artist`).
    pub fn with_secondary_tag(mut self, tag: impl Into<String>) -> Self {
        self.secondary_tag = tag.into();
        self
    }

    /// Compute the visible page from a store snapshot.
    pub fn project(&self, events: &[Event]) -> Page {
        let mut filtered: Vec<Event> = events
            .iter()
            .filter(|ev| self.selected(ev))
            .cloned()
            .collect();
        match self.sort_key {
            SortKey::Recency => {
                filtered.sort_by_cached_key(|ev| (Reverse(ev.created_at), ev.id.clone()));
            }
            SortKey::Alphabetical => {
                filtered.sort_by_cached_key(|ev| {
                    let title = ev
                        .first_tag_value(&self.title_tag)
                        .unwrap_or_default()
                        .to_lowercase();
                    (title, Reverse(ev.created_at), ev.id.clone())
                });
            }
            SortKey::SecondaryField => {
                filtered.sort_by_cached_key(|ev| {
                    let key = ev
                        .first_tag_value(&self.secondary_tag)
                        .unwrap_or(&ev.pubkey)
                        .to_lowercase();
                    (key, Reverse(ev.created_at), ev.id.clone())
                });
            }
        }
        let has_more = filtered.len() > self.display_limit;
        filtered.truncate(self.display_limit);
        Page {
            events: filtered,
            has_more,
        }
    }

    /// Whether the filtered set extends past the current display limit.
    pub fn has_more(&self, events: &[Event]) -> bool {
        events.iter().filter(|ev| self.selected(ev)).count() > self.display_limit
    }

    /// Grow the display limit by one page.
    ///
    /// A no-op returning `false` when nothing more exists, a load is already
    /// pending, or a scroll-triggered call lands inside the cooldown window.
    pub fn load_more(&mut self, events: &[Event], trigger: LoadTrigger) -> bool {
        if self.pending || !self.has_more(events) {
            return false;
        }
        if trigger == LoadTrigger::Scroll {
            if let Some(last) = self.last_scroll_load {
                if last.elapsed() < self.cooldown {
                    return false;
                }
            }
            self.last_scroll_load = Some(Instant::now());
        }
        self.display_limit += self.page_size;
        true
    }

    /// Current display limit.
    pub fn display_limit(&self) -> usize {
        self.display_limit
    }

    /// Mark a load as in flight; gates `load_more` until cleared.
    pub fn set_pending(&mut self, pending: bool) {
        self.pending = pending;
    }

    /// Whether a load is marked in flight.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Replace the projection subset and fall back to the first page.
    pub fn set_selector(&mut self, selector: FilterSelector) {
        self.selector = selector;
        self.display_limit = self.page_size;
    }

    /// Replace the sort order; the display limit is kept.
    pub fn set_sort_key(&mut self, sort_key: SortKey) {
        self.sort_key = sort_key;
    }

    /// Reset to the first page; used on explicit refresh.
    pub fn reset(&mut self) {
        self.display_limit = self.page_size;
        self.pending = false;
        self.last_scroll_load = None;
    }

    fn selected(&self, ev: &Event) -> bool {
        match &self.selector {
            FilterSelector::All => true,
            FilterSelector::AuthoredBy(authors) => authors.contains(&ev.pubkey),
            FilterSelector::NotAuthoredBy(pubkey) => &ev.pubkey != pubkey,
        }
    }
}
