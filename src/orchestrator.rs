//! Feed orchestration: sources, sessions, cache seeding, and toggles.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::warn;
use url::Url;

use crate::account::AccountState;
use crate::cache::EventCache;
use crate::config::FeedSettings;
use crate::filter::FilterCriteria;
use crate::moderation::Moderation;
use crate::pool::RelayPool;
use crate::session::{RelayFeedSession, RelayGroup};
use crate::store::SharedStore;
use crate::view::{FilterSelector, LoadTrigger, Page, PaginatedView, SortKey};

/// Where a feed's events come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedSource {
    /// Events authored by accounts the viewer follows.
    Following,
    /// Events from the feed relays regardless of author.
    Public,
}

impl FeedSource {
    const ALL: [FeedSource; 2] = [FeedSource::Following, FeedSource::Public];

    /// Stable name used in persisted toggle keys.
    pub fn as_str(self) -> &'static str {
        match self {
            FeedSource::Following => "following",
            FeedSource::Public => "public",
        }
    }

    fn default_enabled(self) -> bool {
        matches!(self, FeedSource::Following)
    }
}

/// Static description of one logical feed.
#[derive(Debug, Clone)]
pub struct FeedDefinition {
    /// Feed name; part of the persisted toggle keys, so it should stay stable.
    pub name: String,
    /// Kinds requested from relays.
    pub kinds: Vec<u32>,
    /// Kinds deduplicated by `(pubkey, d)` instead of event ID.
    pub parameterized_kinds: HashSet<u32>,
    /// Feed-specific relays, merged with the account's.
    pub relays: Vec<String>,
    /// Per-subscription event cap passed to relays.
    pub limit: Option<u32>,
}

/// Owns the store, view, and one session per enabled source of a feed.
///
/// The orchestrator is the only type UI code needs: it starts sessions,
/// seeds the store from the local cache before the network answers, and
/// serves pages. Source toggles persist per account through the injected
/// [`AccountState`].
pub struct FeedOrchestrator {
    definition: FeedDefinition,
    settings: FeedSettings,
    pool: Arc<dyn RelayPool>,
    cache: Option<Arc<dyn EventCache>>,
    moderation: Arc<dyn Moderation>,
    account: Arc<dyn AccountState>,
    store: Arc<SharedStore>,
    view: PaginatedView,
    sessions: HashMap<FeedSource, RelayFeedSession>,
}

impl FeedOrchestrator {
    /// Assemble an orchestrator for `definition`. Nothing is subscribed
    /// until [`start`](Self::start).
    pub fn new(
        definition: FeedDefinition,
        settings: FeedSettings,
        pool: Arc<dyn RelayPool>,
        cache: Option<Arc<dyn EventCache>>,
        moderation: Arc<dyn Moderation>,
        account: Arc<dyn AccountState>,
    ) -> Self {
        let store = Arc::new(SharedStore::new(definition.parameterized_kinds.clone()));
        let view = PaginatedView::new(
            FilterSelector::All,
            SortKey::Recency,
            settings.page_size,
            settings.load_more_cooldown,
        );
        Self {
            definition,
            settings,
            pool,
            cache,
            moderation,
            account,
            store,
            view,
            sessions: HashMap::new(),
        }
    }

    /// Start a session for every enabled source.
    pub async fn start(&mut self) {
        for source in FeedSource::ALL {
            if self.source_enabled(source) {
                self.start_source(source).await;
            }
        }
    }

    /// Whether a source is enabled, falling back to its default when the
    /// account has never toggled it. Following defaults on, Public off.
    pub fn source_enabled(&self, source: FeedSource) -> bool {
        self.account
            .toggle(&self.toggle_key(source))
            .unwrap_or(source.default_enabled())
    }

    /// Persist a source toggle and start its session when newly enabled.
    ///
    /// Disabling only persists; a running session keeps streaming until the
    /// next [`refresh`](Self::refresh).
    pub async fn set_source_enabled(&mut self, source: FeedSource, enabled: bool) {
        self.account.set_toggle(&self.toggle_key(source), enabled);
        if enabled {
            self.start_source(source).await;
        }
    }

    /// Stop every session, clear the store, reset pagination, and start
    /// over from the currently enabled sources.
    pub async fn refresh(&mut self) {
        for (_, session) in self.sessions.drain() {
            session.stop();
        }
        self.store.clear();
        self.view.reset();
        self.start().await;
    }

    /// Stop every session. The store keeps its events for a final render.
    pub fn stop(&mut self) {
        for (_, session) in self.sessions.drain() {
            session.stop();
        }
    }

    /// Current visible page.
    pub fn page(&self) -> Page {
        self.view.project(&self.store.all())
    }

    /// Grow the page by one step; see [`PaginatedView::load_more`].
    pub fn load_more(&mut self, trigger: LoadTrigger) -> bool {
        let events = self.store.all();
        self.view.load_more(&events, trigger)
    }

    /// Whether more events exist past the current page.
    pub fn has_more(&self) -> bool {
        self.view.has_more(&self.store.all())
    }

    /// True while any session is still in its loading window.
    pub fn is_loading(&self) -> bool {
        self.sessions.values().any(|s| s.is_loading())
    }

    /// Receiver resolving whenever the underlying store mutates.
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.store.changes()
    }

    /// Shared store backing this feed.
    pub fn store(&self) -> &Arc<SharedStore> {
        &self.store
    }

    /// Mutable view for sort/selector changes from UI controls.
    pub fn view_mut(&mut self) -> &mut PaginatedView {
        &mut self.view
    }

    async fn start_source(&mut self, source: FeedSource) {
        if self.sessions.contains_key(&source) {
            return;
        }
        self.seed_from_cache(source).await;
        let session = RelayFeedSession::new(
            Arc::clone(&self.store),
            Arc::clone(&self.pool),
            Arc::clone(&self.moderation),
            self.cache.clone(),
            self.settings.clone(),
        );
        let relays = self.merged_relays();
        match source {
            FeedSource::Following => {
                let following = self.account.following();
                if following.is_empty() || relays.is_empty() {
                    // nothing to query for; terminal empty, never loading
                    session.start(&[]);
                } else {
                    session.start_author_fan_out(&relays, &following, &self.base_filter());
                }
            }
            FeedSource::Public => {
                if relays.is_empty() {
                    session.start(&[]);
                } else {
                    session.start(&[RelayGroup {
                        relays,
                        filter: self.base_filter(),
                    }]);
                }
            }
        }
        self.sessions.insert(source, session);
    }

    /// Offer cached events so a revisited feed renders before the network
    /// answers. Read failures degrade to a cold start.
    async fn seed_from_cache(&self, source: FeedSource) {
        let Some(cache) = &self.cache else { return };
        // the cache is keyed by author, so only Following can be enumerated
        if source != FeedSource::Following {
            return;
        }
        let following = self.account.following();
        if following.is_empty() {
            return;
        }
        for kind in self.definition.kinds.clone() {
            match cache.events_by_pubkey_and_kind(&following, kind).await {
                Ok(events) => {
                    for event in events {
                        if self.moderation.allows(&event) {
                            self.store.offer(&event);
                        }
                    }
                }
                Err(e) => warn!(kind, "cache read failed: {e}"),
            }
        }
    }

    fn base_filter(&self) -> FilterCriteria {
        let mut filter = FilterCriteria::for_kinds(self.definition.kinds.clone());
        if let Some(limit) = self.definition.limit {
            filter = filter.with_limit(limit);
        }
        filter
    }

    /// Account relays first, then feed relays, invalid URLs skipped,
    /// duplicates dropped keeping first position.
    fn merged_relays(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        let feed_relays = self.definition.relays.iter().cloned();
        for relay in self.account.relays().into_iter().chain(feed_relays) {
            if Url::parse(&relay).is_err() {
                warn!(relay = %relay, "skipping invalid relay url");
                continue;
            }
            if seen.insert(relay.clone()) {
                merged.push(relay);
            }
        }
        merged
    }

    fn toggle_key(&self, source: FeedSource) -> String {
        format!(
            "feed:{}:{}:{}",
            self.account.pubkey(),
            self.definition.name,
            source.as_str()
        )
    }
}
