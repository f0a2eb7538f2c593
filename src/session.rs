//! Relay feed session: subscription lifecycle and event intake.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::EventCache;
use crate::config::FeedSettings;
use crate::event::Event;
use crate::filter::FilterCriteria;
use crate::moderation::Moderation;
use crate::pool::{EventCallback, RelayPool, SubscriptionHandle};
use crate::store::SharedStore;

/// Lifecycle phase of a feed session.
///
/// `Loading` is the only phase where a UI should show a spinner; it ends on
/// the first accepted event or when the loading window elapses, whichever
/// comes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Created, not yet started.
    Idle,
    /// Subscriptions issued, nothing accepted yet.
    Loading,
    /// At least one event accepted, or the loading window elapsed.
    Streaming,
    /// Stopped, or started with nothing to subscribe to. Terminal.
    Closed,
}

/// One relay set/filter pair subscribed by [`RelayFeedSession::start`].
#[derive(Debug, Clone)]
pub struct RelayGroup {
    /// Relay URLs the subscription is issued against.
    pub relays: Vec<String>,
    /// Filter carried in the subscription.
    pub filter: FilterCriteria,
}

struct SessionInner {
    store: Arc<SharedStore>,
    moderation: Arc<dyn Moderation>,
    cache: Option<Arc<dyn EventCache>>,
    phase: Mutex<SessionPhase>,
    closed: AtomicBool,
    subscriptions: Mutex<Vec<Box<dyn SubscriptionHandle>>>,
    timers: Mutex<Vec<JoinHandle<()>>>,
}

impl SessionInner {
    /// Single synchronous intake step for every event a subscription yields.
    ///
    /// Safe to call from interleaved pool callbacks: the store offer is one
    /// lock-guarded step with no suspension inside.
    fn accept(&self, event: Event) {
        if self.closed.load(Ordering::SeqCst) {
            debug!(id = %event.id, "discarding event delivered after close");
            return;
        }
        if !self.moderation.allows(&event) {
            debug!(id = %event.id, pubkey = %event.pubkey, "event rejected by moderation");
            return;
        }
        // Any accepted event ends the loading window, even a duplicate.
        {
            let mut phase = self.phase.lock();
            if *phase == SessionPhase::Loading {
                *phase = SessionPhase::Streaming;
            }
        }
        if !self.store.offer(&event) {
            return;
        }
        if let Some(cache) = &self.cache {
            let cache = Arc::clone(cache);
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(e) = cache.save_event(&event).await {
                            warn!(id = %event.id, "cache write failed: {e}");
                        }
                    });
                }
                Err(_) => debug!("no async runtime; skipping cache write"),
            }
        }
    }
}

/// Subscription wrapper shared between the session and a self-close timer.
struct SharedSubscription(Arc<Mutex<Option<Box<dyn SubscriptionHandle>>>>);

impl SubscriptionHandle for SharedSubscription {
    fn close(&mut self) {
        if let Some(mut sub) = self.0.lock().take() {
            sub.close();
        }
    }
}

/// Manages the concurrent relay subscriptions feeding one store.
///
/// All methods are callable from UI-facing code; `start` and
/// `start_author_fan_out` must run within a tokio runtime because they spawn
/// the timers that bound the loading window and per-author queries.
pub struct RelayFeedSession {
    inner: Arc<SessionInner>,
    pool: Arc<dyn RelayPool>,
    settings: FeedSettings,
}

impl RelayFeedSession {
    /// Create an idle session feeding `store`.
    pub fn new(
        store: Arc<SharedStore>,
        pool: Arc<dyn RelayPool>,
        moderation: Arc<dyn Moderation>,
        cache: Option<Arc<dyn EventCache>>,
        settings: FeedSettings,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                store,
                moderation,
                cache,
                phase: Mutex::new(SessionPhase::Idle),
                closed: AtomicBool::new(false),
                subscriptions: Mutex::new(Vec::new()),
                timers: Mutex::new(Vec::new()),
            }),
            pool,
            settings,
        }
    }

    /// Issue one subscription per relay group and enter `Loading`.
    ///
    /// Groups with no relays are skipped. When nothing at all could be
    /// subscribed the session goes straight to `Closed`: an empty,
    /// non-loading terminal state rather than an error. A failed subscribe is
    /// logged and skipped; partial results beat none.
    pub fn start(&self, groups: &[RelayGroup]) {
        {
            let mut phase = self.inner.phase.lock();
            if *phase != SessionPhase::Idle {
                debug!(phase = ?*phase, "start ignored: session already started");
                return;
            }
            *phase = SessionPhase::Loading;
        }
        let mut opened = 0usize;
        for group in groups {
            if group.relays.is_empty() {
                continue;
            }
            let inner = Arc::clone(&self.inner);
            let on_event: EventCallback = Arc::new(move |ev| inner.accept(ev));
            match self.pool.subscribe(&group.relays, &group.filter, on_event) {
                Ok(handle) => {
                    self.inner.subscriptions.lock().push(handle);
                    opened += 1;
                }
                Err(e) => warn!(relays = ?group.relays, "subscribe failed: {e}"),
            }
        }
        if opened == 0 {
            self.inner.closed.store(true, Ordering::SeqCst);
            *self.inner.phase.lock() = SessionPhase::Closed;
            return;
        }
        self.spawn_loading_timeout();
    }

    /// Issue one bounded query per author, in batches.
    ///
    /// `template` is cloned per author with `authors` overridden to that one
    /// pubkey. Batches of `author_batch_size` are separated by `batch_delay`
    /// so a large following list does not flood the relays, and every
    /// per-author subscription is closed after `per_author_timeout` whether
    /// or not it produced results.
    pub fn start_author_fan_out(
        &self,
        relays: &[String],
        authors: &[String],
        template: &FilterCriteria,
    ) {
        if self.inner.closed.load(Ordering::SeqCst) || relays.is_empty() || authors.is_empty() {
            return;
        }
        let became_loading = {
            let mut phase = self.inner.phase.lock();
            if *phase == SessionPhase::Idle {
                *phase = SessionPhase::Loading;
                true
            } else {
                false
            }
        };
        if became_loading {
            self.spawn_loading_timeout();
        }
        let inner = Arc::clone(&self.inner);
        let pool = Arc::clone(&self.pool);
        let relays = relays.to_vec();
        let authors = authors.to_vec();
        let template = template.clone();
        let batch_size = self.settings.author_batch_size.max(1);
        let batch_delay = self.settings.batch_delay;
        let window = self.settings.per_author_timeout;
        let driver = tokio::spawn(async move {
            for (index, batch) in authors.chunks(batch_size).enumerate() {
                if index > 0 {
                    tokio::time::sleep(batch_delay).await;
                }
                if inner.closed.load(Ordering::SeqCst) {
                    return;
                }
                for author in batch {
                    let filter = template.clone().with_authors(vec![author.clone()]);
                    let cb_inner = Arc::clone(&inner);
                    let on_event: EventCallback = Arc::new(move |ev| cb_inner.accept(ev));
                    let handle = match pool.subscribe(&relays, &filter, on_event) {
                        Ok(handle) => handle,
                        Err(e) => {
                            warn!(author = %author, "fan-out subscribe failed: {e}");
                            continue;
                        }
                    };
                    let shared = Arc::new(Mutex::new(Some(handle)));
                    inner
                        .subscriptions
                        .lock()
                        .push(Box::new(SharedSubscription(Arc::clone(&shared))));
                    let timer = tokio::spawn(async move {
                        tokio::time::sleep(window).await;
                        if let Some(mut sub) = shared.lock().take() {
                            sub.close();
                        }
                    });
                    inner.timers.lock().push(timer);
                }
            }
        });
        self.inner.timers.lock().push(driver);
    }

    /// Close every subscription, cancel every pending timer, and discard any
    /// event still in flight. Idempotent.
    pub fn stop(&self) {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.inner.phase.lock() = SessionPhase::Closed;
        for timer in self.inner.timers.lock().drain(..) {
            timer.abort();
        }
        for mut sub in self.inner.subscriptions.lock().drain(..) {
            sub.close();
        }
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> SessionPhase {
        *self.inner.phase.lock()
    }

    /// Whether a UI should still show a loading indicator.
    pub fn is_loading(&self) -> bool {
        self.phase() == SessionPhase::Loading
    }

    /// Store the session feeds.
    pub fn store(&self) -> &Arc<SharedStore> {
        &self.inner.store
    }

    fn spawn_loading_timeout(&self) {
        let inner = Arc::clone(&self.inner);
        let timeout = self.settings.loading_timeout;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let mut phase = inner.phase.lock();
            if *phase == SessionPhase::Loading {
                debug!("loading window elapsed without events");
                *phase = SessionPhase::Streaming;
            }
        });
        self.inner.timers.lock().push(timer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::event::Tag;
    use crate::moderation::{AllowAll, Blocklist};
    use anyhow::bail;
    use async_trait::async_trait;
    use std::time::Duration;

    fn sample_event(id: &str, pubkey: &str, d: &str, created_at: u64) -> Event {
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

    struct RecordedSub {
        relays: Vec<String>,
        filter: FilterCriteria,
        callback: EventCallback,
        closed: Arc<AtomicBool>,
    }

    #[derive(Default)]
    struct MockPool {
        subs: Mutex<Vec<RecordedSub>>,
        fail: bool,
    }

    struct MockHandle {
        closed: Arc<AtomicBool>,
    }

    impl SubscriptionHandle for MockHandle {
        fn close(&mut self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl RelayPool for MockPool {
        fn subscribe(
            &self,
            relays: &[String],
            filter: &FilterCriteria,
            on_event: EventCallback,
        ) -> anyhow::Result<Box<dyn SubscriptionHandle>> {
            if self.fail {
                bail!("pool offline");
            }
            let closed = Arc::new(AtomicBool::new(false));
            self.subs.lock().push(RecordedSub {
                relays: relays.to_vec(),
                filter: filter.clone(),
                callback: on_event,
                closed: Arc::clone(&closed),
            });
            Ok(Box::new(MockHandle { closed }))
        }

        async fn publish(&self, _relays: &[String], _event: &Event) -> anyhow::Result<()> {
            Ok(())
        }
    }

    impl MockPool {
        fn deliver(&self, index: usize, event: Event) {
            let callback = Arc::clone(&self.subs.lock()[index].callback);
            callback(event);
        }

        fn count(&self) -> usize {
            self.subs.lock().len()
        }
    }

    fn settings(loading_ms: u64) -> FeedSettings {
        FeedSettings {
            loading_timeout: Duration::from_millis(loading_ms),
            ..FeedSettings::default()
        }
    }

    fn session(pool: &Arc<MockPool>, settings: FeedSettings) -> RelayFeedSession {
        let store = Arc::new(SharedStore::new([30023].into()));
        RelayFeedSession::new(
            store,
            Arc::clone(pool) as Arc<dyn RelayPool>,
            Arc::new(AllowAll),
            None,
            settings,
        )
    }

    fn group(relays: &[&str]) -> RelayGroup {
        RelayGroup {
            relays: relays.iter().map(|r| r.to_string()).collect(),
            filter: FilterCriteria::for_kinds(vec![30023]),
        }
    }

    #[tokio::test]
    async fn zero_relays_terminates_without_streaming() {
        let pool = Arc::new(MockPool::default());
        let sess = session(&pool, settings(60_000));
        sess.start(&[]);
        assert_eq!(sess.phase(), SessionPhase::Closed);
        assert!(!sess.is_loading());
        assert!(sess.store().is_empty());
        assert_eq!(pool.count(), 0);
        // groups with empty relay lists count as nothing to subscribe
        let sess = session(&pool, settings(60_000));
        sess.start(&[group(&[])]);
        assert_eq!(sess.phase(), SessionPhase::Closed);
    }

    #[tokio::test]
    async fn first_event_ends_loading_before_the_timeout() {
        let pool = Arc::new(MockPool::default());
        let sess = session(&pool, settings(60_000));
        sess.start(&[group(&["wss://a"])]);
        assert!(sess.is_loading());
        pool.deliver(0, sample_event("aa", "p1", "x", 100));
        assert_eq!(sess.phase(), SessionPhase::Streaming);
        assert_eq!(sess.store().len(), 1);
    }

    #[tokio::test]
    async fn loading_timeout_fires_with_zero_events() {
        let pool = Arc::new(MockPool::default());
        let sess = session(&pool, settings(50));
        sess.start(&[group(&["wss://a"])]);
        assert!(sess.is_loading());
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(sess.phase(), SessionPhase::Streaming);
        assert!(sess.store().is_empty());
    }

    #[tokio::test]
    async fn events_from_two_groups_share_one_store() {
        let pool = Arc::new(MockPool::default());
        let sess = session(&pool, settings(60_000));
        sess.start(&[group(&["wss://a"]), group(&["wss://b"])]);
        assert_eq!(pool.count(), 2);
        pool.deliver(0, sample_event("aa", "p1", "x", 100));
        pool.deliver(1, sample_event("bb", "p1", "x", 200));
        let all = sess.store().all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "bb");
    }

    #[tokio::test]
    async fn stale_callback_after_stop_is_discarded() {
        let pool = Arc::new(MockPool::default());
        let sess = session(&pool, settings(60_000));
        sess.start(&[group(&["wss://a"])]);
        pool.deliver(0, sample_event("aa", "p1", "x", 100));
        let before = sess.store().all();
        sess.stop();
        assert!(pool.subs.lock()[0].closed.load(Ordering::SeqCst));
        pool.deliver(0, sample_event("bb", "p1", "x", 200));
        assert_eq!(sess.store().all(), before);
        // stop is idempotent
        sess.stop();
        assert_eq!(sess.phase(), SessionPhase::Closed);
    }

    #[tokio::test]
    async fn blocked_events_never_reach_the_store_or_end_loading() {
        let pool = Arc::new(MockPool::default());
        let store = Arc::new(SharedStore::new([30023].into()));
        let moderation = Blocklist {
            authors: ["p2".to_string()].into(),
            ..Blocklist::default()
        };
        let sess = RelayFeedSession::new(
            store,
            Arc::clone(&pool) as Arc<dyn RelayPool>,
            Arc::new(moderation),
            None,
            settings(60_000),
        );
        sess.start(&[group(&["wss://a"])]);
        pool.deliver(0, sample_event("aa", "p2", "x", 100));
        assert!(sess.store().is_empty());
        assert!(sess.is_loading());
        pool.deliver(0, sample_event("bb", "p1", "x", 100));
        assert_eq!(sess.phase(), SessionPhase::Streaming);
        assert_eq!(sess.store().len(), 1);
    }

    #[tokio::test]
    async fn failed_subscribe_degrades_to_terminal_empty() {
        let pool = Arc::new(MockPool {
            fail: true,
            ..MockPool::default()
        });
        let sess = session(&pool, settings(60_000));
        sess.start(&[group(&["wss://a"])]);
        assert_eq!(sess.phase(), SessionPhase::Closed);
        assert!(sess.store().is_empty());
    }

    #[tokio::test]
    async fn accepted_events_are_saved_to_the_cache() {
        let pool = Arc::new(MockPool::default());
        let store = Arc::new(SharedStore::new([30023].into()));
        let cache = Arc::new(MemoryCache::new([30023].into()));
        let sess = RelayFeedSession::new(
            store,
            Arc::clone(&pool) as Arc<dyn RelayPool>,
            Arc::new(AllowAll),
            Some(Arc::clone(&cache) as Arc<dyn EventCache>),
            settings(60_000),
        );
        sess.start(&[group(&["wss://a"])]);
        pool.deliver(0, sample_event("aa", "p1", "x", 100));
        // rejected duplicate must not be re-saved
        pool.deliver(0, sample_event("aa", "p1", "x", 100));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn fan_out_issues_one_query_per_author_and_self_closes() {
        let pool = Arc::new(MockPool::default());
        let custom = FeedSettings {
            author_batch_size: 2,
            batch_delay: Duration::from_millis(10),
            per_author_timeout: Duration::from_millis(50),
            ..settings(60_000)
        };
        let sess = session(&pool, custom);
        let authors: Vec<String> = (0..5).map(|i| format!("p{i}")).collect();
        let relays = vec!["wss://a".to_string()];
        sess.start_author_fan_out(&relays, &authors, &FilterCriteria::for_kinds(vec![30023]));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(pool.count(), 5);
        {
            let subs = pool.subs.lock();
            for (i, sub) in subs.iter().enumerate() {
                assert_eq!(sub.filter.authors, Some(vec![format!("p{i}")]));
                assert_eq!(sub.relays, relays);
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        let subs = pool.subs.lock();
        assert!(subs.iter().all(|sub| sub.closed.load(Ordering::SeqCst)));
    }

    #[tokio::test]
    async fn stop_aborts_fan_out_between_batches() {
        let pool = Arc::new(MockPool::default());
        let custom = FeedSettings {
            author_batch_size: 2,
            batch_delay: Duration::from_millis(200),
            per_author_timeout: Duration::from_secs(60),
            ..settings(60_000)
        };
        let sess = session(&pool, custom);
        let authors: Vec<String> = (0..4).map(|i| format!("p{i}")).collect();
        let relays = vec!["wss://a".to_string()];
        sess.start_author_fan_out(&relays, &authors, &FilterCriteria::for_kinds(vec![30023]));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(pool.count(), 2);
        sess.stop();
        tokio::time::sleep(Duration::from_millis(300)).await;
        let subs = pool.subs.lock();
        assert_eq!(subs.len(), 2);
        assert!(subs.iter().all(|sub| sub.closed.load(Ordering::SeqCst)));
    }

    #[tokio::test]
    async fn start_is_one_shot() {
        let pool = Arc::new(MockPool::default());
        let sess = session(&pool, settings(60_000));
        sess.start(&[group(&["wss://a"])]);
        sess.start(&[group(&["wss://b"])]);
        assert_eq!(pool.count(), 1);
    }
}
