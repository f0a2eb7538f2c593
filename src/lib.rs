//! Replaceable-event feed aggregation for Nostr clients.
//!
//! Feeds built from replaceable and parameterized-replaceable events (long-form
//! articles, listings, profiles) need different plumbing than a note timeline:
//! every identity keeps exactly one version, updates replace rather than
//! append, and the same logical event arrives from several relays at different
//! revisions. This crate owns that plumbing:
//!
//! - [`store::ReplaceableEventStore`] deduplicates by composite identity,
//!   newest version winning;
//! - [`session::RelayFeedSession`] manages concurrent relay subscriptions,
//!   loading windows, and batched per-author queries;
//! - [`view::PaginatedView`] projects sorted, paginated pages off a store
//!   snapshot;
//! - [`orchestrator::FeedOrchestrator`] composes sources, cache seeding, and
//!   persisted per-account toggles into one UI-facing type.
//!
//! Networking, persistence, moderation lists, and account state are injected
//! through the [`pool`], [`cache`], [`moderation`], and [`account`] traits.

pub mod account;
pub mod cache;
pub mod config;
pub mod event;
pub mod filter;
pub mod moderation;
pub mod orchestrator;
pub mod pool;
pub mod session;
pub mod store;
pub mod view;

pub use account::{AccountState, StaticAccount};
pub use cache::{EventCache, MemoryCache};
pub use config::FeedSettings;
pub use event::{Event, EventKey, Tag};
pub use filter::FilterCriteria;
pub use moderation::{AllowAll, Blocklist, Moderation};
pub use orchestrator::{FeedDefinition, FeedOrchestrator, FeedSource};
pub use pool::{EventCallback, RelayPool, SubscriptionHandle};
pub use session::{RelayFeedSession, RelayGroup, SessionPhase};
pub use store::{ReplaceableEventStore, SharedStore};
pub use view::{FilterSelector, LoadTrigger, Page, PaginatedView, SortKey};
