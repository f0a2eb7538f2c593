//! Relay pool collaborator contract.
//!
//! The crate never opens sockets itself; it consumes an injected pool that
//! speaks the relay wire protocol (REQ/EVENT/EOSE/CLOSE) and hands parsed
//! events back through a callback.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::event::Event;
use crate::filter::FilterCriteria;

/// Callback invoked by the pool for every event a subscription yields.
///
/// Invocations happen on the pool's tasks; callers must keep the callback a
/// cheap synchronous step.
pub type EventCallback = Arc<dyn Fn(Event) + Send + Sync>;

/// Handle for one open relay subscription.
pub trait SubscriptionHandle: Send {
    /// Close the subscription. Must be idempotent; events delivered by an
    /// already-closed subscription are discarded by the session.
    fn close(&mut self);
}

/// External multi-relay connection pool.
///
/// Implementations own connection management, reconnection, and wire framing.
/// They must tolerate overlapping subscriptions to the same relays.
#[async_trait]
pub trait RelayPool: Send + Sync {
    /// Issue one subscription for `filter` across `relays`.
    ///
    /// Callers never pass an empty relay list; sessions check and skip those
    /// groups before reaching the pool.
    fn subscribe(
        &self,
        relays: &[String],
        filter: &FilterCriteria,
        on_event: EventCallback,
    ) -> Result<Box<dyn SubscriptionHandle>>;

    /// Publish an event to `relays`, best effort.
    async fn publish(&self, relays: &[String], event: &Event) -> Result<()>;
}
