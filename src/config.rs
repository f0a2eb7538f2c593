//! Tunable timings and sizes, with optional `.env` loading.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

/// Timings and sizes shared by sessions, views, and orchestrators.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Events added per load-more step.
    pub page_size: usize,
    /// Window after `start` before an empty feed stops reporting "loading".
    pub loading_timeout: Duration,
    /// Authors per batch during fan-out queries.
    pub author_batch_size: usize,
    /// Pause between fan-out batches.
    pub batch_delay: Duration,
    /// Lifetime of each per-author fan-out subscription.
    pub per_author_timeout: Duration,
    /// Minimum gap between scroll-triggered load-more calls.
    pub load_more_cooldown: Duration,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            page_size: 24,
            loading_timeout: Duration::from_secs(4),
            author_batch_size: 10,
            batch_delay: Duration::from_millis(100),
            per_author_timeout: Duration::from_secs(3),
            load_more_cooldown: Duration::from_secs(2),
        }
    }
}

impl FeedSettings {
    /// Load settings from the specified `.env` file.
    ///
    /// Every variable is optional and falls back to the default; unparsable
    /// values also fall back rather than erroring.
    pub fn from_env(path: &str) -> Result<Self> {
        dotenvy::from_filename(path).context("reading env file")?;
        let defaults = Self::default();
        Ok(Self {
            page_size: env_usize("FEED_PAGE_SIZE").unwrap_or(defaults.page_size),
            loading_timeout: env_ms("FEED_LOADING_TIMEOUT_MS").unwrap_or(defaults.loading_timeout),
            author_batch_size: env_usize("FEED_AUTHOR_BATCH_SIZE")
                .unwrap_or(defaults.author_batch_size),
            batch_delay: env_ms("FEED_BATCH_DELAY_MS").unwrap_or(defaults.batch_delay),
            per_author_timeout: env_ms("FEED_PER_AUTHOR_TIMEOUT_MS")
                .unwrap_or(defaults.per_author_timeout),
            load_more_cooldown: env_ms("FEED_LOAD_MORE_COOLDOWN_MS")
                .unwrap_or(defaults.load_more_cooldown),
        })
    }
}

fn env_usize(key: &str) -> Option<usize> {
    env::var(key).ok()?.trim().parse().ok()
}

fn env_ms(key: &str) -> Option<Duration> {
    env::var(key)
        .ok()?
        .trim()
        .parse()
        .ok()
        .map(Duration::from_millis)
}
