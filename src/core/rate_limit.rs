//! Per-owner operation rate limiting
//!
//! A fixed-window counter per (operation, owner) key. The counters live behind
//! the [`CounterStore`] trait so that several engine instances can share one
//! backend; [`InMemoryCounterStore`] is the single-process implementation.

use crate::config::RateLimitConfig;
use crate::types::{LedgerError, Operation};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::warn;

/// Atomic counter with expiry
pub trait CounterStore: Send + Sync + Debug {
    /// Increment the counter for `key`
    ///
    /// A missing or expired counter starts a new window ending at
    /// `now + window`. Returns the count after the increment and the end of
    /// the current window.
    fn increment(&self, key: &str, window: Duration, now: DateTime<Utc>) -> (u64, DateTime<Utc>);
}

#[derive(Debug, Clone, Copy)]
struct WindowCounter {
    count: u64,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    counters: DashMap<String, WindowCounter>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterStore for InMemoryCounterStore {
    fn increment(&self, key: &str, window: Duration, now: DateTime<Utc>) -> (u64, DateTime<Utc>) {
        let mut counter = self
            .counters
            .entry(key.to_string())
            .or_insert_with(|| WindowCounter {
                count: 0,
                expires_at: now + window,
            });

        if counter.expires_at <= now {
            counter.count = 0;
            counter.expires_at = now + window;
        }
        counter.count += 1;
        (counter.count, counter.expires_at)
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    store: Arc<dyn CounterStore>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self::with_store(config, Arc::new(InMemoryCounterStore::new()))
    }

    pub fn with_store(config: RateLimitConfig, store: Arc<dyn CounterStore>) -> Self {
        Self { config, store }
    }

    fn key(owner_id: &str, operation: Operation) -> String {
        format!("{}:{}", operation, owner_id)
    }

    /// Count one `operation` by `owner_id`
    ///
    /// # Errors
    ///
    /// `LedgerError::RateLimited` once the window's budget is spent, with the
    /// seconds left until the window ends.
    pub fn check(
        &self,
        owner_id: &str,
        operation: Operation,
        now: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if !self.config.enabled {
            return Ok(());
        }

        let window =
            Duration::from_std(self.config.window).unwrap_or_else(|_| Duration::seconds(60));
        let (count, expires_at) = self
            .store
            .increment(&Self::key(owner_id, operation), window, now);

        if count > self.config.max_requests {
            let retry_after_secs = (expires_at - now).num_seconds().max(1);
            warn!(owner_id, %operation, count, retry_after_secs, "Rate limit exceeded");
            return Err(LedgerError::RateLimited {
                owner_id: owner_id.to_string(),
                operation: operation.to_string(),
                retry_after_secs,
            });
        }
        Ok(())
    }
}
