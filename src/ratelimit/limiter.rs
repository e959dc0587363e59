//! Core rate limiter implementation.

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::entry::{Clock, RateLimiterEntry, TokioClock};
use super::initiator::Initiator;
use super::key::RateLimiterKey;
use super::options::RateLimitOptions;
use super::rules::{request_host, select_rule, RateLimitRule};
use crate::error::{HostpaceError, Result};

/// Receives a notification whenever the limiter's entries change.
///
/// Called from whichever task performed the change, outside of any limiter
/// lock. Implementations must not block for long.
pub trait LimiterObserver: Send + Sync {
    fn limiter_updated(&self, limiter: &RateLimiter);
}

/// Throttling state for one key.
struct Bucket {
    /// Held for the whole wait-then-record step.
    turn: tokio::sync::Mutex<()>,
    /// Only written while `turn` is held.
    entry: Mutex<RateLimiterEntry>,
}

impl Bucket {
    fn new(key: RateLimiterKey) -> Self {
        Self {
            turn: tokio::sync::Mutex::new(()),
            entry: Mutex::new(RateLimiterEntry::new(key)),
        }
    }
}

/// Spaces out outbound requests according to the enabled rate limit rules.
///
/// Callers await [`throttle`](Self::throttle) right before sending a request.
/// Requests that land in the same bucket are serialized and delayed so that
/// consecutive sends are at least `1000 / requests_per_second` milliseconds
/// apart; requests in different buckets never wait on each other.
///
/// This struct is thread-safe and can be shared across multiple tasks.
pub struct RateLimiter {
    /// Enabled rules, replaced wholesale on every configuration change
    rules: RwLock<Arc<Vec<RateLimitRule>>>,
    /// Buckets indexed by key
    table: DashMap<RateLimiterKey, Arc<Bucket>>,
    observer: RwLock<Option<Arc<dyn LimiterObserver>>>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a rate limiter with no rules.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(TokioClock::new()))
    }

    /// Create a rate limiter that reads the time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            rules: RwLock::new(Arc::new(Vec::new())),
            table: DashMap::new(),
            observer: RwLock::new(None),
            clock,
        }
    }

    /// Create a rate limiter applying the enabled rules of `options`.
    pub fn with_options(options: &RateLimitOptions) -> Self {
        let limiter = Self::new();
        limiter.config_change(options);
        limiter
    }

    /// Wait until a request to `uri` may be sent, then record it.
    ///
    /// Returns immediately when no enabled rule matches the request's host,
    /// when the URI has no usable host, or when the initiator is exempt from
    /// throttling. Fails with [`HostpaceError::Interrupted`] if `cancel` fires
    /// while the request is queued behind another one in its bucket or
    /// while it is waiting out the interval; the request is then not
    /// recorded. A cancelled token does not fail a request that can go
    /// straight away.
    pub async fn throttle(
        &self,
        uri: &str,
        initiator: Initiator,
        cancel: &CancellationToken,
    ) -> Result<()> {
        if !initiator.is_throttled() {
            return Ok(());
        }

        let rules = self.rules.read().clone();
        if rules.is_empty() {
            return Ok(());
        }

        let Some(host) = request_host(uri) else {
            trace!(uri = %uri, "No host in request URI, not throttling");
            return Ok(());
        };
        let Some(rule) = select_rule(&rules, &host) else {
            return Ok(());
        };

        let key = RateLimiterKey::for_rule(rule, &host);
        let Some(bucket) = self.get_or_create(&key) else {
            trace!(key = %key, "Rule removed while throttling, not throttling");
            return Ok(());
        };

        {
            let _turn = match bucket.turn.try_lock() {
                Ok(guard) => guard,
                Err(_) => tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(HostpaceError::Interrupted(uri.to_string())),
                    guard = bucket.turn.lock() => guard,
                },
            };

            let last_request_time = bucket.entry.lock().last_request_time();
            let wait_ms = rule.interval_millis() - (self.clock.now_millis() - last_request_time);

            if wait_ms > 0 {
                debug!(
                    key = %key,
                    initiator = %initiator,
                    wait_ms = wait_ms,
                    "Throttling request"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!(key = %key, "Throttled request interrupted");
                        return Err(HostpaceError::Interrupted(uri.to_string()));
                    }
                    _ = tokio::time::sleep(Duration::from_millis(wait_ms as u64)) => {}
                }
            }

            bucket.entry.lock().record_request(self.clock.now_millis());
        }

        self.notify();
        Ok(())
    }

    /// Find the bucket for `key`, creating it if this is the first request.
    ///
    /// Returns `None` if the key's rule is no longer applied. The rule set is
    /// checked after the insert: `config_change` swaps the rules before it
    /// prunes the table, so a bucket created from an outdated snapshot is
    /// either pruned by that call or removed here.
    fn get_or_create(&self, key: &RateLimiterKey) -> Option<Arc<Bucket>> {
        let bucket = match self.table.get(key) {
            Some(bucket) => Arc::clone(bucket.value()),
            None => {
                let bucket = self.table.entry(key.clone()).or_insert_with(|| {
                    debug!(key = %key, "Creating new rate limit entry");
                    Arc::new(Bucket::new(key.clone()))
                });
                Arc::clone(bucket.value())
            }
        };

        let applied = self
            .rules
            .read()
            .iter()
            .any(|rule| rule.description() == key.rule);
        if !applied {
            self.table
                .remove_if(key, |_, existing| Arc::ptr_eq(existing, &bucket));
            return None;
        }
        Some(bucket)
    }

    /// Apply the enabled rules of `options`.
    ///
    /// The previous rule set is replaced in one step, and entries belonging
    /// to rules that are no longer enabled are dropped.
    pub fn config_change(&self, options: &RateLimitOptions) {
        let rules: Vec<RateLimitRule> = options.enabled_rules().cloned().collect();
        let enabled = options.enabled_descriptions();
        let rule_count = rules.len();

        *self.rules.write() = Arc::new(rules);

        let before = self.table.len();
        self.table.retain(|key, _| enabled.contains(key.rule.as_str()));

        info!(
            rules = rule_count,
            pruned_entries = before.saturating_sub(self.table.len()),
            "Rate limit rules updated"
        );
    }

    /// The enabled rules currently applied.
    pub fn rules(&self) -> Arc<Vec<RateLimitRule>> {
        self.rules.read().clone()
    }

    /// Snapshot of all entries.
    pub fn entries(&self) -> Vec<RateLimiterEntry> {
        self.table
            .iter()
            .map(|bucket| bucket.value().entry.lock().clone())
            .collect()
    }

    /// Get the number of tracked entries.
    pub fn entry_count(&self) -> usize {
        self.table.len()
    }

    /// Drop all entries.
    pub fn reset(&self) {
        self.table.clear();
        debug!("Rate limit entries reset");
        self.notify();
    }

    /// Register the observer to notify on updates, replacing any previous one.
    pub fn set_observer(&self, observer: Option<Arc<dyn LimiterObserver>>) {
        *self.observer.write() = observer;
    }

    fn notify(&self) {
        let observer = self.observer.read().clone();
        if let Some(observer) = observer {
            observer.limiter_updated(self);
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
