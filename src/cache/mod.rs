//! Resolution cache with request deduplication
//!
//! Completed resolutions are kept for a TTL. Concurrent requests with the same
//! fingerprint are collapsed: one caller computes while the others queue on a
//! per-fingerprint flight and then take the leader's outcome, success or
//! failure. A leader that is cancelled or dropped leaves no outcome, and the
//! next queued caller computes in its place.

mod entry;
mod fingerprint;

pub use entry::{CacheEntry, CachedValue};
pub use fingerprint::{catalog_fingerprint, stream_fingerprint};

use crate::ResolveError;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Outcome of one in-flight resolution, filled in by its leader
#[derive(Debug, Default)]
struct Flight {
    outcome: tokio::sync::Mutex<Option<Result<CachedValue, ResolveError>>>,
}

type FlightToken = Arc<Flight>;

/// TTL cache of catalog and stream resolutions
#[derive(Debug, Default)]
pub struct ResolutionCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    in_flight: Mutex<HashMap<String, FlightToken>>,
}

impl ResolutionCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flights(&self) -> MutexGuard<'_, HashMap<String, FlightToken>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns a fresh value, evicting it if it has expired
    pub fn get(&self, fingerprint: &str) -> Option<CachedValue> {
        let mut entries = self.entries();
        match entries.get(fingerprint) {
            Some(entry) if entry.is_expired() => {
                entries.remove(fingerprint);
                None
            }
            Some(entry) => Some(entry.value.clone()),
            None => None,
        }
    }

    /// Commits a value, replacing any previous entry
    pub fn insert(&self, fingerprint: &str, value: CachedValue, ttl: Duration) {
        let entry = CacheEntry::new(fingerprint, value, ttl);
        self.entries().insert(fingerprint.to_string(), entry);
    }

    /// Returns the cached value or computes it, at most once at a time per
    /// fingerprint
    ///
    /// `compute` yields the value and how long to keep it; `None` means the
    /// value is returned but not cached. Callers queued behind a computation
    /// receive its outcome, including its error. Errors are never cached:
    /// the next caller after the flight ends starts a fresh computation.
    ///
    /// A caller whose `cancel` fires while queued returns
    /// `ResolveError::Cancelled` at once without disturbing the others. When
    /// the computing caller is cancelled, or its future is dropped, nothing is
    /// stored and the next queued caller computes instead.
    pub async fn get_or_compute<F, Fut>(
        &self,
        fingerprint: &str,
        cancel: &CancellationToken,
        compute: F,
    ) -> Result<CachedValue, ResolveError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(CachedValue, Option<Duration>), ResolveError>>,
    {
        if let Some(value) = self.get(fingerprint) {
            tracing::debug!("Cache hit for {}", short(fingerprint));
            return Ok(value);
        }

        let token = self.token(fingerprint);
        let mut slot = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                self.release(fingerprint, &token);
                return Err(ResolveError::Cancelled);
            }
            slot = token.outcome.lock() => slot,
        };

        if let Some(outcome) = slot.as_ref() {
            tracing::debug!("Sharing finished resolution of {}", short(fingerprint));
            let outcome = outcome.clone();
            drop(slot);
            self.release(fingerprint, &token);
            return outcome;
        }

        if let Some(value) = self.get(fingerprint) {
            tracing::debug!("Cache hit for {} after waiting", short(fingerprint));
            drop(slot);
            self.release(fingerprint, &token);
            return Ok(value);
        }

        let outcome = match compute().await {
            Ok((value, Some(ttl))) => {
                self.insert(fingerprint, value.clone(), ttl);
                Ok(value)
            }
            Ok((value, None)) => Ok(value),
            Err(e) => Err(e),
        };

        if !matches!(outcome, Err(ResolveError::Cancelled)) {
            *slot = Some(outcome.clone());
            self.retire(fingerprint, &token);
        }
        drop(slot);
        self.release(fingerprint, &token);
        outcome
    }

    fn token(&self, fingerprint: &str) -> FlightToken {
        Arc::clone(
            self.flights()
                .entry(fingerprint.to_string())
                .or_insert_with(FlightToken::default),
        )
    }

    /// Detaches a finished flight so later callers start a new one
    fn retire(&self, fingerprint: &str, token: &FlightToken) {
        let mut flights = self.flights();
        if flights
            .get(fingerprint)
            .is_some_and(|current| Arc::ptr_eq(current, token))
        {
            flights.remove(fingerprint);
        }
    }

    /// Drops the flight token when nobody else holds it
    fn release(&self, fingerprint: &str, token: &FlightToken) {
        let mut flights = self.flights();
        let idle = flights
            .get(fingerprint)
            .is_some_and(|current| Arc::ptr_eq(current, token) && Arc::strong_count(token) == 2);
        if idle {
            flights.remove(fingerprint);
        }
    }

    /// Removes one entry
    pub fn purge(&self, fingerprint: &str) -> bool {
        self.entries().remove(fingerprint).is_some()
    }

    /// Removes every entry
    pub fn clear(&self) {
        self.entries().clear();
    }

    /// Number of stored entries, including expired ones not yet swept
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of fingerprints with a live flight token
    pub fn in_flight(&self) -> usize {
        self.flights().len()
    }

    /// Removes expired entries and idle flight tokens
    ///
    /// Returns the number of entries removed.
    pub fn sweep(&self) -> usize {
        let removed = {
            let mut entries = self.entries();
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired());
            before - entries.len()
        };

        self.flights().retain(|_, token| {
            Arc::strong_count(token) > 1 || token.outcome.try_lock().is_err()
        });

        removed
    }

    /// Starts a task that sweeps the cache every `interval` until cancelled
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = cache.sweep();
                        if removed > 0 {
                            tracing::debug!("Swept {} expired cache entries", removed);
                        }
                    }
                }
            }

            tracing::debug!("Cache sweeper stopped");
        })
    }
}

fn short(fingerprint: &str) -> &str {
    fingerprint.get(..12).unwrap_or(fingerprint)
}
