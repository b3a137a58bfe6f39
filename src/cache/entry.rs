//! Cache entries with time-based expiration

use crate::normalize::CatalogResult;
use crate::pipeline::VideoSource;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// A cached resolution result
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Catalog(CatalogResult),
    Stream(VideoSource),
}

impl CachedValue {
    pub fn into_catalog(self) -> Option<CatalogResult> {
        match self {
            Self::Catalog(catalog) => Some(catalog),
            Self::Stream(_) => None,
        }
    }

    pub fn into_stream(self) -> Option<VideoSource> {
        match self {
            Self::Stream(source) => Some(source),
            Self::Catalog(_) => None,
        }
    }
}

/// One committed value and its lifetime
///
/// Entries are replaced wholesale, never mutated.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Key the entry is stored under
    pub fingerprint: String,

    /// The cached value
    pub value: CachedValue,

    /// When the value was committed
    pub created_at: DateTime<Utc>,

    /// How long the value stays fresh
    pub ttl: Duration,
}

impl CacheEntry {
    /// Creates an entry stamped with the current time
    pub fn new(fingerprint: impl Into<String>, value: CachedValue, ttl: Duration) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            value,
            created_at: Utc::now(),
            ttl,
        }
    }

    /// Returns how long ago the entry was committed
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }

    /// Checks whether the entry outlived its TTL
    ///
    /// # Returns
    ///
    /// * `true` - If the entry is at least `ttl` old
    /// * `false` - If the entry is still fresh
    pub fn is_expired(&self) -> bool {
        match chrono::Duration::from_std(self.ttl) {
            Ok(ttl) => self.age() >= ttl,
            Err(_) => false,
        }
    }
}
