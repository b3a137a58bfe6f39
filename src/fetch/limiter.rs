//! Per-host concurrency limiting
//!
//! Every host (or host:port) gets its own semaphore so that a burst of
//! resolutions against one provider never opens more than the configured number
//! of connections to it.

use crate::url::host_key;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};
use url::Url;

/// Hands out per-host request permits
#[derive(Debug)]
pub struct HostLimiter {
    /// Permits per host
    permits: usize,

    /// Lazily created semaphores keyed by host
    semaphores: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl HostLimiter {
    pub fn new(permits: usize) -> Self {
        Self {
            permits: permits.max(1),
            semaphores: Mutex::new(HashMap::new()),
        }
    }

    /// Waits for a permit for the URL's host
    ///
    /// The permit is released when dropped.
    pub async fn acquire(&self, url: &Url) -> Result<OwnedSemaphorePermit, AcquireError> {
        self.semaphore_for(url).acquire_owned().await
    }

    /// Number of permits currently free for the URL's host
    pub fn available(&self, url: &Url) -> usize {
        self.semaphore_for(url).available_permits()
    }

    fn semaphore_for(&self, url: &Url) -> Arc<Semaphore> {
        let mut semaphores = self
            .semaphores
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        semaphores
            .entry(host_key(url))
            .or_insert_with(|| Arc::new(Semaphore::new(self.permits)))
            .clone()
    }
}
