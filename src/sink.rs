//! Catalog sinks
//!
//! A sink receives every resolved catalog handed to
//! [`Resolver::ingest_catalog`](crate::Resolver::ingest_catalog).

use crate::normalize::CatalogResult;
use crate::providers::ProviderKind;
use async_trait::async_trait;
use std::io::Write;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

/// Errors raised while writing to a sink
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Failed to write catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize catalog: {0}")]
    Json(#[from] serde_json::Error),
}

/// Destination for resolved catalogs
#[async_trait]
pub trait CatalogSink: Send + Sync {
    /// Accepts one provider's catalog
    async fn ingest(&self, provider: ProviderKind, catalog: &CatalogResult) -> Result<(), SinkError>;
}

/// Writes one JSON object per episode, one per line
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Returns the underlying writer
    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl<W: Write + Send> CatalogSink for JsonLinesSink<W> {
    async fn ingest(&self, provider: ProviderKind, catalog: &CatalogResult) -> Result<(), SinkError> {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);

        for episode in &catalog.episodes {
            serde_json::to_writer(&mut *writer, episode)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;

        tracing::debug!(
            "Wrote {} {} episodes to sink",
            catalog.episodes.len(),
            provider
        );
        Ok(())
    }
}
