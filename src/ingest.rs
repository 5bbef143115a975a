// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batch ingestion pipeline.
//!
//! Converts raw item records into persisted catalog items with both vector
//! fields populated where inputs allow. Records are processed concurrently
//! up to a configured limit; failures are isolated per record and collected
//! into the batch report, never aborting the rest of the batch.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::catalog::{BatchReport, FailedRecord, FoodRecord, IngestedItem};
use crate::errors::Result;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::store::{NewItem, VectorStore};

/// Ingestion tuning knobs.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Maximum records embedded/persisted concurrently.
    pub concurrency: usize,
    /// Retry policy for embedding and store calls.
    pub retry: RetryPolicy,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            retry: RetryPolicy::default(),
        }
    }
}

/// Cooperative cancellation flag shared between a caller and an in-flight
/// batch. Cancelling stops records that have not started; records already
/// persisted stand.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// The batch ingestion pipeline.
pub struct IngestionPipeline {
    store: Arc<dyn VectorStore>,
    config: IngestConfig,
}

impl IngestionPipeline {
    pub fn new(store: Arc<dyn VectorStore>, config: IngestConfig) -> Self {
        Self { store, config }
    }

    /// Ingests a batch, reporting per-record status in input order.
    pub async fn ingest(&self, records: Vec<FoodRecord>) -> BatchReport {
        self.ingest_with_cancel(records, &CancelFlag::new()).await
    }

    /// Ingests a batch with cooperative cancellation.
    pub async fn ingest_with_cancel(
        &self,
        records: Vec<FoodRecord>,
        cancel: &CancelFlag,
    ) -> BatchReport {
        let total = records.len();
        tracing::info!("ingesting batch of {} records", total);

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut handles = Vec::with_capacity(total);

        for (index, record) in records.into_iter().enumerate() {
            let store = Arc::clone(&self.store);
            let retry = self.config.retry.clone();
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let name = record.name.clone();

            let handle = tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return Err("ingestion semaphore closed".to_string()),
                };
                if cancel.is_cancelled() {
                    return Err("cancelled before processing".to_string());
                }
                ingest_record(store, record, retry)
                    .await
                    .map_err(|err| err.to_string())
            });
            handles.push((index, name, handle));
        }

        let mut report = BatchReport::default();
        for (index, name, handle) in handles {
            match handle.await {
                Ok(Ok(key)) => {
                    tracing::debug!("record {} ('{}') ingested as {}", index, name, key);
                    report.succeeded.push(IngestedItem { index, key, name });
                }
                Ok(Err(reason)) => {
                    tracing::warn!("record {} ('{}') failed: {}", index, name, reason);
                    report.failed.push(FailedRecord {
                        index,
                        name,
                        reason,
                    });
                }
                Err(join_err) => {
                    report.failed.push(FailedRecord {
                        index,
                        name,
                        reason: format!("ingestion task failed: {}", join_err),
                    });
                }
            }
        }

        tracing::info!(
            "batch done: {} succeeded, {} failed",
            report.succeeded.len(),
            report.failed.len()
        );
        report
    }
}

/// Processes one record: validate, embed, persist atomically.
///
/// Text embedding is mandatory; a record whose text embedding fails after
/// retries is skipped without persisting anything. The image vector is
/// computed only when image bytes were supplied.
async fn ingest_record(
    store: Arc<dyn VectorStore>,
    record: FoodRecord,
    retry: RetryPolicy,
) -> Result<String> {
    record.validate()?;

    let text = record.embedding_text();
    let text_vector =
        retry_with_backoff(&retry, "text embedding", || store.embed_text(&text)).await?;

    let image_vector = match &record.image {
        Some(bytes) => {
            Some(retry_with_backoff(&retry, "image embedding", || store.embed_image(bytes)).await?)
        }
        None => None,
    };

    let item = NewItem {
        name: record.name,
        description: record.description,
        category: record.category,
        price: record.price,
        text_vector: Some(text_vector),
        image_vector,
    };
    retry_with_backoff(&retry, "item insert", || store.insert_item(item.clone())).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flag_roundtrip() {
        let flag = CancelFlag::new();
        assert!(!flag.is_cancelled());
        let clone = flag.clone();
        clone.cancel();
        assert!(flag.is_cancelled());
    }

    #[test]
    fn default_config_bounds_concurrency() {
        let config = IngestConfig::default();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.retry.max_attempts, 3);
    }
}
