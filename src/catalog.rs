// SPDX-License-Identifier: MIT OR Apache-2.0

//! Catalog data model and caller-facing API.
//!
//! `FoodRecord` is the validated ingestion input, `FoodItem` the persisted
//! entity, and `SearchQuery`/`SearchResult` the request-scoped query types.
//! `Catalog` ties the schema, ingestion pipeline and query router together
//! over one shared store handle.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::embedding::{create_image_embedder, create_text_embedder};
use crate::errors::{CatalogError, Result};
use crate::ingest::{CancelFlag, IngestConfig, IngestionPipeline};
use crate::query::QueryRouter;
use crate::retry::RetryPolicy;
use crate::schema::{CollectionSchema, IMAGE_VECTOR, TEXT_VECTOR};
use crate::store::{CatalogStats, SchemaOutcome, SqliteStore, VectorStore};

/// Default number of results per query.
pub const DEFAULT_TOP_K: usize = 10;

/// Upper bound on requested results per query.
pub const MAX_TOP_K: usize = 100;

/// Minimum text query length after trimming.
pub const MIN_TEXT_QUERY_CHARS: usize = 2;

/// Query/input modality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Text,
    Image,
}

impl Modality {
    /// The vector field this modality searches against.
    pub fn vector_field(&self) -> &'static str {
        match self {
            Modality::Text => TEXT_VECTOR,
            Modality::Image => IMAGE_VECTOR,
        }
    }
}

impl std::fmt::Display for Modality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Modality::Text => write!(f, "text"),
            Modality::Image => write!(f, "image"),
        }
    }
}

impl std::str::FromStr for Modality {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "t" => Ok(Modality::Text),
            "image" | "i" => Ok(Modality::Image),
            _ => Err(format!("Unknown modality: {}", s)),
        }
    }
}

/// A raw item record handed to the ingestion pipeline.
#[derive(Debug, Clone, Default)]
pub struct FoodRecord {
    /// Item name (required, non-empty).
    pub name: String,
    /// Free-text description (may be empty).
    pub description: String,
    /// Enum-like category text (required, non-empty).
    pub category: String,
    /// Non-negative price, if known.
    pub price: Option<f64>,
    /// Raw image bytes, if an image accompanies the item.
    pub image: Option<Vec<u8>>,
}

impl FoodRecord {
    pub fn new(name: &str, category: &str) -> Self {
        Self {
            name: name.to_string(),
            category: category.to_string(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    pub fn with_image(mut self, image: Vec<u8>) -> Self {
        self.image = Some(image);
        self
    }

    /// The text that feeds the text embedding capability.
    pub fn embedding_text(&self) -> String {
        if self.description.trim().is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", self.name, self.description)
        }
    }

    /// Boundary validation, run before any embedding or store call.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(CatalogError::InvalidRecord {
                reason: "name must not be empty".into(),
            });
        }
        if self.category.trim().is_empty() {
            return Err(CatalogError::InvalidRecord {
                reason: "category must not be empty".into(),
            });
        }
        if let Some(price) = self.price {
            if !price.is_finite() || price < 0.0 {
                return Err(CatalogError::InvalidRecord {
                    reason: format!("price must be non-negative, got {}", price),
                });
            }
        }
        if let Some(image) = &self.image {
            if image.is_empty() {
                return Err(CatalogError::InvalidRecord {
                    reason: "image bytes must not be empty when supplied".into(),
                });
            }
        }
        Ok(())
    }
}

/// A persisted catalog item.
#[derive(Debug, Clone, Serialize)]
pub struct FoodItem {
    /// Opaque unique key assigned by the store on creation.
    pub key: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub price: Option<f64>,
    /// Whether the item is searchable by text.
    pub has_text_vector: bool,
    /// Whether the item is searchable by image.
    pub has_image_vector: bool,
    /// Unix timestamp of creation.
    pub created_at: i64,
}

/// Query payload, one of the two supported modalities.
#[derive(Debug, Clone)]
pub enum QueryPayload {
    Text(String),
    Image(Vec<u8>),
}

/// An ephemeral, request-scoped search query.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub payload: QueryPayload,
    pub top_k: usize,
    /// Explicit target modality; must match the payload modality.
    pub target: Option<Modality>,
    /// Per-call timeout override.
    pub timeout: Option<Duration>,
}

impl SearchQuery {
    pub fn text(query: impl Into<String>) -> Self {
        Self {
            payload: QueryPayload::Text(query.into()),
            top_k: DEFAULT_TOP_K,
            target: None,
            timeout: None,
        }
    }

    pub fn image(bytes: Vec<u8>) -> Self {
        Self {
            payload: QueryPayload::Image(bytes),
            top_k: DEFAULT_TOP_K,
            target: None,
            timeout: None,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_target(mut self, target: Modality) -> Self {
        self.target = Some(target);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The modality implied by the payload.
    pub fn modality(&self) -> Modality {
        match self.payload {
            QueryPayload::Text(_) => Modality::Text,
            QueryPayload::Image(_) => Modality::Image,
        }
    }

    /// Boundary validation; caller errors, never retried.
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(CatalogError::InvalidQuery {
                reason: "top_k must be at least 1".into(),
            });
        }
        if self.top_k > MAX_TOP_K {
            return Err(CatalogError::InvalidQuery {
                reason: format!("top_k must be at most {}, got {}", MAX_TOP_K, self.top_k),
            });
        }
        match &self.payload {
            QueryPayload::Text(text) => {
                if text.trim().chars().count() < MIN_TEXT_QUERY_CHARS {
                    return Err(CatalogError::InvalidQuery {
                        reason: format!(
                            "text query must be at least {} characters",
                            MIN_TEXT_QUERY_CHARS
                        ),
                    });
                }
            }
            QueryPayload::Image(bytes) => {
                if bytes.is_empty() {
                    return Err(CatalogError::InvalidQuery {
                        reason: "image query must not be empty".into(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// A single ranked search hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub item_key: String,
    /// Bounded similarity in [0, 1]; higher is more similar.
    pub similarity_score: f32,
    /// 1-based rank, strictly decreasing similarity.
    pub rank: usize,
    pub source_modality: Modality,
    /// Item metadata for presentation.
    pub item: FoodItem,
}

/// One successfully ingested record.
#[derive(Debug, Clone, Serialize)]
pub struct IngestedItem {
    /// Position of the record in the input batch.
    pub index: usize,
    /// Store-assigned item key.
    pub key: String,
    pub name: String,
}

/// One failed record with its reason.
#[derive(Debug, Clone, Serialize)]
pub struct FailedRecord {
    pub index: usize,
    pub name: String,
    pub reason: String,
}

/// Structured per-record success/failure summary for a batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub succeeded: Vec<IngestedItem>,
    pub failed: Vec<FailedRecord>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// The caller-facing catalog handle.
///
/// Holds one shared store connection; safe to use from concurrent tasks.
pub struct Catalog {
    store: Arc<dyn VectorStore>,
    schema: CollectionSchema,
    pipeline: IngestionPipeline,
    router: QueryRouter,
}

impl Catalog {
    pub fn new(store: Arc<dyn VectorStore>, schema: CollectionSchema) -> Self {
        let pipeline = IngestionPipeline::new(Arc::clone(&store), IngestConfig::default());
        let router = QueryRouter::new(Arc::clone(&store));
        Self {
            store,
            schema,
            pipeline,
            router,
        }
    }

    pub fn with_ingest_config(mut self, config: IngestConfig) -> Self {
        self.pipeline = IngestionPipeline::new(Arc::clone(&self.store), config);
        self
    }

    pub fn with_search_timeout(mut self, timeout: Duration) -> Self {
        self.router = self.router.with_timeout(timeout);
        self
    }

    pub fn with_search_retry(mut self, retry: RetryPolicy) -> Self {
        self.router = self.router.with_retry(retry);
        self
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    /// Idempotently creates or checks the collection definition.
    pub async fn ensure_schema(&self) -> Result<SchemaOutcome> {
        self.store.ensure_collection(&self.schema).await
    }

    /// Ingests a batch of records, reporting per-record status.
    pub async fn ingest(&self, records: Vec<FoodRecord>) -> BatchReport {
        self.pipeline.ingest(records).await
    }

    /// Ingests a batch with cooperative cancellation.
    pub async fn ingest_with_cancel(
        &self,
        records: Vec<FoodRecord>,
        cancel: &CancelFlag,
    ) -> BatchReport {
        self.pipeline.ingest_with_cancel(records, cancel).await
    }

    /// Runs a nearest-neighbor search routed by query modality.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        self.router.search(query).await
    }

    /// Item counts per vector space.
    pub async fn stats(&self) -> Result<CatalogStats> {
        self.store.count_items().await
    }
}

/// Opens the catalog rooted at `root` using the given configuration.
///
/// Builds the embedding providers, the reference store and the pipelines from
/// config values. The store connection stays open for the catalog's lifetime.
pub fn open_catalog(root: &Path, config: &Config) -> anyhow::Result<Catalog> {
    let embeddings = config.embeddings();
    let text_embedder =
        create_text_embedder(embeddings).context("Failed to create text embedding provider")?;
    let image_embedder =
        create_image_embedder(embeddings).context("Failed to create image embedding provider")?;

    let schema = CollectionSchema::new(
        config.store().collection(),
        text_embedder.dimension(),
        image_embedder.dimension(),
    );

    let store = SqliteStore::open(
        root.join(config.store().path()),
        schema.clone(),
        text_embedder,
        image_embedder,
    )
    .context("Failed to open catalog store")?;

    let ingest = config.ingest();
    let search = config.search();
    Ok(Catalog::new(Arc::new(store), schema)
        .with_ingest_config(IngestConfig {
            concurrency: ingest.concurrency(),
            retry: RetryPolicy::new(ingest.retry_max_attempts(), ingest.retry_base_delay()),
        })
        .with_search_timeout(search.timeout()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn modality_parsing_and_fields() {
        assert_eq!("text".parse::<Modality>().unwrap(), Modality::Text);
        assert_eq!("i".parse::<Modality>().unwrap(), Modality::Image);
        assert!("audio".parse::<Modality>().is_err());
        assert_eq!(Modality::Text.vector_field(), TEXT_VECTOR);
        assert_eq!(Modality::Image.vector_field(), IMAGE_VECTOR);
    }

    #[test]
    fn record_validation() {
        assert!(FoodRecord::new("Pad Thai", "noodles").validate().is_ok());
        assert!(FoodRecord::new("", "noodles").validate().is_err());
        assert!(FoodRecord::new("Pad Thai", " ").validate().is_err());
        assert!(FoodRecord::new("Pad Thai", "noodles")
            .with_price(-1.0)
            .validate()
            .is_err());
        assert!(FoodRecord::new("Pad Thai", "noodles")
            .with_image(Vec::new())
            .validate()
            .is_err());
        assert!(FoodRecord::new("Pad Thai", "noodles")
            .with_price(9.5)
            .with_image(vec![1, 2, 3])
            .validate()
            .is_ok());
    }

    #[test]
    fn embedding_text_concatenates_name_and_description() {
        let record = FoodRecord::new("Pad Thai", "noodles").with_description("stir-fried rice noodles");
        assert_eq!(record.embedding_text(), "Pad Thai stir-fried rice noodles");

        let bare = FoodRecord::new("Pad Thai", "noodles");
        assert_eq!(bare.embedding_text(), "Pad Thai");
    }

    #[test]
    fn query_validation_rejects_bad_top_k() {
        let query = SearchQuery::text("noodles").with_top_k(0);
        assert!(matches!(
            query.validate(),
            Err(CatalogError::InvalidQuery { .. })
        ));

        let query = SearchQuery::text("noodles").with_top_k(MAX_TOP_K + 1);
        assert!(query.validate().is_err());

        let query = SearchQuery::text("noodles").with_top_k(MAX_TOP_K);
        assert!(query.validate().is_ok());
    }

    #[test]
    fn query_validation_rejects_short_payloads() {
        assert!(SearchQuery::text("a").validate().is_err());
        assert!(SearchQuery::text("  x  ").validate().is_err());
        assert!(SearchQuery::text("ok").validate().is_ok());
        assert!(SearchQuery::image(Vec::new()).validate().is_err());
        assert!(SearchQuery::image(vec![0xFF]).validate().is_ok());
    }

    #[test]
    fn query_modality_follows_payload() {
        assert_eq!(SearchQuery::text("noodles").modality(), Modality::Text);
        assert_eq!(SearchQuery::image(vec![1]).modality(), Modality::Image);
    }

    #[test]
    fn batch_report_counts() {
        let mut report = BatchReport::default();
        assert!(report.is_complete_success());
        report.succeeded.push(IngestedItem {
            index: 0,
            key: "k1".into(),
            name: "a".into(),
        });
        report.failed.push(FailedRecord {
            index: 1,
            name: "b".into(),
            reason: "boom".into(),
        });
        assert_eq!(report.total(), 2);
        assert!(!report.is_complete_success());
    }
}
