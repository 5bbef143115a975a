// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query routing: modality classification and vector-field dispatch.
//!
//! A text query embeds through the text provider and searches `text_vector`;
//! an image query embeds through the image provider and searches
//! `image_vector`. Cross-modal requests are rejected. Every search is
//! bounded by a timeout and never hangs indefinitely.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::catalog::{QueryPayload, SearchQuery, SearchResult};
use crate::errors::{CatalogError, Result};
use crate::ranking;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::store::VectorStore;

/// Default per-search deadline.
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Routes queries to the correct vector space and formats the results.
pub struct QueryRouter {
    store: Arc<dyn VectorStore>,
    timeout: Duration,
    retry: RetryPolicy,
}

impl QueryRouter {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self {
            store,
            timeout: DEFAULT_SEARCH_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Runs a nearest-neighbor search for the query.
    ///
    /// Returns results ordered by similarity descending with deterministic
    /// key tie-break; an empty list is a valid outcome, not an error.
    pub async fn search(&self, query: &SearchQuery) -> Result<Vec<SearchResult>> {
        query.validate()?;

        let modality = query.modality();
        if let Some(target) = query.target {
            if target != modality {
                return Err(CatalogError::UnsupportedModality {
                    query: modality,
                    target,
                });
            }
        }

        let field = modality.vector_field();
        let deadline = query.timeout.unwrap_or(self.timeout);
        let started = Instant::now();
        tracing::debug!("{} search against {} (top_k={})", modality, field, query.top_k);

        let search = async {
            // Query embedding failures surface immediately; only store
            // reads get the transient-failure retry budget.
            let vector = match &query.payload {
                QueryPayload::Text(text) => self.store.embed_text(text.trim()).await?,
                QueryPayload::Image(bytes) => self.store.embed_image(bytes).await?,
            };

            let hits = retry_with_backoff(&self.retry, "nearest-neighbor query", || {
                self.store.near_vector(field, &vector, query.top_k)
            })
            .await?;

            let keys: Vec<String> = hits.iter().map(|h| h.item_key.clone()).collect();
            let items = retry_with_backoff(&self.retry, "metadata fetch", || {
                self.store.fetch_items(&keys)
            })
            .await?;

            Ok(ranking::format_results(hits, &items, modality, query.top_k))
        };

        match tokio::time::timeout(deadline, search).await {
            Ok(result) => result,
            Err(_) => Err(CatalogError::SearchTimeout {
                elapsed_ms: started.elapsed().as_millis() as u64,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FoodItem, Modality};
    use crate::schema::{CollectionSchema, TEXT_VECTOR};
    use crate::store::{CatalogStats, NearestNeighbor, NewItem, SchemaOutcome};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Store stub with canned hits and a configurable query delay.
    struct StubStore {
        hits: Vec<NearestNeighbor>,
        items: Vec<FoodItem>,
        delay: Duration,
        seen_fields: Mutex<Vec<String>>,
    }

    impl StubStore {
        fn new(hits: Vec<NearestNeighbor>, items: Vec<FoodItem>) -> Self {
            Self {
                hits,
                items,
                delay: Duration::ZERO,
                seen_fields: Mutex::new(Vec::new()),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl VectorStore for StubStore {
        async fn ensure_collection(&self, _schema: &CollectionSchema) -> Result<SchemaOutcome> {
            Ok(SchemaOutcome::Created)
        }

        async fn embed_text(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        async fn embed_image(&self, _image: &[u8]) -> Result<Vec<f32>> {
            Ok(vec![0.0, 1.0])
        }

        async fn insert_item(&self, _item: NewItem) -> Result<String> {
            Ok("unused".to_string())
        }

        async fn near_vector(
            &self,
            field: &str,
            _vector: &[f32],
            limit: usize,
        ) -> Result<Vec<NearestNeighbor>> {
            self.seen_fields.lock().unwrap().push(field.to_string());
            tokio::time::sleep(self.delay).await;
            let mut hits = self.hits.clone();
            hits.truncate(limit);
            Ok(hits)
        }

        async fn fetch_items(&self, _keys: &[String]) -> Result<Vec<FoodItem>> {
            Ok(self.items.clone())
        }

        async fn count_items(&self) -> Result<CatalogStats> {
            Ok(CatalogStats::default())
        }
    }

    fn item(key: &str) -> FoodItem {
        FoodItem {
            key: key.to_string(),
            name: key.to_string(),
            description: String::new(),
            category: "test".to_string(),
            price: None,
            has_text_vector: true,
            has_image_vector: false,
            created_at: 0,
        }
    }

    fn hit(key: &str, distance: f32) -> NearestNeighbor {
        NearestNeighbor {
            item_key: key.to_string(),
            distance,
        }
    }

    #[tokio::test]
    async fn text_query_searches_text_vector() {
        let store = Arc::new(StubStore::new(
            vec![hit("a", 0.1)],
            vec![item("a")],
        ));
        let router = QueryRouter::new(Arc::clone(&store) as Arc<dyn VectorStore>);

        let results = router.search(&SearchQuery::text("noodles")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].source_modality, Modality::Text);
        assert_eq!(
            *store.seen_fields.lock().unwrap(),
            vec![TEXT_VECTOR.to_string()]
        );
    }

    #[tokio::test]
    async fn cross_modal_target_is_rejected() {
        let store = Arc::new(StubStore::new(Vec::new(), Vec::new()));
        let router = QueryRouter::new(store);

        let query = SearchQuery::text("noodles").with_target(Modality::Image);
        let err = router.search(&query).await.unwrap_err();
        assert!(matches!(
            err,
            CatalogError::UnsupportedModality {
                query: Modality::Text,
                target: Modality::Image,
            }
        ));
    }

    #[tokio::test]
    async fn matching_explicit_target_is_accepted() {
        let store = Arc::new(StubStore::new(Vec::new(), Vec::new()));
        let router = QueryRouter::new(store);

        let query = SearchQuery::text("noodles").with_target(Modality::Text);
        assert!(router.search(&query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn slow_store_times_out() {
        let store = Arc::new(
            StubStore::new(vec![hit("a", 0.1)], vec![item("a")])
                .with_delay(Duration::from_millis(200)),
        );
        let router =
            QueryRouter::new(store as Arc<dyn VectorStore>).with_retry(RetryPolicy::no_retry());

        let query = SearchQuery::text("noodles").with_timeout(Duration::from_millis(10));
        let err = router.search(&query).await.unwrap_err();
        assert!(matches!(err, CatalogError::SearchTimeout { .. }));
    }

    #[tokio::test]
    async fn zero_top_k_fails_fast() {
        let store = Arc::new(StubStore::new(Vec::new(), Vec::new()));
        let router = QueryRouter::new(store);

        let err = router
            .search(&SearchQuery::text("noodles").with_top_k(0))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidQuery { .. }));
    }

    #[tokio::test]
    async fn empty_catalog_returns_empty_list() {
        let store = Arc::new(StubStore::new(Vec::new(), Vec::new()));
        let router = QueryRouter::new(store);

        let results = router
            .search(&SearchQuery::image(vec![0xFF, 0xD8]))
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
