// SPDX-License-Identifier: MIT OR Apache-2.0

//! Vector store boundary.
//!
//! The catalog talks to its store through the `VectorStore` trait: schema
//! create/check, object insertion with up to two named vectors,
//! nearest-neighbor queries per vector field, and the embedding proxy. The
//! embedding providers are configured into the store handle, so callers never
//! reach a provider endpoint directly.

pub mod sqlite;

use async_trait::async_trait;
use serde::Serialize;

use crate::catalog::FoodItem;
use crate::errors::Result;
use crate::schema::CollectionSchema;

pub use sqlite::SqliteStore;

/// Outcome of an `ensure_collection` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaOutcome {
    /// The collection was created by this call.
    Created,
    /// A compatible collection already existed.
    AlreadyExists,
}

/// A raw nearest-neighbor hit: item key plus cosine distance.
#[derive(Debug, Clone)]
pub struct NearestNeighbor {
    pub item_key: String,
    pub distance: f32,
}

/// Item counts per vector space.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CatalogStats {
    pub items: u64,
    pub text_indexed: u64,
    pub image_indexed: u64,
}

/// Input for a single object insertion.
///
/// At least one vector must be present; an item with neither vector is not
/// searchable and is rejected before persistence.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub name: String,
    pub description: String,
    pub category: String,
    pub price: Option<f64>,
    pub text_vector: Option<Vec<f32>>,
    pub image_vector: Option<Vec<f32>>,
}

/// The store boundary: schema, objects, vectors and the embedding proxy.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Idempotently creates the collection or checks an existing one for
    /// compatibility. Incompatible existing definitions fail with
    /// `SchemaConflict`.
    async fn ensure_collection(&self, schema: &CollectionSchema) -> Result<SchemaOutcome>;

    /// Embeds text through the configured text provider, validating the
    /// returned dimension against the collection schema.
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    /// Embeds raw image bytes through the configured image provider,
    /// validating the returned dimension against the collection schema.
    async fn embed_image(&self, image: &[u8]) -> Result<Vec<f32>>;

    /// Persists one item atomically, returning the store-assigned key.
    async fn insert_item(&self, item: NewItem) -> Result<String>;

    /// Returns up to `limit` nearest neighbors of `vector` within the named
    /// vector field, ordered by ascending distance with key tie-break.
    /// Items lacking that vector are never candidates.
    async fn near_vector(
        &self,
        field: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<NearestNeighbor>>;

    /// Fetches item metadata for the given keys. Unknown keys are skipped.
    async fn fetch_items(&self, keys: &[String]) -> Result<Vec<FoodItem>>;

    /// Item counts per vector space.
    async fn count_items(&self) -> Result<CatalogStats>;
}
