// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite-backed reference store for the food catalog.
//!
//! Persists items with their scalar attributes and up to two vector fields
//! (f32 little-endian blobs), answers brute-force cosine nearest-neighbor
//! queries, and proxies the configured embedding providers. The connection
//! is mutexed; individual statements are short-lived local operations.

use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;

use crate::catalog::{FoodItem, Modality};
use crate::embedding::{ImageEmbedder, TextEmbedder};
use crate::errors::{CatalogError, Result};
use crate::schema::CollectionSchema;
use crate::store::{CatalogStats, NearestNeighbor, NewItem, SchemaOutcome, VectorStore};
use crate::utils::CATALOG_DIR;

const SCHEMA_META_KEY: &str = "collection_schema";
const SCHEMA_VERSION: &str = "1";

/// SQLite-backed catalog store.
///
/// Stores the catalog in `.forage/catalog.sqlite` by default.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: PathBuf,
    schema: CollectionSchema,
    text_embedder: Arc<dyn TextEmbedder>,
    image_embedder: Arc<dyn ImageEmbedder>,
}

impl SqliteStore {
    /// Opens or creates a store at the specified path.
    pub fn open<P: AsRef<Path>>(
        path: P,
        schema: CollectionSchema,
        text_embedder: Arc<dyn TextEmbedder>,
        image_embedder: Arc<dyn ImageEmbedder>,
    ) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                anyhow::anyhow!("Failed to create directory {}: {}", parent.display(), e)
            })?;
        }

        let conn = Connection::open(&path)
            .map_err(|e| anyhow::anyhow!("Failed to open database {}: {}", path.display(), e))?;

        Ok(Self {
            conn: Mutex::new(conn),
            path,
            schema,
            text_embedder,
            image_embedder,
        })
    }

    /// Opens the store in the default location under a catalog root.
    pub fn open_default<P: AsRef<Path>>(
        root: P,
        schema: CollectionSchema,
        text_embedder: Arc<dyn TextEmbedder>,
        image_embedder: Arc<dyn ImageEmbedder>,
    ) -> anyhow::Result<Self> {
        let db_path = root.as_ref().join(CATALOG_DIR).join("catalog.sqlite");
        Self::open(db_path, schema, text_embedder, image_embedder)
    }

    /// Returns the path to the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CatalogError::store(anyhow::anyhow!("store connection lock poisoned")))
    }

    fn init_tables(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                item_key TEXT NOT NULL UNIQUE,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                category TEXT NOT NULL,
                price REAL,
                text_vector BLOB,
                image_vector BLOB,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_items_category ON items(category);
            "#,
        )
        .map_err(CatalogError::store)
    }

    fn validate_vector(&self, modality: Modality, vector: &[f32]) -> Result<()> {
        let expected = match modality {
            Modality::Text => self.schema.text.dimension,
            Modality::Image => self.schema.image.dimension,
        };
        if vector.len() != expected {
            return Err(CatalogError::embedding(
                modality,
                anyhow::anyhow!(
                    "expected {} dimensions, provider returned {}",
                    expected,
                    vector.len()
                ),
            ));
        }
        Ok(())
    }

    fn row_to_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<FoodItem> {
        Ok(FoodItem {
            key: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            category: row.get(3)?,
            price: row.get(4)?,
            has_text_vector: row.get::<_, i64>(5)? != 0,
            has_image_vector: row.get::<_, i64>(6)? != 0,
            created_at: row.get(7)?,
        })
    }

    /// Converts an embedding vector to a compact blob.
    fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
        vector.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    /// Converts a blob back to an embedding vector.
    fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
        blob.chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }

    /// Computes cosine distance (1 - cosine similarity) between two vectors.
    fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() || a.is_empty() {
            return 1.0;
        }

        let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

        if magnitude_a == 0.0 || magnitude_b == 0.0 {
            return 1.0;
        }

        1.0 - dot_product / (magnitude_a * magnitude_b)
    }
}

#[async_trait]
impl VectorStore for SqliteStore {
    async fn ensure_collection(&self, schema: &CollectionSchema) -> Result<SchemaOutcome> {
        let conn = self.lock()?;
        Self::init_tables(&conn)?;

        let fingerprint = schema.fingerprint();
        let existing: Option<String> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![SCHEMA_META_KEY],
                |row| row.get(0),
            )
            .optional()
            .map_err(CatalogError::store)?;

        let created = match existing {
            Some(_) => false,
            None => {
                // Creation races resolve through INSERT OR IGNORE; the
                // re-read below decides which definition actually landed.
                conn.execute(
                    "INSERT OR IGNORE INTO meta (key, value) VALUES (?1, ?2)",
                    params![SCHEMA_META_KEY, fingerprint],
                )
                .map_err(CatalogError::store)?;
                conn.execute(
                    "INSERT OR IGNORE INTO meta (key, value) VALUES ('schema_version', ?1)",
                    params![SCHEMA_VERSION],
                )
                .map_err(CatalogError::store)?;
                true
            }
        };

        let stored: String = conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![SCHEMA_META_KEY],
                |row| row.get(0),
            )
            .map_err(CatalogError::store)?;

        let stored_schema: Option<CollectionSchema> = serde_json::from_str(&stored).ok();
        if stored_schema.as_ref() != Some(schema) {
            return Err(CatalogError::SchemaConflict {
                reason: format!(
                    "collection '{}' already exists with an incompatible definition: stored {}, requested {}",
                    schema.collection, stored, fingerprint
                ),
            });
        }

        Ok(if created {
            SchemaOutcome::Created
        } else {
            SchemaOutcome::AlreadyExists
        })
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self
            .text_embedder
            .embed_text(text)
            .await
            .map_err(|e| CatalogError::embedding(Modality::Text, e))?;
        self.validate_vector(Modality::Text, &vector)?;
        Ok(vector)
    }

    async fn embed_image(&self, image: &[u8]) -> Result<Vec<f32>> {
        let vector = self
            .image_embedder
            .embed_image(image)
            .await
            .map_err(|e| CatalogError::embedding(Modality::Image, e))?;
        self.validate_vector(Modality::Image, &vector)?;
        Ok(vector)
    }

    async fn insert_item(&self, item: NewItem) -> Result<String> {
        if item.text_vector.is_none() && item.image_vector.is_none() {
            return Err(CatalogError::InvalidRecord {
                reason: format!("item '{}' has neither vector; refusing to persist", item.name),
            });
        }
        if let Some(vector) = &item.text_vector {
            self.validate_vector(Modality::Text, vector)?;
        }
        if let Some(vector) = &item.image_vector {
            self.validate_vector(Modality::Image, vector)?;
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction().map_err(CatalogError::store)?;

        let next_id: i64 = tx
            .query_row("SELECT COALESCE(MAX(id), 0) + 1 FROM items", [], |row| {
                row.get(0)
            })
            .map_err(CatalogError::store)?;
        let key = blake3::hash(format!("{}:{}", next_id, item.name).as_bytes()).to_hex()[..16]
            .to_string();

        let created_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;

        tx.execute(
            r#"
            INSERT INTO items (
                item_key, name, description, category, price,
                text_vector, image_vector, created_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                key,
                item.name,
                item.description,
                item.category,
                item.price,
                item.text_vector.as_deref().map(Self::vector_to_blob),
                item.image_vector.as_deref().map(Self::vector_to_blob),
                created_at
            ],
        )
        .map_err(CatalogError::store)?;

        tx.commit().map_err(CatalogError::store)?;
        Ok(key)
    }

    async fn near_vector(
        &self,
        field: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<NearestNeighbor>> {
        let Some(field_def) = self.schema.field(field) else {
            return Err(CatalogError::InvalidQuery {
                reason: format!("unknown vector field: {}", field),
            });
        };
        if vector.len() != field_def.dimension {
            return Err(CatalogError::InvalidQuery {
                reason: format!(
                    "query vector has {} dimensions, field {} expects {}",
                    vector.len(),
                    field,
                    field_def.dimension
                ),
            });
        }

        let conn = self.lock()?;
        // Field names come from the validated schema, never from callers.
        let sql = format!(
            "SELECT item_key, {field} FROM items WHERE {field} IS NOT NULL",
            field = field
        );
        let mut stmt = conn.prepare(&sql).map_err(CatalogError::store)?;

        let mut hits: Vec<NearestNeighbor> = stmt
            .query_map([], |row| {
                let item_key: String = row.get(0)?;
                let blob: Vec<u8> = row.get(1)?;
                Ok((item_key, blob))
            })
            .map_err(CatalogError::store)?
            .filter_map(|r| r.ok())
            .map(|(item_key, blob)| {
                let stored = Self::blob_to_vector(&blob);
                NearestNeighbor {
                    item_key,
                    distance: Self::cosine_distance(vector, &stored),
                }
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.item_key.cmp(&b.item_key))
        });
        hits.truncate(limit);

        Ok(hits)
    }

    async fn fetch_items(&self, keys: &[String]) -> Result<Vec<FoodItem>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                r#"
                SELECT item_key, name, description, category, price,
                       text_vector IS NOT NULL, image_vector IS NOT NULL, created_at
                FROM items
                WHERE item_key = ?1
                "#,
            )
            .map_err(CatalogError::store)?;

        let mut items = Vec::with_capacity(keys.len());
        for key in keys {
            let item = stmt
                .query_row(params![key], Self::row_to_item)
                .optional()
                .map_err(CatalogError::store)?;
            if let Some(item) = item {
                items.push(item);
            }
        }

        Ok(items)
    }

    async fn count_items(&self) -> Result<CatalogStats> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT COUNT(*), COUNT(text_vector), COUNT(image_vector) FROM items",
            [],
            |row| {
                Ok(CatalogStats {
                    items: row.get::<_, i64>(0)? as u64,
                    text_indexed: row.get::<_, i64>(1)? as u64,
                    image_indexed: row.get::<_, i64>(2)? as u64,
                })
            },
        )
        .map_err(CatalogError::store)
    }
}
