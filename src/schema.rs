// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collection schema: one object type, two named vector fields.
//!
//! The catalog declares a single collection whose objects carry scalar food
//! attributes plus two independently queryable vector fields, each bound to
//! one embedding capability and a similarity metric.

use serde::{Deserialize, Serialize};

/// Name of the vector field populated from `name + description`.
pub const TEXT_VECTOR: &str = "text_vector";

/// Name of the vector field populated from the item image.
pub const IMAGE_VECTOR: &str = "image_vector";

/// Default collection name.
pub const DEFAULT_COLLECTION: &str = "foods";

/// Similarity metric for a vector field.
///
/// Cosine is the only supported metric; both embedding providers are expected
/// to produce L2-normalized or cosine-compatible vectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    #[default]
    Cosine,
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Metric::Cosine => write!(f, "cosine"),
        }
    }
}

/// A named, independently queryable vector field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorField {
    pub name: String,
    pub metric: Metric,
    pub dimension: usize,
}

impl VectorField {
    pub fn new(name: &str, dimension: usize) -> Self {
        Self {
            name: name.to_string(),
            metric: Metric::Cosine,
            dimension,
        }
    }
}

/// The catalog collection definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSchema {
    pub collection: String,
    pub text: VectorField,
    pub image: VectorField,
}

impl CollectionSchema {
    /// Builds the standard two-vector schema for a collection.
    pub fn new(collection: &str, text_dimension: usize, image_dimension: usize) -> Self {
        Self {
            collection: collection.to_string(),
            text: VectorField::new(TEXT_VECTOR, text_dimension),
            image: VectorField::new(IMAGE_VECTOR, image_dimension),
        }
    }

    /// The vector field backing the given field name, if it is one of ours.
    pub fn field(&self, name: &str) -> Option<&VectorField> {
        if name == self.text.name {
            Some(&self.text)
        } else if name == self.image.name {
            Some(&self.image)
        } else {
            None
        }
    }

    /// Serialized form used for compatibility comparison by stores.
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

impl Default for CollectionSchema {
    fn default() -> Self {
        Self::new(DEFAULT_COLLECTION, 384, 512)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_schema_has_both_vector_fields() {
        let schema = CollectionSchema::new("foods", 384, 512);
        assert_eq!(schema.text.name, TEXT_VECTOR);
        assert_eq!(schema.image.name, IMAGE_VECTOR);
        assert_eq!(schema.text.metric, Metric::Cosine);
        assert_eq!(schema.image.metric, Metric::Cosine);
        assert_eq!(schema.field(TEXT_VECTOR).unwrap().dimension, 384);
        assert_eq!(schema.field(IMAGE_VECTOR).unwrap().dimension, 512);
        assert!(schema.field("other_vector").is_none());
    }

    #[test]
    fn fingerprint_is_stable_and_discriminating() {
        let a = CollectionSchema::new("foods", 384, 512);
        let b = CollectionSchema::new("foods", 384, 512);
        let c = CollectionSchema::new("foods", 384, 768);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
    }

    #[test]
    fn fingerprint_roundtrips() {
        let schema = CollectionSchema::default();
        let parsed: CollectionSchema = serde_json::from_str(&schema.fingerprint()).unwrap();
        assert_eq!(parsed, schema);
    }
}
