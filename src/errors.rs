// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed error taxonomy for the catalog API.
//!
//! Per-record ingestion failures are isolated into the batch report; search
//! failures surface whole-call. Only `EmbeddingFailure` and `StoreUnavailable`
//! are retried.

use thiserror::Error;

use crate::catalog::Modality;

/// Errors surfaced by the caller-facing catalog API.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The collection already exists with an incompatible definition.
    #[error("schema conflict: {reason}")]
    SchemaConflict { reason: String },

    /// An embedding provider errored or returned a vector of unexpected
    /// dimension.
    #[error("{modality} embedding failed: {source}")]
    EmbeddingFailure {
        modality: Modality,
        #[source]
        source: anyhow::Error,
    },

    /// A query asked for a vector space its payload cannot address.
    #[error("unsupported modality: {query} query cannot target the {target} vector space")]
    UnsupportedModality { query: Modality, target: Modality },

    /// The search did not complete within its deadline.
    #[error("search timed out after {elapsed_ms}ms")]
    SearchTimeout { elapsed_ms: u64 },

    /// The vector store could not be reached or errored.
    #[error("store unavailable: {source}")]
    StoreUnavailable {
        #[source]
        source: anyhow::Error,
    },

    /// An ingestion record failed boundary validation.
    #[error("invalid record: {reason}")]
    InvalidRecord { reason: String },

    /// A search query failed boundary validation.
    #[error("invalid query: {reason}")]
    InvalidQuery { reason: String },
}

impl CatalogError {
    /// Whether a bounded retry with backoff may recover this failure.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CatalogError::EmbeddingFailure { .. } | CatalogError::StoreUnavailable { .. }
        )
    }

    pub(crate) fn store(source: impl Into<anyhow::Error>) -> Self {
        CatalogError::StoreUnavailable {
            source: source.into(),
        }
    }

    pub(crate) fn embedding(modality: Modality, source: impl Into<anyhow::Error>) -> Self {
        CatalogError::EmbeddingFailure {
            modality,
            source: source.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(CatalogError::store(anyhow::anyhow!("down")).is_retryable());
        assert!(CatalogError::embedding(Modality::Text, anyhow::anyhow!("503")).is_retryable());
        assert!(!CatalogError::InvalidQuery {
            reason: "empty".into()
        }
        .is_retryable());
        assert!(!CatalogError::SchemaConflict {
            reason: "metric".into()
        }
        .is_retryable());
    }

    #[test]
    fn display_includes_modality() {
        let err = CatalogError::embedding(Modality::Image, anyhow::anyhow!("connection refused"));
        assert!(err.to_string().contains("image"));
    }
}
