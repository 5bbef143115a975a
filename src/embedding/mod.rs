// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding module - vector embedding capabilities for catalog items.
//!
//! Provides the text and image embedding provider traits plus the builtin,
//! command and dummy adapters. Providers are configured into the store
//! handle; the rest of the crate never calls one directly.

pub mod provider;

pub use provider::{
    create_image_embedder, create_text_embedder, CommandEmbedder, DummyEmbedder, EmbedderConfig,
    FastEmbedder, ImageEmbedder, TextEmbedder, DEFAULT_IMAGE_DIMENSION, DEFAULT_TEXT_DIMENSION,
};
