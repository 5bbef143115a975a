// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding provider interface and implementations.
//!
//! Two capabilities, one per modality: text and image. The builtin text
//! provider runs fastembed locally; the command provider delegates to an
//! external embedding service through a configured shell command speaking
//! JSON on stdin/stdout; the dummy provider returns deterministic vectors
//! for tests and offline smoke runs.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use serde_json::Value;
use std::borrow::Cow;
use std::env;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::{EmbeddingConfig, ProviderKind};

/// Dimension of sentence-transformers/all-MiniLM-L6-v2.
pub const DEFAULT_TEXT_DIMENSION: usize = 384;

/// Dimension of CLIP ViT-B/32, the usual image inference model.
pub const DEFAULT_IMAGE_DIMENSION: usize = 512;

const DEFAULT_FASTEMBED_MODEL: &str = "minilm";
const DEFAULT_FASTEMBED_BATCH_SIZE: usize = 512;
const MAX_FASTEMBED_BATCH_SIZE: usize = 1024;
const DEFAULT_FASTEMBED_MAX_CHARS: usize = 2000;

/// Configuration for the builtin text embedding provider.
#[derive(Debug, Clone)]
pub struct EmbedderConfig {
    pub model: EmbeddingModel,
    pub batch_size: usize,
    pub max_chars: usize,
    pub normalize: bool,
}

impl EmbedderConfig {
    pub fn from_env() -> Result<Self> {
        let model = parse_model_env()?;
        let mut batch_size = parse_usize_env("FORAGE_EMBED_BATCH_SIZE", DEFAULT_FASTEMBED_BATCH_SIZE)?;
        if batch_size == 0 {
            batch_size = DEFAULT_FASTEMBED_BATCH_SIZE;
        }
        if batch_size > MAX_FASTEMBED_BATCH_SIZE {
            tracing::warn!(
                "FORAGE_EMBED_BATCH_SIZE={} exceeds max {}; clamping",
                batch_size,
                MAX_FASTEMBED_BATCH_SIZE
            );
            batch_size = MAX_FASTEMBED_BATCH_SIZE;
        }

        let mut max_chars = parse_usize_env("FORAGE_EMBED_MAX_CHARS", DEFAULT_FASTEMBED_MAX_CHARS)?;
        if max_chars == 0 {
            max_chars = DEFAULT_FASTEMBED_MAX_CHARS;
        }

        let normalize = parse_bool_env("FORAGE_EMBED_NORMALIZE", true)?;

        Ok(Self {
            model,
            batch_size,
            max_chars,
            normalize,
        })
    }

    pub fn has_env_overrides() -> bool {
        env::var_os("FORAGE_EMBED_MODEL").is_some()
            || env::var_os("FORAGE_EMBED_BATCH_SIZE").is_some()
            || env::var_os("FORAGE_EMBED_MAX_CHARS").is_some()
            || env::var_os("FORAGE_EMBED_NORMALIZE").is_some()
    }
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            model: EmbeddingModel::AllMiniLML6V2,
            batch_size: DEFAULT_FASTEMBED_BATCH_SIZE,
            max_chars: DEFAULT_FASTEMBED_MAX_CHARS,
            normalize: true,
        }
    }
}

/// Capability: text -> fixed-length vector.
#[async_trait]
pub trait TextEmbedder: Send + Sync {
    /// Returns the model identifier.
    fn model_id(&self) -> &str;

    /// Vector dimension this provider produces.
    fn dimension(&self) -> usize;

    /// Generates an embedding for a single text.
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;
}

/// Capability: raw image bytes -> fixed-length vector.
#[async_trait]
pub trait ImageEmbedder: Send + Sync {
    /// Returns the model identifier.
    fn model_id(&self) -> &str;

    /// Vector dimension this provider produces.
    fn dimension(&self) -> usize;

    /// Generates an embedding for a single image.
    async fn embed_image(&self, image: &[u8]) -> Result<Vec<f32>>;
}

/// Builtin text provider using sentence-transformers/all-MiniLM-L6-v2.
pub struct FastEmbedder {
    embedder: Arc<Mutex<TextEmbedding>>,
    config: EmbedderConfig,
    model_id: String,
}

impl FastEmbedder {
    pub fn new(config: EmbedderConfig) -> Result<Self> {
        let model = config.model.clone();
        let model_id = model.to_string();
        let init = InitOptions::new(model);
        let embedder =
            TextEmbedding::try_new(init).context("Failed to initialize fastembed model")?;

        Ok(Self {
            embedder: Arc::new(Mutex::new(embedder)),
            config,
            model_id,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(EmbedderConfig::from_env()?)
    }
}

#[async_trait]
impl TextEmbedder for FastEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        DEFAULT_TEXT_DIMENSION
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let prepared = vec![truncate_to_chars(text, self.config.max_chars).into_owned()];
        let embedder = Arc::clone(&self.embedder);
        let batch_size = self.config.batch_size;
        let normalize = self.config.normalize;

        // The model is CPU-bound and not async; run it off the reactor.
        let mut embeddings = tokio::task::spawn_blocking(move || {
            let mut guard = embedder
                .lock()
                .map_err(|_| anyhow::anyhow!("embedding model lock poisoned"))?;
            guard.embed(&prepared, Some(batch_size))
        })
        .await
        .context("Embedding task failed")??;

        let mut embedding = embeddings
            .pop()
            .ok_or_else(|| anyhow::anyhow!("No embedding returned"))?;
        if normalize {
            l2_normalize(&mut embedding);
        }
        Ok(embedding)
    }
}

/// Command provider that delegates to an external embedding service.
///
/// The configured command receives a JSON payload on stdin ({"model", "texts"}
/// for text, {"model", "images"} with base64 payloads for images) and must
/// print a JSON array of vectors, optionally wrapped in an "embeddings",
/// "vectors" or "data" envelope.
pub struct CommandEmbedder {
    command: String,
    model: String,
    dimension: usize,
}

impl CommandEmbedder {
    pub fn new(command: String, model: String, dimension: usize) -> Self {
        Self {
            command,
            model,
            dimension,
        }
    }

    /// Checks that the command's executable resolves on PATH.
    pub fn preflight(&self) -> Result<()> {
        let program = self
            .command
            .split_whitespace()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Embedding command is empty"))?;
        which::which(program)
            .map(|_| ())
            .with_context(|| format!("Embedding command not found on PATH: {}", program))
    }

    async fn run(&self, payload: Value) -> Result<Vec<Vec<f32>>> {
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn embedding command: {}", self.command))?;

        if let Some(mut stdin) = child.stdin.take() {
            let payload_str = payload.to_string();
            stdin
                .write_all(payload_str.as_bytes())
                .await
                .context("Failed to write embedding payload to stdin")?;
        }

        let output = child
            .wait_with_output()
            .await
            .context("Failed to read embedding command output")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "Embedding command failed (status {}): {}",
                output.status,
                stderr.trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let parsed: Value = serde_json::from_str(stdout.trim())
            .with_context(|| "Failed to parse embedding command output as JSON")?;

        parse_vectors(parsed)
    }
}

#[async_trait]
impl TextEmbedder for CommandEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let payload = serde_json::json!({
            "model": self.model,
            "texts": [text],
        });
        let mut vectors = self.run(payload).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("No embedding returned"))
    }
}

#[async_trait]
impl ImageEmbedder for CommandEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_image(&self, image: &[u8]) -> Result<Vec<f32>> {
        let payload = serde_json::json!({
            "model": self.model,
            "images": [BASE64.encode(image)],
        });
        let mut vectors = self.run(payload).await?;
        vectors
            .pop()
            .ok_or_else(|| anyhow::anyhow!("No embedding returned"))
    }
}

/// Dummy provider returning deterministic unit vectors derived from the
/// payload hash. Identical payloads embed identically, so exact-match
/// searches behave sensibly without any model.
pub struct DummyEmbedder {
    model: String,
    dimension: usize,
}

impl DummyEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            model: "dummy".to_string(),
            dimension,
        }
    }

    fn vector_for(&self, payload: &[u8]) -> Vec<f32> {
        let mut hasher = blake3::Hasher::new();
        hasher.update(payload);
        let mut reader = hasher.finalize_xof();
        let mut bytes = vec![0u8; self.dimension * 4];
        reader.fill(&mut bytes);

        let mut vector: Vec<f32> = bytes
            .chunks_exact(4)
            .map(|b| {
                let raw = u32::from_le_bytes([b[0], b[1], b[2], b[3]]);
                (raw as f64 / u32::MAX as f64 * 2.0 - 1.0) as f32
            })
            .collect();
        l2_normalize(&mut vector);
        vector
    }
}

#[async_trait]
impl TextEmbedder for DummyEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.vector_for(text.as_bytes()))
    }
}

#[async_trait]
impl ImageEmbedder for DummyEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_image(&self, image: &[u8]) -> Result<Vec<f32>> {
        Ok(self.vector_for(image))
    }
}

/// Builds the text embedding provider selected by configuration.
pub fn create_text_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn TextEmbedder>> {
    match config.text_provider() {
        ProviderKind::Builtin => {
            let embedder_config = if EmbedderConfig::has_env_overrides() {
                EmbedderConfig::from_env()?
            } else {
                EmbedderConfig::default()
            };
            Ok(Arc::new(FastEmbedder::new(embedder_config)?))
        }
        ProviderKind::Command => {
            let embedder = CommandEmbedder::new(
                config.text_command().to_string(),
                config.text_model().to_string(),
                config.text_dimension(),
            );
            if let Err(err) = embedder.preflight() {
                tracing::warn!("Text embedding command preflight failed: {:#}", err);
            }
            Ok(Arc::new(embedder))
        }
        ProviderKind::Dummy => Ok(Arc::new(DummyEmbedder::new(config.text_dimension()))),
    }
}

/// Builds the image embedding provider selected by configuration.
pub fn create_image_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn ImageEmbedder>> {
    match config.image_provider() {
        ProviderKind::Builtin => {
            bail!("Builtin image embedding is not available; configure a command provider")
        }
        ProviderKind::Command => {
            let embedder = CommandEmbedder::new(
                config.image_command().to_string(),
                config.image_model().to_string(),
                config.image_dimension(),
            );
            if let Err(err) = embedder.preflight() {
                tracing::warn!("Image embedding command preflight failed: {:#}", err);
            }
            Ok(Arc::new(embedder))
        }
        ProviderKind::Dummy => Ok(Arc::new(DummyEmbedder::new(config.image_dimension()))),
    }
}

fn parse_vectors(parsed: Value) -> Result<Vec<Vec<f32>>> {
    let embeddings_value = match parsed {
        Value::Array(arr) => Value::Array(arr),
        Value::Object(ref obj) => {
            if let Some(value) = obj.get("embeddings") {
                value.clone()
            } else if let Some(value) = obj.get("vectors") {
                value.clone()
            } else if let Some(value) = obj.get("data") {
                value.clone()
            } else {
                bail!("Embedding command output missing 'embeddings' field");
            }
        }
        _ => bail!("Embedding command output must be JSON array or object"),
    };

    embeddings_value
        .as_array()
        .ok_or_else(|| anyhow::anyhow!("Embedding output must be a JSON array"))?
        .iter()
        .map(|row| {
            row.as_array()
                .ok_or_else(|| anyhow::anyhow!("Embedding row must be an array"))?
                .iter()
                .map(|value| {
                    value
                        .as_f64()
                        .ok_or_else(|| anyhow::anyhow!("Embedding value must be a number"))
                        .map(|v| v as f32)
                })
                .collect::<Result<Vec<f32>>>()
        })
        .collect::<Result<Vec<Vec<f32>>>>()
}

pub(crate) fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}

fn truncate_to_chars(input: &str, max_chars: usize) -> Cow<'_, str> {
    if max_chars == 0 {
        return Cow::Borrowed("");
    }

    let mut count = 0;
    for (idx, _) in input.char_indices() {
        if count == max_chars {
            return Cow::Owned(input[..idx].to_string());
        }
        count += 1;
    }

    Cow::Borrowed(input)
}

fn parse_model_env() -> Result<EmbeddingModel> {
    let raw = env::var("FORAGE_EMBED_MODEL").unwrap_or_else(|_| DEFAULT_FASTEMBED_MODEL.to_string());
    let value = raw.trim();
    if value.is_empty() {
        return Ok(EmbeddingModel::AllMiniLML6V2);
    }

    match value.to_lowercase().as_str() {
        "minilm"
        | "all-minilm-l6-v2"
        | "allminilm-l6-v2"
        | "sentence-transformers/all-minilm-l6-v2" => Ok(EmbeddingModel::AllMiniLML6V2),
        other => bail!(
            "Unsupported FORAGE_EMBED_MODEL '{}'. Supported value: {}",
            other,
            DEFAULT_FASTEMBED_MODEL
        ),
    }
}

fn parse_usize_env(name: &str, default: usize) -> Result<usize> {
    match env::var(name) {
        Ok(raw) => {
            let value = raw.trim();
            if value.is_empty() {
                Ok(default)
            } else {
                value
                    .parse::<usize>()
                    .with_context(|| format!("Invalid {} value: {}", name, value))
            }
        }
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("Failed to read {}", name)),
    }
}

fn parse_bool_env(name: &str, default: bool) -> Result<bool> {
    match env::var(name) {
        Ok(raw) => {
            let value = raw.trim().to_lowercase();
            if value.is_empty() {
                return Ok(default);
            }
            match value.as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                other => bail!("Invalid {} value: {}", name, other),
            }
        }
        Err(env::VarError::NotPresent) => Ok(default),
        Err(err) => Err(err).with_context(|| format!("Failed to read {}", name)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn dummy_is_deterministic_per_payload() {
        let provider = DummyEmbedder::new(16);
        let a = provider.embed_text("pad thai").await.unwrap();
        let b = provider.embed_text("pad thai").await.unwrap();
        let c = provider.embed_text("green curry").await.unwrap();
        assert_eq!(a.len(), 16);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[tokio::test]
    async fn dummy_vectors_are_unit_length() {
        let provider = DummyEmbedder::new(32);
        let v = provider.embed_image(b"jpeg bytes").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn dummy_text_and_image_dimensions_match_config() {
        let provider = DummyEmbedder::new(8);
        assert_eq!(TextEmbedder::dimension(&provider), 8);
        assert_eq!(ImageEmbedder::dimension(&provider), 8);
        assert_eq!(provider.embed_image(&[1, 2, 3]).await.unwrap().len(), 8);
    }

    #[test]
    fn parse_vectors_accepts_known_envelopes() {
        for key in ["embeddings", "vectors", "data"] {
            let parsed = serde_json::json!({ key: [[0.1, 0.2], [0.3, 0.4]] });
            let vectors = parse_vectors(parsed).unwrap();
            assert_eq!(vectors.len(), 2);
            assert_eq!(vectors[0].len(), 2);
        }

        let bare = serde_json::json!([[1.0, 2.0]]);
        assert_eq!(parse_vectors(bare).unwrap().len(), 1);
    }

    #[test]
    fn parse_vectors_rejects_malformed_output() {
        assert!(parse_vectors(serde_json::json!({"other": []})).is_err());
        assert!(parse_vectors(serde_json::json!("text")).is_err());
        assert!(parse_vectors(serde_json::json!([["a", "b"]])).is_err());
    }

    #[test]
    fn test_truncate_to_chars() {
        let input = "hello";
        assert_eq!(
            truncate_to_chars(input, 2),
            Cow::<str>::Owned("he".to_string())
        );
        assert_eq!(truncate_to_chars(input, 5), Cow::Borrowed(input));
    }

    #[test]
    fn l2_normalize_handles_zero_vector() {
        let mut zero = vec![0.0f32; 4];
        l2_normalize(&mut zero);
        assert!(zero.iter().all(|&v| v == 0.0));

        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }
}
