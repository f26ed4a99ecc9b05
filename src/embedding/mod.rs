//! Text-to-vector embedding pipeline.
//!
//! Provides the [`EmbeddingProvider`] trait and three implementations: local
//! ONNX inference ([`local`]), an OpenAI-compatible HTTP endpoint ([`remote`]),
//! and a deterministic hash-based fallback ([`hashed`]) for offline or test
//! use. The provider is created via [`create_provider`] from configuration;
//! `disabled` yields `None` and the engine degrades to lexical-only recall.

pub mod hashed;
pub mod local;
pub mod remote;

use crate::config::EmbeddingConfig;
use crate::error::EmbedError;

/// Trait for embedding text into vectors.
///
/// Implementations produce L2-normalized vectors of exactly `dimensions()`
/// length. All methods are synchronous — callers in async contexts should use
/// `tokio::task::spawn_blocking`.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text string into a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError>;

    /// Embed a batch of text strings. Output order matches input order;
    /// implementations may override for batched inference but must stay
    /// semantically equivalent to per-item embedding.
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbedError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Number of dimensions this provider produces.
    fn dimensions(&self) -> usize;

    /// Identifier of the model behind this provider.
    fn model_id(&self) -> &str;
}

/// Create an embedding provider from config, or `None` when embeddings are
/// disabled and the engine should run lexical-only.
pub fn create_provider(
    config: &EmbeddingConfig,
) -> anyhow::Result<Option<Box<dyn EmbeddingProvider>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        "local" => {
            let provider = local::LocalEmbeddingProvider::new(config)?;
            Ok(Some(Box::new(provider)))
        }
        "remote" => {
            let provider = remote::RemoteEmbeddingProvider::new(config)?;
            Ok(Some(Box::new(provider)))
        }
        "hashed" => Ok(Some(Box::new(hashed::HashedEmbeddingProvider::new(
            config.dimensions,
        )))),
        other => anyhow::bail!(
            "unknown embedding provider: {other}. Supported: local, remote, hashed, disabled"
        ),
    }
}

/// L2-normalize a vector. Returns a zero vector if the input norm is zero.
pub(crate) fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter().map(|x| x / norm).collect()
    } else {
        v.to_vec()
    }
}
