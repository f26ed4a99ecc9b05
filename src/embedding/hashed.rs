//! Deterministic hash-based embedding provider.
//!
//! Produces a pseudo-embedding from an FNV hash of the text fed through a
//! splitmix64 stream. Semantically meaningless but stable: identical text
//! always yields the identical L2-normalized vector, which is exactly what
//! offline smoke tests and model-less installs need. Not a substitute for a
//! real model — nearest neighbors are essentially random.

use super::{l2_normalize, EmbeddingProvider};
use crate::error::EmbedError;

pub struct HashedEmbeddingProvider {
    dimensions: usize,
}

impl HashedEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }
}

/// FNV-1a over the text bytes, seeding the vector stream.
fn fnv1a(text: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in text.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// splitmix64 step — a well-distributed 64-bit mixer.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

impl EmbeddingProvider for HashedEmbeddingProvider {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if text.trim().is_empty() {
            return Err(EmbedError::InvalidInput("text is empty".into()));
        }
        let mut state = fnv1a(text);
        let raw: Vec<f32> = (0..self.dimensions)
            .map(|_| {
                let bits = splitmix64(&mut state);
                // Map the top 24 bits onto [-1, 1)
                ((bits >> 40) as f32 / 8_388_608.0) - 1.0
            })
            .collect();
        Ok(l2_normalize(&raw))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_id(&self) -> &str {
        "hashed"
    }
}
