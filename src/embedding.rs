//! # Embedding Boundary Module
//!
//! ## Purpose
//! The embedding model is an injected, opaque dependency: the core only
//! requires `embed(text) -> Vec<f32>` with a fixed dimension per deployment.
//! This module defines that boundary and ships a deterministic
//! feature-hashing baseline used by the CLI binary and tests.
//!
//! ## Input/Output Specification
//! - **Input**: Free text (fact narratives, query text)
//! - **Output**: Fixed-dimension `f32` vectors
//! - **Contract**: The same deployment must use one embedder for both
//!   ingestion-time fact embedding and query-time embedding

use crate::errors::Result;
use async_trait::async_trait;

/// Injected embedding function boundary
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed one text into a vector of `self.dimension()` components
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Fixed output dimension of this embedder
    fn dimension(&self) -> usize;
}

/// Deterministic feature-hashing embedder.
///
/// Hashes character trigrams into a fixed number of buckets and
/// L2-normalizes the result. Not a semantic model; it stands in for the
/// deployment embedder in the CLI and in tests, where determinism matters
/// more than embedding quality.
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        assert!(dimension > 0, "embedding dimension must be positive");
        Self { dimension }
    }

    fn bucket(&self, gram: &[char]) -> usize {
        // FNV-1a over the code points
        let mut hash: u64 = 0xcbf29ce484222325;
        for &c in gram {
            hash ^= c as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        (hash % self.dimension as u64) as usize
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vector = vec![0.0f32; self.dimension];
        let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();

        if chars.is_empty() {
            return Ok(vector);
        }

        for window in chars.windows(3.min(chars.len())) {
            vector[self.bucket(window)] += 1.0;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embedding_is_deterministic() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed("被告駕車追撞原告").await.unwrap();
        let b = embedder.embed("被告駕車追撞原告").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn different_texts_embed_differently() {
        let embedder = HashingEmbedder::new(64);
        let a = embedder.embed("被告駕車追撞原告").await.unwrap();
        let b = embedder.embed("原告穿越馬路被機車撞及").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn vectors_are_normalized() {
        let embedder = HashingEmbedder::new(32);
        let v = embedder.embed("事故發生緣由").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn empty_text_embeds_to_zero_vector() {
        let embedder = HashingEmbedder::new(16);
        let v = embedder.embed("").await.unwrap();
        assert!(v.iter().all(|&x| x == 0.0));
    }
}
