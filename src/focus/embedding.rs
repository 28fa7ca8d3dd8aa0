//! Text normalization, the embedding backend seam, and the per-worker anchor cache.

use anyhow::{anyhow, ensure, Result};
use async_trait::async_trait;

use super::expander::AnchorSet;

/// Characters kept from any single text field before encoding.
pub const MAX_TEXT_CHARS: usize = 1000;

/// Collapses runs of whitespace and caps the length.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(MAX_TEXT_CHARS)
        .collect()
}

#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// One vector per input, in input order.
    async fn encode(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Scores every query vector against one document vector.
    fn similarity(&self, queries: &[Vec<f32>], document: &[f32]) -> Result<Vec<f32>> {
        queries
            .iter()
            .map(|query| cosine_similarity(query, document))
            .collect()
    }
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f32> {
    ensure!(
        a.len() == b.len(),
        "embedding dimension mismatch: {} vs {}",
        a.len(),
        b.len()
    );
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0))
}

/// Anchor vectors computed once at worker startup.
///
/// Immutable once built. Only the worker that built it holds it.
#[derive(Debug)]
pub struct AnchorEmbedding {
    anchors: AnchorSet,
    vectors: Vec<Vec<f32>>,
}

impl AnchorEmbedding {
    pub fn anchors(&self) -> &AnchorSet {
        &self.anchors
    }

    pub fn vectors(&self) -> &[Vec<f32>] {
        &self.vectors
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}

pub async fn encode_anchors(
    backend: &dyn EmbeddingBackend,
    anchors: AnchorSet,
    query_prompt: &str,
) -> Result<AnchorEmbedding> {
    let inputs: Vec<String> = anchors
        .anchors()
        .iter()
        .map(|anchor| format!("{query_prompt}{}", normalize_text(anchor)))
        .collect();

    let vectors = backend.encode(&inputs).await?;
    if vectors.len() != inputs.len() {
        return Err(anyhow!(
            "embedding backend returned {} vectors for {} anchors",
            vectors.len(),
            inputs.len()
        ));
    }
    if let Some(first) = vectors.first() {
        let dims = first.len();
        ensure!(dims > 0, "embedding backend returned empty vectors");
        ensure!(
            vectors.iter().all(|vector| vector.len() == dims),
            "anchor vectors have inconsistent dimensions"
        );
    }

    Ok(AnchorEmbedding { anchors, vectors })
}
