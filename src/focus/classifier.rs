use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{anyhow, ensure, Result};
use serde::{Deserialize, Serialize};

use super::embedding::{normalize_text, AnchorEmbedding, EmbeddingBackend};

/// Empirically tuned cut-off between on-goal and off-goal pages.
pub const DEFAULT_THRESHOLD: f32 = 0.2394;

pub const WHITELIST_LABEL: &str = "WHITELIST";
pub const BLACKLIST_LABEL: &str = "BLACKLIST";
/// Label reported when no anchor clears the threshold.
pub const NO_MATCH_LABEL: &str = "Distractive content";

/// Extracted page content submitted for classification.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PagePayload {
    pub url: String,
    pub title: String,
    pub meta: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClassificationResult {
    pub is_focused: bool,
    pub score: f32,
    pub matched_anchor: String,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
}

impl ClassificationResult {
    pub fn whitelisted() -> Self {
        Self {
            is_focused: true,
            score: 1.0,
            matched_anchor: WHITELIST_LABEL.into(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn blacklisted() -> Self {
        Self {
            is_focused: false,
            score: 0.0,
            matched_anchor: BLACKLIST_LABEL.into(),
            elapsed: Duration::ZERO,
        }
    }

    /// Applies the threshold rule to a max-pooled score.
    pub fn from_score(score: f32, anchor: &str, threshold: f32, elapsed: Duration) -> Self {
        let is_focused = score >= threshold;
        Self {
            is_focused,
            score,
            matched_anchor: if is_focused {
                anchor.to_string()
            } else {
                NO_MATCH_LABEL.to_string()
            },
            elapsed,
        }
    }
}

pub struct SimilarityClassifier {
    backend: Arc<dyn EmbeddingBackend>,
    threshold: f32,
}

impl SimilarityClassifier {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, threshold: f32) -> Self {
        Self { backend, threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Encodes the page once and returns the best anchor score and its index.
    pub async fn classify(&self, page: &PagePayload, cache: &AnchorEmbedding) -> Result<(f32, usize)> {
        ensure!(!cache.is_empty(), "anchor cache is empty");

        let title = normalize_text(&page.title);
        let meta = normalize_text(&page.meta);
        let body = normalize_text(&page.body);
        let document = format!("title: {title} | text: {meta}{body}");

        let mut encoded = self.backend.encode(&[document]).await?;
        let document_vector = encoded
            .pop()
            .ok_or_else(|| anyhow!("embedding backend returned no document vector"))?;

        let scores = self.backend.similarity(cache.vectors(), &document_vector)?;
        ensure!(
            scores.len() == cache.len(),
            "similarity returned {} scores for {} anchors",
            scores.len(),
            cache.len()
        );

        let (best_index, best_score) = scores.iter().copied().enumerate().fold(
            (0usize, f32::NEG_INFINITY),
            |best, (index, score)| if score > best.1 { (index, score) } else { best },
        );
        Ok((best_score, best_index))
    }

    /// Scores the page and applies the focus threshold, timing the scoring step.
    pub async fn evaluate(
        &self,
        page: &PagePayload,
        cache: &AnchorEmbedding,
    ) -> Result<ClassificationResult> {
        let started = Instant::now();
        let (score, index) = self.classify(page, cache).await?;
        let elapsed = started.elapsed();
        let anchor = cache.anchors().get(index).unwrap_or_default();
        Ok(ClassificationResult::from_score(
            score,
            anchor,
            self.threshold,
            elapsed,
        ))
    }
}

/// Serializes a `Duration` as fractional seconds.
pub mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        if !secs.is_finite() || secs < 0.0 {
            return Err(serde::de::Error::custom(format!(
                "invalid elapsed seconds {secs}"
            )));
        }
        Ok(Duration::from_secs_f64(secs))
    }
}
