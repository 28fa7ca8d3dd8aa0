//! Goal expansion into semantic anchors.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;

use crate::settings::AnchorCounts;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

/// Text generation backend used once per session start.
#[async_trait]
pub trait LanguageBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Ordered anchor phrases for one goal. The goal itself is always one of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnchorSet {
    goal: String,
    anchors: Vec<String>,
}

impl AnchorSet {
    /// Builds a set from backend output, putting the goal first when the
    /// backend left it out.
    pub fn from_expansion(goal: &str, expanded: Vec<String>) -> Self {
        let mut anchors: Vec<String> = expanded
            .into_iter()
            .filter(|anchor| !anchor.trim().is_empty())
            .collect();
        if !anchors.iter().any(|anchor| anchor == goal) {
            anchors.insert(0, goal.to_string());
        }
        Self {
            goal: goal.to_string(),
            anchors,
        }
    }

    pub fn fallback(goal: &str) -> Self {
        Self {
            goal: goal.to_string(),
            anchors: vec![goal.to_string()],
        }
    }

    pub fn goal(&self) -> &str {
        &self.goal
    }

    pub fn anchors(&self) -> &[String] {
        &self.anchors
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.anchors.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

pub struct GoalExpander {
    backend: Arc<dyn LanguageBackend>,
    counts: AnchorCounts,
}

impl GoalExpander {
    pub fn new(backend: Arc<dyn LanguageBackend>, counts: AnchorCounts) -> Self {
        Self { backend, counts }
    }

    /// Never fails: backend or parse errors degrade to the goal alone.
    pub async fn expand(&self, goal: &str) -> AnchorSet {
        let prompt = build_prompt(goal, &self.counts);
        let outcome = async {
            let raw = self.backend.generate(&prompt).await?;
            parse_anchor_payload(&raw)
        }
        .await;

        match outcome {
            Ok(expanded) => {
                let anchors = AnchorSet::from_expansion(goal, expanded);
                log_info!("expanded goal '{}' into {} anchors", goal, anchors.len());
                anchors
            }
            Err(err) => {
                log_warn!("goal expansion failed, using goal as the only anchor: {err:#}");
                AnchorSet::fallback(goal)
            }
        }
    }
}

/// Parses a JSON array of strings, tolerating markdown code fences.
pub fn parse_anchor_payload(raw: &str) -> Result<Vec<String>> {
    let cleaned = raw.replace("```json", "").replace("```", "");
    serde_json::from_str::<Vec<String>>(cleaned.trim())
        .context("anchor payload is not a JSON array of strings")
}

pub fn build_prompt(goal: &str, counts: &AnchorCounts) -> String {
    format!(
        r#"Role: You are an expert in 'Semantic Network Analysis' and 'Knowledge Graph Construction'.

Task: Deconstruct the User's Goal into {total} distinct "Semantic Anchors" to capture a wide range of relevant web content.
An "Anchor" is a short, declarative statement (3-5 seconds reading time) representing content likely to be found on relevant web pages.

User Goal: "{goal}"

***CRITICAL INSTRUCTION: LEXICAL DIVERSITY***
Do NOT rely solely on the words present in the "User Goal". You must expand the vocabulary to include:
1.  **Hierarchical Terms:** If the goal is "AI", you must include anchors about "Machine Learning", "Neural Networks", "Deep Learning", etc.
2.  **Related Entities:** Specific libraries, tools, or famous authors related to the topic (e.g., "TensorFlow", "PyTorch", "Andrew Ng").
3.  **Contextual Synonyms:** Words that naturally co-occur in the domain (e.g., for "Stock Analysis", use "Moving Average", "Candlestick Chart", "Volatility").

Guidelines:
1.  **Format:** Declarative, Factual, Descriptive phrases. (No Questions).
2.  **Coverage:**
    - {broad} Anchors: Broad/Conceptual definitions (High-level concepts).
    - {technical} Anchors: Specific/Technical details (Sub-concepts, formulas, specific algorithms).
    - {practical} Anchors: Practical/Tool-oriented context (Software, errors, implementation).
3.  **Constraint:** Avoid repeating the exact main keywords of the User Goal in every anchor. Use pronouns or implied context to increase vector diversity.

Output Format: JSON Array of strings ONLY. In english.
"#,
        total = counts.total(),
        broad = counts.broad,
        technical = counts.technical,
        practical = counts.practical,
    )
}
