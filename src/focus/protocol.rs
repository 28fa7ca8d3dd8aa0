//! Messages exchanged between the manager and its worker.
//!
//! In child-process mode each message is one line of JSON on the worker's
//! stdin (requests) or stdout (replies).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::classifier::{ClassificationResult, PagePayload};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
    Analyze { seq: u64, page: PagePayload },
    /// Ends the worker loop.
    Stop,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerReply {
    /// Emitted once, after anchors are cached.
    Ready { anchors: usize },
    Classified { seq: u64, result: ClassificationResult },
    Failed { seq: u64, message: String },
}

impl WorkerReply {
    pub fn seq(&self) -> Option<u64> {
        match self {
            WorkerReply::Ready { .. } => None,
            WorkerReply::Classified { seq, .. } | WorkerReply::Failed { seq, .. } => Some(*seq),
        }
    }
}

pub fn encode_line<T: Serialize>(message: &T) -> Result<String> {
    let mut line = serde_json::to_string(message).context("failed to encode worker message")?;
    line.push('\n');
    Ok(line)
}

pub fn decode_line<T: for<'de> Deserialize<'de>>(line: &str) -> Result<T> {
    serde_json::from_str(line.trim())
        .with_context(|| format!("malformed worker message: {}", truncate(line, 120)))
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
