//! Fans classification results out to persistence and live listeners.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::{sync::broadcast, time};

use crate::{
    db::{Database, FocusEvent},
    focus::ClassificationResult,
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

const STREAM_CAPACITY: usize = 256;

/// Live payload pushed to stream subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamMessage {
    pub is_focused: bool,
    pub score: f32,
    pub topic: String,
}

impl StreamMessage {
    /// First message every subscriber receives.
    pub fn greeting() -> Self {
        Self {
            is_focused: true,
            score: 1.0,
            topic: "Connection Established".into(),
        }
    }
}

impl From<&ClassificationResult> for StreamMessage {
    fn from(result: &ClassificationResult) -> Self {
        Self {
            is_focused: result.is_focused,
            score: result.score,
            topic: result.matched_anchor.clone(),
        }
    }
}

/// A classified page, tagged with the session it belongs to.
#[derive(Debug, Clone)]
pub struct PageVerdict {
    pub session_id: String,
    pub url: String,
    pub observed_at: DateTime<Utc>,
    pub result: ClassificationResult,
}

#[async_trait]
pub trait ResultSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, verdict: &PageVerdict) -> Result<()>;
}

/// Broadcast stream behind the SSE endpoint.
#[derive(Clone)]
pub struct FocusStream {
    sender: broadcast::Sender<StreamMessage>,
}

impl FocusStream {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(STREAM_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamMessage> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for FocusStream {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultSink for FocusStream {
    fn name(&self) -> &'static str {
        "stream"
    }

    async fn deliver(&self, verdict: &PageVerdict) -> Result<()> {
        // No subscribers is not an error; the message just has nowhere to go.
        let _ = self.sender.send(StreamMessage::from(&verdict.result));
        Ok(())
    }
}

/// Writes each verdict to the `events` table.
pub struct EventStore {
    db: Database,
}

impl EventStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ResultSink for EventStore {
    fn name(&self) -> &'static str {
        "events"
    }

    async fn deliver(&self, verdict: &PageVerdict) -> Result<()> {
        let event = FocusEvent {
            id: None,
            session_id: verdict.session_id.clone(),
            event_time: verdict.observed_at,
            is_focused: verdict.result.is_focused,
            url: verdict.url.clone(),
            score: f64::from(verdict.result.score),
            topic: verdict.result.matched_anchor.clone(),
        };
        self.db.insert_event(&event).await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct ResultBridge {
    sinks: Vec<Arc<dyn ResultSink>>,
    sink_timeout: Duration,
}

impl ResultBridge {
    pub fn new(sinks: Vec<Arc<dyn ResultSink>>, sink_timeout: Duration) -> Self {
        Self {
            sinks,
            sink_timeout,
        }
    }

    /// Hands `verdict` to every sink in order.
    ///
    /// Returns the number of sinks that accepted it. Failures and timeouts
    /// are logged and skipped.
    pub async fn dispatch(&self, verdict: &PageVerdict) -> usize {
        let mut delivered = 0;
        for sink in &self.sinks {
            match time::timeout(self.sink_timeout, sink.deliver(verdict)).await {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(err)) => {
                    log_warn!(
                        "sink {} rejected result for session {}: {err:#}",
                        sink.name(),
                        verdict.session_id
                    );
                }
                Err(_) => {
                    log_warn!(
                        "sink {} timed out after {:?} for session {}",
                        sink.name(),
                        self.sink_timeout,
                        verdict.session_id
                    );
                }
            }
        }
        log_debug!(
            "delivered verdict for {} to {delivered}/{} sinks",
            verdict.url,
            self.sinks.len()
        );
        delivered
    }
}
