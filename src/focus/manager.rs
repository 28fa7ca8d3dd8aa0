//! Worker lifecycle and the request/reply exchange with it.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::{
    sync::{mpsc, watch, Mutex},
    time,
};
use tokio_util::sync::CancellationToken;

use super::{
    classifier::{ClassificationResult, PagePayload},
    error::EngineError,
    launcher::{WorkerHandle, WorkerLauncher, WorkerProcess},
    protocol::{WorkerReply, WorkerRequest},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkerPhase {
    Idle,
    Starting,
    Serving,
    Stopping,
}

#[derive(Debug, Clone, Copy)]
pub struct ManagerTimeouts {
    pub startup: Duration,
    pub request: Duration,
}

impl Default for ManagerTimeouts {
    fn default() -> Self {
        Self {
            startup: Duration::from_secs(30),
            request: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started { anchors: usize },
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    Stopped,
    NotRunning,
}

struct ActiveWorker {
    label: String,
    tasks: mpsc::UnboundedSender<WorkerRequest>,
    replies: Arc<Mutex<mpsc::UnboundedReceiver<WorkerReply>>>,
    cancel: CancellationToken,
    process: WorkerProcess,
}

impl Drop for ActiveWorker {
    fn drop(&mut self) {
        self.cancel.cancel();
        let _ = self.tasks.send(WorkerRequest::Stop);
        self.process.kill();
        log_info!("worker {} torn down", self.label);
    }
}

/// Owns at most one worker and mediates every exchange with it.
///
/// `start` and `stop` serialize on one lifecycle lock. `analyze` only takes
/// that lock long enough to grab the channels, then waits on the reply
/// channel with its own timeout.
pub struct FocusManager {
    launcher: Arc<dyn WorkerLauncher>,
    timeouts: ManagerTimeouts,
    lifecycle: Mutex<Option<ActiveWorker>>,
    phase: watch::Sender<WorkerPhase>,
    next_seq: AtomicU64,
}

impl FocusManager {
    pub fn new(launcher: Arc<dyn WorkerLauncher>, timeouts: ManagerTimeouts) -> Self {
        let (phase, _) = watch::channel(WorkerPhase::Idle);
        Self {
            launcher,
            timeouts,
            lifecycle: Mutex::new(None),
            phase,
            next_seq: AtomicU64::new(1),
        }
    }

    pub fn phase(&self) -> WorkerPhase {
        *self.phase.borrow()
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<WorkerPhase> {
        self.phase.subscribe()
    }

    pub fn timeouts(&self) -> ManagerTimeouts {
        self.timeouts
    }

    pub async fn start(&self, goal: &str) -> Result<StartOutcome, EngineError> {
        let mut slot = self.lifecycle.lock().await;

        if let Some(active) = slot.as_mut() {
            if active.process.is_alive() {
                return Ok(StartOutcome::AlreadyRunning);
            }
            log_warn!("worker {} exited on its own; replacing it", active.label);
            *slot = None;
        }

        self.phase.send_replace(WorkerPhase::Starting);

        let WorkerHandle {
            label,
            tasks,
            replies,
            ready,
            process,
        } = match self.launcher.launch(goal) {
            Ok(handle) => handle,
            Err(err) => {
                self.phase.send_replace(WorkerPhase::Idle);
                return Err(EngineError::Launch(format!("{err:#}")));
            }
        };

        let active = ActiveWorker {
            label,
            tasks,
            replies: Arc::new(Mutex::new(replies)),
            cancel: CancellationToken::new(),
            process,
        };

        match time::timeout(self.timeouts.startup, ready).await {
            Ok(Ok(anchors)) => {
                log_info!("worker {} serving with {} anchors", active.label, anchors);
                *slot = Some(active);
                self.phase.send_replace(WorkerPhase::Serving);
                Ok(StartOutcome::Started { anchors })
            }
            Ok(Err(_)) => {
                drop(active);
                self.phase.send_replace(WorkerPhase::Idle);
                Err(EngineError::WorkerExited)
            }
            Err(_) => {
                log_warn!(
                    "worker {} not ready after {:?}; killing it",
                    active.label,
                    self.timeouts.startup
                );
                drop(active);
                self.phase.send_replace(WorkerPhase::Idle);
                Err(EngineError::InitializationTimeout(self.timeouts.startup))
            }
        }
    }

    /// Sends one page and waits for its reply.
    ///
    /// Callers are expected to submit one page at a time; concurrent calls
    /// queue on the reply channel and the wait counts against their timeout.
    pub async fn analyze(&self, page: PagePayload) -> Result<ClassificationResult, EngineError> {
        if self.phase() != WorkerPhase::Serving {
            return Err(EngineError::NotRunning);
        }

        let (tasks, replies, cancel) = {
            let mut slot = self.lifecycle.lock().await;
            let Some(active) = slot.as_mut() else {
                return Err(EngineError::NotRunning);
            };
            if !active.process.is_alive() {
                log_warn!("worker {} is gone", active.label);
                *slot = None;
                self.phase.send_replace(WorkerPhase::Idle);
                return Err(EngineError::NotRunning);
            }
            (
                active.tasks.clone(),
                Arc::clone(&active.replies),
                active.cancel.clone(),
            )
        };

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let exchange = async move {
            let mut replies = replies.lock().await;
            tasks
                .send(WorkerRequest::Analyze { seq, page })
                .map_err(|_| EngineError::NotRunning)?;

            loop {
                match replies.recv().await {
                    Some(WorkerReply::Classified { seq: got, result }) if got == seq => {
                        return Ok(result)
                    }
                    Some(WorkerReply::Failed { seq: got, message }) if got == seq => {
                        return Err(EngineError::Classification(message))
                    }
                    Some(other) => {
                        log_debug!("discarding stale reply {:?} while waiting for {}", other.seq(), seq);
                    }
                    None => return Err(EngineError::NotRunning),
                }
            }
        };

        let request_timeout = self.timeouts.request;
        tokio::select! {
            _ = cancel.cancelled() => Err(EngineError::Stopped),
            outcome = time::timeout(request_timeout, exchange) => {
                outcome.unwrap_or(Err(EngineError::RequestTimeout(request_timeout)))
            }
        }
    }

    pub async fn stop(&self) -> StopOutcome {
        let mut slot = self.lifecycle.lock().await;
        match slot.take() {
            Some(active) => {
                self.phase.send_replace(WorkerPhase::Stopping);
                drop(active);
                self.phase.send_replace(WorkerPhase::Idle);
                StopOutcome::Stopped
            }
            None => StopOutcome::NotRunning,
        }
    }

    pub async fn start_monitoring(&self, goal: &str) -> MonitorReply {
        match self.start(goal).await {
            Ok(outcome) => outcome.into(),
            Err(err) => MonitorReply::from(err),
        }
    }

    pub async fn analyze_page(&self, page: PagePayload) -> MonitorReply {
        match self.analyze(page).await {
            Ok(result) => MonitorReply::data(result),
            Err(err) => MonitorReply::from(err),
        }
    }

    pub async fn stop_monitoring(&self) -> MonitorReply {
        match self.stop().await {
            StopOutcome::Stopped => MonitorReply::message(MonitorStatus::Stopped, "analysis stopped"),
            StopOutcome::NotRunning => {
                MonitorReply::message(MonitorStatus::NotRunning, "no analysis is running")
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MonitorStatus {
    Started,
    AlreadyRunning,
    Success,
    Timeout,
    Stopped,
    NotRunning,
    Error,
}

/// Structured reply for the request layer. Never carries a raw internal error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitorReply {
    pub status: MonitorStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ClassificationResult>,
}

impl MonitorReply {
    fn message(status: MonitorStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: Some(message.into()),
            data: None,
        }
    }

    fn data(result: ClassificationResult) -> Self {
        Self {
            status: MonitorStatus::Success,
            message: None,
            data: Some(result),
        }
    }
}

impl From<StartOutcome> for MonitorReply {
    fn from(outcome: StartOutcome) -> Self {
        match outcome {
            StartOutcome::Started { anchors } => MonitorReply::message(
                MonitorStatus::Started,
                format!("focus analysis started with {anchors} anchors"),
            ),
            StartOutcome::AlreadyRunning => {
                MonitorReply::message(MonitorStatus::AlreadyRunning, "analysis already running")
            }
        }
    }
}

impl From<EngineError> for MonitorReply {
    fn from(err: EngineError) -> Self {
        let status = match err {
            EngineError::RequestTimeout(_) => MonitorStatus::Timeout,
            _ => MonitorStatus::Error,
        };
        MonitorReply::message(status, err.to_string())
    }
}
