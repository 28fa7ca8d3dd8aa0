use std::{sync::Arc, time::Duration};

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::{
    db::{Database, FocusEvent, Session, SessionStatus},
    focus::{
        ClassificationResult, EngineError, FocusManager, MonitorReply, PagePayload, WorkerPhase,
    },
};

use super::{
    bridge::{EventStore, FocusStream, PageVerdict, ResultBridge, ResultSink, StreamMessage},
    state::{ActiveSession, SessionState},
};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

const SINK_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("a focus session is already in progress")]
    SessionOngoing,
    #[error("no focus session is in progress")]
    NoActiveSession,
    #[error("the focus session is paused")]
    SessionPaused,
    #[error("goal must not be empty")]
    EmptyGoal,
    #[error("page analysis failed: {0}")]
    AnalysisFailed(EngineError),
    #[error("could not start focus analysis: {0}")]
    Engine(#[from] EngineError),
    #[error("storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStarted {
    pub session: Session,
    pub monitor: MonitorReply,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorSnapshot {
    pub phase: WorkerPhase,
    pub session: Option<ActiveSession>,
    pub listeners: usize,
}

/// Owns the focus-session lifecycle and routes page verdicts.
#[derive(Clone)]
pub struct SessionController {
    state: Arc<Mutex<SessionState>>,
    db: Database,
    manager: Arc<FocusManager>,
    stream: FocusStream,
    bridge: ResultBridge,
}

impl SessionController {
    pub fn new(db: Database, manager: Arc<FocusManager>) -> Self {
        let stream = FocusStream::new();
        let sinks: Vec<Arc<dyn ResultSink>> = vec![
            Arc::new(EventStore::new(db.clone())),
            Arc::new(stream.clone()),
        ];

        Self {
            state: Arc::new(Mutex::new(SessionState::new())),
            db,
            manager,
            stream,
            bridge: ResultBridge::new(sinks, SINK_TIMEOUT),
        }
    }

    /// Closes sessions a crashed process left running.
    pub async fn recover(&self) -> Result<usize, SessionError> {
        let closed = self.db.interrupt_open_sessions(Utc::now()).await?;
        if !closed.is_empty() {
            log_warn!("marked {} abandoned session(s) as interrupted", closed.len());
        }
        Ok(closed.len())
    }

    pub async fn new_session(
        &self,
        goal: &str,
        planned_ms: u64,
    ) -> Result<SessionStarted, SessionError> {
        let goal = goal.trim();
        if goal.is_empty() {
            return Err(SessionError::EmptyGoal);
        }

        let mut state = self.state.lock().await;
        if state.is_ongoing() {
            return Err(SessionError::SessionOngoing);
        }

        let started_at = Utc::now();
        let session = Session::start(
            Uuid::new_v4().to_string(),
            goal.to_string(),
            planned_ms,
            started_at,
        );
        self.db.insert_session(&session).await?;

        let outcome = match self.manager.start(goal).await {
            Ok(outcome) => outcome,
            Err(err) => {
                log_error!("session {} could not start analysis: {err}", session.id);
                if let Err(db_err) = self
                    .db
                    .mark_session_status(&session.id, SessionStatus::Cancelled, None, Utc::now())
                    .await
                {
                    log_error!("failed to cancel session {}: {db_err:#}", session.id);
                }
                return Err(SessionError::Engine(err));
            }
        };

        state.begin(ActiveSession {
            id: session.id.clone(),
            goal: session.goal.clone(),
            started_at,
            planned_ms,
            paused: false,
        });
        log_info!("session {} started for goal {:?}", session.id, session.goal);

        Ok(SessionStarted {
            session,
            monitor: MonitorReply::from(outcome),
        })
    }

    /// Ends the session normally with the focus time the client measured.
    pub async fn end_session(&self, duration_ms: u64) -> Result<Session, SessionError> {
        self.close(SessionStatus::Completed, Some(duration_ms)).await
    }

    /// Abandons the session.
    pub async fn terminate(&self) -> Result<Session, SessionError> {
        self.close(SessionStatus::Cancelled, None).await
    }

    pub async fn pause(&self) -> Result<ActiveSession, SessionError> {
        self.set_paused(true).await
    }

    pub async fn resume(&self) -> Result<ActiveSession, SessionError> {
        self.set_paused(false).await
    }

    pub async fn submit_page(
        &self,
        page: PagePayload,
    ) -> Result<ClassificationResult, SessionError> {
        let session_id = {
            let state = self.state.lock().await;
            let session = state.current().ok_or(SessionError::NoActiveSession)?;
            if session.paused {
                return Err(SessionError::SessionPaused);
            }
            session.id.clone()
        };

        let url = page.url.clone();
        let result = self
            .manager
            .analyze(page)
            .await
            .map_err(SessionError::AnalysisFailed)?;

        let verdict = PageVerdict {
            session_id,
            url,
            observed_at: Utc::now(),
            result,
        };
        self.bridge.dispatch(&verdict).await;

        Ok(verdict.result)
    }

    pub async fn list_sessions(&self) -> Result<Vec<Session>, SessionError> {
        Ok(self.db.list_sessions().await?)
    }

    pub async fn session_events(&self, session_id: &str) -> Result<Vec<FocusEvent>, SessionError> {
        Ok(self.db.events_for_session(session_id).await?)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StreamMessage> {
        self.stream.subscribe()
    }

    pub async fn snapshot(&self) -> MonitorSnapshot {
        let session = self.state.lock().await.current().cloned();
        MonitorSnapshot {
            phase: self.manager.phase(),
            session,
            listeners: self.stream.subscriber_count(),
        }
    }

    async fn close(
        &self,
        status: SessionStatus,
        duration_ms: Option<u64>,
    ) -> Result<Session, SessionError> {
        let mut state = self.state.lock().await;
        let active = state
            .current()
            .cloned()
            .ok_or(SessionError::NoActiveSession)?;

        // The session stays active until its row is closed.
        let stopped_at = Utc::now();
        self.db
            .mark_session_status(&active.id, status, duration_ms, stopped_at)
            .await?;
        state.finish();

        self.manager.stop().await;
        log_info!("session {} closed as {}", active.id, status.as_str());

        let session = self.db.get_session(&active.id).await?;
        Ok(session.unwrap_or_else(|| Session {
            stopped_at: Some(stopped_at),
            status,
            duration_ms,
            updated_at: stopped_at,
            ..Session::start(active.id, active.goal, active.planned_ms, active.started_at)
        }))
    }

    async fn set_paused(&self, paused: bool) -> Result<ActiveSession, SessionError> {
        let mut state = self.state.lock().await;
        if !state.set_paused(paused) {
            return Err(SessionError::NoActiveSession);
        }
        let active = state
            .current()
            .cloned()
            .ok_or(SessionError::NoActiveSession)?;

        let status = if paused {
            SessionStatus::Paused
        } else {
            SessionStatus::Running
        };
        self.db
            .set_session_status(&active.id, status, Utc::now())
            .await?;

        Ok(active)
    }
}
