use chrono::{DateTime, Utc};
use serde::Serialize;

/// The session currently holding the engine.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSession {
    pub id: String,
    pub goal: String,
    pub started_at: DateTime<Utc>,
    pub planned_ms: u64,
    pub paused: bool,
}

#[derive(Debug, Default)]
pub struct SessionState {
    current: Option<ActiveSession>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&ActiveSession> {
        self.current.as_ref()
    }

    pub fn is_ongoing(&self) -> bool {
        self.current.is_some()
    }

    pub fn begin(&mut self, session: ActiveSession) {
        self.current = Some(session);
    }

    /// Clears the session and hands it back.
    pub fn finish(&mut self) -> Option<ActiveSession> {
        self.current.take()
    }

    /// Returns false when there is no session to toggle.
    pub fn set_paused(&mut self, paused: bool) -> bool {
        match self.current.as_mut() {
            Some(session) => {
                session.paused = paused;
                true
            }
            None => false,
        }
    }
}
