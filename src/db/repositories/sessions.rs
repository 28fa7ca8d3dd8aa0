use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{
        millis_column, millis_param, optional_millis_column, optional_timestamp_column,
        timestamp_column,
    },
    models::{Session, SessionStatus},
};

const SESSION_COLUMNS: &str =
    "id, goal, started_at, stopped_at, status, planned_ms, duration_ms, created_at, updated_at";

fn row_to_session(row: &Row) -> Result<Session> {
    let status: String = row.get("status")?;

    Ok(Session {
        id: row.get("id")?,
        goal: row.get("goal")?,
        started_at: timestamp_column(row, "started_at")?,
        stopped_at: optional_timestamp_column(row, "stopped_at")?,
        status: status.parse()?,
        planned_ms: millis_column(row, "planned_ms")?,
        duration_ms: optional_millis_column(row, "duration_ms")?,
        created_at: timestamp_column(row, "created_at")?,
        updated_at: timestamp_column(row, "updated_at")?,
    })
}

impl Database {
    pub async fn insert_session(&self, session: &Session) -> Result<()> {
        let record = session.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, goal, started_at, stopped_at, status, planned_ms, duration_ms, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.id,
                    record.goal,
                    record.started_at.to_rfc3339(),
                    record.stopped_at.as_ref().map(|dt| dt.to_rfc3339()),
                    record.status.as_str(),
                    millis_param(record.planned_ms)?,
                    record.duration_ms.map(millis_param).transpose()?,
                    record.created_at.to_rfc3339(),
                    record.updated_at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    /// Closes a session with a terminal status.
    pub async fn mark_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        duration_ms: Option<u64>,
        stopped_at: DateTime<Utc>,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let changed = conn.execute(
                "UPDATE sessions
                 SET status = ?1,
                     duration_ms = ?2,
                     stopped_at = ?3,
                     updated_at = ?3
                 WHERE id = ?4",
                params![
                    status.as_str(),
                    duration_ms.map(millis_param).transpose()?,
                    stopped_at.to_rfc3339(),
                    session_id,
                ],
            )?;
            if changed == 0 {
                return Err(anyhow!("session {session_id} not found"));
            }
            Ok(())
        })
        .await
    }

    /// Flips an open session between running and paused.
    pub async fn set_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE sessions SET status = ?1, updated_at = ?2 WHERE id = ?3",
                params![status.as_str(), updated_at.to_rfc3339(), session_id],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let session = stmt
                .query_row(params![session_id], |row| Ok(row_to_session(row)))
                .optional()?
                .transpose()?;
            Ok(session)
        })
        .await
    }

    /// All sessions, newest first.
    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        self.execute(|conn| {
            let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions ORDER BY started_at DESC");
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    /// Marks sessions a previous process left open as interrupted.
    ///
    /// Returns the ids that were closed.
    pub async fn interrupt_open_sessions(&self, now: DateTime<Utc>) -> Result<Vec<String>> {
        self.execute(move |conn| {
            let tx = conn.transaction()?;
            let ids = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM sessions WHERE status IN ('Running', 'Paused')",
                )?;
                let ids = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                ids
            };
            tx.execute(
                "UPDATE sessions
                 SET status = 'Interrupted',
                     stopped_at = COALESCE(stopped_at, ?1),
                     updated_at = ?1
                 WHERE status IN ('Running', 'Paused')",
                params![now.to_rfc3339()],
            )?;
            tx.commit()?;
            Ok(ids)
        })
        .await
    }
}
