use anyhow::Result;
use rusqlite::{params, Row};

use crate::db::{connection::Database, helpers::timestamp_column, models::FocusEvent};

fn row_to_event(row: &Row) -> Result<FocusEvent> {
    let is_focused: i64 = row.get("is_focused")?;

    Ok(FocusEvent {
        id: row.get("id")?,
        session_id: row.get("session_id")?,
        event_time: timestamp_column(row, "event_time")?,
        is_focused: is_focused != 0,
        url: row.get("url")?,
        score: row.get("score")?,
        topic: row.get("topic")?,
    })
}

impl Database {
    pub async fn insert_event(&self, event: &FocusEvent) -> Result<i64> {
        let record = event.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO events (session_id, event_time, is_focused, url, score, topic)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.session_id,
                    record.event_time.to_rfc3339(),
                    record.is_focused as i64,
                    record.url,
                    record.score,
                    record.topic,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Events of one session in the order they happened.
    pub async fn events_for_session(&self, session_id: &str) -> Result<Vec<FocusEvent>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, event_time, is_focused, url, score, topic
                 FROM events
                 WHERE session_id = ?1
                 ORDER BY event_time ASC, id ASC",
            )?;
            let mut rows = stmt.query(params![session_id])?;
            let mut events = Vec::new();
            while let Some(row) = rows.next()? {
                events.push(row_to_event(row)?);
            }
            Ok(events)
        })
        .await
    }
}
