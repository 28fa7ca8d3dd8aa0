use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One classified page visit inside a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FocusEvent {
    pub id: Option<i64>,
    pub session_id: String,
    pub event_time: DateTime<Utc>,
    pub is_focused: bool,
    pub url: String,
    pub score: f64,
    pub topic: String,
}
