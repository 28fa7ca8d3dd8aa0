use std::{convert::Infallible, time::Duration};

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures_util::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;

use crate::{
    db::{FocusEvent, Session},
    focus::{ClassificationResult, PagePayload},
    session::{ActiveSession, MonitorSnapshot, SessionStarted, StreamMessage},
    settings::ClientConfig,
};

use super::{error::ApiResult, state::AppState};

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// Envelope for successful replies.
#[derive(Debug, Serialize)]
pub struct Reply<T> {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

impl<T> Reply<T> {
    fn data(data: T) -> Json<Self> {
        Json(Self {
            status: "success",
            message: None,
            data: Some(data),
        })
    }

    fn with_message(message: &str, data: T) -> Json<Self> {
        Json(Self {
            status: "success",
            message: Some(message.to_string()),
            data: Some(data),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct NewSessionRequest {
    pub goal: String,
    /// Planned length in seconds.
    #[serde(default)]
    pub duration: u64,
}

#[derive(Debug, Deserialize)]
pub struct EndSessionRequest {
    /// Focused time in seconds.
    #[serde(default)]
    pub duration: u64,
}

#[derive(Debug, Deserialize)]
pub struct EventListRequest {
    pub session_id: String,
}

fn secs_to_ms(secs: u64) -> u64 {
    secs.saturating_mul(1000)
}

pub async fn new_session(
    State(state): State<AppState>,
    Json(request): Json<NewSessionRequest>,
) -> ApiResult<Json<Reply<SessionStarted>>> {
    let started = state
        .sessions
        .new_session(&request.goal, secs_to_ms(request.duration))
        .await?;
    Ok(Reply::with_message("Session started", started))
}

pub async fn end_session(
    State(state): State<AppState>,
    Json(request): Json<EndSessionRequest>,
) -> ApiResult<Json<Reply<Session>>> {
    let session = state
        .sessions
        .end_session(secs_to_ms(request.duration))
        .await?;
    Ok(Reply::with_message("Session terminated", session))
}

pub async fn terminate(State(state): State<AppState>) -> ApiResult<Json<Reply<Session>>> {
    let session = state.sessions.terminate().await?;
    Ok(Reply::with_message("Session terminated", session))
}

pub async fn pause_session(
    State(state): State<AppState>,
) -> ApiResult<Json<Reply<ActiveSession>>> {
    let session = state.sessions.pause().await?;
    Ok(Reply::with_message("Session paused", session))
}

pub async fn continue_session(
    State(state): State<AppState>,
) -> ApiResult<Json<Reply<ActiveSession>>> {
    let session = state.sessions.resume().await?;
    Ok(Reply::with_message("Session continues", session))
}

pub async fn analyze_page(
    State(state): State<AppState>,
    Json(page): Json<PagePayload>,
) -> ApiResult<Json<Reply<ClassificationResult>>> {
    let result = state.sessions.submit_page(page).await?;
    Ok(Reply::data(result))
}

pub async fn monitor(State(state): State<AppState>) -> Json<MonitorSnapshot> {
    Json(state.sessions.snapshot().await)
}

pub async fn session_list(State(state): State<AppState>) -> ApiResult<Json<Reply<Vec<Session>>>> {
    Ok(Reply::data(state.sessions.list_sessions().await?))
}

pub async fn event_list(
    State(state): State<AppState>,
    Json(request): Json<EventListRequest>,
) -> ApiResult<Json<Reply<Vec<FocusEvent>>>> {
    Ok(Reply::data(
        state.sessions.session_events(&request.session_id).await?,
    ))
}

pub async fn get_config(State(state): State<AppState>) -> Json<ClientConfig> {
    Json(state.settings.client_config())
}

pub async fn set_config(
    State(state): State<AppState>,
    Json(config): Json<ClientConfig>,
) -> ApiResult<Json<Reply<ClientConfig>>> {
    let settings = state.settings.clone();
    let saved = config.clone();
    tokio::task::spawn_blocking(move || settings.update_client_config(config))
        .await
        .map_err(anyhow::Error::from)??;
    Ok(Reply::with_message("Config saved", saved))
}

fn stream_event(message: &StreamMessage) -> Event {
    match Event::default().json_data(message) {
        Ok(event) => event,
        Err(_) => Event::default().comment("unserializable message"),
    }
}

/// Live verdicts via SSE. Every subscriber gets a greeting first.
pub async fn stream_analysis(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.sessions.subscribe();

    let greeting = stream::once(async {
        Ok::<_, Infallible>(stream_event(&StreamMessage::greeting()))
    });
    let updates = stream::unfold(rx, |mut rx| async move {
        match rx.recv().await {
            Ok(message) => Some((Ok::<_, Infallible>(stream_event(&message)), rx)),
            Err(RecvError::Lagged(skipped)) => Some((
                Ok(Event::default().comment(format!("lagged {skipped}"))),
                rx,
            )),
            Err(RecvError::Closed) => None,
        }
    });

    Sse::new(greeting.chain(updates))
        .keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL).text("ping"))
}
