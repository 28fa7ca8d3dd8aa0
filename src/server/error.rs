use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::{focus::EngineError, session::SessionError};

const ENABLE_LOGS: bool = true;

use crate::log_error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Timeout(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    status: &'a str,
    message: String,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Timeout(_) | ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn status_label(&self) -> &'static str {
        match self {
            ApiError::Timeout(_) => "timeout",
            _ => "error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            status: self.status_label(),
            message: self.to_string(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        let message = err.to_string();
        match err {
            SessionError::EmptyGoal => ApiError::BadRequest(message),
            SessionError::SessionOngoing
            | SessionError::NoActiveSession
            | SessionError::SessionPaused => ApiError::Conflict(message),
            SessionError::AnalysisFailed(EngineError::RequestTimeout(_)) => {
                ApiError::Timeout(message)
            }
            SessionError::AnalysisFailed(_) | SessionError::Engine(_) => {
                ApiError::Unavailable(message)
            }
            SessionError::Storage(inner) => {
                log_error!("storage failure behind request: {inner:#}");
                ApiError::Internal("storage failure".into())
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        log_error!("request failed: {err:#}");
        ApiError::Internal(err.to_string())
    }
}
