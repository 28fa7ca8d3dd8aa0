//! HTTP front door: JSON routes plus the live SSE stream.

mod error;
mod handlers;
mod router;
mod state;

pub use error::{ApiError, ApiResult};
pub use router::create_router;
pub use state::AppState;
