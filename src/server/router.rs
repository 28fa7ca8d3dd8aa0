use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use super::{handlers, state::AppState};

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Session lifecycle
        .route("/new_session", post(handlers::new_session))
        .route("/end_session", post(handlers::end_session))
        .route("/terminate", get(handlers::terminate))
        .route("/pause_session", get(handlers::pause_session))
        .route("/continue_session", get(handlers::continue_session))
        // Classification
        .route("/analyze_page", post(handlers::analyze_page))
        .route("/webpage-analysis/stream", get(handlers::stream_analysis))
        .route("/monitor", get(handlers::monitor))
        // History
        .route("/get_session_list", get(handlers::session_list))
        .route("/get_event_list", post(handlers::event_list))
        // Settings
        .route("/get_config", get(handlers::get_config))
        .route("/set_config", post(handlers::set_config));

    Router::new()
        .nest("/api", api_routes)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
