mod common;

use std::{net::SocketAddr, sync::Arc};

use focuslens::{
    db::Database,
    server::{create_router, AppState},
    session::SessionController,
    settings::SettingsStore,
};
use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::net::TcpListener;

use common::*;

struct TestServer {
    _dir: TempDir,
    base: String,
    client: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("focus.db")).unwrap();
        let settings = Arc::new(SettingsStore::new(dir.path().join("settings.json")).unwrap());
        let launcher = counting_launcher(
            FixedAnchors::new(),
            KeywordEmbedder::new(),
            python_docs_whitelist(),
        );
        let sessions = SessionController::new(db, manager(launcher, quick_timeouts()));
        let app = create_router(AppState::new(sessions, settings));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            _dir: dir,
            base: format!("http://{addr}/api"),
            client: reqwest::Client::new(),
        }
    }

    async fn get(&self, route: &str) -> (StatusCode, Value) {
        let resp = self
            .client
            .get(format!("{}{route}", self.base))
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }

    async fn post(&self, route: &str, body: Value) -> (StatusCode, Value) {
        let resp = self
            .client
            .post(format!("{}{route}", self.base))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status();
        (status, resp.json().await.unwrap())
    }
}

fn page_json(page: focuslens::focus::PagePayload) -> Value {
    serde_json::to_value(page).unwrap()
}

#[tokio::test]
async fn session_lifecycle_over_http() {
    let server = TestServer::start().await;

    let (status, body) = server
        .post("/new_session", json!({"goal": GOAL, "duration": 1500}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "success");
    assert_eq!(body["data"]["session"]["goal"], GOAL);
    assert_eq!(body["data"]["session"]["plannedMs"], 1_500_000);
    assert_eq!(body["data"]["monitor"]["status"], "started");
    let session_id = body["data"]["session"]["id"].as_str().unwrap().to_string();

    let (status, body) = server
        .post("/new_session", json!({"goal": "other", "duration": 10}))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["status"], "error");

    let (status, body) = server.post("/analyze_page", page_json(rust_book())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_focused"], true);
    assert_eq!(body["data"]["matched_anchor"], GOAL);

    let (status, _) = server.get("/pause_session").await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = server.post("/analyze_page", page_json(rust_book())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "the focus session is paused");
    let (status, _) = server.get("/continue_session").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = server.get("/monitor").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["phase"], "serving");
    assert_eq!(body["session"]["id"], session_id.as_str());

    let (status, body) = server.post("/end_session", json!({"duration": 1200})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "completed");
    assert_eq!(body["data"]["durationMs"], 1_200_000);

    let (_, body) = server.get("/get_session_list").await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (_, body) = server
        .post("/get_event_list", json!({"session_id": session_id}))
        .await;
    let events = body["data"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["topic"], GOAL);
}

#[tokio::test]
async fn request_errors_carry_status_and_message() {
    let server = TestServer::start().await;

    let (status, body) = server
        .post("/new_session", json!({"goal": "", "duration": 10}))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({"status": "error", "message": "goal must not be empty"}));

    let (status, body) = server.post("/analyze_page", page_json(rust_book())).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["message"], "no focus session is in progress");

    let (status, _) = server.get("/terminate").await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn config_round_trips_through_the_settings_file() {
    let server = TestServer::start().await;

    let (status, body) = server.get("/get_config").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"APIKEY": "", "WHITE": [], "BLACK": []}));

    let config = json!({
        "APIKEY": "key",
        "WHITE": [{"url": "docs.rs", "collect": true}],
        "BLACK": []
    });
    let (status, _) = server.post("/set_config", config).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = server.get("/get_config").await;
    assert_eq!(body["APIKEY"], "key");
    assert_eq!(body["WHITE"][0]["url"], "docs.rs");
    assert_eq!(body["WHITE"][0]["collective"], true);
}

#[tokio::test]
async fn stream_greets_new_subscribers() {
    let server = TestServer::start().await;

    let mut resp = server
        .client
        .get(format!("{}/webpage-analysis/stream", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()["content-type"].to_str().unwrap(),
        "text/event-stream"
    );

    let chunk = resp.chunk().await.unwrap().unwrap();
    let text = String::from_utf8(chunk.to_vec()).unwrap();
    let data = text
        .lines()
        .find_map(|line| line.strip_prefix("data: "))
        .unwrap();
    let greeting: Value = serde_json::from_str(data).unwrap();
    assert_eq!(
        greeting,
        json!({"is_focused": true, "score": 1.0, "topic": "Connection Established"})
    );
}
