use std::{sync::Arc, time::Duration};

use focuslens::{
    backends::{GeminiClient, OpenAiEmbedder},
    focus::{EmbeddingBackend, GoalExpander, LanguageBackend},
    settings::AnchorCounts,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn gemini(server: &MockServer, key: &str) -> GeminiClient {
    GeminiClient::new(
        key.into(),
        format!("{}/v1beta", server.uri()),
        "gemini-2.5-flash".into(),
        Duration::from_secs(5),
    )
    .unwrap()
}

fn embedder(server: &MockServer, batch_size: usize) -> OpenAiEmbedder {
    OpenAiEmbedder::new(
        Some("sk-test".into()),
        format!("{}/v1", server.uri()),
        "text-embedding-3-small".into(),
        Some(3),
        Duration::from_secs(5),
        3,
        batch_size,
    )
    .unwrap()
}

#[tokio::test]
async fn gemini_joins_candidate_parts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
        .and(header("x-goog-api-key", "g-key"))
        .and(body_partial_json(json!({"contents": [{"parts": [{"text": "hello"}]}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"parts": [{"text": "[\"a\", "}, {"text": "\"b\"]"}], "role": "model"},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"totalTokenCount": 12}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let text = gemini(&server, "g-key").generate("hello").await.unwrap();
    assert_eq!(text, "[\"a\", \"b\"]");
}

#[tokio::test]
async fn gemini_without_key_never_calls_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    assert!(gemini(&server, "  ").generate("hello").await.is_err());
}

#[tokio::test]
async fn expansion_falls_back_when_gemini_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("quota exceeded"))
        .mount(&server)
        .await;

    let expander = GoalExpander::new(Arc::new(gemini(&server, "g-key")), AnchorCounts::default());
    let anchors = expander.expand("practice piano scales").await;
    assert_eq!(anchors.anchors(), ["practice piano scales".to_string()]);
}

#[tokio::test]
async fn expansion_uses_gemini_anchors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"parts": [{
                "text": "```json\n[\"music theory\", \"piano technique\"]\n```"
            }]}}]
        })))
        .mount(&server)
        .await;

    let expander = GoalExpander::new(Arc::new(gemini(&server, "g-key")), AnchorCounts::default());
    let anchors = expander.expand("practice piano scales").await;
    assert_eq!(
        anchors.anchors(),
        [
            "practice piano scales".to_string(),
            "music theory".to_string(),
            "piano technique".to_string()
        ]
    );
}

#[tokio::test]
async fn embeddings_are_reordered_by_index() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({"model": "text-embedding-3-small", "dimensions": 3})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "object": "list",
            "data": [
                {"object": "embedding", "index": 1, "embedding": [0.0, 1.0, 0.0]},
                {"object": "embedding", "index": 0, "embedding": [1.0, 0.0, 0.0]}
            ],
            "model": "text-embedding-3-small"
        })))
        .mount(&server)
        .await;

    let vectors = embedder(&server, 16)
        .encode(&["first".to_string(), "second".to_string()])
        .await
        .unwrap();
    assert_eq!(vectors, vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]]);
}

#[tokio::test]
async fn embeddings_are_batched() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"input": ["a", "b"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"index": 0, "embedding": [1.0, 0.0, 0.0]},
                {"index": 1, "embedding": [0.0, 1.0, 0.0]}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"input": ["c"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": [0.0, 0.0, 1.0]}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let inputs: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
    let vectors = embedder(&server, 2).encode(&inputs).await.unwrap();
    assert_eq!(vectors.len(), 3);
    assert_eq!(vectors[2], vec![0.0, 0.0, 1.0]);
}

#[tokio::test]
async fn embedding_retries_server_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": [0.6, 0.8, 0.0]}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let vectors = embedder(&server, 8).encode(&["x".to_string()]).await.unwrap();
    assert_eq!(vectors, vec![vec![0.6, 0.8, 0.0]]);
}

#[tokio::test]
async fn embedding_client_errors_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
        .expect(1)
        .mount(&server)
        .await;

    let err = embedder(&server, 8)
        .encode(&["x".to_string()])
        .await
        .unwrap_err();
    assert!(format!("{err:#}").contains("401"));
}

#[tokio::test]
async fn short_embedding_response_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"index": 0, "embedding": [1.0, 0.0, 0.0]}]
        })))
        .mount(&server)
        .await;

    let result = embedder(&server, 8)
        .encode(&["a".to_string(), "b".to_string()])
        .await;
    assert!(result.is_err());
}
