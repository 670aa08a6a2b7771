//! Integration tests for the mailclass HTTP server

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use mailclass_classifiers::{ArtifactBundle, LoadedModels, ModelLoader, TextEmbedder};
use mailclass_core::{Error, Result};
use mailclass_server::{create_router, AppState, ModelServer, ServerConfig};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tower::ServiceExt;

/// Embedder returning the same two-dimensional vector for every text
struct ConstantEmbedder;

impl TextEmbedder for ConstantEmbedder {
    fn encode(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![0.5, -0.5])
    }

    fn dimension(&self) -> usize {
        2
    }

    fn model_name(&self) -> &str {
        "constant"
    }
}

// Columns: [emb0, emb1, subject_length, body_length, url_count, has_html].
// Spam logit is 2 * url_count - 1; "promotions" logit is url_count.
const STUB_BUNDLE: &str = r#"{
    "emb_model_name": "constant",
    "spam_clf": {
        "kind": "logistic_regression",
        "coef": [[0, 0, 0, 0, 2, 0]],
        "intercept": [-1],
        "classes": [0, 1]
    },
    "category_clf": {
        "kind": "logistic_regression",
        "coef": [[0, 0, 0, 0, 0, 0], [0, 0, 0, 0, 1, 0], [0, 0, 0, 0, 0, 0]],
        "intercept": [0, 0, 0]
    },
    "categories": ["work", "promotions", "social"],
    "embedding_dim": 2
}"#;

/// Stub loader that fails its first `failures` calls
struct StubLoader {
    calls: AtomicU32,
    failures: u32,
}

impl StubLoader {
    fn new() -> Self {
        Self::failing_first(0)
    }

    fn failing_first(failures: u32) -> Self {
        Self {
            calls: AtomicU32::new(0),
            failures,
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelLoader for StubLoader {
    async fn load(&self) -> Result<LoadedModels> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(Error::artifact("No such file: /app/models/email_models.json"));
        }

        let bundle = ArtifactBundle::from_json(STUB_BUNDLE)?;
        LoadedModels::new(bundle, Arc::new(ConstantEmbedder))
    }

    fn describe(&self) -> String {
        "stub".to_string()
    }
}

fn app(loader: Arc<StubLoader>) -> (Router, Arc<ModelServer>) {
    app_with_config(loader, ServerConfig::default())
}

fn app_with_config(loader: Arc<StubLoader>, config: ServerConfig) -> (Router, Arc<ModelServer>) {
    let server = Arc::new(ModelServer::new(loader));
    let state = AppState::new(server.clone(), config, None);
    (create_router(state), server)
}

fn predict_request(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/predict")
        .header(header::CONTENT_TYPE, "application/json")
        .body(body.into())
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

#[tokio::test]
async fn test_predict_returns_stub_values() {
    let (app, _) = app(Arc::new(StubLoader::new()));

    let payload = json!({"subject": "Win money", "body": "Click http://spam.biz now!!!"});
    let response = app
        .oneshot(predict_request(payload.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;

    // One URL: spam logit 1, promotions logit 1
    let spam = body["spam_probability"].as_f64().unwrap();
    assert!((spam - sigmoid(1.0)).abs() < 1e-9);

    assert_eq!(body["categories"], json!(["work", "promotions", "social"]));
    let probs: Vec<f64> = body["category_probs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_f64().unwrap())
        .collect();
    let e = std::f64::consts::E;
    let expected = [1.0 / (e + 2.0), e / (e + 2.0), 1.0 / (e + 2.0)];
    for (p, q) in probs.iter().zip(expected.iter()) {
        assert!((p - q).abs() < 1e-9, "{} != {}", p, q);
    }
    assert_eq!(body["predicted_category"], "promotions");
}

#[tokio::test]
async fn test_predict_empty_object() {
    let (app, _) = app(Arc::new(StubLoader::new()));

    let response = app.oneshot(predict_request("{}")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert!((body["spam_probability"].as_f64().unwrap() - sigmoid(-1.0)).abs() < 1e-9);

    let sum: f64 = body["category_probs"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_f64().unwrap())
        .sum();
    assert!((sum - 1.0).abs() < 1e-9);

    // All logits equal: first category wins the tie
    assert_eq!(body["predicted_category"], "work");
}

#[tokio::test]
async fn test_predict_without_content_type() {
    let (app, _) = app(Arc::new(StubLoader::new()));

    let request = Request::builder()
        .method("POST")
        .uri("/predict")
        .body(Body::from(r#"{"subject":"hi","body":"there"}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert!((body["spam_probability"].as_f64().unwrap() - sigmoid(-1.0)).abs() < 1e-9);
    assert_eq!(body["predicted_category"], "work");
}

#[tokio::test]
async fn test_predict_without_content_type_checks_body() {
    let (app, _) = app(Arc::new(StubLoader::new()));

    let untyped = |body: &'static str| {
        Request::builder()
            .method("POST")
            .uri("/predict")
            .body(Body::from(body))
            .unwrap()
    };

    let response = app.clone().oneshot(untyped("{not json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["type"], "invalid_request_error");

    let response = app.oneshot(untyped(r#"{"body": []}"#)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_predict_rejects_non_json_content_type() {
    let (app, _) = app(Arc::new(StubLoader::new()));

    let request = Request::builder()
        .method("POST")
        .uri("/predict")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from(r#"{"subject":"hi"}"#))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_predict_malformed_json() {
    let (app, _) = app(Arc::new(StubLoader::new()));

    let response = app.oneshot(predict_request("{not json")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "invalid_request_error");
    assert!(body["error"]["message"].is_string());
}

#[tokio::test]
async fn test_predict_wrong_field_type() {
    let loader = Arc::new(StubLoader::new());
    let (app, _) = app(loader.clone());

    let response = app
        .oneshot(predict_request(r#"{"subject": 42}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "invalid_request_error");

    // Rejected before the models are touched
    assert_eq!(loader.calls(), 0);
}

#[tokio::test]
async fn test_predict_body_limit() {
    let config = ServerConfig {
        max_body_bytes: 64,
        ..ServerConfig::default()
    };
    let (app, _) = app_with_config(Arc::new(StubLoader::new()), config);

    let payload = json!({"subject": "big", "body": "x".repeat(1024)});
    let response = app
        .oneshot(predict_request(payload.to_string()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_load_failure_returns_500_then_recovers() {
    let loader = Arc::new(StubLoader::failing_first(1));
    let (app, server) = app(loader.clone());

    let response = app
        .clone()
        .oneshot(predict_request(r#"{"subject": "hi"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "server_error");
    assert_eq!(body["error"]["message"], "Internal Server Error");
    assert!(!body.to_string().contains("email_models.json"));
    assert!(!server.is_loaded());

    let response = app
        .oneshot(predict_request(r#"{"subject": "hi"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(loader.calls(), 2);
    assert!(server.is_loaded());
}

#[tokio::test]
async fn test_ready_reflects_load_state() {
    let loader = Arc::new(StubLoader::new());
    let (app, server) = app(loader.clone());

    let response = app.clone().oneshot(get("/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        body_json(response).await,
        json!({"status": "loading", "model_loaded": false})
    );

    assert!(server.warm_up().await);

    let response = app.oneshot(get("/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"status": "ready", "model_loaded": true})
    );
    assert_eq!(loader.calls(), 1);
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = app(Arc::new(StubLoader::failing_first(u32::MAX)));

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"OK");
}

#[tokio::test]
async fn test_metrics_endpoint_without_recorder() {
    let (app, _) = app(Arc::new(StubLoader::new()));

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(bytes.is_empty());
}

#[tokio::test]
async fn test_unknown_route() {
    let (app, _) = app(Arc::new(StubLoader::new()));

    let response = app.oneshot(get("/classify")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "not_found_error");
}

#[tokio::test]
async fn test_end_to_end_over_tcp() {
    let (app, _) = app(Arc::new(StubLoader::new()));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let client = reqwest::Client::new();
    let response = client
        .post(format!("http://{}/predict", addr))
        .json(&json!({"subject": "Team sync", "body": "Agenda attached."}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);

    let body: Value = response.json().await.unwrap();
    assert!((body["spam_probability"].as_f64().unwrap() - sigmoid(-1.0)).abs() < 1e-9);
    assert_eq!(body["predicted_category"], "work");
    assert_eq!(body["category_probs"].as_array().unwrap().len(), 3);
}
