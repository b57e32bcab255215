#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use parking_lot::{Condvar, Mutex};
use tower::ServiceExt;

use chemaudit_api::config::ServerConfig;
use chemaudit_api::router::build_app_router;
use chemaudit_api::state::AppState;
use chemaudit_api::ws::WsManager;
use chemaudit_core::line_notation::LineNotationValidator;
use chemaudit_core::payload::StructurePayload;
use chemaudit_core::validation::{
    ValidationOptions, ValidationRecord, Validator, ValidatorError,
};
use chemaudit_pipeline::{BatchRegistry, EngineConfig};

/// Build a test `ServerConfig` with safe defaults.
///
/// Uses `http://localhost:5173` as CORS origin (matching the dev default)
/// and a 30-second request timeout.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        retention_sweep_interval_secs: 60,
        max_body_bytes: None,
    }
}

pub fn engine_config() -> EngineConfig {
    EngineConfig {
        worker_pool_size: 2,
        ..EngineConfig::default()
    }
}

/// App state backed by the default line-notation validator.
pub fn test_state() -> AppState {
    state_with(Arc::new(LineNotationValidator::new()))
}

/// App state whose validator blocks until the returned gate opens.
///
/// The gate opens when the returned [`GateHandle`] is dropped, so a test
/// that fails early never leaves blocking threads parked.
pub fn gated_state() -> (AppState, GateHandle) {
    let gate = Arc::new(Gate::default());
    let validator = GatedValidator {
        gate: Arc::clone(&gate),
        inner: LineNotationValidator::new(),
    };
    (state_with(Arc::new(validator)), GateHandle(gate))
}

fn state_with(validator: Arc<dyn Validator>) -> AppState {
    AppState {
        config: Arc::new(test_config()),
        registry: Arc::new(BatchRegistry::new(engine_config(), validator)),
        ws_manager: Arc::new(WsManager::new()),
    }
}

/// Build the full application router with all middleware layers.
///
/// Uses the same builder as `main.rs` so integration tests exercise the
/// production middleware stack.
pub fn build_test_app(state: AppState) -> Router {
    let config = test_config();
    build_app_router(state, &config)
}

/// Same as [`build_test_app`] with an explicit request body limit.
pub fn build_test_app_with_body_limit(state: AppState, max_body_bytes: usize) -> Router {
    let config = ServerConfig {
        max_body_bytes: Some(max_body_bytes),
        ..test_config()
    };
    build_app_router(state, &config)
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct Gate {
    open: Mutex<bool>,
    cv: Condvar,
}

impl Gate {
    fn wait(&self) {
        let mut open = self.open.lock();
        while !*open {
            self.cv.wait(&mut open);
        }
    }

    fn open(&self) {
        *self.open.lock() = true;
        self.cv.notify_all();
    }
}

/// Owner of a [`Gate`]; opens it on `open()` or on drop.
pub struct GateHandle(Arc<Gate>);

impl GateHandle {
    pub fn open(&self) {
        self.0.open();
    }
}

impl Drop for GateHandle {
    fn drop(&mut self) {
        self.0.open();
    }
}

struct GatedValidator {
    gate: Arc<Gate>,
    inner: LineNotationValidator,
}

impl Validator for GatedValidator {
    fn name(&self) -> &str {
        "gated"
    }

    fn validate(
        &self,
        payload: &StructurePayload,
        options: &ValidationOptions,
    ) -> Result<ValidationRecord, ValidatorError> {
        self.gate.wait();
        self.inner.validate(payload, options)
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response {
    send(app, Method::GET, uri, Body::empty()).await
}

pub async fn post(app: Router, uri: &str) -> Response {
    send(app, Method::POST, uri, Body::empty()).await
}

pub async fn delete(app: Router, uri: &str) -> Response {
    send(app, Method::DELETE, uri, Body::empty()).await
}

pub async fn post_json(app: Router, uri: &str, json: serde_json::Value) -> Response {
    send(app, Method::POST, uri, Body::from(json.to_string())).await
}

const BOUNDARY: &str = "chemaudit-test-boundary";

/// POST a `multipart/form-data` body with an optional file part named
/// `file` followed by plain text fields.
pub async fn post_multipart(
    app: Router,
    uri: &str,
    file: Option<(&str, &[u8])>,
    fields: &[(&str, &str)],
) -> Response {
    let mut body = Vec::new();
    if let Some((filename, content)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

async fn send(app: Router, method: Method, uri: &str, body: Body) -> Response {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Batch helpers
// ---------------------------------------------------------------------------

/// Submit `payloads` and return the new batch id.
pub async fn submit(app: &Router, payloads: &[&str]) -> String {
    let structures: Vec<serde_json::Value> = payloads
        .iter()
        .map(|p| serde_json::json!({ "payload": p }))
        .collect();
    let response = post_json(
        app.clone(),
        "/api/v1/batches",
        serde_json::json!({ "structures": structures }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    body_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string()
}

/// Poll `GET /batches/{id}` until the batch reaches a terminal state.
pub async fn wait_terminal(app: &Router, id: &str) -> serde_json::Value {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let json = body_json(get(app.clone(), &format!("/api/v1/batches/{id}")).await).await;
        let state = json["data"]["state"].as_str().unwrap_or_default().to_string();
        if matches!(state.as_str(), "completed" | "cancelled" | "failed") {
            return json["data"].clone();
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "batch {id} did not finish in time (state {state})"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
