//! Shared helpers for integration tests.
//!
//! Every test builds a fresh in-memory application with two registered
//! owners and a fixed clock, then drives the full router with
//! `tower::ServiceExt::oneshot`.
//!
//! `#![allow(dead_code)]` is needed because each integration test file is
//! compiled as a separate crate and uses a different subset of helpers.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use chrono::{DateTime, TimeZone, Utc};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use todo_api::api::{AppConfig, AppState, build_router};
use todo_api::domain::OwnerId;
use todo_api::infrastructure::{Authenticator, FixedClock, Services, StaticTokenAuthenticator};

pub const ALICE: &str = "alice-token";
pub const BOB: &str = "bob-token";

/// 2024-03-10 12:00 UTC, a Sunday.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
}

// =============================================================================
// Test Application
// =============================================================================

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub alice: OwnerId,
    pub bob: OwnerId,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let alice = OwnerId::generate();
        let bob = OwnerId::generate();
        let authenticator = StaticTokenAuthenticator::new()
            .with_token(ALICE, alice)
            .with_token(BOB, bob);
        let mut app = Self::with_authenticator(Arc::new(authenticator), config);
        app.alice = alice;
        app.bob = bob;
        app
    }

    pub fn with_authenticator(authenticator: Arc<dyn Authenticator>, config: AppConfig) -> Self {
        let services = Services::in_memory(authenticator, Arc::new(FixedClock::new(now())));
        let state = AppState::new(services, config);
        Self {
            router: build_router(state.clone()),
            state,
            alice: OwnerId::generate(),
            bob: OwnerId::generate(),
        }
    }

    /// Sends a request and returns the status and the parsed JSON body
    /// (`Value::Null` for an empty body).
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, body)
    }

    pub async fn get(&self, token: &str, uri: &str) -> (StatusCode, Value) {
        self.send(request(Method::GET, uri, Some(token), None)).await
    }

    pub async fn post(&self, token: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(request(Method::POST, uri, Some(token), Some(body)))
            .await
    }

    pub async fn patch(&self, token: &str, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(request(Method::PATCH, uri, Some(token), Some(body)))
            .await
    }

    pub async fn delete(&self, token: &str, uri: &str) -> (StatusCode, Value) {
        self.send(request(Method::DELETE, uri, Some(token), None))
            .await
    }

    /// Creates a todo and returns its JSON representation.
    pub async fn create_todo(&self, token: &str, body: Value) -> Value {
        let (status, body) = self.post(token, "/todos", body).await;
        assert_eq!(status, StatusCode::CREATED, "create failed: {body}");
        body["data"].clone()
    }

    pub async fn create_category(&self, token: &str, name: &str) -> Value {
        let (status, body) = self
            .post(
                token,
                "/categories",
                serde_json::json!({ "name": name, "color": "#336699" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "create failed: {body}");
        body["data"].clone()
    }

    /// Texts of the data array of a list response, in response order.
    pub async fn texts(&self, token: &str, uri: &str) -> Vec<String> {
        let (status, body) = self.get(token, uri).await;
        assert_eq!(status, StatusCode::OK, "list failed: {body}");
        body["data"]
            .as_array()
            .unwrap()
            .iter()
            .map(|todo| todo["text"].as_str().unwrap().to_string())
            .collect()
    }
}

// =============================================================================
// Request Builders
// =============================================================================

pub fn request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub const BOUNDARY: &str = "todo-api-test-boundary";

/// A multipart body with an optional `file` part and an optional `todo_id` part.
pub fn multipart_body(file: Option<(&str, &[u8])>, todo_id: Option<&str>) -> Vec<u8> {
    let mut body = Vec::new();
    if let Some((name, content)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\nContent-Type: text/plain\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    if let Some(todo_id) = todo_id {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"todo_id\"\r\n\r\n{todo_id}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn upload_request(token: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/attachments")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

/// `AppConfig` with a short deadline.
pub fn short_deadline(deadline: Duration) -> AppConfig {
    AppConfig {
        request_timeout: deadline,
        ..AppConfig::default()
    }
}
