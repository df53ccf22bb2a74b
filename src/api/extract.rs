//! Extractors whose rejections use the JSON error envelope.

use axum::extract::{FromRequest, FromRequestParts};

use super::error::ApiErrorResponse;

/// `axum::Json` with a `{"error": ...}` rejection.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiErrorResponse))]
pub struct ApiJson<T>(pub T);

/// `axum::extract::Query` with a `{"error": ...}` rejection.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiErrorResponse))]
pub struct ApiQuery<T>(pub T);

/// `axum::extract::Path` with a `{"error": ...}` rejection.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiErrorResponse))]
pub struct ApiPath<T>(pub T);
