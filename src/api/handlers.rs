//! Application state and the health check.

use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use serde::Serialize;

use crate::domain::BatchMode;
use crate::infrastructure::{
    AttachmentRepository, Authenticator, CategoryRepository, Clock, ObjectStorage, ServiceConfig,
    Services, TodoRepository,
};

// =============================================================================
// Application Configuration
// =============================================================================

/// Runtime settings read by handlers and middleware.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    /// Deadline for a whole request.
    pub request_timeout: Duration,
    /// Batch update atomicity when a request does not choose one.
    pub batch_mode: BatchMode,
    /// Largest accepted batch.
    pub max_batch_size: usize,
    /// Largest accepted request body.
    pub max_upload_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from(&ServiceConfig::default())
    }
}

impl From<&ServiceConfig> for AppConfig {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            request_timeout: config.request_timeout,
            batch_mode: config.batch_mode,
            max_batch_size: config.max_batch_size,
            max_upload_bytes: config.max_upload_bytes,
        }
    }
}

// =============================================================================
// Application State
// =============================================================================

/// Shared application dependencies.
///
/// Every backend is a trait object so that the store, object storage and
/// authenticator can be chosen at startup and replaced in tests.
#[derive(Clone)]
pub struct AppState {
    pub todo_repository: Arc<dyn TodoRepository>,
    pub category_repository: Arc<dyn CategoryRepository>,
    pub attachment_repository: Arc<dyn AttachmentRepository>,
    pub object_storage: Arc<dyn ObjectStorage>,
    pub authenticator: Arc<dyn Authenticator>,
    pub clock: Arc<dyn Clock>,
    pub config: AppConfig,
}

impl AppState {
    /// Creates an `AppState` from wired services and runtime settings.
    #[must_use]
    pub fn new(services: Services, config: AppConfig) -> Self {
        Self {
            todo_repository: services.todos,
            category_repository: services.categories,
            attachment_repository: services.attachments,
            object_storage: services.object_storage,
            authenticator: services.authenticator,
            clock: services.clock,
            config,
        }
    }
}

// =============================================================================
// GET /health Handler
// =============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Liveness probe. Needs no authentication.
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
