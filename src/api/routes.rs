//! Route table and middleware.

use axum::{
    Router,
    extract::{DefaultBodyLimit, Request, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    trace::TraceLayer,
};

use super::attachments::{delete_attachment, list_attachments, upload_attachment};
use super::bulk::{batch_categories, batch_todos};
use super::categories::{create_category, delete_category, list_categories, update_category};
use super::error::ApiErrorResponse;
use super::handlers::{AppState, health_check};
use super::query::{overdue_todos, search_todos, today_todos, upcoming_todos};
use super::stats::todo_stats;
use super::todos::{create_todo, delete_todo, list_todos, reorder_todos, update_todo};
use crate::infrastructure::{AuthError, bearer_token};

/// Builds the application router.
///
/// Every route except `GET /health` requires a bearer token. Unknown paths
/// and methods answer 405.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let protected = Router::new()
        .route("/todos", get(list_todos).post(create_todo))
        .route("/todos/{id}", patch(update_todo).delete(delete_todo))
        .route("/todos-advanced/search", get(search_todos))
        .route("/todos-advanced/stats", get(todo_stats))
        .route("/todos-advanced/overdue", get(overdue_todos))
        .route("/todos-advanced/today", get(today_todos))
        .route("/todos-advanced/upcoming", get(upcoming_todos))
        .route("/todos-advanced/batch", post(batch_todos))
        .route("/todos-advanced/reorder", post(reorder_todos))
        .route("/categories", get(list_categories).post(create_category))
        .route(
            "/categories/{id}",
            patch(update_category).delete(delete_category),
        )
        .route("/categories/batch", post(batch_categories))
        .route("/attachments", post(upload_attachment))
        .route(
            "/attachments/{id}",
            get(list_attachments).delete(delete_attachment),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_owner));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected)
        .fallback(fallback)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            enforce_deadline,
        ))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(state.config.max_upload_bytes))
        .layer(middleware::map_response(json_error_envelope))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Middleware
// =============================================================================

/// Resolves the bearer token to an [`OwnerId`](crate::domain::OwnerId) request
/// extension, or answers 401.
async fn require_owner(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiErrorResponse> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_owned)
        .ok_or(AuthError::MissingToken)?;

    let owner = state.authenticator.authenticate(&token).await?;
    tracing::debug!(%owner, "Request authenticated");
    request.extensions_mut().insert(owner);
    Ok(next.run(request).await)
}

/// Drops the in-flight request after the configured deadline.
async fn enforce_deadline(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let deadline = state.config.request_timeout;
    match tokio::time::timeout(deadline, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(?deadline, "Request timed out");
            ApiErrorResponse::timeout().into_response()
        }
    }
}

/// Replaces framework-generated 405 and 413 bodies with the JSON envelope.
async fn json_error_envelope(response: Response) -> Response {
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .is_some_and(|value| value.as_bytes().starts_with(b"application/json"));
    if is_json {
        return response;
    }
    match response.status() {
        StatusCode::METHOD_NOT_ALLOWED => ApiErrorResponse::method_not_allowed().into_response(),
        StatusCode::PAYLOAD_TOO_LARGE => ApiErrorResponse::payload_too_large().into_response(),
        _ => response,
    }
}

async fn fallback() -> ApiErrorResponse {
    ApiErrorResponse::method_not_allowed()
}
