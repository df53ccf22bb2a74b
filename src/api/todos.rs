//! Todo CRUD and reordering.

use axum::{Extension, Json, extract::State, http::StatusCode};

use super::dto::{
    CreateTodoRequest, Data, ReorderRequest, SuccessResponse, TodoResponse, UpdateTodoRequest,
};
use super::error::ApiErrorResponse;
use super::extract::{ApiJson, ApiPath};
use super::handlers::AppState;
use crate::domain::{OwnerId, TodoId};
use crate::infrastructure::{PositionUpdate, SortOrder, TodoFilter, TodoQuery};

// =============================================================================
// GET /todos
// =============================================================================

/// Lists every todo of the caller, newest first.
///
/// # Errors
///
/// - **400 Bad Request**: store failure
pub async fn list_todos(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
) -> Result<Json<Data<Vec<TodoResponse>>>, ApiErrorResponse> {
    let query = TodoQuery::new(TodoFilter::all(), SortOrder::newest_first());
    let todos = state.todo_repository.list(&owner, &query).await?;
    Ok(Json(Data::new(
        todos.into_iter().map(TodoResponse::from).collect(),
    )))
}

// =============================================================================
// POST /todos
// =============================================================================

/// Creates a todo.
///
/// # Request Body
///
/// ```json
/// {
///   "text": "Buy milk",
///   "date": "2024-03-12",
///   "time": "09:30",
///   "category_id": 1,
///   "note": "semi-skimmed",
///   "repeat": "weekly",
///   "priority": "high"
/// }
/// ```
///
/// # Errors
///
/// - **400 Bad Request**: validation failure, unknown category, store failure
pub async fn create_todo(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
    ApiJson(request): ApiJson<CreateTodoRequest>,
) -> Result<(StatusCode, Json<Data<TodoResponse>>), ApiErrorResponse> {
    let draft = request.into_draft()?;
    let todo = state.todo_repository.insert(&owner, draft).await?;
    tracing::debug!(todo_id = %todo.id, "Todo created");
    Ok((StatusCode::CREATED, Json(Data::new(TodoResponse::from(todo)))))
}

// =============================================================================
// PATCH /todos/{id}
// =============================================================================

/// Applies a partial update. `null` clears `date`, `time`, `category_id`,
/// `note` and `repeat`.
///
/// # Errors
///
/// - **400 Bad Request**: validation failure or store failure
/// - **404 Not Found**: the caller has no such todo
pub async fn update_todo(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(request): ApiJson<UpdateTodoRequest>,
) -> Result<Json<Data<TodoResponse>>, ApiErrorResponse> {
    let id = TodoId::new(id);
    let patch = request.into_patch()?;
    let todo = state
        .todo_repository
        .update(&owner, id, &patch)
        .await?
        .ok_or_else(|| ApiErrorResponse::not_found(format!("Todo not found: {id}")))?;
    Ok(Json(Data::new(TodoResponse::from(todo))))
}

// =============================================================================
// DELETE /todos/{id}
// =============================================================================

/// Deletes a todo together with its attachments.
///
/// Attachment rows go with the todo; their stored objects are removed
/// afterwards, and a failed removal is only logged.
///
/// # Errors
///
/// - **400 Bad Request**: store failure
/// - **404 Not Found**: the caller has no such todo
pub async fn delete_todo(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Data<SuccessResponse>>, ApiErrorResponse> {
    let id = TodoId::new(id);
    let attachments = state.attachment_repository.list_for_todo(&owner, id).await?;
    if !state.todo_repository.delete(&owner, id).await? {
        return Err(ApiErrorResponse::not_found(format!("Todo not found: {id}")));
    }

    for attachment in attachments {
        if let Err(error) = state.object_storage.remove(&attachment.file_path).await {
            tracing::warn!(
                %error,
                path = %attachment.file_path,
                "Failed to remove attachment object"
            );
        }
    }
    Ok(Json(Data::new(SuccessResponse::ok())))
}

// =============================================================================
// POST /todos-advanced/reorder
// =============================================================================

/// Sets the position of several todos in one transaction.
///
/// # Request Body
///
/// ```json
/// { "items": [{ "id": 3, "position": 0 }, { "id": 1, "position": 1 }] }
/// ```
///
/// # Errors
///
/// - **400 Bad Request**: malformed body or store failure
/// - **404 Not Found**: an id does not belong to the caller; nothing is changed
pub async fn reorder_todos(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
    ApiJson(request): ApiJson<ReorderRequest>,
) -> Result<Json<Data<SuccessResponse>>, ApiErrorResponse> {
    let positions: Vec<PositionUpdate> = request
        .items
        .into_iter()
        .map(|item| PositionUpdate {
            id: item.id,
            position: item.position,
        })
        .collect();
    let updated = state.todo_repository.reorder(&owner, &positions).await?;
    tracing::debug!(updated, "Todos reordered");
    Ok(Json(Data::new(SuccessResponse::updated(updated))))
}
