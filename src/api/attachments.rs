//! File attachments of todos.
//!
//! Binary content goes to [`ObjectStorage`](crate::infrastructure::ObjectStorage)
//! under `{owner}/{todo_id}/{file_name}`; the metadata row goes to the
//! attachment repository.

use axum::{
    Extension, Json,
    extract::{Multipart, State, multipart::MultipartRejection},
    http::StatusCode,
};
use bytes::Bytes;

use super::dto::{AttachmentResponse, Data, SuccessResponse};
use super::error::ApiErrorResponse;
use super::extract::ApiPath;
use super::handlers::AppState;
use crate::domain::{AttachmentId, NewAttachment, OwnerId, TodoId, storage_path};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Parts of an upload form.
#[derive(Debug, Default)]
struct UploadForm {
    file: Option<UploadedFile>,
    todo_id: Option<String>,
}

#[derive(Debug)]
struct UploadedFile {
    name: String,
    content_type: String,
    content: Bytes,
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, ApiErrorResponse> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or(DEFAULT_CONTENT_TYPE)
                    .to_string();
                let content = field.bytes().await?;
                form.file = Some(UploadedFile {
                    name: file_name,
                    content_type,
                    content,
                });
            }
            Some("todo_id") => form.todo_id = Some(field.text().await?),
            _ => {}
        }
    }
    Ok(form)
}

// =============================================================================
// GET /attachments/{todo_id}
// =============================================================================

/// Lists the attachments of one of the caller's todos, newest first.
///
/// # Errors
///
/// - **400 Bad Request**: store failure
pub async fn list_attachments(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
    ApiPath(todo_id): ApiPath<i64>,
) -> Result<Json<Data<Vec<AttachmentResponse>>>, ApiErrorResponse> {
    let attachments = state
        .attachment_repository
        .list_for_todo(&owner, TodoId::new(todo_id))
        .await?;
    Ok(Json(Data::new(
        attachments.into_iter().map(AttachmentResponse::from).collect(),
    )))
}

// =============================================================================
// POST /attachments
// =============================================================================

/// Uploads a file for a todo.
///
/// Expects a multipart form with a `file` part and a `todo_id` part. The
/// object is written first; if the metadata row cannot be recorded the
/// object is removed again.
///
/// # Errors
///
/// - **400 Bad Request**: missing parts, unusable file name, storage failure
/// - **404 Not Found**: the caller has no such todo
/// - **413 Payload Too Large**: body exceeds the upload limit
pub async fn upload_attachment(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<(StatusCode, Json<Data<AttachmentResponse>>), ApiErrorResponse> {
    let form = read_upload_form(multipart?).await?;
    let (Some(file), Some(todo_id)) = (form.file, form.todo_id) else {
        return Err(ApiErrorResponse::bad_request(
            "File and todo_id are required",
        ));
    };
    let todo_id = todo_id.trim().parse::<i64>().map(TodoId::new).map_err(|_| {
        ApiErrorResponse::bad_request(format!("todo_id must be an integer, got '{todo_id}'"))
    })?;

    if state.todo_repository.find(&owner, todo_id).await?.is_none() {
        return Err(ApiErrorResponse::not_found(format!(
            "Todo not found: {todo_id}"
        )));
    }
    let file_path = storage_path(&owner, todo_id, &file.name).ok_or_else(|| {
        ApiErrorResponse::bad_request(format!("Invalid file name: '{}'", file.name))
    })?;
    let file_size = i64::try_from(file.content.len()).unwrap_or(i64::MAX);

    state.object_storage.put(&file_path, file.content).await?;

    let draft = NewAttachment {
        todo_id,
        file_path: file_path.clone(),
        file_name: file.name,
        file_size,
        file_type: file.content_type,
    };
    let attachment = match state.attachment_repository.insert(&owner, draft).await {
        Ok(attachment) => attachment,
        Err(error) => {
            if let Err(cleanup) = state.object_storage.remove(&file_path).await {
                tracing::warn!(
                    error = %cleanup,
                    path = %file_path,
                    "Failed to remove orphaned object"
                );
            }
            return Err(error.into());
        }
    };

    tracing::info!(
        attachment_id = %attachment.id,
        %todo_id,
        file_size,
        "Attachment uploaded"
    );
    Ok((
        StatusCode::CREATED,
        Json(Data::new(AttachmentResponse::from(attachment))),
    ))
}

// =============================================================================
// DELETE /attachments/{id}
// =============================================================================

/// Deletes an attachment: its stored object first, then its row.
///
/// # Errors
///
/// - **400 Bad Request**: storage or store failure
/// - **404 Not Found**: the caller has no such attachment
pub async fn delete_attachment(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Data<SuccessResponse>>, ApiErrorResponse> {
    let id = AttachmentId::new(id);
    let not_found = || ApiErrorResponse::not_found(format!("Attachment not found: {id}"));

    let attachment = state
        .attachment_repository
        .find(&owner, id)
        .await?
        .ok_or_else(not_found)?;
    state.object_storage.remove(&attachment.file_path).await?;
    if !state.attachment_repository.delete(&owner, id).await? {
        return Err(not_found());
    }
    Ok(Json(Data::new(SuccessResponse::ok())))
}
