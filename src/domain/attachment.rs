//! Attachment domain model and storage layout.

use chrono::{DateTime, Utc};

use super::{OwnerId, TodoId, row_id};

row_id!(
    /// Identifier of an attachment row.
    AttachmentId
);

/// Metadata of a file uploaded for a todo.
///
/// The binary content lives in object storage under `file_path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub id: AttachmentId,
    pub owner: OwnerId,
    pub todo_id: TodoId,
    pub file_path: String,
    /// Name of the file as uploaded.
    pub file_name: String,
    /// Size in bytes.
    pub file_size: i64,
    /// MIME type reported by the client.
    pub file_type: String,
    pub created_at: DateTime<Utc>,
}

impl Attachment {
    #[must_use]
    pub fn from_draft(
        id: AttachmentId,
        owner: OwnerId,
        draft: NewAttachment,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner,
            todo_id: draft.todo_id,
            file_path: draft.file_path,
            file_name: draft.file_name,
            file_size: draft.file_size,
            file_type: draft.file_type,
            created_at: now,
        }
    }
}

/// Attachment metadata that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttachment {
    pub todo_id: TodoId,
    pub file_path: String,
    pub file_name: String,
    pub file_size: i64,
    pub file_type: String,
}

/// Returns the object key for an upload: `{owner}/{todo_id}/{file_name}`.
///
/// Only the final path component of `file_name` is used, so client-supplied
/// names cannot escape the todo's prefix. Returns `None` when nothing usable
/// remains.
#[must_use]
pub fn storage_path(owner: &OwnerId, todo_id: TodoId, file_name: &str) -> Option<String> {
    let base_name = file_name
        .rsplit(['/', '\\'])
        .next()
        .map(str::trim)
        .filter(|name| !name.is_empty() && *name != "." && *name != "..")?;
    Some(format!("{owner}/{todo_id}/{base_name}"))
}
