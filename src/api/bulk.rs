//! Batch create, update and delete.
//!
//! [`process_batch_operation`] runs one operation over a list of JSON items
//! against any [`BatchTable`]. Creates and deletes are always atomic.
//! Updates follow [`BatchMode`]: all-or-nothing in one transaction, or
//! best-effort with per-item failures reported next to the updated rows.

use axum::{Extension, Json, extract::State};
use futures::future::{BoxFuture, FutureExt, TryFutureExt, join_all};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::dto::{
    CategoryResponse, CreateCategoryRequest, CreateTodoRequest, Data, TodoResponse,
    UpdateCategoryRequest, UpdateTodoRequest,
};
use super::error::{ApiErrorResponse, FieldError, ValidationError};
use super::extract::ApiJson;
use super::handlers::AppState;
use crate::domain::{
    BatchMode, BatchOperation, CategoryId, CategoryPatch, InvalidOperation, NewCategory, NewTodo,
    OwnerId, TodoId, TodoPatch,
};
use crate::infrastructure::{
    AttachmentRepository, CategoryRepository, ObjectStorage, RepositoryError, RepositoryResult,
    TodoRepository,
};

// =============================================================================
// Request / Response
// =============================================================================

/// Body of a batch endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchRequest {
    /// `create`, `update` or `delete`.
    pub operation: String,
    #[serde(default)]
    pub items: Vec<Value>,
    /// Overrides the configured update atomicity.
    #[serde(default)]
    pub mode: Option<String>,
}

/// An item that could not be updated in best-effort mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub id: i64,
    pub error: String,
}

/// Result of a batch operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum BatchOutcome<R> {
    /// Every affected row.
    Records(Vec<R>),
    /// Best-effort update result.
    Partial {
        updated: Vec<R>,
        failed: Vec<BatchFailure>,
    },
}

/// Errors that reject a whole batch.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    InvalidOperation(#[from] InvalidOperation),

    #[error("{0}")]
    InvalidMode(String),

    #[error("Batch of {count} items exceeds the limit of {max}")]
    LimitExceeded { count: usize, max: usize },

    #[error("{0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<BatchError> for ApiErrorResponse {
    fn from(error: BatchError) -> Self {
        match error {
            BatchError::Validation(error) => error.into(),
            BatchError::Repository(error) => error.into(),
            other @ (BatchError::InvalidOperation(_)
            | BatchError::InvalidMode(_)
            | BatchError::LimitExceeded { .. }) => Self::bad_request(other.to_string()),
        }
    }
}

// =============================================================================
// Batch Table
// =============================================================================

/// A table that batch operations can target.
pub trait BatchTable: Send + Sync {
    type Id: Copy + Send + Sync;
    type Draft: Send;
    type Patch: Send + Sync;
    /// Row representation returned to the client.
    type Record: Serialize + Send;

    /// Table name for logging.
    const NAME: &'static str;

    fn make_id(raw: i64) -> Self::Id;

    /// Parses and validates a create item.
    ///
    /// # Errors
    ///
    /// Returns the fields that failed validation.
    fn parse_draft(item: Value) -> Result<Self::Draft, ValidationError>;

    /// Parses and validates the fields of an update item, `id` excluded.
    ///
    /// # Errors
    ///
    /// Returns the fields that failed validation.
    fn parse_patch(fields: Map<String, Value>) -> Result<Self::Patch, ValidationError>;

    fn insert_many<'a>(
        &'a self,
        owner: &'a OwnerId,
        drafts: Vec<Self::Draft>,
    ) -> BoxFuture<'a, RepositoryResult<Vec<Self::Record>>>;

    fn update_one<'a>(
        &'a self,
        owner: &'a OwnerId,
        id: Self::Id,
        patch: &'a Self::Patch,
    ) -> BoxFuture<'a, RepositoryResult<Option<Self::Record>>>;

    fn update_all<'a>(
        &'a self,
        owner: &'a OwnerId,
        patches: Vec<(Self::Id, Self::Patch)>,
    ) -> BoxFuture<'a, RepositoryResult<Vec<Self::Record>>>;

    fn delete_many<'a>(
        &'a self,
        owner: &'a OwnerId,
        ids: &'a [Self::Id],
    ) -> BoxFuture<'a, RepositoryResult<Vec<Self::Record>>>;
}

fn malformed(error: &serde_json::Error) -> ValidationError {
    ValidationError::single("item", error.to_string())
}

/// Todos as a batch target.
pub struct TodoTable<'r> {
    repository: &'r dyn TodoRepository,
    attachments: Option<AttachmentCleanup<'r>>,
}

/// Where the stored objects of deleted todos' attachments live.
struct AttachmentCleanup<'r> {
    repository: &'r dyn AttachmentRepository,
    storage: &'r dyn ObjectStorage,
}

impl<'r> TodoTable<'r> {
    #[must_use]
    pub fn new(repository: &'r dyn TodoRepository) -> Self {
        Self {
            repository,
            attachments: None,
        }
    }

    /// Also removes the stored objects of attachments whose todos are deleted.
    #[must_use]
    pub fn with_attachments(
        mut self,
        repository: &'r dyn AttachmentRepository,
        storage: &'r dyn ObjectStorage,
    ) -> Self {
        self.attachments = Some(AttachmentCleanup {
            repository,
            storage,
        });
        self
    }
}

impl BatchTable for TodoTable<'_> {
    type Id = TodoId;
    type Draft = NewTodo;
    type Patch = TodoPatch;
    type Record = TodoResponse;

    const NAME: &'static str = "todos";

    fn make_id(raw: i64) -> TodoId {
        TodoId::new(raw)
    }

    fn parse_draft(item: Value) -> Result<NewTodo, ValidationError> {
        serde_json::from_value::<CreateTodoRequest>(item)
            .map_err(|error| malformed(&error))?
            .into_draft()
    }

    fn parse_patch(fields: Map<String, Value>) -> Result<TodoPatch, ValidationError> {
        serde_json::from_value::<UpdateTodoRequest>(Value::Object(fields))
            .map_err(|error| malformed(&error))?
            .into_patch()
    }

    fn insert_many<'a>(
        &'a self,
        owner: &'a OwnerId,
        drafts: Vec<NewTodo>,
    ) -> BoxFuture<'a, RepositoryResult<Vec<TodoResponse>>> {
        self.repository
            .insert_many(owner, drafts)
            .map_ok(|todos| todos.into_iter().map(TodoResponse::from).collect())
            .boxed()
    }

    fn update_one<'a>(
        &'a self,
        owner: &'a OwnerId,
        id: TodoId,
        patch: &'a TodoPatch,
    ) -> BoxFuture<'a, RepositoryResult<Option<TodoResponse>>> {
        self.repository
            .update(owner, id, patch)
            .map_ok(|todo| todo.map(TodoResponse::from))
            .boxed()
    }

    fn update_all<'a>(
        &'a self,
        owner: &'a OwnerId,
        patches: Vec<(TodoId, TodoPatch)>,
    ) -> BoxFuture<'a, RepositoryResult<Vec<TodoResponse>>> {
        self.repository
            .update_all(owner, patches)
            .map_ok(|todos| todos.into_iter().map(TodoResponse::from).collect())
            .boxed()
    }

    fn delete_many<'a>(
        &'a self,
        owner: &'a OwnerId,
        ids: &'a [TodoId],
    ) -> BoxFuture<'a, RepositoryResult<Vec<TodoResponse>>> {
        async move {
            let mut file_paths = Vec::new();
            if let Some(cleanup) = &self.attachments {
                for id in ids {
                    let attachments = cleanup.repository.list_for_todo(owner, *id).await?;
                    file_paths.extend(
                        attachments
                            .into_iter()
                            .map(|attachment| attachment.file_path),
                    );
                }
            }

            let todos = self.repository.delete_many(owner, ids).await?;

            if let Some(cleanup) = &self.attachments {
                for path in &file_paths {
                    if let Err(error) = cleanup.storage.remove(path).await {
                        tracing::warn!(%error, %path, "Failed to remove attachment object");
                    }
                }
            }
            Ok(todos.into_iter().map(TodoResponse::from).collect())
        }
        .boxed()
    }
}

/// Categories as a batch target.
pub struct CategoryTable<'r> {
    repository: &'r dyn CategoryRepository,
}

impl<'r> CategoryTable<'r> {
    #[must_use]
    pub fn new(repository: &'r dyn CategoryRepository) -> Self {
        Self { repository }
    }
}

impl BatchTable for CategoryTable<'_> {
    type Id = CategoryId;
    type Draft = NewCategory;
    type Patch = CategoryPatch;
    type Record = CategoryResponse;

    const NAME: &'static str = "categories";

    fn make_id(raw: i64) -> CategoryId {
        CategoryId::new(raw)
    }

    fn parse_draft(item: Value) -> Result<NewCategory, ValidationError> {
        serde_json::from_value::<CreateCategoryRequest>(item)
            .map_err(|error| malformed(&error))?
            .into_draft()
    }

    fn parse_patch(fields: Map<String, Value>) -> Result<CategoryPatch, ValidationError> {
        serde_json::from_value::<UpdateCategoryRequest>(Value::Object(fields))
            .map_err(|error| malformed(&error))?
            .into_patch()
    }

    fn insert_many<'a>(
        &'a self,
        owner: &'a OwnerId,
        drafts: Vec<NewCategory>,
    ) -> BoxFuture<'a, RepositoryResult<Vec<CategoryResponse>>> {
        self.repository
            .insert_many(owner, drafts)
            .map_ok(|categories| categories.into_iter().map(CategoryResponse::from).collect())
            .boxed()
    }

    fn update_one<'a>(
        &'a self,
        owner: &'a OwnerId,
        id: CategoryId,
        patch: &'a CategoryPatch,
    ) -> BoxFuture<'a, RepositoryResult<Option<CategoryResponse>>> {
        self.repository
            .update(owner, id, patch)
            .map_ok(|category| category.map(CategoryResponse::from))
            .boxed()
    }

    fn update_all<'a>(
        &'a self,
        owner: &'a OwnerId,
        patches: Vec<(CategoryId, CategoryPatch)>,
    ) -> BoxFuture<'a, RepositoryResult<Vec<CategoryResponse>>> {
        self.repository
            .update_all(owner, patches)
            .map_ok(|categories| categories.into_iter().map(CategoryResponse::from).collect())
            .boxed()
    }

    fn delete_many<'a>(
        &'a self,
        owner: &'a OwnerId,
        ids: &'a [CategoryId],
    ) -> BoxFuture<'a, RepositoryResult<Vec<CategoryResponse>>> {
        self.repository
            .delete_many(owner, ids)
            .map_ok(|categories| categories.into_iter().map(CategoryResponse::from).collect())
            .boxed()
    }
}

// =============================================================================
// Batch Processor
// =============================================================================

/// Prefixes every field error with the item position, e.g. `items[2].text`.
fn at_item(index: usize, error: ValidationError) -> Vec<FieldError> {
    error
        .errors
        .into_iter()
        .map(|error| FieldError {
            field: format!("items[{index}].{}", error.field),
            message: format!("items[{index}]: {}", error.message),
        })
        .collect()
}

/// Reads the id of an update or delete item: `{"id": 3, ...}` or a bare `3`.
fn split_id(index: usize, item: Value) -> Result<(i64, Map<String, Value>), FieldError> {
    let missing = || {
        FieldError::new(
            format!("items[{index}].id"),
            format!("items[{index}]: id is required"),
        )
    };
    match item {
        Value::Number(number) => number.as_i64().map(|id| (id, Map::new())).ok_or_else(missing),
        Value::Object(mut fields) => {
            let id = fields.remove("id").and_then(|id| id.as_i64()).ok_or_else(missing)?;
            Ok((id, fields))
        }
        _ => Err(missing()),
    }
}

fn parse_drafts<T: BatchTable>(items: Vec<Value>) -> Result<Vec<T::Draft>, ValidationError> {
    let mut errors = Vec::new();
    let mut drafts = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match T::parse_draft(item) {
            Ok(draft) => drafts.push(draft),
            Err(error) => errors.extend(at_item(index, error)),
        }
    }
    ValidationError::new(errors).into_result(drafts)
}

fn parse_patches<T: BatchTable>(
    items: Vec<Value>,
) -> Result<Vec<(i64, T::Patch)>, ValidationError> {
    let mut errors = Vec::new();
    let mut patches = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        let parsed = split_id(index, item)
            .map_err(|error| vec![error])
            .and_then(|(id, fields)| {
                T::parse_patch(fields)
                    .map(|patch| (id, patch))
                    .map_err(|error| at_item(index, error))
            });
        match parsed {
            Ok(patch) => patches.push(patch),
            Err(item_errors) => errors.extend(item_errors),
        }
    }
    ValidationError::new(errors).into_result(patches)
}

fn parse_ids<T: BatchTable>(items: Vec<Value>) -> Result<Vec<T::Id>, ValidationError> {
    let mut errors = Vec::new();
    let mut ids = Vec::with_capacity(items.len());
    for (index, item) in items.into_iter().enumerate() {
        match split_id(index, item) {
            Ok((id, _)) => ids.push(T::make_id(id)),
            Err(error) => errors.push(error),
        }
    }
    ValidationError::new(errors).into_result(ids)
}

async fn update_best_effort<T: BatchTable>(
    table: &T,
    owner: &OwnerId,
    patches: Vec<(i64, T::Patch)>,
) -> BatchOutcome<T::Record> {
    let results = join_all(patches.iter().map(|(id, patch)| async move {
        (*id, table.update_one(owner, T::make_id(*id), patch).await)
    }))
    .await;

    let mut updated = Vec::new();
    let mut failed = Vec::new();
    for (id, result) in results {
        match result {
            Ok(Some(record)) => updated.push(record),
            Ok(None) => failed.push(BatchFailure {
                id,
                error: RepositoryError::NotFound(format!("{} {id}", T::NAME)).to_string(),
            }),
            Err(error) => failed.push(BatchFailure {
                id,
                error: error.to_string(),
            }),
        }
    }
    BatchOutcome::Partial { updated, failed }
}

/// Runs one batch operation for `owner` against `table`.
///
/// `default_mode` applies when the request names no mode. Empty item lists
/// succeed without touching the store.
///
/// # Errors
///
/// - `InvalidOperation` for an unknown operation tag
/// - `InvalidMode` for an unknown `mode`
/// - `LimitExceeded` for more than `max_items` items
/// - `Validation` if any item is malformed; nothing is written
/// - `Repository` if the store rejects an atomic operation; nothing is written
pub async fn process_batch_operation<T: BatchTable>(
    table: &T,
    owner: &OwnerId,
    request: BatchRequest,
    default_mode: BatchMode,
    max_items: usize,
) -> Result<BatchOutcome<T::Record>, BatchError> {
    let operation: BatchOperation = request.operation.parse()?;
    if request.items.len() > max_items {
        return Err(BatchError::LimitExceeded {
            count: request.items.len(),
            max: max_items,
        });
    }
    let mode = match request.mode.as_deref() {
        Some(mode) => mode.parse::<BatchMode>().map_err(BatchError::InvalidMode)?,
        None => default_mode,
    };
    let count = request.items.len();

    let outcome = match operation {
        BatchOperation::Create => {
            let drafts = parse_drafts::<T>(request.items)?;
            if drafts.is_empty() {
                BatchOutcome::Records(Vec::new())
            } else {
                BatchOutcome::Records(table.insert_many(owner, drafts).await?)
            }
        }
        BatchOperation::Update => {
            let patches = parse_patches::<T>(request.items)?;
            match mode {
                _ if patches.is_empty() => BatchOutcome::Records(Vec::new()),
                BatchMode::AllOrNothing => {
                    let patches = patches
                        .into_iter()
                        .map(|(id, patch)| (T::make_id(id), patch))
                        .collect();
                    BatchOutcome::Records(table.update_all(owner, patches).await?)
                }
                BatchMode::BestEffort => update_best_effort(table, owner, patches).await,
            }
        }
        BatchOperation::Delete => {
            let ids = parse_ids::<T>(request.items)?;
            if ids.is_empty() {
                BatchOutcome::Records(Vec::new())
            } else {
                BatchOutcome::Records(table.delete_many(owner, &ids).await?)
            }
        }
    };

    tracing::info!(
        table = T::NAME,
        %operation,
        ?mode,
        items = count,
        "Batch operation processed"
    );
    Ok(outcome)
}

// =============================================================================
// POST /todos-advanced/batch, POST /categories/batch
// =============================================================================

/// Batch operation on the caller's todos.
///
/// # Request Body
///
/// ```json
/// { "operation": "update", "items": [{ "id": 1, "completed": true }], "mode": "best_effort" }
/// ```
///
/// # Errors
///
/// - **400 Bad Request**: invalid operation, mode, item or store failure
/// - **404 Not Found**: an all-or-nothing update names a missing todo
pub async fn batch_todos(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
    ApiJson(request): ApiJson<BatchRequest>,
) -> Result<Json<Data<BatchOutcome<TodoResponse>>>, ApiErrorResponse> {
    let table = TodoTable::new(state.todo_repository.as_ref()).with_attachments(
        state.attachment_repository.as_ref(),
        state.object_storage.as_ref(),
    );
    let outcome = process_batch_operation(
        &table,
        &owner,
        request,
        state.config.batch_mode,
        state.config.max_batch_size,
    )
    .await?;
    Ok(Json(Data::new(outcome)))
}

/// Batch operation on the caller's categories.
///
/// # Errors
///
/// See [`batch_todos`].
pub async fn batch_categories(
    State(state): State<AppState>,
    Extension(owner): Extension<OwnerId>,
    ApiJson(request): ApiJson<BatchRequest>,
) -> Result<Json<Data<BatchOutcome<CategoryResponse>>>, ApiErrorResponse> {
    let table = CategoryTable::new(state.category_repository.as_ref());
    let outcome = process_batch_operation(
        &table,
        &owner,
        request,
        state.config.batch_mode,
        state.config.max_batch_size,
    )
    .await?;
    Ok(Json(Data::new(outcome)))
}

// =============================================================================
// Tests
// =============================================================================
