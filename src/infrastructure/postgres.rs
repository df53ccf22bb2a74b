//! `PostgreSQL` repository implementation.
//!
//! [`PostgresStore`] implements every repository trait over a shared
//! `sqlx::PgPool`. Dynamic predicates, ordering and multi-row inserts are
//! rendered with `sqlx::QueryBuilder`; multi-row writes run in a single
//! transaction. The schema lives in `migrations/`.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use futures::future::BoxFuture;
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::domain::{
    Attachment, AttachmentId, Category, CategoryId, CategoryPatch, NewAttachment, NewCategory,
    NewTodo, OwnerId, Priority, Todo, TodoId, TodoPatch,
};
use crate::infrastructure::repository::{
    AttachmentRepository, CategoryRepository, PositionUpdate, RepositoryError, RepositoryResult,
    SortField, SortOrder, TodoFilter, TodoPredicate, TodoQuery, TodoRepository,
};

const TODO_COLUMNS: &str = "id, owner_id, text, completed, due_date, due_time, category_id, note, \
     repeat_rule, priority, position, created_at, updated_at";
const CATEGORY_COLUMNS: &str = "id, owner_id, name, color, created_at";
const ATTACHMENT_COLUMNS: &str =
    "id, owner_id, todo_id, file_path, file_name, file_size, file_type, created_at";

fn database_error(error: sqlx::Error) -> RepositoryError {
    match &error {
        sqlx::Error::Database(database) if database.is_foreign_key_violation() => {
            RepositoryError::ConstraintViolation(database.message().to_string())
        }
        _ => RepositoryError::DatabaseError(error.to_string()),
    }
}

#[allow(clippy::cast_sign_loss)]
const fn to_count(value: i64) -> u64 {
    if value < 0 { 0 } else { value as u64 }
}

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, FromRow)]
struct TodoRow {
    id: i64,
    owner_id: Uuid,
    text: String,
    completed: bool,
    due_date: Option<NaiveDate>,
    due_time: Option<NaiveTime>,
    category_id: Option<i64>,
    note: Option<String>,
    repeat_rule: String,
    priority: String,
    position: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TodoRow> for Todo {
    type Error = RepositoryError;

    fn try_from(row: TodoRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: TodoId::new(row.id),
            owner: OwnerId::from_uuid(row.owner_id),
            text: row.text,
            completed: row.completed,
            date: row.due_date,
            time: row.due_time,
            category_id: row.category_id.map(CategoryId::new),
            note: row.note,
            repeat: row
                .repeat_rule
                .parse()
                .map_err(|error: crate::domain::UnknownVariant| {
                    RepositoryError::SerializationError(error.to_string())
                })?,
            priority: row
                .priority
                .parse()
                .map_err(|error: crate::domain::UnknownVariant| {
                    RepositoryError::SerializationError(error.to_string())
                })?,
            position: row.position,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_todos(rows: Vec<TodoRow>) -> RepositoryResult<Vec<Todo>> {
    rows.into_iter().map(Todo::try_from).collect()
}

#[derive(Debug, FromRow)]
struct CategoryRow {
    id: i64,
    owner_id: Uuid,
    name: String,
    color: String,
    created_at: DateTime<Utc>,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: CategoryId::new(row.id),
            owner: OwnerId::from_uuid(row.owner_id),
            name: row.name,
            color: row.color,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct AttachmentRow {
    id: i64,
    owner_id: Uuid,
    todo_id: i64,
    file_path: String,
    file_name: String,
    file_size: i64,
    file_type: String,
    created_at: DateTime<Utc>,
}

impl From<AttachmentRow> for Attachment {
    fn from(row: AttachmentRow) -> Self {
        Self {
            id: AttachmentId::new(row.id),
            owner: OwnerId::from_uuid(row.owner_id),
            todo_id: TodoId::new(row.todo_id),
            file_path: row.file_path,
            file_name: row.file_name,
            file_size: row.file_size,
            file_type: row.file_type,
            created_at: row.created_at,
        }
    }
}

// =============================================================================
// SQL Rendering
// =============================================================================

/// Escapes `%`, `_` and `\` for use inside a `LIKE` pattern.
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for character in value.chars() {
        if matches!(character, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(character);
    }
    escaped
}

/// Appends `WHERE owner_id = .. AND <predicates>` to `builder`.
pub(crate) fn push_todo_filter(
    builder: &mut QueryBuilder<'_, Postgres>,
    owner: &OwnerId,
    filter: &TodoFilter,
) {
    builder.push(" WHERE owner_id = ").push_bind(*owner.as_uuid());
    for predicate in filter.predicates() {
        match predicate {
            TodoPredicate::TextContains(needle) => {
                let pattern = format!("%{}%", escape_like(needle));
                builder
                    .push(" AND (text ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR note ILIKE ")
                    .push_bind(pattern)
                    .push(")");
            }
            TodoPredicate::Category(category_id) => {
                builder.push(" AND category_id = ").push_bind(category_id.get());
            }
            TodoPredicate::Completed(completed) => {
                builder.push(" AND completed = ").push_bind(*completed);
            }
            TodoPredicate::Priority(priority) => {
                builder.push(" AND priority = ").push_bind(priority.as_str());
            }
            TodoPredicate::DueOnOrAfter(day) => {
                builder.push(" AND due_date >= ").push_bind(*day);
            }
            TodoPredicate::DueOnOrBefore(day) => {
                builder.push(" AND due_date <= ").push_bind(*day);
            }
            TodoPredicate::DueOn(day) => {
                builder.push(" AND due_date = ").push_bind(*day);
            }
            TodoPredicate::DueAfter(day) => {
                builder.push(" AND due_date > ").push_bind(*day);
            }
            TodoPredicate::DueBefore(instant) => {
                builder
                    .push(" AND (due_date < ")
                    .push_bind(instant.date())
                    .push(" OR (due_date = ")
                    .push_bind(instant.date())
                    .push(" AND due_time IS NOT NULL AND due_time < ")
                    .push_bind(instant.time())
                    .push("))");
            }
        }
    }
}

/// Appends `ORDER BY` for `order`, with `id` as the final tie-breaker.
pub(crate) fn push_todo_order(builder: &mut QueryBuilder<'_, Postgres>, order: SortOrder) {
    let direction = order.direction.as_sql();
    builder.push(" ORDER BY ");
    match order.field {
        SortField::CreatedAt => builder.push(format!("created_at {direction}")),
        SortField::UpdatedAt => builder.push(format!("updated_at {direction}")),
        SortField::Date => builder.push(format!(
            "due_date {direction} NULLS LAST, due_time {direction} NULLS LAST"
        )),
        SortField::Priority => builder.push(format!(
            "CASE priority WHEN 'low' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END {direction}"
        )),
        SortField::Position => builder.push(format!("position {direction}")),
        SortField::Text => builder.push(format!("text COLLATE \"C\" {direction}")),
    };
    builder.push(format!(", id {direction}"));
}

/// Appends `, column = value` assignments for every field set in `patch`.
fn push_todo_assignments(builder: &mut QueryBuilder<'_, Postgres>, patch: &TodoPatch) {
    if let Some(text) = &patch.text {
        builder.push(", text = ").push_bind(text.clone());
    }
    if let Some(completed) = patch.completed {
        builder.push(", completed = ").push_bind(completed);
    }
    if let Some(date) = patch.date {
        builder.push(", due_date = ").push_bind(date);
    }
    if let Some(time) = patch.time {
        builder.push(", due_time = ").push_bind(time);
    }
    if let Some(category_id) = patch.category_id {
        builder
            .push(", category_id = ")
            .push_bind(category_id.map(CategoryId::get));
    }
    if let Some(note) = &patch.note {
        builder.push(", note = ").push_bind(note.clone());
    }
    if let Some(repeat) = patch.repeat {
        builder.push(", repeat_rule = ").push_bind(repeat.as_str());
    }
    if let Some(priority) = patch.priority {
        builder.push(", priority = ").push_bind(priority.as_str());
    }
    if let Some(position) = patch.position {
        builder.push(", position = ").push_bind(position);
    }
}

// =============================================================================
// Shared Statements
// =============================================================================

/// Fails with `ConstraintViolation` unless every id names a category of `owner`.
async fn ensure_categories_owned(
    connection: &mut PgConnection,
    owner: &OwnerId,
    mut category_ids: Vec<i64>,
) -> RepositoryResult<()> {
    category_ids.sort_unstable();
    category_ids.dedup();
    if category_ids.is_empty() {
        return Ok(());
    }

    let found: Vec<(i64,)> =
        sqlx::query_as("SELECT id FROM categories WHERE owner_id = $1 AND id = ANY($2)")
            .bind(owner.as_uuid())
            .bind(&category_ids)
            .fetch_all(&mut *connection)
            .await
            .map_err(database_error)?;

    match category_ids
        .iter()
        .find(|id| !found.iter().any(|(found_id,)| found_id == *id))
    {
        Some(missing) => Err(RepositoryError::ConstraintViolation(format!(
            "Category {missing} does not exist"
        ))),
        None => Ok(()),
    }
}

async fn update_todo_row(
    connection: &mut PgConnection,
    owner: &OwnerId,
    id: TodoId,
    patch: &TodoPatch,
) -> RepositoryResult<Option<Todo>> {
    if let Some(Some(category_id)) = patch.category_id {
        let existing: Option<(i64,)> =
            sqlx::query_as("SELECT id FROM todos WHERE owner_id = $1 AND id = $2 FOR UPDATE")
                .bind(owner.as_uuid())
                .bind(id.get())
                .fetch_optional(&mut *connection)
                .await
                .map_err(database_error)?;
        if existing.is_none() {
            return Ok(None);
        }
        ensure_categories_owned(connection, owner, vec![category_id.get()]).await?;
    }

    let mut builder = QueryBuilder::<Postgres>::new("UPDATE todos SET updated_at = NOW()");
    push_todo_assignments(&mut builder, patch);
    builder
        .push(" WHERE owner_id = ")
        .push_bind(*owner.as_uuid())
        .push(" AND id = ")
        .push_bind(id.get())
        .push(format!(" RETURNING {TODO_COLUMNS}"));

    builder
        .build_query_as::<TodoRow>()
        .fetch_optional(&mut *connection)
        .await
        .map_err(database_error)?
        .map(Todo::try_from)
        .transpose()
}

async fn update_category_row(
    connection: &mut PgConnection,
    owner: &OwnerId,
    id: CategoryId,
    patch: &CategoryPatch,
) -> RepositoryResult<Option<Category>> {
    if patch.is_empty() {
        let row: Option<CategoryRow> = sqlx::query_as(&format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE owner_id = $1 AND id = $2"
        ))
        .bind(owner.as_uuid())
        .bind(id.get())
        .fetch_optional(&mut *connection)
        .await
        .map_err(database_error)?;
        return Ok(row.map(Category::from));
    }

    let mut builder = QueryBuilder::<Postgres>::new("UPDATE categories SET ");
    {
        let mut assignments = builder.separated(", ");
        if let Some(name) = &patch.name {
            assignments.push("name = ").push_bind_unseparated(name.clone());
        }
        if let Some(color) = &patch.color {
            assignments.push("color = ").push_bind_unseparated(color.clone());
        }
    }
    builder
        .push(" WHERE owner_id = ")
        .push_bind(*owner.as_uuid())
        .push(" AND id = ")
        .push_bind(id.get())
        .push(format!(" RETURNING {CATEGORY_COLUMNS}"));

    let row = builder
        .build_query_as::<CategoryRow>()
        .fetch_optional(&mut *connection)
        .await
        .map_err(database_error)?;
    Ok(row.map(Category::from))
}

// =============================================================================
// PostgreSQL Store
// =============================================================================

/// `PostgreSQL` implementation of every repository trait.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a connection pool.
    ///
    /// # Errors
    ///
    /// Returns the driver error if the database cannot be reached.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Applies the migrations under `migrations/`.
    ///
    /// # Errors
    ///
    /// Returns the migration error if a migration fails to apply.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// =============================================================================
// TodoRepository
// =============================================================================

impl TodoRepository for PostgresStore {
    fn find<'a>(
        &'a self,
        owner: &'a OwnerId,
        id: TodoId,
    ) -> BoxFuture<'a, RepositoryResult<Option<Todo>>> {
        Box::pin(async move {
            let row: Option<TodoRow> = sqlx::query_as(&format!(
                "SELECT {TODO_COLUMNS} FROM todos WHERE owner_id = $1 AND id = $2"
            ))
            .bind(owner.as_uuid())
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?;
            row.map(Todo::try_from).transpose()
        })
    }

    fn list<'a>(
        &'a self,
        owner: &'a OwnerId,
        query: &'a TodoQuery,
    ) -> BoxFuture<'a, RepositoryResult<Vec<Todo>>> {
        Box::pin(async move {
            let mut builder =
                QueryBuilder::<Postgres>::new(format!("SELECT {TODO_COLUMNS} FROM todos"));
            push_todo_filter(&mut builder, owner, &query.filter);
            push_todo_order(&mut builder, query.order);
            if let Some(window) = query.window {
                #[allow(clippy::cast_possible_wrap)]
                let offset = window.offset() as i64;
                builder
                    .push(" LIMIT ")
                    .push_bind(i64::from(window.limit()))
                    .push(" OFFSET ")
                    .push_bind(offset);
            }

            let rows = builder
                .build_query_as::<TodoRow>()
                .fetch_all(&self.pool)
                .await
                .map_err(database_error)?;
            into_todos(rows)
        })
    }

    fn count<'a>(
        &'a self,
        owner: &'a OwnerId,
        filter: &'a TodoFilter,
    ) -> BoxFuture<'a, RepositoryResult<u64>> {
        Box::pin(async move {
            let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM todos");
            push_todo_filter(&mut builder, owner, filter);
            let (count,) = builder
                .build_query_as::<(i64,)>()
                .fetch_one(&self.pool)
                .await
                .map_err(database_error)?;
            Ok(to_count(count))
        })
    }

    fn count_by_priority<'a>(
        &'a self,
        owner: &'a OwnerId,
    ) -> BoxFuture<'a, RepositoryResult<Vec<(Priority, u64)>>> {
        Box::pin(async move {
            let rows: Vec<(String, i64)> = sqlx::query_as(
                "SELECT priority, COUNT(*) FROM todos WHERE owner_id = $1 GROUP BY priority",
            )
            .bind(owner.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?;

            rows.into_iter()
                .map(|(priority, count)| {
                    priority
                        .parse::<Priority>()
                        .map(|priority| (priority, to_count(count)))
                        .map_err(|error| RepositoryError::SerializationError(error.to_string()))
                })
                .collect()
        })
    }

    fn count_by_category<'a>(
        &'a self,
        owner: &'a OwnerId,
    ) -> BoxFuture<'a, RepositoryResult<Vec<(String, u64)>>> {
        Box::pin(async move {
            let rows: Vec<(String, i64)> = sqlx::query_as(
                "SELECT c.name, COUNT(*) FROM todos t \
                 INNER JOIN categories c ON c.id = t.category_id AND c.owner_id = t.owner_id \
                 WHERE t.owner_id = $1 GROUP BY c.name ORDER BY c.name",
            )
            .bind(owner.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?;

            Ok(rows
                .into_iter()
                .map(|(name, count)| (name, to_count(count)))
                .collect())
        })
    }

    fn insert_many<'a>(
        &'a self,
        owner: &'a OwnerId,
        drafts: Vec<NewTodo>,
    ) -> BoxFuture<'a, RepositoryResult<Vec<Todo>>> {
        Box::pin(async move {
            if drafts.is_empty() {
                return Ok(Vec::new());
            }

            let mut transaction = self.pool.begin().await.map_err(database_error)?;
            let category_ids = drafts
                .iter()
                .filter_map(|draft| draft.category_id.map(CategoryId::get))
                .collect();
            ensure_categories_owned(&mut transaction, owner, category_ids).await?;

            let mut builder = QueryBuilder::<Postgres>::new(
                "INSERT INTO todos (owner_id, text, completed, due_date, due_time, category_id, \
                 note, repeat_rule, priority, position) ",
            );
            builder.push_values(drafts.iter(), |mut row, draft| {
                row.push_bind(*owner.as_uuid())
                    .push_bind(draft.text.clone())
                    .push_bind(draft.completed)
                    .push_bind(draft.date)
                    .push_bind(draft.time)
                    .push_bind(draft.category_id.map(CategoryId::get))
                    .push_bind(draft.note.clone())
                    .push_bind(draft.repeat.as_str())
                    .push_bind(draft.priority.as_str())
                    .push_bind(draft.position);
            });
            builder.push(format!(" RETURNING {TODO_COLUMNS}"));

            let rows = builder
                .build_query_as::<TodoRow>()
                .fetch_all(&mut *transaction)
                .await
                .map_err(database_error)?;
            transaction.commit().await.map_err(database_error)?;
            into_todos(rows)
        })
    }

    fn update<'a>(
        &'a self,
        owner: &'a OwnerId,
        id: TodoId,
        patch: &'a TodoPatch,
    ) -> BoxFuture<'a, RepositoryResult<Option<Todo>>> {
        Box::pin(async move {
            let mut transaction = self.pool.begin().await.map_err(database_error)?;
            let updated = update_todo_row(&mut transaction, owner, id, patch).await?;
            transaction.commit().await.map_err(database_error)?;
            Ok(updated)
        })
    }

    fn update_all<'a>(
        &'a self,
        owner: &'a OwnerId,
        patches: Vec<(TodoId, TodoPatch)>,
    ) -> BoxFuture<'a, RepositoryResult<Vec<Todo>>> {
        Box::pin(async move {
            let mut transaction = self.pool.begin().await.map_err(database_error)?;
            let mut updated = Vec::with_capacity(patches.len());
            for (id, patch) in &patches {
                let todo = update_todo_row(&mut transaction, owner, *id, patch)
                    .await?
                    .ok_or_else(|| RepositoryError::NotFound(format!("Todo {id}")))?;
                updated.push(todo);
            }
            transaction.commit().await.map_err(database_error)?;
            Ok(updated)
        })
    }

    fn delete<'a>(
        &'a self,
        owner: &'a OwnerId,
        id: TodoId,
    ) -> BoxFuture<'a, RepositoryResult<bool>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM todos WHERE owner_id = $1 AND id = $2")
                .bind(owner.as_uuid())
                .bind(id.get())
                .execute(&self.pool)
                .await
                .map_err(database_error)?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn delete_many<'a>(
        &'a self,
        owner: &'a OwnerId,
        ids: &'a [TodoId],
    ) -> BoxFuture<'a, RepositoryResult<Vec<Todo>>> {
        Box::pin(async move {
            let raw_ids: Vec<i64> = ids.iter().map(|id| id.get()).collect();
            let rows: Vec<TodoRow> = sqlx::query_as(&format!(
                "DELETE FROM todos WHERE owner_id = $1 AND id = ANY($2) RETURNING {TODO_COLUMNS}"
            ))
            .bind(owner.as_uuid())
            .bind(&raw_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?;
            into_todos(rows)
        })
    }

    fn reorder<'a>(
        &'a self,
        owner: &'a OwnerId,
        positions: &'a [PositionUpdate],
    ) -> BoxFuture<'a, RepositoryResult<u64>> {
        Box::pin(async move {
            let mut transaction = self.pool.begin().await.map_err(database_error)?;
            let mut updated = 0_u64;
            for update in positions {
                let result = sqlx::query(
                    "UPDATE todos SET position = $1, updated_at = NOW() \
                     WHERE owner_id = $2 AND id = $3",
                )
                .bind(update.position)
                .bind(owner.as_uuid())
                .bind(update.id.get())
                .execute(&mut *transaction)
                .await
                .map_err(database_error)?;
                if result.rows_affected() == 0 {
                    return Err(RepositoryError::NotFound(format!("Todo {}", update.id)));
                }
                updated += result.rows_affected();
            }
            transaction.commit().await.map_err(database_error)?;
            Ok(updated)
        })
    }
}

// =============================================================================
// CategoryRepository
// =============================================================================

impl CategoryRepository for PostgresStore {
    fn list<'a>(&'a self, owner: &'a OwnerId) -> BoxFuture<'a, RepositoryResult<Vec<Category>>> {
        Box::pin(async move {
            let rows: Vec<CategoryRow> = sqlx::query_as(&format!(
                "SELECT {CATEGORY_COLUMNS} FROM categories WHERE owner_id = $1 \
                 ORDER BY name COLLATE \"C\" ASC, id ASC"
            ))
            .bind(owner.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?;
            Ok(rows.into_iter().map(Category::from).collect())
        })
    }

    fn find<'a>(
        &'a self,
        owner: &'a OwnerId,
        id: CategoryId,
    ) -> BoxFuture<'a, RepositoryResult<Option<Category>>> {
        Box::pin(async move {
            let row: Option<CategoryRow> = sqlx::query_as(&format!(
                "SELECT {CATEGORY_COLUMNS} FROM categories WHERE owner_id = $1 AND id = $2"
            ))
            .bind(owner.as_uuid())
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?;
            Ok(row.map(Category::from))
        })
    }

    fn insert_many<'a>(
        &'a self,
        owner: &'a OwnerId,
        drafts: Vec<NewCategory>,
    ) -> BoxFuture<'a, RepositoryResult<Vec<Category>>> {
        Box::pin(async move {
            if drafts.is_empty() {
                return Ok(Vec::new());
            }

            let mut builder =
                QueryBuilder::<Postgres>::new("INSERT INTO categories (owner_id, name, color) ");
            builder.push_values(drafts.iter(), |mut row, draft| {
                row.push_bind(*owner.as_uuid())
                    .push_bind(draft.name.clone())
                    .push_bind(draft.color.clone());
            });
            builder.push(format!(" RETURNING {CATEGORY_COLUMNS}"));

            let rows = builder
                .build_query_as::<CategoryRow>()
                .fetch_all(&self.pool)
                .await
                .map_err(database_error)?;
            Ok(rows.into_iter().map(Category::from).collect())
        })
    }

    fn update<'a>(
        &'a self,
        owner: &'a OwnerId,
        id: CategoryId,
        patch: &'a CategoryPatch,
    ) -> BoxFuture<'a, RepositoryResult<Option<Category>>> {
        Box::pin(async move {
            let mut connection = self.pool.acquire().await.map_err(database_error)?;
            update_category_row(&mut connection, owner, id, patch).await
        })
    }

    fn update_all<'a>(
        &'a self,
        owner: &'a OwnerId,
        patches: Vec<(CategoryId, CategoryPatch)>,
    ) -> BoxFuture<'a, RepositoryResult<Vec<Category>>> {
        Box::pin(async move {
            let mut transaction = self.pool.begin().await.map_err(database_error)?;
            let mut updated = Vec::with_capacity(patches.len());
            for (id, patch) in &patches {
                let category = update_category_row(&mut transaction, owner, *id, patch)
                    .await?
                    .ok_or_else(|| RepositoryError::NotFound(format!("Category {id}")))?;
                updated.push(category);
            }
            transaction.commit().await.map_err(database_error)?;
            Ok(updated)
        })
    }

    fn delete<'a>(
        &'a self,
        owner: &'a OwnerId,
        id: CategoryId,
    ) -> BoxFuture<'a, RepositoryResult<bool>> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM categories WHERE owner_id = $1 AND id = $2")
                .bind(owner.as_uuid())
                .bind(id.get())
                .execute(&self.pool)
                .await
                .map_err(database_error)?;
            Ok(result.rows_affected() > 0)
        })
    }

    fn delete_many<'a>(
        &'a self,
        owner: &'a OwnerId,
        ids: &'a [CategoryId],
    ) -> BoxFuture<'a, RepositoryResult<Vec<Category>>> {
        Box::pin(async move {
            let raw_ids: Vec<i64> = ids.iter().map(|id| id.get()).collect();
            let rows: Vec<CategoryRow> = sqlx::query_as(&format!(
                "DELETE FROM categories WHERE owner_id = $1 AND id = ANY($2) \
                 RETURNING {CATEGORY_COLUMNS}"
            ))
            .bind(owner.as_uuid())
            .bind(&raw_ids)
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?;
            Ok(rows.into_iter().map(Category::from).collect())
        })
    }
}

// =============================================================================
// AttachmentRepository
// =============================================================================

impl AttachmentRepository for PostgresStore {
    fn list_for_todo<'a>(
        &'a self,
        owner: &'a OwnerId,
        todo_id: TodoId,
    ) -> BoxFuture<'a, RepositoryResult<Vec<Attachment>>> {
        Box::pin(async move {
            let rows: Vec<AttachmentRow> = sqlx::query_as(&format!(
                "SELECT {ATTACHMENT_COLUMNS} FROM task_attachments \
                 WHERE owner_id = $1 AND todo_id = $2 ORDER BY created_at DESC, id DESC"
            ))
            .bind(owner.as_uuid())
            .bind(todo_id.get())
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?;
            Ok(rows.into_iter().map(Attachment::from).collect())
        })
    }

    fn find<'a>(
        &'a self,
        owner: &'a OwnerId,
        id: AttachmentId,
    ) -> BoxFuture<'a, RepositoryResult<Option<Attachment>>> {
        Box::pin(async move {
            let row: Option<AttachmentRow> = sqlx::query_as(&format!(
                "SELECT {ATTACHMENT_COLUMNS} FROM task_attachments WHERE owner_id = $1 AND id = $2"
            ))
            .bind(owner.as_uuid())
            .bind(id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?;
            Ok(row.map(Attachment::from))
        })
    }

    fn insert<'a>(
        &'a self,
        owner: &'a OwnerId,
        draft: NewAttachment,
    ) -> BoxFuture<'a, RepositoryResult<Attachment>> {
        Box::pin(async move {
            // Inserts nothing unless the todo belongs to the owner.
            let row: Option<AttachmentRow> = sqlx::query_as(&format!(
                "INSERT INTO task_attachments \
                 (owner_id, todo_id, file_path, file_name, file_size, file_type) \
                 SELECT t.owner_id, t.id, $3, $4, $5, $6 FROM todos t \
                 WHERE t.owner_id = $1 AND t.id = $2 \
                 RETURNING {ATTACHMENT_COLUMNS}"
            ))
            .bind(owner.as_uuid())
            .bind(draft.todo_id.get())
            .bind(&draft.file_path)
            .bind(&draft.file_name)
            .bind(draft.file_size)
            .bind(&draft.file_type)
            .fetch_optional(&self.pool)
            .await
            .map_err(database_error)?;
            row.map(Attachment::from)
                .ok_or_else(|| RepositoryError::NotFound(format!("Todo {}", draft.todo_id)))
        })
    }

    fn delete<'a>(
        &'a self,
        owner: &'a OwnerId,
        id: AttachmentId,
    ) -> BoxFuture<'a, RepositoryResult<bool>> {
        Box::pin(async move {
            let result =
                sqlx::query("DELETE FROM task_attachments WHERE owner_id = $1 AND id = $2")
                    .bind(owner.as_uuid())
                    .bind(id.get())
                    .execute(&self.pool)
                    .await
                    .map_err(database_error)?;
            Ok(result.rows_affected() > 0)
        })
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repository::SortDirection;
    use rstest::rstest;

    fn owner() -> OwnerId {
        OwnerId::generate()
    }

    fn day(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
    }

    fn rendered_filter(filter: &TodoFilter) -> String {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT id FROM todos");
        push_todo_filter(&mut builder, &owner(), filter);
        builder.sql().to_string()
    }

    // -------------------------------------------------------------------------
    // Filter Rendering
    // -------------------------------------------------------------------------

    #[rstest]
    fn test_empty_filter_only_scopes_by_owner() {
        assert_eq!(
            rendered_filter(&TodoFilter::all()),
            "SELECT id FROM todos WHERE owner_id = $1"
        );
    }

    #[rstest]
    fn test_text_search_matches_title_or_note() {
        let filter = TodoFilter::all()
            .and(TodoPredicate::Completed(false))
            .and(TodoPredicate::TextContains("milk".to_string()));

        assert_eq!(
            rendered_filter(&filter),
            "SELECT id FROM todos WHERE owner_id = $1 AND completed = $2 \
             AND (text ILIKE $3 OR note ILIKE $4)"
        );
    }

    #[rstest]
    fn test_date_range_renders_inclusive_bounds() {
        let filter = TodoFilter::all()
            .and(TodoPredicate::DueOnOrAfter(day("2024-01-01")))
            .and(TodoPredicate::DueOnOrBefore(day("2024-01-31")));

        assert_eq!(
            rendered_filter(&filter),
            "SELECT id FROM todos WHERE owner_id = $1 AND due_date >= $2 AND due_date <= $3"
        );
    }

    #[rstest]
    fn test_overdue_filter_considers_time_of_day() {
        let now = day("2024-01-10").and_hms_opt(9, 30, 0).unwrap();

        assert_eq!(
            rendered_filter(&TodoFilter::overdue(now)),
            "SELECT id FROM todos WHERE owner_id = $1 AND completed = $2 \
             AND (due_date < $3 OR (due_date = $4 AND due_time IS NOT NULL AND due_time < $5))"
        );
    }

    #[rstest]
    #[case("50%", "%50\\%%")]
    #[case("a_b", "%a\\_b%")]
    #[case("back\\slash", "%back\\\\slash%")]
    #[case("plain", "%plain%")]
    fn test_like_patterns_are_escaped(#[case] needle: &str, #[case] expected: &str) {
        assert_eq!(format!("%{}%", escape_like(needle)), expected);
    }

    // -------------------------------------------------------------------------
    // Order Rendering
    // -------------------------------------------------------------------------

    #[rstest]
    #[case(SortField::CreatedAt, SortDirection::Desc, " ORDER BY created_at DESC, id DESC")]
    #[case(
        SortField::Date,
        SortDirection::Asc,
        " ORDER BY due_date ASC NULLS LAST, due_time ASC NULLS LAST, id ASC"
    )]
    #[case(
        SortField::Priority,
        SortDirection::Desc,
        " ORDER BY CASE priority WHEN 'low' THEN 0 WHEN 'medium' THEN 1 ELSE 2 END DESC, id DESC"
    )]
    #[case(SortField::Text, SortDirection::Asc, " ORDER BY text COLLATE \"C\" ASC, id ASC")]
    fn test_order_rendering(
        #[case] field: SortField,
        #[case] direction: SortDirection,
        #[case] expected: &str,
    ) {
        let mut builder = QueryBuilder::<Postgres>::new("");
        push_todo_order(&mut builder, SortOrder::new(field, direction));
        assert_eq!(builder.sql(), expected);
    }

    // -------------------------------------------------------------------------
    // Patch Rendering
    // -------------------------------------------------------------------------

    #[rstest]
    fn test_patch_assignments_include_cleared_fields() {
        let patch = TodoPatch {
            text: Some("renamed".to_string()),
            date: Some(None),
            priority: Some(Priority::High),
            ..TodoPatch::default()
        };
        let mut builder = QueryBuilder::<Postgres>::new("UPDATE todos SET updated_at = NOW()");

        push_todo_assignments(&mut builder, &patch);

        assert_eq!(
            builder.sql(),
            "UPDATE todos SET updated_at = NOW(), text = $1, due_date = $2, priority = $3"
        );
    }

    // -------------------------------------------------------------------------
    // Row Conversion
    // -------------------------------------------------------------------------

    #[rstest]
    fn test_todo_row_with_unknown_priority_is_rejected() {
        let row = TodoRow {
            id: 1,
            owner_id: Uuid::new_v4(),
            text: "a".to_string(),
            completed: false,
            due_date: None,
            due_time: None,
            category_id: None,
            note: None,
            repeat_rule: "none".to_string(),
            priority: "urgent".to_string(),
            position: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(matches!(
            Todo::try_from(row),
            Err(RepositoryError::SerializationError(_))
        ));
    }

    #[rstest]
    #[case(-1, 0)]
    #[case(0, 0)]
    #[case(42, 42)]
    fn test_to_count(#[case] value: i64, #[case] expected: u64) {
        assert_eq!(to_count(value), expected);
    }
}
