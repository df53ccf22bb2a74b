//! Repository traits for domain entities.
//!
//! Every method takes the caller's [`OwnerId`]; rows belonging to other
//! owners are invisible to reads and untouched by writes. Methods return
//! boxed futures so the traits stay object safe behind `Arc<dyn ..>`.

use std::cmp::Ordering;

use chrono::{NaiveDate, NaiveDateTime};
use futures::future::BoxFuture;
use thiserror::Error;

use crate::domain::{
    Attachment, AttachmentId, Category, CategoryId, CategoryPatch, NewAttachment, NewCategory,
    NewTodo, OwnerId, Priority, Todo, TodoId, TodoPatch,
};

// =============================================================================
// Repository Error
// =============================================================================

/// Errors that can occur during repository operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// Entity was not found.
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// Database connection or query error.
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// A stored value could not be decoded.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A referenced row does not exist for this owner.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

/// Result alias used by every repository method.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

// =============================================================================
// Todo Filter
// =============================================================================

/// A single narrowing condition on todos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TodoPredicate {
    /// Case-insensitive substring match on the title or the note.
    TextContains(String),
    Category(CategoryId),
    Completed(bool),
    Priority(Priority),
    /// Due date on or after the given day.
    DueOnOrAfter(NaiveDate),
    /// Due date on or before the given day.
    DueOnOrBefore(NaiveDate),
    DueOn(NaiveDate),
    /// Due date strictly after the given day.
    DueAfter(NaiveDate),
    /// Due moment strictly before the given instant. A date without a time
    /// is due at the end of its day.
    DueBefore(NaiveDateTime),
}

impl TodoPredicate {
    /// Evaluates the predicate against a stored todo.
    #[must_use]
    pub fn matches(&self, todo: &Todo) -> bool {
        match self {
            Self::TextContains(needle) => {
                let needle = needle.to_lowercase();
                todo.text.to_lowercase().contains(&needle)
                    || todo
                        .note
                        .as_deref()
                        .is_some_and(|note| note.to_lowercase().contains(&needle))
            }
            Self::Category(category_id) => todo.category_id == Some(*category_id),
            Self::Completed(completed) => todo.completed == *completed,
            Self::Priority(priority) => todo.priority == *priority,
            Self::DueOnOrAfter(day) => todo.date.is_some_and(|date| date >= *day),
            Self::DueOnOrBefore(day) => todo.date.is_some_and(|date| date <= *day),
            Self::DueOn(day) => todo.date == Some(*day),
            Self::DueAfter(day) => todo.date.is_some_and(|date| date > *day),
            Self::DueBefore(instant) => todo.date.is_some_and(|date| {
                date < instant.date()
                    || (date == instant.date()
                        && todo.time.is_some_and(|time| time < instant.time()))
            }),
        }
    }
}

/// Conjunction of predicates. The empty filter matches every todo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoFilter {
    predicates: Vec<TodoPredicate>,
}

impl TodoFilter {
    /// Creates a filter that matches every todo.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            predicates: Vec::new(),
        }
    }

    /// Adds a predicate.
    #[must_use]
    pub fn and(mut self, predicate: TodoPredicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Adds a predicate in place.
    pub fn push(&mut self, predicate: TodoPredicate) {
        self.predicates.push(predicate);
    }

    #[must_use]
    pub fn predicates(&self) -> &[TodoPredicate] {
        &self.predicates
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    #[must_use]
    pub fn matches(&self, todo: &Todo) -> bool {
        self.predicates.iter().all(|predicate| predicate.matches(todo))
    }

    /// Todos with the given completion state.
    #[must_use]
    pub fn completed(completed: bool) -> Self {
        Self::all().and(TodoPredicate::Completed(completed))
    }

    /// Incomplete todos whose due moment is before `now`.
    #[must_use]
    pub fn overdue(now: NaiveDateTime) -> Self {
        Self::completed(false).and(TodoPredicate::DueBefore(now))
    }

    /// Todos due on `today`, completed or not.
    #[must_use]
    pub fn due_on(today: NaiveDate) -> Self {
        Self::all().and(TodoPredicate::DueOn(today))
    }

    /// Incomplete todos due after `today`.
    #[must_use]
    pub fn upcoming(today: NaiveDate) -> Self {
        Self::completed(false).and(TodoPredicate::DueAfter(today))
    }
}

impl FromIterator<TodoPredicate> for TodoFilter {
    fn from_iter<I: IntoIterator<Item = TodoPredicate>>(iter: I) -> Self {
        Self {
            predicates: iter.into_iter().collect(),
        }
    }
}

// =============================================================================
// Ordering and Paging
// =============================================================================

/// Column a todo listing is ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortField {
    CreatedAt,
    UpdatedAt,
    /// Due date, then due time. Todos without a date sort last.
    Date,
    /// Priority rank, `low < medium < high`.
    Priority,
    Position,
    Text,
}

impl SortField {
    pub const ALL: [Self; 6] = [
        Self::CreatedAt,
        Self::UpdatedAt,
        Self::Date,
        Self::Priority,
        Self::Position,
        Self::Text,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::Date => "date",
            Self::Priority => "priority",
            Self::Position => "position",
            Self::Text => "text",
        }
    }
}

impl std::str::FromStr for SortField {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|field| field.as_str() == value)
            .ok_or_else(|| {
                format!(
                    "Invalid order field: '{value}'. Valid values are: created_at, updated_at, date, priority, position, text"
                )
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    #[must_use]
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    const fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Self::Asc => ordering,
            Self::Desc => ordering.reverse(),
        }
    }
}

impl std::str::FromStr for SortDirection {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            _ => Err(format!(
                "Invalid direction: '{value}'. Valid values are: asc, desc"
            )),
        }
    }
}

/// Ordering of a todo listing. Ties are broken by id in the same direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SortOrder {
    pub field: SortField,
    pub direction: SortDirection,
}

impl SortOrder {
    #[must_use]
    pub const fn new(field: SortField, direction: SortDirection) -> Self {
        Self { field, direction }
    }

    /// Newest first.
    #[must_use]
    pub const fn newest_first() -> Self {
        Self::new(SortField::CreatedAt, SortDirection::Desc)
    }

    /// Earliest due first.
    #[must_use]
    pub const fn earliest_due_first() -> Self {
        Self::new(SortField::Date, SortDirection::Asc)
    }

    /// Compares two todos under this ordering.
    #[must_use]
    pub fn compare(&self, left: &Todo, right: &Todo) -> Ordering {
        let direction = self.direction;
        let primary = match self.field {
            SortField::CreatedAt => direction.apply(left.created_at.cmp(&right.created_at)),
            SortField::UpdatedAt => direction.apply(left.updated_at.cmp(&right.updated_at)),
            SortField::Date => compare_nulls_last(left.date, right.date, direction)
                .then_with(|| compare_nulls_last(left.time, right.time, direction)),
            SortField::Priority => direction.apply(left.priority.cmp(&right.priority)),
            SortField::Position => direction.apply(left.position.cmp(&right.position)),
            // Byte order, matching `COLLATE "C"` in SQL.
            SortField::Text => direction.apply(left.text.cmp(&right.text)),
        };
        primary.then_with(|| direction.apply(left.id.cmp(&right.id)))
    }
}

impl Default for SortOrder {
    fn default() -> Self {
        Self::newest_first()
    }
}

fn compare_nulls_last<T: Ord>(
    left: Option<T>,
    right: Option<T>,
    direction: SortDirection,
) -> Ordering {
    match (left, right) {
        (Some(left), Some(right)) => direction.apply(left.cmp(&right)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// One page of a listing. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageWindow {
    pub page: u32,
    pub limit: u32,
}

impl PageWindow {
    /// Default page size.
    pub const DEFAULT_LIMIT: u32 = 10;
    /// Largest accepted page size.
    pub const MAX_LIMIT: u32 = 100;

    /// Creates a window, clamping `page` to at least 1 and `limit` to
    /// `1..=MAX_LIMIT`.
    #[must_use]
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, Self::MAX_LIMIT),
        }
    }

    /// Number of rows skipped before this page.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        (self.page as u64).saturating_sub(1) * self.limit as u64
    }

    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }
}

impl Default for PageWindow {
    fn default() -> Self {
        Self {
            page: 1,
            limit: Self::DEFAULT_LIMIT,
        }
    }
}

/// A complete todo listing request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoQuery {
    pub filter: TodoFilter,
    pub order: SortOrder,
    /// `None` returns every matching row.
    pub window: Option<PageWindow>,
}

impl TodoQuery {
    #[must_use]
    pub const fn new(filter: TodoFilter, order: SortOrder) -> Self {
        Self {
            filter,
            order,
            window: None,
        }
    }

    #[must_use]
    pub const fn paged(mut self, window: PageWindow) -> Self {
        self.window = Some(window);
        self
    }

    /// Applies filter, ordering and window to an in-memory row set.
    #[must_use]
    pub fn apply<'t>(&self, todos: impl IntoIterator<Item = &'t Todo>) -> Vec<Todo> {
        let mut selected: Vec<&Todo> = todos
            .into_iter()
            .filter(|todo| self.filter.matches(todo))
            .collect();
        selected.sort_by(|left, right| self.order.compare(left, right));
        let (skip, take) = self.window.map_or((0, usize::MAX), |window| {
            (
                usize::try_from(window.offset()).unwrap_or(usize::MAX),
                window.limit as usize,
            )
        });
        selected.into_iter().skip(skip).take(take).cloned().collect()
    }
}

/// New position for one todo in a reorder request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionUpdate {
    pub id: TodoId,
    pub position: i32,
}

// =============================================================================
// Todo Repository
// =============================================================================

/// Repository for todos.
pub trait TodoRepository: Send + Sync {
    /// Finds a todo by id.
    fn find<'a>(
        &'a self,
        owner: &'a OwnerId,
        id: TodoId,
    ) -> BoxFuture<'a, RepositoryResult<Option<Todo>>>;

    /// Lists todos matching the query's filter, ordered and windowed.
    fn list<'a>(
        &'a self,
        owner: &'a OwnerId,
        query: &'a TodoQuery,
    ) -> BoxFuture<'a, RepositoryResult<Vec<Todo>>>;

    /// Counts todos matching the filter.
    fn count<'a>(
        &'a self,
        owner: &'a OwnerId,
        filter: &'a TodoFilter,
    ) -> BoxFuture<'a, RepositoryResult<u64>>;

    /// Counts todos per priority. Priorities without todos are omitted.
    fn count_by_priority<'a>(
        &'a self,
        owner: &'a OwnerId,
    ) -> BoxFuture<'a, RepositoryResult<Vec<(Priority, u64)>>>;

    /// Counts todos per category name. Uncategorised todos are omitted.
    fn count_by_category<'a>(
        &'a self,
        owner: &'a OwnerId,
    ) -> BoxFuture<'a, RepositoryResult<Vec<(String, u64)>>>;

    /// Inserts every draft or none.
    ///
    /// # Errors
    ///
    /// `ConstraintViolation` if a draft references a category the owner
    /// does not have.
    fn insert_many<'a>(
        &'a self,
        owner: &'a OwnerId,
        drafts: Vec<NewTodo>,
    ) -> BoxFuture<'a, RepositoryResult<Vec<Todo>>>;

    /// Applies a patch. Returns `Ok(None)` if the todo does not exist.
    fn update<'a>(
        &'a self,
        owner: &'a OwnerId,
        id: TodoId,
        patch: &'a TodoPatch,
    ) -> BoxFuture<'a, RepositoryResult<Option<Todo>>>;

    /// Applies every patch or none.
    ///
    /// # Errors
    ///
    /// `NotFound` if any id does not exist; nothing is changed in that case.
    fn update_all<'a>(
        &'a self,
        owner: &'a OwnerId,
        patches: Vec<(TodoId, TodoPatch)>,
    ) -> BoxFuture<'a, RepositoryResult<Vec<Todo>>>;

    /// Deletes a todo. Returns `Ok(false)` if it did not exist.
    fn delete<'a>(
        &'a self,
        owner: &'a OwnerId,
        id: TodoId,
    ) -> BoxFuture<'a, RepositoryResult<bool>>;

    /// Deletes every listed todo that exists and returns the deleted rows.
    fn delete_many<'a>(
        &'a self,
        owner: &'a OwnerId,
        ids: &'a [TodoId],
    ) -> BoxFuture<'a, RepositoryResult<Vec<Todo>>>;

    /// Sets positions in one transaction and returns the number of rows changed.
    ///
    /// # Errors
    ///
    /// `NotFound` if any id does not exist; nothing is changed in that case.
    fn reorder<'a>(
        &'a self,
        owner: &'a OwnerId,
        positions: &'a [PositionUpdate],
    ) -> BoxFuture<'a, RepositoryResult<u64>>;

    /// Inserts a single todo.
    fn insert<'a>(
        &'a self,
        owner: &'a OwnerId,
        draft: NewTodo,
    ) -> BoxFuture<'a, RepositoryResult<Todo>> {
        Box::pin(async move {
            self.insert_many(owner, vec![draft])
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| RepositoryError::DatabaseError("insert returned no row".to_string()))
        })
    }
}

// =============================================================================
// Category Repository
// =============================================================================

/// Repository for categories.
pub trait CategoryRepository: Send + Sync {
    /// Lists the owner's categories ordered by name.
    fn list<'a>(&'a self, owner: &'a OwnerId) -> BoxFuture<'a, RepositoryResult<Vec<Category>>>;

    fn find<'a>(
        &'a self,
        owner: &'a OwnerId,
        id: CategoryId,
    ) -> BoxFuture<'a, RepositoryResult<Option<Category>>>;

    /// Inserts every draft or none.
    fn insert_many<'a>(
        &'a self,
        owner: &'a OwnerId,
        drafts: Vec<NewCategory>,
    ) -> BoxFuture<'a, RepositoryResult<Vec<Category>>>;

    fn update<'a>(
        &'a self,
        owner: &'a OwnerId,
        id: CategoryId,
        patch: &'a CategoryPatch,
    ) -> BoxFuture<'a, RepositoryResult<Option<Category>>>;

    /// Applies every patch or none.
    fn update_all<'a>(
        &'a self,
        owner: &'a OwnerId,
        patches: Vec<(CategoryId, CategoryPatch)>,
    ) -> BoxFuture<'a, RepositoryResult<Vec<Category>>>;

    /// Deletes a category. Todos referencing it lose their category.
    fn delete<'a>(
        &'a self,
        owner: &'a OwnerId,
        id: CategoryId,
    ) -> BoxFuture<'a, RepositoryResult<bool>>;

    fn delete_many<'a>(
        &'a self,
        owner: &'a OwnerId,
        ids: &'a [CategoryId],
    ) -> BoxFuture<'a, RepositoryResult<Vec<Category>>>;

    /// Inserts a single category.
    fn insert<'a>(
        &'a self,
        owner: &'a OwnerId,
        draft: NewCategory,
    ) -> BoxFuture<'a, RepositoryResult<Category>> {
        Box::pin(async move {
            self.insert_many(owner, vec![draft])
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| RepositoryError::DatabaseError("insert returned no row".to_string()))
        })
    }
}

// =============================================================================
// Attachment Repository
// =============================================================================

/// Repository for attachment metadata.
pub trait AttachmentRepository: Send + Sync {
    /// Lists a todo's attachments, newest first.
    fn list_for_todo<'a>(
        &'a self,
        owner: &'a OwnerId,
        todo_id: TodoId,
    ) -> BoxFuture<'a, RepositoryResult<Vec<Attachment>>>;

    fn find<'a>(
        &'a self,
        owner: &'a OwnerId,
        id: AttachmentId,
    ) -> BoxFuture<'a, RepositoryResult<Option<Attachment>>>;

    /// Records an uploaded file.
    ///
    /// # Errors
    ///
    /// `NotFound` if the owner has no todo with `draft.todo_id`.
    fn insert<'a>(
        &'a self,
        owner: &'a OwnerId,
        draft: NewAttachment,
    ) -> BoxFuture<'a, RepositoryResult<Attachment>>;

    fn delete<'a>(
        &'a self,
        owner: &'a OwnerId,
        id: AttachmentId,
    ) -> BoxFuture<'a, RepositoryResult<bool>>;
}

// =============================================================================
// Tests
// =============================================================================
