//! Todo domain model.
//!
//! A todo is owned by exactly one user and carries an optional schedule
//! (due date, time of day, repeat rule). The due-date classification used
//! by the overdue/today/upcoming views and by the statistics lives here so
//! that every store evaluates it the same way.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{CategoryId, OwnerId, row_id};

row_id!(
    /// Identifier of a todo row.
    TodoId
);

// =============================================================================
// Enumerations
// =============================================================================

/// Error returned when a textual enumeration value is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid {kind}: {value}")]
pub struct UnknownVariant {
    /// Name of the enumeration, e.g. `priority`.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

/// Priority of a todo.
///
/// Ordered by rank: `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Low priority (rank 0).
    Low,
    /// Medium priority (rank 1).
    #[default]
    Medium,
    /// High priority (rank 2).
    High,
}

impl Priority {
    /// All priorities in rank order.
    pub const ALL: [Self; 3] = [Self::Low, Self::Medium, Self::High];

    /// Returns the numeric rank of the priority.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Low => 0,
            Self::Medium => 1,
            Self::High => 2,
        }
    }

    /// Returns the stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|priority| priority.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| UnknownVariant {
                kind: "priority",
                value: value.to_string(),
            })
    }
}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.rank().cmp(&other.rank())
    }
}

/// Repeat rule of a todo. Stored only; nothing schedules repetitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatRule {
    /// Does not repeat.
    #[default]
    None,
    /// Repeats every day.
    Daily,
    /// Repeats every week.
    Weekly,
    /// Repeats every month.
    Monthly,
}

impl RepeatRule {
    const ALL: [Self; 4] = [Self::None, Self::Daily, Self::Weekly, Self::Monthly];

    /// Returns the stored representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }
}

impl std::fmt::Display for RepeatRule {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl std::str::FromStr for RepeatRule {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|rule| rule.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| UnknownVariant {
                kind: "repeat",
                value: value.to_string(),
            })
    }
}

// =============================================================================
// Todo
// =============================================================================

/// A persisted todo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Todo {
    pub id: TodoId,
    pub owner: OwnerId,
    /// Title of the todo.
    pub text: String,
    pub completed: bool,
    /// Calendar date the todo is due on.
    pub date: Option<NaiveDate>,
    /// Time of day the todo is due at. Only meaningful with a date.
    pub time: Option<NaiveTime>,
    pub category_id: Option<CategoryId>,
    /// Free-text description.
    pub note: Option<String>,
    pub repeat: RepeatRule,
    pub priority: Priority,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Todo {
    /// Materialises a draft as a stored row.
    #[must_use]
    pub fn from_draft(id: TodoId, owner: OwnerId, draft: NewTodo, now: DateTime<Utc>) -> Self {
        Self {
            id,
            owner,
            text: draft.text,
            completed: draft.completed,
            date: draft.date,
            time: draft.time,
            category_id: draft.category_id,
            note: draft.note,
            repeat: draft.repeat,
            priority: draft.priority,
            position: draft.position,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the exact due moment when both date and time are set.
    #[must_use]
    pub fn due_moment(&self) -> Option<NaiveDateTime> {
        self.date.zip(self.time).map(|(date, time)| date.and_time(time))
    }

    /// Returns `true` if the todo is incomplete and its due moment has passed.
    ///
    /// A todo with only a date is due at the end of that day, so it becomes
    /// overdue once its date is strictly before the date of `now`.
    #[must_use]
    pub fn is_overdue_at(&self, now: NaiveDateTime) -> bool {
        if self.completed {
            return false;
        }
        match (self.date, self.time) {
            (Some(date), Some(time)) => date.and_time(time) < now,
            (Some(date), None) => date < now.date(),
            (None, _) => false,
        }
    }

    /// Returns `true` if the todo is due on `day`, completed or not.
    #[must_use]
    pub fn is_due_on(&self, day: NaiveDate) -> bool {
        self.date == Some(day)
    }

    /// Returns `true` if the todo is incomplete and due after `today`.
    #[must_use]
    pub fn is_upcoming_after(&self, today: NaiveDate) -> bool {
        !self.completed && self.date.is_some_and(|date| date > today)
    }
}

/// A todo that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTodo {
    pub text: String,
    pub completed: bool,
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub category_id: Option<CategoryId>,
    pub note: Option<String>,
    pub repeat: RepeatRule,
    pub priority: Priority,
    pub position: i32,
}

impl NewTodo {
    /// Creates an incomplete, unscheduled draft with default priority.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            completed: false,
            date: None,
            time: None,
            category_id: None,
            note: None,
            repeat: RepeatRule::None,
            priority: Priority::Medium,
            position: 0,
        }
    }

    #[must_use]
    pub const fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    #[must_use]
    pub const fn with_time(mut self, time: NaiveTime) -> Self {
        self.time = Some(time);
        self
    }

    #[must_use]
    pub const fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    #[must_use]
    pub const fn with_category(mut self, category_id: CategoryId) -> Self {
        self.category_id = Some(category_id);
        self
    }

    #[must_use]
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    #[must_use]
    pub const fn completed(mut self) -> Self {
        self.completed = true;
        self
    }
}

/// Partial update of a todo.
///
/// `None` leaves a field untouched. For nullable fields `Some(None)` clears
/// the stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoPatch {
    pub text: Option<String>,
    pub completed: Option<bool>,
    pub date: Option<Option<NaiveDate>>,
    pub time: Option<Option<NaiveTime>>,
    pub category_id: Option<Option<CategoryId>>,
    pub note: Option<Option<String>>,
    pub repeat: Option<RepeatRule>,
    pub priority: Option<Priority>,
    pub position: Option<i32>,
}

impl TodoPatch {
    /// Returns `true` if the patch changes nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.text.is_none()
            && self.completed.is_none()
            && self.date.is_none()
            && self.time.is_none()
            && self.category_id.is_none()
            && self.note.is_none()
            && self.repeat.is_none()
            && self.priority.is_none()
            && self.position.is_none()
    }

    /// Applies the patch in place and stamps `updated_at`.
    pub fn apply_to(&self, todo: &mut Todo, now: DateTime<Utc>) {
        if let Some(text) = &self.text {
            todo.text.clone_from(text);
        }
        if let Some(completed) = self.completed {
            todo.completed = completed;
        }
        if let Some(date) = self.date {
            todo.date = date;
        }
        if let Some(time) = self.time {
            todo.time = time;
        }
        if let Some(category_id) = self.category_id {
            todo.category_id = category_id;
        }
        if let Some(note) = &self.note {
            todo.note.clone_from(note);
        }
        if let Some(repeat) = self.repeat {
            todo.repeat = repeat;
        }
        if let Some(priority) = self.priority {
            todo.priority = priority;
        }
        if let Some(position) = self.position {
            todo.position = position;
        }
        todo.updated_at = now;
    }
}
