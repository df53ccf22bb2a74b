//! Data Transfer Objects for API requests and responses.
//!
//! Requests are parsed leniently (dates and enums arrive as strings) and
//! converted into domain drafts and patches, collecting every field error
//! instead of stopping at the first one.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::error::{FieldError, ValidationError};
use crate::domain::{
    Attachment, AttachmentId, Category, CategoryId, CategoryPatch, NewCategory, NewTodo, Priority,
    RepeatRule, Todo, TodoId, TodoPatch,
};

/// Maximum title length in characters.
pub const MAX_TEXT_LENGTH: usize = 500;
/// Maximum note length in characters.
pub const MAX_NOTE_LENGTH: usize = 5000;
/// Maximum category name length in characters.
pub const MAX_NAME_LENGTH: usize = 100;

// =============================================================================
// Envelopes
// =============================================================================

/// Success envelope: `{"data": ...}`.
#[derive(Debug, Clone, Serialize)]
pub struct Data<T> {
    pub data: T,
}

impl<T> Data<T> {
    #[must_use]
    pub const fn new(data: T) -> Self {
        Self { data }
    }
}

/// Acknowledgement for deletes and reorders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
    /// Rows changed by a reorder.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<u64>,
}

impl SuccessResponse {
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            success: true,
            updated: None,
        }
    }

    #[must_use]
    pub const fn updated(count: u64) -> Self {
        Self {
            success: true,
            updated: Some(count),
        }
    }
}

// =============================================================================
// Todo DTOs
// =============================================================================

/// Response DTO for a todo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoResponse {
    pub id: TodoId,
    pub text: String,
    pub completed: bool,
    /// `YYYY-MM-DD`.
    pub date: Option<String>,
    /// `HH:MM`.
    pub time: Option<String>,
    pub category_id: Option<CategoryId>,
    pub note: Option<String>,
    pub repeat: RepeatRule,
    pub priority: Priority,
    pub position: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Todo> for TodoResponse {
    fn from(todo: &Todo) -> Self {
        Self {
            id: todo.id,
            text: todo.text.clone(),
            completed: todo.completed,
            date: todo.date.map(format_date),
            time: todo.time.map(format_time),
            category_id: todo.category_id,
            note: todo.note.clone(),
            repeat: todo.repeat,
            priority: todo.priority,
            position: todo.position,
            created_at: todo.created_at,
            updated_at: todo.updated_at,
        }
    }
}

impl From<Todo> for TodoResponse {
    fn from(todo: Todo) -> Self {
        Self::from(&todo)
    }
}

/// Request DTO for creating a todo.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreateTodoRequest {
    pub text: String,
    pub completed: bool,
    pub date: Option<String>,
    pub time: Option<String>,
    pub category_id: Option<CategoryId>,
    pub note: Option<String>,
    pub repeat: Option<String>,
    pub priority: Option<String>,
    pub position: Option<i32>,
}

impl CreateTodoRequest {
    /// Validates the request and builds a draft.
    ///
    /// # Errors
    ///
    /// Returns every field that failed validation.
    pub fn into_draft(self) -> Result<NewTodo, ValidationError> {
        let mut errors = Vec::new();
        let text = collect(&mut errors, validate_text(&self.text));
        let date = collect(&mut errors, optional_date(self.date.as_deref()));
        let time = collect(&mut errors, optional_time(self.time.as_deref()));
        let note = collect(&mut errors, validate_note(self.note.as_deref()));
        let repeat = collect(&mut errors, optional_repeat(self.repeat.as_deref()));
        let priority = collect(&mut errors, optional_priority(self.priority.as_deref()));

        let draft = NewTodo {
            text: text.unwrap_or_default(),
            completed: self.completed,
            date: date.flatten(),
            time: time.flatten(),
            category_id: self.category_id,
            note: note.flatten(),
            repeat: repeat.flatten().unwrap_or_default(),
            priority: priority.flatten().unwrap_or_default(),
            position: self.position.unwrap_or_default(),
        };
        ValidationError::new(errors).into_result(draft)
    }
}

/// Request DTO for a partial todo update. `null` clears optional fields.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTodoRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub completed: Option<bool>,
    #[serde(default, deserialize_with = "deserialize_nullable")]
    pub date: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_nullable")]
    pub time: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_nullable")]
    pub category_id: Option<Option<CategoryId>>,
    #[serde(default, deserialize_with = "deserialize_nullable")]
    pub note: Option<Option<String>>,
    #[serde(default, deserialize_with = "deserialize_nullable")]
    pub repeat: Option<Option<String>>,
    #[serde(default)]
    pub priority: Option<String>,
    #[serde(default)]
    pub position: Option<i32>,
}

impl UpdateTodoRequest {
    /// Validates the request and builds a patch.
    ///
    /// # Errors
    ///
    /// Returns every field that failed validation.
    pub fn into_patch(self) -> Result<TodoPatch, ValidationError> {
        let mut errors = Vec::new();
        let text = self
            .text
            .and_then(|text| collect(&mut errors, validate_text(&text)));
        let date = self
            .date
            .and_then(|date| collect(&mut errors, optional_date(date.as_deref())));
        let time = self
            .time
            .and_then(|time| collect(&mut errors, optional_time(time.as_deref())));
        let note = self
            .note
            .and_then(|note| collect(&mut errors, validate_note(note.as_deref())));
        let repeat = self.repeat.and_then(|repeat| {
            collect(&mut errors, optional_repeat(repeat.as_deref()))
                .map(Option::unwrap_or_default)
        });
        let priority = self.priority.and_then(|priority| {
            collect(&mut errors, optional_priority(Some(&priority))).flatten()
        });

        let patch = TodoPatch {
            text,
            completed: self.completed,
            date,
            time,
            category_id: self.category_id,
            note,
            repeat,
            priority,
            position: self.position,
        };
        ValidationError::new(errors).into_result(patch)
    }
}

/// One entry of a reorder request.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ReorderItem {
    pub id: TodoId,
    pub position: i32,
}

/// Request DTO for `POST /todos-advanced/reorder`.
#[derive(Debug, Clone, Deserialize)]
pub struct ReorderRequest {
    pub items: Vec<ReorderItem>,
}

// =============================================================================
// Category DTOs
// =============================================================================

/// Response DTO for a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryResponse {
    pub id: CategoryId,
    pub name: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

impl From<Category> for CategoryResponse {
    fn from(category: Category) -> Self {
        Self {
            id: category.id,
            name: category.name,
            color: category.color,
            created_at: category.created_at,
        }
    }
}

/// Request DTO for creating a category.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub color: String,
}

impl CreateCategoryRequest {
    /// # Errors
    ///
    /// Returns every field that failed validation.
    pub fn into_draft(self) -> Result<NewCategory, ValidationError> {
        let mut errors = Vec::new();
        let name = collect(&mut errors, validate_name(&self.name));
        let color = collect(&mut errors, validate_color(&self.color));
        ValidationError::new(errors).into_result(NewCategory::new(
            name.unwrap_or_default(),
            color.unwrap_or_default(),
        ))
    }
}

/// Request DTO for a partial category update.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub color: Option<String>,
}

impl UpdateCategoryRequest {
    /// # Errors
    ///
    /// Returns every field that failed validation.
    pub fn into_patch(self) -> Result<CategoryPatch, ValidationError> {
        let mut errors = Vec::new();
        let name = self
            .name
            .and_then(|name| collect(&mut errors, validate_name(&name)));
        let color = self
            .color
            .and_then(|color| collect(&mut errors, validate_color(&color)));
        ValidationError::new(errors).into_result(CategoryPatch { name, color })
    }
}

// =============================================================================
// Attachment DTOs
// =============================================================================

/// Response DTO for an attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentResponse {
    pub id: AttachmentId,
    pub todo_id: TodoId,
    pub file_path: String,
    pub file_name: String,
    pub file_size: i64,
    pub file_type: String,
    pub created_at: DateTime<Utc>,
}

impl From<Attachment> for AttachmentResponse {
    fn from(attachment: Attachment) -> Self {
        Self {
            id: attachment.id,
            todo_id: attachment.todo_id,
            file_path: attachment.file_path,
            file_name: attachment.file_name,
            file_size: attachment.file_size,
            file_type: attachment.file_type,
            created_at: attachment.created_at,
        }
    }
}

// =============================================================================
// Parsing Helpers
// =============================================================================

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
fn deserialize_nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn collect<T>(errors: &mut Vec<FieldError>, result: Result<T, FieldError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(error) => {
            errors.push(error);
            None
        }
    }
}

/// Parses a `YYYY-MM-DD` calendar date.
#[must_use]
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").ok()
}

/// Parses an `HH:MM` or `HH:MM:SS` time of day.
#[must_use]
pub fn parse_time(value: &str) -> Option<NaiveTime> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

fn optional_date(value: Option<&str>) -> Result<Option<NaiveDate>, FieldError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => parse_date(raw)
            .map(Some)
            .ok_or_else(|| FieldError::new("date", format!("Invalid date: {raw}"))),
    }
}

fn optional_time(value: Option<&str>) -> Result<Option<NaiveTime>, FieldError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => parse_time(raw)
            .map(Some)
            .ok_or_else(|| FieldError::new("time", format!("Invalid time: {raw}"))),
    }
}

fn optional_priority(value: Option<&str>) -> Result<Option<Priority>, FieldError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|error: crate::domain::UnknownVariant| {
                FieldError::new("priority", error.to_string())
            }),
    }
}

fn optional_repeat(value: Option<&str>) -> Result<Option<RepeatRule>, FieldError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|error: crate::domain::UnknownVariant| {
                FieldError::new("repeat", error.to_string())
            }),
    }
}

fn validate_text(text: &str) -> Result<String, FieldError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(FieldError::new("text", "Text is required"));
    }
    if text.chars().count() > MAX_TEXT_LENGTH {
        return Err(FieldError::new(
            "text",
            format!("Text must not exceed {MAX_TEXT_LENGTH} characters"),
        ));
    }
    Ok(text.to_string())
}

/// Blank notes are stored as no note.
fn validate_note(note: Option<&str>) -> Result<Option<String>, FieldError> {
    let Some(note) = note.map(str::trim).filter(|note| !note.is_empty()) else {
        return Ok(None);
    };
    if note.chars().count() > MAX_NOTE_LENGTH {
        return Err(FieldError::new(
            "note",
            format!("Note must not exceed {MAX_NOTE_LENGTH} characters"),
        ));
    }
    Ok(Some(note.to_string()))
}

fn validate_name(name: &str) -> Result<String, FieldError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(FieldError::new("name", "Name is required"));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(FieldError::new(
            "name",
            format!("Name must not exceed {MAX_NAME_LENGTH} characters"),
        ));
    }
    Ok(name.to_string())
}

fn validate_color(color: &str) -> Result<String, FieldError> {
    let color = color.trim();
    if color.is_empty() {
        return Err(FieldError::new("color", "Color is required"));
    }
    Ok(color.to_string())
}

// =============================================================================
// Tests
// =============================================================================
