//! Category domain model.

use chrono::{DateTime, Utc};

use super::{OwnerId, row_id};

row_id!(
    /// Identifier of a category row.
    CategoryId
);

/// A named, coloured grouping of todos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: CategoryId,
    pub owner: OwnerId,
    pub name: String,
    /// Display colour, e.g. `#ff8800`.
    pub color: String,
    pub created_at: DateTime<Utc>,
}

impl Category {
    #[must_use]
    pub fn from_draft(
        id: CategoryId,
        owner: OwnerId,
        draft: NewCategory,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner,
            name: draft.name,
            color: draft.color,
            created_at: now,
        }
    }
}

/// A category that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCategory {
    pub name: String,
    pub color: String,
}

impl NewCategory {
    #[must_use]
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
        }
    }
}

/// Partial update of a category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub color: Option<String>,
}

impl CategoryPatch {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none() && self.color.is_none()
    }

    pub fn apply_to(&self, category: &mut Category) {
        if let Some(name) = &self.name {
            category.name.clone_from(name);
        }
        if let Some(color) = &self.color {
            category.color.clone_from(color);
        }
    }
}
