//! Domain module for the to-do service.
//!
//! This module contains domain models, value objects, and the pure rules
//! (due-date classification, batch policies) that the API layer composes.

pub mod attachment;
pub mod batch;
pub mod category;
pub mod owner;
pub mod stats;
pub mod todo;

pub use attachment::{Attachment, AttachmentId, NewAttachment, storage_path};
pub use batch::{BatchMode, BatchOperation, InvalidOperation};
pub use category::{Category, CategoryId, CategoryPatch, NewCategory};
pub use owner::OwnerId;
pub use stats::{StatsParts, TodoStats};
pub use todo::{NewTodo, Priority, RepeatRule, Todo, TodoId, TodoPatch, UnknownVariant};

/// Declares an integer row identifier newtype.
///
/// Row identifiers are assigned by the store and are only meaningful
/// together with the owner that created the row.
macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
            Hash,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(i64);

        impl $name {
            /// Wraps a raw row identifier.
            #[must_use]
            pub const fn new(value: i64) -> Self {
                Self(value)
            }

            /// Returns the raw row identifier.
            #[must_use]
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }
    };
}

pub(crate) use row_id;
