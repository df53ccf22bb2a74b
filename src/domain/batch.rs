//! Batch operation vocabulary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Operation applied to every item of a batch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchOperation {
    Create,
    Update,
    Delete,
}

/// Error returned for an unrecognised batch operation tag.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid operation: {0}")]
pub struct InvalidOperation(pub String);

impl std::str::FromStr for BatchOperation {
    type Err = InvalidOperation;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(InvalidOperation(other.to_string())),
        }
    }
}

impl std::fmt::Display for BatchOperation {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        })
    }
}

/// Atomicity of batch updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchMode {
    /// All updates commit together or none do.
    #[default]
    AllOrNothing,
    /// Each update is applied independently; failures are reported per item.
    BestEffort,
}

impl std::str::FromStr for BatchMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().replace('-', "_").as_str() {
            "all_or_nothing" | "atomic" => Ok(Self::AllOrNothing),
            "best_effort" => Ok(Self::BestEffort),
            _ => Err(format!(
                "Invalid batch mode: '{value}'. Valid values are: all_or_nothing, best_effort"
            )),
        }
    }
}
