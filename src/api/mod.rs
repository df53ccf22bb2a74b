//! HTTP layer: routing, middleware, request/response types and handlers.

pub mod attachments;
pub mod bulk;
pub mod categories;
pub mod dto;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod query;
pub mod routes;
pub mod stats;
pub mod todos;

pub use bulk::{
    BatchError, BatchFailure, BatchOutcome, BatchRequest, BatchTable, CategoryTable, TodoTable,
    process_batch_operation,
};
pub use error::{ApiError, ApiErrorResponse, FieldError, ValidationError};
pub use handlers::{AppConfig, AppState, HealthResponse, health_check};
pub use query::{PaginationParams, SearchParams, SearchQuery, apply_pagination, apply_search};
pub use routes::build_router;
pub use stats::get_todo_stats;
