//! Infrastructure module for external services.
//!
//! Repositories (in-memory and `PostgreSQL`), object storage for attachment
//! content, bearer token authentication, the clock, and the factory that
//! wires them together from configuration.

pub mod auth;
pub mod clock;
pub mod factory;
pub mod in_memory;
pub mod postgres;
pub mod repository;
pub mod storage;

pub use auth::{
    AuthError, Authenticator, RemoteAuthenticator, StaticTokenAuthenticator, bearer_token,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use factory::{
    AuthMode, ConfigurationError, FactoryError, ObjectStorageMode, ServiceConfig, ServiceFactory,
    Services, StorageMode,
};
pub use in_memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use repository::{
    AttachmentRepository, CategoryRepository, PageWindow, PositionUpdate, RepositoryError,
    RepositoryResult, SortDirection, SortField, SortOrder, TodoFilter, TodoPredicate, TodoQuery,
    TodoRepository,
};
pub use storage::{InMemoryObjectStorage, LocalObjectStorage, ObjectStorage, StorageError};
