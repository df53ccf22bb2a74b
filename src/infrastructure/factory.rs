//! Service configuration and wiring.
//!
//! [`ServiceConfig`] is read from environment variables (a `.env` file is
//! loaded by the binary first). [`ServiceFactory`] turns a validated
//! configuration into [`Services`]: the repositories, object storage,
//! authenticator and clock that handlers receive through `AppState`.
//!
//! # Environment Variables
//!
//! - `STORAGE_MODE`: `in_memory` (default) | `postgres`
//! - `DATABASE_URL`: required when `STORAGE_MODE=postgres`
//! - `DATABASE_MAX_CONNECTIONS`: pool size (default 10)
//! - `RUN_MIGRATIONS`: apply `migrations/` at startup (default `true`)
//! - `AUTH_MODE`: `static` (default) | `remote`
//! - `AUTH_URL`, `AUTH_API_KEY`: hosted auth provider for `remote`
//! - `STATIC_TOKENS`: `token=uuid,...` for `static`
//! - `OBJECT_STORAGE_MODE`: `in_memory` (default) | `local`
//! - `OBJECT_STORAGE_ROOT`: directory for `local` (default `./data/attachments`)
//! - `REQUEST_TIMEOUT_SECS`: per-request deadline (default 10)
//! - `BATCH_MODE`: `all_or_nothing` (default) | `best_effort`
//! - `MAX_BATCH_SIZE`: items per batch request (default 100)
//! - `MAX_UPLOAD_BYTES`: request body cap (default 10 MiB)

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use super::auth::{Authenticator, RemoteAuthenticator, StaticTokenAuthenticator};
use super::clock::{Clock, SystemClock};
use super::in_memory::InMemoryStore;
use super::postgres::PostgresStore;
use super::repository::{AttachmentRepository, CategoryRepository, TodoRepository};
use super::storage::{InMemoryObjectStorage, LocalObjectStorage, ObjectStorage};
use crate::domain::BatchMode;

// =============================================================================
// Configuration Types
// =============================================================================

/// Where rows are stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageMode {
    /// Process-local tables. Data is lost on restart.
    #[default]
    InMemory,
    Postgres,
}

impl FromStr for StorageMode {
    type Err = ConfigurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "in_memory" | "inmemory" | "memory" => Ok(Self::InMemory),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            _ => Err(ConfigurationError::InvalidStorageMode(value.to_string())),
        }
    }
}

/// How bearer tokens are resolved to owners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthMode {
    /// Fixed table from `STATIC_TOKENS`.
    #[default]
    Static,
    /// Hosted auth provider at `AUTH_URL`.
    Remote,
}

impl FromStr for AuthMode {
    type Err = ConfigurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "static" => Ok(Self::Static),
            "remote" | "hosted" => Ok(Self::Remote),
            _ => Err(ConfigurationError::InvalidAuthMode(value.to_string())),
        }
    }
}

/// Where attachment content is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectStorageMode {
    #[default]
    InMemory,
    /// Files below `OBJECT_STORAGE_ROOT`.
    Local,
}

impl FromStr for ObjectStorageMode {
    type Err = ConfigurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_lowercase().as_str() {
            "in_memory" | "inmemory" | "memory" => Ok(Self::InMemory),
            "local" | "filesystem" | "fs" => Ok(Self::Local),
            _ => Err(ConfigurationError::InvalidObjectStorageMode(value.to_string())),
        }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    pub storage_mode: StorageMode,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub run_migrations: bool,
    pub auth_mode: AuthMode,
    pub auth_url: Option<String>,
    pub auth_api_key: Option<String>,
    /// Raw `token=uuid,...` table.
    pub static_tokens: Option<String>,
    pub object_storage_mode: ObjectStorageMode,
    pub object_storage_root: PathBuf,
    pub request_timeout: Duration,
    pub batch_mode: BatchMode,
    pub max_batch_size: usize,
    pub max_upload_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            storage_mode: StorageMode::default(),
            database_url: None,
            database_max_connections: 10,
            run_migrations: true,
            auth_mode: AuthMode::default(),
            auth_url: None,
            auth_api_key: None,
            static_tokens: None,
            object_storage_mode: ObjectStorageMode::default(),
            object_storage_root: PathBuf::from("./data/attachments"),
            request_timeout: Duration::from_secs(10),
            batch_mode: BatchMode::default(),
            max_batch_size: 100,
            max_upload_bytes: 10 * 1024 * 1024,
        }
    }
}

impl ServiceConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if a value is malformed or a required
    /// value for the selected modes is missing.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|name| env::var(name))
    }

    /// Reads the configuration through `lookup`, which behaves like `env::var`.
    ///
    /// # Errors
    ///
    /// See [`ServiceConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let defaults = Self::default();
        let read = |name: &'static str| -> Result<Option<String>, ConfigurationError> {
            match lookup(name) {
                Ok(value) => {
                    let value = value.trim();
                    Ok((!value.is_empty()).then(|| value.to_string()))
                }
                Err(env::VarError::NotPresent) => Ok(None),
                Err(env::VarError::NotUnicode(_)) => Err(ConfigurationError::InvalidValue {
                    name,
                    value: "<non-UTF-8 value>".to_string(),
                }),
            }
        };
        fn parse_number(
            name: &'static str,
            raw: Option<String>,
        ) -> Result<Option<u64>, ConfigurationError> {
            raw.map(|value| {
                value
                    .parse::<u64>()
                    .map_err(|_| ConfigurationError::InvalidValue { name, value })
            })
            .transpose()
        }

        let storage_mode = read("STORAGE_MODE")?
            .map(|value| value.parse::<StorageMode>())
            .transpose()?
            .unwrap_or_default();
        let auth_mode = read("AUTH_MODE")?
            .map(|value| value.parse::<AuthMode>())
            .transpose()?
            .unwrap_or_default();
        let object_storage_mode = read("OBJECT_STORAGE_MODE")?
            .map(|value| value.parse::<ObjectStorageMode>())
            .transpose()?
            .unwrap_or_default();
        let batch_mode = match read("BATCH_MODE")? {
            Some(value) => value.parse::<BatchMode>().map_err(|_| {
                ConfigurationError::InvalidValue {
                    name: "BATCH_MODE",
                    value,
                }
            })?,
            None => defaults.batch_mode,
        };
        let run_migrations = match read("RUN_MIGRATIONS")? {
            Some(value) => match value.to_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => {
                    return Err(ConfigurationError::InvalidValue {
                        name: "RUN_MIGRATIONS",
                        value,
                    });
                }
            },
            None => defaults.run_migrations,
        };

        let database_max_connections =
            parse_number("DATABASE_MAX_CONNECTIONS", read("DATABASE_MAX_CONNECTIONS")?)?
                .map_or(Ok(defaults.database_max_connections), |value| {
                    u32::try_from(value).map_err(|_| ConfigurationError::InvalidValue {
                        name: "DATABASE_MAX_CONNECTIONS",
                        value: value.to_string(),
                    })
                })?;
        let request_timeout = parse_number("REQUEST_TIMEOUT_SECS", read("REQUEST_TIMEOUT_SECS")?)?
            .map_or(defaults.request_timeout, Duration::from_secs);
        let max_batch_size = parse_number("MAX_BATCH_SIZE", read("MAX_BATCH_SIZE")?)?
            .map_or(Ok(defaults.max_batch_size), usize::try_from)
            .map_err(|_| ConfigurationError::InvalidValue {
                name: "MAX_BATCH_SIZE",
                value: "out of range".to_string(),
            })?;
        let max_upload_bytes = parse_number("MAX_UPLOAD_BYTES", read("MAX_UPLOAD_BYTES")?)?
            .map_or(Ok(defaults.max_upload_bytes), usize::try_from)
            .map_err(|_| ConfigurationError::InvalidValue {
                name: "MAX_UPLOAD_BYTES",
                value: "out of range".to_string(),
            })?;

        let config = Self {
            storage_mode,
            database_url: read("DATABASE_URL")?,
            database_max_connections,
            run_migrations,
            auth_mode,
            auth_url: read("AUTH_URL")?,
            auth_api_key: read("AUTH_API_KEY")?,
            static_tokens: read("STATIC_TOKENS")?,
            object_storage_mode,
            object_storage_root: read("OBJECT_STORAGE_ROOT")?
                .map_or(defaults.object_storage_root, PathBuf::from),
            request_timeout,
            batch_mode,
            max_batch_size,
            max_upload_bytes,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError` if values required by the selected modes
    /// are missing or a limit is zero.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.storage_mode == StorageMode::Postgres && self.database_url.is_none() {
            return Err(ConfigurationError::MissingDatabaseUrl);
        }
        if self.auth_mode == AuthMode::Remote && self.auth_url.is_none() {
            return Err(ConfigurationError::MissingAuthUrl);
        }
        if self.auth_mode == AuthMode::Static {
            let table = self
                .static_tokens
                .as_deref()
                .ok_or(ConfigurationError::MissingStaticTokens)?;
            let authenticator = StaticTokenAuthenticator::parse(table)
                .map_err(ConfigurationError::InvalidStaticTokens)?;
            if authenticator.is_empty() {
                return Err(ConfigurationError::MissingStaticTokens);
            }
        }
        for (name, is_zero) in [
            ("DATABASE_MAX_CONNECTIONS", self.database_max_connections == 0),
            ("REQUEST_TIMEOUT_SECS", self.request_timeout.is_zero()),
            ("MAX_BATCH_SIZE", self.max_batch_size == 0),
            ("MAX_UPLOAD_BYTES", self.max_upload_bytes == 0),
        ] {
            if is_zero {
                return Err(ConfigurationError::InvalidValue {
                    name,
                    value: "0".to_string(),
                });
            }
        }
        Ok(())
    }
}

// =============================================================================
// Error Types
// =============================================================================

/// Errors in the service configuration.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Invalid storage mode: '{0}'. Expected 'in_memory' or 'postgres'")]
    InvalidStorageMode(String),

    #[error("Invalid auth mode: '{0}'. Expected 'static' or 'remote'")]
    InvalidAuthMode(String),

    #[error("Invalid object storage mode: '{0}'. Expected 'in_memory' or 'local'")]
    InvalidObjectStorageMode(String),

    #[error("Invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },

    #[error("DATABASE_URL environment variable is required when STORAGE_MODE=postgres")]
    MissingDatabaseUrl,

    #[error("AUTH_URL environment variable is required when AUTH_MODE=remote")]
    MissingAuthUrl,

    #[error("STATIC_TOKENS environment variable is required when AUTH_MODE=static")]
    MissingStaticTokens,

    #[error("Invalid STATIC_TOKENS: {0}")]
    InvalidStaticTokens(String),
}

/// Errors that can occur while wiring services.
#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Database connection error: {0}")]
    DatabaseConnection(String),

    #[error("Migration error: {0}")]
    Migration(String),
}

// =============================================================================
// Services
// =============================================================================

/// Every dependency a request handler may use.
#[derive(Clone)]
pub struct Services {
    pub todos: Arc<dyn TodoRepository>,
    pub categories: Arc<dyn CategoryRepository>,
    pub attachments: Arc<dyn AttachmentRepository>,
    pub object_storage: Arc<dyn ObjectStorage>,
    pub authenticator: Arc<dyn Authenticator>,
    pub clock: Arc<dyn Clock>,
}

impl Services {
    /// In-memory rows and objects, with the given authenticator and clock.
    #[must_use]
    pub fn in_memory(authenticator: Arc<dyn Authenticator>, clock: Arc<dyn Clock>) -> Self {
        let store = Arc::new(InMemoryStore::with_clock(Arc::clone(&clock)));
        Self {
            todos: store.clone(),
            categories: store.clone(),
            attachments: store,
            object_storage: Arc::new(InMemoryObjectStorage::new()),
            authenticator,
            clock,
        }
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Services")
            .field("todos", &"Arc<dyn TodoRepository>")
            .field("categories", &"Arc<dyn CategoryRepository>")
            .field("attachments", &"Arc<dyn AttachmentRepository>")
            .field("object_storage", &self.object_storage.backend_name())
            .field("authenticator", &"Arc<dyn Authenticator>")
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Service Factory
// =============================================================================

/// Builds [`Services`] from a [`ServiceConfig`].
#[derive(Debug, Clone)]
pub struct ServiceFactory {
    config: ServiceConfig,
}

impl ServiceFactory {
    #[must_use]
    pub const fn new(config: ServiceConfig) -> Self {
        Self { config }
    }

    /// Creates a factory from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `FactoryError::Configuration` if the environment is invalid.
    pub fn from_env() -> Result<Self, FactoryError> {
        let config = ServiceConfig::from_env()?;
        Ok(Self::new(config))
    }

    #[must_use]
    pub const fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Connects backends and wires every service.
    ///
    /// # Errors
    ///
    /// Returns `FactoryError` if the database cannot be reached or a
    /// migration fails.
    pub async fn create(&self) -> Result<Services, FactoryError> {
        self.config.validate()?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let (todos, categories, attachments): (
            Arc<dyn TodoRepository>,
            Arc<dyn CategoryRepository>,
            Arc<dyn AttachmentRepository>,
        ) = match self.config.storage_mode {
            StorageMode::InMemory => {
                let store = Arc::new(InMemoryStore::with_clock(Arc::clone(&clock)));
                (store.clone(), store.clone(), store)
            }
            StorageMode::Postgres => {
                let store = Arc::new(self.create_postgres_store().await?);
                (store.clone(), store.clone(), store)
            }
        };

        let object_storage: Arc<dyn ObjectStorage> = match self.config.object_storage_mode {
            ObjectStorageMode::InMemory => Arc::new(InMemoryObjectStorage::new()),
            ObjectStorageMode::Local => {
                Arc::new(LocalObjectStorage::new(&self.config.object_storage_root))
            }
        };

        let services = Services {
            todos,
            categories,
            attachments,
            object_storage,
            authenticator: self.create_authenticator()?,
            clock,
        };
        tracing::info!(
            storage_mode = ?self.config.storage_mode,
            auth_mode = ?self.config.auth_mode,
            object_storage = services.object_storage.backend_name(),
            "Services initialized"
        );
        Ok(services)
    }

    async fn create_postgres_store(&self) -> Result<PostgresStore, FactoryError> {
        let database_url = self
            .config
            .database_url
            .as_ref()
            .ok_or(ConfigurationError::MissingDatabaseUrl)?;

        let store = PostgresStore::connect(database_url, self.config.database_max_connections)
            .await
            .map_err(|error| FactoryError::DatabaseConnection(error.to_string()))?;

        if self.config.run_migrations {
            store
                .migrate()
                .await
                .map_err(|error| FactoryError::Migration(error.to_string()))?;
            tracing::info!("Database migrations applied");
        }
        Ok(store)
    }

    fn create_authenticator(&self) -> Result<Arc<dyn Authenticator>, ConfigurationError> {
        match self.config.auth_mode {
            AuthMode::Static => {
                let table = self
                    .config
                    .static_tokens
                    .as_deref()
                    .ok_or(ConfigurationError::MissingStaticTokens)?;
                let authenticator = StaticTokenAuthenticator::parse(table)
                    .map_err(ConfigurationError::InvalidStaticTokens)?;
                Ok(Arc::new(authenticator))
            }
            AuthMode::Remote => {
                let auth_url = self
                    .config
                    .auth_url
                    .as_ref()
                    .ok_or(ConfigurationError::MissingAuthUrl)?;
                Ok(Arc::new(RemoteAuthenticator::new(
                    auth_url.clone(),
                    self.config.auth_api_key.clone(),
                    self.config.request_timeout,
                )))
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
