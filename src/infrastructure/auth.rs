//! Bearer token authentication.
//!
//! Two implementations of [`Authenticator`] are provided: a remote one that
//! asks the hosted auth provider who a token belongs to, and a static token
//! table for tests and local development.

use std::collections::HashMap;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::OwnerId;

// =============================================================================
// Auth Error
// =============================================================================

/// Errors returned while resolving a bearer token.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing bearer token")]
    MissingToken,

    #[error("Invalid bearer token")]
    InvalidToken,

    /// The auth provider could not be reached or answered unexpectedly.
    #[error("Auth provider unavailable: {0}")]
    ProviderUnavailable(String),
}

// =============================================================================
// Authenticator Trait
// =============================================================================

/// Resolves a bearer token to the owner it was issued for.
pub trait Authenticator: Send + Sync {
    fn authenticate<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<OwnerId, AuthError>>;
}

// =============================================================================
// Remote Authenticator
// =============================================================================

#[derive(Debug, Deserialize)]
struct ProviderUser {
    id: Uuid,
}

/// Validates tokens against the hosted auth provider (`GET {base_url}/user`).
#[derive(Debug, Clone)]
pub struct RemoteAuthenticator {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl RemoteAuthenticator {
    #[must_use]
    pub fn new(base_url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> Self {
        let base_url: String = base_url.into();
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout,
        }
    }

    #[must_use]
    pub fn user_endpoint(&self) -> String {
        format!("{}/user", self.base_url)
    }
}

impl Authenticator for RemoteAuthenticator {
    fn authenticate<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<OwnerId, AuthError>> {
        Box::pin(async move {
            let mut request = self
                .client
                .get(self.user_endpoint())
                .bearer_auth(token)
                .timeout(self.timeout);
            if let Some(api_key) = &self.api_key {
                request = request.header("apikey", api_key);
            }

            let response = request.send().await.map_err(|error| {
                if error.is_timeout() {
                    AuthError::ProviderUnavailable(format!(
                        "timeout after {}ms",
                        self.timeout.as_millis()
                    ))
                } else {
                    AuthError::ProviderUnavailable(error.to_string())
                }
            })?;

            let status = response.status();
            if status == reqwest::StatusCode::UNAUTHORIZED
                || status == reqwest::StatusCode::FORBIDDEN
            {
                return Err(AuthError::InvalidToken);
            }
            if !status.is_success() {
                return Err(AuthError::ProviderUnavailable(format!("HTTP {status}")));
            }

            let user: ProviderUser = response
                .json()
                .await
                .map_err(|error| AuthError::ProviderUnavailable(error.to_string()))?;
            Ok(OwnerId::from_uuid(user.id))
        })
    }
}

// =============================================================================
// Static Token Authenticator
// =============================================================================

/// Fixed token table.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, OwnerId>,
}

impl StaticTokenAuthenticator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, owner: OwnerId) -> Self {
        self.tokens.insert(token.into(), owner);
        self
    }

    /// Parses a `token=uuid,token=uuid` table.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first malformed entry.
    pub fn parse(table: &str) -> Result<Self, String> {
        let mut authenticator = Self::new();
        for entry in table.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
            let (token, owner) = entry
                .split_once('=')
                .ok_or_else(|| format!("expected token=uuid, got '{entry}'"))?;
            let token = token.trim();
            if token.is_empty() {
                return Err(format!("empty token in '{entry}'"));
            }
            let owner: OwnerId = owner
                .parse()
                .map_err(|error| format!("invalid owner id in '{entry}': {error}"))?;
            authenticator.tokens.insert(token.to_string(), owner);
        }
        Ok(authenticator)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl Authenticator for StaticTokenAuthenticator {
    fn authenticate<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<OwnerId, AuthError>> {
        Box::pin(async move {
            self.tokens
                .get(token)
                .copied()
                .ok_or(AuthError::InvalidToken)
        })
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header value.
#[must_use]
pub fn bearer_token(header_value: &str) -> Option<&str> {
    let (scheme, token) = header_value.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

// =============================================================================
// Tests
// =============================================================================
