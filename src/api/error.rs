//! API error handling.
//!
//! Every failure leaves the service as `{"error": "<message>"}` with the
//! matching status code. Validation failures additionally carry
//! field-level `details`.

use axum::{
    Json,
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::infrastructure::{AuthError, RepositoryError, StorageError};

// =============================================================================
// API Error
// =============================================================================

/// API error structure for JSON responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Human-readable error message.
    pub error: String,
    /// Optional field-level errors for validation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

impl ApiError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            details: None,
        }
    }

    /// Creates a validation error with field-level details.
    #[must_use]
    pub fn validation(message: impl Into<String>, details: Vec<FieldError>) -> Self {
        Self {
            error: message.into(),
            details: Some(details),
        }
    }
}

/// Field-level error for validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Name of the field that failed validation.
    pub field: String,
    /// Error message for this field.
    pub message: String,
}

impl FieldError {
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

// =============================================================================
// API Error Response
// =============================================================================

/// API error response containing status code and error details.
#[derive(Debug, Clone)]
pub struct ApiErrorResponse {
    pub status: StatusCode,
    pub error: ApiError,
}

impl ApiErrorResponse {
    #[must_use]
    pub const fn new(status: StatusCode, error: ApiError) -> Self {
        Self { status, error }
    }

    /// 400 for malformed input and failed store operations.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ApiError::new(message))
    }

    /// 400 with field-level details.
    #[must_use]
    pub fn validation_error(message: impl Into<String>, details: Vec<FieldError>) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            ApiError::validation(message, details),
        )
    }

    #[must_use]
    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, ApiError::new("Unauthorized"))
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, ApiError::new(message))
    }

    #[must_use]
    pub fn method_not_allowed() -> Self {
        Self::new(
            StatusCode::METHOD_NOT_ALLOWED,
            ApiError::new("Method not allowed"),
        )
    }

    #[must_use]
    pub fn payload_too_large() -> Self {
        Self::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::new("Payload too large"),
        )
    }

    /// 504 when a request exceeds its deadline.
    #[must_use]
    pub fn timeout() -> Self {
        Self::new(
            StatusCode::GATEWAY_TIMEOUT,
            ApiError::new("Request timed out"),
        )
    }
}

impl IntoResponse for ApiErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.error)).into_response()
    }
}

impl From<RepositoryError> for ApiErrorResponse {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::NotFound(message) => Self::not_found(message),
            RepositoryError::DatabaseError(_)
            | RepositoryError::SerializationError(_)
            | RepositoryError::ConstraintViolation(_) => {
                tracing::warn!(%error, "Repository operation failed");
                Self::bad_request(error.to_string())
            }
        }
    }
}

impl From<StorageError> for ApiErrorResponse {
    fn from(error: StorageError) -> Self {
        tracing::warn!(%error, "Object storage operation failed");
        Self::bad_request(error.to_string())
    }
}

impl From<AuthError> for ApiErrorResponse {
    fn from(error: AuthError) -> Self {
        if let AuthError::ProviderUnavailable(_) = &error {
            tracing::warn!(%error, "Auth provider unavailable");
        }
        Self::unauthorized()
    }
}

// =============================================================================
// Extractor Rejections
// =============================================================================

fn rejection(status: StatusCode, message: String) -> ApiErrorResponse {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiErrorResponse::payload_too_large()
    } else {
        ApiErrorResponse::bad_request(message)
    }
}

impl From<JsonRejection> for ApiErrorResponse {
    fn from(error: JsonRejection) -> Self {
        rejection(error.status(), error.body_text())
    }
}

impl From<QueryRejection> for ApiErrorResponse {
    fn from(error: QueryRejection) -> Self {
        Self::bad_request(error.body_text())
    }
}

impl From<PathRejection> for ApiErrorResponse {
    fn from(error: PathRejection) -> Self {
        Self::bad_request(error.body_text())
    }
}

impl From<MultipartRejection> for ApiErrorResponse {
    fn from(error: MultipartRejection) -> Self {
        rejection(error.status(), error.body_text())
    }
}

impl From<MultipartError> for ApiErrorResponse {
    fn from(error: MultipartError) -> Self {
        rejection(error.status(), error.body_text())
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Field-level validation failures collected from one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    #[must_use]
    pub const fn new(errors: Vec<FieldError>) -> Self {
        Self { errors }
    }

    /// Creates a validation error with a single field error.
    #[must_use]
    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(vec![FieldError::new(field, message)])
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns `Ok(value)` if nothing was collected.
    ///
    /// # Errors
    ///
    /// Returns `self` if any field failed.
    pub fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for error in &self.errors {
            if !first {
                formatter.write_str("; ")?;
            }
            formatter.write_str(&error.message)?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for ApiErrorResponse {
    fn from(error: ValidationError) -> Self {
        Self::validation_error(error.to_string(), error.errors)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_api_error_serializes_without_details() {
        let json = serde_json::to_value(ApiError::new("Boom")).unwrap();
        assert_eq!(json, serde_json::json!({ "error": "Boom" }));
    }

    #[rstest]
    fn test_api_error_validation_serializes_details() {
        let error = ApiError::validation(
            "Text is required",
            vec![FieldError::new("text", "Text is required")],
        );
        let json = serde_json::to_value(error).unwrap();
        assert_eq!(json["details"][0]["field"], "text");
    }

    #[rstest]
    #[case(ApiErrorResponse::bad_request("x"), StatusCode::BAD_REQUEST)]
    #[case(ApiErrorResponse::unauthorized(), StatusCode::UNAUTHORIZED)]
    #[case(ApiErrorResponse::not_found("x"), StatusCode::NOT_FOUND)]
    #[case(ApiErrorResponse::method_not_allowed(), StatusCode::METHOD_NOT_ALLOWED)]
    #[case(ApiErrorResponse::payload_too_large(), StatusCode::PAYLOAD_TOO_LARGE)]
    #[case(ApiErrorResponse::timeout(), StatusCode::GATEWAY_TIMEOUT)]
    fn test_constructor_status(#[case] response: ApiErrorResponse, #[case] expected: StatusCode) {
        assert_eq!(response.status, expected);
    }

    #[rstest]
    #[case(RepositoryError::NotFound("todo 7".to_string()), StatusCode::NOT_FOUND)]
    #[case(RepositoryError::DatabaseError("connection reset".to_string()), StatusCode::BAD_REQUEST)]
    #[case(RepositoryError::ConstraintViolation("category 3".to_string()), StatusCode::BAD_REQUEST)]
    fn test_repository_error_status(#[case] error: RepositoryError, #[case] expected: StatusCode) {
        let response: ApiErrorResponse = error.into();
        assert_eq!(response.status, expected);
    }

    #[rstest]
    fn test_store_error_keeps_message() {
        let response: ApiErrorResponse =
            RepositoryError::DatabaseError("relation missing".to_string()).into();
        assert_eq!(response.error.error, "Database error: relation missing");
    }

    #[rstest]
    #[case(AuthError::MissingToken)]
    #[case(AuthError::InvalidToken)]
    #[case(AuthError::ProviderUnavailable("timeout".to_string()))]
    fn test_auth_error_is_unauthorized(#[case] error: AuthError) {
        let response: ApiErrorResponse = error.into();
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(response.error.error, "Unauthorized");
    }

    #[rstest]
    fn test_validation_error_joins_messages() {
        let error = ValidationError::new(vec![
            FieldError::new("page", "page must be a positive integer"),
            FieldError::new("limit", "limit must be a positive integer"),
        ]);
        let response: ApiErrorResponse = error.into();

        assert_eq!(response.status, StatusCode::BAD_REQUEST);
        assert_eq!(
            response.error.error,
            "page must be a positive integer; limit must be a positive integer"
        );
        assert_eq!(response.error.details.map(|details| details.len()), Some(2));
    }

    #[rstest]
    fn test_into_result() {
        assert_eq!(ValidationError::new(vec![]).into_result(5), Ok(5));
        assert!(ValidationError::single("a", "b").into_result(5).is_err());
    }
}
