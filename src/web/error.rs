//! API error handling.
//!
//! Errors are rendered in the same `{code, message, data}` envelope as
//! successful responses, with `code` repeating the HTTP status.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::DepotError;

/// API error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Bad request (400).
    BadRequest,
    /// Unauthorized (401).
    Unauthorized,
    /// Forbidden (403).
    Forbidden,
    /// Not found (404).
    NotFound,
    /// Conflict (409).
    Conflict,
    /// Gone (410).
    Gone,
    /// Payload too large (413).
    PayloadTooLarge,
    /// Too many requests (429).
    TooManyRequests,
    /// Internal server error (500).
    InternalError,
}

impl ErrorCode {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::Gone => StatusCode::GONE,
            ErrorCode::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// HTTP status code.
    pub code: u16,
    /// Human-readable message.
    pub message: String,
    /// Extra detail, `null` when there is none.
    pub data: Value,
}

/// API error type.
#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    message: String,
    data: Option<Value>,
    retry_after: Option<u64>,
}

impl ApiError {
    /// Create a new API error.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
            retry_after: None,
        }
    }

    /// Attach structured detail rendered as `data`.
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// The error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// The client-facing message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Create a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    /// Create an unauthorized error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// Create a forbidden error.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// Create a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Create a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// Create a gone error.
    pub fn gone(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Gone, message)
    }

    /// Create a too-many-requests error with a `Retry-After` hint.
    pub fn too_many_requests(message: impl Into<String>, retry_after_secs: u64) -> Self {
        let mut err = Self::new(ErrorCode::TooManyRequests, message)
            .with_data(json!({ "retryAfter": retry_after_secs }));
        err.retry_after = Some(retry_after_secs);
        err
    }

    /// Create an internal server error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Create a validation error with field-level details.
    pub fn validation(details: HashMap<String, Vec<String>>) -> Self {
        Self::bad_request("Validation failed").with_data(json!({ "fields": details }))
    }

    /// Create a validation error from validator::ValidationErrors.
    pub fn from_validation_errors(errors: validator::ValidationErrors) -> Self {
        let mut details: HashMap<String, Vec<String>> = HashMap::new();

        for (field, field_errors) in errors.field_errors() {
            let messages: Vec<String> = field_errors
                .iter()
                .map(|e| {
                    e.message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| format!("Invalid value for {}", field))
                })
                .collect();
            details.insert(field.to_string(), messages);
        }

        Self::validation(details)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.status_code();
        let body = ErrorBody {
            code: status.as_u16(),
            message: self.message,
            data: self.data.unwrap_or(Value::Null),
        };
        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = self.retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<DepotError> for ApiError {
    fn from(err: DepotError) -> Self {
        match err {
            DepotError::Auth(msg) => ApiError::unauthorized(msg),
            DepotError::NotFound(ref what) => ApiError::not_found(format!("{what} not found")),
            DepotError::Validation(msg) => ApiError::bad_request(msg),
            DepotError::Permission(msg) => ApiError::forbidden(msg),
            DepotError::FeatureDisabled(ref feature) => {
                ApiError::bad_request(format!("{feature} is disabled"))
            }
            DepotError::RateLimited { retry_after_secs } => ApiError::too_many_requests(
                format!("Too many requests, retry in {retry_after_secs}s"),
                retry_after_secs,
            ),
            DepotError::TokenInvalid => ApiError::unauthorized("Download token is invalid or expired"),
            DepotError::TokenFileMismatch => {
                ApiError::forbidden("Download token does not match this file")
            }
            DepotError::TokenAlreadyUsed => ApiError::gone("Download token has already been used"),
            DepotError::MergeInProgress(_) => {
                ApiError::conflict("A merge is already in progress for this upload")
            }
            DepotError::IncompleteUpload { missing } => {
                ApiError::bad_request("Upload is incomplete")
                    .with_data(json!({ "missingChunks": missing }))
            }
            DepotError::Database(_) | DepotError::Io(_) | DepotError::Config(_) => {
                tracing::error!("Internal error: {}", err);
                ApiError::internal("An internal error occurred")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_status() {
        assert_eq!(ErrorCode::BadRequest.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ErrorCode::Unauthorized.status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ErrorCode::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::Conflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::Gone.status_code(), StatusCode::GONE);
        assert_eq!(
            ErrorCode::TooManyRequests.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ErrorCode::InternalError.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_depot_error_mapping() {
        let cases = [
            (DepotError::Auth("x".into()), ErrorCode::Unauthorized),
            (DepotError::Permission("x".into()), ErrorCode::Forbidden),
            (DepotError::NotFound("File".into()), ErrorCode::NotFound),
            (DepotError::Validation("x".into()), ErrorCode::BadRequest),
            (DepotError::FeatureDisabled("x".into()), ErrorCode::BadRequest),
            (DepotError::TokenInvalid, ErrorCode::Unauthorized),
            (DepotError::TokenFileMismatch, ErrorCode::Forbidden),
            (DepotError::TokenAlreadyUsed, ErrorCode::Gone),
            (DepotError::MergeInProgress("u".into()), ErrorCode::Conflict),
            (DepotError::Database("x".into()), ErrorCode::InternalError),
        ];
        for (err, code) in cases {
            assert_eq!(ApiError::from(err).code(), code);
        }
    }

    #[test]
    fn test_internal_errors_are_not_leaked() {
        let err = ApiError::from(DepotError::Database("secret table name".into()));
        assert_eq!(err.message(), "An internal error occurred");
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = ApiError::from(DepotError::RateLimited {
            retry_after_secs: 17,
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "17");
    }

    #[test]
    fn test_incomplete_upload_lists_missing_chunks() {
        let err = ApiError::from(DepotError::IncompleteUpload {
            missing: vec![1, 4],
        });
        assert_eq!(err.code(), ErrorCode::BadRequest);
        assert_eq!(err.data, Some(json!({ "missingChunks": [1, 4] })));
    }
}
