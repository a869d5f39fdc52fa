//! # Error Handling for CRUD APIs
//!
//! Two error types live here:
//!
//! - [`QueryError`] describes why a query string could not be translated.
//!   It always becomes a `400 Bad Request`.
//! - [`ApiError`] is what every handler returns. It maps to an HTTP status,
//!   sends a sanitized message and logs internal details through `tracing`.
//!
//! **Never expose internal errors to users.** Driver errors are logged
//! server-side and replaced with a generic message.
//!
//! ```rust,ignore
//! use mongocrate::ApiError;
//!
//! async fn my_handler(State(db): State<Database>) -> Result<Json<Value>, ApiError> {
//!     let document = db
//!         .collection::<Document>("users")
//!         .find_one(doc! { "email": "a@b.c" })
//!         .await?
//!         .ok_or_else(|| ApiError::not_found("User", None))?;
//!     Ok(Json(render_document(document)))
//! }
//! ```

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use mongodb::error::{ErrorKind, WriteFailure};
use serde::Serialize;
use std::fmt;

use crate::validation::ValidationErrors;

/// Longest excerpt of user input echoed back in an error message.
const MAX_ECHO_LENGTH: usize = 64;

/// MongoDB server code for a unique index violation.
const DUPLICATE_KEY_CODE: i32 = 11000;

fn excerpt(value: &str) -> String {
    if value.chars().count() <= MAX_ECHO_LENGTH {
        value.to_string()
    } else {
        let cut: String = value.chars().take(MAX_ECHO_LENGTH).collect();
        format!("{cut}...")
    }
}

/// Reasons a query string cannot be translated into a database query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    /// A key nests deeper than `max_depth` while `strict_depth` is set
    TooDeep { key: String, max_depth: usize },
    /// The same key was used both as a value and as a container
    ConflictingShape { key: String },
    /// A field path is syntactically invalid
    InvalidField { field: String, reason: &'static str },
    /// A field is not exposed for the given parameter
    UnknownField { parameter: &'static str, field: String },
    /// A `$`-prefixed key is not a recognised operator
    UnknownOperator { field: String, operator: String },
    /// A value could not be coerced to the field's type
    InvalidValue {
        field: String,
        expected: &'static str,
        value: String,
    },
    /// A value is longer than the configured maximum
    ValueTooLong { field: String, max: usize },
    /// A sort direction is not one of `asc`, `desc`, `1`, `-1`
    InvalidSort { field: String, direction: String },
    /// A populate path does not name a declared reference
    UnknownPopulate { path: String },
    /// Populate paths nest deeper than `max_populate_depth`
    PopulateTooDeep { path: String, max_depth: usize },
    /// A top-level parameter has the wrong shape or value
    InvalidParameter { parameter: String, reason: String },
}

impl QueryError {
    pub(crate) fn invalid_value(
        field: impl Into<String>,
        expected: &'static str,
        value: &str,
    ) -> Self {
        Self::InvalidValue {
            field: field.into(),
            expected,
            value: excerpt(value),
        }
    }

    pub(crate) fn invalid_parameter(parameter: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooDeep { key, max_depth } => write!(
                f,
                "Query key '{}' is nested deeper than {max_depth} levels",
                excerpt(key)
            ),
            Self::ConflictingShape { key } => write!(
                f,
                "Query key '{}' is used both as a value and as an object",
                excerpt(key)
            ),
            Self::InvalidField { field, reason } => {
                write!(f, "Invalid field '{}': {reason}", excerpt(field))
            }
            Self::UnknownField { parameter, field } => write!(
                f,
                "Field '{}' cannot be used in '{parameter}'",
                excerpt(field)
            ),
            Self::UnknownOperator { field, operator } => write!(
                f,
                "Operator '{}' is not allowed on field '{}'",
                excerpt(operator),
                excerpt(field)
            ),
            Self::InvalidValue {
                field,
                expected,
                value,
            } => write!(
                f,
                "Invalid value '{value}' for field '{}': expected {expected}",
                excerpt(field)
            ),
            Self::ValueTooLong { field, max } => write!(
                f,
                "Value for '{}' exceeds {max} characters",
                excerpt(field)
            ),
            Self::InvalidSort { field, direction } => write!(
                f,
                "Invalid sort direction '{}' for field '{}'",
                excerpt(direction),
                excerpt(field)
            ),
            Self::UnknownPopulate { path } => {
                write!(f, "Path '{}' cannot be populated", excerpt(path))
            }
            Self::PopulateTooDeep { path, max_depth } => write!(
                f,
                "Populate path '{}' is nested deeper than {max_depth} levels",
                excerpt(path)
            ),
            Self::InvalidParameter { parameter, reason } => {
                write!(f, "Invalid '{}' parameter: {reason}", excerpt(parameter))
            }
        }
    }
}

impl std::error::Error for QueryError {}

/// API error type with automatic logging and sanitized responses
#[derive(Debug)]
pub enum ApiError {
    /// 404 Not Found - Resource doesn't exist
    NotFound {
        /// Resource type (e.g., "User", "Post")
        resource: String,
        /// Optional ID that wasn't found
        id: Option<String>,
    },

    /// 400 Bad Request - Invalid input from user
    BadRequest {
        /// User-facing error message
        message: String,
    },

    /// 409 Conflict - Resource conflict (e.g., duplicate key)
    Conflict {
        /// User-facing error message
        message: String,
    },

    /// 422 Unprocessable Entity - Validation failed
    ValidationFailed {
        /// User-facing validation errors
        errors: Vec<String>,
    },

    /// 500 Internal Server Error - Database error (details logged, not exposed)
    Database {
        /// User-facing generic message
        message: String,
        /// Internal error (logged, not sent to user)
        internal: mongodb::error::Error,
    },

    /// 500 Internal Server Error - Generic internal error
    Internal {
        /// User-facing generic message
        message: String,
        /// Internal error details (logged, not sent to user)
        internal: Option<String>,
    },

    /// Custom error with specific status code
    Custom {
        status: StatusCode,
        message: String,
        internal: Option<String>,
    },
}

impl ApiError {
    /// Create a 404 Not Found error
    pub fn not_found(resource: impl Into<String>, id: Option<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
            id,
        }
    }

    /// Create a 400 Bad Request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Create a 409 Conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    /// Create a 422 Validation Failed error
    #[must_use]
    pub fn validation_failed(errors: Vec<String>) -> Self {
        Self::ValidationFailed { errors }
    }

    /// Create a 500 Internal Server Error from a driver error
    ///
    /// The driver error details are logged but NOT sent to the user.
    #[must_use]
    pub fn database(err: mongodb::error::Error) -> Self {
        Self::Database {
            message: "A database error occurred".to_string(),
            internal: err,
        }
    }

    /// Create a 500 Internal Server Error with optional details
    pub fn internal(message: impl Into<String>, internal: Option<String>) -> Self {
        Self::Internal {
            message: message.into(),
            internal,
        }
    }

    /// Create a custom error with specific status code
    pub fn custom(status: StatusCode, message: impl Into<String>, internal: Option<String>) -> Self {
        Self::Custom {
            status,
            message: message.into(),
            internal,
        }
    }

    /// Get the HTTP status code for this error
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::ValidationFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Database { .. } | Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Custom { status, .. } => *status,
        }
    }

    /// Get the user-facing error message (sanitized)
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound { resource, id } => match id {
                Some(id) => format!("{resource} with ID '{}' not found", excerpt(id)),
                None => format!("{resource} not found"),
            },
            Self::ValidationFailed { errors } => {
                if errors.len() == 1 {
                    errors[0].clone()
                } else {
                    format!("Validation failed: {}", errors.join(", "))
                }
            }
            Self::BadRequest { message }
            | Self::Conflict { message }
            | Self::Database { message, .. }
            | Self::Internal { message, .. }
            | Self::Custom { message, .. } => message.clone(),
        }
    }

    /// Log internal error details (not sent to user)
    fn log_internal(&self) {
        match self {
            Self::Database { internal, .. } => {
                tracing::error!(error = ?internal, "Database error occurred");
            }
            Self::Internal {
                internal: Some(details),
                ..
            } => {
                tracing::error!(details = %details, "Internal error occurred");
            }
            Self::Custom {
                internal: Some(details),
                status,
                ..
            } => {
                tracing::error!(status = %status, details = %details, "Custom error occurred");
            }
            _ => {
                tracing::debug!(
                    error = %self.user_message(),
                    status = %self.status_code(),
                    "API error"
                );
            }
        }
    }
}

/// Error response sent to users (sanitized)
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Vec<String>>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log_internal();

        let status = self.status_code();
        let response = match &self {
            Self::ValidationFailed { errors } => ErrorResponse {
                error: "Validation failed".to_string(),
                details: Some(errors.clone()),
            },
            _ => ErrorResponse {
                error: self.user_message(),
                details: None,
            },
        };

        (status, Json(response)).into_response()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for ApiError {}

/// Duplicate key write errors become 409, everything else a logged 500.
impl From<mongodb::error::Error> for ApiError {
    fn from(err: mongodb::error::Error) -> Self {
        if let ErrorKind::Write(WriteFailure::WriteError(write_error)) = err.kind.as_ref()
            && write_error.code == DUPLICATE_KEY_CODE
        {
            tracing::debug!(error = ?err, "Duplicate key");
            return Self::conflict("Duplicate entry");
        }
        Self::database(err)
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        Self::bad_request(err.to_string())
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        Self::validation_failed(errors.errors().iter().map(ToString::to_string).collect())
    }
}

impl From<mongodb::bson::ser::Error> for ApiError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        Self::internal("Failed to encode document", Some(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::ValidationError;

    #[test]
    fn test_not_found_with_id() {
        let err = ApiError::not_found("User", Some("123".to_string()));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(err.user_message(), "User with ID '123' not found");
    }

    #[test]
    fn test_not_found_without_id() {
        let err = ApiError::not_found("User", None);
        assert_eq!(err.user_message(), "User not found");
    }

    #[test]
    fn test_not_found_truncates_long_id() {
        let err = ApiError::not_found("User", Some("x".repeat(500)));
        assert!(err.user_message().len() < 120);
        assert!(err.user_message().contains("..."));
    }

    #[test]
    fn test_validation_failed_messages() {
        let single = ApiError::validation_failed(vec!["Email is required".to_string()]);
        assert_eq!(single.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(single.user_message(), "Email is required");

        let many = ApiError::validation_failed(vec![
            "Email is required".to_string(),
            "Password too short".to_string(),
        ]);
        assert_eq!(
            many.user_message(),
            "Validation failed: Email is required, Password too short"
        );
    }

    #[test]
    fn test_internal_error_hides_details() {
        let err = ApiError::internal("Processing failed", Some("stack trace".to_string()));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.user_message(), "Processing failed");
    }

    #[test]
    fn test_database_error_is_sanitized() {
        let io = std::io::Error::other("connection reset by 10.0.0.3");
        let err = ApiError::from(mongodb::error::Error::from(io));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.user_message(), "A database error occurred");
        assert!(!err.to_string().contains("10.0.0.3"));
    }

    #[test]
    fn test_query_error_becomes_bad_request() {
        let err: ApiError = QueryError::UnknownOperator {
            field: "name".to_string(),
            operator: "$where".to_string(),
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.user_message(),
            "Operator '$where' is not allowed on field 'name'"
        );
    }

    #[test]
    fn test_query_error_value_is_truncated() {
        let err = QueryError::invalid_value("age", "an integer", &"9".repeat(1000));
        let message = err.to_string();
        assert!(message.len() < 200, "message too long: {}", message.len());
    }

    #[test]
    fn test_validation_errors_conversion() {
        let mut errors = ValidationErrors::new();
        errors.add(ValidationError::new("name", "This field is required"));
        let err: ApiError = errors.into();
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.user_message(), "name: This field is required");
    }

    #[test]
    fn test_custom_status() {
        let err = ApiError::custom(StatusCode::TOO_MANY_REQUESTS, "Slow down", None);
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(format!("{err}"), "Slow down");
    }
}
