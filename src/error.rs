use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type Result<T, E = TrackingError> = std::result::Result<T, E>;

/// Tracking error taxonomy
///
/// The `Display` output is the bare message so that a message produced by the
/// server travels through the REST proxy unchanged.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrackingError {
    /// Malformed, oversized or conflicting input
    #[error("{0}")]
    InvalidParameter(String),
    /// Operation not legal for the entity's lifecycle stage or status
    #[error("{0}")]
    InvalidState(String),
    /// Unknown run or experiment
    #[error("{0}")]
    ResourceDoesNotExist(String),
    /// Unique name already taken
    #[error("{0}")]
    ResourceAlreadyExists(String),
    /// Transport or database connectivity failure; persistence outcome unknown
    #[error("{0}")]
    StoreUnavailable(String),
    /// Unexpected failure
    #[error("{0}")]
    Internal(String),
}

/// Structured error body exchanged on the wire
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error_code: String,
    pub message: String,
}

impl TrackingError {
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::ResourceDoesNotExist(message.into())
    }

    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::ResourceAlreadyExists(message.into())
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Wire name of the error code
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidParameter(_) => "INVALID_PARAMETER_VALUE",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::ResourceDoesNotExist(_) => "RESOURCE_DOES_NOT_EXIST",
            Self::ResourceAlreadyExists(_) => "RESOURCE_ALREADY_EXISTS",
            Self::StoreUnavailable(_) => "TEMPORARILY_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::InvalidParameter(m)
            | Self::InvalidState(m)
            | Self::ResourceDoesNotExist(m)
            | Self::ResourceAlreadyExists(m)
            | Self::StoreUnavailable(m)
            | Self::Internal(m) => m,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            Self::InvalidState(_) => StatusCode::BAD_REQUEST,
            Self::ResourceDoesNotExist(_) => StatusCode::NOT_FOUND,
            Self::ResourceAlreadyExists(_) => StatusCode::BAD_REQUEST,
            Self::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Rebuild an error from its wire representation.
    ///
    /// Unknown codes are kept visible in the message of an `Internal` error.
    pub fn from_wire(body: ErrorBody) -> Self {
        match body.error_code.as_str() {
            "INVALID_PARAMETER_VALUE" => Self::InvalidParameter(body.message),
            "INVALID_STATE" => Self::InvalidState(body.message),
            "RESOURCE_DOES_NOT_EXIST" => Self::ResourceDoesNotExist(body.message),
            "RESOURCE_ALREADY_EXISTS" => Self::ResourceAlreadyExists(body.message),
            "TEMPORARILY_UNAVAILABLE" => Self::StoreUnavailable(body.message),
            "INTERNAL_ERROR" => Self::Internal(body.message),
            other => Self::Internal(format!("{}: {}", other, body.message)),
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            error_code: self.error_code().to_string(),
            message: self.message().to_string(),
        }
    }

    /// Whether the caller cannot know if the write was persisted
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }
}

impl IntoResponse for TrackingError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error_code = self.error_code(), error = %self, "Request failed");
        } else {
            tracing::debug!(error_code = self.error_code(), error = %self, "Request rejected");
        }
        (status, Json(self.to_body())).into_response()
    }
}

impl From<sqlx::Error> for TrackingError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                Self::StoreUnavailable(format!("Database unavailable: {}", err))
            }
            // SQLITE_BUSY / SQLITE_LOCKED and their extended codes
            sqlx::Error::Database(ref db)
                if matches!(db.code().as_deref(), Some("5" | "6" | "261" | "262" | "517")) =>
            {
                Self::StoreUnavailable(format!("Database busy: {}", err))
            }
            other => Self::Internal(format!("Database error: {}", other)),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for TrackingError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Internal(format!("Database migration failed: {}", err))
    }
}

impl From<std::io::Error> for TrackingError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(format!("I/O error: {}", err))
    }
}

impl From<serde_json::Error> for TrackingError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidParameter(format!("Malformed JSON: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_is_bare_message() {
        let error = TrackingError::invalid_parameter("Invalid metric name: '../x'");
        assert_eq!(error.to_string(), "Invalid metric name: '../x'");
    }

    #[test]
    fn test_error_code_names() {
        assert_eq!(TrackingError::invalid_state("x").error_code(), "INVALID_STATE");
        assert_eq!(TrackingError::not_found("x").error_code(), "RESOURCE_DOES_NOT_EXIST");
        assert_eq!(TrackingError::unavailable("x").error_code(), "TEMPORARILY_UNAVAILABLE");
    }

    #[test]
    fn test_wire_round_trip_keeps_code_and_message() {
        let original = TrackingError::already_exists("Experiment 'a' already exists");
        assert_eq!(TrackingError::from_wire(original.to_body()), original);
    }

    #[test]
    fn test_unknown_wire_code_becomes_internal() {
        let error = TrackingError::from_wire(ErrorBody {
            error_code: "PERMISSION_DENIED".to_string(),
            message: "nope".to_string(),
        });
        assert_eq!(error, TrackingError::internal("PERMISSION_DENIED: nope"));
    }

    #[test]
    fn test_pool_timeout_is_unavailable() {
        let error: TrackingError = sqlx::Error::PoolTimedOut.into();
        assert!(error.is_unavailable());

        let error: TrackingError = sqlx::Error::RowNotFound.into();
        assert!(matches!(error, TrackingError::Internal(_)));
    }

    #[tokio::test]
    async fn test_error_response() {
        let response = TrackingError::not_found("Run with id=abc not found").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = TrackingError::unavailable("db down").into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
