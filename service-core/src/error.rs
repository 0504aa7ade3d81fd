use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Stable machine-readable error codes surfaced to API clients.
///
/// Callers branch on these instead of parsing human-readable messages.
pub mod codes {
    pub const BAD_REQUEST: &str = "BAD_REQUEST";
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const CONFLICT: &str = "CONFLICT";
    pub const SESSION_NOT_ACTIVE: &str = "SESSION_NOT_ACTIVE";
    pub const DEBT_NOT_PENDING: &str = "DEBT_NOT_PENDING";
    pub const SHIFT_NOT_OPEN: &str = "SHIFT_NOT_OPEN";
    pub const SHIFT_ALREADY_OPEN: &str = "SHIFT_ALREADY_OPEN";
    pub const NO_SHIFT_OPEN: &str = "NO_SHIFT_OPEN";
    pub const SHIFT_HAS_OPERATIONS: &str = "SHIFT_HAS_OPERATIONS";
    pub const NO_APPLICABLE_RULE: &str = "NO_APPLICABLE_RULE";
    pub const PERSISTENCE_FAILURE: &str = "PERSISTENCE_FAILURE";
    pub const EXTERNAL_SERVICE_FAILURE: &str = "EXTERNAL_SERVICE_FAILURE";
    pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";
    pub const CONFIGURATION_ERROR: &str = "CONFIGURATION_ERROR";
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Conflict [{code}]: {message}")]
    Conflict { code: &'static str, message: String },

    #[error("No applicable pricing rule: {0}")]
    NoApplicableRule(String),

    #[error("Persistence error: {0}")]
    Persistence(anyhow::Error),

    #[error("External service error: {0}")]
    ExternalService(anyhow::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Configuration error: {0}")]
    Config(anyhow::Error),
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        AppError::BadRequest(anyhow::anyhow!(message.into()))
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        AppError::NotFound(anyhow::anyhow!(what.into()))
    }

    /// A state conflict with a stable code (shift already open, debt not
    /// pending, session not active, ...). Always surfaced as 409.
    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        AppError::Conflict {
            code,
            message: message.into(),
        }
    }

    /// The stable code reported in the response body for this error.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => codes::VALIDATION_FAILED,
            AppError::BadRequest(_) => codes::BAD_REQUEST,
            AppError::NotFound(_) => codes::NOT_FOUND,
            AppError::Conflict { code, .. } => code,
            AppError::NoApplicableRule(_) => codes::NO_APPLICABLE_RULE,
            AppError::Persistence(_) => codes::PERSISTENCE_FAILURE,
            AppError::ExternalService(_) => codes::EXTERNAL_SERVICE_FAILURE,
            AppError::Internal(_) => codes::INTERNAL_ERROR,
            AppError::Config(_) => codes::CONFIGURATION_ERROR,
        }
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Internal(anyhow::Error::new(err))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            code: &'static str,
            error: String,
            #[serde(skip_serializing_if = "Option::is_none")]
            details: Option<String>,
        }

        let code = self.code();
        let (status, error_message, details) = match self {
            AppError::Validation(err) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "Validation error".to_string(),
                Some(err.to_string()),
            ),
            AppError::BadRequest(err) => (StatusCode::BAD_REQUEST, err.to_string(), None),
            AppError::NotFound(err) => (StatusCode::NOT_FOUND, err.to_string(), None),
            AppError::Conflict { message, .. } => (StatusCode::CONFLICT, message, None),
            AppError::NoApplicableRule(msg) => (
                StatusCode::CONFLICT,
                format!("No applicable pricing rule: {}", msg),
                None,
            ),
            AppError::Persistence(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Persistence error".to_string(),
                Some(err.to_string()),
            ),
            AppError::ExternalService(err) => (
                StatusCode::BAD_GATEWAY,
                "External service error".to_string(),
                Some(err.to_string()),
            ),
            AppError::Internal(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                Some(format!("{:#?}", err)),
            ),
            AppError::Config(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Configuration error".to_string(),
                Some(err.to_string()),
            ),
        };

        (
            status,
            Json(ErrorResponse {
                code,
                error: error_message,
                details,
            }),
        )
            .into_response()
    }
}
