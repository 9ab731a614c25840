// Error taxonomy for the query mapping engine
//
// Fatal errors (validation, mapping) surface from the compile step before any
// I/O happens. Provider failures are wrapped with the name of the repository
// operation that issued the statement.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application error types
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Mapping error: {0}")]
    Mapping(String),

    #[error("Execution error in {operation}: {source}")]
    Execution {
        operation: String,
        #[source]
        source: Box<AppError>,
    },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Wrap a provider failure with the repository operation that caused it
    pub fn execution(operation: impl Into<String>, source: AppError) -> Self {
        AppError::Execution {
            operation: operation.into(),
            source: Box::new(source),
        }
    }

    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Mapping(_) => "MAPPING_ERROR",
            AppError::Execution { .. } => "EXECUTION_ERROR",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Connection(_) => "CONNECTION_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True for errors raised before a statement reaches a provider
    pub fn is_compile_error(&self) -> bool {
        matches!(self, AppError::Validation(_) | AppError::Mapping(_))
    }
}

/// Error report format for callers that surface errors as data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorDetail {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

impl From<&AppError> for ErrorDetail {
    fn from(err: &AppError) -> Self {
        match err {
            AppError::Execution { operation, source } => {
                ErrorDetail::new(err.code(), format!("Operation '{}' failed", operation))
                    .with_details(format!("{} ({})", source, source.code()))
            }
            other => ErrorDetail::new(other.code(), other.to_string()),
        }
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<tokio_postgres::Error> for AppError {
    fn from(err: tokio_postgres::Error) -> Self {
        let details = match err.as_db_error() {
            Some(db_error) => format!(
                "Code: {}, Message: {}",
                db_error.code().code(),
                db_error.message()
            ),
            None => err.to_string(),
        };
        AppError::Database(details)
    }
}

impl From<deadpool_postgres::PoolError> for AppError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        AppError::Connection(format!("Failed to get connection from pool: {}", err))
    }
}

impl From<mysql_async::Error> for AppError {
    fn from(err: mysql_async::Error) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}
