//! Error types for rqlorm

use std::time::Duration;
use thiserror::Error;

/// Result type alias for rqlorm operations
pub type RepoResult<T> = Result<T, RqlError>;

/// Error types for query compilation, execution and row decoding.
///
/// Every variant maps onto an HTTP-style status code and a short
/// machine-readable reason code; callers are expected to branch on
/// [`RqlError::reason`] rather than on the message text.
#[derive(Debug, Error)]
pub enum RqlError {
    /// The target type carries no usable table mapping
    #[error("Schema error: {0}")]
    Schema(String),

    /// Malformed caller input (unknown key field, empty key set, bad patch op)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An RQL field or sort key does not resolve against the mapping
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// A row value does not decode into the declared field representation
    #[error("Invalid data on column '{column}': {message}")]
    InvalidData { column: String, message: String },

    /// A row value cannot be cast to the declared column type
    #[error("Cast error on column '{column}': {message}")]
    InvalidCast { column: String, message: String },

    /// The underlying connection could not be established
    #[error("Connection error: {0}")]
    Connection(String),

    /// Operation timer elapsed before completion
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Database-level failure reported by the executor
    #[error("Database error: {0}")]
    Db(String),
}

impl RqlError {
    /// Create a schema error
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema(message.into())
    }

    /// Create a bad request error
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    /// Create an invalid operation error
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation(message.into())
    }

    /// Create an invalid data error for a specific column
    pub fn invalid_data(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidData {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a cast error for a specific column
    pub fn invalid_cast(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidCast {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a database error
    pub fn db(message: impl Into<String>) -> Self {
        Self::Db(message.into())
    }

    /// HTTP-style status code for this error
    pub fn status(&self) -> u16 {
        match self {
            Self::Schema(_)
            | Self::BadRequest(_)
            | Self::InvalidOperation(_)
            | Self::InvalidData { .. } => 400,
            Self::InvalidCast { .. }
            | Self::Connection(_)
            | Self::Timeout(_)
            | Self::Db(_) => 500,
        }
    }

    /// Machine-readable reason code for this error
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Schema(_) | Self::BadRequest(_) => "bad_request",
            Self::InvalidOperation(_) => "invalid_operation",
            Self::InvalidData { .. } => "bad_data",
            Self::Connection(_) => "connection_error",
            Self::InvalidCast { .. } | Self::Timeout(_) | Self::Db(_) => "exception",
        }
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Check if this error was caused by malformed caller input
    pub fn is_bad_request(&self) -> bool {
        matches!(self, Self::BadRequest(_) | Self::Schema(_))
    }

    /// Check if this is a row-decode error
    pub fn is_invalid_data(&self) -> bool {
        matches!(self, Self::InvalidData { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_are_stable() {
        assert_eq!(RqlError::bad_request("x").reason(), "bad_request");
        assert_eq!(RqlError::schema("x").reason(), "bad_request");
        assert_eq!(RqlError::invalid_operation("x").reason(), "invalid_operation");
        assert_eq!(RqlError::invalid_data("c", "x").reason(), "bad_data");
        assert_eq!(RqlError::connection("x").reason(), "connection_error");
        assert_eq!(RqlError::invalid_cast("c", "x").reason(), "exception");
        assert_eq!(RqlError::Timeout(Duration::from_secs(1)).reason(), "exception");
    }

    #[test]
    fn status_follows_category() {
        assert_eq!(RqlError::bad_request("x").status(), 400);
        assert_eq!(RqlError::invalid_data("c", "x").status(), 400);
        assert_eq!(RqlError::invalid_cast("c", "x").status(), 500);
        assert_eq!(RqlError::db("x").status(), 500);
    }
}
