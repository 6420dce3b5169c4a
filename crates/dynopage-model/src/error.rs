//! Wire error vocabulary for the store protocol.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Error codes a store can answer with, plus the client-side transport code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreErrorCode {
    /// A conditional write's predicate did not hold.
    ConditionalCheckFailed,
    /// The named table does not exist.
    ResourceNotFound,
    /// The request shape or an expression was malformed.
    Validation,
    /// The request body could not be parsed.
    Serialization,
    /// The store throttled the request.
    Throttling,
    /// The store failed internally.
    InternalError,
    /// The request never reached the store (client-side transport failure).
    Connection,
}

impl StoreErrorCode {
    /// Fully qualified wire type string for this code.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::ConditionalCheckFailed => {
                "com.amazonaws.dynamodb.v20120810#ConditionalCheckFailedException"
            }
            Self::ResourceNotFound => {
                "com.amazonaws.dynamodb.v20120810#ResourceNotFoundException"
            }
            Self::Validation => "com.amazon.coral.validate#ValidationException",
            Self::Serialization => "com.amazon.coral.service#SerializationException",
            Self::Throttling => {
                "com.amazonaws.dynamodb.v20120810#ProvisionedThroughputExceededException"
            }
            Self::InternalError => "com.amazonaws.dynamodb.v20120810#InternalServerError",
            Self::Connection => "dynopage#ConnectionError",
        }
    }

    /// HTTP status the store pairs with this code.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::ConditionalCheckFailed
            | Self::ResourceNotFound
            | Self::Validation
            | Self::Serialization
            | Self::Throttling => 400,
            Self::InternalError => 500,
            Self::Connection => 0,
        }
    }
}

impl fmt::Display for StoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.error_type();
        f.write_str(name.split('#').next_back().unwrap_or(name))
    }
}

/// A wire-level failure reported by the store (or by the transport in front
/// of it).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct StoreError {
    /// What went wrong, in the store's vocabulary.
    pub code: StoreErrorCode,
    /// Human-readable detail.
    pub message: String,
}

impl StoreError {
    /// Build an error with an arbitrary code.
    #[must_use]
    pub fn new(code: StoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// A conditional write's predicate did not hold.
    #[must_use]
    pub fn conditional_check_failed(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::ConditionalCheckFailed, message)
    }

    /// The named table does not exist.
    #[must_use]
    pub fn resource_not_found(table: &str) -> Self {
        Self::new(
            StoreErrorCode::ResourceNotFound,
            format!("Requested resource not found: Table: {table} not found"),
        )
    }

    /// The request shape or an expression was malformed.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::Validation, message)
    }

    /// The request body could not be parsed.
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::Serialization, message)
    }

    /// The request never reached the store.
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::Connection, message)
    }

    /// The store failed internally.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::InternalError, message)
    }

    /// The error body as it travels on the wire.
    #[must_use]
    pub fn to_wire_body(&self) -> serde_json::Value {
        serde_json::json!({
            "__type": self.code.error_type(),
            "message": self.message,
        })
    }

    /// Whether this failure is a conditional-check rejection, the one wire
    /// error clients treat as a precondition outcome rather than a fault.
    #[must_use]
    pub fn is_conditional_check_failed(&self) -> bool {
        self.code == StoreErrorCode::ConditionalCheckFailed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_render_code_and_message() {
        let err = StoreError::conditional_check_failed("The conditional request failed");
        assert_eq!(
            err.to_string(),
            "ConditionalCheckFailedException: The conditional request failed"
        );
        assert!(err.is_conditional_check_failed());
    }

    #[test]
    fn test_should_emit_wire_body_with_fqn_type() {
        let err = StoreError::validation("Invalid UpdateExpression");
        let body = err.to_wire_body();
        assert_eq!(
            body["__type"],
            "com.amazon.coral.validate#ValidationException"
        );
        assert_eq!(body["message"], "Invalid UpdateExpression");
    }

    #[test]
    fn test_should_map_status_codes() {
        assert_eq!(StoreErrorCode::Validation.status_code(), 400);
        assert_eq!(StoreErrorCode::InternalError.status_code(), 500);
        assert_eq!(StoreErrorCode::Connection.status_code(), 0);
    }
}
