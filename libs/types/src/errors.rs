//! Error taxonomy for the exchange engine
//!
//! Four kinds of failure exist:
//! - validation: the operation itself is malformed,
//! - precondition: the operation is well formed but disallowed in the
//!   current chain state,
//! - overflow: arithmetic would exceed the platform share ceiling,
//! - internal: an invariant that must not fire in correct state did fire.
//!
//! Every error aborts the containing operation; the object-store checkpoint
//! rolls the state back so a failed operation has no effect.

use thiserror::Error;

/// Top-level engine error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MarketError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),

    #[error("internal invariant violated: {0}")]
    Internal(String),

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: String, available: String },

    #[error("insufficient price feeds to compute a median")]
    InsufficientFeeds,

    #[error("black swan detected during an operation which is not allowed to trigger one")]
    BlackSwanNotAllowed,
}

impl MarketError {
    /// Shorthand for a validation error with a formatted message.
    pub fn validation(msg: impl Into<String>) -> Self {
        MarketError::Validation(msg.into())
    }

    /// Shorthand for a precondition error with a formatted message.
    pub fn precondition(msg: impl Into<String>) -> Self {
        MarketError::Precondition(msg.into())
    }

    /// Shorthand for an internal-invariant error with a formatted message.
    pub fn internal(msg: impl Into<String>) -> Self {
        MarketError::Internal(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MarketError::Overflow("price multiplication");
        assert_eq!(err.to_string(), "arithmetic overflow in price multiplication");
    }

    #[test]
    fn test_insufficient_balance_fields() {
        let err = MarketError::InsufficientBalance {
            required: "100 of 1.3.0".to_string(),
            available: "40 of 1.3.0".to_string(),
        };
        assert!(err.to_string().contains("required 100"));
    }
}
