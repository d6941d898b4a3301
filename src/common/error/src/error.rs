//! Core error types for Quill.

use thiserror::Error;

/// Result type alias using `QuillError`.
pub type QuillResult<T> = std::result::Result<T, QuillError>;

/// Error type for expression construction, simplification and evaluation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum QuillError {
    /// An expression was built with operands of the wrong type.
    #[error("TypeError: {0}")]
    TypeError(String),

    /// A recognized query shape has a sub-case that is not implemented.
    #[error("UnsupportedShape: {0}")]
    UnsupportedShape(String),

    /// A rewrite produced a tree that breaks one of its own invariants.
    #[error("InvariantViolation: {0}")]
    InvariantViolation(String),

    /// No queryable operator matches an in-memory sequence operator.
    #[error("NoEquivalentOperator: {0}")]
    NoEquivalentOperator(String),

    /// The metadata catalog could not resolve a mapped type.
    #[error("MetadataError: {0}")]
    MetadataError(String),

    /// In-memory evaluation failed.
    #[error("EvaluationError: {0}")]
    EvaluationError(String),

    /// Invalid parameter provided.
    #[error("InvalidParameter: {0}")]
    InvalidParameter(String),

    /// Internal error (bug in Quill).
    #[error("InternalError: {0}")]
    InternalError(String),

    /// JSON serialization error.
    #[error("SerdeJsonError: {0}")]
    SerdeJsonError(#[from] serde_json::Error),
}

impl QuillError {
    /// Create a new `TypeError`.
    pub fn type_error<S: Into<String>>(msg: S) -> Self {
        Self::TypeError(msg.into())
    }

    /// Create a new `UnsupportedShape` error.
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        Self::UnsupportedShape(msg.into())
    }

    /// Create a new `InvariantViolation` error.
    pub fn invariant<S: Into<String>>(msg: S) -> Self {
        Self::InvariantViolation(msg.into())
    }

    /// Create a new `NoEquivalentOperator` error.
    pub fn no_equivalent_operator<S: Into<String>>(msg: S) -> Self {
        Self::NoEquivalentOperator(msg.into())
    }

    /// Create a new `MetadataError`.
    pub fn metadata<S: Into<String>>(msg: S) -> Self {
        Self::MetadataError(msg.into())
    }

    /// Create a new `EvaluationError`.
    pub fn evaluation<S: Into<String>>(msg: S) -> Self {
        Self::EvaluationError(msg.into())
    }

    /// Create a new `InvalidParameter` error.
    pub fn invalid_parameter<S: Into<String>>(msg: S) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Create a new `InternalError`.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::InternalError(msg.into())
    }

    /// Whether this error marks a query shape the simplifier refuses to handle.
    pub const fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedShape(_))
    }
}

/// Ensure a condition holds, returning an `InternalError` if not.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $msg:expr) => {
        if !$cond {
            return Err($crate::QuillError::InternalError($msg.to_string()));
        }
    };
    ($cond:expr, $variant:ident: $($msg:tt)*) => {
        if !$cond {
            return Err($crate::QuillError::$variant(format!($($msg)*)));
        }
    };
}

/// Return early with a `TypeError`.
#[macro_export]
macro_rules! type_err {
    ($($arg:tt)*) => {
        return Err($crate::QuillError::TypeError(format!($($arg)*)))
    };
}

/// Return early with an `EvaluationError`.
#[macro_export]
macro_rules! eval_err {
    ($($arg:tt)*) => {
        return Err($crate::QuillError::EvaluationError(format!($($arg)*)))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = QuillError::type_error("expected Int64, got String");
        assert_eq!(err.to_string(), "TypeError: expected Int64, got String");

        let err = QuillError::unsupported("correlated SelectMany without result selector");
        assert_eq!(
            err.to_string(),
            "UnsupportedShape: correlated SelectMany without result selector"
        );
    }

    #[test]
    fn test_error_constructors() {
        assert!(QuillError::unsupported("x").is_unsupported());
        assert!(!QuillError::invariant("group leaked").is_unsupported());
        let _ = QuillError::no_equivalent_operator("Enumerable.Zip/3");
        let _ = QuillError::metadata("entity type not found");
        let _ = QuillError::internal("unexpected state");
    }

    fn checked(value: i64) -> QuillResult<i64> {
        crate::ensure!(value >= 0, InvalidParameter: "negative value {value}");
        Ok(value)
    }

    #[test]
    fn test_ensure_macro() {
        assert_eq!(checked(3).unwrap(), 3);
        let err = checked(-1).unwrap_err();
        assert!(matches!(err, QuillError::InvalidParameter(_)));
        assert_eq!(err.to_string(), "InvalidParameter: negative value -1");
    }
}
