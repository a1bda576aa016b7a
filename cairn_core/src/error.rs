//! Errors raised while operating on runtime values.

use thiserror::Error;

/// Result alias for value-level operations.
pub type CairnResult<T> = Result<T, CairnError>;

/// Value-level failures.
///
/// These are produced by operations on [`Value`](crate::Value) and by the
/// compiler when a program is malformed. The VM wraps them in its own error
/// type together with call-site information.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CairnError {
    /// Operand types do not support the operation.
    #[error("TypeError: {0}")]
    Type(String),

    /// Integer arithmetic overflowed.
    #[error("OverflowError: {0}")]
    Overflow(String),

    /// A name could not be resolved.
    #[error("NameError: name '{0}' is not defined")]
    Name(String),

    /// Invariant violation inside the runtime.
    #[error("InternalError: {0}")]
    Internal(String),
}

impl CairnError {
    /// Create a type error.
    pub fn type_error(message: impl Into<String>) -> Self {
        Self::Type(message.into())
    }

    /// Create an overflow error.
    pub fn overflow(message: impl Into<String>) -> Self {
        Self::Overflow(message.into())
    }

    /// Create a name error.
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            CairnError::type_error("unsupported operand").to_string(),
            "TypeError: unsupported operand"
        );
        assert_eq!(
            CairnError::name("x").to_string(),
            "NameError: name 'x' is not defined"
        );
    }

    #[test]
    fn test_error_equality() {
        assert_eq!(CairnError::overflow("a"), CairnError::overflow("a"));
        assert_ne!(CairnError::overflow("a"), CairnError::internal("a"));
    }
}
