//! Error types for the relay core.

use thiserror::Error;

/// Relay core errors.
///
/// Absence (an unbound user, an unknown connection) is never an error here.
/// Callers see it as `None` or as [`crate::SendOutcome::Dropped`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RelayError {
    /// Empty or malformed identity / connection id passed to `bind`
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl RelayError {
    /// Create a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_argument_display() {
        let err = RelayError::invalid_argument("user id must not be empty");
        assert_eq!(
            err.to_string(),
            "Invalid argument: user id must not be empty"
        );
    }
}
