//! Errors raised by mutation functions.

use thiserror::Error;

/// What a mutation function returns.
pub type DomainResult<T> = Result<T, DomainError>;

/// Why a mutation function refused to produce a new value.
///
/// The store absorbs these: a failed mutation has no effect on the entity and
/// the rest of its drain cycle still runs. Each failure is logged and reported
/// back to the caller in the drain outcome.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("validation failed: {0}")]
    Validation(String),

    /// Applying the change would break a rule the entity must always satisfy.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier could not be parsed.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The change was computed against a value that no longer holds.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The mutation function panicked; carries the panic message.
    #[error("mutation panicked: {0}")]
    Panicked(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn panicked(msg: impl Into<String>) -> Self {
        Self::Panicked(msg.into())
    }

    /// The human-readable part without the category prefix.
    pub fn reason(&self) -> &str {
        match self {
            Self::Validation(msg)
            | Self::InvariantViolation(msg)
            | Self::InvalidId(msg)
            | Self::Conflict(msg)
            | Self::Panicked(msg) => msg,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_category() {
        assert_eq!(
            DomainError::invariant("balance below zero").to_string(),
            "invariant violated: balance below zero"
        );
        assert_eq!(DomainError::conflict("stale").to_string(), "conflict: stale");
    }

    #[test]
    fn reason_strips_category() {
        assert_eq!(DomainError::validation("empty title").reason(), "empty title");
    }
}
