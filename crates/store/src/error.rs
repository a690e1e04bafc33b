//! Store error model.

use thiserror::Error;

use steward_core::DomainError;

/// Result type used by contexts, registries and aggregates.
pub type StoreResult<T> = Result<T, StoreError>;

/// Failures surfaced by the store.
///
/// Every variant is a recoverable result for the caller to render or act on.
/// Mutation-function failures are not in here: they are absorbed by the drain
/// loop and reported through [`MutationOutcome`](crate::MutationOutcome).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No context is registered for the key.
    #[error("no context exists for {entity} with key {key}")]
    NotFound { entity: &'static str, key: String },

    /// A context is already registered for the key.
    #[error("a context already exists for {entity} with key {key}")]
    AlreadyExists { entity: &'static str, key: String },

    /// The action is not self-mutating and no handler is registered for it.
    #[error("no handler registered for action `{action}` on {entity}")]
    HandlerNotFound { entity: &'static str, action: String },

    /// `load`/`add_root` was called on an aggregate that already has a root.
    #[error("the aggregate has already been loaded")]
    AlreadyLoaded,

    /// A root operation ran before the aggregate's root was loaded or added.
    #[error("the aggregate has not been loaded")]
    NotLoaded,

    /// The entity's drain task is gone (its runtime shut down).
    #[error("the mutation queue for {entity} is closed")]
    QueueClosed { entity: &'static str },

    /// `enqueue` was called outside a Tokio runtime.
    #[error("no Tokio runtime available to drain the mutation queue for {entity}")]
    NoRuntime { entity: &'static str },

    /// A domain error raised outside the drain loop.
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl StoreError {
    pub(crate) fn not_found<T>(key: &impl core::fmt::Debug) -> Self {
        Self::NotFound {
            entity: std::any::type_name::<T>(),
            key: format!("{key:?}"),
        }
    }

    pub(crate) fn already_exists<T>(key: &impl core::fmt::Debug) -> Self {
        Self::AlreadyExists {
            entity: std::any::type_name::<T>(),
            key: format!("{key:?}"),
        }
    }

    pub(crate) fn handler_not_found<T>(action: &str) -> Self {
        Self::HandlerNotFound {
            entity: std::any::type_name::<T>(),
            action: action.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }
}
