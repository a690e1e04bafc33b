use serde::{Deserialize, Serialize};

use steward_core::LifecycleState;

/// Immutable snapshot of one tracked entity: its value and lifecycle flags.
///
/// This is what readers and persistence collaborators work from. Given a
/// snapshot, a collaborator decides insert / update / delete from `state()`
/// and reports back through the registry once the save succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityData<T> {
    value: T,
    state: LifecycleState,
}

impl<T> EntityData<T> {
    pub fn new(value: T, state: LifecycleState) -> Self {
        Self { value, state }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn into_parts(self) -> (T, LifecycleState) {
        (self.value, self.state)
    }
}

/// What happened to a context.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// A context was registered.
    Created,
    /// A drain cycle published a new value.
    Mutated,
    /// Lifecycle flags were reconciled after an external save.
    Persisted,
    /// The context was soft-deleted.
    MarkedForDeletion,
    /// The context was removed from its registry.
    Cleared,
}

impl ChangeKind {
    /// Stable name, used as a structured log field.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Created => "context.created",
            ChangeKind::Mutated => "context.mutated",
            ChangeKind::Persisted => "context.persisted",
            ChangeKind::MarkedForDeletion => "context.marked_for_deletion",
            ChangeKind::Cleared => "context.cleared",
        }
    }
}

/// Change notification raised by a registry: which key, what happened, and the
/// context snapshot taken right after the change.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextChange<K, T> {
    key: K,
    kind: ChangeKind,
    data: EntityData<T>,
}

impl<K, T> ContextChange<K, T> {
    pub fn new(key: K, kind: ChangeKind, data: EntityData<T>) -> Self {
        Self { key, kind, data }
    }

    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    pub fn data(&self) -> &EntityData<T> {
        &self.data
    }

    pub fn into_data(self) -> EntityData<T> {
        self.data
    }
}
