//! Entity lifecycle flags (provenance + pending persistence work).

use serde::{Deserialize, Serialize};

/// Where an entity came from and what persistence work it is waiting on.
///
/// The value is immutable: every transition returns a new `LifecycleState`.
///
/// ```text
/// new() / existing()
///        │
///        ├──mutated()──────────> is_mutated = true
///        ├──mark_for_deletion()> is_marked_for_deletion = true
///        └──persisted()────────> is_new = false, is_mutated = false
/// ```
///
/// Deletion is soft: the flag survives `persisted()` and the owner removes the
/// entity when it reconciles with the persistence layer.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LifecycleState {
    is_new: bool,
    is_mutated: bool,
    is_marked_for_deletion: bool,
}

impl LifecycleState {
    /// State of an entity freshly created by a user (not yet saved).
    pub const fn new() -> Self {
        Self {
            is_new: true,
            is_mutated: false,
            is_marked_for_deletion: false,
        }
    }

    /// State of an entity loaded from a durable source.
    pub const fn existing() -> Self {
        Self {
            is_new: false,
            is_mutated: false,
            is_marked_for_deletion: false,
        }
    }

    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn is_mutated(&self) -> bool {
        self.is_mutated
    }

    pub fn is_marked_for_deletion(&self) -> bool {
        self.is_marked_for_deletion
    }

    /// True when a persistence collaborator has something to do for this entity.
    pub fn is_dirty(&self) -> bool {
        self.is_new || self.is_mutated || self.is_marked_for_deletion
    }

    #[must_use]
    pub const fn mark_for_deletion(self) -> Self {
        Self {
            is_marked_for_deletion: true,
            ..self
        }
    }

    #[must_use]
    pub const fn mark_as_new(self) -> Self {
        Self {
            is_new: true,
            ..self
        }
    }

    #[must_use]
    pub const fn mutated(self) -> Self {
        Self {
            is_mutated: true,
            ..self
        }
    }

    /// Clears the new/mutated flags after a successful external save.
    #[must_use]
    pub const fn persisted(self) -> Self {
        Self {
            is_new: false,
            is_mutated: false,
            ..self
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructors_set_provenance() {
        assert!(LifecycleState::new().is_new());
        assert!(!LifecycleState::existing().is_new());
        assert!(!LifecycleState::new().is_mutated());
        assert!(!LifecycleState::existing().is_marked_for_deletion());
    }

    #[test]
    fn transitions_return_new_values() {
        let original = LifecycleState::existing();
        let mutated = original.mutated();

        assert!(!original.is_mutated());
        assert!(mutated.is_mutated());
        assert!(!mutated.is_new());
    }

    #[test]
    fn persisted_clears_new_and_mutated_but_keeps_deletion() {
        let state = LifecycleState::new().mutated().mark_for_deletion().persisted();

        assert!(!state.is_new());
        assert!(!state.is_mutated());
        assert!(state.is_marked_for_deletion());
    }

    #[test]
    fn dirty_tracks_pending_work() {
        assert!(!LifecycleState::existing().is_dirty());
        assert!(LifecycleState::new().is_dirty());
        assert!(LifecycleState::existing().mutated().is_dirty());
        assert!(LifecycleState::existing().mark_for_deletion().is_dirty());
        assert!(!LifecycleState::new().mutated().persisted().is_dirty());
        assert!(LifecycleState::existing().mark_as_new().is_new());
    }

    #[test]
    fn serializes_flags_by_name() {
        let json = serde_json::to_value(LifecycleState::new().mutated()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "is_new": true,
                "is_mutated": true,
                "is_marked_for_deletion": false
            })
        );
    }
}
