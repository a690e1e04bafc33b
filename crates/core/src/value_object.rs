//! Value object trait: equality by value, not identity.
//!
//! Every value tracked by the store is treated as a value object. A drain cycle
//! decides whether an entity "actually mutated" by comparing the proposed value
//! with the published one using `PartialEq`, so two structurally equal values
//! are the same state even when produced by different mutations.

/// Bound for values held in an entity context.
///
/// Values must be:
/// - **Clone**: snapshots are handed out by value; the published one is never
///   mutated in place
/// - **PartialEq**: no-op detection compares whole values
/// - **Debug**: values show up in logs and test failures
/// - **Send + Sync + 'static**: values move into the per-entity drain task
///
/// Implemented for every type meeting the bounds.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug + Send + Sync + 'static {}

impl<T> ValueObject for T where T: Clone + PartialEq + core::fmt::Debug + Send + Sync + 'static {}
