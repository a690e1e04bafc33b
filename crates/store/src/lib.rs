//! `steward-store`: queued mutation state containers.
//!
//! - [`EntityContext`]: one entity's immutable snapshot plus a serialized
//!   mutation queue (one drain task per entity)
//! - [`EntityRegistry`]: key → context map for one entity type, keyed or
//!   singleton, re-raising every change with its key
//! - [`Aggregate`]: a root registry + a child registry, with the root's derived
//!   fields recalculated from the live children after every change
//!
//! Persistence is external: collaborators read [`EntityData`] snapshots,
//! save them however they like, then report back through
//! `mark_context_as_persisted` / `clear_context` (or
//! [`Aggregate::mark_all_persisted`]).
//!
//! [`EntityData`]: steward_events::EntityData

pub mod aggregate;
pub mod context;
pub mod error;
pub mod registry;

pub use aggregate::{Aggregate, AggregateEvent, RootRecalculation};
pub use context::{ChangeListener, EntityContext, MutationOutcome, PendingMutation};
pub use error::{StoreError, StoreResult};
pub use registry::{ContextEntry, EntityRegistry, RegistryKey, SingletonRegistry, ValueFactory};
