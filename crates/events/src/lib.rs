//! Actions, mutations and change notifications.
//!
//! This crate defines the contract between callers and the store: how a
//! caller describes "what changed" (an [`Action`], optionally carrying its own
//! [`MutationFn`]), how handler-routed actions are resolved ([`HandlerTable`]),
//! and how the store reports changes back ([`ChangeBus`] carrying
//! [`ContextChange`] payloads).

pub mod action;
pub mod bus;
pub mod change;
pub mod handler;
pub mod in_memory_bus;
pub mod mutation;

pub use action::Action;
pub use bus::{ChangeBus, Subscription};
pub use change::{ChangeKind, ContextChange, EntityData};
pub use handler::{ActionHandler, HandlerTable};
pub use in_memory_bus::{InMemoryBusError, InMemoryChangeBus};
pub use mutation::{Mutate, Mutation, MutationFn, mutation_fn};
