//! `steward-core`: building blocks shared by the mutation store.
//!
//! This crate contains **pure** primitives (no runtime, no IO): lifecycle
//! flags, identity, the value bound for tracked entities and the domain error
//! model used by mutation functions.

pub mod entity;
pub mod error;
pub mod id;
pub mod lifecycle;
pub mod value_object;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::EntityUid;
pub use lifecycle::LifecycleState;
pub use value_object::ValueObject;
