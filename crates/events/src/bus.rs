//! Change publishing/subscription abstraction (mechanics only).
//!
//! Registries and aggregates report changes through a [`ChangeBus`]: a
//! pub/sub mechanism where every subscriber receives its own copy of each
//! published message.
//!
//! ## Delivery
//!
//! - **Synchronous publish**: `publish` never waits; it hands the message to
//!   each live subscriber's queue on the caller's thread of control
//! - **Per-publisher ordering**: messages from one publisher arrive in publish
//!   order
//! - **No persistence**: the bus is for distribution only; a subscriber that
//!   joins late does not see earlier messages
//!
//! Dropping a [`Subscription`] unsubscribes it; the bus prunes it on the next
//! publish.

use std::sync::Arc;

use tokio::sync::mpsc::{UnboundedReceiver, error::TryRecvError};

/// A subscription to a change stream.
///
/// ## Usage Pattern
///
/// ```ignore
/// let mut changes = registry.subscribe();
///
/// while let Some(change) = changes.recv().await {
///     render(change.data());
/// }
/// ```
///
/// Owners that process notifications inline (rather than from a background
/// task) call [`drain`](Self::drain) after each operation instead.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: UnboundedReceiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: UnboundedReceiver<M>) -> Self {
        Self { receiver }
    }

    /// Wait for the next message. Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<M> {
        self.receiver.recv().await
    }

    /// Try to receive a message without waiting.
    pub fn try_recv(&mut self) -> Result<M, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Take every message that is already queued.
    pub fn drain(&mut self) -> Vec<M> {
        let mut messages = Vec::new();
        while let Ok(message) = self.receiver.try_recv() {
            messages.push(message);
        }
        messages
    }
}

/// Change-notification bus (pub/sub abstraction).
///
/// ```text
/// drain cycle ──> EntityContext ──> EntityRegistry::publish ──> subscribers
///                                                               ├─ Aggregate (root recalculation)
///                                                               └─ UI / persistence collaborators
/// ```
///
/// The trait requires `Send + Sync`: drain tasks publish from whichever
/// runtime worker they happen to run on.
pub trait ChangeBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> ChangeBus<M> for Arc<B>
where
    B: ChangeBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}
