//! Per-entity mutation queue (channel actor).
//!
//! An [`EntityContext`] owns one entity's published snapshot and serializes
//! every mutation applied to it.
//!
//! ## Drain Cycle
//!
//! ```text
//! enqueue(f) ──> work channel ──> drain task
//!                                   │ working = published value
//!                                   │ for each queued f (FIFO, incl. late arrivals):
//!                                   │     Ok(v)  -> working = v
//!                                   │     Err(e) / panic -> keep working, record e
//!                                   │ queue empty:
//!                                   │     working != published -> publish, state.mutated(), notify
//!                                   └─> every caller of this cycle gets the same outcome
//! ```
//!
//! The drain task is the only writer of the value, so at most one cycle runs
//! per entity. Lifecycle flags are metadata and are updated directly by
//! [`EntityContext::mark_as_persisted`] / [`EntityContext::mark_for_deletion`].

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::task::{Context, Poll};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};

use steward_core::{DomainError, LifecycleState, ValueObject};
use steward_events::{ChangeKind, EntityData, MutationFn};

use crate::error::{StoreError, StoreResult};

/// Callback invoked after every observable change of a context.
///
/// Registries install one per context to re-raise the change with its key.
pub type ChangeListener<T> = Arc<dyn Fn(ChangeKind, &EntityData<T>) + Send + Sync>;

/// Result of one drain cycle, shared by every caller whose mutation was part
/// of it.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationOutcome<T> {
    value: T,
    mutated: bool,
    failures: Vec<DomainError>,
}

impl<T> MutationOutcome<T> {
    /// The value published at the end of the cycle.
    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn into_value(self) -> T {
        self.value
    }

    /// Whether the cycle published a value different from the previous one.
    pub fn is_mutated(&self) -> bool {
        self.mutated
    }

    /// Errors returned by mutation functions during the cycle, in queue order.
    pub fn failures(&self) -> &[DomainError] {
        &self.failures
    }
}

/// Handle to the outcome of the drain cycle a mutation was queued into.
#[derive(Debug)]
#[must_use = "a pending mutation does nothing unless awaited"]
pub struct PendingMutation<T> {
    receiver: oneshot::Receiver<MutationOutcome<T>>,
    entity: &'static str,
}

impl<T> Future for PendingMutation<T> {
    type Output = StoreResult<MutationOutcome<T>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let entity = self.entity;
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|res| res.map_err(|_| StoreError::QueueClosed { entity }))
    }
}

struct QueuedMutation<T> {
    mutation: MutationFn<T>,
    reply: oneshot::Sender<MutationOutcome<T>>,
}

#[derive(Debug)]
struct Published<T> {
    data: EntityData<T>,
    last_activity: DateTime<Utc>,
}

struct Shared<T> {
    published: RwLock<Published<T>>,
    /// Receiving end of the work channel until the drain task claims it.
    pending_receiver: Mutex<Option<mpsc::UnboundedReceiver<QueuedMutation<T>>>>,
    listener: Option<ChangeListener<T>>,
}

impl<T: ValueObject> Shared<T> {
    fn snapshot(&self) -> EntityData<T> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .data
            .clone()
    }

    fn touch(&self) {
        self.published
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .last_activity = Utc::now();
    }

    fn update<F>(&self, f: F) -> EntityData<T>
    where
        F: FnOnce(&mut EntityData<T>),
    {
        let mut published = self.published.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut published.data);
        published.last_activity = Utc::now();
        published.data.clone()
    }

    fn notify(&self, kind: ChangeKind, data: &EntityData<T>) {
        if let Some(listener) = &self.listener {
            listener(kind, data);
        }
    }
}

/// One entity's snapshot, lifecycle state and mutation queue.
///
/// Cloning yields another handle to the same entity. The drain task is spawned
/// on the current Tokio runtime by the first [`enqueue`](Self::enqueue) and
/// exits once every handle has been dropped.
pub struct EntityContext<T> {
    shared: Arc<Shared<T>>,
    queue: mpsc::UnboundedSender<QueuedMutation<T>>,
}

impl<T> Clone for EntityContext<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            queue: self.queue.clone(),
        }
    }
}

impl<T: ValueObject> core::fmt::Debug for EntityContext<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EntityContext")
            .field("data", &self.snapshot())
            .finish_non_exhaustive()
    }
}

impl<T: ValueObject> EntityContext<T> {
    /// Standalone context with no change listener.
    pub fn new(value: T, state: LifecycleState) -> Self {
        Self::build(value, state, None)
    }

    pub(crate) fn with_listener(value: T, state: LifecycleState, listener: ChangeListener<T>) -> Self {
        Self::build(value, state, Some(listener))
    }

    fn build(value: T, state: LifecycleState, listener: Option<ChangeListener<T>>) -> Self {
        let (queue, receiver) = mpsc::unbounded_channel();
        let shared = Shared {
            published: RwLock::new(Published {
                data: EntityData::new(value, state),
                last_activity: Utc::now(),
            }),
            pending_receiver: Mutex::new(Some(receiver)),
            listener,
        };

        Self {
            shared: Arc::new(shared),
            queue,
        }
    }

    /// Current published snapshot (value + lifecycle state).
    pub fn snapshot(&self) -> EntityData<T> {
        self.shared.snapshot()
    }

    /// Current published value. May be stale while a drain cycle is running.
    pub fn value(&self) -> T {
        self.snapshot().into_value()
    }

    pub fn state(&self) -> LifecycleState {
        self.shared
            .published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .data
            .state()
    }

    /// Time of the last enqueue or state change.
    pub fn last_activity(&self) -> DateTime<Utc> {
        self.shared
            .published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .last_activity
    }

    /// Append `mutation` to the queue, starting the drain task if needed.
    ///
    /// The returned handle resolves once the queue has drained empty, with the
    /// outcome of the cycle that applied `mutation`.
    pub fn enqueue(&self, mutation: MutationFn<T>) -> StoreResult<PendingMutation<T>> {
        self.ensure_drain_task()?;

        let (reply, receiver) = oneshot::channel();
        self.queue
            .send(QueuedMutation { mutation, reply })
            .map_err(|_| StoreError::QueueClosed {
                entity: std::any::type_name::<T>(),
            })?;
        self.shared.touch();

        tracing::debug!(entity = std::any::type_name::<T>(), "mutation enqueued");

        Ok(PendingMutation {
            receiver,
            entity: std::any::type_name::<T>(),
        })
    }

    /// Enqueue `mutation` and wait for its drain cycle to finish.
    pub async fn apply(&self, mutation: MutationFn<T>) -> StoreResult<MutationOutcome<T>> {
        self.enqueue(mutation)?.await
    }

    /// Clear the new/mutated flags after an external save.
    pub fn mark_as_persisted(&self) -> EntityData<T> {
        let data = self.shared.update(|data| {
            *data = EntityData::new(data.value().clone(), data.state().persisted());
        });
        self.shared.notify(ChangeKind::Persisted, &data);
        data
    }

    /// Soft-delete: flag the entity without removing it.
    pub fn mark_for_deletion(&self) -> EntityData<T> {
        let data = self.shared.update(|data| {
            *data = EntityData::new(data.value().clone(), data.state().mark_for_deletion());
        });
        self.shared.notify(ChangeKind::MarkedForDeletion, &data);
        data
    }

    fn ensure_drain_task(&self) -> StoreResult<()> {
        let mut pending = self
            .shared
            .pending_receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if pending.is_none() {
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| StoreError::NoRuntime {
            entity: std::any::type_name::<T>(),
        })?;

        if let Some(receiver) = pending.take() {
            runtime.spawn(drain(self.shared.clone(), receiver));
        }

        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// The drain task: one per entity, alive while any handle exists.
///
/// A panicking mutation function is recorded as a failure like any other.

async fn drain<T: ValueObject>(shared: Arc<Shared<T>>, mut queue: mpsc::UnboundedReceiver<QueuedMutation<T>>) {
    let entity = std::any::type_name::<T>();

    while let Some(first) = queue.recv().await {
        let original = shared.snapshot().into_value();
        let mut working = original.clone();
        let mut waiters = Vec::new();
        let mut failures = Vec::new();

        let mut next = Some(first);
        while let Some(job) = next {
            let applied = panic::catch_unwind(AssertUnwindSafe(|| (job.mutation)(&working)))
                .unwrap_or_else(|payload| Err(DomainError::panicked(panic_message(payload.as_ref()))));
            match applied {
                Ok(value) => working = value,
                Err(err) => {
                    tracing::warn!(entity, error = %err, "mutation failed; continuing with last good value");
                    failures.push(err);
                }
            }
            waiters.push(job.reply);

            // Pick up mutations enqueued while this cycle was running.
            next = queue.try_recv().ok();
        }

        let mutated = working != original;
        let data = if mutated {
            let data = shared.update(|data| {
                *data = EntityData::new(working, data.state().mutated());
            });
            shared.notify(ChangeKind::Mutated, &data);
            data
        } else {
            shared.snapshot()
        };

        tracing::debug!(entity, batch = waiters.len(), mutated, failed = failures.len(), "drain cycle complete");

        let outcome = MutationOutcome {
            value: data.into_value(),
            mutated,
            failures,
        };
        for waiter in waiters {
            // The caller may have stopped waiting; that is fine.
            let _ = waiter.send(outcome.clone());
        }
    }

    tracing::debug!(entity, "drain task stopped");
}
