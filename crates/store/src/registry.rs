//! Key → context registry for one entity type.
//!
//! One generic type covers both registry shapes:
//!
//! - **keyed** (`EntityRegistry<K, T>` built with [`EntityRegistry::keyed`]):
//!   any number of contexts; dispatching to an unknown key creates a fresh
//!   default-valued context first
//! - **singleton** ([`SingletonRegistry<T>`] = `EntityRegistry<(), T>`): at most
//!   one context under the unit key; dispatch before the context exists is a
//!   not-found error
//!
//! Every change to any owned context is re-raised on the registry's bus as a
//! [`ContextChange`] tagged with its key.

use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;

use steward_core::{LifecycleState, ValueObject};
use steward_events::{
    Action, ChangeBus, ChangeKind, ContextChange, EntityData, HandlerTable, InMemoryChangeBus, Mutate,
    MutationFn, Subscription,
};

use crate::context::{ChangeListener, EntityContext};
use crate::error::{StoreError, StoreResult};

/// Bound for registry keys.
pub trait RegistryKey: Clone + Eq + core::hash::Hash + core::fmt::Debug + Send + Sync + 'static {}

impl<K> RegistryKey for K where K: Clone + Eq + core::hash::Hash + core::fmt::Debug + Send + Sync + 'static {}

/// Builds the value of a context created on demand for `key`.
pub type ValueFactory<K, T> = Arc<dyn Fn(&K) -> T + Send + Sync>;

/// Registry with at most one context, addressed by the unit key.
pub type SingletonRegistry<T> = EntityRegistry<(), T>;

/// Outcome of [`EntityRegistry::get_or_create_context`].
pub enum ContextEntry<T> {
    Created(EntityContext<T>),
    Existing(EntityContext<T>),
}

impl<T> Clone for ContextEntry<T> {
    fn clone(&self) -> Self {
        match self {
            ContextEntry::Created(ctx) => ContextEntry::Created(ctx.clone()),
            ContextEntry::Existing(ctx) => ContextEntry::Existing(ctx.clone()),
        }
    }
}

impl<T: ValueObject> core::fmt::Debug for ContextEntry<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ContextEntry::Created(ctx) => f.debug_tuple("Created").field(ctx).finish(),
            ContextEntry::Existing(ctx) => f.debug_tuple("Existing").field(ctx).finish(),
        }
    }
}

impl<T> ContextEntry<T> {
    pub fn was_created(&self) -> bool {
        matches!(self, ContextEntry::Created(_))
    }

    pub fn into_context(self) -> EntityContext<T> {
        match self {
            ContextEntry::Created(ctx) | ContextEntry::Existing(ctx) => ctx,
        }
    }
}

/// Owns the contexts of one entity type, keyed by identity.
pub struct EntityRegistry<K, T> {
    contexts: RwLock<IndexMap<K, EntityContext<T>>>,
    handlers: HandlerTable<T>,
    factory: Option<ValueFactory<K, T>>,
    bus: Arc<InMemoryChangeBus<ContextChange<K, T>>>,
}

impl<K, T> core::fmt::Debug for EntityRegistry<K, T>
where
    K: RegistryKey,
    T: ValueObject,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("entity", &std::any::type_name::<T>())
            .field("keys", &self.keys())
            .field("handlers", &self.handlers)
            .field("lazy_create", &self.factory.is_some())
            .finish()
    }
}

impl<K, T> EntityRegistry<K, T>
where
    K: RegistryKey,
    T: ValueObject + Default,
{
    /// Keyed registry; unknown keys are created with `T::default()` on dispatch.
    pub fn keyed(handlers: HandlerTable<T>) -> Self {
        Self::keyed_with(handlers, |_: &K| T::default())
    }
}

impl<T: ValueObject> EntityRegistry<(), T> {
    /// Singleton registry; the context must be created before dispatching.
    pub fn singleton(handlers: HandlerTable<T>) -> Self {
        Self::build(handlers, None)
    }
}

impl<K, T> EntityRegistry<K, T>
where
    K: RegistryKey,
    T: ValueObject,
{
    /// Keyed registry; unknown keys are created with `factory(key)` on dispatch.
    pub fn keyed_with<F>(handlers: HandlerTable<T>, factory: F) -> Self
    where
        F: Fn(&K) -> T + Send + Sync + 'static,
    {
        Self::build(handlers, Some(Arc::new(factory)))
    }

    fn build(handlers: HandlerTable<T>, factory: Option<ValueFactory<K, T>>) -> Self {
        Self {
            contexts: RwLock::new(IndexMap::new()),
            handlers,
            factory,
            bus: Arc::new(InMemoryChangeBus::new()),
        }
    }

    /// Subscribe to `(key, change, snapshot)` notifications.
    pub fn subscribe(&self) -> Subscription<ContextChange<K, T>> {
        self.bus.subscribe()
    }

    /// Register a context for `key`. Fails if one already exists.
    pub fn create_context(
        &self,
        key: K,
        value: T,
        state: Option<LifecycleState>,
    ) -> StoreResult<EntityContext<T>> {
        let ctx = {
            let mut contexts = self.write();
            if contexts.contains_key(&key) {
                return Err(StoreError::already_exists::<T>(&key));
            }
            let ctx = self.new_context(&key, value, state.unwrap_or_else(LifecycleState::new));
            contexts.insert(key.clone(), ctx.clone());
            ctx
        };

        self.created(key, &ctx);
        Ok(ctx)
    }

    /// Register a context for `key` unless one exists; reports which happened.
    pub fn get_or_create_context(&self, key: K, value: T, state: Option<LifecycleState>) -> ContextEntry<T> {
        let ctx = {
            let mut contexts = self.write();
            if let Some(existing) = contexts.get(&key) {
                return ContextEntry::Existing(existing.clone());
            }
            let ctx = self.new_context(&key, value, state.unwrap_or_else(LifecycleState::new));
            contexts.insert(key.clone(), ctx.clone());
            ctx
        };

        self.created(key, &ctx);
        ContextEntry::Created(ctx)
    }

    pub fn get_context(&self, key: &K) -> Option<EntityContext<T>> {
        self.read().get(key).cloned()
    }

    /// Like [`get_context`](Self::get_context), but a missing key is a
    /// [`StoreError::NotFound`].
    pub fn require_context(&self, key: &K) -> StoreResult<EntityContext<T>> {
        self.get_context(key).ok_or_else(|| StoreError::not_found::<T>(key))
    }

    pub fn contains(&self, key: &K) -> bool {
        self.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Keys in registration order.
    pub fn keys(&self) -> Vec<K> {
        self.read().keys().cloned().collect()
    }

    /// Current values in registration order.
    pub fn values(&self) -> Vec<T> {
        self.read().values().map(EntityContext::value).collect()
    }

    /// Current snapshots in registration order.
    pub fn entity_data(&self) -> Vec<(K, EntityData<T>)> {
        self.read()
            .iter()
            .map(|(key, ctx)| (key.clone(), ctx.snapshot()))
            .collect()
    }

    /// Route a handler-resolved action to its context.
    ///
    /// The handler is looked up by the action's type; a keyed registry creates
    /// the target context if it does not exist yet.
    pub async fn dispatch<A>(&self, action: A) -> StoreResult<T>
    where
        A: Action<Key = K>,
    {
        let mutation = self
            .handlers
            .resolve(&action)
            .ok_or_else(|| StoreError::handler_not_found::<T>(action.name()))?;

        self.run(action.key(), action.name(), mutation).await
    }

    /// Route a self-mutating action to its context.
    pub async fn dispatch_mutation<A>(&self, action: A) -> StoreResult<T>
    where
        A: Mutate<T> + Action<Key = K>,
    {
        self.run(action.key(), action.name(), action.mutation()).await
    }

    /// Enqueue a bare mutation function on the context for `key`.
    pub async fn dispatch_fn(&self, key: K, mutation: MutationFn<T>) -> StoreResult<T> {
        self.run(key, "mutation", mutation).await
    }

    /// Remove the context for `key`.
    pub fn clear_context(&self, key: &K) -> StoreResult<()> {
        let ctx = self
            .write()
            .shift_remove(key)
            .ok_or_else(|| StoreError::not_found::<T>(key))?;

        tracing::debug!(entity = std::any::type_name::<T>(), key = ?key, "context cleared");
        self.publish(ContextChange::new(key.clone(), ChangeKind::Cleared, ctx.snapshot()));
        Ok(())
    }

    pub fn mark_context_as_persisted(&self, key: &K) -> StoreResult<()> {
        self.require_context(key)?.mark_as_persisted();
        Ok(())
    }

    pub fn mark_context_for_deletion(&self, key: &K) -> StoreResult<()> {
        self.require_context(key)?.mark_for_deletion();
        Ok(())
    }

    async fn run(&self, key: K, action: &str, mutation: MutationFn<T>) -> StoreResult<T> {
        let ctx = self.resolve_target(&key)?;

        tracing::debug!(entity = std::any::type_name::<T>(), key = ?key, action, "dispatching");

        let outcome = ctx.apply(mutation).await?;
        Ok(outcome.into_value())
    }

    /// Existing context for `key`, or a new one when this registry creates
    /// contexts on demand.
    fn resolve_target(&self, key: &K) -> StoreResult<EntityContext<T>> {
        if let Some(ctx) = self.get_context(key) {
            return Ok(ctx);
        }

        let Some(factory) = &self.factory else {
            return Err(StoreError::not_found::<T>(key));
        };

        let entry = self.get_or_create_context(key.clone(), factory(key), Some(LifecycleState::new()));
        if entry.was_created() {
            tracing::debug!(entity = std::any::type_name::<T>(), key = ?key, "context created on dispatch");
        }
        Ok(entry.into_context())
    }

    fn new_context(&self, key: &K, value: T, state: LifecycleState) -> EntityContext<T> {
        let bus = self.bus.clone();
        let key = key.clone();
        let listener: ChangeListener<T> = Arc::new(move |kind, data: &EntityData<T>| {
            if let Err(err) = bus.publish(ContextChange::new(key.clone(), kind, data.clone())) {
                tracing::warn!(error = ?err, kind = kind.as_str(), "failed to publish context change");
            }
        });

        EntityContext::with_listener(value, state, listener)
    }

    fn created(&self, key: K, ctx: &EntityContext<T>) {
        tracing::debug!(entity = std::any::type_name::<T>(), key = ?key, "context created");
        self.publish(ContextChange::new(key, ChangeKind::Created, ctx.snapshot()));
    }

    fn publish(&self, change: ContextChange<K, T>) {
        if let Err(err) = self.bus.publish(change) {
            tracing::warn!(error = ?err, "failed to publish context change");
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, IndexMap<K, EntityContext<T>>> {
        self.contexts.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, IndexMap<K, EntityContext<T>>> {
        self.contexts.write().unwrap_or_else(PoisonError::into_inner)
    }
}
