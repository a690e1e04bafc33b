//! Handler resolution for actions that do not carry their own mutation.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::action::Action;
use crate::mutation::MutationFn;

/// Turns an action into a mutation function (handler abstraction).
///
/// Handlers are the seam for actions that only *describe* a change (a name, a
/// key and some parameters) while the logic of applying it to a `T` lives
/// elsewhere. The handler binds the action's parameters into a
/// [`MutationFn`]; it must not capture shared mutable state.
pub trait ActionHandler<A, T>: Send + Sync + 'static
where
    A: Action,
{
    fn mutation(&self, action: &A) -> MutationFn<T>;
}

impl<A, T, F> ActionHandler<A, T> for F
where
    A: Action,
    F: Fn(&A) -> MutationFn<T> + Send + Sync + 'static,
{
    fn mutation(&self, action: &A) -> MutationFn<T> {
        self(action)
    }
}

type ErasedHandler<T> = Arc<dyn Fn(&dyn Any) -> Option<MutationFn<T>> + Send + Sync>;

struct RegisteredHandler<T> {
    action_type: &'static str,
    build: ErasedHandler<T>,
}

impl<T> Clone for RegisteredHandler<T> {
    fn clone(&self) -> Self {
        Self {
            action_type: self.action_type,
            build: self.build.clone(),
        }
    }
}

/// Explicit registration table: action type → handler, for one entity type `T`.
///
/// The embedding application builds the table up front and hands it to a
/// registry. Resolution is total: each action type has zero or one handler.
pub struct HandlerTable<T> {
    handlers: HashMap<TypeId, RegisteredHandler<T>>,
}

impl<T> Default for HandlerTable<T> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<T> Clone for HandlerTable<T> {
    fn clone(&self) -> Self {
        Self {
            handlers: self.handlers.clone(),
        }
    }
}

impl<T> core::fmt::Debug for HandlerTable<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_list()
            .entries(self.handlers.values().map(|h| h.action_type))
            .finish()
    }
}

impl<T: 'static> HandlerTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for action type `A`, replacing any previous one.
    pub fn register<A, H>(&mut self, handler: H) -> &mut Self
    where
        A: Action,
        H: ActionHandler<A, T>,
    {
        let action_type = std::any::type_name::<A>();
        let build: ErasedHandler<T> = Arc::new(move |action: &dyn Any| {
            action
                .downcast_ref::<A>()
                .map(|action| handler.mutation(action))
        });

        let previous = self
            .handlers
            .insert(TypeId::of::<A>(), RegisteredHandler { action_type, build });
        if previous.is_some() {
            tracing::warn!(action_type, "replaced existing action handler");
        } else {
            tracing::debug!(action_type, "registered action handler");
        }

        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with<A, H>(mut self, handler: H) -> Self
    where
        A: Action,
        H: ActionHandler<A, T>,
    {
        self.register::<A, H>(handler);
        self
    }

    /// Resolve `action` to a mutation function, if a handler is registered
    /// for its type.
    pub fn resolve<A: Action>(&self, action: &A) -> Option<MutationFn<T>> {
        let handler = self.handlers.get(&TypeId::of::<A>())?;
        (handler.build)(action as &dyn Any)
    }

    pub fn contains<A: Action>(&self) -> bool {
        self.handlers.contains_key(&TypeId::of::<A>())
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
