//! Mutation functions and self-contained mutation actions.

use std::borrow::Cow;
use std::sync::Arc;

use steward_core::DomainResult;

use crate::action::Action;

/// A pure function from the current value to the proposed next value.
///
/// It must be deterministic given its input and may only close over the
/// action's own immutable parameters. Returning the input unchanged is a no-op,
/// not an error.
pub type MutationFn<T> = Arc<dyn Fn(&T) -> DomainResult<T> + Send + Sync>;

/// Wrap a closure as a [`MutationFn`].
pub fn mutation_fn<T, F>(f: F) -> MutationFn<T>
where
    F: Fn(&T) -> DomainResult<T> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// An action that *is* a mutation: it carries its own mutation function and
/// needs no handler.
pub trait Mutate<T>: Action {
    fn mutation(&self) -> MutationFn<T>;
}

/// Ready-made self-mutating action: a name, a target key and a function.
pub struct Mutation<K, T> {
    name: Cow<'static, str>,
    key: K,
    apply: MutationFn<T>,
}

impl<K, T> Mutation<K, T> {
    pub fn new<F>(name: impl Into<Cow<'static, str>>, key: K, f: F) -> Self
    where
        F: Fn(&T) -> DomainResult<T> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            key,
            apply: Arc::new(f),
        }
    }

    pub fn from_fn(name: impl Into<Cow<'static, str>>, key: K, apply: MutationFn<T>) -> Self {
        Self {
            name: name.into(),
            key,
            apply,
        }
    }
}

impl<T> Mutation<(), T> {
    /// Mutation targeting a singleton registry.
    pub fn singleton<F>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: Fn(&T) -> DomainResult<T> + Send + Sync + 'static,
    {
        Self::new(name, (), f)
    }
}

impl<K, T> core::fmt::Debug for Mutation<K, T>
where
    K: core::fmt::Debug,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Mutation")
            .field("name", &self.name)
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

impl<K, T> Action for Mutation<K, T>
where
    K: Clone + core::fmt::Debug + Send + Sync + 'static,
    T: 'static,
{
    type Key = K;

    fn name(&self) -> &str {
        &self.name
    }

    fn key(&self) -> K {
        self.key.clone()
    }
}

impl<K, T> Mutate<T> for Mutation<K, T>
where
    K: Clone + core::fmt::Debug + Send + Sync + 'static,
    T: 'static,
{
    fn mutation(&self) -> MutationFn<T> {
        self.apply.clone()
    }
}
