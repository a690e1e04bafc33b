/// An action targets one entity (action abstraction).
///
/// Actions represent **intent** - a request to change a tracked entity. They
/// are transient and are turned into a [`MutationFn`](crate::MutationFn)
/// either by the action itself (see [`Mutate`](crate::Mutate)) or by a handler
/// registered in a [`HandlerTable`](crate::HandlerTable).
///
/// ## Entity Targeting
///
/// `key()` names the entity the action applies to. Registries route on it:
/// keyed registries look the key up (creating the entity on demand), singleton
/// registries use the unit key `()`.
///
/// ## Design Constraints
///
/// Actions must be `Send + Sync + 'static` so they can be resolved by type and
/// moved into mutation closures that run on the entity's drain task.
pub trait Action: Send + Sync + 'static {
    /// Identity of the targeted entity.
    type Key: Clone + core::fmt::Debug + Send + Sync + 'static;

    /// Human-readable action name, used in logs and error messages.
    fn name(&self) -> &str;

    /// Key of the entity this action targets.
    fn key(&self) -> Self::Key;
}
