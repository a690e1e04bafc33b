//! Root + children composition with derived root recalculation.
//!
//! An [`Aggregate`] pairs a [`SingletonRegistry`] holding the root with a
//! keyed [`EntityRegistry`] holding the children. It subscribes to the child
//! registry once, at construction; after every aggregate operation any pending
//! child notification triggers the root recalculation, which is pushed into
//! the root as a synthetic mutation **before** the aggregate raises its own
//! [`AggregateEvent`].
//!
//! ```text
//! dispatch_child(action)
//!   └─> children.dispatch ──> child drain cycle ──> ContextChange on child bus
//!                                                        │
//!   settle() <───────────────────────────────────────────┘
//!     └─> recalculate(root, live children) ──> root drain cycle
//!   └─> AggregateEvent::ChildChanged(key)
//! ```
//!
//! Soft deletion is reconciled in [`Aggregate::mark_all_persisted`], the single
//! point where the aggregate catches up with "has been durably saved".

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use steward_core::{Entity, LifecycleState, ValueObject};
use steward_events::{
    Action, ChangeBus, ContextChange, EntityData, HandlerTable, InMemoryChangeBus, Mutate, Subscription,
    mutation_fn,
};

use crate::error::{StoreError, StoreResult};
use crate::registry::{EntityRegistry, RegistryKey, SingletonRegistry};

/// Derives the root's computed fields from the children that are not marked
/// for deletion. Must be pure; returning the root unchanged is a no-op.
pub type RootRecalculation<R, C> = Arc<dyn Fn(&R, &[C]) -> R + Send + Sync>;

/// The aggregate's single outward change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AggregateEvent<K> {
    /// Root and initial children were loaded.
    Loaded,
    /// The root was added, dispatched to, or flagged.
    RootChanged,
    /// A child was added, dispatched to, or flagged.
    ChildChanged(K),
    /// Deleted children were removed and all flags reconciled.
    Persisted,
}

pub struct Aggregate<K, R, C> {
    root: SingletonRegistry<R>,
    children: EntityRegistry<K, C>,
    child_changes: Mutex<Subscription<ContextChange<K, C>>>,
    recalculate: RootRecalculation<R, C>,
    loaded: AtomicBool,
    bus: InMemoryChangeBus<AggregateEvent<K>>,
}

impl<K, R, C> core::fmt::Debug for Aggregate<K, R, C>
where
    K: RegistryKey,
    R: ValueObject,
    C: ValueObject,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Aggregate")
            .field("root", &self.root)
            .field("children", &self.children)
            .field("loaded", &self.loaded.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl<K, R, C> Aggregate<K, R, C>
where
    K: RegistryKey,
    R: ValueObject,
    C: ValueObject + Entity<Id = K> + Default,
{
    /// Aggregate whose children are created with `C::default()` when an
    /// action targets an unknown child key.
    pub fn new(root_handlers: HandlerTable<R>, child_handlers: HandlerTable<C>) -> Self {
        Self::from_registries(
            EntityRegistry::singleton(root_handlers),
            EntityRegistry::keyed(child_handlers),
        )
    }
}

impl<K, R, C> Aggregate<K, R, C>
where
    K: RegistryKey,
    R: ValueObject,
    C: ValueObject + Entity<Id = K>,
{
    /// Aggregate whose children are created with `factory(key)` when an
    /// action targets an unknown child key.
    pub fn with_child_factory<F>(
        root_handlers: HandlerTable<R>,
        child_handlers: HandlerTable<C>,
        factory: F,
    ) -> Self
    where
        F: Fn(&K) -> C + Send + Sync + 'static,
    {
        Self::from_registries(
            EntityRegistry::singleton(root_handlers),
            EntityRegistry::keyed_with(child_handlers, factory),
        )
    }

    fn from_registries(root: SingletonRegistry<R>, children: EntityRegistry<K, C>) -> Self {
        let child_changes = Mutex::new(children.subscribe());
        Self {
            root,
            children,
            child_changes,
            recalculate: Arc::new(|root: &R, _: &[C]| root.clone()),
            loaded: AtomicBool::new(false),
            bus: InMemoryChangeBus::new(),
        }
    }

    /// Install the function that derives root fields from the live children.
    pub fn with_root_recalculation<F>(mut self, recalculate: F) -> Self
    where
        F: Fn(&R, &[C]) -> R + Send + Sync + 'static,
    {
        self.recalculate = Arc::new(recalculate);
        self
    }

    pub fn subscribe(&self) -> Subscription<AggregateEvent<K>> {
        self.bus.subscribe()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::SeqCst)
    }

    /// Load an existing root and its children. Only legal once.
    ///
    /// Either everything is loaded or nothing is: on error the aggregate is
    /// left empty and `load` may be retried.
    pub async fn load(&self, root: R, children: impl IntoIterator<Item = C>) -> StoreResult<()> {
        if self.loaded.swap(true, Ordering::SeqCst) {
            return Err(StoreError::AlreadyLoaded);
        }

        let count = match self.create_loaded(root, children.into_iter().collect()) {
            Ok(count) => count,
            Err(err) => {
                self.loaded.store(false, Ordering::SeqCst);
                tracing::warn!(root = std::any::type_name::<R>(), error = %err, "aggregate load rolled back");
                return Err(err);
            }
        };

        tracing::info!(
            root = std::any::type_name::<R>(),
            children = count,
            "aggregate loaded"
        );

        self.settle(true).await?;
        self.publish(AggregateEvent::Loaded);
        Ok(())
    }

    /// Add a brand-new root. Only legal before the aggregate is loaded.
    pub async fn add_root(&self, root: R) -> StoreResult<()> {
        if self.loaded.swap(true, Ordering::SeqCst) {
            return Err(StoreError::AlreadyLoaded);
        }

        self.root.create_context((), root, Some(LifecycleState::new()))?;

        self.settle(true).await?;
        self.publish(AggregateEvent::RootChanged);
        Ok(())
    }

    /// Add a brand-new child.
    pub async fn add_child(&self, child: C) -> StoreResult<()> {
        let key = child.id().clone();
        self.children
            .create_context(key.clone(), child, Some(LifecycleState::new()))?;

        self.settle(true).await?;
        self.publish(AggregateEvent::ChildChanged(key));
        Ok(())
    }

    /// Dispatch a handler-routed action against the root.
    pub async fn dispatch_root<A>(&self, action: A) -> StoreResult<R>
    where
        A: Action<Key = ()>,
    {
        self.ensure_root()?;
        let result = self.root.dispatch(action).await;
        self.finish_root_dispatch(result).await
    }

    /// Dispatch a self-mutating action against the root.
    pub async fn dispatch_root_mutation<A>(&self, action: A) -> StoreResult<R>
    where
        A: Mutate<R> + Action<Key = ()>,
    {
        self.ensure_root()?;
        let result = self.root.dispatch_mutation(action).await;
        self.finish_root_dispatch(result).await
    }

    /// Dispatch a handler-routed action against a child, creating the child if
    /// its key is unknown.
    pub async fn dispatch_child<A>(&self, action: A) -> StoreResult<C>
    where
        A: Action<Key = K>,
    {
        let key = action.key();
        let result = self.children.dispatch(action).await;
        self.finish_child_dispatch(key, result).await
    }

    /// Dispatch a self-mutating action against a child, creating the child if
    /// its key is unknown.
    pub async fn dispatch_child_mutation<A>(&self, action: A) -> StoreResult<C>
    where
        A: Mutate<C> + Action<Key = K>,
    {
        let key = action.key();
        let result = self.children.dispatch_mutation(action).await;
        self.finish_child_dispatch(key, result).await
    }

    pub async fn mark_root_for_deletion(&self) -> StoreResult<()> {
        self.ensure_root()?;
        self.root.mark_context_for_deletion(&())?;

        self.settle(false).await?;
        self.publish(AggregateEvent::RootChanged);
        Ok(())
    }

    pub async fn mark_child_for_deletion(&self, key: &K) -> StoreResult<()> {
        self.children.mark_context_for_deletion(key)?;

        self.settle(false).await?;
        self.publish(AggregateEvent::ChildChanged(key.clone()));
        Ok(())
    }

    /// Reconcile with a completed external save: drop children flagged for
    /// deletion, then clear the new/mutated flags on everything that remains.
    pub async fn mark_all_persisted(&self) -> StoreResult<()> {
        self.settle(false).await?;

        let doomed: Vec<K> = self
            .children
            .entity_data()
            .into_iter()
            .filter(|(_, data)| data.state().is_marked_for_deletion())
            .map(|(key, _)| key)
            .collect();
        for key in &doomed {
            self.children.clear_context(key)?;
        }

        // Root must reflect the surviving children before its flags are cleared.
        self.settle(true).await?;

        for key in self.children.keys() {
            self.children.mark_context_as_persisted(&key)?;
        }
        if self.root.contains(&()) {
            self.root.mark_context_as_persisted(&())?;
        }

        // Flag-only notifications; the live set is unchanged.
        self.take_child_changes();

        tracing::info!(
            root = std::any::type_name::<R>(),
            removed = doomed.len(),
            remaining = self.children.len(),
            "aggregate persisted"
        );

        self.publish(AggregateEvent::Persisted);
        Ok(())
    }

    /// Current root value.
    ///
    /// # Panics
    ///
    /// Panics if the aggregate has never been loaded; reading the root before
    /// loading it is a programming error. Use [`try_root`](Self::try_root) to
    /// probe instead.
    pub fn root(&self) -> R {
        match self.try_root() {
            Some(root) => root,
            None => panic!(
                "aggregate root of type {} accessed before it was loaded",
                std::any::type_name::<R>()
            ),
        }
    }

    pub fn try_root(&self) -> Option<R> {
        self.root.get_context(&()).map(|ctx| ctx.value())
    }

    pub fn root_data(&self) -> Option<EntityData<R>> {
        self.root.get_context(&()).map(|ctx| ctx.snapshot())
    }

    pub fn child(&self, key: &K) -> Option<C> {
        self.children.get_context(key).map(|ctx| ctx.value())
    }

    /// Child values in registration order, including soft-deleted ones.
    pub fn children(&self) -> Vec<C> {
        self.children.values()
    }

    pub fn children_data(&self) -> Vec<(K, EntityData<C>)> {
        self.children.entity_data()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    async fn finish_root_dispatch(&self, result: StoreResult<R>) -> StoreResult<R> {
        self.settle(true).await?;
        self.publish(AggregateEvent::RootChanged);

        // Report the root as it stands after recalculation.
        result.map(|value| self.try_root().unwrap_or(value))
    }

    async fn finish_child_dispatch(&self, key: K, result: StoreResult<C>) -> StoreResult<C> {
        self.settle(true).await?;
        self.publish(AggregateEvent::ChildChanged(key));
        result
    }

    /// Drain pending child notifications and recalculate the root when any
    /// arrived (or unconditionally when `force`).
    ///
    /// Reading the live children and enqueueing the recalculation happen under
    /// one lock, so recalculations reach the root queue in the order their
    /// inputs were read and the last one always sees the freshest children.
    async fn settle(&self, force: bool) -> StoreResult<()> {
        let pending = {
            let mut changes = self
                .child_changes
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let arrived = changes.drain().len();
            if !force && arrived == 0 {
                return Ok(());
            }
            let Some(root) = self.root.get_context(&()) else {
                return Ok(());
            };

            let live: Vec<C> = self
                .children
                .entity_data()
                .into_iter()
                .filter(|(_, data)| !data.state().is_marked_for_deletion())
                .map(|(_, data)| data.into_value())
                .collect();

            tracing::debug!(
                root = std::any::type_name::<R>(),
                child_changes = arrived,
                live = live.len(),
                "recalculating root"
            );

            let recalculate = self.recalculate.clone();
            root.enqueue(mutation_fn(move |root: &R| Ok(recalculate(root, &live))))?
        };

        pending.await?;
        Ok(())
    }

    fn create_loaded(&self, root: R, children: Vec<C>) -> StoreResult<usize> {
        let mut seen = HashSet::with_capacity(children.len());
        for child in &children {
            let key = child.id();
            if !seen.insert(key.clone()) || self.children.contains(key) {
                return Err(StoreError::already_exists::<C>(key));
            }
        }

        self.root
            .create_context((), root, Some(LifecycleState::existing()))?;

        let mut created = Vec::with_capacity(children.len());
        for child in children {
            let key = child.id().clone();
            match self
                .children
                .create_context(key.clone(), child, Some(LifecycleState::existing()))
            {
                Ok(_) => created.push(key),
                Err(err) => {
                    for key in &created {
                        let _ = self.children.clear_context(key);
                    }
                    let _ = self.root.clear_context(&());
                    self.take_child_changes();
                    return Err(err);
                }
            }
        }

        Ok(created.len())
    }

    fn ensure_root(&self) -> StoreResult<()> {
        if self.root.contains(&()) {
            Ok(())
        } else {
            Err(StoreError::NotLoaded)
        }
    }

    fn take_child_changes(&self) -> Vec<ContextChange<K, C>> {
        self.child_changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
    }

    fn publish(&self, event: AggregateEvent<K>) {
        if let Err(err) = self.bus.publish(event) {
            tracing::warn!(error = ?err, "failed to publish aggregate event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use steward_core::EntityUid;
    use steward_events::Mutation;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Doc {
        title: String,
        words: usize,
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Para {
        id: EntityUid,
        text: String,
    }

    impl Entity for Para {
        type Id = EntityUid;

        fn id(&self) -> &EntityUid {
            &self.id
        }
    }

    fn para(text: &str) -> Para {
        Para {
            id: EntityUid::new(),
            text: text.to_string(),
        }
    }

    fn set_text(id: EntityUid, text: &str) -> Mutation<EntityUid, Para> {
        let text = text.to_string();
        Mutation::new("set-text", id, move |p: &Para| {
            Ok(Para {
                text: text.clone(),
                ..p.clone()
            })
        })
    }

    fn aggregate() -> Aggregate<EntityUid, Doc, Para> {
        Aggregate::new(HandlerTable::new(), HandlerTable::new()).with_root_recalculation(
            |doc: &Doc, paras: &[Para]| Doc {
                words: paras.iter().map(|p| p.text.split_whitespace().count()).sum(),
                ..doc.clone()
            },
        )
    }

    fn doc() -> Doc {
        Doc {
            title: "notes".into(),
            words: 0,
        }
    }

    #[tokio::test]
    async fn load_recalculates_root_from_children() {
        let agg = aggregate();
        agg.load(doc(), [para("aa bb"), para("cc")]).await.unwrap();

        assert!(agg.is_loaded());
        assert_eq!(agg.root().words, 3);
        assert_eq!(agg.child_count(), 2);
    }

    #[tokio::test]
    async fn child_edit_is_reflected_in_root() {
        let agg = aggregate();
        let c1 = para("aa bb");
        let c2 = para("cc");
        agg.load(doc(), [c1, c2.clone()]).await.unwrap();

        let updated = agg
            .dispatch_child_mutation(set_text(c2.id, "cc dd ee"))
            .await
            .unwrap();

        assert_eq!(updated.text, "cc dd ee");
        assert_eq!(agg.root().words, 5);
        assert!(agg.root_data().unwrap().state().is_mutated());
    }

    #[tokio::test]
    async fn loading_twice_is_rejected() {
        let agg = aggregate();
        agg.load(doc(), []).await.unwrap();

        let err = agg.load(doc(), []).await.unwrap_err();
        assert_eq!(err, StoreError::AlreadyLoaded);

        let err = agg.add_root(doc()).await.unwrap_err();
        assert_eq!(err, StoreError::AlreadyLoaded);
    }

    #[tokio::test]
    async fn add_root_marks_new() {
        let agg = aggregate();
        agg.add_root(doc()).await.unwrap();

        let data = agg.root_data().unwrap();
        assert!(data.state().is_new());
        assert_eq!(data.value().words, 0);
    }

    #[test]
    #[should_panic(expected = "accessed before it was loaded")]
    fn reading_root_before_load_panics() {
        let agg = aggregate();
        let _ = agg.root();
    }

    #[tokio::test]
    async fn soft_deleted_child_leaves_recalculation_immediately() {
        let agg = aggregate();
        let c1 = para("one two");
        let c2 = para("three");
        agg.load(doc(), [c1.clone(), c2]).await.unwrap();

        agg.mark_child_for_deletion(&c1.id).await.unwrap();

        assert_eq!(agg.root().words, 1);
        // Still present until persisted.
        assert_eq!(agg.child_count(), 2);
        assert!(agg.children_data()[0].1.state().is_marked_for_deletion());
    }

    #[tokio::test]
    async fn persist_removes_deleted_children_and_clears_flags() {
        let agg = aggregate();
        let kept = para("kept words here");
        let gone = para("gone");
        agg.load(doc(), [kept.clone(), gone.clone()]).await.unwrap();
        agg.add_child(para("fresh")).await.unwrap();
        agg.dispatch_child_mutation(set_text(kept.id, "kept"))
            .await
            .unwrap();
        agg.mark_child_for_deletion(&gone.id).await.unwrap();

        agg.mark_all_persisted().await.unwrap();

        assert!(agg.child(&gone.id).is_none());
        assert_eq!(agg.child_count(), 2);
        assert_eq!(agg.root().words, 2);
        for (_, data) in agg.children_data() {
            assert!(!data.state().is_dirty());
            assert!(!data.state().is_marked_for_deletion());
        }
        assert!(!agg.root_data().unwrap().state().is_dirty());
    }

    #[tokio::test]
    async fn unknown_child_key_creates_default_child() {
        let agg = aggregate();
        agg.load(doc(), []).await.unwrap();
        let id = EntityUid::new();

        let created = agg
            .dispatch_child_mutation(set_text(id, "brand new"))
            .await
            .unwrap();

        assert_eq!(created.text, "brand new");
        assert_eq!(agg.root().words, 2);
        let (_, data) = agg.children_data().remove(0);
        assert!(data.state().is_new());
    }

    #[tokio::test]
    async fn root_mutation_reports_recalculated_root() {
        let agg = aggregate();
        agg.load(doc(), [para("a b c")]).await.unwrap();

        // A root edit cannot override the derived field.
        let root = agg
            .dispatch_root_mutation(Mutation::singleton("retitle", |_: &Doc| {
                Ok(Doc {
                    title: "renamed".into(),
                    words: 99,
                })
            }))
            .await
            .unwrap();

        assert_eq!(root.title, "renamed");
        assert_eq!(root.words, 3);
    }

    #[tokio::test]
    async fn events_follow_operations() {
        let agg = aggregate();
        let mut events = agg.subscribe();
        let c = para("x");

        agg.load(doc(), [c.clone()]).await.unwrap();
        agg.dispatch_child_mutation(set_text(c.id, "x y"))
            .await
            .unwrap();
        agg.mark_root_for_deletion().await.unwrap();
        agg.mark_all_persisted().await.unwrap();

        assert_eq!(
            events.drain(),
            vec![
                AggregateEvent::Loaded,
                AggregateEvent::ChildChanged(c.id),
                AggregateEvent::RootChanged,
                AggregateEvent::Persisted,
            ]
        );
    }

    #[tokio::test]
    async fn debug_output_reports_load_state() {
        let agg = aggregate();
        assert!(format!("{agg:?}").contains("loaded: false"));

        agg.load(doc(), [para("w")]).await.unwrap();
        let rendered = format!("{agg:?}");
        assert!(rendered.starts_with("Aggregate"));
        assert!(rendered.contains("loaded: true"));
    }

    #[tokio::test]
    async fn root_operations_before_load_report_not_loaded() {
        let agg = aggregate();

        let err = agg.mark_root_for_deletion().await.unwrap_err();
        assert_eq!(err, StoreError::NotLoaded);

        let err = agg
            .dispatch_root_mutation(Mutation::singleton("retitle", |d: &Doc| Ok(d.clone())))
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotLoaded);
        assert!(agg.try_root().is_none());
    }

    #[tokio::test]
    async fn load_with_duplicate_child_keys_leaves_aggregate_empty() {
        let agg = aggregate();
        let mut events = agg.subscribe();
        let a = para("a");
        let twin = Para {
            id: a.id,
            text: "b c".into(),
        };

        let err = agg.load(doc(), [a.clone(), twin]).await.unwrap_err();

        assert!(err.is_already_exists());
        assert!(!agg.is_loaded());
        assert!(agg.try_root().is_none());
        assert_eq!(agg.child_count(), 0);
        assert!(events.drain().is_empty());

        agg.load(doc(), [a, para("d e")]).await.unwrap();
        assert_eq!(agg.root().words, 3);
        assert_eq!(agg.child_count(), 2);
    }

    #[tokio::test]
    async fn load_clashing_with_added_child_rolls_back() {
        let agg = aggregate();
        let early = para("early");
        agg.add_child(early.clone()).await.unwrap();

        let err = agg.load(doc(), [early.clone()]).await.unwrap_err();

        assert!(err.is_already_exists());
        assert!(!agg.is_loaded());
        assert!(agg.try_root().is_none());
        assert_eq!(agg.child(&early.id), Some(early));
    }
}
