//! Identity of values kept in a keyed registry.

use std::sync::Arc;

/// A value that knows its own registry key.
///
/// Aggregate children implement this so `load`/`add_child` can file them
/// under the right key without the caller passing it separately.
pub trait Entity {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;
}

impl<E: Entity + ?Sized> Entity for Box<E> {
    type Id = E::Id;

    fn id(&self) -> &Self::Id {
        (**self).id()
    }
}

impl<E: Entity + ?Sized> Entity for Arc<E> {
    type Id = E::Id;

    fn id(&self) -> &Self::Id {
        (**self).id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Line {
        no: u32,
    }

    impl Entity for Line {
        type Id = u32;

        fn id(&self) -> &u32 {
            &self.no
        }
    }

    #[test]
    fn smart_pointers_forward_identity() {
        assert_eq!(*Box::new(Line { no: 7 }).id(), 7);
        assert_eq!(*Arc::new(Line { no: 9 }).id(), 9);
    }
}
