//! Property-based tests for reference counting and derivation chains.

mod common;

use common::{new_tracked, runtime};
use proptest::prelude::*;
use seeobj::{Class, Object, RawObject, object_class};
use std::sync::atomic::Ordering;

proptest! {
    /// Any interleaving of balanced increments and decrements leaves the
    /// count at 1 and the object alive.
    #[test]
    fn prop_balanced_refcount(ops in prop::collection::vec(any::<bool>(), 0..64)) {
        let runtime = runtime();
        let (obj, drops) = new_tracked(&runtime);
        let mut extras = Vec::new();

        for grow in ops {
            if grow || extras.is_empty() {
                extras.push(obj.incref());
            } else if let Some(extra) = extras.pop() {
                extra.decref();
            }
            prop_assert_eq!(obj.refcount() as usize, 1 + extras.len());
        }

        drop(extras);
        prop_assert_eq!(obj.refcount(), 1);
        prop_assert_eq!(drops.load(Ordering::SeqCst), 0);

        drop(obj);
        prop_assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    /// A chain of derived classes keeps its depth, its ancestry and the
    /// slot set by the first overriding generation.
    #[test]
    fn prop_derivation_chain(depth in 1usize..12, override_at in 0usize..12) {
        let runtime = runtime();
        let meta = runtime.metaclass();
        let mut chain: Vec<Class> = vec![object_class()];

        for level in 0..depth {
            let mut slot = None;
            meta.derive::<RawObject>(&mut slot, "Level", &chain[level], |class| {
                if level == override_at {
                    class.repr = |_, out| out.write_str("<overridden>");
                }
                Ok(())
            })
            .unwrap();
            chain.push(slot.unwrap());
        }

        let leaf = chain.last().unwrap();
        prop_assert_eq!(leaf.depth(), depth);
        prop_assert!(chain.iter().all(|class| leaf.is_subclass_of(class)));

        let obj = Object::<RawObject>::new(leaf, ()).unwrap();
        let overridden = override_at < depth;
        prop_assert_eq!(obj.repr() == "<overridden>", overridden);
        prop_assert!(chain.iter().all(|class| obj.is_instance_of(class)));
    }
}
