//! Class derivation: slot flattening, instance sizing and derive-once.

mod common;

use common::{A, B, CIRCLE, Circle, NUMBER, Number, SHAPE, Shape, ShapeClass, runtime};
use seeobj::{Error, Object, ObjectClass, RawObject, object_class};
use std::mem::size_of;

// ============================================================================
// Slot Flattening
// ============================================================================

#[test]
fn test_inherited_and_overridden_slots() {
    let runtime = runtime();
    let a_class = runtime.class(&A).unwrap();
    let b_class = runtime.class(&B).unwrap();

    let a1 = Object::<RawObject>::new(&a_class, ()).unwrap();
    let a2 = Object::<RawObject>::new(&a_class, ()).unwrap();
    let b1 = Object::<RawObject>::new(&b_class, ()).unwrap();
    let b2 = Object::<RawObject>::new(&b_class, ()).unwrap();

    // S1 (repr): B inherits A's override.
    assert_eq!(a1.repr(), "<A>");
    assert_eq!(b1.repr(), "<A>");

    // S2 (equal): B's own override; A keeps the root's identity.
    assert!(b1.equal(&b2));
    assert!(!a1.equal(&a2));
    assert!(a1.equal(&a1));
}

#[test]
fn test_parent_table_unchanged_by_child_override() {
    let runtime = runtime();
    let a_class = runtime.class(&A).unwrap();
    let b_class = runtime.class(&B).unwrap();

    assert_ne!(a_class.equal as usize, b_class.equal as usize);
    assert_eq!(a_class.repr as usize, b_class.repr as usize);
    assert_eq!(a_class.equal as usize, object_class().equal as usize);
}

#[test]
fn test_added_slot_inherited_across_generations() {
    let runtime = runtime();
    let shape_class = runtime.class(&SHAPE).unwrap();
    let circle_class = runtime.class(&CIRCLE).unwrap();

    // Circle overrides `area` but inherits every root slot through Shape.
    assert_ne!(shape_class.area as usize, circle_class.area as usize);
    assert_eq!(shape_class.repr as usize, circle_class.repr as usize);
    assert_eq!(shape_class.copy as usize, object_class().copy as usize);
}

// ============================================================================
// Instance Sizing
// ============================================================================

#[test]
fn test_each_class_reports_its_own_instance_size() {
    let runtime = runtime();
    let shape_class = runtime.class(&SHAPE).unwrap();
    let circle_class = runtime.class(&CIRCLE).unwrap();

    assert_eq!(object_class().instance_size(), size_of::<RawObject>());
    assert_eq!(shape_class.instance_size(), size_of::<Shape>());
    assert_eq!(circle_class.instance_size(), size_of::<Circle>());
    assert!(circle_class.instance_size() > shape_class.instance_size());
}

#[test]
fn test_class_sizes_follow_class_structs() {
    let runtime = runtime();
    let shape_class = runtime.class(&SHAPE).unwrap();
    let number_class = runtime.class(&NUMBER).unwrap();

    assert_eq!(shape_class.class_size(), size_of::<ShapeClass>());
    assert_eq!(number_class.class_size(), size_of::<ObjectClass>());
}

// ============================================================================
// Derive-Once
// ============================================================================

#[test]
fn test_second_derive_into_same_slot_is_rejected() {
    let runtime = runtime();
    let meta = runtime.metaclass();
    let mut slot = None;

    meta.derive::<Number>(&mut slot, "First", &object_class(), |_| Ok(()))
        .unwrap();
    let first = slot.as_ref().unwrap().clone();

    let err = meta
        .derive::<Number>(&mut slot, "Second", &object_class(), |_| Ok(()))
        .unwrap_err();

    assert_eq!(
        err,
        Error::InvalidArgument("output class slot is already populated")
    );
    let stored = slot.unwrap();
    assert!(stored.ptr_eq(&first));
    assert_eq!(stored.name(), "First");
}

#[test]
fn test_failed_init_publishes_nothing() {
    let runtime = runtime();
    let meta = runtime.metaclass();
    let before = meta.refcount();
    let mut slot = None;

    let err = meta
        .derive::<Number>(&mut slot, "Broken", &object_class(), |_| {
            Err(Error::construction("Broken", "refused"))
        })
        .unwrap_err();

    assert_eq!(err, Error::construction("Broken", "refused"));
    assert!(slot.is_none());
    assert_eq!(meta.refcount(), before);
}

#[test]
fn test_derive_from_registered_parent() {
    let runtime = runtime();
    let shape_class = runtime.class(&SHAPE).unwrap();
    let mut slot = None;

    runtime
        .metaclass()
        .derive::<Circle>(&mut slot, "Ring", &shape_class, |_| Ok(()))
        .unwrap();
    let ring = slot.unwrap();

    assert!(ring.is_subclass_of(&shape_class));
    assert_eq!(ring.instance_size(), size_of::<Circle>());
    // Not registered: the registry only tracks definitions.
    assert_eq!(runtime.registered(), ["Shape"]);
}

// ============================================================================
// Introspection
// ============================================================================

#[test]
fn test_class_as_views() {
    let runtime = runtime();
    let log = common::drop_log();
    let circle = common::new_circle(&runtime, &log, 1.0).unwrap();

    assert!(circle.class_as::<ShapeClass>().is_some());
    assert!(circle.class_as::<ObjectClass>().is_some());

    let number = common::new_number(&runtime, 1);
    assert!(number.class_as::<ShapeClass>().is_none());
}

#[test]
fn test_is_instance_of() {
    let runtime = runtime();
    let log = common::drop_log();
    let circle = common::new_circle(&runtime, &log, 1.0).unwrap();
    let shape_class = runtime.class(&SHAPE).unwrap();
    let number_class = runtime.class(&NUMBER).unwrap();

    assert!(circle.is_instance_of(&shape_class));
    assert!(circle.is_instance_of(&object_class()));
    assert!(!circle.is_instance_of(&number_class));
}

#[test]
fn test_classes_are_instances_of_metaclass() {
    let runtime = runtime();
    let shape_class = runtime.class(&SHAPE).unwrap();
    let meta = runtime.metaclass();

    assert!(std::ptr::eq(shape_class.metaclass(), meta.as_root_class().as_ptr()));
    assert!(shape_class.is_instance_of(meta));
    assert_eq!(meta.parent().map(ObjectClass::name), Some("Object"));
}
