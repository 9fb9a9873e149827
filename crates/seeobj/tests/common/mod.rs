// Common test utilities for integration tests
//
// This module provides the class hierarchies shared by the integration
// tests:
// - Shape -> Circle, with an `area` slot and a drop log
// - Tracked, counting its destructions
// - Number, overriding equal/compare/copy
// - A -> B, plain-object classes overriding one behaviour slot each

#![allow(dead_code)]

use parking_lot::Mutex;
use seeobj::{
    Base, Class, ClassDef, Construct, Error, Object, ObjectClass, RawObject, Result, Runtime,
    no_init, root_parent,
};
use std::cmp::Ordering;
use std::f64::consts::PI;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Once};
use tracing_subscriber::EnvFilter;

/// Installs a test-friendly tracing subscriber once per test binary.
///
/// Filter with `RUST_LOG`, e.g. `RUST_LOG=seeobj=trace`.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Creates a fresh runtime with tracing installed.
pub fn runtime() -> Runtime {
    init_tracing();
    Runtime::new().expect("Failed to create runtime")
}

// ============================================================================
// Shape -> Circle
// ============================================================================

/// Destructor log: step name and the class refcount seen by that step.
pub type DropLog = Arc<Mutex<Vec<(&'static str, u32)>>>;

pub fn drop_log() -> DropLog {
    Arc::default()
}

seeobj::class! {
    /// Class struct adding the `area` slot.
    pub struct ShapeClass: ObjectClass {
        pub area: fn(&Object<Shape>) -> f64 = shape_area,
    }
}

fn shape_area(_shape: &Object<Shape>) -> f64 {
    0.0
}

seeobj::object! {
    pub struct Shape: RawObject as ShapeClass {
        log: DropLog,
    }
}

pub struct ShapeArgs {
    pub log: DropLog,
}

impl Construct for Shape {
    type Args = ShapeArgs;

    fn construct(base: Base<'_, RawObject>, args: ShapeArgs) -> Result<Self> {
        Ok(Shape {
            base: base.construct(())?,
            log: args.log,
        })
    }
}

impl Drop for Shape {
    fn drop(&mut self) {
        let refs = self.class().refcount();
        self.log.lock().push(("Shape", refs));
    }
}

seeobj::object! {
    pub struct Circle: Shape as ShapeClass {
        pub radius: f64,
    }
}

pub struct CircleArgs {
    pub shape: ShapeArgs,
    pub radius: f64,
}

impl Construct for Circle {
    type Args = CircleArgs;

    fn construct(base: Base<'_, Shape>, args: CircleArgs) -> Result<Self> {
        let shape = base.construct(args.shape)?;
        if args.radius.is_nan() || args.radius < 0.0 {
            return Err(Error::construction("Circle", "radius must be non-negative"));
        }

        Ok(Circle {
            base: shape,
            radius: args.radius,
        })
    }
}

impl Drop for Circle {
    fn drop(&mut self) {
        let refs = self.class().refcount();
        self.log.lock().push(("Circle", refs));
    }
}

fn circle_area(shape: &Object<Shape>) -> f64 {
    shape
        .downcast_ref::<Circle>()
        .map_or(0.0, |circle| PI * circle.radius * circle.radius)
}

fn circle_init(class: &mut ShapeClass) -> Result<()> {
    class.area = circle_area;
    Ok(())
}

fn shape_parent(runtime: &Runtime) -> Result<Class<ShapeClass>> {
    runtime.class(&SHAPE)
}

pub static SHAPE: ClassDef<Shape> = ClassDef::new("Shape", root_parent, no_init);
pub static CIRCLE: ClassDef<Circle> = ClassDef::new("Circle", shape_parent, circle_init);

/// Dispatches the `area` slot.
pub fn area(shape: &Object<Shape>) -> f64 {
    (shape.class().area)(shape)
}

pub fn new_circle(runtime: &Runtime, log: &DropLog, radius: f64) -> Result<Object<Circle>> {
    let class = runtime.class(&CIRCLE)?;
    Object::new(
        &class,
        CircleArgs {
            shape: ShapeArgs { log: log.clone() },
            radius,
        },
    )
}

// ============================================================================
// Tracked
// ============================================================================

seeobj::object! {
    pub struct Tracked: RawObject as ObjectClass {
        drops: Arc<AtomicUsize>,
    }
}

impl Construct for Tracked {
    type Args = Arc<AtomicUsize>;

    fn construct(base: Base<'_, RawObject>, drops: Arc<AtomicUsize>) -> Result<Self> {
        Ok(Tracked {
            base: base.construct(())?,
            drops,
        })
    }
}

impl Drop for Tracked {
    fn drop(&mut self) {
        self.drops.fetch_add(1, AtomicOrdering::SeqCst);
    }
}

pub static TRACKED: ClassDef<Tracked> = ClassDef::new("Tracked", root_parent, no_init);

/// Creates a tracked object and its destruction counter.
pub fn new_tracked(runtime: &Runtime) -> (Object<Tracked>, Arc<AtomicUsize>) {
    let drops = Arc::new(AtomicUsize::new(0));
    let class = runtime.class(&TRACKED).expect("Failed to derive Tracked");
    let obj = Object::new(&class, drops.clone()).expect("Failed to create Tracked");
    (obj, drops)
}

// ============================================================================
// Number
// ============================================================================

seeobj::object! {
    pub struct Number: RawObject as ObjectClass {
        pub value: i64,
    }
}

impl Construct for Number {
    type Args = i64;

    fn construct(base: Base<'_, RawObject>, value: i64) -> Result<Self> {
        Ok(Number {
            base: base.construct(())?,
            value,
        })
    }
}

fn number_repr(obj: &Object, out: &mut dyn fmt::Write) -> fmt::Result {
    match obj.downcast_ref::<Number>() {
        Some(number) => write!(out, "Number({})", number.value),
        None => out.write_str("Number(?)"),
    }
}

fn number_compare(obj: &Object, other: &Object) -> Result<Ordering> {
    match (obj.downcast_ref::<Number>(), other.downcast_ref::<Number>()) {
        (Some(a), Some(b)) => Ok(a.value.cmp(&b.value)),
        _ => Err(Error::InvalidArgument("numbers only compare with numbers")),
    }
}

fn number_equal(obj: &Object, other: &Object) -> bool {
    number_compare(obj, other).is_ok_and(Ordering::is_eq)
}

fn number_copy(obj: &Object) -> Result<Object> {
    let number = obj
        .downcast_ref::<Number>()
        .ok_or(Error::InvalidArgument("not a number"))?;
    let class = number.class_handle();
    Ok(Object::<Number>::new(&class, number.value)?.into_object())
}

fn number_init(class: &mut ObjectClass) -> Result<()> {
    class.repr = number_repr;
    class.equal = number_equal;
    class.compare = number_compare;
    class.copy = number_copy;
    Ok(())
}

pub static NUMBER: ClassDef<Number> = ClassDef::new("Number", root_parent, number_init);

pub fn new_number(runtime: &Runtime, value: i64) -> Object<Number> {
    let class = runtime.class(&NUMBER).expect("Failed to derive Number");
    Object::new(&class, value).expect("Failed to create Number")
}

// ============================================================================
// A -> B (slot flattening)
// ============================================================================

fn a_repr(_obj: &Object, out: &mut dyn fmt::Write) -> fmt::Result {
    out.write_str("<A>")
}

fn a_init(class: &mut ObjectClass) -> Result<()> {
    class.repr = a_repr;
    Ok(())
}

fn b_equal(_obj: &Object, _other: &Object) -> bool {
    true
}

fn b_init(class: &mut ObjectClass) -> Result<()> {
    class.equal = b_equal;
    Ok(())
}

fn a_parent(runtime: &Runtime) -> Result<Class> {
    runtime.class(&A)
}

pub static A: ClassDef<RawObject> = ClassDef::new("A", root_parent, a_init);
pub static B: ClassDef<RawObject> = ClassDef::new("B", a_parent, b_init);
