//! `seeobj` runtime module.
//!
//! - [`object`]: instance header, handles and reference counting
//! - [`class`]: class tables, the root class and dispatch slots
//! - [`construct`]: the chained construction protocol
//! - [`metaclass`]: the metaclass and class derivation
//! - [`registry`]: exactly-once class registration and runtime lifecycle
//! - [`config`]: runtime configuration

pub mod class;
pub mod config;
pub mod construct;
pub mod metaclass;
pub mod object;
pub mod registry;

pub use class::{
    Ancestors, Class, ClassStruct, CompareFn, CopyFn, EqualFn, Inherit, ObjectClass, ParentClass,
    ROOT_CLASS, ReprFn, object_class,
};
pub use config::RuntimeConfig;
pub use construct::{Base, Construct, Constructible};
pub use metaclass::MetaClass;
pub use object::{Object, ObjectLayout, RawObject};
pub use registry::{
    ClassDef, InitFn, ParentFn, Runtime, deinit, init, init_with, no_init, root_parent, runtime,
};
