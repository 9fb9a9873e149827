//! `seeobj`: a single-inheritance, reference-counted object runtime
//!
//! `seeobj` gives Rust types a classic object model: classes that are
//! themselves objects, single inheritance by table copy, and virtual
//! dispatch through function-pointer slots. It provides:
//!
//! - **Reference-counted objects** with atomic incref/decref and a
//!   destroy chain run exactly once
//! - **Class tables** inherited by copy, so un-overridden slots keep the
//!   nearest ancestor's behaviour
//! - **A metaclass** that derives new classes at run time
//! - **Typed construction chains** that run every ancestor root-first and
//!   cannot be skipped
//! - **Exactly-once class registration** safe under concurrent first use
//!
//! # Example
//!
//! ```rust
//! use seeobj::{Base, ClassDef, Construct, Object, RawObject, Result, Runtime};
//! use seeobj::{ObjectClass, no_init, root_parent};
//!
//! seeobj::object! {
//!     pub struct Greeting: RawObject as ObjectClass {
//!         pub text: String,
//!     }
//! }
//!
//! impl Construct for Greeting {
//!     type Args = String;
//!
//!     fn construct(base: Base<'_, RawObject>, text: String) -> Result<Self> {
//!         Ok(Greeting { base: base.construct(())?, text })
//!     }
//! }
//!
//! static GREETING: ClassDef<Greeting> = ClassDef::new("Greeting", root_parent, no_init);
//!
//! let runtime = Runtime::new().unwrap();
//! let class = runtime.class(&GREETING).unwrap();
//! let hello = Object::<Greeting>::new(&class, "hello".to_string()).unwrap();
//!
//! assert_eq!(hello.text, "hello");
//! assert_eq!(hello.class().name(), "Greeting");
//! ```

pub mod error;
pub mod macros;
pub mod runtime;

// Re-export commonly used types
pub use error::{Error, Result};
pub use runtime::{
    Base, Class, ClassDef, ClassStruct, Construct, Constructible, Inherit, MetaClass, Object,
    ObjectClass, ObjectLayout, ParentClass, ROOT_CLASS, RawObject, Runtime, RuntimeConfig,
    deinit, init, init_with, no_init, object_class, root_parent, runtime,
};
