//! Chained construction and destruction of instances.
//!
//! Every level of a class hierarchy initializes only its own fields. The
//! parent part is obtained through a one-shot [`Base`] token, which is the
//! only way to produce a parent value, so a level cannot skip its ancestors:
//! construction runs root-first by construction of the types involved.
//!
//! Arguments are typed per level. A level's argument struct embeds its
//! parent's argument struct, so the compiler checks that every ancestor gets
//! exactly the arguments it expects:
//!
//! ```rust
//! use seeobj::{Base, Construct, RawObject, Result};
//!
//! seeobj::object! {
//!     pub struct Named: RawObject as seeobj::ObjectClass {
//!         pub name: String,
//!     }
//! }
//!
//! impl Construct for Named {
//!     type Args = String;
//!
//!     fn construct(base: Base<'_, RawObject>, name: String) -> Result<Self> {
//!         Ok(Named { base: base.construct(())?, name })
//!     }
//! }
//! ```
//!
//! Destruction is plain Rust `Drop`, run leaf-first: the most-derived
//! struct's `Drop`, then its embedded parent's, down to the header, which
//! releases the class.

use crate::error::{Error, Result};
use crate::runtime::class::{Class, ObjectClass};
use crate::runtime::object::{ObjectLayout, RawObject};
use scopeguard::ScopeGuard;
use std::alloc::{Layout, alloc, dealloc};
use std::any::Any;
use std::marker::PhantomData;
use std::ptr::{self, NonNull};
use tracing::trace;

mod sealed {
    pub trait Sealed {}
}

/// Proof that a construction chain was started by the runtime for a class.
///
/// Not constructible outside the runtime.
pub struct Seed<'a> {
    class: &'a Class,
}

/// Types the runtime can build: the header itself and every [`Construct`]
/// type. Sealed.
pub trait Constructible: ObjectLayout + sealed::Sealed {
    /// Arguments for the whole chain, this level's struct at the top.
    type Input: Send + 'static;

    #[doc(hidden)]
    fn build(seed: Seed<'_>, input: Self::Input) -> Result<Self>;
}

impl sealed::Sealed for RawObject {}

/// The root step: a header holding a counted reference on the class being
/// instantiated.
impl Constructible for RawObject {
    type Input = ();

    fn build(seed: Seed<'_>, (): ()) -> Result<Self> {
        Ok(RawObject::owning(seed.class))
    }
}

/// Own-fields construction step of an instance struct.
///
/// # Example
///
/// See the [module documentation](self).
pub trait Construct: ObjectLayout<Parent: Constructible> {
    /// This level's arguments, embedding the parent's.
    type Args: Send + 'static;

    /// Builds `Self`, obtaining the parent part from `base` first.
    ///
    /// Returning an error after `base` was consumed drops the parent part
    /// before the memory is released.
    ///
    /// # Errors
    ///
    /// Any error; [`Error::construction`] is the usual choice.
    fn construct(base: Base<'_, Self::Parent>, args: Self::Args) -> Result<Self>;
}

impl<T: Construct> sealed::Sealed for T {}

impl<T: Construct> Constructible for T {
    type Input = <T as Construct>::Args;

    fn build(seed: Seed<'_>, input: <T as Construct>::Args) -> Result<Self> {
        T::construct(
            Base {
                seed,
                _parent: PhantomData,
            },
            input,
        )
    }
}

/// One-shot token for building the parent part of an instance.
pub struct Base<'a, P: Constructible> {
    seed: Seed<'a>,
    _parent: PhantomData<fn() -> P>,
}

impl<'a, P: Constructible> Base<'a, P> {
    /// Runs the parent's construction chain (root-first) and returns the
    /// parent part.
    ///
    /// # Errors
    ///
    /// Propagates the first failing ancestor step.
    pub fn construct(self, args: P::Input) -> Result<P> {
        P::build(self.seed, args)
    }

    /// The class being instantiated (the most-derived one).
    #[must_use]
    pub fn class(&self) -> &'a ObjectClass {
        self.seed.class
    }
}

/// Default `allocate` slot: uninitialized memory for one instance.
pub(crate) fn allocate_instance(class: &ObjectClass, layout: Layout) -> Result<NonNull<u8>> {
    if layout != class.instance_layout() {
        return Err(Error::InvalidArgument(
            "allocation layout differs from the class instance layout",
        ));
    }

    // SAFETY: every instance layout contains the header, so it is not
    // zero-sized.
    let ptr = unsafe { alloc(layout) };
    NonNull::new(ptr).ok_or(Error::AllocationFailure { size: layout.size() })
}

/// `construct` slot for classes producing `T`.
///
/// Allocates, runs the chain, and writes the value in place. On failure the
/// parts already built are dropped by the chain itself and the memory is
/// released here.
///
/// # Safety
///
/// `class` must produce instances of `T`.
pub(crate) unsafe fn construct_instance<T: Constructible>(
    class: &Class,
    args: &mut dyn Any,
) -> Result<NonNull<RawObject>> {
    let input = args
        .downcast_mut::<Option<T::Input>>()
        .and_then(Option::take)
        .ok_or(Error::InvalidArgument("constructor arguments do not match the class"))?;

    let layout = Layout::new::<T>();
    // SAFETY: allocate slots are only ever filled by the runtime.
    let block = unsafe { (class.allocate)(class, layout)? };
    let block = scopeguard::guard(block, |block| {
        // SAFETY: allocated above with `layout` and never handed out.
        unsafe { dealloc(block.as_ptr(), layout) }
    });

    let value = T::build(Seed { class }, input)?;

    let ptr = ScopeGuard::into_inner(block).cast::<T>();
    // SAFETY: the block is uninitialized memory with the layout of `T`.
    unsafe { ptr.as_ptr().write(value) };

    trace!(class = class.name(), "constructed instance");
    Ok(ptr.cast())
}

/// `destroy` slot for classes producing `T`.
///
/// # Safety
///
/// `obj` must be a `T` allocated by [`construct_instance`] whose count just
/// reached zero.
pub(crate) unsafe fn destroy_instance<T: ObjectLayout>(obj: NonNull<RawObject>) {
    // SAFETY: still live until dropped below.
    let name = unsafe { obj.as_ref() }.class().name();
    trace!(class = name, "destroying instance");

    let ptr = obj.cast::<T>();
    // SAFETY: unique owner; the value was written by `construct_instance`
    // into a block of `T`'s layout.
    unsafe {
        ptr::drop_in_place(ptr.as_ptr());
        dealloc(ptr.as_ptr().cast(), Layout::new::<T>());
    }
}
