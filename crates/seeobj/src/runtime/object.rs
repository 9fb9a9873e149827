//! Object representation and reference counting for the `seeobj` runtime.
//!
//! This module implements the instance side of the object system:
//! - The `#[repr(C)]` object header ([`RawObject`]) every instance starts with
//! - The [`ObjectLayout`] contract tying an instance struct to its parent
//! - The reference-counted handle ([`Object`]) user code holds
//! - The default `incref`/`decref` slots installed in the root class
//!
//! # Architecture
//!
//! An instance is a single heap block laid out as its most-derived struct.
//! That struct embeds its parent struct as the first field, recursively, so
//! the block always begins with a [`RawObject`] header:
//! - The header points at the instance's class
//! - The header carries an atomic reference count (starts at 1)
//! - The header holds a counted reference on its class, so a class can never
//!   be destroyed while one of its instances is alive
//!
//! Reference counting is dispatched through the class's `incref`/`decref`
//! slots. When the count reaches zero the class's `destroy` slot drops the
//! instance in place and frees its memory.
//!
//! # Thread Safety
//!
//! Handles are `Send + Sync`:
//! - incref/decref are atomic (AcqRel ordering)
//! - The thread whose decrement reaches zero is the unique owner when
//!   `destroy` runs
//! - Instance fields are immutable through handles; use interior mutability
//!   for shared mutable state

use crate::error::{Error, Result};
use crate::runtime::class::{Class, ClassStruct, ObjectClass, object_class};
use crate::runtime::construct::Constructible;
use std::any::TypeId;
use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::marker::PhantomData;
use std::mem::ManuallyDrop;
use std::ops::Deref;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU32, Ordering};

/// Header flag: refcount operations are no-ops (the static root class).
pub(crate) const IMMORTAL: u32 = 1 << 0;

/// Header flag: the header holds a counted reference on its class.
pub(crate) const OWNS_CLASS: u32 = 1 << 1;

/// Object header shared by every instance, classes included.
///
/// Instance structs embed their parent as the first field, so every instance
/// pointer is also a valid `RawObject` pointer. A `RawObject` can only be
/// produced by the runtime: the root step of the construction chain or the
/// metaclass.
#[repr(C)]
pub struct RawObject {
    /// Class this object is an instance of.
    class: NonNull<ObjectClass>,
    /// `IMMORTAL` / `OWNS_CLASS`.
    flags: u32,
    /// Reference count (starts at 1, destroyed when it reaches 0).
    refcount: AtomicU32,
}

impl RawObject {
    /// Header for a statically allocated, never-freed object.
    pub(crate) const fn immortal(class: NonNull<ObjectClass>) -> Self {
        RawObject {
            class,
            flags: IMMORTAL,
            refcount: AtomicU32::new(1),
        }
    }

    /// Header that points at `class` without holding a reference on it.
    ///
    /// Only used for the metaclass, which is its own class.
    pub(crate) const fn detached(class: NonNull<ObjectClass>) -> Self {
        RawObject {
            class,
            flags: 0,
            refcount: AtomicU32::new(1),
        }
    }

    /// Header for a fresh object of `class`, holding one reference on it.
    pub(crate) fn owning(class: &Class) -> Self {
        let class = class.clone();

        RawObject {
            class: class.into_raw(),
            flags: OWNS_CLASS,
            refcount: AtomicU32::new(1),
        }
    }

    /// Header pointing at the same class as `self`, holding its own
    /// reference on it.
    pub(crate) fn share(&self) -> Self {
        // SAFETY: the class is live while `self` is (counted, immortal, or
        // `self` is the class itself); the reference taken here belongs to
        // the new header.
        unsafe { retain(self.class.cast()) };

        RawObject {
            class: self.class,
            flags: OWNS_CLASS,
            refcount: AtomicU32::new(1),
        }
    }

    /// Returns the class this object is an instance of.
    #[must_use]
    pub fn class(&self) -> &ObjectClass {
        // SAFETY: the class is kept alive by the counted reference in this
        // header, or it is the immortal root, or it is this object itself.
        unsafe { self.class.as_ref() }
    }

    /// Returns the current reference count (for testing/debugging).
    ///
    /// The value can change concurrently through other handles.
    #[must_use]
    pub fn refcount(&self) -> u32 {
        self.refcount.load(Ordering::Acquire)
    }

    /// Returns `true` for the statically allocated root class.
    #[must_use]
    pub fn is_immortal(&self) -> bool {
        self.flags & IMMORTAL != 0
    }
}

impl Drop for RawObject {
    fn drop(&mut self) {
        if self.flags & OWNS_CLASS != 0 {
            // SAFETY: `owning` stored a pointer taken from a handle whose
            // reference it kept; rebuilding the handle gives it back.
            drop(unsafe { Class::from_raw(self.class) });
        }
    }
}

// SAFETY: the class pointer targets a class that is immutable once published
// and kept alive by the header's counted reference; the refcount is atomic.
unsafe impl Send for RawObject {}

// SAFETY: see `Send`; shared access never mutates anything but the atomic
// refcount.
unsafe impl Sync for RawObject {}

impl fmt::Debug for RawObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawObject")
            .field("class", &self.class().name())
            .field("refcount", &self.refcount())
            .finish()
    }
}

/// Layout contract between an instance struct and its parent.
///
/// Implemented by the [`object!`](crate::object) macro; hand-written
/// implementations must uphold the safety contract below.
///
/// # Safety
///
/// - `Self` is `#[repr(C)]` and its first field is of type `Self::Parent`
///   (so a pointer to `Self` is a valid pointer to every ancestor, down to
///   the [`RawObject`] header). Only [`RawObject`] is its own parent.
/// - `Self::Class` is the class struct whose classes produce `Self`.
pub unsafe trait ObjectLayout: Sized + Send + Sync + 'static {
    /// The embedded parent struct.
    type Parent: ObjectLayout;

    /// The class struct describing instances of `Self`.
    type Class: ClassStruct;

    /// Returns `true` if `id` names `Self` or one of its ancestors.
    ///
    /// Stored in classes as the run-time instance check used by downcasts.
    #[doc(hidden)]
    fn is_layout_of(id: TypeId) -> bool {
        id == TypeId::of::<Self>()
            || (TypeId::of::<Self::Parent>() != TypeId::of::<Self>()
                && <Self::Parent as ObjectLayout>::is_layout_of(id))
    }
}

// SAFETY: the header is the bottom of every chain.
unsafe impl ObjectLayout for RawObject {
    type Parent = RawObject;
    type Class = ObjectClass;
}

/// Increments the count through the object's class (`incref` slot).
///
/// # Safety
///
/// `obj` must point at a live object the caller holds a reference on.
pub(crate) unsafe fn retain(obj: NonNull<RawObject>) {
    // SAFETY: guaranteed live by the caller.
    let incref = unsafe { obj.as_ref() }.class().incref;
    // SAFETY: slots are only ever filled with runtime functions.
    unsafe { incref(obj) }
}

/// Decrements the count through the object's class (`decref` slot).
///
/// # Safety
///
/// `obj` must point at a live object and the caller gives up one reference.
pub(crate) unsafe fn release(obj: NonNull<RawObject>) {
    // SAFETY: guaranteed live by the caller.
    let decref = unsafe { obj.as_ref() }.class().decref;
    // SAFETY: slots are only ever filled with runtime functions.
    unsafe { decref(obj) }
}

/// Default `incref` slot.
///
/// # Panics
///
/// Panics if the reference count overflows `u32::MAX`.
pub(crate) unsafe fn object_incref(obj: NonNull<RawObject>) {
    // SAFETY: the caller holds a reference, so the header is live.
    let raw = unsafe { obj.as_ref() };
    if raw.is_immortal() {
        return;
    }

    let old = raw.refcount.fetch_add(1, Ordering::AcqRel);
    if old == u32::MAX {
        panic!("Reference count overflow in Object::incref");
    }
}

/// Default `decref` slot: destroys the object on the 1 -> 0 transition.
pub(crate) unsafe fn object_decref(obj: NonNull<RawObject>) {
    // SAFETY: the caller holds a reference, so the header is live.
    let raw = unsafe { obj.as_ref() };
    if raw.is_immortal() {
        return;
    }

    if raw.refcount.fetch_sub(1, Ordering::AcqRel) == 1 {
        let destroy = raw.class().destroy;
        // SAFETY: the count just reached zero, so this caller is the unique
        // owner and nobody can observe the object any more.
        unsafe { destroy(obj) };
    }
}

/// Reference-counted handle to an instance.
///
/// `T` is the static view of the instance: the most-derived struct or any of
/// its ancestors. `Object` with no parameter is the root view.
///
/// # Memory Layout
///
/// A handle is a single pointer. Cloning it increments the instance's
/// reference count through the class's `incref` slot; dropping it
/// decrements through `decref`. No handle can observe an object whose count
/// reached zero.
///
/// # Thread Safety
///
/// Handles can be sent and shared across threads; the count is atomic.
///
/// # Example
///
/// ```rust
/// use seeobj::Object;
///
/// let obj1 = Object::create().unwrap();
///
/// // Clone creates a new reference to the same object
/// let obj2 = obj1.clone();
/// assert_eq!(obj1.refcount(), 2);
/// assert!(obj1.ptr_eq(&obj2));
///
/// drop(obj2);
/// assert_eq!(obj1.refcount(), 1);
/// ```
#[repr(transparent)]
pub struct Object<T: ObjectLayout = RawObject> {
    /// Never null, valid while this handle exists.
    ptr: NonNull<T>,
    _marker: PhantomData<T>,
}

impl<T: Constructible> Object<T> {
    /// Creates a new instance of `class`, running the full construction
    /// chain root-first.
    ///
    /// Allocation and construction are one step: either a fully built
    /// object with refcount 1 comes back, or nothing was created.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `class` does not produce instances of `T`
    /// - `AllocationFailure` if the instance memory cannot be allocated
    /// - whatever a construction step returned; every part built before
    ///   the failure has already been dropped
    pub fn new(class: &Class<T::Class>, args: T::Input) -> Result<Self> {
        if !class.as_root().instance_is::<T>() {
            return Err(Error::InvalidArgument(
                "class does not produce instances of the requested type",
            ));
        }

        let raw = class.as_root_class().construct_erased(&mut Some(args))?;
        // SAFETY: the class builds `T` instances, checked above.
        Ok(unsafe { Object::from_raw(raw.cast()) })
    }
}

impl Object<RawObject> {
    /// Creates a plain instance of the root class.
    ///
    /// # Errors
    ///
    /// Returns `AllocationFailure` if the allocator fails.
    pub fn create() -> Result<Self> {
        Object::new(&object_class(), ())
    }
}

impl<T: ObjectLayout> Object<T> {
    /// Wraps a pointer whose reference the caller hands over.
    ///
    /// # Safety
    ///
    /// `ptr` must point at a live object laid out as `T` (or a descendant)
    /// and the caller must own one reference on it.
    pub(crate) unsafe fn from_raw(ptr: NonNull<T>) -> Self {
        Object {
            ptr,
            _marker: PhantomData,
        }
    }

    /// Gives up the handle without decrementing, returning its pointer.
    pub(crate) fn into_raw(self) -> NonNull<T> {
        ManuallyDrop::new(self).ptr
    }

    /// Reinterprets the handle as another view of the same object.
    ///
    /// # Safety
    ///
    /// The object must be laid out as `U` or a descendant of `U`.
    pub(crate) unsafe fn cast_unchecked<U: ObjectLayout>(self) -> Object<U> {
        // SAFETY: the reference moves to the new handle unchanged.
        unsafe { Object::from_raw(self.into_raw().cast()) }
    }

    /// Pointer to the header of this object.
    pub(crate) fn header_ptr(&self) -> NonNull<RawObject> {
        self.ptr.cast()
    }

    fn header(&self) -> &RawObject {
        // SAFETY: every layout starts with the header.
        unsafe { self.header_ptr().as_ref() }
    }

    /// Returns the address of the object.
    #[must_use]
    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    /// Takes another reference to the object (the `incref` operation).
    ///
    /// Equivalent to `clone()`: the returned handle aliases the same object.
    ///
    /// # Panics
    ///
    /// Panics if the reference count overflows `u32::MAX`.
    #[must_use]
    pub fn incref(&self) -> Self {
        self.clone()
    }

    /// Gives up this reference (the `decref` operation).
    ///
    /// If it was the last one the class's destroy chain runs and the memory
    /// is released.
    pub fn decref(self) {
        drop(self);
    }

    /// Returns the current reference count (for testing/debugging).
    #[must_use]
    pub fn refcount(&self) -> u32 {
        self.header().refcount()
    }

    /// Returns the object's class, viewed as the class struct for `T`.
    ///
    /// Dispatch goes through this table: reading a slot and calling it with
    /// the object is the only dispatch mechanism.
    #[must_use]
    pub fn class(&self) -> &T::Class {
        let class = ptr::from_ref(self.header().class());
        // SAFETY: a class producing `T` (or a descendant) is laid out with
        // `T::Class` as a prefix; derivation checks this.
        unsafe { &*class.cast::<T::Class>() }
    }

    /// Returns the object's class viewed as `C`, if its class struct
    /// extends `C`.
    #[must_use]
    pub fn class_as<C: ClassStruct>(&self) -> Option<&C> {
        let class = self.header().class();
        if !class.class_is::<C>() {
            return None;
        }

        // SAFETY: checked above that the class block starts with `C`.
        Some(unsafe { &*ptr::from_ref(class).cast::<C>() })
    }

    /// Returns a new counted handle to the object's class.
    #[must_use]
    pub fn class_handle(&self) -> Class<T::Class> {
        let class = self.header().class;
        // SAFETY: the header keeps the class alive; the retained reference
        // moves into the new handle.
        unsafe {
            retain(class.cast());
            Object::from_raw(class.cast())
        }
    }

    /// Converts into a handle typed as the parent struct.
    #[must_use]
    pub fn upcast(self) -> Object<T::Parent> {
        // SAFETY: `T` starts with `T::Parent`.
        unsafe { self.cast_unchecked() }
    }

    /// Borrows the handle typed as the parent struct.
    #[must_use]
    pub fn as_base(&self) -> &Object<T::Parent> {
        // SAFETY: `Object` is a transparent pointer and `T` starts with
        // `T::Parent`.
        unsafe { &*ptr::from_ref(self).cast::<Object<T::Parent>>() }
    }

    /// Borrows the handle as the root view.
    #[must_use]
    pub fn as_object(&self) -> &Object {
        // SAFETY: every layout starts with the header.
        unsafe { &*ptr::from_ref(self).cast::<Object>() }
    }

    /// Converts into the root view.
    #[must_use]
    pub fn into_object(self) -> Object {
        // SAFETY: every layout starts with the header.
        unsafe { self.cast_unchecked() }
    }

    /// Returns `true` if the object is laid out as `U` (it is a `U` or a
    /// descendant of `U`).
    #[must_use]
    pub fn is<U: ObjectLayout>(&self) -> bool {
        (self.header().class().instance_has)(TypeId::of::<U>())
    }

    /// Converts into a handle typed as `U`, checked against the object's
    /// class.
    ///
    /// # Errors
    ///
    /// Gives the handle back unchanged if the object is not a `U`.
    pub fn downcast<U: ObjectLayout>(self) -> std::result::Result<Object<U>, Self> {
        if self.is::<U>() {
            // SAFETY: checked above.
            Ok(unsafe { self.cast_unchecked() })
        } else {
            Err(self)
        }
    }

    /// Borrows the handle typed as `U`, checked against the object's class.
    #[must_use]
    pub fn downcast_ref<U: ObjectLayout>(&self) -> Option<&Object<U>> {
        if self.is::<U>() {
            // SAFETY: checked above; `Object` is a transparent pointer.
            Some(unsafe { &*ptr::from_ref(self).cast::<Object<U>>() })
        } else {
            None
        }
    }

    /// Returns `true` if the object's class is `class` or derives from it.
    #[must_use]
    pub fn is_instance_of<C: ClassStruct>(&self, class: &Class<C>) -> bool {
        self.header().class().is_subclass_of(class.as_root())
    }

    /// Returns `true` if both handles point at the same object.
    #[must_use]
    pub fn ptr_eq<U: ObjectLayout>(&self, other: &Object<U>) -> bool {
        self.header_ptr() == other.header_ptr()
    }

    /// Renders the object through its class's `repr` slot.
    #[must_use]
    pub fn repr(&self) -> String {
        self.to_string()
    }

    /// Compares two objects through this object's `equal` slot.
    #[must_use]
    pub fn equal<U: ObjectLayout>(&self, other: &Object<U>) -> bool {
        (self.header().class().equal)(self.as_object(), other.as_object())
    }

    /// Orders two objects through this object's `compare` slot.
    ///
    /// # Errors
    ///
    /// The root default refuses with `Unsupported`.
    pub fn compare<U: ObjectLayout>(&self, other: &Object<U>) -> Result<CmpOrdering> {
        (self.header().class().compare)(self.as_object(), other.as_object())
    }

    /// `self < other` through the `compare` slot.
    ///
    /// # Errors
    ///
    /// Propagates the `compare` slot's error.
    pub fn less<U: ObjectLayout>(&self, other: &Object<U>) -> Result<bool> {
        Ok(self.compare(other)?.is_lt())
    }

    /// `self <= other` through the `compare` slot.
    ///
    /// # Errors
    ///
    /// Propagates the `compare` slot's error.
    pub fn less_equal<U: ObjectLayout>(&self, other: &Object<U>) -> Result<bool> {
        Ok(self.compare(other)?.is_le())
    }

    /// `self > other` through the `compare` slot.
    ///
    /// # Errors
    ///
    /// Propagates the `compare` slot's error.
    pub fn greater<U: ObjectLayout>(&self, other: &Object<U>) -> Result<bool> {
        Ok(self.compare(other)?.is_gt())
    }

    /// `self >= other` through the `compare` slot.
    ///
    /// # Errors
    ///
    /// Propagates the `compare` slot's error.
    pub fn greater_equal<U: ObjectLayout>(&self, other: &Object<U>) -> Result<bool> {
        Ok(self.compare(other)?.is_ge())
    }

    /// Produces an independent copy through the class's `copy` slot.
    ///
    /// # Errors
    ///
    /// - `Unsupported` from the root default
    /// - `InvalidArgument` if the slot returned an object that is not a `T`
    pub fn copy(&self) -> Result<Self> {
        let copy = (self.header().class().copy)(self.as_object())?;
        copy.downcast::<T>()
            .map_err(|_| Error::InvalidArgument("copy slot returned an object of an unrelated class"))
    }
}

// SAFETY: the count is atomic and `T: Send + Sync` is required by
// `ObjectLayout`.
unsafe impl<T: ObjectLayout> Send for Object<T> {}

// SAFETY: shared handles only give out `&T`, and `T: Sync`.
unsafe impl<T: ObjectLayout> Sync for Object<T> {}

impl<T: ObjectLayout> Clone for Object<T> {
    fn clone(&self) -> Self {
        // SAFETY: this handle keeps the object alive.
        unsafe { retain(self.header_ptr()) };

        Object {
            ptr: self.ptr,
            _marker: PhantomData,
        }
    }
}

impl<T: ObjectLayout> Drop for Object<T> {
    fn drop(&mut self) {
        // SAFETY: this handle owns one reference and gives it up here.
        unsafe { release(self.header_ptr()) };
    }
}

impl<T: ObjectLayout> Deref for Object<T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: the object is live and fully constructed while a handle
        // exists.
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: ObjectLayout, U: ObjectLayout> PartialEq<Object<U>> for Object<T> {
    fn eq(&self, other: &Object<U>) -> bool {
        self.equal(other)
    }
}

impl<T: ObjectLayout> fmt::Display for Object<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (self.header().class().repr)(self.as_object(), f)
    }
}

impl<T: ObjectLayout> fmt::Debug for Object<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("class", &self.header().class().name())
            .field("refcount", &self.refcount())
            .finish()
    }
}
