//! Class tables and dispatch for the `seeobj` runtime.
//!
//! This module implements the class side of the object system:
//! - The root class table ([`ObjectClass`]) and its static instance
//!   ([`ROOT_CLASS`])
//! - The default slots every class inherits
//! - The [`ClassStruct`] and [`Inherit`] contracts for derived class tables
//! - Inheritance chain walking
//!
//! # Architecture
//!
//! A class is itself an object: every class table starts with a
//! [`RawObject`] header whose class is the metaclass (or, for the root, the
//! root itself). A derived class struct embeds its parent class struct as
//! its first field, so any class can be viewed as an [`ObjectClass`].
//!
//! Dispatch is by slot: reading `object.class().<slot>` and calling it with
//! the object. A derived class starts as a copy of its parent's table, so
//! every slot it does not override keeps the nearest ancestor's function,
//! across any number of generations.
//!
//! Slots split in two groups:
//! - Runtime-owned (`allocate`, `construct`, `destroy`, `incref`, `decref`):
//!   installed by the metaclass for the class's instance type, never
//!   overridden by class init callbacks
//! - Behaviour (`repr`, `equal`, `compare`, `copy`): public, freely
//!   overridden by init callbacks
//!
//! # Thread Safety
//!
//! A class is immutable once published. Handles are reference counted like
//! any other object; the root class is immortal.

use crate::error::{Error, Result};
use crate::runtime::construct::{Constructible, allocate_instance, construct_instance, destroy_instance};
use crate::runtime::metaclass::drop_class_block;
use crate::runtime::object::{Object, ObjectLayout, RawObject, object_decref, object_incref};
use std::alloc::Layout;
use std::any::{Any, TypeId};
use std::cmp::Ordering as CmpOrdering;
use std::fmt;
use std::iter::FusedIterator;
use std::ptr::{self, NonNull};

/// Counted handle to a class.
///
/// `Class` with no parameter is the root view of any class.
pub type Class<C = ObjectClass> = Object<C>;

/// The class struct of the parent of instance struct `T`.
pub type ParentClass<T> = <<T as ObjectLayout>::Parent as ObjectLayout>::Class;

/// Allocates raw memory for an instance (or, in the metaclass, a class).
pub(crate) type AllocateFn = unsafe fn(&ObjectClass, Layout) -> Result<NonNull<u8>>;

/// Type-erased construction entry point; `args` carries `Option<Input>`.
pub(crate) type ConstructFn = unsafe fn(&Class, &mut dyn Any) -> Result<NonNull<RawObject>>;

/// Drops an instance whose count reached zero and releases its memory.
pub(crate) type DestroyFn = unsafe fn(NonNull<RawObject>);

/// `incref` / `decref` slot.
pub(crate) type RefCountFn = unsafe fn(NonNull<RawObject>);

/// Drops a class block laid out as its own class struct.
pub(crate) type DropClassFn = unsafe fn(NonNull<ObjectClass>);

/// `repr` slot: writes a human-readable rendering of the object.
pub type ReprFn = fn(&Object, &mut dyn fmt::Write) -> fmt::Result;

/// `equal` slot.
pub type EqualFn = fn(&Object, &Object) -> bool;

/// `compare` slot.
pub type CompareFn = fn(&Object, &Object) -> Result<CmpOrdering>;

/// `copy` slot: returns a new, independent object.
pub type CopyFn = fn(&Object) -> Result<Object>;

/// The root class table.
///
/// Every class struct starts with an `ObjectClass`, directly or through its
/// parent class struct.
///
/// # Memory Layout
///
/// `#[repr(C)]`, header first. The private fields describe the instances
/// the class produces and are stamped by the metaclass at derivation time.
#[repr(C)]
pub struct ObjectClass {
    /// Header: this table is an instance of its metaclass.
    pub(crate) object: RawObject,
    /// Parent class (`None` only for the root).
    pub(crate) parent: Option<Class>,
    /// Class name used by `repr` and diagnostics.
    pub(crate) name: &'static str,
    /// Layout of the instances this class produces.
    pub(crate) instance_layout: Layout,
    /// Layout of this class table itself.
    pub(crate) class_layout: Layout,
    /// Exact instance type.
    pub(crate) instance_type: fn() -> TypeId,
    /// Instance type or one of its ancestors.
    pub(crate) instance_has: fn(TypeId) -> bool,
    /// Class struct type or one of its ancestors.
    pub(crate) class_has: fn(TypeId) -> bool,
    /// Drop glue for this table's own class struct.
    pub(crate) drop_class: DropClassFn,
    pub(crate) allocate: AllocateFn,
    pub(crate) construct: ConstructFn,
    pub(crate) destroy: DestroyFn,
    pub(crate) incref: RefCountFn,
    pub(crate) decref: RefCountFn,
    /// Renders an object. Default: `<Name object at 0x...>`.
    pub repr: ReprFn,
    /// Equality. Default: identity.
    pub equal: EqualFn,
    /// Ordering. Default: `Unsupported`.
    pub compare: CompareFn,
    /// Copy. Default: `Unsupported`.
    pub copy: CopyFn,
}

/// The root class: the only class without a parent.
///
/// Statically allocated, an instance of itself, and immortal: reference
/// count operations on it are no-ops. Plain root objects are created with
/// [`Object::create`].
pub static ROOT_CLASS: ObjectClass = ObjectClass {
    // SAFETY: the address of a static is never null.
    object: RawObject::immortal(unsafe {
        NonNull::new_unchecked(ptr::addr_of!(ROOT_CLASS).cast_mut())
    }),
    parent: None,
    name: "Object",
    instance_layout: Layout::new::<RawObject>(),
    class_layout: Layout::new::<ObjectClass>(),
    instance_type: TypeId::of::<RawObject>,
    instance_has: <RawObject as ObjectLayout>::is_layout_of,
    class_has: <ObjectClass as ObjectLayout>::is_layout_of,
    drop_class: drop_class_block::<ObjectClass>,
    allocate: allocate_instance,
    construct: construct_instance::<RawObject>,
    destroy: destroy_instance::<RawObject>,
    incref: object_incref,
    decref: object_decref,
    repr: object_repr,
    equal: object_equal,
    compare: object_compare,
    copy: object_copy,
};

/// Returns a handle to the root class.
///
/// # Example
///
/// ```rust
/// use seeobj::object_class;
///
/// let root = object_class();
/// assert_eq!(root.name(), "Object");
/// assert!(root.parent().is_none());
/// ```
#[must_use]
pub fn object_class() -> Class {
    // SAFETY: the root is immortal, so the handle needs no counted reference.
    unsafe { Object::from_raw(NonNull::from(&ROOT_CLASS)) }
}

fn object_repr(obj: &Object, out: &mut dyn fmt::Write) -> fmt::Result {
    write!(out, "<{} object at {:p}>", obj.class().name(), obj.as_ptr())
}

fn object_equal(obj: &Object, other: &Object) -> bool {
    obj.ptr_eq(other)
}

fn object_compare(obj: &Object, _other: &Object) -> Result<CmpOrdering> {
    Err(Error::Unsupported {
        operation: "compare",
        class: obj.class().name(),
    })
}

fn object_copy(obj: &Object) -> Result<Object> {
    Err(Error::Unsupported {
        operation: "copy",
        class: obj.class().name(),
    })
}

impl ObjectClass {
    /// Returns the class name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the parent class, or `None` for the root.
    #[must_use]
    pub fn parent(&self) -> Option<&ObjectClass> {
        self.parent.as_deref()
    }

    /// Returns a counted handle to the parent class.
    #[must_use]
    pub fn parent_handle(&self) -> Option<Class> {
        self.parent.clone()
    }

    /// Returns `true` for the root class.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Size in bytes of the instances this class produces.
    #[must_use]
    pub fn instance_size(&self) -> usize {
        self.instance_layout.size()
    }

    /// Layout of the instances this class produces.
    #[must_use]
    pub fn instance_layout(&self) -> Layout {
        self.instance_layout
    }

    /// Size in bytes of this class table.
    #[must_use]
    pub fn class_size(&self) -> usize {
        self.class_layout.size()
    }

    /// Returns the class's own reference count (for testing/debugging).
    #[must_use]
    pub fn refcount(&self) -> u32 {
        self.object.refcount()
    }

    /// Returns the class of this class (the metaclass, or the root itself).
    #[must_use]
    pub fn metaclass(&self) -> &ObjectClass {
        self.object.class()
    }

    /// Returns `true` if this class produces instances of exactly `T`.
    #[must_use]
    pub fn instance_is<T: ObjectLayout>(&self) -> bool {
        (self.instance_type)() == TypeId::of::<T>()
    }

    /// Returns `true` if this table is laid out as class struct `C` or a
    /// descendant of it.
    #[must_use]
    pub fn class_is<C: ClassStruct>(&self) -> bool {
        (self.class_has)(TypeId::of::<C>())
    }

    /// Checks if this class is a subclass of another class.
    ///
    /// A class counts as a subclass of itself.
    ///
    /// # Arguments
    ///
    /// * `class` - The potential superclass
    ///
    /// # Returns
    ///
    /// `true` if `class` appears in this class's ancestor chain.
    #[must_use]
    pub fn is_subclass_of(&self, class: &ObjectClass) -> bool {
        let mut current = Some(self);

        while let Some(candidate) = current {
            if ptr::eq(candidate, class) {
                return true;
            }
            current = candidate.parent();
        }

        false
    }

    /// Iterates from this class up to the root, this class first.
    pub fn ancestors(&self) -> Ancestors<'_> {
        Ancestors { next: Some(self) }
    }

    /// Number of ancestors between this class and the root (root is 0).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.ancestors().count() - 1
    }

    /// Stamps the runtime-owned part of a freshly inherited table for
    /// classes producing `T`.
    pub(crate) fn stamp<T: Constructible>(&mut self, meta: &Class, parent: &Class, name: &'static str) {
        self.object = RawObject::owning(meta);
        self.parent = Some(parent.clone());
        self.name = name;
        self.instance_layout = Layout::new::<T>();
        self.class_layout = Layout::new::<T::Class>();
        self.instance_type = TypeId::of::<T>;
        self.instance_has = <T as ObjectLayout>::is_layout_of;
        self.class_has = <T::Class as ObjectLayout>::is_layout_of;
        self.drop_class = drop_class_block::<T::Class>;
        self.allocate = allocate_instance;
        self.construct = construct_instance::<T>;
        self.destroy = destroy_instance::<T>;
        self.incref = object_incref;
        self.decref = object_decref;
    }
}

/// Copies the table. The copy's header holds its own reference on the
/// class of the source, so the copy stays valid after the source is gone.
impl Clone for ObjectClass {
    fn clone(&self) -> Self {
        ObjectClass {
            object: self.object.share(),
            parent: self.parent.clone(),
            name: self.name,
            instance_layout: self.instance_layout,
            class_layout: self.class_layout,
            instance_type: self.instance_type,
            instance_has: self.instance_has,
            class_has: self.class_has,
            drop_class: self.drop_class,
            allocate: self.allocate,
            construct: self.construct,
            destroy: self.destroy,
            incref: self.incref,
            decref: self.decref,
            repr: self.repr,
            equal: self.equal,
            compare: self.compare,
            copy: self.copy,
        }
    }
}

impl fmt::Debug for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("parent", &self.parent().map(ObjectClass::name))
            .field("instance_size", &self.instance_size())
            .field("class_size", &self.class_size())
            .field("refcount", &self.refcount())
            .finish()
    }
}

// SAFETY: the header is the first field.
unsafe impl ObjectLayout for ObjectClass {
    type Parent = RawObject;
    type Class = ObjectClass;
}

// SAFETY: the root of every class struct chain.
unsafe impl ClassStruct for ObjectClass {}

/// Iterator over a class and its ancestors, see [`ObjectClass::ancestors`].
#[derive(Debug, Clone)]
pub struct Ancestors<'a> {
    next: Option<&'a ObjectClass>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = &'a ObjectClass;

    fn next(&mut self) -> Option<Self::Item> {
        let current = self.next?;
        self.next = current.parent();
        Some(current)
    }
}

impl FusedIterator for Ancestors<'_> {}

/// Layout contract for class structs.
///
/// Implemented by the [`class!`](crate::class) macro.
///
/// # Safety
///
/// `Self` is `#[repr(C)]` and its `ObjectLayout::Parent` chain reaches
/// [`ObjectClass`] (so a pointer to `Self` is a valid `ObjectClass`
/// pointer).
pub unsafe trait ClassStruct: ObjectLayout<Class = ObjectClass> + Clone {
    /// Views the table as the root class table.
    fn as_root(&self) -> &ObjectClass {
        // SAFETY: guaranteed by the trait contract.
        unsafe { &*ptr::from_ref(self).cast::<ObjectClass>() }
    }

    /// Mutable view of the root class table.
    fn as_root_mut(&mut self) -> &mut ObjectClass {
        // SAFETY: guaranteed by the trait contract.
        unsafe { &mut *ptr::from_mut(self).cast::<ObjectClass>() }
    }
}

/// Builds a derived class table from a copy of its parent's table.
///
/// The copy carries every slot the parent defines, including the ones the
/// parent inherited; `inherit` only supplies defaults for the slots `Self`
/// adds. Derivation checks that `P` is a prefix of `Self`.
pub trait Inherit<P: ClassStruct>: ClassStruct {
    /// Extends `parent` into a table for `Self`.
    fn inherit(parent: P) -> Self;
}

impl<C: ClassStruct> Inherit<C> for C {
    fn inherit(parent: C) -> C {
        parent
    }
}

impl<C: ClassStruct> Object<C> {
    /// Borrows the handle as the root class view.
    #[must_use]
    pub fn as_root_class(&self) -> &Class {
        // SAFETY: `Object` is a transparent pointer and every class struct
        // starts with `ObjectClass`.
        unsafe { &*ptr::from_ref(self).cast::<Class>() }
    }

    /// Converts into the root class view.
    #[must_use]
    pub fn into_root_class(self) -> Class {
        // SAFETY: every class struct starts with `ObjectClass`.
        unsafe { self.cast_unchecked() }
    }

    /// Creates an instance through the class's type-erased `construct`
    /// slot.
    ///
    /// `args` must be the full argument struct of the class's instance type.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `args` has the wrong type
    /// - any construction error, see [`Object::new`]
    pub fn new_object<A: Any + Send>(&self, args: A) -> Result<Object> {
        let raw = self.as_root_class().construct_erased(&mut Some(args))?;
        // SAFETY: the construct slot returns a fully built object with one
        // reference, which moves into the handle.
        Ok(unsafe { Object::from_raw(raw) })
    }
}

impl Object<ObjectClass> {
    pub(crate) fn construct_erased(&self, args: &mut dyn Any) -> Result<NonNull<RawObject>> {
        // SAFETY: construct slots are only ever filled by the runtime with
        // the entry point matching the class's instance type.
        unsafe { (self.construct)(self, args) }
    }
}
