//! The metaclass and class derivation.
//!
//! The metaclass is the class whose instances are classes. It allocates
//! class-sized blocks instead of fixed-size instances, and it is the only
//! way to manufacture a new class: [`derive`](Object::derive) copies a
//! parent's table, stamps the runtime-owned slots for the new instance type,
//! and lets an init callback override behaviour slots.
//!
//! The metaclass cannot derive itself. [`MetaClass::bootstrap`] assembles it
//! by hand from a copy of the root class: it is its own class, its parent is
//! the root, and its `allocate`/`construct`/`destroy` slots are patched for
//! class blocks.

use crate::error::{Error, Result};
use crate::runtime::class::{Class, ClassStruct, Inherit, ObjectClass, ParentClass, ROOT_CLASS, object_class};
use crate::runtime::construct::Constructible;
use crate::runtime::object::{Object, ObjectLayout, RawObject};
use scopeguard::ScopeGuard;
use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::any::{Any, TypeId};
use std::mem::{align_of, size_of};
use std::ops::Deref;
use std::ptr::{self, NonNull};
use tracing::{debug, warn};

/// Class table of the metaclass.
#[repr(C)]
#[derive(Debug, Clone)]
pub struct MetaClass {
    class: ObjectClass,
}

// SAFETY: `#[repr(C)]` with the root class table as the first field.
unsafe impl ObjectLayout for MetaClass {
    type Parent = ObjectClass;
    type Class = ObjectClass;
}

// SAFETY: the parent chain is `ObjectClass`.
unsafe impl ClassStruct for MetaClass {}

impl Deref for MetaClass {
    type Target = ObjectClass;

    fn deref(&self) -> &ObjectClass {
        &self.class
    }
}

impl MetaClass {
    /// Hand-assembles the metaclass.
    ///
    /// The returned handle holds the metaclass's only reference until
    /// classes are derived from it; every derived class holds one more.
    ///
    /// # Errors
    ///
    /// Returns `AllocationFailure` if the class block cannot be allocated.
    pub(crate) fn bootstrap() -> Result<Class<MetaClass>> {
        let layout = Layout::new::<MetaClass>();
        // SAFETY: the layout is not zero-sized.
        let block = NonNull::new(unsafe { alloc_zeroed(layout) })
            .ok_or(Error::AllocationFailure { size: layout.size() })?
            .cast::<MetaClass>();

        let mut class = ROOT_CLASS.clone();
        class.object = RawObject::detached(block.cast());
        class.parent = Some(object_class());
        class.name = "MetaClass";
        class.instance_layout = Layout::new::<ObjectClass>();
        class.class_layout = layout;
        class.instance_type = TypeId::of::<ObjectClass>;
        class.instance_has = <ObjectClass as ObjectLayout>::is_layout_of;
        class.class_has = <MetaClass as ObjectLayout>::is_layout_of;
        class.drop_class = drop_class_block::<MetaClass>;
        class.allocate = allocate_class;
        class.construct = construct_class;
        class.destroy = destroy_class;

        // SAFETY: freshly allocated with the layout of `MetaClass`.
        unsafe { block.as_ptr().write(MetaClass { class }) };
        debug!(class_size = layout.size(), "bootstrapped metaclass");

        // SAFETY: the block holds a complete, self-classed table with
        // refcount 1, which the handle takes over.
        Ok(unsafe { Object::from_raw(block) })
    }
}

impl Object<MetaClass> {
    /// Derives a new class producing instances of `T` from `parent`.
    ///
    /// Steps, in order:
    /// 1. Reject an already populated `out` slot.
    /// 2. Copy the parent's table ([`Inherit`]).
    /// 3. Set the parent, the instance size and the slots tied to `T`.
    /// 4. Move the table into a class block allocated by the metaclass.
    /// 5. Run `init`, which may override any behaviour slot. If it fails or
    ///    panics the new class is released and `out` stays empty.
    /// 6. Publish the class into `out`.
    ///
    /// # Arguments
    ///
    /// * `out` - Destination slot, must be empty
    /// * `name` - Class name
    /// * `parent` - Class producing `T::Parent` instances
    /// * `init` - Class initializer
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `out` is populated, if `parent` does not
    ///   produce `T::Parent`, or if `T::Class` does not extend the parent's
    ///   class struct
    /// - `AllocationFailure` if the class block cannot be allocated
    /// - the error returned by `init`
    ///
    /// # Example
    ///
    /// ```rust
    /// use seeobj::{Object, RawObject, Runtime, object_class};
    ///
    /// let runtime = Runtime::new().unwrap();
    /// let mut quiet = None;
    ///
    /// runtime
    ///     .metaclass()
    ///     .derive::<RawObject>(&mut quiet, "Quiet", &object_class(), |class| {
    ///         class.repr = |_, out| out.write_str("<quiet>");
    ///         Ok(())
    ///     })
    ///     .unwrap();
    ///
    /// let class = quiet.unwrap();
    /// let obj = Object::<RawObject>::new(&class, ()).unwrap();
    /// assert_eq!(obj.repr(), "<quiet>");
    /// ```
    pub fn derive<T>(
        &self,
        out: &mut Option<Class<T::Class>>,
        name: &'static str,
        parent: &Class<ParentClass<T>>,
        init: impl FnOnce(&mut T::Class) -> Result<()>,
    ) -> Result<()>
    where
        T: Constructible,
        T::Class: Inherit<ParentClass<T>>,
    {
        if out.is_some() {
            return Err(Error::InvalidArgument("output class slot is already populated"));
        }
        if !parent.as_root().instance_is::<T::Parent>() {
            return Err(Error::InvalidArgument(
                "parent class does not produce the parent instance type",
            ));
        }
        if !<T::Class as ObjectLayout>::is_layout_of(TypeId::of::<ParentClass<T>>()) {
            return Err(Error::InvalidArgument(
                "class struct does not extend the parent class struct",
            ));
        }

        let meta = self.as_root_class();
        let mut table = <T::Class as Inherit<ParentClass<T>>>::inherit((**parent).clone());
        table.as_root_mut().stamp::<T>(meta, parent.as_root_class(), name);

        let layout = Layout::new::<T::Class>();
        // SAFETY: the metaclass allocate slot hands out zeroed class blocks.
        let block = unsafe { (meta.allocate)(meta, layout)? }.cast::<T::Class>();
        // SAFETY: the block was allocated with the layout of `T::Class`.
        unsafe { block.as_ptr().write(table) };

        // Until published, the block is released as a `T::Class` whatever
        // header `init` leaves behind, on error and on unwind alike.
        let block = scopeguard::guard(block, |block| {
            // SAFETY: the block holds a complete `T::Class` nobody else
            // references.
            unsafe { drop_class_block::<T::Class>(block.cast()) }
        });

        // SAFETY: the class is unpublished; the callback has the only
        // access to the table.
        let outcome = init(unsafe { &mut *block.as_ptr() });

        // The callback may have replaced the whole table; restamp what the
        // runtime owns.
        // SAFETY: as above, the callback has returned.
        unsafe { &mut *block.as_ptr() }
            .as_root_mut()
            .stamp::<T>(meta, parent.as_root_class(), name);

        if let Err(err) = outcome {
            warn!(class = name, error = %err, "class init callback failed");
            return Err(err);
        }

        // SAFETY: the block holds a complete, freshly stamped table with
        // refcount 1, which the handle takes over.
        let class: Class<T::Class> = unsafe { Object::from_raw(ScopeGuard::into_inner(block)) };

        debug!(
            class = name,
            parent = parent.as_root().name(),
            instance_size = class.as_root().instance_size(),
            class_size = layout.size(),
            "derived class"
        );
        *out = Some(class);
        Ok(())
    }
}

/// Metaclass `allocate` slot: a zeroed block of the caller's layout.
fn allocate_class(_meta: &ObjectClass, layout: Layout) -> Result<NonNull<u8>> {
    if layout.size() < size_of::<ObjectClass>() || layout.align() < align_of::<ObjectClass>() {
        return Err(Error::InvalidArgument(
            "class block is smaller than the root class table",
        ));
    }

    // SAFETY: not zero-sized, checked above.
    let ptr = unsafe { alloc_zeroed(layout) };
    NonNull::new(ptr).ok_or(Error::AllocationFailure { size: layout.size() })
}

/// Metaclass `construct` slot: classes only come from `derive`.
fn construct_class(_meta: &Class, _args: &mut dyn Any) -> Result<NonNull<RawObject>> {
    Err(Error::InvalidArgument("classes are created through MetaClass::derive"))
}

/// Metaclass `destroy` slot: hands the block to the class's own drop glue.
unsafe fn destroy_class(obj: NonNull<RawObject>) {
    let class = obj.cast::<ObjectClass>();
    // SAFETY: `obj` is a class block whose count just reached zero.
    let drop_class = unsafe { class.as_ref() }.drop_class;
    // SAFETY: `drop_class` was stamped for this block's class struct.
    unsafe { drop_class(class) }
}

/// Drops a class block laid out as `C` and frees it.
///
/// # Safety
///
/// `class` must be a block allocated for `C` whose count reached zero.
pub(crate) unsafe fn drop_class_block<C: ClassStruct>(class: NonNull<ObjectClass>) {
    // SAFETY: still live until dropped below.
    let name = unsafe { class.as_ref() }.name();
    debug!(class = name, "destroying class");

    let ptr = class.cast::<C>();
    // SAFETY: unique owner of a block holding a `C`.
    unsafe {
        ptr::drop_in_place(ptr.as_ptr());
        dealloc(ptr.as_ptr().cast(), Layout::new::<C>());
    }
}
