//! Declarative macros generating instance and class structs.
//!
//! Both macros emit a `#[repr(C)]` struct whose first field, `base`, is the
//! parent struct, plus the unsafe layout impls, so client code never writes
//! `unsafe` itself.

/// Declares an instance struct.
///
/// `Name: Parent as Class` embeds `Parent` as the private `base` field and
/// declares `Class` as the class struct describing `Name` instances. The
/// struct derefs to its parent. Construction is supplied by implementing
/// [`Construct`](crate::Construct).
///
/// # Example
///
/// ```rust
/// use seeobj::{ObjectClass, RawObject};
///
/// seeobj::object! {
///     /// A point.
///     pub struct Point: RawObject as ObjectClass {
///         pub x: i32,
///         pub y: i32,
///     }
/// }
///
/// assert!(std::mem::size_of::<Point>() > std::mem::size_of::<RawObject>());
/// ```
#[macro_export]
macro_rules! object {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident : $parent:ty as $class:ty {
            $($(#[$field_meta:meta])* $field_vis:vis $field:ident : $field_ty:ty),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(C)]
        $vis struct $name {
            base: $parent,
            $($(#[$field_meta])* $field_vis $field: $field_ty,)*
        }

        // SAFETY: `#[repr(C)]` with the parent as the first field.
        unsafe impl $crate::ObjectLayout for $name {
            type Parent = $parent;
            type Class = $class;
        }

        impl ::core::ops::Deref for $name {
            type Target = $parent;

            fn deref(&self) -> &$parent {
                &self.base
            }
        }
    };
}

/// Declares a class struct.
///
/// `Name: ParentClass` embeds the parent class struct as the private `base`
/// field. Every added slot declares the default it gets when a class of this
/// struct is derived from a `ParentClass` class. The struct derefs (mutably,
/// for init callbacks) to its parent.
///
/// # Example
///
/// ```rust
/// use seeobj::{Object, ObjectClass};
///
/// fn silent(_: &Object) -> u32 {
///     0
/// }
///
/// seeobj::class! {
///     pub struct AnimalClass: ObjectClass {
///         pub legs: fn(&Object) -> u32 = silent,
///     }
/// }
/// ```
#[macro_export]
macro_rules! class {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident : $parent:ty {
            $($(#[$field_meta:meta])* $field_vis:vis $field:ident : $field_ty:ty = $default:expr),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(C)]
        #[derive(Clone)]
        $vis struct $name {
            base: $parent,
            $($(#[$field_meta])* $field_vis $field: $field_ty,)*
        }

        // SAFETY: `#[repr(C)]` with the parent class struct as the first
        // field.
        unsafe impl $crate::ObjectLayout for $name {
            type Parent = $parent;
            type Class = $crate::ObjectClass;
        }

        // SAFETY: the parent is a class struct, so the chain reaches
        // `ObjectClass`.
        unsafe impl $crate::ClassStruct for $name {}

        impl $crate::Inherit<$parent> for $name {
            fn inherit(parent: $parent) -> Self {
                $name {
                    base: parent,
                    $($field: $default,)*
                }
            }
        }

        impl ::core::ops::Deref for $name {
            type Target = $parent;

            fn deref(&self) -> &$parent {
                &self.base
            }
        }

        impl ::core::ops::DerefMut for $name {
            fn deref_mut(&mut self) -> &mut $parent {
                &mut self.base
            }
        }
    };
}
