//! Vtable for type-erased owned objects.
//!
//! This module encapsulates the fields of [`ObjectVtable`] so they cannot be
//! accessed directly. This visibility restriction guarantees the safety
//! invariant: **the vtable's type parameters must match the actual object
//! type behind the pointer it is used with**.
//!
//! # Safety Invariant
//!
//! This invariant is maintained because vtables are created as `&'static`
//! references via [`ObjectVtable::exclusive`],
//! [`ObjectVtable::exclusive_unique`] and [`ObjectVtable::shared`], which pair
//! the function pointers with the types they were instantiated for.
//!
//! Borrowed objects have no vtable: they are neither dropped nor copied.

use core::{any::TypeId, ptr::NonNull};

use crate::{
    allocator,
    error::Error,
    object::shared::SharedPointer,
    util::Erased,
};

/// How the object stored in a [`RawObject`] is held.
///
/// [`RawObject`]: crate::object::RawObject
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Ownership {
    /// No object is stored.
    Empty,
    /// The object is referenced and never dropped or copied.
    Borrowed,
    /// The object is owned by this storage alone.
    Exclusive,
    /// The object is kept alive by a shared handle.
    Shared,
}

/// Vtable for owned objects.
///
/// Provides function pointers for dropping and copying the stored object.
pub(crate) struct ObjectVtable {
    /// Gets the [`TypeId`] of the stored type.
    type_id: fn() -> TypeId,
    /// Gets the name of the stored type.
    type_name: fn() -> &'static str,
    /// How the object is held.
    ownership: Ownership,
    /// Releases the object.
    drop: unsafe fn(NonNull<Erased>) -> Result<(), Error>,
    /// Produces an independent copy of the object.
    clone: unsafe fn(NonNull<Erased>) -> Result<NonNull<Erased>, Error>,
}

impl ObjectVtable {
    /// Creates the vtable for an exclusively owned, copyable `T`.
    #[inline]
    pub(super) const fn exclusive<T: Clone + 'static>() -> &'static Self {
        const {
            &Self {
                type_id: TypeId::of::<T>,
                type_name: core::any::type_name::<T>,
                ownership: Ownership::Exclusive,
                drop: drop_exclusive::<T>,
                clone: clone_exclusive::<T>,
            }
        }
    }

    /// Creates the vtable for an exclusively owned `T` that cannot be copied.
    #[inline]
    pub(super) const fn exclusive_unique<T: 'static>() -> &'static Self {
        const {
            &Self {
                type_id: TypeId::of::<T>,
                type_name: core::any::type_name::<T>,
                ownership: Ownership::Exclusive,
                drop: drop_exclusive::<T>,
                clone: clone_unique::<T>,
            }
        }
    }

    /// Creates the vtable for an object held through the handle `P`.
    #[inline]
    pub(super) const fn shared<P: SharedPointer>() -> &'static Self {
        const {
            &Self {
                type_id: TypeId::of::<P::Target>,
                type_name: core::any::type_name::<P::Target>,
                ownership: Ownership::Shared,
                drop: drop_shared::<P>,
                clone: clone_shared::<P>,
            }
        }
    }

    /// Gets the [`TypeId`] of the stored type.
    #[inline]
    pub(super) fn type_id(&self) -> TypeId {
        (self.type_id)()
    }

    /// Gets the name of the stored type.
    #[inline]
    pub(super) fn type_name(&self) -> &'static str {
        (self.type_name)()
    }

    /// Gets how the object is held.
    #[inline]
    pub(super) fn ownership(&self) -> Ownership {
        self.ownership
    }

    /// Releases the object behind `ptr`.
    ///
    /// The object is always released; an error only reports that its memory
    /// could not be returned to the allocator.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `ptr` was produced for this vtable by the same [`RawObject`].
    /// 2. The object is not used after this call.
    ///
    /// [`RawObject`]: crate::object::RawObject
    #[inline]
    pub(super) unsafe fn drop(&self, ptr: NonNull<Erased>) -> Result<(), Error> {
        // SAFETY:
        // 1. The vtable matches the object, guaranteed by the caller.
        // 2. Guaranteed by the caller.
        unsafe { (self.drop)(ptr) }
    }

    /// Produces an independent copy of the object behind `ptr`.
    ///
    /// The returned pointer belongs to this vtable.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `ptr` was produced for this vtable by the same [`RawObject`].
    ///
    /// [`RawObject`]: crate::object::RawObject
    #[inline]
    pub(super) unsafe fn clone(&self, ptr: NonNull<Erased>) -> Result<NonNull<Erased>, Error> {
        // SAFETY:
        // 1. The vtable matches the object, guaranteed by the caller.
        unsafe { (self.clone)(ptr) }
    }
}

/// Drops an exclusively owned `T` and releases its block.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `ptr` was produced by [`allocator::allocate_value`] for `T`.
/// 2. The object is not used after this call.
unsafe fn drop_exclusive<T>(ptr: NonNull<Erased>) -> Result<(), Error> {
    // SAFETY:
    // 1. Guaranteed by the caller.
    // 2. Guaranteed by the caller.
    unsafe { allocator::deallocate_value(ptr.cast::<T>()) }
}

/// Copies an exclusively owned `T` into a fresh block.
///
/// The value is cloned before anything is allocated, so a panicking
/// [`Clone`] implementation leaks nothing.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `ptr` points to a live `T`.
unsafe fn clone_exclusive<T: Clone>(ptr: NonNull<Erased>) -> Result<NonNull<Erased>, Error> {
    // SAFETY:
    // 1. Guaranteed by the caller.
    let value = unsafe { ptr.cast::<T>().as_ref() };
    let copy = allocator::allocate_value(value.clone())?;
    Ok(copy.cast::<Erased>())
}

/// Refuses to copy a `T` that does not implement [`Clone`].
///
/// # Safety
///
/// Always safe to call; the signature matches the vtable slot.
unsafe fn clone_unique<T>(_ptr: NonNull<Erased>) -> Result<NonNull<Erased>, Error> {
    Err(Error::NonCopyableObject {
        type_name: core::any::type_name::<T>(),
    })
}

/// Reconstructs and drops a shared handle.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `ptr` was produced by [`SharedPointer::into_raw`] on `P`.
/// 2. The pointer is not used after this call.
unsafe fn drop_shared<P: SharedPointer>(ptr: NonNull<Erased>) -> Result<(), Error> {
    // SAFETY:
    // 1. Guaranteed by the caller.
    // 2. Guaranteed by the caller, so the handle is reconstructed once.
    let handle = unsafe { P::from_raw(ptr.cast::<P::Target>()) };
    drop(handle);
    Ok(())
}

/// Shares the target of a handle with one more handle.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `ptr` was produced by [`SharedPointer::into_raw`] on `P` and the
///    handle has not been reconstructed yet.
unsafe fn clone_shared<P: SharedPointer>(ptr: NonNull<Erased>) -> Result<NonNull<Erased>, Error> {
    // SAFETY:
    // 1. Guaranteed by the caller. The reconstructed handle is wrapped in
    //    `ManuallyDrop`, so ownership of the original reference stays with the
    //    stored pointer.
    let handle = core::mem::ManuallyDrop::new(unsafe { P::from_raw(ptr.cast::<P::Target>()) });
    let copy = P::clone(&handle);
    Ok(P::into_raw(copy).cast::<Erased>())
}
