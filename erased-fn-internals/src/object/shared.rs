//! Reference-counted handles that can be stored as shared objects.

use alloc::rc::Rc;
use core::ptr::NonNull;

/// A cloneable, reference-counted handle that can be turned into a raw
/// pointer and back.
///
/// A [`RawObject`] storing a shared handle keeps the handle alive in its raw
/// form, hands out the pointer to the target as the stored object, and uses
/// [`Clone`] on the handle to share the target between copies.
///
/// # Safety
///
/// Implementors must ensure that:
///
/// 1. [`into_raw`] returns a pointer to the handle's target that stays valid
///    for shared reads until the handle is reconstructed with [`from_raw`]
///    and dropped.
/// 2. [`from_raw`] reconstructs the exact handle that was passed to
///    [`into_raw`].
/// 3. Cloning the handle keeps the target at the same address.
///
/// [`RawObject`]: crate::object::RawObject
/// [`into_raw`]: SharedPointer::into_raw
/// [`from_raw`]: SharedPointer::from_raw
pub unsafe trait SharedPointer: Clone + 'static {
    /// The type the handle points at.
    type Target: 'static;

    /// Turns the handle into a raw pointer to its target, without releasing
    /// the handle's reference.
    fn into_raw(this: Self) -> NonNull<Self::Target>;

    /// Reconstructs a handle from a pointer produced by [`into_raw`].
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `ptr` was returned by [`into_raw`] on this handle type.
    /// 2. Each pointer returned by [`into_raw`] is turned back into a handle
    ///    at most once.
    ///
    /// [`into_raw`]: SharedPointer::into_raw
    unsafe fn from_raw(ptr: NonNull<Self::Target>) -> Self;
}

// SAFETY:
// 1. `Rc::into_raw` keeps the reference alive until `Rc::from_raw`.
// 2. `Rc::from_raw` reconstructs the handle given to `Rc::into_raw`.
// 3. Clones of an `Rc` share one allocation.
unsafe impl<T: 'static> SharedPointer for Rc<T> {
    type Target = T;

    #[inline]
    fn into_raw(this: Self) -> NonNull<T> {
        let ptr = Rc::into_raw(this).cast_mut();
        // SAFETY: `Rc::into_raw` never returns a null pointer.
        unsafe { NonNull::new_unchecked(ptr) }
    }

    #[inline]
    unsafe fn from_raw(ptr: NonNull<T>) -> Self {
        // SAFETY: The pointer came from `Rc::into_raw` and is consumed only
        // once, guaranteed by the caller.
        unsafe { Rc::from_raw(ptr.as_ptr()) }
    }
}

// SAFETY:
// 1. `Arc::into_raw` keeps the reference alive until `Arc::from_raw`.
// 2. `Arc::from_raw` reconstructs the handle given to `Arc::into_raw`.
// 3. Clones of an `Arc` share one allocation.
#[cfg(target_has_atomic = "ptr")]
unsafe impl<T: 'static> SharedPointer for alloc::sync::Arc<T> {
    type Target = T;

    #[inline]
    fn into_raw(this: Self) -> NonNull<T> {
        let ptr = alloc::sync::Arc::into_raw(this).cast_mut();
        // SAFETY: `Arc::into_raw` never returns a null pointer.
        unsafe { NonNull::new_unchecked(ptr) }
    }

    #[inline]
    unsafe fn from_raw(ptr: NonNull<T>) -> Self {
        // SAFETY: The pointer came from `Arc::into_raw` and is consumed only
        // once, guaranteed by the caller.
        unsafe { alloc::sync::Arc::from_raw(ptr.as_ptr()) }
    }
}

// SAFETY:
// 1. `triomphe::Arc::into_raw` keeps the reference alive until
//    `triomphe::Arc::from_raw`.
// 2. `triomphe::Arc::from_raw` reconstructs the handle given to
//    `triomphe::Arc::into_raw`.
// 3. Clones of a `triomphe::Arc` share one allocation.
unsafe impl<T: 'static> SharedPointer for triomphe::Arc<T> {
    type Target = T;

    #[inline]
    fn into_raw(this: Self) -> NonNull<T> {
        let ptr = triomphe::Arc::into_raw(this).cast_mut();
        // SAFETY: `triomphe::Arc::into_raw` never returns a null pointer.
        unsafe { NonNull::new_unchecked(ptr) }
    }

    #[inline]
    unsafe fn from_raw(ptr: NonNull<T>) -> Self {
        // SAFETY: The pointer came from `triomphe::Arc::into_raw` and is
        // consumed only once, guaranteed by the caller.
        unsafe { triomphe::Arc::from_raw(ptr.as_ptr()) }
    }
}
