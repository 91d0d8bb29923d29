//! Type-erased object storage.
//!
//! A [`RawObject`] holds one of:
//!
//! - nothing,
//! - a borrowed pointer to an object it does not own,
//! - an exclusively owned object, allocated through [`crate::allocator`],
//! - a shared handle such as [`Rc`](alloc::rc::Rc) or
//!   [`triomphe::Arc`](triomphe::Arc).
//!
//! Owned objects carry an [`ObjectVtable`] that knows how to drop and copy
//! them; borrowed objects carry none.
//!
//! # Safety Invariants
//!
//! The fields of [`RawObject`] are private to this module, so these
//! invariants are locally verifiable:
//!
//! 1. If `vtable` is set, `ptr` is set and was produced for that vtable.
//! 2. An owned pointer is released exactly once, by [`RawObject::try_reset`].

use core::{any::TypeId, ptr::NonNull};

use crate::{
    error::{Error, fatal},
    object::{
        shared::SharedPointer,
        vtable::{ObjectVtable, Ownership},
    },
    util::Erased,
};

/// Type-erased storage for the object a callable operates on.
///
/// This is an owning type: dropping it releases an owned object, while a
/// borrowed object is left alone.
pub struct RawObject {
    /// Pointer to the stored object, if any.
    ptr: Option<NonNull<Erased>>,
    /// Vtable for the stored object, present only when the object is owned.
    vtable: Option<&'static ObjectVtable>,
}

impl RawObject {
    /// Creates empty storage.
    #[inline]
    pub const fn new() -> Self {
        Self {
            ptr: None,
            vtable: None,
        }
    }

    /// Discards the current object and references `object` without owning
    /// it.
    ///
    /// The storage never dereferences the pointer itself; keeping the object
    /// alive for as long as it is used through this storage is up to the
    /// caller.
    #[inline]
    pub fn store_borrowed<T>(&mut self, object: NonNull<T>) {
        self.reset();
        self.ptr = Some(object.cast::<Erased>());
    }

    /// Discards the current object and takes exclusive ownership of
    /// `object`.
    ///
    /// The object is moved into a block from the object allocator. Copies of
    /// the storage clone the object.
    #[inline]
    pub fn store_owned<T: Clone + 'static>(&mut self, object: T) -> Result<(), Error> {
        self.store_exclusive(object, ObjectVtable::exclusive::<T>())
    }

    /// Like [`store_owned`](Self::store_owned), for objects that cannot be
    /// copied.
    ///
    /// Copying the storage fails with [`Error::NonCopyableObject`].
    #[inline]
    pub fn store_owned_unique<T: 'static>(&mut self, object: T) -> Result<(), Error> {
        self.store_exclusive(object, ObjectVtable::exclusive_unique::<T>())
    }

    /// Moves `object` into the allocator and records `vtable` for it.
    fn store_exclusive<T: 'static>(
        &mut self,
        object: T,
        vtable: &'static ObjectVtable,
    ) -> Result<(), Error> {
        self.reset();
        let ptr = crate::allocator::allocate_value(object)?;
        self.ptr = Some(ptr.cast::<Erased>());
        self.vtable = Some(vtable);
        Ok(())
    }

    /// Discards the current object and stores the target of `handle`.
    ///
    /// Copies of the storage clone the handle, so the target lives until the
    /// last copy is dropped.
    #[inline]
    pub fn store_shared<P: SharedPointer>(&mut self, handle: P) {
        self.reset();
        self.ptr = Some(P::into_raw(handle).cast::<Erased>());
        self.vtable = Some(ObjectVtable::shared::<P>());
    }

    /// Creates an independent copy of this storage.
    ///
    /// Borrowed objects are shared by pointer, exclusive objects are cloned
    /// and shared handles are cloned.
    pub fn try_clone(&self) -> Result<Self, Error> {
        let Some(vtable) = self.vtable else {
            return Ok(Self {
                ptr: self.ptr,
                vtable: None,
            });
        };
        let Some(ptr) = self.ptr else {
            return Err(Error::InvalidObject);
        };

        // SAFETY:
        // 1. `ptr` was produced for `vtable` (invariant 1).
        let copy = unsafe { vtable.clone(ptr) }?;
        Ok(Self {
            ptr: Some(copy),
            vtable: Some(vtable),
        })
    }

    /// Replaces the current object with a copy of `source`'s.
    ///
    /// The copy is made before the current object is discarded, so on
    /// failure `self` is left untouched.
    #[inline]
    pub fn try_clone_from(&mut self, source: &Self) -> Result<(), Error> {
        let copy = source.try_clone()?;
        *self = copy;
        Ok(())
    }

    /// Moves the object out, leaving this storage empty.
    #[inline]
    pub fn take(&mut self) -> Self {
        Self {
            ptr: self.ptr.take(),
            vtable: self.vtable.take(),
        }
    }

    /// Replaces the current object with `source`'s, leaving `source` empty.
    #[inline]
    pub fn move_from(&mut self, source: &mut Self) {
        *self = source.take();
    }

    /// Discards the current object.
    ///
    /// A failure of the custom allocator while releasing memory is reported
    /// through [`fatal`].
    #[inline]
    #[track_caller]
    pub fn reset(&mut self) {
        if let Err(error) = self.try_reset() {
            fatal(error);
        }
    }

    /// Discards the current object, reporting allocator failures.
    ///
    /// The storage is empty afterwards even when an error is returned.
    pub fn try_reset(&mut self) -> Result<(), Error> {
        let ptr = self.ptr.take();
        let Some(vtable) = self.vtable.take() else {
            return Ok(());
        };
        let Some(ptr) = ptr else {
            return Err(Error::InvalidObject);
        };

        // SAFETY:
        // 1. `ptr` was produced for `vtable` (invariant 1).
        // 2. Both fields have been cleared, so the object is unreachable
        //    from `self` (invariant 2).
        unsafe { vtable.drop(ptr) }
    }

    /// Returns the address of the stored object, or null when empty.
    #[inline]
    pub fn as_ptr(&self) -> *const () {
        match self.ptr {
            Some(ptr) => ptr.as_ptr().cast_const().cast::<()>(),
            None => core::ptr::null(),
        }
    }

    /// Returns `true` if an object is stored.
    #[inline]
    pub fn has_object(&self) -> bool {
        self.ptr.is_some()
    }

    /// Returns `true` if the stored object is owned, exclusively or shared.
    #[inline]
    pub fn is_owned(&self) -> bool {
        self.vtable.is_some()
    }

    /// Returns how the stored object is held.
    #[inline]
    pub fn ownership(&self) -> Ownership {
        match (self.ptr, self.vtable) {
            (None, _) => Ownership::Empty,
            (Some(_), None) => Ownership::Borrowed,
            (Some(_), Some(vtable)) => vtable.ownership(),
        }
    }

    /// Returns the [`TypeId`] of an owned object.
    ///
    /// Borrowed objects are untyped and return [`None`].
    #[inline]
    pub fn stored_type_id(&self) -> Option<TypeId> {
        self.vtable.map(|vtable| vtable.type_id())
    }

    /// Returns the type name of an owned object.
    ///
    /// Borrowed objects are untyped and return [`None`].
    #[inline]
    pub fn stored_type_name(&self) -> Option<&'static str> {
        self.vtable.map(|vtable| vtable.type_name())
    }
}

impl Default for RawObject {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RawObject {
    fn drop(&mut self) {
        self.reset();
    }
}

impl core::fmt::Debug for RawObject {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RawObject")
            .field("ownership", &self.ownership())
            .field("ptr", &self.as_ptr())
            .field("type_name", &self.stored_type_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use alloc::{rc::Rc, string::String};
    use core::cell::Cell;

    use super::*;

    #[derive(Clone)]
    struct Counted {
        drops: Rc<Cell<usize>>,
    }

    impl Drop for Counted {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
        }
    }

    #[test]
    fn test_raw_object_size() {
        assert_eq!(
            core::mem::size_of::<RawObject>(),
            2 * core::mem::size_of::<usize>()
        );
    }

    #[test]
    fn test_empty() {
        let object = RawObject::new();
        assert!(!object.has_object());
        assert!(!object.is_owned());
        assert!(object.as_ptr().is_null());
        assert_eq!(object.ownership(), Ownership::Empty);
        assert_eq!(object.stored_type_id(), None);

        let copy = object.try_clone().unwrap();
        assert_eq!(copy.ownership(), Ownership::Empty);
    }

    #[test]
    fn test_borrowed_is_shared_by_pointer() {
        let value = 17_u32;
        let mut object = RawObject::new();
        object.store_borrowed(NonNull::from(&value));
        assert_eq!(object.ownership(), Ownership::Borrowed);
        assert!(!object.is_owned());
        assert_eq!(object.as_ptr(), core::ptr::from_ref(&value).cast::<()>());
        assert_eq!(object.stored_type_name(), None);

        let copy = object.try_clone().unwrap();
        assert_eq!(copy.as_ptr(), object.as_ptr());
    }

    #[test]
    fn test_exclusive_clone_is_deep() {
        let mut object = RawObject::new();
        object.store_owned(String::from("payload")).unwrap();
        assert_eq!(object.ownership(), Ownership::Exclusive);
        assert_eq!(object.stored_type_id(), Some(TypeId::of::<String>()));

        let copy = object.try_clone().unwrap();
        assert_ne!(copy.as_ptr(), object.as_ptr());
        // SAFETY: The copy holds a live `String`.
        let text = unsafe { &*copy.as_ptr().cast::<String>() };
        assert_eq!(text, "payload");
    }

    #[test]
    fn test_exclusive_drops_once() {
        let drops = Rc::new(Cell::new(0));
        let mut object = RawObject::new();
        object
            .store_owned(Counted {
                drops: drops.clone(),
            })
            .unwrap();
        let copy = object.try_clone().unwrap();
        assert_eq!(drops.get(), 0);

        drop(copy);
        assert_eq!(drops.get(), 1);
        object.reset();
        assert_eq!(drops.get(), 2);
        assert_eq!(object.ownership(), Ownership::Empty);
        drop(object);
        assert_eq!(drops.get(), 2);
    }

    #[test]
    fn test_storing_discards_previous() {
        let drops = Rc::new(Cell::new(0));
        let mut object = RawObject::new();
        object
            .store_owned(Counted {
                drops: drops.clone(),
            })
            .unwrap();
        object.store_owned(5_u8).unwrap();
        assert_eq!(drops.get(), 1);
        assert_eq!(object.stored_type_id(), Some(TypeId::of::<u8>()));
    }

    #[test]
    fn test_unique_refuses_copy() {
        struct NotClone;

        let mut object = RawObject::new();
        object.store_owned_unique(NotClone).unwrap();
        let Err(error) = object.try_clone() else {
            panic!("copying a unique object succeeded");
        };
        assert!(matches!(
            error,
            Error::NonCopyableObject { type_name } if type_name.ends_with("NotClone")
        ));

        let mut target = RawObject::new();
        target.store_owned(1_u8).unwrap();
        assert!(target.try_clone_from(&object).is_err());
        assert_eq!(target.stored_type_id(), Some(TypeId::of::<u8>()));
    }

    #[test]
    fn test_shared_clones_handle() {
        let handle = Rc::new(3_i64);
        let mut object = RawObject::new();
        object.store_shared(handle.clone());
        assert_eq!(object.ownership(), Ownership::Shared);
        assert_eq!(Rc::strong_count(&handle), 2);
        assert_eq!(object.as_ptr(), Rc::as_ptr(&handle).cast::<()>());

        let copy = object.try_clone().unwrap();
        assert_eq!(Rc::strong_count(&handle), 3);
        assert_eq!(copy.as_ptr(), object.as_ptr());

        drop(object);
        drop(copy);
        assert_eq!(Rc::strong_count(&handle), 1);
    }

    #[test]
    fn test_move_leaves_source_empty() {
        let mut source = RawObject::new();
        source.store_owned(9_u16).unwrap();
        let address = source.as_ptr();

        let mut target = RawObject::new();
        target.move_from(&mut source);
        assert_eq!(target.as_ptr(), address);
        assert_eq!(target.ownership(), Ownership::Exclusive);
        assert_eq!(source.ownership(), Ownership::Empty);

        let taken = target.take();
        assert_eq!(taken.as_ptr(), address);
        assert!(!target.has_object());
    }

    #[test]
    fn test_zero_sized_exclusive() {
        #[derive(Clone, Copy)]
        struct Unit;

        let mut object = RawObject::new();
        object.store_owned(Unit).unwrap();
        assert_eq!(object.ownership(), Ownership::Exclusive);
        assert!(object.has_object());
        let copy = object.try_clone().unwrap();
        assert!(copy.has_object());
    }
}
