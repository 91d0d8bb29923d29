//! The type-erased callable.
//!
//! A [`RawFunction`] is the triple (object storage, trampoline, identity):
//!
//! - the [`RawObject`] holds the object the call operates on, if any,
//! - the trampoline is the erased call adapter, absent when nothing is bound,
//! - the [`TypeIdentity`] names the calling convention the trampoline was
//!   created for, or is untyped.
//!
//! Emptiness is decided by the trampoline alone and compatibility by the
//! identity alone. Clearing a callable drops its object and trampoline but
//! keeps its identity, so a typed callable stays typed for its whole life.
//!
//! # Safety Invariants
//!
//! The fields are private to this module, so these invariants are locally
//! verifiable:
//!
//! 1. If `trampoline` is set, it points to a `Trampoline<S>` whose calling
//!    convention `S` takes the arguments and returns the result named by
//!    `identity`, as promised by the caller of [`RawFunction::from_parts`].
//! 2. If `trampoline` is set, `object` satisfies the requirements of the
//!    constructor the trampoline was created with.
//! 3. `trampoline` and `object` are only ever replaced together, by copying or
//!    moving them from another [`RawFunction`] whose identity is accepted by
//!    this one.

use core::ptr::NonNull;

use crate::{
    error::Error,
    function::trampoline::Trampoline,
    identity::TypeIdentity,
    object::{Ownership, RawObject},
    signature::{ArgsOf, OutputOf, Signature},
    util::Erased,
};

/// A type-erased callable.
///
/// This is an owning type: dropping it releases its object storage.
pub struct RawFunction {
    /// The object the call operates on.
    object: RawObject,
    /// The erased call adapter, if anything is bound.
    trampoline: Option<NonNull<Erased>>,
    /// The calling convention of the trampoline.
    identity: TypeIdentity,
}

impl RawFunction {
    /// Creates an untyped callable with nothing bound.
    #[inline]
    pub const fn new() -> Self {
        Self::typed(TypeIdentity::UNTYPED)
    }

    /// Creates a callable of the given identity with nothing bound.
    #[inline]
    pub const fn typed(identity: TypeIdentity) -> Self {
        Self {
            object: RawObject::new(),
            trampoline: None,
            identity,
        }
    }

    /// Creates a callable from its parts.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `identity` names a calling convention taking the arguments and
    ///    returning the result of `S`, and every other callable with the same
    ///    identity is created with a trampoline for the same arguments and
    ///    result.
    /// 2. If `trampoline` is set, `object` satisfies the requirements of the
    ///    constructor the trampoline was created with, for as long as the
    ///    callable or any copy of it is invoked.
    #[inline]
    pub unsafe fn from_parts<S: Signature>(
        identity: TypeIdentity,
        trampoline: Option<&'static Trampoline<S>>,
        object: RawObject,
    ) -> Self {
        Self {
            object,
            trampoline: trampoline.map(|trampoline| NonNull::from(trampoline).cast::<Erased>()),
            identity,
        }
    }

    /// Returns the identity of this callable.
    #[inline]
    pub fn identity(&self) -> TypeIdentity {
        self.identity
    }

    /// Returns `true` if a trampoline is bound.
    #[inline]
    pub fn is_bound(&self) -> bool {
        self.trampoline.is_some()
    }

    /// Returns the address of the stored object, or null when there is none.
    #[inline]
    pub fn bound_object(&self) -> *const () {
        self.object.as_ptr()
    }

    /// Returns the object storage.
    #[inline]
    pub fn object(&self) -> &RawObject {
        &self.object
    }

    /// Returns how the stored object is held.
    #[inline]
    pub fn ownership(&self) -> Ownership {
        self.object.ownership()
    }

    /// Returns the bound trampoline with its calling convention restored.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. The arguments and result of `S` are the ones named by the identity.
    #[inline]
    pub unsafe fn trampoline<S: Signature>(&self) -> Option<&'static Trampoline<S>> {
        self.trampoline.map(|trampoline| {
            // SAFETY:
            // 1. The trampoline was erased from a `'static` reference to a
            //    `Trampoline` for the arguments and result named by the
            //    identity (invariant 1), which are those of `S`, guaranteed
            //    by the caller. Trampolines agreeing on arguments and result
            //    have the same layout.
            unsafe { trampoline.cast::<Trampoline<S>>().as_ref() }
        })
    }

    /// Creates an independent copy of this callable.
    ///
    /// The object storage is copied with [`RawObject::try_clone`]; the
    /// trampoline and identity are shared.
    #[inline]
    pub fn try_clone(&self) -> Result<Self, Error> {
        Ok(Self {
            object: self.object.try_clone()?,
            trampoline: self.trampoline,
            identity: self.identity,
        })
    }

    /// Checks that `source` may be assigned into this callable.
    #[inline]
    fn check_assignable(&self, source: &Self) -> Result<(), Error> {
        if self.identity.accepts(source.identity) {
            Ok(())
        } else {
            Err(Error::IncompatibleType {
                target: self.identity,
                source: source.identity,
            })
        }
    }

    /// Replaces this callable with `replacement` and releases the previous
    /// object.
    ///
    /// The replacement always takes effect; the returned error only reports a
    /// failure to release the previous object.
    fn replace(&mut self, replacement: Self) -> Result<(), Error> {
        let mut previous = core::mem::replace(self, replacement);
        previous.try_clear()
    }

    /// Replaces this callable with a copy of `source`.
    ///
    /// Fails with [`Error::IncompatibleType`] unless this callable is untyped
    /// or has the same identity as `source`, and with the error of
    /// [`try_clone`](Self::try_clone) if copying fails. Nothing is modified on
    /// these failures. A failure to release the previous object is returned
    /// after the copy has been assigned.
    pub fn try_clone_from(&mut self, source: &Self) -> Result<(), Error> {
        self.check_assignable(source)?;
        let copy = source.try_clone()?;
        self.replace(copy)
    }

    /// Moves `source` into this callable.
    ///
    /// Fails with [`Error::IncompatibleType`] unless this callable is untyped
    /// or has the same identity as `source`. Nothing is modified on failure.
    /// On success `source` is left empty, keeping its identity. A failure to
    /// release the previous object is returned after the move.
    pub fn move_from(&mut self, source: &mut Self) -> Result<(), Error> {
        self.check_assignable(source)?;
        let moved = source.take();
        self.replace(moved)
    }

    /// Moves the bound object and trampoline out, leaving this callable empty
    /// with its identity kept.
    #[inline]
    pub fn take(&mut self) -> Self {
        Self {
            object: self.object.take(),
            trampoline: self.trampoline.take(),
            identity: self.identity,
        }
    }

    /// Unbinds the trampoline and discards the object, keeping the identity.
    ///
    /// A failure of the custom allocator while releasing memory is reported
    /// through [`fatal`](crate::error::fatal).
    #[inline]
    #[track_caller]
    pub fn clear(&mut self) {
        self.trampoline = None;
        self.object.reset();
    }

    /// Unbinds the trampoline and discards the object, keeping the identity
    /// and reporting allocator failures.
    ///
    /// The callable is empty afterwards even when an error is returned.
    #[inline]
    pub fn try_clear(&mut self) -> Result<(), Error> {
        self.trampoline = None;
        self.object.try_reset()
    }

    /// Calls the bound trampoline with the stored object.
    ///
    /// Fails with [`Error::InvalidFunction`] when nothing is bound.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. The arguments and result of `S` are the ones named by the identity.
    #[inline]
    pub unsafe fn invoke<'a, S: Signature>(
        &self,
        args: ArgsOf<'a, S>,
    ) -> Result<OutputOf<S>, Error> {
        // SAFETY:
        // 1. Guaranteed by the caller.
        let trampoline = unsafe { self.trampoline::<S>() }.ok_or(Error::InvalidFunction)?;

        // SAFETY:
        // 1. The stored object satisfies the requirements of the trampoline
        //    (invariant 2).
        Ok(unsafe { trampoline.call(self.object.as_ptr(), args) })
    }

    /// Calls the bound trampoline with an explicit object.
    ///
    /// Used by unbound methods, which carry no object of their own. Fails
    /// with [`Error::InvalidFunction`] when nothing is bound and with
    /// [`Error::InvalidObject`] when `object` is null.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. The arguments and result of `S` are the ones named by the identity.
    /// 2. `object` satisfies the requirements of the constructor the
    ///    trampoline was created with.
    #[inline]
    pub unsafe fn invoke_with_object<'a, S: Signature>(
        &self,
        object: *const (),
        args: ArgsOf<'a, S>,
    ) -> Result<OutputOf<S>, Error> {
        // SAFETY:
        // 1. Guaranteed by the caller.
        let trampoline = unsafe { self.trampoline::<S>() }.ok_or(Error::InvalidFunction)?;
        if object.is_null() {
            return Err(Error::InvalidObject);
        }

        // SAFETY:
        // 2. Guaranteed by the caller.
        Ok(unsafe { trampoline.call(object, args) })
    }
}

impl Default for RawFunction {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for RawFunction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RawFunction")
            .field("identity", &self.identity)
            .field("bound", &self.is_bound())
            .field("object", &self.object)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;
    use core::cell::Cell;

    use super::*;
    use crate::{function::trampoline, signature::Callable};

    type Sig = fn(i32, i32) -> i32;

    fn sum(a: i32, b: i32) -> i32 {
        a + b
    }

    fn zero_sized<F: Callable<Sig> + Copy>(_: F) -> RawFunction {
        assert_eq!(core::mem::size_of::<F>(), 0);
        // SAFETY: `F` is zero-sized and a value of it was passed in.
        let trampoline = unsafe { trampoline::zero_sized::<Sig, F>() };
        // SAFETY:
        // 1. `Sig` takes `(i32, i32)` and returns `i32`.
        // 2. Zero-sized trampolines need no object.
        unsafe {
            RawFunction::from_parts(TypeIdentity::of::<Sig>(), Some(trampoline), RawObject::new())
        }
    }

    fn owned<F: Callable<Sig> + Clone>(callable: F) -> RawFunction {
        let mut object = RawObject::new();
        object.store_owned(callable).unwrap();
        // SAFETY:
        // 1. `Sig` takes `(i32, i32)` and returns `i32`.
        // 2. The object holds a live `F`, and copies hold their own `F`.
        unsafe {
            RawFunction::from_parts(
                TypeIdentity::of::<Sig>(),
                Some(trampoline::callable::<Sig, F>()),
                object,
            )
        }
    }

    /// Invokes a callable with the `Sig` convention.
    fn call(function: &RawFunction, a: i32, b: i32) -> Result<i32, Error> {
        assert_eq!(function.identity(), TypeIdentity::of::<Sig>());
        // SAFETY: The identity was checked to be `Sig`.
        unsafe { function.invoke::<Sig>((a, b)) }
    }

    #[test]
    fn test_raw_function_size() {
        assert_eq!(
            core::mem::size_of::<RawFunction>(),
            4 * core::mem::size_of::<usize>()
        );
    }

    #[test]
    fn test_invoke_zero_sized() {
        let function = zero_sized(sum);
        assert!(function.is_bound());
        assert!(function.bound_object().is_null());
        assert_eq!(call(&function, 3, 4), Ok(7));
    }

    #[test]
    fn test_empty_is_invalid_function() {
        let function = RawFunction::typed(TypeIdentity::of::<Sig>());
        assert!(!function.is_bound());
        assert_eq!(call(&function, 1, 2), Err(Error::InvalidFunction));
    }

    #[test]
    fn test_clone_copies_object() {
        let drops = Rc::new(Cell::new(0));
        let guard = Rc::clone(&drops);
        let function = owned(move |a: i32, b: i32| {
            let _ = &guard;
            a * b
        });
        assert_eq!(Rc::strong_count(&drops), 2);

        let copy = function.try_clone().unwrap();
        assert_eq!(Rc::strong_count(&drops), 3);
        assert_ne!(copy.bound_object(), function.bound_object());
        assert_eq!(call(&copy, 3, 4), Ok(12));

        drop(function);
        drop(copy);
        assert_eq!(Rc::strong_count(&drops), 1);
    }

    #[test]
    fn test_clear_keeps_identity() {
        let mut function = owned(|a: i32, b: i32| a - b);
        function.clear();
        assert!(!function.is_bound());
        assert_eq!(function.ownership(), Ownership::Empty);
        assert_eq!(function.identity(), TypeIdentity::of::<Sig>());
        assert_eq!(call(&function, 1, 2), Err(Error::InvalidFunction));
    }

    #[test]
    fn test_incompatible_assignment_changes_nothing() {
        let mut target = RawFunction::typed(TypeIdentity::of::<fn() -> i32>());
        let source = zero_sized(sum);

        let error = target.try_clone_from(&source).unwrap_err();
        assert_eq!(
            error,
            Error::IncompatibleType {
                target: TypeIdentity::of::<fn() -> i32>(),
                source: TypeIdentity::of::<Sig>(),
            }
        );
        assert!(!target.is_bound());
        assert_eq!(target.identity(), TypeIdentity::of::<fn() -> i32>());

        let mut source = source;
        assert!(target.move_from(&mut source).is_err());
        assert!(source.is_bound());
    }

    #[test]
    fn test_untyped_accepts_and_adopts_identity() {
        let mut target = RawFunction::new();
        let mut source = owned(|a: i32, b: i32| a + b + 1);
        let address = source.bound_object();

        target.move_from(&mut source).unwrap();
        assert_eq!(target.identity(), TypeIdentity::of::<Sig>());
        assert_eq!(target.bound_object(), address);
        assert_eq!(call(&target, 1, 1), Ok(3));

        assert!(!source.is_bound());
        assert!(source.bound_object().is_null());
        assert_eq!(source.identity(), TypeIdentity::of::<Sig>());
    }

    #[test]
    fn test_invoke_with_null_object() {
        let function = zero_sized(sum);
        // SAFETY: `Sig` takes `(i32, i32)` and returns `i32`, and zero-sized
        // trampolines accept any object.
        let result = unsafe { function.invoke_with_object::<Sig>(core::ptr::null(), (1, 2)) };
        assert_eq!(result, Err(Error::InvalidObject));
    }
}
