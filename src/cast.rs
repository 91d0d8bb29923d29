//! Checked casts from [`ErasedFunction`] back to typed callables.
//!
//! [`Function<S>`] and [`MemberFunction<M>`] are `#[repr(transparent)]`
//! wrappers around the same storage as [`ErasedFunction`], so a cast is a
//! pointer reinterpretation guarded by a comparison of [`TypeIdentity`]s.
//! A mismatch is reported as [`Error::InvalidCast`].
//!
//! ```
//! use erased_fn::{ErasedFunction, Function, cast::function_cast};
//!
//! fn sum(a: i32, b: i32) -> i32 {
//!     a + b
//! }
//!
//! let erased = ErasedFunction::from(Function::<fn(i32, i32) -> i32>::from_fn(sum));
//!
//! let typed = function_cast::<fn(i32, i32) -> i32>(&erased).unwrap();
//! assert_eq!(typed.call((3, 4)), 7);
//!
//! assert!(function_cast::<fn(i32) -> i32>(&erased).is_err());
//! ```

use erased_fn_internals::{
    RawFunction, TypeIdentity,
    signature::{MethodSignature, Signature},
};

use crate::{
    ErasedFunction, Function, MemberFunction,
    error::{Error, Result, signal},
};

pub(crate) mod sealed {
    use erased_fn_internals::RawFunction;

    /// Restricts [`FunctionView`](super::FunctionView) to the typed wrappers
    /// of this crate.
    pub trait Sealed: Sized {
        /// Wraps a callable of the matching identity.
        ///
        /// # Safety
        ///
        /// The caller must ensure:
        ///
        /// 1. The identity of `raw` is the identity of `Self`.
        unsafe fn from_raw_function(raw: RawFunction) -> Self;
    }
}

/// A typed wrapper sharing the layout of [`ErasedFunction`].
///
/// Implemented by [`Function<S>`] and [`MemberFunction<M>`].
pub trait FunctionView: sealed::Sealed + 'static {
    /// The identity every value of this type carries.
    const IDENTITY: TypeIdentity;
}

impl<S: Signature> sealed::Sealed for Function<S> {
    unsafe fn from_raw_function(raw: RawFunction) -> Self {
        // SAFETY:
        // 1. Guaranteed by the caller.
        unsafe { Function::from_raw(raw) }
    }
}

impl<S: Signature> FunctionView for Function<S> {
    const IDENTITY: TypeIdentity = TypeIdentity::of::<Self>();
}

impl<M: MethodSignature> sealed::Sealed for MemberFunction<M> {
    unsafe fn from_raw_function(raw: RawFunction) -> Self {
        // SAFETY:
        // 1. Guaranteed by the caller.
        unsafe { MemberFunction::from_raw(raw) }
    }
}

impl<M: MethodSignature> FunctionView for MemberFunction<M> {
    const IDENTITY: TypeIdentity = TypeIdentity::of::<Self>();
}

impl ErasedFunction {
    /// Returns `true` if this callable carries the identity of `V`.
    #[inline]
    pub fn is<V: FunctionView>(&self) -> bool {
        self.identity() == V::IDENTITY
    }

    /// Checks that this callable carries the identity of `V`.
    #[inline]
    #[track_caller]
    fn check_cast<V: FunctionView>(&self) -> Result<()> {
        if self.is::<V>() {
            Ok(())
        } else {
            signal(Error::InvalidCast {
                expected: V::IDENTITY,
                actual: self.identity(),
            })
        }
    }

    /// Views this callable as the typed callable `V`.
    ///
    /// Fails with [`Error::InvalidCast`] if the identities differ. Untyped
    /// callables never cast.
    #[track_caller]
    pub fn cast<V: FunctionView>(&self) -> Result<&V> {
        self.check_cast::<V>()?;

        // SAFETY:
        // 1. The identity was checked above.
        Ok(unsafe { self.cast_unchecked::<V>() })
    }

    /// Views this callable as the typed callable `V`, mutably.
    ///
    /// Fails with [`Error::InvalidCast`] if the identities differ.
    #[track_caller]
    pub fn cast_mut<V: FunctionView>(&mut self) -> Result<&mut V> {
        self.check_cast::<V>()?;
        let ptr = core::ptr::from_mut(self).cast::<V>();

        // SAFETY:
        // - `V` is a `#[repr(transparent)]` wrapper around the same storage
        //   as `ErasedFunction`, so the pointer is valid for `V`.
        // - The identity was checked above, so the invariants of `V` hold.
        // - No `&mut ErasedFunction` can be obtained from `V`, so the identity
        //   cannot change while the view is alive.
        Ok(unsafe { &mut *ptr })
    }

    /// Converts this callable into the typed callable `V`.
    ///
    /// Returns `Err(self)` with the original callable if the identities
    /// differ. Unlike [`cast`](Self::cast), a mismatch is not signalled.
    pub fn into_typed<V: FunctionView>(self) -> core::result::Result<V, Self> {
        if self.is::<V>() {
            // SAFETY:
            // 1. The identity was checked above.
            Ok(unsafe { V::from_raw_function(self.into_raw()) })
        } else {
            Err(self)
        }
    }

    /// Views this callable as the typed callable `V` without checking.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. The identity of this callable is `V::IDENTITY` (can be verified by
    ///    calling [`is`](Self::is) first).
    #[must_use]
    pub unsafe fn cast_unchecked<V: FunctionView>(&self) -> &V {
        let ptr = core::ptr::from_ref(self).cast::<V>();

        // SAFETY:
        // - `V` is a `#[repr(transparent)]` wrapper around the same storage
        //   as `ErasedFunction`, so the pointer is valid for `V`.
        // - The identity matches, guaranteed by the caller, so the invariants
        //   of `V` hold.
        unsafe { &*ptr }
    }
}

/// Views `erased` as a [`Function<S>`].
///
/// Fails with [`Error::InvalidCast`] if the identities differ.
#[inline]
#[track_caller]
pub fn function_cast<S: Signature>(erased: &ErasedFunction) -> Result<&Function<S>> {
    erased.cast::<Function<S>>()
}

/// Views `erased` as a [`Function<S>`], mutably.
///
/// Fails with [`Error::InvalidCast`] if the identities differ.
#[inline]
#[track_caller]
pub fn function_cast_mut<S: Signature>(erased: &mut ErasedFunction) -> Result<&mut Function<S>> {
    erased.cast_mut::<Function<S>>()
}

/// Views `erased` as a [`MemberFunction<M>`].
///
/// Fails with [`Error::InvalidCast`] if the identities differ.
#[inline]
#[track_caller]
pub fn member_function_cast<M: MethodSignature>(
    erased: &ErasedFunction,
) -> Result<&MemberFunction<M>> {
    erased.cast::<MemberFunction<M>>()
}
