//! Monomorphized call adapters.
//!
//! A [`Trampoline`] is a `'static` record holding one function pointer with
//! the uniform shape `unsafe fn(*const (), S::Args<'_>) -> S::Output` for a
//! calling convention `S`. The pointer is generic over the lifetime of the
//! arguments, so borrowed arguments of any lifetime can be passed. Each
//! constructor
//! in this module instantiates an adapter for one concrete callable type and
//! hands out a reference to a record promoted with `const { &... }`, so every
//! instantiation lives in static memory and never allocates.
//!
//! The adapters are:
//!
//! - [`callable`]: reads the callable out of the stored object.
//! - [`zero_sized`]: re-materializes a zero-sized callable from its type;
//!   the stored object is ignored.
//! - [`method`]: re-materializes a zero-sized method and calls it on the
//!   stored object.

use crate::{
    signature::{
        ArgsOf, Callable, Method, MethodArgsOf, MethodOutputOf, MethodSignature, OutputOf,
        Signature,
    },
    util::conjure_zst,
};

/// A call adapter for the calling convention `S`.
pub struct Trampoline<S: Signature> {
    /// The adapter.
    call: for<'a> unsafe fn(*const (), ArgsOf<'a, S>) -> OutputOf<S>,
}

impl<S: Signature> Trampoline<S> {
    /// Runs the adapter.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `object` satisfies the requirements of the constructor this
    ///    trampoline was created with.
    #[inline]
    pub unsafe fn call<'a>(&self, object: *const (), args: ArgsOf<'a, S>) -> OutputOf<S> {
        // SAFETY:
        // 1. Guaranteed by the caller.
        unsafe { (self.call)(object, args) }
    }
}

/// Creates the adapter calling a stored `F` with the convention `S`.
///
/// Calling the returned trampoline requires `object` to point to a live `F`.
#[inline]
pub const fn callable<S: Signature, F: Callable<S>>() -> &'static Trampoline<S> {
    const {
        &Trampoline {
            call: call_callable::<S, F>,
        }
    }
}

/// Creates the adapter calling the zero-sized callable `F` with the
/// convention `S`.
///
/// Calling the returned trampoline accepts any `object`, including null.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `F` is zero-sized.
/// 2. A value of `F` has been observed, so the type is inhabited.
#[inline]
pub const unsafe fn zero_sized<S: Signature, F: Callable<S> + Copy>() -> &'static Trampoline<S> {
    const {
        &Trampoline {
            call: call_zero_sized::<S, F>,
        }
    }
}

/// Creates the adapter calling the zero-sized method `F` with the method
/// convention `M`.
///
/// Calling the returned trampoline requires `object` to satisfy the
/// requirements of [`Method::invoke_method`].
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `F` is zero-sized.
/// 2. A value of `F` has been observed, so the type is inhabited.
#[inline]
pub const unsafe fn method<M: MethodSignature, F: Method<M>>() -> &'static Trampoline<M::Bound> {
    const {
        &Trampoline {
            call: call_method::<M, F>,
        }
    }
}

/// Calls the `F` stored behind `object`.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `object` points to a live `F`.
unsafe fn call_callable<'a, S: Signature, F: Callable<S>>(
    object: *const (),
    args: ArgsOf<'a, S>,
) -> OutputOf<S> {
    // SAFETY:
    // 1. Guaranteed by the caller.
    let callable = unsafe { &*object.cast::<F>() };
    callable.invoke(args)
}

/// Re-materializes and calls the zero-sized `F`.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `F` is zero-sized.
/// 2. A value of `F` has been observed, so the type is inhabited.
unsafe fn call_zero_sized<'a, S: Signature, F: Callable<S> + Copy>(
    _object: *const (),
    args: ArgsOf<'a, S>,
) -> OutputOf<S> {
    // SAFETY:
    // 1. Guaranteed by the caller.
    // 2. Guaranteed by the caller.
    let callable = unsafe { conjure_zst::<F>() };
    callable.invoke(args)
}

/// Re-materializes the zero-sized method `F` and calls it on `object`.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `F` is zero-sized.
/// 2. A value of `F` has been observed, so the type is inhabited.
/// 3. `object` satisfies the requirements of [`Method::invoke_method`].
unsafe fn call_method<'a, M: MethodSignature, F: Method<M>>(
    object: *const (),
    args: MethodArgsOf<'a, M>,
) -> MethodOutputOf<M> {
    // SAFETY:
    // 1. Guaranteed by the caller.
    // 2. Guaranteed by the caller.
    let method = unsafe { conjure_zst::<F>() };
    // SAFETY:
    // 3. Guaranteed by the caller.
    unsafe { method.invoke_method(object, args) }
}
