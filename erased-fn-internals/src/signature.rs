//! Traits describing calling conventions.
//!
//! A calling convention is named by a function pointer type:
//!
//! - `fn(A, B) -> R` is a [`Signature`]: a free callable taking `A` and `B`.
//! - `fn(&O, A) -> R` and `fn(&mut O, A) -> R` are [`MethodSignature`]s:
//!   callables invoked on an object of type `O`. Binding such a method to an
//!   object yields a callable of the [`Signature`] `fn(A) -> R`.
//!
//! Arguments may be taken by value for up to eight arguments. Up to three
//! arguments may also be taken by shared or mutable reference, as in
//! `fn(&mut bool, bool) -> i32` or `fn(&str) -> usize`. The referenced types
//! and all by-value arguments and results must be `'static`, so results
//! cannot borrow from the arguments.

// A by-value impl such as `fn(A1)` and a by-reference impl such as
// `for<'a> fn(&'a A1)` never name the same type.
#![allow(coherence_leak_check)]

mod sealed {
    /// Prevents outside implementations of [`Signature`](super::Signature).
    pub trait Free {}

    /// Prevents outside implementations of
    /// [`MethodSignature`](super::MethodSignature).
    pub trait Receiving {}
}

/// A free calling convention, named by a function pointer type.
pub trait Signature: sealed::Free + Copy + 'static {
    /// The arguments, as a tuple, with borrowed arguments living for `'a`.
    type Args<'a>;
    /// The result.
    type Output: 'static;
    /// The method convention taking an `&O` receiver that leaves this
    /// convention once bound.
    type ByRef<O: 'static>: SharedMethodSignature<Receiver = O, Bound = Self>;
    /// The method convention taking an `&mut O` receiver that leaves this
    /// convention once bound.
    type ByMut<O: 'static>: MethodSignature<Receiver = O, Bound = Self>;
}

/// A value that can be called with the calling convention `S`.
///
/// Implemented for everything implementing the matching [`Fn`] trait.
pub trait Callable<S: Signature>: 'static {
    /// Calls the value with a tuple of arguments.
    fn invoke<'a>(&self, args: ArgsOf<'a, S>) -> OutputOf<S>;
}

/// A calling convention invoked on a receiver object, named by a function
/// pointer type whose first argument is `&O` or `&mut O`.
pub trait MethodSignature: sealed::Receiving + Copy + 'static {
    /// The type of the receiver object.
    type Receiver: 'static;
    /// The calling convention left once a receiver is bound.
    type Bound: Signature;
    /// `true` when the receiver is taken by mutable reference.
    const MUTABLE: bool;
}

/// A [`MethodSignature`] whose receiver is taken by shared reference.
///
/// Only such methods may be called through a shared handle or a shared
/// reference to their receiver.
pub trait SharedMethodSignature: MethodSignature {}

/// Arguments of the calling convention `S`.
pub type ArgsOf<'a, S> = <S as Signature>::Args<'a>;

/// Result of the calling convention `S`.
pub type OutputOf<S> = <S as Signature>::Output;

/// Arguments of the method convention `M`, excluding the receiver.
pub type MethodArgsOf<'a, M> = ArgsOf<'a, <M as MethodSignature>::Bound>;

/// Result of the method convention `M`.
pub type MethodOutputOf<M> = OutputOf<<M as MethodSignature>::Bound>;

/// A zero-sized callable that can be invoked with the method convention `M`.
///
/// Implemented for function items and captureless closures implementing the
/// matching [`Fn`] trait, such as `Counter::increment` for
/// `fn(&mut Counter, u32) -> u32`.
pub trait Method<M: MethodSignature>: Copy + 'static {
    /// Calls the method on the receiver behind `object`.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `object` points to a live `M::Receiver`.
    /// 2. If `M::MUTABLE` is `true`, `object` was derived from a mutable
    ///    reference or owning pointer and no other reference to the receiver
    ///    is used for the duration of the call.
    unsafe fn invoke_method<'a>(
        self,
        object: *const (),
        args: MethodArgsOf<'a, M>,
    ) -> MethodOutputOf<M>;
}

/// Implements the calling convention traits for one list of arguments.
///
/// Each argument is written as
/// `[Generic (Bounds) ParameterType, TupleType, binding]`, where `TupleType`
/// is the parameter type with its borrow spelled out with the lifetime given
/// first.
macro_rules! impl_signatures {
    ($lt:lifetime; $([$arg:ident ($($bound:tt)*) $param:ty, $tuple:ty, $value:ident])*) => {
        impl<R: 'static, $($arg: $($bound)* + 'static),*> sealed::Free for fn($($param),*) -> R {}

        impl<R: 'static, $($arg: $($bound)* + 'static),*> Signature for fn($($param),*) -> R {
            type Args<$lt> = ($($tuple,)*);
            type Output = R;
            type ByRef<O: 'static> = fn(&O, $($param),*) -> R;
            type ByMut<O: 'static> = fn(&mut O, $($param),*) -> R;
        }

        impl<F, R: 'static, $($arg: $($bound)* + 'static),*> Callable<fn($($param),*) -> R> for F
        where
            F: Fn($($param),*) -> R + 'static,
        {
            #[inline]
            fn invoke<$lt>(&self, ($($value,)*): ($($tuple,)*)) -> R {
                self($($value),*)
            }
        }

        impl<O: 'static, R: 'static, $($arg: $($bound)* + 'static),*> sealed::Receiving
            for fn(&O, $($param),*) -> R
        {
        }

        impl<O: 'static, R: 'static, $($arg: $($bound)* + 'static),*> MethodSignature
            for fn(&O, $($param),*) -> R
        {
            type Receiver = O;
            type Bound = fn($($param),*) -> R;
            const MUTABLE: bool = false;
        }

        impl<O: 'static, R: 'static, $($arg: $($bound)* + 'static),*> SharedMethodSignature
            for fn(&O, $($param),*) -> R
        {
        }

        impl<F, O: 'static, R: 'static, $($arg: $($bound)* + 'static),*>
            Method<fn(&O, $($param),*) -> R> for F
        where
            F: Fn(&O, $($param),*) -> R + Copy + 'static,
        {
            #[inline]
            unsafe fn invoke_method<$lt>(
                self,
                object: *const (),
                ($($value,)*): ($($tuple,)*),
            ) -> R {
                // SAFETY: `object` points to a live `O`, guaranteed by the
                // caller.
                let object = unsafe { &*object.cast::<O>() };
                self(object, $($value),*)
            }
        }

        impl<O: 'static, R: 'static, $($arg: $($bound)* + 'static),*> sealed::Receiving
            for fn(&mut O, $($param),*) -> R
        {
        }

        impl<O: 'static, R: 'static, $($arg: $($bound)* + 'static),*> MethodSignature
            for fn(&mut O, $($param),*) -> R
        {
            type Receiver = O;
            type Bound = fn($($param),*) -> R;
            const MUTABLE: bool = true;
        }

        impl<F, O: 'static, R: 'static, $($arg: $($bound)* + 'static),*>
            Method<fn(&mut O, $($param),*) -> R> for F
        where
            F: Fn(&mut O, $($param),*) -> R + Copy + 'static,
        {
            #[inline]
            unsafe fn invoke_method<$lt>(
                self,
                object: *const (),
                ($($value,)*): ($($tuple,)*),
            ) -> R {
                // SAFETY: `object` points to a live `O` that may be mutated
                // exclusively for the duration of the call, guaranteed by the
                // caller.
                let object = unsafe { &mut *object.cast_mut().cast::<O>() };
                self(object, $($value),*)
            }
        }
    };
}

/// Implements the calling convention traits for every way of passing each
/// argument.
///
/// Takes the lifetime for [`Signature::Args`], the arguments chosen so far
/// and, per remaining argument, the list of ways it may be passed.
macro_rules! impl_signature_combinations {
    (@each $lt:lifetime; $chosen:tt; []; $($rest:tt)*) => {};
    (@each $lt:lifetime; [$($chosen:tt)*]; [$form:tt $($forms:tt)*]; $($rest:tt)*) => {
        impl_signature_combinations!($lt; [$($chosen)* $form]; $($rest)*);
        impl_signature_combinations!(@each $lt; [$($chosen)*]; [$($forms)*]; $($rest)*);
    };
    ($lt:lifetime; [$($chosen:tt)*];) => {
        impl_signatures!($lt; $($chosen)*);
    };
    ($lt:lifetime; $chosen:tt; $forms:tt $($rest:tt)*) => {
        impl_signature_combinations!(@each $lt; $chosen; $forms; $($rest)*);
    };
}

impl_signatures!('a;);
impl_signature_combinations!('a; [];
    [[A1 (Sized) A1, A1, a1] [A1 (?Sized) &A1, &'a A1, a1] [A1 (?Sized) &mut A1, &'a mut A1, a1]]
);
impl_signature_combinations!('a; [];
    [[A1 (Sized) A1, A1, a1] [A1 (?Sized) &A1, &'a A1, a1] [A1 (?Sized) &mut A1, &'a mut A1, a1]]
    [[A2 (Sized) A2, A2, a2] [A2 (?Sized) &A2, &'a A2, a2] [A2 (?Sized) &mut A2, &'a mut A2, a2]]
);
impl_signature_combinations!('a; [];
    [[A1 (Sized) A1, A1, a1] [A1 (?Sized) &A1, &'a A1, a1] [A1 (?Sized) &mut A1, &'a mut A1, a1]]
    [[A2 (Sized) A2, A2, a2] [A2 (?Sized) &A2, &'a A2, a2] [A2 (?Sized) &mut A2, &'a mut A2, a2]]
    [[A3 (Sized) A3, A3, a3] [A3 (?Sized) &A3, &'a A3, a3] [A3 (?Sized) &mut A3, &'a mut A3, a3]]
);
impl_signatures!('a;
    [A1 (Sized) A1, A1, a1] [A2 (Sized) A2, A2, a2] [A3 (Sized) A3, A3, a3]
    [A4 (Sized) A4, A4, a4]
);
impl_signatures!('a;
    [A1 (Sized) A1, A1, a1] [A2 (Sized) A2, A2, a2] [A3 (Sized) A3, A3, a3]
    [A4 (Sized) A4, A4, a4] [A5 (Sized) A5, A5, a5]
);
impl_signatures!('a;
    [A1 (Sized) A1, A1, a1] [A2 (Sized) A2, A2, a2] [A3 (Sized) A3, A3, a3]
    [A4 (Sized) A4, A4, a4] [A5 (Sized) A5, A5, a5] [A6 (Sized) A6, A6, a6]
);
impl_signatures!('a;
    [A1 (Sized) A1, A1, a1] [A2 (Sized) A2, A2, a2] [A3 (Sized) A3, A3, a3]
    [A4 (Sized) A4, A4, a4] [A5 (Sized) A5, A5, a5] [A6 (Sized) A6, A6, a6]
    [A7 (Sized) A7, A7, a7]
);
impl_signatures!('a;
    [A1 (Sized) A1, A1, a1] [A2 (Sized) A2, A2, a2] [A3 (Sized) A3, A3, a3]
    [A4 (Sized) A4, A4, a4] [A5 (Sized) A5, A5, a5] [A6 (Sized) A6, A6, a6]
    [A7 (Sized) A7, A7, a7] [A8 (Sized) A8, A8, a8]
);
