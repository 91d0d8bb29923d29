use core::{mem::size_of, ptr::NonNull};

use erased_fn_internals::{
    RawFunction, RawObject, TypeIdentity,
    object::SharedPointer,
    signature::{Method, MethodArgsOf, MethodOutputOf, MethodSignature, SharedMethodSignature},
    trampoline::{self, Trampoline},
};

use crate::{
    ErasedFunction, Function,
    cast::FunctionView,
    error::{Error, Result, fatal, signal, unwrap_or_fatal},
};

/// FIXME: Once rust-lang/rust#132922 gets resolved, we can make the `raw` field
/// an unsafe field and remove this module.
mod limit_field_access {
    use core::marker::PhantomData;

    use erased_fn_internals::{RawFunction, signature::MethodSignature};

    /// A type-erased method that is not bound to an object.
    ///
    /// `M` is a function pointer type whose first argument is the receiver,
    /// such as `fn(&Counter, u32) -> u32` or `fn(&mut Counter, u32) -> u32`.
    /// The receiver is supplied at every call, or bound once to produce a
    /// [`Function`](crate::Function).
    ///
    /// ```
    /// use erased_fn::MemberFunction;
    ///
    /// struct Counter {
    ///     count: u32,
    /// }
    ///
    /// impl Counter {
    ///     fn increment(&mut self, by: u32) -> u32 {
    ///         self.count += by;
    ///         self.count
    ///     }
    /// }
    ///
    /// let increment =
    ///     MemberFunction::<fn(&mut Counter, u32) -> u32>::from_method(Counter::increment);
    /// let mut counter = Counter { count: 0 };
    /// increment.call_mut(&mut counter, (2,));
    /// assert_eq!(increment.call_mut(&mut counter, (3,)), 5);
    /// ```
    #[repr(transparent)]
    pub struct MemberFunction<M: MethodSignature> {
        /// # Safety
        ///
        /// The following safety invariants are guaranteed to be upheld as long
        /// as this struct exists:
        ///
        /// 1. The identity of `raw` is `TypeIdentity::of::<MemberFunction<M>>()`.
        /// 2. If `raw` is bound, its trampoline was created with
        ///    `trampoline::method::<M, F>` for some zero-sized `F`.
        /// 3. `raw` holds no object.
        raw: RawFunction,
        _signature: PhantomData<M>,
    }

    impl<M: MethodSignature> MemberFunction<M> {
        /// Creates a new [`MemberFunction`] from a [`RawFunction`].
        ///
        /// # Safety
        ///
        /// The caller must ensure:
        ///
        /// 1. The identity of `raw` is
        ///    `TypeIdentity::of::<MemberFunction<M>>()`.
        /// 2. If `raw` is bound, its trampoline was created with
        ///    `trampoline::method::<M, F>` for some zero-sized `F`.
        /// 3. `raw` holds no object.
        #[must_use]
        pub(crate) unsafe fn from_raw(raw: RawFunction) -> Self {
            // SAFETY: We must uphold the safety invariants of the raw field:
            // 1. Guaranteed by the caller
            // 2. Guaranteed by the caller
            // 3. Guaranteed by the caller
            Self {
                raw,
                _signature: PhantomData,
            }
        }

        /// Consumes the [`MemberFunction`] and returns the inner
        /// [`RawFunction`].
        #[must_use]
        pub(crate) fn into_raw(self) -> RawFunction {
            self.raw
        }

        /// Returns a reference to the inner [`RawFunction`].
        #[must_use]
        pub(crate) fn as_raw(&self) -> &RawFunction {
            &self.raw
        }
    }
}

pub use limit_field_access::MemberFunction;

impl<M: MethodSignature> MemberFunction<M> {
    /// Creates a [`MemberFunction`] with nothing bound to it.
    #[inline]
    pub fn new() -> Self {
        let raw = RawFunction::typed(Self::IDENTITY);

        // SAFETY:
        // 1. The identity is the identity of `MemberFunction<M>`.
        // 2. Nothing is bound.
        // 3. No object is stored.
        unsafe { Self::from_raw(raw) }
    }

    /// Creates a [`MemberFunction`] from a zero-sized method, such as a
    /// method item or a closure without captures.
    pub fn from_method<F: Method<M>>(method: F) -> Self {
        const {
            assert!(
                size_of::<F>() == 0,
                "member functions must be zero-sized, such as method items"
            );
        }
        let _ = method;

        // SAFETY:
        // 1. `F` is zero-sized, asserted above.
        // 2. `method` is a value of `F`.
        let trampoline = unsafe { trampoline::method::<M, F>() };

        // SAFETY:
        // 1. The identity of `MemberFunction<M>` is only ever paired with
        //    method trampolines of `M`, which take `M::Bound`'s arguments and
        //    return its result.
        // 2. No object is stored. Objects are passed to every call instead.
        let raw = unsafe {
            RawFunction::from_parts(Self::IDENTITY, Some(trampoline), RawObject::new())
        };

        // SAFETY:
        // 1. The identity is the identity of `MemberFunction<M>`.
        // 2. The trampoline was created with `trampoline::method::<M, F>`
        //    for the zero-sized `F`.
        // 3. No object is stored.
        unsafe { Self::from_raw(raw) }
    }

    /// Returns the method trampoline, if bound.
    fn trampoline(&self) -> Option<&'static Trampoline<M::Bound>> {
        // SAFETY:
        // 1. The identity of `MemberFunction<M>` names the arguments and
        //    result of `M::Bound`.
        unsafe { self.as_raw().trampoline::<M::Bound>() }
    }

    /// Calls the method on the object behind `object`.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. If not null, `object` satisfies the requirements of
    ///    [`Method::invoke_method`].
    #[inline]
    unsafe fn invoke<'a>(
        &self,
        object: *const M::Receiver,
        args: MethodArgsOf<'a, M>,
    ) -> Result<MethodOutputOf<M>> {
        // SAFETY:
        // 1. The identity of `MemberFunction<M>` names the arguments and
        //    result of `M::Bound`.
        // 2. Method trampolines require what `Method::invoke_method`
        //    requires (invariant 2), guaranteed by the caller.
        unsafe { self.as_raw().invoke_with_object::<M::Bound>(object.cast::<()>(), args) }
    }

    /// Calls the method on `object`.
    ///
    /// # Panics
    ///
    /// Panics if nothing is bound. See [`try_call`](Self::try_call) for a
    /// fallible version.
    #[inline]
    #[track_caller]
    pub fn call<'a>(
        &self,
        object: &M::Receiver,
        args: MethodArgsOf<'a, M>,
    ) -> MethodOutputOf<M>
    where
        M: SharedMethodSignature,
    {
        match self.try_call_quiet(object, args) {
            Ok(output) => output,
            Err(error) => fatal(error),
        }
    }

    /// Calls the method on `object`.
    ///
    /// Fails with [`Error::InvalidFunction`] if nothing is bound.
    #[inline]
    #[track_caller]
    pub fn try_call<'a>(
        &self,
        object: &M::Receiver,
        args: MethodArgsOf<'a, M>,
    ) -> Result<MethodOutputOf<M>>
    where
        M: SharedMethodSignature,
    {
        self.try_call_quiet(object, args).or_else(signal)
    }

    #[inline]
    fn try_call_quiet<'a>(
        &self,
        object: &M::Receiver,
        args: MethodArgsOf<'a, M>,
    ) -> Result<MethodOutputOf<M>>
    where
        M: SharedMethodSignature,
    {
        // SAFETY:
        // 1. The object is live for the duration of the call, and shared
        //    methods only read it.
        unsafe { self.invoke(object, args) }
    }

    /// Calls the method on `object`, which the method may mutate.
    ///
    /// # Panics
    ///
    /// Panics if nothing is bound. See [`try_call_mut`](Self::try_call_mut)
    /// for a fallible version.
    #[inline]
    #[track_caller]
    pub fn call_mut<'a>(
        &self,
        object: &mut M::Receiver,
        args: MethodArgsOf<'a, M>,
    ) -> MethodOutputOf<M> {
        // SAFETY:
        // 1. The pointer is derived from a mutable reference that is not used
        //    for the duration of the call.
        match unsafe { self.invoke(core::ptr::from_mut(object), args) } {
            Ok(output) => output,
            Err(error) => fatal(error),
        }
    }

    /// Calls the method on `object`, which the method may mutate.
    ///
    /// Fails with [`Error::InvalidFunction`] if nothing is bound.
    #[inline]
    #[track_caller]
    pub fn try_call_mut<'a>(
        &self,
        object: &mut M::Receiver,
        args: MethodArgsOf<'a, M>,
    ) -> Result<MethodOutputOf<M>> {
        // SAFETY:
        // 1. The pointer is derived from a mutable reference that is not used
        //    for the duration of the call.
        unsafe { self.invoke(core::ptr::from_mut(object), args) }.or_else(signal)
    }

    /// Calls the method on the object behind `object`.
    ///
    /// Fails with [`Error::InvalidFunction`] if nothing is bound and with
    /// [`Error::InvalidObject`] if `object` is null.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. If not null, `object` points to a live `M::Receiver`.
    /// 2. If the method takes its receiver by mutable reference, `object` is
    ///    valid for writes and no other reference to the receiver is used for
    ///    the duration of the call.
    #[track_caller]
    pub unsafe fn try_call_ptr<'a>(
        &self,
        object: *mut M::Receiver,
        args: MethodArgsOf<'a, M>,
    ) -> Result<MethodOutputOf<M>> {
        // SAFETY:
        // 1. Guaranteed by the caller.
        unsafe { self.invoke(object.cast_const(), args) }.or_else(signal)
    }

    /// Binds the method to an object and returns the bound callable.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. The object in `storage` satisfies the requirements of
    ///    [`Method::invoke_method`] for as long as the result or any copy
    ///    of it is called.
    unsafe fn bind_object(&self, storage: RawObject) -> Function<M::Bound> {
        // SAFETY:
        // 1. Method trampolines of `M` take the arguments of `M::Bound` and
        //    return its result, and require what `Method::invoke_method`
        //    requires (invariant 2), guaranteed by the caller.
        unsafe { Function::from_trampoline(self.trampoline(), storage) }
    }

    /// Binds the method to an object that lives for the rest of the program.
    ///
    /// An unbound [`MemberFunction`] produces an empty
    /// [`Function`].
    pub fn bind_static(&self, object: &'static M::Receiver) -> Function<M::Bound>
    where
        M: SharedMethodSignature,
    {
        let mut storage = RawObject::new();
        storage.store_borrowed(NonNull::from(object));

        // SAFETY:
        // 1. The object lives for the rest of the program and is only read.
        unsafe { self.bind_object(storage) }
    }

    /// Binds the method to an object held by the shared handle `object`.
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// use erased_fn::MemberFunction;
    ///
    /// struct Label(&'static str);
    ///
    /// impl Label {
    ///     fn len(&self) -> usize {
    ///         self.0.len()
    ///     }
    /// }
    ///
    /// let len = MemberFunction::<fn(&Label) -> usize>::from_method(Label::len);
    /// let bound = len.bind_shared(Arc::new(Label("four")));
    /// assert_eq!(bound.call(()), 4);
    /// ```
    pub fn bind_shared<P>(&self, object: P) -> Function<M::Bound>
    where
        M: SharedMethodSignature,
        P: SharedPointer<Target = M::Receiver>,
    {
        let mut storage = RawObject::new();
        storage.store_shared(object);

        // SAFETY:
        // 1. The storage and all copies of it keep the object alive. The
        //    object is only read.
        unsafe { self.bind_object(storage) }
    }

    /// Binds the method to the object behind `object`.
    ///
    /// Fails with [`Error::InvalidObject`] if `object` is null.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. If not null, `object` points to a live `M::Receiver` for as long as
    ///    the result or any copy of it is called.
    /// 2. If the method takes its receiver by mutable reference, `object` is
    ///    valid for writes and no other reference to the receiver is used
    ///    while it is in use by a call.
    #[track_caller]
    pub unsafe fn bind_ptr(&self, object: *mut M::Receiver) -> Result<Function<M::Bound>> {
        let Some(object) = NonNull::new(object) else {
            return signal(Error::InvalidObject);
        };
        let mut storage = RawObject::new();
        storage.store_borrowed(object);

        // SAFETY:
        // 1. Guaranteed by the caller.
        Ok(unsafe { self.bind_object(storage) })
    }

    /// Returns `true` if a method is bound.
    #[inline]
    pub fn is_bound(&self) -> bool {
        self.as_raw().is_bound()
    }

    /// Returns the identity of `MemberFunction<M>`.
    #[inline]
    pub fn identity(&self) -> TypeIdentity {
        self.as_raw().identity()
    }

    /// Returns this member function as an [`ErasedFunction`].
    #[inline]
    pub fn as_erased(&self) -> &ErasedFunction {
        ErasedFunction::from_raw_ref(self.as_raw())
    }

    /// Converts this member function into an [`ErasedFunction`].
    #[inline]
    pub fn into_erased(self) -> ErasedFunction {
        ErasedFunction::from_raw(self.into_raw())
    }
}

impl<M: MethodSignature> Default for MemberFunction<M> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<M: MethodSignature> Clone for MemberFunction<M> {
    #[track_caller]
    fn clone(&self) -> Self {
        let raw = unwrap_or_fatal(self.as_raw().try_clone());

        // SAFETY:
        // 1. Copies keep the identity.
        // 2. Copies keep the trampoline.
        // 3. Copies of an empty object are empty.
        unsafe { Self::from_raw(raw) }
    }
}

impl<M: MethodSignature> From<MemberFunction<M>> for ErasedFunction {
    #[inline]
    fn from(function: MemberFunction<M>) -> Self {
        function.into_erased()
    }
}

impl<M: MethodSignature> core::fmt::Debug for MemberFunction<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemberFunction")
            .field("signature", &core::any::type_name::<M>())
            .field("bound", &self.is_bound())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use alloc::rc::Rc;

    use super::*;
    use crate::Ownership;

    struct Counter {
        count: u32,
    }

    impl Counter {
        fn peek(&self, offset: u32) -> u32 {
            self.count + offset
        }

        fn increment(&mut self, by: u32) -> u32 {
            self.count += by;
            self.count
        }

        fn read_into(&self, out: &mut u32) {
            *out = self.count;
        }
    }

    static COUNTER: Counter = Counter { count: 40 };

    type Peek = fn(&Counter, u32) -> u32;
    type Increment = fn(&mut Counter, u32) -> u32;

    #[test]
    fn test_call_with_receivers() {
        let peek = MemberFunction::<Peek>::from_method(Counter::peek);
        let increment = MemberFunction::<Increment>::from_method(Counter::increment);
        let mut counter = Counter { count: 1 };

        assert_eq!(peek.call(&counter, (1,)), 2);
        assert_eq!(increment.call_mut(&mut counter, (4,)), 5);
        assert_eq!(peek.call_mut(&mut counter, (0,)), 5);
        assert!(peek.as_raw().bound_object().is_null());
    }

    #[test]
    fn test_bind() {
        let peek = MemberFunction::<Peek>::from_method(Counter::peek);

        let bound = peek.bind_static(&COUNTER);
        assert_eq!(bound.ownership(), Ownership::Borrowed);
        assert_eq!(bound.call((2,)), 42);

        let shared = Rc::new(Counter { count: 10 });
        let bound = peek.bind_shared(Rc::clone(&shared));
        drop(shared);
        assert_eq!(bound.call((1,)), 11);
        assert_eq!(bound.identity(), <Function<fn(u32) -> u32> as FunctionView>::IDENTITY);
    }

    #[test]
    fn test_borrowed_arguments() {
        let read_into = MemberFunction::<fn(&Counter, &mut u32)>::from_method(Counter::read_into);

        let mut out = 0;
        read_into.call(&COUNTER, (&mut out,));
        assert_eq!(out, 40);

        let bound = read_into.bind_shared(Rc::new(Counter { count: 7 }));
        bound.call((&mut out,));
        assert_eq!(out, 7);
    }

    #[test]
    fn test_bind_ptr_mut() {
        let increment = MemberFunction::<Increment>::from_method(Counter::increment);
        let mut counter = Counter { count: 0 };

        // SAFETY: `counter` outlives `bound` and is not used while it is
        // called.
        let bound = unsafe { increment.bind_ptr(&raw mut counter) }.unwrap();
        bound.call((2,));
        bound.call((3,));
        drop(bound);
        assert_eq!(counter.count, 5);
    }

    #[test]
    #[cfg(not(feature = "abort-on-error"))]
    fn test_errors() {
        let empty = MemberFunction::<Peek>::new();
        assert!(!empty.is_bound());
        assert_eq!(empty.try_call(&COUNTER, (0,)), Err(Error::InvalidFunction));
        assert!(!empty.bind_static(&COUNTER).is_bound());

        let increment = MemberFunction::<Increment>::from_method(Counter::increment);
        // SAFETY: Null pointers are rejected before the method is called.
        let result = unsafe { increment.try_call_ptr(core::ptr::null_mut(), (1,)) };
        assert_eq!(result, Err(Error::InvalidObject));
        // SAFETY: Null pointers are rejected before anything is bound.
        let result = unsafe { increment.bind_ptr(core::ptr::null_mut()) };
        assert_eq!(result.unwrap_err(), Error::InvalidObject);
    }

    #[test]
    fn test_clone_shares_trampoline() {
        let peek = MemberFunction::<Peek>::from_method(Counter::peek);
        let copy = peek.clone();
        assert_eq!(copy.call(&COUNTER, (0,)), 40);
        assert_eq!(copy.identity(), peek.identity());
    }
}
