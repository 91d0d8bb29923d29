use core::mem::size_of;

use erased_fn_internals::{
    RawFunction, RawObject, TypeIdentity,
    object::{Ownership, SharedPointer},
    signature::{ArgsOf, Callable, Method, MethodSignature, OutputOf, Signature},
    trampoline::{self, Trampoline},
};

use crate::{
    ErasedFunction,
    cast::FunctionView,
    error::{Error, Result, fatal, signal, unwrap_or_fatal},
};

/// FIXME: Once rust-lang/rust#132922 gets resolved, we can make the `raw` field
/// an unsafe field and remove this module.
mod limit_field_access {
    use core::marker::PhantomData;

    use erased_fn_internals::{RawFunction, signature::Signature};

    /// A type-erased callable with the calling convention `S`.
    ///
    /// `S` is a function pointer type such as `fn(i32, i32) -> i32`. A
    /// [`Function`] can hold anything callable with that convention: a
    /// function item, a closure, or a method bound to an object. Whatever is
    /// held, the [`Function`] itself is four machine words and can be
    /// converted to an [`ErasedFunction`] and cast back again.
    ///
    /// Arguments are passed as a tuple:
    ///
    /// ```
    /// use erased_fn::Function;
    ///
    /// let offset = 10;
    /// let add = Function::<fn(i32, i32) -> i32>::from_callable(move |a: i32, b: i32| {
    ///     a + b + offset
    /// });
    /// assert_eq!(add.call((3, 4)), 17);
    /// ```
    ///
    /// Arguments may be borrowed, and the callable sees the caller's values:
    ///
    /// ```
    /// use erased_fn::Function;
    ///
    /// type Toggle = fn(&mut bool, bool) -> i32;
    ///
    /// let toggle = Function::<Toggle>::from_fn(|flag: &mut bool, value: bool| {
    ///     *flag = value;
    ///     i32::from(value)
    /// });
    /// let mut flag = false;
    /// assert_eq!(toggle.call((&mut flag, true)), 1);
    /// assert!(flag);
    /// ```
    ///
    /// [`ErasedFunction`]: crate::ErasedFunction
    #[repr(transparent)]
    pub struct Function<S: Signature> {
        /// # Safety
        ///
        /// The following safety invariants are guaranteed to be upheld as long
        /// as this struct exists:
        ///
        /// 1. The identity of `raw` is `TypeIdentity::of::<Function<S>>()`.
        raw: RawFunction,
        _signature: PhantomData<S>,
    }

    impl<S: Signature> Function<S> {
        /// Creates a new [`Function`] from a [`RawFunction`].
        ///
        /// # Safety
        ///
        /// The caller must ensure:
        ///
        /// 1. The identity of `raw` is `TypeIdentity::of::<Function<S>>()`.
        #[must_use]
        pub(crate) unsafe fn from_raw(raw: RawFunction) -> Self {
            // SAFETY: We must uphold the safety invariants of the raw field:
            // 1. Guaranteed by the caller
            Self {
                raw,
                _signature: PhantomData,
            }
        }

        /// Consumes the [`Function`] and returns the inner [`RawFunction`].
        #[must_use]
        pub(crate) fn into_raw(mut self) -> RawFunction {
            // `take` keeps the identity, and the emptied remainder has nothing
            // left to release when dropped.
            self.raw.take()
        }

        /// Returns a reference to the inner [`RawFunction`].
        #[must_use]
        pub(crate) fn as_raw(&self) -> &RawFunction {
            &self.raw
        }

        /// Returns a mutable reference to the inner [`RawFunction`].
        ///
        /// # Safety
        ///
        /// The caller must ensure:
        ///
        /// 1. The identity of the [`RawFunction`] is not changed through the
        ///    returned reference, for instance by assigning a different
        ///    [`RawFunction`] to it.
        #[must_use]
        pub(crate) unsafe fn as_raw_mut(&mut self) -> &mut RawFunction {
            &mut self.raw
        }
    }
}

pub use limit_field_access::Function;

impl<S: Signature> Function<S> {
    /// Creates a [`Function`] with nothing bound to it.
    ///
    /// Calling it fails with [`Error::InvalidFunction`].
    #[inline]
    pub fn new() -> Self {
        let raw = RawFunction::typed(Self::IDENTITY);

        // SAFETY:
        // 1. The identity is the identity of `Function<S>`.
        unsafe { Self::from_raw(raw) }
    }

    /// Creates a [`Function`] from a trampoline and the object it is called
    /// with.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. If `trampoline` is set, `object` satisfies the requirements of the
    ///    constructor the trampoline was created with, for as long as the
    ///    function or any copy of it is called.
    pub(crate) unsafe fn from_trampoline(
        trampoline: Option<&'static Trampoline<S>>,
        object: RawObject,
    ) -> Self {
        // SAFETY:
        // 1. The identity of `Function<S>` is only ever paired with
        //    trampolines taking the arguments and returning the result of
        //    `S`.
        // 2. Guaranteed by the caller.
        let raw = unsafe { RawFunction::from_parts(Self::IDENTITY, trampoline, object) };

        // SAFETY:
        // 1. The identity is the identity of `Function<S>`.
        unsafe { Self::from_raw(raw) }
    }

    /// Creates a [`Function`] from a `Copy` callable.
    ///
    /// Function items and closures without captures are zero-sized: they are
    /// re-created at every call and need no storage at all. Other callables
    /// are stored as with [`from_callable`](Self::from_callable).
    ///
    /// ```
    /// use erased_fn::Function;
    ///
    /// fn sum(a: i32, b: i32) -> i32 {
    ///     a + b
    /// }
    ///
    /// let function = Function::<fn(i32, i32) -> i32>::from_fn(sum);
    /// assert!(function.bound_object().is_null());
    /// assert_eq!(function.call((3, 4)), 7);
    /// ```
    #[track_caller]
    pub fn from_fn<F: Callable<S> + Copy>(function: F) -> Self {
        if size_of::<F>() != 0 {
            return Self::from_callable(function);
        }

        // SAFETY:
        // 1. `F` was checked to be zero-sized.
        // 2. `function` is a value of `F`.
        let trampoline = unsafe { trampoline::zero_sized::<S, F>() };

        // SAFETY:
        // 1. Zero-sized trampolines accept any object.
        unsafe { Self::from_trampoline(Some(trampoline), RawObject::new()) }
    }

    /// Creates a [`Function`] owning a copy of `callable`.
    ///
    /// Copies of the [`Function`] clone the callable, so stateful closures
    /// do not share their state.
    ///
    /// # Panics
    ///
    /// Panics if the installed object allocator fails. See
    /// [`try_from_callable`](Self::try_from_callable) for a fallible version.
    #[track_caller]
    pub fn from_callable<F: Callable<S> + Clone>(callable: F) -> Self {
        unwrap_or_fatal(Self::try_from_callable(callable))
    }

    /// Creates a [`Function`] owning a copy of `callable`.
    ///
    /// Fails with [`Error::CustomAllocatorFailure`] if the installed object
    /// allocator fails.
    #[track_caller]
    pub fn try_from_callable<F: Callable<S> + Clone>(callable: F) -> Result<Self> {
        let mut object = RawObject::new();
        object.store_owned(callable).or_else(signal)?;

        // SAFETY:
        // 1. The object holds a live `F`, and copies of it hold their own.
        Ok(unsafe { Self::from_trampoline(Some(trampoline::callable::<S, F>()), object) })
    }

    /// Creates a [`Function`] owning a callable that cannot be cloned.
    ///
    /// The resulting [`Function`] can be called and moved, but copying it
    /// fails with [`Error::NonCopyableObject`].
    ///
    /// ```
    /// use erased_fn::{ErrorKind, Function};
    ///
    /// struct Token(u32);
    ///
    /// let token = Token(7);
    /// let function = Function::<fn() -> u32>::from_unique(move || token.0);
    /// assert_eq!(function.call(()), 7);
    /// assert_eq!(
    ///     function.try_clone().unwrap_err().kind(),
    ///     ErrorKind::NonCopyableObject
    /// );
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the installed object allocator fails. See
    /// [`try_from_unique`](Self::try_from_unique) for a fallible version.
    #[track_caller]
    pub fn from_unique<F: Callable<S>>(callable: F) -> Self {
        unwrap_or_fatal(Self::try_from_unique(callable))
    }

    /// Creates a [`Function`] owning a callable that cannot be cloned.
    ///
    /// Fails with [`Error::CustomAllocatorFailure`] if the installed object
    /// allocator fails.
    #[track_caller]
    pub fn try_from_unique<F: Callable<S>>(callable: F) -> Result<Self> {
        let mut object = RawObject::new();
        object.store_owned_unique(callable).or_else(signal)?;

        // SAFETY:
        // 1. The object holds a live `F`. It cannot be copied, so there are
        //    no copies.
        Ok(unsafe { Self::from_trampoline(Some(trampoline::callable::<S, F>()), object) })
    }

    /// Creates a [`Function`] calling `method` on an object that lives for
    /// the rest of the program.
    ///
    /// `method` must be zero-sized, such as a method item or a closure
    /// without captures.
    ///
    /// ```
    /// use erased_fn::Function;
    ///
    /// struct Greeter {
    ///     greeting: &'static str,
    /// }
    ///
    /// impl Greeter {
    ///     fn greeting_len(&self, extra: usize) -> usize {
    ///         self.greeting.len() + extra
    ///     }
    /// }
    ///
    /// static GREETER: Greeter = Greeter { greeting: "hello" };
    ///
    /// let function =
    ///     Function::<fn(usize) -> usize>::from_method(Greeter::greeting_len, &GREETER);
    /// assert_eq!(function.call((1,)), 6);
    /// ```
    pub fn from_method<O: 'static, F: Method<S::ByRef<O>>>(method: F, object: &'static O) -> Self {
        let mut storage = RawObject::new();
        storage.store_borrowed(core::ptr::NonNull::from(object));

        // SAFETY:
        // 1. The object lives for the rest of the program and is only read.
        unsafe { Self::from_method_object::<S::ByRef<O>, F>(method, storage) }
    }

    /// Creates a [`Function`] calling `method` on an object held by the shared
    /// handle `object`.
    ///
    /// The [`Function`] and all its copies keep the object alive, so the
    /// handle passed in may be dropped right away.
    ///
    /// ```
    /// use std::rc::Rc;
    ///
    /// use erased_fn::Function;
    ///
    /// struct Object {
    ///     id: i32,
    /// }
    ///
    /// impl Object {
    ///     fn sum(&self, a: i32, b: i32) -> i32 {
    ///         self.id + a + b
    ///     }
    /// }
    ///
    /// let object = Rc::new(Object { id: 10 });
    /// let function =
    ///     Function::<fn(i32, i32) -> i32>::from_method_shared(Object::sum, Rc::clone(&object));
    /// drop(object);
    /// assert_eq!(function.call((3, 4)), 17);
    /// ```
    pub fn from_method_shared<P, F>(method: F, object: P) -> Self
    where
        P: SharedPointer,
        F: Method<S::ByRef<P::Target>>,
    {
        let mut storage = RawObject::new();
        storage.store_shared(object);

        // SAFETY:
        // 1. The storage and all copies of it keep the object alive. The
        //    object is only read.
        unsafe { Self::from_method_object::<S::ByRef<P::Target>, F>(method, storage) }
    }

    /// Creates a [`Function`] calling `method` on its own copy of `object`.
    ///
    /// Copies of the [`Function`] clone the object.
    ///
    /// # Panics
    ///
    /// Panics if the installed object allocator fails.
    #[track_caller]
    pub fn from_method_owned<O, F>(method: F, object: O) -> Self
    where
        O: Clone + 'static,
        F: Method<S::ByRef<O>>,
    {
        let mut storage = RawObject::new();
        unwrap_or_fatal(storage.store_owned(object));

        // SAFETY:
        // 1. The storage holds a live `O` and copies of it hold their own.
        //    The object is only read.
        unsafe { Self::from_method_object::<S::ByRef<O>, F>(method, storage) }
    }

    /// Creates a [`Function`] calling `method` on the object behind `object`.
    ///
    /// Fails with [`Error::InvalidObject`] if `object` is null.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. If not null, `object` points to a live `O` for as long as the
    ///    [`Function`] or any copy of it is called.
    /// 2. The object is not mutated while it is in use by a call.
    #[track_caller]
    pub unsafe fn from_method_ptr<O, F>(method: F, object: *const O) -> Result<Self>
    where
        O: 'static,
        F: Method<S::ByRef<O>>,
    {
        let Some(object) = core::ptr::NonNull::new(object.cast_mut()) else {
            return signal(Error::InvalidObject);
        };
        let mut storage = RawObject::new();
        storage.store_borrowed(object);

        // SAFETY:
        // 1. Guaranteed by the caller.
        Ok(unsafe { Self::from_method_object::<S::ByRef<O>, F>(method, storage) })
    }

    /// Creates a [`Function`] calling the mutating `method` on the object
    /// behind `object`.
    ///
    /// Fails with [`Error::InvalidObject`] if `object` is null.
    ///
    /// ```
    /// use erased_fn::Function;
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
    /// let mut counter = Counter { count: 0 };
    /// // SAFETY: `counter` outlives the function and is not used while it is
    /// // called.
    /// let function = unsafe {
    ///     Function::<fn(u32) -> u32>::from_method_ptr_mut(
    ///         Counter::increment,
    ///         &raw mut counter,
    ///     )
    /// }
    /// .unwrap();
    /// function.call((2,));
    /// function.call((3,));
    /// drop(function);
    /// assert_eq!(counter.count, 5);
    /// ```
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. If not null, `object` points to a live `O` for as long as the
    ///    [`Function`] or any copy of it is called.
    /// 2. `object` is valid for writes, and no other reference to the object
    ///    is used while it is in use by a call.
    #[track_caller]
    pub unsafe fn from_method_ptr_mut<O, F>(method: F, object: *mut O) -> Result<Self>
    where
        O: 'static,
        F: Method<S::ByMut<O>>,
    {
        let Some(object) = core::ptr::NonNull::new(object) else {
            return signal(Error::InvalidObject);
        };
        let mut storage = RawObject::new();
        storage.store_borrowed(object);

        // SAFETY:
        // 1. Guaranteed by the caller.
        Ok(unsafe { Self::from_method_object::<S::ByMut<O>, F>(method, storage) })
    }

    /// Creates a [`Function`] calling the zero-sized `method` on the object in
    /// `storage`.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. The object in `storage` satisfies the requirements of
    ///    [`Method::invoke_method`] for as long as the [`Function`] or any
    ///    copy of it is called.
    unsafe fn from_method_object<M, F>(method: F, storage: RawObject) -> Self
    where
        M: MethodSignature<Bound = S>,
        F: Method<M>,
    {
        const {
            assert!(
                size_of::<F>() == 0,
                "methods bound to an object must be zero-sized, such as method items"
            );
        }
        let _ = method;

        // SAFETY:
        // 1. `F` is zero-sized, asserted above.
        // 2. `method` is a value of `F`.
        let trampoline = unsafe { trampoline::method::<M, F>() };

        // SAFETY:
        // 1. Guaranteed by the caller.
        unsafe { Self::from_trampoline(Some(trampoline), storage) }
    }

    /// Calls the bound trampoline without reporting errors.
    #[inline]
    fn invoke<'a>(&self, args: ArgsOf<'a, S>) -> Result<OutputOf<S>> {
        // SAFETY:
        // 1. The identity of `Function<S>` names the arguments and result of
        //    `S`.
        unsafe { self.as_raw().invoke::<S>(args) }
    }

    /// Calls the function with a tuple of arguments.
    ///
    /// Fails with [`Error::InvalidFunction`] if nothing is bound.
    #[inline]
    #[track_caller]
    pub fn try_call<'a>(&self, args: ArgsOf<'a, S>) -> Result<OutputOf<S>> {
        self.invoke(args).or_else(signal)
    }

    /// Calls the function with a tuple of arguments.
    ///
    /// # Panics
    ///
    /// Panics if nothing is bound. See [`try_call`](Self::try_call) for a
    /// fallible version.
    #[inline]
    #[track_caller]
    pub fn call<'a>(&self, args: ArgsOf<'a, S>) -> OutputOf<S> {
        match self.invoke(args) {
            Ok(output) => output,
            Err(error) => fatal(error),
        }
    }

    /// Replaces whatever is bound with the `Copy` callable `function`.
    ///
    /// Equivalent to assigning [`Function::from_fn`].
    #[track_caller]
    pub fn set<F: Callable<S> + Copy>(&mut self, function: F) {
        *self = Self::from_fn(function);
    }

    /// Replaces this function with a copy of `source`.
    ///
    /// Fails with [`Error::NonCopyableObject`] if the object bound to
    /// `source` cannot be copied, in which case `self` is left untouched.
    #[track_caller]
    pub fn try_clone_from(&mut self, source: &Self) -> Result<()> {
        // SAFETY:
        // 1. `source` has the same identity, so the identity is unchanged.
        let raw = unsafe { self.as_raw_mut() };
        raw.try_clone_from(source.as_raw()).or_else(signal)
    }

    /// Unbinds whatever is bound, releasing the bound object.
    ///
    /// The function keeps its calling convention.
    ///
    /// # Panics
    ///
    /// Panics if the installed object allocator fails to release the object.
    #[track_caller]
    pub fn clear(&mut self) {
        // SAFETY:
        // 1. Clearing keeps the identity.
        let raw = unsafe { self.as_raw_mut() };
        unwrap_or_fatal(raw.try_clear());
    }

    /// Moves the bound callable out, leaving this function empty.
    pub fn take(&mut self) -> Self {
        // SAFETY:
        // 1. Taking keeps the identity.
        let raw = unsafe { self.as_raw_mut() }.take();

        // SAFETY:
        // 1. `take` keeps the identity, which is the identity of
        //    `Function<S>`.
        unsafe { Self::from_raw(raw) }
    }

    /// Returns `true` if something is bound.
    #[inline]
    pub fn is_bound(&self) -> bool {
        self.as_raw().is_bound()
    }

    /// Returns the address of the bound object, or null when there is none.
    ///
    /// Function items and closures without captures have no object.
    #[inline]
    pub fn bound_object(&self) -> *const () {
        self.as_raw().bound_object()
    }

    /// Returns how the bound object is held.
    #[inline]
    pub fn ownership(&self) -> Ownership {
        self.as_raw().ownership()
    }

    /// Returns the identity of `Function<S>`.
    #[inline]
    pub fn identity(&self) -> TypeIdentity {
        self.as_raw().identity()
    }

    /// Creates an independent copy of this function.
    ///
    /// Fails with [`Error::NonCopyableObject`] if the bound object cannot be
    /// copied, or [`Error::CustomAllocatorFailure`] if the installed object
    /// allocator fails.
    #[track_caller]
    pub fn try_clone(&self) -> Result<Self> {
        let raw = self.as_raw().try_clone().or_else(signal)?;

        // SAFETY:
        // 1. Copies keep the identity.
        Ok(unsafe { Self::from_raw(raw) })
    }

    /// Returns this function as an [`ErasedFunction`].
    #[inline]
    pub fn as_erased(&self) -> &ErasedFunction {
        ErasedFunction::from_raw_ref(self.as_raw())
    }

    /// Converts this function into an [`ErasedFunction`].
    #[inline]
    pub fn into_erased(self) -> ErasedFunction {
        ErasedFunction::from_raw(self.into_raw())
    }
}

impl<S: Signature> Drop for Function<S> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<S: Signature> Default for Function<S> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<S: Signature> Clone for Function<S> {
    #[track_caller]
    fn clone(&self) -> Self {
        let raw = unwrap_or_fatal(self.as_raw().try_clone());

        // SAFETY:
        // 1. Copies keep the identity.
        unsafe { Self::from_raw(raw) }
    }

    #[track_caller]
    fn clone_from(&mut self, source: &Self) {
        // SAFETY:
        // 1. `source` has the same identity, so the identity is unchanged.
        let raw = unsafe { self.as_raw_mut() };
        unwrap_or_fatal(raw.try_clone_from(source.as_raw()));
    }
}

impl<S: Signature> From<Function<S>> for ErasedFunction {
    #[inline]
    fn from(function: Function<S>) -> Self {
        function.into_erased()
    }
}

impl<S: Signature> core::fmt::Debug for Function<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Function")
            .field("signature", &core::any::type_name::<S>())
            .field("bound", &self.is_bound())
            .field("ownership", &self.ownership())
            .finish()
    }
}
