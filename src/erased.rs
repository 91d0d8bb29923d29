use erased_fn_internals::{RawFunction, TypeIdentity, object::Ownership};

use crate::error::{Result, signal, unwrap_or_fatal};

/// A callable of any calling convention, with its type erased.
///
/// An [`ErasedFunction`] is what a [`Function<S>`] or [`MemberFunction<M>`]
/// becomes once its type parameter is forgotten. All of them share the same
/// layout, so callables of unrelated signatures can be kept side by side in
/// one collection and cast back with [`cast`](Self::cast) when needed.
///
/// An [`ErasedFunction`] remembers the identity of the typed callable it was
/// created from. Assigning into it through [`clone_from_erased`],
/// [`move_from`] or [`set`] only accepts callables of the same identity,
/// unless it was created with [`ErasedFunction::new`] and never assigned.
///
/// ```
/// use erased_fn::{ErasedFunction, Function};
///
/// let handlers: Vec<ErasedFunction> = vec![
///     Function::<fn(u32) -> u32>::from_fn(|value: u32| value + 1).into(),
///     Function::<fn(&str) -> usize>::from_fn(str::len).into(),
/// ];
///
/// let increment = handlers[0].cast::<Function<fn(u32) -> u32>>().unwrap();
/// assert_eq!(increment.call((1,)), 2);
/// ```
///
/// [`Function<S>`]: crate::Function
/// [`MemberFunction<M>`]: crate::MemberFunction
/// [`clone_from_erased`]: Self::clone_from_erased
/// [`move_from`]: Self::move_from
/// [`set`]: Self::set
#[repr(transparent)]
pub struct ErasedFunction {
    raw: RawFunction,
}

impl ErasedFunction {
    /// Creates an untyped [`ErasedFunction`] with nothing bound to it.
    ///
    /// This is the only way to get an untyped callable. It takes on the
    /// identity of the first callable assigned to it.
    #[inline]
    pub const fn new() -> Self {
        Self {
            raw: RawFunction::new(),
        }
    }

    #[inline]
    pub(crate) const fn from_raw(raw: RawFunction) -> Self {
        Self { raw }
    }

    #[inline]
    pub(crate) fn from_raw_ref(raw: &RawFunction) -> &Self {
        let ptr = core::ptr::from_ref(raw).cast::<Self>();

        // SAFETY: `ErasedFunction` is a `#[repr(transparent)]` wrapper around
        // `RawFunction` without further invariants.
        unsafe { &*ptr }
    }

    #[inline]
    pub(crate) fn into_raw(mut self) -> RawFunction {
        self.raw.take()
    }

    /// Returns the identity of the typed callable this was created from, or
    /// [`TypeIdentity::UNTYPED`].
    #[inline]
    pub fn identity(&self) -> TypeIdentity {
        self.raw.identity()
    }

    /// Returns `true` if something is bound.
    #[inline]
    pub fn is_bound(&self) -> bool {
        self.raw.is_bound()
    }

    /// Returns `true` if nothing is bound.
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.raw.is_bound()
    }

    /// Returns the address of the bound object, or null when there is none.
    #[inline]
    pub fn bound_object(&self) -> *const () {
        self.raw.bound_object()
    }

    /// Returns how the bound object is held.
    #[inline]
    pub fn ownership(&self) -> Ownership {
        self.raw.ownership()
    }

    /// Creates an independent copy of this callable.
    ///
    /// Fails with [`Error::NonCopyableObject`](crate::Error::NonCopyableObject)
    /// if the bound object cannot be copied.
    #[track_caller]
    pub fn try_clone(&self) -> Result<Self> {
        self.raw.try_clone().map(Self::from_raw).or_else(signal)
    }

    /// Replaces this callable with a copy of `source`.
    ///
    /// Fails with [`Error::IncompatibleType`](crate::Error::IncompatibleType)
    /// if this callable is typed and `source` has another identity, and with
    /// [`Error::NonCopyableObject`](crate::Error::NonCopyableObject) if the
    /// bound object of `source` cannot be copied. Nothing is modified on
    /// failure.
    #[track_caller]
    pub fn clone_from_erased(&mut self, source: &Self) -> Result<()> {
        self.raw.try_clone_from(&source.raw).or_else(signal)
    }

    /// Moves `source` into this callable, leaving `source` empty.
    ///
    /// Fails with [`Error::IncompatibleType`](crate::Error::IncompatibleType)
    /// if this callable is typed and `source` has another identity. Nothing
    /// is modified on failure.
    #[track_caller]
    pub fn move_from(&mut self, source: &mut Self) -> Result<()> {
        self.raw.move_from(&mut source.raw).or_else(signal)
    }

    /// Moves a typed callable into this callable.
    ///
    /// Fails with [`Error::IncompatibleType`](crate::Error::IncompatibleType)
    /// if this callable is typed and `source` has another identity, in which
    /// case `source` is dropped.
    ///
    /// ```
    /// use erased_fn::{ErasedFunction, Function};
    ///
    /// let mut erased = ErasedFunction::new();
    /// erased.set(Function::<fn() -> u8>::from_fn(|| 1)).unwrap();
    /// erased.set(Function::<fn() -> u8>::from_fn(|| 2)).unwrap();
    /// assert!(erased.set(Function::<fn() -> u16>::from_fn(|| 3)).is_err());
    /// ```
    #[track_caller]
    pub fn set(&mut self, source: impl Into<ErasedFunction>) -> Result<()> {
        let mut source = source.into();
        self.move_from(&mut source)
    }

    /// Unbinds whatever is bound, releasing the bound object.
    ///
    /// The identity is kept.
    ///
    /// # Panics
    ///
    /// Panics if the installed object allocator fails to release the object.
    #[track_caller]
    pub fn clear(&mut self) {
        unwrap_or_fatal(self.raw.try_clear());
    }

    /// Moves the bound callable out, leaving this callable empty with its
    /// identity kept.
    #[inline]
    pub fn take(&mut self) -> Self {
        Self::from_raw(self.raw.take())
    }
}

impl Drop for ErasedFunction {
    fn drop(&mut self) {
        self.clear();
    }
}

impl Default for ErasedFunction {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ErasedFunction {
    #[track_caller]
    fn clone(&self) -> Self {
        Self::from_raw(unwrap_or_fatal(self.raw.try_clone()))
    }
}

impl core::fmt::Debug for ErasedFunction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ErasedFunction")
            .field("identity", &self.identity())
            .field("bound", &self.is_bound())
            .field("ownership", &self.ownership())
            .finish()
    }
}
