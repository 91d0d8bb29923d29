//! Runtime identities for types, used to tag type-erased callables.
//!
//! A [`TypeIdentity`] is a single pointer to a `'static` record that is unique
//! per monomorphized type. It can be copied freely, compared for equality,
//! hashed, and reports the human-readable name of the type it was created
//! from. The reserved [`TypeIdentity::UNTYPED`] value is used for callables
//! that have not been tagged with a signature yet.
//!
//! Records are created with the same `const { &... }` promotion used for the
//! object vtables, so creating an identity never allocates and never touches
//! global state.

use core::{
    any::TypeId,
    fmt,
    hash::{Hash, Hasher},
};

/// The static record a [`TypeIdentity`] points at.
struct IdentityRecord {
    /// Gets the [`TypeId`] of the identified type.
    type_id: fn() -> TypeId,
    /// Gets the name of the identified type.
    type_name: fn() -> &'static str,
}

/// A copyable, comparable, hashable runtime token naming a type.
///
/// Two identities compare equal exactly when they were created from the same
/// type. Identities created by different crates or in different generic
/// contexts for the same type still compare equal, since equality is decided
/// by [`TypeId`] rather than by record address.
///
/// # Example
///
/// ```
/// use erased_fn_internals::TypeIdentity;
///
/// let a = TypeIdentity::of::<fn(i32) -> i32>();
/// let b = TypeIdentity::of::<fn(i32) -> i32>();
/// assert_eq!(a, b);
/// assert_ne!(a, TypeIdentity::of::<fn(u32) -> i32>());
/// assert_ne!(a, TypeIdentity::UNTYPED);
/// ```
#[derive(Clone, Copy, Default)]
pub struct TypeIdentity(Option<&'static IdentityRecord>);

impl TypeIdentity {
    /// The identity of a callable that carries no signature.
    pub const UNTYPED: Self = Self(None);

    /// Returns the identity of `T`.
    #[inline]
    #[must_use]
    pub const fn of<T: ?Sized + 'static>() -> Self {
        Self(Some(const {
            &IdentityRecord {
                type_id: TypeId::of::<T>,
                type_name: core::any::type_name::<T>,
            }
        }))
    }

    /// Returns `true` if this is [`TypeIdentity::UNTYPED`].
    #[inline]
    pub const fn is_untyped(self) -> bool {
        self.0.is_none()
    }

    /// Returns the [`TypeId`] of the identified type, or [`None`] when
    /// untyped.
    #[inline]
    pub fn type_id(self) -> Option<TypeId> {
        self.0.map(|record| (record.type_id)())
    }

    /// Returns the name of the identified type, or [`None`] when untyped.
    #[inline]
    pub fn type_name(self) -> Option<&'static str> {
        self.0.map(|record| (record.type_name)())
    }

    /// Returns `true` if this identity was created from `T`.
    #[inline]
    pub fn is<T: ?Sized + 'static>(self) -> bool {
        self == Self::of::<T>()
    }

    /// Returns `true` if a callable tagged with `source` may be stored into a
    /// slot tagged with `self`.
    ///
    /// Untyped slots accept anything; typed slots only accept their own
    /// identity.
    #[inline]
    pub fn accepts(self, source: TypeIdentity) -> bool {
        self.is_untyped() || self == source
    }
}

impl PartialEq for TypeIdentity {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        match (self.0, other.0) {
            (None, None) => true,
            (Some(a), Some(b)) => core::ptr::eq(a, b) || (a.type_id)() == (b.type_id)(),
            _ => false,
        }
    }
}

impl Eq for TypeIdentity {}

impl Hash for TypeIdentity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.type_id().hash(state);
    }
}

impl fmt::Debug for TypeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.type_name() {
            Some(name) => f.debug_tuple("TypeIdentity").field(&name).finish(),
            None => f.write_str("TypeIdentity(untyped)"),
        }
    }
}

impl fmt::Display for TypeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name().unwrap_or("<untyped>"))
    }
}
