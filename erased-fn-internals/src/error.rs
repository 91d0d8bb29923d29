//! The error conditions raised by type-erased callables.
//!
//! Every fallible operation in this crate returns [`Error`]. Whether an error
//! is handed back to the caller or ends the process is decided by the public
//! crate; the only place this crate decides on its own is [`fatal`], used when
//! an error surfaces somewhere no caller can observe it, such as inside
//! [`Drop`].

use core::fmt;

use crate::identity::TypeIdentity;

/// The kind of an [`Error`], without its payload.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ErrorKind {
    /// A callable without a bound function was invoked.
    InvalidFunction,
    /// An object required by the call was missing or inconsistent.
    InvalidObject,
    /// A checked cast named a signature other than the stored one.
    InvalidCast,
    /// A callable was assigned into a slot of another signature.
    IncompatibleType,
    /// A stored object that does not support duplication was copied.
    NonCopyableObject,
    /// The installed object allocator failed to allocate or release memory.
    CustomAllocatorFailure,
}

/// An error raised by an operation on a type-erased callable.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Error {
    /// A callable without a bound function was invoked.
    InvalidFunction,
    /// An object required by the call was missing or inconsistent.
    InvalidObject,
    /// A checked cast named a signature other than the stored one.
    InvalidCast {
        /// The identity the caller asked for.
        expected: TypeIdentity,
        /// The identity of the callable.
        actual: TypeIdentity,
    },
    /// A callable was assigned into a slot of another signature.
    IncompatibleType {
        /// The identity of the slot being assigned into.
        target: TypeIdentity,
        /// The identity of the callable being assigned.
        source: TypeIdentity,
    },
    /// A stored object that does not support duplication was copied.
    NonCopyableObject {
        /// The name of the stored object's type.
        type_name: &'static str,
    },
    /// The installed object allocator failed to allocate or release memory.
    CustomAllocatorFailure,
}

impl Error {
    /// Returns the kind of this error.
    #[inline]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidFunction => ErrorKind::InvalidFunction,
            Error::InvalidObject => ErrorKind::InvalidObject,
            Error::InvalidCast { .. } => ErrorKind::InvalidCast,
            Error::IncompatibleType { .. } => ErrorKind::IncompatibleType,
            Error::NonCopyableObject { .. } => ErrorKind::NonCopyableObject,
            Error::CustomAllocatorFailure => ErrorKind::CustomAllocatorFailure,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidFunction => write!(f, "called a function with nothing bound to it"),
            Error::InvalidObject => write!(f, "the object required by this call is missing"),
            Error::InvalidCast { expected, actual } => {
                write!(f, "cannot cast a function of type `{actual}` to `{expected}`")
            }
            Error::IncompatibleType { target, source } => write!(
                f,
                "cannot assign a function of type `{source}` to a function of type `{target}`"
            ),
            Error::NonCopyableObject { type_name } => {
                write!(f, "the stored object of type `{type_name}` cannot be copied")
            }
            Error::CustomAllocatorFailure => write!(f, "the custom object allocator failed"),
        }
    }
}

impl core::error::Error for Error {}

/// Ends the current operation for an error that cannot be returned.
///
/// With the `abort-on-error` feature and `std` enabled this aborts the
/// process. Otherwise it panics with the error's message.
#[cold]
#[track_caller]
#[cfg(not(all(feature = "abort-on-error", feature = "std")))]
pub fn fatal(error: Error) -> ! {
    panic!("{error}")
}

/// Ends the current operation for an error that cannot be returned.
///
/// With the `abort-on-error` feature and `std` enabled this aborts the
/// process. Otherwise it panics with the error's message.
#[cold]
#[track_caller]
#[cfg(all(feature = "abort-on-error", feature = "std"))]
pub fn fatal(error: Error) -> ! {
    let _ = error;
    std::process::abort()
}

#[cfg(test)]
mod tests {
    use alloc::string::ToString;

    use super::*;

    #[test]
    fn test_error_kind() {
        assert_eq!(Error::InvalidFunction.kind(), ErrorKind::InvalidFunction);
        assert_eq!(Error::InvalidObject.kind(), ErrorKind::InvalidObject);
        assert_eq!(
            Error::InvalidCast {
                expected: TypeIdentity::of::<u8>(),
                actual: TypeIdentity::UNTYPED,
            }
            .kind(),
            ErrorKind::InvalidCast
        );
        assert_eq!(
            Error::NonCopyableObject { type_name: "T" }.kind(),
            ErrorKind::NonCopyableObject
        );
        assert_eq!(
            Error::CustomAllocatorFailure.kind(),
            ErrorKind::CustomAllocatorFailure
        );
    }

    #[test]
    fn test_error_display() {
        let error = Error::IncompatibleType {
            target: TypeIdentity::of::<u8>(),
            source: TypeIdentity::of::<u16>(),
        };
        assert_eq!(
            error.to_string(),
            "cannot assign a function of type `u16` to a function of type `u8`"
        );

        let error = Error::InvalidCast {
            expected: TypeIdentity::of::<u8>(),
            actual: TypeIdentity::UNTYPED,
        };
        assert_eq!(
            error.to_string(),
            "cannot cast a function of type `<untyped>` to `u8`"
        );
    }

    #[test]
    #[cfg(not(all(feature = "abort-on-error", feature = "std")))]
    #[should_panic(expected = "called a function with nothing bound to it")]
    fn test_fatal_panics() {
        fatal(Error::InvalidFunction);
    }
}
