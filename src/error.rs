//! Error reporting for type-erased callables.
//!
//! Every failure of this crate goes through [`signal`]. In the default mode
//! the error is handed back to the caller as the `Err` variant of a
//! [`Result`]. With the `abort-on-error` feature the error instead ends the
//! process, so callers never observe it.
//!
//! Operations that cannot return an error, such as [`Function::call`] or
//! [`Clone::clone`], go through [`fatal`] and panic with the error's message
//! (or abort, with `abort-on-error`).
//!
//! [`Function::call`]: crate::Function::call

pub use erased_fn_internals::error::{Error, ErrorKind};

/// A [`Result`](core::result::Result) type alias where the error is
/// [`Error`].
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Reports an error through the configured error mode.
///
/// Returns `Err(error)` by default. With the `abort-on-error` feature this
/// never returns.
#[cold]
#[track_caller]
pub(crate) fn signal<T>(error: Error) -> Result<T> {
    if cfg!(feature = "abort-on-error") {
        fatal(error);
    }

    // A failed cast is a normal answer to "is this callable of that type".
    match error.kind() {
        ErrorKind::InvalidCast => tracing::debug!(kind = ?error.kind(), "{error}"),
        _ => tracing::warn!(kind = ?error.kind(), "{error}"),
    }

    Err(error)
}

/// Reports an error that cannot be returned to the caller.
///
/// The error is logged at `error` level before the process panics (or
/// aborts, with `abort-on-error`).
#[cold]
#[track_caller]
pub(crate) fn fatal(error: Error) -> ! {
    if cfg!(feature = "abort-on-error") {
        tracing::error!(kind = ?error.kind(), "{error}, terminating");
    } else {
        tracing::error!(kind = ?error.kind(), "{error}");
    }

    erased_fn_internals::error::fatal(error)
}

/// Unwraps a result, reporting errors through [`fatal`].
#[inline]
#[track_caller]
pub(crate) fn unwrap_or_fatal<T>(result: Result<T>) -> T {
    match result {
        Ok(value) => value,
        Err(error) => fatal(error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(feature = "abort-on-error"))]
    fn test_signal_returns_error() {
        let result: Result<u8> = signal(Error::InvalidObject);
        assert_eq!(result, Err(Error::InvalidObject));
    }

    #[test]
    #[cfg(not(feature = "abort-on-error"))]
    #[should_panic(expected = "the object required by this call is missing")]
    fn test_unwrap_or_fatal_panics() {
        unwrap_or_fatal::<u8>(Err(Error::InvalidObject));
    }

    #[test]
    fn test_unwrap_or_fatal_passes_values() {
        assert_eq!(unwrap_or_fatal(Ok(3_u8)), 3);
    }
}
