//! Internal utility types.

/// Marker type used when type-erasing stored objects and trampolines.
///
/// This zero-sized type serves as a placeholder in generic type parameters
/// when the actual concrete type has been erased. For example,
/// `NonNull<Erased>` points at an object whose concrete type is only known to
/// the vtable stored next to it.
///
/// Using a distinct marker type (rather than `()`) makes the intent clearer
/// in type signatures and error messages.
pub(crate) struct Erased;

/// Produces a value of a zero-sized type out of thin air.
///
/// Function items and captureless closures are zero-sized, so a trampoline can
/// re-materialize them from their type alone instead of reading them from a
/// stored object.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `F` is zero-sized.
/// 2. A value of type `F` has been observed, i.e. the type is inhabited.
#[inline]
pub(crate) unsafe fn conjure_zst<F: Copy>() -> F {
    debug_assert_eq!(core::mem::size_of::<F>(), 0);

    // SAFETY:
    // 1. A dangling pointer is well-aligned and valid for zero-sized reads.
    // 2. The value is inhabited and `F: Copy` allows duplicating it.
    unsafe { core::ptr::NonNull::<F>::dangling().read() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seven() -> i32 {
        7
    }

    fn make<F: Copy>(_: F) -> F {
        assert_eq!(core::mem::size_of::<F>(), 0);
        // SAFETY:
        // 1. Checked above.
        // 2. A value of `F` was just passed to this function.
        unsafe { conjure_zst::<F>() }
    }

    #[test]
    fn test_conjure_function_item() {
        let f = make(seven);
        assert_eq!(f(), 7);
    }

    #[test]
    fn test_conjure_captureless_closure() {
        let f = make(|x: i32| x * 3);
        assert_eq!(f(5), 15);
    }
}
