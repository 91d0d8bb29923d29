//! The process-wide allocator used for owned objects.
//!
//! Owned objects stored inside type-erased callables are allocated through
//! this module. By default allocations go to the global Rust allocator, but a
//! program may install its own [`ObjectAllocator`] exactly once, before the
//! first owned object is allocated.
//!
//! The choice is kept in a [`GlobalAllocatorSlot`], an [`AtomicPtr`] that
//! starts out null and is set at most once. It is set either by an
//! installation, to the leaked allocator, or by the first allocation, to a
//! marker locking in the global Rust allocator. A single compare-exchange
//! decides between the two, so memory allocated by one allocator is never
//! released by another.

use alloc::boxed::Box;
use core::{
    alloc::Layout,
    ptr::NonNull,
    sync::atomic::{AtomicPtr, Ordering},
};

use crate::error::Error;

/// A user-supplied allocator for the owned objects of type-erased callables.
///
/// # Example
///
/// ```
/// use core::{alloc::Layout, ptr::NonNull};
///
/// use erased_fn_internals::allocator::ObjectAllocator;
///
/// struct Refusing;
///
/// impl ObjectAllocator for Refusing {
///     fn allocate(&self, _layout: Layout) -> Option<NonNull<u8>> {
///         None
///     }
///
///     fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) -> bool {
///         false
///     }
/// }
/// ```
pub trait ObjectAllocator: Send + Sync + 'static {
    /// Allocates a block of memory fitting `layout`.
    ///
    /// The layout always has a non-zero size. Returns [`None`] on failure,
    /// which is reported as [`Error::CustomAllocatorFailure`].
    fn allocate(&self, layout: Layout) -> Option<NonNull<u8>>;

    /// Releases a block previously returned by [`allocate`] with the same
    /// `layout`.
    ///
    /// Returns `false` on failure, which is reported as
    /// [`Error::CustomAllocatorFailure`].
    ///
    /// [`allocate`]: ObjectAllocator::allocate
    fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) -> bool;
}

/// The heap block holding an installed allocator.
///
/// Needed because [`AtomicPtr`] only stores thin pointers.
struct InstalledAllocator {
    /// The installed allocator.
    allocator: Box<dyn ObjectAllocator>,
}

/// Its address marks a slot locked to the global Rust allocator. Being a
/// static, it never coincides with a heap block.
static GLOBAL_ONLY: u8 = 0;

/// Returns the marker of a slot locked to the global Rust allocator.
fn global_only() -> *mut InstalledAllocator {
    core::ptr::from_ref(&GLOBAL_ONLY)
        .cast_mut()
        .cast::<InstalledAllocator>()
}

/// The global slot for the installed allocator.
struct GlobalAllocatorSlot {
    /// # Safety
    ///
    /// 1. This pointer is either null, the [`global_only`] marker, or points
    ///    to a valid [`InstalledAllocator`] created using `Box::into_raw`.
    /// 2. Once non-null, the pointer is never changed again and the pointee
    ///    is never freed.
    /// 3. All writing to the `AtomicPtr` is done using release semantics.
    /// 4. All reading from the `AtomicPtr` is done using acquire semantics.
    ptr: AtomicPtr<InstalledAllocator>,
}

impl GlobalAllocatorSlot {
    /// Creates an empty slot.
    const fn new() -> Self {
        Self {
            ptr: AtomicPtr::new(core::ptr::null_mut()),
        }
    }

    /// Turns a non-null slot value into the allocator it names.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. `ptr` was read from `self.ptr`.
    unsafe fn resolve(ptr: *mut InstalledAllocator) -> Option<&'static dyn ObjectAllocator> {
        if ptr == global_only() {
            return None;
        }
        let ptr = NonNull::new(ptr)?;

        // SAFETY:
        // 1. The pointer is neither null nor the marker, so it came from
        //    `Box::into_raw` and is valid (invariant 1), guaranteed by the
        //    caller reading it from the slot.
        // 2. It is never freed nor replaced (invariant 2), so a `'static`
        //    borrow is valid.
        let installed: &'static InstalledAllocator = unsafe { ptr.as_ref() };
        Some(&*installed.allocator)
    }

    /// Fetches the installed allocator, if any.
    fn fetch(&self) -> Option<&'static dyn ObjectAllocator> {
        let ptr = self.ptr.load(Ordering::Acquire);

        // SAFETY:
        // 1. The pointer was just read from the slot.
        unsafe { Self::resolve(ptr) }
    }

    /// Fetches the allocator for a new allocation.
    ///
    /// If nothing is installed yet, the slot is locked to the global Rust
    /// allocator first, so no installation can follow.
    fn lock_for_allocation(&self) -> Option<&'static dyn ObjectAllocator> {
        let mut ptr = self.ptr.load(Ordering::Acquire);
        if ptr.is_null() {
            ptr = match self.ptr.compare_exchange(
                core::ptr::null_mut(),
                global_only(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => global_only(),
                Err(current) => current,
            };
        }

        // SAFETY:
        // 1. The pointer was read from the slot, or is the value just stored
        //    into it.
        unsafe { Self::resolve(ptr) }
    }

    /// Installs an allocator, returning the pointer back on failure.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    ///
    /// 1. The `new` pointer is valid and was created using `Box::into_raw`.
    /// 2. On success the slot claims ownership of the `new` pointer, and it
    ///    cannot be used by the caller anymore.
    /// 3. On failure, the `new` pointer remains owned by the caller.
    unsafe fn install(&self, new: *mut InstalledAllocator) -> Result<(), InstallRefusal> {
        match self.ptr.compare_exchange(
            core::ptr::null_mut(),
            new,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => Ok(()),
            Err(current) if current == global_only() => Err(InstallRefusal::AllocationsStarted),
            Err(_) => Err(InstallRefusal::AlreadyInstalled),
        }
    }
}

/// The reason an allocator installation was refused.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InstallRefusal {
    /// Another allocator is already installed.
    AlreadyInstalled,
    /// Owned objects have already been allocated.
    AllocationsStarted,
}

/// Error returned when an allocator could not be installed.
///
/// Contains the allocator that was attempted to be installed, allowing you to
/// recover it if needed.
pub struct AllocatorInstallError {
    /// Why the installation was refused.
    pub reason: InstallRefusal,
    /// The allocator that was not installed.
    pub allocator: Box<dyn ObjectAllocator>,
}

impl core::fmt::Debug for AllocatorInstallError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AllocatorInstallError")
            .field("reason", &self.reason)
            .finish_non_exhaustive()
    }
}

impl core::fmt::Display for AllocatorInstallError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.reason {
            InstallRefusal::AlreadyInstalled => {
                write!(f, "an object allocator is already installed")
            }
            InstallRefusal::AllocationsStarted => write!(
                f,
                "an object allocator must be installed before the first object is allocated"
            ),
        }
    }
}

impl core::error::Error for AllocatorInstallError {}

/// The process-wide allocator slot.
static ALLOCATOR: GlobalAllocatorSlot = GlobalAllocatorSlot::new();

/// Installs `allocator` for all future owned objects.
///
/// Fails if an allocator is already installed or if any owned object has
/// already been allocated. The installed allocator is leaked and remains for
/// the lifetime of the program.
pub fn install(allocator: Box<dyn ObjectAllocator>) -> Result<(), AllocatorInstallError> {
    let boxed = Box::into_raw(Box::new(InstalledAllocator { allocator }));

    // SAFETY:
    // 1. The pointer `boxed` is valid and was obtained from `Box::into_raw`.
    // 2. On success, the pointer is not used anymore.
    // 3. On failure, the pointer remains owned by us.
    let install_result = unsafe { ALLOCATOR.install(boxed) };

    install_result.map_err(|reason| {
        // SAFETY: The pointer came from `Box::into_raw` above and installation
        // failed, so we still own it.
        let installed = unsafe { Box::from_raw(boxed) };
        AllocatorInstallError {
            reason,
            allocator: installed.allocator,
        }
    })
}

/// Returns `true` if a custom allocator has been installed.
pub fn is_installed() -> bool {
    ALLOCATOR.fetch().is_some()
}

/// Allocates a block for `layout`.
///
/// `layout` must have a non-zero size. Failures of the global Rust allocator
/// are handled with [`alloc::alloc::handle_alloc_error`], like any other
/// collection in `alloc`.
fn allocate(layout: Layout) -> Result<NonNull<u8>, Error> {
    debug_assert!(layout.size() != 0);

    match ALLOCATOR.lock_for_allocation() {
        Some(allocator) => allocator
            .allocate(layout)
            .ok_or(Error::CustomAllocatorFailure),
        None => {
            // SAFETY: The layout has a non-zero size.
            let ptr = unsafe { alloc::alloc::alloc(layout) };
            match NonNull::new(ptr) {
                Some(ptr) => Ok(ptr),
                None => alloc::alloc::handle_alloc_error(layout),
            }
        }
    }
}

/// Releases a block previously returned by [`allocate`].
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `ptr` was returned by [`allocate`] with the same `layout`.
/// 2. The block is not used after this call.
unsafe fn deallocate(ptr: NonNull<u8>, layout: Layout) -> Result<(), Error> {
    match ALLOCATOR.fetch() {
        Some(allocator) => {
            if allocator.deallocate(ptr, layout) {
                Ok(())
            } else {
                Err(Error::CustomAllocatorFailure)
            }
        }
        None => {
            // SAFETY:
            // 1. The block was allocated, so the slot was locked to the
            //    global allocator by then and never changes afterwards. The
            //    block came from the global allocator with `layout`.
            // 2. Guaranteed by the caller.
            unsafe { alloc::alloc::dealloc(ptr.as_ptr(), layout) };
            Ok(())
        }
    }
}

/// Moves `value` into a freshly allocated block.
///
/// Zero-sized values never reach the allocator.
pub(crate) fn allocate_value<T>(value: T) -> Result<NonNull<T>, Error> {
    let layout = Layout::new::<T>();
    let ptr = if layout.size() == 0 {
        NonNull::<T>::dangling()
    } else {
        allocate(layout)?.cast::<T>()
    };

    // SAFETY: The pointer is valid for writes of `T`: it is either a fresh
    // block for `Layout::new::<T>()` or a well-aligned dangling pointer for a
    // zero-sized `T`.
    unsafe { ptr.write(value) };
    Ok(ptr)
}

/// Drops the value behind `ptr` and releases its block.
///
/// The value is always dropped; the returned error only reports a failure to
/// release the memory.
///
/// # Safety
///
/// The caller must ensure:
///
/// 1. `ptr` was returned by [`allocate_value`] for the same `T`.
/// 2. The value has not been dropped yet and is not used after this call.
pub(crate) unsafe fn deallocate_value<T>(ptr: NonNull<T>) -> Result<(), Error> {
    // SAFETY:
    // 1. The pointer holds a live `T`, guaranteed by the caller.
    // 2. The value is not used again, guaranteed by the caller.
    unsafe { ptr.drop_in_place() };

    let layout = Layout::new::<T>();
    if layout.size() == 0 {
        return Ok(());
    }

    // SAFETY:
    // 1. Non-zero-sized values come from `allocate` with `Layout::new::<T>()`.
    // 2. Guaranteed by the caller.
    unsafe { deallocate(ptr.cast::<u8>(), layout) }
}

#[cfg(test)]
mod tests {
    use alloc::string::{String, ToString};

    use super::*;

    #[test]
    fn test_allocate_value_roundtrip() {
        let ptr = allocate_value(String::from("payload")).unwrap();
        // SAFETY: The pointer was just created and holds a live `String`.
        assert_eq!(unsafe { ptr.as_ref() }, "payload");
        // SAFETY: The pointer came from `allocate_value::<String>` and is not
        // used again.
        unsafe { deallocate_value(ptr) }.unwrap();
    }

    #[test]
    fn test_zero_sized_values_are_not_allocated() {
        struct Unit;
        let ptr = allocate_value(Unit).unwrap();
        assert_eq!(ptr, NonNull::dangling());
        // SAFETY: The pointer came from `allocate_value::<Unit>` and is not
        // used again.
        unsafe { deallocate_value(ptr) }.unwrap();
    }

    struct Noop;

    impl ObjectAllocator for Noop {
        fn allocate(&self, _layout: Layout) -> Option<NonNull<u8>> {
            None
        }

        fn deallocate(&self, _ptr: NonNull<u8>, _layout: Layout) -> bool {
            false
        }
    }

    fn boxed_noop() -> *mut InstalledAllocator {
        Box::into_raw(Box::new(InstalledAllocator {
            allocator: Box::new(Noop),
        }))
    }

    #[test]
    fn test_slot_locked_by_allocation() {
        let slot = GlobalAllocatorSlot::new();
        assert!(slot.fetch().is_none());
        assert!(slot.lock_for_allocation().is_none());
        assert!(slot.fetch().is_none());

        let new = boxed_noop();
        // SAFETY: `new` came from `Box::into_raw` and is reclaimed on failure.
        let result = unsafe { slot.install(new) };
        assert_eq!(result, Err(InstallRefusal::AllocationsStarted));
        // SAFETY: The installation failed, so we still own the pointer.
        drop(unsafe { Box::from_raw(new) });
    }

    #[test]
    fn test_slot_installed_before_allocation() {
        let slot = GlobalAllocatorSlot::new();
        let new = boxed_noop();
        // SAFETY: `new` came from `Box::into_raw`; the slot leaks it.
        assert_eq!(unsafe { slot.install(new) }, Ok(()));
        assert!(slot.lock_for_allocation().is_some());
        assert!(slot.fetch().is_some());

        let second = boxed_noop();
        // SAFETY: `second` came from `Box::into_raw` and is reclaimed on
        // failure.
        let result = unsafe { slot.install(second) };
        assert_eq!(result, Err(InstallRefusal::AlreadyInstalled));
        // SAFETY: The installation failed, so we still own the pointer.
        drop(unsafe { Box::from_raw(second) });
    }

    #[test]
    fn test_install_after_allocation_is_refused() {
        let ptr = allocate_value(7_u64).unwrap();
        // SAFETY: The pointer came from `allocate_value::<u64>` and is not
        // used again.
        unsafe { deallocate_value(ptr) }.unwrap();

        let error = install(Box::new(Noop)).unwrap_err();
        assert_eq!(error.reason, InstallRefusal::AllocationsStarted);
        assert_eq!(
            error.to_string(),
            "an object allocator must be installed before the first object is allocated"
        );
        assert!(!is_installed());
    }
}
