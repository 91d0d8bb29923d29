//! Installing a custom allocator for owned objects.
//!
//! Callables stored with [`Function::from_callable`] and the other owning
//! constructors keep their object on the heap. By default that memory comes
//! from the global Rust allocator. A program may route it through its own
//! [`ObjectAllocator`] instead, by calling [`install`] exactly once before the
//! first owned object is stored.
//!
//! Zero-sized objects, such as function items, never reach the allocator.
//!
//! ```
//! use core::{alloc::Layout, ptr::NonNull};
//!
//! use erased_fn::allocator::{self, ObjectAllocator};
//!
//! struct System;
//!
//! impl ObjectAllocator for System {
//!     fn allocate(&self, layout: Layout) -> Option<NonNull<u8>> {
//!         // SAFETY: Layouts passed to object allocators have a non-zero size.
//!         NonNull::new(unsafe { std::alloc::alloc(layout) })
//!     }
//!
//!     fn deallocate(&self, ptr: NonNull<u8>, layout: Layout) -> bool {
//!         // SAFETY: `ptr` was returned by `allocate` with the same layout.
//!         unsafe { std::alloc::dealloc(ptr.as_ptr(), layout) };
//!         true
//!     }
//! }
//!
//! if allocator::install(Box::new(System)).is_ok() {
//!     assert!(allocator::is_installed());
//! }
//! ```
//!
//! [`Function::from_callable`]: crate::Function::from_callable

use alloc::boxed::Box;

pub use erased_fn_internals::allocator::{
    AllocatorInstallError, InstallRefusal, ObjectAllocator, is_installed,
};

/// Installs `allocator` as the allocator for all owned objects.
///
/// The installation is permanent. It is refused, handing the allocator back
/// inside the error, if an allocator is already installed or if an owned
/// object has already been allocated.
pub fn install(allocator: Box<dyn ObjectAllocator>) -> Result<(), AllocatorInstallError> {
    match erased_fn_internals::allocator::install(allocator) {
        Ok(()) => {
            tracing::debug!("installed a custom object allocator");
            Ok(())
        }
        Err(error) => {
            tracing::debug!(reason = ?error.reason, "refused to install a custom object allocator");
            Err(error)
        }
    }
}
