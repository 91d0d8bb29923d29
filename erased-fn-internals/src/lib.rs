#![no_std]
#![forbid(
    missing_docs,
    clippy::alloc_instead_of_core,
    clippy::std_instead_of_alloc,
    clippy::std_instead_of_core,
    clippy::missing_safety_doc,
    clippy::missing_docs_in_private_items,
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]
#![allow(rustdoc::private_intra_doc_links)]
//! Internal implementation crate for [`erased-fn`].
//!
//! # Overview
//!
//! This crate contains the low-level, type-erased data structures and unsafe
//! operations that power the [`erased-fn`] library. It provides fixed-size
//! storage for any callable together with a runtime identity of its calling
//! convention, so callables of different signatures can share one type and be
//! recovered later with a checked cast.
//!
//! **This crate is an implementation detail.** No semantic versioning
//! guarantees are provided. Users should depend on the [`erased-fn`] crate,
//! not this one.
//!
//! # Architecture
//!
//! - **[`identity`](TypeIdentity)**: [`TypeIdentity`], a pointer-sized token
//!   naming a type, used to tag callables with their calling convention.
//! - **[`object`]**: [`RawObject`], storage for the object a callable operates
//!   on. Objects are borrowed, exclusively owned or held through a
//!   [`SharedPointer`]. Owned objects carry a vtable for dropping and copying.
//! - **[`function`](RawFunction)**: [`RawFunction`], the triple of object
//!   storage, erased [`Trampoline`] and identity, with identity-checked
//!   assignment.
//! - **[`trampoline`]**: monomorphized call adapters with one uniform shape.
//! - **[`signature`]**: the traits naming calling conventions by function
//!   pointer types.
//! - **[`allocator`]**: the process-wide allocator for owned objects.
//! - **[`error`]**: the error conditions and the fatal path for errors that
//!   cannot be returned.
//!
//! # Safety Strategy
//!
//! Type erasure requires careful handling to maintain Rust's type safety
//! guarantees. When a callable of type `F` is stored as a `NonNull<Erased>`,
//! the trampoline that reads it back must have been instantiated for `F`, and
//! the arguments passed to the trampoline must be the ones it was created
//! for.
//!
//! This crate maintains safety through:
//!
//! - **Module-based encapsulation**: Safety-critical types keep fields
//!   module-private, making invariants locally verifiable within a single file
//! - **Vtables and trampolines as `'static` records**: created together with
//!   the types they are instantiated for, so they cannot be paired with the
//!   wrong object by accident
//! - **Identities checked before erasure is undone**: a trampoline is only
//!   restored to concrete argument types by callers that have compared the
//!   callable's [`TypeIdentity`]
//!
//! [`erased-fn`]: https://docs.rs/erased-fn/latest/erased_fn/
//! [`Trampoline`]: trampoline::Trampoline
//! [`SharedPointer`]: object::SharedPointer

extern crate alloc;
#[cfg(feature = "std")]
extern crate std;

pub mod allocator;
pub mod error;
mod function;
mod identity;
pub mod object;
pub mod signature;
mod util;

pub use self::{
    function::{RawFunction, trampoline},
    identity::TypeIdentity,
    object::RawObject,
};
