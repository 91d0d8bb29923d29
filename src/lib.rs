#![cfg_attr(not(doc), no_std)]
#![deny(
    missing_docs,
    clippy::alloc_instead_of_core,
    clippy::std_instead_of_alloc,
    clippy::std_instead_of_core,
    clippy::missing_safety_doc,
    clippy::undocumented_unsafe_blocks,
    clippy::multiple_unsafe_ops_per_block,
    clippy::as_ptr_cast_mut,
    clippy::ptr_as_ptr,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]
// Extra checks on nightly
#![cfg_attr(nightly_extra_checks, feature(rustdoc_missing_doc_code_examples))]
#![cfg_attr(nightly_extra_checks, forbid(rustdoc::missing_doc_code_examples))]
// Make docs.rs generate better docs
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Fixed-size, copyable, type-erased callables.
//!
//! ## Overview
//!
//! This crate stores "anything callable with a given signature" in a small
//! value of fixed size: a function item, a closure, or a method bound to an
//! object. The stored value can be copied, moved and dropped like any other
//! value even though the type of the callable inside has been forgotten, and
//! it can be cast back to its signature at runtime. Casting to the wrong
//! signature fails predictably instead of calling through a mismatched
//! function pointer.
//!
//! There are no trait objects involved. Each kind of callable gets a
//! monomorphized *trampoline* with a uniform shape, and each signature gets a
//! [`TypeIdentity`] used to check casts.
//!
//! ## Quick Example
//!
//! ```
//! use erased_fn::{ErasedFunction, Function};
//!
//! fn sum(a: i32, b: i32) -> i32 {
//!     a + b
//! }
//!
//! let erased: ErasedFunction = Function::<fn(i32, i32) -> i32>::from_fn(sum).into();
//!
//! let typed = erased.cast::<Function<fn(i32, i32) -> i32>>().unwrap();
//! assert_eq!(typed.call((3, 4)), 7);
//!
//! assert!(erased.cast::<Function<fn(i32) -> i32>>().is_err());
//! ```
//!
//! ## Core Concepts
//!
//! A callable is made of three things:
//!
//! - An **object**: the data the call operates on, if any. It can be absent
//!   (function items), borrowed (a method bound to an object owned
//!   elsewhere), owned exclusively (a closure, copied along with the
//!   callable) or shared (a method bound to an object behind an [`Rc`] or
//!   [`Arc`]).
//! - A **trampoline**: a function with the uniform shape
//!   `unsafe fn(*const (), Args) -> Output` that knows how to turn the
//!   object pointer back into the concrete callable.
//! - An **identity**: the [`TypeIdentity`] of the typed wrapper the callable
//!   was created as, checked whenever the callable is cast or assigned.
//!
//! The typed wrappers are:
//!
//! - [`Function<S>`] for free calling conventions like `fn(i32, i32) -> i32`.
//! - [`MemberFunction<M>`] for methods not bound to any object, like
//!   `fn(&Counter, u32) -> u32`. The object is supplied at every call.
//!
//! Both convert to [`ErasedFunction`] and share its layout, so casting back
//! with [`ErasedFunction::cast`] is a pointer reinterpretation guarded by a
//! comparison of identities.
//!
//! ## Errors
//!
//! Every failure is one of the [`Error`] variants. By default fallible
//! operations return them, and operations that cannot, such as
//! [`Function::call`] or [`Clone::clone`], panic with the error's message.
//!
//! With the `abort-on-error` feature, every failure terminates the process
//! instead. Errors are logged through [`tracing`] before they are reported.
//!
//! ## Custom Allocation
//!
//! Owned objects live on the heap. A program can route these allocations
//! through its own allocator, see the [`allocator`] module.
//!
//! For implementation details, see the [`erased-fn-internals`] crate.
//!
//! [`erased-fn-internals`]: erased_fn_internals
//! [`Rc`]: alloc::rc::Rc
//! [`Arc`]: alloc::sync::Arc

extern crate alloc;

pub mod allocator;
pub mod cast;
mod erased;
mod error;
mod function;
mod member_function;
pub mod prelude;

pub use erased_fn_internals::{
    TypeIdentity,
    object::{Ownership, SharedPointer},
    signature::{self, Callable, Method, MethodSignature, SharedMethodSignature, Signature},
};

pub use self::{
    cast::FunctionView,
    erased::ErasedFunction,
    error::{Error, ErrorKind, Result},
    function::Function,
    member_function::MemberFunction,
};
