//! Commonly used items for convenient importing.
//!
//! ```rust
//! use erased_fn::prelude::*;
//!
//! fn double(value: u64) -> u64 {
//!     value * 2
//! }
//!
//! let erased: ErasedFunction = Function::<fn(u64) -> u64>::from_fn(double).into();
//! let double = function_cast::<fn(u64) -> u64>(&erased).unwrap();
//! assert_eq!(double.call((21,)), 42);
//! ```

pub use crate::{
    ErasedFunction, Function, MemberFunction, TypeIdentity,
    cast::{function_cast, function_cast_mut, member_function_cast},
};
