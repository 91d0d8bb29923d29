//! Module containing the type-erased callable and its call adapters

mod raw;
pub mod trampoline;

pub use self::raw::RawFunction;
