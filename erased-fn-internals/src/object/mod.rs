//! Module containing the storage for the object a callable operates on

mod raw;
mod shared;
mod vtable;

pub use self::{raw::RawObject, shared::SharedPointer, vtable::Ownership};
