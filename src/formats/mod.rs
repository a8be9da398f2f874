//! Format-specific converter implementations
//!
//! Each format module provides a
//! [`BookConverter`](crate::document::BookConverter) and the parsed book
//! type it produces. Only the registry in [`crate::document`] refers to
//! them by name.

pub mod fb2;
