//! Core domain of the sheet sync service.
//!
//! Storage and transport live in sibling crates; everything here talks to them
//! through the traits in [`sync`].

pub mod errors;
pub mod sync;

pub use errors::{DatabaseError, Error, Result};
