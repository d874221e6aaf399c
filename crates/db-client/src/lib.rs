//! HTTP client for the building database API.
//!
//! Implements the change feed and the single-record write endpoints the
//! sync services consume through `sheetsync_core::sync` traits.

mod client;
mod error;
mod types;

pub use client::*;
pub use error::*;
pub use types::*;
