//! Plain records shared by the discovery and delivery stages.
//!
//! Nothing in here does I/O. Every type is either an immutable value or a
//! row the cache writes once.

pub mod defs;

pub use defs::*;
