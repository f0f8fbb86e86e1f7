//! quill-util — shared foundation types for the Quill runtime workspace.
//!
//! This crate carries nothing specific to values, tables, or bytecode; it
//! is the bottom of the dependency graph so every other `quill-*` crate can
//! share the same typed-index arena, error taxonomy, and hashing helpers
//! instead of reinventing them per crate.

pub mod error;
pub mod hash;
pub mod index_vec;

pub use error::{IndexError, UtilError};
pub use hash::seeded_hash_bytes;
pub use index_vec::{Idx, IndexVec};
