//! Shared error taxonomy for the typed-index arena and friends.
//!
//! Engine-specific error kinds (GC failures, VM runtime errors, syntax
//! errors) live in their own crates; this module only covers failures that
//! can occur inside the generic utilities this crate provides.

use thiserror::Error;

/// An out-of-range access into an [`IndexVec`](crate::index_vec::IndexVec).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("index out of bounds: index {index}, length {length}")]
pub struct IndexError {
    pub index: usize,
    pub length: usize,
}

/// Umbrella error for the handful of fallible operations this crate
/// exposes directly (most of `quill-util` is infallible by construction).
#[derive(Debug, Error)]
pub enum UtilError {
    #[error(transparent)]
    Index(#[from] IndexError),
}
