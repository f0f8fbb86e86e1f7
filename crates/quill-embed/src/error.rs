//! Error types for the embedding facade (spec §7).
//!
//! Mirrors `faxt/src/error.rs`'s shape (one `thiserror` enum, a `Result`
//! alias) but splits in two: [`LoadError`] for the `load` boundary (spec
//! §6.1/§6.2, malformed bytecode never reaches [`EmbedError`]'s runtime
//! variants), and [`EmbedError`] for everything past it. `quill-vm`'s
//! `VmError` is reused rather than re-wrapped field-by-field, since an
//! embedder matching on error kind wants the same taxonomy the VM itself
//! uses (spec §7's four kinds plus yield).

use thiserror::Error;

pub use quill_vm::{VmError, VmStatus};

/// Failures from deserializing a bytecode chunk (spec §6.2's header
/// fields) before any code has run.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("truncated bytecode: expected {expected} more byte(s)")]
    Truncated { expected: usize },

    #[error("bad bytecode signature")]
    BadSignature,

    #[error("version mismatch: chunk is version {chunk}, runtime is {runtime}")]
    VersionMismatch { chunk: u8, runtime: u8 },

    #[error("bytecode format {0} not recognized (bit-exact foreign formats are not supported)")]
    UnknownFormat(u8),

    #[error("data layout check failed (integer/float size or endianness mismatch)")]
    DataCheckFailed,

    #[error("malformed constant tag {0}")]
    BadConstantTag(u8),

    #[error("malformed instruction opcode {0}")]
    BadOpcode(u8),

    #[error(transparent)]
    Core(#[from] quill_core::CoreError),
}

pub type LoadResult<T> = Result<T, LoadError>;

/// Everything past a successful `load`: call, pcall, table access,
/// registry, GC control (spec §6.1).
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error(transparent)]
    Vm(#[from] VmError),

    #[error(transparent)]
    Core(#[from] quill_core::CoreError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("value is not callable")]
    NotCallable,

    #[error("value is not a coroutine")]
    NotAThread,
}

pub type EmbedResult<T> = Result<T, EmbedError>;
