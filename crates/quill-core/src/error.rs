//! Error taxonomy for the object model (spec §7's `Runtime` and `Memory`
//! kinds as they surface below the VM's call/pcall boundary).
//!
//! `quill-vm` adds the control-flow-shaped kinds (`ErrSyntax`, yield) on
//! top of this; `quill-embed` is the only crate in the workspace allowed
//! to widen these into `anyhow::Result` for host-facing convenience calls.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("attempt to {op} a {ty} value")]
    TypeError { op: &'static str, ty: &'static str },

    #[error("table index is nil")]
    NilKey,

    #[error("table index is NaN")]
    NanKey,

    #[error("stack overflow")]
    StackOverflow,

    #[error("not enough memory")]
    OutOfMemory,

    #[error("number has no integer representation")]
    NoIntegerRepresentation,

    #[error("bad argument #{index} ({message})")]
    BadArgument { index: usize, message: String },
}

pub type CoreResult<T> = Result<T, CoreError>;

/// The single preallocated out-of-memory error value, per spec §4.1's
/// "Failure mode" note: this string must exist before the string table
/// can fail, so `GlobalState::new` interns it before anything else.
pub const OUT_OF_MEMORY_MESSAGE: &str = "not enough memory";
