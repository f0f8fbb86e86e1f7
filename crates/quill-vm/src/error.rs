//! Error taxonomy for the call/pcall boundary (component J, spec §7).
//!
//! `quill-core::CoreError` covers failures below the call boundary (bad
//! table key, type error on a raw operation); this module adds the
//! control-flow-shaped kinds a running VM can produce: syntax errors from
//! `load`, the error-in-error-handler case, and the coroutine status codes
//! that travel through the same channel as errors so `resume` has one
//! place to look.

use quill_core::{CoreError, Value};
use thiserror::Error;

/// Status codes a protected call or a coroutine resume can report (spec
/// §4.10, §3.6). `Yield` is not an error — it shares this enum because
/// `resume`'s caller needs to distinguish it from `Ok`/`ErrRun` with one
/// match, exactly as the source's status byte does.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VmStatus {
    Ok,
    Yield,
    ErrRun,
    ErrSyntax,
    ErrMem,
    ErrErr,
}

impl From<quill_core::thread::ThreadStatus> for VmStatus {
    fn from(s: quill_core::thread::ThreadStatus) -> Self {
        use quill_core::thread::ThreadStatus as T;
        match s {
            T::Ok => VmStatus::Ok,
            T::Yield => VmStatus::Yield,
            T::ErrRun => VmStatus::ErrRun,
            T::ErrSyntax => VmStatus::ErrSyntax,
            T::ErrMem => VmStatus::ErrMem,
            T::ErrErr => VmStatus::ErrErr,
        }
    }
}

#[derive(Debug, Error, Clone)]
pub enum VmError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The error object raised by `error(v)` or an uncaught runtime fault.
    /// Not every error value is a string (spec §4.10: "any value").
    #[error("runtime error")]
    Raised(Value),

    #[error("{0}")]
    Syntax(String),

    /// The error handler installed for a protected call itself raised.
    /// Recursion past this point falls back to a preallocated value
    /// rather than unwinding further (spec §4.10).
    #[error("error in error handling")]
    ErrorInHandler(Value),

    #[error("stack overflow")]
    StackOverflow,

    #[error("too many nested C calls")]
    TooManyCCalls,

    #[error("attempt to yield across a non-yieldable boundary")]
    NonYieldableYield,

    #[error("attempt to yield from inside a metamethod")]
    YieldFromMetamethod,

    #[error("attempt to yield from a finalizer")]
    YieldFromFinalizer,

    #[error("cannot resume non-suspended coroutine")]
    CoroutineNotSuspended,

    #[error("cannot resume dead coroutine")]
    CoroutineDead,
}

impl VmError {
    /// Reduce to the coarse status code `pcall`/`resume` surfaces (spec
    /// §4.10's taxonomy).
    pub fn status(&self) -> VmStatus {
        match self {
            VmError::Core(CoreError::OutOfMemory) => VmStatus::ErrMem,
            VmError::ErrorInHandler(_) => VmStatus::ErrErr,
            VmError::Syntax(_) => VmStatus::ErrSyntax,
            _ => VmStatus::ErrRun,
        }
    }

    /// The value that should land on the stack for `pcall`'s second
    /// return (spec §4.10 step 4: "place the error object on the stack").
    pub fn into_value(self, heap: &mut quill_core::GlobalState) -> Value {
        match self {
            VmError::Raised(v) | VmError::ErrorInHandler(v) => v,
            VmError::Core(CoreError::OutOfMemory) => heap.heap.out_of_memory_error(),
            other => heap.heap.new_string(other.to_string().as_bytes()).map(Value::Object).unwrap_or(Value::NIL),
        }
    }
}

pub type VmResult<T> = Result<T, VmError>;
