use thiserror::Error;

/// Failures the collector itself can raise. Most GC work is infallible
/// (marking/sweeping bookkeeping never fails); the one real failure mode
/// is the allocator facade running out of memory, which the VM surfaces
/// as a runtime error (spec §7) rather than a crash.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GcError {
    #[error("out of memory")]
    OutOfMemory,

    #[error("out of memory during emergency collection")]
    EmergencyFailed,

    #[error("finalizer for object raised during collection: {0}")]
    FinalizerError(String),
}
