//! seqctx error types

use numr::dtype::DType;

/// seqctx result type
pub type Result<T> = std::result::Result<T, Error>;

/// seqctx errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Error from numr operations
    #[error("numr error: {0}")]
    Numr(#[from] numr::error::Error),

    /// DType mismatch (only single precision is supported)
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch {
        /// Expected dtype
        expected: DType,
        /// Actual dtype
        got: DType,
    },

    /// Invalid argument to an operation
    #[error("invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// Argument name
        arg: &'static str,
        /// Why it's invalid
        reason: String,
    },

    /// Buffer or tensor shape does not match what the window requires
    #[error("shape mismatch for '{arg}': expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Argument name
        arg: &'static str,
        /// Expected shape (or element count, as a single-element shape)
        expected: Vec<usize>,
        /// Actual shape
        got: Vec<usize>,
    },

    /// The metadata block could not be allocated
    #[error("allocation of {bytes} bytes failed: {reason}")]
    AllocationFailed {
        /// Requested size in bytes
        bytes: usize,
        /// Allocator diagnostic
        reason: String,
    },

    /// Worker pool could not be built or a worker failed
    #[error("scheduler error: {reason}")]
    SchedulerError {
        /// Description of what went wrong
        reason: String,
    },

    /// Device kernel load, launch or synchronization failure
    #[error("kernel error: {reason}")]
    KernelError {
        /// Description of what went wrong
        reason: String,
    },
}

impl Error {
    pub(crate) fn invalid(arg: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            arg,
            reason: reason.into(),
        }
    }
}
