use thiserror::Error;

/// Errors surfaced by CSF construction and the kernels.
///
/// Kernels validate every precondition before mutating caller-owned outputs,
/// so an `Err` return means inputs are untouched.
#[derive(Debug, Error)]
pub enum SpTensorError {
    /// Out-of-range coordinate, malformed permutation, mismatched mode rank
    /// vector, non-positive regularization, or a shape/layout mismatch.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Scratch or CSF allocation exceeded the configured memory limit, or the
    /// worker pool could not be constructed.
    #[error("allocation failure: {0}")]
    AllocationFailure(String),

    /// The requested operation is not implemented for this configuration.
    #[error("unsupported: {0}")]
    Unsupported(String),
}

pub type Result<V> = std::result::Result<V, SpTensorError>;
