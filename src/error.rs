//! Typed failure categories for the explanation pipeline
//!
//! The crate propagates errors through `anyhow`, but every failure the
//! pipeline itself produces carries an [`ExplainError`] so callers can
//! recover the category with `err.downcast_ref::<ExplainError>()`.
//!
//! A heatmap with no positive evidence is NOT an error: the pipeline
//! completes and reports it via [`crate::heatmap::Heatmap::is_degenerate`].

use thiserror::Error;

/// Failure categories the pipeline can produce.
#[derive(Debug, Error)]
pub enum ExplainError {
    /// Caller-correctable: out-of-range class override, blend opacity
    /// outside [0,1], unknown layer name, non-positive target resolution.
    /// Never retried automatically.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A feature map with zero spatial extent (H=0 or W=0). Fatal for the
    /// invocation, not retried.
    #[error("degenerate input: {0}")]
    DegenerateInput(String),

    /// Activation and gradient tensors from the same backend call disagree
    /// on shape. This is a collaborator contract breach, not recoverable
    /// within the pipeline.
    #[error("shape mismatch: activation {activation:?} vs gradient {gradient:?}")]
    ShapeMismatch {
        activation: Vec<usize>,
        gradient: Vec<usize>,
    },
}

impl ExplainError {
    /// Shorthand for an `InvalidArgument` wrapped in `anyhow::Error`.
    pub fn invalid(msg: impl Into<String>) -> anyhow::Error {
        ExplainError::InvalidArgument(msg.into()).into()
    }

    /// Shorthand for a `DegenerateInput` wrapped in `anyhow::Error`.
    pub fn degenerate(msg: impl Into<String>) -> anyhow::Error {
        ExplainError::DegenerateInput(msg.into()).into()
    }
}
