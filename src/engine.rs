//! Inference-engine boundary for the explanation pipeline
//!
//! The pipeline never looks inside a model; it consumes three operations
//! from a [`CamBackend`]: per-class scores, the activation at a named
//! capture point, and the gradient of one class score with respect to
//! that activation. The activation/gradient pair from a single call is
//! structurally bound together by [`ActivationGradient`] so tensors from
//! different invocations or layers can never be mixed.

use anyhow::Result;
use candle_core::Tensor;

use crate::error::ExplainError;
use crate::layer::{LayerId, LayerRegistry};

/// Unified backend trait for differentiable image classifiers.
///
/// Implementing this trait is the only requirement for plugging a new
/// model into the pipeline. `Send + Sync` is required because invocations
/// over one shared read-only model are independently parallelizable; the
/// trait takes `&self` everywhere and implementations must not mutate
/// weights.
pub trait CamBackend: Send + Sync {
    // --- Metadata ---
    fn class_count(&self) -> usize;
    fn input_size(&self) -> usize;
    fn layers(&self) -> &LayerRegistry;

    /// Human-readable class label, if the model ships one.
    fn class_label(&self, _index: usize) -> Option<&str> {
        None
    }

    // --- Boundary operations ---

    /// Forward pass producing one probability per class.
    fn scores(&self, input: &Tensor) -> Result<Vec<f32>>;

    /// Activation at a capture point, shape `(C, H, W)`.
    fn activation(&self, input: &Tensor, layer: LayerId) -> Result<Tensor>;

    /// Activation at a capture point together with the gradient of the
    /// selected class logit with respect to it. Both tensors have shape
    /// `(C, H, W)` and come from the same forward pass.
    fn gradient(
        &self,
        input: &Tensor,
        class_index: usize,
        layer: LayerId,
    ) -> Result<ActivationGradient>;
}

/// An activation tensor paired with the gradient differentiated against
/// it. Construction validates shape equality, so a pair that exists is a
/// pair that matches.
#[derive(Debug)]
pub struct ActivationGradient {
    activation: Tensor,
    gradient: Tensor,
}

impl ActivationGradient {
    /// Pair an activation with its gradient, rejecting mismatched shapes.
    /// A mismatch means the backend broke its contract and the invocation
    /// cannot proceed.
    pub fn new(activation: Tensor, gradient: Tensor) -> Result<Self> {
        if activation.dims() != gradient.dims() {
            return Err(ExplainError::ShapeMismatch {
                activation: activation.dims().to_vec(),
                gradient: gradient.dims().to_vec(),
            }
            .into());
        }
        Ok(Self {
            activation,
            gradient,
        })
    }

    pub fn activation(&self) -> &Tensor {
        &self.activation
    }

    pub fn gradient(&self) -> &Tensor {
        &self.gradient
    }

    /// Spatial extent `(h, w)` shared by both tensors.
    pub fn spatial_dims(&self) -> Result<(usize, usize)> {
        let (_c, h, w) = self.activation.dims3()?;
        Ok((h, w))
    }
}
