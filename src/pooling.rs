//! Channel importance pooling
//!
//! Reduces a gradient tensor to one scalar weight per channel by global
//! average pooling over the two spatial axes. Channels are never mixed:
//! `weight[c]` is the unweighted arithmetic mean of `gradient[c, :, :]`.

use anyhow::Result;
use candle_core::{Tensor, D};

use crate::error::ExplainError;

/// Pool a `(C, H, W)` gradient tensor into `(C,)` channel weights.
///
/// Fails with `DegenerateInput` when the spatial extent is zero — a
/// feature map with no pixels has no mean.
pub fn channel_weights(gradient: &Tensor) -> Result<Tensor> {
    let (_c, h, w) = gradient.dims3()?;
    if h == 0 || w == 0 {
        return Err(ExplainError::degenerate(format!(
            "gradient tensor has zero spatial extent ({h}x{w})"
        )));
    }
    // (C, H, W) -> (C, H*W) -> (C,)
    Ok(gradient.flatten_from(1)?.mean(D::Minus1)?)
}
