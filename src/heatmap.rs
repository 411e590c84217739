//! Heatmap synthesis and normalization
//!
//! Combines feature-map channels with gradient-derived channel weights
//! into a single spatial map: `raw[h,w] = Σ_c weight[c] · feature[c,h,w]`.
//! Negative contributions are clamped away (they mark channels that would
//! *decrease* the target score), then the map is divided by its global
//! maximum. A map with no positive evidence normalizes to all zeros and is
//! flagged degenerate rather than treated as an error.

use anyhow::Result;
use candle_core::Tensor;

use crate::error::ExplainError;

/// Coordinate adjustment applied to the normalized heatmap before
/// rasterization. Which one is needed depends on the rendering backend's
/// row/column convention, not on the algorithm; `Identity` is correct for
/// the `image` crate's `(y, x)` addressing over candle's row-major
/// `(C, H, W)` layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Identity,
    Transpose,
    FlipVertical,
    FlipHorizontal,
}

/// A normalized heatmap: row-major `(height, width)` values in [0, 1].
#[derive(Debug, Clone)]
pub struct Heatmap {
    values: Vec<f32>,
    height: usize,
    width: usize,
    degenerate: bool,
}

impl Heatmap {
    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Value at row `y`, column `x`.
    ///
    /// Panics when `y >= height` or `x >= width`. Without the explicit
    /// check an out-of-range `x` could alias into the next row instead of
    /// failing.
    pub fn get(&self, y: usize, x: usize) -> f32 {
        debug_assert!(
            y < self.height && x < self.width,
            "heatmap index ({y}, {x}) out of range ({}x{})",
            self.height,
            self.width
        );
        self.values[y * self.width + x]
    }

    /// Row-major values.
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// True when the raw map had no positive evidence anywhere. The
    /// composite produced from a degenerate heatmap is pixel-identical to
    /// the source image, so callers should surface this to users.
    pub fn is_degenerate(&self) -> bool {
        self.degenerate
    }

    /// Apply a coordinate adjustment, returning the reoriented map.
    pub fn oriented(&self, orientation: Orientation) -> Heatmap {
        if orientation == Orientation::Identity {
            return self.clone();
        }
        let (h, w) = (self.height, self.width);
        let mut values = Vec::with_capacity(self.values.len());
        let (height, width) = match orientation {
            Orientation::Identity => unreachable!(),
            Orientation::Transpose => {
                for x in 0..w {
                    for y in 0..h {
                        values.push(self.get(y, x));
                    }
                }
                (w, h)
            }
            Orientation::FlipVertical => {
                for y in (0..h).rev() {
                    for x in 0..w {
                        values.push(self.get(y, x));
                    }
                }
                (h, w)
            }
            Orientation::FlipHorizontal => {
                for y in 0..h {
                    for x in (0..w).rev() {
                        values.push(self.get(y, x));
                    }
                }
                (h, w)
            }
        };
        Heatmap {
            values,
            height,
            width,
            degenerate: self.degenerate,
        }
    }
}

/// Weighted linear combination of feature channels: `(C, H, W)` features
/// and `(C,)` weights produce the raw `(H, W)` map. Values can be negative
/// and unbounded; see [`normalize`].
pub fn raw_map(features: &Tensor, weights: &Tensor) -> Result<Tensor> {
    let (c, h, w) = features.dims3()?;
    let wc = weights.dims1()?;
    if wc != c {
        return Err(ExplainError::invalid(format!(
            "channel weights length {wc} does not match feature channels {c}"
        )));
    }
    if h == 0 || w == 0 {
        return Err(ExplainError::degenerate(format!(
            "feature map has zero spatial extent ({h}x{w})"
        )));
    }
    let weighted = features.broadcast_mul(&weights.reshape((c, 1, 1))?)?;
    Ok(weighted.sum(0)?)
}

/// Clamp a raw `(H, W)` map at zero and divide by the global maximum.
///
/// Every output value lies in [0, 1] and at least one equals 1, unless the
/// clamped maximum is zero — then the map is all zeros and flagged
/// degenerate. A flat positive map normalizes to uniform 1.0; that is
/// accepted behavior, not an error.
pub fn normalize(raw: &Tensor) -> Result<Heatmap> {
    let (height, width) = raw.dims2()?;
    let rows: Vec<Vec<f32>> = raw.to_vec2()?;

    let mut values: Vec<f32> = Vec::with_capacity(height * width);
    let mut peak = 0.0f32;
    for row in &rows {
        for &v in row {
            let clamped = v.max(0.0);
            peak = peak.max(clamped);
            values.push(clamped);
        }
    }

    let degenerate = peak == 0.0;
    if !degenerate {
        for v in &mut values {
            *v /= peak;
        }
    }

    Ok(Heatmap {
        values,
        height,
        width,
        degenerate,
    })
}

/// Full synthesis: weighted combination followed by normalization.
pub fn synthesize(features: &Tensor, weights: &Tensor) -> Result<Heatmap> {
    let raw = raw_map(features, weights)?;
    normalize(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn two_channel_features() -> Tensor {
        // channel 0 = [[1,2],[3,4]], channel 1 = [[4,3],[2,1]]
        let data = vec![1.0f32, 2.0, 3.0, 4.0, 4.0, 3.0, 2.0, 1.0];
        Tensor::from_vec(data, (2, 2, 2), &Device::Cpu).unwrap()
    }

    #[test]
    fn test_weighted_combination() {
        let features = two_channel_features();
        let weights = Tensor::from_vec(vec![1.0f32, -1.0], (2,), &Device::Cpu).unwrap();

        let raw: Vec<Vec<f32>> = raw_map(&features, &weights).unwrap().to_vec2().unwrap();
        assert_eq!(raw, vec![vec![-3.0, -1.0], vec![1.0, 3.0]]);
    }

    #[test]
    fn test_clamp_and_normalize() {
        let features = two_channel_features();
        let weights = Tensor::from_vec(vec![1.0f32, -1.0], (2,), &Device::Cpu).unwrap();

        let map = synthesize(&features, &weights).unwrap();
        assert!(!map.is_degenerate());
        assert_eq!(map.get(0, 0), 0.0);
        assert_eq!(map.get(0, 1), 0.0);
        assert_eq!(map.get(1, 0), 1.0 / 3.0);
        assert_eq!(map.get(1, 1), 1.0);
    }

    #[test]
    fn test_nonzero_map_peaks_at_one() {
        let features = two_channel_features();
        let weights = Tensor::from_vec(vec![0.3f32, 0.9], (2,), &Device::Cpu).unwrap();

        let map = synthesize(&features, &weights).unwrap();
        let max = map.values().iter().copied().fold(f32::MIN, f32::max);
        let min = map.values().iter().copied().fold(f32::MAX, f32::min);
        assert_eq!(max, 1.0);
        assert!(min >= 0.0);
    }

    #[test]
    fn test_zero_weights_degenerate() {
        let features = two_channel_features();
        let weights = Tensor::from_vec(vec![0.0f32, 0.0], (2,), &Device::Cpu).unwrap();

        let map = synthesize(&features, &weights).unwrap();
        assert!(map.is_degenerate());
        assert!(map.values().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_linearity_before_clamp() {
        let features = two_channel_features();
        let w1 = Tensor::from_vec(vec![1.0f32, -1.0], (2,), &Device::Cpu).unwrap();
        let w2 = Tensor::from_vec(vec![2.5f32, -2.5], (2,), &Device::Cpu).unwrap();

        let r1: Vec<Vec<f32>> = raw_map(&features, &w1).unwrap().to_vec2().unwrap();
        let r2: Vec<Vec<f32>> = raw_map(&features, &w2).unwrap().to_vec2().unwrap();
        for (row1, row2) in r1.iter().zip(&r2) {
            for (a, b) in row1.iter().zip(row2) {
                assert_eq!(*b, a * 2.5);
            }
        }
    }

    #[test]
    fn test_flat_positive_map_is_uniform_one() {
        let features = Tensor::from_vec(vec![2.0f32; 4], (1, 2, 2), &Device::Cpu).unwrap();
        let weights = Tensor::from_vec(vec![1.0f32], (1,), &Device::Cpu).unwrap();

        let map = synthesize(&features, &weights).unwrap();
        assert!(!map.is_degenerate());
        assert!(map.values().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_weight_length_mismatch_rejected() {
        let features = two_channel_features();
        let weights = Tensor::from_vec(vec![1.0f32, 2.0, 3.0], (3,), &Device::Cpu).unwrap();
        assert!(raw_map(&features, &weights).is_err());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_get_rejects_row_aliasing() {
        let features = two_channel_features();
        let weights = Tensor::from_vec(vec![1.0f32, 0.0], (2,), &Device::Cpu).unwrap();
        let map = synthesize(&features, &weights).unwrap();
        // x == width would silently read the next row without the check
        let _ = map.get(0, map.width());
    }

    #[test]
    fn test_orientation_transpose() {
        let features = two_channel_features();
        let weights = Tensor::from_vec(vec![1.0f32, 0.0], (2,), &Device::Cpu).unwrap();
        // normalized channel 0: [[0.25, 0.5], [0.75, 1.0]]
        let map = synthesize(&features, &weights).unwrap();

        let t = map.oriented(Orientation::Transpose);
        assert_eq!(t.get(0, 1), map.get(1, 0));
        assert_eq!(t.get(1, 0), map.get(0, 1));

        let fv = map.oriented(Orientation::FlipVertical);
        assert_eq!(fv.get(0, 0), map.get(1, 0));

        let fh = map.oriented(Orientation::FlipHorizontal);
        assert_eq!(fh.get(0, 0), map.get(0, 1));
    }
}
