//! Colorizing and compositing of normalized heatmaps
//!
//! Maps heatmap intensity through a discrete color ramp with a linear
//! per-level opacity gradient, upsamples the RGBA buffer to the source
//! image's resolution with a bilinear filter, and alpha-blends the result
//! over the source at a fixed global opacity. Low-intensity regions render
//! transparent regardless of hue; a degenerate (all-zero) heatmap leaves
//! the source image pixel-identical.

use anyhow::Result;
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, Rgb, RgbImage, Rgba, Rgba32FImage};

use crate::error::ExplainError;
use crate::heatmap::Heatmap;

/// Jet-like anchor gradient, blue through red. Discrete ramp levels are
/// sampled from this by linear interpolation between neighboring anchors.
const JET_ANCHORS: [(f32, [u8; 3]); 5] = [
    (0.0, [0, 0, 143]),
    (0.25, [0, 112, 255]),
    (0.5, [80, 255, 160]),
    (0.75, [255, 160, 0]),
    (1.0, [128, 0, 0]),
];

/// Discrete perceptually-ordered color ramp with a per-level alpha
/// gradient: level 0 is fully transparent, the top level fully opaque,
/// opacity growing linearly in between.
#[derive(Debug, Clone)]
pub struct ColorRamp {
    /// Per-level color, 0..255 component range.
    colors: Vec<[f32; 3]>,
    /// Per-level opacity in [0, 1].
    alphas: Vec<f32>,
}

impl ColorRamp {
    /// Default number of ramp levels.
    pub const DEFAULT_LEVELS: usize = 12;

    /// Build a jet ramp with `levels` discrete levels (at least 2).
    pub fn jet(levels: usize) -> Result<Self> {
        if levels < 2 {
            return Err(ExplainError::invalid(format!(
                "color ramp needs at least 2 levels, got {levels}"
            )));
        }
        let mut colors = Vec::with_capacity(levels);
        let mut alphas = Vec::with_capacity(levels);
        for i in 0..levels {
            let t = i as f32 / (levels - 1) as f32;
            colors.push(anchor_color(t));
            alphas.push(t);
        }
        Ok(Self { colors, alphas })
    }

    pub fn levels(&self) -> usize {
        self.colors.len()
    }

    /// Nearest ramp level for a normalized intensity. Monotonic and
    /// deterministic; intensity 0 always lands on the transparent level.
    fn level_for(&self, value: f32) -> usize {
        let n = self.colors.len();
        (value.clamp(0.0, 1.0) * (n - 1) as f32).round() as usize
    }

    /// Color (0..255 components) and opacity for a normalized intensity.
    pub fn color_alpha(&self, value: f32) -> ([f32; 3], f32) {
        let level = self.level_for(value);
        (self.colors[level], self.alphas[level])
    }
}

fn anchor_color(t: f32) -> [f32; 3] {
    let x = t.clamp(0.0, 1.0);
    let mut i = 0;
    while i + 1 < JET_ANCHORS.len() && x > JET_ANCHORS[i + 1].0 {
        i += 1;
    }
    // the loop above caps i at len - 2, so i + 1 is always in range
    let (x0, c0) = JET_ANCHORS[i];
    let (x1, c1) = JET_ANCHORS[i + 1];
    let f = if x1 > x0 { (x - x0) / (x1 - x0) } else { 0.0 };
    [
        f32::from(c0[0]) + f * (f32::from(c1[0]) - f32::from(c0[0])),
        f32::from(c0[1]) + f * (f32::from(c1[1]) - f32::from(c0[1])),
        f32::from(c0[2]) + f * (f32::from(c1[2]) - f32::from(c0[2])),
    ]
}

/// Rasterize a heatmap into an RGBA f32 buffer at feature-map resolution.
/// Color components are in 0..255, alpha in [0, 1].
pub fn colorize(map: &Heatmap, ramp: &ColorRamp) -> Rgba32FImage {
    let mut buf = Rgba32FImage::new(map.width() as u32, map.height() as u32);
    for y in 0..map.height() {
        for x in 0..map.width() {
            let ([r, g, b], a) = ramp.color_alpha(map.get(y, x));
            buf.put_pixel(x as u32, y as u32, Rgba([r, g, b, a]));
        }
    }
    buf
}

/// Alpha-blend a colorized heatmap over the source image.
///
/// The RGBA buffer is bilinearly resized to the source resolution
/// (nearest-neighbor would leave blocky artifacts), then composited with
/// standard "over" blending where the effective per-pixel opacity is
/// `level_alpha * blend_opacity`. With the default `blend_opacity` of 0.2
/// the underlying image stays visible even under the opaque top level.
pub fn composite(
    map: &Heatmap,
    base: &RgbImage,
    ramp: &ColorRamp,
    blend_opacity: f32,
) -> Result<RgbImage> {
    if !(0.0..=1.0).contains(&blend_opacity) {
        return Err(ExplainError::invalid(format!(
            "blend opacity {blend_opacity} outside [0, 1]"
        )));
    }
    let (out_w, out_h) = base.dimensions();
    if out_w == 0 || out_h == 0 {
        return Err(ExplainError::invalid(format!(
            "non-positive composite resolution {out_w}x{out_h}"
        )));
    }

    let overlay = colorize(map, ramp);
    let overlay = imageops::resize(&overlay, out_w, out_h, FilterType::Triangle);

    let mut out = RgbImage::new(out_w, out_h);
    for y in 0..out_h {
        for x in 0..out_w {
            let Rgba([fr, fg, fb, fa]) = *overlay.get_pixel(x, y);
            let Rgb([br, bg, bb]) = *base.get_pixel(x, y);
            let a = fa.clamp(0.0, 1.0) * blend_opacity;
            let blend = |fg_c: f32, bg_c: u8| -> u8 {
                (a * fg_c + (1.0 - a) * f32::from(bg_c)).round() as u8
            };
            out.put_pixel(x, y, Rgb([blend(fr, br), blend(fg, bg), blend(fb, bb)]));
        }
    }
    Ok(out)
}

/// Grayscale rendition of the heatmap at feature-map resolution, the
/// persisted low-resolution artifact.
pub fn to_gray_image(map: &Heatmap) -> GrayImage {
    let mut img = GrayImage::new(map.width() as u32, map.height() as u32);
    for y in 0..map.height() {
        for x in 0..map.width() {
            let v = (map.get(y, x) * 255.0).round() as u8;
            img.put_pixel(x as u32, y as u32, Luma([v]));
        }
    }
    img
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heatmap;
    use candle_core::{Device, Tensor};

    fn uniform_map(value: f32) -> Heatmap {
        // synthesize a 2x2 map whose normalized values are all `value`
        // (value 0 => degenerate, value 1 => flat positive)
        let features =
            Tensor::from_vec(vec![value; 4], (1, 2, 2), &Device::Cpu).unwrap();
        let weights = Tensor::from_vec(vec![1.0f32], (1,), &Device::Cpu).unwrap();
        heatmap::synthesize(&features, &weights).unwrap()
    }

    fn checkered_base(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([200, 30, 90])
            } else {
                Rgb([10, 220, 40])
            }
        })
    }

    #[test]
    fn test_ramp_alpha_is_linear_and_anchored() {
        let ramp = ColorRamp::jet(12).unwrap();
        let (_, a0) = ramp.color_alpha(0.0);
        let (c1, a1) = ramp.color_alpha(1.0);
        assert_eq!(a0, 0.0);
        assert_eq!(a1, 1.0);
        // top level sits exactly on the last anchor
        assert_eq!(c1, [128.0, 0.0, 0.0]);

        // monotonic over increasing intensity
        let mut prev = -1.0;
        for i in 0..=20 {
            let (_, a) = ramp.color_alpha(i as f32 / 20.0);
            assert!(a >= prev);
            prev = a;
        }
    }

    #[test]
    fn test_ramp_too_few_levels_rejected() {
        assert!(ColorRamp::jet(1).is_err());
        assert!(ColorRamp::jet(0).is_err());
    }

    #[test]
    fn test_degenerate_heatmap_leaves_base_untouched() {
        let map = uniform_map(0.0);
        assert!(map.is_degenerate());

        let base = checkered_base(16, 12);
        let ramp = ColorRamp::jet(12).unwrap();
        let out = composite(&map, &base, &ramp, 0.2).unwrap();

        assert_eq!(out.dimensions(), base.dimensions());
        for (o, b) in out.pixels().zip(base.pixels()) {
            assert_eq!(o, b);
        }
    }

    #[test]
    fn test_composite_matches_base_resolution() {
        let map = uniform_map(1.0);
        let base = checkered_base(224, 224);
        let ramp = ColorRamp::jet(20).unwrap();
        let out = composite(&map, &base, &ramp, 0.2).unwrap();
        assert_eq!(out.dimensions(), (224, 224));
    }

    #[test]
    fn test_opacity_out_of_range_rejected() {
        let map = uniform_map(1.0);
        let base = checkered_base(8, 8);
        let ramp = ColorRamp::jet(12).unwrap();
        assert!(composite(&map, &base, &ramp, 1.5).is_err());
        assert!(composite(&map, &base, &ramp, -0.1).is_err());
    }

    #[test]
    fn test_zero_resolution_rejected() {
        let map = uniform_map(1.0);
        let base = RgbImage::new(0, 0);
        let ramp = ColorRamp::jet(12).unwrap();
        let err = composite(&map, &base, &ramp, 0.2).unwrap_err();
        assert!(err
            .downcast_ref::<crate::error::ExplainError>()
            .is_some());
    }

    #[test]
    fn test_zero_blend_opacity_is_identity() {
        let map = uniform_map(1.0);
        let base = checkered_base(10, 10);
        let ramp = ColorRamp::jet(12).unwrap();
        let out = composite(&map, &base, &ramp, 0.0).unwrap();
        for (o, b) in out.pixels().zip(base.pixels()) {
            assert_eq!(o, b);
        }
    }

    #[test]
    fn test_full_intensity_full_opacity_hits_ramp_top() {
        let map = uniform_map(1.0);
        let base = checkered_base(2, 2);
        let ramp = ColorRamp::jet(12).unwrap();
        let out = composite(&map, &base, &ramp, 1.0).unwrap();
        // top jet anchor is dark red
        for p in out.pixels() {
            assert_eq!(*p, Rgb([128, 0, 0]));
        }
    }

    #[test]
    fn test_gray_artifact_keeps_feature_resolution() {
        let map = uniform_map(1.0);
        let gray = to_gray_image(&map);
        assert_eq!(gray.dimensions(), (2, 2));
        assert_eq!(gray.get_pixel(0, 0), &Luma([255]));
    }
}
