//! High-level model wrapper running the explanation pipeline
//!
//! [`CamModel`] owns a boxed backend and the device it was loaded on, and
//! exposes one operation: [`CamModel::explain`], a single linear pass per
//! invocation — scores, class selection, activation/gradient capture,
//! channel pooling, heatmap synthesis, colorized compositing. Invocations
//! allocate all their tensors fresh and share only the read-only weights,
//! so independent invocations can run concurrently over one model.

use anyhow::Result;
use candle_core::Device;
use image::{DynamicImage, GrayImage, RgbImage};
use serde::Serialize;
use tracing::{info, warn};

use crate::engine::CamBackend;
use crate::error::ExplainError;
use crate::forward_vgg::CamVgg;
use crate::heatmap::{self, Heatmap, Orientation};
use crate::pooling;
use crate::preprocess::Preprocessor;
use crate::render::{self, ColorRamp};
use crate::selector::select_class;

/// Per-invocation options for [`CamModel::explain`].
#[derive(Debug, Clone)]
pub struct ExplainOptions {
    /// Capture-point name; None selects the deepest conv block.
    pub layer: Option<String>,
    /// Explicit class to explain; None selects the top-scoring class.
    pub class_override: Option<usize>,
    /// Global overlay opacity in [0, 1].
    pub blend_opacity: f32,
    /// Number of discrete color-ramp levels (at least 2).
    pub ramp_levels: usize,
    /// Coordinate adjustment before rasterization.
    pub orientation: Orientation,
}

impl Default for ExplainOptions {
    fn default() -> Self {
        Self {
            layer: None,
            class_override: None,
            blend_opacity: 0.20,
            ramp_levels: ColorRamp::DEFAULT_LEVELS,
            orientation: Orientation::Identity,
        }
    }
}

/// Everything one invocation produces.
#[derive(Debug)]
pub struct Explanation {
    /// Index of the explained class.
    pub class_index: usize,
    /// Label of the explained class, when the model ships labels.
    pub class_label: Option<String>,
    /// Probability of the explained class.
    pub class_score: f32,
    /// Full per-class probability vector.
    pub scores: Vec<f32>,
    /// Name of the capture point the explanation was taken at.
    pub layer: String,
    /// Normalized heatmap at feature-map resolution.
    pub heatmap: Heatmap,
    /// Grayscale rendition of the heatmap (feature-map resolution).
    pub heatmap_image: GrayImage,
    /// Heatmap composited over the source image (source resolution).
    pub composite: RgbImage,
    /// True when no positive evidence was found; the composite equals the
    /// source image exactly.
    pub no_evidence: bool,
}

impl Explanation {
    /// Serializable summary for persistence alongside the image artifacts.
    pub fn summary(&self) -> ExplanationSummary {
        ExplanationSummary {
            class_index: self.class_index,
            class_label: self.class_label.clone(),
            class_score: self.class_score,
            layer: self.layer.clone(),
            no_evidence: self.no_evidence,
            scores: self.scores.clone(),
        }
    }
}

/// JSON-friendly invocation summary.
#[derive(Debug, Clone, Serialize)]
pub struct ExplanationSummary {
    pub class_index: usize,
    pub class_label: Option<String>,
    pub class_score: f32,
    pub layer: String,
    pub no_evidence: bool,
    pub scores: Vec<f32>,
}

/// High-level wrapper tying a backend to the explanation pipeline.
pub struct CamModel {
    backend: Box<dyn CamBackend>,
    device: Device,
    preprocessor: Preprocessor,
}

impl CamModel {
    /// Load a model from HuggingFace (tries CUDA, falls back to CPU)
    pub fn from_pretrained(model_id: &str) -> Result<Self> {
        Self::from_pretrained_with_device(model_id, None)
    }

    /// Load with explicit device choice (None = auto-detect)
    pub fn from_pretrained_with_device(model_id: &str, force_cpu: Option<bool>) -> Result<Self> {
        let device = select_device(force_cpu)?;
        let backend = CamVgg::from_pretrained(model_id, &device)?;
        Self::from_backend(Box::new(backend), device)
    }

    /// Load from local config + safetensors files
    pub fn from_files(
        config_path: &std::path::Path,
        weights_path: &std::path::Path,
        force_cpu: Option<bool>,
    ) -> Result<Self> {
        let device = select_device(force_cpu)?;
        let backend = CamVgg::from_files(config_path, weights_path, &device)?;
        Self::from_backend(Box::new(backend), device)
    }

    /// Wrap an already-constructed backend.
    pub fn from_backend(backend: Box<dyn CamBackend>, device: Device) -> Result<Self> {
        let preprocessor = Preprocessor::imagenet(backend.input_size())?;
        Ok(Self {
            backend,
            device,
            preprocessor,
        })
    }

    /// Number of output classes.
    pub fn class_count(&self) -> usize {
        self.backend.class_count()
    }

    /// Capture-point names, in depth order.
    pub fn layer_names(&self) -> &[String] {
        self.backend.layers().names()
    }

    /// Per-class probabilities for one image.
    pub fn scores(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        let input = self.preprocessor.to_input(image, &self.device)?;
        self.backend.scores(&input)
    }

    /// Produce a visual explanation for the model's prediction on `image`.
    ///
    /// Runs the full pipeline: score the image, select the target class,
    /// capture the (activation, gradient) pair at the chosen layer, pool
    /// the gradient into channel weights, synthesize and normalize the
    /// heatmap, and composite it over the source image at its native
    /// resolution.
    pub fn explain(&self, image: &DynamicImage, options: &ExplainOptions) -> Result<Explanation> {
        // Fail on bad options before any tensor work.
        if !(0.0..=1.0).contains(&options.blend_opacity) {
            return Err(ExplainError::invalid(format!(
                "blend opacity {} outside [0, 1]",
                options.blend_opacity
            )));
        }
        let ramp = ColorRamp::jet(options.ramp_levels)?;
        let registry = self.backend.layers();
        let layer = match &options.layer {
            Some(name) => registry.resolve(name)?,
            None => registry.default_layer(),
        };

        let input = self.preprocessor.to_input(image, &self.device)?;

        let scores = self.backend.scores(&input)?;
        let class_index = select_class(&scores, options.class_override)?;
        info!(
            "Explaining class {} (p={:.4}) at layer '{}'",
            class_index,
            scores[class_index],
            registry.name(layer)
        );

        let pair = self.backend.gradient(&input, class_index, layer)?;
        let weights = pooling::channel_weights(pair.gradient())?;
        let map = heatmap::synthesize(pair.activation(), &weights)?;
        let map = map.oriented(options.orientation);

        if map.is_degenerate() {
            warn!(
                "No positive evidence for class {} at layer '{}'; overlay is empty",
                class_index,
                registry.name(layer)
            );
        }

        let base = image.to_rgb8();
        let composite = render::composite(&map, &base, &ramp, options.blend_opacity)?;
        let heatmap_image = render::to_gray_image(&map);

        Ok(Explanation {
            class_index,
            class_label: self.backend.class_label(class_index).map(str::to_string),
            class_score: scores[class_index],
            no_evidence: map.is_degenerate(),
            layer: registry.name(layer).to_string(),
            scores,
            heatmap: map,
            heatmap_image,
            composite,
        })
    }
}

fn select_device(force_cpu: Option<bool>) -> Result<Device> {
    if force_cpu == Some(true) {
        info!("Forcing CPU mode");
        return Ok(Device::Cpu);
    }
    match Device::cuda_if_available(0) {
        Ok(dev) if dev.is_cuda() => {
            info!("Using CUDA device");
            Ok(dev)
        }
        _ => {
            info!("CUDA not available, using CPU");
            Ok(Device::Cpu)
        }
    }
}
