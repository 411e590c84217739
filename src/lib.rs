// Pedantic clippy configuration for ML/math codebase
// These are acceptable in numerical/ML code:
#![allow(clippy::cast_precision_loss)] // usize→f32 intentional in tensor math
#![allow(clippy::cast_possible_truncation)] // f32→u8/usize in rasterization
#![allow(clippy::cast_sign_loss)] // f32→u8 when value is known positive
#![allow(clippy::many_single_char_names)] // x, y, h, w standard in imaging
#![allow(clippy::similar_names)] // related variables like `fg`/`bg`
#![allow(clippy::module_name_repetitions)] // CamModel in model.rs is fine
// Documentation pedantic - acceptable for research code:
#![allow(clippy::doc_markdown)] // backticks for every technical term is excessive
#![allow(clippy::missing_errors_doc)] // # Errors section for every Result fn
// Method style pedantic:
#![allow(clippy::must_use_candidate)] // #[must_use] on every pure fn is excessive
#![allow(clippy::return_self_not_must_use)] // #[must_use] on Self returns

//! gradcam-rs: gradient-weighted class activation mapping
//!
//! Explains a convolutional classifier's prediction by highlighting the
//! image regions that support the selected class, rendered as a color
//! heatmap composited over the source image (Grad-CAM).
//!
//! ## Architecture
//!
//! - `model`: High-level CamModel wrapper running the full pipeline
//! - `engine`: Inference-engine boundary trait (scores / activation / gradient)
//! - `forward_vgg`: VGG-style candle backend with per-block capture points
//! - `layer`: Typed layer registry resolved once at load time
//! - `selector`: Target class selection (argmax or explicit override)
//! - `pooling`: Gradient → per-channel importance weights
//! - `heatmap`: Weighted channel combination, clamping, normalization
//! - `render`: Color ramp, alpha gradient, upsampling, compositing
//! - `preprocess`: Image decode/resize/normalize into network input
//! - `error`: Typed failure categories surfaced through anyhow

pub mod engine;
pub mod error;
pub mod forward_vgg;
pub mod heatmap;
pub mod layer;
pub mod model;
pub mod pooling;
pub mod preprocess;
pub mod render;
pub mod selector;

pub use engine::{ActivationGradient, CamBackend};
pub use error::ExplainError;
pub use forward_vgg::{CamVgg, VggConfig};
pub use heatmap::{Heatmap, Orientation};
pub use layer::{LayerId, LayerRegistry};
pub use model::{CamModel, ExplainOptions, Explanation, ExplanationSummary};
pub use pooling::channel_weights;
pub use preprocess::{Preprocessor, IMAGENET_MEAN, IMAGENET_STD};
pub use render::ColorRamp;
pub use selector::select_class;
