//! VGG-style convolutional classifier with per-block activation capture
//!
//! Custom implementation that runs block-by-block so the activation at a
//! chosen conv block can be captured and differentiated against. The
//! gradient operation is reverse-mode autodiff scoped to a single call:
//! the captured activation is detached into a `Var`, the remaining blocks
//! and the classifier head are replayed from it, and the selected class
//! logit is backpropagated to the var. Model weights are plain constants,
//! so nothing outside that one call builds a graph.

use anyhow::{Context, Result};
use candle_core::{DType, Device, IndexOp, Module, Tensor, Var};
use candle_nn::{conv2d, linear, Conv2d, Conv2dConfig, Linear, VarBuilder};
use hf_hub::{api::sync::Api, Repo, RepoType};
use tracing::info;

use crate::engine::{ActivationGradient, CamBackend};
use crate::error::ExplainError;
use crate::layer::{LayerId, LayerRegistry};

/// Model configuration (matches the repo's config.json)
#[derive(Debug, Clone, serde::Deserialize)]
pub struct VggConfig {
    /// Square network input size in pixels.
    #[serde(default = "default_image_size")]
    pub image_size: usize,
    /// Output channels per conv block, e.g. [64, 128, 256, 512, 512].
    pub block_channels: Vec<usize>,
    /// Number of 3x3 convs per block, e.g. [2, 2, 3, 3, 3].
    pub convs_per_block: Vec<usize>,
    /// Classifier hidden width.
    #[serde(default = "default_hidden_size")]
    pub hidden_size: usize,
    /// Number of output classes.
    pub num_classes: usize,
    /// Optional class labels, index-aligned with the score vector.
    #[serde(default)]
    pub labels: Vec<String>,
}

fn default_image_size() -> usize {
    224
}

fn default_hidden_size() -> usize {
    4096
}

impl VggConfig {
    fn validate(&self) -> Result<()> {
        if self.block_channels.is_empty() {
            return Err(ExplainError::invalid("config has no conv blocks"));
        }
        if self.block_channels.len() != self.convs_per_block.len() {
            return Err(ExplainError::invalid(format!(
                "block_channels has {} entries but convs_per_block has {}",
                self.block_channels.len(),
                self.convs_per_block.len()
            )));
        }
        if self.num_classes == 0 {
            return Err(ExplainError::invalid("num_classes must be positive"));
        }
        // each block halves the spatial extent once
        if self.image_size >> self.block_channels.len() == 0 {
            return Err(ExplainError::invalid(format!(
                "image size {} too small for {} pooling stages",
                self.image_size,
                self.block_channels.len()
            )));
        }
        Ok(())
    }
}

/// VGG-style backend: stacked 3x3 conv blocks, each closed by a 2x2 max
/// pool, followed by a two-layer classifier head. Capture points sit after
/// each block's final ReLU, before its pool.
pub struct CamVgg {
    blocks: Vec<Vec<Conv2d>>,
    fc1: Linear,
    fc2: Linear,
    registry: LayerRegistry,
    config: VggConfig,
}

impl CamVgg {
    /// Load model files from HuggingFace
    pub fn from_pretrained(model_id: &str, device: &Device) -> Result<Self> {
        info!("Loading model from: {}", model_id);

        let api = Api::new()?;
        let repo = api.repo(Repo::new(model_id.to_string(), RepoType::Model));

        let config_path = repo
            .get("config.json")
            .context("Failed to download config.json")?;
        let weights_path = repo
            .get("model.safetensors")
            .context("Failed to download model.safetensors")?;

        Self::from_files(&config_path, &weights_path, device)
    }

    /// Load model from local config + safetensors files
    pub fn from_files(
        config_path: &std::path::Path,
        weights_path: &std::path::Path,
        device: &Device,
    ) -> Result<Self> {
        let config_str =
            std::fs::read_to_string(config_path).context("Failed to read config")?;
        let config: VggConfig = serde_json::from_str(&config_str)?;

        info!(
            "Model config: {} blocks, {} classes, input {}px",
            config.block_channels.len(),
            config.num_classes,
            config.image_size
        );

        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[weights_path.to_path_buf()], DType::F32, device)?
        };
        Self::load(vb, config)
    }

    /// Build the network from a VarBuilder
    pub fn load(vb: VarBuilder, config: VggConfig) -> Result<Self> {
        config.validate()?;

        let conv_cfg = Conv2dConfig {
            padding: 1,
            ..Default::default()
        };

        let mut blocks = Vec::with_capacity(config.block_channels.len());
        let mut in_channels = 3;
        for (b, (&out_channels, &n_convs)) in config
            .block_channels
            .iter()
            .zip(&config.convs_per_block)
            .enumerate()
        {
            info!(
                "Loading block {}/{} ({} convs, {} channels)",
                b + 1,
                config.block_channels.len(),
                n_convs,
                out_channels
            );
            let mut convs = Vec::with_capacity(n_convs);
            for j in 0..n_convs {
                let conv = conv2d(
                    in_channels,
                    out_channels,
                    3,
                    conv_cfg,
                    vb.pp(format!("features.{b}.{j}")),
                )?;
                convs.push(conv);
                in_channels = out_channels;
            }
            blocks.push(convs);
        }

        let n_blocks = blocks.len();
        let feat_size = config.image_size >> n_blocks;
        let fc_in = in_channels * feat_size * feat_size;

        let fc1 = linear(fc_in, config.hidden_size, vb.pp("classifier.0"))?;
        let fc2 = linear(config.hidden_size, config.num_classes, vb.pp("classifier.1"))?;

        let names = (1..=n_blocks).map(|b| format!("block{b}")).collect();
        let registry = LayerRegistry::new(names)?;

        info!("Model loaded with {} conv blocks", n_blocks);

        Ok(Self {
            blocks,
            fc1,
            fc2,
            registry,
            config,
        })
    }

    /// Run blocks 0..=tap, returning the tap block's post-ReLU activation
    /// (its closing max pool is NOT applied — that is the capture point).
    fn features_until(&self, input: &Tensor, tap: usize) -> Result<Tensor> {
        let mut hidden = input.clone();
        for (b, block) in self.blocks.iter().enumerate().take(tap + 1) {
            for conv in block {
                hidden = conv.forward(&hidden)?.relu()?;
            }
            if b < tap {
                hidden = hidden.max_pool2d(2)?;
            }
        }
        Ok(hidden)
    }

    /// Continue from a tap activation: apply the tap block's pool, the
    /// remaining blocks, and their pools.
    fn features_from(&self, activation: &Tensor, tap: usize) -> Result<Tensor> {
        let mut hidden = activation.max_pool2d(2)?;
        for block in &self.blocks[tap + 1..] {
            for conv in block {
                hidden = conv.forward(&hidden)?.relu()?;
            }
            hidden = hidden.max_pool2d(2)?;
        }
        Ok(hidden)
    }

    /// Classifier head: flatten, two linear layers, logits of shape
    /// `(1, num_classes)`.
    fn head(&self, features: &Tensor) -> Result<Tensor> {
        let hidden = features.flatten_from(1)?;
        let hidden = self.fc1.forward(&hidden)?.relu()?;
        Ok(self.fc2.forward(&hidden)?)
    }

    fn logits(&self, input: &Tensor) -> Result<Tensor> {
        let last = self.blocks.len() - 1;
        let features = self.features_from(&self.features_until(input, last)?, last)?;
        self.head(&features)
    }

    fn check_input(&self, input: &Tensor) -> Result<()> {
        let (_b, c, h, w) = input.dims4()?;
        let s = self.config.image_size;
        if c != 3 || h != s || w != s {
            return Err(ExplainError::invalid(format!(
                "expected input (1, 3, {s}, {s}), got {:?}",
                input.dims()
            )));
        }
        Ok(())
    }
}

impl CamBackend for CamVgg {
    fn class_count(&self) -> usize {
        self.config.num_classes
    }

    fn input_size(&self) -> usize {
        self.config.image_size
    }

    fn layers(&self) -> &LayerRegistry {
        &self.registry
    }

    fn class_label(&self, index: usize) -> Option<&str> {
        self.config.labels.get(index).map(String::as_str)
    }

    fn scores(&self, input: &Tensor) -> Result<Vec<f32>> {
        self.check_input(input)?;
        let logits = self.logits(input)?;
        let probs = candle_nn::ops::softmax_last_dim(&logits)?;
        Ok(probs.squeeze(0)?.to_vec1()?)
    }

    fn activation(&self, input: &Tensor, layer: LayerId) -> Result<Tensor> {
        self.check_input(input)?;
        Ok(self.features_until(input, layer.index())?.squeeze(0)?)
    }

    fn gradient(
        &self,
        input: &Tensor,
        class_index: usize,
        layer: LayerId,
    ) -> Result<ActivationGradient> {
        self.check_input(input)?;
        if class_index >= self.config.num_classes {
            return Err(ExplainError::invalid(format!(
                "class index {} out of range (have {} classes)",
                class_index, self.config.num_classes
            )));
        }

        let tap = layer.index();
        let activation = self.features_until(input, tap)?;

        // Detach the capture point into a Var and replay the rest of the
        // network from it; backward() then yields exactly the gradient of
        // the class logit with respect to this activation.
        let var = Var::from_tensor(&activation.detach())?;
        let features = self.features_from(var.as_tensor(), tap)?;
        let logits = self.head(&features)?;

        let scalar = logits.i((0, class_index))?;
        let grads = scalar.backward()?;
        let gradient = grads
            .get(&var)
            .context("backward pass produced no gradient for the capture point")?;

        ActivationGradient::new(activation.squeeze(0)?, gradient.squeeze(0)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_config() -> VggConfig {
        VggConfig {
            image_size: 8,
            block_channels: vec![2, 3],
            convs_per_block: vec![1, 1],
            hidden_size: 4,
            num_classes: 3,
            labels: vec!["cat".to_string(), "dog".to_string(), "newt".to_string()],
        }
    }

    fn tiny_model() -> CamVgg {
        let vb = VarBuilder::zeros(DType::F32, &Device::Cpu);
        CamVgg::load(vb, tiny_config()).unwrap()
    }

    fn tiny_input() -> Tensor {
        Tensor::ones((1, 3, 8, 8), DType::F32, &Device::Cpu).unwrap()
    }

    #[test]
    fn test_scores_sum_to_one() {
        let model = tiny_model();
        let scores = model.scores(&tiny_input()).unwrap();
        assert_eq!(scores.len(), 3);
        let total: f32 = scores.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_activation_shapes_per_block() {
        let model = tiny_model();
        let input = tiny_input();

        // block1 tap: before its pool, full input resolution
        let a1 = model
            .activation(&input, model.layers().resolve("block1").unwrap())
            .unwrap();
        assert_eq!(a1.dims(), &[2, 8, 8]);

        // block2 tap: after block1's pool
        let a2 = model
            .activation(&input, model.layers().resolve("block2").unwrap())
            .unwrap();
        assert_eq!(a2.dims(), &[3, 4, 4]);
    }

    #[test]
    fn test_gradient_pairs_with_activation() {
        let model = tiny_model();
        let layer = model.layers().default_layer();
        let pair = model.gradient(&tiny_input(), 0, layer).unwrap();
        assert_eq!(pair.activation().dims(), pair.gradient().dims());
        assert_eq!(pair.spatial_dims().unwrap(), (4, 4));
    }

    #[test]
    fn test_gradient_class_out_of_range() {
        let model = tiny_model();
        let layer = model.layers().default_layer();
        let err = model.gradient(&tiny_input(), 7, layer).unwrap_err();
        let cat = err.downcast_ref::<ExplainError>().unwrap();
        assert!(matches!(cat, ExplainError::InvalidArgument(_)));
    }

    #[test]
    fn test_wrong_input_shape_rejected() {
        let model = tiny_model();
        let bad = Tensor::ones((1, 3, 16, 16), DType::F32, &Device::Cpu).unwrap();
        assert!(model.scores(&bad).is_err());
    }

    #[test]
    fn test_config_validation() {
        let mut config = tiny_config();
        config.convs_per_block = vec![1];
        assert!(CamVgg::load(VarBuilder::zeros(DType::F32, &Device::Cpu), config).is_err());

        let mut config = tiny_config();
        config.num_classes = 0;
        assert!(CamVgg::load(VarBuilder::zeros(DType::F32, &Device::Cpu), config).is_err());
    }

    #[test]
    fn test_labels_exposed() {
        let model = tiny_model();
        assert_eq!(model.class_label(1), Some("dog"));
        assert_eq!(model.class_label(9), None);
    }
}
