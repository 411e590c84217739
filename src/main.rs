//! gradcam-rs CLI: visual explanations for image classifier predictions

use anyhow::{Context, Result};
use clap::Parser;
use gradcam_rs::{CamModel, ExplainOptions};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "gradcam-rs")]
#[command(about = "Grad-CAM explanations for convolutional image classifiers")]
#[command(version)]
struct Cli {
    /// Model ID from `HuggingFace`, or a local directory containing
    /// config.json and model.safetensors
    #[arg(short, long)]
    model: String,

    /// Input image to explain
    #[arg(short, long)]
    image: PathBuf,

    /// Capture layer (default: deepest conv block)
    #[arg(short, long)]
    layer: Option<String>,

    /// Explain this class index instead of the top prediction
    #[arg(short = 'c', long)]
    class: Option<usize>,

    /// Global overlay opacity in [0, 1]
    #[arg(long, default_value_t = 0.20)]
    opacity: f32,

    /// Number of discrete color-ramp levels
    #[arg(long, default_value_t = 12)]
    levels: usize,

    /// Output directory for artifacts
    #[arg(short, long, default_value = "outputs")]
    output: PathBuf,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Force CPU mode (slower but avoids CUDA issues)
    #[arg(long)]
    cpu: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    println!("=== gradcam-rs: class activation mapping ===");
    println!("Model:  {}", cli.model);
    println!("Image:  {}", cli.image.display());
    println!("Output: {}", cli.output.display());
    if cli.cpu {
        println!("Mode:   CPU (forced)");
    }

    // Load model
    info!("Loading model...");
    let model_dir = PathBuf::from(&cli.model);
    let model = if model_dir.is_dir() {
        CamModel::from_files(
            &model_dir.join("config.json"),
            &model_dir.join("model.safetensors"),
            Some(cli.cpu),
        )?
    } else {
        CamModel::from_pretrained_with_device(&cli.model, Some(cli.cpu))?
    };
    info!(
        "Model: {} classes, layers: {}",
        model.class_count(),
        model.layer_names().join(", ")
    );

    // Load image
    let image = image::open(&cli.image)
        .with_context(|| format!("Failed to open image {}", cli.image.display()))?;

    // Run the pipeline
    let options = ExplainOptions {
        layer: cli.layer,
        class_override: cli.class,
        blend_opacity: cli.opacity,
        ramp_levels: cli.levels,
        ..Default::default()
    };
    let explanation = model.explain(&image, &options)?;

    // Print results
    println!("\n=== Results ===");
    match &explanation.class_label {
        Some(label) => println!(
            "Class {} ({}): p={:.4}",
            explanation.class_index, label, explanation.class_score
        ),
        None => println!(
            "Class {}: p={:.4}",
            explanation.class_index, explanation.class_score
        ),
    }
    println!("Layer: {}", explanation.layer);
    if explanation.no_evidence {
        println!("No discriminative evidence found; overlay is empty.");
    }

    // Save artifacts
    std::fs::create_dir_all(&cli.output)?;
    let heatmap_path = cli.output.join("heatmap.png");
    let overlay_path = cli.output.join("overlay.png");
    let summary_path = cli.output.join("scores.json");

    explanation.heatmap_image.save(&heatmap_path)?;
    explanation.composite.save(&overlay_path)?;
    std::fs::write(
        &summary_path,
        serde_json::to_string_pretty(&explanation.summary())?,
    )?;

    info!("Heatmap saved to {}", heatmap_path.display());
    info!("Overlay saved to {}", overlay_path.display());
    info!("Summary saved to {}", summary_path.display());

    Ok(())
}
