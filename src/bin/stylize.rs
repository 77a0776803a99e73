//! pastiche: stylize a content image with one or more style images.
//!
//! Usage:
//!   pastiche content.jpg style.jpg -o out.png --weights vgg19.safetensors

use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use anyhow::Context as _;
use clap::Parser;

use pastiche::transfer::{Iterate, RenderedImage};
use pastiche::{
    Device, Init, OptimizerKind, OutputFormat, Pooling, StyleTransfer, StylizeOptions,
    WeightStore,
};

#[derive(Parser, Debug)]
#[command(name = "pastiche", version, about = "Neural style transfer")]
struct Cli {
    /// Content image.
    content: PathBuf,

    /// Style image(s).
    #[arg(required = true)]
    styles: Vec<PathBuf>,

    /// Output image path.
    #[arg(short, long, default_value = "out.png")]
    output: PathBuf,

    /// Pretrained VGG-19 weights (safetensors).
    #[arg(long, default_value = "vgg19.safetensors")]
    weights: PathBuf,

    /// Per-style-image weights (one per style image).
    #[arg(long = "style-weight")]
    style_weights: Vec<f32>,

    /// Content loss weight.
    #[arg(long, default_value_t = 0.015)]
    content_weight: f32,

    /// Smoothness (V-beta) weight.
    #[arg(long, default_value_t = 0.125)]
    tv_weight: f32,

    /// Smoothness exponent beta.
    #[arg(long, default_value_t = 2.0)]
    tv_beta: f32,

    /// Optimizer: adam or lbfgs.
    #[arg(long, default_value = "adam")]
    optimizer: String,

    /// Coarsest scale (longest edge).
    #[arg(long, default_value_t = 128)]
    min_scale: u32,

    /// Final scale (longest edge).
    #[arg(long, default_value_t = 512)]
    end_scale: u32,

    /// Iterations per scale.
    #[arg(long, default_value_t = 500)]
    iterations: u32,

    /// Iterations at the coarsest scale.
    #[arg(long, default_value_t = 1000)]
    initial_iterations: u32,

    /// Optimizer step size.
    #[arg(long, default_value_t = 0.02)]
    step_size: f32,

    /// Running-average decay.
    #[arg(long, default_value_t = 0.99)]
    avg_decay: f32,

    /// Initialization: content, gray, uniform, normal, style_stats.
    #[arg(long, default_value = "content")]
    init: String,

    /// Style scale relative to the content scale.
    #[arg(long, default_value_t = 1.0)]
    style_scale_fac: f32,

    /// Fixed style size (overrides --style-scale-fac).
    #[arg(long)]
    style_size: Option<u32>,

    /// Pooling: max, average, l2.
    #[arg(long, default_value = "max")]
    pooling: String,

    /// Compute device(s); may be given twice.
    #[arg(long = "device", default_value = "cpu")]
    devices: Vec<String>,

    /// Output format: rgb8 or rgb16.
    #[arg(long, default_value = "rgb8")]
    format: String,

    /// Log each loss term's value per evaluation.
    #[arg(long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let devices = cli
        .devices
        .iter()
        .map(|d| Device::parse(d))
        .collect::<Result<Vec<_>, _>>()?;
    let pooling = Pooling::parse(&cli.pooling)?;
    let format = OutputFormat::parse(&cli.format)?;

    let options = StylizeOptions {
        style_weights: (!cli.style_weights.is_empty()).then(|| cli.style_weights.clone()),
        content_weight: cli.content_weight,
        tv_weight: cli.tv_weight,
        tv_beta: cli.tv_beta,
        optimizer: OptimizerKind::parse(&cli.optimizer)?,
        min_scale: cli.min_scale,
        end_scale: cli.end_scale,
        iterations: cli.iterations,
        initial_iterations: cli.initial_iterations,
        step_size: cli.step_size,
        avg_decay: cli.avg_decay,
        init: Init::parse(&cli.init)?,
        style_scale_fac: cli.style_scale_fac,
        style_size: cli.style_size,
        verbose: cli.verbose,
    };

    let weights = WeightStore::load(&cli.weights)
        .with_context(|| format!("loading weights from {}", cli.weights.display()))?;
    let content = pastiche::io::load_image(&cli.content)
        .with_context(|| format!("loading content image {}", cli.content.display()))?;
    let styles = cli
        .styles
        .iter()
        .map(|p| {
            pastiche::io::load_image(p)
                .with_context(|| format!("loading style image {}", p.display()))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;

    let mut engine = StyleTransfer::new(&weights, &devices, pooling)?;

    let mut print_progress = |it: &Iterate| {
        let ts = it
            .time
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        eprintln!(
            "{}x{}  iter {:4}/{}  loss={:.6}  t={:.1}",
            it.width, it.height, it.iteration, it.iteration_count, it.loss, ts
        );
    };
    engine.stylize(&content, &styles, &options, Some(&mut print_progress))?;

    match engine.get_image(format)? {
        RenderedImage::Rgb8(img) => img.save(&cli.output)?,
        RenderedImage::Rgb16(img) => img.save(&cli.output)?,
    }
    eprintln!("wrote {}", cli.output.display());
    Ok(())
}
