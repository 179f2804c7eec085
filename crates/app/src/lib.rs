use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tracing::info;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use tilescale_core::backend::{InferenceBackend, SessionConfig};
use tilescale_core::config::{
    config_path, data_dir, initialize_data_dir, resolve_relative_to, AppConfig, UpscalerConfig,
};
use tilescale_core::engine::{BatchMode, OrtEngine};
use tilescale_core::logging::{self, FileSinkPlan, LoggingInitOptions};
use tilescale_core::types::Image;
use tilescale_core::upscaler::{Upscaler, UpscalerOptions};

#[derive(Parser)]
#[command(name = "tilescale", about = "Tiled neural image upscaler")]
struct Cli {
    #[arg(help = "Input image (PNG or JPEG)")]
    input: PathBuf,

    #[arg(short, long, help = "Output image path")]
    output: PathBuf,

    #[arg(
        short,
        long,
        help = "ONNX upscaling model (bare names resolve under models_dir)"
    )]
    model: PathBuf,

    #[arg(long, help = "Upscale factor (overrides config)")]
    scale: Option<usize>,

    #[arg(
        long = "tile",
        value_name = "EDGE",
        help = "Output tile edge length (overrides config)"
    )]
    output_tile_edge: Option<usize>,

    #[arg(
        long = "batch",
        value_name = "N",
        help = "Tiles per inference batch (overrides config)"
    )]
    batch_size: Option<usize>,

    #[arg(long, help = "Inference backend: cuda, tensorrt or cpu")]
    backend: Option<String>,

    #[arg(
        long = "no-batch",
        help = "Submit tiles one at a time (for models with a fixed batch dimension)"
    )]
    no_batch: bool,

    #[arg(
        short = 'v',
        long = "verbose",
        action = ArgAction::Count,
        help = "Increase log verbosity (-v: debug, -vv: trace)"
    )]
    verbose: u8,

    #[arg(
        long = "log-filter",
        value_name = "FILTER",
        help = "Explicit tracing filter (overrides RUST_LOG and -v)"
    )]
    log_filter: Option<String>,

    #[arg(long)]
    data_dir: Option<PathBuf>,
}

pub fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    let resolved_data_dir = data_dir(cli.data_dir.as_deref());

    init_logging(
        Some(resolved_data_dir.as_path()),
        cli.verbose,
        cli.log_filter.as_deref(),
    );

    initialize_data_dir(&resolved_data_dir)?;
    let config = AppConfig::load_from_path(&config_path(&resolved_data_dir))?;

    run_upscale(&cli, &config, &resolved_data_dir)
}

fn run_upscale(cli: &Cli, config: &AppConfig, resolved_data_dir: &Path) -> Result<()> {
    let options = resolve_upscaler_options(
        &config.upscaler,
        cli.scale,
        cli.output_tile_edge,
        cli.batch_size,
    );
    let backend = InferenceBackend::from_str_lossy(
        cli.backend.as_deref().unwrap_or(&config.upscaler.backend),
    );
    let batch_mode = if cli.no_batch {
        BatchMode::SingleOnly
    } else {
        BatchMode::Batched
    };

    let models_dir = resolve_relative_to(resolved_data_dir, &config.paths.models_dir);
    let model_path = resolve_model_path(&models_dir, &cli.model);
    let trt_cache_dir = resolve_relative_to(resolved_data_dir, &config.paths.trt_cache_dir);

    info!(
        model = %model_path.display(),
        %backend,
        scale = options.upscale_factor,
        output_tile_edge = options.output_tile_edge,
        batch_size = options.batch_size,
        "Loading upscaling model"
    );

    let session_config = SessionConfig {
        model_path: &model_path,
        backend: &backend,
        trt_cache_dir: Some(&trt_cache_dir),
    };
    let engine = OrtEngine::load(&session_config, batch_mode)?;
    let mut upscaler = Upscaler::new(engine, options)?;

    let input = load_input_image(&cli.input)?;
    info!(
        width = input.width(),
        height = input.height(),
        path = %cli.input.display(),
        "Loaded input image"
    );

    let started = Instant::now();
    let output = upscaler.upscale(&input)?;
    info!(
        width = output.width(),
        height = output.height(),
        elapsed_secs = started.elapsed().as_secs_f64(),
        "Upscaled image"
    );

    save_output_image(&cli.output, output)?;
    info!(path = %cli.output.display(), "Wrote output image");
    Ok(())
}

fn resolve_upscaler_options(
    config: &UpscalerConfig,
    scale: Option<usize>,
    output_tile_edge: Option<usize>,
    batch_size: Option<usize>,
) -> UpscalerOptions {
    UpscalerOptions {
        upscale_factor: scale.unwrap_or(config.scale),
        output_tile_edge: output_tile_edge.unwrap_or(config.output_tile_edge),
        batch_size: batch_size.unwrap_or(config.batch_size),
    }
}

/// Absolute paths and paths that already exist are used verbatim; anything
/// else is looked up under the configured models directory.
fn resolve_model_path(models_dir: &Path, model: &Path) -> PathBuf {
    if model.is_absolute() || model.exists() {
        model.to_path_buf()
    } else {
        models_dir.join(model)
    }
}

fn load_input_image(path: &Path) -> Result<Image> {
    let decoded = image::open(path)
        .with_context(|| format!("failed to load image: {}", path.display()))?;
    let rgb = decoded.to_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(Image::from_raw(rgb.into_raw(), width, height)?)
}

fn save_output_image(path: &Path, output: Image) -> Result<()> {
    let (width, height) = (output.width(), output.height());
    let buffer: image::RgbImage = image::ImageBuffer::from_raw(width, height, output.into_raw())
        .context("output image buffer does not match its dimensions")?;
    buffer
        .save(path)
        .with_context(|| format!("failed to save image: {}", path.display()))
}

fn init_logging(data_dir: Option<&Path>, verbose: u8, cli_log_filter: Option<&str>) {
    let options = LoggingInitOptions {
        data_dir: data_dir.map(Path::to_path_buf),
        verbose,
        cli_log_filter: cli_log_filter.map(ToString::to_string),
        rust_log_env: std::env::var("RUST_LOG").ok(),
        ..Default::default()
    };
    let filter = logging::compose_log_filter(&options);

    match logging::build_file_sink_plan(&options) {
        FileSinkPlan::Ready(ready) => {
            let subscriber = tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stderr)
                        .with_filter(parse_env_filter_with_fallback(&filter, "console")),
                )
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_ansi(false)
                        .with_writer(ready.appender)
                        .with_filter(parse_env_filter_with_fallback(&filter, "file")),
                );

            if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
                eprintln!(
                    "Failed to initialize tracing subscriber: {error}. Continuing without structured tracing."
                );
            }
        }
        FileSinkPlan::Fallback(fallback) => {
            eprintln!(
                "Warning: file logging unavailable ({}). Logging to stderr only.",
                fallback.reason
            );

            let subscriber = tracing_subscriber::registry().with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_filter(parse_env_filter_with_fallback(&filter, "console")),
            );

            if let Err(error) = tracing::subscriber::set_global_default(subscriber) {
                eprintln!(
                    "Failed to initialize tracing subscriber: {error}. Continuing without structured tracing."
                );
            }
        }
    }
}

fn parse_env_filter_with_fallback(filter: &str, sink: &str) -> EnvFilter {
    EnvFilter::try_new(filter).unwrap_or_else(|error| {
        eprintln!(
            "Warning: invalid {sink} log filter '{filter}': {error}. Falling back to '{}'.",
            logging::DEFAULT_LOG_FILTER
        );
        EnvFilter::new(logging::DEFAULT_LOG_FILTER)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(args.iter().copied()).expect("args should parse")
    }

    #[test]
    fn cli_parses_required_arguments() {
        let cli = parse(&[
            "tilescale",
            "in.png",
            "-o",
            "out.png",
            "-m",
            "model.onnx",
        ]);
        assert_eq!(cli.input, PathBuf::from("in.png"));
        assert_eq!(cli.output, PathBuf::from("out.png"));
        assert_eq!(cli.model, PathBuf::from("model.onnx"));
        assert_eq!(cli.verbose, 0);
        assert!(!cli.no_batch);
        assert!(cli.scale.is_none());
    }

    #[test]
    fn cli_rejects_missing_output() {
        assert!(Cli::try_parse_from(["tilescale", "in.png", "-m", "model.onnx"]).is_err());
    }

    #[test]
    fn cli_parses_overrides() {
        let cli = parse(&[
            "tilescale",
            "in.png",
            "-o",
            "out.png",
            "-m",
            "model.onnx",
            "--scale",
            "4",
            "--tile",
            "256",
            "--batch",
            "8",
            "--backend",
            "cpu",
            "--no-batch",
            "-vv",
        ]);
        assert_eq!(cli.scale, Some(4));
        assert_eq!(cli.output_tile_edge, Some(256));
        assert_eq!(cli.batch_size, Some(8));
        assert_eq!(cli.backend.as_deref(), Some("cpu"));
        assert!(cli.no_batch);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn options_fall_back_to_config_values() {
        let config = UpscalerConfig::default();
        let options = resolve_upscaler_options(&config, None, None, None);
        assert_eq!(options.upscale_factor, config.scale);
        assert_eq!(options.output_tile_edge, config.output_tile_edge);
        assert_eq!(options.batch_size, config.batch_size);
    }

    #[test]
    fn cli_overrides_win_over_config() {
        let config = UpscalerConfig::default();
        let options = resolve_upscaler_options(&config, Some(4), Some(128), Some(16));
        assert_eq!(options.upscale_factor, 4);
        assert_eq!(options.output_tile_edge, 128);
        assert_eq!(options.batch_size, 16);
    }

    #[test]
    fn bare_model_names_resolve_under_models_dir() {
        let resolved = resolve_model_path(
            Path::new("/data/models"),
            Path::new("does-not-exist.onnx"),
        );
        assert_eq!(resolved, PathBuf::from("/data/models/does-not-exist.onnx"));
    }

    #[test]
    fn absolute_model_paths_are_used_verbatim() {
        let resolved = resolve_model_path(Path::new("/data/models"), Path::new("/abs/model.onnx"));
        assert_eq!(resolved, PathBuf::from("/abs/model.onnx"));
    }
}
