//! WSI Reader - read regions and thumbnails from Whole Slide Images.

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wsi_reader::config::{Cli, Command, InfoConfig, RegionConfig, RegionTarget, ThumbnailConfig};
use wsi_reader::region::Region;
use wsi_reader::slide::open_slide_series;
use wsi_reader::SlideError;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Command::Info(config) => run_info(config),
        Command::Region(config) => run_region(config),
        Command::Thumbnail(config) => run_thumbnail(config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "wsi_reader=debug"
    } else {
        "wsi_reader=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Errors surfaced by the subcommands.
#[derive(Debug, thiserror::Error)]
enum RunError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Slide(#[from] SlideError),

    #[error("Failed to serialize slide info: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to write {path}: {message}")]
    Output { path: String, message: String },
}

// =============================================================================
// Info Command
// =============================================================================

fn run_info(config: InfoConfig) -> Result<(), RunError> {
    config.validate().map_err(RunError::Config)?;
    let slide = open_slide_series(&config.path, config.series)?;
    let info = slide.info()?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

// =============================================================================
// Region Command
// =============================================================================

fn run_region(config: RegionConfig) -> Result<(), RunError> {
    config.validate().map_err(RunError::Config)?;
    let slide = open_slide_series(&config.path, config.series)?;
    let origin = (config.x, config.y);
    let size = (config.width, config.height);
    let options = config.read_options();

    let region = match config.target() {
        RegionTarget::Level(level) => slide.read_region(origin, level, size, options)?,
        RegionTarget::Downsample(ds) => {
            slide.read_region_by_downsample(origin, ds, size, options)?
        }
    };

    info!(
        width = region.width(),
        height = region.height(),
        valid = region.mask.count_valid(),
        "read region"
    );
    save_region(&region, &config.output, config.mask_output.as_deref())
}

// =============================================================================
// Thumbnail Command
// =============================================================================

fn run_thumbnail(config: ThumbnailConfig) -> Result<(), RunError> {
    config.validate().map_err(RunError::Config)?;
    let slide = open_slide_series(&config.path, config.series)?;
    let region = slide.downsampled_slide((config.width, config.height), false)?;
    info!(
        width = region.width(),
        height = region.height(),
        "built thumbnail"
    );
    save_region(&region, &config.output, None)
}

fn save_region(region: &Region, output: &Path, mask_output: Option<&Path>) -> Result<(), RunError> {
    let output_error = |path: &Path, message: String| RunError::Output {
        path: path.display().to_string(),
        message,
    };

    let image = region.pixels.to_dynamic_image().ok_or_else(|| {
        output_error(
            output,
            format!("cannot encode {} channels", region.pixels.channels()),
        )
    })?;
    image
        .save(output)
        .map_err(|e| output_error(output, e.to_string()))?;
    info!(path = %output.display(), "wrote pixels");

    if let Some(mask_path) = mask_output {
        region
            .mask
            .to_gray_image()
            .save(mask_path)
            .map_err(|e| output_error(mask_path, e.to_string()))?;
        info!(path = %mask_path.display(), "wrote mask");
    }
    Ok(())
}
