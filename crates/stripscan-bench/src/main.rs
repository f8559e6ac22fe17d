//! stripscan-bench: CLI tool for classifying test-strip photos and tuning
//! the pipeline.
//!
//! Decodes an image file, runs the classification pipeline with
//! configurable parameters, and prints either the JSON reading or a
//! per-stage diagnostics report. Useful for:
//!
//! - Checking what a photo reads as without a server round trip
//! - Tuning the boost, CLAHE, morphology and pixel-floor parameters
//! - Measuring per-stage durations
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin stripscan-bench -- [OPTIONS] <IMAGE_PATH>
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::Parser;
use serde::Serialize;
use stripscan_pipeline::diagnostics::{Clock, PipelineDiagnostics};
use stripscan_pipeline::{
    ClassificationResult, ColorClass, Dimensions, PipelineConfig, RiskLevel, Roi,
};
use tracing::{debug, info};

/// Classify a pH test-strip photo and report the reading.
///
/// Runs the classification pipeline on an image with configurable
/// parameters and prints the result as JSON, or a per-stage timing and
/// metrics report with `--diagnostics`.
#[derive(Parser)]
#[command(name = "stripscan-bench", version)]
struct Cli {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Additive saturation/value boost.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_BOOST)]
    boost: u8,

    /// CLAHE clip limit.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_CLAHE_CLIP_LIMIT)]
    clip_limit: f32,

    /// CLAHE tiles per side.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_CLAHE_TILE_GRID)]
    tile_grid: u32,

    /// Morphology kernel size (odd).
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_MORPH_KERNEL_SIZE)]
    kernel_size: u8,

    /// A class must cover strictly more pixels than this to win a band.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_MIN_PIXELS)]
    min_pixels: u32,

    /// Number of horizontal bands.
    #[arg(long, default_value_t = PipelineConfig::DEFAULT_BAND_COUNT)]
    bands: u32,

    /// Region of interest as `ROW_START,ROW_END,COL_START,COL_END`.
    ///
    /// Defaults to the whole image.
    #[arg(long, value_parser = parse_roi)]
    roi: Option<Roi>,

    /// Full pipeline config as a JSON string.
    ///
    /// When provided, all other pipeline parameter flags are ignored.
    /// Missing fields take their defaults.
    #[arg(long)]
    config_json: Option<String>,

    /// Print the diagnostics report instead of the JSON result.
    #[arg(long)]
    diagnostics: bool,

    /// Number of runs for averaging.
    #[arg(long, default_value_t = 1, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    runs: usize,

    /// Log per-band counts and votes to stderr.
    #[arg(long)]
    debug: bool,
}

/// Parse `ROW_START,ROW_END,COL_START,COL_END` into a [`Roi`].
fn parse_roi(s: &str) -> Result<Roi, String> {
    let parts = s
        .split(',')
        .map(|part| {
            part.trim()
                .parse::<u32>()
                .map_err(|e| format!("invalid ROI bound {part:?}: {e}"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    match parts[..] {
        [row_start, row_end, col_start, col_end] => {
            Ok(Roi::new(row_start, row_end, col_start, col_end))
        }
        _ => Err(format!(
            "expected ROW_START,ROW_END,COL_START,COL_END, got {} values",
            parts.len()
        )),
    }
}

/// Build a [`PipelineConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored.  Otherwise, a config is
/// assembled from the individual flags.
fn config_from_cli(cli: &Cli) -> Result<PipelineConfig, String> {
    if let Some(ref json) = cli.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    Ok(PipelineConfig {
        boost: cli.boost,
        clahe_clip_limit: cli.clip_limit,
        clahe_tile_grid: cli.tile_grid,
        morph_kernel_size: cli.kernel_size,
        min_pixels: cli.min_pixels,
        band_count: cli.bands,
        ..PipelineConfig::default()
    })
}

/// A pH reading, or the literal `"Unknown"`.
#[derive(Debug, PartialEq, Serialize)]
#[serde(untagged)]
enum Ph {
    Known(f64),
    Unknown(&'static str),
}

/// JSON body printed for a reading.
#[derive(Debug, Serialize)]
struct Response {
    dominant_color: Option<ColorClass>,
    #[serde(rename = "detected_pH")]
    detected_ph: Ph,
    health_message: String,
    risk: RiskLevel,
    advice: &'static str,
}

impl From<&ClassificationResult> for Response {
    fn from(result: &ClassificationResult) -> Self {
        Self {
            dominant_color: result.dominant_color,
            detected_ph: result.ph.map_or(Ph::Unknown("Unknown"), Ph::Known),
            health_message: result.message.clone(),
            risk: result.risk,
            advice: result.risk.advice(),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = match config_from_cli(&cli) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let image_bytes = match std::fs::read(&cli.image_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("Error reading {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    let image = match image::load_from_memory(&image_bytes) {
        Ok(decoded) => decoded.to_rgb8(),
        Err(e) => {
            eprintln!("Error decoding {}: {e}", cli.image_path.display());
            return ExitCode::FAILURE;
        }
    };

    let dimensions = Dimensions::of(&image);
    let roi = cli.roi.unwrap_or_else(|| Roi::full(dimensions));

    info!(
        "Image: {} ({} bytes, {}x{})",
        cli.image_path.display(),
        image_bytes.len(),
        dimensions.width,
        dimensions.height,
    );
    info!("ROI: {roi}");
    debug!("Config: {config:#?}");
    if cli.runs > 1 {
        info!("Runs: {}", cli.runs);
    }

    let mut all_diagnostics = Vec::with_capacity(cli.runs);

    for run in 0..cli.runs {
        if cli.runs > 1 {
            info!("--- Run {}/{} ---", run + 1, cli.runs);
        }

        match stripscan_pipeline::diagnostics::process_staged_with_diagnostics(
            &image, roi, &config, &StdClock,
        ) {
            Ok((staged, diagnostics)) => {
                // Print the reading once; later runs only add timings.
                if run == 0 {
                    if cli.diagnostics {
                        println!("{}", diagnostics.report());
                    } else {
                        match serde_json::to_string_pretty(&Response::from(&staged.result)) {
                            Ok(json) => println!("{json}"),
                            Err(e) => {
                                eprintln!("Error serializing result: {e}");
                                return ExitCode::FAILURE;
                            }
                        }
                    }
                }
                all_diagnostics.push(diagnostics);
            }
            Err(e) => {
                eprintln!("Pipeline error: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    // Print summary when multiple runs.
    if cli.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[PipelineDiagnostics]) {
    let Some(first) = all_diagnostics.first() else {
        println!("Warning: no diagnostics to summarize");
        return;
    };

    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    // Per-stage means.
    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    for (i, (name, _)) in first.stages().iter().enumerate() {
        let stage_mean = all_diagnostics
            .iter()
            .map(|d| d.stages()[i].1.duration.as_secs_f64() * 1000.0)
            .sum::<f64>()
            / all_diagnostics.len() as f64;
        println!("{name:<24} {stage_mean:>10.3}ms");
    }
}
