//! Pipeline diagnostics: timing, counts, and other metrics for each stage.
//!
//! These diagnostics are permanent instrumentation intended for
//! threshold tuning and parameter experimentation.
//! [`process_staged_with_diagnostics`] collects them alongside the
//! pipeline results.
//!
//! Duration measurements use [`std::time::Duration`]. Timestamps come
//! from a caller-supplied [`Clock`], so the core never reads the system
//! time itself.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::{Pipeline, PipelineStage};
use crate::risk::RiskLevel;
use crate::types::{ColorClass, PipelineConfig, PipelineError, RgbImage, Roi, StagedResult};

/// Source of timestamps for stage timing.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// The current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Stage 1: input validation.
    pub validate: StageDiagnostics,
    /// Stage 2: saturation/value boost and lightness equalization.
    pub normalize: StageDiagnostics,
    /// Stage 3: region crop and band split.
    pub split: StageDiagnostics,
    /// Stage 4: per-band classification.
    pub classify: StageDiagnostics,
    /// Stage 5: majority vote.
    pub aggregate: StageDiagnostics,
    /// Stage 6: pH lookup.
    pub resolve: StageDiagnostics,
    /// Total wall-clock duration of the entire pipeline (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Summary across all stages.
    pub summary: PipelineSummary,
}

/// Diagnostics for a single pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics.
    pub metrics: Option<StageMetrics>,
}

/// Stage-specific metrics that vary by pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StageMetrics {
    /// Input validation metrics.
    Validate {
        /// Source image width in pixels.
        width: u32,
        /// Source image height in pixels.
        height: u32,
        /// Region of interest.
        roi: Roi,
        /// Requested band count.
        band_count: u32,
    },
    /// Normalization settings.
    Normalize {
        /// Saturation/value boost.
        boost: u8,
        /// CLAHE clip limit.
        clip_limit: f32,
        /// CLAHE grid size.
        tile_grid: u32,
    },
    /// Crop and split metrics.
    Split {
        /// Region width in pixels.
        region_width: u32,
        /// Region height in pixels.
        region_height: u32,
        /// Number of bands.
        band_count: u32,
        /// Rows per band.
        band_height: u32,
        /// Trailing region rows not covered by any band.
        excluded_rows: u32,
    },
    /// Per-band classification metrics.
    Classify {
        /// Structuring element size.
        kernel_size: u8,
        /// Pixel floor a class must exceed.
        min_pixels: u32,
        /// Cleaned-mask pixel counts per class, per band.
        band_counts: Vec<Vec<(ColorClass, u64)>>,
        /// Per-band votes.
        votes: Vec<Option<ColorClass>>,
    },
    /// Majority vote metrics.
    Aggregate {
        /// Votes per class in order of first vote.
        tally: Vec<(ColorClass, usize)>,
        /// Bands with no confident class.
        abstentions: usize,
        /// Winning class.
        winner: Option<ColorClass>,
    },
    /// pH lookup metrics.
    Resolve {
        /// Dominant color.
        color: Option<ColorClass>,
        /// Resolved pH.
        ph: Option<f64>,
        /// Risk level for the pH.
        risk: RiskLevel,
    },
}

/// High-level summary for the entire pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Source image width in pixels.
    pub image_width: u32,
    /// Source image height in pixels.
    pub image_height: u32,
    /// Total pixel count.
    pub pixel_count: u64,
    /// Region width in pixels.
    pub roi_width: u32,
    /// Region height in pixels.
    pub roi_height: u32,
    /// Number of bands.
    pub band_count: usize,
    /// Bands that produced a vote.
    pub confident_bands: usize,
    /// Winning color.
    pub dominant_color: Option<ColorClass>,
    /// Resolved pH.
    pub ph: Option<f64>,
}

impl PipelineSummary {
    /// Summarize a finished run.
    #[must_use]
    pub fn of(staged: &StagedResult) -> Self {
        let dimensions = staged.dimensions();
        Self {
            image_width: dimensions.width,
            image_height: dimensions.height,
            pixel_count: dimensions.pixel_count(),
            roi_width: staged.roi.width(),
            roi_height: staged.roi.height(),
            band_count: staged.bands.len(),
            confident_bands: staged.votes.iter().flatten().count(),
            dominant_color: staged.result.dominant_color,
            ph: staged.result.ph,
        }
    }
}

impl PipelineDiagnostics {
    /// Per-stage diagnostics in pipeline order, with display names.
    #[must_use]
    pub fn stages(&self) -> [(&'static str, &StageDiagnostics); 6] {
        [
            ("Validate", &self.validate),
            ("Normalize", &self.normalize),
            ("Split", &self.split),
            ("Classify", &self.classify),
            ("Aggregate", &self.aggregate),
            ("Resolve", &self.resolve),
        ]
    }

    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Pipeline Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)  ROI: {}x{}",
            self.summary.image_width,
            self.summary.image_height,
            self.summary.pixel_count,
            self.summary.roi_width,
            self.summary.roi_height,
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);

        for (name, diag) in self.stages() {
            let ms = duration_ms(diag.duration);
            let pct = if total_ms > 0.0 {
                ms / total_ms * 100.0
            } else {
                0.0
            };
            let details = diag.metrics.as_ref().map_or_else(String::new, format_metrics);
            lines.push(format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}"));
        }

        lines.push(String::new());
        lines.push(format!(
            "Confident bands: {}/{}  |  Dominant: {}  |  pH: {}",
            self.summary.confident_bands,
            self.summary.band_count,
            format_color(self.summary.dominant_color),
            format_ph(self.summary.ph),
        ));

        lines.join("\n")
    }
}

/// Run the pipeline, timing every stage with `clock`.
///
/// Produces exactly the same [`StagedResult`] as
/// [`process_staged`](crate::process_staged).
///
/// # Errors
///
/// Returns [`PipelineError`] if validation fails.
pub fn process_staged_with_diagnostics<C: Clock>(
    image: &RgbImage,
    roi: Roi,
    config: &PipelineConfig,
    clock: &C,
) -> Result<(StagedResult, PipelineDiagnostics), PipelineError> {
    let pending = Pipeline::new(image.clone(), roi, config.clone());
    let run_start = clock.now();

    let start = clock.now();
    let validated = pending.validate()?;
    let validate = record(clock, &start, &validated);

    let start = clock.now();
    let normalized = validated.normalize();
    let normalize = record(clock, &start, &normalized);

    let start = clock.now();
    let split_stage = normalized.split()?;
    let split = record(clock, &start, &split_stage);

    let start = clock.now();
    let classified = split_stage.classify();
    let classify = record(clock, &start, &classified);

    let start = clock.now();
    let aggregated = classified.aggregate();
    let aggregate = record(clock, &start, &aggregated);

    let start = clock.now();
    let resolved = aggregated.resolve();
    let resolve = record(clock, &start, &resolved);

    let total_duration = clock.elapsed(&run_start);
    let staged = resolved.into_result();
    let summary = PipelineSummary::of(&staged);

    Ok((
        staged,
        PipelineDiagnostics {
            validate,
            normalize,
            split,
            classify,
            aggregate,
            resolve,
            total_duration,
            summary,
        },
    ))
}

fn record<C: Clock, S: PipelineStage>(clock: &C, start: &C::Instant, stage: &S) -> StageDiagnostics {
    StageDiagnostics {
        duration: clock.elapsed(start),
        metrics: stage.metrics(),
    }
}

/// Convert a `Duration` to milliseconds as `f64`.
fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn format_color(color: Option<ColorClass>) -> String {
    color.map_or_else(|| "none".to_string(), |c| c.to_string())
}

fn format_ph(ph: Option<f64>) -> String {
    ph.map_or_else(|| "unknown".to_string(), |ph| format!("{ph:.1}"))
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Validate {
            width,
            height,
            roi,
            band_count,
        } => format!("{width}x{height}, {roi}, {band_count} bands"),
        StageMetrics::Normalize {
            boost,
            clip_limit,
            tile_grid,
        } => format!("boost={boost} clip={clip_limit:.1} grid={tile_grid}x{tile_grid}"),
        StageMetrics::Split {
            region_width,
            region_height,
            band_count,
            band_height,
            excluded_rows,
        } => format!(
            "{region_width}x{region_height} -> {band_count} x {band_height} rows ({excluded_rows} excluded)",
        ),
        StageMetrics::Classify {
            kernel_size,
            min_pixels,
            votes,
            ..
        } => {
            let votes: Vec<String> = votes.iter().map(|v| format_color(*v)).collect();
            format!("k={kernel_size} floor={min_pixels} votes=[{}]", votes.join(", "))
        }
        StageMetrics::Aggregate {
            tally,
            abstentions,
            winner,
        } => {
            let tally: Vec<String> = tally.iter().map(|(c, n)| format!("{c}:{n}")).collect();
            format!(
                "{} abstain={abstentions} winner={}",
                tally.join(" "),
                format_color(*winner),
            )
        }
        StageMetrics::Resolve { color, ph, risk } => format!(
            "{} -> pH {} ({risk})",
            format_color(*color),
            format_ph(*ph),
        ),
    }
}
