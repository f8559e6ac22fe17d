//! Incremental pipeline: advance stage-by-stage, inspecting each
//! intermediate result before continuing.
//!
//! Unlike [`crate::process_staged`] which runs the entire pipeline in one
//! call, [`Pipeline`] lets the caller drive execution one step at a time:
//!
//! ```rust
//! # use stripscan_pipeline::{Pipeline, PipelineConfig, PipelineError, RgbImage, Roi};
//! # fn run(image: RgbImage, roi: Roi) -> Result<(), PipelineError> {
//! let config = PipelineConfig::default();
//! let pipeline = Pipeline::new(image, roi, config)
//!     .validate()?
//!     .normalize()
//!     .split()?
//!     .classify()
//!     .aggregate()
//!     .resolve();
//!
//! let staged = pipeline.into_result();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next pipeline state
//! (or `Result` for fallible stages), carrying all previously computed
//! intermediates. The caller can inspect the current stage's output via
//! accessor methods at any point.
//!
//! # Memory
//!
//! From [`Split`] onward every stage retains the original image, the
//! normalized image, the cropped region and its bands; from
//! [`Classified`] onward it also holds one mask per class per band.
//! [`StagedResult`] needs all of it for visualization. Callers that
//! only need the reading should prefer [`crate::process`].

use crate::diagnostics::StageMetrics;
use crate::types::{
    BandClassification, ClassificationResult, ColorClass, Dimensions, PipelineConfig,
    PipelineError, RgbImage, Roi, StagedResult,
};

// ───────────────────────── Stage 0: Pending ──────────────────────────

/// Pipeline state before any processing has occurred.
///
/// The image, region and config are stored but not yet checked.
/// Call [`validate`](Self::validate) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .validate() to continue"]
pub struct Pending {
    config: PipelineConfig,
    roi: Roi,
    image: RgbImage,
}

impl Pending {
    /// The source image.
    #[must_use]
    pub const fn image(&self) -> &RgbImage {
        &self.image
    }

    /// The requested region of interest.
    #[must_use]
    pub const fn roi(&self) -> Roi {
        self.roi
    }

    /// Check the image, region and config, and advance to [`Validated`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::EmptyImage`] for a zero-area image,
    /// [`PipelineError::InvalidInput`] for a bad region, and
    /// [`PipelineError::InvalidConfig`] for a bad configuration
    /// (including a band count larger than the region height).
    pub fn validate(self) -> Result<Validated, PipelineError> {
        crate::validate(&self.image, self.roi, &self.config)?;
        Ok(Validated {
            config: self.config,
            roi: self.roi,
            image: self.image,
        })
    }
}

// ───────────────────────── Stage 1: Validated ────────────────────────

/// Pipeline state after input validation.
///
/// Call [`normalize`](Self::normalize) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .normalize() to continue"]
pub struct Validated {
    config: PipelineConfig,
    roi: Roi,
    image: RgbImage,
}

impl Validated {
    /// Source image dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::of(&self.image)
    }

    /// The validated region of interest.
    #[must_use]
    pub const fn roi(&self) -> Roi {
        self.roi
    }

    /// Advance to the normalization stage.
    ///
    /// Boosts saturation/value and equalizes lightness across the
    /// *whole* image; the region is cropped afterwards.
    pub fn normalize(self) -> Normalized {
        let normalized = crate::normalize::normalize(
            &self.image,
            self.config.boost,
            self.config.clahe_clip_limit,
            self.config.clahe_tile_grid,
        );
        Normalized {
            config: self.config,
            roi: self.roi,
            original: self.image,
            normalized,
        }
    }
}

// ───────────────────────── Stage 2: Normalized ───────────────────────

/// Pipeline state after color-space normalization.
///
/// Call [`split`](Self::split) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .split() to continue"]
pub struct Normalized {
    config: PipelineConfig,
    roi: Roi,
    original: RgbImage,
    normalized: RgbImage,
}

impl Normalized {
    /// The normalized whole image.
    #[must_use]
    pub const fn normalized(&self) -> &RgbImage {
        &self.normalized
    }

    /// Crop the region and split it into bands.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the band count does
    /// not fit the region height. [`Pending::validate`] already rejects
    /// that, so this only fails for a stage built by other means.
    pub fn split(self) -> Result<Split, PipelineError> {
        let region = crate::segment::crop(&self.normalized, self.roi);
        let bands = crate::segment::split(&region, self.config.band_count)?;
        Ok(Split {
            config: self.config,
            roi: self.roi,
            original: self.original,
            normalized: self.normalized,
            region,
            bands,
        })
    }
}

// ───────────────────────── Stage 3: Split ────────────────────────────

/// Pipeline state after cropping and band splitting.
///
/// Call [`classify`](Self::classify) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .classify() to continue"]
pub struct Split {
    config: PipelineConfig,
    roi: Roi,
    original: RgbImage,
    normalized: RgbImage,
    region: RgbImage,
    bands: Vec<RgbImage>,
}

impl Split {
    /// The normalized image cropped to the region of interest.
    #[must_use]
    pub const fn region(&self) -> &RgbImage {
        &self.region
    }

    /// The bands, top to bottom.
    #[must_use]
    pub fn bands(&self) -> &[RgbImage] {
        &self.bands
    }

    /// Classify every band.
    pub fn classify(self) -> Classified {
        let classifications = crate::classify::classify_bands(&self.bands, &self.config);
        Classified {
            config: self.config,
            roi: self.roi,
            original: self.original,
            normalized: self.normalized,
            region: self.region,
            bands: self.bands,
            classifications,
        }
    }
}

// ───────────────────────── Stage 4: Classified ───────────────────────

/// Pipeline state after per-band classification.
///
/// Call [`aggregate`](Self::aggregate) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .aggregate() to continue"]
pub struct Classified {
    config: PipelineConfig,
    roi: Roi,
    original: RgbImage,
    normalized: RgbImage,
    region: RgbImage,
    bands: Vec<RgbImage>,
    classifications: Vec<BandClassification>,
}

impl Classified {
    /// Per-band masks and votes, parallel to the bands.
    #[must_use]
    pub fn classifications(&self) -> &[BandClassification] {
        &self.classifications
    }

    /// Per-band votes.
    #[must_use]
    pub fn votes(&self) -> Vec<Option<ColorClass>> {
        self.classifications.iter().map(|c| c.dominant).collect()
    }

    /// Take the majority vote across bands.
    pub fn aggregate(self) -> Aggregated {
        let votes = self.votes();
        let winner = crate::aggregate::aggregate(&votes);
        Aggregated {
            roi: self.roi,
            original: self.original,
            normalized: self.normalized,
            region: self.region,
            bands: self.bands,
            classifications: self.classifications,
            votes,
            winner,
        }
    }
}

// ───────────────────────── Stage 5: Aggregated ───────────────────────

/// Pipeline state after the majority vote.
///
/// Call [`resolve`](Self::resolve) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing — call .resolve() to continue"]
pub struct Aggregated {
    roi: Roi,
    original: RgbImage,
    normalized: RgbImage,
    region: RgbImage,
    bands: Vec<RgbImage>,
    classifications: Vec<BandClassification>,
    votes: Vec<Option<ColorClass>>,
    winner: Option<ColorClass>,
}

impl Aggregated {
    /// The winning color, if any band was confident.
    #[must_use]
    pub const fn winner(&self) -> Option<ColorClass> {
        self.winner
    }

    /// Resolve the winning color to a pH reading.
    pub fn resolve(self) -> Resolved {
        let result = ClassificationResult::from_dominant(self.winner);
        Resolved {
            roi: self.roi,
            original: self.original,
            normalized: self.normalized,
            region: self.region,
            bands: self.bands,
            classifications: self.classifications,
            votes: self.votes,
            result,
        }
    }
}

// ───────────────────────── Stage 6: Resolved ─────────────────────────

/// Final pipeline state.
///
/// Call [`into_result`](Self::into_result) to take every intermediate.
#[must_use = "call .into_result() to take the staged result"]
pub struct Resolved {
    roi: Roi,
    original: RgbImage,
    normalized: RgbImage,
    region: RgbImage,
    bands: Vec<RgbImage>,
    classifications: Vec<BandClassification>,
    votes: Vec<Option<ColorClass>>,
    result: ClassificationResult,
}

impl Resolved {
    /// The final classification.
    #[must_use]
    pub const fn result(&self) -> &ClassificationResult {
        &self.result
    }

    /// Consume the pipeline and return every intermediate.
    pub fn into_result(self) -> StagedResult {
        StagedResult {
            original: self.original,
            roi: self.roi,
            normalized: self.normalized,
            region: self.region,
            bands: self.bands,
            classifications: self.classifications,
            votes: self.votes,
            result: self.result,
        }
    }
}

// ──────────────────── PipelineStage trait + Stage enum ────────────────

/// Total number of stages in the pipeline.
pub const STAGE_COUNT: usize = 7;

/// The output produced by a single pipeline stage.
///
/// Each variant borrows the data that the corresponding stage computed.
#[must_use]
pub enum StageOutput<'a> {
    /// Source image (not yet validated).
    Source {
        /// The caller's image.
        image: &'a RgbImage,
        /// The requested region.
        roi: Roi,
    },
    /// Validated inputs.
    Validated {
        /// Source image dimensions.
        dimensions: Dimensions,
        /// The validated region.
        roi: Roi,
    },
    /// Normalized whole image.
    Normalized {
        /// The normalized image.
        normalized: &'a RgbImage,
    },
    /// Cropped region and its bands.
    Split {
        /// The cropped region.
        region: &'a RgbImage,
        /// Bands, top to bottom.
        bands: &'a [RgbImage],
    },
    /// Per-band classification.
    Classified {
        /// Masks and votes per band.
        classifications: &'a [BandClassification],
    },
    /// Majority vote.
    Aggregated {
        /// Per-band votes.
        votes: &'a [Option<ColorClass>],
        /// Winning color.
        winner: Option<ColorClass>,
    },
    /// Resolved reading.
    Resolved {
        /// The final classification.
        result: &'a ClassificationResult,
    },
}

/// Trait implemented by every pipeline stage, enabling uniform iteration.
///
/// Both the typed API (individual stage structs) and the dynamic API
/// ([`Stage`] enum) are available. This trait bridges the two: each
/// stage struct implements it, and [`Stage`] delegates to whichever
/// variant it holds.
///
/// # Loop pattern
///
/// ```rust
/// # use stripscan_pipeline::{Pipeline, PipelineConfig, PipelineError, RgbImage, Roi};
/// # use stripscan_pipeline::pipeline::{Stage, Advance};
/// # fn run(image: RgbImage, roi: Roi) -> Result<(), PipelineError> {
/// let mut stage: Stage = Pipeline::new(image, roi, PipelineConfig::default()).into();
/// loop {
///     match stage.advance()? {
///         Advance::Next(next) => stage = next,
///         Advance::Complete(done) => { stage = done; break; }
///     }
/// }
/// let result = stage.complete()?;
/// # Ok(())
/// # }
/// ```
pub trait PipelineStage: Sized {
    /// Human-readable name of this stage (e.g. `"source"`, `"split"`).
    const NAME: &str;

    /// Zero-based index of this stage (`0` for Pending through `6` for
    /// Resolved).
    const INDEX: usize;

    /// The output this stage produced.
    fn output(&self) -> StageOutput<'_>;

    /// Stage-specific metrics for diagnostics.
    ///
    /// Returns `None` for the initial [`Pending`] stage which has not
    /// yet performed any processing.
    fn metrics(&self) -> Option<StageMetrics>;

    /// Advance to the next stage.
    ///
    /// Returns `Ok(Some(stage))` on success, `Ok(None)` if already at
    /// the final stage, or `Err` if the stage transition fails.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] when validation fails.
    fn next(self) -> Result<Option<Stage>, PipelineError>;

    /// Run all remaining stages to completion and return the final
    /// [`StagedResult`].
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if any remaining fallible stage fails.
    fn complete(self) -> Result<StagedResult, PipelineError>;
}

impl PipelineStage for Pending {
    const NAME: &str = "source";
    const INDEX: usize = 0;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Source {
            image: &self.image,
            roi: self.roi,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        None
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Validated(self.validate()?)))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.validate()?.complete()
    }
}

impl PipelineStage for Validated {
    const NAME: &str = "validate";
    const INDEX: usize = 1;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Validated {
            dimensions: self.dimensions(),
            roi: self.roi,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        let dimensions = self.dimensions();
        Some(StageMetrics::Validate {
            width: dimensions.width,
            height: dimensions.height,
            roi: self.roi,
            band_count: self.config.band_count,
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Normalized(self.normalize())))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.normalize().complete()
    }
}

impl PipelineStage for Normalized {
    const NAME: &str = "normalize";
    const INDEX: usize = 2;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Normalized {
            normalized: &self.normalized,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Normalize {
            boost: self.config.boost,
            clip_limit: self.config.clahe_clip_limit,
            tile_grid: self.config.clahe_tile_grid,
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Split(self.split()?)))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.split()?.complete()
    }
}

impl PipelineStage for Split {
    const NAME: &str = "split";
    const INDEX: usize = 3;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Split {
            region: &self.region,
            bands: &self.bands,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        let band_height = self.bands.first().map_or(0, RgbImage::height);
        let covered = band_height * self.config.band_count;
        Some(StageMetrics::Split {
            region_width: self.region.width(),
            region_height: self.region.height(),
            band_count: self.config.band_count,
            band_height,
            excluded_rows: self.region.height().saturating_sub(covered),
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Classified(self.classify())))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.classify().complete()
    }
}

impl PipelineStage for Classified {
    const NAME: &str = "classify";
    const INDEX: usize = 4;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Classified {
            classifications: &self.classifications,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Classify {
            kernel_size: self.config.morph_kernel_size,
            min_pixels: self.config.min_pixels,
            band_counts: self
                .classifications
                .iter()
                .map(BandClassification::counts)
                .collect(),
            votes: self.votes(),
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Aggregated(self.aggregate())))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.aggregate().complete()
    }
}

impl PipelineStage for Aggregated {
    const NAME: &str = "aggregate";
    const INDEX: usize = 5;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Aggregated {
            votes: &self.votes,
            winner: self.winner,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Aggregate {
            tally: crate::aggregate::tally(&self.votes),
            abstentions: self.votes.iter().filter(|v| v.is_none()).count(),
            winner: self.winner,
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(Some(Stage::Resolved(self.resolve())))
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        self.resolve().complete()
    }
}

impl PipelineStage for Resolved {
    const NAME: &str = "resolve";
    const INDEX: usize = 6;

    fn output(&self) -> StageOutput<'_> {
        StageOutput::Resolved {
            result: &self.result,
        }
    }

    fn metrics(&self) -> Option<StageMetrics> {
        Some(StageMetrics::Resolve {
            color: self.result.dominant_color,
            ph: self.result.ph,
            risk: self.result.risk,
        })
    }

    fn next(self) -> Result<Option<Stage>, PipelineError> {
        Ok(None)
    }

    fn complete(self) -> Result<StagedResult, PipelineError> {
        Ok(self.into_result())
    }
}

/// Enum wrapping all pipeline stages for uniform, loopable access.
///
/// Use [`From`] conversions to enter the dynamic API from any typed
/// stage, then call [`advance`](Self::advance) in a loop (see
/// [`PipelineStage`]).
#[must_use]
pub enum Stage {
    /// See [`Pending`].
    Pending(Pending),
    /// See [`Validated`].
    Validated(Validated),
    /// See [`Normalized`].
    Normalized(Normalized),
    /// See [`Split`].
    Split(Split),
    /// See [`Classified`].
    Classified(Classified),
    /// See [`Aggregated`].
    Aggregated(Aggregated),
    /// See [`Resolved`].
    Resolved(Resolved),
}

/// Compile-time guard: if a [`Stage`] variant is added, this match becomes
/// non-exhaustive and the build fails, a reminder to bump [`STAGE_COUNT`].
#[allow(dead_code, clippy::match_same_arms)]
const fn _stage_count_guard(s: &Stage) {
    match s {
        Stage::Pending(_)
        | Stage::Validated(_)
        | Stage::Normalized(_)
        | Stage::Split(_)
        | Stage::Classified(_)
        | Stage::Aggregated(_)
        | Stage::Resolved(_) => {}
    }
}

/// Result of [`Stage::advance`]: either the next stage or the
/// completed final stage returned unchanged.
#[must_use]
pub enum Advance {
    /// The pipeline advanced to this next stage.
    Next(Stage),
    /// The pipeline was already at the final stage; returned unchanged.
    Complete(Stage),
}

/// Delegate a method call to whichever `Stage` variant is active.
macro_rules! delegate {
    ($self:ident, $method:ident $(, $arg:expr)*) => {
        match $self {
            Self::Pending(s) => s.$method($($arg),*),
            Self::Validated(s) => s.$method($($arg),*),
            Self::Normalized(s) => s.$method($($arg),*),
            Self::Split(s) => s.$method($($arg),*),
            Self::Classified(s) => s.$method($($arg),*),
            Self::Aggregated(s) => s.$method($($arg),*),
            Self::Resolved(s) => s.$method($($arg),*),
        }
    };
}

impl Stage {
    /// Human-readable name of the current stage.
    #[must_use]
    pub fn name(&self) -> &'static str {
        delegate!(self, name)
    }

    /// Zero-based index of the current stage.
    #[must_use]
    pub fn index(&self) -> usize {
        delegate!(self, index)
    }

    /// The output this stage produced.
    pub fn output(&self) -> StageOutput<'_> {
        delegate!(self, output)
    }

    /// Stage-specific metrics for diagnostics; `None` for `Pending`.
    #[must_use]
    pub fn metrics(&self) -> Option<StageMetrics> {
        delegate!(self, metrics)
    }

    /// Whether the pipeline is at the final stage.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        matches!(self, Self::Resolved(_))
    }

    /// Advance to the next stage.
    ///
    /// Returns `Ok(Some(next_stage))` on success, `Ok(None)` if
    /// already complete (the `Resolved` value is consumed), or `Err` if
    /// the transition fails.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a fallible stage transition fails.
    pub fn next(self) -> Result<Option<Self>, PipelineError> {
        delegate!(self, next)
    }

    /// Advance to the next stage, returning `self` unchanged if
    /// already complete.
    ///
    /// Unlike [`next`](Self::next), which consumes the final stage and
    /// returns `Ok(None)`, this returns [`Advance::Complete`] with the
    /// final stage so [`complete`](Self::complete) can still be called.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if a fallible stage transition fails.
    pub fn advance(self) -> Result<Advance, PipelineError> {
        if self.is_complete() {
            return Ok(Advance::Complete(self));
        }
        // The is_complete() guard above ensures next() yields Some.
        #[allow(clippy::unreachable)]
        let next = self
            .next()?
            .unwrap_or_else(|| unreachable!("non-complete stage returned None from next()"));
        Ok(Advance::Next(next))
    }

    /// Run all remaining stages to completion.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if any remaining fallible stage fails.
    pub fn complete(self) -> Result<StagedResult, PipelineError> {
        delegate!(self, complete)
    }
}

// Private helper trait so the macro can call `.name()` and `.index()`
// on `&self`; associated constants aren't reachable as `self.NAME`.
trait StageMetadata {
    fn name(&self) -> &'static str;
    fn index(&self) -> usize;
}

impl<T: PipelineStage> StageMetadata for T {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn index(&self) -> usize {
        T::INDEX
    }
}

impl From<Pending> for Stage {
    fn from(s: Pending) -> Self {
        Self::Pending(s)
    }
}

impl From<Validated> for Stage {
    fn from(s: Validated) -> Self {
        Self::Validated(s)
    }
}

impl From<Normalized> for Stage {
    fn from(s: Normalized) -> Self {
        Self::Normalized(s)
    }
}

impl From<Split> for Stage {
    fn from(s: Split) -> Self {
        Self::Split(s)
    }
}

impl From<Classified> for Stage {
    fn from(s: Classified) -> Self {
        Self::Classified(s)
    }
}

impl From<Aggregated> for Stage {
    fn from(s: Aggregated) -> Self {
        Self::Aggregated(s)
    }
}

impl From<Resolved> for Stage {
    fn from(s: Resolved) -> Self {
        Self::Resolved(s)
    }
}

// ───────────────────── Pipeline entry point ──────────────────────────

/// Incremental classification pipeline.
///
/// Created via [`Pipeline::new`], which stores the image, region and
/// config without doing any processing. Each stage method consumes the
/// current state and returns the next, making it a compile-time error
/// to skip stages or call them out of order.
pub struct Pipeline;

impl Pipeline {
    /// Create a new pipeline from an image, region and config.
    ///
    /// No processing is performed. Call
    /// [`.validate()`](Pending::validate) (or convert to a [`Stage`] and
    /// loop) to begin.
    #[allow(clippy::new_ret_no_self)]
    pub const fn new(image: RgbImage, roi: Roi, config: PipelineConfig) -> Pending {
        Pending { config, roi, image }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Rgb;

    use super::*;
    use crate::color::hsv_to_rgb;

    /// A 20x100 strip, uniformly blue (HSV 110/200/200).
    fn blue_strip() -> RgbImage {
        RgbImage::from_pixel(20, 100, Rgb(hsv_to_rgb([110, 200, 200])))
    }

    fn full(image: &RgbImage) -> Roi {
        Roi::full(Dimensions::of(image))
    }

    fn start() -> Pending {
        let image = blue_strip();
        let roi = full(&image);
        Pipeline::new(image, roi, PipelineConfig::default())
    }

    // ─────────── Typed API tests ─────────────────────────────────

    #[test]
    fn pending_exposes_source() {
        let pending = start();
        assert_eq!(pending.image().dimensions(), (20, 100));
        assert_eq!(pending.roi(), Roi::new(0, 100, 0, 20));
    }

    #[test]
    fn validate_rejects_empty_image() {
        let result = Pipeline::new(RgbImage::new(0, 0), Roi::new(0, 1, 0, 1), PipelineConfig::default())
            .validate();
        assert!(matches!(result, Err(PipelineError::EmptyImage)));
    }

    #[test]
    fn validate_rejects_out_of_bounds_roi() {
        let result = Pipeline::new(blue_strip(), Roi::new(0, 101, 0, 20), PipelineConfig::default())
            .validate();
        assert!(matches!(result, Err(PipelineError::InvalidInput(_))));
    }

    #[test]
    fn validate_rejects_too_many_bands() {
        let config = PipelineConfig {
            band_count: 11,
            ..PipelineConfig::default()
        };
        let result = Pipeline::new(blue_strip(), Roi::new(0, 10, 0, 20), config).validate();
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn normalized_keeps_whole_image() {
        let image = blue_strip();
        let normalized = Pipeline::new(image, Roi::new(10, 60, 5, 15), PipelineConfig::default())
            .validate()
            .unwrap()
            .normalize();
        assert_eq!(normalized.normalized().dimensions(), (20, 100));
    }

    #[test]
    fn split_crops_then_bands() {
        let split = Pipeline::new(blue_strip(), Roi::new(10, 60, 5, 15), PipelineConfig::default())
            .validate()
            .unwrap()
            .normalize()
            .split()
            .unwrap();
        assert_eq!(split.region().dimensions(), (10, 50));
        assert_eq!(split.bands().len(), 5);
        assert!(split.bands().iter().all(|b| b.dimensions() == (10, 10)));
    }

    #[test]
    fn classified_exposes_votes() {
        let classified = start()
            .validate()
            .unwrap()
            .normalize()
            .split()
            .unwrap()
            .classify();
        assert_eq!(classified.classifications().len(), 5);
        assert_eq!(classified.votes(), vec![Some(ColorClass::Blue); 5]);
    }

    #[test]
    fn aggregated_and_resolved() {
        let aggregated = start()
            .validate()
            .unwrap()
            .normalize()
            .split()
            .unwrap()
            .classify()
            .aggregate();
        assert_eq!(aggregated.winner(), Some(ColorClass::Blue));
        let resolved = aggregated.resolve();
        assert_eq!(resolved.result().ph, Some(8.0));
    }

    #[test]
    fn full_pipeline_produces_same_result_as_process_staged() {
        let image = blue_strip();
        let roi = full(&image);
        let config = PipelineConfig::default();

        let chained = Pipeline::new(image.clone(), roi, config.clone())
            .validate()
            .unwrap()
            .normalize()
            .split()
            .unwrap()
            .classify()
            .aggregate()
            .resolve()
            .into_result();
        let staged = crate::process_staged(&image, roi, &config).unwrap();

        assert_eq!(chained.normalized, staged.normalized);
        assert_eq!(chained.region, staged.region);
        assert_eq!(chained.bands, staged.bands);
        assert_eq!(chained.classifications, staged.classifications);
        assert_eq!(chained.votes, staged.votes);
        assert_eq!(chained.result, staged.result);
    }

    // ─────────── Helper: drive a Stage to completion ────────────

    /// Advance a [`Stage`] to completion, returning the final stage
    /// and a log of `(index, name)` pairs visited along the way.
    #[allow(clippy::type_complexity)]
    fn drive_to_end(start: Stage) -> Result<(Stage, Vec<(usize, &'static str)>), PipelineError> {
        let mut log = vec![(start.index(), start.name())];
        let mut stage = start;
        loop {
            match stage.advance()? {
                Advance::Next(next) => {
                    log.push((next.index(), next.name()));
                    stage = next;
                }
                Advance::Complete(done) => return Ok((done, log)),
            }
        }
    }

    // ─────────── PipelineStage trait + Stage enum tests ───────────

    #[test]
    fn stage_names_and_indices() {
        let (_, log) = drive_to_end(start().into()).unwrap();
        let expected = [
            (0, "source"),
            (1, "validate"),
            (2, "normalize"),
            (3, "split"),
            (4, "classify"),
            (5, "aggregate"),
            (6, "resolve"),
        ];
        assert_eq!(log.as_slice(), &expected);
    }

    #[test]
    fn loop_to_completion_matches_chained_api() {
        let chained = start()
            .validate()
            .unwrap()
            .normalize()
            .split()
            .unwrap()
            .classify()
            .aggregate()
            .resolve()
            .into_result();

        let (final_stage, _) = drive_to_end(start().into()).unwrap();
        let looped = final_stage.complete().unwrap();

        assert_eq!(chained.normalized, looped.normalized);
        assert_eq!(chained.bands, looped.bands);
        assert_eq!(chained.votes, looped.votes);
        assert_eq!(chained.result, looped.result);
    }

    #[test]
    fn complete_from_pending() {
        let result = start().complete().unwrap();
        assert_eq!(result.result.dominant_color, Some(ColorClass::Blue));
    }

    #[test]
    fn complete_from_mid_stage() {
        let split = start().validate().unwrap().normalize().split().unwrap();
        let result = split.complete().unwrap();
        assert_eq!(result.votes.len(), 5);
    }

    #[test]
    fn next_on_resolved_returns_none() {
        let resolved = start()
            .validate()
            .unwrap()
            .normalize()
            .split()
            .unwrap()
            .classify()
            .aggregate()
            .resolve();
        assert!(resolved.next().unwrap().is_none());
    }

    #[test]
    fn stage_is_complete() {
        let stage: Stage = start().into();
        assert!(!stage.is_complete());
        let (final_stage, _) = drive_to_end(stage).unwrap();
        assert!(final_stage.is_complete());
    }

    #[test]
    fn output_variant_matches_stage() {
        let mut stage: Stage = start().into();
        let mut visited = 0;
        loop {
            let idx = stage.index();
            let variant_idx = match stage.output() {
                StageOutput::Source { .. } => 0,
                StageOutput::Validated { .. } => 1,
                StageOutput::Normalized { .. } => 2,
                StageOutput::Split { .. } => 3,
                StageOutput::Classified { .. } => 4,
                StageOutput::Aggregated { .. } => 5,
                StageOutput::Resolved { .. } => 6,
            };
            assert_eq!(idx, variant_idx, "output variant mismatch at index {idx}");
            visited += 1;
            match stage.advance().unwrap() {
                Advance::Next(next) => stage = next,
                Advance::Complete(_) => break,
            }
        }
        assert_eq!(visited, STAGE_COUNT);
    }

    #[test]
    fn metrics_absent_only_for_pending() {
        let mut stage: Stage = start().into();
        assert!(stage.metrics().is_none());
        while let Advance::Next(next) = stage.advance().unwrap() {
            assert!(next.metrics().is_some(), "no metrics for {}", next.name());
            stage = next;
        }
    }

    #[test]
    fn split_metrics_report_excluded_rows() {
        let image = RgbImage::from_pixel(8, 23, Rgb([0, 0, 0]));
        let split = Pipeline::new(image, Roi::new(0, 23, 0, 8), PipelineConfig::default())
            .validate()
            .unwrap()
            .normalize()
            .split()
            .unwrap();
        match split.metrics() {
            Some(StageMetrics::Split {
                band_height,
                excluded_rows,
                ..
            }) => {
                assert_eq!(band_height, 4);
                assert_eq!(excluded_rows, 3);
            }
            _ => unreachable!("split stage must report split metrics"),
        }
    }

    #[test]
    fn from_conversions_preserve_index() {
        let stage: Stage = start().into();
        assert_eq!(stage.index(), 0);

        let stage: Stage = start().validate().unwrap().into();
        assert_eq!(stage.index(), 1);

        let stage: Stage = start().validate().unwrap().normalize().into();
        assert_eq!(stage.index(), 2);
    }

    #[test]
    fn pending_validation_error_via_advance() {
        let stage: Stage =
            Pipeline::new(RgbImage::new(0, 0), Roi::new(0, 1, 0, 1), PipelineConfig::default())
                .into();
        assert!(matches!(stage.advance(), Err(PipelineError::EmptyImage)));
    }
}
