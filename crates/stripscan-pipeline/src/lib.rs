//! stripscan-pipeline: Pure test-strip color classification (sans-IO).
//!
//! Turns a decoded photo of a pH test strip into a pH reading through:
//! validate -> normalize -> crop -> split into bands -> classify each
//! band -> majority vote -> pH lookup -> risk level.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! RGB rasters and returns structured data. Decoding files and printing
//! reports lives in `stripscan-bench`.

pub mod aggregate;
pub mod clahe;
pub mod classify;
pub mod color;
pub mod diagnostics;
pub mod normalize;
pub mod pipeline;
pub mod resolve;
pub mod risk;
pub mod segment;
pub mod types;

pub use diagnostics::{Clock, PipelineDiagnostics, process_staged_with_diagnostics};
pub use pipeline::Pipeline;
pub use risk::RiskLevel;
pub use types::{
    BandClassification, ClassMask, ClassificationResult, ColorClass, Dimensions, GrayImage,
    HsvRange, PipelineConfig, PipelineError, RgbImage, Roi, StagedResult,
};

/// Check an image, region and configuration before processing.
///
/// Checks run in order and the first failure is returned: image area,
/// region bounds, configuration fields, then the band count against the
/// region height.
///
/// # Errors
///
/// Returns [`PipelineError::EmptyImage`] if the image has zero area.
/// Returns [`PipelineError::InvalidInput`] if the region is empty or
/// extends past the image.
/// Returns [`PipelineError::InvalidConfig`] if a config field is out of
/// range or `band_count` exceeds the region height.
pub fn validate(image: &RgbImage, roi: Roi, config: &PipelineConfig) -> Result<(), PipelineError> {
    let dimensions = Dimensions::of(image);
    if dimensions.is_empty() {
        return Err(PipelineError::EmptyImage);
    }
    roi.validate(dimensions)?;
    config.validate()?;
    config.validate_band_count(roi.height())
}

/// Run the full classification pipeline.
///
/// # Pipeline steps
///
/// 1. Validate the image, region and config
/// 2. Boost saturation/value and equalize lightness (whole image)
/// 3. Crop the region of interest
/// 4. Split the region into horizontal bands
/// 5. Classify each band by HSV range masks
/// 6. Majority vote across bands
/// 7. Look up the pH, finding and risk level
///
/// A strip where no band reaches the pixel threshold is not an error:
/// the result carries no dominant color and an unknown pH.
///
/// # Errors
///
/// See [`validate`]. Nothing after validation fails.
pub fn process(
    image: &RgbImage,
    roi: Roi,
    config: &PipelineConfig,
) -> Result<ClassificationResult, PipelineError> {
    validate(image, roi, config)?;

    let normalized = normalize::normalize(
        image,
        config.boost,
        config.clahe_clip_limit,
        config.clahe_tile_grid,
    );
    let region = segment::crop(&normalized, roi);
    let bands = segment::split(&region, config.band_count)?;

    let votes: Vec<Option<ColorClass>> = classify::classify_bands(&bands, config)
        .into_iter()
        .map(|band| band.dominant)
        .collect();
    let dominant = aggregate::aggregate(&votes);

    Ok(ClassificationResult::from_dominant(dominant))
}

/// Run the full pipeline, keeping every intermediate raster.
///
/// Same result as [`process`], plus the normalized image, cropped
/// region, bands and per-band masks for inspection.
///
/// # Errors
///
/// See [`validate`].
pub fn process_staged(
    image: &RgbImage,
    roi: Roi,
    config: &PipelineConfig,
) -> Result<StagedResult, PipelineError> {
    Ok(Pipeline::new(image.clone(), roi, config.clone())
        .validate()?
        .normalize()
        .split()?
        .classify()
        .aggregate()
        .resolve()
        .into_result())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::color::hsv_to_rgb;

    /// A strip of one solid HSV color.
    fn solid(width: u32, height: u32, hsv: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(width, height, image::Rgb(hsv_to_rgb(hsv)))
    }

    fn full(image: &RgbImage) -> Roi {
        Roi::full(Dimensions::of(image))
    }

    #[test]
    fn process_empty_image() {
        let image = RgbImage::new(0, 0);
        let result = process(&image, Roi::new(0, 0, 0, 0), &PipelineConfig::default());
        assert!(matches!(result, Err(PipelineError::EmptyImage)));
    }

    #[test]
    fn validate_checks_region_before_config() {
        let image = solid(20, 100, [110, 200, 200]);
        let config = PipelineConfig {
            band_count: 0,
            ..PipelineConfig::default()
        };
        let result = validate(&image, Roi::new(0, 101, 0, 20), &config);
        assert!(matches!(result, Err(PipelineError::InvalidInput(_))));
    }

    #[test]
    fn validate_rejects_too_many_bands() {
        let image = solid(20, 10, [110, 200, 200]);
        let config = PipelineConfig {
            band_count: 11,
            ..PipelineConfig::default()
        };
        let result = validate(&image, full(&image), &config);
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));

        let config = PipelineConfig {
            band_count: 10,
            ..PipelineConfig::default()
        };
        assert!(validate(&image, full(&image), &config).is_ok());
    }

    #[test]
    fn process_blue_strip() {
        let image = solid(20, 100, [110, 200, 200]);
        let result = process(&image, full(&image), &PipelineConfig::default()).unwrap();
        assert_eq!(result.dominant_color, Some(ColorClass::Blue));
        assert_eq!(result.ph, Some(8.0));
        assert_eq!(result.message, "Neutral — generally normal");
        assert_eq!(result.risk, RiskLevel::Unknown);
    }

    #[test]
    fn process_black_strip_has_no_reading() {
        let image = RgbImage::new(20, 100);
        let result = process(&image, full(&image), &PipelineConfig::default()).unwrap();
        assert_eq!(result.dominant_color, None);
        assert_eq!(result.ph, None);
        assert_eq!(result.message, crate::resolve::UNKNOWN_MESSAGE);
    }

    #[test]
    fn process_matches_staged() {
        let image = solid(20, 100, [70, 200, 200]);
        let roi = full(&image);
        let config = PipelineConfig::default();
        let plain = process(&image, roi, &config).unwrap();
        let staged = process_staged(&image, roi, &config).unwrap();
        assert_eq!(plain, staged.result);
        assert_eq!(staged.bands.len(), 5);
        assert_eq!(staged.votes.len(), 5);
    }
}
