//! Region-of-interest crop and horizontal band split.

use image::RgbImage;
use image::imageops::crop_imm;

use crate::types::{PipelineError, Roi};

/// Copy the pixels inside `roi` out of `image`.
///
/// The caller validates `roi` against the image first; `crop_imm`
/// would otherwise silently clamp it.
#[must_use = "returns the cropped region"]
pub fn crop(image: &RgbImage, roi: Roi) -> RgbImage {
    crop_imm(image, roi.col_start, roi.row_start, roi.width(), roi.height()).to_image()
}

/// Height of each band when `height` rows are split `band_count` ways.
///
/// Integer division: the last `height % band_count` rows are dropped.
#[must_use]
pub const fn band_height(height: u32, band_count: u32) -> u32 {
    if band_count == 0 { 0 } else { height / band_count }
}

/// Split `region` into `band_count` equal-height horizontal bands, top
/// to bottom, each spanning the full width.
///
/// Band `i` covers rows `i * h .. (i + 1) * h` where
/// `h = height / band_count`. Trailing rows that do not fill a band are
/// excluded.
///
/// # Errors
///
/// Returns [`PipelineError::InvalidConfig`] if `band_count` is zero or
/// greater than the region height.
pub fn split(region: &RgbImage, band_count: u32) -> Result<Vec<RgbImage>, PipelineError> {
    let (width, height) = region.dimensions();
    if band_count == 0 || band_count > height {
        return Err(PipelineError::InvalidConfig(format!(
            "cannot split a region of height {height} into {band_count} bands"
        )));
    }
    let rows = band_height(height, band_count);
    Ok((0..band_count)
        .map(|i| crop_imm(region, 0, i * rows, width, rows).to_image())
        .collect())
}
