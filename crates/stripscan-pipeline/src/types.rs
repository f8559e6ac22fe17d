//! Shared types for the stripscan classification pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::risk::RiskLevel;

/// Re-export `GrayImage` so downstream crates can reference binary
/// class masks without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` so downstream crates can hand decoded pixels to
/// the pipeline without depending on `image` directly.
pub use image::RgbImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Dimensions of an image buffer.
    #[must_use]
    pub fn of(image: &RgbImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
        }
    }

    /// Returns `true` if either side is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Total pixel count.
    #[must_use]
    pub fn pixel_count(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Rectangular region of interest inside an image.
///
/// Bounds are half-open: rows `row_start..row_end` and columns
/// `col_start..col_end`. A valid ROI has non-zero area and lies fully
/// inside the image; see [`Roi::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roi {
    /// First row (inclusive).
    pub row_start: u32,
    /// Last row (exclusive).
    pub row_end: u32,
    /// First column (inclusive).
    pub col_start: u32,
    /// Last column (exclusive).
    pub col_end: u32,
}

impl Roi {
    /// Create a region from its row and column bounds.
    #[must_use]
    pub const fn new(row_start: u32, row_end: u32, col_start: u32, col_end: u32) -> Self {
        Self {
            row_start,
            row_end,
            col_start,
            col_end,
        }
    }

    /// The region covering an entire image.
    #[must_use]
    pub const fn full(dimensions: Dimensions) -> Self {
        Self::new(0, dimensions.height, 0, dimensions.width)
    }

    /// Region height in rows (zero for inverted bounds).
    #[must_use]
    pub const fn height(self) -> u32 {
        self.row_end.saturating_sub(self.row_start)
    }

    /// Region width in columns (zero for inverted bounds).
    #[must_use]
    pub const fn width(self) -> u32 {
        self.col_end.saturating_sub(self.col_start)
    }

    /// Check that the region is non-degenerate and inside `dimensions`.
    ///
    /// Out-of-range regions are rejected rather than clamped.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidInput`] if the region has zero
    /// area or extends past the image bounds.
    pub fn validate(self, dimensions: Dimensions) -> Result<(), PipelineError> {
        if self.row_start >= self.row_end || self.col_start >= self.col_end {
            return Err(PipelineError::InvalidInput(format!(
                "region of interest {self} has zero area"
            )));
        }
        if self.row_end > dimensions.height || self.col_end > dimensions.width {
            return Err(PipelineError::InvalidInput(format!(
                "region of interest {self} exceeds image bounds {}x{}",
                dimensions.width, dimensions.height,
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Roi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rows {}..{}, cols {}..{}",
            self.row_start, self.row_end, self.col_start, self.col_end,
        )
    }
}

/// A named color class a test strip band can be classified as.
///
/// Declaration order is the tie-break precedence: when two classes have
/// the same (maximal) pixel count in a band, the one declared first
/// wins. [`ColorClass::ALL`] iterates in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorClass {
    /// Hue around 180-200 degrees (`H` 90-100 in 8-bit units).
    Magenta,
    /// Hue around 210-230 degrees.
    Blue,
    /// Hue wrapping around 0 degrees.
    Red,
    /// Hue around 50-110 degrees.
    Yellow,
    /// Hue around 110-190 degrees.
    Green,
    /// Hue around 220-330 degrees.
    Purple,
}

impl ColorClass {
    /// Every class, in tie-break precedence order.
    pub const ALL: [Self; 6] = [
        Self::Magenta,
        Self::Blue,
        Self::Red,
        Self::Yellow,
        Self::Green,
        Self::Purple,
    ];

    /// Lowercase name of the class.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Magenta => "magenta",
            Self::Blue => "blue",
            Self::Red => "red",
            Self::Yellow => "yellow",
            Self::Green => "green",
            Self::Purple => "purple",
        }
    }

    /// Position in [`ColorClass::ALL`].
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ColorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One primitive HSV acceptance range.
///
/// Bounds are inclusive on every channel. Hue is in 8-bit units
/// (degrees / 2, `0..=180`); saturation and value are `0..=255`.
/// Several ranges may share a [`ColorClass`]; their masks are merged
/// with a logical OR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvRange {
    /// Identifier used in diagnostics (e.g. `"red-low"`).
    pub name: String,
    /// Class this range contributes to.
    pub class: ColorClass,
    /// Inclusive lower `[H, S, V]` bound.
    pub lower: [u8; 3],
    /// Inclusive upper `[H, S, V]` bound.
    pub upper: [u8; 3],
}

impl HsvRange {
    /// Create a range from its name, class, and inclusive bounds.
    #[must_use]
    pub fn new(name: impl Into<String>, class: ColorClass, lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self {
            name: name.into(),
            class,
            lower,
            upper,
        }
    }

    /// Whether an `[H, S, V]` pixel falls within every channel bound.
    #[must_use]
    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        hsv.iter()
            .zip(self.lower.iter().zip(self.upper.iter()))
            .all(|(&c, (&lo, &hi))| lo <= c && c <= hi)
    }

    /// The ten canonical ranges.
    ///
    /// Red, yellow, green and purple each span two hue intervals;
    /// magenta and blue have one. Saturation and value are unbounded
    /// above.
    #[must_use]
    pub fn default_table() -> Vec<Self> {
        use ColorClass::{Blue, Green, Magenta, Purple, Red, Yellow};
        vec![
            Self::new("red-low", Red, [0, 30, 80], [5, 255, 255]),
            Self::new("red-high", Red, [170, 30, 80], [180, 255, 255]),
            Self::new("magenta", Magenta, [90, 30, 70], [100, 255, 255]),
            Self::new("purple-low", Purple, [110, 30, 70], [145, 255, 255]),
            Self::new("purple-high", Purple, [146, 30, 70], [165, 255, 255]),
            Self::new("blue", Blue, [105, 50, 70], [115, 255, 255]),
            Self::new("green-low", Green, [55, 40, 70], [74, 255, 255]),
            Self::new("green-high", Green, [75, 40, 70], [95, 255, 255]),
            Self::new("yellow-low", Yellow, [45, 30, 70], [54, 255, 255]),
            Self::new("yellow-high", Yellow, [25, 30, 70], [44, 255, 255]),
        ]
    }
}

/// Configuration for the classification pipeline.
///
/// Every numeric knob is named here with one canonical default. Call
/// [`PipelineConfig::validate`] to check the image-independent
/// constraints; the band count is checked against the region height
/// once the region is known.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Additive offset applied (saturating) to the saturation and value
    /// channels before contrast equalization.
    pub boost: u8,

    /// CLAHE clip limit, relative to a flat histogram.
    pub clahe_clip_limit: f32,

    /// CLAHE grid size: the image is divided into
    /// `clahe_tile_grid x clahe_tile_grid` tiles. At most
    /// [`PipelineConfig::MAX_CLAHE_TILE_GRID`].
    pub clahe_tile_grid: u32,

    /// Side length of the square structuring element used for mask
    /// opening and closing. Must be odd; `1` disables morphology.
    pub morph_kernel_size: u8,

    /// A class must have strictly more than this many mask pixels in a
    /// band to be considered.
    pub min_pixels: u32,

    /// Number of equal-height horizontal bands the region is split into.
    pub band_count: u32,

    /// HSV acceptance ranges. Ranges sharing a class are OR-merged.
    pub hsv_ranges: Vec<HsvRange>,
}

impl PipelineConfig {
    /// Default saturation/value boost.
    pub const DEFAULT_BOOST: u8 = 20;
    /// Default CLAHE clip limit.
    pub const DEFAULT_CLAHE_CLIP_LIMIT: f32 = 3.0;
    /// Default CLAHE grid size.
    pub const DEFAULT_CLAHE_TILE_GRID: u32 = 8;
    /// Largest accepted CLAHE grid size.
    pub const MAX_CLAHE_TILE_GRID: u32 = 64;
    /// Default structuring element size.
    pub const DEFAULT_MORPH_KERNEL_SIZE: u8 = 3;
    /// Default minimum pixel floor.
    pub const DEFAULT_MIN_PIXELS: u32 = 20;
    /// Default band count.
    pub const DEFAULT_BAND_COUNT: u32 = 5;

    /// Check the constraints that do not depend on the input image.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] describing the first
    /// violated constraint.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.band_count == 0 {
            return Err(PipelineError::InvalidConfig(
                "band_count must be at least 1".to_string(),
            ));
        }
        if !(self.clahe_clip_limit.is_finite() && self.clahe_clip_limit > 0.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "clahe_clip_limit must be finite and positive, got {}",
                self.clahe_clip_limit,
            )));
        }
        if !(1..=Self::MAX_CLAHE_TILE_GRID).contains(&self.clahe_tile_grid) {
            return Err(PipelineError::InvalidConfig(format!(
                "clahe_tile_grid must be between 1 and {}, got {}",
                Self::MAX_CLAHE_TILE_GRID,
                self.clahe_tile_grid,
            )));
        }
        if self.morph_kernel_size % 2 == 0 {
            return Err(PipelineError::InvalidConfig(format!(
                "morph_kernel_size must be odd, got {}",
                self.morph_kernel_size,
            )));
        }
        if self.hsv_ranges.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "hsv_ranges must not be empty".to_string(),
            ));
        }
        for range in &self.hsv_ranges {
            let inverted = range.lower.iter().zip(&range.upper).any(|(lo, hi)| lo > hi);
            if inverted || range.upper[0] > 180 {
                return Err(PipelineError::InvalidConfig(format!(
                    "hsv range {:?} has invalid bounds {:?}..={:?}",
                    range.name, range.lower, range.upper,
                )));
            }
        }
        Ok(())
    }

    /// Check that the band count fits a region of `roi_height` rows.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the count is zero or
    /// would produce zero-height bands.
    pub fn validate_band_count(&self, roi_height: u32) -> Result<(), PipelineError> {
        if self.band_count == 0 || self.band_count > roi_height {
            return Err(PipelineError::InvalidConfig(format!(
                "band_count {} must be between 1 and the region height {roi_height}",
                self.band_count,
            )));
        }
        Ok(())
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            boost: Self::DEFAULT_BOOST,
            clahe_clip_limit: Self::DEFAULT_CLAHE_CLIP_LIMIT,
            clahe_tile_grid: Self::DEFAULT_CLAHE_TILE_GRID,
            morph_kernel_size: Self::DEFAULT_MORPH_KERNEL_SIZE,
            min_pixels: Self::DEFAULT_MIN_PIXELS,
            band_count: Self::DEFAULT_BAND_COUNT,
            hsv_ranges: HsvRange::default_table(),
        }
    }
}

/// Final outcome of one pipeline run.
///
/// `dominant_color == None` is the "no confident classification"
/// outcome: it resolves to an unknown pH and the default message and is
/// not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Winning color across all bands, if any band was confident.
    pub dominant_color: Option<ColorClass>,
    /// pH for the winning color; `None` means unknown.
    pub ph: Option<f64>,
    /// Human-readable finding for the pH.
    pub message: String,
    /// Risk level derived from the pH.
    pub risk: RiskLevel,
}

impl ClassificationResult {
    /// Resolve a (possibly absent) dominant color into a full result.
    #[must_use]
    pub fn from_dominant(color: Option<ColorClass>) -> Self {
        let resolution = crate::resolve::resolve(color);
        Self {
            dominant_color: color,
            ph: resolution.ph,
            message: resolution.message.to_string(),
            risk: RiskLevel::from_ph(resolution.ph),
        }
    }
}

/// The cleaned mask of one merged color class within one band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassMask {
    /// Class the mask selects.
    pub class: ColorClass,
    /// Binary mask after opening and closing: 255 selected, 0 not.
    #[serde(with = "raster_serde")]
    pub mask: GrayImage,
    /// Number of selected pixels in `mask`.
    pub pixel_count: u64,
}

impl ClassMask {
    /// Keep only the pixels of `band` selected by this mask.
    ///
    /// Unselected pixels become black. `band` must have the mask's
    /// dimensions; pixels outside the mask are treated as unselected.
    #[must_use]
    pub fn segment(&self, band: &RgbImage) -> RgbImage {
        RgbImage::from_fn(band.width(), band.height(), |x, y| {
            let selected = x < self.mask.width()
                && y < self.mask.height()
                && self.mask.get_pixel(x, y).0[0] > 0;
            if selected {
                *band.get_pixel(x, y)
            } else {
                image::Rgb([0, 0, 0])
            }
        })
    }
}

/// Classification of a single band.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BandClassification {
    /// One cleaned mask per merged class, in [`ColorClass::ALL`] order.
    /// Classes with no configured range are absent.
    pub masks: Vec<ClassMask>,
    /// Winning class, or `None` if no class passed the pixel floor.
    pub dominant: Option<ColorClass>,
}

impl BandClassification {
    /// `(class, pixel_count)` pairs in mask order.
    #[must_use]
    pub fn counts(&self) -> Vec<(ColorClass, u64)> {
        self.masks.iter().map(|m| (m.class, m.pixel_count)).collect()
    }

    /// The mask for `class`, if that class was segmented.
    #[must_use]
    pub fn mask(&self, class: ColorClass) -> Option<&ClassMask> {
        self.masks.iter().find(|m| m.class == class)
    }
}

/// Result of running the pipeline with all intermediate outputs kept.
///
/// Lets a caller build its own visualization of every band without the
/// pipeline depending on any plotting capability. Raster fields are
/// serialized as `(width, height, raw_bytes)` tuples.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagedResult {
    /// The caller's image, untouched.
    #[serde(with = "raster_serde")]
    pub original: RgbImage,
    /// Region of interest that was classified.
    pub roi: Roi,
    /// Whole image after saturation/value boost and contrast equalization.
    #[serde(with = "raster_serde")]
    pub normalized: RgbImage,
    /// The normalized image cropped to `roi`.
    #[serde(with = "raster_serde")]
    pub region: RgbImage,
    /// Horizontal bands of `region`, top to bottom.
    #[serde(with = "raster_serde::vec")]
    pub bands: Vec<RgbImage>,
    /// Per-band masks and vote, parallel to `bands`.
    pub classifications: Vec<BandClassification>,
    /// Per-band votes, parallel to `bands`.
    pub votes: Vec<Option<ColorClass>>,
    /// Final resolved result.
    pub result: ClassificationResult,
}

impl StagedResult {
    /// Source image dimensions.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        Dimensions::of(&self.original)
    }

    /// Segmented image of `class` within band `index`: the band with
    /// every pixel outside the class mask blacked out.
    #[must_use]
    pub fn segmented(&self, index: usize, class: ColorClass) -> Option<RgbImage> {
        let band = self.bands.get(index)?;
        let mask = self.classifications.get(index)?.mask(class)?;
        Some(mask.segment(band))
    }
}

/// Serde support for 8-bit image buffers as `(width, height, raw_bytes)`.
///
/// `image::ImageBuffer` does not implement serde traits.
mod raster_serde {
    use image::{ImageBuffer, Pixel};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    type Raster<P> = ImageBuffer<P, Vec<u8>>;

    pub fn serialize<P, S>(image: &Raster<P>, serializer: S) -> Result<S::Ok, S::Error>
    where
        P: Pixel<Subpixel = u8>,
        S: Serializer,
    {
        (image.width(), image.height(), image.as_raw()).serialize(serializer)
    }

    pub fn deserialize<'de, P, D>(deserializer: D) -> Result<Raster<P>, D::Error>
    where
        P: Pixel<Subpixel = u8>,
        D: Deserializer<'de>,
    {
        let (width, height, raw) = <(u32, u32, Vec<u8>)>::deserialize(deserializer)?;
        ImageBuffer::from_raw(width, height, raw)
            .ok_or_else(|| serde::de::Error::custom("raster bytes do not match dimensions"))
    }

    pub mod vec {
        use image::{ImageBuffer, Pixel};
        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        use super::Raster;

        pub fn serialize<P, S>(images: &[Raster<P>], serializer: S) -> Result<S::Ok, S::Error>
        where
            P: Pixel<Subpixel = u8>,
            S: Serializer,
        {
            images
                .iter()
                .map(|image| (image.width(), image.height(), image.as_raw()))
                .collect::<Vec<_>>()
                .serialize(serializer)
        }

        pub fn deserialize<'de, P, D>(deserializer: D) -> Result<Vec<Raster<P>>, D::Error>
        where
            P: Pixel<Subpixel = u8>,
            D: Deserializer<'de>,
        {
            let raw = <Vec<(u32, u32, Vec<u8>)>>::deserialize(deserializer)?;
            raw.into_iter()
                .map(|(width, height, bytes)| {
                    ImageBuffer::from_raw(width, height, bytes).ok_or_else(|| {
                        serde::de::Error::custom("raster bytes do not match dimensions")
                    })
                })
                .collect()
        }
    }
}

/// Errors that can occur before or during classification.
///
/// A band or image with no confident color is *not* an error; it flows
/// through as `None` and resolves to an unknown pH.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum PipelineError {
    /// Invalid input: the image has zero width or height.
    #[error("invalid input: image has zero area")]
    EmptyImage,

    /// The region of interest is degenerate or outside the image.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Pipeline configuration is invalid.
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfig(String),
}
