//! Per-band color classification.
//!
//! For one band: convert to HSV, build a binary mask per configured
//! range, OR the masks of ranges sharing a class, clean each merged mask
//! with a morphological opening followed by a closing, count the
//! surviving pixels, and pick the class with the most pixels above the
//! floor.

use image::{GrayImage, Luma, RgbImage};
use imageproc::distance_transform::Norm;
use tracing::debug;

use crate::types::{BandClassification, ClassMask, ColorClass, HsvRange, PipelineConfig};

const SELECTED: u8 = 255;

/// Binary mask of the HSV pixels inside `range` (inclusive bounds).
#[must_use = "returns a new mask"]
pub fn range_mask(hsv: &RgbImage, range: &HsvRange) -> GrayImage {
    GrayImage::from_fn(hsv.width(), hsv.height(), |x, y| {
        Luma([if range.contains(hsv.get_pixel(x, y).0) { SELECTED } else { 0 }])
    })
}

/// Pixel-wise OR of two masks of equal dimensions.
#[must_use = "returns a new mask"]
pub fn union(a: &GrayImage, b: &GrayImage) -> GrayImage {
    GrayImage::from_fn(a.width(), a.height(), |x, y| {
        Luma([a.get_pixel(x, y).0[0] | b.get_pixel(x, y).0[0]])
    })
}

/// One merged mask per class that has at least one range, in
/// [`ColorClass::ALL`] order.
#[must_use]
pub fn class_masks(hsv: &RgbImage, ranges: &[HsvRange]) -> Vec<(ColorClass, GrayImage)> {
    ColorClass::ALL
        .into_iter()
        .filter_map(|class| {
            ranges
                .iter()
                .filter(|r| r.class == class)
                .map(|r| range_mask(hsv, r))
                .reduce(|acc, m| union(&acc, &m))
                .map(|mask| (class, mask))
        })
        .collect()
}

/// Opening then closing with a square `kernel_size x kernel_size`
/// structuring element.
///
/// Opening removes specks smaller than the element; closing fills small
/// holes. A kernel of 1 leaves the mask unchanged. Pixels outside the
/// image count as neither foreground nor background, so a fully
/// selected mask stays fully selected.
#[must_use = "returns a new mask"]
pub fn denoise(mask: &GrayImage, kernel_size: u8) -> GrayImage {
    let radius = kernel_size / 2;
    if radius == 0 {
        return mask.clone();
    }
    let opened = imageproc::morphology::open(mask, Norm::LInf, radius);
    imageproc::morphology::close(&opened, Norm::LInf, radius)
}

/// Number of selected pixels in a mask.
#[must_use]
pub fn count_pixels(mask: &GrayImage) -> u64 {
    mask.pixels().filter(|p| p.0[0] > 0).map(|_| 1).sum()
}

/// The class with the largest count strictly above `min_pixels`.
///
/// `counts` must be in precedence order: on a tie the earlier entry
/// wins. Returns `None` when no class clears the floor.
#[must_use]
pub fn pick_dominant(counts: &[(ColorClass, u64)], min_pixels: u32) -> Option<ColorClass> {
    let floor = u64::from(min_pixels);
    let mut best: Option<(ColorClass, u64)> = None;
    for &(class, count) in counts {
        if count <= floor {
            continue;
        }
        match best {
            Some((_, top)) if top >= count => {}
            _ => best = Some((class, count)),
        }
    }
    best.map(|(class, _)| class)
}

/// Classify one (normalized) band, keeping the cleaned masks.
#[must_use]
pub fn classify_band(band: &RgbImage, config: &PipelineConfig) -> BandClassification {
    let hsv = crate::color::to_hsv(band);
    let masks: Vec<ClassMask> = class_masks(&hsv, &config.hsv_ranges)
        .into_iter()
        .map(|(class, raw)| {
            let mask = denoise(&raw, config.morph_kernel_size);
            let pixel_count = count_pixels(&mask);
            ClassMask {
                class,
                mask,
                pixel_count,
            }
        })
        .collect();

    let counts: Vec<(ColorClass, u64)> = masks.iter().map(|m| (m.class, m.pixel_count)).collect();
    let dominant = pick_dominant(&counts, config.min_pixels);
    debug!(?counts, ?dominant, "classified band");

    BandClassification { masks, dominant }
}

/// Classify one band, returning only its vote.
#[must_use]
pub fn classify(band: &RgbImage, config: &PipelineConfig) -> Option<ColorClass> {
    classify_band(band, config).dominant
}

/// Classify every band, preserving band order.
///
/// With the `parallel` feature, bands are classified on the rayon
/// thread pool.
#[must_use]
pub fn classify_bands(bands: &[RgbImage], config: &PipelineConfig) -> Vec<BandClassification> {
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        bands
            .par_iter()
            .map(|band| classify_band(band, config))
            .collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        bands.iter().map(|band| classify_band(band, config)).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use image::Rgb;

    use super::*;
    use crate::color::hsv_to_rgb;

    fn hsv_image(width: u32, height: u32, hsv: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(width, height, Rgb(hsv))
    }

    fn config() -> PipelineConfig {
        PipelineConfig::default()
    }

    // --- range masks ---

    #[test]
    fn range_mask_selects_inside_pixels() {
        let mut hsv = hsv_image(3, 1, [0, 0, 0]);
        hsv.put_pixel(1, 0, Rgb([110, 200, 200]));
        let range = HsvRange::new("blue", ColorClass::Blue, [105, 50, 70], [115, 255, 255]);
        let mask = range_mask(&hsv, &range);
        assert_eq!(mask.get_pixel(0, 0).0, [0]);
        assert_eq!(mask.get_pixel(1, 0).0, [SELECTED]);
        assert_eq!(count_pixels(&mask), 1);
    }

    #[test]
    fn red_merges_both_hue_ends() {
        let hsv = RgbImage::from_fn(4, 1, |x, _| match x {
            0 => Rgb([2, 200, 200]),
            1 => Rgb([175, 200, 200]),
            _ => Rgb([60, 200, 200]),
        });
        let masks = class_masks(&hsv, &HsvRange::default_table());
        let (class, red) = masks.iter().find(|(c, _)| *c == ColorClass::Red).unwrap();
        assert_eq!(*class, ColorClass::Red);
        assert_eq!(count_pixels(red), 2);
    }

    #[test]
    fn class_masks_follow_precedence_order() {
        let hsv = hsv_image(2, 2, [0, 0, 0]);
        let classes: Vec<ColorClass> = class_masks(&hsv, &HsvRange::default_table())
            .into_iter()
            .map(|(c, _)| c)
            .collect();
        assert_eq!(classes, ColorClass::ALL.to_vec());
    }

    #[test]
    fn classes_without_ranges_are_skipped() {
        let hsv = hsv_image(2, 2, [0, 0, 0]);
        let ranges = vec![HsvRange::new("g", ColorClass::Green, [55, 40, 70], [95, 255, 255])];
        let masks = class_masks(&hsv, &ranges);
        assert_eq!(masks.len(), 1);
        assert_eq!(masks[0].0, ColorClass::Green);
    }

    // --- morphology ---

    #[test]
    fn opening_removes_isolated_speck() {
        let mut mask = GrayImage::new(9, 9);
        mask.put_pixel(4, 4, Luma([SELECTED]));
        assert_eq!(count_pixels(&denoise(&mask, 3)), 0);
    }

    #[test]
    fn closing_fills_pinhole() {
        let mut mask = GrayImage::from_pixel(9, 9, Luma([SELECTED]));
        mask.put_pixel(4, 4, Luma([0]));
        assert_eq!(count_pixels(&denoise(&mask, 3)), 81);
    }

    #[test]
    fn full_mask_survives_denoise() {
        let mask = GrayImage::from_pixel(20, 20, Luma([SELECTED]));
        assert_eq!(count_pixels(&denoise(&mask, 3)), 400);
    }

    #[test]
    fn kernel_of_one_is_identity() {
        let mut mask = GrayImage::new(5, 5);
        mask.put_pixel(2, 2, Luma([SELECTED]));
        assert_eq!(denoise(&mask, 1), mask);
    }

    // --- pick ---

    #[test]
    fn pick_requires_strictly_more_than_floor() {
        let counts = [(ColorClass::Green, 20)];
        assert_eq!(pick_dominant(&counts, 20), None);
        let counts = [(ColorClass::Green, 21)];
        assert_eq!(pick_dominant(&counts, 20), Some(ColorClass::Green));
    }

    #[test]
    fn pick_largest_count() {
        let counts = [
            (ColorClass::Magenta, 30),
            (ColorClass::Blue, 25),
            (ColorClass::Yellow, 90),
        ];
        assert_eq!(pick_dominant(&counts, 20), Some(ColorClass::Yellow));
    }

    #[test]
    fn pick_tie_goes_to_earlier_class() {
        let counts = [
            (ColorClass::Magenta, 0),
            (ColorClass::Blue, 400),
            (ColorClass::Red, 0),
            (ColorClass::Purple, 400),
        ];
        assert_eq!(pick_dominant(&counts, 20), Some(ColorClass::Blue));
    }

    #[test]
    fn pick_empty_is_none() {
        assert_eq!(pick_dominant(&[], 0), None);
    }

    // --- whole band ---

    #[test]
    fn uniform_green_band_votes_green() {
        let band = RgbImage::from_pixel(20, 20, Rgb(hsv_to_rgb([70, 200, 200])));
        let result = classify_band(&band, &config());
        assert_eq!(result.dominant, Some(ColorClass::Green));
        assert_eq!(result.mask(ColorClass::Green).unwrap().pixel_count, 400);
    }

    #[test]
    fn blue_beats_overlapping_purple_on_tie() {
        // Hue 110 is inside both the blue and the low purple range.
        let band = RgbImage::from_pixel(20, 20, Rgb(hsv_to_rgb([110, 200, 200])));
        let result = classify_band(&band, &config());
        let counts = result.counts();
        let blue = counts.iter().find(|(c, _)| *c == ColorClass::Blue).unwrap().1;
        let purple = counts.iter().find(|(c, _)| *c == ColorClass::Purple).unwrap().1;
        assert_eq!(blue, purple);
        assert_eq!(result.dominant, Some(ColorClass::Blue));
    }

    #[test]
    fn black_band_has_no_vote() {
        let band = RgbImage::from_pixel(20, 20, Rgb([0, 0, 0]));
        assert_eq!(classify(&band, &config()), None);
    }

    #[test]
    fn small_patch_below_floor_has_no_vote() {
        // A 4x4 yellow patch (16 pixels) on black survives morphology but
        // stays under the default floor of 20.
        let yellow = Rgb(hsv_to_rgb([30, 200, 200]));
        let band = RgbImage::from_fn(20, 20, |x, y| {
            if (8..12).contains(&x) && (8..12).contains(&y) {
                yellow
            } else {
                Rgb([0, 0, 0])
            }
        });
        let result = classify_band(&band, &config());
        assert_eq!(result.mask(ColorClass::Yellow).unwrap().pixel_count, 16);
        assert_eq!(result.dominant, None);
    }

    #[test]
    fn classify_bands_preserves_order() {
        let bands = vec![
            RgbImage::from_pixel(10, 10, Rgb(hsv_to_rgb([70, 200, 200]))),
            RgbImage::from_pixel(10, 10, Rgb([0, 0, 0])),
            RgbImage::from_pixel(10, 10, Rgb(hsv_to_rgb([95, 200, 200]))),
        ];
        let votes: Vec<Option<ColorClass>> = classify_bands(&bands, &config())
            .into_iter()
            .map(|b| b.dominant)
            .collect();
        assert_eq!(
            votes,
            vec![Some(ColorClass::Green), None, Some(ColorClass::Magenta)]
        );
    }
}
