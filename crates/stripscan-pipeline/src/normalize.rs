//! Color-space normalization ahead of classification.
//!
//! Two steps, always applied to the whole image before the region of
//! interest is cropped:
//!
//! 1. saturation/value boost in HSV ([`boost_saturation_value`]), which
//!    pushes washed-out strip colors into the acceptance ranges;
//! 2. CLAHE on the L\* channel of L\*a\*b\* ([`equalize_lightness`]),
//!    which evens out uneven lighting while leaving chroma untouched.

use image::{GrayImage, Luma, Rgb, RgbImage};

use crate::color;

/// Add `boost` to the saturation and value of every pixel.
///
/// Both channels saturate at 255. Hue is unchanged. `boost == 0` still
/// round-trips through HSV, so channels may shift by a rounding step.
#[must_use = "returns a new boosted image"]
pub fn boost_saturation_value(image: &RgbImage, boost: u8) -> RgbImage {
    color::map_pixels(image, |rgb| {
        let [h, s, v] = color::rgb_to_hsv(rgb);
        color::hsv_to_rgb([h, s.saturating_add(boost), v.saturating_add(boost)])
    })
}

/// Equalize lightness with CLAHE, keeping the a\* and b\* channels.
#[must_use = "returns a new equalized image"]
pub fn equalize_lightness(image: &RgbImage, clip_limit: f32, tile_grid: u32) -> RgbImage {
    let (width, height) = image.dimensions();
    let lab = color::map_pixels(image, color::rgb_to_lab);
    let lightness = GrayImage::from_fn(width, height, |x, y| Luma([lab.get_pixel(x, y).0[0]]));
    let equalized = crate::clahe::equalize(&lightness, clip_limit, tile_grid);

    RgbImage::from_fn(width, height, |x, y| {
        let [_, a, b] = lab.get_pixel(x, y).0;
        let l = equalized.get_pixel(x, y).0[0];
        Rgb(color::lab_to_rgb([l, a, b]))
    })
}

/// Boost, then equalize. Output has the input's dimensions.
#[must_use = "returns a new normalized image"]
pub fn normalize(image: &RgbImage, boost: u8, clip_limit: f32, tile_grid: u32) -> RgbImage {
    let boosted = boost_saturation_value(image, boost);
    equalize_lightness(&boosted, clip_limit, tile_grid)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn boost_raises_saturation_and_value() {
        let image = RgbImage::from_pixel(2, 2, Rgb([43, 95, 200]));
        let boosted = boost_saturation_value(&image, 20);
        let [h0, s0, v0] = color::rgb_to_hsv([43, 95, 200]);
        let [h1, s1, v1] = color::rgb_to_hsv(boosted.get_pixel(0, 0).0);
        assert!(h0.abs_diff(h1) <= 1);
        assert!(s1 >= s0 + 18, "saturation {s0} -> {s1}");
        assert!(v1 >= v0 + 18, "value {v0} -> {v1}");
    }

    #[test]
    fn boost_saturates_at_255() {
        let image = RgbImage::from_pixel(1, 1, Rgb([255, 0, 0]));
        let boosted = boost_saturation_value(&image, 200);
        assert_eq!(boosted.get_pixel(0, 0).0, [255, 0, 0]);
    }

    #[test]
    fn boosted_black_stays_dark_and_dull() {
        let image = RgbImage::from_pixel(1, 1, Rgb([0, 0, 0]));
        let boosted = boost_saturation_value(&image, 20);
        let [_, s, v] = color::rgb_to_hsv(boosted.get_pixel(0, 0).0);
        assert!(s < 30, "saturation {s}");
        assert!(v <= 20, "value {v}");
    }

    #[test]
    fn equalize_preserves_dimensions() {
        let image = RgbImage::from_fn(33, 17, |x, y| Rgb([(x * 7) as u8, (y * 5) as u8, 90]));
        assert_eq!(equalize_lightness(&image, 3.0, 8).dimensions(), (33, 17));
    }

    #[test]
    fn normalize_keeps_blue_in_blue_hue_band() {
        let image = RgbImage::from_pixel(20, 100, Rgb(color::hsv_to_rgb([110, 200, 200])));
        let normalized = normalize(&image, 20, 3.0, 8);
        for pixel in normalized.pixels() {
            let [h, s, v] = color::rgb_to_hsv(pixel.0);
            assert!((105..=115).contains(&h), "hue {h}");
            assert!(s >= 50);
            assert!(v >= 70);
        }
    }

    #[test]
    fn normalize_is_deterministic() {
        let image = RgbImage::from_fn(24, 24, |x, y| Rgb([(x * 10) as u8, (y * 10) as u8, 128]));
        let a = normalize(&image, 20, 3.0, 8);
        let b = normalize(&image, 20, 3.0, 8);
        assert_eq!(a.as_raw(), b.as_raw());
    }
}
