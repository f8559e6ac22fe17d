//! 8-bit color space conversions.
//!
//! HSV uses the compact 8-bit convention: hue is degrees / 2 in
//! `0..=180`, saturation and value are `0..=255`. Lab is encoded as
//! `L * 255 / 100`, `a + 128`, `b + 128` so every channel fits a byte.
//! Lab math (D65 white point, sRGB companding) is delegated to `palette`.

use image::{Rgb, RgbImage};
use palette::{FromColor, Lab, Srgb};

/// Convert an `[R, G, B]` pixel to 8-bit `[H, S, V]`.
#[must_use = "returns the converted pixel"]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn rgb_to_hsv([r, g, b]: [u8; 3]) -> [u8; 3] {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = f32::from(max - min);
    let (rf, gf, bf) = (f32::from(r), f32::from(g), f32::from(b));

    let degrees = if max == min {
        0.0
    } else if max == r {
        60.0 * (gf - bf) / delta
    } else if max == g {
        60.0 * ((bf - rf) / delta + 2.0)
    } else {
        60.0 * ((rf - gf) / delta + 4.0)
    };
    let degrees = if degrees < 0.0 { degrees + 360.0 } else { degrees };

    let saturation = if max == 0 {
        0.0
    } else {
        delta / f32::from(max)
    };

    let hue = (degrees / 2.0).round().clamp(0.0, 180.0) as u8;
    [hue, unit_to_u8(saturation), max]
}

/// Convert an 8-bit `[H, S, V]` pixel back to `[R, G, B]`.
#[must_use = "returns the converted pixel"]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn hsv_to_rgb([h, s, v]: [u8; 3]) -> [u8; 3] {
    if s == 0 {
        return [v, v, v];
    }
    let value = f32::from(v) / 255.0;
    let saturation = f32::from(s) / 255.0;
    let sector = (f32::from(h) * 2.0 / 60.0) % 6.0;
    let index = sector.floor();
    let fraction = sector - index;

    let p = value * (1.0 - saturation);
    let q = value * (1.0 - saturation * fraction);
    let t = value * (1.0 - saturation * (1.0 - fraction));

    let (r, g, b) = match index as u8 {
        0 => (value, t, p),
        1 => (q, value, p),
        2 => (p, value, t),
        3 => (p, q, value),
        4 => (t, p, value),
        _ => (value, p, q),
    };
    [unit_to_u8(r), unit_to_u8(g), unit_to_u8(b)]
}

/// Convert an `[R, G, B]` pixel to 8-bit `[L, a, b]`.
#[must_use = "returns the converted pixel"]
pub fn rgb_to_lab([r, g, b]: [u8; 3]) -> [u8; 3] {
    let lab: Lab = Lab::from_color(Srgb::<u8>::new(r, g, b).into_format::<f32>());
    [
        clamp_to_u8(lab.l * 255.0 / 100.0),
        clamp_to_u8(lab.a + 128.0),
        clamp_to_u8(lab.b + 128.0),
    ]
}

/// Convert an 8-bit `[L, a, b]` pixel back to `[R, G, B]`.
///
/// Out-of-gamut colors are clamped to the sRGB cube.
#[must_use = "returns the converted pixel"]
pub fn lab_to_rgb([l, a, b]: [u8; 3]) -> [u8; 3] {
    let lab: Lab = Lab::new(
        f32::from(l) * 100.0 / 255.0,
        f32::from(a) - 128.0,
        f32::from(b) - 128.0,
    );
    let rgb: Srgb = Srgb::from_color(lab);
    [
        unit_to_u8(rgb.red),
        unit_to_u8(rgb.green),
        unit_to_u8(rgb.blue),
    ]
}

/// Apply a per-pixel conversion to every pixel of an RGB buffer.
#[must_use = "returns a new image"]
pub fn map_pixels(image: &RgbImage, convert: impl Fn([u8; 3]) -> [u8; 3]) -> RgbImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        *pixel = Rgb(convert(pixel.0));
    }
    out
}

/// Whole-image RGB to HSV.
#[must_use = "returns a new image"]
pub fn to_hsv(image: &RgbImage) -> RgbImage {
    map_pixels(image, rgb_to_hsv)
}

fn unit_to_u8(x: f32) -> u8 {
    clamp_to_u8(x * 255.0)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn clamp_to_u8(x: f32) -> u8 {
    if x.is_nan() {
        return 0;
    }
    x.round().clamp(0.0, 255.0) as u8
}
