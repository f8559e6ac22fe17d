//! Contrast-limited adaptive histogram equalization (CLAHE).
//!
//! The image is padded (reflect-101) up to a multiple of the tile grid,
//! a clipped cumulative histogram is built per tile, and each output
//! pixel bilinearly blends the lookup tables of the four surrounding
//! tile centers.

use image::{GrayImage, Luma};

const BINS: usize = 256;

/// Largest grid [`equalize`] will build lookup tables for.
pub const MAX_TILE_GRID: u32 = crate::types::PipelineConfig::MAX_CLAHE_TILE_GRID;

/// Equalize a single-channel image with CLAHE.
///
/// `clip_limit` is relative to a flat histogram: each bin is capped at
/// `clip_limit * tile_area / 256` (at least 1) and the excess is spread
/// across all bins. A non-positive limit disables clipping. The image is
/// split into `tile_grid x tile_grid` tiles; grids above
/// [`MAX_TILE_GRID`] are capped. Empty images and a zero grid are
/// returned unchanged.
#[must_use = "returns a new equalized image"]
pub fn equalize(image: &GrayImage, clip_limit: f32, tile_grid: u32) -> GrayImage {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 || tile_grid == 0 {
        return image.clone();
    }
    let tile_grid = tile_grid.min(MAX_TILE_GRID);

    let tile_width = width.div_ceil(tile_grid);
    let tile_height = height.div_ceil(tile_grid);
    let limit = clip_threshold(clip_limit, tile_width * tile_height);

    let grid = tile_grid as usize;
    let mut luts = Vec::with_capacity(grid.saturating_mul(grid));
    for ty in 0..tile_grid {
        for tx in 0..tile_grid {
            let mut hist = tile_histogram(
                image,
                tx * tile_width,
                ty * tile_height,
                tile_width,
                tile_height,
            );
            if let Some(limit) = limit {
                clip_histogram(&mut hist, limit);
            }
            luts.push(cumulative_lut(&hist, tile_width * tile_height));
        }
    }

    GrayImage::from_fn(width, height, |x, y| {
        let (tx0, tx1, wx) = neighbours(x, tile_width, tile_grid);
        let (ty0, ty1, wy) = neighbours(y, tile_height, tile_grid);
        let v = usize::from(image.get_pixel(x, y).0[0]);
        let at = |tx: usize, ty: usize| f32::from(luts[ty * grid + tx][v]);

        let top = at(tx0, ty0).mul_add(1.0 - wx, at(tx1, ty0) * wx);
        let bottom = at(tx0, ty1).mul_add(1.0 - wx, at(tx1, ty1) * wx);
        Luma([round_to_u8(top.mul_add(1.0 - wy, bottom * wy))])
    })
}

/// Per-bin cap for a tile of `tile_area` pixels, or `None` to skip
/// clipping.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn clip_threshold(clip_limit: f32, tile_area: u32) -> Option<u32> {
    if clip_limit > 0.0 {
        let limit = (clip_limit * tile_area as f32 / BINS as f32) as u32;
        Some(limit.max(1))
    } else {
        None
    }
}

/// Histogram of one tile of the reflect-101 padded image.
fn tile_histogram(image: &GrayImage, x0: u32, y0: u32, tile_width: u32, tile_height: u32) -> [u32; BINS] {
    let (width, height) = image.dimensions();
    let mut hist = [0u32; BINS];
    for y in y0..y0 + tile_height {
        let sy = reflect_101(y, height);
        for x in x0..x0 + tile_width {
            let sx = reflect_101(x, width);
            hist[usize::from(image.get_pixel(sx, sy).0[0])] += 1;
        }
    }
    hist
}

/// Cap every bin at `limit` and redistribute the excess.
///
/// The excess is first spread evenly; the remainder is handed out one
/// count at a time at a fixed stride from bin 0. Total count is kept.
#[allow(clippy::cast_possible_truncation)]
fn clip_histogram(hist: &mut [u32; BINS], limit: u32) {
    let mut clipped = 0;
    for bin in hist.iter_mut() {
        if *bin > limit {
            clipped += *bin - limit;
            *bin = limit;
        }
    }

    let batch = clipped / BINS as u32;
    let mut residual = clipped % BINS as u32;
    for bin in hist.iter_mut() {
        *bin += batch;
    }
    if residual > 0 {
        let step = (BINS / residual as usize).max(1);
        for bin in hist.iter_mut().step_by(step) {
            if residual == 0 {
                break;
            }
            *bin += 1;
            residual -= 1;
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn cumulative_lut(hist: &[u32; BINS], area: u32) -> [u8; BINS] {
    let scale = 255.0 / area as f32;
    let mut lut = [0u8; BINS];
    let mut sum = 0u32;
    for (entry, &count) in lut.iter_mut().zip(hist) {
        sum += count;
        *entry = round_to_u8(sum as f32 * scale);
    }
    lut
}

/// The two tile indices bracketing `pos` along one axis and the weight
/// of the second.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn neighbours(pos: u32, tile: u32, grid: u32) -> (usize, usize, f32) {
    let t = pos as f32 / tile as f32 - 0.5;
    let lower = t.floor();
    let weight = t - lower;
    let lower = lower as i64;
    let first = lower.max(0) as usize;
    let second = (lower + 1).min(i64::from(grid) - 1) as usize;
    (first, second, weight)
}

/// Mirror an index into `0..len` without repeating the edge sample
/// (`dcb|abcd|cba`).
const fn reflect_101(i: u32, len: u32) -> u32 {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len - 1);
    let i = i % period;
    if i >= len { period - i } else { i }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_to_u8(x: f32) -> u8 {
    x.round().clamp(0.0, 255.0) as u8
}
