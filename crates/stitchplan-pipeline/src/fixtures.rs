//! Synthetic rasters shared by unit tests.

#![allow(
    clippy::unwrap_used,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss
)]

use crate::types::{RasterImage, gray, rgb};

pub fn solid(width: u32, height: u32, argb: u32) -> RasterImage {
    RasterImage::filled(width, height, argb).unwrap()
}

/// Black and white squares of side `cell`.
pub fn checkerboard(width: u32, height: u32, cell: u32) -> RasterImage {
    RasterImage::from_fn(width, height, |x, y| {
        if (x / cell + y / cell) % 2 == 1 {
            gray(255)
        } else {
            gray(0)
        }
    })
    .unwrap()
}

/// Gray cells cycling through 64 evenly spaced tones along rows.
pub fn tonal_mosaic(width: u32, height: u32) -> RasterImage {
    RasterImage::from_fn(width, height, |x, y| {
        let level = (x + 8 * y) % 64;
        gray((level * 4 + 2) as u8)
    })
    .unwrap()
}

/// Vertical bands of equal width, one per entry of `levels`.
pub fn vertical_steps(width: u32, height: u32, levels: &[u8]) -> RasterImage {
    let band = width.div_ceil(levels.len() as u32);
    RasterImage::from_fn(width, height, |x, _| {
        gray(levels[((x / band) as usize).min(levels.len() - 1)])
    })
    .unwrap()
}

/// Deterministic noise in `-amplitude..=amplitude` from a splitmix hash.
pub fn noise(i: u64, amplitude: i32) -> i32 {
    let mut z = i.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^= z >> 31;
    let span = (2 * amplitude + 1) as u64;
    (z % span) as i32 - amplitude
}

/// Left half at `dark`, right half at `light`, both with uniform noise.
pub fn noisy_halves(width: u32, height: u32, dark: u8, light: u8, amplitude: i32) -> RasterImage {
    RasterImage::from_fn(width, height, |x, y| {
        let base = if x < width / 2 { dark } else { light };
        let n = noise(u64::from(y * width + x), amplitude);
        let v = (i32::from(base) + n).clamp(0, 255) as u8;
        rgb(v, v, v)
    })
    .unwrap()
}
