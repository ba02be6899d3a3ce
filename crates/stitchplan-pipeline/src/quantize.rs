//! Palette reduction and ordered dithering.
//!
//! [`median_cut`] builds a palette by repeatedly splitting the box of
//! colors with the widest channel range at its median. [`remap`] maps
//! every pixel to its nearest palette entry, optionally nudging it first
//! by a tiled Bayer threshold so flat regions dither between neighbouring
//! palette colors.

use serde::{Deserialize, Serialize};

use crate::types::{PipelineError, RasterImage, blue, green, red, rgb, to_channel};

const BAYER_4: [[u8; 4]; 4] = [[0, 8, 2, 10], [12, 4, 14, 6], [3, 11, 1, 9], [15, 7, 13, 5]];

/// Offsets added to the scaled 4x4 matrix in each 4x4 quadrant of the 8x8
/// matrix, in raster order (top-left, top-right, bottom-left, bottom-right).
const QUADRANT_OFFSETS: [u8; 4] = [0, 2, 3, 1];

/// Side of the ordered dither matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BayerSize {
    Four,
    #[default]
    Eight,
}

impl BayerSize {
    #[must_use]
    pub const fn side(self) -> u32 {
        match self {
            Self::Four => 4,
            Self::Eight => 8,
        }
    }

    /// Threshold in `[0, 1)` for pixel `(x, y)`; the matrix tiles the plane.
    #[must_use]
    pub fn threshold(self, x: u32, y: u32) -> f64 {
        let base = BAYER_4[(y % 4) as usize][(x % 4) as usize];
        match self {
            Self::Four => f64::from(base) / 16.0,
            Self::Eight => {
                let quadrant = ((y % 8) / 4 * 2 + (x % 8) / 4) as usize;
                f64::from(base * 4 + QUADRANT_OFFSETS[quadrant]) / 64.0
            }
        }
    }
}

struct ColorBox {
    members: Vec<usize>,
    ranges: [u8; 3],
}

impl ColorBox {
    fn new(members: Vec<usize>, colors: &[[u8; 3]]) -> Self {
        let mut lo = [u8::MAX; 3];
        let mut hi = [u8::MIN; 3];
        for &i in &members {
            for c in 0..3 {
                lo[c] = lo[c].min(colors[i][c]);
                hi[c] = hi[c].max(colors[i][c]);
            }
        }
        let ranges = if members.is_empty() {
            [0; 3]
        } else {
            [hi[0] - lo[0], hi[1] - lo[1], hi[2] - lo[2]]
        };
        Self { members, ranges }
    }

    fn widest(&self) -> (usize, u8) {
        let [r, g, b] = self.ranges;
        if r >= g && r >= b {
            (0, r)
        } else if g >= b {
            (1, g)
        } else {
            (2, b)
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn mean(&self, colors: &[[u8; 3]]) -> u32 {
        let mut sums = [0_u64; 3];
        for &i in &self.members {
            for c in 0..3 {
                sums[c] += u64::from(colors[i][c]);
            }
        }
        let n = self.members.len().max(1) as f64;
        let [r, g, b] = sums.map(|s| to_channel(s as f64 / n));
        rgb(r, g, b)
    }
}

/// Build a palette of at most `k` opaque colors by median cut.
///
/// Splitting stops early once no box has more than one member with a
/// non-zero range. Returns an empty palette for `k == 0`.
#[must_use = "returns the palette"]
pub fn median_cut(raster: &RasterImage, k: usize) -> Vec<u32> {
    if k == 0 {
        return Vec::new();
    }
    let colors: Vec<[u8; 3]> = raster
        .pixels()
        .iter()
        .map(|&p| [red(p), green(p), blue(p)])
        .collect();
    let mut boxes = vec![ColorBox::new((0..colors.len()).collect(), &colors)];

    while boxes.len() < k {
        let mut pick = 0;
        let mut best = boxes[0].widest().1;
        for (i, candidate) in boxes.iter().enumerate().skip(1) {
            let range = candidate.widest().1;
            if range > best {
                pick = i;
                best = range;
            }
        }
        if best == 0 || boxes[pick].members.len() <= 1 {
            break;
        }

        let mut split = boxes.remove(pick);
        let (channel, _) = split.widest();
        split.members.sort_by_key(|&i| colors[i][channel]);
        let upper = split.members.split_off(split.members.len() / 2);
        boxes.push(ColorBox::new(split.members, &colors));
        boxes.push(ColorBox::new(upper, &colors));
    }

    boxes.iter().map(|b| b.mean(&colors)).collect()
}

/// Index of the palette entry closest to `(r, g, b)` by squared RGB
/// distance. Ties resolve to the lowest index.
#[must_use]
pub fn nearest_palette_index(palette: &[u32], r: f64, g: f64, b: f64) -> usize {
    let mut best = 0;
    let mut best_dist = f64::INFINITY;
    for (i, &p) in palette.iter().enumerate() {
        let dr = r - f64::from(red(p));
        let dg = g - f64::from(green(p));
        let db = b - f64::from(blue(p));
        let dist = dr.mul_add(dr, dg.mul_add(dg, db * db));
        if dist < best_dist {
            best = i;
            best_dist = dist;
        }
    }
    best
}

/// Map each pixel to its nearest palette color.
///
/// With `dither`, every channel is first shifted by
/// `(threshold(x, y) - 0.5) / strength_divisor` in normalized `[0, 1]`
/// units. An empty palette returns the raster unchanged.
///
/// # Errors
///
/// Propagates raster construction failures (none occur for a valid input).
pub fn remap(
    raster: &RasterImage,
    palette: &[u32],
    dither: Option<BayerSize>,
    strength_divisor: u32,
) -> Result<RasterImage, PipelineError> {
    if palette.is_empty() {
        return Ok(raster.clone());
    }
    let divisor = f64::from(strength_divisor.max(1));
    RasterImage::from_fn(raster.width(), raster.height(), |x, y| {
        let p = raster.pixel(x, y);
        let mut channels = [f64::from(red(p)), f64::from(green(p)), f64::from(blue(p))];
        if let Some(matrix) = dither {
            let shift = (matrix.threshold(x, y) - 0.5) / divisor;
            channels = channels.map(|c| (c / 255.0 + shift).clamp(0.0, 1.0) * 255.0);
        }
        let [r, g, b] = channels;
        palette[nearest_palette_index(palette, r, g, b)]
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::types::gray;

    #[test]
    fn bayer4_matches_base_matrix() {
        assert!((BayerSize::Four.threshold(1, 0) - 8.0 / 16.0).abs() < 1e-12);
        assert!((BayerSize::Four.threshold(3, 3) - 5.0 / 16.0).abs() < 1e-12);
        assert!((BayerSize::Four.threshold(5, 4) - 8.0 / 16.0).abs() < 1e-12);
    }

    #[test]
    fn bayer8_uses_quadrant_offsets() {
        assert!((BayerSize::Eight.threshold(0, 0) - 0.0).abs() < 1e-12);
        assert!((BayerSize::Eight.threshold(4, 0) - 2.0 / 64.0).abs() < 1e-12);
        assert!((BayerSize::Eight.threshold(0, 4) - 3.0 / 64.0).abs() < 1e-12);
        assert!((BayerSize::Eight.threshold(4, 4) - 1.0 / 64.0).abs() < 1e-12);
    }

    #[test]
    fn bayer8_thresholds_are_a_permutation() {
        let mut seen = HashSet::new();
        for y in 0..8 {
            for x in 0..8 {
                seen.insert((BayerSize::Eight.threshold(x, y) * 64.0).round() as u32);
            }
        }
        assert_eq!(seen.len(), 64);
        assert_eq!(seen.iter().max(), Some(&63));
    }

    #[test]
    fn median_cut_respects_palette_size() {
        let raster = RasterImage::from_fn(16, 16, |x, y| rgb((x * 16) as u8, (y * 16) as u8, 77)).unwrap();
        let palette = median_cut(&raster, 5);
        assert_eq!(palette.len(), 5);
    }

    #[test]
    fn median_cut_stops_when_nothing_to_split() {
        let raster = RasterImage::from_fn(4, 4, |x, _| if x < 2 { gray(10) } else { gray(200) }).unwrap();
        let palette = median_cut(&raster, 8);
        assert_eq!(palette.len(), 2);
        assert!(palette.contains(&gray(10)) && palette.contains(&gray(200)));
    }

    #[test]
    fn median_cut_splits_widest_channel() {
        // Red spans 0..=240, green and blue are constant.
        let raster = RasterImage::from_fn(4, 1, |x, _| rgb((x * 80) as u8, 50, 50)).unwrap();
        let palette = median_cut(&raster, 2);
        assert_eq!(palette, vec![rgb(40, 50, 50), rgb(200, 50, 50)]);
    }

    #[test]
    fn nearest_index_breaks_ties_low() {
        let palette = [gray(0), gray(20), gray(20)];
        assert_eq!(nearest_palette_index(&palette, 10.0, 10.0, 10.0), 0);
        assert_eq!(nearest_palette_index(&palette, 19.0, 19.0, 19.0), 1);
    }

    #[test]
    fn remap_without_dither_uses_palette_only() {
        let raster = RasterImage::from_fn(8, 8, |x, y| gray((x * 30 + y) as u8)).unwrap();
        let palette = median_cut(&raster, 4);
        let out = remap(&raster, &palette, None, 4).unwrap();
        assert!(out.pixels().iter().all(|p| palette.contains(p)));
    }

    #[test]
    fn dither_spreads_a_midtone_across_neighbours() {
        let raster = RasterImage::filled(8, 8, gray(128)).unwrap();
        let palette = [gray(64), gray(192)];
        let plain = remap(&raster, &palette, None, 2).unwrap();
        let dithered = remap(&raster, &palette, Some(BayerSize::Eight), 2).unwrap();
        assert_eq!(plain.unique_colors(), 1);
        assert_eq!(dithered.unique_colors(), 2);
    }
}
