//! Sliding-window statistics over a luma plane.
//!
//! Windows are square with side `window` (radius `window / 2`) and are
//! clipped at the plane borders, so edge pixels see fewer samples.

/// Number of quantization levels used for local entropy.
pub const ENTROPY_LEVELS: usize = 64;

/// `log2(ENTROPY_LEVELS)`, the maximum possible local entropy.
pub const MAX_ENTROPY_BITS: f32 = 6.0;

/// Quantize a `[0, 1]` luma value to one of [`ENTROPY_LEVELS`] bins.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn entropy_level(luma: f32) -> usize {
    let level = (luma * (ENTROPY_LEVELS - 1) as f32) as i32;
    level.clamp(0, ENTROPY_LEVELS as i32 - 1) as usize
}

/// Shannon entropy (base 2) of the quantized luma in each pixel's window.
///
/// Uses a histogram that slides along each row, adding the entering
/// column and removing the leaving one.
#[must_use = "returns the local entropy plane"]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn local_entropy(luma: &[f32], width: usize, height: usize, window: usize) -> Vec<f32> {
    let radius = window / 2;
    let levels: Vec<usize> = luma.iter().map(|&v| entropy_level(v)).collect();
    let mut out = vec![0.0; luma.len()];
    let mut hist = [0_u32; ENTROPY_LEVELS];

    for y in 0..height {
        let y0 = y.saturating_sub(radius);
        let y1 = (y + radius).min(height - 1);
        hist.fill(0);
        let mut count = 0_u32;

        let add_column = |hist: &mut [u32; ENTROPY_LEVELS], count: &mut u32, x: usize| {
            for yy in y0..=y1 {
                hist[levels[yy * width + x]] += 1;
                *count += 1;
            }
        };
        let remove_column = |hist: &mut [u32; ENTROPY_LEVELS], count: &mut u32, x: usize| {
            for yy in y0..=y1 {
                hist[levels[yy * width + x]] -= 1;
                *count -= 1;
            }
        };

        for x in 0..=radius.min(width - 1) {
            add_column(&mut hist, &mut count, x);
        }
        for x in 0..width {
            if x > 0 {
                let entering = x + radius;
                if entering < width {
                    add_column(&mut hist, &mut count, entering);
                }
                if x > radius {
                    remove_column(&mut hist, &mut count, x - radius - 1);
                }
            }
            out[y * width + x] = entropy_bits(&hist, count) as f32;
        }
    }
    out
}

fn entropy_bits(hist: &[u32; ENTROPY_LEVELS], count: u32) -> f64 {
    if count == 0 {
        return 0.0;
    }
    let total = f64::from(count);
    hist.iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = f64::from(c) / total;
            -p * p.log2()
        })
        .sum()
}

/// Population variance of luma in each pixel's window.
///
/// Computed as `E[x^2] - E[x]^2` from summed-area tables and floored
/// at zero.
#[must_use = "returns the local variance plane"]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn local_variance(luma: &[f32], width: usize, height: usize, window: usize) -> Vec<f32> {
    let radius = window / 2;
    let stride = width + 1;
    let mut sum = vec![0.0_f64; stride * (height + 1)];
    let mut sum_sq = vec![0.0_f64; stride * (height + 1)];
    for y in 0..height {
        let mut row = 0.0;
        let mut row_sq = 0.0;
        for x in 0..width {
            let v = f64::from(luma[y * width + x]);
            row += v;
            row_sq += v * v;
            sum[(y + 1) * stride + x + 1] = sum[y * stride + x + 1] + row;
            sum_sq[(y + 1) * stride + x + 1] = sum_sq[y * stride + x + 1] + row_sq;
        }
    }

    let rect = |table: &[f64], x0: usize, y0: usize, x1: usize, y1: usize| {
        table[y1 * stride + x1] - table[y0 * stride + x1] - table[y1 * stride + x0]
            + table[y0 * stride + x0]
    };

    let mut out = vec![0.0; luma.len()];
    for y in 0..height {
        let y0 = y.saturating_sub(radius);
        let y1 = (y + radius + 1).min(height);
        for x in 0..width {
            let x0 = x.saturating_sub(radius);
            let x1 = (x + radius + 1).min(width);
            let n = ((x1 - x0) * (y1 - y0)) as f64;
            let mean = rect(&sum, x0, y0, x1, y1) / n;
            let mean_sq = rect(&sum_sq, x0, y0, x1, y1) / n;
            out[y * width + x] = mean.mul_add(-mean, mean_sq).max(0.0) as f32;
        }
    }
    out
}
