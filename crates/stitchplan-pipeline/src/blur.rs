//! Box blurs on scalar planes.
//!
//! [`blur3x3`] smooths analysis masks with a plain mean over the 3x3
//! neighbourhood clipped at the borders. [`box_blur`] is the separable
//! blur used by unsharp masking; it replicates edge samples so every
//! output averages exactly `2r + 1` taps per axis.

/// Mean over the 3x3 neighbourhood, clipped at the plane borders.
#[must_use = "returns the blurred plane"]
#[allow(clippy::cast_precision_loss)]
pub fn blur3x3(plane: &[f32], width: usize, height: usize) -> Vec<f32> {
    let mut out = vec![0.0; plane.len()];
    for y in 0..height {
        let y0 = y.saturating_sub(1);
        let y1 = (y + 1).min(height - 1);
        for x in 0..width {
            let x0 = x.saturating_sub(1);
            let x1 = (x + 1).min(width - 1);
            let mut sum = 0.0;
            for yy in y0..=y1 {
                for xx in x0..=x1 {
                    sum += plane[yy * width + xx];
                }
            }
            out[y * width + x] = sum / ((y1 - y0 + 1) * (x1 - x0 + 1)) as f32;
        }
    }
    out
}

/// Separable box blur of radius `radius` with edge replication.
///
/// A radius of zero returns the input unchanged.
#[must_use = "returns the blurred plane"]
pub fn box_blur(plane: &[f64], width: usize, height: usize, radius: usize) -> Vec<f64> {
    if radius == 0 || width == 0 || height == 0 {
        return plane.to_vec();
    }
    let mut horizontal = vec![0.0; plane.len()];
    for y in 0..height {
        let row = &plane[y * width..(y + 1) * width];
        blur_line(row, &mut horizontal[y * width..(y + 1) * width], radius);
    }

    let mut out = vec![0.0; plane.len()];
    let mut column = vec![0.0; height];
    let mut blurred = vec![0.0; height];
    for x in 0..width {
        for y in 0..height {
            column[y] = horizontal[y * width + x];
        }
        blur_line(&column, &mut blurred, radius);
        for y in 0..height {
            out[y * width + x] = blurred[y];
        }
    }
    out
}

/// Sliding-sum mean of one line with clamped sample indices.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn blur_line(input: &[f64], output: &mut [f64], radius: usize) {
    let n = input.len() as isize;
    let r = radius as isize;
    let taps = (2 * radius + 1) as f64;
    let sample = |i: isize| input[i.clamp(0, n - 1) as usize];

    let mut sum: f64 = (-r..=r).map(sample).sum();
    for i in 0..n {
        output[i as usize] = sum / taps;
        sum += sample(i + r + 1) - sample(i - r);
    }
}
