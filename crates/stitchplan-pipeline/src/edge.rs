//! Gradient operators on a luma plane.
//!
//! Sobel and Laplacian responses come from [`imageproc::filter::filter_clamped`]
//! on an `f32` luma image. Only the interior is kept: the one-pixel border
//! is written as `0.0` so outputs stay aligned with the input plane.

use std::f64::consts::PI;

use image::{ImageBuffer, Luma};
use imageproc::definitions::Image;
use imageproc::filter::filter_clamped;
use imageproc::kernel::Kernel;

/// `imageproc::kernel::SOBEL_HORIZONTAL_3X3` with `f32` taps.
const SOBEL_HORIZONTAL: Kernel<'static, f32> =
    Kernel::new(&[-1.0, 0.0, 1.0, -2.0, 0.0, 2.0, -1.0, 0.0, 1.0], 3, 3);

/// `imageproc::kernel::SOBEL_VERTICAL_3X3` with `f32` taps.
const SOBEL_VERTICAL: Kernel<'static, f32> =
    Kernel::new(&[-1.0, -2.0, -1.0, 0.0, 0.0, 0.0, 1.0, 2.0, 1.0], 3, 3);

/// `imageproc::kernel::LAPLACIAN_3X3` with `f32` taps.
const LAPLACIAN: Kernel<'static, f32> =
    Kernel::new(&[0.0, 1.0, 0.0, 1.0, -4.0, 1.0, 0.0, 1.0, 0.0], 3, 3);

/// Per-pixel Sobel responses for a plane.
#[derive(Debug, Clone, PartialEq)]
pub struct Gradients {
    pub gx: Vec<f32>,
    pub gy: Vec<f32>,
    /// Euclidean norm of `(gx, gy)`.
    pub magnitude: Vec<f32>,
}

/// Whether `(x, y)` lies inside the one-pixel border.
#[must_use]
pub const fn is_interior(x: usize, y: usize, width: usize, height: usize) -> bool {
    x >= 1 && y >= 1 && x + 1 < width && y + 1 < height
}

/// Collect the interior samples of a plane in row-major order.
#[must_use = "returns the interior samples"]
pub fn interior_values(plane: &[f32], width: usize, height: usize) -> Vec<f32> {
    if width < 3 || height < 3 {
        return Vec::new();
    }
    let mut out = Vec::with_capacity((width - 2) * (height - 2));
    for y in 1..height - 1 {
        out.extend_from_slice(&plane[y * width + 1..y * width + width - 1]);
    }
    out
}

/// Wrap a plane as a single-channel `f32` image.
///
/// `None` when the plane has no interior or its length is not
/// `width * height`.
fn plane_image(plane: &[f32], width: usize, height: usize) -> Option<Image<Luma<f32>>> {
    if width < 3 || height < 3 {
        return None;
    }
    let width = u32::try_from(width).ok()?;
    let height = u32::try_from(height).ok()?;
    ImageBuffer::from_raw(width, height, plane.to_vec())
}

/// Correlate `image` with a 3x3 kernel, zeroing the border.
fn filter_interior(
    image: &Image<Luma<f32>>,
    kernel: Kernel<'_, f32>,
    width: usize,
    height: usize,
) -> Vec<f32> {
    let mut out = filter_clamped::<_, f32, f32>(image, kernel).into_raw();
    for y in 0..height {
        for x in 0..width {
            if !is_interior(x, y, width, height) {
                out[y * width + x] = 0.0;
            }
        }
    }
    out
}

/// 3x3 Sobel gradients.
///
/// Uses the horizontal kernel `[-1 0 1; -2 0 2; -1 0 1]` and its
/// transpose for the vertical direction. Planes without an interior, or
/// whose length is not `width * height`, yield all-zero gradients.
#[must_use = "returns the gradients"]
pub fn sobel(luma: &[f32], width: usize, height: usize) -> Gradients {
    let Some(image) = plane_image(luma, width, height) else {
        let zeros = vec![0.0; width * height];
        return Gradients {
            gx: zeros.clone(),
            gy: zeros.clone(),
            magnitude: zeros,
        };
    };
    let gx = filter_interior(&image, SOBEL_HORIZONTAL, width, height);
    let gy = filter_interior(&image, SOBEL_VERTICAL, width, height);
    let magnitude = gx.iter().zip(&gy).map(|(h, v)| h.hypot(*v)).collect();
    Gradients { gx, gy, magnitude }
}

/// 4-neighbour Laplacian: `up + down + left + right - 4 * center`.
#[must_use = "returns the Laplacian plane"]
pub fn laplacian(luma: &[f32], width: usize, height: usize) -> Vec<f32> {
    plane_image(luma, width, height).map_or_else(
        || vec![0.0; width * height],
        |image| filter_interior(&image, LAPLACIAN, width, height),
    )
}

/// Thin gradient ridges by suppressing non-maxima along the gradient.
///
/// The direction falls in sector `floor((atan2(gy, gx) + pi) * 4 / pi) & 3`,
/// which compares against the W/E, NE/SW, N/S or NW/SE neighbours
/// respectively. A pixel survives when its magnitude plus `eps` is at
/// least both neighbours; otherwise it becomes `0.0`.
#[must_use = "returns the suppressed magnitudes"]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn non_max_suppression(
    gradients: &Gradients,
    width: usize,
    height: usize,
    eps: f32,
) -> Vec<f32> {
    let g = &gradients.magnitude;
    let mut out = vec![0.0; width * height];
    if width < 3 || height < 3 {
        return out;
    }

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let idx = y * width + x;
            let angle = f64::from(gradients.gy[idx]).atan2(f64::from(gradients.gx[idx]));
            let sector = (((angle + PI) * 4.0 / PI) as u32) & 3;
            let (n1, n2) = match sector {
                0 => (g[idx - 1], g[idx + 1]),
                1 => (g[idx - width + 1], g[idx + width - 1]),
                2 => (g[idx - width], g[idx + width]),
                _ => (g[idx - width - 1], g[idx + width + 1]),
            };
            let m = g[idx];
            if m + eps >= n1 && m + eps >= n2 {
                out[idx] = m;
            }
        }
    }
    out
}
