//! PNG encoding of ARGB rasters.
//!
//! Output is 8-bit RGBA, unfiltered scanlines, fast deflate.

use image::ImageEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use stitchplan_pipeline::RasterImage;

use crate::error::RunError;

/// The eight-byte PNG file signature.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Encode `raster` as a PNG file in memory.
///
/// # Errors
///
/// Returns [`RunError::Encode`] if the encoder fails.
pub fn encode_png(raster: &RasterImage) -> Result<Vec<u8>, RunError> {
    let rgba = raster.to_rgba_image();
    let mut png_bytes = Vec::new();
    let encoder =
        PngEncoder::new_with_quality(&mut png_bytes, CompressionType::Fast, FilterType::NoFilter);
    encoder.write_image(
        rgba.as_raw(),
        rgba.width(),
        rgba.height(),
        image::ExtendedColorType::Rgba8,
    )?;
    Ok(png_bytes)
}
