//! Per-pixel guidance masks produced by analysis.
//!
//! A [`MaskSet`] holds three required planes (`edge`, `flat`, `texture`)
//! and two reserved optional planes (`skin`, `sky`). Every value lies in
//! `[0, 1]` and every plane has `width * height` samples.
//!
//! Masks are computed at analysis resolution. Consumers working on a
//! raster of a different size call [`MaskSet::resized_to`] first.

use serde::{Deserialize, Serialize};

use crate::types::{Dimensions, PipelineError, RasterImage, gray, require, to_channel};

/// Analysis masks aligned to one raster.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaskSet {
    width: u32,
    height: u32,
    edge: Vec<f32>,
    flat: Vec<f32>,
    texture: Vec<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    skin: Option<Vec<f32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sky: Option<Vec<f32>>,
}

/// The named planes of a [`MaskSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskKind {
    Edge,
    Flat,
    Texture,
    Skin,
    Sky,
}

impl MaskKind {
    /// The three planes analysis always produces.
    pub const REQUIRED: [Self; 3] = [Self::Edge, Self::Flat, Self::Texture];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Edge => "edge",
            Self::Flat => "flat",
            Self::Texture => "texture",
            Self::Skin => "skin",
            Self::Sky => "sky",
        }
    }
}

impl MaskSet {
    /// Assemble the required planes.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidArgument`] if a dimension is zero or
    /// a plane's length differs from `width * height`.
    pub fn new(
        width: u32,
        height: u32,
        edge: Vec<f32>,
        flat: Vec<f32>,
        texture: Vec<f32>,
    ) -> Result<Self, PipelineError> {
        require(width > 0 && height > 0, || {
            format!("mask dimensions must be positive, got {width}x{height}")
        })?;
        let expected = width as usize * height as usize;
        for (kind, plane) in [
            (MaskKind::Edge, &edge),
            (MaskKind::Flat, &flat),
            (MaskKind::Texture, &texture),
        ] {
            require(plane.len() == expected, || {
                format!(
                    "{} mask holds {} values but {width}x{height} needs {expected}",
                    kind.name(),
                    plane.len()
                )
            })?;
        }
        Ok(Self {
            width,
            height,
            edge,
            flat,
            texture,
            skin: None,
            sky: None,
        })
    }

    /// Attach the optional skin plane.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidArgument`] on a length mismatch.
    pub fn with_skin(mut self, skin: Vec<f32>) -> Result<Self, PipelineError> {
        self.check_len(MaskKind::Skin, &skin)?;
        self.skin = Some(skin);
        Ok(self)
    }

    /// Attach the optional sky plane.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidArgument`] on a length mismatch.
    pub fn with_sky(mut self, sky: Vec<f32>) -> Result<Self, PipelineError> {
        self.check_len(MaskKind::Sky, &sky)?;
        self.sky = Some(sky);
        Ok(self)
    }

    fn check_len(&self, kind: MaskKind, plane: &[f32]) -> Result<(), PipelineError> {
        let expected = self.dimensions().area();
        require(plane.len() == expected, || {
            format!("{} mask holds {} values, expected {expected}", kind.name(), plane.len())
        })
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub const fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.width,
            height: self.height,
        }
    }

    #[must_use]
    pub fn edge(&self) -> &[f32] {
        &self.edge
    }

    #[must_use]
    pub fn flat(&self) -> &[f32] {
        &self.flat
    }

    #[must_use]
    pub fn texture(&self) -> &[f32] {
        &self.texture
    }

    #[must_use]
    pub fn skin(&self) -> Option<&[f32]> {
        self.skin.as_deref()
    }

    #[must_use]
    pub fn sky(&self) -> Option<&[f32]> {
        self.sky.as_deref()
    }

    /// Look up a plane by kind. Absent optional planes yield `None`.
    #[must_use]
    pub fn plane(&self, kind: MaskKind) -> Option<&[f32]> {
        match kind {
            MaskKind::Edge => Some(&self.edge),
            MaskKind::Flat => Some(&self.flat),
            MaskKind::Texture => Some(&self.texture),
            MaskKind::Skin => self.skin(),
            MaskKind::Sky => self.sky(),
        }
    }

    /// Nearest-neighbour resample of every plane to `dimensions`.
    ///
    /// Returns a clone when the size already matches.
    #[must_use = "returns the resized masks"]
    pub fn resized_to(&self, dimensions: Dimensions) -> Self {
        if dimensions == self.dimensions() || dimensions.area() == 0 {
            return self.clone();
        }
        let resize = |plane: &[f32]| resize_nearest(plane, self.dimensions(), dimensions);
        Self {
            width: dimensions.width,
            height: dimensions.height,
            edge: resize(&self.edge),
            flat: resize(&self.flat),
            texture: resize(&self.texture),
            skin: self.skin.as_deref().map(resize),
            sky: self.sky.as_deref().map(resize),
        }
    }

    /// Render one plane as an opaque grayscale raster (`0.0` black, `1.0` white).
    ///
    /// Returns `None` for an absent optional plane.
    #[must_use]
    pub fn preview(&self, kind: MaskKind) -> Option<RasterImage> {
        let plane = self.plane(kind)?;
        let pixels = plane
            .iter()
            .map(|&v| gray(to_channel(f64::from(v) * 255.0)))
            .collect();
        RasterImage::new(self.width, self.height, pixels).ok()
    }
}

fn resize_nearest(plane: &[f32], from: Dimensions, to: Dimensions) -> Vec<f32> {
    let (sw, sh) = (from.width as usize, from.height as usize);
    let (dw, dh) = (to.width as usize, to.height as usize);
    let mut out = Vec::with_capacity(dw * dh);
    for y in 0..dh {
        let sy = (y * sh / dh).min(sh - 1);
        for x in 0..dw {
            let sx = (x * sw / dw).min(sw - 1);
            out.push(plane[sy * sw + sx]);
        }
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> MaskSet {
        MaskSet::new(
            2,
            2,
            vec![0.0, 1.0, 0.5, 0.25],
            vec![1.0; 4],
            vec![0.0; 4],
        )
        .unwrap()
    }

    #[test]
    fn new_rejects_mismatched_plane() {
        let result = MaskSet::new(2, 2, vec![0.0; 4], vec![0.0; 3], vec![0.0; 4]);
        assert!(matches!(result, Err(PipelineError::InvalidArgument(_))));
    }

    #[test]
    fn optional_planes_start_absent() {
        let masks = sample();
        assert!(masks.skin().is_none());
        assert!(masks.plane(MaskKind::Sky).is_none());
        let masks = masks.with_sky(vec![0.5; 4]).unwrap();
        assert_eq!(masks.sky(), Some(&[0.5; 4][..]));
    }

    #[test]
    fn resize_to_same_size_is_identity() {
        let masks = sample();
        assert_eq!(masks.resized_to(masks.dimensions()), masks);
    }

    #[test]
    fn resize_up_replicates_samples() {
        let masks = sample().resized_to(Dimensions {
            width: 4,
            height: 4,
        });
        assert_eq!(masks.width(), 4);
        assert_eq!(
            &masks.edge()[..8],
            &[0.0, 0.0, 1.0, 1.0, 0.0, 0.0, 1.0, 1.0]
        );
        assert!((masks.edge()[15] - 0.25).abs() < f32::EPSILON);
    }

    #[test]
    fn preview_maps_unit_range_to_gray() {
        let preview = sample().preview(MaskKind::Edge).unwrap();
        assert_eq!(preview.pixels()[0], gray(0));
        assert_eq!(preview.pixels()[1], gray(255));
        assert_eq!(preview.pixels()[2], gray(128));
    }
}
