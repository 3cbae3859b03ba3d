//! Photographic quality: resolution and focus.

use cedula_core::ModelError;
use cedula_imaging::filters;
use image::GrayImage;

use super::{Gate, GateInput, Verdict};
use crate::outcome::FailureReason;

/// Both dimensions must reach the configured minimum.
pub struct ResolutionGate {
    min_width: u32,
    min_height: u32,
}

impl ResolutionGate {
    pub fn new(min_width: u32, min_height: u32) -> Self {
        Self { min_width, min_height }
    }
}

impl Gate for ResolutionGate {
    fn name(&self) -> &'static str {
        "resolution"
    }

    fn check(&self, input: &GateInput<'_>) -> Result<Verdict, ModelError> {
        let (width, height) = (input.image().width(), input.image().height());
        if width < self.min_width || height < self.min_height {
            tracing::debug!(
                width,
                height,
                min_width = self.min_width,
                min_height = self.min_height,
                "resolution too low"
            );
            return Ok(Verdict::Reject(FailureReason::LowResolution));
        }
        Ok(Verdict::Pass)
    }
}

/// Variance of the Laplacian of the 3×3 Gaussian-smoothed grayscale image.
///
/// Sharp prints have strong second derivatives at glyph and border edges; a
/// variance below the threshold means the capture is out of focus.
pub struct BlurGate {
    threshold: f64,
}

impl BlurGate {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }
}

impl Gate for BlurGate {
    fn name(&self) -> &'static str {
        "blur"
    }

    fn check(&self, input: &GateInput<'_>) -> Result<Verdict, ModelError> {
        let variance = blur_variance(input.image().gray());
        tracing::debug!(variance, threshold = self.threshold, "laplacian variance");
        if variance < self.threshold {
            return Ok(Verdict::Reject(FailureReason::BlurryImage));
        }
        Ok(Verdict::Pass)
    }
}

/// Focus measure used by [`BlurGate`]. Higher is sharper.
pub fn blur_variance(gray: &GrayImage) -> f64 {
    filters::laplacian_variance(&filters::gaussian_blur_3x3(gray))
}
