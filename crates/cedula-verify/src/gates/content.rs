//! Document content: printed text, the portrait and the fingerprint.

use cedula_core::ModelError;
use cedula_imaging::contours;
use cedula_imaging::filters::{self, SobelAperture};
use image::GrayImage;

use super::{Gate, GateInput, Verdict};
use crate::outcome::FailureReason;

/// OCR on the Otsu-binarized image must yield at least one alphanumeric character.
pub struct TextGate;

impl Gate for TextGate {
    fn name(&self) -> &'static str {
        "text"
    }

    fn check(&self, input: &GateInput<'_>) -> Result<Verdict, ModelError> {
        let binary = filters::binarize_otsu(input.image().gray());
        let raw = input.engine().recognize_text(&binary)?;
        let cleaned = clean_text(&raw);
        tracing::debug!(
            raw_chars = raw.chars().count(),
            kept = cleaned.chars().count(),
            "ocr text"
        );
        if cleaned.is_empty() {
            return Ok(Verdict::Reject(FailureReason::NoTextDetected));
        }
        Ok(Verdict::Pass)
    }
}

/// Keep alphanumeric characters only. OCR noise on plain backgrounds is
/// punctuation and whitespace.
pub fn clean_text(raw: &str) -> String {
    raw.chars().filter(|c| c.is_alphanumeric()).collect()
}

/// The ID front must show a face of meaningful size.
pub struct FaceGate {
    min_area_fraction: f32,
}

impl FaceGate {
    pub fn new(min_area_fraction: f32) -> Self {
        Self { min_area_fraction }
    }
}

impl Gate for FaceGate {
    fn name(&self) -> &'static str {
        "face"
    }

    fn check(&self, input: &GateInput<'_>) -> Result<Verdict, ModelError> {
        let image = input.image();
        let faces = input.engine().detect_faces(image.gray())?;
        let largest = faces
            .iter()
            .map(|f| f.area_fraction(image.width(), image.height()))
            .fold(0.0f32, f32::max);
        tracing::debug!(faces = faces.len(), largest_fraction = largest, "front face detection");
        if faces.is_empty() || largest < self.min_area_fraction {
            return Ok(Verdict::Reject(FailureReason::NoFaceDetected));
        }
        Ok(Verdict::Pass)
    }
}

/// Ridge structure in the top-right quadrant of the back, where the
/// fingerprint is printed.
///
/// Sobel 5×5 gradient magnitude is thresholded into a ridge mask; the back
/// passes with strictly more than `min_contours` external contours.
pub struct FingerprintGate {
    gradient_threshold: f32,
    min_contours: usize,
}

impl FingerprintGate {
    pub fn new(gradient_threshold: f32, min_contours: usize) -> Self {
        Self {
            gradient_threshold,
            min_contours,
        }
    }
}

impl Gate for FingerprintGate {
    fn name(&self) -> &'static str {
        "fingerprint"
    }

    fn check(&self, input: &GateInput<'_>) -> Result<Verdict, ModelError> {
        let count = fingerprint_contours(input.image().gray(), self.gradient_threshold);
        tracing::debug!(contours = count, min = self.min_contours, "fingerprint contours");
        if count <= self.min_contours {
            return Ok(Verdict::Reject(FailureReason::NoFingerprintDetected));
        }
        Ok(Verdict::Pass)
    }
}

/// External contours of the thresholded gradient in the top-right quadrant.
pub fn fingerprint_contours(gray: &GrayImage, gradient_threshold: f32) -> usize {
    let region = filters::top_right_quadrant(gray);
    let gradient = filters::sobel(&region, SobelAperture::Five);
    let magnitude = gradient.magnitude();
    let mask =
        filters::threshold_binary(&magnitude, gradient.width, gradient.height, gradient_threshold);
    contours::count_external_contours(&mask)
}
