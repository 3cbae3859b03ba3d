use serde::{Deserialize, Serialize};

/// A detected face region, with optional five-point landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl FaceRegion {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Fraction of a `width`×`height` image covered by this region.
    pub fn area_fraction(&self, width: u32, height: u32) -> f32 {
        let image_area = width as f32 * height as f32;
        if image_area > 0.0 {
            self.area() / image_area
        } else {
            0.0
        }
    }

    /// Intersection-over-Union with another region.
    pub fn iou(&self, other: &FaceRegion) -> f32 {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width).min(other.x + other.width);
        let y2 = (self.y + self.height).min(other.y + other.height);

        let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union > 0.0 { inter / union } else { 0.0 }
    }
}

/// Fixed-length face embedding.
///
/// Every encoding produced by one encoder has the same dimensionality, so
/// encodings from the same engine can be compared directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceEncoding {
    pub values: Vec<f32>,
    /// Model version that produced this encoding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl FaceEncoding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance. Lower = more similar; 0 for identical encodings.
    pub fn distance(&self, other: &FaceEncoding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Outcome of comparing an ID encoding against selfie candidates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Smallest distance across candidates; infinite when there were none.
    pub distance: f32,
}

/// Strategy for comparing a reference encoding against candidate encodings.
pub trait Matcher {
    fn compare(
        &self,
        reference: &FaceEncoding,
        candidates: &[FaceEncoding],
        tolerance: f32,
    ) -> MatchResult;
}

/// Minimum Euclidean distance matcher.
///
/// Always visits every candidate, no early exit once a match is found.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(
        &self,
        reference: &FaceEncoding,
        candidates: &[FaceEncoding],
        tolerance: f32,
    ) -> MatchResult {
        let distance = candidates
            .iter()
            .map(|c| reference.distance(c))
            .fold(f32::INFINITY, f32::min);

        MatchResult {
            matched: distance <= tolerance,
            distance,
        }
    }
}
