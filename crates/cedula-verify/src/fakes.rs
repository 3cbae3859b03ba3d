//! Deterministic model back-ends for tests.
//!
//! Detector and encoder answers are keyed by image width, so one fake can
//! give the ID front and the selfie different faces.
#![allow(dead_code)]

use cedula_core::{FaceDetection, FaceEncoder, FaceEncoding, FaceRegion, ModelError, TextRecognizer};
use image::GrayImage;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub struct FakeText {
    text: Option<String>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
}

impl FakeText {
    pub fn new(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Every call fails with a back-end error.
    pub fn broken() -> Self {
        Self {
            text: None,
            ..Self::new("")
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Shared counter of `recognize` calls.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

impl TextRecognizer for FakeText {
    fn recognize(&self, _image: &GrayImage) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.text
            .clone()
            .ok_or_else(|| ModelError::Backend("ocr unavailable".to_string()))
    }
}

#[derive(Default)]
pub struct FakeDetector {
    faces: HashMap<u32, Vec<FaceRegion>>,
}

impl FakeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Faces reported for images of the given width. Other widths have none.
    pub fn with(mut self, width: u32, faces: Vec<FaceRegion>) -> Self {
        self.faces.insert(width, faces);
        self
    }
}

impl FaceDetection for FakeDetector {
    fn detect(&self, gray: &GrayImage) -> Result<Vec<FaceRegion>, ModelError> {
        Ok(self.faces.get(&gray.width()).cloned().unwrap_or_default())
    }
}

pub struct FakeEncoder {
    dimension: usize,
    encodings: HashMap<u32, Vec<f32>>,
}

impl FakeEncoder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            encodings: HashMap::new(),
        }
    }

    /// Encoding returned for any face in images of the given width.
    pub fn with(mut self, width: u32, values: Vec<f32>) -> Self {
        self.encodings.insert(width, values);
        self
    }
}

impl FaceEncoder for FakeEncoder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn encode(&self, gray: &GrayImage, _face: &FaceRegion) -> Result<FaceEncoding, ModelError> {
        self.encodings
            .get(&gray.width())
            .map(|values| FaceEncoding::new(values.clone()))
            .ok_or_else(|| ModelError::Backend(format!("no encoding for width {}", gray.width())))
    }
}

/// A centered face box covering `fraction` of a `width`×`height` image.
pub fn face_covering(width: u32, height: u32, fraction: f32) -> FaceRegion {
    let scale = fraction.sqrt();
    let (w, h) = (width as f32 * scale, height as f32 * scale);
    let (x, y) = ((width as f32 - w) / 2.0, (height as f32 - h) / 2.0);
    FaceRegion {
        x,
        y,
        width: w,
        height: h,
        confidence: 0.9,
        landmarks: Some([
            (x + w * 0.3, y + h * 0.4),
            (x + w * 0.7, y + h * 0.4),
            (x + w * 0.5, y + h * 0.6),
            (x + w * 0.35, y + h * 0.8),
            (x + w * 0.65, y + h * 0.8),
        ]),
    }
}

/// An encoding of `dimension` values all equal to `value`.
pub fn constant(dimension: usize, value: f32) -> Vec<f32> {
    vec![value; dimension]
}

/// An encoding at Euclidean distance `distance` from the all-zero encoding.
pub fn offset(dimension: usize, distance: f32) -> Vec<f32> {
    let mut values = vec![0.0; dimension];
    if let Some(first) = values.first_mut() {
        *first = distance;
    }
    values
}
