//! Model traits shared by the verification engine.
//!
//! Implementations must be safe to call from several threads at once. Back-ends
//! whose sessions need exclusive access serialize calls internally.

use crate::detector::DetectorError;
use crate::encoder::EncoderError;
use crate::ocr::OcrError;
use crate::types::{FaceEncoding, FaceRegion};
use image::GrayImage;
use thiserror::Error;

/// Fault raised by a model back-end. Never a business rejection.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("face detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("face encoder: {0}")]
    Encoder(#[from] EncoderError),
    #[error("ocr: {0}")]
    Ocr(#[from] OcrError),
    #[error("{0}")]
    Backend(String),
}

/// Locates faces in a grayscale image.
pub trait FaceDetection: Send + Sync {
    /// Detected regions, highest confidence first.
    fn detect(&self, gray: &GrayImage) -> Result<Vec<FaceRegion>, ModelError>;
}

/// Turns a detected face into a fixed-length encoding.
pub trait FaceEncoder: Send + Sync {
    /// Length of every encoding this encoder produces.
    fn dimension(&self) -> usize;

    fn encode(&self, gray: &GrayImage, face: &FaceRegion) -> Result<FaceEncoding, ModelError>;
}

/// Extracts raw text from an image.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &GrayImage) -> Result<String, ModelError>;
}
