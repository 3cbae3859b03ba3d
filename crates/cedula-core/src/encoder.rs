//! ArcFace face encoder via ONNX Runtime.
//!
//! Aligns a detected face to the canonical 112×112 crop and extracts an
//! L2-normalized 512-dimensional encoding (w600k_r50 model).

use crate::alignment::{self, ALIGNED_SIZE};
use crate::backend::{FaceEncoder, ModelError};
use crate::types::{FaceEncoding, FaceRegion};
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

// --- ArcFace model constants (normalization differs from SCRFD) ---
const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5;
pub const ARCFACE_DIMENSION: usize = 512;
const ARCFACE_MODEL_VERSION: &str = "w600k_r50";

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("model file not found: {0} (download w600k_r50.onnx from insightface into the model directory)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face has no landmarks; the detector must return landmarks for alignment")]
    NoLandmarks,
    #[error("face landmarks are degenerate")]
    DegenerateLandmarks,
    #[error("encoder session lock poisoned")]
    LockPoisoned,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// ArcFace-based face encoder.
pub struct ArcFaceEncoder {
    session: Mutex<Session>,
}

impl ArcFaceEncoder {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, EncoderError> {
        if !model_path.exists() {
            return Err(EncoderError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2).map_err(ort::Error::<()>::from)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self {
            session: Mutex::new(session),
        })
    }

    /// Encode one detected face of a grayscale image.
    pub fn encode_face(
        &self,
        gray: &GrayImage,
        face: &FaceRegion,
    ) -> Result<FaceEncoding, EncoderError> {
        let landmarks = face.landmarks.as_ref().ok_or(EncoderError::NoLandmarks)?;
        let aligned =
            alignment::align_face(gray, landmarks).ok_or(EncoderError::DegenerateLandmarks)?;
        let input = to_tensor(&aligned);

        let raw: Vec<f32> = {
            let mut session = self.session.lock().map_err(|_| EncoderError::LockPoisoned)?;
            let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
            let (_, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| EncoderError::InferenceFailed(format!("embedding extraction: {e}")))?;
            data.to_vec()
        };

        if raw.len() != ARCFACE_DIMENSION {
            return Err(EncoderError::InferenceFailed(format!(
                "expected {ARCFACE_DIMENSION}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(FaceEncoding {
            values: l2_normalize(raw),
            model_version: Some(ARCFACE_MODEL_VERSION.to_string()),
        })
    }
}

impl FaceEncoder for ArcFaceEncoder {
    fn dimension(&self) -> usize {
        ARCFACE_DIMENSION
    }

    fn encode(&self, gray: &GrayImage, face: &FaceRegion) -> Result<FaceEncoding, ModelError> {
        Ok(self.encode_face(gray, face)?)
    }
}

/// 112×112 aligned crop → 1×3×112×112 tensor, luma replicated per channel.
fn to_tensor(aligned: &GrayImage) -> Array4<f32> {
    let size = ALIGNED_SIZE as usize;
    Array4::from_shape_fn((1, 3, size, size), |(_, _, y, x)| {
        let pixel = aligned
            .get_pixel_checked(x as u32, y as u32)
            .map(|p| p.0[0])
            .unwrap_or(0) as f32;
        (pixel - ARCFACE_MEAN) / ARCFACE_STD
    })
}

fn l2_normalize(values: Vec<f32>) -> Vec<f32> {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        values.into_iter().map(|v| v / norm).collect()
    } else {
        values
    }
}
