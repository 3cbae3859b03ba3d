use cedula_core::{
    ArcFaceEncoder, DetectorSettings, FaceDetection, FaceEncoder, FaceEncoding, FaceRegion,
    ModelError,
    ScrfdDetector, TesseractOcr, TextRecognizer,
};
use image::GrayImage;
use thiserror::Error;

use crate::config::ModelConfig;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector error: {0}")]
    Detector(#[from] cedula_core::detector::DetectorError),
    #[error("encoder error: {0}")]
    Encoder(#[from] cedula_core::encoder::EncoderError),
    #[error("ocr error: {0}")]
    Ocr(#[from] cedula_core::ocr::OcrError),
}

/// The loaded model back-ends, shared read-only by every verification.
///
/// Built once at startup. Each back-end serializes its own session access, so
/// one engine can serve concurrent verifications.
pub struct VerificationEngine {
    text: Box<dyn TextRecognizer>,
    detector: Box<dyn FaceDetection>,
    encoder: Box<dyn FaceEncoder>,
}

impl VerificationEngine {
    /// Wrap already constructed back-ends.
    pub fn new(
        text: Box<dyn TextRecognizer>,
        detector: Box<dyn FaceDetection>,
        encoder: Box<dyn FaceEncoder>,
    ) -> Self {
        Self {
            text,
            detector,
            encoder,
        }
    }

    /// Locate Tesseract and load both ONNX models. Fails fast if any is unavailable.
    pub fn load(models: &ModelConfig) -> Result<Self, EngineError> {
        let text = TesseractOcr::locate(
            &models.tesseract_path,
            models.tessdata_dir.as_deref(),
            &models.ocr_language,
        )?;

        let detector_path = models.detector_path();
        let settings = DetectorSettings {
            confidence_threshold: models.detector_confidence,
            ..DetectorSettings::default()
        };
        let detector = ScrfdDetector::load(&detector_path, settings)?;
        tracing::info!(path = %detector_path.display(), "SCRFD detector loaded");

        let encoder_path = models.encoder_path();
        let encoder = ArcFaceEncoder::load(&encoder_path)?;
        tracing::info!(path = %encoder_path.display(), "ArcFace encoder loaded");

        Ok(Self::new(Box::new(text), Box::new(detector), Box::new(encoder)))
    }

    pub fn encoding_dimension(&self) -> usize {
        self.encoder.dimension()
    }

    pub fn recognize_text(&self, image: &GrayImage) -> Result<String, ModelError> {
        self.text.recognize(image)
    }

    pub fn detect_faces(&self, gray: &GrayImage) -> Result<Vec<FaceRegion>, ModelError> {
        self.detector.detect(gray)
    }

    /// Encode one face, rejecting encodings of the wrong length.
    pub fn encode_face(
        &self,
        gray: &GrayImage,
        face: &FaceRegion,
    ) -> Result<FaceEncoding, ModelError> {
        let encoding = self.encoder.encode(gray, face)?;
        let expected = self.encoder.dimension();
        if encoding.dimension() != expected {
            return Err(ModelError::Backend(format!(
                "encoder produced a {}-dim encoding, expected {expected}",
                encoding.dimension()
            )));
        }
        Ok(encoding)
    }
}

impl std::fmt::Debug for VerificationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationEngine")
            .field("encoding_dimension", &self.encoding_dimension())
            .finish_non_exhaustive()
    }
}

/// An engine of fakes: fixed OCR text, no faces, 4-dim encodings.
#[cfg(test)]
pub(crate) fn fake_engine(text: &str) -> VerificationEngine {
    VerificationEngine::new(
        Box::new(crate::fakes::FakeText::new(text)),
        Box::new(crate::fakes::FakeDetector::new()),
        Box::new(crate::fakes::FakeEncoder::new(4)),
    )
}
