//! cedula-core: Model back-ends for identity document verification.
//!
//! SCRFD face detection and ArcFace face encoding run via ONNX Runtime;
//! text recognition shells out to Tesseract. The traits in [`backend`] are
//! the seam the verification engine is built on.

pub mod alignment;
pub mod backend;
pub mod detector;
pub mod encoder;
pub mod ocr;
pub mod types;

pub use backend::{FaceDetection, FaceEncoder, ModelError, TextRecognizer};
pub use detector::{DetectorSettings, ScrfdDetector};
pub use encoder::ArcFaceEncoder;
pub use ocr::TesseractOcr;
pub use types::{EuclideanMatcher, FaceEncoding, FaceRegion, MatchResult, Matcher};

use std::path::PathBuf;

/// File name of the SCRFD detection model inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";
/// File name of the ArcFace recognition model inside the model directory.
pub const ENCODER_MODEL_FILE: &str = "w600k_r50.onnx";

/// `$XDG_DATA_HOME/cedula/models`, falling back to `~/.local/share/cedula/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("cedula")
        .join("models")
}
