//! SCRFD face detector via ONNX Runtime.
//!
//! Letterboxes the grayscale image to 640×640, decodes the three anchor-free
//! stride heads (8, 16, 32) and removes duplicates with NMS.

use crate::backend::{FaceDetection, ModelError};
use crate::types::FaceRegion;
use image::imageops::FilterType;
use image::GrayImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

// --- SCRFD model constants ---
const SCRFD_INPUT_SIZE: u32 = 640;
const SCRFD_MEAN: f32 = 127.5;
const SCRFD_STD: f32 = 128.0;
const SCRFD_STRIDES: [usize; 3] = [8, 16, 32];
const SCRFD_ANCHORS_PER_CELL: usize = 2;
const SCRFD_OUTPUTS: usize = 9;

/// Output tensor positions when names are not recognized:
/// [0-2] scores, [3-5] boxes, [6-8] keypoints, each for strides 8/16/32.
const POSITIONAL_OUTPUTS: [StrideOutputs; 3] = [
    StrideOutputs { score: 0, bbox: 3, kps: 6 },
    StrideOutputs { score: 1, bbox: 4, kps: 7 },
    StrideOutputs { score: 2, bbox: 5, kps: 8 },
];

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0} (download det_10g.onnx from insightface into the model directory)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("detector session lock poisoned")]
    LockPoisoned,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Post-processing thresholds.
#[derive(Debug, Clone, Copy)]
pub struct DetectorSettings {
    /// Minimum anchor score for a candidate face.
    pub confidence_threshold: f32,
    /// IoU above which the weaker of two overlapping faces is dropped.
    pub nms_threshold: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            nms_threshold: 0.4,
        }
    }
}

/// Output tensor indices for one stride.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct StrideOutputs {
    score: usize,
    bbox: usize,
    kps: usize,
}

/// Mapping from letterboxed model space back to image space.
#[derive(Debug, Clone, Copy)]
struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl Letterbox {
    fn fit(width: u32, height: u32) -> Self {
        let side = SCRFD_INPUT_SIZE as f32;
        let scale = (side / width as f32).min(side / height as f32);
        let new_w = (width as f32 * scale).round();
        let new_h = (height as f32 * scale).round();
        Self {
            scale,
            pad_x: ((side - new_w) / 2.0).floor(),
            pad_y: ((side - new_h) / 2.0).floor(),
        }
    }

    fn to_image(&self, (x, y): (f32, f32)) -> (f32, f32) {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Raw head outputs for one stride.
struct StrideHeads<'a> {
    stride: usize,
    scores: &'a [f32],
    boxes: &'a [f32],
    kps: &'a [f32],
}

/// SCRFD-based face detector.
///
/// The ONNX session needs exclusive access for inference; calls from
/// concurrent verifications are serialized on the session lock.
pub struct ScrfdDetector {
    session: Mutex<Session>,
    outputs: [StrideOutputs; 3],
    settings: DetectorSettings,
}

impl ScrfdDetector {
    /// Load the SCRFD ONNX model from the given path.
    pub fn load(model_path: &Path, settings: DetectorSettings) -> Result<Self, DetectorError> {
        if !model_path.exists() {
            return Err(DetectorError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2).map_err(ort::Error::<()>::from)?
            .commit_from_file(model_path)?;

        let names: Vec<String> = session.outputs().iter().map(|o| o.name().to_string()).collect();
        tracing::info!(
            path = %model_path.display(),
            outputs = ?names,
            "loaded SCRFD model"
        );

        if names.len() < SCRFD_OUTPUTS {
            return Err(DetectorError::InferenceFailed(format!(
                "SCRFD model requires {SCRFD_OUTPUTS} outputs (3 strides × score/bbox/kps), got {}",
                names.len()
            )));
        }

        let outputs = match named_outputs(&names) {
            Some(outputs) => outputs,
            None => {
                tracing::info!(
                    ?names,
                    "SCRFD output names not recognized, using positional mapping"
                );
                POSITIONAL_OUTPUTS
            }
        };

        Ok(Self {
            session: Mutex::new(session),
            outputs,
            settings,
        })
    }

    /// Detect faces, highest confidence first.
    pub fn detect_faces(&self, gray: &GrayImage) -> Result<Vec<FaceRegion>, DetectorError> {
        if gray.width() == 0 || gray.height() == 0 {
            return Ok(Vec::new());
        }
        let letterbox = Letterbox::fit(gray.width(), gray.height());
        let input = to_tensor(gray, &letterbox);

        let mut candidates = Vec::new();
        {
            let mut session = self.session.lock().map_err(|_| DetectorError::LockPoisoned)?;
            let outputs = session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

            for (slot, &stride) in SCRFD_STRIDES.iter().enumerate() {
                let idx = self.outputs[slot];
                let extract = |i: usize, what: &str| {
                    outputs[i]
                        .try_extract_tensor::<f32>()
                        .map(|(_, data)| data)
                        .map_err(|e| {
                            DetectorError::InferenceFailed(format!("{what} stride {stride}: {e}"))
                        })
                };
                let heads = StrideHeads {
                    stride,
                    scores: extract(idx.score, "scores")?,
                    boxes: extract(idx.bbox, "boxes")?,
                    kps: extract(idx.kps, "keypoints")?,
                };
                let threshold = self.settings.confidence_threshold;
                candidates.extend(decode_stride(&heads, &letterbox, threshold));
            }
        }

        let faces = suppress_overlaps(candidates, self.settings.nms_threshold);
        tracing::debug!(count = faces.len(), "SCRFD detections");
        Ok(faces)
    }
}

impl FaceDetection for ScrfdDetector {
    fn detect(&self, gray: &GrayImage) -> Result<Vec<FaceRegion>, ModelError> {
        Ok(self.detect_faces(gray)?)
    }
}

/// Match outputs named `score_8`, `bbox_16`, `kps_32`, ... to stride slots.
fn named_outputs(names: &[String]) -> Option<[StrideOutputs; 3]> {
    let find = |prefix: &str, stride: usize| {
        let target = format!("{prefix}_{stride}");
        names.iter().position(|n| *n == target)
    };

    let mut outputs = POSITIONAL_OUTPUTS;
    for (slot, &stride) in SCRFD_STRIDES.iter().enumerate() {
        outputs[slot] = StrideOutputs {
            score: find("score", stride)?,
            bbox: find("bbox", stride)?,
            kps: find("kps", stride)?,
        };
    }
    Some(outputs)
}

/// Letterbox into a 1×3×640×640 tensor, padding with the mean (normalizes to 0).
fn to_tensor(gray: &GrayImage, letterbox: &Letterbox) -> Array4<f32> {
    let fit = |v: u32| ((v as f32 * letterbox.scale).round() as u32).clamp(1, SCRFD_INPUT_SIZE);
    let new_w = fit(gray.width());
    let new_h = fit(gray.height());
    let resized = image::imageops::resize(gray, new_w, new_h, FilterType::Triangle);
    let (pad_x, pad_y) = (letterbox.pad_x as u32, letterbox.pad_y as u32);
    let side = SCRFD_INPUT_SIZE as usize;

    // Grayscale replicated into all three channels.
    Array4::from_shape_fn((1, 3, side, side), |(_, _, y, x)| {
        let (x, y) = (x as u32, y as u32);
        let pixel = if x >= pad_x && y >= pad_y && x - pad_x < new_w && y - pad_y < new_h {
            resized.get_pixel(x - pad_x, y - pad_y).0[0] as f32
        } else {
            SCRFD_MEAN
        };
        (pixel - SCRFD_MEAN) / SCRFD_STD
    })
}

/// Decode candidates above `threshold` for one stride, in image coordinates.
fn decode_stride(
    heads: &StrideHeads<'_>,
    letterbox: &Letterbox,
    threshold: f32,
) -> Vec<FaceRegion> {
    let side = SCRFD_INPUT_SIZE as usize;
    let grid_w = side / heads.stride;
    let grid_h = side / heads.stride;
    let stride = heads.stride as f32;

    (0..grid_w * grid_h * SCRFD_ANCHORS_PER_CELL)
        .filter_map(|idx| {
            let score = heads.scores.get(idx).copied().unwrap_or(0.0);
            if score <= threshold {
                return None;
            }
            let cell = idx / SCRFD_ANCHORS_PER_CELL;
            let anchor = (
                ((cell % grid_w) * heads.stride) as f32,
                ((cell / grid_w) * heads.stride) as f32,
            );

            let d = heads.boxes.get(idx * 4..idx * 4 + 4)?;
            let (x1, y1) = letterbox.to_image((anchor.0 - d[0] * stride, anchor.1 - d[1] * stride));
            let (x2, y2) = letterbox.to_image((anchor.0 + d[2] * stride, anchor.1 + d[3] * stride));

            let landmarks = heads.kps.get(idx * 10..idx * 10 + 10).map(|k| {
                std::array::from_fn(|i| {
                    let offset = (k[i * 2] * stride, k[i * 2 + 1] * stride);
                    letterbox.to_image((anchor.0 + offset.0, anchor.1 + offset.1))
                })
            });

            Some(FaceRegion {
                x: x1,
                y: y1,
                width: x2 - x1,
                height: y2 - y1,
                confidence: score,
                landmarks,
            })
        })
        .collect()
}

/// Non-maximum suppression; keeps the most confident of overlapping regions.
fn suppress_overlaps(mut candidates: Vec<FaceRegion>, iou_threshold: f32) -> Vec<FaceRegion> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<FaceRegion> = Vec::new();
    for candidate in candidates {
        if kept.iter().all(|k| k.iou(&candidate) <= iou_threshold) {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn region(x: f32, y: f32, w: f32, h: f32, confidence: f32) -> FaceRegion {
        FaceRegion { x, y, width: w, height: h, confidence, landmarks: None }
    }

    #[test]
    fn test_nms_suppresses_overlapping() {
        let result = suppress_overlaps(
            vec![
                region(5.0, 5.0, 100.0, 100.0, 0.8),
                region(0.0, 0.0, 100.0, 100.0, 0.9),
                region(200.0, 200.0, 50.0, 50.0, 0.7),
            ],
            0.4,
        );
        assert_eq!(result.len(), 2);
        assert!((result[0].confidence - 0.9).abs() < 1e-6);
        assert!((result[1].confidence - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_nms_empty() {
        assert!(suppress_overlaps(vec![], 0.4).is_empty());
    }

    #[test]
    fn test_letterbox_landscape() {
        // 1600×1000 → scale 0.4, content 640×400, vertical padding 120.
        let lb = Letterbox::fit(1600, 1000);
        assert!((lb.scale - 0.4).abs() < 1e-6);
        assert_eq!(lb.pad_x, 0.0);
        assert_eq!(lb.pad_y, 120.0);
        let (x, y) = lb.to_image((40.0, 160.0));
        assert!((x - 100.0).abs() < 1e-3 && (y - 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_tensor_padding_is_zero() {
        let gray = GrayImage::from_pixel(1600, 1000, Luma([255]));
        let lb = Letterbox::fit(1600, 1000);
        let tensor = to_tensor(&gray, &lb);
        assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
        assert_eq!(tensor[[0, 0, 0, 0]], 0.0);
        let inside = (255.0 - SCRFD_MEAN) / SCRFD_STD;
        assert!((tensor[[0, 2, 320, 320]] - inside).abs() < 1e-6);
        assert_eq!(tensor[[0, 0, 320, 320]], tensor[[0, 1, 320, 320]]);
    }

    #[test]
    fn test_decode_stride_single_anchor() {
        // Stride 32 grid is 20×20; anchor 42 → cell 21 → (x=1, y=1) → (32, 32).
        let stride = 32usize;
        let anchors = (640 / stride) * (640 / stride) * SCRFD_ANCHORS_PER_CELL;
        let mut scores = vec![0.0f32; anchors];
        let mut boxes = vec![0.0f32; anchors * 4];
        let kps = vec![0.0f32; anchors * 10];
        scores[42] = 0.95;
        boxes[42 * 4..42 * 4 + 4].copy_from_slice(&[0.5, 0.5, 0.5, 0.5]);

        let heads = StrideHeads { stride, scores: &scores, boxes: &boxes, kps: &kps };
        let identity = Letterbox { scale: 1.0, pad_x: 0.0, pad_y: 0.0 };
        let faces = decode_stride(&heads, &identity, 0.5);

        assert_eq!(faces.len(), 1);
        let f = &faces[0];
        assert!((f.x - 16.0).abs() < 1e-4 && (f.y - 16.0).abs() < 1e-4);
        assert!((f.width - 32.0).abs() < 1e-4 && (f.height - 32.0).abs() < 1e-4);
        assert_eq!(f.landmarks.map(|l| l[0]), Some((32.0, 32.0)));
    }

    #[test]
    fn test_named_outputs_shuffled() {
        let names: Vec<String> = [
            "bbox_8", "kps_8", "score_8",
            "bbox_16", "kps_16", "score_16",
            "bbox_32", "kps_32", "score_32",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let outputs = named_outputs(&names).unwrap();
        assert_eq!(outputs[0], StrideOutputs { score: 2, bbox: 0, kps: 1 });
        assert_eq!(outputs[2], StrideOutputs { score: 8, bbox: 6, kps: 7 });
    }

    #[test]
    fn test_named_outputs_numeric_names() {
        let names: Vec<String> = (0..9).map(|i: usize| i.to_string()).collect();
        assert!(named_outputs(&names).is_none());
    }

    #[test]
    fn test_load_missing_model() {
        let err = ScrfdDetector::load(
            Path::new("/nonexistent/det_10g.onnx"),
            DetectorSettings::default(),
        );
        assert!(matches!(err, Err(DetectorError::ModelNotFound(_))));
    }
}
