//! Document gates and the per-side stage plans built from them.
//!
//! A stage is an ordered list of gates; the first rejecting gate decides the
//! stage outcome and later gates in that stage never run.

pub mod content;
pub mod quality;
pub mod structural;

use cedula_core::ModelError;
use cedula_imaging::edges;
use cedula_imaging::DecodedImage;
use image::GrayImage;
use std::sync::OnceLock;

use crate::config::VerificationConfig;
use crate::engine::VerificationEngine;
use crate::outcome::{FailureReason, Side, Stage, StageOutcome};

pub use content::{FaceGate, FingerprintGate, TextGate};
pub use quality::{BlurGate, ResolutionGate};
pub use structural::{CropGate, OrientationGate};

/// Result of a single gate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    Pass,
    Reject(FailureReason),
}

/// One image and the shared resources a gate may use.
///
/// The Canny edge map is computed on first use and shared by the structural
/// gates of the side.
pub struct GateInput<'a> {
    image: &'a DecodedImage,
    engine: &'a VerificationEngine,
    canny: (f32, f32),
    edges: OnceLock<GrayImage>,
}

impl<'a> GateInput<'a> {
    pub fn new(
        image: &'a DecodedImage,
        engine: &'a VerificationEngine,
        canny_low: f32,
        canny_high: f32,
    ) -> Self {
        Self {
            image,
            engine,
            canny: (canny_low, canny_high),
            edges: OnceLock::new(),
        }
    }

    pub fn image(&self) -> &DecodedImage {
        self.image
    }

    pub fn engine(&self) -> &VerificationEngine {
        self.engine
    }

    pub fn edges(&self) -> &GrayImage {
        self.edges
            .get_or_init(|| edges::canny(self.image.gray(), self.canny.0, self.canny.1))
    }
}

/// A single check on one image. Pure apart from model inference.
pub trait Gate: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Err` only for model failures; a failed check is `Ok(Verdict::Reject)`.
    fn check(&self, input: &GateInput<'_>) -> Result<Verdict, ModelError>;
}

/// The gates of one stage, in evaluation order.
pub struct StagePlan {
    stage: Stage,
    gates: Vec<Box<dyn Gate>>,
}

impl StagePlan {
    pub fn new(stage: Stage, gates: Vec<Box<dyn Gate>>) -> Self {
        Self { stage, gates }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn gate_names(&self) -> Vec<&'static str> {
        self.gates.iter().map(|g| g.name()).collect()
    }

    /// Run gates until one rejects.
    pub fn evaluate(
        &self,
        input: &GateInput<'_>,
        locale: crate::config::Locale,
    ) -> Result<StageOutcome, ModelError> {
        for gate in &self.gates {
            if let Verdict::Reject(reason) = gate.check(input)? {
                tracing::info!(
                    stage = %self.stage,
                    gate = gate.name(),
                    reason = %reason,
                    "stage rejected"
                );
                return Ok(StageOutcome::failed(self.stage, reason, locale));
            }
        }
        tracing::debug!(stage = %self.stage, "stage passed");
        Ok(StageOutcome::Passed)
    }
}

/// Quality, structure and content plans for one side of the card.
///
/// Both sides share the quality and structure gates. Front content looks for
/// text and the printed portrait; back content looks for text and the
/// fingerprint.
pub fn side_plans(side: Side, config: &VerificationConfig) -> Vec<StagePlan> {
    let (quality, structure, content) = match side {
        Side::Front => (Stage::FrontQuality, Stage::FrontStructure, Stage::FrontContent),
        Side::Back => (Stage::BackQuality, Stage::BackStructure, Stage::BackContent),
        Side::Face => return Vec::new(),
    };

    let mut content_gates: Vec<Box<dyn Gate>> = vec![Box::new(TextGate)];
    match side {
        Side::Front => content_gates.push(Box::new(FaceGate::new(config.face_min_area_fraction))),
        _ => content_gates.push(Box::new(FingerprintGate::new(
            config.fingerprint_gradient_threshold,
            config.fingerprint_min_contours,
        ))),
    }

    vec![
        StagePlan::new(
            quality,
            vec![
                Box::new(ResolutionGate::new(config.min_width, config.min_height)),
                Box::new(BlurGate::new(config.blur_threshold)),
            ],
        ),
        StagePlan::new(
            structure,
            vec![
                Box::new(CropGate::new(config.edge_energy_threshold)),
                Box::new(OrientationGate::new(
                    config.hough_vote_threshold,
                    config.orientation_tolerance_degrees,
                    config.orientation_axes,
                )),
            ],
        ),
        StagePlan::new(content, content_gates),
    ]
}
