//! Stage identifiers, per-stage outcomes and the aggregated verification result.

use cedula_core::ModelError;
use cedula_imaging::DecodeError;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

use crate::config::Locale;
use crate::messages;

/// Which submitted image a stage inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Front,
    Back,
    /// The selfie, and the face comparison that uses it.
    Face,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Front => "front",
            Side::Back => "back",
            Side::Face => "face",
        })
    }
}

/// The seven stages, in canonical evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    FrontQuality,
    FrontStructure,
    FrontContent,
    BackQuality,
    BackStructure,
    BackContent,
    FaceMatch,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::FrontQuality,
        Stage::FrontStructure,
        Stage::FrontContent,
        Stage::BackQuality,
        Stage::BackStructure,
        Stage::BackContent,
        Stage::FaceMatch,
    ];

    pub fn side(self) -> Side {
        match self {
            Stage::FrontQuality | Stage::FrontStructure | Stage::FrontContent => Side::Front,
            Stage::BackQuality | Stage::BackStructure | Stage::BackContent => Side::Back,
            Stage::FaceMatch => Side::Face,
        }
    }

    /// The stage evaluated after this one, `None` after `FaceMatch`.
    pub fn next(self) -> Option<Stage> {
        let index = Stage::ALL.iter().position(|s| *s == self)?;
        Stage::ALL.get(index + 1).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::FrontQuality => "front_quality",
            Stage::FrontStructure => "front_structure",
            Stage::FrontContent => "front_content",
            Stage::BackQuality => "back_quality",
            Stage::BackStructure => "back_structure",
            Stage::BackContent => "back_content",
            Stage::FaceMatch => "face_match",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.name())
    }
}

/// Why a stage rejected the submission.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code")]
pub enum FailureReason {
    LowResolution,
    BlurryImage,
    CroppedImage,
    WrongOrientation,
    NoTextDetected,
    NoFaceDetected,
    NoFingerprintDetected,
    FaceMismatch { distance: f32 },
    Timeout,
}

impl FailureReason {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            FailureReason::LowResolution => "LowResolution",
            FailureReason::BlurryImage => "BlurryImage",
            FailureReason::CroppedImage => "CroppedImage",
            FailureReason::WrongOrientation => "WrongOrientation",
            FailureReason::NoTextDetected => "NoTextDetected",
            FailureReason::NoFaceDetected => "NoFaceDetected",
            FailureReason::NoFingerprintDetected => "NoFingerprintDetected",
            FailureReason::FaceMismatch { .. } => "FaceMismatch",
            FailureReason::Timeout => "Timeout",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::FaceMismatch { distance } => {
                write!(f, "FaceMismatch (distance {distance:.4})")
            }
            other => f.write_str(other.code()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    Passed,
    Failed {
        reason: FailureReason,
        /// Localized, side-qualified message for the end user.
        message: String,
    },
}

impl StageOutcome {
    /// A rejection for `stage` with its message rendered in `locale`.
    pub fn failed(stage: Stage, reason: FailureReason, locale: Locale) -> Self {
        StageOutcome::Failed {
            reason,
            message: messages::rejection(locale, stage.side(), reason),
        }
    }

    pub fn is_passed(&self) -> bool {
        matches!(self, StageOutcome::Passed)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub outcome: StageOutcome,
}

/// Evaluation state of one verification.
///
/// Walks the stages in canonical order. `Accepted` and `Rejected` are
/// terminal: advancing them is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Start,
    Evaluating(Stage),
    Accepted,
    Rejected(Stage),
}

impl PipelineState {
    /// The stage this state expects an outcome for.
    pub fn expected_stage(self) -> Option<Stage> {
        match self {
            PipelineState::Start => Some(Stage::FrontQuality),
            PipelineState::Evaluating(stage) => Some(stage),
            PipelineState::Accepted | PipelineState::Rejected(_) => None,
        }
    }

    /// Transition on the outcome of the expected stage.
    pub fn advance(self, outcome: &StageOutcome) -> PipelineState {
        let Some(stage) = self.expected_stage() else {
            return self;
        };
        if !outcome.is_passed() {
            return PipelineState::Rejected(stage);
        }
        match stage.next() {
            Some(next) => PipelineState::Evaluating(next),
            None => PipelineState::Accepted,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::Accepted | PipelineState::Rejected(_))
    }
}

/// Aggregated result of one verification.
///
/// Stage records are in canonical order and end at the first failure.
/// `verified` holds exactly when all seven stages passed.
///
/// Serializes as `verified`, then `failure_reason` (taxonomy code),
/// `failure_message` and `match_distance` when present, then `stages`.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationResult {
    verified: bool,
    stages: Vec<StageRecord>,
    match_distance: Option<f32>,
    state: PipelineState,
}

impl Serialize for VerificationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut out = serializer.serialize_struct("VerificationResult", 5)?;
        out.serialize_field("verified", &self.verified)?;
        match self.failure_reason() {
            Some(reason) => out.serialize_field("failure_reason", reason.code())?,
            None => out.skip_field("failure_reason")?,
        }
        match self.failure_message() {
            Some(message) => out.serialize_field("failure_message", message)?,
            None => out.skip_field("failure_message")?,
        }
        match self.match_distance {
            Some(distance) => out.serialize_field("match_distance", &distance)?,
            None => out.skip_field("match_distance")?,
        }
        out.serialize_field("stages", &self.stages)?;
        out.end()
    }
}

impl VerificationResult {
    /// Replay canonical-order records through the state machine.
    ///
    /// Records past the first failure are dropped.
    pub(crate) fn assemble(records: Vec<StageRecord>, match_distance: Option<f32>) -> Self {
        let mut state = PipelineState::Start;
        let mut stages = Vec::with_capacity(records.len());
        for record in records {
            if state.is_terminal() {
                break;
            }
            debug_assert_eq!(
                state.expected_stage(),
                Some(record.stage),
                "stage recorded out of order"
            );
            state = state.advance(&record.outcome);
            stages.push(record);
        }
        Self {
            verified: state == PipelineState::Accepted,
            stages,
            match_distance,
            state,
        }
    }

    pub fn verified(&self) -> bool {
        self.verified
    }

    pub fn stages(&self) -> &[StageRecord] {
        &self.stages
    }

    /// Distance between the ID face and the closest selfie face, when compared.
    pub fn match_distance(&self) -> Option<f32> {
        self.match_distance
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// The rejecting stage record, if any.
    pub fn failure(&self) -> Option<&StageRecord> {
        self.stages.iter().find(|r| !r.outcome.is_passed())
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        self.failure().and_then(|r| match &r.outcome {
            StageOutcome::Failed { reason, .. } => Some(*reason),
            StageOutcome::Passed => None,
        })
    }

    pub fn failure_message(&self) -> Option<&str> {
        self.failure().and_then(|r| match &r.outcome {
            StageOutcome::Failed { message, .. } => Some(message.as_str()),
            StageOutcome::Passed => None,
        })
    }

    pub fn failed_side(&self) -> Option<Side> {
        self.failure().map(|r| r.stage.side())
    }

    /// The single message shown to the user: the rejection, or the success notice.
    pub fn user_message(&self, locale: Locale) -> String {
        match self.failure_message() {
            Some(message) => message.to_string(),
            None if self.verified => messages::success(locale).to_string(),
            None => messages::unavailable(locale).to_string(),
        }
    }
}

/// Infrastructure failure that prevented a verdict.
///
/// Never a business rejection: those are `StageOutcome::Failed`.
#[derive(Error, Debug)]
pub enum VerificationError {
    #[error("{side} image could not be decoded: {source}")]
    Decode {
        side: Side,
        #[source]
        source: DecodeError,
    },
    #[error("model failure during {stage}: {source}")]
    Model {
        stage: Stage,
        #[source]
        source: ModelError,
    },
    #[error("verification worker for {side} panicked")]
    WorkerPanicked { side: Side },
}

impl VerificationError {
    /// Generic message for the end user. Internal details stay in the logs.
    pub fn user_message(&self, locale: Locale) -> &'static str {
        match self {
            VerificationError::Decode { .. } => messages::unreadable_image(locale),
            VerificationError::Model { .. } | VerificationError::WorkerPanicked { .. } => {
                messages::unavailable(locale)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passed(stage: Stage) -> StageRecord {
        StageRecord { stage, outcome: StageOutcome::Passed }
    }

    #[test]
    fn test_stage_order() {
        assert_eq!(Stage::FrontContent.next(), Some(Stage::BackQuality));
        assert_eq!(Stage::FaceMatch.next(), None);
        assert_eq!(Stage::BackStructure.side(), Side::Back);
        assert_eq!(Stage::FaceMatch.side(), Side::Face);
    }

    #[test]
    fn test_state_machine_accepts_only_after_face_match() {
        let mut state = PipelineState::Start;
        for stage in Stage::ALL {
            assert_eq!(state.expected_stage(), Some(stage));
            assert!(!state.is_terminal());
            state = state.advance(&StageOutcome::Passed);
        }
        assert_eq!(state, PipelineState::Accepted);
        assert_eq!(state.advance(&StageOutcome::Passed), PipelineState::Accepted);
    }

    #[test]
    fn test_state_machine_rejects_at_failing_stage() {
        let failed =
            StageOutcome::failed(Stage::BackQuality, FailureReason::BlurryImage, Locale::Es);
        let state = PipelineState::Evaluating(Stage::BackQuality).advance(&failed);
        assert_eq!(state, PipelineState::Rejected(Stage::BackQuality));
        assert_eq!(state.advance(&StageOutcome::Passed), state);
    }

    #[test]
    fn test_assemble_all_passed() {
        let result = VerificationResult::assemble(Stage::ALL.map(passed).to_vec(), Some(0.2));
        assert!(result.verified());
        assert_eq!(result.stages().len(), 7);
        assert_eq!(result.failure_reason(), None);
        assert_eq!(result.match_distance(), Some(0.2));
        assert_eq!(result.user_message(Locale::Es), "Imágenes validadas exitosamente");
    }

    #[test]
    fn test_assemble_truncates_after_failure() {
        let records = vec![
            passed(Stage::FrontQuality),
            StageRecord {
                stage: Stage::FrontStructure,
                outcome: StageOutcome::failed(
                    Stage::FrontStructure,
                    FailureReason::CroppedImage,
                    Locale::Es,
                ),
            },
            passed(Stage::FrontContent),
        ];
        let result = VerificationResult::assemble(records, None);
        assert!(!result.verified());
        assert_eq!(result.stages().len(), 2);
        assert_eq!(result.failure_reason(), Some(FailureReason::CroppedImage));
        assert_eq!(result.failed_side(), Some(Side::Front));
        assert_eq!(result.state(), PipelineState::Rejected(Stage::FrontStructure));
    }

    #[test]
    fn test_incomplete_run_is_not_verified() {
        let result = VerificationResult::assemble(vec![passed(Stage::FrontQuality)], None);
        assert!(!result.verified());
        assert_eq!(result.failure(), None);
    }

    #[test]
    fn test_result_json_shape() {
        let records = vec![StageRecord {
            stage: Stage::FrontQuality,
            outcome: StageOutcome::failed(
                Stage::FrontQuality,
                FailureReason::LowResolution,
                Locale::En,
            ),
        }];
        let json = serde_json::to_value(VerificationResult::assemble(records, None)).unwrap();
        assert_eq!(json["verified"], false);
        assert_eq!(json["stages"][0]["stage"], "front_quality");
        assert_eq!(json["stages"][0]["outcome"]["status"], "failed");
        assert_eq!(json["stages"][0]["outcome"]["reason"]["code"], "LowResolution");
        assert!(json.get("match_distance").is_none());
        assert_eq!(json["failure_reason"], "LowResolution");
        assert_eq!(
            json["failure_message"],
            messages::rejection(Locale::En, Side::Front, FailureReason::LowResolution)
        );
    }

    #[test]
    fn test_accepted_json_has_no_failure_fields() {
        let records = Stage::ALL.into_iter().map(passed).collect();
        let json = serde_json::to_value(VerificationResult::assemble(records, Some(0.25))).unwrap();
        assert_eq!(json["verified"], true);
        assert!(json.get("failure_reason").is_none());
        assert!(json.get("failure_message").is_none());
        assert!((json["match_distance"].as_f64().unwrap() - 0.25).abs() < 1e-6);
        assert_eq!(json["stages"].as_array().map(Vec::len), Some(7));
    }

    #[test]
    fn test_face_mismatch_carries_distance() {
        let reason = FailureReason::FaceMismatch { distance: 0.83 };
        assert_eq!(reason.code(), "FaceMismatch");
        let json = serde_json::to_value(reason).unwrap();
        assert_eq!(json["code"], "FaceMismatch");
        assert!((json["distance"].as_f64().unwrap() - 0.83).abs() < 1e-6);
    }
}
