//! Verification pipeline: decode, per-side gate chains, face match.
//!
//! Stages are reported in canonical order (front quality/structure/content,
//! back quality/structure/content, face match) and evaluation stops at the
//! first rejection. With `parallel` enabled, the back chain and both face
//! encodings run on scoped threads while the front chain runs on the caller's
//! thread; results are merged in canonical order, so the verdict is the same
//! as a sequential run.

use cedula_core::{FaceEncoding, ModelError};
use cedula_imaging::{DecodedImage, ImageDecoder, RawImage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::ScopedJoinHandle;
use std::time::Instant;

use crate::config::VerificationConfig;
use crate::engine::VerificationEngine;
use crate::gates::{self, GateInput, StagePlan};
use crate::matcher::{EncodedFace, FaceMatcher};
use crate::outcome::{
    FailureReason, Side, Stage, StageOutcome, StageRecord, VerificationError, VerificationResult,
};

/// Faces found in one image, or `None` when encoding never started because
/// the deadline had passed or the run was abandoned.
type Encoded = Option<Vec<EncodedFace>>;

struct Submission {
    front: DecodedImage,
    back: DecodedImage,
    selfie: DecodedImage,
}

pub struct VerificationPipeline {
    engine: Arc<VerificationEngine>,
    config: VerificationConfig,
    decoder: ImageDecoder,
    front: Vec<StagePlan>,
    back: Vec<StagePlan>,
    matcher: FaceMatcher,
}

impl VerificationPipeline {
    pub fn new(engine: Arc<VerificationEngine>, config: VerificationConfig) -> Self {
        Self {
            decoder: config.decoder(),
            front: gates::side_plans(Side::Front, &config),
            back: gates::side_plans(Side::Back, &config),
            matcher: FaceMatcher::new(config.face_match_tolerance, config.face_selection),
            engine,
            config,
        }
    }

    pub fn config(&self) -> &VerificationConfig {
        &self.config
    }

    /// Verify a submission within the configured overall timeout.
    pub fn run(
        &self,
        front: &RawImage,
        back: &RawImage,
        selfie: &RawImage,
    ) -> Result<VerificationResult, VerificationError> {
        let deadline = self.config.deadline_from(Instant::now());
        self.run_with_deadline(front, back, selfie, deadline)
    }

    /// Verify a submission; stages not started by `deadline` are recorded as `Timeout`.
    pub fn run_with_deadline(
        &self,
        front: &RawImage,
        back: &RawImage,
        selfie: &RawImage,
        deadline: Instant,
    ) -> Result<VerificationResult, VerificationError> {
        let span = tracing::info_span!("verification", parallel = self.config.parallel);
        let _enter = span.enter();
        let started = Instant::now();

        let submission = Submission {
            front: self.decode(Side::Front, front)?,
            back: self.decode(Side::Back, back)?,
            selfie: self.decode(Side::Face, selfie)?,
        };

        let result = if self.config.parallel {
            self.evaluate_parallel(&submission, deadline)
        } else {
            self.evaluate_sequential(&submission, deadline)
        };

        match &result {
            Ok(r) => tracing::info!(
                verified = r.verified(),
                reason = r.failure_reason().map(|f| f.code()),
                stages = r.stages().len(),
                distance = r.match_distance(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "verification complete"
            ),
            Err(e) => tracing::error!(error = %e, "verification failed"),
        }
        result
    }

    fn decode(&self, side: Side, raw: &RawImage) -> Result<DecodedImage, VerificationError> {
        let image = self
            .decoder
            .decode(raw)
            .map_err(|source| VerificationError::Decode { side, source })?;
        tracing::debug!(%side, width = image.width(), height = image.height(), "image decoded");
        Ok(image)
    }

    fn evaluate_sequential(
        &self,
        submission: &Submission,
        deadline: Instant,
    ) -> Result<VerificationResult, VerificationError> {
        let never = AtomicBool::new(false);

        let mut records = self.run_side(Side::Front, &submission.front, deadline, &never)?;
        if !all_passed(&records) {
            return Ok(VerificationResult::assemble(records, None));
        }
        records.extend(self.run_side(Side::Back, &submission.back, deadline, &never)?);
        if !all_passed(&records) {
            return Ok(VerificationResult::assemble(records, None));
        }

        let id_faces = self.encode_faces(&submission.front, deadline, &never);
        let selfie_faces = self.encode_faces(&submission.selfie, deadline, &never);
        let (record, distance) = self.face_match(id_faces, selfie_faces, deadline)?;
        records.push(record);
        Ok(VerificationResult::assemble(records, distance))
    }

    fn evaluate_parallel(
        &self,
        submission: &Submission,
        deadline: Instant,
    ) -> Result<VerificationResult, VerificationError> {
        let abort = AtomicBool::new(false);
        let span = tracing::Span::current();

        std::thread::scope(|scope| {
            let back = scope.spawn(|| {
                let _enter = span.enter();
                self.run_side(Side::Back, &submission.back, deadline, &abort)
            });
            let id_faces = scope.spawn(|| {
                let _enter = span.enter();
                self.encode_faces(&submission.front, deadline, &abort)
            });
            let selfie_faces = scope.spawn(|| {
                let _enter = span.enter();
                self.encode_faces(&submission.selfie, deadline, &abort)
            });

            let front = self.run_side(Side::Front, &submission.front, deadline, &abort);
            if !matches!(&front, Ok(records) if all_passed(records)) {
                abort.store(true, Ordering::Relaxed);
            }

            let back = join(back, Side::Back);
            let id_faces = join(id_faces, Side::Front);
            let selfie_faces = join(selfie_faces, Side::Face);

            let mut records = front?;
            if !all_passed(&records) {
                return Ok(VerificationResult::assemble(records, None));
            }
            records.extend(back??);
            if !all_passed(&records) {
                return Ok(VerificationResult::assemble(records, None));
            }

            let (record, distance) = self.face_match(id_faces?, selfie_faces?, deadline)?;
            records.push(record);
            Ok(VerificationResult::assemble(records, distance))
        })
    }

    fn run_side(
        &self,
        side: Side,
        image: &DecodedImage,
        deadline: Instant,
        abort: &AtomicBool,
    ) -> Result<Vec<StageRecord>, VerificationError> {
        let plans = match side {
            Side::Front => &self.front,
            Side::Back => &self.back,
            Side::Face => return Ok(Vec::new()),
        };
        let locale = self.config.locale;
        let (low, high) = (self.config.canny_low, self.config.canny_high);
        let input = GateInput::new(image, &self.engine, low, high);

        let mut records = Vec::with_capacity(plans.len());
        for plan in plans {
            if abort.load(Ordering::Relaxed) {
                tracing::debug!(%side, "side chain abandoned");
                break;
            }
            let outcome = if Instant::now() >= deadline {
                tracing::warn!(stage = %plan.stage(), "deadline exceeded");
                StageOutcome::failed(plan.stage(), FailureReason::Timeout, locale)
            } else {
                plan.evaluate(&input, locale)
                    .map_err(|source| VerificationError::Model { stage: plan.stage(), source })?
            };
            let passed = outcome.is_passed();
            records.push(StageRecord { stage: plan.stage(), outcome });
            if !passed {
                break;
            }
        }
        Ok(records)
    }

    fn encode_faces(
        &self,
        image: &DecodedImage,
        deadline: Instant,
        abort: &AtomicBool,
    ) -> Result<Encoded, ModelError> {
        if abort.load(Ordering::Relaxed) || Instant::now() >= deadline {
            return Ok(None);
        }
        self.matcher.encode(&self.engine, image).map(Some)
    }

    fn face_match(
        &self,
        id_faces: Result<Encoded, ModelError>,
        selfie_faces: Result<Encoded, ModelError>,
        deadline: Instant,
    ) -> Result<(StageRecord, Option<f32>), VerificationError> {
        let model_error = |source| VerificationError::Model { stage: Stage::FaceMatch, source };
        let id_faces = id_faces.map_err(model_error)?;
        let selfie_faces = selfie_faces.map_err(model_error)?;

        let locale = self.config.locale;
        let record = |outcome| StageRecord { stage: Stage::FaceMatch, outcome };
        let rejected = |reason| record(StageOutcome::failed(Stage::FaceMatch, reason, locale));

        let (Some(id_faces), Some(selfie_faces)) = (id_faces, selfie_faces) else {
            tracing::warn!("deadline exceeded before face encoding");
            return Ok((rejected(FailureReason::Timeout), None));
        };
        if Instant::now() >= deadline {
            tracing::warn!("deadline exceeded before face match");
            return Ok((rejected(FailureReason::Timeout), None));
        }

        let Some(reference) = self.matcher.select_reference(&id_faces) else {
            tracing::info!("no face on the ID front");
            return Ok((rejected(FailureReason::NoFaceDetected), None));
        };
        if selfie_faces.is_empty() {
            tracing::info!("no face in the selfie");
            return Ok((rejected(FailureReason::NoFaceDetected), None));
        }

        let candidates: Vec<FaceEncoding> = selfie_faces.into_iter().map(|f| f.encoding).collect();
        let result = self.matcher.compare(&reference.encoding, &candidates);
        tracing::info!(
            distance = result.distance,
            tolerance = self.matcher.tolerance(),
            candidates = candidates.len(),
            matched = result.matched,
            "face comparison"
        );

        let outcome = if result.matched {
            StageOutcome::Passed
        } else {
            StageOutcome::failed(
                Stage::FaceMatch,
                FailureReason::FaceMismatch { distance: result.distance },
                locale,
            )
        };
        Ok((record(outcome), Some(result.distance)))
    }
}

fn all_passed(records: &[StageRecord]) -> bool {
    records.iter().all(|r| r.outcome.is_passed())
}

fn join<T>(handle: ScopedJoinHandle<'_, T>, side: Side) -> Result<T, VerificationError> {
    handle.join().map_err(|_| {
        tracing::error!(%side, "verification worker panicked");
        VerificationError::WorkerPanicked { side }
    })
}
