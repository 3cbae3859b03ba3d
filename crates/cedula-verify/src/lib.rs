//! Identity document verification.
//!
//! Checks the front and back of a Chilean ID card and a selfie in a fixed
//! order of stages (quality, structure and content for each side, then a
//! face comparison) and reports the first rejection with a localized message.
//!
//! ```no_run
//! use cedula_verify::{VerificationConfig, VerificationEngine, VerificationPipeline};
//! use cedula_imaging::RawImage;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = VerificationConfig::load(None)?;
//! let engine = Arc::new(VerificationEngine::load(&config.models)?);
//! let pipeline = VerificationPipeline::new(engine, config);
//!
//! let front = RawImage::new(std::fs::read("front.jpg")?, Some("image/jpeg"));
//! let back = RawImage::new(std::fs::read("back.jpg")?, Some("image/jpeg"));
//! let selfie = RawImage::new(std::fs::read("selfie.jpg")?, Some("image/jpeg"));
//! let result = pipeline.run(&front, &back, &selfie)?;
//! println!("verified: {}", result.verified());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod gates;
pub mod matcher;
pub mod messages;
pub mod metrics;
pub mod outcome;
pub mod pipeline;
pub mod service;

#[cfg(test)]
mod fakes;

pub use config::{
    ConfigError, FaceSelection, Locale, ModelConfig, OrientationAxes, VerificationConfig,
};
pub use engine::{EngineError, VerificationEngine};
pub use matcher::{EncodedFace, FaceMatcher};
pub use metrics::{ImageMetrics, MetricCheck};
pub use outcome::{
    FailureReason, PipelineState, Side, Stage, StageOutcome, StageRecord, VerificationError,
    VerificationResult,
};
pub use pipeline::VerificationPipeline;
pub use service::{spawn_verifier, ServiceError, VerifierHandle};
