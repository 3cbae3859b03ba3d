//! Background verifier for async callers.
//!
//! The pipeline is CPU-bound and blocks on model inference, so it runs on a
//! dedicated OS thread fed through a bounded channel. Async handlers hold a
//! cheap [`VerifierHandle`] and await the reply.

use cedula_imaging::RawImage;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::config::VerificationConfig;
use crate::engine::VerificationEngine;
use crate::outcome::{VerificationError, VerificationResult};
use crate::pipeline::VerificationPipeline;

/// Requests that may wait for the verifier thread before senders block.
const QUEUE_DEPTH: usize = 4;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Verification(#[from] VerificationError),
    #[error("failed to spawn verifier thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("verifier thread exited")]
    ChannelClosed,
}

struct VerifyRequest {
    id: Uuid,
    front: RawImage,
    back: RawImage,
    selfie: RawImage,
    deadline: Instant,
    reply: oneshot::Sender<Result<VerificationResult, VerificationError>>,
}

/// Clone-safe handle to the verifier thread.
#[derive(Clone)]
pub struct VerifierHandle {
    tx: mpsc::Sender<VerifyRequest>,
    config: Arc<VerificationConfig>,
}

impl VerifierHandle {
    /// Verify a submission. The overall timeout starts now, so time spent
    /// queued counts against it.
    pub async fn verify(
        &self,
        front: RawImage,
        back: RawImage,
        selfie: RawImage,
    ) -> Result<VerificationResult, ServiceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = VerifyRequest {
            id: Uuid::new_v4(),
            front,
            back,
            selfie,
            deadline: self.config.deadline_from(Instant::now()),
            reply: reply_tx,
        };
        self.tx
            .send(request)
            .await
            .map_err(|_| ServiceError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| ServiceError::ChannelClosed)??)
    }
}

/// Spawn the verifier on a dedicated OS thread.
///
/// The thread exits once every handle has been dropped.
pub fn spawn_verifier(
    engine: Arc<VerificationEngine>,
    config: VerificationConfig,
) -> Result<VerifierHandle, ServiceError> {
    let shared = Arc::new(config.clone());
    let pipeline = VerificationPipeline::new(engine, config);
    let (tx, mut rx) = mpsc::channel::<VerifyRequest>(QUEUE_DEPTH);

    std::thread::Builder::new()
        .name("cedula-verifier".into())
        .spawn(move || {
            tracing::info!("verifier thread started");
            while let Some(req) = rx.blocking_recv() {
                let span = tracing::info_span!("request", id = %req.id);
                let _enter = span.enter();
                let result =
                    pipeline.run_with_deadline(&req.front, &req.back, &req.selfie, req.deadline);
                if req.reply.send(result).is_err() {
                    tracing::debug!("caller went away before the verdict");
                }
            }
            tracing::info!("verifier thread exiting");
        })
        .map_err(ServiceError::Spawn)?;

    Ok(VerifierHandle { tx, config: shared })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake_engine;
    use crate::outcome::FailureReason;
    use image::{GrayImage, ImageFormat};
    use std::io::Cursor;

    fn png(width: u32, height: u32) -> RawImage {
        let mut out = Cursor::new(Vec::new());
        GrayImage::new(width, height).write_to(&mut out, ImageFormat::Png).unwrap();
        RawImage::from_bytes(out.into_inner())
    }

    fn handle() -> VerifierHandle {
        spawn_verifier(Arc::new(fake_engine("RUN")), VerificationConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_verify_through_handle() {
        let handle = handle();
        let result = handle.verify(png(40, 40), png(40, 40), png(40, 40)).await.unwrap();
        assert!(!result.verified());
        assert_eq!(result.failure_reason(), Some(FailureReason::LowResolution));
    }

    #[tokio::test]
    async fn test_decode_error_crosses_the_channel() {
        let handle = handle();
        let err = handle
            .verify(RawImage::from_bytes(b"garbage".to_vec()), png(40, 40), png(40, 40))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Verification(VerificationError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_unbounded_timeout_does_not_panic_the_caller() {
        let config = VerificationConfig {
            overall_timeout_seconds: u64::MAX,
            ..VerificationConfig::default()
        };
        let handle = spawn_verifier(Arc::new(fake_engine("RUN")), config).unwrap();
        let result = handle.verify(png(40, 40), png(40, 40), png(40, 40)).await.unwrap();
        assert_eq!(result.failure_reason(), Some(FailureReason::LowResolution));
    }

    #[tokio::test]
    async fn test_concurrent_requests() {
        let handle = handle();
        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let handle = handle.clone();
                tokio::spawn(async move {
                    handle.verify(png(40, 40), png(40, 40), png(40, 40)).await
                })
            })
            .collect();
        for task in tasks {
            let result = task.await.unwrap().unwrap();
            assert_eq!(result.stages().len(), 1);
        }
    }
}
