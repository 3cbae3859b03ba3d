//! Synthetic submissions for scenario tests.
#![allow(dead_code)]

#[path = "../../src/fakes.rs"]
mod fakes;

pub use fakes::*;

use cedula_imaging::RawImage;
use cedula_verify::{VerificationConfig, VerificationEngine, VerificationPipeline};
use image::{GrayImage, ImageFormat, Luma};
use std::io::Cursor;
use std::sync::Arc;

pub const CARD_WIDTH: u32 = 800;
pub const CARD_HEIGHT: u32 = 500;
pub const SELFIE_WIDTH: u32 = 640;
pub const SELFIE_HEIGHT: u32 = 480;
pub const DIM: usize = 4;

/// A card: light stock with nine dark print rows spanning `x0..x1`, plus an
/// optional block of ridge-like squares in the top-right quadrant.
pub fn card(x0: u32, x1: u32, fingerprint: bool) -> GrayImage {
    GrayImage::from_fn(CARD_WIDTH, CARD_HEIGHT, |x, y| {
        let print_row = y >= 50 && y % 50 < 10 && y < 460 && (x0..x1).contains(&x);
        let ridge = fingerprint
            && (70..90).contains(&y)
            && (450..690).contains(&x)
            && (x - 450) % 40 < 20;
        if print_row || ridge {
            Luma([30])
        } else {
            Luma([230])
        }
    })
}

pub fn front() -> GrayImage {
    card(50, 750, false)
}

pub fn back() -> GrayImage {
    card(50, 750, true)
}

/// Back whose right half is blank, so there is no fingerprint.
pub fn back_without_fingerprint() -> GrayImage {
    card(50, 350, false)
}

/// Out-of-focus capture: no detail at all.
pub fn blurry() -> GrayImage {
    GrayImage::from_pixel(CARD_WIDTH, CARD_HEIGHT, Luma([200]))
}

pub fn selfie() -> GrayImage {
    GrayImage::from_pixel(SELFIE_WIDTH, SELFIE_HEIGHT, Luma([128]))
}

pub fn png(gray: &GrayImage) -> RawImage {
    let mut out = Cursor::new(Vec::new());
    gray.write_to(&mut out, ImageFormat::Png).unwrap();
    RawImage::new(out.into_inner(), Some("image/png"))
}

/// Fake back-ends: the card portrait encodes to all zeros and the selfie face
/// lies at distance `selfie_distance` from it.
pub struct Backends {
    pub text: FakeText,
    pub card_faces: bool,
    pub selfie_faces: bool,
    pub selfie_distance: f32,
}

impl Default for Backends {
    fn default() -> Self {
        Self {
            text: FakeText::new("REPUBLICA DE CHILE CEDULA DE IDENTIDAD"),
            card_faces: true,
            selfie_faces: true,
            selfie_distance: 0.25,
        }
    }
}

impl Backends {
    pub fn engine(self) -> VerificationEngine {
        let mut detector = FakeDetector::new();
        if self.card_faces {
            let portrait = face_covering(CARD_WIDTH, CARD_HEIGHT, 0.05);
            detector = detector.with(CARD_WIDTH, vec![portrait]);
        }
        if self.selfie_faces {
            let face = face_covering(SELFIE_WIDTH, SELFIE_HEIGHT, 0.3);
            detector = detector.with(SELFIE_WIDTH, vec![face]);
        }
        let encoder = FakeEncoder::new(DIM)
            .with(CARD_WIDTH, constant(DIM, 0.0))
            .with(SELFIE_WIDTH, offset(DIM, self.selfie_distance));
        VerificationEngine::new(Box::new(self.text), Box::new(detector), Box::new(encoder))
    }

    pub fn pipeline(self, parallel: bool) -> VerificationPipeline {
        let config = VerificationConfig {
            parallel,
            ..VerificationConfig::default()
        };
        VerificationPipeline::new(Arc::new(self.engine()), config)
    }
}
