use cedula_core::{EuclideanMatcher, FaceEncoding, FaceRegion, MatchResult, Matcher, ModelError};
use cedula_imaging::DecodedImage;

use crate::config::FaceSelection;
use crate::engine::VerificationEngine;

/// A detected face and its encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFace {
    pub region: FaceRegion,
    pub encoding: FaceEncoding,
}

/// Encodes faces and compares the ID portrait against the selfie.
#[derive(Debug, Clone, Copy)]
pub struct FaceMatcher {
    tolerance: f32,
    selection: FaceSelection,
}

impl FaceMatcher {
    pub fn new(tolerance: f32, selection: FaceSelection) -> Self {
        Self { tolerance, selection }
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    /// Detect every face in the image and encode each one that has landmarks.
    ///
    /// An empty list means no face was found; that is a verdict for the
    /// caller, not an error.
    pub fn encode(
        &self,
        engine: &VerificationEngine,
        image: &DecodedImage,
    ) -> Result<Vec<EncodedFace>, ModelError> {
        let gray = image.gray();
        let regions = engine.detect_faces(gray)?;
        let mut faces = Vec::with_capacity(regions.len());
        for region in regions {
            if region.landmarks.is_none() {
                tracing::debug!(confidence = region.confidence, "skipping face without landmarks");
                continue;
            }
            let encoding = engine.encode_face(gray, &region)?;
            faces.push(EncodedFace { region, encoding });
        }
        tracing::debug!(faces = faces.len(), "faces encoded");
        Ok(faces)
    }

    /// The ID face to compare when the front shows more than one.
    pub fn select_reference<'a>(&self, faces: &'a [EncodedFace]) -> Option<&'a EncodedFace> {
        match self.selection {
            FaceSelection::First => faces.first(),
            // Ties keep the earlier detection.
            FaceSelection::LargestRegion => faces.iter().reduce(|best, f| {
                if f.region.area() > best.region.area() { f } else { best }
            }),
            FaceSelection::HighestConfidence => faces.iter().reduce(|best, f| {
                if f.region.confidence > best.region.confidence { f } else { best }
            }),
        }
    }

    /// Minimum distance from `reference` to any candidate; matched when
    /// within tolerance (inclusive).
    pub fn compare(&self, reference: &FaceEncoding, candidates: &[FaceEncoding]) -> MatchResult {
        EuclideanMatcher.compare(reference, candidates, self.tolerance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{constant, face_covering, FakeDetector, FakeEncoder, FakeText};
    use image::GrayImage;

    fn face(area_fraction: f32, confidence: f32, value: f32) -> EncodedFace {
        let mut region = face_covering(1000, 1000, area_fraction);
        region.confidence = confidence;
        EncodedFace {
            region,
            encoding: FaceEncoding::new(constant(4, value)),
        }
    }

    #[test]
    fn test_selection_policies() {
        let faces = vec![face(0.02, 0.99, 1.0), face(0.3, 0.7, 2.0), face(0.1, 0.8, 3.0)];

        let largest = FaceMatcher::new(0.6, FaceSelection::LargestRegion);
        assert_eq!(largest.select_reference(&faces), Some(&faces[1]));

        let confident = FaceMatcher::new(0.6, FaceSelection::HighestConfidence);
        assert_eq!(confident.select_reference(&faces), Some(&faces[0]));

        let first = FaceMatcher::new(0.6, FaceSelection::First);
        assert_eq!(first.select_reference(&faces), Some(&faces[0]));

        assert_eq!(largest.select_reference(&[]), None);
    }

    #[test]
    fn test_compare_uses_minimum_distance() {
        let matcher = FaceMatcher::new(0.6, FaceSelection::LargestRegion);
        let reference = FaceEncoding::new(constant(4, 0.0));
        let candidates = vec![
            FaceEncoding::new(constant(4, 0.85)),
            FaceEncoding::new(constant(4, 0.25)),
        ];
        let result = matcher.compare(&reference, &candidates);
        assert!(result.matched);
        assert!((result.distance - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_compare_tolerance_is_inclusive() {
        let matcher = FaceMatcher::new(0.5, FaceSelection::LargestRegion);
        let reference = FaceEncoding::new(constant(4, 0.0));
        let result = matcher.compare(&reference, &[FaceEncoding::new(constant(4, 0.25))]);
        assert!(result.matched, "distance {} at tolerance 0.5", result.distance);
    }

    #[test]
    fn test_compare_without_candidates() {
        let matcher = FaceMatcher::new(0.6, FaceSelection::LargestRegion);
        let result = matcher.compare(&FaceEncoding::new(constant(4, 0.0)), &[]);
        assert!(!result.matched);
        assert!(result.distance.is_infinite());
    }

    #[test]
    fn test_encode_every_detected_face() {
        let engine = VerificationEngine::new(
            Box::new(FakeText::new("")),
            Box::new(FakeDetector::new().with(
                640,
                vec![face_covering(640, 480, 0.2), face_covering(640, 480, 0.05)],
            )),
            Box::new(FakeEncoder::new(4).with(640, constant(4, 0.1))),
        );
        let selfie = DecodedImage::from_gray(GrayImage::new(640, 480)).unwrap();
        let matcher = FaceMatcher::new(0.6, FaceSelection::LargestRegion);
        let faces = matcher.encode(&engine, &selfie).unwrap();
        assert_eq!(faces.len(), 2);
        assert!(faces[0].region.area() > faces[1].region.area());
        assert_eq!(faces[0].encoding.dimension(), 4);

        let empty = DecodedImage::from_gray(GrayImage::new(300, 300)).unwrap();
        assert!(matcher.encode(&engine, &empty).unwrap().is_empty());
    }

    #[test]
    fn test_encode_skips_faces_without_landmarks() {
        let mut bare = face_covering(640, 480, 0.2);
        bare.landmarks = None;
        let engine = VerificationEngine::new(
            Box::new(FakeText::new("")),
            Box::new(FakeDetector::new().with(640, vec![bare])),
            Box::new(FakeEncoder::new(4).with(640, constant(4, 0.1))),
        );
        let selfie = DecodedImage::from_gray(GrayImage::new(640, 480)).unwrap();
        let faces = FaceMatcher::new(0.6, FaceSelection::First).encode(&engine, &selfie).unwrap();
        assert!(faces.is_empty());
    }
}
