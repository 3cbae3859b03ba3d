use proptest::prelude::*;

use cedula_core::{EuclideanMatcher, FaceEncoding, Matcher};

fn encoding(dim: usize) -> impl Strategy<Value = FaceEncoding> {
    prop::collection::vec(-1.0f32..1.0, dim).prop_map(FaceEncoding::new)
}

proptest! {
    /// An encoding is at distance zero from itself.
    #[test]
    fn distance_identity(e in encoding(128)) {
        prop_assert_eq!(e.distance(&e), 0.0);
    }

    /// Distance does not depend on argument order.
    #[test]
    fn distance_symmetry(a in encoding(64), b in encoding(64)) {
        prop_assert!((a.distance(&b) - b.distance(&a)).abs() < 1e-5);
    }

    /// `matched` is exactly `distance <= tolerance`.
    #[test]
    fn matched_iff_within_tolerance(
        a in encoding(32),
        b in encoding(32),
        tolerance in 0.0f32..4.0,
    ) {
        let result = EuclideanMatcher.compare(&a, &[b.clone()], tolerance);
        prop_assert_eq!(result.matched, a.distance(&b) <= tolerance);
        prop_assert_eq!(result.distance, a.distance(&b));
    }

    /// The reported distance is the minimum over all candidates.
    #[test]
    fn distance_is_minimum(
        reference in encoding(16),
        candidates in prop::collection::vec(encoding(16), 1..6),
    ) {
        let result = EuclideanMatcher.compare(&reference, &candidates, 0.6);
        let min = candidates.iter().map(|c| reference.distance(c)).fold(f32::INFINITY, f32::min);
        prop_assert_eq!(result.distance, min);
    }
}
