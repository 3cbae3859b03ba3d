//! Face alignment via a 4-DOF similarity transform.
//!
//! Maps the five detected landmarks onto the InsightFace reference positions
//! of a 112×112 crop (closed-form least squares) and warps the face into that
//! canonical frame for ArcFace.

use image::{GrayImage, Luma};

/// ArcFace reference landmarks for a 112×112 output.
pub const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

pub const ALIGNED_SIZE: u32 = 112;

/// `dst = [a -b; b a] · src + (tx, ty)`: uniform scale, rotation, translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityTransform {
    pub a: f32,
    pub b: f32,
    pub tx: f32,
    pub ty: f32,
}

impl SimilarityTransform {
    /// Least-squares fit from `src` to `dst`.
    ///
    /// Returns `None` when the source points are coincident.
    pub fn estimate(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> Option<Self> {
        let n = src.len() as f32;
        let (msx, msy) = src.iter().fold((0.0, 0.0), |(x, y), p| (x + p.0 / n, y + p.1 / n));
        let (mdx, mdy) = dst.iter().fold((0.0, 0.0), |(x, y), p| (x + p.0 / n, y + p.1 / n));

        let mut spread = 0.0f32;
        let mut dot = 0.0f32;
        let mut cross = 0.0f32;
        for (s, d) in src.iter().zip(dst.iter()) {
            let (sx, sy) = (s.0 - msx, s.1 - msy);
            let (dx, dy) = (d.0 - mdx, d.1 - mdy);
            spread += sx * sx + sy * sy;
            dot += sx * dx + sy * dy;
            cross += sx * dy - sy * dx;
        }
        if spread < 1e-9 {
            return None;
        }

        let a = dot / spread;
        let b = cross / spread;
        Some(Self {
            a,
            b,
            tx: mdx - (a * msx - b * msy),
            ty: mdy - (b * msx + a * msy),
        })
    }

    pub fn apply(&self, (x, y): (f32, f32)) -> (f32, f32) {
        (self.a * x - self.b * y + self.tx, self.b * x + self.a * y + self.ty)
    }

    /// Map a destination point back into the source frame.
    pub fn invert(&self, (x, y): (f32, f32)) -> Option<(f32, f32)> {
        let det = self.a * self.a + self.b * self.b;
        if det < 1e-12 {
            return None;
        }
        let (dx, dy) = (x - self.tx, y - self.ty);
        Some(((self.a * dx + self.b * dy) / det, (self.a * dy - self.b * dx) / det))
    }

    /// Warp `src` into a `size`×`size` output with bilinear sampling.
    ///
    /// Output pixels that map outside the source are black.
    pub fn warp(&self, src: &GrayImage, size: u32) -> GrayImage {
        let (w, h) = (src.width() as i64, src.height() as i64);
        let sample = |x: i64, y: i64| -> f32 {
            if x >= 0 && y >= 0 && x < w && y < h {
                src.get_pixel(x as u32, y as u32).0[0] as f32
            } else {
                0.0
            }
        };

        GrayImage::from_fn(size, size, |ox, oy| {
            let Some((sx, sy)) = self.invert((ox as f32, oy as f32)) else {
                return Luma([0]);
            };
            let (x0, y0) = (sx.floor() as i64, sy.floor() as i64);
            let (fx, fy) = (sx - x0 as f32, sy - y0 as f32);
            let val = sample(x0, y0) * (1.0 - fx) * (1.0 - fy)
                + sample(x0 + 1, y0) * fx * (1.0 - fy)
                + sample(x0, y0 + 1) * (1.0 - fx) * fy
                + sample(x0 + 1, y0 + 1) * fx * fy;
            Luma([val.round().clamp(0.0, 255.0) as u8])
        })
    }
}

/// Align a face to the canonical 112×112 crop. `None` for degenerate landmarks.
pub fn align_face(gray: &GrayImage, landmarks: &[(f32, f32); 5]) -> Option<GrayImage> {
    let transform = SimilarityTransform::estimate(landmarks, &REFERENCE_LANDMARKS_112)?;
    Some(transform.warp(gray, ALIGNED_SIZE))
}
