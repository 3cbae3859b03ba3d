//! Document framing: completeness and alignment.

use cedula_core::ModelError;
use cedula_imaging::edges;
use cedula_imaging::HoughLine;

use super::{Gate, GateInput, Verdict};
use crate::config::OrientationAxes;
use crate::outcome::FailureReason;

/// Rejects images whose Canny edge map has too few edge pixels, which is what
/// a card cut off by the frame or shot against a plain surface looks like.
pub struct CropGate {
    min_edges: usize,
}

impl CropGate {
    pub fn new(min_edges: usize) -> Self {
        Self { min_edges }
    }
}

impl Gate for CropGate {
    fn name(&self) -> &'static str {
        "crop"
    }

    fn check(&self, input: &GateInput<'_>) -> Result<Verdict, ModelError> {
        let count = edges::edge_count(input.edges());
        tracing::debug!(edge_pixels = count, min = self.min_edges, "edge energy");
        if count < self.min_edges {
            return Ok(Verdict::Reject(FailureReason::CroppedImage));
        }
        Ok(Verdict::Pass)
    }
}

/// Requires at least one strong straight line (card border, print rows)
/// within tolerance of an accepted axis.
pub struct OrientationGate {
    vote_threshold: u32,
    tolerance_degrees: f32,
    axes: OrientationAxes,
}

impl OrientationGate {
    pub fn new(vote_threshold: u32, tolerance_degrees: f32, axes: OrientationAxes) -> Self {
        Self {
            vote_threshold,
            tolerance_degrees,
            axes,
        }
    }
}

impl Gate for OrientationGate {
    fn name(&self) -> &'static str {
        "orientation"
    }

    fn check(&self, input: &GateInput<'_>) -> Result<Verdict, ModelError> {
        let lines = edges::hough_lines(input.edges(), self.vote_threshold);
        let aligned = most_aligned(&lines, self.axes)
            .filter(|line| {
                self.axes.deviation_degrees(line.theta_degrees) <= self.tolerance_degrees
            });

        match aligned {
            Some(line) => {
                tracing::debug!(
                    lines = lines.len(),
                    theta = line.theta_degrees,
                    votes = line.votes,
                    "axis-aligned line found"
                );
                Ok(Verdict::Pass)
            }
            None => {
                tracing::debug!(
                    lines = lines.len(),
                    tolerance = self.tolerance_degrees,
                    "no axis-aligned line"
                );
                Ok(Verdict::Reject(FailureReason::WrongOrientation))
            }
        }
    }
}

/// The line closest to an accepted axis. `lines` come strongest first, so
/// ties go to the line with more votes.
pub fn most_aligned(lines: &[HoughLine], axes: OrientationAxes) -> Option<&HoughLine> {
    lines.iter().reduce(|best, line| {
        if axes.deviation_degrees(line.theta_degrees) < axes.deviation_degrees(best.theta_degrees) {
            line
        } else {
            best
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fake_engine;
    use cedula_imaging::DecodedImage;
    use image::{GrayImage, Luma};

    /// Light card with one dark horizontal band.
    fn banded(width: u32, height: u32) -> DecodedImage {
        let gray = GrayImage::from_fn(width, height, |_, y| {
            if (height / 2..height / 2 + 10).contains(&y) { Luma([30]) } else { Luma([220]) }
        });
        DecodedImage::from_gray(gray).unwrap()
    }

    /// Light card with one 10 px dark band rising `degrees` from left to right.
    fn tilted(width: u32, height: u32, y0: f32, degrees: f32) -> DecodedImage {
        let slope = degrees.to_radians().tan();
        let gray = GrayImage::from_fn(width, height, |x, y| {
            let top = y0 + x as f32 * slope;
            if (top..top + 10.0).contains(&(y as f32)) { Luma([30]) } else { Luma([220]) }
        });
        DecodedImage::from_gray(gray).unwrap()
    }

    /// Light card with one dark vertical band.
    fn vertical_band(width: u32, height: u32) -> DecodedImage {
        let gray = GrayImage::from_fn(width, height, |x, _| {
            if (width / 2..width / 2 + 10).contains(&x) { Luma([30]) } else { Luma([220]) }
        });
        DecodedImage::from_gray(gray).unwrap()
    }

    fn orientation(image: &DecodedImage, axes: OrientationAxes) -> Verdict {
        let engine = fake_engine("");
        OrientationGate::new(200, 5.0, axes)
            .check(&GateInput::new(image, &engine, 50.0, 150.0))
            .unwrap()
    }

    /// Light card with one dark band along the diagonal.
    fn diagonal(size: u32) -> DecodedImage {
        let gray = GrayImage::from_fn(size, size, |x, y| {
            if (x as i64 - y as i64).abs() < 6 { Luma([30]) } else { Luma([220]) }
        });
        DecodedImage::from_gray(gray).unwrap()
    }

    #[test]
    fn test_flat_image_is_cropped() {
        let engine = fake_engine("");
        let flat = DecodedImage::from_gray(GrayImage::from_pixel(300, 200, Luma([200]))).unwrap();
        let verdict = CropGate::new(1000)
            .check(&GateInput::new(&flat, &engine, 50.0, 150.0))
            .unwrap();
        assert_eq!(verdict, Verdict::Reject(FailureReason::CroppedImage));
    }

    #[test]
    fn test_edge_threshold_boundary() {
        let engine = fake_engine("");
        let image = banded(400, 200);
        let input = GateInput::new(&image, &engine, 50.0, 150.0);
        let count = edges::edge_count(input.edges());
        assert!(count > 0);
        assert_eq!(CropGate::new(count).check(&input).unwrap(), Verdict::Pass);
        assert_eq!(
            CropGate::new(count + 1).check(&input).unwrap(),
            Verdict::Reject(FailureReason::CroppedImage)
        );
    }

    #[test]
    fn test_horizontal_band_is_oriented() {
        assert_eq!(orientation(&banded(400, 200), OrientationAxes::Both), Verdict::Pass);
    }

    #[test]
    fn test_slight_tilt_is_within_tolerance() {
        let image = tilted(800, 300, 120.0, 2.0);
        assert_eq!(orientation(&image, OrientationAxes::Both), Verdict::Pass);
        assert_eq!(orientation(&image, OrientationAxes::Horizontal), Verdict::Pass);
    }

    #[test]
    fn test_ten_degree_tilt_is_misoriented() {
        let image = tilted(800, 300, 60.0, 10.0);
        assert_eq!(
            orientation(&image, OrientationAxes::Both),
            Verdict::Reject(FailureReason::WrongOrientation)
        );
    }

    #[test]
    fn test_diagonal_band_is_misoriented() {
        assert_eq!(
            orientation(&diagonal(400), OrientationAxes::Both),
            Verdict::Reject(FailureReason::WrongOrientation)
        );
    }

    #[test]
    fn test_vertical_band_needs_both_axes() {
        let image = vertical_band(300, 400);
        assert_eq!(orientation(&image, OrientationAxes::Both), Verdict::Pass);
        assert_eq!(
            orientation(&image, OrientationAxes::Horizontal),
            Verdict::Reject(FailureReason::WrongOrientation)
        );
    }

    #[test]
    fn test_no_lines_is_misoriented() {
        let flat = DecodedImage::from_gray(GrayImage::from_pixel(300, 200, Luma([200]))).unwrap();
        assert_eq!(
            orientation(&flat, OrientationAxes::Both),
            Verdict::Reject(FailureReason::WrongOrientation)
        );
    }

    #[test]
    fn test_most_aligned() {
        let line = |theta_degrees: f32, votes: u32| HoughLine { rho: 0.0, theta_degrees, votes };
        let lines = [line(45.0, 900), line(3.0, 300), line(88.0, 250)];
        assert_eq!(most_aligned(&lines, OrientationAxes::Both), Some(&lines[2]));
        assert_eq!(most_aligned(&lines, OrientationAxes::Horizontal), Some(&lines[2]));
        let vertical = [line(45.0, 900), line(1.0, 300)];
        assert_eq!(most_aligned(&vertical, OrientationAxes::Both), Some(&vertical[1]));
        assert_eq!(most_aligned(&vertical, OrientationAxes::Horizontal), Some(&vertical[0]));
        assert_eq!(most_aligned(&[], OrientationAxes::Both), None);
    }
}
