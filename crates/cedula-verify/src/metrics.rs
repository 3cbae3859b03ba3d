//! Raster measurements behind the quality and structure gates, without models.
//!
//! Used for diagnostics: the same operators the gates run, reported as raw
//! numbers next to the configured thresholds.

use cedula_imaging::{edges, DecodedImage};
use serde::Serialize;

use crate::config::VerificationConfig;
use crate::gates::{content, quality, structural};
use crate::outcome::Side;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageMetrics {
    pub width: u32,
    pub height: u32,
    pub blur_variance: f64,
    pub edge_pixels: usize,
    /// Hough lines above the vote threshold.
    pub lines: usize,
    /// Deviation of the most axis-aligned line, if any line was found.
    pub best_axis_deviation: Option<f32>,
    /// Back side only.
    pub fingerprint_contours: Option<usize>,
}

/// One measurement against its threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricCheck {
    pub name: &'static str,
    pub value: String,
    pub requirement: String,
    pub passed: bool,
}

impl ImageMetrics {
    pub fn measure(image: &DecodedImage, side: Side, config: &VerificationConfig) -> Self {
        let gray = image.gray();
        let edge_map = edges::canny(gray, config.canny_low, config.canny_high);
        let lines = edges::hough_lines(&edge_map, config.hough_vote_threshold);
        Self {
            width: image.width(),
            height: image.height(),
            blur_variance: quality::blur_variance(gray),
            edge_pixels: edges::edge_count(&edge_map),
            lines: lines.len(),
            best_axis_deviation: structural::most_aligned(&lines, config.orientation_axes)
                .map(|line| config.orientation_axes.deviation_degrees(line.theta_degrees)),
            fingerprint_contours: (side == Side::Back).then(|| {
                content::fingerprint_contours(gray, config.fingerprint_gradient_threshold)
            }),
        }
    }

    /// Compare against `config`, in gate order.
    pub fn checks(&self, config: &VerificationConfig) -> Vec<MetricCheck> {
        let mut checks = vec![
            MetricCheck {
                name: "resolution",
                value: format!("{}x{}", self.width, self.height),
                requirement: format!(">= {}x{}", config.min_width, config.min_height),
                passed: self.width >= config.min_width && self.height >= config.min_height,
            },
            MetricCheck {
                name: "blur",
                value: format!("{:.2}", self.blur_variance),
                requirement: format!(">= {}", config.blur_threshold),
                passed: self.blur_variance >= config.blur_threshold,
            },
            MetricCheck {
                name: "crop",
                value: self.edge_pixels.to_string(),
                requirement: format!(">= {}", config.edge_energy_threshold),
                passed: self.edge_pixels >= config.edge_energy_threshold,
            },
            MetricCheck {
                name: "orientation",
                value: match self.best_axis_deviation {
                    Some(deviation) => format!("{deviation:.1} deg ({} lines)", self.lines),
                    None => "no lines".to_string(),
                },
                requirement: format!("<= {} deg", config.orientation_tolerance_degrees),
                passed: self
                    .best_axis_deviation
                    .is_some_and(|d| d <= config.orientation_tolerance_degrees),
            },
        ];
        if let Some(count) = self.fingerprint_contours {
            checks.push(MetricCheck {
                name: "fingerprint",
                value: count.to_string(),
                requirement: format!("> {}", config.fingerprint_min_contours),
                passed: count > config.fingerprint_min_contours,
            });
        }
        checks
    }
}
