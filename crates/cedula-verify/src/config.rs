use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use cedula_imaging::{edges, ImageDecoder};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Longest accepted overall timeout (one hour).
pub const MAX_OVERALL_TIMEOUT_SECONDS: u64 = 3_600;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Which face on the ID front is compared when several are detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaceSelection {
    /// Largest bounding box (the printed portrait beats background faces).
    LargestRegion,
    HighestConfidence,
    First,
}

impl FromStr for FaceSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "largest_region" => Ok(Self::LargestRegion),
            "highest_confidence" => Ok(Self::HighestConfidence),
            "first" => Ok(Self::First),
            other => Err(format!("unknown face selection policy: {other}")),
        }
    }
}

/// Line directions the orientation check accepts as upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrientationAxes {
    /// Horizontal or vertical lines (portrait captures of a landscape card pass).
    Both,
    /// Horizontal lines only.
    Horizontal,
}

impl OrientationAxes {
    /// Angular distance of a Hough line at `theta_degrees` from the accepted axes.
    pub fn deviation_degrees(self, theta_degrees: f32) -> f32 {
        match self {
            Self::Both => edges::axis_deviation_degrees(theta_degrees),
            Self::Horizontal => edges::horizontal_deviation_degrees(theta_degrees),
        }
    }
}

impl FromStr for OrientationAxes {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "both" => Ok(Self::Both),
            "horizontal" => Ok(Self::Horizontal),
            other => Err(format!("unknown orientation axes: {other}")),
        }
    }
}

/// Language of user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    Es,
    En,
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "es" => Ok(Self::Es),
            "en" => Ok(Self::En),
            other => Err(format!("unsupported locale: {other}")),
        }
    }
}

/// Model file locations and OCR settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    pub detector_file: String,
    pub encoder_file: String,
    /// Minimum SCRFD anchor score.
    pub detector_confidence: f32,
    pub tesseract_path: PathBuf,
    /// Passed to tesseract as `TESSDATA_PREFIX` when set.
    pub tessdata_dir: Option<PathBuf>,
    /// Tesseract language code (Chilean ID cards are Spanish).
    pub ocr_language: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_dir: cedula_core::default_model_dir(),
            detector_file: cedula_core::DETECTOR_MODEL_FILE.to_string(),
            encoder_file: cedula_core::ENCODER_MODEL_FILE.to_string(),
            detector_confidence: 0.5,
            tesseract_path: PathBuf::from("/usr/bin/tesseract"),
            tessdata_dir: None,
            ocr_language: "spa".to_string(),
        }
    }
}

impl ModelConfig {
    /// Path to the SCRFD detection model.
    pub fn detector_path(&self) -> PathBuf {
        self.model_dir.join(&self.detector_file)
    }

    /// Path to the ArcFace recognition model.
    pub fn encoder_path(&self) -> PathBuf {
        self.model_dir.join(&self.encoder_file)
    }
}

/// Thresholds and runtime options for one deployment.
///
/// Every field has a default; a TOML file and `CEDULA_*` environment
/// variables override them in that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    pub min_width: u32,
    pub min_height: u32,
    /// Minimum Laplacian variance of the smoothed grayscale image.
    pub blur_threshold: f64,
    /// Minimum number of Canny edge pixels.
    pub edge_energy_threshold: usize,
    pub orientation_tolerance_degrees: f32,
    pub orientation_axes: OrientationAxes,
    /// The back passes only with strictly more contours than this.
    pub fingerprint_min_contours: usize,
    /// Maximum Euclidean encoding distance for a match.
    pub face_match_tolerance: f32,
    pub overall_timeout_seconds: u64,
    /// Upload limit per image.
    pub max_image_bytes: usize,
    /// Decoded pixel limit per image, checked before decoding.
    pub max_image_pixels: u64,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Minimum Hough accumulator votes for a line.
    pub hough_vote_threshold: u32,
    /// Sobel magnitude above which a pixel counts as fingerprint ridge.
    pub fingerprint_gradient_threshold: f32,
    /// Minimum face box area as a fraction of the image area.
    pub face_min_area_fraction: f32,
    pub face_selection: FaceSelection,
    /// Run the side chains and encodings on separate threads.
    pub parallel: bool,
    pub locale: Locale,
    pub models: ModelConfig,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            min_width: 800,
            min_height: 500,
            blur_threshold: 40.0,
            edge_energy_threshold: 1000,
            orientation_tolerance_degrees: 5.0,
            orientation_axes: OrientationAxes::Both,
            fingerprint_min_contours: 5,
            face_match_tolerance: 0.6,
            overall_timeout_seconds: 10,
            max_image_bytes: cedula_imaging::decode::DEFAULT_MAX_IMAGE_BYTES,
            max_image_pixels: cedula_imaging::decode::DEFAULT_MAX_IMAGE_PIXELS,
            canny_low: 50.0,
            canny_high: 150.0,
            hough_vote_threshold: 200,
            fingerprint_gradient_threshold: 100.0,
            face_min_area_fraction: 0.01,
            face_selection: FaceSelection::LargestRegion,
            parallel: true,
            locale: Locale::Es,
            models: ModelConfig::default(),
        }
    }
}

impl VerificationConfig {
    /// Defaults, then the optional TOML file, then `CEDULA_*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Override fields from `CEDULA_*` environment variables.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Override fields from any key lookup. Unparsable values are logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = &lookup;
        set(&mut self.min_width, "CEDULA_MIN_WIDTH", lookup);
        set(&mut self.min_height, "CEDULA_MIN_HEIGHT", lookup);
        set(&mut self.blur_threshold, "CEDULA_BLUR_THRESHOLD", lookup);
        set(&mut self.edge_energy_threshold, "CEDULA_EDGE_ENERGY_THRESHOLD", lookup);
        set(
            &mut self.orientation_tolerance_degrees,
            "CEDULA_ORIENTATION_TOLERANCE_DEGREES",
            lookup,
        );
        set(&mut self.orientation_axes, "CEDULA_ORIENTATION_AXES", lookup);
        set(&mut self.fingerprint_min_contours, "CEDULA_FINGERPRINT_MIN_CONTOURS", lookup);
        set(&mut self.face_match_tolerance, "CEDULA_FACE_MATCH_TOLERANCE", lookup);
        set(&mut self.overall_timeout_seconds, "CEDULA_OVERALL_TIMEOUT_SECONDS", lookup);
        set(&mut self.max_image_bytes, "CEDULA_MAX_IMAGE_BYTES", lookup);
        set(&mut self.max_image_pixels, "CEDULA_MAX_IMAGE_PIXELS", lookup);
        set(&mut self.canny_low, "CEDULA_CANNY_LOW", lookup);
        set(&mut self.canny_high, "CEDULA_CANNY_HIGH", lookup);
        set(&mut self.hough_vote_threshold, "CEDULA_HOUGH_VOTE_THRESHOLD", lookup);
        set(
            &mut self.fingerprint_gradient_threshold,
            "CEDULA_FINGERPRINT_GRADIENT_THRESHOLD",
            lookup,
        );
        set(&mut self.face_min_area_fraction, "CEDULA_FACE_MIN_AREA_FRACTION", lookup);
        set(&mut self.face_selection, "CEDULA_FACE_SELECTION", lookup);
        set(&mut self.locale, "CEDULA_LOCALE", lookup);
        if let Some(v) = lookup("CEDULA_PARALLEL") {
            self.parallel = v != "0";
        }
        if let Some(v) = lookup("CEDULA_MODEL_DIR") {
            self.models.model_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("CEDULA_TESSERACT_PATH") {
            self.models.tesseract_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("CEDULA_TESSDATA_DIR") {
            self.models.tessdata_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("CEDULA_OCR_LANGUAGE") {
            self.models.ocr_language = v;
        }
    }

    /// Reject values no deployment could mean.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field, reason: &str| {
            Err(ConfigError::Invalid {
                field,
                reason: reason.to_string(),
            })
        };
        if self.min_width == 0 || self.min_height == 0 {
            return invalid("min_width/min_height", "must be positive");
        }
        if !(self.blur_threshold >= 0.0) {
            return invalid("blur_threshold", "must be non-negative");
        }
        if !(self.face_match_tolerance >= 0.0) {
            return invalid("face_match_tolerance", "must be non-negative");
        }
        if !(0.0..=90.0).contains(&self.orientation_tolerance_degrees) {
            return invalid("orientation_tolerance_degrees", "must be within 0..=90");
        }
        if self.canny_low > self.canny_high {
            return invalid("canny_low", "must not exceed canny_high");
        }
        if !(0.0..=1.0).contains(&self.face_min_area_fraction) {
            return invalid("face_min_area_fraction", "must be within 0..=1");
        }
        if !(1..=MAX_OVERALL_TIMEOUT_SECONDS).contains(&self.overall_timeout_seconds) {
            return invalid("overall_timeout_seconds", "must be within 1..=3600");
        }
        if self.max_image_bytes == 0 {
            return invalid("max_image_bytes", "must be positive");
        }
        if self.max_image_pixels == 0 {
            return invalid("max_image_pixels", "must be positive");
        }
        Ok(())
    }

    /// Clamped to [`MAX_OVERALL_TIMEOUT_SECONDS`] for configs built without `validate()`.
    pub fn overall_timeout(&self) -> Duration {
        Duration::from_secs(self.overall_timeout_seconds.min(MAX_OVERALL_TIMEOUT_SECONDS))
    }

    /// Deadline for a submission that starts at `start`.
    pub fn deadline_from(&self, start: Instant) -> Instant {
        start
            .checked_add(self.overall_timeout())
            .unwrap_or(start)
    }

    pub fn decoder(&self) -> ImageDecoder {
        ImageDecoder::new(self.max_image_bytes).with_max_pixels(self.max_image_pixels)
    }

    /// Render as TOML (for `cedula config`).
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

fn set<T: FromStr>(field: &mut T, key: &str, lookup: &dyn Fn(&str) -> Option<String>) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse() {
        Ok(value) => *field = value,
        Err(_) => tracing::warn!(key, value = %raw, "ignoring unparsable config override"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let c = VerificationConfig::default();
        assert_eq!((c.min_width, c.min_height), (800, 500));
        assert_eq!(c.blur_threshold, 40.0);
        assert_eq!(c.edge_energy_threshold, 1000);
        assert_eq!(c.orientation_tolerance_degrees, 5.0);
        assert_eq!(c.fingerprint_min_contours, 5);
        assert_eq!(c.face_match_tolerance, 0.6);
        assert_eq!(c.overall_timeout(), Duration::from_secs(10));
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let c = VerificationConfig::from_toml_str(
            r#"
            blur_threshold = 55.5
            face_selection = "highest_confidence"
            locale = "en"

            [models]
            ocr_language = "spa+eng"
            "#,
        )
        .unwrap();
        assert_eq!(c.blur_threshold, 55.5);
        assert_eq!(c.face_selection, FaceSelection::HighestConfidence);
        assert_eq!(c.locale, Locale::En);
        assert_eq!(c.models.ocr_language, "spa+eng");
        assert_eq!(c.min_width, 800);
        assert_eq!(c.models.detector_file, "det_10g.onnx");
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            VerificationConfig::from_toml_str("min_width = \"wide\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CEDULA_MIN_WIDTH", "1024"),
            ("CEDULA_FACE_MATCH_TOLERANCE", "0.45"),
            ("CEDULA_PARALLEL", "0"),
            ("CEDULA_LOCALE", "EN"),
            ("CEDULA_BLUR_THRESHOLD", "not-a-number"),
            ("CEDULA_MODEL_DIR", "/opt/cedula/models"),
            ("CEDULA_ORIENTATION_AXES", "horizontal"),
        ]
        .into_iter()
        .collect();

        let mut c = VerificationConfig::default();
        c.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(c.min_width, 1024);
        assert!((c.face_match_tolerance - 0.45).abs() < 1e-6);
        assert!(!c.parallel);
        assert_eq!(c.locale, Locale::En);
        assert_eq!(c.blur_threshold, 40.0);
        assert_eq!(c.orientation_axes, OrientationAxes::Horizontal);
        assert_eq!(c.models.detector_path(), PathBuf::from("/opt/cedula/models/det_10g.onnx"));
    }

    #[test]
    fn test_validate_rejects_inverted_canny() {
        let c = VerificationConfig { canny_low: 200.0, canny_high: 100.0, ..Default::default() };
        assert!(matches!(c.validate(), Err(ConfigError::Invalid { field: "canny_low", .. })));
    }

    #[test]
    fn test_validate_rejects_negative_tolerance() {
        let c = VerificationConfig { face_match_tolerance: -0.1, ..Default::default() };
        assert!(c.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unbounded_timeout() {
        let vars: HashMap<&str, &str> =
            [("CEDULA_OVERALL_TIMEOUT_SECONDS", "18446744073709551615")].into_iter().collect();
        let mut c = VerificationConfig::default();
        c.apply_overrides(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(c.overall_timeout_seconds, u64::MAX);
        assert!(matches!(
            c.validate(),
            Err(ConfigError::Invalid { field: "overall_timeout_seconds", .. })
        ));

        let c = VerificationConfig { overall_timeout_seconds: 3_600, ..Default::default() };
        assert!(c.validate().is_ok());
    }

    #[test]
    fn test_huge_timeout_yields_a_bounded_deadline() {
        let c = VerificationConfig { overall_timeout_seconds: u64::MAX, ..Default::default() };
        assert_eq!(c.overall_timeout(), Duration::from_secs(MAX_OVERALL_TIMEOUT_SECONDS));
        let start = Instant::now();
        assert_eq!(c.deadline_from(start), start + Duration::from_secs(3_600));
    }

    #[test]
    fn test_validate_rejects_zero_pixel_limit() {
        let c = VerificationConfig { max_image_pixels: 0, ..Default::default() };
        assert!(matches!(
            c.validate(),
            Err(ConfigError::Invalid { field: "max_image_pixels", .. })
        ));
    }

    #[test]
    fn test_toml_round_trip_of_defaults() {
        let c = VerificationConfig::default();
        let text = c.to_toml_string().unwrap();
        assert_eq!(VerificationConfig::from_toml_str(&text).unwrap(), c);
    }
}
