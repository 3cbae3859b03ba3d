//! Payload decoding: raw upload bytes to RGB and grayscale buffers.

use image::{GrayImage, ImageFormat, ImageReader, Limits, Luma, Rgb, RgbImage};
use std::io::Cursor;
use std::sync::OnceLock;
use thiserror::Error;

/// Default upload limit per image (10 MiB).
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;

/// Default pixel limit per image (a 48 MP phone capture fits).
pub const DEFAULT_MAX_IMAGE_PIXELS: u64 = 50_000_000;

/// Upper bound on decoder allocations per pixel (16-bit RGBA).
const MAX_BYTES_PER_PIXEL: u64 = 8;

/// Declared content types accepted at the boundary. An absent type is sniffed.
const SUPPORTED_CONTENT_TYPES: [(&str, ImageFormat); 3] = [
    ("image/jpeg", ImageFormat::Jpeg),
    ("image/jpg", ImageFormat::Jpeg),
    ("image/png", ImageFormat::Png),
];

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("image payload is empty")]
    Empty,
    #[error("image payload is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
    #[error("image is {width}x{height} pixels, limit is {limit} pixels")]
    TooManyPixels { width: u32, height: u32, limit: u64 },
    #[error("unsupported content type: {0}")]
    UnsupportedContentType(String),
    #[error("declared content type {declared} does not match {detected:?} data")]
    ContentTypeMismatch { declared: String, detected: ImageFormat },
    #[error("unsupported image format (only JPEG and PNG are accepted)")]
    UnsupportedFormat,
    #[error("decoded image has zero width or height")]
    ZeroDimensions,
    #[error("malformed image: {0}")]
    Malformed(#[from] image::ImageError),
}

/// An uploaded image payload, exactly as received.
#[derive(Debug, Clone)]
pub struct RawImage {
    bytes: Vec<u8>,
    content_type: Option<String>,
}

impl RawImage {
    pub fn new(bytes: impl Into<Vec<u8>>, content_type: Option<&str>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type: content_type.map(str::to_string),
        }
    }

    /// Payload with no declared content type; the format is sniffed on decode.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(bytes, None)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// A decoded image: RGB pixels plus a grayscale view computed on first use.
///
/// Never mutated after construction. Operators that need a transformed view
/// (blurred, binarized, edge map) return a new buffer.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    rgb: RgbImage,
    gray: OnceLock<GrayImage>,
}

impl DecodedImage {
    pub fn from_rgb(rgb: RgbImage) -> Result<Self, DecodeError> {
        if rgb.width() == 0 || rgb.height() == 0 {
            return Err(DecodeError::ZeroDimensions);
        }
        Ok(Self {
            rgb,
            gray: OnceLock::new(),
        })
    }

    /// Build from a grayscale buffer, replicating luma into all three channels.
    pub fn from_gray(gray: GrayImage) -> Result<Self, DecodeError> {
        if gray.width() == 0 || gray.height() == 0 {
            return Err(DecodeError::ZeroDimensions);
        }
        let rgb = RgbImage::from_fn(gray.width(), gray.height(), |x, y| {
            let Luma([v]) = *gray.get_pixel(x, y);
            Rgb([v, v, v])
        });
        let cell = OnceLock::new();
        let _ = cell.set(gray);
        Ok(Self { rgb, gray: cell })
    }

    pub fn width(&self) -> u32 {
        self.rgb.width()
    }

    pub fn height(&self) -> u32 {
        self.rgb.height()
    }

    pub fn rgb(&self) -> &RgbImage {
        &self.rgb
    }

    /// BT.601 luma view, computed once and cached.
    pub fn gray(&self) -> &GrayImage {
        self.gray.get_or_init(|| rgb_to_gray(&self.rgb))
    }
}

/// Stateless JPEG/PNG decoder with upload size and pixel count limits.
///
/// The pixel limit is checked against the header before any pixel data is
/// decoded, so a small, highly compressed payload cannot expand into a huge
/// raster.
#[derive(Debug, Clone, Copy)]
pub struct ImageDecoder {
    max_bytes: usize,
    max_pixels: u64,
}

impl Default for ImageDecoder {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_IMAGE_BYTES,
            max_pixels: DEFAULT_MAX_IMAGE_PIXELS,
        }
    }
}

impl ImageDecoder {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            max_pixels: DEFAULT_MAX_IMAGE_PIXELS,
        }
    }

    pub fn with_max_pixels(self, max_pixels: u64) -> Self {
        Self { max_pixels, ..self }
    }

    pub fn decode(&self, raw: &RawImage) -> Result<DecodedImage, DecodeError> {
        if raw.is_empty() {
            return Err(DecodeError::Empty);
        }
        if raw.len() > self.max_bytes {
            return Err(DecodeError::TooLarge {
                size: raw.len(),
                limit: self.max_bytes,
            });
        }
        let declared = match raw.content_type() {
            Some(declared) => Some(
                declared_format(declared)
                    .ok_or_else(|| DecodeError::UnsupportedContentType(declared.to_string()))?,
            ),
            None => None,
        };

        let format =
            image::guess_format(raw.bytes()).map_err(|_| DecodeError::UnsupportedFormat)?;
        if !matches!(format, ImageFormat::Jpeg | ImageFormat::Png) {
            return Err(DecodeError::UnsupportedFormat);
        }
        if let (Some(expected), Some(declared)) = (declared, raw.content_type()) {
            if expected != format {
                return Err(DecodeError::ContentTypeMismatch {
                    declared: declared.to_string(),
                    detected: format,
                });
            }
        }

        let (width, height) =
            ImageReader::with_format(Cursor::new(raw.bytes()), format).into_dimensions()?;
        if u64::from(width) * u64::from(height) > self.max_pixels {
            return Err(DecodeError::TooManyPixels {
                width,
                height,
                limit: self.max_pixels,
            });
        }

        let mut limits = Limits::default();
        limits.max_image_width = Some(width);
        limits.max_image_height = Some(height);
        limits.max_alloc = Some(self.max_pixels.saturating_mul(MAX_BYTES_PER_PIXEL));
        let mut reader = ImageReader::with_format(Cursor::new(raw.bytes()), format);
        reader.limits(limits);
        let decoded = DecodedImage::from_rgb(reader.decode()?.to_rgb8())?;

        tracing::debug!(
            ?format,
            bytes = raw.len(),
            width = decoded.width(),
            height = decoded.height(),
            "decoded image"
        );

        Ok(decoded)
    }
}

/// The raster format a supported content type promises, parameters ignored.
fn declared_format(declared: &str) -> Option<ImageFormat> {
    let essence = declared
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    SUPPORTED_CONTENT_TYPES
        .iter()
        .find(|(name, _)| *name == essence)
        .map(|&(_, format)| format)
}

/// Convert RGB to grayscale with ITU-R BT.601 weights, rounding to nearest.
pub fn rgb_to_gray(rgb: &RgbImage) -> GrayImage {
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let Rgb([r, g, b]) = *rgb.get_pixel(x, y);
        let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
        Luma([luma.round().clamp(0.0, 255.0) as u8])
    })
}
