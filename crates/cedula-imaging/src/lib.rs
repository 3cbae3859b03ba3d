//! cedula-imaging: Image decoding and raster operators.
//!
//! Decodes uploaded JPEG/PNG payloads into RGB buffers with a lazily derived
//! grayscale view, and provides the pure operators the document gates are
//! built from: smoothing, Laplacian variance, Sobel gradients, Canny edges,
//! Hough lines, Otsu binarization and external contour counting.

pub mod contours;
pub mod decode;
pub mod edges;
pub mod filters;

pub use decode::{DecodeError, DecodedImage, ImageDecoder, RawImage};
pub use edges::HoughLine;
