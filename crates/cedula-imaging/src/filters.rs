//! Pure raster operators over 8-bit grayscale buffers.
//!
//! Every operator returns a new buffer. Borders are handled with reflect-101
//! (`gfedcb|abcdefgh|gfedcba`) so results match the usual OpenCV defaults.

use image::{GrayImage, Luma};

/// Sobel kernel size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SobelAperture {
    Three,
    Five,
}

impl SobelAperture {
    fn kernels(self) -> (&'static [f32], &'static [f32]) {
        match self {
            SobelAperture::Three => (&[-1.0, 0.0, 1.0], &[1.0, 2.0, 1.0]),
            SobelAperture::Five => (&[-1.0, -2.0, 0.0, 2.0, 1.0], &[1.0, 4.0, 6.0, 4.0, 1.0]),
        }
    }
}

/// Horizontal and vertical first derivatives, row-major.
#[derive(Debug, Clone)]
pub struct GradientField {
    pub width: u32,
    pub height: u32,
    pub gx: Vec<f32>,
    pub gy: Vec<f32>,
}

impl GradientField {
    /// Euclidean gradient magnitude `sqrt(gx² + gy²)`.
    pub fn magnitude(&self) -> Vec<f32> {
        self.gx
            .iter()
            .zip(&self.gy)
            .map(|(x, y)| (x * x + y * y).sqrt())
            .collect()
    }

    /// L1 gradient magnitude `|gx| + |gy|`.
    pub fn l1_magnitude(&self) -> Vec<f32> {
        self.gx.iter().zip(&self.gy).map(|(x, y)| x.abs() + y.abs()).collect()
    }
}

#[inline]
pub(crate) fn reflect101(i: i64, n: u32) -> u32 {
    let n = n as i64;
    if n <= 1 {
        return 0;
    }
    let mut i = i;
    while i < 0 || i >= n {
        i = if i < 0 { -i } else { 2 * n - 2 - i };
    }
    i as u32
}

/// Correlate with a separable kernel: `row_kernel` along x, `col_kernel` along y.
fn separable(gray: &GrayImage, row_kernel: &[f32], col_kernel: &[f32]) -> Vec<f32> {
    let (w, h) = gray.dimensions();
    let rx = (row_kernel.len() / 2) as i64;
    let ry = (col_kernel.len() / 2) as i64;
    let src = gray.as_raw();

    let mut rows = vec![0.0f32; (w * h) as usize];
    for y in 0..h {
        let line = &src[(y * w) as usize..((y + 1) * w) as usize];
        for x in 0..w {
            let mut acc = 0.0f32;
            for (k, coeff) in row_kernel.iter().enumerate() {
                let sx = reflect101(x as i64 + k as i64 - rx, w);
                acc += coeff * line[sx as usize] as f32;
            }
            rows[(y * w + x) as usize] = acc;
        }
    }

    let mut out = vec![0.0f32; (w * h) as usize];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for (k, coeff) in col_kernel.iter().enumerate() {
                let sy = reflect101(y as i64 + k as i64 - ry, h);
                acc += coeff * rows[(sy * w + x) as usize];
            }
            out[(y * w + x) as usize] = acc;
        }
    }
    out
}

/// 3×3 Gaussian smoothing (kernel `[1 2 1] / 4` in each direction).
pub fn gaussian_blur_3x3(gray: &GrayImage) -> GrayImage {
    let (w, h) = gray.dimensions();
    let smoothed = separable(gray, &[1.0, 2.0, 1.0], &[1.0, 2.0, 1.0]);
    let data = smoothed
        .iter()
        .map(|v| (v / 16.0).round().clamp(0.0, 255.0) as u8)
        .collect();
    GrayImage::from_raw(w, h, data).unwrap_or_else(|| GrayImage::new(w, h))
}

/// Variance of the 4-neighbour Laplacian response over every pixel.
///
/// Non-negative; higher means more high-frequency detail (sharper).
pub fn laplacian_variance(gray: &GrayImage) -> f64 {
    let (w, h) = gray.dimensions();
    if w == 0 || h == 0 {
        return 0.0;
    }
    let px = |x: i64, y: i64| -> f64 {
        gray.get_pixel(reflect101(x, w), reflect101(y, h)).0[0] as f64
    };

    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let lap = px(x - 1, y) + px(x + 1, y) + px(x, y - 1) + px(x, y + 1) - 4.0 * px(x, y);
            sum += lap;
            sum_sq += lap * lap;
        }
    }

    let count = (w as f64) * (h as f64);
    let mean = sum / count;
    (sum_sq / count - mean * mean).max(0.0)
}

/// Sobel derivatives in both directions.
pub fn sobel(gray: &GrayImage, aperture: SobelAperture) -> GradientField {
    let (deriv, smooth) = aperture.kernels();
    GradientField {
        width: gray.width(),
        height: gray.height(),
        gx: separable(gray, deriv, smooth),
        gy: separable(gray, smooth, deriv),
    }
}

/// Binary threshold: values strictly above `threshold` become 255, others 0.
pub fn threshold_binary(values: &[f32], width: u32, height: u32, threshold: f32) -> GrayImage {
    let data = values
        .iter()
        .map(|&v| if v > threshold { 255 } else { 0 })
        .collect();
    GrayImage::from_raw(width, height, data).unwrap_or_else(|| GrayImage::new(width, height))
}

/// Otsu's threshold: the level maximizing between-class variance.
pub fn otsu_level(gray: &GrayImage) -> u8 {
    let mut hist = [0u64; 256];
    for p in gray.pixels() {
        hist[p.0[0] as usize] += 1;
    }
    let total: u64 = hist.iter().sum();
    if total == 0 {
        return 0;
    }

    let weighted_total: f64 = hist.iter().enumerate().map(|(i, &c)| i as f64 * c as f64).sum();
    let mut weight_bg = 0u64;
    let mut sum_bg = 0.0f64;
    let mut best_level = 0u8;
    let mut best_var = -1.0f64;

    for (level, &count) in hist.iter().enumerate() {
        weight_bg += count;
        if weight_bg == 0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0 {
            break;
        }
        sum_bg += level as f64 * count as f64;
        let mean_bg = sum_bg / weight_bg as f64;
        let mean_fg = (weighted_total - sum_bg) / weight_fg as f64;
        let between = weight_bg as f64 * weight_fg as f64 * (mean_bg - mean_fg).powi(2);
        if between > best_var {
            best_var = between;
            best_level = level as u8;
        }
    }
    best_level
}

/// Binarize with Otsu's level: pixels above the level become white.
pub fn binarize_otsu(gray: &GrayImage) -> GrayImage {
    let level = otsu_level(gray);
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if gray.get_pixel(x, y).0[0] > level {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}

/// Top-right quadrant (`x >= w/2`, `y < h/2`) as a new buffer.
pub fn top_right_quadrant(gray: &GrayImage) -> GrayImage {
    let (w, h) = gray.dimensions();
    let left = w / 2;
    image::imageops::crop_imm(gray, left, 0, w - left, h / 2).to_image()
}
