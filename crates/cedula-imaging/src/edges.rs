//! Canny edge detection and the standard Hough line transform.

use crate::filters::{sobel, SobelAperture};
use image::GrayImage;

const EDGE: u8 = 255;

/// tan(22.5°) and tan(67.5°): sector boundaries for gradient direction.
const TAN_22_5: f32 = 0.414_213_57;
const TAN_67_5: f32 = 2.414_213_6;

/// Hough accumulator resolution.
const HOUGH_RHO_STEP: f32 = 1.0;
const HOUGH_THETA_STEPS: usize = 180;

/// A line in Hough normal form: `x·cos θ + y·sin θ = ρ`.
///
/// θ is in degrees in `[0, 180)`. θ = 90° is a horizontal line, θ = 0° vertical.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoughLine {
    pub rho: f32,
    pub theta_degrees: f32,
    pub votes: u32,
}

/// Canny edge map (0 or 255) from 3×3 Sobel gradients with L1 magnitude.
///
/// Pixels above `high` seed edges; pixels above `low` join an edge only when
/// 8-connected to a seed.
pub fn canny(gray: &GrayImage, low: f32, high: f32) -> GrayImage {
    let (w, h) = gray.dimensions();
    let (low, high) = if low > high { (high, low) } else { (low, high) };
    let grad = sobel(gray, SobelAperture::Three);
    let mag = grad.l1_magnitude();

    let at = |x: i64, y: i64| -> f32 {
        if x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
            0.0
        } else {
            mag[(y as u32 * w + x as u32) as usize]
        }
    };

    // Non-maximum suppression. Ties keep the pixel nearer the origin so a
    // symmetric step yields a one-pixel-wide edge.
    let mut state = vec![0u8; (w * h) as usize]; // 0 = none, 1 = weak, 2 = strong
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let i = (y as u32 * w + x as u32) as usize;
            let m = mag[i];
            if m <= low {
                continue;
            }
            let ax = grad.gx[i].abs();
            let ay = grad.gy[i].abs();
            let is_max = if ay <= ax * TAN_22_5 {
                m > at(x - 1, y) && m >= at(x + 1, y)
            } else if ay > ax * TAN_67_5 {
                m > at(x, y - 1) && m >= at(x, y + 1)
            } else if (grad.gx[i] > 0.0) == (grad.gy[i] > 0.0) {
                m > at(x - 1, y - 1) && m > at(x + 1, y + 1)
            } else {
                m > at(x + 1, y - 1) && m > at(x - 1, y + 1)
            };
            if is_max {
                state[i] = if m > high { 2 } else { 1 };
            }
        }
    }

    // Hysteresis: grow strong seeds through weak neighbours.
    let mut edges = GrayImage::new(w, h);
    let mut stack: Vec<(u32, u32)> = Vec::new();
    for y in 0..h {
        for x in 0..w {
            if state[(y * w + x) as usize] == 2 {
                stack.push((x, y));
            }
        }
    }
    while let Some((x, y)) = stack.pop() {
        if edges.get_pixel(x, y).0[0] == EDGE {
            continue;
        }
        edges.get_pixel_mut(x, y).0[0] = EDGE;
        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                let nx = x as i64 + dx;
                let ny = y as i64 + dy;
                if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                    continue;
                }
                let (nx, ny) = (nx as u32, ny as u32);
                if state[(ny * w + nx) as usize] != 0 && edges.get_pixel(nx, ny).0[0] != EDGE {
                    stack.push((nx, ny));
                }
            }
        }
    }

    edges
}

/// Number of edge pixels in a binary edge map.
pub fn edge_count(edges: &GrayImage) -> usize {
    edges.pixels().filter(|p| p.0[0] > 0).count()
}

/// Standard Hough transform (ρ step 1 px, θ step 1°).
///
/// Returns accumulator peaks with more than `vote_threshold` votes that are
/// local maxima among their four neighbours, strongest first.
pub fn hough_lines(edges: &GrayImage, vote_threshold: u32) -> Vec<HoughLine> {
    let (w, h) = edges.dimensions();
    if w == 0 || h == 0 {
        return Vec::new();
    }

    let max_rho = ((w as f32).hypot(h as f32) / HOUGH_RHO_STEP).ceil() as i64;
    let num_rho = (2 * max_rho + 1) as usize;
    let trig: Vec<(f32, f32)> = (0..HOUGH_THETA_STEPS)
        .map(|n| {
            let theta = (n as f32).to_radians();
            (theta.cos() / HOUGH_RHO_STEP, theta.sin() / HOUGH_RHO_STEP)
        })
        .collect();

    let mut acc = vec![0u32; HOUGH_THETA_STEPS * num_rho];
    for (x, y, p) in edges.enumerate_pixels() {
        if p.0[0] == 0 {
            continue;
        }
        for (n, &(cos, sin)) in trig.iter().enumerate() {
            let r = (x as f32 * cos + y as f32 * sin).round() as i64 + max_rho;
            acc[n * num_rho + r as usize] += 1;
        }
    }

    let votes = |n: i64, r: i64| -> u32 {
        if n < 0 || r < 0 || n >= HOUGH_THETA_STEPS as i64 || r >= num_rho as i64 {
            0
        } else {
            acc[n as usize * num_rho + r as usize]
        }
    };

    let mut lines = Vec::new();
    for n in 0..HOUGH_THETA_STEPS as i64 {
        for r in 0..num_rho as i64 {
            let v = votes(n, r);
            if v > vote_threshold
                && v > votes(n, r - 1)
                && v >= votes(n, r + 1)
                && v > votes(n - 1, r)
                && v >= votes(n + 1, r)
            {
                lines.push(HoughLine {
                    rho: (r - max_rho) as f32 * HOUGH_RHO_STEP,
                    theta_degrees: n as f32,
                    votes: v,
                });
            }
        }
    }

    lines.sort_by(|a, b| {
        b.votes
            .cmp(&a.votes)
            .then(a.theta_degrees.total_cmp(&b.theta_degrees))
            .then(a.rho.total_cmp(&b.rho))
    });
    lines
}

/// Angular distance from θ to the nearest document axis (0°, 90° or 180°).
pub fn axis_deviation_degrees(theta_degrees: f32) -> f32 {
    let t = theta_degrees.rem_euclid(180.0);
    let vertical = t.min(180.0 - t);
    horizontal_deviation_degrees(t).min(vertical)
}

/// Angular distance from θ to the horizontal axis (θ = 90°).
pub fn horizontal_deviation_degrees(theta_degrees: f32) -> f32 {
    (theta_degrees.rem_euclid(180.0) - 90.0).abs()
}
