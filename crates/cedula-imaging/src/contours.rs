//! External contour counting on binary images.
//!
//! Foreground is any non-zero pixel, connected with 8-neighbourhood; the
//! background is 4-connected. A foreground component has an external contour
//! when it touches the image frame or the background region connected to the
//! frame. Components sitting inside another component's hole are not counted.

use image::GrayImage;
use std::collections::VecDeque;

const NEIGHBOURS_4: [(i64, i64); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];
const NEIGHBOURS_8: [(i64, i64); 8] = [
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Count external contours in a binary image.
pub fn count_external_contours(binary: &GrayImage) -> usize {
    let (w, h) = binary.dimensions();
    if w == 0 || h == 0 {
        return 0;
    }
    let (w, h) = (w as i64, h as i64);
    let idx = |x: i64, y: i64| (y * w + x) as usize;
    let fg = |x: i64, y: i64| binary.get_pixel(x as u32, y as u32).0[0] != 0;
    let inside = |x: i64, y: i64| x >= 0 && y >= 0 && x < w && y < h;

    // Background reachable from the frame.
    let mut outside = vec![false; (w * h) as usize];
    let mut queue = VecDeque::new();
    for x in 0..w {
        for y in [0, h - 1] {
            if !fg(x, y) && !outside[idx(x, y)] {
                outside[idx(x, y)] = true;
                queue.push_back((x, y));
            }
        }
    }
    for y in 0..h {
        for x in [0, w - 1] {
            if !fg(x, y) && !outside[idx(x, y)] {
                outside[idx(x, y)] = true;
                queue.push_back((x, y));
            }
        }
    }
    while let Some((x, y)) = queue.pop_front() {
        for (dx, dy) in NEIGHBOURS_4 {
            let (nx, ny) = (x + dx, y + dy);
            if inside(nx, ny) && !fg(nx, ny) && !outside[idx(nx, ny)] {
                outside[idx(nx, ny)] = true;
                queue.push_back((nx, ny));
            }
        }
    }

    let mut visited = vec![false; (w * h) as usize];
    let mut count = 0usize;
    for y in 0..h {
        for x in 0..w {
            if !fg(x, y) || visited[idx(x, y)] {
                continue;
            }
            visited[idx(x, y)] = true;
            queue.push_back((x, y));
            let mut external = false;

            while let Some((cx, cy)) = queue.pop_front() {
                if cx == 0 || cy == 0 || cx == w - 1 || cy == h - 1 {
                    external = true;
                }
                for (dx, dy) in NEIGHBOURS_4 {
                    let (nx, ny) = (cx + dx, cy + dy);
                    if inside(nx, ny) && outside[idx(nx, ny)] {
                        external = true;
                    }
                }
                for (dx, dy) in NEIGHBOURS_8 {
                    let (nx, ny) = (cx + dx, cy + dy);
                    if inside(nx, ny) && fg(nx, ny) && !visited[idx(nx, ny)] {
                        visited[idx(nx, ny)] = true;
                        queue.push_back((nx, ny));
                    }
                }
            }

            if external {
                count += 1;
            }
        }
    }

    count
}
