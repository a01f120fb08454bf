use image::GrayImage;
use std::f64::consts::PI;

const SHIFT: i32 = 16;

/// A detected straight segment between two edge pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct Segment {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl Segment {
    pub fn length(&self) -> f64 {
        let dx = f64::from(self.x2 - self.x1);
        let dy = f64::from(self.y2 - self.y1);
        (dx * dx + dy * dy).sqrt()
    }

    /// Direction in degrees, image coordinates (y grows downward).
    pub fn angle_degrees(&self) -> f64 {
        f64::from(self.y2 - self.y1)
            .atan2(f64::from(self.x2 - self.x1))
            .to_degrees()
    }
}

#[derive(Debug, Clone, Copy)]
pub(super) struct HoughParams {
    pub vote_threshold: u32,
    pub min_line_length: u32,
    pub max_line_gap: u32,
}

/// Progressive probabilistic Hough transform over the non-zero pixels of
/// `edges`, with a 1 pixel rho step and a 1 degree theta step.
///
/// Points are visited in raster order instead of randomly, so the result is
/// reproducible. Only points that actually voted are unvoted when a segment
/// claims them.
pub(super) fn detect_segments(edges: &GrayImage, params: HoughParams) -> Vec<Segment> {
    let (width, height) = edges.dimensions();
    let (w, h) = (width as i32, height as i32);
    if w == 0 || h == 0 {
        return Vec::new();
    }

    let num_angle = 180usize;
    let num_rho = ((width + height) * 2 + 1) as usize;
    let rho_offset = ((num_rho - 1) / 2) as i32;
    let trig: Vec<(f64, f64)> = (0..num_angle)
        .map(|n| {
            let theta = n as f64 * PI / num_angle as f64;
            (theta.cos(), theta.sin())
        })
        .collect();

    let mut accum = vec![0i32; num_angle * num_rho];
    let mut mask = vec![false; (width * height) as usize];
    let mut voted = vec![false; (width * height) as usize];
    let mut points = Vec::new();
    for (x, y, pixel) in edges.enumerate_pixels() {
        if pixel[0] > 0 {
            mask[(y * width + x) as usize] = true;
            points.push((x as i32, y as i32));
        }
    }

    let rho_index = |x: i32, y: i32, n: usize| -> usize {
        let (cos, sin) = trig[n];
        let r = (f64::from(x) * cos + f64::from(y) * sin).round() as i32 + rho_offset;
        n * num_rho + r as usize
    };

    let threshold = params.vote_threshold as i32;
    let line_gap = params.max_line_gap as i32;
    let min_length = params.min_line_length as i32;
    let mut segments = Vec::new();

    for &(px, py) in &points {
        let index = (py * w + px) as usize;
        if !mask[index] {
            continue;
        }

        let mut max_val = threshold - 1;
        let mut max_n = 0usize;
        for n in 0..num_angle {
            let slot = rho_index(px, py, n);
            accum[slot] += 1;
            if accum[slot] > max_val {
                max_val = accum[slot];
                max_n = n;
            }
        }
        voted[index] = true;
        if max_val < threshold {
            continue;
        }

        let walk = Walk::new(px, py, trig[max_n]);
        let mut line_end = [(px, py); 2];
        for (k, end) in line_end.iter_mut().enumerate() {
            let mut gap = 0;
            for (x, y) in walk.steps(k > 0) {
                if x < 0 || x >= w || y < 0 || y >= h {
                    break;
                }
                if mask[(y * w + x) as usize] {
                    gap = 0;
                    *end = (x, y);
                } else {
                    gap += 1;
                    if gap > line_gap {
                        break;
                    }
                }
            }
        }

        let good_line = (line_end[1].0 - line_end[0].0).abs() >= min_length
            || (line_end[1].1 - line_end[0].1).abs() >= min_length;

        for (k, end) in line_end.iter().enumerate() {
            for (x, y) in walk.steps(k > 0) {
                if x < 0 || x >= w || y < 0 || y >= h {
                    break;
                }
                let slot = (y * w + x) as usize;
                if mask[slot] {
                    if good_line && voted[slot] {
                        for n in 0..num_angle {
                            accum[rho_index(x, y, n)] -= 1;
                        }
                        voted[slot] = false;
                    }
                    mask[slot] = false;
                }
                if (x, y) == *end {
                    break;
                }
            }
        }

        if good_line {
            segments.push(Segment {
                x1: line_end[0].0,
                y1: line_end[0].1,
                x2: line_end[1].0,
                y2: line_end[1].1,
            });
        }
    }
    segments
}

/// Fixed-point walk along the line through a seed point.
#[derive(Debug, Clone, Copy)]
struct Walk {
    x0: i32,
    y0: i32,
    dx: i32,
    dy: i32,
    x_major: bool,
}

impl Walk {
    fn new(px: i32, py: i32, (cos, sin): (f64, f64)) -> Self {
        let a = -sin;
        let b = cos;
        let one = f64::from(1i32 << SHIFT);
        if a.abs() > b.abs() {
            Self {
                x0: px,
                y0: (py << SHIFT) + (1 << (SHIFT - 1)),
                dx: if a > 0.0 { 1 } else { -1 },
                dy: (b * one / a.abs()).round() as i32,
                x_major: true,
            }
        } else {
            Self {
                x0: (px << SHIFT) + (1 << (SHIFT - 1)),
                y0: py,
                dx: (a * one / b.abs()).round() as i32,
                dy: if b > 0.0 { 1 } else { -1 },
                x_major: false,
            }
        }
    }

    /// Pixel positions starting at the seed, forward or backward.
    fn steps(self, backward: bool) -> impl Iterator<Item = (i32, i32)> {
        let (dx, dy) = if backward {
            (-self.dx, -self.dy)
        } else {
            (self.dx, self.dy)
        };
        let mut x = self.x0;
        let mut y = self.y0;
        std::iter::from_fn(move || {
            let point = if self.x_major {
                (x, y >> SHIFT)
            } else {
                (x >> SHIFT, y)
            };
            x += dx;
            y += dy;
            Some(point)
        })
    }
}
