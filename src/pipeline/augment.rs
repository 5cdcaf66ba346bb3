//! Augmentation catalog: six named, parameterised image degradations.
//!
//! Each sample gets exactly one transform, chosen uniformly at random. The
//! catalog is data, not a class hierarchy: [`AugmentationKind`] is the tag,
//! [`Augmentation`] is the tag plus the parameters sampled for one call, and a
//! single `match` in [`Augmentation::apply`] does the work.
//!
//! Every transform takes an RGB image and returns an RGB image of the same
//! width and height, so augmented images never gain an alpha channel and the
//! clean/augmented pair always lines up pixel for pixel. Transforms never
//! fail: degenerate inputs (zero-sized images) are returned unchanged.
//!
//! | Kind | Parameters |
//! |------|------------|
//! | `RandomRotation` | angle ∈ U(−10°, 10°) |
//! | `GaussianBlur` | kernel ∈ {3,5,…,15}, σ ∈ U(1, 10) |
//! | `ImageDilation` | square element 2×2 or 3×3, one pass |
//! | `Downscaling` | factor ∈ U(0.3, 0.5), Lanczos down and back up |
//! | `RandomPerspective` | distortion ∈ U(0.2, 0.5), always applied |
//! | `ColorJitter` | brightness/contrast/saturation ∈ U(0.7, 1.3), hue ∈ U(−0.1, 0.1) |

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MAX_ROTATION_DEGREES: f32 = 10.0;
const BLUR_KERNEL_SIZES: [u32; 7] = [3, 5, 7, 9, 11, 13, 15];
const BLUR_SIGMA: (f32, f32) = (1.0, 10.0);
const DILATION_SIZES: [u32; 2] = [2, 3];
const DOWNSCALE_FACTOR: (f32, f32) = (0.3, 0.5);
const PERSPECTIVE_DISTORTION: (f32, f32) = (0.2, 0.5);
const JITTER_FACTOR: (f32, f32) = (0.7, 1.3);
const JITTER_HUE: f32 = 0.1;

/// The six transform kinds. Names match the dataset's `aug_name` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AugmentationKind {
    RandomRotation,
    GaussianBlur,
    ImageDilation,
    Downscaling,
    RandomPerspective,
    ColorJitter,
}

impl AugmentationKind {
    pub const ALL: [AugmentationKind; 6] = [
        AugmentationKind::RandomRotation,
        AugmentationKind::GaussianBlur,
        AugmentationKind::ImageDilation,
        AugmentationKind::Downscaling,
        AugmentationKind::RandomPerspective,
        AugmentationKind::ColorJitter,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AugmentationKind::RandomRotation => "RandomRotation",
            AugmentationKind::GaussianBlur => "GaussianBlur",
            AugmentationKind::ImageDilation => "ImageDilation",
            AugmentationKind::Downscaling => "Downscaling",
            AugmentationKind::RandomPerspective => "RandomPerspective",
            AugmentationKind::ColorJitter => "ColorJitter",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            AugmentationKind::RandomRotation => "random rotation between -10 and 10 degrees",
            AugmentationKind::GaussianBlur => "Gaussian blur, kernel 3-15, sigma 1-10",
            AugmentationKind::ImageDilation => "morphological dilation (ink bleed)",
            AugmentationKind::Downscaling => "downscale then upscale back (resolution loss)",
            AugmentationKind::RandomPerspective => "random perspective distortion",
            AugmentationKind::ColorJitter => "random brightness, contrast, saturation and hue",
        }
    }

    /// Uniform choice over the six kinds.
    pub fn choose<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    /// Draw fresh parameters for this kind.
    pub fn sample<R: Rng + ?Sized>(self, rng: &mut R) -> Augmentation {
        match self {
            AugmentationKind::RandomRotation => Augmentation::Rotate {
                degrees: rng.gen_range(-MAX_ROTATION_DEGREES..=MAX_ROTATION_DEGREES),
            },
            AugmentationKind::GaussianBlur => Augmentation::Blur {
                kernel_size: *BLUR_KERNEL_SIZES.choose(rng).unwrap_or(&3),
                sigma: rng.gen_range(BLUR_SIGMA.0..=BLUR_SIGMA.1),
            },
            AugmentationKind::ImageDilation => Augmentation::Dilate {
                size: *DILATION_SIZES.choose(rng).unwrap_or(&2),
            },
            AugmentationKind::Downscaling => Augmentation::Downscale {
                factor: rng.gen_range(DOWNSCALE_FACTOR.0..=DOWNSCALE_FACTOR.1),
            },
            AugmentationKind::RandomPerspective => Augmentation::Perspective {
                distortion: rng.gen_range(PERSPECTIVE_DISTORTION.0..=PERSPECTIVE_DISTORTION.1),
                corner_jitter: std::array::from_fn(|_| (rng.gen::<f32>(), rng.gen::<f32>())),
            },
            AugmentationKind::ColorJitter => {
                let mut order = [
                    JitterOp::Brightness,
                    JitterOp::Contrast,
                    JitterOp::Saturation,
                    JitterOp::Hue,
                ];
                order.shuffle(rng);
                Augmentation::ColorJitter {
                    brightness: rng.gen_range(JITTER_FACTOR.0..=JITTER_FACTOR.1),
                    contrast: rng.gen_range(JITTER_FACTOR.0..=JITTER_FACTOR.1),
                    saturation: rng.gen_range(JITTER_FACTOR.0..=JITTER_FACTOR.1),
                    hue: rng.gen_range(-JITTER_HUE..=JITTER_HUE),
                    order,
                }
            }
        }
    }
}

impl fmt::Display for AugmentationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AugmentationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown augmentation '{s}'"))
    }
}

/// One colour-jitter step; the four run in a random order per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitterOp {
    Brightness,
    Contrast,
    Saturation,
    Hue,
}

/// A transform kind together with its sampled parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Augmentation {
    Rotate {
        degrees: f32,
    },
    Blur {
        kernel_size: u32,
        sigma: f32,
    },
    Dilate {
        size: u32,
    },
    Downscale {
        factor: f32,
    },
    /// `corner_jitter` holds, per corner (TL, TR, BR, BL), the fraction of the
    /// maximum inward displacement along x and y.
    Perspective {
        distortion: f32,
        corner_jitter: [(f32, f32); 4],
    },
    ColorJitter {
        brightness: f32,
        contrast: f32,
        saturation: f32,
        hue: f32,
        order: [JitterOp; 4],
    },
}

impl Augmentation {
    pub fn kind(&self) -> AugmentationKind {
        match self {
            Augmentation::Rotate { .. } => AugmentationKind::RandomRotation,
            Augmentation::Blur { .. } => AugmentationKind::GaussianBlur,
            Augmentation::Dilate { .. } => AugmentationKind::ImageDilation,
            Augmentation::Downscale { .. } => AugmentationKind::Downscaling,
            Augmentation::Perspective { .. } => AugmentationKind::RandomPerspective,
            Augmentation::ColorJitter { .. } => AugmentationKind::ColorJitter,
        }
    }

    pub fn apply(&self, image: &RgbImage) -> RgbImage {
        if image.width() == 0 || image.height() == 0 {
            return image.clone();
        }
        match *self {
            Augmentation::Rotate { degrees } => rotate(image, degrees),
            Augmentation::Blur { kernel_size, sigma } => gaussian_blur(image, kernel_size, sigma),
            Augmentation::Dilate { size } => dilate(image, size),
            Augmentation::Downscale { factor } => downscale(image, factor),
            Augmentation::Perspective {
                distortion,
                corner_jitter,
            } => perspective(image, distortion, &corner_jitter),
            Augmentation::ColorJitter {
                brightness,
                contrast,
                saturation,
                hue,
                order,
            } => color_jitter(image, brightness, contrast, saturation, hue, &order),
        }
    }
}

/// Apply `kind` with freshly sampled parameters.
pub fn apply(image: &RgbImage, kind: AugmentationKind) -> RgbImage {
    apply_with_rng(image, kind, &mut rand::thread_rng())
}

pub fn apply_with_rng<R: Rng + ?Sized>(
    image: &RgbImage,
    kind: AugmentationKind,
    rng: &mut R,
) -> RgbImage {
    kind.sample(rng).apply(image)
}

/// Pick a kind uniformly and apply it.
pub fn augment_random<R: Rng + ?Sized>(image: &RgbImage, rng: &mut R) -> (AugmentationKind, RgbImage) {
    let kind = AugmentationKind::choose(rng);
    (kind, apply_with_rng(image, kind, rng))
}

// ── Geometric transforms ─────────────────────────────────────────────────

const FILL: [f32; 3] = [0.0, 0.0, 0.0];

/// Bilinear sample at `(x, y)`; neighbours outside the image contribute the
/// black fill colour.
fn sample_bilinear(image: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let fetch = |px: i64, py: i64| -> [f32; 3] {
        if px < 0 || py < 0 || px >= w || py >= h {
            FILL
        } else {
            let p = image.get_pixel(px as u32, py as u32).0;
            [p[0] as f32, p[1] as f32, p[2] as f32]
        }
    };

    let tl = fetch(x0, y0);
    let tr = fetch(x0 + 1, y0);
    let bl = fetch(x0, y0 + 1);
    let br = fetch(x0 + 1, y0 + 1);

    let mut out = [0u8; 3];
    for c in 0..3 {
        let top = tl[c] + (tr[c] - tl[c]) * fx;
        let bottom = bl[c] + (br[c] - bl[c]) * fx;
        out[c] = to_u8(top + (bottom - top) * fy);
    }
    Rgb(out)
}

/// Rotate about the centre, keeping the canvas size. Positive is counter-clockwise.
fn rotate(image: &RgbImage, degrees: f32) -> RgbImage {
    let (w, h) = image.dimensions();
    let (sin, cos) = degrees.to_radians().sin_cos();
    let cx = (w as f32 - 1.0) / 2.0;
    let cy = (h as f32 - 1.0) / 2.0;
    RgbImage::from_fn(w, h, |x, y| {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        let sx = cx + cos * dx - sin * dy;
        let sy = cy + sin * dx + cos * dy;
        sample_bilinear(image, sx, sy)
    })
}

/// Pull the four corners inwards by a random amount and warp the image onto
/// the resulting quadrilateral, keeping the canvas size.
fn perspective(image: &RgbImage, distortion: f32, jitter: &[(f32, f32); 4]) -> RgbImage {
    let (w, h) = image.dimensions();
    let max_dx = (distortion * (w / 2) as f32) as u32;
    let max_dy = (distortion * (h / 2) as f32) as u32;
    let displace = |u: f32, max: u32| -> f32 { ((u * (max + 1) as f32) as u32).min(max) as f32 };

    let right = w as f32 - 1.0;
    let bottom = h as f32 - 1.0;
    let start = [(0.0, 0.0), (right, 0.0), (right, bottom), (0.0, bottom)];
    let signs = [(1.0, 1.0), (-1.0, 1.0), (-1.0, -1.0), (1.0, -1.0)];
    let end: [(f32, f32); 4] = std::array::from_fn(|i| {
        let (ux, uy) = jitter[i];
        (
            start[i].0 + signs[i].0 * displace(ux, max_dx),
            start[i].1 + signs[i].1 * displace(uy, max_dy),
        )
    });

    // Maps output coordinates back to source coordinates.
    let Some(h_inv) = homography(&end, &start) else {
        return image.clone();
    };

    RgbImage::from_fn(w, h, |x, y| {
        let (x, y) = (x as f64, y as f64);
        let denom = h_inv[6] * x + h_inv[7] * y + 1.0;
        if denom.abs() < 1e-12 {
            return Rgb([0, 0, 0]);
        }
        let sx = (h_inv[0] * x + h_inv[1] * y + h_inv[2]) / denom;
        let sy = (h_inv[3] * x + h_inv[4] * y + h_inv[5]) / denom;
        sample_bilinear(image, sx as f32, sy as f32)
    })
}

/// Solve for the 8 coefficients of the projective map taking `from[i]` to
/// `to[i]`. `None` when the corners are degenerate.
fn homography(from: &[(f32, f32); 4], to: &[(f32, f32); 4]) -> Option<[f64; 8]> {
    let mut a = [[0f64; 9]; 8];
    for i in 0..4 {
        let (x, y) = (from[i].0 as f64, from[i].1 as f64);
        let (u, v) = (to[i].0 as f64, to[i].1 as f64);
        a[2 * i] = [x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y, u];
        a[2 * i + 1] = [0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y, v];
    }

    // Gaussian elimination with partial pivoting on the augmented matrix.
    for col in 0..8 {
        let pivot = (col..8).max_by(|&r1, &r2| a[r1][col].abs().total_cmp(&a[r2][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        for row in 0..8 {
            if row != col {
                let factor = a[row][col] / a[col][col];
                if factor != 0.0 {
                    for k in col..9 {
                        a[row][k] -= factor * a[col][k];
                    }
                }
            }
        }
    }

    Some(std::array::from_fn(|i| a[i][8] / a[i][i]))
}

// ── Filters ──────────────────────────────────────────────────────────────

/// Reflect an out-of-range index back into `0..n` (`dcb|abcd|cba`).
fn reflect(i: i64, n: i64) -> usize {
    if n == 1 {
        return 0;
    }
    let period = 2 * n - 2;
    let i = i.rem_euclid(period);
    (if i >= n { period - i } else { i }) as usize
}

fn gaussian_kernel(size: u32, sigma: f32) -> Vec<f32> {
    let half = (size as f32 - 1.0) / 2.0;
    let weights: Vec<f32> = (0..size)
        .map(|i| {
            let x = (i as f32 - half) / sigma;
            (-0.5 * x * x).exp()
        })
        .collect();
    let sum: f32 = weights.iter().sum();
    weights.into_iter().map(|w| w / sum).collect()
}

/// Separable Gaussian blur with reflect padding.
fn gaussian_blur(image: &RgbImage, kernel_size: u32, sigma: f32) -> RgbImage {
    let (w, h) = image.dimensions();
    let kernel = gaussian_kernel(kernel_size.max(1) | 1, sigma.max(f32::EPSILON));
    let half = (kernel.len() / 2) as i64;
    let (wi, hi) = (w as i64, h as i64);
    let src = image.as_raw();

    let mut horizontal = vec![0f32; src.len()];
    for y in 0..h as usize {
        for x in 0..wi {
            let mut acc = [0f32; 3];
            for (k, weight) in kernel.iter().enumerate() {
                let sx = reflect(x + k as i64 - half, wi);
                let base = (y * w as usize + sx) * 3;
                for c in 0..3 {
                    acc[c] += weight * src[base + c] as f32;
                }
            }
            let base = (y * w as usize + x as usize) * 3;
            horizontal[base..base + 3].copy_from_slice(&acc);
        }
    }

    let mut out = RgbImage::new(w, h);
    for y in 0..hi {
        for x in 0..w {
            let mut acc = [0f32; 3];
            for (k, weight) in kernel.iter().enumerate() {
                let sy = reflect(y + k as i64 - half, hi);
                let base = (sy * w as usize + x as usize) * 3;
                for c in 0..3 {
                    acc[c] += weight * horizontal[base + c];
                }
            }
            out.put_pixel(x, y as u32, Rgb([to_u8(acc[0]), to_u8(acc[1]), to_u8(acc[2])]));
        }
    }
    out
}

/// Per-channel maximum over a `size`×`size` window anchored at `size / 2`.
fn dilate(image: &RgbImage, size: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    let size = size.max(1) as i64;
    let anchor = size / 2;
    RgbImage::from_fn(w, h, |x, y| {
        let mut best = [0u8; 3];
        for ky in 0..size {
            for kx in 0..size {
                let sx = x as i64 + kx - anchor;
                let sy = y as i64 + ky - anchor;
                if sx < 0 || sy < 0 || sx >= w as i64 || sy >= h as i64 {
                    continue;
                }
                let p = image.get_pixel(sx as u32, sy as u32).0;
                for c in 0..3 {
                    best[c] = best[c].max(p[c]);
                }
            }
        }
        Rgb(best)
    })
}

/// Shrink by `factor`, then resize back to the original dimensions.
fn downscale(image: &RgbImage, factor: f32) -> RgbImage {
    let (w, h) = image.dimensions();
    let small_w = ((w as f32 * factor) as u32).max(1);
    let small_h = ((h as f32 * factor) as u32).max(1);
    let small = imageops::resize(image, small_w, small_h, FilterType::Lanczos3);
    imageops::resize(&small, w, h, FilterType::Lanczos3)
}

// ── Colour ───────────────────────────────────────────────────────────────

fn color_jitter(
    image: &RgbImage,
    brightness: f32,
    contrast: f32,
    saturation: f32,
    hue: f32,
    order: &[JitterOp; 4],
) -> RgbImage {
    let mut pixels: Vec<[f32; 3]> = image
        .pixels()
        .map(|p| [p[0] as f32 / 255.0, p[1] as f32 / 255.0, p[2] as f32 / 255.0])
        .collect();

    for op in order {
        match op {
            JitterOp::Brightness => {
                for p in pixels.iter_mut() {
                    *p = p.map(|c| (c * brightness).clamp(0.0, 1.0));
                }
            }
            JitterOp::Contrast => {
                let mean = pixels.iter().map(|p| grayscale(*p)).sum::<f32>() / pixels.len() as f32;
                for p in pixels.iter_mut() {
                    *p = p.map(|c| blend(c, mean, contrast));
                }
            }
            JitterOp::Saturation => {
                for p in pixels.iter_mut() {
                    let gray = grayscale(*p);
                    *p = p.map(|c| blend(c, gray, saturation));
                }
            }
            JitterOp::Hue => {
                for p in pixels.iter_mut() {
                    let (h, s, v) = rgb_to_hsv(*p);
                    *p = hsv_to_rgb((h + hue).rem_euclid(1.0), s, v);
                }
            }
        }
    }

    let (w, h) = image.dimensions();
    let mut out = RgbImage::new(w, h);
    for (dst, src) in out.pixels_mut().zip(pixels) {
        *dst = Rgb(src.map(|c| to_u8(c * 255.0)));
    }
    out
}

fn grayscale(p: [f32; 3]) -> f32 {
    0.299 * p[0] + 0.587 * p[1] + 0.114 * p[2]
}

fn blend(c: f32, other: f32, ratio: f32) -> f32 {
    (ratio * c + (1.0 - ratio) * other).clamp(0.0, 1.0)
}

fn rgb_to_hsv([r, g, b]: [f32; 3]) -> (f32, f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;
    let h = if delta <= f32::EPSILON {
        0.0
    } else if max == r {
        ((g - b) / delta).rem_euclid(6.0) / 6.0
    } else if max == g {
        ((b - r) / delta + 2.0) / 6.0
    } else {
        ((r - g) / delta + 4.0) / 6.0
    };
    let s = if max <= f32::EPSILON { 0.0 } else { delta / max };
    (h, s, max)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [f32; 3] {
    let h6 = h * 6.0;
    let sector = h6.floor();
    let f = h6 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match (sector as i32).rem_euclid(6) {
        0 => [v, t, p],
        1 => [q, v, p],
        2 => [p, v, t],
        3 => [p, q, v],
        4 => [t, p, v],
        _ => [v, p, q],
    }
}

fn to_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// A white page with a black text-like bar, in colour so jitter has work to do.
    fn page(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            if y > h / 3 && y < h / 3 + 4 && x > 4 && x < w.saturating_sub(4) {
                Rgb([10, 10, 10])
            } else if x < w / 4 {
                Rgb([200, 60, 40])
            } else {
                Rgb([255, 255, 255])
            }
        })
    }

    #[test]
    fn every_kind_preserves_dimensions() {
        let mut rng = StdRng::seed_from_u64(7);
        for (w, h) in [(1, 1), (2, 3), (17, 9), (60, 85)] {
            let img = page(w, h);
            for kind in AugmentationKind::ALL {
                for _ in 0..3 {
                    let out = apply_with_rng(&img, kind, &mut rng);
                    assert_eq!(out.dimensions(), (w, h), "{kind} changed dimensions of {w}x{h}");
                }
            }
        }
    }

    #[test]
    fn zero_sized_image_is_returned_unchanged() {
        let img = RgbImage::new(0, 0);
        for kind in AugmentationKind::ALL {
            assert_eq!(apply(&img, kind).dimensions(), (0, 0));
        }
    }

    #[test]
    fn sampled_parameters_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            for kind in AugmentationKind::ALL {
                let aug = kind.sample(&mut rng);
                assert_eq!(aug.kind(), kind);
                match aug {
                    Augmentation::Rotate { degrees } => assert!(degrees.abs() <= 10.0),
                    Augmentation::Blur { kernel_size, sigma } => {
                        assert!(kernel_size % 2 == 1 && (3..=15).contains(&kernel_size));
                        assert!((1.0..=10.0).contains(&sigma));
                    }
                    Augmentation::Dilate { size } => assert!(size == 2 || size == 3),
                    Augmentation::Downscale { factor } => assert!((0.3..=0.5).contains(&factor)),
                    Augmentation::Perspective {
                        distortion,
                        corner_jitter,
                    } => {
                        assert!((0.2..=0.5).contains(&distortion));
                        assert!(corner_jitter
                            .iter()
                            .all(|(x, y)| (0.0..1.0).contains(x) && (0.0..1.0).contains(y)));
                    }
                    Augmentation::ColorJitter {
                        brightness,
                        contrast,
                        saturation,
                        hue,
                        order,
                    } => {
                        for f in [brightness, contrast, saturation] {
                            assert!((0.7..=1.3).contains(&f));
                        }
                        assert!(hue.abs() <= 0.1);
                        for op in [
                            JitterOp::Brightness,
                            JitterOp::Contrast,
                            JitterOp::Saturation,
                            JitterOp::Hue,
                        ] {
                            assert!(order.contains(&op));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn choose_covers_all_kinds() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            seen.insert(AugmentationKind::choose(&mut rng));
        }
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn names_round_trip_through_from_str() {
        for kind in AugmentationKind::ALL {
            assert_eq!(kind.name().parse::<AugmentationKind>().unwrap(), kind);
        }
        assert!("Sharpen".parse::<AugmentationKind>().is_err());
    }

    #[test]
    fn zero_rotation_is_identity() {
        let img = page(21, 13);
        assert_eq!(Augmentation::Rotate { degrees: 0.0 }.apply(&img), img);
    }

    #[test]
    fn dilation_spreads_bright_pixels() {
        let mut img = RgbImage::new(5, 5);
        img.put_pixel(2, 2, Rgb([255, 255, 255]));
        let out = Augmentation::Dilate { size: 3 }.apply(&img);
        for y in 1..=3 {
            for x in 1..=3 {
                assert_eq!(out.get_pixel(x, y).0, [255, 255, 255]);
            }
        }
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0]);

        // A 2x2 element anchored at 1 reaches one pixel right/down of the source.
        let out = Augmentation::Dilate { size: 2 }.apply(&img);
        assert_eq!(out.get_pixel(3, 3).0, [255, 255, 255]);
        assert_eq!(out.get_pixel(1, 1).0, [0, 0, 0]);
    }

    #[test]
    fn blur_keeps_flat_images_flat() {
        let img = RgbImage::from_pixel(9, 7, Rgb([120, 80, 40]));
        let out = Augmentation::Blur {
            kernel_size: 15,
            sigma: 10.0,
        }
        .apply(&img);
        assert_eq!(out, img);
    }

    #[test]
    fn neutral_jitter_is_identity() {
        let img = page(12, 12);
        let out = Augmentation::ColorJitter {
            brightness: 1.0,
            contrast: 1.0,
            saturation: 1.0,
            hue: 0.0,
            order: [
                JitterOp::Hue,
                JitterOp::Brightness,
                JitterOp::Saturation,
                JitterOp::Contrast,
            ],
        }
        .apply(&img);
        for (a, b) in img.pixels().zip(out.pixels()) {
            for c in 0..3 {
                assert!((a[c] as i16 - b[c] as i16).abs() <= 1, "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn hsv_round_trip() {
        for rgb in [[1.0, 0.0, 0.0], [0.2, 0.6, 0.4], [0.5, 0.5, 0.5], [0.1, 0.2, 0.9]] {
            let (h, s, v) = rgb_to_hsv(rgb);
            let back = hsv_to_rgb(h, s, v);
            for c in 0..3 {
                assert!((rgb[c] - back[c]).abs() < 1e-5, "{rgb:?} → {back:?}");
            }
        }
    }

    #[test]
    fn homography_maps_corners() {
        let from = [(0.0, 0.0), (9.0, 0.0), (9.0, 9.0), (0.0, 9.0)];
        let to = [(1.0, 2.0), (8.0, 0.0), (9.0, 7.0), (0.0, 9.0)];
        let h = homography(&from, &to).expect("non-degenerate");
        for i in 0..4 {
            let (x, y) = (from[i].0 as f64, from[i].1 as f64);
            let d = h[6] * x + h[7] * y + 1.0;
            let u = (h[0] * x + h[1] * y + h[2]) / d;
            let v = (h[3] * x + h[4] * y + h[5]) / d;
            assert!((u - to[i].0 as f64).abs() < 1e-6);
            assert!((v - to[i].1 as f64).abs() < 1e-6);
        }
    }
}
