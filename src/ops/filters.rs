// ============================================================================
// IMAGE FILTERS: the preview filter chain
// ============================================================================
//
// Order is fixed: blur → (grayscale, brightness, contrast, saturate,
// hue-rotate, temperature, shadows/highlights) → sharpen → vignette. The
// bracketed colour stages run fused in a single f32 pass so no precision is
// lost between them. Every stage at its identity value is skipped.

use image::RgbaImage;
use rayon::prelude::*;

use crate::edit::Filters;

/// Run the whole chain. `blur_scale` converts the blur radius from output
/// pixels to the pixels of `img` (the display ratio).
pub fn apply_filter_chain(img: &mut RgbaImage, filters: &Filters, blur_scale: f32) {
    if filters.is_identity() || img.width() == 0 || img.height() == 0 {
        return;
    }

    let sigma = filters.blur * blur_scale;
    if sigma > 0.0 {
        *img = parallel_gaussian_blur(img, sigma);
    }

    if let Some(color) = ColorStages::from_filters(filters) {
        apply_pixel_transform(img, |r, g, b, a| {
            let (r, g, b) = color.apply(r, g, b);
            (r, g, b, a)
        });
    }

    if filters.sharpen > 0.0 {
        *img = sharpen_core(img, filters.sharpen / 50.0, 1.0);
    }

    if filters.vignette > 0.0 {
        vignette_core(img, filters.vignette / 100.0, 1.0);
    }
}

// ---------------------------------------------------------------------------
//  Per-pixel helpers
// ---------------------------------------------------------------------------

/// Apply a per-pixel transform in place.
/// `transform` receives (r, g, b, a) as f32 in 0..255 and returns the same.
pub fn apply_pixel_transform<F>(img: &mut RgbaImage, transform: F)
where
    F: Fn(f32, f32, f32, f32) -> (f32, f32, f32, f32) + Sync,
{
    let stride = img.width() as usize * 4;
    img.as_mut().par_chunks_mut(stride).for_each(|row| {
        for px in row.chunks_exact_mut(4) {
            let (nr, ng, nb, na) = transform(px[0] as f32, px[1] as f32, px[2] as f32, px[3] as f32);
            px[0] = nr.round().clamp(0.0, 255.0) as u8;
            px[1] = ng.round().clamp(0.0, 255.0) as u8;
            px[2] = nb.round().clamp(0.0, 255.0) as u8;
            px[3] = na.round().clamp(0.0, 255.0) as u8;
        }
    });
}

type Matrix3 = [[f32; 3]; 3];

fn mat_mul_vec(m: &Matrix3, r: f32, g: f32, b: f32) -> (f32, f32, f32) {
    (
        m[0][0] * r + m[0][1] * g + m[0][2] * b,
        m[1][0] * r + m[1][1] * g + m[1][2] * b,
        m[2][0] * r + m[2][1] * g + m[2][2] * b,
    )
}

/// Grayscale with BT.709 luminance weights.
pub fn grayscale_matrix() -> Matrix3 {
    let row = [0.2126, 0.7152, 0.0722];
    [row, row, row]
}

/// `saturate()` colour matrix; `s` = 1 is identity.
pub fn saturate_matrix(s: f32) -> Matrix3 {
    [
        [0.213 + 0.787 * s, 0.715 - 0.715 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 + 0.285 * s, 0.072 - 0.072 * s],
        [0.213 - 0.213 * s, 0.715 - 0.715 * s, 0.072 + 0.928 * s],
    ]
}

/// `hue-rotate()` colour matrix for `degrees`.
pub fn hue_rotate_matrix(degrees: f32) -> Matrix3 {
    let (sin, cos) = degrees.to_radians().sin_cos();
    [
        [
            0.213 + cos * 0.787 - sin * 0.213,
            0.715 - cos * 0.715 - sin * 0.715,
            0.072 - cos * 0.072 + sin * 0.928,
        ],
        [
            0.213 - cos * 0.213 + sin * 0.143,
            0.715 + cos * 0.285 + sin * 0.140,
            0.072 - cos * 0.072 - sin * 0.283,
        ],
        [
            0.213 - cos * 0.213 - sin * 0.787,
            0.715 - cos * 0.715 + sin * 0.715,
            0.072 + cos * 0.928 + sin * 0.072,
        ],
    ]
}

/// The fused colour stages, resolved once per render.
#[derive(Clone, Copy, Debug)]
struct ColorStages {
    grayscale: bool,
    brightness: Option<f32>,
    contrast: Option<f32>,
    saturate: Option<Matrix3>,
    hue: Option<Matrix3>,
    temperature: Option<f32>,
    shadows_highlights: Option<(f32, f32)>,
}

impl ColorStages {
    fn from_filters(f: &Filters) -> Option<Self> {
        let stages = ColorStages {
            grayscale: f.grayscale,
            brightness: (f.brightness != 100.0).then_some(f.brightness / 100.0),
            contrast: (f.contrast != 100.0).then_some(f.contrast / 100.0),
            saturate: (f.saturation != 100.0).then(|| saturate_matrix(f.saturation / 100.0)),
            hue: (f.hue != 0.0).then(|| hue_rotate_matrix(f.hue)),
            temperature: (f.temperature != 0.0).then_some(f.temperature * 1.5),
            shadows_highlights: (f.shadows != 0.0 || f.highlights != 0.0)
                .then_some((f.shadows / 100.0, f.highlights / 100.0)),
        };
        let any = stages.grayscale
            || stages.brightness.is_some()
            || stages.contrast.is_some()
            || stages.saturate.is_some()
            || stages.hue.is_some()
            || stages.temperature.is_some()
            || stages.shadows_highlights.is_some();
        any.then_some(stages)
    }

    /// Channels in and out are 0..255, unclamped between stages except where
    /// a stage clamps on its own.
    fn apply(&self, r: f32, g: f32, b: f32) -> (f32, f32, f32) {
        let (mut r, mut g, mut b) = (r / 255.0, g / 255.0, b / 255.0);
        let clamp = |v: f32| v.clamp(0.0, 1.0);

        if self.grayscale {
            (r, g, b) = mat_mul_vec(&grayscale_matrix(), r, g, b);
        }
        if let Some(p) = self.brightness {
            (r, g, b) = (clamp(r * p), clamp(g * p), clamp(b * p));
        }
        if let Some(p) = self.contrast {
            let c = |v: f32| clamp((v - 0.5) * p + 0.5);
            (r, g, b) = (c(r), c(g), c(b));
        }
        if let Some(m) = &self.saturate {
            let (nr, ng, nb) = mat_mul_vec(m, r, g, b);
            (r, g, b) = (clamp(nr), clamp(ng), clamp(nb));
        }
        if let Some(m) = &self.hue {
            let (nr, ng, nb) = mat_mul_vec(m, r, g, b);
            (r, g, b) = (clamp(nr), clamp(ng), clamp(nb));
        }

        let (mut r, mut g, mut b) = (r * 255.0, g * 255.0, b * 255.0);
        if let Some(shift) = self.temperature {
            // Warm adds red and removes blue.
            r = (r + shift).clamp(0.0, 255.0);
            b = (b - shift).clamp(0.0, 255.0);
        }
        if let Some((shadows, highlights)) = self.shadows_highlights {
            (r, g, b) = apply_hs_pixel(r, g, b, shadows, highlights);
        }
        (r, g, b)
    }
}

fn apply_hs_pixel(r: f32, g: f32, b: f32, shadow_amt: f32, highlight_amt: f32) -> (f32, f32, f32) {
    let lum = (0.2126 * r + 0.7152 * g + 0.0722 * b) / 255.0;
    // Shadow weight: strong for dark pixels, falls off for bright
    let sw = (1.0 - lum).powi(2);
    let hw = lum.powi(2);
    let adjustment = sw * shadow_amt * 128.0 + hw * highlight_amt * 128.0;
    (
        (r + adjustment).clamp(0.0, 255.0),
        (g + adjustment).clamp(0.0, 255.0),
        (b + adjustment).clamp(0.0, 255.0),
    )
}

// ---------------------------------------------------------------------------
//  Parallel separable Gaussian blur (rayon)
// ---------------------------------------------------------------------------

/// Build a 1-D Gaussian kernel truncated at ceil(3*sigma).
fn build_gaussian_kernel(sigma: f32) -> Vec<f32> {
    let radius = (sigma * 3.0).ceil() as usize;
    if radius == 0 {
        return vec![1.0];
    }
    let len = radius * 2 + 1;
    let s2 = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..len)
        .map(|i| {
            let x = i as f32 - radius as f32;
            (-x * x / s2).exp()
        })
        .collect();
    let inv = 1.0 / kernel.iter().sum::<f32>();
    for v in &mut kernel {
        *v *= inv;
    }
    kernel
}

/// Separable Gaussian blur with clamped edges.
pub fn parallel_gaussian_blur(src: &RgbaImage, sigma: f32) -> RgbaImage {
    let w = src.width() as usize;
    let h = src.height() as usize;
    if w == 0 || h == 0 || sigma <= 0.0 {
        return src.clone();
    }

    let kernel = build_gaussian_kernel(sigma);
    let radius = kernel.len() / 2;
    let buf_in: Vec<f32> = src.as_raw().iter().map(|&b| b as f32).collect();
    let stride = w * 4;

    // --- Horizontal pass ---
    let mut buf_h = vec![0.0f32; w * h * 4];
    buf_h.par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        let row_in = &buf_in[y * stride..(y + 1) * stride];
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (ki, &kv) in kernel.iter().enumerate() {
                let sx = (x as isize + ki as isize - radius as isize).clamp(0, w as isize - 1) as usize;
                for c in 0..4 {
                    acc[c] += row_in[sx * 4 + c] * kv;
                }
            }
            row_out[x * 4..x * 4 + 4].copy_from_slice(&acc);
        }
    });

    // --- Vertical pass, straight to u8 ---
    let mut dst = RgbaImage::new(w as u32, h as u32);
    dst.as_mut().par_chunks_mut(stride).enumerate().for_each(|(y, row_out)| {
        for x in 0..w {
            let mut acc = [0.0f32; 4];
            for (ki, &kv) in kernel.iter().enumerate() {
                let sy = (y as isize + ki as isize - radius as isize).clamp(0, h as isize - 1) as usize;
                let idx = sy * stride + x * 4;
                for c in 0..4 {
                    acc[c] += buf_h[idx + c] * kv;
                }
            }
            for c in 0..4 {
                row_out[x * 4 + c] = acc[c].round().clamp(0.0, 255.0) as u8;
            }
        }
    });
    dst
}

// ---------------------------------------------------------------------------
//  Spatial effects
// ---------------------------------------------------------------------------

/// Unsharp mask: result = original + amount * (original - blurred).
pub fn sharpen_core(flat: &RgbaImage, amount: f32, radius: f32) -> RgbaImage {
    let blurred = parallel_gaussian_blur(flat, radius);
    let mut out = flat.clone();
    let stride = flat.width() as usize * 4;
    let blur_raw = blurred.as_raw();
    out.as_mut().par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        let blur_row = &blur_raw[y * stride..(y + 1) * stride];
        for (px, bl) in row.chunks_exact_mut(4).zip(blur_row.chunks_exact(4)) {
            for c in 0..3 {
                let s = px[c] as f32;
                let v = s + amount * (s - bl[c] as f32);
                px[c] = v.round().clamp(0.0, 255.0) as u8;
            }
        }
    });
    out
}

/// Radial darkening towards the corners; `amount` 0..1.
pub fn vignette_core(img: &mut RgbaImage, amount: f32, softness: f32) {
    let w = img.width() as f32;
    let h = img.height() as f32;
    let cx = w / 2.0;
    let cy = h / 2.0;
    let max_dist = (cx * cx + cy * cy).sqrt().max(f32::EPSILON);
    let soft = softness.max(0.01);
    let stride = img.width() as usize * 4;

    img.as_mut().par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        let dy = y as f32 + 0.5 - cy;
        for (x, px) in row.chunks_exact_mut(4).enumerate() {
            let dx = x as f32 + 0.5 - cx;
            let dist = (dx * dx + dy * dy).sqrt() / max_dist;
            let vf = (1.0 - amount * (dist / soft).min(1.0).powf(2.0)).clamp(0.0, 1.0);
            for c in 0..3 {
                px[c] = (px[c] as f32 * vf).round().clamp(0.0, 255.0) as u8;
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn solid(v: u8) -> RgbaImage {
        RgbaImage::from_pixel(4, 4, Rgba([v, v, v, 255]))
    }

    #[test]
    fn test_identity_is_noop() {
        let mut img = RgbaImage::from_fn(5, 5, |x, y| Rgba([(x * 50) as u8, (y * 50) as u8, 9, 200]));
        let before = img.clone();
        apply_filter_chain(&mut img, &Filters::default(), 1.0);
        assert_eq!(img, before);
    }

    #[test]
    fn test_brightness_runs_before_contrast() {
        let filters = Filters { brightness: 150.0, contrast: 150.0, ..Filters::default() };
        let mut img = solid(128);
        apply_filter_chain(&mut img, &filters, 1.0);
        assert_eq!(img.get_pixel(0, 0)[0], 224);

        // The reverse order lands somewhere else.
        let reversed = ((128.0 / 255.0 - 0.5) * 1.5 + 0.5) * 1.5 * 255.0_f32;
        assert_eq!(reversed.round() as u8, 192);
    }

    #[test]
    fn test_grayscale_equalizes_channels() {
        let mut img = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255]));
        apply_filter_chain(&mut img, &Filters { grayscale: true, ..Filters::default() }, 1.0);
        let p = img.get_pixel(0, 0);
        assert_eq!(p[0], p[1]);
        assert_eq!(p[1], p[2]);
        assert_eq!(p[0], 54);
    }

    #[test]
    fn test_zero_saturation_is_gray() {
        let mut img = RgbaImage::from_pixel(1, 1, Rgba([200, 40, 90, 255]));
        apply_filter_chain(&mut img, &Filters { saturation: 0.0, ..Filters::default() }, 1.0);
        let p = img.get_pixel(0, 0);
        assert!((p[0] as i32 - p[1] as i32).abs() <= 1 && (p[1] as i32 - p[2] as i32).abs() <= 1);
    }

    #[test]
    fn test_full_hue_turn_is_identity() {
        let m = hue_rotate_matrix(360.0);
        let (r, g, b) = mat_mul_vec(&m, 0.8, 0.3, 0.1);
        assert!((r - 0.8).abs() < 1e-3 && (g - 0.3).abs() < 1e-3 && (b - 0.1).abs() < 1e-3);
    }

    #[test]
    fn test_temperature_warms() {
        let mut img = solid(100);
        apply_filter_chain(&mut img, &Filters { temperature: 20.0, ..Filters::default() }, 1.0);
        assert_eq!(*img.get_pixel(0, 0), Rgba([130, 100, 70, 255]));
    }

    #[test]
    fn test_blur_preserves_flat_image() {
        let img = solid(77);
        assert_eq!(parallel_gaussian_blur(&img, 2.0), img);
    }

    #[test]
    fn test_vignette_darkens_corners_only() {
        let mut img = RgbaImage::from_pixel(21, 21, Rgba([200, 200, 200, 255]));
        vignette_core(&mut img, 1.0, 1.0);
        assert!(img.get_pixel(0, 0)[0] < 20);
        assert!(img.get_pixel(10, 10)[0] >= 199);
    }

    #[test]
    fn test_sharpen_keeps_flat_regions() {
        let img = solid(90);
        assert_eq!(sharpen_core(&img, 2.0, 1.0), img);
    }
}
