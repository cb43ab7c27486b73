// ============================================================================
// CANVAS: raster primitives shared by the renderer stages
// ============================================================================
//
// Straight-alpha RGBA8 buffers (`image::RgbaImage`) throughout. Every helper
// clips to the destination so callers can pass rectangles that hang off the
// edge (extended crops, panned previews).

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::edit::{BlendMode, Color};
use crate::geometry::Rect;

/// A rasterized fragment and where its top-left lands on the canvas.
#[derive(Clone, Debug, PartialEq)]
pub struct Fragment {
    pub image: RgbaImage,
    pub x: i64,
    pub y: i64,
}

impl Fragment {
    pub fn composite_onto(&self, dst: &mut RgbaImage, mode: BlendMode, opacity: f32) {
        composite_at(dst, &self.image, self.x, self.y, mode, opacity);
    }
}

/// Integer pixel span `[x0, x1) × [y0, y1)` of `rect` clipped to `w × h`.
/// Pixel centres decide coverage, so adjacent rectangles never overlap.
pub fn pixel_span(rect: &Rect, w: u32, h: u32) -> Option<(u32, u32, u32, u32)> {
    let r = rect.normalized();
    let x0 = r.x.round().max(0.0).min(w as f64) as u32;
    let y0 = r.y.round().max(0.0).min(h as f64) as u32;
    let x1 = r.right().round().max(0.0).min(w as f64) as u32;
    let y1 = r.bottom().round().max(0.0).min(h as f64) as u32;
    if x1 > x0 && y1 > y0 { Some((x0, y0, x1, y1)) } else { None }
}

/// Blend one straight-alpha pixel over another.
///
/// `opacity` is 0..1 and scales the top alpha. Colour math follows the
/// usual separable blend formulas; alpha is source-over.
pub fn blend_pixel(base: Rgba<u8>, top: Rgba<u8>, mode: BlendMode, opacity: f32) -> Rgba<u8> {
    if top[3] == 0 || opacity <= 0.0 {
        return base;
    }
    if mode == BlendMode::Normal && opacity >= 1.0 && top[3] == 255 {
        return top;
    }

    let opacity = opacity.clamp(0.0, 1.0);

    let base_r = base[0] as f32 / 255.0;
    let base_g = base[1] as f32 / 255.0;
    let base_b = base[2] as f32 / 255.0;
    let base_a = base[3] as f32 / 255.0;

    let top_r = top[0] as f32 / 255.0;
    let top_g = top[1] as f32 / 255.0;
    let top_b = top[2] as f32 / 255.0;
    let top_a = (top[3] as f32 / 255.0) * opacity;

    let (r, g, b) = match mode {
        BlendMode::Normal => (top_r, top_g, top_b),
        BlendMode::Multiply => (base_r * top_r, base_g * top_g, base_b * top_b),
        BlendMode::Screen => (
            1.0 - (1.0 - base_r) * (1.0 - top_r),
            1.0 - (1.0 - base_g) * (1.0 - top_g),
            1.0 - (1.0 - base_b) * (1.0 - top_b),
        ),
        BlendMode::Overlay => (
            overlay_channel(base_r, top_r),
            overlay_channel(base_g, top_g),
            overlay_channel(base_b, top_b),
        ),
        BlendMode::Darken => (base_r.min(top_r), base_g.min(top_g), base_b.min(top_b)),
        BlendMode::Lighten => (base_r.max(top_r), base_g.max(top_g), base_b.max(top_b)),
        BlendMode::ColorDodge => (
            color_dodge_channel(base_r, top_r),
            color_dodge_channel(base_g, top_g),
            color_dodge_channel(base_b, top_b),
        ),
        BlendMode::ColorBurn => (
            color_burn_channel(base_r, top_r),
            color_burn_channel(base_g, top_g),
            color_burn_channel(base_b, top_b),
        ),
        // Hard light is overlay with the layers swapped.
        BlendMode::HardLight => (
            overlay_channel(top_r, base_r),
            overlay_channel(top_g, base_g),
            overlay_channel(top_b, base_b),
        ),
        BlendMode::SoftLight => (
            soft_light_channel(base_r, top_r),
            soft_light_channel(base_g, top_g),
            soft_light_channel(base_b, top_b),
        ),
        BlendMode::Difference => ((base_r - top_r).abs(), (base_g - top_g).abs(), (base_b - top_b).abs()),
        BlendMode::Exclusion => (
            base_r + top_r - 2.0 * base_r * top_r,
            base_g + top_g - 2.0 * base_g * top_g,
            base_b + top_b - 2.0 * base_b * top_b,
        ),
    };

    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a == 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    let out_r = (r * top_a + base_r * base_a * (1.0 - top_a)) / out_a;
    let out_g = (g * top_a + base_g * base_a * (1.0 - top_a)) / out_a;
    let out_b = (b * top_a + base_b * base_a * (1.0 - top_a)) / out_a;

    Rgba([
        (out_r * 255.0).round().clamp(0.0, 255.0) as u8,
        (out_g * 255.0).round().clamp(0.0, 255.0) as u8,
        (out_b * 255.0).round().clamp(0.0, 255.0) as u8,
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

fn overlay_channel(base: f32, top: f32) -> f32 {
    if base < 0.5 {
        2.0 * base * top
    } else {
        1.0 - 2.0 * (1.0 - base) * (1.0 - top)
    }
}

fn color_burn_channel(base: f32, top: f32) -> f32 {
    if top == 0.0 {
        0.0
    } else {
        (1.0 - (1.0 - base) / top).max(0.0)
    }
}

fn color_dodge_channel(base: f32, top: f32) -> f32 {
    if top >= 1.0 {
        1.0
    } else {
        (base / (1.0 - top)).min(1.0)
    }
}

/// W3C soft light.
fn soft_light_channel(base: f32, top: f32) -> f32 {
    if top <= 0.5 {
        base - (1.0 - 2.0 * top) * base * (1.0 - base)
    } else {
        let d = if base <= 0.25 {
            ((16.0 * base - 12.0) * base + 4.0) * base
        } else {
            base.sqrt()
        };
        base + (2.0 * top - 1.0) * (d - base)
    }
}

/// Source-over fill of `rect` (clipped). Opaque colours overwrite.
pub fn fill_rect(img: &mut RgbaImage, rect: &Rect, color: Color) {
    let Some((x0, y0, x1, y1)) = pixel_span(rect, img.width(), img.height()) else {
        return;
    };
    let top = color.to_rgba();
    let stride = img.width() as usize * 4;
    img.as_mut()
        .par_chunks_mut(stride)
        .enumerate()
        .skip(y0 as usize)
        .take((y1 - y0) as usize)
        .for_each(|(_, row)| {
            for x in x0..x1 {
                let i = x as usize * 4;
                let base = Rgba([row[i], row[i + 1], row[i + 2], row[i + 3]]);
                let out = blend_pixel(base, top, BlendMode::Normal, 1.0);
                row[i..i + 4].copy_from_slice(&out.0);
            }
        });
}

/// Overwrite every pixel with `color`.
pub fn clear(img: &mut RgbaImage, color: Color) {
    let px = color.to_rgba();
    img.pixels_mut().for_each(|p| *p = px);
}

/// Composite `src` onto `dst` with its top-left at `(ox, oy)`.
pub fn composite_at(dst: &mut RgbaImage, src: &RgbaImage, ox: i64, oy: i64, mode: BlendMode, opacity: f32) {
    let (dw, dh) = (dst.width() as i64, dst.height() as i64);
    let (sw, sh) = (src.width() as i64, src.height() as i64);
    let x0 = ox.max(0);
    let y0 = oy.max(0);
    let x1 = (ox + sw).min(dw);
    let y1 = (oy + sh).min(dh);
    if x1 <= x0 || y1 <= y0 {
        return;
    }

    let stride = dw as usize * 4;
    let src_stride = sw as usize * 4;
    let src_raw = src.as_raw();
    dst.as_mut()
        .par_chunks_mut(stride)
        .enumerate()
        .skip(y0 as usize)
        .take((y1 - y0) as usize)
        .for_each(|(y, row)| {
            let sy = (y as i64 - oy) as usize;
            for x in x0..x1 {
                let sx = (x - ox) as usize;
                let si = sy * src_stride + sx * 4;
                let di = x as usize * 4;
                let top = Rgba([src_raw[si], src_raw[si + 1], src_raw[si + 2], src_raw[si + 3]]);
                let base = Rgba([row[di], row[di + 1], row[di + 2], row[di + 3]]);
                let out = blend_pixel(base, top, mode, opacity);
                row[di..di + 4].copy_from_slice(&out.0);
            }
        });
}

/// Solid outline `thickness` pixels wide, drawn inside `rect`.
pub fn stroke_rect(img: &mut RgbaImage, rect: &Rect, color: Color, thickness: f64) {
    let r = rect.normalized();
    let t = thickness.max(1.0).min(r.width.min(r.height) * 0.5).max(1.0);
    fill_rect(img, &Rect::new(r.x, r.y, r.width, t), color);
    fill_rect(img, &Rect::new(r.x, r.bottom() - t, r.width, t), color);
    fill_rect(img, &Rect::new(r.x, r.y + t, t, r.height - 2.0 * t), color);
    fill_rect(img, &Rect::new(r.right() - t, r.y + t, t, r.height - 2.0 * t), color);
}

/// One-pixel dashed outline; dash phase restarts on every side.
pub fn dashed_rect(img: &mut RgbaImage, rect: &Rect, color: Color, dash: u32, gap: u32) {
    let r = rect.normalized();
    let period = (dash + gap).max(1) as f64;
    let dash = dash.max(1) as f64;

    let mut along = |start: f64, len: f64, horizontal: bool, fixed: f64| {
        let mut t = 0.0;
        while t < len {
            let seg = dash.min(len - t);
            let seg_rect = if horizontal {
                Rect::new(start + t, fixed, seg, 1.0)
            } else {
                Rect::new(fixed, start + t, 1.0, seg)
            };
            fill_rect(img, &seg_rect, color);
            t += period;
        }
    };
    along(r.x, r.width, true, r.y);
    along(r.x, r.width, true, r.bottom() - 1.0);
    along(r.y, r.height, false, r.x);
    along(r.y, r.height, false, r.right() - 1.0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_opaque_overwrites() {
        let out = blend_pixel(Rgba([10, 20, 30, 255]), Rgba([200, 100, 50, 255]), BlendMode::Normal, 1.0);
        assert_eq!(out, Rgba([200, 100, 50, 255]));
    }

    #[test]
    fn test_transparent_top_is_noop() {
        let base = Rgba([10, 20, 30, 255]);
        for mode in BlendMode::all() {
            assert_eq!(blend_pixel(base, Rgba([255, 255, 255, 0]), *mode, 1.0), base);
        }
    }

    #[test]
    fn test_multiply_and_screen() {
        let base = Rgba([128, 128, 128, 255]);
        let top = Rgba([128, 128, 128, 255]);
        let m = blend_pixel(base, top, BlendMode::Multiply, 1.0);
        let s = blend_pixel(base, top, BlendMode::Screen, 1.0);
        assert_eq!(m[0], 64);
        assert_eq!(s[0], 192);
        assert_eq!(m[3], 255);
    }

    #[test]
    fn test_half_opacity_normal() {
        let out = blend_pixel(Rgba([0, 0, 0, 255]), Rgba([255, 255, 255, 255]), BlendMode::Normal, 0.5);
        assert_eq!(out, Rgba([128, 128, 128, 255]));
    }

    #[test]
    fn test_fill_rect_clips() {
        let mut img = RgbaImage::new(10, 10);
        fill_rect(&mut img, &Rect::new(-5.0, 8.0, 8.0, 8.0), Color::WHITE);
        assert_eq!(*img.get_pixel(0, 9), Rgba([255, 255, 255, 255]));
        assert_eq!(*img.get_pixel(2, 9), Rgba([255, 255, 255, 255]));
        assert_eq!(*img.get_pixel(3, 9), Rgba([0, 0, 0, 0]));
        assert_eq!(*img.get_pixel(0, 7), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn test_composite_at_offset() {
        let mut dst = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        let src = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255]));
        composite_at(&mut dst, &src, 3, -1, BlendMode::Normal, 1.0);
        assert_eq!(*dst.get_pixel(3, 0), Rgba([255, 0, 0, 255]));
        assert_eq!(*dst.get_pixel(3, 1), Rgba([0, 0, 0, 255]));
        assert_eq!(*dst.get_pixel(2, 0), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_stroke_rect_leaves_interior() {
        let mut img = RgbaImage::new(10, 10);
        stroke_rect(&mut img, &Rect::new(0.0, 0.0, 10.0, 10.0), Color::WHITE, 1.0);
        assert_eq!(img.get_pixel(0, 5)[3], 255);
        assert_eq!(img.get_pixel(9, 5)[3], 255);
        assert_eq!(img.get_pixel(5, 5)[3], 0);
    }
}
