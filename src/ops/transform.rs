// ============================================================================
// TRANSFORM OPERATIONS: resize and rotated/flipped placement of rasters
// ============================================================================

use image::{Rgba, RgbaImage, imageops};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::canvas::{blend_pixel, composite_at};
use crate::edit::BlendMode;
use crate::geometry::{Point, Rect};

/// Interpolation method for resize operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Interpolation {
    Nearest,
    #[default]
    Bilinear,
    Bicubic,
    Lanczos3,
}

impl Interpolation {
    pub fn label(&self) -> &'static str {
        match self {
            Interpolation::Nearest  => "Nearest Neighbor",
            Interpolation::Bilinear => "Bilinear",
            Interpolation::Bicubic  => "Bicubic",
            Interpolation::Lanczos3 => "Lanczos3",
        }
    }

    pub fn to_filter(&self) -> imageops::FilterType {
        match self {
            Interpolation::Nearest  => imageops::FilterType::Nearest,
            Interpolation::Bilinear => imageops::FilterType::Triangle,
            Interpolation::Bicubic  => imageops::FilterType::CatmullRom,
            Interpolation::Lanczos3 => imageops::FilterType::Lanczos3,
        }
    }
}

/// Resample to `w × h`. Returns a plain copy when the size already matches.
pub fn resize(src: &RgbaImage, w: u32, h: u32, interp: Interpolation) -> RgbaImage {
    let (w, h) = (w.max(1), h.max(1));
    if src.width() == w && src.height() == h {
        return src.clone();
    }
    imageops::resize(src, w, h, interp.to_filter())
}

/// Where and how a raster lands on a destination canvas.
///
/// The raster is stretched to `width × height`, rotated clockwise by
/// `rotation` degrees about `center`, then mirrored in its own frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub center: Point,
    pub width: f64,
    pub height: f64,
    pub rotation: f64,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
}

impl Placement {
    pub fn from_rect(rect: &Rect) -> Self {
        Self {
            center: rect.center(),
            width: rect.width,
            height: rect.height,
            rotation: 0.0,
            flip_horizontal: false,
            flip_vertical: false,
        }
    }

    pub fn rotated(self, rotation: f64) -> Self {
        Self { rotation, ..self }
    }

    pub fn flipped(self, horizontal: bool, vertical: bool) -> Self {
        Self { flip_horizontal: horizontal, flip_vertical: vertical, ..self }
    }

    fn is_axis_aligned(&self) -> bool {
        self.rotation.rem_euclid(360.0) == 0.0 && !self.flip_horizontal && !self.flip_vertical
    }

    /// Map a local-frame point (origin at the centre) to destination space.
    pub fn to_canvas(&self, local: Point) -> Point {
        let lx = if self.flip_horizontal { -local.x } else { local.x };
        let ly = if self.flip_vertical { -local.y } else { local.y };
        let (s, c) = self.rotation.to_radians().sin_cos();
        Point::new(self.center.x + c * lx - s * ly, self.center.y + s * lx + c * ly)
    }

    /// Axis-aligned bounds of the placed quad.
    pub fn bounds(&self) -> Rect {
        let (hw, hh) = (self.width * 0.5, self.height * 0.5);
        let corners = [
            self.to_canvas(Point::new(-hw, -hh)),
            self.to_canvas(Point::new(hw, -hh)),
            self.to_canvas(Point::new(-hw, hh)),
            self.to_canvas(Point::new(hw, hh)),
        ];
        let min_x = corners.iter().map(|p| p.x).fold(f64::INFINITY, f64::min);
        let min_y = corners.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
        let max_x = corners.iter().map(|p| p.x).fold(f64::NEG_INFINITY, f64::max);
        let max_y = corners.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
        Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
    }
}

/// Draw `src` onto `dst` at `placement`, blending with `mode` at `opacity`
/// (0..1).
///
/// Uses inverse mapping with bilinear sampling. Unrotated, unflipped
/// placements at native size on integer positions take a straight blit, so
/// 1:1 draws reproduce the source exactly.
pub fn draw_placed(
    dst: &mut RgbaImage,
    src: &RgbaImage,
    placement: &Placement,
    mode: BlendMode,
    opacity: f32,
) {
    if placement.width <= 0.0 || placement.height <= 0.0 || src.width() == 0 || src.height() == 0 {
        return;
    }

    if placement.is_axis_aligned()
        && placement.width == src.width() as f64
        && placement.height == src.height() as f64
    {
        let left = placement.center.x - placement.width * 0.5;
        let top = placement.center.y - placement.height * 0.5;
        if left.fract() == 0.0 && top.fract() == 0.0 {
            composite_at(dst, src, left as i64, top as i64, mode, opacity);
            return;
        }
    }

    let bounds = placement.bounds();
    let (dw, dh) = (dst.width() as i64, dst.height() as i64);
    let x0 = (bounds.x.floor() as i64).max(0);
    let y0 = (bounds.y.floor() as i64).max(0);
    let x1 = (bounds.right().ceil() as i64).min(dw);
    let y1 = (bounds.bottom().ceil() as i64).min(dh);
    if x1 <= x0 || y1 <= y0 {
        return;
    }

    let (s, c) = placement.rotation.to_radians().sin_cos();
    let sx_scale = src.width() as f64 / placement.width;
    let sy_scale = src.height() as f64 / placement.height;
    let (hw, hh) = (placement.width * 0.5, placement.height * 0.5);
    let fh = if placement.flip_horizontal { -1.0 } else { 1.0 };
    let fv = if placement.flip_vertical { -1.0 } else { 1.0 };
    let center = placement.center;

    let row_bytes = dw as usize * 4;
    dst.as_mut()
        .par_chunks_mut(row_bytes)
        .enumerate()
        .skip(y0 as usize)
        .take((y1 - y0) as usize)
        .for_each(|(dy, row)| {
            let py = dy as f64 + 0.5 - center.y;
            for dx in x0..x1 {
                let px = dx as f64 + 0.5 - center.x;
                // Inverse rotation, then the (self-inverse) flip.
                let lx = (c * px + s * py) * fh;
                let ly = (-s * px + c * py) * fv;
                if lx < -hw - 1.0 || lx > hw + 1.0 || ly < -hh - 1.0 || ly > hh + 1.0 {
                    continue;
                }
                let u = (lx + hw) * sx_scale - 0.5;
                let v = (ly + hh) * sy_scale - 0.5;
                let top = bilinear_sample(src, u as f32, v as f32);
                if top[3] == 0 {
                    continue;
                }
                let i = dx as usize * 4;
                let base = Rgba([row[i], row[i + 1], row[i + 2], row[i + 3]]);
                let out = blend_pixel(base, top, mode, opacity);
                row[i..i + 4].copy_from_slice(&out.0);
            }
        });
}

/// Bilinear interpolation sampling from an RgbaImage; outside is transparent.
fn bilinear_sample(img: &RgbaImage, x: f32, y: f32) -> Rgba<u8> {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let sample = |sx: i32, sy: i32| -> [f32; 4] {
        if sx < 0 || sy < 0 || sx >= img.width() as i32 || sy >= img.height() as i32 {
            [0.0; 4]
        } else {
            let p = img.get_pixel(sx as u32, sy as u32);
            [p[0] as f32, p[1] as f32, p[2] as f32, p[3] as f32]
        }
    };

    let tl = sample(x0, y0);
    let tr = sample(x0 + 1, y0);
    let bl = sample(x0, y0 + 1);
    let br = sample(x0 + 1, y0 + 1);

    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;
    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = lerp(tl[c], tr[c], fx);
        let bot = lerp(bl[c], br[c], fx);
        out[c] = lerp(top, bot, fy).round().clamp(0.0, 255.0) as u8;
    }
    Rgba(out)
}
