// ============================================================================
// SHAPE OVERLAYS: SDF rasterization of rectangle / circle / line / arrow
// ============================================================================

use image::RgbaImage;
use rayon::prelude::*;

use crate::canvas::Fragment;
use crate::edit::{Color, ShapeKind, ShapeOverlay};
use crate::geometry::Point;

/// Length of the arrowhead relative to the stroke width.
const ARROW_HEAD_RATIO: f32 = 4.0;
const ARROW_HEAD_MIN: f32 = 10.0;
/// Half-angle of the arrowhead (30°).
const ARROW_HEAD_ANGLE: f32 = std::f32::consts::FRAC_PI_6;

// ============================================================================
// SDF functions: return signed distance (negative = inside)
// ============================================================================

/// SDF for a box centred at origin with half-extents (hx, hy).
#[inline]
fn sdf_box(px: f32, py: f32, hx: f32, hy: f32) -> f32 {
    let dx = px.abs() - hx;
    let dy = py.abs() - hy;
    let outside = (dx.max(0.0) * dx.max(0.0) + dy.max(0.0) * dy.max(0.0)).sqrt();
    let inside = dx.max(dy).min(0.0);
    outside + inside
}

#[inline]
fn sdf_circle(px: f32, py: f32, r: f32) -> f32 {
    (px * px + py * py).sqrt() - r
}

fn sdf_line_segment(px: f32, py: f32, ax: f32, ay: f32, bx: f32, by: f32) -> f32 {
    let dx = bx - ax;
    let dy = by - ay;
    let len2 = dx * dx + dy * dy;
    if len2 < 1e-12 {
        return ((px - ax) * (px - ax) + (py - ay) * (py - ay)).sqrt();
    }
    let t = (((px - ax) * dx + (py - ay) * dy) / len2).clamp(0.0, 1.0);
    let cx = ax + t * dx;
    let cy = ay + t * dy;
    ((px - cx) * (px - cx) + (py - cy) * (py - cy)).sqrt()
}

/// Signed distance to a triangle (either winding).
fn sdf_triangle(verts: &[(f32, f32); 3], px: f32, py: f32) -> f32 {
    let mut d = f32::MAX;
    let mut s: f32 = 1.0;
    let mut j = 2;
    for i in 0..3 {
        let ex = verts[j].0 - verts[i].0;
        let ey = verts[j].1 - verts[i].1;
        let wx = px - verts[i].0;
        let wy = py - verts[i].1;
        let t = ((wx * ex + wy * ey) / (ex * ex + ey * ey).max(1e-12)).clamp(0.0, 1.0);
        let bx = wx - ex * t;
        let by = wy - ey * t;
        d = d.min(bx * bx + by * by);
        // Crossing test
        let c1 = py >= verts[i].1;
        let c2 = py < verts[j].1;
        let c3 = ex * wy > ey * wx;
        if (c1 && c2 && c3) || (!c1 && !c2 && !c3) {
            s = -s;
        }
        j = i;
    }
    s * d.sqrt()
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Anti-aliased coverage for a signed distance.
#[inline]
fn coverage(d: f32) -> f32 {
    smoothstep(0.5, -0.5, d)
}

/// A shape resolved into canvas pixels, centred at the origin of its local
/// frame.
#[derive(Clone, Copy, Debug)]
struct ResolvedShape {
    kind: ShapeKind,
    cx: f32,
    cy: f32,
    hx: f32,
    hy: f32,
    /// Line endpoints relative to the centre.
    ax: f32,
    ay: f32,
    bx: f32,
    by: f32,
    rotation: f32,
    stroke_half: f32,
    head: Option<[(f32, f32); 3]>,
}

impl ResolvedShape {
    fn new(shape: &ShapeOverlay, scale: f32, offset: Point) -> Self {
        let x = shape.x as f32 * scale + offset.x as f32;
        let y = shape.y as f32 * scale + offset.y as f32;
        let w = shape.width as f32 * scale;
        let h = shape.height as f32 * scale;
        let cx = x + w * 0.5;
        let cy = y + h * 0.5;
        let stroke_w = shape.stroke_width.max(0.0) * scale;

        let (ax, ay, bx, by) = (-w * 0.5, -h * 0.5, w * 0.5, h * 0.5);
        let head = (shape.kind == ShapeKind::Arrow).then(|| {
            let angle = (by - ay).atan2(bx - ax);
            let len = (stroke_w * ARROW_HEAD_RATIO).max(ARROW_HEAD_MIN * scale);
            let left = (
                bx - len * (angle - ARROW_HEAD_ANGLE).cos(),
                by - len * (angle - ARROW_HEAD_ANGLE).sin(),
            );
            let right = (
                bx - len * (angle + ARROW_HEAD_ANGLE).cos(),
                by - len * (angle + ARROW_HEAD_ANGLE).sin(),
            );
            [(bx, by), left, right]
        });

        Self {
            kind: shape.kind,
            cx,
            cy,
            hx: w.abs() * 0.5,
            hy: h.abs() * 0.5,
            ax,
            ay,
            bx,
            by,
            rotation: (shape.rotation as f32).to_radians(),
            stroke_half: stroke_w * 0.5,
            head,
        }
    }

    /// Local-frame extent including stroke and anti-alias padding.
    fn local_radius(&self) -> f32 {
        let head_extent = self
            .head
            .map(|tri| tri.iter().map(|(x, y)| (x * x + y * y).sqrt()).fold(0.0, f32::max))
            .unwrap_or(0.0);
        (self.hx * self.hx + self.hy * self.hy).sqrt().max(head_extent) + self.stroke_half + 2.0
    }

    /// (fill distance, stroke distance) at a local point.
    fn distances(&self, lx: f32, ly: f32) -> (Option<f32>, f32) {
        match self.kind {
            ShapeKind::Rectangle => {
                let d = sdf_box(lx, ly, self.hx, self.hy);
                (Some(d), d.abs() - self.stroke_half)
            }
            ShapeKind::Circle => {
                let d = sdf_circle(lx, ly, self.hx.min(self.hy));
                (Some(d), d.abs() - self.stroke_half)
            }
            ShapeKind::Line => {
                let d = sdf_line_segment(lx, ly, self.ax, self.ay, self.bx, self.by);
                (None, d - self.stroke_half)
            }
            ShapeKind::Arrow => {
                let shaft = sdf_line_segment(lx, ly, self.ax, self.ay, self.bx, self.by) - self.stroke_half;
                let head = self.head.map_or(f32::MAX, |tri| sdf_triangle(&tri, lx, ly));
                (None, shaft.min(head))
            }
        }
    }
}

/// Rasterize `shape` (output-space geometry) mapped to the canvas by
/// `p * scale + offset`. Returns `None` when nothing would be visible on a
/// `canvas_w × canvas_h` canvas.
pub fn rasterize_shape(
    shape: &ShapeOverlay,
    scale: f32,
    offset: Point,
    canvas_w: u32,
    canvas_h: u32,
) -> Option<Fragment> {
    let fill = match shape.kind {
        ShapeKind::Rectangle | ShapeKind::Circle => shape.fill,
        ShapeKind::Line | ShapeKind::Arrow => None,
    };
    let stroke = shape.stroke.filter(|_| shape.stroke_width > 0.0);
    if fill.is_none() && stroke.is_none() {
        return None;
    }

    let resolved = ResolvedShape::new(shape, scale, offset);
    let r = resolved.local_radius();
    let x0 = ((resolved.cx - r).floor() as i64).max(0);
    let y0 = ((resolved.cy - r).floor() as i64).max(0);
    let x1 = ((resolved.cx + r).ceil() as i64).min(canvas_w as i64);
    let y1 = ((resolved.cy + r).ceil() as i64).min(canvas_h as i64);
    if x1 <= x0 || y1 <= y0 {
        return None;
    }
    let (buf_w, buf_h) = ((x1 - x0) as u32, (y1 - y0) as u32);

    let (sin, cos) = resolved.rotation.sin_cos();
    let mut image = RgbaImage::new(buf_w, buf_h);
    let row_bytes = buf_w as usize * 4;
    image.as_mut().par_chunks_mut(row_bytes).enumerate().for_each(|(row, row_buf)| {
        let dy = (y0 + row as i64) as f32 + 0.5 - resolved.cy;
        for col in 0..buf_w as usize {
            let dx = (x0 + col as i64) as f32 + 0.5 - resolved.cx;
            // Inverse rotate around the centre
            let lx = dx * cos + dy * sin;
            let ly = -dx * sin + dy * cos;

            let (fill_d, stroke_d) = resolved.distances(lx, ly);
            let fill_cov = match (fill, fill_d) {
                (Some(_), Some(d)) => coverage(d),
                _ => 0.0,
            };
            let stroke_cov = if stroke.is_some() { coverage(stroke_d) } else { 0.0 };
            if let Some(px) = paint(fill, fill_cov, stroke, stroke_cov) {
                row_buf[col * 4..col * 4 + 4].copy_from_slice(&px);
            }
        }
    });

    Some(Fragment { image, x: x0, y: y0 })
}

/// Stroke drawn over fill, both straight alpha.
fn paint(fill: Option<Color>, fill_cov: f32, stroke: Option<Color>, stroke_cov: f32) -> Option<[u8; 4]> {
    let fa = fill.map_or(0.0, |c| c.a as f32 / 255.0 * fill_cov);
    let sa = stroke.map_or(0.0, |c| c.a as f32 / 255.0 * stroke_cov);
    let out_a = sa + fa * (1.0 - sa);
    if out_a <= 0.001 {
        return None;
    }
    let f = fill.unwrap_or(Color::TRANSPARENT);
    let s = stroke.unwrap_or(Color::TRANSPARENT);
    let mix = |sc: u8, fc: u8| ((sc as f32 * sa + fc as f32 * fa * (1.0 - sa)) / out_a).round().clamp(0.0, 255.0) as u8;
    Some([
        mix(s.r, f.r),
        mix(s.g, f.g),
        mix(s.b, f.b),
        (out_a * 255.0).round().clamp(0.0, 255.0) as u8,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn shape(kind: ShapeKind, x: f64, y: f64, w: f64, h: f64) -> ShapeOverlay {
        ShapeOverlay {
            id: Uuid::new_v4(),
            kind,
            x,
            y,
            width: w,
            height: h,
            rotation: 0.0,
            opacity: 100.0,
            fill: Some(Color::rgb(255, 0, 0)),
            stroke: None,
            stroke_width: 2.0,
        }
    }

    fn pixel_at(frag: &Fragment, x: i64, y: i64) -> [u8; 4] {
        frag.image.get_pixel((x - frag.x) as u32, (y - frag.y) as u32).0
    }

    #[test]
    fn test_filled_rectangle() {
        let frag = rasterize_shape(&shape(ShapeKind::Rectangle, 10.0, 10.0, 20.0, 10.0), 1.0, Point::default(), 100, 100).unwrap();
        assert_eq!(pixel_at(&frag, 20, 15), [255, 0, 0, 255]);
        assert_eq!(pixel_at(&frag, 32, 15)[3], 0);
    }

    #[test]
    fn test_circle_uses_smaller_side() {
        let frag = rasterize_shape(&shape(ShapeKind::Circle, 0.0, 0.0, 40.0, 20.0), 1.0, Point::default(), 100, 100).unwrap();
        assert_eq!(pixel_at(&frag, 20, 10)[3], 255);
        // Radius is 10, so 15 px right of centre is outside.
        assert_eq!(pixel_at(&frag, 35, 10)[3], 0);
    }

    #[test]
    fn test_line_ignores_fill() {
        let mut s = shape(ShapeKind::Line, 0.0, 0.0, 50.0, 0.0);
        assert!(rasterize_shape(&s, 1.0, Point::default(), 100, 100).is_none());
        s.stroke = Some(Color::BLACK);
        let frag = rasterize_shape(&s, 1.0, Point::default(), 100, 100).unwrap();
        assert_eq!(pixel_at(&frag, 25, 0)[3], 255);
    }

    #[test]
    fn test_arrow_has_head() {
        let mut s = shape(ShapeKind::Arrow, 10.0, 50.0, 60.0, 0.0);
        s.stroke = Some(Color::BLACK);
        let frag = rasterize_shape(&s, 1.0, Point::default(), 100, 100).unwrap();
        // Off the shaft but inside the head, just behind the tip.
        assert!(pixel_at(&frag, 64, 52)[3] > 200);
        // Same offset near the tail is empty.
        assert_eq!(pixel_at(&frag, 14, 53)[3], 0);
    }

    #[test]
    fn test_scaled_geometry() {
        let frag = rasterize_shape(&shape(ShapeKind::Rectangle, 10.0, 10.0, 20.0, 20.0), 0.5, Point::default(), 100, 100).unwrap();
        assert_eq!(pixel_at(&frag, 10, 10), [255, 0, 0, 255]);
        assert_eq!(pixel_at(&frag, 16, 10)[3], 0);
    }

    #[test]
    fn test_canvas_offset_shifts_fragment() {
        let s = shape(ShapeKind::Rectangle, 10.0, 10.0, 20.0, 10.0);
        let base = rasterize_shape(&s, 1.0, Point::default(), 100, 100).unwrap();
        let moved = rasterize_shape(&s, 1.0, Point::new(7.0, 3.0), 100, 100).unwrap();
        assert_eq!((moved.x - base.x, moved.y - base.y), (7, 3));
        assert_eq!(moved.image.dimensions(), base.image.dimensions());
    }

    #[test]
    fn test_offscreen_is_none() {
        assert!(rasterize_shape(&shape(ShapeKind::Rectangle, 500.0, 500.0, 10.0, 10.0), 1.0, Point::default(), 100, 100).is_none());
    }
}
