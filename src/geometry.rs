// ============================================================================
// GEOMETRY: coordinate-space conversion and crop constraint math
// ============================================================================
//
// Three coordinate spaces meet here:
//   * source-pixel space: persisted crop rectangles (may extend past the image)
//   * canvas-pixel space: the composed preview raster, pointer events
//   * percentage space: 0..100 of the live canvas, used while cropping
//
// Everything in this module is a pure function of its arguments.

use serde::{Deserialize, Serialize};

/// A point in whichever space the caller is working in.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(self, other: Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn from_u32(width: u32, height: u32) -> Self {
        Self::new(width as f64, height as f64)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Integer raster size, never smaller than 1×1.
    pub fn to_pixels(self) -> (u32, u32) {
        (
            self.width.round().max(1.0) as u32,
            self.height.round().max(1.0) as u32,
        )
    }
}

/// Axis-aligned rectangle. Width/height are expected to be non-negative
/// once a rectangle has gone through [`Rect::normalized`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    pub fn from_size(size: Size) -> Self {
        Self::new(0.0, 0.0, size.width, size.height)
    }

    /// Rectangle spanning two arbitrary corner points.
    pub fn from_points(a: Point, b: Point) -> Self {
        Self::new(a.x.min(b.x), a.y.min(b.y), (a.x - b.x).abs(), (a.y - b.y).abs())
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width * 0.5, self.y + self.height * 0.5)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Flip negative extents so the origin is always the top-left corner.
    pub fn normalized(self) -> Self {
        let mut r = self;
        if r.width < 0.0 {
            r.x += r.width;
            r.width = -r.width;
        }
        if r.height < 0.0 {
            r.y += r.height;
            r.height = -r.height;
        }
        r
    }

    pub fn contains_strict(&self, p: Point) -> bool {
        p.x > self.x && p.x < self.right() && p.y > self.y && p.y < self.bottom()
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = self.right().min(other.right());
        let y1 = self.bottom().min(other.bottom());
        if x1 > x0 && y1 > y0 {
            Some(Rect::new(x0, y0, x1 - x0, y1 - y0))
        } else {
            None
        }
    }

    /// The parts of `self` not covered by `hole`, as up to four strips
    /// (full-width top and bottom, then left and right of the hole).
    pub fn subtract(&self, hole: &Rect) -> Vec<Rect> {
        let Some(inner) = self.intersect(hole) else {
            return if self.is_empty() { Vec::new() } else { vec![*self] };
        };
        let mut out = Vec::with_capacity(4);
        if inner.y > self.y {
            out.push(Rect::new(self.x, self.y, self.width, inner.y - self.y));
        }
        if inner.bottom() < self.bottom() {
            out.push(Rect::new(self.x, inner.bottom(), self.width, self.bottom() - inner.bottom()));
        }
        if inner.x > self.x {
            out.push(Rect::new(self.x, inner.y, inner.x - self.x, inner.height));
        }
        if inner.right() < self.right() {
            out.push(Rect::new(inner.right(), inner.y, self.right() - inner.right(), inner.height));
        }
        out
    }

    pub fn approx_eq(&self, other: &Rect, eps: f64) -> bool {
        (self.x - other.x).abs() <= eps
            && (self.y - other.y).abs() <= eps
            && (self.width - other.width).abs() <= eps
            && (self.height - other.height).abs() <= eps
    }
}

// ============================================================================
// FREE-TRANSFORM STATE
// ============================================================================

/// Pan/zoom of the preview image. `x`/`y` are percentage offsets of the
/// image centre from the canvas centre, `scale` multiplies the fitted size.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageTransform {
    pub x: f64,
    pub y: f64,
    pub scale: f64,
}

impl Default for ImageTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl ImageTransform {
    pub const IDENTITY: ImageTransform = ImageTransform { x: 0.0, y: 0.0, scale: 1.0 };

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    pub fn with_scale(self, scale: f64, min: f64, max: f64) -> Self {
        Self { scale: scale.clamp(min, max), ..self }
    }
}

/// Scale `size` down (never up) so it fits inside `bounds`, preserving aspect.
pub fn fit_size(size: Size, bounds: Size) -> Size {
    if size.is_empty() || bounds.is_empty() {
        return size;
    }
    let s = (bounds.width / size.width).min(bounds.height / size.height).min(1.0);
    Size::new(size.width * s, size.height * s)
}

/// Scale factor that fits `size` inside `bounds` (may enlarge).
pub fn contain_scale(size: Size, bounds: Size) -> f64 {
    if size.is_empty() {
        return 1.0;
    }
    (bounds.width / size.width).min(bounds.height / size.height)
}

/// Where the image is drawn on the canvas once fitted and pan/zoomed.
pub fn display_bounds(container: Size, image: Size, transform: ImageTransform) -> Rect {
    let fit = contain_scale(image, container);
    let w = image.width * fit * transform.scale;
    let h = image.height * fit * transform.scale;
    let cx = container.width * 0.5 + transform.x / 100.0 * container.width;
    let cy = container.height * 0.5 + transform.y / 100.0 * container.height;
    Rect::new(cx - w * 0.5, cy - h * 0.5, w, h)
}

/// Source-pixel rectangle → canvas-percentage rectangle.
pub fn pixels_to_percent(rect: Rect, container: Size, image: Size, transform: ImageTransform) -> Rect {
    if container.is_empty() || image.is_empty() {
        return rect;
    }
    let bounds = display_bounds(container, image, transform);
    let sx = bounds.width / image.width;
    let sy = bounds.height / image.height;
    Rect::new(
        (bounds.x + rect.x * sx) / container.width * 100.0,
        (bounds.y + rect.y * sy) / container.height * 100.0,
        rect.width * sx / container.width * 100.0,
        rect.height * sy / container.height * 100.0,
    )
}

/// Canvas-percentage rectangle → source-pixel rectangle. Inverse of
/// [`pixels_to_percent`].
pub fn percent_to_pixels(rect: Rect, container: Size, image: Size, transform: ImageTransform) -> Rect {
    if container.is_empty() || image.is_empty() {
        return rect;
    }
    let bounds = display_bounds(container, image, transform);
    let sx = image.width / bounds.width;
    let sy = image.height / bounds.height;
    Rect::new(
        (rect.x / 100.0 * container.width - bounds.x) * sx,
        (rect.y / 100.0 * container.height - bounds.y) * sy,
        rect.width / 100.0 * container.width * sx,
        rect.height / 100.0 * container.height * sy,
    )
}

/// Canvas-pixel point → canvas-percentage point.
pub fn canvas_point_to_percent(p: Point, container: Size) -> Point {
    if container.is_empty() {
        return p;
    }
    Point::new(p.x / container.width * 100.0, p.y / container.height * 100.0)
}

/// Canvas-percentage rectangle → canvas-pixel rectangle.
pub fn percent_rect_to_canvas(rect: Rect, container: Size) -> Rect {
    Rect::new(
        rect.x / 100.0 * container.width,
        rect.y / 100.0 * container.height,
        rect.width / 100.0 * container.width,
        rect.height / 100.0 * container.height,
    )
}

// ============================================================================
// CROP HANDLES
// ============================================================================

/// Which part of the crop rectangle a pointer grabbed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CropHandle {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
    Top,
    Right,
    Bottom,
    Left,
    /// Interior: moves the whole rectangle.
    Box,
    /// Nothing grabbed: a fresh drag draws a new rectangle.
    None,
}

impl CropHandle {
    pub const CORNERS: [CropHandle; 4] = [
        CropHandle::TopLeft,
        CropHandle::TopRight,
        CropHandle::BottomLeft,
        CropHandle::BottomRight,
    ];

    pub const EDGES: [CropHandle; 4] = [
        CropHandle::Top,
        CropHandle::Right,
        CropHandle::Bottom,
        CropHandle::Left,
    ];

    pub fn is_corner(self) -> bool {
        Self::CORNERS.contains(&self)
    }

    pub fn is_edge(self) -> bool {
        Self::EDGES.contains(&self)
    }

    /// Where this handle sits on `rect` (edges at their midpoints).
    pub fn anchor_on(self, rect: &Rect) -> Option<Point> {
        let c = rect.center();
        Some(match self {
            CropHandle::TopLeft => Point::new(rect.x, rect.y),
            CropHandle::TopRight => Point::new(rect.right(), rect.y),
            CropHandle::BottomLeft => Point::new(rect.x, rect.bottom()),
            CropHandle::BottomRight => Point::new(rect.right(), rect.bottom()),
            CropHandle::Top => Point::new(c.x, rect.y),
            CropHandle::Right => Point::new(rect.right(), c.y),
            CropHandle::Bottom => Point::new(c.x, rect.bottom()),
            CropHandle::Left => Point::new(rect.x, c.y),
            CropHandle::Box | CropHandle::None => return None,
        })
    }
}

/// Hit-test sizes, in the same units as the rectangle being tested.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HitTolerance {
    pub handle_size: f64,
    pub handle_margin: f64,
    pub edge_margin: f64,
}

impl Default for HitTolerance {
    fn default() -> Self {
        Self { handle_size: 2.0, handle_margin: 1.0, edge_margin: 1.5 }
    }
}

/// Resolve which handle (if any) is under `pointer`.
///
/// Corner boxes win over edge bands, which win over the interior.
pub fn detect_handle(area: &Rect, pointer: Point, tol: HitTolerance) -> CropHandle {
    let half = (tol.handle_size + tol.handle_margin) * 0.5;
    for handle in CropHandle::CORNERS {
        if let Some(c) = handle.anchor_on(area)
            && (pointer.x - c.x).abs() <= half
            && (pointer.y - c.y).abs() <= half
        {
            return handle;
        }
    }

    let band = tol.edge_margin * 0.5;
    let within_x = pointer.x >= area.x && pointer.x <= area.right();
    let within_y = pointer.y >= area.y && pointer.y <= area.bottom();
    if within_x && (pointer.y - area.y).abs() <= band {
        return CropHandle::Top;
    }
    if within_y && (pointer.x - area.right()).abs() <= band {
        return CropHandle::Right;
    }
    if within_x && (pointer.y - area.bottom()).abs() <= band {
        return CropHandle::Bottom;
    }
    if within_y && (pointer.x - area.x).abs() <= band {
        return CropHandle::Left;
    }

    if area.contains_strict(pointer) {
        CropHandle::Box
    } else {
        CropHandle::None
    }
}

/// Recompute the crop rectangle for a drag of `handle` to `pointer`.
///
/// `drag_anchor` is where a fresh (`None`) drag started; `drag_offset` is the
/// pointer-to-origin offset recorded when a `Box` drag started. The result is
/// normalized but deliberately not clamped to the canvas.
pub fn update_crop_area(
    current: &Rect,
    handle: CropHandle,
    pointer: Point,
    drag_anchor: Point,
    drag_offset: Point,
) -> Rect {
    let right = current.right();
    let bottom = current.bottom();
    let r = match handle {
        CropHandle::TopLeft => Rect::new(pointer.x, pointer.y, right - pointer.x, bottom - pointer.y),
        CropHandle::TopRight => Rect::new(current.x, pointer.y, pointer.x - current.x, bottom - pointer.y),
        CropHandle::BottomLeft => Rect::new(pointer.x, current.y, right - pointer.x, pointer.y - current.y),
        CropHandle::BottomRight => Rect::new(current.x, current.y, pointer.x - current.x, pointer.y - current.y),
        CropHandle::Top => Rect::new(current.x, pointer.y, current.width, bottom - pointer.y),
        CropHandle::Bottom => Rect::new(current.x, current.y, current.width, pointer.y - current.y),
        CropHandle::Left => Rect::new(pointer.x, current.y, right - pointer.x, current.height),
        CropHandle::Right => Rect::new(current.x, current.y, pointer.x - current.x, current.height),
        CropHandle::Box => Rect::new(
            pointer.x - drag_offset.x,
            pointer.y - drag_offset.y,
            current.width,
            current.height,
        ),
        CropHandle::None => Rect::new(
            drag_anchor.x,
            drag_anchor.y,
            pointer.x - drag_anchor.x,
            pointer.y - drag_anchor.y,
        ),
    };
    r.normalized()
}

/// Grow the dimension that is too small for `ratio` (width / height).
///
/// Never shrinks either dimension. Edge handles prefer adjusting the
/// dimension perpendicular to the dragged edge.
pub fn apply_aspect_ratio_constraint(width: f64, height: f64, ratio: f64, handle: CropHandle) -> (f64, f64) {
    if ratio <= 0.0 || !ratio.is_finite() || handle == CropHandle::Box {
        return (width, height);
    }
    let width = width.abs();
    let height = height.abs();
    if width == 0.0 && height == 0.0 {
        return (0.0, 0.0);
    }

    let grow_height = (width, width / ratio);
    let grow_width = (height * ratio, height);

    match handle {
        CropHandle::Top | CropHandle::Bottom => {
            if grow_width.0 >= width { grow_width } else { grow_height }
        }
        CropHandle::Left | CropHandle::Right => {
            if grow_height.1 >= height { grow_height } else { grow_width }
        }
        _ => {
            if height == 0.0 || width / height > ratio { grow_height } else { grow_width }
        }
    }
}

// ============================================================================
// ASPECT RATIOS
// ============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct AspectRatio {
    pub width: u32,
    pub height: u32,
}

impl AspectRatio {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn value(&self) -> f64 {
        if self.height == 0 { 0.0 } else { self.width as f64 / self.height as f64 }
    }

    pub fn label(&self) -> String {
        format!("{}:{}", self.width, self.height)
    }
}

/// Ratios offered for detection hints, in lookup order.
pub const PRESET_RATIOS: [AspectRatio; 8] = [
    AspectRatio::new(1, 1),
    AspectRatio::new(16, 9),
    AspectRatio::new(4, 3),
    AspectRatio::new(3, 2),
    AspectRatio::new(21, 9),
    AspectRatio::new(9, 16),
    AspectRatio::new(4, 5),
    AspectRatio::new(2, 3),
];

pub const DEFAULT_RATIO_TOLERANCE: f64 = 0.05;

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Reduce a pixel size to its smallest integer ratio (1920×1080 → 16:9).
pub fn simplify_ratio(width: f64, height: f64) -> Option<AspectRatio> {
    let w = width.round();
    let h = height.round();
    if w < 1.0 || h < 1.0 {
        return None;
    }
    let (w, h) = (w as u64, h as u64);
    let g = gcd(w, h).max(1);
    Some(AspectRatio::new((w / g) as u32, (h / g) as u32))
}

/// Closest preset whose ratio is within `tolerance` (relative) of `w / h`.
pub fn detect_preset_ratio(width: f64, height: f64, tolerance: f64) -> Option<AspectRatio> {
    let simplified = simplify_ratio(width, height)?;
    let actual = simplified.value();
    PRESET_RATIOS
        .iter()
        .map(|p| (p, ((actual - p.value()) / p.value()).abs()))
        .filter(|(_, err)| *err <= tolerance)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(p, _)| *p)
}
