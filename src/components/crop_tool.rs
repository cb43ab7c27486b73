// ============================================================================
// CROP TOOL: pointer-driven crop rectangle in canvas-percentage space
// ============================================================================

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::geometry::{
    AspectRatio, CropHandle, HitTolerance, Point, Rect, Size, apply_aspect_ratio_constraint,
    detect_handle, detect_preset_ratio, update_crop_area,
};
use crate::ops::crop_overlay::RatioBadge;

/// A locked crop aspect ratio (width / height in pixels).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AspectLock {
    pub value: f64,
    pub label: String,
}

impl AspectLock {
    pub fn from_ratio(ratio: AspectRatio) -> Self {
        Self { value: ratio.value(), label: ratio.label() }
    }

    /// Lock to the source image's own proportions.
    pub fn original(image: Size) -> Option<Self> {
        (!image.is_empty()).then(|| Self { value: image.width / image.height, label: "Original".to_string() })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
struct CropDrag {
    handle: CropHandle,
    /// Area when the drag started; every move recomputes from it.
    start: Rect,
    /// Fresh-draw origin.
    anchor: Point,
    /// Pointer minus area origin, for box moves.
    offset: Point,
}

/// Crop-mode interaction state. All rectangles and points are percentages of
/// the live canvas.
#[derive(Clone, Debug)]
pub struct CropTool {
    area: Rect,
    drag: Option<CropDrag>,
    lock: Option<AspectLock>,
    detected: Option<AspectRatio>,
    tolerance: HitTolerance,
    ratio_tolerance: f64,
}

impl CropTool {
    pub fn new(area: Rect, tolerance: HitTolerance, ratio_tolerance: f64) -> Self {
        Self { area: area.normalized(), drag: None, lock: None, detected: None, tolerance, ratio_tolerance }
    }

    pub fn area(&self) -> Rect {
        self.area
    }

    pub fn set_area(&mut self, area: Rect) {
        self.area = area.normalized();
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn active_handle(&self) -> Option<CropHandle> {
        self.drag.map(|d| d.handle)
    }

    /// Handle under the pointer, for cursor feedback.
    pub fn hover(&self, pointer: Point) -> CropHandle {
        detect_handle(&self.area, pointer, self.tolerance)
    }

    pub fn aspect_lock(&self) -> Option<&AspectLock> {
        self.lock.as_ref()
    }

    pub fn detected_ratio(&self) -> Option<AspectRatio> {
        self.detected
    }

    /// Set or clear the lock. A new lock reshapes the current area about its
    /// centre (growing only).
    pub fn set_aspect_lock(&mut self, lock: Option<AspectLock>, container: Size) {
        self.lock = lock;
        self.detected = None;
        if let Some(lock) = &self.lock {
            let px = to_canvas_px(&self.area, container);
            let (w, h) = apply_aspect_ratio_constraint(px.width, px.height, lock.value, CropHandle::BottomRight);
            let c = px.center();
            self.area = to_percent(&Rect::new(c.x - w * 0.5, c.y - h * 0.5, w, h), container);
        }
    }

    pub fn pointer_down(&mut self, pointer: Point) -> CropHandle {
        let handle = detect_handle(&self.area, pointer, self.tolerance);
        self.drag = Some(CropDrag {
            handle,
            start: self.area,
            anchor: pointer,
            offset: Point::new(pointer.x - self.area.x, pointer.y - self.area.y),
        });
        trace!(?handle, "crop drag start");
        handle
    }

    /// Returns the updated area, or `None` when no drag is active.
    pub fn pointer_move(&mut self, pointer: Point, container: Size) -> Option<Rect> {
        let drag = self.drag?;
        let raw = update_crop_area(&drag.start, drag.handle, pointer, drag.anchor, drag.offset);

        self.area = match &self.lock {
            Some(lock) if drag.handle != CropHandle::Box => {
                anchored_constraint(&raw, drag.handle, pointer, lock.value, container)
            }
            _ => raw,
        };

        if self.lock.is_none() {
            let px = to_canvas_px(&self.area, container);
            self.detected = detect_preset_ratio(px.width, px.height, self.ratio_tolerance);
        }
        Some(self.area)
    }

    pub fn pointer_up(&mut self) {
        if self.drag.take().is_some() {
            trace!(area = ?self.area, "crop drag end");
        }
        self.detected = None;
    }

    /// Re-express the area after the canvas mapping changed (zoom/pan), using
    /// `remap` from old percentages to new ones.
    pub fn remap(&mut self, remap: impl Fn(Rect) -> Rect) {
        self.area = remap(self.area).normalized();
        if let Some(drag) = &mut self.drag {
            drag.start = remap(drag.start).normalized();
        }
    }

    /// Badge for the overlay: the lock label, or a detected preset while
    /// dragging.
    pub fn badge(&self) -> Option<RatioBadge> {
        if let Some(lock) = &self.lock {
            return Some(RatioBadge { label: lock.label.clone(), locked: true });
        }
        if self.is_dragging() {
            return self.detected.map(|r| RatioBadge { label: r.label(), locked: false });
        }
        None
    }
}

fn to_canvas_px(r: &Rect, container: Size) -> Rect {
    Rect::new(
        r.x / 100.0 * container.width,
        r.y / 100.0 * container.height,
        r.width / 100.0 * container.width,
        r.height / 100.0 * container.height,
    )
}

fn to_percent(r: &Rect, container: Size) -> Rect {
    if container.is_empty() {
        return *r;
    }
    Rect::new(
        r.x / container.width * 100.0,
        r.y / container.height * 100.0,
        r.width / container.width * 100.0,
        r.height / container.height * 100.0,
    )
}

/// Apply the lock in canvas pixels, keeping the side away from the pointer
/// fixed. Edge drags keep the other axis centred.
fn anchored_constraint(raw: &Rect, handle: CropHandle, pointer: Point, ratio: f64, container: Size) -> Rect {
    if container.is_empty() {
        return *raw;
    }
    let px = to_canvas_px(raw, container);
    let p = Point::new(pointer.x / 100.0 * container.width, pointer.y / 100.0 * container.height);
    let (w, h) = apply_aspect_ratio_constraint(px.width, px.height, ratio, handle);

    let x = match handle {
        CropHandle::Top | CropHandle::Bottom => px.center().x - w * 0.5,
        _ if (p.x - px.x).abs() < (p.x - px.right()).abs() => px.right() - w,
        _ => px.x,
    };
    let y = match handle {
        CropHandle::Left | CropHandle::Right => px.center().y - h * 0.5,
        _ if (p.y - px.y).abs() < (p.y - px.bottom()).abs() => px.bottom() - h,
        _ => px.y,
    };
    to_percent(&Rect::new(x, y, w, h), container)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: Size = Size::new(1000.0, 1000.0);

    fn tool() -> CropTool {
        CropTool::new(Rect::new(10.0, 10.0, 80.0, 80.0), HitTolerance::default(), 0.05)
    }

    #[test]
    fn test_corner_drag_from_start_rect() {
        let mut t = tool();
        assert_eq!(t.pointer_down(Point::new(90.0, 90.0)), CropHandle::BottomRight);
        t.pointer_move(Point::new(70.0, 60.0), SQUARE);
        let r = t.pointer_move(Point::new(50.0, 40.0), SQUARE).unwrap();
        assert!(r.approx_eq(&Rect::new(10.0, 10.0, 40.0, 30.0), 1e-9));
        t.pointer_up();
        assert!(!t.is_dragging());
    }

    #[test]
    fn test_box_move() {
        let mut t = tool();
        assert_eq!(t.pointer_down(Point::new(50.0, 50.0)), CropHandle::Box);
        let r = t.pointer_move(Point::new(40.0, 55.0), SQUARE).unwrap();
        assert!(r.approx_eq(&Rect::new(0.0, 15.0, 80.0, 80.0), 1e-9));
    }

    #[test]
    fn test_fresh_draw_outside() {
        let mut t = CropTool::new(Rect::new(40.0, 40.0, 10.0, 10.0), HitTolerance::default(), 0.05);
        assert_eq!(t.pointer_down(Point::new(5.0, 5.0)), CropHandle::None);
        let r = t.pointer_move(Point::new(25.0, 15.0), SQUARE).unwrap();
        assert!(r.approx_eq(&Rect::new(5.0, 5.0, 20.0, 10.0), 1e-9));
    }

    #[test]
    fn test_locked_drag_keeps_ratio_and_anchor() {
        let container = Size::new(1600.0, 900.0);
        let mut t = tool();
        t.set_aspect_lock(Some(AspectLock::from_ratio(AspectRatio::new(1, 1))), container);
        let start = t.area();
        let start_px = to_canvas_px(&start, container);
        assert!((start_px.width - start_px.height).abs() < 1e-6);

        // Drag the top-left corner; bottom-right must stay put.
        let br = Point::new(start.right(), start.bottom());
        t.pointer_down(Point::new(start.x, start.y));
        let r = t.pointer_move(Point::new(start.x + 20.0, start.y + 5.0), container).unwrap();
        let px = to_canvas_px(&r, container);
        assert!((px.width / px.height - 1.0).abs() < 1e-9);
        assert!((r.right() - br.x).abs() < 1e-9 && (r.bottom() - br.y).abs() < 1e-9);
    }

    #[test]
    fn test_locked_edge_drag_centres_other_axis() {
        let mut t = tool();
        t.set_aspect_lock(Some(AspectLock::from_ratio(AspectRatio::new(2, 1))), SQUARE);
        let start = t.area();
        t.pointer_down(Point::new(start.right(), start.center().y));
        assert_eq!(t.active_handle(), Some(CropHandle::Right));
        let r = t.pointer_move(Point::new(start.right() + 10.0, start.center().y), SQUARE).unwrap();
        assert!((r.width / r.height - 2.0).abs() < 1e-9);
        assert!((r.center().y - start.center().y).abs() < 1e-9);
        assert!((r.x - start.x).abs() < 1e-9);
    }

    #[test]
    fn test_detected_preset_badge_while_dragging() {
        let container = Size::new(1600.0, 900.0);
        let mut t = CropTool::new(Rect::new(0.0, 0.0, 50.0, 50.0), HitTolerance::default(), 0.05);
        t.pointer_down(Point::new(50.0, 50.0));
        t.pointer_move(Point::new(100.0, 100.0), container);
        // 1600 x 900 canvas pixels = 16:9
        assert_eq!(t.badge(), Some(RatioBadge { label: "16:9".into(), locked: false }));
        t.pointer_up();
        assert_eq!(t.badge(), None);
    }

    #[test]
    fn test_move_without_drag_is_none() {
        let mut t = tool();
        assert!(t.pointer_move(Point::new(1.0, 1.0), SQUARE).is_none());
    }
}
