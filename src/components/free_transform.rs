use tracing::trace;

use crate::geometry::{ImageTransform, Point, Rect, Size};

/// Keyboard zoom commands (with the platform zoom modifier held).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ZoomKey {
    In,
    Out,
    Reset,
}

impl ZoomKey {
    /// Map a key character to a zoom command (`+`/`=`, `-`/`_`, `0`).
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '+' | '=' => Some(ZoomKey::In),
            '-' | '_' => Some(ZoomKey::Out),
            '0' => Some(ZoomKey::Reset),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum TransformDrag {
    Move { start_pointer: Point, start: ImageTransform },
    Scale { opposite: Point, initial_distance: f64, start: ImageTransform },
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleLimits {
    pub min: f64,
    pub max: f64,
    pub step: f64,
}

impl Default for ScaleLimits {
    fn default() -> Self {
        Self { min: 0.1, max: 5.0, step: 0.1 }
    }
}

/// Pan/zoom of the preview outside modal tools. Pointer input is in canvas
/// pixels.
#[derive(Clone, Debug)]
pub struct FreeTransform {
    transform: ImageTransform,
    drag: Option<TransformDrag>,
    limits: ScaleLimits,
    handle_px: f64,
}

impl FreeTransform {
    pub fn new(limits: ScaleLimits, handle_px: f64) -> Self {
        Self { transform: ImageTransform::IDENTITY, drag: None, limits, handle_px }
    }

    pub fn transform(&self) -> ImageTransform {
        self.transform
    }

    pub fn set_transform(&mut self, t: ImageTransform) {
        self.transform = t.with_scale(t.scale, self.limits.min, self.limits.max);
    }

    pub fn reset(&mut self) {
        self.transform = ImageTransform::IDENTITY;
        self.drag = None;
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Start a move (inside `bounds`) or a corner scale. Returns whether the
    /// pointer grabbed anything.
    pub fn pointer_down(&mut self, pointer: Point, bounds: &Rect) -> bool {
        let corners = [
            (Point::new(bounds.x, bounds.y), Point::new(bounds.right(), bounds.bottom())),
            (Point::new(bounds.right(), bounds.y), Point::new(bounds.x, bounds.bottom())),
            (Point::new(bounds.x, bounds.bottom()), Point::new(bounds.right(), bounds.y)),
            (Point::new(bounds.right(), bounds.bottom()), Point::new(bounds.x, bounds.y)),
        ];
        let half = self.handle_px * 0.5;
        for (corner, opposite) in corners {
            if (pointer.x - corner.x).abs() <= half && (pointer.y - corner.y).abs() <= half {
                let initial_distance = pointer.distance(opposite);
                if initial_distance > f64::EPSILON {
                    self.drag = Some(TransformDrag::Scale { opposite, initial_distance, start: self.transform });
                    trace!("transform scale drag start");
                    return true;
                }
            }
        }
        if bounds.contains(pointer) {
            self.drag = Some(TransformDrag::Move { start_pointer: pointer, start: self.transform });
            trace!("transform move drag start");
            return true;
        }
        false
    }

    pub fn pointer_move(&mut self, pointer: Point, canvas: Size) -> Option<ImageTransform> {
        let drag = self.drag?;
        self.transform = match drag {
            TransformDrag::Move { start_pointer, start } => {
                if canvas.is_empty() {
                    return Some(self.transform);
                }
                ImageTransform {
                    x: start.x + (pointer.x - start_pointer.x) / canvas.width * 100.0,
                    y: start.y + (pointer.y - start_pointer.y) / canvas.height * 100.0,
                    scale: start.scale,
                }
            }
            TransformDrag::Scale { opposite, initial_distance, start } => {
                let ratio = pointer.distance(opposite) / initial_distance;
                start.with_scale(start.scale * ratio, self.limits.min, self.limits.max)
            }
        };
        Some(self.transform)
    }

    pub fn pointer_up(&mut self) {
        self.drag = None;
    }

    /// Multiply the scale by `factor`, clamped.
    pub fn zoom_by(&mut self, factor: f64) -> ImageTransform {
        self.transform = self
            .transform
            .with_scale(self.transform.scale * factor, self.limits.min, self.limits.max);
        self.transform
    }

    pub fn key_zoom(&mut self, key: ZoomKey) -> ImageTransform {
        match key {
            ZoomKey::In => self.zoom_by(1.0 + self.limits.step),
            ZoomKey::Out => self.zoom_by(1.0 - self.limits.step),
            ZoomKey::Reset => {
                self.reset();
                self.transform
            }
        }
    }

    /// Modifier + wheel. Negative `delta_y` (wheel up) zooms in.
    pub fn wheel_zoom(&mut self, delta_y: f64) -> ImageTransform {
        if delta_y < 0.0 {
            self.zoom_by(1.0 + self.limits.step)
        } else if delta_y > 0.0 {
            self.zoom_by(1.0 - self.limits.step)
        } else {
            self.transform
        }
    }
}
