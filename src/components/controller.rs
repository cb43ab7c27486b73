// ============================================================================
// CONTROLLER: tool modes, pointer routing and the crop confirm/cancel handle
// ============================================================================
//
// Pointer positions arrive in canvas pixels of the most recent render
// (`CanvasLayout`). Crop mode keeps its own rectangle in canvas percent; it
// only becomes an edit when the host confirms through `crop_actions()`.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::components::crop_tool::{AspectLock, CropTool};
use crate::components::free_transform::{FreeTransform, ScaleLimits, ZoomKey};
use crate::config::EngineConfig;
use crate::edit::{CropPatch, EditPatch, EditState};
use crate::geometry::{
    AspectRatio, CropHandle, HitTolerance, ImageTransform, Point, Rect, Size, canvas_point_to_percent,
    percent_to_pixels, pixels_to_percent,
};
use crate::renderer::{CanvasLayout, CropOverlayState, LiveView, crop_mode_canvas};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditMode {
    #[default]
    None,
    Crop,
    Rotate,
    Resize,
}

impl EditMode {
    pub fn label(&self) -> &'static str {
        match self {
            EditMode::None => "None",
            EditMode::Crop => "Crop",
            EditMode::Rotate => "Rotate",
            EditMode::Resize => "Resize",
        }
    }
}

/// Requested aspect lock for the crop tool.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AspectChoice {
    Free,
    Original,
    Ratio(AspectRatio),
}

/// What the crop rectangle is measured against while cropping.
#[derive(Clone, Copy, Debug, PartialEq)]
struct CropContext {
    source: Size,
    canvas: Size,
}

pub struct Controller {
    mode: EditMode,
    free: FreeTransform,
    crop: Option<(CropTool, CropContext)>,
    tolerance: HitTolerance,
    ratio_tolerance: f64,
    default_crop: Rect,
}

impl Controller {
    pub fn new(config: &EngineConfig) -> Self {
        let limits = ScaleLimits { min: config.min_scale, max: config.max_scale, step: config.zoom_step };
        Self {
            mode: EditMode::None,
            free: FreeTransform::new(limits, config.transform_handle_px),
            crop: None,
            tolerance: config.hit_tolerance,
            ratio_tolerance: config.ratio_tolerance,
            default_crop: config.default_crop,
        }
    }

    pub fn mode(&self) -> EditMode {
        self.mode
    }

    pub fn transform(&self) -> ImageTransform {
        self.free.transform()
    }

    pub fn crop_tool(&self) -> Option<&CropTool> {
        self.crop.as_ref().map(|(tool, _)| tool)
    }

    pub fn is_dragging(&self) -> bool {
        self.free.is_dragging() || self.crop_tool().is_some_and(|t| t.is_dragging())
    }

    /// What the renderer needs from the interaction state.
    pub fn live_view(&self) -> LiveView {
        LiveView {
            transform: self.free.transform(),
            crop: self
                .crop
                .as_ref()
                .map(|(tool, _)| CropOverlayState { area: tool.area(), badge: tool.badge() }),
        }
    }

    /// Switch tools. The pan/zoom transform resets on every change; entering
    /// crop mode seeds the rectangle from the committed crop.
    pub fn set_mode(&mut self, mode: EditMode, state: &EditState, source: Size, viewport: Option<Size>) {
        if mode == self.mode {
            return;
        }
        self.free.reset();
        self.crop = None;
        if mode == EditMode::Crop {
            let canvas = crop_mode_canvas(source, viewport);
            let area = match state.transform.crop {
                Some(px) => pixels_to_percent(px, canvas, source, ImageTransform::IDENTITY),
                None => self.default_crop,
            };
            let tool = CropTool::new(area, self.tolerance, self.ratio_tolerance);
            self.crop = Some((tool, CropContext { source, canvas }));
        }
        info!(from = self.mode.label(), to = mode.label(), "tool mode change");
        self.mode = mode;
    }

    /// Keep the crop canvas in step with a resized viewport. The rectangle is
    /// stored in percent, so its pixel value is unchanged.
    pub fn set_viewport(&mut self, viewport: Option<Size>) {
        if let Some((_, ctx)) = &mut self.crop {
            ctx.canvas = crop_mode_canvas(ctx.source, viewport);
        }
    }

    /// Returns whether the pointer grabbed something.
    pub fn pointer_down(&mut self, p: Point, layout: &CanvasLayout) -> bool {
        match self.mode {
            EditMode::Crop => match &mut self.crop {
                Some((tool, _)) => {
                    let pct = canvas_point_to_percent(p, layout.canvas);
                    tool.pointer_down(pct);
                    true
                }
                None => false,
            },
            EditMode::None => self.free.pointer_down(p, &layout.image_bounds),
            EditMode::Rotate | EditMode::Resize => false,
        }
    }

    /// Returns whether anything visible changed.
    pub fn pointer_move(&mut self, p: Point, layout: &CanvasLayout) -> bool {
        match self.mode {
            EditMode::Crop => match &mut self.crop {
                Some((tool, _)) => {
                    let pct = canvas_point_to_percent(p, layout.canvas);
                    tool.pointer_move(pct, layout.canvas).is_some()
                }
                None => false,
            },
            EditMode::None => self.free.pointer_move(p, layout.canvas).is_some(),
            EditMode::Rotate | EditMode::Resize => false,
        }
    }

    pub fn pointer_up(&mut self) {
        self.free.pointer_up();
        if let Some((tool, _)) = &mut self.crop {
            tool.pointer_up();
        }
    }

    /// Handle under the pointer in crop mode, for cursor feedback.
    pub fn hover(&self, p: Point, layout: &CanvasLayout) -> CropHandle {
        match &self.crop {
            Some((tool, _)) => tool.hover(canvas_point_to_percent(p, layout.canvas)),
            None => CropHandle::None,
        }
    }

    pub fn key_zoom(&mut self, key: ZoomKey) -> ImageTransform {
        let before = self.free.transform();
        let after = self.free.key_zoom(key);
        self.remap_crop(before, after);
        after
    }

    pub fn wheel_zoom(&mut self, delta_y: f64) -> ImageTransform {
        let before = self.free.transform();
        let after = self.free.wheel_zoom(delta_y);
        self.remap_crop(before, after);
        after
    }

    /// The crop rectangle follows the image through zoom so that it keeps
    /// selecting the same source pixels.
    fn remap_crop(&mut self, before: ImageTransform, after: ImageTransform) {
        if before == after {
            return;
        }
        if let Some((tool, ctx)) = &mut self.crop {
            let ctx = *ctx;
            tool.remap(|r| {
                let px = percent_to_pixels(r, ctx.canvas, ctx.source, before);
                pixels_to_percent(px, ctx.canvas, ctx.source, after)
            });
            debug!(scale = after.scale, "crop area remapped for zoom");
        }
    }

    pub fn set_aspect_lock(&mut self, choice: AspectChoice) {
        if let Some((tool, ctx)) = &mut self.crop {
            let lock = match choice {
                AspectChoice::Free => None,
                AspectChoice::Original => AspectLock::original(ctx.source),
                AspectChoice::Ratio(r) => Some(AspectLock::from_ratio(r)),
            };
            tool.set_aspect_lock(lock, ctx.canvas);
        }
    }

    /// Confirm/cancel handle for the live crop; `None` outside crop mode.
    pub fn crop_actions(&mut self) -> Option<CropActions<'_>> {
        if self.crop.is_some() { Some(CropActions { controller: self }) } else { None }
    }

    fn leave_crop(&mut self) {
        self.crop = None;
        self.free.reset();
        self.mode = EditMode::None;
    }
}

/// Borrowed handle over an active crop session.
pub struct CropActions<'a> {
    controller: &'a mut Controller,
}

impl CropActions<'_> {
    /// The rectangle as it would be committed, in source pixels.
    pub fn pending_crop(&self) -> Option<Rect> {
        let (tool, ctx) = self.controller.crop.as_ref()?;
        let px = percent_to_pixels(tool.area(), ctx.canvas, ctx.source, self.controller.free.transform());
        Some(px.normalized())
    }

    /// End the session and return the patch to commit.
    pub fn confirm(self) -> Option<EditPatch> {
        let rect = self.pending_crop()?;
        info!(x = rect.x, y = rect.y, w = rect.width, h = rect.height, "crop confirmed");
        self.controller.leave_crop();
        Some(EditPatch::Crop(CropPatch::Set(Some(rect))))
    }

    /// End the session without touching the EditState.
    pub fn cancel(self) {
        info!("crop cancelled");
        self.controller.leave_crop();
    }

    /// Drop any zoom while keeping the selected pixels.
    pub fn reset_view(self) {
        let before = self.controller.free.transform();
        self.controller.free.reset();
        self.controller.remap_crop(before, ImageTransform::IDENTITY);
    }
}
