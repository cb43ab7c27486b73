// ============================================================================
// EDITOR: one editing session (source, history, tools and the live preview)
// ============================================================================
//
// Every call that can change what is on screen re-renders before returning,
// so `raster()` is always current. A render that fails keeps the previous
// raster; the failure is logged and kept in `last_render_error()`.

use image::RgbaImage;
use std::sync::Arc;
use tracing::{info, warn};

use crate::components::controller::{AspectChoice, Controller, EditMode};
use crate::components::free_transform::ZoomKey;
use crate::components::history::{HistoryManager, HistoryStatus};
use crate::config::EngineConfig;
use crate::edit::{EditPatch, EditState};
use crate::error::{EngineResult, ExportError, RenderError, SourceError};
use crate::export::{ExportFormat, encode};
use crate::geometry::{CropHandle, ImageTransform, Point, Size};
use crate::ops::text::FontBook;
use crate::renderer::{CanvasLayout, Compositor, RenderOutput, RenderRequest};
use crate::source::SourceSlot;
use crate::suggestion::{Assistant, request_patch};

pub struct Editor {
    source: SourceSlot,
    history: HistoryManager,
    controller: Controller,
    compositor: Compositor,
    viewport: Option<Size>,
    output: Option<RenderOutput>,
    last_error: Option<RenderError>,
}

impl Editor {
    pub fn new(config: EngineConfig) -> Self {
        let config = config.sanitized();
        Self {
            source: SourceSlot::new(),
            history: HistoryManager::new(EditState::default(), config.max_history),
            controller: Controller::new(&config),
            compositor: Compositor::new(config),
            viewport: None,
            output: None,
            last_error: None,
        }
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    pub fn config(&self) -> &EngineConfig {
        self.compositor.config()
    }

    pub fn state(&self) -> Arc<EditState> {
        self.history.current()
    }

    pub fn history(&self) -> &HistoryManager {
        &self.history
    }

    pub fn history_status(&self) -> HistoryStatus {
        self.history.status()
    }

    pub fn source(&self) -> &SourceSlot {
        &self.source
    }

    pub fn mode(&self) -> EditMode {
        self.controller.mode()
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn transform(&self) -> ImageTransform {
        self.controller.transform()
    }

    pub fn viewport(&self) -> Option<Size> {
        self.viewport
    }

    pub fn raster(&self) -> Option<&RgbaImage> {
        self.output.as_ref().map(|o| &o.image)
    }

    pub fn layout(&self) -> Option<&CanvasLayout> {
        self.output.as_ref().map(|o| &o.layout)
    }

    pub fn last_render_error(&self) -> Option<&RenderError> {
        self.last_error.as_ref()
    }

    pub fn fonts_mut(&mut self) -> &mut FontBook {
        self.compositor.fonts_mut()
    }

    // ------------------------------------------------------------------
    // Source
    // ------------------------------------------------------------------

    pub fn begin_load(&mut self) -> u64 {
        self.source.begin_load()
    }

    /// Finish a load started with `begin_load`. A new image starts a fresh
    /// edit history.
    pub fn complete_load(&mut self, ticket: u64, bytes: &[u8]) -> EngineResult<()> {
        self.source.complete(ticket, bytes)?;
        self.on_new_source();
        Ok(())
    }

    pub fn fail_load(&mut self, ticket: u64, message: impl Into<String>) -> EngineResult<()> {
        self.source.fail(ticket, message)?;
        self.rerender();
        Ok(())
    }

    /// Install already-decoded pixels as the source.
    pub fn load_image(&mut self, image: RgbaImage) -> EngineResult<()> {
        let ticket = self.source.begin_load();
        self.source.complete_with_image(ticket, image)?;
        self.on_new_source();
        Ok(())
    }

    fn on_new_source(&mut self) {
        self.history.clear(EditState::default());
        self.controller = Controller::new(self.compositor.config());
        self.rerender();
    }

    // ------------------------------------------------------------------
    // Edits and history
    // ------------------------------------------------------------------

    /// Apply `patch` as one history entry.
    pub fn apply(&mut self, patch: &EditPatch) -> EngineResult<HistoryStatus> {
        let next = self.history.current().apply(patch)?;
        let status = self.history.commit(next, patch.label());
        self.rerender();
        Ok(status)
    }

    pub fn undo(&mut self) -> EngineResult<HistoryStatus> {
        let status = self.history.undo()?;
        self.rerender();
        Ok(status)
    }

    pub fn redo(&mut self) -> EngineResult<HistoryStatus> {
        let status = self.history.redo()?;
        self.rerender();
        Ok(status)
    }

    pub fn jump_to(&mut self, index: usize) -> EngineResult<HistoryStatus> {
        let status = self.history.jump_to(index)?;
        self.rerender();
        Ok(status)
    }

    /// Ask `assistant` for filter values and commit them as one entry.
    /// A failed request leaves the EditState untouched.
    pub fn apply_suggestion(&mut self, assistant: &dyn Assistant, command: &str) -> EngineResult<HistoryStatus> {
        let raster = self.output.as_ref().map(|o| &o.image).ok_or(RenderError::SourceUnavailable(SourceError::Empty))?;
        let patch = request_patch(assistant, command, raster)?;
        info!(command, "applying assistant suggestion");
        self.apply(&patch)
    }

    // ------------------------------------------------------------------
    // Viewport and tools
    // ------------------------------------------------------------------

    pub fn set_viewport(&mut self, viewport: Option<Size>) {
        if self.viewport == viewport {
            return;
        }
        self.viewport = viewport;
        self.controller.set_viewport(viewport);
        self.rerender();
    }

    pub fn set_mode(&mut self, mode: EditMode) -> EngineResult<()> {
        let source = self.source.size().ok_or(SourceError::Empty)?;
        let state = self.history.current();
        self.controller.set_mode(mode, &state, source, self.viewport);
        self.rerender();
        Ok(())
    }

    pub fn pointer_down(&mut self, p: Point) -> bool {
        let Some(layout) = self.layout().copied() else {
            return false;
        };
        let grabbed = self.controller.pointer_down(p, &layout);
        if grabbed {
            self.rerender();
        }
        grabbed
    }

    pub fn pointer_move(&mut self, p: Point) -> bool {
        let Some(layout) = self.layout().copied() else {
            return false;
        };
        let changed = self.controller.pointer_move(p, &layout);
        if changed {
            self.rerender();
        }
        changed
    }

    pub fn pointer_up(&mut self) {
        let was_dragging = self.controller.is_dragging();
        self.controller.pointer_up();
        if was_dragging {
            self.rerender();
        }
    }

    pub fn hover(&self, p: Point) -> CropHandle {
        match self.layout() {
            Some(layout) => self.controller.hover(p, layout),
            None => CropHandle::None,
        }
    }

    pub fn key_zoom(&mut self, key: ZoomKey) -> ImageTransform {
        let t = self.controller.key_zoom(key);
        self.rerender();
        t
    }

    pub fn wheel_zoom(&mut self, delta_y: f64) -> ImageTransform {
        let t = self.controller.wheel_zoom(delta_y);
        self.rerender();
        t
    }

    pub fn set_aspect_lock(&mut self, choice: AspectChoice) {
        self.controller.set_aspect_lock(choice);
        self.rerender();
    }

    /// Commit the live crop. `Ok(None)` when the crop tool is not active.
    pub fn confirm_crop(&mut self) -> EngineResult<Option<HistoryStatus>> {
        let Some(patch) = self.controller.crop_actions().and_then(|a| a.confirm()) else {
            return Ok(None);
        };
        self.apply(&patch).map(Some)
    }

    pub fn cancel_crop(&mut self) {
        if let Some(actions) = self.controller.crop_actions() {
            actions.cancel();
            self.rerender();
        }
    }

    pub fn reset_crop_view(&mut self) {
        if let Some(actions) = self.controller.crop_actions() {
            actions.reset_view();
            self.rerender();
        }
    }

    // ------------------------------------------------------------------
    // Rendering and export
    // ------------------------------------------------------------------

    /// Render now, reporting failure. The previous raster survives an error.
    pub fn refresh(&mut self) -> Result<&RenderOutput, RenderError> {
        let source = self.source.image()?;
        let state = self.history.current();
        let out = self.compositor.render(&RenderRequest {
            state: &state,
            source: &source,
            viewport: self.viewport,
            live: self.controller.live_view(),
        })?;
        self.last_error = None;
        Ok(self.output.insert(out))
    }

    fn rerender(&mut self) {
        if let Err(e) = self.refresh() {
            warn!(error = %e, "render failed, keeping previous preview");
            self.last_error = Some(e);
        }
    }

    pub fn export(&self, format: ExportFormat) -> Result<Vec<u8>, ExportError> {
        let raster = self.raster().ok_or(ExportError::NoRaster)?;
        encode(raster, format)
    }
}
