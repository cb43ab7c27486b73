// ============================================================================
// RENDERER: composites an EditState onto one preview raster
// ============================================================================
//
// Stages, in order:
//   1. window the source by the crop (extended crops get crop_background)
//   2. work out output, nominal and display sizes for the viewport
//   3. paint the workspace / frame background
//   4. resize, then rotate/flip the image about its centre
//   5. pixel filters over the whole canvas
//   6. overlay layers back-to-front
//   7. crop chrome while the crop tool is live
//
// Layers live in nominal-canvas pixels (frame size when framed, output size
// otherwise). Nominal points reach the canvas through `p * s + o`, with
// `s = display_ratio * zoom` and `o` the pan/zoom offset, so layers and the
// image move together.

use image::{RgbaImage, imageops};
use std::borrow::Cow;
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, warn};

use crate::canvas::{blend_pixel, clear};
use crate::config::EngineConfig;
use crate::edit::{BlendMode, Color, EditState, Layer, MAX_EXTENT};
use crate::error::RenderError;
use crate::geometry::{ImageTransform, Point, Rect, Size, contain_scale, display_bounds, fit_size, percent_rect_to_canvas};
use crate::ops::crop_overlay::{CropChrome, RatioBadge, draw_crop_chrome};
use crate::ops::filters::apply_filter_chain;
use crate::ops::shapes::rasterize_shape;
use crate::ops::text::FontBook;
use crate::ops::transform::{Placement, draw_placed, resize};
use crate::overlay_cache::OverlayCache;

/// Live crop-tool state the renderer draws chrome for.
#[derive(Clone, Debug, PartialEq)]
pub struct CropOverlayState {
    /// Crop rectangle in percent of the canvas.
    pub area: Rect,
    pub badge: Option<RatioBadge>,
}

/// Interaction state that affects the picture but not the EditState.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LiveView {
    pub transform: ImageTransform,
    /// `Some` while the crop tool is active.
    pub crop: Option<CropOverlayState>,
}

pub struct RenderRequest<'a> {
    pub state: &'a EditState,
    pub source: &'a RgbaImage,
    /// Space available for the preview. `None` renders at nominal size.
    pub viewport: Option<Size>,
    pub live: LiveView,
}

/// How the last raster maps to the edit, for pointer handling.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CanvasLayout {
    /// Raster size in canvas pixels.
    pub canvas: Size,
    /// Where the (unrotated) image sits on the canvas.
    pub image_bounds: Rect,
    /// Canvas pixels per nominal pixel, before zoom.
    pub display_ratio: f64,
    /// Frame size when framed, else the output size. Source size in crop mode.
    pub nominal: Size,
    /// Size of the image being displayed: output size, or source size in crop mode.
    pub image_size: Size,
    /// Nominal → canvas mapping used for layers: `p * layer_scale + layer_offset`.
    pub layer_scale: f64,
    pub layer_offset: Point,
}

impl CanvasLayout {
    pub fn nominal_to_canvas(&self, p: Point) -> Point {
        Point::new(p.x * self.layer_scale + self.layer_offset.x, p.y * self.layer_scale + self.layer_offset.y)
    }

    pub fn canvas_to_nominal(&self, p: Point) -> Point {
        if self.layer_scale == 0.0 {
            return p;
        }
        Point::new(
            (p.x - self.layer_offset.x) / self.layer_scale,
            (p.y - self.layer_offset.y) / self.layer_scale,
        )
    }
}

#[derive(Clone, Debug)]
pub struct RenderOutput {
    pub image: RgbaImage,
    pub layout: CanvasLayout,
}

/// Canvas used while cropping: the whole source, scaled down to the viewport.
pub fn crop_mode_canvas(source: Size, viewport: Option<Size>) -> Size {
    let fitted = match viewport {
        Some(v) if !v.is_empty() => fit_size(source, v),
        _ => source,
    };
    let (w, h) = fitted.to_pixels();
    Size::from_u32(w, h)
}

/// Integer window `(x, y, w, h)` the crop selects, in source pixels.
fn crop_window(crop: Option<Rect>, source: &RgbaImage) -> (i64, i64, u32, u32) {
    match crop {
        Some(r) => {
            let r = r.normalized();
            // States built without `EditState::apply` can still carry wild values.
            let pos = |v: f64| if v.is_finite() { v.round().clamp(-MAX_EXTENT, MAX_EXTENT) as i64 } else { 0 };
            let len = |v: f64| if v.is_finite() { v.round().clamp(1.0, MAX_EXTENT) as u32 } else { 1 };
            (pos(r.x), pos(r.y), len(r.width), len(r.height))
        }
        None => (0, 0, source.width(), source.height()),
    }
}

/// Stage 1: the cropped image, with crop_background wherever the window
/// hangs past the source.
pub fn window_source<'a>(source: &'a RgbaImage, crop: Option<Rect>, background: Color) -> Cow<'a, RgbaImage> {
    let (x, y, w, h) = crop_window(crop, source);
    if x == 0 && y == 0 && w == source.width() && h == source.height() {
        return Cow::Borrowed(source);
    }
    let inside = x >= 0 && y >= 0 && x + w as i64 <= source.width() as i64 && y + h as i64 <= source.height() as i64;
    if inside {
        return Cow::Owned(imageops::crop_imm(source, x as u32, y as u32, w, h).to_image());
    }
    let mut out = RgbaImage::from_pixel(w, h, background.to_rgba());
    if let (Some(dx), Some(dy)) = (x.checked_neg(), y.checked_neg()) {
        imageops::replace(&mut out, source, dx, dy);
    }
    Cow::Owned(out)
}

fn snap(rect: &Rect) -> Rect {
    Rect::new(rect.x.round(), rect.y.round(), rect.width.round().max(1.0), rect.height.round().max(1.0))
}

fn empty_canvas(viewport: Option<Size>) -> Result<(), RenderError> {
    match viewport {
        Some(v) if !(v.width >= 1.0 && v.height >= 1.0) => Err(RenderError::EmptyCanvas {
            width: v.width.max(0.0) as u32,
            height: v.height.max(0.0) as u32,
        }),
        _ => Ok(()),
    }
}

/// Owns everything a render needs across calls: fonts and decoded overlays.
pub struct Compositor {
    config: EngineConfig,
    fonts: FontBook,
    overlays: OverlayCache,
}

impl Compositor {
    pub fn new(config: EngineConfig) -> Self {
        let fonts = FontBook::new(config.default_font_family.clone(), config.system_fonts);
        Self { config, fonts, overlays: OverlayCache::new() }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn fonts_mut(&mut self) -> &mut FontBook {
        &mut self.fonts
    }

    pub fn render(&mut self, req: &RenderRequest) -> Result<RenderOutput, RenderError> {
        if req.source.width() == 0 || req.source.height() == 0 {
            return Err(RenderError::EmptyCanvas { width: req.source.width(), height: req.source.height() });
        }
        empty_canvas(req.viewport)?;

        let started = Instant::now();
        let out = match &req.live.crop {
            Some(crop) => self.render_crop_mode(req, crop),
            None => self.render_normal(req),
        };
        debug!(
            w = out.image.width(),
            h = out.image.height(),
            layers = req.state.layers.len(),
            crop_mode = req.live.crop.is_some(),
            interpolation = self.config.interpolation.label(),
            elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "render"
        );
        Ok(out)
    }

    fn render_normal(&mut self, req: &RenderRequest) -> RenderOutput {
        let state = req.state;
        let t = &state.transform;
        let live = req.live.transform;

        // (1) Window
        let window = window_source(req.source, t.crop, t.crop_background);

        // (2) Sizes
        let output = match t.resize {
            Some(size) => size,
            None => Size::from_u32(window.width(), window.height()),
        };
        let nominal = match t.frame {
            Some(f) => Size::from_u32(f.width, f.height),
            None => output,
        };
        let ratio = match req.viewport {
            Some(v) => (v.width / nominal.width).min(v.height / nominal.height).min(1.0),
            None => 1.0,
        };
        let (cw, ch) = Size::new(nominal.width * ratio, nominal.height * ratio).to_pixels();
        let canvas = Size::from_u32(cw, ch);

        // (3) Background
        let mut img = RgbaImage::new(cw, ch);
        match t.frame {
            Some(f) => clear(&mut img, f.background),
            None => clear(&mut img, self.config.workspace),
        }

        let scale = ratio * live.scale;
        let offset = Point::new(
            canvas.width * 0.5 * (1.0 - live.scale) + live.x / 100.0 * canvas.width,
            canvas.height * 0.5 * (1.0 - live.scale) + live.y / 100.0 * canvas.height,
        );
        let map = |r: Rect| Rect::new(r.x * scale + offset.x, r.y * scale + offset.y, r.width * scale, r.height * scale);

        // Image rectangle in nominal space
        let image_rect = match t.frame {
            Some(_) => {
                let fit = contain_scale(output, nominal);
                let (w, h) = (output.width * fit, output.height * fit);
                Rect::new((nominal.width - w) * 0.5, (nominal.height - h) * 0.5, w, h)
            }
            None => Rect::from_size(output),
        };
        let bounds = snap(&map(image_rect));

        // (4) Resize, then place with rotation/flip.
        let display = resize(&window, bounds.width as u32, bounds.height as u32, self.config.interpolation);
        let placement = Placement::from_rect(&bounds)
            .rotated(t.rotation)
            .flipped(t.flip_horizontal, t.flip_vertical);
        draw_placed(&mut img, &display, &placement, BlendMode::Normal, 1.0);

        // (5) Filters over the whole composed canvas, frame and corners included.
        apply_filter_chain(&mut img, &state.filters, scale as f32);

        // (6) Layers
        self.draw_layers(&mut img, &state.layers, scale, offset);

        RenderOutput {
            image: img,
            layout: CanvasLayout {
                canvas,
                image_bounds: bounds,
                display_ratio: ratio,
                nominal,
                image_size: output,
                layer_scale: scale,
                layer_offset: offset,
            },
        }
    }

    fn render_crop_mode(&mut self, req: &RenderRequest, crop: &CropOverlayState) -> RenderOutput {
        let state = req.state;
        let source_size = Size::from_u32(req.source.width(), req.source.height());
        let canvas = crop_mode_canvas(source_size, req.viewport);
        let (cw, ch) = canvas.to_pixels();

        let mut img = RgbaImage::new(cw, ch);
        clear(&mut img, self.config.workspace);

        let bounds = snap(&display_bounds(canvas, source_size, req.live.transform));
        let display = resize(req.source, bounds.width as u32, bounds.height as u32, self.config.interpolation);
        draw_placed(&mut img, &display, &Placement::from_rect(&bounds), BlendMode::Normal, 1.0);
        apply_filter_chain(&mut img, &state.filters, (bounds.width / source_size.width) as f32);

        // (7) Chrome
        let chrome = CropChrome {
            crop: percent_rect_to_canvas(crop.area, canvas),
            image_bounds: bounds,
            crop_background: state.transform.crop_background,
            badge: crop.badge.clone(),
        };
        draw_crop_chrome(&mut img, &chrome, &self.config.crop_chrome, &mut self.fonts);

        let ratio = bounds.width / source_size.width;
        RenderOutput {
            image: img,
            layout: CanvasLayout {
                canvas,
                image_bounds: bounds,
                display_ratio: ratio,
                nominal: source_size,
                image_size: source_size,
                layer_scale: ratio,
                layer_offset: Point::new(bounds.x, bounds.y),
            },
        }
    }

    fn draw_layers(&mut self, img: &mut RgbaImage, layers: &[Layer], scale: f64, offset: Point) {
        let (w, h) = img.dimensions();
        for layer in layers {
            let opacity = (layer.opacity() / 100.0).clamp(0.0, 1.0);
            if opacity <= 0.0 {
                continue;
            }
            match layer {
                Layer::Shape(shape) => {
                    if let Some(frag) = rasterize_shape(shape, scale as f32, offset, w, h) {
                        frag.composite_onto(img, BlendMode::Normal, opacity);
                    }
                }
                Layer::Text(text) => {
                    if let Some(raster) = self.fonts.rasterize(text, scale as f32, offset) {
                        draw_placed(img, &raster.image, &raster.placement, BlendMode::Normal, opacity);
                    }
                }
                Layer::Image(overlay) => {
                    let Some(pixels) = self.overlays.get(overlay) else {
                        continue;
                    };
                    let rect = Rect::new(
                        overlay.x * scale + offset.x,
                        overlay.y * scale + offset.y,
                        overlay.width * scale,
                        overlay.height * scale,
                    )
                    .normalized();
                    if rect.is_empty() {
                        warn!(id = %overlay.id, "image layer has no area, skipped");
                        continue;
                    }
                    let placement = Placement::from_rect(&rect)
                        .rotated(overlay.rotation)
                        .flipped(overlay.flip_horizontal, overlay.flip_vertical);
                    draw_placed(img, &pixels, &placement, overlay.blend_mode, opacity);
                }
            }
        }
        let live: HashSet<_> = layers.iter().map(|l| l.id()).collect();
        self.overlays.retain_ids(&live);
    }
}

/// Flatten a straight-alpha raster over `background` (for encoders without
/// an alpha channel).
pub fn flatten(img: &RgbaImage, background: Color) -> RgbaImage {
    let bg = background.to_rgba();
    let mut out = RgbaImage::from_pixel(img.width(), img.height(), bg);
    for (dst, src) in out.pixels_mut().zip(img.pixels()) {
        *dst = blend_pixel(*dst, *src, BlendMode::Normal, 1.0);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use crate::edit::{CropPatch, EditPatch, FilterPatch, Frame, LayerPatch, ShapeKind, ShapeOverlay, TransformPatch};
    use uuid::Uuid;

    fn checker(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| Rgba([(x * 7 % 256) as u8, (y * 11 % 256) as u8, ((x + y) % 256) as u8, 255]))
    }

    fn compositor() -> Compositor {
        Compositor::new(EngineConfig { system_fonts: false, ..EngineConfig::default() })
    }

    fn render(state: &EditState, source: &RgbaImage, viewport: Option<Size>) -> RenderOutput {
        compositor()
            .render(&RenderRequest { state, source, viewport, live: LiveView::default() })
            .unwrap()
    }

    #[test]
    fn test_identity_render_is_pixel_exact() {
        let src = checker(40, 30);
        let out = render(&EditState::default(), &src, None);
        assert_eq!(out.image, src);
        assert_eq!(out.layout.image_bounds, Rect::new(0.0, 0.0, 40.0, 30.0));
    }

    #[test]
    fn test_viewport_scales_down_only() {
        let src = checker(200, 100);
        let out = render(&EditState::default(), &src, Some(Size::new(100.0, 100.0)));
        assert_eq!(out.image.dimensions(), (100, 50));
        assert_eq!(out.layout.display_ratio, 0.5);
        let out = render(&EditState::default(), &src, Some(Size::new(1000.0, 1000.0)));
        assert_eq!(out.image.dimensions(), (200, 100));
    }

    #[test]
    fn test_inside_crop_windows_source() {
        let src = checker(50, 50);
        let state = EditState::default()
            .apply(&EditPatch::Crop(CropPatch::Set(Some(Rect::new(10.0, 5.0, 20.0, 15.0)))))
            .unwrap();
        let out = render(&state, &src, None);
        assert_eq!(out.image.dimensions(), (20, 15));
        assert_eq!(out.image.get_pixel(0, 0), src.get_pixel(10, 5));
        assert_eq!(out.image.get_pixel(19, 14), src.get_pixel(29, 19));
    }

    #[test]
    fn test_frame_letterboxes_output() {
        let src = RgbaImage::from_pixel(100, 50, Rgba([0, 0, 0, 255]));
        let frame = Frame { width: 100, height: 100, background: Color::rgb(0, 255, 0) };
        let state = EditState::default().apply(&EditPatch::Transform(TransformPatch::SetFrame(Some(frame)))).unwrap();
        let out = render(&state, &src, None);
        assert_eq!(out.image.dimensions(), (100, 100));
        assert_eq!(*out.image.get_pixel(50, 10), Rgba([0, 255, 0, 255]));
        assert_eq!(*out.image.get_pixel(50, 50), Rgba([0, 0, 0, 255]));
        assert_eq!(out.layout.image_bounds, Rect::new(0.0, 25.0, 100.0, 50.0));
    }

    #[test]
    fn test_filters_cover_frame_background() {
        let src = RgbaImage::from_pixel(100, 50, Rgba([0, 0, 0, 255]));
        let frame = Frame { width: 100, height: 100, background: Color::rgb(255, 0, 0) };
        let state = EditState::default()
            .apply(&EditPatch::Batch(vec![
                EditPatch::Transform(TransformPatch::SetFrame(Some(frame))),
                EditPatch::Filter(FilterPatch { grayscale: Some(true), ..Default::default() }),
            ]))
            .unwrap();
        let out = render(&state, &src, None);
        let p = out.image.get_pixel(50, 5);
        assert_eq!(p[0], p[1]);
        assert_eq!(p[1], p[2]);
        assert_eq!(*p, Rgba([54, 54, 54, 255]));
    }

    #[test]
    fn test_filters_cover_rotation_corners() {
        let src = RgbaImage::from_pixel(40, 40, Rgba([255, 0, 0, 255]));
        let state = EditState::default()
            .apply(&EditPatch::Batch(vec![
                EditPatch::Transform(TransformPatch::SetRotation(45.0)),
                EditPatch::Filter(FilterPatch { grayscale: Some(true), ..Default::default() }),
            ]))
            .unwrap();
        let out = render(&state, &src, None);
        let (w, h) = out.image.dimensions();
        let centre = out.image.get_pixel(w / 2, h / 2);
        assert_eq!(*centre, Rgba([54, 54, 54, 255]));
        assert!(out.image.pixels().all(|p| p[0] == p[1] && p[1] == p[2]));
    }

    #[test]
    fn test_far_crop_window_is_background_only() {
        let src = checker(20, 20);
        let far = window_source(&src, Some(Rect::new(-1e19, 0.0, 10.0, 10.0)), Color::rgb(0, 0, 255));
        assert_eq!(far.dimensions(), (10, 10));
        assert!(far.pixels().all(|p| *p == Rgba([0, 0, 255, 255])));

        let wild = window_source(&src, Some(Rect::new(f64::NAN, f64::INFINITY, f64::NAN, 1e30)), Color::BLACK);
        assert_eq!(wild.width(), 1);
        assert_eq!(wild.height(), MAX_EXTENT as u32);
    }

    #[test]
    fn test_rotation_180_reverses_pixels() {
        let src = checker(10, 6);
        let state = EditState::default().apply(&EditPatch::Transform(TransformPatch::SetRotation(180.0))).unwrap();
        let out = render(&state, &src, None);
        assert_eq!(out.image.get_pixel(0, 0), src.get_pixel(9, 5));
        assert_eq!(out.image.get_pixel(9, 5), src.get_pixel(0, 0));
    }

    #[test]
    fn test_flip_horizontal() {
        let src = checker(8, 4);
        let state = EditState::default().apply(&EditPatch::Transform(TransformPatch::FlipHorizontal)).unwrap();
        let out = render(&state, &src, None);
        assert_eq!(out.image.get_pixel(0, 2), src.get_pixel(7, 2));
    }

    #[test]
    fn test_shape_layer_follows_display_ratio() {
        let src = RgbaImage::from_pixel(200, 200, Rgba([255, 255, 255, 255]));
        let shape = ShapeOverlay {
            id: Uuid::new_v4(),
            kind: ShapeKind::Rectangle,
            x: 100.0,
            y: 100.0,
            width: 40.0,
            height: 40.0,
            rotation: 0.0,
            opacity: 100.0,
            fill: Some(Color::rgb(255, 0, 0)),
            stroke: None,
            stroke_width: 0.0,
        };
        let state = EditState::default().apply(&EditPatch::Layer(LayerPatch::Add(Layer::Shape(shape)))).unwrap();
        let out = render(&state, &src, Some(Size::new(100.0, 100.0)));
        assert_eq!(*out.image.get_pixel(60, 60), Rgba([255, 0, 0, 255]));
        assert_eq!(*out.image.get_pixel(45, 45), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_broken_overlay_is_skipped() {
        let src = checker(20, 20);
        let layer: Layer = serde_json::from_str(
            r#"{"type": "image", "src": "data:image/png;base64,AAAA", "x": 0, "y": 0, "width": 10, "height": 10}"#,
        )
        .unwrap();
        let state = EditState::default().apply(&EditPatch::Layer(LayerPatch::Add(layer))).unwrap();
        assert_eq!(render(&state, &src, None).image, src);
    }

    #[test]
    fn test_crop_mode_shows_whole_source_with_chrome() {
        let src = RgbaImage::from_pixel(200, 100, Rgba([100, 100, 100, 255]));
        let state = EditState::default()
            .apply(&EditPatch::Batch(vec![
                EditPatch::Transform(TransformPatch::SetRotation(45.0)),
                EditPatch::Crop(CropPatch::Set(Some(Rect::new(0.0, 0.0, 50.0, 50.0)))),
            ]))
            .unwrap();
        let live = LiveView {
            transform: ImageTransform::IDENTITY,
            crop: Some(CropOverlayState { area: Rect::new(25.0, 25.0, 50.0, 50.0), badge: None }),
        };
        let out = compositor()
            .render(&RenderRequest { state: &state, source: &src, viewport: Some(Size::new(100.0, 100.0)), live })
            .unwrap();
        assert_eq!(out.image.dimensions(), (100, 50));
        assert_eq!(out.layout.image_size, Size::new(200.0, 100.0));
        // Inside the crop: untouched source; outside: shaded.
        assert_eq!(*out.image.get_pixel(50, 25), Rgba([100, 100, 100, 255]));
        assert!(out.image.get_pixel(5, 25)[0] < 100);
    }

    #[test]
    fn test_filters_apply() {
        let src = RgbaImage::from_pixel(4, 4, Rgba([100, 100, 100, 255]));
        let state = EditState::default()
            .apply(&EditPatch::Filter(FilterPatch { brightness: Some(150.0), ..Default::default() }))
            .unwrap();
        assert_eq!(*render(&state, &src, None).image.get_pixel(1, 1), Rgba([150, 150, 150, 255]));
    }

    #[test]
    fn test_empty_viewport_is_error() {
        let src = checker(4, 4);
        let err = compositor()
            .render(&RenderRequest {
                state: &EditState::default(),
                source: &src,
                viewport: Some(Size::new(0.0, 10.0)),
                live: LiveView::default(),
            })
            .unwrap_err();
        assert!(matches!(err, RenderError::EmptyCanvas { .. }));
    }

    #[test]
    fn test_zoom_scales_about_centre() {
        let src = checker(100, 100);
        let live = LiveView { transform: ImageTransform { x: 0.0, y: 0.0, scale: 0.5 }, crop: None };
        let out = compositor()
            .render(&RenderRequest { state: &EditState::default(), source: &src, viewport: None, live })
            .unwrap();
        assert_eq!(out.layout.image_bounds, Rect::new(25.0, 25.0, 50.0, 50.0));
        assert_eq!(out.layout.nominal_to_canvas(Point::new(0.0, 0.0)), Point::new(25.0, 25.0));
        assert_eq!(out.layout.canvas_to_nominal(Point::new(75.0, 75.0)), Point::new(100.0, 100.0));
    }
}
