//! End-to-end checks through the public engine API: edits, history, the crop
//! tool and the compositor working together.

use image::{Rgba, RgbaImage};

use photofe::canvas::blend_pixel;
use photofe::components::controller::{AspectChoice, EditMode};
use photofe::components::free_transform::ZoomKey;
use photofe::config::EngineConfig;
use photofe::edit::{BlendMode, Color, CropPatch, EditPatch, EditState, FilterPatch, Layer, Transform, TransformPatch};
use photofe::editor::Editor;
use photofe::error::{EngineError, HistoryError};
use photofe::geometry::{AspectRatio, ImageTransform, Point, Rect, Size, percent_to_pixels, pixels_to_percent};
use photofe::renderer::{Compositor, LiveView, RenderRequest};

fn config() -> EngineConfig {
    EngineConfig { system_fonts: false, ..EngineConfig::default() }
}

fn gradient(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| Rgba([x as u8, y as u8, 50, 255]))
}

fn editor_with(img: RgbaImage) -> Editor {
    let mut ed = Editor::new(config());
    ed.load_image(img).unwrap();
    ed
}

fn filter(f: FilterPatch) -> EditPatch {
    EditPatch::Filter(f)
}

#[test]
fn percent_mapping_round_trips_under_zoom_and_pan() {
    let container = Size::new(640.0, 480.0);
    for image in [Size::new(300.0, 200.0), Size::new(1200.0, 4000.0)] {
        for t in [
            ImageTransform::IDENTITY,
            ImageTransform { x: 5.0, y: -12.0, scale: 3.0 },
            ImageTransform { x: -40.0, y: 0.0, scale: 0.25 },
        ] {
            let r = Rect::new(-10.0, 25.0, image.width * 0.5, image.height * 0.75);
            let back = percent_to_pixels(pixels_to_percent(r, container, image, t), container, image, t);
            assert!(back.approx_eq(&r, 1e-6), "{:?} under {:?}", image, t);
        }
    }
}

#[test]
fn history_branch_discards_redo() {
    let mut ed = editor_with(gradient(20, 20));
    ed.apply(&filter(FilterPatch { brightness: Some(110.0), ..Default::default() })).unwrap();
    ed.apply(&filter(FilterPatch { contrast: Some(120.0), ..Default::default() })).unwrap();
    ed.apply(&filter(FilterPatch { hue: Some(30.0), ..Default::default() })).unwrap();
    ed.undo().unwrap();
    let status = ed.apply(&filter(FilterPatch { saturation: Some(50.0), ..Default::default() })).unwrap();

    assert_eq!(ed.history().labels(), vec!["Open", "Brightness", "Contrast", "Saturation"]);
    assert!(!status.can_redo);
    assert_eq!(status.state.filters.hue, 0.0);
    assert!(matches!(ed.redo(), Err(EngineError::History(HistoryError::NothingToRedo))));
}

#[test]
fn undo_restores_previous_raster() {
    let src = gradient(30, 20);
    let mut ed = editor_with(src.clone());
    assert_eq!(ed.raster(), Some(&src));

    ed.apply(&EditPatch::Transform(TransformPatch::RotateBy(180.0))).unwrap();
    assert_ne!(ed.raster(), Some(&src));
    ed.undo().unwrap();
    assert_eq!(ed.raster(), Some(&src));
}

#[test]
fn failed_patch_leaves_state_untouched() {
    let mut ed = editor_with(gradient(10, 10));
    ed.apply(&filter(FilterPatch { blur: Some(1.0), ..Default::default() })).unwrap();
    let before = ed.state();
    let bad = EditPatch::Batch(vec![
        filter(FilterPatch { brightness: Some(140.0), ..Default::default() }),
        EditPatch::Transform(TransformPatch::SetRotation(f64::NAN)),
    ]);
    assert!(ed.apply(&bad).is_err());
    assert_eq!(*ed.state(), *before);
    assert_eq!(ed.history().len(), 2);
}

#[test]
fn new_source_starts_fresh_history() {
    let mut ed = editor_with(gradient(10, 10));
    ed.apply(&EditPatch::Transform(TransformPatch::FlipHorizontal)).unwrap();
    ed.load_image(gradient(12, 8)).unwrap();
    assert_eq!(ed.history().len(), 1);
    assert_eq!(*ed.state(), EditState::default());
    assert_eq!(ed.raster().map(|r| r.dimensions()), Some((12, 8)));
}

#[test]
fn extended_crop_pads_with_background() {
    let src = gradient(100, 100);
    let state = EditState {
        transform: Transform {
            crop: Some(Rect::new(-20.0, 0.0, 120.0, 100.0)),
            crop_background: Color::rgb(0, 0, 255),
            ..Transform::default()
        },
        ..EditState::default()
    };
    let mut compositor = Compositor::new(config());
    let out = compositor
        .render(&RenderRequest { state: &state, source: &src, viewport: None, live: LiveView::default() })
        .unwrap();

    assert_eq!(out.image.dimensions(), (120, 100));
    for y in [0, 50, 99] {
        for x in [0, 10, 19] {
            assert_eq!(*out.image.get_pixel(x, y), Rgba([0, 0, 255, 255]));
        }
        for x in [20, 70, 119] {
            assert_eq!(out.image.get_pixel(x, y), src.get_pixel(x - 20, y));
        }
    }
}

#[test]
fn brightness_applies_before_contrast() {
    let mut ed = editor_with(RgbaImage::from_pixel(4, 4, Rgba([200, 200, 200, 255])));
    ed.apply(&filter(FilterPatch { brightness: Some(150.0), contrast: Some(50.0), ..Default::default() }))
        .unwrap();
    // 200 * 1.5 clamps to 255, then contrast halves the distance to mid grey.
    // The opposite order would give 246.
    assert_eq!(*ed.raster().unwrap().get_pixel(1, 1), Rgba([191, 191, 191, 255]));
}

#[test]
fn repeated_renders_are_identical() {
    let src = gradient(64, 48);
    let shape: Layer = serde_json::from_str(
        r##"{"type": "shape", "kind": "circle", "x": 10, "y": 8, "width": 30, "height": 20, "fill": "#ff000080", "stroke": "#000", "stroke_width": 3}"##,
    )
    .unwrap();
    let state = EditState::default()
        .apply(&EditPatch::Batch(vec![
            EditPatch::Transform(TransformPatch::SetRotation(30.0)),
            filter(FilterPatch { saturation: Some(140.0), vignette: Some(20.0), ..Default::default() }),
            EditPatch::Layer(photofe::edit::LayerPatch::Add(shape)),
        ]))
        .unwrap();

    let mut compositor = Compositor::new(config());
    let request = RenderRequest { state: &state, source: &src, viewport: Some(Size::new(50.0, 50.0)), live: LiveView::default() };
    let a = compositor.render(&request).unwrap();
    let b = compositor.render(&request).unwrap();
    assert_eq!(a.image, b.image);
    assert_eq!(a.layout, b.layout);
}

#[test]
fn locked_crop_commits_square() {
    let mut ed = editor_with(gradient(200, 100));
    ed.set_viewport(Some(Size::new(200.0, 100.0)));
    ed.set_mode(EditMode::Crop).unwrap();
    ed.set_aspect_lock(AspectChoice::Ratio(AspectRatio::new(1, 1)));

    // The default 160x80 area grew to 160x160 about its centre, so the
    // bottom-right corner now sits below the canvas at (180, 130).
    assert!(ed.pointer_down(Point::new(180.0, 130.0)));
    ed.pointer_move(Point::new(150.0, 100.0));
    ed.pointer_up();

    let status = ed.confirm_crop().unwrap().unwrap();
    let crop = status.state.transform.crop.unwrap();
    assert!((crop.width - crop.height).abs() < 1e-6, "{:?}", crop);
    assert!((crop.width - 130.0).abs() < 1e-6);
    assert!((crop.x - 20.0).abs() < 1e-6 && (crop.y + 30.0).abs() < 1e-6);
}

#[test]
fn crop_mode_renders_whole_source() {
    let mut ed = editor_with(gradient(200, 100));
    ed.apply(&EditPatch::Crop(CropPatch::Set(Some(Rect::new(50.0, 25.0, 50.0, 50.0))))).unwrap();
    ed.set_viewport(Some(Size::new(100.0, 100.0)));
    assert_eq!(ed.raster().map(|r| r.dimensions()), Some((50, 50)));

    ed.set_mode(EditMode::Crop).unwrap();
    assert_eq!(ed.raster().map(|r| r.dimensions()), Some((100, 50)));

    ed.cancel_crop();
    assert_eq!(ed.mode(), EditMode::None);
    assert_eq!(ed.raster().map(|r| r.dimensions()), Some((50, 50)));
}

#[test]
fn extended_crop_strip_matches_committed_render() {
    let workspace = Rgba([40, 40, 40, 255]);
    let tint = blend_pixel(workspace, Rgba([0, 0, 255, 102]), BlendMode::Normal, 1.0);

    for zoomed in [false, true] {
        let mut ed = Editor::new(EngineConfig { workspace: Color::rgb(40, 40, 40), ..config() });
        ed.load_image(gradient(200, 100)).unwrap();
        ed.set_viewport(Some(Size::new(200.0, 100.0)));
        ed.apply(&EditPatch::Crop(CropPatch::Background(Color::rgb(0, 0, 255)))).unwrap();
        ed.set_mode(EditMode::Crop).unwrap();

        // Unzoomed the left crop edge sits at x = 20. Zooming out to 0.9
        // moves the image to (10, 5, 180, 90) and the edge to x = 28.
        // Both drags end 10 source pixels left of the image.
        let (grab, release) = if zoomed {
            ed.key_zoom(ZoomKey::Out);
            (28.0, 1.0)
        } else {
            (20.0, -10.0)
        };
        assert!(ed.pointer_down(Point::new(grab, 50.0)), "zoomed: {}", zoomed);
        ed.pointer_move(Point::new(release, 50.0));
        ed.pointer_up();

        let layout = *ed.layout().unwrap();
        let area = ed.controller().crop_tool().unwrap().area();
        let strip_canvas = layout.image_bounds.x - area.x / 100.0 * layout.canvas.width;
        let strip = strip_canvas / layout.display_ratio;
        assert!((strip - 10.0).abs() < 1e-6, "zoomed: {}, strip {}", zoomed, strip);

        if zoomed {
            let raster = ed.raster().unwrap();
            assert_eq!(*raster.get_pixel(4, 30), tint);
            assert_eq!(*raster.get_pixel(8, 30), tint);
            assert_ne!(*raster.get_pixel(12, 30), tint);
        }

        let status = ed.confirm_crop().unwrap().unwrap();
        let crop = status.state.transform.crop.unwrap();
        assert!((crop.x + 10.0).abs() < 1e-6 && (crop.width - 190.0).abs() < 1e-6, "{:?}", crop);

        let raster = ed.raster().unwrap();
        assert_eq!(raster.dimensions(), (190, 80));
        let committed = (0..raster.width()).take_while(|&x| *raster.get_pixel(x, 40) == Rgba([0, 0, 255, 255])).count();
        assert_eq!(committed as f64, strip.round(), "zoomed: {}", zoomed);
    }
}
