// ============================================================================
// CROP OVERLAY: interactive crop chrome drawn over the preview
// ============================================================================

use image::RgbaImage;

use crate::canvas::{dashed_rect, fill_rect, stroke_rect};
use crate::config::CropChromeStyle;
use crate::edit::{BlendMode, Color, TextAlign, TextOverlay};
use crate::geometry::{CropHandle, Point, Rect};
use crate::ops::text::FontBook;
use crate::ops::transform::draw_placed;

/// Everything the chrome needs, in canvas pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct CropChrome {
    pub crop: Rect,
    /// Where the (unrotated) source image is displayed.
    pub image_bounds: Rect,
    pub crop_background: Color,
    /// Ratio label, e.g. "16:9"; `locked` draws it with a lock marker.
    pub badge: Option<RatioBadge>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RatioBadge {
    pub label: String,
    pub locked: bool,
}

const BADGE_PAD: f64 = 6.0;
const BADGE_MARGIN: f64 = 8.0;

/// Draw the crop chrome over `img`.
pub fn draw_crop_chrome(img: &mut RgbaImage, chrome: &CropChrome, style: &CropChromeStyle, fonts: &mut FontBook) {
    let canvas = Rect::new(0.0, 0.0, img.width() as f64, img.height() as f64);
    let crop = chrome.crop.normalized();

    // (0) Shade everything outside the crop.
    for strip in canvas.subtract(&crop) {
        fill_rect(img, &strip, style.shade);
    }

    // (a) Crop parts lying outside the displayed image get the background tint.
    let tint = chrome.crop_background.with_alpha(style.extended_fill_alpha);
    for strip in crop.subtract(&chrome.image_bounds) {
        fill_rect(img, &strip, tint);
    }

    // (b) True image bounds.
    dashed_rect(img, &chrome.image_bounds, style.bounds_marker, style.dash, style.gap);

    // (c) Border and handles.
    stroke_rect(img, &crop, style.border, style.border_width);
    for handle in CropHandle::CORNERS.iter().chain(CropHandle::EDGES.iter()) {
        if let Some(p) = handle.anchor_on(&crop) {
            let half = style.handle_px * 0.5;
            let square = Rect::new(p.x - half, p.y - half, style.handle_px, style.handle_px);
            fill_rect(img, &square, style.handle_fill);
            stroke_rect(img, &square, style.handle_outline, 1.0);
        }
    }

    // (d) Ratio badge.
    if let Some(badge) = &chrome.badge {
        draw_badge(img, &crop, badge, style, fonts);
    }
}

fn draw_badge(img: &mut RgbaImage, crop: &Rect, badge: &RatioBadge, style: &CropChromeStyle, fonts: &mut FontBook) {
    let label = if badge.locked { format!("\u{1F512} {}", badge.label) } else { badge.label.clone() };
    let overlay = TextOverlay {
        id: uuid::Uuid::nil(),
        text: label,
        x: 0.0,
        y: 0.0,
        rotation: 0.0,
        opacity: 100.0,
        font_family: String::new(),
        font_size: style.badge_font_size,
        font_weight: 600,
        italic: false,
        color: style.badge_text,
        align: TextAlign::Left,
    };
    let text = fonts.rasterize(&overlay, 1.0, Point::default());

    let (tw, th) = text
        .as_ref()
        .map_or((style.badge_font_size as f64 * 2.5, style.badge_font_size as f64), |t| {
            (t.image.width() as f64, t.image.height() as f64)
        });
    let bw = tw + BADGE_PAD * 2.0;
    let bh = th + BADGE_PAD * 2.0;
    let bx = crop.x + BADGE_MARGIN;
    let by = crop.y + BADGE_MARGIN;
    fill_rect(img, &Rect::new(bx, by, bw, bh), style.badge_background);

    if let Some(mut t) = text {
        t.placement.center.x = (bx + BADGE_PAD + tw * 0.5).round();
        t.placement.center.y = (by + BADGE_PAD + th * 0.5).round();
        // Whole-pixel centre for odd sizes
        if t.image.width() % 2 == 1 {
            t.placement.center.x += 0.5;
        }
        if t.image.height() % 2 == 1 {
            t.placement.center.y += 0.5;
        }
        draw_placed(img, &t.image, &t.placement, BlendMode::Normal, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn chrome(crop: Rect, bounds: Rect) -> CropChrome {
        CropChrome { crop, image_bounds: bounds, crop_background: Color::rgb(255, 0, 0), badge: None }
    }

    #[test]
    fn test_shade_outside_crop_only() {
        let mut img = RgbaImage::from_pixel(100, 100, Rgba([200, 200, 200, 255]));
        let style = CropChromeStyle::default();
        let mut fonts = FontBook::new("sans-serif", false);
        draw_crop_chrome(&mut img, &chrome(Rect::new(20.0, 20.0, 60.0, 60.0), Rect::new(0.0, 0.0, 100.0, 100.0)), &style, &mut fonts);
        assert!(img.get_pixel(5, 50)[0] < 150);
        assert_eq!(*img.get_pixel(50, 50), Rgba([200, 200, 200, 255]));
    }

    #[test]
    fn test_extended_region_tinted() {
        let mut img = RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 255]));
        let style = CropChromeStyle::default();
        let mut fonts = FontBook::new("sans-serif", false);
        // Crop hangs 20 px off the left of the displayed image.
        draw_crop_chrome(&mut img, &chrome(Rect::new(0.0, 0.0, 100.0, 100.0), Rect::new(20.0, 0.0, 80.0, 100.0)), &style, &mut fonts);
        assert!(img.get_pixel(10, 50)[0] > 0);
        assert_eq!(img.get_pixel(10, 50)[1], 0);
        assert_eq!(*img.get_pixel(60, 50), Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn test_handles_drawn_at_corners() {
        let mut img = RgbaImage::from_pixel(100, 100, Rgba([0, 0, 0, 255]));
        let style = CropChromeStyle::default();
        let mut fonts = FontBook::new("sans-serif", false);
        draw_crop_chrome(&mut img, &chrome(Rect::new(20.0, 20.0, 60.0, 60.0), Rect::new(0.0, 0.0, 100.0, 100.0)), &style, &mut fonts);
        // Inside the bottom-right handle square, off the border line.
        assert_eq!(*img.get_pixel(82, 82), Rgba([255, 255, 255, 255]));
        // Middle of the top edge handle.
        assert_eq!(*img.get_pixel(50, 22), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_badge_background_without_fonts() {
        let mut img = RgbaImage::from_pixel(200, 200, Rgba([255, 255, 255, 255]));
        let style = CropChromeStyle::default();
        let mut fonts = FontBook::new("sans-serif", false);
        let mut c = chrome(Rect::new(0.0, 0.0, 200.0, 200.0), Rect::new(0.0, 0.0, 200.0, 200.0));
        c.badge = Some(RatioBadge { label: "16:9".into(), locked: false });
        draw_crop_chrome(&mut img, &c, &style, &mut fonts);
        assert!(img.get_pixel(20, 16)[0] < 200);
    }
}
