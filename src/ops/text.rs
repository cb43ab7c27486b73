use ab_glyph::{Font, FontArc, GlyphId, ScaleFont, point};
use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use tracing::{debug, warn};

use crate::edit::{TextAlign, TextOverlay};
use crate::geometry::Point;
use crate::ops::transform::Placement;

/// Rasterized glyph coverage at origin (0,0): pixels plus the px-bounds
/// min corner. Key: (font slot, glyph, font size bits).
pub type GlyphPixelCache = HashMap<(usize, GlyphId, u32), (Vec<(u32, u32, f32)>, f32, f32)>;

/// Generic CSS family names and the font-kit families they map to.
fn generic_family(name: &str) -> Option<font_kit::family_name::FamilyName> {
    use font_kit::family_name::FamilyName;
    match name.to_ascii_lowercase().as_str() {
        "sans-serif" | "sans" | "system-ui" => Some(FamilyName::SansSerif),
        "serif" => Some(FamilyName::Serif),
        "monospace" | "mono" => Some(FamilyName::Monospace),
        "cursive" => Some(FamilyName::Cursive),
        "fantasy" => Some(FamilyName::Fantasy),
        _ => None,
    }
}

/// Load a font by family name, weight, and style from the system.
/// `weight` is a CSS-style weight value (100=Thin, 400=Regular, 700=Bold, etc.)
/// Returns None if the font cannot be found.
pub fn load_system_font(family: &str, weight: u16, italic: bool) -> Option<FontArc> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::{Properties, Style, Weight};
    use font_kit::source::SystemSource;

    let mut props = Properties::new();
    props.weight = Weight(weight as f32);
    if italic {
        props.style = Style::Italic;
    }

    let name = generic_family(family).unwrap_or_else(|| FamilyName::Title(family.to_string()));
    let source = SystemSource::new();
    let handle = source.select_best_match(&[name], &props).ok()?;

    let font_data = handle.load().ok()?;
    let font_data_copy = font_data.copy_font_data()?;
    let bytes: Vec<u8> = (*font_data_copy).clone();
    FontArc::try_from_vec(bytes).ok()
}

/// A font chosen for one overlay. `slot` identifies it in the glyph cache.
#[derive(Clone)]
pub struct ResolvedFont {
    pub slot: usize,
    pub font: FontArc,
}

/// Font registry: explicitly registered faces first, then (optionally) the
/// system font database, then the default family.
pub struct FontBook {
    fonts: Vec<FontArc>,
    registered: HashMap<String, usize>,
    system: HashMap<(String, u16, bool), Option<usize>>,
    use_system_fonts: bool,
    default_family: String,
    glyph_cache: GlyphPixelCache,
}

impl FontBook {
    pub fn new(default_family: impl Into<String>, use_system_fonts: bool) -> Self {
        Self {
            fonts: Vec::new(),
            registered: HashMap::new(),
            system: HashMap::new(),
            use_system_fonts,
            default_family: default_family.into(),
            glyph_cache: HashMap::new(),
        }
    }

    /// Register raw TTF/OTF bytes under `family` (case-insensitive).
    pub fn register(&mut self, family: &str, bytes: Vec<u8>) -> Result<(), ab_glyph::InvalidFont> {
        let font = FontArc::try_from_vec(bytes)?;
        let slot = self.fonts.len();
        self.fonts.push(font);
        self.registered.insert(family.to_ascii_lowercase(), slot);
        debug!(family, slot, "registered font");
        Ok(())
    }

    pub fn has_fonts(&self) -> bool {
        !self.fonts.is_empty() || self.use_system_fonts
    }

    fn lookup(&mut self, family: &str, weight: u16, italic: bool) -> Option<usize> {
        if let Some(&slot) = self.registered.get(&family.to_ascii_lowercase()) {
            return Some(slot);
        }
        if !self.use_system_fonts {
            return None;
        }
        let key = (family.to_string(), weight, italic);
        if let Some(hit) = self.system.get(&key) {
            return *hit;
        }
        let slot = load_system_font(family, weight, italic).map(|font| {
            self.fonts.push(font);
            self.fonts.len() - 1
        });
        if slot.is_none() {
            debug!(family, weight, italic, "no system font match");
        }
        self.system.insert(key, slot);
        slot
    }

    /// Resolve a family, falling back to the default family and then to any
    /// registered face.
    pub fn resolve(&mut self, family: &str, weight: u16, italic: bool) -> Option<ResolvedFont> {
        let default_family = self.default_family.clone();
        let slot = self
            .lookup(family, weight, italic)
            .or_else(|| self.lookup(&default_family, weight, italic))
            .or_else(|| self.registered.values().min().copied())?;
        Some(ResolvedFont { slot, font: self.fonts[slot].clone() })
    }

    /// Rasterize a text overlay mapped to the canvas by `p * scale + offset`.
    /// Returns `None` for empty text or when no font resolves.
    pub fn rasterize(&mut self, overlay: &TextOverlay, scale: f32, offset: Point) -> Option<TextRaster> {
        if overlay.text.trim().is_empty() {
            return None;
        }
        let Some(font) = self.resolve(&overlay.font_family, overlay.font_weight, overlay.italic) else {
            warn!(family = %overlay.font_family, id = %overlay.id, "no font available, skipping text layer");
            return None;
        };
        rasterize_text(&font, overlay, scale, offset, &mut self.glyph_cache)
    }
}

/// Lay out a single line of text, returning glyphs positioned with the line
/// starting at x = 0 and the baseline at y = `ascent`, plus the line width.
pub fn layout_line(font: &FontArc, text: &str, font_size: f32) -> (Vec<(GlyphId, f32, f32)>, f32) {
    let scaled = font.as_scaled(font_size);
    let ascent = scaled.ascent();

    let mut glyphs = Vec::new();
    let mut cursor_x = 0.0f32;
    let mut last_glyph: Option<GlyphId> = None;
    for ch in text.chars() {
        let glyph_id = font.glyph_id(ch);
        if let Some(prev) = last_glyph {
            cursor_x += scaled.kern(prev, glyph_id);
        }
        glyphs.push((glyph_id, cursor_x, ascent));
        cursor_x += scaled.h_advance(glyph_id);
        last_glyph = Some(glyph_id);
    }
    (glyphs, cursor_x)
}

fn align_offset(alignment: TextAlign, width: f32) -> f32 {
    match alignment {
        TextAlign::Left => 0.0,
        TextAlign::Center => -width * 0.5,
        TextAlign::Right => -width,
    }
}

/// Unrotated text pixels plus where to place them on the canvas.
pub struct TextRaster {
    pub image: RgbaImage,
    pub placement: Placement,
}

/// Rasterize text with its top edge at the overlay anchor ("top" baseline)
/// and rotation about that anchor. Supports multiline text via '\n'.
pub fn rasterize_text(
    font: &ResolvedFont,
    overlay: &TextOverlay,
    scale: f32,
    offset: Point,
    glyph_cache: &mut GlyphPixelCache,
) -> Option<TextRaster> {
    let font_size = overlay.font_size * scale;
    if !(font_size > 0.5) {
        return None;
    }
    let scaled = font.font.as_scaled(font_size);
    let line_height = scaled.height() + scaled.line_gap();

    let mut all_glyphs: Vec<(GlyphId, f32, f32)> = Vec::new();
    for (line_idx, line) in overlay.text.split('\n').enumerate() {
        let (glyphs, width) = layout_line(&font.font, line, font_size);
        let dx = align_offset(overlay.align, width);
        let dy = line_idx as f32 * line_height;
        all_glyphs.extend(glyphs.into_iter().map(|(g, x, y)| (g, x + dx, y + dy)));
    }

    // Populate the cache and find the local bounding box.
    let size_key = font_size.to_bits();
    let mut min_x = f32::MAX;
    let mut min_y = f32::MAX;
    let mut max_x = f32::MIN;
    let mut max_y = f32::MIN;
    for &(glyph_id, gx, gy) in &all_glyphs {
        let entry = glyph_cache.entry((font.slot, glyph_id, size_key)).or_insert_with(|| {
            let base_glyph = glyph_id.with_scale_and_position(font_size, point(0.0, 0.0));
            let mut px_list = Vec::new();
            let (bx, by) = match font.font.outline_glyph(base_glyph) {
                Some(outlined) => {
                    let b = outlined.px_bounds();
                    outlined.draw(|px, py, cov| px_list.push((px, py, cov)));
                    (b.min.x, b.min.y)
                }
                None => (0.0, 0.0),
            };
            (px_list, bx, by)
        });
        let (pixels, bx, by) = (&entry.0, entry.1, entry.2);
        for &(px, py, _) in pixels {
            let x = px as f32 + bx + gx.round();
            let y = py as f32 + by + gy.round();
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x + 1.0);
            max_y = max_y.max(y + 1.0);
        }
    }
    if min_x >= max_x || min_y >= max_y {
        return None;
    }

    let x0 = min_x.floor();
    let y0 = min_y.floor();
    let buf_w = (max_x.ceil() - x0) as u32;
    let buf_h = (max_y.ceil() - y0) as u32;
    let mut coverage = vec![0.0f32; buf_w as usize * buf_h as usize];

    for &(glyph_id, gx, gy) in &all_glyphs {
        let Some((pixels, bx, by)) = glyph_cache.get(&(font.slot, glyph_id, size_key)) else {
            continue;
        };
        for &(px, py, cov) in pixels {
            let ix = (px as f32 + bx + gx.round() - x0) as i64;
            let iy = (py as f32 + by + gy.round() - y0) as i64;
            if ix >= 0 && iy >= 0 && (ix as u32) < buf_w && (iy as u32) < buf_h {
                let idx = iy as usize * buf_w as usize + ix as usize;
                coverage[idx] = coverage[idx].max(cov);
            }
        }
    }

    let color = overlay.color;
    let mut image = RgbaImage::new(buf_w, buf_h);
    for (px, cov) in image.pixels_mut().zip(coverage.iter()) {
        if *cov > 0.001 {
            let a = (color.a as f32 * cov.min(1.0)).round() as u8;
            *px = Rgba([color.r, color.g, color.b, a]);
        }
    }

    // Box centre relative to the anchor, rotated about the anchor.
    let anchor = Point::new(overlay.x * scale as f64 + offset.x, overlay.y * scale as f64 + offset.y);
    let local_cx = x0 as f64 + buf_w as f64 * 0.5;
    let local_cy = y0 as f64 + buf_h as f64 * 0.5;
    let (s, c) = overlay.rotation.to_radians().sin_cos();
    let center = Point::new(
        anchor.x + c * local_cx - s * local_cy,
        anchor.y + s * local_cx + c * local_cy,
    );

    Some(TextRaster {
        image,
        placement: Placement {
            center,
            width: buf_w as f64,
            height: buf_h as f64,
            rotation: overlay.rotation,
            flip_horizontal: false,
            flip_vertical: false,
        },
    })
}
