// ============================================================================
// EDIT STATE: the non-destructive edit description
// ============================================================================
//
// `EditState` is a plain value. It is never mutated in place: every change is
// an `EditPatch` applied with `EditState::apply`, which returns a fresh copy
// that the history then stores behind an `Arc`.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::EditError;
use crate::geometry::{Rect, Size};

/// Largest crop, resize or frame extent (and crop offset) accepted, in pixels.
pub const MAX_EXTENT: f64 = 16384.0;

fn check_extent(field: &'static str, width: f64, height: f64) -> Result<(), EditError> {
    if width.is_finite() && height.is_finite() && width <= MAX_EXTENT && height <= MAX_EXTENT {
        return Ok(());
    }
    Err(EditError::InvalidValue { field, reason: format!("{}x{} exceeds {} px or is not finite", width, height, MAX_EXTENT) })
}

// ---------------------------------------------------------------------------
// Colour
// ---------------------------------------------------------------------------

/// Straight-alpha RGBA8 colour, written as CSS-style hex in JSON.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const TRANSPARENT: Color = Color::rgba(0, 0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn rgba(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn to_rgba(self) -> image::Rgba<u8> {
        image::Rgba([self.r, self.g, self.b, self.a])
    }

    pub fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa` (leading `#` optional).
    pub fn parse_hex(s: &str) -> Option<Color> {
        let hex = s.trim().trim_start_matches('#');
        let nibble = |i: usize| u8::from_str_radix(hex.get(i..i + 1)?, 16).ok();
        let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        match hex.len() {
            3 => Some(Color::rgb(nibble(0)? * 17, nibble(1)? * 17, nibble(2)? * 17)),
            6 => Some(Color::rgb(byte(0)?, byte(2)?, byte(4)?)),
            8 => Some(Color::rgba(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => None,
        }
    }

    pub fn to_hex(self) -> String {
        if self.a == 255 {
            format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
        } else {
            format!("#{:02x}{:02x}{:02x}{:02x}", self.r, self.g, self.b, self.a)
        }
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Color::parse_hex(&value).ok_or_else(|| format!("invalid colour '{}'", value))
    }
}

impl From<Color> for String {
    fn from(c: Color) -> String {
        c.to_hex()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Scalar pixel filters. Every field at its default is the identity.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filters {
    /// Gaussian blur radius in output pixels.
    pub blur: f32,
    pub grayscale: bool,
    /// Percent, 100 = unchanged.
    pub brightness: f32,
    pub contrast: f32,
    pub saturation: f32,
    /// Degrees.
    pub hue: f32,
    pub temperature: f32,
    pub shadows: f32,
    pub highlights: f32,
    pub vignette: f32,
    pub sharpen: f32,
}

impl Default for Filters {
    fn default() -> Self {
        Self {
            blur: 0.0,
            grayscale: false,
            brightness: 100.0,
            contrast: 100.0,
            saturation: 100.0,
            hue: 0.0,
            temperature: 0.0,
            shadows: 0.0,
            highlights: 0.0,
            vignette: 0.0,
            sharpen: 0.0,
        }
    }
}

impl Filters {
    pub fn is_identity(&self) -> bool {
        *self == Filters::default()
    }
}

/// Partial filter update: only `Some` fields change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blur: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grayscale: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contrast: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saturation: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hue: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shadows: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlights: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vignette: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sharpen: Option<f32>,
}

fn checked(field: &'static str, v: f32, min: f32, max: f32) -> Result<f32, EditError> {
    if !v.is_finite() {
        return Err(EditError::InvalidValue { field, reason: format!("{} is not finite", v) });
    }
    Ok(v.clamp(min, max))
}

impl FilterPatch {
    pub fn is_empty(&self) -> bool {
        *self == FilterPatch::default()
    }

    fn apply_to(&self, f: &Filters) -> Result<Filters, EditError> {
        let mut out = *f;
        if let Some(v) = self.blur {
            out.blur = checked("blur", v, 0.0, 100.0)?;
        }
        if let Some(v) = self.grayscale {
            out.grayscale = v;
        }
        if let Some(v) = self.brightness {
            out.brightness = checked("brightness", v, 0.0, 200.0)?;
        }
        if let Some(v) = self.contrast {
            out.contrast = checked("contrast", v, 0.0, 200.0)?;
        }
        if let Some(v) = self.saturation {
            out.saturation = checked("saturation", v, 0.0, 200.0)?;
        }
        if let Some(v) = self.hue {
            out.hue = checked("hue", v, -180.0, 180.0)?;
        }
        if let Some(v) = self.temperature {
            out.temperature = checked("temperature", v, -100.0, 100.0)?;
        }
        if let Some(v) = self.shadows {
            out.shadows = checked("shadows", v, -100.0, 100.0)?;
        }
        if let Some(v) = self.highlights {
            out.highlights = checked("highlights", v, -100.0, 100.0)?;
        }
        if let Some(v) = self.vignette {
            out.vignette = checked("vignette", v, 0.0, 100.0)?;
        }
        if let Some(v) = self.sharpen {
            out.sharpen = checked("sharpen", v, 0.0, 100.0)?;
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Geometric transform
// ---------------------------------------------------------------------------

/// Letterbox canvas the output is fitted into.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    #[serde(default = "default_frame_background")]
    pub background: Color,
}

fn default_frame_background() -> Color {
    Color::WHITE
}

fn default_crop_background() -> Color {
    Color::WHITE
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transform {
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
    /// Degrees, unnormalised.
    pub rotation: f64,
    /// Source-pixel rectangle; may extend past the image.
    pub crop: Option<Rect>,
    pub crop_background: Color,
    pub frame: Option<Frame>,
    /// Output pixel size.
    pub resize: Option<Size>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            flip_horizontal: false,
            flip_vertical: false,
            rotation: 0.0,
            crop: None,
            crop_background: default_crop_background(),
            frame: None,
            resize: None,
        }
    }
}

impl Transform {
    /// Rotation folded into `[0, 360)`.
    pub fn normalized_rotation(&self) -> f64 {
        self.rotation.rem_euclid(360.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformPatch {
    SetRotation(f64),
    RotateBy(f64),
    FlipHorizontal,
    FlipVertical,
    SetFrame(Option<Frame>),
    SetResize(Option<Size>),
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropPatch {
    Set(Option<Rect>),
    Background(Color),
}

// ---------------------------------------------------------------------------
// Layers
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
}

impl BlendMode {
    pub fn all() -> &'static [BlendMode] {
        &[
            BlendMode::Normal,
            BlendMode::Multiply,
            BlendMode::Screen,
            BlendMode::Overlay,
            BlendMode::Darken,
            BlendMode::Lighten,
            BlendMode::ColorDodge,
            BlendMode::ColorBurn,
            BlendMode::HardLight,
            BlendMode::SoftLight,
            BlendMode::Difference,
            BlendMode::Exclusion,
        ]
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextAlign {
    #[default]
    Left,
    Center,
    Right,
}

fn default_opacity() -> f32 {
    100.0
}

fn default_font_family() -> String {
    "sans-serif".to_string()
}

fn default_font_size() -> f32 {
    32.0
}

fn default_font_weight() -> u16 {
    400
}

fn default_stroke_width() -> f32 {
    2.0
}

/// Text drawn with its top edge at `(x, y)`; `align` picks which side of the
/// anchor the line extends from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextOverlay {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub text: String,
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(default = "default_font_family")]
    pub font_family: String,
    #[serde(default = "default_font_size")]
    pub font_size: f32,
    #[serde(default = "default_font_weight")]
    pub font_weight: u16,
    #[serde(default)]
    pub italic: bool,
    #[serde(default = "default_text_color")]
    pub color: Color,
    #[serde(default)]
    pub align: TextAlign,
}

fn default_text_color() -> Color {
    Color::BLACK
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    Rectangle,
    Circle,
    Line,
    Arrow,
}

/// Rectangles and circles occupy `(x, y, width, height)`; lines and arrows
/// run from `(x, y)` to `(x + width, y + height)`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShapeOverlay {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub kind: ShapeKind,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(default)]
    pub fill: Option<Color>,
    #[serde(default)]
    pub stroke: Option<Color>,
    #[serde(default = "default_stroke_width")]
    pub stroke_width: f32,
}

/// Picture layer. `src` is a `data:` URL or bare base64 of an encoded image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ImageOverlay {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,
    pub src: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default = "default_opacity")]
    pub opacity: f32,
    #[serde(default)]
    pub blend_mode: BlendMode,
    #[serde(default)]
    pub flip_horizontal: bool,
    #[serde(default)]
    pub flip_vertical: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Layer {
    Text(TextOverlay),
    Shape(ShapeOverlay),
    Image(ImageOverlay),
}

impl Layer {
    pub fn id(&self) -> Uuid {
        match self {
            Layer::Text(t) => t.id,
            Layer::Shape(s) => s.id,
            Layer::Image(i) => i.id,
        }
    }

    pub fn opacity(&self) -> f32 {
        match self {
            Layer::Text(t) => t.opacity,
            Layer::Shape(s) => s.opacity,
            Layer::Image(i) => i.opacity,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Layer::Text(_) => "text",
            Layer::Shape(_) => "shape",
            Layer::Image(_) => "image",
        }
    }

    fn validate(&self) -> Result<(), EditError> {
        let opacity = self.opacity();
        if !opacity.is_finite() || !(0.0..=100.0).contains(&opacity) {
            return Err(EditError::InvalidValue {
                field: "opacity",
                reason: format!("{} outside 0..=100", opacity),
            });
        }
        if let Layer::Text(t) = self
            && !(t.font_size.is_finite() && t.font_size > 0.0)
        {
            return Err(EditError::InvalidValue {
                field: "font_size",
                reason: format!("{} is not a positive size", t.font_size),
            });
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerPatch {
    Add(Layer),
    /// Replace the layer with the same id, keeping its z position.
    Update(Layer),
    Remove(Uuid),
    Reorder { id: Uuid, to_index: usize },
}

// ---------------------------------------------------------------------------
// Patches
// ---------------------------------------------------------------------------

/// One atomic change to an [`EditState`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditPatch {
    Filter(FilterPatch),
    Transform(TransformPatch),
    Crop(CropPatch),
    Layer(LayerPatch),
    /// Applied in order; if any element fails none of them take effect.
    Batch(Vec<EditPatch>),
    Reset,
}

impl EditPatch {
    /// Short human-readable label for history lists.
    pub fn label(&self) -> String {
        match self {
            EditPatch::Filter(f) => {
                let names: Vec<&str> = [
                    ("Blur", f.blur.is_some()),
                    ("Grayscale", f.grayscale.is_some()),
                    ("Brightness", f.brightness.is_some()),
                    ("Contrast", f.contrast.is_some()),
                    ("Saturation", f.saturation.is_some()),
                    ("Hue", f.hue.is_some()),
                    ("Temperature", f.temperature.is_some()),
                    ("Shadows", f.shadows.is_some()),
                    ("Highlights", f.highlights.is_some()),
                    ("Vignette", f.vignette.is_some()),
                    ("Sharpen", f.sharpen.is_some()),
                ]
                .into_iter()
                .filter_map(|(n, set)| set.then_some(n))
                .collect();
                match names.len() {
                    0 => "Adjust".to_string(),
                    1 | 2 => names.join(" / "),
                    _ => "Adjustments".to_string(),
                }
            }
            EditPatch::Transform(t) => match t {
                TransformPatch::SetRotation(_) | TransformPatch::RotateBy(_) => "Rotate".to_string(),
                TransformPatch::FlipHorizontal => "Flip Horizontal".to_string(),
                TransformPatch::FlipVertical => "Flip Vertical".to_string(),
                TransformPatch::SetFrame(_) => "Frame".to_string(),
                TransformPatch::SetResize(_) => "Resize".to_string(),
            },
            EditPatch::Crop(CropPatch::Set(_)) => "Crop".to_string(),
            EditPatch::Crop(CropPatch::Background(_)) => "Crop Background".to_string(),
            EditPatch::Layer(l) => match l {
                LayerPatch::Add(layer) => format!("Add {}", layer.kind_name()),
                LayerPatch::Update(layer) => format!("Edit {}", layer.kind_name()),
                LayerPatch::Remove(_) => "Remove layer".to_string(),
                LayerPatch::Reorder { .. } => "Reorder layers".to_string(),
            },
            EditPatch::Batch(items) => match items.as_slice() {
                [single] => single.label(),
                _ => "Edits".to_string(),
            },
            EditPatch::Reset => "Reset".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditState {
    pub filters: Filters,
    pub transform: Transform,
    pub layers: Vec<Layer>,
}

impl EditState {
    pub fn layer(&self, id: Uuid) -> Option<&Layer> {
        self.layers.iter().find(|l| l.id() == id)
    }

    fn layer_index(&self, id: Uuid) -> Result<usize, EditError> {
        self.layers
            .iter()
            .position(|l| l.id() == id)
            .ok_or(EditError::LayerNotFound(id))
    }

    /// Produce the state that results from `patch`. `self` is never touched,
    /// so a failed patch leaves the caller's state as it was.
    pub fn apply(&self, patch: &EditPatch) -> Result<EditState, EditError> {
        let mut next = self.clone();
        next.apply_in_place(patch)?;
        Ok(next)
    }

    fn apply_in_place(&mut self, patch: &EditPatch) -> Result<(), EditError> {
        match patch {
            EditPatch::Filter(f) => {
                self.filters = f.apply_to(&self.filters)?;
            }
            EditPatch::Transform(t) => self.apply_transform(t)?,
            EditPatch::Crop(CropPatch::Set(rect)) => {
                self.transform.crop = match rect {
                    Some(r) => {
                        let r = r.normalized();
                        let origin_ok = r.x.is_finite() && r.y.is_finite() && r.x.abs() <= MAX_EXTENT && r.y.abs() <= MAX_EXTENT;
                        if !(r.width > 0.0 && r.height > 0.0) || !origin_ok {
                            return Err(EditError::InvalidValue {
                                field: "crop",
                                reason: format!("degenerate rectangle {:?}", r),
                            });
                        }
                        check_extent("crop", r.width, r.height)?;
                        Some(r)
                    }
                    None => None,
                };
            }
            EditPatch::Crop(CropPatch::Background(c)) => {
                self.transform.crop_background = *c;
            }
            EditPatch::Layer(l) => self.apply_layer(l)?,
            EditPatch::Batch(items) => {
                for item in items {
                    self.apply_in_place(item)?;
                }
            }
            EditPatch::Reset => *self = EditState::default(),
        }
        Ok(())
    }

    fn apply_transform(&mut self, patch: &TransformPatch) -> Result<(), EditError> {
        let t = &mut self.transform;
        match *patch {
            TransformPatch::SetRotation(deg) | TransformPatch::RotateBy(deg) if !deg.is_finite() => {
                return Err(EditError::InvalidValue { field: "rotation", reason: format!("{} is not finite", deg) });
            }
            TransformPatch::SetRotation(deg) => t.rotation = deg,
            TransformPatch::RotateBy(deg) => t.rotation += deg,
            TransformPatch::FlipHorizontal => t.flip_horizontal = !t.flip_horizontal,
            TransformPatch::FlipVertical => t.flip_vertical = !t.flip_vertical,
            TransformPatch::SetFrame(frame) => {
                if let Some(f) = frame
                    && (f.width == 0 || f.height == 0)
                {
                    return Err(EditError::InvalidValue {
                        field: "frame",
                        reason: format!("{}x{} has no area", f.width, f.height),
                    });
                }
                if let Some(f) = frame {
                    check_extent("frame", f64::from(f.width), f64::from(f.height))?;
                }
                t.frame = frame;
            }
            TransformPatch::SetResize(size) => {
                if let Some(s) = size
                    && !(s.width >= 1.0 && s.height >= 1.0)
                {
                    return Err(EditError::InvalidValue {
                        field: "resize",
                        reason: format!("{}x{} is smaller than one pixel", s.width, s.height),
                    });
                }
                if let Some(s) = size {
                    check_extent("resize", s.width, s.height)?;
                }
                t.resize = size;
            }
        }
        Ok(())
    }

    fn apply_layer(&mut self, patch: &LayerPatch) -> Result<(), EditError> {
        match patch {
            LayerPatch::Add(layer) => {
                if self.layer(layer.id()).is_some() {
                    return Err(EditError::DuplicateLayer(layer.id()));
                }
                layer.validate()?;
                self.layers.push(layer.clone());
            }
            LayerPatch::Update(layer) => {
                let idx = self.layer_index(layer.id())?;
                layer.validate()?;
                self.layers[idx] = layer.clone();
            }
            LayerPatch::Remove(id) => {
                let idx = self.layer_index(*id)?;
                self.layers.remove(idx);
            }
            LayerPatch::Reorder { id, to_index } => {
                let idx = self.layer_index(*id)?;
                let layer = self.layers.remove(idx);
                let to = (*to_index).min(self.layers.len());
                self.layers.insert(to, layer);
            }
        }
        Ok(())
    }
}
