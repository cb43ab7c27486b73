//! Engine configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! overrides. Percent values are in crop-overlay percentage space.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::edit::Color;
use crate::error::ConfigError;
use crate::geometry::{DEFAULT_RATIO_TOLERANCE, HitTolerance, Rect};
use crate::ops::transform::Interpolation;

/// Colours and sizes of the interactive crop overlay.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CropChromeStyle {
    /// Shade over the canvas outside the crop rectangle.
    pub shade: Color,
    /// Alpha applied to the crop background colour where the crop extends
    /// past the displayed image.
    pub extended_fill_alpha: u8,
    pub border: Color,
    pub border_width: f64,
    pub bounds_marker: Color,
    pub dash: u32,
    pub gap: u32,
    /// Handle square side, canvas pixels.
    pub handle_px: f64,
    pub handle_fill: Color,
    pub handle_outline: Color,
    pub badge_background: Color,
    pub badge_text: Color,
    pub badge_font_size: f32,
}

impl Default for CropChromeStyle {
    fn default() -> Self {
        Self {
            shade: Color::rgba(0, 0, 0, 128),
            extended_fill_alpha: 102,
            border: Color::WHITE,
            border_width: 2.0,
            bounds_marker: Color::rgba(255, 255, 255, 200),
            dash: 6,
            gap: 4,
            handle_px: 10.0,
            handle_fill: Color::WHITE,
            handle_outline: Color::rgba(0, 0, 0, 160),
            badge_background: Color::rgba(0, 0, 0, 180),
            badge_text: Color::WHITE,
            badge_font_size: 12.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Crop handle hit-test sizes (percent).
    pub hit_tolerance: HitTolerance,
    /// Relative tolerance for preset ratio detection.
    pub ratio_tolerance: f64,
    /// Crop area offered when entering crop mode without a committed crop.
    pub default_crop: Rect,
    pub min_scale: f64,
    pub max_scale: f64,
    /// Multiplicative step for keyboard/wheel zoom.
    pub zoom_step: f64,
    /// Hit radius for free-transform corner handles (canvas pixels).
    pub transform_handle_px: f64,
    pub max_history: usize,
    pub interpolation: Interpolation,
    /// Canvas colour behind the image when nothing else covers it.
    pub workspace: Color,
    pub crop_chrome: CropChromeStyle,
    pub default_font_family: String,
    /// Query the OS font database for text overlays.
    pub system_fonts: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hit_tolerance: HitTolerance::default(),
            ratio_tolerance: DEFAULT_RATIO_TOLERANCE,
            default_crop: Rect::new(10.0, 10.0, 80.0, 80.0),
            min_scale: 0.1,
            max_scale: 5.0,
            zoom_step: 0.1,
            transform_handle_px: 12.0,
            max_history: 100,
            interpolation: Interpolation::Bilinear,
            workspace: Color::TRANSPARENT,
            crop_chrome: CropChromeStyle::default(),
            default_font_family: "sans-serif".to_string(),
            system_fonts: true,
        }
    }
}

impl EngineConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str::<EngineConfig>(json)?.sanitized())
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Repair values that would break the interaction math.
    pub fn sanitized(mut self) -> Self {
        let defaults = EngineConfig::default();
        if !(self.min_scale > 0.0) {
            self.min_scale = defaults.min_scale;
        }
        if !(self.max_scale >= self.min_scale) {
            self.max_scale = self.min_scale.max(defaults.max_scale);
        }
        if !(self.zoom_step > 0.0 && self.zoom_step < 1.0) {
            self.zoom_step = defaults.zoom_step;
        }
        if !(self.ratio_tolerance >= 0.0) {
            self.ratio_tolerance = defaults.ratio_tolerance;
        }
        self.max_history = self.max_history.max(1);
        self.default_crop = self.default_crop.normalized();
        if self.default_crop.is_empty() {
            self.default_crop = defaults.default_crop;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg = EngineConfig::from_json(r##"{"max_history": 5, "workspace": "#202020"}"##).unwrap();
        assert_eq!(cfg.max_history, 5);
        assert_eq!(cfg.workspace, Color::rgb(0x20, 0x20, 0x20));
        assert_eq!(cfg.default_crop, Rect::new(10.0, 10.0, 80.0, 80.0));
        assert_eq!(cfg.interpolation, Interpolation::Bilinear);
    }

    #[test]
    fn test_sanitize_repairs_scale_bounds() {
        let cfg = EngineConfig::from_json(r#"{"min_scale": 0, "max_scale": -1, "max_history": 0}"#).unwrap();
        assert_eq!(cfg.min_scale, 0.1);
        assert_eq!(cfg.max_scale, 5.0);
        assert_eq!(cfg.max_history, 1);
    }

    #[test]
    fn test_bad_json_is_parse_error() {
        assert!(matches!(EngineConfig::from_json("{"), Err(ConfigError::Parse(_))));
    }
}
