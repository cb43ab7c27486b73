//! Boundary with an external editing assistant.
//!
//! The assistant receives the user's command and the current raster and
//! replies with filter values. The engine never interprets the command text;
//! it only reads the reply, which is parsed leniently because assistants tend
//! to wrap JSON in prose or code fences, stringify numbers and invent key
//! spellings.

use image::RgbaImage;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::edit::{EditPatch, FilterPatch};
use crate::error::SuggestionError;

/// A structured reply: the scalar filter subset of an edit, plus whatever
/// explanation came with it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EditSuggestion {
    pub filters: FilterPatch,
    pub explanation: Option<String>,
}

impl EditSuggestion {
    /// The single patch to commit for this suggestion.
    pub fn to_patch(&self) -> Result<EditPatch, SuggestionError> {
        if self.filters.is_empty() {
            return Err(SuggestionError::Empty);
        }
        Ok(EditPatch::Filter(self.filters))
    }
}

pub trait Assistant {
    fn suggest(&self, command: &str, raster: &RgbaImage) -> Result<EditSuggestion, String>;
}

/// Ask `assistant` and turn its answer into a patch. Errors never carry a
/// partial edit.
pub fn request_patch(assistant: &dyn Assistant, command: &str, raster: &RgbaImage) -> Result<EditPatch, SuggestionError> {
    let suggestion = assistant.suggest(command, raster).map_err(|e| {
        warn!(error = %e, "assistant request failed");
        SuggestionError::Assistant(e)
    })?;
    suggestion.to_patch()
}

/// Field names the reply may use for each filter, first one canonical.
const FIELD_ALIASES: &[(&str, &[&str])] = &[
    ("blur", &["blur"]),
    ("grayscale", &["grayscale", "greyscale", "gray", "grey"]),
    ("brightness", &["brightness", "bright"]),
    ("contrast", &["contrast"]),
    ("saturation", &["saturation", "saturate"]),
    ("hue", &["hue", "hue_rotate", "huerotate"]),
    ("temperature", &["temperature", "temp", "warmth"]),
    ("shadows", &["shadows", "shadow"]),
    ("highlights", &["highlights", "highlight"]),
    ("vignette", &["vignette"]),
    ("sharpen", &["sharpen", "sharpness"]),
];

fn canonical_field(key: &str) -> Option<&'static str> {
    let key = key
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect::<String>()
        .to_ascii_lowercase();
    let squashed = key.replace('_', "");
    FIELD_ALIASES
        .iter()
        .find(|(_, aliases)| aliases.iter().any(|a| *a == key || a.replace('_', "") == squashed))
        .map(|(name, _)| *name)
}

fn as_number(v: &Value) -> Option<f32> {
    let n = match v {
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f32>().ok(),
        _ => None,
    };
    n.filter(|f| f.is_finite())
}

fn as_bool(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Some(true),
            "false" | "no" | "off" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// The first balanced `{...}` in `text`, skipping braces inside strings.
fn extract_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn read_filters(obj: &Map<String, Value>, patch: &mut FilterPatch) {
    for (key, value) in obj {
        let Some(field) = canonical_field(key) else {
            // Nested containers like {"filters": {...}} or {"adjustments": {...}}
            if let Value::Object(inner) = value {
                read_filters(inner, patch);
            } else {
                debug!(key = %key, "ignoring unknown suggestion key");
            }
            continue;
        };
        if field == "grayscale" {
            patch.grayscale = as_bool(value).or(patch.grayscale);
            continue;
        }
        let Some(n) = as_number(value) else {
            debug!(key = %key, "suggestion value is not a number");
            continue;
        };
        let slot = match field {
            "blur" => &mut patch.blur,
            "brightness" => &mut patch.brightness,
            "contrast" => &mut patch.contrast,
            "saturation" => &mut patch.saturation,
            "hue" => &mut patch.hue,
            "temperature" => &mut patch.temperature,
            "shadows" => &mut patch.shadows,
            "highlights" => &mut patch.highlights,
            "vignette" => &mut patch.vignette,
            _ => &mut patch.sharpen,
        };
        *slot = Some(n);
    }
}

/// Parse an assistant reply. Accepts bare JSON, JSON embedded in prose or a
/// code fence, filters at the top level or nested one object deep, and an
/// optional `explanation`/`message` string.
pub fn parse_suggestion(reply: &str) -> Result<EditSuggestion, SuggestionError> {
    let json = extract_object(reply).ok_or_else(|| SuggestionError::Malformed("no JSON object in reply".to_string()))?;
    let value: Value = serde_json::from_str(json).map_err(|e| SuggestionError::Malformed(e.to_string()))?;
    let Value::Object(obj) = value else {
        return Err(SuggestionError::Malformed("reply is not an object".to_string()));
    };

    let mut filters = FilterPatch::default();
    read_filters(&obj, &mut filters);
    let explanation = ["explanation", "message", "description"]
        .iter()
        .find_map(|k| obj.get(*k).and_then(Value::as_str))
        .map(str::to_string);

    if filters.is_empty() {
        return Err(SuggestionError::Empty);
    }
    Ok(EditSuggestion { filters, explanation })
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Canned(Result<&'static str, &'static str>);

    impl Assistant for Canned {
        fn suggest(&self, _command: &str, _raster: &RgbaImage) -> Result<EditSuggestion, String> {
            match self.0 {
                Ok(reply) => parse_suggestion(reply).map_err(|e| e.to_string()),
                Err(e) => Err(e.to_string()),
            }
        }
    }

    #[test]
    fn test_plain_json() {
        let s = parse_suggestion(r#"{"brightness": 120, "contrast": 110, "grayscale": false}"#).unwrap();
        assert_eq!(s.filters.brightness, Some(120.0));
        assert_eq!(s.filters.contrast, Some(110.0));
        assert_eq!(s.filters.grayscale, Some(false));
        assert_eq!(s.filters.blur, None);
    }

    #[test]
    fn test_lenient_reply() {
        let reply = "Sure! Here you go:\n```json\n{\"filters\": {\"Saturate\": \"130%\", \"hueRotate\": -20, \"greyscale\": \"yes\"}, \"explanation\": \"warmer {look}\"}\n```";
        let s = parse_suggestion(reply).unwrap();
        assert_eq!(s.filters.saturation, Some(130.0));
        assert_eq!(s.filters.hue, Some(-20.0));
        assert_eq!(s.filters.grayscale, Some(true));
        assert_eq!(s.explanation.as_deref(), Some("warmer {look}"));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(parse_suggestion("no idea"), Err(SuggestionError::Malformed(_))));
        assert_eq!(parse_suggestion(r#"{"mood": "happy"}"#), Err(SuggestionError::Empty));
    }

    #[test]
    fn test_request_patch() {
        let img = RgbaImage::new(1, 1);
        let patch = request_patch(&Canned(Ok(r#"{"vignette": 40}"#)), "moody", &img).unwrap();
        assert_eq!(patch, EditPatch::Filter(FilterPatch { vignette: Some(40.0), ..Default::default() }));
        let err = request_patch(&Canned(Err("rate limited")), "moody", &img).unwrap_err();
        assert_eq!(err, SuggestionError::Assistant("rate limited".to_string()));
    }
}
