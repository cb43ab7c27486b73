//! Decoded image-overlay cache.
//!
//! Overlay layers carry their picture as a `data:` URL (or bare base64).
//! Decoding is expensive, so results are kept per layer id and reused until
//! the layer's source string changes. Failures are cached too, so a broken
//! overlay is reported once rather than on every render.

use base64::{Engine as _, engine::general_purpose};
use image::RgbaImage;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::edit::ImageOverlay;
use crate::error::SourceError;

struct CachedOverlay {
    content_hash: u64,
    image: Option<Arc<RgbaImage>>,
}

#[derive(Default)]
pub struct OverlayCache {
    entries: HashMap<Uuid, CachedOverlay>,
}

fn content_hash(src: &str) -> u64 {
    let mut h = DefaultHasher::new();
    src.hash(&mut h);
    h.finish()
}

/// Decode a `data:<mime>;base64,<payload>` URL or a bare base64 payload.
pub fn decode_data_url(src: &str) -> Result<RgbaImage, SourceError> {
    let payload = match src.strip_prefix("data:") {
        Some(rest) => {
            let (meta, data) = rest
                .split_once(',')
                .ok_or_else(|| SourceError::InvalidData("data URL without payload".to_string()))?;
            if !meta.ends_with(";base64") {
                return Err(SourceError::InvalidData(format!("unsupported data URL encoding '{}'", meta)));
            }
            data
        }
        None => src,
    };
    let bytes = general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| SourceError::InvalidData(e.to_string()))?;
    let img = image::load_from_memory(&bytes).map_err(|e| SourceError::Decode(e.to_string()))?;
    Ok(img.to_rgba8())
}

impl OverlayCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decoded pixels for `overlay`, or `None` if its source cannot be decoded.
    pub fn get(&mut self, overlay: &ImageOverlay) -> Option<Arc<RgbaImage>> {
        let hash = content_hash(&overlay.src);
        if let Some(entry) = self.entries.get(&overlay.id)
            && entry.content_hash == hash
        {
            return entry.image.clone();
        }

        let image = match decode_data_url(&overlay.src) {
            Ok(img) => {
                debug!(id = %overlay.id, w = img.width(), h = img.height(), "decoded overlay image");
                Some(Arc::new(img))
            }
            Err(e) => {
                warn!(id = %overlay.id, error = %e, "overlay image failed to decode, layer skipped");
                None
            }
        };
        self.entries.insert(overlay.id, CachedOverlay { content_hash: hash, image: image.clone() });
        image
    }

    /// Forget overlays whose layers no longer exist.
    pub fn retain_ids(&mut self, live: &HashSet<Uuid>) {
        self.entries.retain(|id, _| live.contains(id));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::BlendMode;
    use image::{ImageOutputFormat, Rgba};
    use std::io::Cursor;

    fn png_data_url(color: [u8; 4]) -> String {
        let img = RgbaImage::from_pixel(3, 2, Rgba(color));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        format!("data:image/png;base64,{}", general_purpose::STANDARD.encode(&bytes))
    }

    fn overlay(src: String) -> ImageOverlay {
        ImageOverlay {
            id: Uuid::new_v4(),
            src,
            x: 0.0,
            y: 0.0,
            width: 3.0,
            height: 2.0,
            rotation: 0.0,
            opacity: 100.0,
            blend_mode: BlendMode::Normal,
            flip_horizontal: false,
            flip_vertical: false,
        }
    }

    #[test]
    fn test_decode_and_reuse() {
        let mut cache = OverlayCache::new();
        let o = overlay(png_data_url([1, 2, 3, 255]));
        let a = cache.get(&o).unwrap();
        let b = cache.get(&o).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(*a.get_pixel(0, 0), Rgba([1, 2, 3, 255]));
    }

    #[test]
    fn test_content_change_redecodes() {
        let mut cache = OverlayCache::new();
        let mut o = overlay(png_data_url([1, 2, 3, 255]));
        cache.get(&o).unwrap();
        o.src = png_data_url([9, 9, 9, 255]);
        assert_eq!(*cache.get(&o).unwrap().get_pixel(0, 0), Rgba([9, 9, 9, 255]));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_broken_source_is_none() {
        let mut cache = OverlayCache::new();
        assert!(cache.get(&overlay("data:image/png;base64,@@@".to_string())).is_none());
        assert!(cache.get(&overlay("data:text/plain,hello".to_string())).is_none());
        assert!(matches!(decode_data_url("aGVsbG8="), Err(SourceError::Decode(_))));
    }

    #[test]
    fn test_retain_ids() {
        let mut cache = OverlayCache::new();
        let o = overlay(png_data_url([0, 0, 0, 255]));
        cache.get(&o);
        cache.retain_ids(&HashSet::new());
        assert!(cache.is_empty());
    }
}
