//! The source image slot.
//!
//! Loading is modelled as tickets: the host calls [`SourceSlot::begin_load`]
//! when it starts reading a file, and later hands the bytes (or an error) back
//! with that ticket. Only the newest ticket can install an image, so a slow
//! decode that finishes after a newer one never overwrites it.

use image::RgbaImage;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::SourceError;
use crate::geometry::Size;

#[derive(Clone, Debug, Default)]
pub enum SourceState {
    #[default]
    Empty,
    Loading { ticket: u64 },
    Ready { ticket: u64, image: Arc<RgbaImage> },
    Failed { ticket: u64, message: String },
}

#[derive(Debug, Default)]
pub struct SourceSlot {
    state: SourceState,
    next_ticket: u64,
    /// Last successfully decoded image, kept while a newer load is pending.
    last_ready: Option<Arc<RgbaImage>>,
}

impl SourceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SourceState {
        &self.state
    }

    pub fn current_ticket(&self) -> u64 {
        self.next_ticket
    }

    /// Start a new load; any earlier ticket becomes stale.
    pub fn begin_load(&mut self) -> u64 {
        self.next_ticket += 1;
        self.state = SourceState::Loading { ticket: self.next_ticket };
        self.next_ticket
    }

    /// Decode `bytes` and install them if `ticket` is still the newest.
    pub fn complete(&mut self, ticket: u64, bytes: &[u8]) -> Result<Arc<RgbaImage>, SourceError> {
        self.check_ticket(ticket)?;
        match image::load_from_memory(bytes) {
            Ok(img) => Ok(self.install(ticket, img.to_rgba8())),
            Err(e) => {
                let message = e.to_string();
                warn!(ticket, error = %message, "source decode failed");
                self.state = SourceState::Failed { ticket, message: message.clone() };
                Err(SourceError::Decode(message))
            }
        }
    }

    /// Install already-decoded pixels for `ticket`.
    pub fn complete_with_image(&mut self, ticket: u64, image: RgbaImage) -> Result<Arc<RgbaImage>, SourceError> {
        self.check_ticket(ticket)?;
        Ok(self.install(ticket, image))
    }

    pub fn fail(&mut self, ticket: u64, message: impl Into<String>) -> Result<(), SourceError> {
        self.check_ticket(ticket)?;
        let message = message.into();
        warn!(ticket, error = %message, "source load failed");
        self.state = SourceState::Failed { ticket, message };
        Ok(())
    }

    /// Convenience for synchronous callers: load and install in one step.
    pub fn load_bytes(&mut self, bytes: &[u8]) -> Result<Arc<RgbaImage>, SourceError> {
        let ticket = self.begin_load();
        self.complete(ticket, bytes)
    }

    /// The image to render: the ready image, else the last good one while a
    /// newer load is in flight.
    pub fn image(&self) -> Result<Arc<RgbaImage>, SourceError> {
        match &self.state {
            SourceState::Ready { image, .. } => Ok(Arc::clone(image)),
            SourceState::Loading { .. } => self.last_ready.clone().ok_or(SourceError::Loading),
            SourceState::Failed { message, .. } => Err(SourceError::Decode(message.clone())),
            SourceState::Empty => Err(SourceError::Empty),
        }
    }

    pub fn size(&self) -> Option<Size> {
        self.image().ok().map(|img| Size::from_u32(img.width(), img.height()))
    }

    fn check_ticket(&self, ticket: u64) -> Result<(), SourceError> {
        if ticket != self.next_ticket {
            warn!(ticket, current = self.next_ticket, "ignoring stale source load");
            return Err(SourceError::Superseded { ticket, current: self.next_ticket });
        }
        Ok(())
    }

    fn install(&mut self, ticket: u64, image: RgbaImage) -> Arc<RgbaImage> {
        if image.width() == 0 || image.height() == 0 {
            warn!(ticket, "decoded source has no pixels");
        }
        info!(ticket, w = image.width(), h = image.height(), "source image ready");
        let image = Arc::new(image);
        self.last_ready = Some(Arc::clone(&image));
        self.state = SourceState::Ready { ticket, image: Arc::clone(&image) };
        image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageOutputFormat, Rgba};
    use std::io::Cursor;

    fn png(w: u32, h: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([5, 6, 7, 255])))
            .write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_last_write_wins() {
        let mut slot = SourceSlot::new();
        let first = slot.begin_load();
        let second = slot.begin_load();
        slot.complete(second, &png(4, 4)).unwrap();
        let err = slot.complete(first, &png(8, 8)).unwrap_err();
        assert_eq!(err, SourceError::Superseded { ticket: first, current: second });
        assert_eq!(slot.size(), Some(Size::new(4.0, 4.0)));
    }

    #[test]
    fn test_previous_image_kept_while_loading() {
        let mut slot = SourceSlot::new();
        assert_eq!(slot.image().unwrap_err(), SourceError::Empty);
        slot.load_bytes(&png(2, 3)).unwrap();
        slot.begin_load();
        assert_eq!(slot.image().unwrap().dimensions(), (2, 3));
    }

    #[test]
    fn test_decode_failure() {
        let mut slot = SourceSlot::new();
        let t = slot.begin_load();
        assert!(matches!(slot.complete(t, b"not an image"), Err(SourceError::Decode(_))));
        assert!(matches!(slot.state(), SourceState::Failed { .. }));
        assert!(slot.image().is_err());
    }

    #[test]
    fn test_fail_with_stale_ticket_is_ignored() {
        let mut slot = SourceSlot::new();
        let old = slot.begin_load();
        let new = slot.begin_load();
        assert!(slot.fail(old, "network").is_err());
        assert!(matches!(slot.state(), SourceState::Loading { ticket } if *ticket == new));
    }
}
