// ============================================================================
// EXPORT: encode the current preview raster
// ============================================================================

use image::codecs::bmp::BmpEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ColorType, DynamicImage, ImageEncoder, ImageFormat, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Cursor, Write};
use std::path::Path;
use tracing::info;

use crate::edit::Color;
use crate::error::ExportError;
use crate::renderer::flatten;

pub const DEFAULT_JPEG_QUALITY: u8 = 90;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    #[default]
    Png,
    Jpeg { quality: u8 },
    Webp,
    Bmp,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg { .. } => "jpg",
            ExportFormat::Webp => "webp",
            ExportFormat::Bmp => "bmp",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ExportFormat::Png => "PNG",
            ExportFormat::Jpeg { .. } => "JPEG",
            ExportFormat::Webp => "WebP",
            ExportFormat::Bmp => "BMP",
        }
    }

    pub fn supports_alpha(&self) -> bool {
        !matches!(self, ExportFormat::Jpeg { .. })
    }

    /// Pick a format from a file extension (case-insensitive).
    pub fn from_extension(ext: &str, quality: u8) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some(ExportFormat::Png),
            "jpg" | "jpeg" => Some(ExportFormat::Jpeg { quality: quality.clamp(1, 100) }),
            "webp" => Some(ExportFormat::Webp),
            "bmp" => Some(ExportFormat::Bmp),
            _ => None,
        }
    }

    pub fn from_path(path: &Path, quality: u8) -> Option<Self> {
        path.extension().and_then(|e| e.to_str()).and_then(|e| Self::from_extension(e, quality))
    }
}

/// Encode `image` into `writer`. JPEG has no alpha, so it is flattened over
/// white first.
pub fn encode_into<W: Write>(image: &RgbaImage, format: ExportFormat, writer: &mut W) -> Result<(), ExportError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(ExportError::NoRaster);
    }
    match format {
        ExportFormat::Png => {
            PngEncoder::new(writer).write_image(image.as_raw(), image.width(), image.height(), ColorType::Rgba8)?;
        }
        ExportFormat::Jpeg { quality } => {
            let rgb = DynamicImage::ImageRgba8(flatten(image, Color::WHITE)).to_rgb8();
            JpegEncoder::new_with_quality(writer, quality.clamp(1, 100)).write_image(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                ColorType::Rgb8,
            )?;
        }
        ExportFormat::Webp => {
            // WebP goes through DynamicImage, which needs a seekable sink.
            let mut buf = Cursor::new(Vec::new());
            DynamicImage::ImageRgba8(image.clone()).write_to(&mut buf, ImageFormat::WebP)?;
            writer.write_all(buf.get_ref())?;
        }
        ExportFormat::Bmp => {
            let mut encoder = BmpEncoder::new(writer);
            encoder.encode(image.as_raw(), image.width(), image.height(), ColorType::Rgba8)?;
        }
    }
    Ok(())
}

pub fn encode(image: &RgbaImage, format: ExportFormat) -> Result<Vec<u8>, ExportError> {
    let mut bytes = Vec::new();
    encode_into(image, format, &mut bytes)?;
    Ok(bytes)
}

pub fn write_to_path(image: &RgbaImage, path: &Path, format: ExportFormat) -> Result<(), ExportError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    encode_into(image, format, &mut writer)?;
    writer.flush()?;
    info!(path = %path.display(), format = format.label(), w = image.width(), h = image.height(), "exported");
    Ok(())
}
