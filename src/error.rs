//! Error taxonomy for the editing engine.
//!
//! None of these are fatal: every failure degrades to "preview unchanged" or
//! "layer omitted" at the call site that receives it.

use thiserror::Error;
use uuid::Uuid;

/// Applying an edit patch to an `EditState` failed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EditError {
    #[error("layer {0} not found")]
    LayerNotFound(Uuid),
    #[error("layer {0} already exists")]
    DuplicateLayer(Uuid),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// History navigation that could not be performed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum HistoryError {
    #[error("nothing to undo")]
    NothingToUndo,
    #[error("nothing to redo")]
    NothingToRedo,
    #[error("history index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Decoding of the source image or an overlay image failed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SourceError {
    #[error("no source image loaded")]
    Empty,
    #[error("source image is still loading")]
    Loading,
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("stale load ticket {ticket} (current {current})")]
    Superseded { ticket: u64, current: u64 },
    #[error("invalid image data: {0}")]
    InvalidData(String),
}

/// The compositing renderer could not produce a raster.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RenderError {
    #[error("source image unavailable: {0}")]
    SourceUnavailable(#[from] SourceError),
    #[error("degenerate canvas {width}x{height}")]
    EmptyCanvas { width: u32, height: u32 },
}

/// Encoding the composed raster for the exporter failed.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("nothing rendered yet")]
    NoRaster,
    #[error("encode failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Loading an engine configuration file failed.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The editing assistant returned something unusable.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SuggestionError {
    #[error("assistant error: {0}")]
    Assistant(String),
    #[error("malformed suggestion: {0}")]
    Malformed(String),
    #[error("suggestion contains no edits")]
    Empty,
}

/// Umbrella error surfaced to the UI host.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Edit(#[from] EditError),
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Suggestion(#[from] SuggestionError),
}

pub type EngineResult<T> = Result<T, EngineError>;
