//! PhotoFE editing engine: an edit state with history, the interactive
//! crop / rotate / zoom controller, and the compositor that turns a source
//! image plus edits into a preview or export raster.
//!
//! [`editor::Editor`] ties the pieces together for an interactive session;
//! [`renderer::Compositor`] can be driven on its own for headless rendering.

#![allow(clippy::too_many_arguments)]

pub mod canvas;
pub mod cli;
pub mod components;
pub mod config;
pub mod edit;
pub mod editor;
pub mod error;
pub mod export;
pub mod geometry;
pub mod logger;
pub mod ops;
pub mod overlay_cache;
pub mod renderer;
pub mod source;
pub mod suggestion;
