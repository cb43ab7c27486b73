// ============================================================================
// PhotoFE CLI: headless rendering of an edit stack via command-line arguments
// ============================================================================
//
// Usage examples:
//   PhotoFE --input photo.png --edits edits.json --output result.png
//   PhotoFE -i photo.jpg -e warm.json -o out.jpg --quality 85
//   PhotoFE -i "shots/*.jpg" -e bw.json --output-dir processed/ --format png
//   PhotoFE -i big.png -e edits.json -o preview.png --viewport 800x600
//   PhotoFE -i "shots/*.jpg" -e bw.json --output-dir out/ --log-file
//
// An edits file is a JSON array of patches applied in order, a single patch,
// or a full edit state ({"filters": ..., "transform": ..., "layers": [...]}).

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::edit::{EditPatch, EditState};
use crate::export::{DEFAULT_JPEG_QUALITY, ExportFormat, write_to_path};
use crate::geometry::Size;
use crate::logger;
use crate::renderer::{Compositor, LiveView, RenderRequest};

// ============================================================================
// CLI argument definition (clap Derive)
// ============================================================================

/// PhotoFE headless renderer.
///
/// Apply a saved edit stack to image files and write the composited result.
#[derive(Parser, Debug)]
#[command(
    name = "PhotoFE",
    about = "PhotoFE headless edit renderer",
    long_about = "Apply crop, resize, frame, rotation, filters and overlay layers from a\n\
                  JSON edits file to image files without opening an editor.\n\n\
                  Example:\n  \
                  PhotoFE --input photo.png --edits edits.json --output result.png\n  \
                  PhotoFE -i \"*.jpg\" -e bw.json --output-dir out/ --format png"
)]
pub struct CliArgs {
    /// Input file(s). Glob patterns accepted (e.g. "*.png", "shots/*.jpg").
    #[arg(short, long, required = true, num_args = 1..)]
    pub input: Vec<String>,

    /// JSON edits file: an edit state, one patch, or an array of patches.
    /// If omitted, images are only re-encoded.
    #[arg(short, long, value_name = "EDITS.json")]
    pub edits: Option<PathBuf>,

    /// Output file path. Only valid for single-file input.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output directory for batch processing.
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Output format: png, jpeg, webp, bmp. Inferred from --output when omitted.
    #[arg(short, long, value_name = "FORMAT")]
    pub format: Option<String>,

    /// JPEG quality (1-100).
    #[arg(short, long, default_value_t = DEFAULT_JPEG_QUALITY, value_name = "1-100")]
    pub quality: u8,

    /// Fit the render into WIDTHxHEIGHT (scale down only), like an on-screen preview.
    #[arg(long, value_name = "WxH", value_parser = parse_viewport)]
    pub viewport: Option<Size>,

    /// Engine configuration JSON (interpolation, workspace colour, fonts, ...).
    #[arg(short, long, value_name = "CONFIG.json")]
    pub config: Option<PathBuf>,

    /// Extra font files for text layers, as FAMILY=PATH.
    #[arg(long = "font", value_name = "FAMILY=PATH")]
    pub fonts: Vec<String>,

    /// Per-file timing and debug logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// Write the session log to the PhotoFE data directory instead of stderr.
    #[arg(long)]
    pub log_file: bool,
}

/// Install logging for this run. Falls back to stderr when the log file
/// cannot be opened.
pub fn init_logging(args: &CliArgs) {
    if args.log_file {
        match logger::init() {
            Some(path) => {
                if args.verbose {
                    println!("Logging to {}", path.display());
                }
                return;
            }
            None => eprintln!("warning: log file unavailable, logging to stderr"),
        }
    }
    logger::init_stderr(args.verbose);
}

pub fn parse_viewport(s: &str) -> Result<Size, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{}'", s))?;
    let w: u32 = w.trim().parse().map_err(|_| format!("bad width '{}'", w))?;
    let h: u32 = h.trim().parse().map_err(|_| format!("bad height '{}'", h))?;
    if w == 0 || h == 0 {
        return Err("viewport must be at least 1x1".to_string());
    }
    Ok(Size::from_u32(w, h))
}

/// Read an edits document into a final state. A JSON array is a patch list;
/// anything else is tried as a single patch first, then as a whole state.
pub fn parse_edits(json: &str) -> Result<EditState, String> {
    let value: Value = serde_json::from_str(json).map_err(|e| format!("invalid JSON: {}", e))?;
    let patches: Vec<EditPatch> = match value {
        Value::Array(_) => serde_json::from_value(value).map_err(|e| format!("invalid patch list: {}", e))?,
        other => match serde_json::from_value::<EditPatch>(other.clone()) {
            Ok(patch) => vec![patch],
            Err(_) => return serde_json::from_value(other).map_err(|e| format!("invalid edit state: {}", e)),
        },
    };
    patches.iter().enumerate().try_fold(EditState::default(), |state, (i, patch)| {
        state.apply(patch).map_err(|e| format!("patch {} ({}): {}", i + 1, patch.label(), e))
    })
}

// ============================================================================
// Public entry point
// ============================================================================

/// Run all CLI processing and return an OS exit code.
/// `0` = all files succeeded, `1` = one or more files failed.
pub fn run(args: CliArgs) -> ExitCode {
    let inputs = resolve_inputs(&args.input);
    if inputs.is_empty() {
        eprintln!("error: no input files matched the given pattern(s).");
        return ExitCode::FAILURE;
    }

    if inputs.len() > 1 && args.output.is_some() && args.output_dir.is_none() {
        eprintln!(
            "error: {} input files given but --output only accepts a single file path.\n\
             Use --output-dir to specify a destination directory for batch processing.",
            inputs.len()
        );
        return ExitCode::FAILURE;
    }

    let format = match parse_format(args.format.as_deref(), args.output.as_deref(), args.quality) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let config = match &args.config {
        Some(path) => match EngineConfig::load(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("error: could not read config '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => EngineConfig::default(),
    };

    let state = match &args.edits {
        Some(path) => match std::fs::read_to_string(path).map_err(|e| e.to_string()).and_then(|s| parse_edits(&s)) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("error: could not read edits '{}': {}", path.display(), e);
                return ExitCode::FAILURE;
            }
        },
        None => EditState::default(),
    };

    let mut compositor = Compositor::new(config);
    for font_arg in &args.fonts {
        if let Err(e) = register_font(&mut compositor, font_arg) {
            eprintln!("warning: {}", e);
        }
    }

    if let Some(dir) = &args.output_dir
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("error: could not create output directory '{}': {}", dir.display(), e);
        return ExitCode::FAILURE;
    }

    let total = inputs.len();
    let multi = total > 1;
    let mut any_failure = false;

    for (idx, input_path) in inputs.iter().enumerate() {
        if multi || args.verbose {
            println!("[{}/{}] {}", idx + 1, total, input_path.display());
        }
        let file_start = Instant::now();

        let Some(output_path) = build_output_path(input_path, args.output.as_deref(), args.output_dir.as_deref(), format)
        else {
            eprintln!("  error: cannot determine output path for '{}'.", input_path.display());
            any_failure = true;
            continue;
        };

        match run_one(&mut compositor, input_path, &output_path, &state, args.viewport, format) {
            Ok(()) => {
                if args.verbose || multi {
                    println!(
                        "  → {} ({:.0}ms)",
                        output_path.display(),
                        file_start.elapsed().as_secs_f64() * 1000.0
                    );
                }
            }
            Err(e) => {
                eprintln!("  error: {}", e);
                any_failure = true;
            }
        }
    }

    if any_failure {
        if let Some(path) = logger::log_path() {
            eprintln!("details in {}", path.display());
        }
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

// ============================================================================
// Per-file processing pipeline
// ============================================================================

fn run_one(
    compositor: &mut Compositor,
    input: &Path,
    output: &Path,
    state: &EditState,
    viewport: Option<Size>,
    format: ExportFormat,
) -> Result<(), String> {
    let source = image::open(input).map_err(|e| format!("load failed: {}", e))?.to_rgba8();
    debug!(path = %input.display(), w = source.width(), h = source.height(), "loaded");

    let rendered = compositor
        .render(&RenderRequest { state, source: &source, viewport, live: LiveView::default() })
        .map_err(|e| format!("render failed: {}", e))?;

    write_to_path(&rendered.image, output, format).map_err(|e| format!("save failed: {}", e))?;
    info!(input = %input.display(), output = %output.display(), "rendered");
    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

fn register_font(compositor: &mut Compositor, font_arg: &str) -> Result<(), String> {
    let (family, path) = font_arg
        .split_once('=')
        .ok_or_else(|| format!("--font expects FAMILY=PATH, got '{}'", font_arg))?;
    let bytes = std::fs::read(path).map_err(|e| format!("could not read font '{}': {}", path, e))?;
    compositor
        .fonts_mut()
        .register(family.trim(), bytes)
        .map_err(|e| format!("invalid font '{}': {}", path, e))
}

/// Expand glob patterns and literal paths into a deduplicated, ordered list.
fn resolve_inputs(patterns: &[String]) -> Vec<PathBuf> {
    let mut result: Vec<PathBuf> = Vec::new();

    for pattern in patterns {
        let as_path = Path::new(pattern);
        if as_path.exists() {
            if !result.iter().any(|p| p.as_path() == as_path) {
                result.push(as_path.to_path_buf());
            }
            continue;
        }

        match glob::glob(pattern) {
            Ok(entries) => {
                let mut matched = false;
                for entry in entries.flatten() {
                    if !result.contains(&entry) {
                        result.push(entry);
                    }
                    matched = true;
                }
                if !matched {
                    warn!(pattern = %pattern, "pattern matched no files");
                    eprintln!("warning: pattern '{}' matched no files.", pattern);
                }
            }
            Err(e) => {
                eprintln!("warning: invalid glob '{}': {}", pattern, e);
            }
        }
    }

    result
}

/// `--format` wins; otherwise the output extension; otherwise PNG.
fn parse_format(format_arg: Option<&str>, output: Option<&Path>, quality: u8) -> Result<ExportFormat, String> {
    if let Some(f) = format_arg {
        return ExportFormat::from_extension(f, quality).ok_or_else(|| format!("unsupported format '{}'", f));
    }
    Ok(output.and_then(|p| ExportFormat::from_path(p, quality)).unwrap_or_default())
}

/// Output path priority: `--output`, then `--output-dir` with the input stem,
/// then next to the input (with `_out` appended if it would overwrite it).
fn build_output_path(input: &Path, output: Option<&Path>, output_dir: Option<&Path>, format: ExportFormat) -> Option<PathBuf> {
    if let Some(out) = output {
        return Some(out.to_path_buf());
    }

    let ext = format.extension();
    let stem = input.file_stem()?.to_string_lossy().into_owned();

    if let Some(dir) = output_dir {
        return Some(dir.join(format!("{}.{}", stem, ext)));
    }

    let parent = input.parent().unwrap_or(Path::new("."));
    let candidate = parent.join(format!("{}.{}", stem, ext));
    if candidate == input {
        Some(parent.join(format!("{}_out.{}", stem, ext)))
    } else {
        Some(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_flag() {
        let args = CliArgs::try_parse_from(["photofe", "-i", "a.png", "--log-file"]).unwrap();
        assert!(args.log_file);
        let args = CliArgs::try_parse_from(["photofe", "-i", "a.png"]).unwrap();
        assert!(!args.log_file);
    }

    #[test]
    fn test_parse_viewport() {
        assert_eq!(parse_viewport("800x600"), Ok(Size::new(800.0, 600.0)));
        assert_eq!(parse_viewport("12X3"), Ok(Size::new(12.0, 3.0)));
        assert!(parse_viewport("800").is_err());
        assert!(parse_viewport("0x5").is_err());
    }

    #[test]
    fn test_parse_edits_forms() {
        let list = parse_edits(r#"[{"filter": {"brightness": 120}}, {"transform": {"rotate_by": 90}}, {"transform": "flip_horizontal"}]"#).unwrap();
        assert_eq!(list.filters.brightness, 120.0);
        assert_eq!(list.transform.rotation, 90.0);
        assert!(list.transform.flip_horizontal);

        let single = parse_edits(r#"{"transform": {"set_rotation": 45}}"#).unwrap();
        assert_eq!(single.transform.rotation, 45.0);

        let whole = parse_edits(r#"{"transform": {"rotation": 90, "flip_vertical": true}}"#).unwrap();
        assert_eq!(whole.transform.rotation, 90.0);
        assert!(whole.transform.flip_vertical);

        let state = parse_edits(r#"{"filters": {"sharpen": 30}}"#).unwrap();
        assert_eq!(state.filters.sharpen, 30.0);

        let patch = parse_edits(r#"{"filter": {"hue": 10}}"#).unwrap();
        assert_eq!(patch.filters.hue, 10.0);
    }

    #[test]
    fn test_bad_patch_reports_position() {
        let err = parse_edits(r#"[{"filter": {"blur": 2}}, {"layer": {"remove": "00000000-0000-0000-0000-000000000000"}}]"#).unwrap_err();
        assert!(err.starts_with("patch 2"));
    }

    #[test]
    fn test_format_and_output_path() {
        assert_eq!(parse_format(Some("jpg"), None, 70), Ok(ExportFormat::Jpeg { quality: 70 }));
        assert_eq!(parse_format(None, Some(Path::new("o.bmp")), 70), Ok(ExportFormat::Bmp));
        assert_eq!(parse_format(None, None, 70), Ok(ExportFormat::Png));
        assert!(parse_format(Some("tiff"), None, 70).is_err());

        let p = build_output_path(Path::new("dir/a.png"), None, None, ExportFormat::Png).unwrap();
        assert_eq!(p, PathBuf::from("dir/a_out.png"));
        let p = build_output_path(Path::new("dir/a.png"), None, Some(Path::new("out")), ExportFormat::Webp).unwrap();
        assert_eq!(p, PathBuf::from("out/a.webp"));
    }
}
