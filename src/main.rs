// Headless front end: render an edit stack onto image files.
// The interactive engine lives in the library (`photofe::editor::Editor`).

use std::process::ExitCode;

use clap::Parser;
use photofe::cli::{self, CliArgs};

fn main() -> ExitCode {
    let args = CliArgs::parse();
    cli::init_logging(&args);
    tracing::debug!(?args, "starting");
    cli::run(args)
}
