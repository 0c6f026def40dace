use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

use nbline_config::Settings;
use nbline_core::{format, logging, render};

/// Print a notebook as a flat, line-oriented transcript.
#[derive(Debug, Parser)]
#[command(name = "nbview", version)]
struct Cli {
    /// Config file (defaults to the platform config directory).
    #[arg(long, env = "NBLINE_CONFIG")]
    config: Option<PathBuf>,

    /// Notebook to render.
    path: PathBuf,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "nbview failed");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let settings = Settings::load(cli.config.as_deref())?;
    logging::init(&settings.log)?;

    let notebook = format::read_path(&cli.path)?;
    let lines = render::render(&notebook);
    tracing::debug!(cells = notebook.cells.len(), lines = lines.len(), "rendered notebook");

    let mut out = BufWriter::new(io::stdout().lock());
    for line in &lines {
        writeln!(out, "{line}").context("failed to write to stdout")?;
    }
    out.flush().context("failed to flush stdout")
}
