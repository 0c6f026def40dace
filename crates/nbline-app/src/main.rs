use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use nbline_config::Settings;
use nbline_core::{format, logging};

/// Exit status for usage problems, matching clap's own parse failures.
const USAGE_EXIT: u8 = 2;

/// Read notebooks as canonical JSON, or write JSON back as a notebook file.
#[derive(Debug, Parser)]
#[command(name = "nbline", version)]
struct Cli {
    /// Config file (defaults to the platform config directory).
    #[arg(long, global = true, env = "NBLINE_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Subcommand)]
enum Mode {
    /// Print the notebook at PATH as single-line JSON.
    Read { path: PathBuf },
    /// Read a JSON notebook from stdin and write it to PATH.
    Write { path: PathBuf },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = %format!("{err:#}"), "nbline failed");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let settings = Settings::load(cli.config.as_deref())?;
    logging::init(&settings.log)?;

    match cli.mode {
        Mode::Read { path } => read_notebook(&path),
        Mode::Write { path } => write_notebook(&path, &settings),
    }
}

fn read_notebook(path: &Path) -> Result<ExitCode> {
    let notebook = format::read_path(path)?;
    let json = format::to_canonical_json(&notebook)?;

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{json}").context("failed to write to stdout")?;
    Ok(ExitCode::SUCCESS)
}

fn write_notebook(path: &Path, settings: &Settings) -> Result<ExitCode> {
    let mut input = String::new();
    io::stdin()
        .read_to_string(&mut input)
        .context("failed to read notebook JSON from stdin")?;

    if input.is_empty() {
        eprintln!("no input");
        return Ok(ExitCode::from(USAGE_EXIT));
    }

    let notebook = format::from_json_str(&input)?;
    format::write_path(&notebook, path, &settings.write)?;
    tracing::info!(path = %path.display(), cells = notebook.cells.len(), "notebook written");
    Ok(ExitCode::SUCCESS)
}
