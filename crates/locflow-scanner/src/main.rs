//! `locflow-scan` - emit a task manifest for one or more directories.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use locflow_scanner::{ScanMode, Scanner};
use tracing::error;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Wall-clock header, no timestamp columns.
    Short,
    /// Scan-root header, full records.
    Long,
}

impl From<ModeArg> for ScanMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Short => Self::Short,
            ModeArg::Long => Self::Long,
        }
    }
}

/// Scan task directories and write the manifest consumed by the workflow
/// driver.
#[derive(Debug, Parser)]
#[command(name = "locflow-scan", version)]
struct Cli {
    /// Manifest flavour.
    mode: ModeArg,

    /// Manifest file to write.
    output: PathBuf,

    /// Node-local storage root; every scanned directory must live under it.
    local_root: PathBuf,

    /// Directories to scan.
    #[arg(required = true)]
    dirs: Vec<PathBuf>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let scanner = Scanner::new(cli.mode.into(), cli.local_root);
    match scanner.scan(&cli.output, &cli.dirs) {
        Ok(()) => ExitCode::SUCCESS,
        Err(source) => {
            error!(error = %source, "scan failed");
            ExitCode::FAILURE
        }
    }
}
