//! writer: create or overwrite a file with a literal string.
//!
//! A stand-alone utility with no coupling to the log server. Overwrites any
//! existing file; the containing directory must already exist.

use clap::Parser;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

/// Command-line arguments for the writer utility
#[derive(Parser, Debug)]
#[command(name = "writer")]
#[command(about = "Create or overwrite a file with a literal string", long_about = None)]
struct Args {
    /// Full path of the file to write
    writefile: PathBuf,

    /// Text string to write into the file
    writestr: String,
}

/// Write `contents` to `path`, replacing whatever was there.
fn write_file(path: &Path, contents: &str) -> io::Result<()> {
    std::fs::write(path, contents)
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let args = Args::parse();

    debug!("Writing {} to {}", args.writestr, args.writefile.display());

    if let Err(e) = write_file(&args.writefile, &args.writestr) {
        error!(error = %e, "Could not write {}", args.writefile.display());
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
