use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint};

#[derive(Parser, Debug)]
#[command(name = "torrentzip")]
#[command(version)]
#[command(about = "Build and verify byte-for-byte reproducible ZIP archives", long_about = None)]
#[command(after_help = "Examples:\n  \
  torrentzip create roms.zip ./roms        archive ./roms in canonical form\n  \
  torrentzip verify roms.zip               check the TORRENTZIPPED comment\n  \
  torrentzip verify -l https://host/a.zip  list and check a remote archive")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log verbosity (-v warn, -vv info, -vvv debug, -vvvv trace); RUST_LOG overrides
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode, only errors are printed
    #[arg(short = 'q', long = "quiet", global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an archive from every file under a directory
    Create(CreateArgs),
    /// Check that an archive is in canonical form
    Verify(VerifyArgs),
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Archive to write
    #[arg(value_name = "OUTPUT", value_hint = ValueHint::FilePath)]
    pub output: PathBuf,

    /// Directory whose files are archived, named relative to it
    #[arg(value_name = "SOURCE_DIR", value_hint = ValueHint::DirPath)]
    pub source: PathBuf,

    /// Compression worker threads (default: one per CPU)
    #[arg(short = 'j', long = "jobs", env = "TORRENTZIP_JOBS", value_name = "N")]
    pub jobs: Option<usize>,

    /// Overwrite OUTPUT if it exists
    #[arg(short = 'f', long = "force")]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// ZIP file path or HTTP URL
    #[arg(value_name = "FILE")]
    pub file: String,

    /// List entries
    #[arg(short = 'l', long = "list")]
    pub list: bool,
}

impl VerifyArgs {
    pub fn is_http_url(&self) -> bool {
        self.file.starts_with("http://") || self.file.starts_with("https://")
    }
}
