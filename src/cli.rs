//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

/// Sort a directory tree into per-extension folders.
///
/// Every file under SRC is copied to DST/<extension>/. Identical duplicates
/// are skipped; same-named files with different content are kept side by side
/// under a content-hash suffix.
#[derive(Parser, Debug)]
#[command(name = "copier")]
#[command(author, version, about)]
pub struct Args {
    /// Source directory to read from
    pub src: PathBuf,

    /// Destination root (default: ./dist, or `dest_dir` from the config file)
    pub dst: Option<PathBuf>,

    /// Maximum files processed at once (1-1000, default 100)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u16).range(1..=1000))]
    pub concurrency: Option<u16>,

    /// Report what would be copied without writing anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}
