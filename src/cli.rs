use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::defaults::{DEFAULT_MAX_BATCH_MB, DEFAULT_MAX_DIM, DEFAULT_QUALITY};

#[derive(Parser, Debug)]
#[command(name = "pdf-batcher")]
#[command(
    author,
    version,
    about = "Compress PDFs and merge them into size-capped batches"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compress every PDF under the root into a mirrored tree
    Compress(CompressArgs),
    /// Merge PDFs into batches that stay under a size cap
    Merge(MergeArgs),
    /// Compress, then merge the compressed tree
    Run(RunArgs),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Compress(_) => "compress",
            Command::Merge(_) => "merge",
            Command::Run(_) => "run",
        }
    }
}

#[derive(clap::Args, Debug, Clone)]
pub struct CompressArgs {
    /// Directory scanned for PDFs
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Where compressed copies go (defaults to <root>/compressed)
    #[arg(long)]
    pub compressed_dir: Option<PathBuf>,

    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(clap::Args, Debug, Clone)]
pub struct MergeArgs {
    /// Base directory; relative defaults are resolved against it
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Tree to batch (defaults to <root>/compressed)
    #[arg(long)]
    pub input: Option<PathBuf>,

    /// Output directory, cleared on every run (defaults to <root>/merged)
    #[arg(long)]
    pub merged_dir: Option<PathBuf>,

    #[command(flatten)]
    pub batching: BatchArgs,

    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(clap::Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    #[arg(long)]
    pub compressed_dir: Option<PathBuf>,

    #[arg(long)]
    pub merged_dir: Option<PathBuf>,

    #[command(flatten)]
    pub batching: BatchArgs,

    #[command(flatten)]
    pub engine: EngineArgs,
}

#[derive(clap::Args, Debug, Clone)]
pub struct BatchArgs {
    /// Size cap per merged batch, in MB (exclusive)
    #[arg(long, default_value_t = DEFAULT_MAX_BATCH_MB)]
    pub max_batch_mb: f64,

    /// Compress files above this size before batching and emit them on their own
    #[arg(long)]
    pub max_item_mb: Option<f64>,

    /// Skip writing all.pdf
    #[arg(long)]
    pub no_combined: bool,

    /// Append-only run log (defaults to <root>/merge_log.txt)
    #[arg(long)]
    pub log: Option<PathBuf>,
}

#[derive(clap::Args, Debug, Clone)]
pub struct EngineArgs {
    /// Compression backend
    #[arg(long, value_enum, default_value = "gs")]
    pub engine: Engine,

    /// Ghostscript executable
    #[arg(long)]
    pub gs: Option<PathBuf>,

    /// Ghostscript -dPDFSETTINGS preset
    #[arg(long, value_enum, default_value = "screen")]
    pub preset: Preset,

    /// JPEG quality for the native engine (1-100)
    #[arg(long, default_value_t = DEFAULT_QUALITY)]
    pub quality: u8,

    /// Max image dimension (longer side) for the native engine
    #[arg(long, default_value_t = DEFAULT_MAX_DIM)]
    pub max_dim: u32,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Default)]
pub enum Engine {
    /// External Ghostscript process
    #[default]
    Gs,
    /// In-process image recompression
    Native,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum, Default)]
pub enum Preset {
    #[default]
    Screen,
    Ebook,
    Printer,
    Prepress,
    Default,
}

impl Preset {
    /// Value passed as `-dPDFSETTINGS`.
    pub fn pdf_settings(&self) -> &'static str {
        match self {
            Preset::Screen => "/screen",
            Preset::Ebook => "/ebook",
            Preset::Printer => "/printer",
            Preset::Prepress => "/prepress",
            Preset::Default => "/default",
        }
    }
}
