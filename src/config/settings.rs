use std::path::{Path, PathBuf};

use crate::cli::{BatchArgs, Command, CompressArgs, Engine, EngineArgs, MergeArgs, Preset, RunArgs};
use crate::error::ConfigError;

use super::defaults::*;

/// Convert megabytes (1 MB = 1024 * 1024 bytes) to bytes.
pub fn mb_to_bytes(mb: f64) -> u64 {
    (mb * 1024.0 * 1024.0).round() as u64
}

/// What to do with items that are too large on their own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OversizePolicy {
    /// Give each oversized item a batch of its own
    #[default]
    Isolate,
    /// Compress items above `max_item` bytes first and emit them unmerged
    Precompress { max_item: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineSettings {
    pub engine: Engine,
    pub gs_binary: PathBuf,
    pub preset: Preset,
    pub quality: u8,
    pub max_dim: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            engine: Engine::Gs,
            gs_binary: PathBuf::from(DEFAULT_GS_BINARY),
            preset: Preset::Screen,
            quality: DEFAULT_QUALITY,
            max_dim: DEFAULT_MAX_DIM,
        }
    }
}

impl EngineSettings {
    fn from_args(args: &EngineArgs) -> Result<Self, ConfigError> {
        if !(1..=100).contains(&args.quality) {
            return Err(ConfigError::InvalidQuality(args.quality));
        }
        Ok(Self {
            engine: args.engine,
            gs_binary: args
                .gs
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_GS_BINARY)),
            preset: args.preset,
            quality: args.quality,
            max_dim: args.max_dim,
        })
    }
}

/// Runtime settings for one invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub root: PathBuf,
    /// Output of the compress step
    pub compressed_dir: PathBuf,
    /// Tree scanned by the merge step
    pub merge_input: PathBuf,
    /// Output of the merge step, recreated each run
    pub merged_dir: PathBuf,
    pub log_path: PathBuf,

    pub max_batch_bytes: u64,
    pub oversize: OversizePolicy,
    /// Write all.pdf after the batches
    pub combined: bool,

    pub engine: EngineSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self::for_root(Path::new("."))
    }
}

impl Settings {
    /// Defaults with every directory placed under `root`.
    pub fn for_root(root: &Path) -> Self {
        let compressed_dir = root.join(COMPRESSED_DIR_NAME);
        Self {
            root: root.to_path_buf(),
            merge_input: compressed_dir.clone(),
            compressed_dir,
            merged_dir: root.join(MERGED_DIR_NAME),
            log_path: root.join(LOG_FILE_NAME),
            max_batch_bytes: mb_to_bytes(DEFAULT_MAX_BATCH_MB),
            oversize: OversizePolicy::Isolate,
            combined: true,
            engine: EngineSettings::default(),
        }
    }

    /// Create settings from the parsed subcommand
    pub fn from_command(command: &Command) -> Result<Self, ConfigError> {
        match command {
            Command::Compress(args) => Self::from_compress(args),
            Command::Merge(args) => Self::from_merge(args),
            Command::Run(args) => Self::from_run(args),
        }
    }

    fn from_compress(args: &CompressArgs) -> Result<Self, ConfigError> {
        let mut settings = Self::for_root(&args.root);
        if let Some(dir) = &args.compressed_dir {
            settings.compressed_dir = dir.clone();
            settings.merge_input = dir.clone();
        }
        settings.engine = EngineSettings::from_args(&args.engine)?;
        Ok(settings)
    }

    fn from_merge(args: &MergeArgs) -> Result<Self, ConfigError> {
        let mut settings = Self::for_root(&args.root);
        if let Some(input) = &args.input {
            settings.merge_input = input.clone();
        }
        if let Some(dir) = &args.merged_dir {
            settings.merged_dir = dir.clone();
        }
        settings.engine = EngineSettings::from_args(&args.engine)?;
        settings.apply_batching(&args.batching)?;
        Ok(settings)
    }

    fn from_run(args: &RunArgs) -> Result<Self, ConfigError> {
        let mut settings = Self::for_root(&args.root);
        if let Some(dir) = &args.compressed_dir {
            settings.compressed_dir = dir.clone();
            settings.merge_input = dir.clone();
        }
        if let Some(dir) = &args.merged_dir {
            settings.merged_dir = dir.clone();
        }
        settings.engine = EngineSettings::from_args(&args.engine)?;
        settings.apply_batching(&args.batching)?;
        Ok(settings)
    }

    fn apply_batching(&mut self, args: &BatchArgs) -> Result<(), ConfigError> {
        self.max_batch_bytes = positive_mb(args.max_batch_mb)?;
        self.oversize = match args.max_item_mb {
            Some(mb) => OversizePolicy::Precompress {
                max_item: positive_mb(mb)?,
            },
            None => OversizePolicy::Isolate,
        };
        self.combined = !args.no_combined;
        if let Some(log) = &args.log {
            self.log_path = log.clone();
        }
        Ok(())
    }
}

fn positive_mb(mb: f64) -> Result<u64, ConfigError> {
    if !mb.is_finite() || mb <= 0.0 {
        return Err(ConfigError::InvalidThreshold(mb));
    }
    Ok(mb_to_bytes(mb))
}
