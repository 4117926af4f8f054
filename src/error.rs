use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CompressError {
    #[error("Failed to launch {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Compressor exited with {status}: {stderr}")]
    ToolFailed { status: String, stderr: String },

    #[error("Output {} is missing or too small ({size} bytes)", .path.display())]
    OutputTooSmall { path: PathBuf, size: u64 },

    #[error("PDF error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid size threshold: {0} MB (must be positive)")]
    InvalidThreshold(f64),

    #[error("Invalid JPEG quality: {0} (must be 1-100)")]
    InvalidQuality(u8),
}
