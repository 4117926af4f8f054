/// Default size cap per merged batch in MB
pub const DEFAULT_MAX_BATCH_MB: f64 = 100.0;

/// Default JPEG quality for in-process recompression
pub const DEFAULT_QUALITY: u8 = 50;

/// Default cap on the longer image side in pixels
pub const DEFAULT_MAX_DIM: u32 = 1500;

/// A compressed file at or below this many bytes is treated as a failed run
pub const MIN_COMPRESSED_BYTES: u64 = 1000;

/// Directory (under the root) holding compressed copies
pub const COMPRESSED_DIR_NAME: &str = "compressed";

/// Directory (under the root) holding merged artifacts
pub const MERGED_DIR_NAME: &str = "merged";

/// Run log file name (under the root)
pub const LOG_FILE_NAME: &str = "merge_log.txt";

/// Combined artifact written after all batches
pub const COMBINED_FILE_NAME: &str = "all.pdf";

/// Suffix appended to the stem of compressed copies
pub const COMPRESSED_SUFFIX: &str = "_compressed";

/// Ghostscript binary looked up on PATH when none is given
#[cfg(windows)]
pub const DEFAULT_GS_BINARY: &str = "gswin64c";
#[cfg(not(windows))]
pub const DEFAULT_GS_BINARY: &str = "gs";
