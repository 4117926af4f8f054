//! PDF compression backends.
//!
//! Everything that shrinks a PDF goes through [`Compressor`], so the batching
//! and merge pipelines never depend on a particular tool being installed.

mod ghostscript;
mod images;

use std::path::{Path, PathBuf};

use crate::cli::Engine;
use crate::config::defaults::{COMPRESSED_SUFFIX, MIN_COMPRESSED_BYTES};
use crate::config::EngineSettings;
use crate::error::CompressError;

pub use ghostscript::Ghostscript;
pub use images::{recompress_images, ImageRecompressor};

pub trait Compressor {
    /// Write a compressed copy of `input` to `output` and return its path.
    ///
    /// On failure nothing is left at `output`.
    fn compress(&self, input: &Path, output: &Path) -> Result<PathBuf, CompressError>;

    /// Short label for log lines.
    fn name(&self) -> &str;
}

impl<C: Compressor + ?Sized> Compressor for Box<C> {
    fn compress(&self, input: &Path, output: &Path) -> Result<PathBuf, CompressError> {
        (**self).compress(input, output)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Build the backend selected in settings.
pub fn from_settings(settings: &EngineSettings) -> Box<dyn Compressor> {
    match settings.engine {
        Engine::Gs => Box::new(Ghostscript::new(&settings.gs_binary, settings.preset)),
        Engine::Native => Box::new(ImageRecompressor::new(settings.quality, settings.max_dim)),
    }
}

/// `report.pdf` -> `report_compressed.pdf`
pub fn compressed_file_name(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    PathBuf::from(format!("{}{}.pdf", stem, COMPRESSED_SUFFIX))
}

/// Compress into `out_dir` and fall back to the input itself on failure.
///
/// The error, if any, is handed back alongside so callers can record it.
pub fn compress_or_original(
    compressor: &dyn Compressor,
    input: &Path,
    out_dir: &Path,
) -> (PathBuf, Option<CompressError>) {
    let output = out_dir.join(compressed_file_name(input));
    match compressor.compress(input, &output) {
        Ok(path) => (path, None),
        Err(e) => {
            log::warn!(
                "Failed to compress {} with {}: {}",
                input.display(),
                compressor.name(),
                e
            );
            (input.to_path_buf(), Some(e))
        }
    }
}

/// A backend's output only counts when it exists and is larger than
/// `MIN_COMPRESSED_BYTES`.
pub(crate) fn check_output(output: &Path) -> Result<(), CompressError> {
    let size = std::fs::metadata(output).map(|m| m.len()).unwrap_or(0);
    if size <= MIN_COMPRESSED_BYTES {
        return Err(CompressError::OutputTooSmall {
            path: output.to_path_buf(),
            size,
        });
    }
    Ok(())
}

/// Remove a partial output, ignoring a file that was never created.
pub(crate) fn discard(output: &Path) {
    match std::fs::remove_file(output) {
        Ok(()) => log::debug!("Removed partial output {}", output.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Could not remove {}: {}", output.display(), e),
    }
}
