use std::path::{Path, PathBuf};
use std::process::Command;

use crate::cli::Preset;
use crate::error::CompressError;

use super::{check_output, discard, Compressor};

/// Runs Ghostscript's pdfwrite device over the input.
#[derive(Debug, Clone)]
pub struct Ghostscript {
    binary: PathBuf,
    preset: Preset,
}

impl Ghostscript {
    pub fn new(binary: impl Into<PathBuf>, preset: Preset) -> Self {
        Self {
            binary: binary.into(),
            preset,
        }
    }

    fn command(&self, input: &Path, output: &Path) -> Command {
        let mut output_arg = std::ffi::OsString::from("-sOutputFile=");
        output_arg.push(output);

        let mut cmd = Command::new(&self.binary);
        cmd.arg("-sDEVICE=pdfwrite")
            .arg("-dCompatibilityLevel=1.4")
            .arg(format!("-dPDFSETTINGS={}", self.preset.pdf_settings()))
            .arg("-dNOPAUSE")
            .arg("-dQUIET")
            .arg("-dBATCH")
            .arg(output_arg)
            .arg(input);
        cmd
    }

    fn run(&self, input: &Path, output: &Path) -> Result<PathBuf, CompressError> {
        let result = self
            .command(input, output)
            .output()
            .map_err(|source| CompressError::Spawn {
                binary: self.binary.display().to_string(),
                source,
            })?;

        if !result.status.success() {
            return Err(CompressError::ToolFailed {
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }

        check_output(output)?;
        Ok(output.to_path_buf())
    }
}

impl Compressor for Ghostscript {
    fn compress(&self, input: &Path, output: &Path) -> Result<PathBuf, CompressError> {
        log::debug!("{:?}", self.command(input, output));
        let result = self.run(input, output);
        if result.is_err() {
            discard(output);
        }
        result
    }

    fn name(&self) -> &str {
        "ghostscript"
    }
}
