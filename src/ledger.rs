//! Append-only run log.
//!
//! Records which sources went into which merged file, plus skips and
//! compression failures. Write failures are reported through `log` and never
//! stop a run.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct RunLog {
    path: PathBuf,
    file: Option<File>,
}

impl RunLog {
    /// Open (or create) the log at `path` and start a new run section.
    pub fn open(path: &Path, command: &str) -> Self {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| log::warn!("Cannot open run log {}: {}", path.display(), e))
            .ok();

        let mut run_log = Self {
            path: path.to_path_buf(),
            file,
        };
        run_log.write_lines(&[String::new(), format!("--- New Run: {} ---", command)]);
        run_log
    }

    /// A log that records nothing.
    pub fn disabled() -> Self {
        Self {
            path: PathBuf::new(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a merged artifact and its constituents.
    pub fn merged(&mut self, artifact: &str, origin: &str, members: &[PathBuf]) {
        let mut lines = vec![
            format!("Merged PDF: {} ({})", artifact, origin),
            "Contains:".to_string(),
        ];
        lines.extend(members.iter().map(|m| format!("  - {}", file_name(m))));
        lines.push(String::new());
        self.write_lines(&lines);
    }

    /// Record an oversized item emitted on its own.
    pub fn standalone(&mut self, artifact: &str, origin: &str, source: &Path) {
        self.write_lines(&[
            format!("Standalone PDF: {} ({})", artifact, origin),
            format!("  - {}", file_name(source)),
            String::new(),
        ]);
    }

    pub fn skipped(&mut self, path: &Path, reason: &str) {
        self.write_lines(&[format!("Skip error in merge: {} - {}", path.display(), reason)]);
    }

    pub fn compression_failed(&mut self, path: &Path, reason: &str) {
        self.write_lines(&[format!("Compression failed: {} - {}", path.display(), reason)]);
    }

    /// Record an output that could not be written.
    pub fn write_failed(&mut self, target: &str, reason: &str) {
        self.write_lines(&[format!("Write failed: {} - {}", target, reason)]);
    }

    pub fn note(&mut self, line: &str) {
        self.write_lines(&[line.to_string()]);
    }

    fn write_lines(&mut self, lines: &[String]) {
        let Some(file) = self.file.as_mut() else {
            return;
        };
        let result = lines.iter().try_for_each(|line| writeln!(file, "{}", line));
        if let Err(e) = result {
            log::warn!("Cannot write run log {}: {}", self.path.display(), e);
            self.file = None;
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
