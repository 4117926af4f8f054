//! Source discovery.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use walkdir::WalkDir;

use crate::batch::Item;
use crate::config::defaults::{COMBINED_FILE_NAME, COMPRESSED_SUFFIX};

lazy_static! {
    /// Names this tool writes itself: `batch_01.pdf`, `merged_07.pdf`, `all.pdf`
    static ref ARTIFACT_NAME: Regex = Regex::new(&format!(
        r"^(?:(?:batch|merged)_\d+\.pdf|{})$",
        regex::escape(COMBINED_FILE_NAME)
    ))
    .expect("artifact pattern is valid");
}

/// Which PDFs a scan should pass over.
#[derive(Debug, Clone, Default)]
pub struct ScanFilter {
    /// Subtrees to prune
    pub exclude_dirs: Vec<PathBuf>,
    /// Skip files whose name contains `_compressed`
    pub skip_compressed: bool,
    /// Skip batch/merged/combined outputs
    pub skip_artifacts: bool,
}

impl ScanFilter {
    fn accepts(&self, name: &str) -> bool {
        if !is_pdf_name(name) {
            return false;
        }
        if self.skip_compressed && name.contains(COMPRESSED_SUFFIX) {
            return false;
        }
        !(self.skip_artifacts && is_artifact_name(name))
    }
}

pub fn is_pdf_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

pub fn is_artifact_name(name: &str) -> bool {
    ARTIFACT_NAME.is_match(name)
}

/// Items sharing a parent directory, in discovery order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirGroup {
    pub dir: PathBuf,
    pub items: Vec<Item>,
}

/// Resolve a path for comparison, keeping it as-is if it does not exist yet.
fn normalize(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Walk `root` and return matching PDFs, sorted by name at every level.
///
/// Unreadable entries are logged and skipped.
pub fn find_pdfs(root: &Path, filter: &ScanFilter) -> Result<Vec<Item>> {
    let root = std::fs::canonicalize(root)
        .with_context(|| format!("Cannot scan {}", root.display()))?;
    let excluded: Vec<PathBuf> = filter.exclude_dirs.iter().map(|p| normalize(p)).collect();

    let mut items = Vec::new();
    let walker = WalkDir::new(&root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !excluded.iter().any(|x| e.path() == x.as_path()));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !filter.accepts(&name) {
            log::debug!("Ignoring {}", entry.path().display());
            continue;
        }
        match entry.metadata() {
            Ok(meta) => items.push(Item::new(entry.path(), meta.len())),
            Err(e) => log::warn!("Cannot stat {}: {}", entry.path().display(), e),
        }
    }

    log::info!("Found {} PDF files under {}", items.len(), root.display());
    Ok(items)
}

/// Group items by parent directory, keeping first-seen directory order and
/// the item order within each directory.
pub fn group_by_dir(items: Vec<Item>) -> Vec<DirGroup> {
    let mut groups: Vec<DirGroup> = Vec::new();
    let mut index: HashMap<PathBuf, usize> = HashMap::new();

    for item in items {
        let dir = item
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let slot = *index.entry(dir.clone()).or_insert_with(|| {
            groups.push(DirGroup {
                dir,
                items: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].items.push(item);
    }
    groups
}

/// `path` relative to `base` for display, or the path itself.
pub fn display_relative(path: &Path, base: &Path) -> String {
    let base = normalize(base);
    path.strip_prefix(&base)
        .map(|p| {
            if p.as_os_str().is_empty() {
                ".".to_string()
            } else {
                p.display().to_string()
            }
        })
        .unwrap_or_else(|_| path.display().to_string())
}
