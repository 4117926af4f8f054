use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use walkdir::WalkDir;

/// Clear `dir` and create it again.
///
/// Removal that fails even after clearing read-only flags is reported and the
/// run carries on with whatever was left behind. Only failing to create the
/// directory is an error.
pub fn reset_dir(dir: &Path) -> Result<()> {
    if dir.exists() {
        match force_remove_dir(dir) {
            Ok(()) => log::info!("Removed old {}", dir.display()),
            Err(e) => log::warn!("Could not fully remove {}: {}", dir.display(), e),
        }
    }
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    Ok(())
}

/// `remove_dir_all`, retried once after making every entry writable.
pub fn force_remove_dir(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            log::debug!("Permission denied removing {}, clearing read-only flags", dir.display());
            make_writable(dir);
            fs::remove_dir_all(dir)
        }
        Err(e) => Err(e),
    }
}

#[allow(clippy::permissions_set_readonly_false)]
fn make_writable(dir: &Path) {
    for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        let Ok(meta) = fs::symlink_metadata(path) else {
            continue;
        };
        if meta.file_type().is_symlink() {
            continue;
        }
        let mut perms = meta.permissions();
        if perms.readonly() {
            perms.set_readonly(false);
            if let Err(e) = fs::set_permissions(path, perms) {
                log::warn!("Cannot make {} writable: {}", path.display(), e);
            }
        }
    }
}
