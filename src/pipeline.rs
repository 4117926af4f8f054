//! The `compress`, `merge` and `run` commands.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::batch::{Batch, BatchBuilder, Item};
use crate::compress::{compress_or_original, compressed_file_name, Compressor};
use crate::config::defaults::COMBINED_FILE_NAME;
use crate::config::{OversizePolicy, Settings};
use crate::fsutil::reset_dir;
use crate::ledger::RunLog;
use crate::merge::merge_pdfs;
use crate::scan::{display_relative, find_pdfs, group_by_dir, DirGroup, ScanFilter};

const MB: f64 = 1_048_576.0;

#[derive(Debug, Default)]
pub struct CompressSummary {
    pub compressed: usize,
    /// Sources copied unchanged because compression failed
    pub failed: usize,
    /// Files written to the compressed tree
    pub outputs: Vec<PathBuf>,
}

#[derive(Debug, Default)]
pub struct MergeSummary {
    /// Batches planned, including ones that produced nothing
    pub batches: usize,
    /// Merged files in the order they were written
    pub artifacts: Vec<PathBuf>,
    /// Inputs that could not be read
    pub skipped: usize,
    pub combined: Option<PathBuf>,
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub compress: CompressSummary,
    pub merge: MergeSummary,
}

/// Compress every PDF under the root into a mirrored tree.
///
/// A source that fails to compress is copied as-is so later merging still
/// sees it.
pub fn run_compress(
    settings: &Settings,
    compressor: &dyn Compressor,
    log: &mut RunLog,
) -> Result<CompressSummary> {
    let mut summary = CompressSummary::default();

    reset_dir(&settings.compressed_dir)?;
    println!("Prepared {}", settings.compressed_dir.display());

    let filter = ScanFilter {
        exclude_dirs: vec![settings.compressed_dir.clone(), settings.merged_dir.clone()],
        skip_compressed: true,
        skip_artifacts: false,
    };
    let sources = find_pdfs(&settings.root, &filter)?;
    if sources.is_empty() {
        log::warn!("No PDF files found under {}", settings.root.display());
        return Ok(summary);
    }

    let root = fs::canonicalize(&settings.root)
        .with_context(|| format!("Cannot resolve {}", settings.root.display()))?;

    for item in &sources {
        let relative = display_relative(&item.path, &root);
        let out_dir = item
            .path
            .parent()
            .and_then(|p| p.strip_prefix(&root).ok())
            .map(|rel| settings.compressed_dir.join(rel))
            .unwrap_or_else(|| settings.compressed_dir.clone());
        if let Err(e) = fs::create_dir_all(&out_dir) {
            log::warn!("Failed to create {}: {}", out_dir.display(), e);
            log.write_failed(&out_dir.display().to_string(), &e.to_string());
            summary.failed += 1;
            continue;
        }
        let output = out_dir.join(compressed_file_name(&item.path));

        println!("Compressing {} ...", relative);
        match compressor.compress(&item.path, &output) {
            Ok(path) => {
                let new_size = fs::metadata(&path).map(|m| m.len()).unwrap_or(0);
                println!(
                    "Compressed {} ({:.2} MB -> {:.2} MB, {:.2}%)",
                    relative,
                    item.size as f64 / MB,
                    new_size as f64 / MB,
                    ratio(new_size, item.size) * 100.0
                );
                summary.compressed += 1;
                summary.outputs.push(path);
            }
            Err(e) => {
                println!("Failed to compress {}: {}", relative, e);
                log.compression_failed(&item.path, &e.to_string());
                summary.failed += 1;

                let fallback = out_dir.join(item.path.file_name().unwrap_or_default());
                match fs::copy(&item.path, &fallback) {
                    Ok(_) => summary.outputs.push(fallback),
                    Err(e) => {
                        log::warn!("Could not copy {} as fallback: {}", relative, e);
                        log.write_failed(&fallback.display().to_string(), &e.to_string());
                    }
                }
            }
        }
    }

    println!(
        "Compression done: {} compressed, {} failed",
        summary.compressed, summary.failed
    );
    Ok(summary)
}

fn ratio(new: u64, old: u64) -> f64 {
    if old == 0 {
        0.0
    } else {
        new as f64 / old as f64
    }
}

/// Batch the input tree directory by directory and merge each batch.
pub fn run_merge(
    settings: &Settings,
    compressor: &dyn Compressor,
    log: &mut RunLog,
) -> Result<MergeSummary> {
    reset_dir(&settings.merged_dir)?;
    println!("Prepared {}", settings.merged_dir.display());

    if !settings.merge_input.is_dir() {
        log::warn!("Nothing to merge: {} is not a directory", settings.merge_input.display());
        return Ok(MergeSummary::default());
    }

    let filter = ScanFilter {
        exclude_dirs: vec![settings.merged_dir.clone()],
        skip_compressed: false,
        skip_artifacts: true,
    };
    let items = find_pdfs(&settings.merge_input, &filter)?;
    let input_root = fs::canonicalize(&settings.merge_input)
        .with_context(|| format!("Cannot resolve {}", settings.merge_input.display()))?;

    let mut run = MergeRun {
        settings,
        compressor,
        log,
        input_root,
        next_artifact: 1,
        summary: MergeSummary::default(),
    };
    for group in group_by_dir(items) {
        run.merge_group(group);
    }
    run.write_combined();

    let summary = run.summary;
    println!(
        "Merge done: {} batches, {} files written, {} inputs skipped",
        summary.batches,
        summary.artifacts.len(),
        summary.skipped
    );
    Ok(summary)
}

/// `compress` followed by `merge`. Settings built for `run` point the merge
/// input at the compressed tree.
pub fn run_all(
    settings: &Settings,
    compressor: &dyn Compressor,
    log: &mut RunLog,
) -> Result<RunSummary> {
    let compress = run_compress(settings, compressor, log)?;
    let merge = run_merge(settings, compressor, log)?;
    Ok(RunSummary { compress, merge })
}

/// State of one merge pass. The artifact counter only advances when a file is
/// actually written.
struct MergeRun<'a> {
    settings: &'a Settings,
    compressor: &'a dyn Compressor,
    log: &'a mut RunLog,
    input_root: PathBuf,
    next_artifact: u32,
    summary: MergeSummary,
}

impl MergeRun<'_> {
    fn merge_group(&mut self, group: DirGroup) {
        let dir_label = display_relative(&group.dir, &self.input_root);
        log::info!("Batching {} files in {}", group.items.len(), dir_label);

        let (standalone, rest): (Vec<Item>, Vec<Item>) = match self.settings.oversize {
            OversizePolicy::Isolate => (Vec::new(), group.items),
            OversizePolicy::Precompress { max_item } => {
                group.items.into_iter().partition(|i| i.size > max_item)
            }
        };

        let mut seq = 1;
        if let OversizePolicy::Precompress { max_item } = self.settings.oversize {
            for item in standalone {
                self.emit_standalone(&item, seq, max_item, &dir_label);
                seq += 1;
            }
        }

        let mut builder = BatchBuilder::starting_at(self.settings.max_batch_bytes, seq);
        for item in rest {
            if let Some(batch) = builder.push(item) {
                self.emit_batch(&batch, &dir_label);
            }
        }
        if let Some(batch) = builder.finish() {
            self.emit_batch(&batch, &dir_label);
        }
    }

    fn artifact_path(&self) -> (String, PathBuf) {
        let name = format!("merged_{:02}.pdf", self.next_artifact);
        let path = self.settings.merged_dir.join(&name);
        (name, path)
    }

    /// Merge one batch. A batch that cannot be written is logged and skipped.
    fn emit_batch(&mut self, batch: &Batch, dir_label: &str) {
        self.summary.batches += 1;
        let origin = format!("{} {}", dir_label, batch.name());
        let (name, path) = self.artifact_path();

        let outcome = match merge_pdfs(&batch.paths(), &path) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("Skipping {}: {:#}", origin, e);
                self.log
                    .write_failed(&format!("{} ({})", name, origin), &format!("{:#}", e));
                return;
            }
        };
        for skipped in &outcome.skipped {
            self.log.skipped(&skipped.path, &skipped.reason);
        }
        self.summary.skipped += outcome.skipped.len();

        if !outcome.written {
            log::warn!("No readable PDFs in {}, nothing written", origin);
            return;
        }

        self.log.merged(&name, &origin, &outcome.included);
        println!(
            "Created {} from {} ({} files, {} pages, {:.2} MB)",
            name,
            origin,
            outcome.included.len(),
            outcome.pages,
            batch.total as f64 / MB
        );
        self.next_artifact += 1;
        self.summary.artifacts.push(path);
    }

    /// Compress an oversized item and emit it as its own artifact, unmerged.
    fn emit_standalone(&mut self, item: &Item, seq: u32, max_item: u64, dir_label: &str) {
        self.summary.batches += 1;
        let origin = format!("{} batch_{:02}", dir_label, seq);

        // The scratch directory must outlive the copy below.
        let scratch = tempfile::tempdir();
        let source = match &scratch {
            Ok(scratch) => {
                let (source, err) =
                    compress_or_original(self.compressor, &item.path, scratch.path());
                if let Some(e) = err {
                    self.log.compression_failed(&item.path, &e.to_string());
                }
                source
            }
            Err(e) => {
                log::warn!("No scratch directory for {}: {}", item.path.display(), e);
                self.log.compression_failed(&item.path, &e.to_string());
                item.path.clone()
            }
        };

        let size = fs::metadata(&source).map(|m| m.len()).unwrap_or(item.size);
        if size > max_item {
            log::warn!(
                "Still large: {} is {:.2} MB",
                source.display(),
                size as f64 / MB
            );
        }

        let (name, path) = self.artifact_path();
        if let Err(e) = fs::copy(&source, &path) {
            log::warn!("Failed to write {}: {}", path.display(), e);
            self.log
                .write_failed(&format!("{} ({})", name, origin), &e.to_string());
            return;
        }
        self.log.standalone(&name, &origin, &item.path);
        println!("Created {} from {} (single file, {:.2} MB)", name, origin, size as f64 / MB);

        self.next_artifact += 1;
        self.summary.artifacts.push(path);
    }

    fn write_combined(&mut self) {
        if !self.settings.combined || self.summary.artifacts.is_empty() {
            return;
        }

        let path = self.settings.merged_dir.join(COMBINED_FILE_NAME);
        let outcome = match merge_pdfs(&self.summary.artifacts, &path) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::warn!("Could not write {}: {:#}", COMBINED_FILE_NAME, e);
                self.log.write_failed(COMBINED_FILE_NAME, &format!("{:#}", e));
                return;
            }
        };
        for skipped in &outcome.skipped {
            self.log.skipped(&skipped.path, &skipped.reason);
        }

        if outcome.written {
            println!(
                "Combined {} files into {}",
                outcome.included.len(),
                COMBINED_FILE_NAME
            );
            self.log.note(&format!(
                "Combined PDF: {} ({} files)",
                COMBINED_FILE_NAME,
                outcome.included.len()
            ));
            self.summary.combined = Some(path);
        } else {
            log::warn!("Could not write {}", COMBINED_FILE_NAME);
        }
    }
}

