mod common;

use std::fs;
use std::path::Path;

use pdf_batcher::config::{OversizePolicy, Settings};
use pdf_batcher::{run_all, run_compress, run_merge, RunLog};

use common::{
    file_names, page_count, write_garbage, write_pdf, Copying, Failing, Obstructing, Shrinking,
};

fn settings_for(root: &Path, max_batch_bytes: u64) -> Settings {
    let mut settings = Settings::for_root(root);
    settings.max_batch_bytes = max_batch_bytes;
    settings
}

#[test]
fn test_merge_groups_by_size() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let input = root.join("compressed");
    for name in ["a", "b", "c", "d"] {
        write_pdf(&input.join(format!("{}.pdf", name)), &[name], 10_000);
    }

    let settings = settings_for(root, 25_000);
    let mut log = RunLog::open(&settings.log_path, "merge");
    let summary = run_merge(&settings, &Copying, &mut log).unwrap();

    assert_eq!(summary.batches, 2);
    assert_eq!(summary.skipped, 0);
    assert_eq!(
        file_names(&settings.merged_dir),
        vec!["all.pdf", "merged_01.pdf", "merged_02.pdf"]
    );
    assert_eq!(page_count(&settings.merged_dir.join("merged_01.pdf")), 2);
    assert_eq!(page_count(&settings.merged_dir.join("merged_02.pdf")), 2);
    assert_eq!(page_count(&settings.merged_dir.join("all.pdf")), 4);

    let text = fs::read_to_string(&settings.log_path).unwrap();
    assert!(text.contains("--- New Run: merge ---"));
    assert!(text.contains(
        "Merged PDF: merged_01.pdf (. batch_01)\nContains:\n  - a.pdf\n  - b.pdf\n"
    ));
    assert!(text.contains(
        "Merged PDF: merged_02.pdf (. batch_02)\nContains:\n  - c.pdf\n  - d.pdf\n"
    ));
    assert!(text.contains("Combined PDF: all.pdf (2 files)"));
}

#[test]
fn test_unreadable_batch_produces_nothing_and_run_continues() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let input = root.join("compressed");
    write_garbage(&input.join("a.pdf"), 20_000);
    write_garbage(&input.join("b.pdf"), 20_000);
    write_pdf(&input.join("c.pdf"), &["c"], 20_000);

    let settings = settings_for(root, 50_000);
    let mut log = RunLog::open(&settings.log_path, "merge");
    let summary = run_merge(&settings, &Copying, &mut log).unwrap();

    assert_eq!(summary.batches, 2);
    assert_eq!(summary.skipped, 2);
    assert_eq!(summary.artifacts, vec![settings.merged_dir.join("merged_01.pdf")]);
    assert_eq!(page_count(&settings.merged_dir.join("merged_01.pdf")), 1);

    let text = fs::read_to_string(&settings.log_path).unwrap();
    assert_eq!(text.matches("Skip error in merge:").count(), 2);
    assert!(text.contains("Merged PDF: merged_01.pdf (. batch_02)"));
}

#[test]
fn test_empty_input_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join("compressed")).unwrap();

    let settings = settings_for(root, 25_000);
    let summary = run_merge(&settings, &Copying, &mut RunLog::disabled()).unwrap();

    assert_eq!(summary.batches, 0);
    assert!(summary.artifacts.is_empty());
    assert!(summary.combined.is_none());
    assert!(file_names(&settings.merged_dir).is_empty());
}

#[test]
fn test_missing_input_is_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings_for(dir.path(), 25_000);

    let summary = run_merge(&settings, &Copying, &mut RunLog::disabled()).unwrap();
    assert!(summary.artifacts.is_empty());
    assert!(settings.merged_dir.is_dir());
}

#[test]
fn test_directories_are_batched_separately() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let input = root.join("compressed");
    write_pdf(&input.join("x/a.pdf"), &["a"], 0);
    write_pdf(&input.join("y/b.pdf"), &["b"], 0);

    let mut settings = settings_for(root, 1_000_000);
    settings.combined = false;
    let mut log = RunLog::open(&settings.log_path, "merge");
    let summary = run_merge(&settings, &Copying, &mut log).unwrap();

    assert_eq!(summary.artifacts.len(), 2);
    assert!(summary.combined.is_none());
    assert_eq!(
        file_names(&settings.merged_dir),
        vec!["merged_01.pdf", "merged_02.pdf"]
    );

    let text = fs::read_to_string(&settings.log_path).unwrap();
    assert!(text.contains("merged_01.pdf (x batch_01)"));
    assert!(text.contains("merged_02.pdf (y batch_01)"));
}

#[test]
fn test_single_oversized_item_is_alone() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let input = root.join("compressed");
    write_pdf(&input.join("a.pdf"), &["a"], 0);
    write_pdf(&input.join("b.pdf"), &["b1", "b2"], 40_000);
    write_pdf(&input.join("c.pdf"), &["c"], 0);

    let settings = settings_for(root, 25_000);
    let summary = run_merge(&settings, &Copying, &mut RunLog::disabled()).unwrap();

    assert_eq!(summary.artifacts.len(), 3);
    assert_eq!(page_count(&settings.merged_dir.join("merged_02.pdf")), 2);
}

#[test]
fn test_precompress_emits_oversized_items_first() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let input = root.join("compressed");
    write_pdf(&input.join("a.pdf"), &["a"], 0);
    let big = write_pdf(&input.join("big.pdf"), &["big"], 40_000);
    write_pdf(&input.join("c.pdf"), &["c"], 0);

    let mut settings = settings_for(root, 25_000);
    settings.oversize = OversizePolicy::Precompress { max_item: 30_000 };
    let mut log = RunLog::open(&settings.log_path, "merge");
    let summary = run_merge(&settings, &Shrinking, &mut log).unwrap();

    assert_eq!(summary.batches, 2);
    let standalone = settings.merged_dir.join("merged_01.pdf");
    assert!(fs::metadata(&standalone).unwrap().len() < 30_000);
    assert_eq!(page_count(&settings.merged_dir.join("merged_02.pdf")), 2);

    let text = fs::read_to_string(&settings.log_path).unwrap();
    assert!(text.contains("Standalone PDF: merged_01.pdf (. batch_01)\n  - big.pdf"));
    assert!(text.contains("Merged PDF: merged_02.pdf (. batch_02)"));

    // The source tree is left untouched.
    assert!(big.exists());
    assert!(!input.join("big_compressed.pdf").exists());
}

#[test]
fn test_precompress_failure_falls_back_to_original() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let input = root.join("compressed");
    write_pdf(&input.join("big.pdf"), &["big"], 40_000);

    let mut settings = settings_for(root, 25_000);
    settings.oversize = OversizePolicy::Precompress { max_item: 30_000 };
    let mut log = RunLog::open(&settings.log_path, "merge");
    let summary = run_merge(&settings, &Failing, &mut log).unwrap();

    assert_eq!(summary.artifacts.len(), 1);
    let copied = settings.merged_dir.join("merged_01.pdf");
    assert_eq!(
        fs::read(&copied).unwrap(),
        fs::read(input.join("big.pdf")).unwrap()
    );

    let text = fs::read_to_string(&settings.log_path).unwrap();
    assert!(text.contains("Compression failed:"));
}

#[test]
fn test_failed_standalone_write_does_not_stop_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let input = root.join("compressed");
    write_pdf(&input.join("a.pdf"), &["a"], 0);
    write_pdf(&input.join("big1.pdf"), &["big1"], 40_000);
    write_pdf(&input.join("big2.pdf"), &["big2"], 40_000);

    let mut settings = settings_for(root, 25_000);
    settings.oversize = OversizePolicy::Precompress { max_item: 30_000 };
    let blocked = Obstructing::new(settings.merged_dir.join("merged_01.pdf"), true);
    let mut log = RunLog::open(&settings.log_path, "merge");
    let summary = run_merge(&settings, &blocked, &mut log).unwrap();

    assert_eq!(summary.batches, 3);
    assert_eq!(
        summary.artifacts,
        vec![
            settings.merged_dir.join("merged_01.pdf"),
            settings.merged_dir.join("merged_02.pdf"),
        ]
    );
    assert!(summary.combined.is_some());
    assert_eq!(page_count(&settings.merged_dir.join("merged_02.pdf")), 1);

    let text = fs::read_to_string(&settings.log_path).unwrap();
    assert!(text.contains("Write failed: merged_01.pdf (. batch_01)"));
    assert!(text.contains("Standalone PDF: merged_01.pdf (. batch_02)\n  - big2.pdf"));
    assert!(text.contains("Merged PDF: merged_02.pdf (. batch_03)"));
}

#[test]
fn test_failed_batch_write_does_not_stop_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let input = root.join("compressed");
    write_pdf(&input.join("a.pdf"), &["a"], 0);
    write_pdf(&input.join("big.pdf"), &["big"], 40_000);

    let mut settings = settings_for(root, 25_000);
    settings.oversize = OversizePolicy::Precompress { max_item: 30_000 };
    let blocked = Obstructing::new(settings.merged_dir.join("merged_01.pdf"), false);
    let mut log = RunLog::open(&settings.log_path, "merge");
    let summary = run_merge(&settings, &blocked, &mut log).unwrap();

    assert_eq!(summary.batches, 2);
    assert!(summary.artifacts.is_empty());
    assert!(summary.combined.is_none());

    let text = fs::read_to_string(&settings.log_path).unwrap();
    assert_eq!(text.matches("Write failed:").count(), 2);
    assert!(text.contains("Write failed: merged_01.pdf (. batch_02)"));
}

#[test]
fn test_stale_output_is_cleared() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_pdf(&root.join("compressed/a.pdf"), &["a"], 0);
    fs::create_dir_all(root.join("merged")).unwrap();
    fs::write(root.join("merged/merged_09.pdf"), b"stale").unwrap();

    let settings = settings_for(root, 25_000);
    run_merge(&settings, &Copying, &mut RunLog::disabled()).unwrap();

    assert_eq!(
        file_names(&settings.merged_dir),
        vec!["all.pdf", "merged_01.pdf"]
    );
}

#[test]
fn test_compress_mirrors_tree() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_pdf(&root.join("a.pdf"), &["a"], 5_000);
    write_pdf(&root.join("sub/b.pdf"), &["b"], 5_000);
    write_pdf(&root.join("old_compressed.pdf"), &["old"], 0);

    let settings = Settings::for_root(root);
    let summary = run_compress(&settings, &Shrinking, &mut RunLog::disabled()).unwrap();

    assert_eq!(summary.compressed, 2);
    assert_eq!(summary.failed, 0);
    assert!(settings.compressed_dir.join("a_compressed.pdf").is_file());
    assert!(settings.compressed_dir.join("sub/b_compressed.pdf").is_file());
    assert!(!settings.compressed_dir.join("old_compressed_compressed.pdf").exists());
}

#[test]
fn test_compress_failure_copies_original() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_pdf(&root.join("a.pdf"), &["a"], 0);

    let settings = Settings::for_root(root);
    let mut log = RunLog::open(&settings.log_path, "compress");
    let summary = run_compress(&settings, &Failing, &mut log).unwrap();

    assert_eq!(summary.compressed, 0);
    assert_eq!(summary.failed, 1);
    assert!(settings.compressed_dir.join("a.pdf").is_file());
    assert!(!settings.compressed_dir.join("a_compressed.pdf").exists());

    let text = fs::read_to_string(&settings.log_path).unwrap();
    assert!(text.contains("Compression failed:"));
}

#[test]
fn test_run_compresses_then_merges() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_pdf(&root.join("a.pdf"), &["a"], 0);
    write_pdf(&root.join("b.pdf"), &["b"], 0);
    write_pdf(&root.join("sub/c.pdf"), &["c"], 0);

    let settings = Settings::for_root(root);
    let mut log = RunLog::open(&settings.log_path, "run");
    let summary = run_all(&settings, &Shrinking, &mut log).unwrap();

    assert_eq!(summary.compress.compressed, 3);
    assert_eq!(summary.merge.artifacts.len(), 2);
    assert_eq!(page_count(&settings.merged_dir.join("merged_01.pdf")), 2);
    assert_eq!(page_count(&settings.merged_dir.join("merged_02.pdf")), 1);
    assert_eq!(page_count(&settings.merged_dir.join("all.pdf")), 3);

    // A second run starts from clean output directories.
    let again = run_all(&settings, &Shrinking, &mut log).unwrap();
    assert_eq!(again.compress.compressed, 3);
    assert_eq!(again.merge.artifacts.len(), 2);
}
