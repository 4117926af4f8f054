//! Size-bounded greedy batching.
//!
//! Items are grouped in their original order. An item joins the open batch
//! only while the running total stays strictly below the threshold; otherwise
//! the open batch is closed and the item starts the next one. An item that is
//! on its own at or above the threshold is never split and ends up alone.

use std::path::{Path, PathBuf};

/// A source file with its size in bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub path: PathBuf,
    pub size: u64,
}

impl Item {
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        Self {
            path: path.into(),
            size,
        }
    }

    /// Read the size from the filesystem.
    pub fn from_path(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let size = std::fs::metadata(&path)?.len();
        Ok(Self { path, size })
    }
}

/// A closed group of items and its 1-based sequence number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub seq: u32,
    pub items: Vec<Item>,
    pub total: u64,
}

impl Batch {
    /// External name, e.g. `batch_03`.
    pub fn name(&self) -> String {
        format!("batch_{:02}", self.seq)
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.items.iter().map(|i| i.path.clone()).collect()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.items.iter().any(|i| i.path == path)
    }
}

/// Incremental greedy batcher.
///
/// The sequence counter lives here rather than in any global, so separate
/// builders (one per directory, say) number their batches independently.
#[derive(Debug)]
pub struct BatchBuilder {
    threshold: u64,
    next_seq: u32,
    current: Vec<Item>,
    sum: u64,
}

impl BatchBuilder {
    pub fn new(threshold: u64) -> Self {
        Self::starting_at(threshold, 1)
    }

    /// Start numbering at `seq` instead of 1.
    pub fn starting_at(threshold: u64, seq: u32) -> Self {
        Self {
            threshold,
            next_seq: seq,
            current: Vec::new(),
            sum: 0,
        }
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    /// Sequence number the next closed batch will receive.
    pub fn next_seq(&self) -> u32 {
        self.next_seq
    }

    /// Add an item, returning the batch it closed, if any.
    pub fn push(&mut self, item: Item) -> Option<Batch> {
        if self.sum.saturating_add(item.size) < self.threshold {
            self.sum += item.size;
            self.current.push(item);
            return None;
        }

        let closed = self.close();
        self.sum = item.size;
        self.current.push(item);
        closed
    }

    /// Close the trailing batch.
    pub fn finish(mut self) -> Option<Batch> {
        self.close()
    }

    fn close(&mut self) -> Option<Batch> {
        if self.current.is_empty() {
            return None;
        }
        let batch = Batch {
            seq: self.next_seq,
            items: std::mem::take(&mut self.current),
            total: self.sum,
        };
        self.next_seq += 1;
        self.sum = 0;
        Some(batch)
    }
}

/// Partition `items` into batches in one pass.
pub fn plan<I>(items: I, threshold: u64) -> Vec<Batch>
where
    I: IntoIterator<Item = Item>,
{
    let mut builder = BatchBuilder::new(threshold);
    let mut batches: Vec<Batch> = items
        .into_iter()
        .filter_map(|item| builder.push(item))
        .collect();
    batches.extend(builder.finish());
    batches
}
