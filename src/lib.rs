pub mod batch;
pub mod cli;
pub mod compress;
pub mod config;
pub mod error;
pub mod fsutil;
pub mod ledger;
pub mod merge;
pub mod pipeline;
pub mod scan;

#[cfg(test)]
mod testutil;

pub use batch::{plan, Batch, BatchBuilder, Item};
pub use compress::Compressor;
pub use config::Settings;
pub use error::{CompressError, ConfigError};
pub use ledger::RunLog;
pub use merge::{merge_pdfs, MergeOutcome};
pub use pipeline::{run_all, run_compress, run_merge};
