//! Run configuration.
//!
//! Everything is fixed by the binary at start-up; there is no flag or file
//! based configuration.

use std::path::{Path, PathBuf};

use crate::streaming::ChunkConfig;

/// Name of the cumulative cleaned-output file.
pub const CLEANED_FILE_NAME: &str = "cleaned_data.csv";
/// Name of the garbage file (unwanted columns and invalid-email rows).
pub const GARBAGE_FILE_NAME: &str = "garbage.csv";
/// Name of the duplicate-owner file.
pub const DUPLICATES_FILE_NAME: &str = "duplicates.csv";

/// Configuration for one cleaning run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Source CSV file.
    pub source: PathBuf,
    /// Directory receiving every output file. Created if missing.
    pub output_dir: PathBuf,
    /// Batch sizing.
    pub chunk: ChunkConfig,
}

impl PipelineConfig {
    /// Creates a config with the default 100 MiB batch budget.
    pub fn new(source: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            output_dir: output_dir.into(),
            chunk: ChunkConfig::default(),
        }
    }

    /// Replaces the batch sizing.
    pub fn chunk(mut self, chunk: ChunkConfig) -> Self {
        self.chunk = chunk;
        self
    }

    pub fn cleaned_path(&self) -> PathBuf {
        self.output_dir.join(CLEANED_FILE_NAME)
    }

    pub fn garbage_path(&self) -> PathBuf {
        self.output_dir.join(GARBAGE_FILE_NAME)
    }

    pub fn duplicates_path(&self) -> PathBuf {
        self.output_dir.join(DUPLICATES_FILE_NAME)
    }

    /// Snapshot file for one batch, `chunk_<ordinal>.csv`.
    pub fn snapshot_path(&self, ordinal: u64) -> PathBuf {
        snapshot_path(&self.output_dir, ordinal)
    }
}

pub(crate) fn snapshot_path(output_dir: &Path, ordinal: u64) -> PathBuf {
    output_dir.join(format!("chunk_{}.csv", ordinal))
}
