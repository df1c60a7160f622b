//! End-to-end cleaning run.
//!
//! Drives the source check, the batch reader, the normalizer, the row
//! filter and the output writer in order. Garbage and duplicate rows are
//! buffered for the whole run and written once after the last batch.

use std::path::PathBuf;

use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::AppError;
use crate::normalize::ColumnNormalizer;
use crate::schema::Record;
use crate::streaming::{
    count_data_rows, write_duplicates, write_garbage, Batch, ChunkReader, GarbageEntry,
    OutputWriter,
};
use crate::validation::{inspect_source, partition};

/// What a completed run produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub batches: u64,
    pub rows_per_batch: u64,
    /// Data rows read from the source.
    pub rows_read: u64,
    pub invalid_emails: u64,
    /// Rows written to the duplicate file (every group member).
    pub duplicates: u64,
    /// Rows left out of the cleaned output by deduplication.
    pub dropped: u64,
    /// Rows written to the garbage file.
    pub garbage_rows: u64,
    /// Data rows counted by re-reading the cleaned output.
    pub cleaned_rows: u64,
    pub cleaned_path: PathBuf,
    pub garbage_path: Option<PathBuf>,
    pub duplicates_path: Option<PathBuf>,
    pub snapshot_paths: Vec<PathBuf>,
}

/// One cleaning run over a single source file.
pub struct Pipeline {
    config: PipelineConfig,
    garbage: Vec<GarbageEntry>,
    duplicates: Vec<Record>,
    snapshot_paths: Vec<PathBuf>,
    rows_read: u64,
    invalid_emails: u64,
    dropped: u64,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            garbage: Vec::new(),
            duplicates: Vec::new(),
            snapshot_paths: Vec::new(),
            rows_read: 0,
            invalid_emails: 0,
            dropped: 0,
        }
    }

    /// Runs every stage to completion.
    ///
    /// Batches already written stay on disk when a later batch fails; the
    /// garbage and duplicate files are only written after the last batch.
    ///
    /// # Errors
    ///
    /// `AppError::Io` for unreadable input or unwritable output,
    /// `AppError::Format` for a malformed source, `AppError::Csv` for
    /// encoding failures while writing.
    pub fn run(mut self) -> Result<RunSummary, AppError> {
        let source = self.config.source.clone();
        info!(source = %source.display(), "Starting cleaning run");

        let report = inspect_source(&source)?;
        for warning in &report.warnings {
            warn!(source = %source.display(), ?warning, "Source check warning");
        }

        let reader = ChunkReader::open(&source, &self.config.chunk)?;
        let rows_per_batch = reader.rows_per_batch();
        let estimated_batches = report
            .stats
            .estimated_total_rows
            .map(|rows| rows.div_ceil(rows_per_batch));
        info!(
            rows_per_batch,
            estimated_batches = ?estimated_batches,
            mean_row_bytes = reader.mean_row_bytes(),
            "Splitting source into batches"
        );

        let normalizer = ColumnNormalizer::new(reader.schema().clone());
        let mut output = OutputWriter::create(&self.config, normalizer.schema().clone())?;

        for batch in reader {
            self.process_batch(batch?, &normalizer, &mut output)?;
        }

        let written_rows = output.cleaned_rows();
        let cleaned_path = output.finish()?;
        let schema = normalizer.schema();

        let garbage_path = write_garbage(&self.config.garbage_path(), &self.garbage, schema)?;
        if garbage_path.is_none() {
            info!("No unwanted columns or invalid emails; garbage file not created");
        }
        let duplicates_path =
            write_duplicates(&self.config.duplicates_path(), &self.duplicates, schema)?;
        if duplicates_path.is_none() {
            info!("No duplicate owners; duplicates file not created");
        }

        let cleaned_rows = count_data_rows(&cleaned_path)?;
        if cleaned_rows != written_rows {
            return Err(AppError::Internal(format!(
                "{} holds {} rows but {} were appended",
                cleaned_path.display(),
                cleaned_rows,
                written_rows
            )));
        }
        info!(
            cleaned = %cleaned_path.display(),
            rows = cleaned_rows,
            "Verified cleaned output"
        );

        Ok(RunSummary {
            batches: self.snapshot_paths.len() as u64,
            rows_per_batch,
            rows_read: self.rows_read,
            invalid_emails: self.invalid_emails,
            duplicates: self.duplicates.len() as u64,
            dropped: self.dropped,
            garbage_rows: self.garbage.len() as u64,
            cleaned_rows,
            cleaned_path,
            garbage_path,
            duplicates_path,
            snapshot_paths: self.snapshot_paths,
        })
    }

    fn process_batch(
        &mut self,
        batch: Batch,
        normalizer: &ColumnNormalizer,
        output: &mut OutputWriter,
    ) -> Result<(), AppError> {
        self.rows_read += batch.len() as u64;

        let (normalized, unwanted) = normalizer.normalize(batch);
        self.garbage
            .extend(unwanted.into_iter().map(GarbageEntry::Unwanted));

        let split = partition(normalized, normalizer.schema());
        if !split.invalid_email.is_empty() {
            info!(
                batch = split.ordinal,
                count = split.invalid_email.len(),
                "Found invalid emails"
            );
        }
        self.invalid_emails += split.invalid_email.len() as u64;
        self.dropped += split.dropped() as u64;
        self.garbage
            .extend(split.invalid_email.into_iter().map(GarbageEntry::InvalidEmail));
        self.duplicates.extend(split.duplicates);

        let snapshot = output.write_batch(split.ordinal, &split.retained)?;
        self.snapshot_paths.push(snapshot);
        Ok(())
    }
}

/// Runs a cleaning pass on the blocking thread pool.
pub async fn run_pipeline(config: PipelineConfig) -> Result<RunSummary, AppError> {
    tokio::task::spawn_blocking(move || Pipeline::new(config).run())
        .await
        .map_err(|e| AppError::Internal(format!("Cleaning task join error: {}", e)))?
}
