//! Output files of a cleaning run.
//!
//! - `chunk_<n>.csv`: one snapshot per batch, written atomically.
//! - `cleaned_data.csv`: every batch appended in order, header once.
//! - `garbage.csv` / `duplicates.csv`: written once at the end, only when
//!   there is something to write.
//!
//! All files are UTF-8 with a BOM.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use csv::Writer;

use crate::config::{snapshot_path, PipelineConfig};
use crate::error::AppError;
use crate::normalize::UnwantedValues;
use crate::schema::{Column, Record, Schema};
use crate::streaming::atomic_writer::{csv_output_writer, AtomicCsvWriter};
use crate::streaming::chunk_reader::{open_csv, UTF8_BOM};

/// One row of the garbage file.
#[derive(Debug, Clone, PartialEq)]
pub enum GarbageEntry {
    /// Values of the unwanted columns for one source row.
    Unwanted(UnwantedValues),
    /// A full row whose email failed validation.
    InvalidEmail(Record),
}

/// Writer for the per-batch and cumulative cleaned outputs.
pub struct OutputWriter {
    output_dir: PathBuf,
    cleaned_path: PathBuf,
    cleaned: Writer<BufWriter<File>>,
    schema: Schema,
    cleaned_rows: u64,
}

impl OutputWriter {
    /// Creates the output directory and an empty cleaned-output file.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the directory or file cannot be created.
    pub fn create(config: &PipelineConfig, schema: Schema) -> Result<Self, AppError> {
        std::fs::create_dir_all(&config.output_dir).map_err(|e| {
            AppError::io(
                format!("Failed to create output directory {}", config.output_dir.display()),
                e,
            )
        })?;

        let cleaned_path = config.cleaned_path();
        let file = File::create(&cleaned_path)
            .map_err(|e| AppError::io(format!("Failed to create {}", cleaned_path.display()), e))?;
        let mut buf_writer = BufWriter::new(file);
        buf_writer
            .write_all(UTF8_BOM)
            .map_err(|e| AppError::io("Failed to write BOM", e))?;
        buf_writer
            .flush()
            .map_err(|e| AppError::io(format!("Failed to flush {}", cleaned_path.display()), e))?;

        Ok(Self {
            output_dir: config.output_dir.clone(),
            cleaned_path,
            cleaned: csv_output_writer(buf_writer),
            schema,
            cleaned_rows: 0,
        })
    }

    /// Writes the snapshot for batch `ordinal` and appends the same rows to
    /// the cleaned-output file. The header goes into the cleaned file only
    /// for ordinal 0.
    ///
    /// Returns the snapshot path.
    pub fn write_batch(&mut self, ordinal: u64, records: &[Record]) -> Result<PathBuf, AppError> {
        let header = self.schema.output_header();
        let rows: Vec<Vec<String>> = records.iter().map(|r| r.to_row(&self.schema)).collect();

        let mut snapshot = AtomicCsvWriter::create(snapshot_path(&self.output_dir, ordinal))?;
        snapshot.write_header(&header)?;
        for row in &rows {
            snapshot.write_row(row)?;
        }
        let snapshot_path = snapshot.finish()?;

        if ordinal == 0 {
            self.cleaned
                .write_record(&header)
                .map_err(|e| AppError::Csv(format!("Failed to write header: {}", e)))?;
        }
        for row in &rows {
            self.cleaned
                .write_record(row)
                .map_err(|e| AppError::Csv(format!("Failed to append row: {}", e)))?;
        }
        self.cleaned.flush().map_err(|e| {
            AppError::io(format!("Failed to flush {}", self.cleaned_path.display()), e)
        })?;
        self.cleaned_rows += rows.len() as u64;

        tracing::info!(
            snapshot = %snapshot_path.display(),
            cleaned = %self.cleaned_path.display(),
            batch = ordinal,
            rows = rows.len(),
            "Saved batch snapshot and appended to cleaned output"
        );

        Ok(snapshot_path)
    }

    /// Data rows appended so far.
    pub fn cleaned_rows(&self) -> u64 {
        self.cleaned_rows
    }

    /// Flushes the cleaned-output file and returns its path.
    pub fn finish(mut self) -> Result<PathBuf, AppError> {
        self.cleaned.flush().map_err(|e| {
            AppError::io(format!("Failed to flush {}", self.cleaned_path.display()), e)
        })?;
        Ok(self.cleaned_path)
    }
}

/// Writes the garbage file. Returns `None` (and creates nothing) when
/// `entries` is empty.
///
/// The header is the union of the entries' columns in order of first
/// appearance: unwanted rows carry `configuration, postal_code`, invalid
/// email rows carry the output columns. Cells an entry does not hold are
/// left empty.
pub fn write_garbage(
    path: &Path,
    entries: &[GarbageEntry],
    schema: &Schema,
) -> Result<Option<PathBuf>, AppError> {
    if entries.is_empty() {
        return Ok(None);
    }

    let unwanted_labels: Vec<String> = Column::UNWANTED
        .iter()
        .map(|c| c.canonical().to_string())
        .collect();
    let record_labels = schema.output_header();

    let mut header: Vec<String> = Vec::new();
    let mut seen_unwanted = false;
    let mut seen_record = false;
    for entry in entries {
        let labels = match entry {
            GarbageEntry::Unwanted(_) if !seen_unwanted => {
                seen_unwanted = true;
                &unwanted_labels
            }
            GarbageEntry::InvalidEmail(_) if !seen_record => {
                seen_record = true;
                &record_labels
            }
            _ => continue,
        };
        for label in labels {
            if !header.contains(label) {
                header.push(label.clone());
            }
        }
        if seen_unwanted && seen_record {
            break;
        }
    }

    let position = |label: &String| header.iter().position(|h| h == label);
    let unwanted_idx: Vec<Option<usize>> = unwanted_labels.iter().map(position).collect();
    let record_idx: Vec<Option<usize>> = record_labels.iter().map(position).collect();

    let mut writer = AtomicCsvWriter::create(path)?;
    writer.write_header(&header)?;
    for entry in entries {
        let mut row = vec![String::new(); header.len()];
        match entry {
            GarbageEntry::Unwanted(values) => {
                let cells = [&values.configuration, &values.postal_code];
                for (idx, cell) in unwanted_idx.iter().zip(cells) {
                    if let (Some(i), Some(value)) = (idx, cell) {
                        row[*i] = value.clone();
                    }
                }
            }
            GarbageEntry::InvalidEmail(record) => {
                for (idx, value) in record_idx.iter().zip(record.to_row(schema)) {
                    if let Some(i) = idx {
                        row[*i] = value;
                    }
                }
            }
        }
        writer.write_row(&row)?;
    }
    let rows = writer.rows_written();
    let path = writer.finish()?;

    tracing::info!(path = %path.display(), rows, "Saved garbage file");
    Ok(Some(path))
}

/// Writes the duplicate file. Returns `None` (and creates nothing) when
/// `records` is empty.
pub fn write_duplicates(
    path: &Path,
    records: &[Record],
    schema: &Schema,
) -> Result<Option<PathBuf>, AppError> {
    if records.is_empty() {
        return Ok(None);
    }

    let mut writer = AtomicCsvWriter::create(path)?;
    writer.write_header(schema.output_header())?;
    for record in records {
        writer.write_row(record.to_row(schema))?;
    }
    let rows = writer.rows_written();
    let path = writer.finish()?;

    tracing::info!(path = %path.display(), rows, "Saved duplicates file");
    Ok(Some(path))
}

/// Counts the data rows of a written output file (header excluded).
pub fn count_data_rows(path: &Path) -> Result<u64, AppError> {
    let mut reader = open_csv(path)?;
    let mut record = csv::ByteRecord::new();
    let mut rows: u64 = 0;
    while reader
        .read_byte_record(&mut record)
        .map_err(|e| AppError::csv_read("Failed to re-read cleaned output", e))?
    {
        rows += 1;
    }
    Ok(rows)
}
