//! Atomic CSV file writer with automatic cleanup on failure.
//!
//! Output files are written to a temporary file in the destination directory
//! and moved over the destination on `finish()`, so a snapshot or side file
//! is either complete or absent. Dropping the writer early removes the
//! temporary file.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use csv::{Terminator, Writer, WriterBuilder};
use tempfile::NamedTempFile;

use crate::error::AppError;
use crate::streaming::chunk_reader::UTF8_BOM;

/// Builds the CSV writer shared by every output file: `,` delimiter, `\n`
/// terminator, minimal quoting.
pub(crate) fn csv_output_writer<W: Write>(inner: W) -> Writer<W> {
    WriterBuilder::new()
        .has_headers(false)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(inner)
}

/// An atomic, BOM-prefixed CSV writer.
pub struct AtomicCsvWriter {
    writer: Writer<BufWriter<NamedTempFile>>,
    final_path: PathBuf,
    rows_written: u64,
}

impl AtomicCsvWriter {
    /// Creates a writer targeting `final_path` and writes the UTF-8 BOM.
    ///
    /// The temporary file lives next to `final_path` so the final rename
    /// stays on one filesystem.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the parent directory cannot be determined
    /// or the temporary file cannot be created.
    pub fn create(final_path: impl AsRef<Path>) -> Result<Self, AppError> {
        let final_path = final_path.as_ref().to_path_buf();

        let parent_dir = final_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        if final_path.file_name().is_none() {
            return Err(AppError::io(
                format!("Cannot write to {}", final_path.display()),
                std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no file name"),
            ));
        }

        let temp_file = NamedTempFile::new_in(parent_dir).map_err(|e| {
            AppError::io(
                format!("Failed to create temporary file in {}", parent_dir.display()),
                e,
            )
        })?;

        let mut buf_writer = BufWriter::new(temp_file);
        buf_writer
            .write_all(UTF8_BOM)
            .map_err(|e| AppError::io("Failed to write BOM", e))?;

        Ok(Self {
            writer: csv_output_writer(buf_writer),
            final_path,
            rows_written: 0,
        })
    }

    /// Writes the header row. Not counted in `rows_written`.
    pub fn write_header<I, T>(&mut self, header: I) -> Result<(), AppError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.writer
            .write_record(header)
            .map_err(|e| AppError::Csv(format!("Failed to write header: {}", e)))
    }

    /// Writes one data row.
    pub fn write_row<I, T>(&mut self, row: I) -> Result<(), AppError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        self.writer
            .write_record(row)
            .map_err(|e| AppError::Csv(format!("Failed to write row: {}", e)))?;
        self.rows_written += 1;
        Ok(())
    }

    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }

    /// Flushes all buffers and atomically replaces the destination.
    ///
    /// Returns the final path. On error the temporary file is removed.
    pub fn finish(self) -> Result<PathBuf, AppError> {
        let buf_writer = self.writer.into_inner().map_err(|e| {
            AppError::Csv(format!("Failed to flush CSV writer: {}", e.error()))
        })?;

        let named_temp = buf_writer
            .into_inner()
            .map_err(|e| AppError::io("Failed to flush buffer", e.into_error()))?;

        named_temp.persist(&self.final_path).map_err(|e| {
            AppError::io(
                format!("Failed to persist file to {}", self.final_path.display()),
                e.error,
            )
        })?;

        Ok(self.final_path)
    }
}
