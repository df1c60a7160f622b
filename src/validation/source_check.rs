//! Pre-flight look at the source file.
//!
//! Reads only a fixed-size prefix (512 KB), so it is cheap even for
//! multi-gigabyte exports. It reports what is worth a warning before a long
//! run and estimates the total row count for the batch-count estimate.
//! Structural problems (no header, ragged rows, bad encoding) are left to
//! the batch reader, which fails on them with a line number.

use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

use crate::error::AppError;
use crate::streaming::chunk_reader::UTF8_BOM;

/// Size of the inspected prefix (512 KB).
pub const SAMPLE_SIZE: usize = 512 * 1024;

/// File size above which a warning is logged (100 MB).
const LARGE_FILE_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Outcome of a source inspection.
#[derive(Debug, Clone, Default)]
pub struct SourceReport {
    pub warnings: Vec<SourceWarning>,
    pub stats: SourceStats,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceStats {
    pub file_size_bytes: u64,
    /// Bytes actually inspected.
    pub sample_bytes: u64,
    pub line_endings: LineEndings,
    /// `None` when the prefix holds no complete data row to measure.
    pub estimated_total_rows: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LineEndings {
    Lf,
    Crlf,
    Mixed,
    #[default]
    Unknown,
}

/// Observations that do not stop the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceWarning {
    HasBom,
    MixedLineEndings,
    LargeFile { size_bytes: u64 },
}

/// Inspects the first [`SAMPLE_SIZE`] bytes of `path`.
///
/// # Errors
///
/// Returns `AppError::Io` only if the file cannot be opened or read.
pub fn inspect_source(path: &Path) -> Result<SourceReport, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open {}", path.display()), e))?;
    let file_size_bytes = file
        .metadata()
        .map_err(|e| AppError::io(format!("Failed to stat {}", path.display()), e))?
        .len();

    let mut report = SourceReport::default();
    report.stats.file_size_bytes = file_size_bytes;
    if file_size_bytes > LARGE_FILE_THRESHOLD {
        report.warnings.push(SourceWarning::LargeFile {
            size_bytes: file_size_bytes,
        });
    }

    let mut buffer = Vec::with_capacity((file_size_bytes as usize).min(SAMPLE_SIZE));
    file.take(SAMPLE_SIZE as u64)
        .read_to_end(&mut buffer)
        .map_err(|e| AppError::io(format!("Failed to read {}", path.display()), e))?;
    report.stats.sample_bytes = buffer.len() as u64;

    let data = match buffer.strip_prefix(UTF8_BOM) {
        Some(rest) => {
            report.warnings.push(SourceWarning::HasBom);
            rest
        }
        None => &buffer[..],
    };

    report.stats.line_endings = detect_line_endings(data);
    if report.stats.line_endings == LineEndings::Mixed {
        report.warnings.push(SourceWarning::MixedLineEndings);
    }

    let is_sample_only = file_size_bytes > report.stats.sample_bytes;
    let data_bytes = file_size_bytes - (buffer.len() - data.len()) as u64;
    report.stats.estimated_total_rows = estimate_rows(data, data_bytes, is_sample_only);

    Ok(report)
}

/// Extrapolates the data-row count from the complete rows in `data`.
fn estimate_rows(data: &[u8], data_bytes: u64, is_sample_only: bool) -> Option<u64> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(Cursor::new(data));
    reader.byte_headers().ok()?;
    let header_bytes = reader.position().byte();

    let mut record = csv::ByteRecord::new();
    let mut rows: u64 = 0;
    let mut last_end = header_bytes;
    while let Ok(true) = reader.read_byte_record(&mut record) {
        let end = reader.position().byte();
        if is_sample_only && end as usize >= data.len() {
            // Likely a row cut short by the sample boundary.
            break;
        }
        rows += 1;
        last_end = end;
    }

    if !is_sample_only {
        return Some(rows);
    }
    if rows == 0 {
        return None;
    }
    let row_bytes = (last_end - header_bytes) as f64 / rows as f64;
    Some((data_bytes.saturating_sub(header_bytes) as f64 / row_bytes).round() as u64)
}

fn detect_line_endings(data: &[u8]) -> LineEndings {
    let mut has_lf = false;
    let mut has_crlf = false;

    for (i, byte) in data.iter().enumerate() {
        if *byte == b'\n' {
            if i > 0 && data[i - 1] == b'\r' {
                has_crlf = true;
            } else {
                has_lf = true;
            }
        }
    }

    match (has_lf, has_crlf) {
        (true, true) => LineEndings::Mixed,
        (true, false) => LineEndings::Lf,
        (false, true) => LineEndings::Crlf,
        (false, false) => LineEndings::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_temp_csv(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content).expect("Failed to write temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    #[test]
    fn test_small_file_counts_rows_exactly() {
        let file = create_temp_csv("姓名,邮箱\nLi,li@a.com\nWu,wu@a.com\n".as_bytes());

        let report = inspect_source(file.path()).unwrap();
        assert!(report.warnings.is_empty());
        assert_eq!(report.stats.line_endings, LineEndings::Lf);
        assert_eq!(report.stats.estimated_total_rows, Some(2));
    }

    #[test]
    fn test_bom_and_mixed_line_endings_warn() {
        let mut content = UTF8_BOM.to_vec();
        content.extend_from_slice(b"name,email\r\nLi,li@a.com\nWu,wu@a.com\r\n");
        let file = create_temp_csv(&content);

        let report = inspect_source(file.path()).unwrap();
        assert!(report.warnings.contains(&SourceWarning::HasBom));
        assert!(report.warnings.contains(&SourceWarning::MixedLineEndings));
        assert_eq!(report.stats.estimated_total_rows, Some(2));
    }

    #[test]
    fn test_large_file_is_extrapolated_from_prefix() {
        let row = "LVSHCAMB000000001,owner,li@example.com\n";
        let rows = (SAMPLE_SIZE / row.len()) * 3;
        let mut content = String::from("vin,name,email\n");
        for _ in 0..rows {
            content.push_str(row);
        }
        let file = create_temp_csv(content.as_bytes());

        let report = inspect_source(file.path()).unwrap();
        assert_eq!(report.stats.sample_bytes, SAMPLE_SIZE as u64);
        let estimate = report.stats.estimated_total_rows.unwrap();
        assert!(
            estimate.abs_diff(rows as u64) <= 1,
            "estimate {} vs {} rows",
            estimate,
            rows
        );
    }

    #[test]
    fn test_empty_and_header_only_files() {
        let empty = create_temp_csv(b"");
        let report = inspect_source(empty.path()).unwrap();
        assert_eq!(report.stats.file_size_bytes, 0);
        assert_eq!(report.stats.estimated_total_rows, Some(0));

        let header_only = create_temp_csv("姓名,邮箱\n".as_bytes());
        let report = inspect_source(header_only.path()).unwrap();
        assert_eq!(report.stats.estimated_total_rows, Some(0));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = inspect_source(Path::new("/definitely/not/here.csv"));
        assert!(matches!(result, Err(AppError::Io { .. })));
    }

    #[test]
    fn test_detect_line_endings() {
        assert_eq!(detect_line_endings(b"a\nb\n"), LineEndings::Lf);
        assert_eq!(detect_line_endings(b"a\r\nb\r\n"), LineEndings::Crlf);
        assert_eq!(detect_line_endings(b"a\r\nb\n"), LineEndings::Mixed);
        assert_eq!(detect_line_endings(b"abc"), LineEndings::Unknown);
    }
}
