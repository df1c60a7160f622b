//! Budget-sized batch reader for large CSV exports.
//!
//! Uses the `csv` crate so quoted fields with embedded commas and newlines
//! stay intact. The number of rows per batch is derived from the mean
//! in-memory size of a sample of leading rows, so each batch approximates a
//! byte budget without ever holding more than one batch in memory.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::mem::size_of;
use std::path::{Path, PathBuf};

use csv::{Reader, ReaderBuilder, StringRecord};

use crate::error::AppError;
use crate::schema::{parse_date, Column, ColumnKind, Schema, Slot};

/// UTF-8 BOM bytes.
pub(crate) const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Configuration for batch sizing.
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Target in-memory bytes per batch (default: 100 MiB).
    pub budget_bytes: u64,
    /// Leading rows sampled to estimate the mean row size (default: 100).
    pub sample_rows: usize,
    /// Fixed row count per batch. Skips the size estimate when set.
    pub rows_per_batch: Option<u64>,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            budget_bytes: 100 * 1024 * 1024, // 100 MiB
            sample_rows: 100,
            rows_per_batch: None,
        }
    }
}

impl ChunkConfig {
    /// Sets the byte budget.
    pub fn budget_bytes(mut self, bytes: u64) -> Self {
        self.budget_bytes = bytes;
        self
    }

    /// Sets how many leading rows are sampled.
    pub fn sample_rows(mut self, rows: usize) -> Self {
        self.sample_rows = rows;
        self
    }

    /// Pins the row count per batch.
    pub fn rows_per_batch(mut self, rows: u64) -> Self {
        self.rows_per_batch = Some(rows);
        self
    }
}

/// A contiguous run of raw source rows.
#[derive(Debug, Clone)]
pub struct Batch {
    /// 0-based position of the batch in the run.
    pub ordinal: u64,
    /// 1-based source line of the first row.
    pub first_line: u64,
    /// Raw rows, header order.
    pub rows: Vec<StringRecord>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Pull-based reader yielding one [`Batch`] at a time.
///
/// The sequence is finite, order-preserving and not restartable. After the
/// first error it yields nothing more.
pub struct ChunkReader {
    reader: Reader<BufReader<File>>,
    source: PathBuf,
    schema: Schema,
    /// Date columns checked while streaming.
    date_columns: Vec<(usize, Column)>,
    rows_per_batch: u64,
    mean_row_bytes: f64,
    next_ordinal: u64,
    done: bool,
}

impl ChunkReader {
    /// Opens `source`, samples it to size batches and reads its header.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Io` if the file cannot be opened or read, and
    /// `AppError::Format` if the header is missing or a sampled row is
    /// malformed.
    pub fn open(source: &Path, config: &ChunkConfig) -> Result<Self, AppError> {
        let mean_row_bytes = sample_mean_row_bytes(source, config.sample_rows)?;
        let rows_per_batch = config
            .rows_per_batch
            .unwrap_or_else(|| rows_for_budget(config.budget_bytes, mean_row_bytes))
            .max(1);

        let mut reader = open_csv(source)?;
        let schema = read_schema(&mut reader)?;
        let date_columns = schema
            .slots()
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| match slot {
                Slot::Known(c) if c.kind() == ColumnKind::Date => Some((idx, *c)),
                _ => None,
            })
            .collect();

        tracing::debug!(
            source = %source.display(),
            mean_row_bytes,
            rows_per_batch,
            budget_bytes = config.budget_bytes,
            "Sized batches from sample"
        );

        Ok(Self {
            reader,
            source: source.to_path_buf(),
            schema,
            date_columns,
            rows_per_batch,
            mean_row_bytes,
            next_ordinal: 0,
            done: false,
        })
    }

    /// Header layout after renaming.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn rows_per_batch(&self) -> u64 {
        self.rows_per_batch
    }

    /// Mean in-memory bytes per row over the sample (0 for a header-only file).
    pub fn mean_row_bytes(&self) -> f64 {
        self.mean_row_bytes
    }

    fn read_batch(&mut self) -> Result<Option<Batch>, AppError> {
        let mut rows = Vec::with_capacity(self.rows_per_batch.min(1 << 20) as usize);
        let mut first_line = 0;

        while (rows.len() as u64) < self.rows_per_batch {
            let mut record = StringRecord::new();
            let more = self
                .reader
                .read_record(&mut record)
                .map_err(|e| AppError::csv_read("Failed to read CSV record", e))?;
            if !more {
                break;
            }

            let line = record.position().map(|p| p.line()).unwrap_or_default();
            if rows.is_empty() {
                first_line = line;
            }
            self.check_dates(&record, line)?;
            rows.push(record);
        }

        if rows.is_empty() {
            return Ok(None);
        }

        let batch = Batch {
            ordinal: self.next_ordinal,
            first_line,
            rows,
        };
        self.next_ordinal += 1;
        Ok(Some(batch))
    }

    fn check_dates(&self, record: &StringRecord, line: u64) -> Result<(), AppError> {
        for &(idx, column) in &self.date_columns {
            let value = record.get(idx).unwrap_or_default();
            if parse_date(value).is_err() {
                return Err(AppError::Format(format!(
                    "{}: column {} has unparseable value {:?} at line {}",
                    self.source.display(),
                    column.canonical(),
                    value,
                    line
                )));
            }
        }
        Ok(())
    }
}

impl Iterator for ChunkReader {
    type Item = Result<Batch, AppError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_batch() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Rows that fit the budget at the given mean row size, at least 1.
pub fn rows_for_budget(budget_bytes: u64, mean_row_bytes: f64) -> u64 {
    if mean_row_bytes <= 0.0 {
        return 1;
    }
    ((budget_bytes as f64 / mean_row_bytes).floor() as u64).max(1)
}

/// Estimated heap plus inline footprint of one parsed row.
fn row_memory_bytes(record: &StringRecord) -> usize {
    size_of::<Vec<String>>()
        + record
            .iter()
            .map(|field| size_of::<String>() + field.len())
            .sum::<usize>()
}

/// Mean row footprint over the first `sample_rows` data rows.
fn sample_mean_row_bytes(source: &Path, sample_rows: usize) -> Result<f64, AppError> {
    let mut reader = open_csv(source)?;
    read_schema(&mut reader)?;

    let mut total: usize = 0;
    let mut count: usize = 0;
    for result in reader.records().take(sample_rows) {
        let record = result.map_err(|e| AppError::csv_read("Failed to sample CSV record", e))?;
        total += row_memory_bytes(&record);
        count += 1;
    }

    if count == 0 {
        return Ok(0.0);
    }
    Ok(total as f64 / count as f64)
}

/// Opens a CSV file with a BOM-free buffered reader.
pub(crate) fn open_csv(path: &Path) -> Result<Reader<BufReader<File>>, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open {}", path.display()), e))?;
    let mut buf_reader = BufReader::new(file);
    skip_bom(&mut buf_reader)
        .map_err(|e| AppError::io(format!("Failed to read {}", path.display()), e))?;

    Ok(ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(buf_reader))
}

/// Consumes a leading UTF-8 BOM, if any.
fn skip_bom<R: BufRead>(reader: &mut R) -> std::io::Result<()> {
    let starts_with_bom = reader.fill_buf()?.starts_with(UTF8_BOM);
    if starts_with_bom {
        reader.consume(UTF8_BOM.len());
    }
    Ok(())
}

fn read_schema<R: std::io::Read>(reader: &mut Reader<R>) -> Result<Schema, AppError> {
    let headers = reader
        .headers()
        .map_err(|e| AppError::csv_read("Failed to read CSV header", e))?;

    if headers.is_empty() {
        return Err(AppError::Format("CSV file has no header row".to_string()));
    }
    Ok(Schema::from_header(headers.iter()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Helper to create a test CSV file and return its path.
    fn create_test_csv(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("owners.csv");
        fs::write(&path, content).expect("Failed to write test CSV");
        path
    }

    fn uniform_csv(rows: usize) -> String {
        let mut content = String::from("身份证,姓名\n");
        for i in 0..rows {
            content.push_str(&format!("{:06},owner{:04}\n", i, i));
        }
        content
    }

    fn collect(reader: ChunkReader) -> Vec<Batch> {
        reader
            .collect::<Result<Vec<_>, _>>()
            .expect("reading batches failed")
    }

    #[test]
    fn test_fixed_rows_per_batch() {
        let dir = TempDir::new().unwrap();
        let source = create_test_csv(&dir, "姓名\nA\nB\nC\nD\nE\n");

        let config = ChunkConfig::default().rows_per_batch(2);
        let batches = collect(ChunkReader::open(&source, &config).unwrap());

        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        let ordinals: Vec<u64> = batches.iter().map(|b| b.ordinal).collect();
        assert_eq!(ordinals, vec![0, 1, 2]);
        assert_eq!(batches[1].first_line, 4);
    }

    #[test]
    fn test_budget_sizing_from_sample() {
        let dir = TempDir::new().unwrap();
        let source = create_test_csv(&dir, &uniform_csv(250));

        let probe = ChunkReader::open(&source, &ChunkConfig::default()).unwrap();
        let mean = probe.mean_row_bytes();
        assert!(mean > 0.0);

        // Uniform rows: a budget of 100.5 rows yields exactly 100 per batch.
        let budget = (mean * 100.5) as u64;
        let reader = ChunkReader::open(&source, &ChunkConfig::default().budget_bytes(budget)).unwrap();
        assert_eq!(reader.rows_per_batch(), 100);

        let sizes: Vec<usize> = collect(reader).iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![100, 100, 50]);
    }

    #[test]
    fn test_every_row_visited_once_in_order() {
        let dir = TempDir::new().unwrap();
        let source = create_test_csv(&dir, &uniform_csv(37));

        let config = ChunkConfig::default().rows_per_batch(5);
        let ids: Vec<String> = collect(ChunkReader::open(&source, &config).unwrap())
            .into_iter()
            .flat_map(|b| b.rows.into_iter())
            .map(|r| r[0].to_string())
            .collect();

        let expected: Vec<String> = (0..37).map(|i| format!("{:06}", i)).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_tiny_budget_still_makes_progress() {
        let dir = TempDir::new().unwrap();
        let source = create_test_csv(&dir, &uniform_csv(3));

        let config = ChunkConfig::default().budget_bytes(1);
        let reader = ChunkReader::open(&source, &config).unwrap();
        assert_eq!(reader.rows_per_batch(), 1);
        assert_eq!(collect(reader).len(), 3);
    }

    #[test]
    fn test_bom_is_stripped_from_header() {
        let dir = TempDir::new().unwrap();
        let source = create_test_csv(&dir, "\u{feff}车架号,邮箱\nLVX1,a@b.com\n");

        let reader = ChunkReader::open(&source, &ChunkConfig::default()).unwrap();
        assert_eq!(
            reader.schema().output_header(),
            vec!["vehicle_frame_number", "email"]
        );
    }

    #[test]
    fn test_embedded_newline_integrity() {
        let dir = TempDir::new().unwrap();
        let source = create_test_csv(&dir, "姓名,地址\n\"Li\",\"Line1\nLine2, Apt 4\"\nWang,x\n");

        let batches = collect(ChunkReader::open(&source, &ChunkConfig::default()).unwrap());
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(&batches[0].rows[0][1], "Line1\nLine2, Apt 4");
    }

    #[test]
    fn test_header_only_yields_nothing() {
        let dir = TempDir::new().unwrap();
        let source = create_test_csv(&dir, "姓名,邮箱\n");

        let reader = ChunkReader::open(&source, &ChunkConfig::default()).unwrap();
        assert_eq!(reader.mean_row_bytes(), 0.0);
        assert!(collect(reader).is_empty());
    }

    #[test]
    fn test_empty_file_returns_format_error() {
        let dir = TempDir::new().unwrap();
        let source = create_test_csv(&dir, "");

        match ChunkReader::open(&source, &ChunkConfig::default()) {
            Err(AppError::Format(msg)) => assert!(msg.contains("header")),
            Err(other) => panic!("Expected Format error, got {:?}", other),
            Ok(_) => panic!("Expected Format error"),
        }
    }

    #[test]
    fn test_missing_file_returns_io_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.csv");

        assert!(matches!(
            ChunkReader::open(&missing, &ChunkConfig::default()),
            Err(AppError::Io { .. })
        ));
    }

    #[test]
    fn test_bad_birthday_fails_with_line_number() {
        let dir = TempDir::new().unwrap();
        let source = create_test_csv(&dir, "姓名,生日\nA,1990-01-01\nB,\nC,someday\n");

        let config = ChunkConfig::default().rows_per_batch(10);
        let mut reader = ChunkReader::open(&source, &config).unwrap();
        match reader.next() {
            Some(Err(AppError::Format(msg))) => {
                assert!(msg.contains("birthday"));
                assert!(msg.contains("line 4"), "unexpected message: {}", msg);
            }
            other => panic!("Expected Format error, got {:?}", other.map(|r| r.map(|b| b.len()))),
        }
        assert!(reader.next().is_none(), "reader must stop after an error");
    }

    #[test]
    fn test_text_salary_is_not_an_error() {
        let dir = TempDir::new().unwrap();
        let source = create_test_csv(&dir, "姓名,月薪\nA,8000\nB,面议\nC,8000-10000\n");

        let batches: Vec<Batch> = ChunkReader::open(&source, &ChunkConfig::default())
            .unwrap()
            .collect::<Result<_, _>>()
            .expect("salary text must not stop the reader");
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 3);
    }

    #[test]
    fn test_ragged_row_is_format_error() {
        let dir = TempDir::new().unwrap();
        let source = create_test_csv(&dir, "姓名,邮箱\nA,a@b.com\nB,b@c.com,extra\n");

        assert!(matches!(
            ChunkReader::open(&source, &ChunkConfig::default()),
            Err(AppError::Format(_))
        ));
    }

    #[test]
    fn test_rows_for_budget() {
        assert_eq!(rows_for_budget(1000, 10.0), 100);
        assert_eq!(rows_for_budget(1005, 10.0), 100);
        assert_eq!(rows_for_budget(5, 10.0), 1);
        assert_eq!(rows_for_budget(1000, 0.0), 1);
    }

    #[test]
    fn test_chunk_config_builder() {
        let config = ChunkConfig::default()
            .budget_bytes(50 * 1024 * 1024)
            .sample_rows(10)
            .rows_per_batch(7);

        assert_eq!(config.budget_bytes, 50 * 1024 * 1024);
        assert_eq!(config.sample_rows, 10);
        assert_eq!(config.rows_per_batch, Some(7));
    }
}
