//! Streaming I/O for large exports.
//!
//! Reads the source in budget-sized batches with record-aware CSV parsing,
//! and writes snapshot, cleaned and side files atomically where the output
//! is written in one go.

mod atomic_writer;
pub(crate) mod chunk_reader;
mod output_writer;

pub use atomic_writer::AtomicCsvWriter;
pub use chunk_reader::{rows_for_budget, Batch, ChunkConfig, ChunkReader};
pub use output_writer::{
    count_data_rows, write_duplicates, write_garbage, GarbageEntry, OutputWriter,
};
