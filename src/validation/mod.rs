//! Row and source validation.
//!
//! `source_check` inspects a fixed-size prefix of the input before a run.
//! `row_filter` splits each normalized batch into retained, invalid-email and
//! duplicate rows.

pub mod email;
pub mod row_filter;
pub mod source_check;

pub use email::{is_invalid_email, EMAIL_PATTERN};
pub use row_filter::{partition, BatchPartition};
pub use source_check::{
    inspect_source, LineEndings, SourceReport, SourceStats, SourceWarning, SAMPLE_SIZE,
};
