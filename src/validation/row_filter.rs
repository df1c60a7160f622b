//! Per-batch row validation and deduplication.
//!
//! Splits a normalized batch into the rows to keep, the rows with a bad
//! email and the members of duplicate owner groups. Duplicate detection is
//! scoped to the batch: the same owner in two batches is kept twice.

use std::collections::{HashMap, HashSet};

use crate::normalize::NormalizedBatch;
use crate::schema::{Column, IdentityKey, Record, Schema};
use crate::validation::email::is_invalid_email;

/// The three subsets produced from one batch.
///
/// `invalid_email` and `duplicates` hold copies taken before lowercasing.
/// Invalid-email rows are also present in `retained`.
#[derive(Debug, Clone, Default)]
pub struct BatchPartition {
    pub ordinal: u64,
    pub invalid_email: Vec<Record>,
    pub duplicates: Vec<Record>,
    pub retained: Vec<Record>,
}

impl BatchPartition {
    /// Rows dropped as repeated members of a duplicate group.
    pub fn dropped(&self) -> usize {
        self.duplicates.len() - self.duplicate_groups()
    }

    /// Number of distinct identity keys among the duplicates.
    pub fn duplicate_groups(&self) -> usize {
        self.duplicates
            .iter()
            .map(Record::identity_key)
            .collect::<HashSet<_>>()
            .len()
    }
}

/// Validates and deduplicates one batch.
///
/// The first occurrence of each identity key (by row order) is retained.
/// Retained rows are lowercased; the captured copies are not.
pub fn partition(batch: NormalizedBatch, schema: &Schema) -> BatchPartition {
    let NormalizedBatch { ordinal, records } = batch;

    let invalid_email: Vec<Record> = if schema.contains(Column::Email) {
        records
            .iter()
            .filter(|r| is_invalid_email(r.email.as_deref()))
            .cloned()
            .collect()
    } else {
        Vec::new()
    };

    let mut group_sizes: HashMap<IdentityKey, usize> = HashMap::with_capacity(records.len());
    for record in &records {
        *group_sizes.entry(record.identity_key()).or_insert(0) += 1;
    }

    let duplicates: Vec<Record> = records
        .iter()
        .filter(|r| group_sizes[&r.identity_key()] > 1)
        .cloned()
        .collect();

    let mut seen: HashSet<IdentityKey> = HashSet::with_capacity(group_sizes.len());
    let retained: Vec<Record> = records
        .into_iter()
        .filter(|r| seen.insert(r.identity_key()))
        .map(|mut r| {
            r.lowercase();
            r
        })
        .collect();

    tracing::debug!(
        batch = ordinal,
        invalid_email = invalid_email.len(),
        duplicates = duplicates.len(),
        retained = retained.len(),
        "Partitioned batch"
    );

    BatchPartition {
        ordinal,
        invalid_email,
        duplicates,
        retained,
    }
}
