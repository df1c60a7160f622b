//! Column normalization.
//!
//! Turns raw source rows into typed [`Record`]s: known labels are renamed to
//! their canonical column, unknown labels pass through, the unwanted columns
//! are split off into a side slice, text is trimmed and missing text is
//! filled with the sentinel.

use csv::StringRecord;

use crate::schema::{
    clean_text, parse_date, parse_salary, Column, ColumnKind, Record, Schema, Slot,
};
use crate::streaming::Batch;

/// Raw values of the unwanted columns for one row. `None` when the column is
/// absent or the cell is a null marker; other values are kept untrimmed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnwantedValues {
    pub configuration: Option<String>,
    pub postal_code: Option<String>,
}

/// A batch after normalization.
#[derive(Debug, Clone)]
pub struct NormalizedBatch {
    pub ordinal: u64,
    pub records: Vec<Record>,
}

/// Where one input cell goes.
#[derive(Debug, Clone, Copy)]
enum Target {
    Text(Column),
    Date,
    Salary,
    Unwanted(Column),
    Extra(usize),
}

/// Applies the rename table and unwanted-column split to every batch of a
/// run. Built once from the run's header.
#[derive(Debug, Clone)]
pub struct ColumnNormalizer {
    schema: Schema,
    targets: Vec<Target>,
    extra_count: usize,
}

impl ColumnNormalizer {
    pub fn new(schema: Schema) -> Self {
        let mut extra_count = 0;
        let targets = schema
            .slots()
            .iter()
            .map(|slot| match slot {
                Slot::Known(c) if c.is_unwanted() => Target::Unwanted(*c),
                Slot::Known(c) => match c.kind() {
                    ColumnKind::Text => Target::Text(*c),
                    ColumnKind::Date => Target::Date,
                    ColumnKind::Number => Target::Salary,
                },
                Slot::Extra(_) => {
                    extra_count += 1;
                    Target::Extra(extra_count - 1)
                }
            })
            .collect();

        Self {
            schema,
            targets,
            extra_count,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Normalizes a batch, returning the records and the unwanted-column
    /// slice. The slice holds one entry per row when the header has any
    /// unwanted column and is empty otherwise.
    pub fn normalize(&self, batch: Batch) -> (NormalizedBatch, Vec<UnwantedValues>) {
        let keep_unwanted = self.schema.has_unwanted();
        let mut records = Vec::with_capacity(batch.len());
        let mut unwanted = Vec::new();

        for row in &batch.rows {
            let (record, values) = self.record_from_row(row);
            records.push(record);
            if keep_unwanted {
                unwanted.push(values);
            }
        }

        (
            NormalizedBatch {
                ordinal: batch.ordinal,
                records,
            },
            unwanted,
        )
    }

    fn record_from_row(&self, row: &StringRecord) -> (Record, UnwantedValues) {
        let mut record = Record {
            extras: vec![None; self.extra_count],
            ..Default::default()
        };
        let mut unwanted = UnwantedValues::default();

        for (target, raw) in self.targets.iter().zip(row.iter()) {
            match *target {
                Target::Text(column) => {
                    if let Some(field) = record.text_mut(column) {
                        *field = clean_text(raw);
                    }
                }
                // Dates are checked by the reader; anything left unparseable
                // here reads as missing.
                Target::Date => record.birthday = parse_date(raw).ok().flatten(),
                Target::Salary => record.monthly_salary = parse_salary(raw),
                Target::Unwanted(column) => {
                    let value = clean_text(raw).map(|_| raw.to_string());
                    match column {
                        Column::Configuration => unwanted.configuration = value,
                        _ => unwanted.postal_code = value,
                    }
                }
                Target::Extra(i) => record.extras[i] = clean_text(raw),
            }
        }

        record.fill_missing();
        (record, unwanted)
    }
}
