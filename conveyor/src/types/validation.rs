use std::collections::BTreeMap;

/// Outcome of validating a single record.
///
/// Data-quality outcomes are expected conditions, so they travel as values
/// and are aggregated into a [`ValidationReport`]; they are never raised as
/// errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordVerdict {
    /// The record passed every rule.
    Accept,
    /// The record violated a rule but stays in the dataset, annotated.
    Flag,
    /// The record violated a rule and is dropped from the dataset.
    Reject,
}

/// Aggregated result of validating one dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub total: u64,
    pub accepted: u64,
    pub flagged: u64,
    pub rejected: u64,
    /// Violation counts keyed by field name.
    pub failures_by_field: BTreeMap<String, u64>,
}

impl ValidationReport {
    /// Records the verdict for one record.
    pub fn record(&mut self, verdict: RecordVerdict) {
        self.total += 1;
        match verdict {
            RecordVerdict::Accept => self.accepted += 1,
            RecordVerdict::Flag => self.flagged += 1,
            RecordVerdict::Reject => self.rejected += 1,
        }
    }

    /// Records a rule violation against a field.
    pub fn record_failure(&mut self, field: &str) {
        *self.failures_by_field.entry(field.to_string()).or_default() += 1;
    }

    /// Returns `true` when every record was accepted.
    pub fn is_clean(&self) -> bool {
        self.flagged == 0 && self.rejected == 0
    }
}
