use crate::{classify::DamageLabel, error::ItemFailure};
use serde::{Deserialize, Serialize};

/// One successfully processed image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub source_key: String,
    pub damage_labels: Vec<DamageLabel>,
    pub report: String,
}

/// Where a report document landed in the destination bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedReport {
    pub source_key: String,
    pub bucket: String,
    pub report_key: String,
}

/// A report that was produced but could not be stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistFailure {
    pub source_key: String,
    pub report_key: String,
    pub message: String,
}

/// Outcome of a batch run.
///
/// `results` holds only successes, in enumeration order. Everything else is
/// diagnostics: an empty `results` may mean "nothing eligible", "nothing
/// worked" or "listing failed", and only these fields tell them apart.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub source_bucket: String,
    pub destination_bucket: Option<String>,
    pub eligible_keys: Vec<String>,
    pub results: Vec<ProcessingResult>,
    pub failures: Vec<ItemFailure>,
    pub persisted: Vec<PersistedReport>,
    pub persist_failures: Vec<PersistFailure>,
    pub enumeration_error: Option<String>,
}

impl BatchReport {
    pub fn persisted_key(&self, source_key: &str) -> Option<&PersistedReport> {
        self.persisted.iter().find(|p| p.source_key == source_key)
    }

    pub fn attempted(&self) -> usize {
        self.eligible_keys.len()
    }
}
