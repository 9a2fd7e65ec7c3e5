//! Readiness of a record: which canonical leaves are still missing.

use serde::{Deserialize, Serialize};

use super::guide::Remediation;
use crate::record::{CanonicalField, TargetRecord, REQUIRED_FIELD_COUNT};

/// Lifecycle of an accumulation task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DataStatus {
    #[default]
    Initial,
    AwaitingData,
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub total_required: usize,
    pub provided: usize,
    pub missing_count: usize,
    /// Whole percent, truncated.
    pub completion_pct: u8,
}

/// Validation of the canonical leaves. Always recomputable from a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    /// Missing leaves, sorted by dotted path.
    pub missing: Vec<CanonicalField>,
    pub summary: ValidationSummary,
    pub status: DataStatus,
}

impl Validation {
    pub fn of(record: &TargetRecord) -> Self {
        let mut missing: Vec<CanonicalField> = CanonicalField::ALL
            .into_iter()
            .filter(|f| !f.is_present(record))
            .collect();
        missing.sort_by_key(|f| f.path());

        let provided = REQUIRED_FIELD_COUNT - missing.len();
        let completion_pct = (provided * 100 / REQUIRED_FIELD_COUNT) as u8;
        let status = if missing.is_empty() {
            DataStatus::Ready
        } else {
            DataStatus::AwaitingData
        };

        Self {
            summary: ValidationSummary {
                total_required: REQUIRED_FIELD_COUNT,
                provided,
                missing_count: missing.len(),
                completion_pct,
            },
            missing,
            status,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    pub fn missing_paths(&self) -> Vec<&'static str> {
        self.missing.iter().map(|f| f.path()).collect()
    }
}

/// A record that passed validation. Only [`Readiness::check`] builds one.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadyRecord(TargetRecord);

impl ReadyRecord {
    pub fn record(&self) -> &TargetRecord {
        &self.0
    }

    pub fn into_inner(self) -> TargetRecord {
        self.0
    }
}

/// A missing canonical leaf and how to obtain it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingField {
    pub field: CanonicalField,
    pub remediation: Remediation,
}

/// Either a complete record or the leaves still to collect.
#[derive(Debug, Clone, PartialEq)]
pub enum Readiness {
    Ready(ReadyRecord),
    Awaiting(Vec<MissingField>),
}

impl Readiness {
    pub fn check(record: TargetRecord) -> Self {
        let validation = Validation::of(&record);
        if validation.is_complete() {
            Readiness::Ready(ReadyRecord(record))
        } else {
            Readiness::Awaiting(
                validation
                    .missing
                    .into_iter()
                    .map(|field| MissingField {
                        field,
                        remediation: field.remediation(),
                    })
                    .collect(),
            )
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready(_))
    }
}
