use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::ValidationStatus;

/// A GRDT: a named, numbered transmittal batch of documents.
///
/// `validated_at = None` means open; once set, membership and counts are frozen.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationBatch {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub grdt_number: String,
    pub sequence_number: i64,
    pub validated_at: Option<DateTime<Utc>>,
    pub counts: BatchCounts,
    pub created_at: DateTime<Utc>,
}

impl ValidationBatch {
    pub fn is_finalized(&self) -> bool {
        self.validated_at.is_some()
    }
}

/// Aggregate document counts of a batch.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BatchCounts {
    pub total_items: u32,
    pub valid_count: u32,
    pub pending_count: u32,
    pub invalid_count: u32,
}

impl BatchCounts {
    pub fn from_statuses<'a>(statuses: impl IntoIterator<Item = &'a ValidationStatus>) -> Self {
        let mut counts = Self::default();
        for status in statuses {
            counts.total_items += 1;
            if *status == ValidationStatus::Validated {
                counts.valid_count += 1;
            } else if status.counts_as_pending() {
                counts.pending_count += 1;
            } else if status.counts_as_invalid() {
                counts.invalid_count += 1;
            }
        }
        counts
    }
}

/// Input for creating a batch. The store allocates the sequence number.
#[derive(Debug, Clone)]
pub struct NewBatch {
    pub contract_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// Caller-supplied GRDT number; generated from the sequence when `None`.
    pub grdt_number: Option<String>,
    /// Contract code embedded in generated GRDT numbers.
    pub contract_code: String,
    pub grdt_prefix: String,
}

/// Build a GRDT number: `{prefix}-{contract}-{year}-{seq:04}`.
pub fn format_grdt_number(prefix: &str, contract_code: &str, year: i32, sequence: i64) -> String {
    format!("{prefix}-{contract_code}-{year}-{sequence:04}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_bucket_every_status() {
        let statuses = [
            ValidationStatus::Validated,
            ValidationStatus::Validated,
            ValidationStatus::NeedsSuffix,
            ValidationStatus::Pending,
            ValidationStatus::Unrecognized,
            ValidationStatus::Error,
        ];
        let counts = BatchCounts::from_statuses(statuses.iter());
        assert_eq!(
            counts,
            BatchCounts {
                total_items: 6,
                valid_count: 2,
                pending_count: 2,
                invalid_count: 2,
            }
        );
    }

    #[test]
    fn empty_batch_counts_zero() {
        assert_eq!(BatchCounts::from_statuses([].iter()), BatchCounts::default());
    }

    #[test]
    fn grdt_number_is_zero_padded() {
        assert_eq!(format_grdt_number("eGRDT", "CT01", 2026, 7), "eGRDT-CT01-2026-0007");
        assert_eq!(format_grdt_number("eGRDT", "CT01", 2026, 12345), "eGRDT-CT01-2026-12345");
    }
}
