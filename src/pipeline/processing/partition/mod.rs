use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::domain::CanonicalRecord;
use crate::observability::metrics;
use crate::pipeline::processing::validate::ValidatedRecord;

/// Result of de-duplication: first occurrences in input order, plus the
/// later occurrences that were dropped.
#[derive(Debug, Clone, Default)]
pub struct Deduplicated {
    pub unique: Vec<CanonicalRecord>,
    pub duplicates: Vec<CanonicalRecord>,
}

/// Accepted and rejected records, each in original relative order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Partition {
    pub accepted: Vec<ValidatedRecord>,
    pub rejected: Vec<ValidatedRecord>,
    /// Identifiers dropped by de-duplication, in input order
    pub duplicates: Vec<String>,
}

impl Partition {
    /// Unique records that went through validation
    pub fn total(&self) -> usize {
        self.accepted.len() + self.rejected.len()
    }
}

/// Collapses records sharing an identifier, keeping the first occurrence.
///
/// Records with no identifier cannot collide and are always kept.
#[instrument(skip(records), fields(count = records.len()))]
pub fn deduplicate(records: Vec<CanonicalRecord>) -> Deduplicated {
    let mut seen = HashSet::new();
    let mut result = Deduplicated::default();

    for record in records {
        let fresh = match record.identifier() {
            Some(id) => seen.insert(id.to_string()),
            None => true,
        };
        if fresh {
            result.unique.push(record);
        } else {
            warn!(id = %record.key(), row = record.row, "Dropping duplicate record");
            result.duplicates.push(record);
        }
    }

    metrics::partition::duplicates_dropped(result.duplicates.len());
    result
}

/// Splits validated records on the presence of error-severity violations.
pub fn partition(validated: Vec<ValidatedRecord>, duplicates: &[CanonicalRecord]) -> Partition {
    let (accepted, rejected): (Vec<_>, Vec<_>) =
        validated.into_iter().partition(ValidatedRecord::is_accepted);

    metrics::partition::accepted(accepted.len());
    metrics::partition::rejected(rejected.len());
    info!(
        "Partitioned records: {} accepted, {} rejected, {} duplicates dropped",
        accepted.len(),
        rejected.len(),
        duplicates.len()
    );

    Partition {
        accepted,
        rejected,
        duplicates: duplicates.iter().map(CanonicalRecord::key).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Field;
    use crate::pipeline::processing::validate::{RuleCategory, Severity, Violation};

    fn record(row: usize, id: Option<&str>) -> CanonicalRecord {
        let mut r = CanonicalRecord::empty(row);
        r.id = id.map(str::to_string).into();
        r
    }

    fn violation(severity: Severity) -> Violation {
        Violation {
            record_id: "x".into(),
            rule: "r".into(),
            category: RuleCategory::Status,
            severity,
            field: None,
            message: "m".into(),
        }
    }

    #[test]
    fn first_occurrence_wins() {
        let mut a_prime = record(1, Some("A"));
        a_prime.amount = Field::Present(99.0);
        let result = deduplicate(vec![record(0, Some("A")), a_prime, record(2, Some("B"))]);

        let rows: Vec<usize> = result.unique.iter().map(|r| r.row).collect();
        assert_eq!(rows, vec![0, 2]);
        assert_eq!(result.duplicates.len(), 1);
        assert_eq!(result.duplicates[0].row, 1);
    }

    #[test]
    fn records_without_identifier_are_never_collapsed() {
        let result = deduplicate(vec![record(0, None), record(1, None)]);
        assert_eq!(result.unique.len(), 2);
        assert!(result.duplicates.is_empty());
    }

    #[test]
    fn partition_is_stable_and_warning_tolerant() {
        let validated = vec![
            ValidatedRecord { record: record(0, Some("A")), violations: vec![] },
            ValidatedRecord { record: record(1, Some("B")), violations: vec![violation(Severity::Error)] },
            ValidatedRecord { record: record(2, Some("C")), violations: vec![violation(Severity::Warning)] },
            ValidatedRecord {
                record: record(3, Some("D")),
                violations: vec![violation(Severity::Warning), violation(Severity::Error)],
            },
        ];

        let result = partition(validated, &[record(4, Some("A"))]);
        let accepted: Vec<_> = result.accepted.iter().map(|v| v.record.key()).collect();
        let rejected: Vec<_> = result.rejected.iter().map(|v| v.record.key()).collect();
        assert_eq!(accepted, vec!["A", "C"]);
        assert_eq!(rejected, vec!["B", "D"]);
        assert_eq!(result.duplicates, vec!["A".to_string()]);
        assert_eq!(result.total(), 4);
    }
}
