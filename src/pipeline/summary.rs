use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::ReportConfig;
use crate::constants::{STEEL_REJECT_GRADE, STEEL_REWORK_GRADE};
use crate::pipeline::dispatch::DispatchReport;
use crate::pipeline::processing::partition::Partition;
use crate::pipeline::processing::validate::ValidatedRecord;

const UNKNOWN: &str = "unknown";

/// Occurrences of one code across the unique records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeCount {
    pub code: String,
    pub count: usize,
}

/// Accepted orders and their value for one contact name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerTotal {
    pub name: String,
    pub orders: usize,
    pub total_value: f64,
}

/// Aggregate statistics for one run. Derived once, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Unique records after de-duplication
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub duplicates: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
    /// `sent / (sent + failed)`, 0 when nothing was attempted
    pub success_rate: f64,
    /// Sum of amounts over accepted records
    pub total_value: f64,
    pub average_amount: f64,
    pub min_amount: Option<f64>,
    pub max_amount: Option<f64>,
    /// Warning-severity violations across all unique records
    pub warnings: usize,
    pub violations_by_category: BTreeMap<String, usize>,
    pub status_breakdown: BTreeMap<String, usize>,
    pub top_primary_codes: Vec<CodeCount>,
    pub top_secondary_codes: Vec<CodeCount>,
    /// Unique records per quality grade, only for records with a specification
    pub quality_grades: BTreeMap<String, usize>,
    /// Percentages of the records counted in `quality_grades`
    pub reject_rate: f64,
    pub rework_rate: f64,
    /// Percentage of unique records in a completed status
    pub completion_rate: f64,
    /// Sum of weights over accepted records
    pub total_weight_kg: f64,
    pub top_customers_by_value: Vec<CustomerTotal>,
    pub top_customers_by_orders: Vec<CustomerTotal>,
}

impl Summary {
    /// Pure aggregation over partition counts and dispatch results.
    ///
    /// Everything is counted or summed in input order, so the output does not
    /// depend on the order in which notifications completed.
    pub fn compute(partition: &Partition, dispatch: &DispatchReport, report: &ReportConfig) -> Self {
        let top_n = report.top_codes;
        let unique: Vec<&ValidatedRecord> =
            partition.accepted.iter().chain(partition.rejected.iter()).collect();

        let sent = dispatch.sent();
        let failed = dispatch.failed();
        let attempted = sent + failed;

        let amounts: Vec<f64> = partition
            .accepted
            .iter()
            .filter_map(|v| v.record.amount.as_option().copied())
            .collect();
        let total_value: f64 = amounts.iter().sum();

        let mut violations_by_category = BTreeMap::new();
        for violation in unique.iter().flat_map(|v| v.violations.iter()) {
            *violations_by_category
                .entry(violation.category.as_str().to_string())
                .or_insert(0) += 1;
        }
        let warnings = unique.iter().map(|v| v.warnings().count()).sum();

        let mut status_breakdown = BTreeMap::new();
        let mut completed = 0;
        for v in &unique {
            let status = v.record.status.as_option().map(String::as_str).unwrap_or(UNKNOWN);
            *status_breakdown.entry(status.to_string()).or_insert(0) += 1;
            if report.completed_statuses.contains(status) {
                completed += 1;
            }
        }

        let mut quality_grades = BTreeMap::new();
        for spec in unique.iter().filter_map(|v| v.record.specification.as_ref()) {
            let grade = spec.quality_grade.as_option().map(String::as_str).unwrap_or(UNKNOWN);
            *quality_grades.entry(grade.to_string()).or_insert(0) += 1;
        }
        let graded: usize = quality_grades.values().sum();
        let grade_rate = |grade: &str| percentage(quality_grades.get(grade).copied().unwrap_or(0), graded);

        let total_weight_kg = partition
            .accepted
            .iter()
            .filter_map(|v| v.record.specification.as_ref())
            .filter_map(|s| s.weight_kg.as_option())
            .sum();

        let customers = customer_totals(&partition.accepted);
        let mut top_customers_by_value = customers.clone();
        top_customers_by_value.sort_by(|a, b| b.total_value.total_cmp(&a.total_value));
        top_customers_by_value.truncate(top_n);
        let mut top_customers_by_orders = customers;
        top_customers_by_orders.sort_by(|a, b| b.orders.cmp(&a.orders));
        top_customers_by_orders.truncate(top_n);

        Self {
            total: partition.total(),
            valid: partition.accepted.len(),
            invalid: partition.rejected.len(),
            duplicates: partition.duplicates.len(),
            sent,
            failed,
            skipped: dispatch.skipped.len(),
            success_rate: if attempted == 0 {
                0.0
            } else {
                sent as f64 / attempted as f64
            },
            total_value,
            average_amount: if amounts.is_empty() {
                0.0
            } else {
                total_value / amounts.len() as f64
            },
            min_amount: amounts.iter().copied().reduce(f64::min),
            max_amount: amounts.iter().copied().reduce(f64::max),
            warnings,
            violations_by_category,
            status_breakdown,
            top_primary_codes: top_codes(
                unique.iter().filter_map(|v| v.record.primary_code.as_option()),
                top_n,
            ),
            top_secondary_codes: top_codes(
                unique.iter().filter_map(|v| v.record.secondary_code.as_option()),
                top_n,
            ),
            reject_rate: grade_rate(STEEL_REJECT_GRADE),
            rework_rate: grade_rate(STEEL_REWORK_GRADE),
            completion_rate: percentage(completed, unique.len()),
            quality_grades,
            total_weight_kg,
            top_customers_by_value,
            top_customers_by_orders,
        }
    }

    /// Share of unique records that passed validation, as a percentage
    pub fn validity_rate(&self) -> f64 {
        percentage(self.valid, self.total)
    }

    /// Flattened `(metric, value)` rows for tabular sinks
    pub fn to_rows(&self) -> Vec<(String, String)> {
        let mut rows = vec![
            ("total".to_string(), self.total.to_string()),
            ("valid".to_string(), self.valid.to_string()),
            ("invalid".to_string(), self.invalid.to_string()),
            ("duplicates".to_string(), self.duplicates.to_string()),
            ("sent".to_string(), self.sent.to_string()),
            ("failed".to_string(), self.failed.to_string()),
            ("skipped".to_string(), self.skipped.to_string()),
            ("success_rate".to_string(), format!("{:.4}", self.success_rate)),
            ("total_value".to_string(), format!("{:.2}", self.total_value)),
            ("average_amount".to_string(), format!("{:.2}", self.average_amount)),
            (
                "min_amount".to_string(),
                self.min_amount.map(|v| format!("{v:.2}")).unwrap_or_default(),
            ),
            (
                "max_amount".to_string(),
                self.max_amount.map(|v| format!("{v:.2}")).unwrap_or_default(),
            ),
            ("warnings".to_string(), self.warnings.to_string()),
            ("completion_rate".to_string(), format!("{:.2}", self.completion_rate)),
        ];
        if !self.quality_grades.is_empty() {
            rows.push(("reject_rate".to_string(), format!("{:.2}", self.reject_rate)));
            rows.push(("rework_rate".to_string(), format!("{:.2}", self.rework_rate)));
            rows.push(("total_weight_kg".to_string(), format!("{:.1}", self.total_weight_kg)));
        }
        for (category, count) in &self.violations_by_category {
            rows.push((format!("violations.{category}"), count.to_string()));
        }
        for (status, count) in &self.status_breakdown {
            rows.push((format!("status.{status}"), count.to_string()));
        }
        for (grade, count) in &self.quality_grades {
            rows.push((format!("quality.{grade}"), count.to_string()));
        }
        for customer in &self.top_customers_by_value {
            rows.push((format!("customer_value.{}", customer.name), format!("{:.2}", customer.total_value)));
        }
        rows
    }
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

/// Per-name totals in name order, so equal ranks keep a stable order.
fn customer_totals(accepted: &[ValidatedRecord]) -> Vec<CustomerTotal> {
    let mut totals: BTreeMap<&str, CustomerTotal> = BTreeMap::new();
    for v in accepted {
        let Some(name) = v.record.contact_name.as_option() else {
            continue;
        };
        let entry = totals.entry(name.as_str()).or_insert_with(|| CustomerTotal {
            name: name.clone(),
            orders: 0,
            total_value: 0.0,
        });
        entry.orders += 1;
        entry.total_value += v.record.amount.as_option().copied().unwrap_or(0.0);
    }
    totals.into_values().collect()
}

fn top_codes<'a>(codes: impl Iterator<Item = &'a String>, top_n: usize) -> Vec<CodeCount> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for code in codes {
        *counts.entry(code.as_str()).or_insert(0) += 1;
    }
    let mut ranked: Vec<CodeCount> = counts
        .into_iter()
        .map(|(code, count)| CodeCount {
            code: code.to_string(),
            count,
        })
        .collect();
    // BTreeMap order already breaks ties by code; the sort is stable
    ranked.sort_by(|a, b| b.count.cmp(&a.count));
    ranked.truncate(top_n);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CanonicalRecord, Field, Specification};
    use crate::pipeline::dispatch::{DispatchOutcome, NotificationResult};
    use crate::pipeline::processing::validate::{RuleCategory, Severity, Violation};

    fn report(top_codes: usize) -> ReportConfig {
        ReportConfig {
            top_codes,
            ..ReportConfig::default()
        }
    }

    fn validated(id: &str, origin: &str, amount: f64, severity: Option<Severity>) -> ValidatedRecord {
        let mut record = CanonicalRecord::empty(0);
        record.id = Field::Present(id.into());
        record.primary_code = Field::Present(origin.into());
        record.amount = Field::Present(amount);
        record.status = Field::Present("Confirmed".into());
        let violations = severity
            .map(|severity| Violation {
                record_id: id.into(),
                rule: "r".into(),
                category: if severity == Severity::Warning {
                    RuleCategory::Compatibility
                } else {
                    RuleCategory::Referential
                },
                severity,
                field: None,
                message: "m".into(),
            })
            .into_iter()
            .collect();
        ValidatedRecord { record, violations }
    }

    fn result(id: &str, outcome: DispatchOutcome) -> NotificationResult {
        NotificationResult {
            record_id: id.into(),
            contact_email: "x@example.com".into(),
            outcome,
            error: None,
            attempts: 1,
            elapsed_ms: 3,
        }
    }

    fn fixture() -> (Partition, DispatchReport) {
        let partition = Partition {
            accepted: vec![
                validated("A", "LAX", 100.0, None),
                validated("B", "JFK", 250.5, Some(Severity::Warning)),
                validated("C", "LAX", 49.5, None),
            ],
            rejected: vec![validated("D", "SEA", 10.0, Some(Severity::Error))],
            duplicates: vec!["A".into()],
        };
        let dispatch = DispatchReport {
            results: vec![result("B", DispatchOutcome::Failed), result("A", DispatchOutcome::Sent)],
            skipped: vec!["C".into()],
        };
        (partition, dispatch)
    }

    #[test]
    fn counts_rates_and_totals() {
        let (partition, dispatch) = fixture();
        let summary = Summary::compute(&partition, &dispatch, &report(10));

        assert_eq!(summary.total, 4);
        assert_eq!(summary.valid, 3);
        assert_eq!(summary.invalid, 1);
        assert_eq!(summary.duplicates, 1);
        assert_eq!((summary.sent, summary.failed, summary.skipped), (1, 1, 1));
        assert_eq!(summary.success_rate, 0.5);
        assert_eq!(summary.total_value, 400.0);
        assert_eq!(summary.min_amount, Some(49.5));
        assert_eq!(summary.max_amount, Some(250.5));
        assert_eq!(summary.warnings, 1);
        assert_eq!(summary.violations_by_category.get("referential"), Some(&1));
        assert_eq!(summary.status_breakdown.get("Confirmed"), Some(&4));
        assert_eq!(
            summary.top_primary_codes[0],
            CodeCount { code: "LAX".into(), count: 2 }
        );
        assert_eq!(summary.top_primary_codes[1].code, "JFK");
    }

    #[test]
    fn aggregation_is_deterministic_and_order_independent() {
        let (partition, mut dispatch) = fixture();
        let first = Summary::compute(&partition, &dispatch, &report(10));
        let second = Summary::compute(&partition, &dispatch, &report(10));
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );

        dispatch.results.reverse();
        assert_eq!(Summary::compute(&partition, &dispatch, &report(10)), first);
    }

    #[test]
    fn nothing_attempted_means_zero_success_rate() {
        let summary = Summary::compute(&Partition::default(), &DispatchReport::default(), &report(10));
        assert_eq!(summary.success_rate, 0.0);
        assert_eq!(summary.average_amount, 0.0);
        assert_eq!(summary.min_amount, None);
        assert_eq!(summary.validity_rate(), 0.0);
        assert_eq!(summary.completion_rate, 0.0);
        assert_eq!(summary.reject_rate, 0.0);
        assert!(summary.top_customers_by_value.is_empty());
    }

    fn order(id: &str, customer: &str, amount: f64, status: &str, grade: Option<&str>) -> ValidatedRecord {
        let mut v = validated(id, "A36", amount, None);
        v.record.contact_name = Field::Present(customer.into());
        v.record.status = Field::Present(status.into());
        v.record.specification = Some(Specification {
            weight_kg: Field::Present(1000.0),
            quality_grade: grade.map(str::to_string).into(),
            ..Default::default()
        });
        v
    }

    #[test]
    fn quality_completion_weight_and_customers() {
        let partition = Partition {
            accepted: vec![
                order("SO-1", "Acme", 500.0, "Shipped", Some("A")),
                order("SO-2", "Beta", 900.0, "In Production", Some("Rework")),
                order("SO-3", "Acme", 300.0, "Delivered", Some("A")),
                order("SO-4", "Cyan", 100.0, "Ready", None),
            ],
            rejected: vec![order("SO-5", "Beta", 50.0, "Shipped", Some("Reject"))],
            duplicates: Vec::new(),
        };
        let summary = Summary::compute(&partition, &DispatchReport::default(), &report(2));

        assert_eq!(summary.quality_grades.get("A"), Some(&2));
        assert_eq!(summary.quality_grades.get("unknown"), Some(&1));
        assert_eq!(summary.reject_rate, 20.0);
        assert_eq!(summary.rework_rate, 20.0);
        // Shipped, Delivered, Ready, Shipped out of five
        assert_eq!(summary.completion_rate, 80.0);
        // rejected orders do not count toward weight
        assert_eq!(summary.total_weight_kg, 4000.0);

        let by_value: Vec<(&str, f64)> = summary
            .top_customers_by_value
            .iter()
            .map(|c| (c.name.as_str(), c.total_value))
            .collect();
        assert_eq!(by_value, vec![("Beta", 900.0), ("Acme", 800.0)]);
        assert_eq!(summary.top_customers_by_orders[0].name, "Acme");
        assert_eq!(summary.top_customers_by_orders[0].orders, 2);
        // ties keep name order
        assert_eq!(summary.top_customers_by_orders[1].name, "Beta");

        let rows = summary.to_rows();
        assert!(rows.iter().any(|(k, v)| k == "reject_rate" && v == "20.00"));
        assert!(rows.iter().any(|(k, v)| k == "quality.Rework" && v == "1"));
    }

    #[test]
    fn flight_runs_have_no_quality_rows() {
        let (partition, dispatch) = fixture();
        let summary = Summary::compute(&partition, &dispatch, &report(10));
        assert!(summary.quality_grades.is_empty());
        assert_eq!(summary.total_weight_kg, 0.0);
        assert!(!summary.to_rows().iter().any(|(k, _)| k == "reject_rate"));
    }

    #[test]
    fn top_codes_are_truncated() {
        let (partition, dispatch) = fixture();
        let summary = Summary::compute(&partition, &dispatch, &report(1));
        assert_eq!(summary.top_primary_codes.len(), 1);
        assert!(summary.to_rows().iter().any(|(k, v)| k == "total" && v == "4"));
    }
}
