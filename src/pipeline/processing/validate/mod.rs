//! Record validation.
//!
//! Validation is an explicit rule table: an ordered list of
//! `(name, category, severity, check)` entries, each evaluated independently
//! against a canonical record. Adding or removing a rule is a data change on
//! [`RuleSet`], never a control-flow edit. Only error-severity violations
//! block acceptance; warnings are reported and let the record through.

pub mod rules;

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::RulesConfig;
use crate::domain::CanonicalRecord;
use crate::error::Result;
use crate::observability::metrics;

/// Severity levels for violations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Recorded for reporting, does not block acceptance
    Warning,
    /// Excludes the record from the accepted set
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule categories, in evaluation order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleCategory {
    RequiredField,
    Referential,
    NumericRange,
    Status,
    DateOrdering,
    Compatibility,
}

impl RuleCategory {
    /// Severity implied by the category
    pub fn severity(&self) -> Severity {
        match self {
            RuleCategory::Compatibility => Severity::Warning,
            _ => Severity::Error,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleCategory::RequiredField => "required_field",
            RuleCategory::Referential => "referential",
            RuleCategory::NumericRange => "numeric_range",
            RuleCategory::Status => "status",
            RuleCategory::DateOrdering => "date_ordering",
            RuleCategory::Compatibility => "compatibility",
        }
    }
}

impl fmt::Display for RuleCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single rule breach attached to a record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Identifier of the offending record (`row-N` when it has none)
    pub record_id: String,
    /// Name of the rule table entry that produced it
    pub rule: String,
    pub category: RuleCategory,
    pub severity: Severity,
    /// Field or attribute that triggered the violation
    pub field: Option<String>,
    /// Human-readable description
    pub message: String,
}

impl Violation {
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// What a rule check reports; the rule set turns findings into violations.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub field: Option<String>,
    pub message: String,
}

impl Finding {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.to_string()),
            message: message.into(),
        }
    }
}

/// Configuration a rule check may consult, with patterns compiled once.
#[derive(Debug, Clone)]
pub struct RuleContext {
    pub config: RulesConfig,
    pub identifier_pattern: Option<Regex>,
    pub batch_id_pattern: Option<Regex>,
}

fn compile(pattern: Option<&str>) -> Result<Option<Regex>> {
    Ok(pattern.map(Regex::new).transpose()?)
}

impl RuleContext {
    pub fn new(config: RulesConfig) -> Result<Self> {
        let identifier_pattern = compile(config.identifier_pattern.as_deref())?;
        let batch_id_pattern = compile(config.batch_id_pattern.as_deref())?;
        Ok(Self {
            config,
            identifier_pattern,
            batch_id_pattern,
        })
    }
}

pub type RuleCheck = fn(&CanonicalRecord, &RuleContext) -> Vec<Finding>;

/// One entry of the rule table
#[derive(Clone)]
pub struct Rule {
    pub name: &'static str,
    pub category: RuleCategory,
    pub severity: Severity,
    pub check: RuleCheck,
}

impl Rule {
    /// A rule whose severity follows its category
    pub fn new(name: &'static str, category: RuleCategory, check: RuleCheck) -> Self {
        Self {
            name,
            category,
            severity: category.severity(),
            check,
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("severity", &self.severity)
            .finish()
    }
}

/// The ordered rule table plus the context its checks read.
#[derive(Debug, Clone)]
pub struct RuleSet {
    context: RuleContext,
    rules: Vec<Rule>,
}

impl RuleSet {
    /// The standard rule table for the configured parameters
    pub fn from_config(config: &RulesConfig) -> Result<Self> {
        Ok(Self {
            context: RuleContext::new(config.clone())?,
            rules: rules::default_rules(),
        })
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn without_rule(mut self, name: &str) -> Self {
        self.rules.retain(|r| r.name != name);
        self
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Runs every rule, in table order, with no short-circuit.
    pub fn evaluate(&self, record: &CanonicalRecord) -> Vec<Violation> {
        let record_id = record.key();
        self.rules
            .iter()
            .flat_map(|rule| {
                (rule.check)(record, &self.context)
                    .into_iter()
                    .map(|finding| Violation {
                        record_id: record_id.clone(),
                        rule: rule.name.to_string(),
                        category: rule.category,
                        severity: rule.severity,
                        field: finding.field,
                        message: finding.message,
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

/// A canonical record together with every violation found for it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidatedRecord {
    pub record: CanonicalRecord,
    pub violations: Vec<Violation>,
}

impl ValidatedRecord {
    /// Accepted iff no error-severity violation is attached
    pub fn is_accepted(&self) -> bool {
        self.errors().next().is_none()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| v.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| !v.is_error())
    }
}

/// Trait for producing violations for canonical records
pub trait Validator: Send + Sync {
    fn validate(&self, record: &CanonicalRecord) -> Vec<Violation>;

    fn validate_batch(&self, records: Vec<CanonicalRecord>) -> Vec<ValidatedRecord> {
        records
            .into_iter()
            .map(|record| {
                let violations = self.validate(&record);
                ValidatedRecord { record, violations }
            })
            .collect()
    }
}

/// Validator backed by a [`RuleSet`]
pub struct DefaultValidator {
    rule_set: RuleSet,
}

impl DefaultValidator {
    pub fn new(rule_set: RuleSet) -> Self {
        Self { rule_set }
    }

    pub fn from_config(config: &RulesConfig) -> Result<Self> {
        Ok(Self::new(RuleSet::from_config(config)?))
    }
}

impl Validator for DefaultValidator {
    fn validate(&self, record: &CanonicalRecord) -> Vec<Violation> {
        let violations = self.rule_set.evaluate(record);
        metrics::validate::record_checked();
        for v in &violations {
            metrics::validate::violation(v.category.as_str(), v.severity.as_str());
            debug!(record = %v.record_id, rule = %v.rule, severity = %v.severity, "{}", v.message);
        }
        violations
    }

    #[instrument(skip(self, records), fields(count = records.len()))]
    fn validate_batch(&self, records: Vec<CanonicalRecord>) -> Vec<ValidatedRecord> {
        let validated: Vec<ValidatedRecord> = records
            .into_iter()
            .map(|record| {
                let violations = self.validate(&record);
                ValidatedRecord { record, violations }
            })
            .collect();

        let rejected = validated.iter().filter(|v| !v.is_accepted()).count();
        info!(
            rules = self.rule_set.rules().len(),
            "Validated {} records: {} pass, {} fail",
            validated.len(),
            validated.len() - rejected,
            rejected
        );
        validated
    }
}
