use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::config::{TemplateConfig, TemplateVariant};
use crate::domain::{CanonicalRecord, Field};

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([a-z_]+)\}").unwrap());

const NOT_AVAILABLE: &str = "N/A";
const DEFAULT_NAME: &str = "Customer";

/// Rendered notification payload handed to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub subject: String,
    pub body: String,
}

/// Subject/body template with `{placeholder}` substitution.
///
/// Variants are tried in order against the record's status and quality
/// grade; the base subject and body apply when none matches.
#[derive(Debug, Clone)]
pub struct MessageTemplate {
    subject: String,
    body: String,
    status_messages: BTreeMap<String, String>,
    default_status_message: String,
    variants: Vec<TemplateVariant>,
}

impl From<&TemplateConfig> for MessageTemplate {
    fn from(config: &TemplateConfig) -> Self {
        Self {
            subject: config.subject.clone(),
            body: config.body.clone(),
            status_messages: config.status_messages.clone(),
            default_status_message: config.default_status_message.clone(),
            variants: config.variants.clone(),
        }
    }
}

impl MessageTemplate {
    pub fn new(subject: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            status_messages: BTreeMap::new(),
            default_status_message: String::new(),
            variants: Vec::new(),
        }
    }

    pub fn with_variant(mut self, variant: TemplateVariant) -> Self {
        self.variants.push(variant);
        self
    }

    /// Variant used for `record`, `None` when the base template applies
    pub fn variant_for(&self, record: &CanonicalRecord) -> Option<&TemplateVariant> {
        let status = record.status.as_option().map(String::as_str);
        let grade = record
            .specification
            .as_ref()
            .and_then(|s| s.quality_grade.as_option())
            .map(String::as_str);
        self.variants.iter().find(|v| v.matches(status, grade))
    }

    pub fn render(&self, record: &CanonicalRecord) -> NotificationMessage {
        let values = self.values(record);
        let (subject, body) = match self.variant_for(record) {
            Some(variant) => (&variant.subject, &variant.body),
            None => (&self.subject, &self.body),
        };
        NotificationMessage {
            subject: fill(subject, &values),
            body: fill(body, &values),
        }
    }

    fn values(&self, record: &CanonicalRecord) -> HashMap<String, String> {
        let text = |field: &Field<String>| {
            field
                .as_option()
                .cloned()
                .unwrap_or_else(|| NOT_AVAILABLE.to_string())
        };
        let number = |field: &Field<f64>, precision: Option<usize>| match (field.as_option(), precision) {
            (Some(v), Some(p)) => format!("{v:.p$}"),
            (Some(v), None) => v.to_string(),
            (None, _) => NOT_AVAILABLE.to_string(),
        };

        let mut values = HashMap::new();
        values.insert("id".to_string(), record.key());
        values.insert(
            "name".to_string(),
            record
                .contact_name
                .as_option()
                .cloned()
                .unwrap_or_else(|| DEFAULT_NAME.to_string()),
        );
        values.insert("primary_code".to_string(), text(&record.primary_code));
        values.insert("secondary_code".to_string(), text(&record.secondary_code));
        values.insert("status".to_string(), text(&record.status));
        values.insert(
            "amount".to_string(),
            record
                .amount
                .as_option()
                .map(|a| format!("{a:.2}"))
                .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
        );

        let status_message = record
            .status
            .as_option()
            .and_then(|s| self.status_messages.get(s))
            .unwrap_or(&self.default_status_message);
        values.insert("status_message".to_string(), status_message.clone());

        let spec = record.specification.clone().unwrap_or_default();
        values.insert("thickness".to_string(), number(&spec.thickness_mm, None));
        values.insert("width".to_string(), number(&spec.width_mm, None));
        values.insert("length".to_string(), number(&spec.length_mm, None));
        values.insert("weight".to_string(), number(&spec.weight_kg, Some(1)));
        values.insert("unit_price".to_string(), number(&spec.unit_price, Some(2)));
        values.insert("quality_grade".to_string(), text(&spec.quality_grade));
        values.insert("batch_id".to_string(), text(&spec.batch_id));
        values.insert("production_line".to_string(), text(&spec.production_line));
        values.insert("warehouse".to_string(), text(&spec.warehouse));

        for entry in &record.dates {
            let rendered = entry
                .date
                .as_option()
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| NOT_AVAILABLE.to_string());
            values.insert(format!("{}_date", entry.label), rendered);
        }
        values
    }
}

/// Unknown placeholders are left untouched.
fn fill(template: &str, values: &HashMap<String, String>) -> String {
    PLACEHOLDER_RE
        .replace_all(template, |caps: &Captures| match values.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}
