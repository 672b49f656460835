//! Record shapes shared across the pipeline stages.
//!
//! Raw records are loosely typed field mappings exactly as the input
//! collaborator produced them. Canonical records are what the normalizer
//! decides once: every field is typed and absence is explicit.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::PipelineError;

/// The two structurally interchangeable record families the pipeline handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// Flight reservations keyed by PNR, codes are origin/destination airports.
    Flight,
    /// Steel orders keyed by order id, codes are steel grade/type.
    Steel,
}

impl Domain {
    pub fn as_str(&self) -> &'static str {
        match self {
            Domain::Flight => "flight",
            Domain::Steel => "steel",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flight" | "flights" => Ok(Domain::Flight),
            "steel" => Ok(Domain::Steel),
            other => Err(PipelineError::Config(format!(
                "unknown domain '{other}', expected 'flight' or 'steel'"
            ))),
        }
    }
}

/// A canonical field value: either supplied or explicitly absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Field<T> {
    Present(T),
    Missing,
}

impl<T> Field<T> {
    pub fn as_option(&self) -> Option<&T> {
        match self {
            Field::Present(v) => Some(v),
            Field::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Field::Missing)
    }
}

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Missing
    }
}

impl<T> From<Option<T>> for Field<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => Field::Present(v),
            None => Field::Missing,
        }
    }
}

/// One row as supplied by the input collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// Zero-based position in the input snapshot
    pub row: usize,
    /// Source column name to loosely typed value
    pub fields: Map<String, Value>,
}

impl RawRecord {
    pub fn new(row: usize) -> Self {
        Self {
            row,
            fields: Map::new(),
        }
    }

    /// Builder-style insert, handy for tests and in-memory sources.
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

/// A labelled lifecycle date, e.g. booking -> travel or order -> production -> delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleDate {
    pub label: String,
    pub date: Field<NaiveDate>,
}

/// Physical order specification carried by steel orders.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Specification {
    pub thickness_mm: Field<f64>,
    pub width_mm: Field<f64>,
    pub length_mm: Field<f64>,
    pub weight_kg: Field<f64>,
    /// Price per metric ton
    pub unit_price: Field<f64>,
    pub quality_grade: Field<String>,
    pub batch_id: Field<String>,
    pub production_line: Field<String>,
    pub warehouse: Field<String>,
}

/// A record after normalization. Never mutated once validation begins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    pub row: usize,
    pub id: Field<String>,
    /// Origin airport or steel grade
    pub primary_code: Field<String>,
    /// Destination airport or steel type
    pub secondary_code: Field<String>,
    pub amount: Field<f64>,
    pub status: Field<String>,
    pub dates: Vec<LifecycleDate>,
    pub email: Field<String>,
    pub phone: Field<String>,
    pub contact_name: Field<String>,
    pub specification: Option<Specification>,
}

impl CanonicalRecord {
    /// An empty record for `row`; every field missing.
    pub fn empty(row: usize) -> Self {
        Self {
            row,
            id: Field::Missing,
            primary_code: Field::Missing,
            secondary_code: Field::Missing,
            amount: Field::Missing,
            status: Field::Missing,
            dates: Vec::new(),
            email: Field::Missing,
            phone: Field::Missing,
            contact_name: Field::Missing,
            specification: None,
        }
    }

    pub fn identifier(&self) -> Option<&str> {
        self.id.as_option().map(String::as_str)
    }

    /// Identifier used in violations and results; falls back to the row
    /// position when the source supplied no identifier.
    pub fn key(&self) -> String {
        match self.identifier() {
            Some(id) => id.to_string(),
            None => format!("row-{}", self.row),
        }
    }

    pub fn contact_email(&self) -> Option<&str> {
        self.email
            .as_option()
            .map(String::as_str)
            .filter(|e| !e.trim().is_empty())
    }

    pub fn date(&self, label: &str) -> Option<NaiveDate> {
        self.dates
            .iter()
            .find(|d| d.label == label)
            .and_then(|d| d.date.as_option().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_falls_back_to_row() {
        let mut record = CanonicalRecord::empty(7);
        assert_eq!(record.key(), "row-7");

        record.id = Field::Present("ABC123".to_string());
        assert_eq!(record.key(), "ABC123");
    }

    #[test]
    fn blank_email_is_not_a_contact() {
        let mut record = CanonicalRecord::empty(0);
        record.email = Field::Present("   ".to_string());
        assert_eq!(record.contact_email(), None);

        record.email = Field::Present("a@b.com".to_string());
        assert_eq!(record.contact_email(), Some("a@b.com"));
    }

    #[test]
    fn domain_parses_case_insensitively() {
        assert_eq!("Steel".parse::<Domain>().unwrap(), Domain::Steel);
        assert_eq!("flight".parse::<Domain>().unwrap(), Domain::Flight);
        assert!("rail".parse::<Domain>().is_err());
    }
}
