use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::{Map, Number, Value};
use tracing::{debug, instrument, warn};

use crate::config::FieldMap;
use crate::domain::{CanonicalRecord, Field, LifecycleDate, RawRecord, Specification};
use crate::observability::metrics;

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥'];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];
const CANONICAL_DATE_FORMAT: &str = "%Y-%m-%d";

/// Trait for turning loosely typed raw records into canonical records.
///
/// Normalization never fails: every raw record yields exactly one canonical
/// record, with unrecoverable fields marked missing.
pub trait Normalizer: Send + Sync {
    fn normalize(&self, raw: &RawRecord) -> CanonicalRecord;

    /// Normalize a whole snapshot, preserving input order
    fn normalize_batch(&self, raws: &[RawRecord]) -> Vec<CanonicalRecord> {
        let records: Vec<CanonicalRecord> = raws.iter().map(|r| self.normalize(r)).collect();
        metrics::normalize::batch_processed(records.len());
        records
    }
}

/// Normalizer driven by a `FieldMap` of source column names.
pub struct DefaultNormalizer {
    fields: FieldMap,
}

impl DefaultNormalizer {
    pub fn new(fields: FieldMap) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &FieldMap {
        &self.fields
    }

    fn amount(&self, raw: &RawRecord, column: &str) -> Field<f64> {
        let value = raw.get(column).unwrap_or(&Value::Null);
        match parse_amount(value) {
            Some(amount) => Field::Present(amount),
            None => {
                if !is_blank(value) {
                    warn!(row = raw.row, column, value = %value, "Unparsable numeric value, marking missing");
                    metrics::normalize::anomaly(column);
                }
                Field::Missing
            }
        }
    }

    fn text(&self, raw: &RawRecord, column: &str) -> Field<String> {
        raw.get(column).map(text_field).unwrap_or(Field::Missing)
    }

    fn optional_text(&self, raw: &RawRecord, column: Option<&str>) -> Field<String> {
        column.map(|c| self.text(raw, c)).unwrap_or(Field::Missing)
    }

    fn date(&self, raw: &RawRecord, column: &str) -> Field<NaiveDate> {
        let value = raw.get(column).unwrap_or(&Value::Null);
        match parse_date(value) {
            Some(date) => Field::Present(date),
            None => {
                if !is_blank(value) {
                    warn!(row = raw.row, column, value = %value, "Unparsable date, marking missing");
                    metrics::normalize::anomaly(column);
                }
                Field::Missing
            }
        }
    }
}

impl Normalizer for DefaultNormalizer {
    #[instrument(level = "trace", skip(self, raw), fields(row = raw.row))]
    fn normalize(&self, raw: &RawRecord) -> CanonicalRecord {
        let f = &self.fields;

        let dates = f
            .dates
            .iter()
            .map(|d| LifecycleDate {
                label: d.label.clone(),
                date: self.date(raw, &d.column),
            })
            .collect();

        let specification = f.specification.as_ref().map(|s| Specification {
            thickness_mm: self.amount(raw, &s.thickness),
            width_mm: self.amount(raw, &s.width),
            length_mm: self.amount(raw, &s.length),
            weight_kg: self.amount(raw, &s.weight),
            unit_price: self.amount(raw, &s.unit_price),
            quality_grade: self.text(raw, &s.quality_grade),
            batch_id: self.optional_text(raw, s.batch_id.as_deref()),
            production_line: self.optional_text(raw, s.production_line.as_deref()),
            warehouse: self.optional_text(raw, s.warehouse.as_deref()),
        });

        let record = CanonicalRecord {
            row: raw.row,
            id: self.text(raw, &f.identifier),
            primary_code: self.text(raw, &f.primary_code),
            secondary_code: self.text(raw, &f.secondary_code),
            amount: self.amount(raw, &f.amount),
            status: self.text(raw, &f.status),
            dates,
            email: self.text(raw, &f.email),
            phone: self.text(raw, &f.phone),
            contact_name: self.optional_text(raw, f.contact_name.as_deref()),
            specification,
        };

        metrics::normalize::record_processed();
        debug!(key = %record.key(), "Normalized record");
        record
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// Parses a monetary or measured value.
///
/// Numbers pass through. Text may carry one leading currency symbol,
/// surrounding whitespace and thousands separators. Anything else, including
/// non-finite numbers, is `None`.
pub fn parse_amount(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => {
            let trimmed = s.trim();
            let unprefixed = trimmed
                .strip_prefix(CURRENCY_SYMBOLS)
                .unwrap_or(trimmed)
                .trim();
            if unprefixed.is_empty() {
                return None;
            }
            unprefixed
                .replace(',', "")
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
        }
        _ => None,
    }
}

/// Parses a calendar date from the accepted textual forms.
pub fn parse_date(value: &Value) -> Option<NaiveDate> {
    let Value::String(s) = value else {
        return None;
    };
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
}

/// Trimmed text; numbers and booleans are rendered, blanks are missing.
pub fn text_field(value: &Value) -> Field<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Field::Missing
            } else {
                Field::Present(trimmed.to_string())
            }
        }
        Value::Number(n) => Field::Present(n.to_string()),
        Value::Bool(b) => Field::Present(b.to_string()),
        _ => Field::Missing,
    }
}

fn text_value(field: &Field<String>) -> Value {
    field
        .as_option()
        .map(|s| Value::String(s.clone()))
        .unwrap_or(Value::Null)
}

fn number_value(field: &Field<f64>) -> Value {
    field
        .as_option()
        .and_then(|v| Number::from_f64(*v))
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

impl CanonicalRecord {
    /// Renders the record back into a raw mapping using `fields` as column names.
    pub fn to_raw(&self, fields: &FieldMap) -> RawRecord {
        let mut map = Map::new();
        map.insert(fields.identifier.clone(), text_value(&self.id));
        map.insert(fields.primary_code.clone(), text_value(&self.primary_code));
        map.insert(fields.secondary_code.clone(), text_value(&self.secondary_code));
        map.insert(fields.amount.clone(), number_value(&self.amount));
        map.insert(fields.status.clone(), text_value(&self.status));
        map.insert(fields.email.clone(), text_value(&self.email));
        map.insert(fields.phone.clone(), text_value(&self.phone));
        if let Some(column) = &fields.contact_name {
            map.insert(column.clone(), text_value(&self.contact_name));
        }

        for column in &fields.dates {
            let value = self
                .date(&column.label)
                .map(|d| Value::String(d.format(CANONICAL_DATE_FORMAT).to_string()))
                .unwrap_or(Value::Null);
            map.insert(column.column.clone(), value);
        }

        if let (Some(columns), Some(spec)) = (&fields.specification, &self.specification) {
            map.insert(columns.thickness.clone(), number_value(&spec.thickness_mm));
            map.insert(columns.width.clone(), number_value(&spec.width_mm));
            map.insert(columns.length.clone(), number_value(&spec.length_mm));
            map.insert(columns.weight.clone(), number_value(&spec.weight_kg));
            map.insert(columns.unit_price.clone(), number_value(&spec.unit_price));
            map.insert(columns.quality_grade.clone(), text_value(&spec.quality_grade));
            let optional = [
                (&columns.batch_id, &spec.batch_id),
                (&columns.production_line, &spec.production_line),
                (&columns.warehouse, &spec.warehouse),
            ];
            for (column, value) in optional {
                if let Some(column) = column {
                    map.insert(column.clone(), text_value(value));
                }
            }
        }

        RawRecord {
            row: self.row,
            fields: map,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Domain;
    use serde_json::json;

    fn flight_normalizer() -> DefaultNormalizer {
        DefaultNormalizer::new(FieldMap::for_domain(Domain::Flight))
    }

    #[test]
    fn currency_strings_are_parsed() {
        assert_eq!(parse_amount(&json!("$2097.46")), Some(2097.46));
        assert_eq!(parse_amount(&json!("  $ 100.00 ")), Some(100.0));
        assert_eq!(parse_amount(&json!("€2,097.46")), Some(2097.46));
        assert_eq!(parse_amount(&json!("-12.5")), Some(-12.5));
    }

    #[test]
    fn unparsable_amount_is_missing_not_zero() {
        assert_eq!(parse_amount(&json!("$abc")), None);
        assert_eq!(parse_amount(&json!("$")), None);
        assert_eq!(parse_amount(&json!("$$5")), None);
        assert_eq!(parse_amount(&json!("NaN")), None);
        assert_eq!(parse_amount(&json!(null)), None);

        let raw = RawRecord::new(0).with("PNR", "ABC123").with("Fare", "$abc");
        let record = flight_normalizer().normalize(&raw);
        assert_eq!(record.amount, Field::Missing);
    }

    #[test]
    fn numeric_amount_passes_through() {
        assert_eq!(parse_amount(&json!(1500)), Some(1500.0));
        let raw = RawRecord::new(0).with("Fare", 1500);
        assert_eq!(flight_normalizer().normalize(&raw).amount, Field::Present(1500.0));
    }

    #[test]
    fn dates_accept_several_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 15);
        assert_eq!(parse_date(&json!("2024-03-15")), expected);
        assert_eq!(parse_date(&json!("03/15/2024")), expected);
        assert_eq!(parse_date(&json!("2024-03-15 08:30:00")), expected);
        assert_eq!(parse_date(&json!("2024-03-15T08:30:00+02:00")), expected);
        assert_eq!(parse_date(&json!("next tuesday")), None);
        assert_eq!(parse_date(&json!(20240315)), None);
    }

    #[test]
    fn absent_contact_fields_are_explicitly_missing() {
        let raw = RawRecord::new(3)
            .with("PNR", "ABC123")
            .with("Email", "")
            .with("Phone", serde_json::Value::Null);
        let record = flight_normalizer().normalize(&raw);
        assert_eq!(record.email, Field::Missing);
        assert_eq!(record.phone, Field::Missing);
        assert_eq!(record.contact_name, Field::Missing);
        assert_eq!(record.row, 3);
    }

    #[test]
    fn normalizing_a_canonical_record_is_idempotent() {
        let normalizer = flight_normalizer();
        let raw = RawRecord::new(1)
            .with("PNR", " ABC123 ")
            .with("Origin", "LAX")
            .with("Destination", "JFK")
            .with("Fare", "$1,234.50")
            .with("Status", "Confirmed")
            .with("BookingDate", "01/10/2024")
            .with("TravelDate", "2024-02-01 09:15:00")
            .with("Email", "jane@example.com")
            .with("Phone", "(555) 123-4567")
            .with("Passenger", "Jane Doe");

        let once = normalizer.normalize(&raw);
        let twice = normalizer.normalize(&once.to_raw(normalizer.fields()));
        assert_eq!(once, twice);
        assert_eq!(once.amount, Field::Present(1234.5));
        assert_eq!(once.identifier(), Some("ABC123"));
    }

    #[test]
    fn steel_specification_is_normalized() {
        let normalizer = DefaultNormalizer::new(FieldMap::for_domain(Domain::Steel));
        let raw = RawRecord::new(0)
            .with("OrderID", "SO-2024-0001")
            .with("Thickness", "12.5")
            .with("Width", 1500)
            .with("Length", "n/a")
            .with("UnitPrice", "$850.00")
            .with("QualityGrade", "A")
            .with("BatchID", " B-240117 ")
            .with("Warehouse", "WH-North");

        let record = normalizer.normalize(&raw);
        let spec = record.specification.clone().unwrap();
        assert_eq!(spec.thickness_mm, Field::Present(12.5));
        assert_eq!(spec.width_mm, Field::Present(1500.0));
        assert_eq!(spec.length_mm, Field::Missing);
        assert_eq!(spec.weight_kg, Field::Missing);
        assert_eq!(spec.unit_price, Field::Present(850.0));
        assert_eq!(spec.quality_grade, Field::Present("A".to_string()));
        assert_eq!(spec.batch_id, Field::Present("B-240117".to_string()));
        assert_eq!(spec.production_line, Field::Missing);
        assert_eq!(spec.warehouse, Field::Present("WH-North".to_string()));
        assert_eq!(record.dates.len(), 3);

        let again = normalizer.normalize(&record.to_raw(normalizer.fields()));
        assert_eq!(record, again);
    }
}
