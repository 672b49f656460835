use once_cell::sync::Lazy;
use regex::Regex;

use super::{Finding, Rule, RuleCategory, RuleContext};
use crate::config::StatusConstraint;
use crate::constants::{EMAIL_PATTERN, PHONE_PATTERN};
use crate::domain::{CanonicalRecord, Field};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(EMAIL_PATTERN).unwrap());
static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(PHONE_PATTERN).unwrap());

/// The standard rule table, in evaluation order.
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule::new("required_fields", RuleCategory::RequiredField, required_fields),
        Rule::new("identifier_format", RuleCategory::RequiredField, identifier_format),
        Rule::new("email_format", RuleCategory::RequiredField, email_format),
        Rule::new("phone_format", RuleCategory::RequiredField, phone_format),
        Rule::new("contact_name", RuleCategory::RequiredField, contact_name),
        Rule::new("batch_id_format", RuleCategory::RequiredField, batch_id_format),
        Rule::new("known_codes", RuleCategory::Referential, known_codes),
        Rule::new("distinct_codes", RuleCategory::Referential, distinct_codes),
        Rule::new("production_site", RuleCategory::Referential, production_site),
        Rule::new("amount_range", RuleCategory::NumericRange, amount_range),
        Rule::new("dimensions", RuleCategory::NumericRange, dimensions),
        Rule::new("pricing_consistency", RuleCategory::NumericRange, pricing_consistency),
        Rule::new("allowed_status", RuleCategory::Status, allowed_status),
        Rule::new("quality_status", RuleCategory::Status, quality_status),
        Rule::new("date_order", RuleCategory::DateOrdering, date_order),
        Rule::new("lead_time", RuleCategory::DateOrdering, lead_time),
        Rule::new("compatibility", RuleCategory::Compatibility, compatibility),
    ]
}

fn text(field: &Field<String>) -> Option<&str> {
    field.as_option().map(String::as_str)
}

fn deviation_pct(actual: f64, expected: f64) -> f64 {
    ((actual - expected) / expected).abs() * 100.0
}

/// Identifier, both codes and the amount must be present. Email is optional.
pub fn required_fields(record: &CanonicalRecord, _ctx: &RuleContext) -> Vec<Finding> {
    let mut findings = Vec::new();
    if record.id.is_missing() {
        findings.push(Finding::new("id", "identifier is missing"));
    }
    if record.primary_code.is_missing() {
        findings.push(Finding::new("primary_code", "primary code is missing"));
    }
    if record.secondary_code.is_missing() {
        findings.push(Finding::new("secondary_code", "secondary code is missing"));
    }
    if record.amount.is_missing() {
        findings.push(Finding::new("amount", "amount is missing or not a number"));
    }
    findings
}

pub fn identifier_format(record: &CanonicalRecord, ctx: &RuleContext) -> Vec<Finding> {
    match (record.identifier(), &ctx.identifier_pattern) {
        (Some(id), Some(pattern)) if !pattern.is_match(id) => vec![Finding::new(
            "id",
            format!("identifier '{id}' does not match {}", pattern.as_str()),
        )],
        _ => Vec::new(),
    }
}

/// A present email must be well formed; an absent one is a dispatch skip.
pub fn email_format(record: &CanonicalRecord, _ctx: &RuleContext) -> Vec<Finding> {
    match text(&record.email) {
        Some(email) if !EMAIL_RE.is_match(email) => {
            vec![Finding::new("email", format!("invalid email format: '{email}'"))]
        }
        _ => Vec::new(),
    }
}

pub fn phone_format(record: &CanonicalRecord, _ctx: &RuleContext) -> Vec<Finding> {
    match text(&record.phone) {
        Some(phone) if !PHONE_RE.is_match(phone) => {
            vec![Finding::new("phone", format!("invalid phone format: '{phone}'"))]
        }
        _ => Vec::new(),
    }
}

/// Required only when a minimum length is configured.
pub fn contact_name(record: &CanonicalRecord, ctx: &RuleContext) -> Vec<Finding> {
    let Some(min) = ctx.config.contact_name_min_len else {
        return Vec::new();
    };
    match text(&record.contact_name) {
        None => vec![Finding::new("contact_name", "contact name is missing")],
        Some(name) if name.trim().chars().count() < min => vec![Finding::new(
            "contact_name",
            format!("contact name '{name}' is shorter than {min} characters"),
        )],
        Some(_) => Vec::new(),
    }
}

pub fn batch_id_format(record: &CanonicalRecord, ctx: &RuleContext) -> Vec<Finding> {
    let (Some(pattern), Some(spec)) = (&ctx.batch_id_pattern, &record.specification) else {
        return Vec::new();
    };
    match text(&spec.batch_id) {
        None => vec![Finding::new("batch_id", "batch id is missing")],
        Some(batch) if !pattern.is_match(batch) => vec![Finding::new(
            "batch_id",
            format!("batch id '{batch}' does not match {}", pattern.as_str()),
        )],
        Some(_) => Vec::new(),
    }
}

pub fn known_codes(record: &CanonicalRecord, ctx: &RuleContext) -> Vec<Finding> {
    let mut findings = Vec::new();
    if let Some(code) = text(&record.primary_code) {
        if !ctx.config.valid_codes.contains(code) {
            findings.push(Finding::new("primary_code", format!("unknown code '{code}'")));
        }
    }
    if let Some(code) = text(&record.secondary_code) {
        if !ctx.config.secondary_codes().contains(code) {
            findings.push(Finding::new("secondary_code", format!("unknown code '{code}'")));
        }
    }
    findings
}

/// A record may not reference the same code on both sides.
pub fn distinct_codes(record: &CanonicalRecord, _ctx: &RuleContext) -> Vec<Finding> {
    match (text(&record.primary_code), text(&record.secondary_code)) {
        (Some(a), Some(b)) if a.eq_ignore_ascii_case(b) => vec![Finding::new(
            "secondary_code",
            format!("primary and secondary codes are both '{a}'"),
        )],
        _ => Vec::new(),
    }
}

/// Production line and warehouse must come from their configured lists.
pub fn production_site(record: &CanonicalRecord, ctx: &RuleContext) -> Vec<Finding> {
    let Some(spec) = &record.specification else {
        return Vec::new();
    };
    let checks = [
        ("production_line", &spec.production_line, &ctx.config.allowed_production_lines),
        ("warehouse", &spec.warehouse, &ctx.config.allowed_warehouses),
    ];

    let mut findings = Vec::new();
    for (name, value, allowed) in checks {
        let Some(allowed) = allowed else {
            continue;
        };
        match text(value) {
            None => findings.push(Finding::new(name, format!("{name} is missing"))),
            Some(v) if !allowed.contains(v) => {
                findings.push(Finding::new(name, format!("unknown {name} '{v}'")))
            }
            Some(_) => {}
        }
    }
    findings
}

pub fn amount_range(record: &CanonicalRecord, ctx: &RuleContext) -> Vec<Finding> {
    let Some(&amount) = record.amount.as_option() else {
        return Vec::new();
    };
    let mut findings = Vec::new();
    if amount <= ctx.config.amount_min {
        findings.push(Finding::new(
            "amount",
            format!("amount {amount:.2} must be greater than {}", ctx.config.amount_min),
        ));
    }
    if let Some(max) = ctx.config.amount_max {
        if amount > max {
            findings.push(Finding::new(
                "amount",
                format!("amount {amount:.2} exceeds maximum {max}"),
            ));
        }
    }
    findings
}

/// Dimension bounds, weight cap and the computed-weight cross check.
pub fn dimensions(record: &CanonicalRecord, ctx: &RuleContext) -> Vec<Finding> {
    let (Some(bounds), Some(spec)) = (&ctx.config.dimension_bounds, &record.specification) else {
        return Vec::new();
    };
    let mut findings = Vec::new();

    let measured = [
        ("thickness_mm", &spec.thickness_mm, bounds.thickness_mm),
        ("width_mm", &spec.width_mm, bounds.width_mm),
        ("length_mm", &spec.length_mm, bounds.length_mm),
    ];
    for (name, value, range) in measured {
        match value.as_option() {
            None => findings.push(Finding::new(name, format!("{name} is missing"))),
            Some(&v) if !range.contains(v) => findings.push(Finding::new(
                name,
                format!("{name} {v} outside {}..={}", range.min, range.max),
            )),
            Some(_) => {}
        }
    }

    match spec.weight_kg.as_option() {
        None => findings.push(Finding::new("weight_kg", "weight_kg is missing")),
        Some(&w) if w <= 0.0 || w > bounds.max_weight_kg => findings.push(Finding::new(
            "weight_kg",
            format!("weight_kg {w} outside 0..={}", bounds.max_weight_kg),
        )),
        Some(&w) => {
            if let (Some(t), Some(wd), Some(l)) = (
                spec.thickness_mm.as_option(),
                spec.width_mm.as_option(),
                spec.length_mm.as_option(),
            ) {
                let computed = (t / 1000.0) * (wd / 1000.0) * (l / 1000.0) * bounds.density_kg_m3;
                if computed > 0.0
                    && deviation_pct(w, computed) > ctx.config.dimensional_tolerance_pct
                {
                    findings.push(Finding::new(
                        "weight_kg",
                        format!(
                            "weight {w:.1} kg deviates from computed {computed:.1} kg by more than {}%",
                            ctx.config.dimensional_tolerance_pct
                        ),
                    ));
                }
            }
        }
    }
    findings
}

/// Total price must match weight (tonnes) times unit price.
pub fn pricing_consistency(record: &CanonicalRecord, ctx: &RuleContext) -> Vec<Finding> {
    let Some(spec) = &record.specification else {
        return Vec::new();
    };
    let (Some(&weight), Some(&unit_price), Some(&total)) = (
        spec.weight_kg.as_option(),
        spec.unit_price.as_option(),
        record.amount.as_option(),
    ) else {
        return Vec::new();
    };
    let expected = weight / 1000.0 * unit_price;
    if expected <= 0.0 || deviation_pct(total, expected) <= ctx.config.price_tolerance_pct {
        return Vec::new();
    }
    vec![Finding::new(
        "amount",
        format!(
            "total {total:.2} deviates from expected {expected:.2} by more than {}%",
            ctx.config.price_tolerance_pct
        ),
    )]
}

pub fn allowed_status(record: &CanonicalRecord, ctx: &RuleContext) -> Vec<Finding> {
    match text(&record.status) {
        None => vec![Finding::new("status", "status is missing")],
        Some(status) if !ctx.config.allowed_statuses.contains(status) => {
            vec![Finding::new("status", format!("status '{status}' is not allowed"))]
        }
        Some(_) => Vec::new(),
    }
}

/// Quality grade membership and the configured grade/status constraints.
///
/// With a configured grade list the grade is required on every record that
/// carries a specification.
pub fn quality_status(record: &CanonicalRecord, ctx: &RuleContext) -> Vec<Finding> {
    let Some(spec) = &record.specification else {
        return Vec::new();
    };
    let Some(grade) = text(&spec.quality_grade) else {
        return match ctx.config.allowed_quality_grades {
            Some(_) => vec![Finding::new("quality_grade", "quality grade is missing")],
            None => Vec::new(),
        };
    };
    let mut findings = Vec::new();

    if let Some(allowed) = &ctx.config.allowed_quality_grades {
        if !allowed.contains(grade) {
            findings.push(Finding::new("quality_grade", format!("unknown quality grade '{grade}'")));
        }
    }

    let status = text(&record.status).unwrap_or_default();
    for constraint in &ctx.config.status_constraints {
        match constraint {
            StatusConstraint::RequiresStatus { quality_grade, statuses } => {
                if quality_grade == grade && !statuses.iter().any(|s| s == status) {
                    findings.push(Finding::new(
                        "status",
                        format!("quality grade '{grade}' requires status in {statuses:?}, got '{status}'"),
                    ));
                }
            }
            StatusConstraint::ForbidsQuality { status: forbidding, quality_grades } => {
                if forbidding == status && quality_grades.iter().any(|q| q == grade) {
                    findings.push(Finding::new(
                        "status",
                        format!("status '{status}' is not allowed with quality grade '{grade}'"),
                    ));
                }
            }
        }
    }
    findings
}

/// Present lifecycle dates must be non-decreasing; one finding per offending pair.
pub fn date_order(record: &CanonicalRecord, _ctx: &RuleContext) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut previous: Option<(&str, chrono::NaiveDate)> = None;

    for entry in &record.dates {
        let Some(&date) = entry.date.as_option() else {
            continue;
        };
        if let Some((label, earlier)) = previous {
            if date < earlier {
                findings.push(Finding::new(
                    &format!("{}_date", entry.label),
                    format!("{} date {date} precedes {label} date {earlier}", entry.label),
                ));
            }
        }
        previous = Some((entry.label.as_str(), date));
    }
    findings
}

/// Configured maximum gaps between lifecycle dates. Missing dates are skipped.
pub fn lead_time(record: &CanonicalRecord, ctx: &RuleContext) -> Vec<Finding> {
    ctx.config
        .lead_times
        .iter()
        .filter_map(|limit| {
            let from = record.date(&limit.from)?;
            let to = record.date(&limit.to)?;
            let days = (to - from).num_days();
            (days > limit.max_days).then(|| {
                Finding::new(
                    &format!("{}_date", limit.to),
                    format!(
                        "{} date is {days} days after {} date, limit is {}",
                        limit.to, limit.from, limit.max_days
                    ),
                )
            })
        })
        .collect()
}

/// Taxonomy mismatches between the two codes; reported as warnings.
pub fn compatibility(record: &CanonicalRecord, ctx: &RuleContext) -> Vec<Finding> {
    let (Some(primary), Some(secondary)) = (text(&record.primary_code), text(&record.secondary_code))
    else {
        return Vec::new();
    };
    let mut findings = Vec::new();
    for rule in ctx.config.compatibility.iter().filter(|r| r.applies_to(primary)) {
        if let Some(expected) = &rule.expects {
            if expected != secondary {
                findings.push(Finding::new(
                    "secondary_code",
                    format!("'{primary}' usually ships as '{expected}', got '{secondary}'"),
                ));
            }
        }
        if rule.forbids.iter().any(|f| f == secondary) {
            findings.push(Finding::new(
                "secondary_code",
                format!("'{primary}' is incompatible with '{secondary}'"),
            ));
        }
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RulesConfig;
    use crate::domain::{Domain, LifecycleDate, Specification};
    use chrono::NaiveDate;

    fn ctx(domain: Domain) -> RuleContext {
        RuleContext::new(RulesConfig::for_domain(domain)).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> Field<NaiveDate> {
        Field::Present(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn steel_order() -> CanonicalRecord {
        let mut record = CanonicalRecord::empty(0);
        record.id = Field::Present("SO-2024-0001".into());
        record.primary_code = Field::Present("A36".into());
        record.secondary_code = Field::Present("Hot Rolled".into());
        record.status = Field::Present("In Production".into());
        // 10 x 1500 x 8000 mm plate: 942 kg
        record.specification = Some(Specification {
            thickness_mm: Field::Present(10.0),
            width_mm: Field::Present(1500.0),
            length_mm: Field::Present(8000.0),
            weight_kg: Field::Present(942.0),
            unit_price: Field::Present(800.0),
            quality_grade: Field::Present("A".into()),
            batch_id: Field::Present("B-240110".into()),
            production_line: Field::Present("Line-A1".into()),
            warehouse: Field::Present("WH-North".into()),
        });
        record.amount = Field::Present(753.6);
        record.dates = vec![
            LifecycleDate { label: "order".into(), date: date(2024, 1, 10) },
            LifecycleDate { label: "production".into(), date: date(2024, 1, 20) },
            LifecycleDate { label: "delivery".into(), date: date(2024, 2, 1) },
        ];
        record
    }

    #[test]
    fn missing_email_is_not_a_violation_but_malformed_is() {
        let mut record = CanonicalRecord::empty(0);
        assert!(email_format(&record, &ctx(Domain::Flight)).is_empty());

        record.email = Field::Present("not-an-email".into());
        assert_eq!(email_format(&record, &ctx(Domain::Flight)).len(), 1);
    }

    #[test]
    fn amount_must_be_strictly_positive() {
        let mut record = CanonicalRecord::empty(0);
        record.amount = Field::Present(0.0);
        assert_eq!(amount_range(&record, &ctx(Domain::Flight)).len(), 1);
        record.amount = Field::Present(0.01);
        assert!(amount_range(&record, &ctx(Domain::Flight)).is_empty());
        record.amount = Field::Missing;
        assert!(amount_range(&record, &ctx(Domain::Flight)).is_empty());
    }

    #[test]
    fn identifier_pattern_is_enforced() {
        let mut record = CanonicalRecord::empty(0);
        record.id = Field::Present("abc".into());
        assert_eq!(identifier_format(&record, &ctx(Domain::Flight)).len(), 1);
        record.id = Field::Present("AB12CD".into());
        assert!(identifier_format(&record, &ctx(Domain::Flight)).is_empty());
    }

    #[test]
    fn each_out_of_order_pair_is_reported() {
        let mut record = CanonicalRecord::empty(0);
        record.dates = vec![
            LifecycleDate { label: "order".into(), date: date(2024, 5, 10) },
            LifecycleDate { label: "production".into(), date: date(2024, 5, 1) },
            LifecycleDate { label: "delivery".into(), date: date(2024, 4, 1) },
        ];
        assert_eq!(date_order(&record, &ctx(Domain::Steel)).len(), 2);

        record.dates[1].date = Field::Missing;
        let findings = date_order(&record, &ctx(Domain::Steel));
        assert_eq!(findings.len(), 1);
        assert!(findings[0].message.contains("order date"));
    }

    #[test]
    fn consistent_steel_order_passes_numeric_checks() {
        let record = steel_order();
        let ctx = ctx(Domain::Steel);
        assert!(dimensions(&record, &ctx).is_empty());
        assert!(pricing_consistency(&record, &ctx).is_empty());
        assert!(quality_status(&record, &ctx).is_empty());
        assert!(compatibility(&record, &ctx).is_empty());
        assert!(batch_id_format(&record, &ctx).is_empty());
        assert!(production_site(&record, &ctx).is_empty());
        assert!(lead_time(&record, &ctx).is_empty());
    }

    #[test]
    fn missing_quality_grade_is_flagged_when_grades_are_configured() {
        let mut record = steel_order();
        record.status = Field::Present("Shipped".into());
        if let Some(spec) = record.specification.as_mut() {
            spec.quality_grade = Field::Missing;
        }
        let findings = quality_status(&record, &ctx(Domain::Steel));
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].field.as_deref(), Some("quality_grade"));
        assert_eq!(findings[0].message, "quality grade is missing");

        let mut relaxed = RulesConfig::for_domain(Domain::Steel);
        relaxed.allowed_quality_grades = None;
        let relaxed = RuleContext::new(relaxed).unwrap();
        assert!(quality_status(&record, &relaxed).is_empty());
    }

    #[test]
    fn batch_id_is_required_and_formatted() {
        let steel = ctx(Domain::Steel);
        let mut record = steel_order();
        if let Some(spec) = record.specification.as_mut() {
            spec.batch_id = Field::Present("B-12345".into());
        }
        assert_eq!(batch_id_format(&record, &steel).len(), 1);

        if let Some(spec) = record.specification.as_mut() {
            spec.batch_id = Field::Missing;
        }
        let findings = batch_id_format(&record, &steel);
        assert_eq!(findings[0].message, "batch id is missing");

        // flight records carry no specification and no batch pattern
        assert!(batch_id_format(&CanonicalRecord::empty(0), &ctx(Domain::Flight)).is_empty());
    }

    #[test]
    fn production_line_and_warehouse_must_be_known() {
        let ctx = ctx(Domain::Steel);
        let mut record = steel_order();
        if let Some(spec) = record.specification.as_mut() {
            spec.production_line = Field::Present("Line-Z9".into());
            spec.warehouse = Field::Missing;
        }
        let findings = production_site(&record, &ctx);
        let fields: Vec<_> = findings.iter().filter_map(|f| f.field.as_deref()).collect();
        assert_eq!(fields, vec!["production_line", "warehouse"]);
    }

    #[test]
    fn lead_times_over_the_limit_are_flagged() {
        let ctx = ctx(Domain::Steel);
        let mut record = steel_order();
        // 31 days from order to production, 61 from production to delivery
        record.dates[1].date = date(2024, 2, 10);
        record.dates[2].date = date(2024, 4, 11);
        let findings = lead_time(&record, &ctx);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].field.as_deref(), Some("production_date"));
        assert!(findings[0].message.contains("31 days"));
        assert_eq!(findings[1].field.as_deref(), Some("delivery_date"));

        // exactly at the limit passes, and a missing date skips the pair
        record.dates[1].date = date(2024, 2, 9);
        record.dates[2].date = Field::Missing;
        assert!(lead_time(&record, &ctx).is_empty());
    }

    #[test]
    fn passenger_name_needs_two_characters() {
        let flight = ctx(Domain::Flight);
        let mut record = CanonicalRecord::empty(0);
        assert_eq!(contact_name(&record, &flight)[0].message, "contact name is missing");

        record.contact_name = Field::Present("J".into());
        assert_eq!(contact_name(&record, &flight).len(), 1);

        record.contact_name = Field::Present("Jo".into());
        assert!(contact_name(&record, &flight).is_empty());

        // steel leaves the customer name optional
        assert!(contact_name(&CanonicalRecord::empty(0), &ctx(Domain::Steel)).is_empty());
    }

    #[test]
    fn weight_and_price_outside_tolerance_are_flagged() {
        let mut record = steel_order();
        if let Some(spec) = record.specification.as_mut() {
            spec.weight_kg = Field::Present(1200.0);
        }
        let ctx = ctx(Domain::Steel);
        assert_eq!(dimensions(&record, &ctx).len(), 1);
        // 1.2 t at 800/t is 960, far from 753.6
        assert_eq!(pricing_consistency(&record, &ctx).len(), 1);
    }

    #[test]
    fn out_of_bounds_dimensions_are_flagged() {
        let mut record = steel_order();
        if let Some(spec) = record.specification.as_mut() {
            spec.length_mm = Field::Present(500.0);
            spec.thickness_mm = Field::Missing;
        }
        let findings = dimensions(&record, &ctx(Domain::Steel));
        let fields: Vec<_> = findings.iter().filter_map(|f| f.field.as_deref()).collect();
        assert!(fields.contains(&"length_mm"));
        assert!(fields.contains(&"thickness_mm"));
    }

    #[test]
    fn status_constraints_follow_quality_grade() {
        let ctx = ctx(Domain::Steel);
        let mut record = steel_order();
        record.status = Field::Present("Shipped".into());
        if let Some(spec) = record.specification.as_mut() {
            spec.quality_grade = Field::Present("Reject".into());
        }
        // Reject requires Cancelled/Rework Required, and Shipped forbids Reject
        assert_eq!(quality_status(&record, &ctx).len(), 2);

        record.status = Field::Present("Cancelled".into());
        assert!(quality_status(&record, &ctx).is_empty());
    }

    #[test]
    fn grade_type_mismatch_is_a_compatibility_finding() {
        let ctx = ctx(Domain::Steel);
        let mut record = steel_order();
        record.primary_code = Field::Present("304SS".into());
        assert_eq!(compatibility(&record, &ctx).len(), 1);

        record.primary_code = Field::Present("A36".into());
        record.secondary_code = Field::Present("Stainless Steel".into());
        assert_eq!(compatibility(&record, &ctx).len(), 1);
    }

    #[test]
    fn distinct_codes_ignores_case() {
        let mut record = CanonicalRecord::empty(0);
        record.primary_code = Field::Present("lax".into());
        record.secondary_code = Field::Present("LAX".into());
        assert_eq!(distinct_codes(&record, &ctx(Domain::Flight)).len(), 1);
    }
}
