use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::domain::Domain;
use crate::error::{PipelineError, Result};

pub const CONFIG_PATH_ENV: &str = "ORDER_PIPELINE_CONFIG";
pub const MAX_CONCURRENCY_ENV: &str = "ORDER_PIPELINE_MAX_CONCURRENCY";
pub const MAX_RETRIES_ENV: &str = "ORDER_PIPELINE_MAX_RETRIES";
pub const OUTPUT_DIR_ENV: &str = "ORDER_PIPELINE_OUTPUT_DIR";

/// Fully resolved pipeline configuration, consumed at construction time.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineConfig {
    pub domain: Domain,
    pub rules: RulesConfig,
    pub dispatch: DispatchConfig,
    pub fields: FieldMap,
    pub template: TemplateConfig,
    pub report: ReportConfig,
}

/// On-disk layout. `fields` and `template` fall back to the domain preset.
#[derive(Debug, Deserialize)]
struct ConfigFile {
    domain: Domain,
    rules: RulesConfig,
    dispatch: DispatchConfig,
    #[serde(default)]
    fields: Option<FieldMap>,
    #[serde(default)]
    template: Option<TemplateConfig>,
    #[serde(default)]
    report: ReportConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulesConfig {
    /// Known codes for the primary field (and the secondary one unless
    /// `valid_secondary_codes` is given)
    pub valid_codes: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_secondary_codes: Option<BTreeSet<String>>,
    /// Amounts must be strictly greater than this
    #[serde(default)]
    pub amount_min: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_max: Option<f64>,
    pub allowed_statuses: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier_pattern: Option<String>,
    #[serde(default = "default_dimensional_tolerance")]
    pub dimensional_tolerance_pct: f64,
    #[serde(default = "default_price_tolerance")]
    pub price_tolerance_pct: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension_bounds: Option<DimensionBounds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_quality_grades: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status_constraints: Vec<StatusConstraint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub compatibility: Vec<CompatibilityRule>,
    /// Contact name becomes required with at least this many characters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_name_min_len: Option<usize>,
    /// Batch identifiers become required and must match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id_pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_production_lines: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_warehouses: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lead_times: Vec<LeadTimeLimit>,
}

impl RulesConfig {
    pub fn secondary_codes(&self) -> &BTreeSet<String> {
        self.valid_secondary_codes.as_ref().unwrap_or(&self.valid_codes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DimensionBounds {
    pub thickness_mm: Bounds,
    pub width_mm: Bounds,
    pub length_mm: Bounds,
    pub max_weight_kg: f64,
    #[serde(default = "default_density")]
    pub density_kg_m3: f64,
}

/// Cross-field constraint between quality grade and status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusConstraint {
    /// A record with this quality grade must be in one of `statuses`
    RequiresStatus {
        quality_grade: String,
        statuses: Vec<String>,
    },
    /// A record in `status` must not carry any of `quality_grades`
    ForbidsQuality {
        status: String,
        quality_grades: Vec<String>,
    },
}

/// Maximum number of days between two labelled lifecycle dates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadTimeLimit {
    pub from: String,
    pub to: String,
    pub max_days: i64,
}

/// Primary code implies (or excludes) a secondary code.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CompatibilityRule {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_codes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_suffix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expects: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub forbids: Vec<String>,
}

impl CompatibilityRule {
    pub fn applies_to(&self, primary: &str) -> bool {
        self.primary_codes.iter().any(|c| c == primary)
            || self
                .primary_suffix
                .as_deref()
                .is_some_and(|suffix| primary.ends_with(suffix))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Total attempts per record, including the first one
    pub max_retries: u32,
    pub max_concurrency: usize,
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_ms: u64,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_success_rate")]
    pub simulated_success_rate: f64,
    #[serde(default = "default_min_latency")]
    pub simulated_min_latency_ms: u64,
    #[serde(default = "default_max_latency")]
    pub simulated_max_latency_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_retries: constants::DEFAULT_MAX_RETRIES,
            max_concurrency: constants::DEFAULT_MAX_CONCURRENCY,
            initial_backoff_ms: constants::DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: constants::DEFAULT_MAX_BACKOFF_MS,
            backoff_multiplier: constants::DEFAULT_BACKOFF_MULTIPLIER,
            attempt_timeout_ms: constants::DEFAULT_ATTEMPT_TIMEOUT_MS,
            dry_run: false,
            simulated_success_rate: default_success_rate(),
            simulated_min_latency_ms: default_min_latency(),
            simulated_max_latency_ms: default_max_latency(),
        }
    }
}

/// Source column names for each canonical field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldMap {
    pub identifier: String,
    pub primary_code: String,
    pub secondary_code: String,
    pub amount: String,
    pub status: String,
    #[serde(default)]
    pub dates: Vec<DateColumn>,
    pub email: String,
    pub phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub specification: Option<SpecificationColumns>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateColumn {
    pub label: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecificationColumns {
    pub thickness: String,
    pub width: String,
    pub length: String,
    pub weight: String,
    pub unit_price: String,
    pub quality_grade: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub production_line: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warehouse: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateConfig {
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub status_messages: BTreeMap<String, String>,
    #[serde(default = "default_status_message")]
    pub default_status_message: String,
    /// Alternative templates; the first one matching a record replaces
    /// `subject` and `body`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variants: Vec<TemplateVariant>,
}

/// A named template chosen by record status and/or quality grade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateVariant {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub statuses: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quality_grades: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl TemplateVariant {
    /// Every non-empty condition list must contain the record's value.
    pub fn matches(&self, status: Option<&str>, quality_grade: Option<&str>) -> bool {
        let within = |allowed: &[String], value: Option<&str>| {
            allowed.is_empty() || value.is_some_and(|v| allowed.iter().any(|a| a == v))
        };
        within(&self.statuses, status) && within(&self.quality_grades, quality_grade)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_top_codes")]
    pub top_codes: usize,
    /// Statuses that count toward the summary completion rate
    #[serde(default = "default_completed_statuses")]
    pub completed_statuses: BTreeSet<String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            top_codes: constants::DEFAULT_TOP_CODES,
            completed_statuses: default_completed_statuses(),
        }
    }
}

fn default_dimensional_tolerance() -> f64 {
    constants::DEFAULT_DIMENSIONAL_TOLERANCE_PCT
}
fn default_price_tolerance() -> f64 {
    constants::DEFAULT_PRICE_TOLERANCE_PCT
}
fn default_density() -> f64 {
    constants::STEEL_DENSITY_KG_M3
}
fn default_initial_backoff() -> u64 {
    constants::DEFAULT_INITIAL_BACKOFF_MS
}
fn default_max_backoff() -> u64 {
    constants::DEFAULT_MAX_BACKOFF_MS
}
fn default_backoff_multiplier() -> f64 {
    constants::DEFAULT_BACKOFF_MULTIPLIER
}
fn default_attempt_timeout() -> u64 {
    constants::DEFAULT_ATTEMPT_TIMEOUT_MS
}
fn default_success_rate() -> f64 {
    0.9
}
fn default_min_latency() -> u64 {
    20
}
fn default_max_latency() -> u64 {
    100
}
fn default_status_message() -> String {
    constants::DEFAULT_STATUS_MESSAGE.to_string()
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("reports")
}
fn default_top_codes() -> usize {
    constants::DEFAULT_TOP_CODES
}
fn default_completed_statuses() -> BTreeSet<String> {
    string_set(constants::COMPLETED_STATUSES)
}

fn string_set(values: &[&str]) -> BTreeSet<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl FieldMap {
    pub fn for_domain(domain: Domain) -> Self {
        match domain {
            Domain::Flight => Self {
                identifier: "PNR".into(),
                primary_code: "Origin".into(),
                secondary_code: "Destination".into(),
                amount: "Fare".into(),
                status: "Status".into(),
                dates: vec![
                    DateColumn { label: "booking".into(), column: "BookingDate".into() },
                    DateColumn { label: "travel".into(), column: "TravelDate".into() },
                ],
                email: "Email".into(),
                phone: "Phone".into(),
                contact_name: Some("Passenger".into()),
                specification: None,
            },
            Domain::Steel => Self {
                identifier: "OrderID".into(),
                primary_code: "SteelGrade".into(),
                secondary_code: "SteelType".into(),
                amount: "TotalPrice".into(),
                status: "Status".into(),
                dates: vec![
                    DateColumn { label: "order".into(), column: "OrderDate".into() },
                    DateColumn { label: "production".into(), column: "ProductionDate".into() },
                    DateColumn { label: "delivery".into(), column: "DeliveryDate".into() },
                ],
                email: "ContactEmail".into(),
                phone: "ContactPhone".into(),
                contact_name: Some("CustomerName".into()),
                specification: Some(SpecificationColumns {
                    thickness: "Thickness".into(),
                    width: "Width".into(),
                    length: "Length".into(),
                    weight: "Weight".into(),
                    unit_price: "UnitPrice".into(),
                    quality_grade: "QualityGrade".into(),
                    batch_id: Some("BatchID".into()),
                    production_line: Some("ProductionLine".into()),
                    warehouse: Some("Warehouse".into()),
                }),
            },
        }
    }
}

impl RulesConfig {
    pub fn for_domain(domain: Domain) -> Self {
        match domain {
            Domain::Flight => Self {
                valid_codes: string_set(constants::FLIGHT_AIRPORTS),
                valid_secondary_codes: None,
                amount_min: 0.0,
                amount_max: None,
                allowed_statuses: string_set(constants::FLIGHT_STATUSES),
                identifier_pattern: Some(constants::FLIGHT_IDENTIFIER_PATTERN.to_string()),
                dimensional_tolerance_pct: constants::DEFAULT_DIMENSIONAL_TOLERANCE_PCT,
                price_tolerance_pct: constants::DEFAULT_PRICE_TOLERANCE_PCT,
                dimension_bounds: None,
                allowed_quality_grades: None,
                status_constraints: Vec::new(),
                compatibility: Vec::new(),
                contact_name_min_len: Some(constants::FLIGHT_MIN_PASSENGER_NAME_LEN),
                batch_id_pattern: None,
                allowed_production_lines: None,
                allowed_warehouses: None,
                lead_times: Vec::new(),
            },
            Domain::Steel => Self {
                valid_codes: string_set(constants::STEEL_GRADES),
                valid_secondary_codes: Some(string_set(constants::STEEL_TYPES)),
                amount_min: 0.0,
                amount_max: Some(1_000_000.0),
                allowed_statuses: string_set(constants::STEEL_STATUSES),
                identifier_pattern: Some(constants::STEEL_IDENTIFIER_PATTERN.to_string()),
                dimensional_tolerance_pct: constants::DEFAULT_DIMENSIONAL_TOLERANCE_PCT,
                price_tolerance_pct: constants::DEFAULT_PRICE_TOLERANCE_PCT,
                dimension_bounds: Some(DimensionBounds {
                    thickness_mm: Bounds { min: 0.1, max: 300.0 },
                    width_mm: Bounds { min: 100.0, max: 5000.0 },
                    length_mm: Bounds { min: 6000.0, max: 25000.0 },
                    max_weight_kg: 50_000.0,
                    density_kg_m3: constants::STEEL_DENSITY_KG_M3,
                }),
                allowed_quality_grades: Some(string_set(constants::STEEL_QUALITY_GRADES)),
                status_constraints: vec![
                    StatusConstraint::RequiresStatus {
                        quality_grade: "Reject".into(),
                        statuses: strings(&["Cancelled", "Rework Required"]),
                    },
                    StatusConstraint::ForbidsQuality {
                        status: "Shipped".into(),
                        quality_grades: strings(&["Reject", "Rework"]),
                    },
                ],
                compatibility: vec![
                    CompatibilityRule {
                        primary_suffix: Some("SS".into()),
                        expects: Some("Stainless Steel".into()),
                        ..Default::default()
                    },
                    CompatibilityRule {
                        primary_codes: strings(constants::STEEL_CARBON_GRADES),
                        forbids: strings(&["Stainless Steel"]),
                        ..Default::default()
                    },
                ],
                contact_name_min_len: None,
                batch_id_pattern: Some(constants::STEEL_BATCH_PATTERN.to_string()),
                allowed_production_lines: Some(string_set(constants::STEEL_PRODUCTION_LINES)),
                allowed_warehouses: Some(string_set(constants::STEEL_WAREHOUSES)),
                lead_times: vec![
                    LeadTimeLimit {
                        from: "order".into(),
                        to: "production".into(),
                        max_days: constants::STEEL_MAX_PRODUCTION_LEAD_DAYS,
                    },
                    LeadTimeLimit {
                        from: "production".into(),
                        to: "delivery".into(),
                        max_days: constants::STEEL_MAX_DELIVERY_LEAD_DAYS,
                    },
                ],
            },
        }
    }
}

impl TemplateConfig {
    pub fn for_domain(domain: Domain) -> Self {
        match domain {
            Domain::Flight => Self {
                subject: constants::FLIGHT_SUBJECT.to_string(),
                body: constants::FLIGHT_BODY.to_string(),
                status_messages: BTreeMap::new(),
                default_status_message: default_status_message(),
                variants: Vec::new(),
            },
            Domain::Steel => Self {
                subject: constants::STEEL_SUBJECT.to_string(),
                body: constants::STEEL_BODY.to_string(),
                status_messages: constants::STEEL_STATUS_MESSAGES
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                default_status_message: default_status_message(),
                variants: vec![
                    TemplateVariant {
                        name: "quality_alert".into(),
                        statuses: Vec::new(),
                        quality_grades: strings(constants::STEEL_ALERT_QUALITY_GRADES),
                        subject: constants::STEEL_QUALITY_ALERT_SUBJECT.to_string(),
                        body: constants::STEEL_QUALITY_ALERT_BODY.to_string(),
                    },
                    TemplateVariant {
                        name: "production_update".into(),
                        statuses: strings(constants::STEEL_PRODUCTION_UPDATE_STATUSES),
                        quality_grades: Vec::new(),
                        subject: constants::STEEL_PRODUCTION_UPDATE_SUBJECT.to_string(),
                        body: constants::STEEL_PRODUCTION_UPDATE_BODY.to_string(),
                    },
                ],
            },
        }
    }
}

impl PipelineConfig {
    /// Built-in preset for a domain.
    pub fn for_domain(domain: Domain) -> Self {
        Self {
            domain,
            rules: RulesConfig::for_domain(domain),
            dispatch: DispatchConfig::default(),
            fields: FieldMap::for_domain(domain),
            template: TemplateConfig::for_domain(domain),
            report: ReportConfig::default(),
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)?;
        let config = Self {
            domain: file.domain,
            fields: file.fields.unwrap_or_else(|| FieldMap::for_domain(file.domain)),
            template: file.template.unwrap_or_else(|| TemplateConfig::for_domain(file.domain)),
            rules: file.rules,
            dispatch: file.dispatch,
            report: file.report,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Applies `ORDER_PIPELINE_*` environment overrides on top of the file or preset.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(value) = std::env::var(MAX_CONCURRENCY_ENV) {
            self.dispatch.max_concurrency = value.trim().parse().map_err(|_| {
                PipelineError::Config(format!("{MAX_CONCURRENCY_ENV} must be a positive integer, got '{value}'"))
            })?;
        }
        if let Ok(value) = std::env::var(MAX_RETRIES_ENV) {
            self.dispatch.max_retries = value.trim().parse().map_err(|_| {
                PipelineError::Config(format!("{MAX_RETRIES_ENV} must be a positive integer, got '{value}'"))
            })?;
        }
        if let Ok(value) = std::env::var(OUTPUT_DIR_ENV) {
            if !value.trim().is_empty() {
                self.report.output_dir = PathBuf::from(value);
            }
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.rules.valid_codes.is_empty() {
            return Err(PipelineError::MissingOption("rules.valid_codes".into()));
        }
        if self.rules.allowed_statuses.is_empty() {
            return Err(PipelineError::MissingOption("rules.allowed_statuses".into()));
        }
        if self.dispatch.max_retries == 0 {
            return Err(PipelineError::Config("dispatch.max_retries must be at least 1".into()));
        }
        if self.dispatch.max_concurrency == 0 {
            return Err(PipelineError::Config("dispatch.max_concurrency must be at least 1".into()));
        }
        if self.dispatch.attempt_timeout_ms == 0 {
            return Err(PipelineError::Config("dispatch.attempt_timeout_ms must be at least 1".into()));
        }
        if self.rules.dimensional_tolerance_pct < 0.0 || self.rules.price_tolerance_pct < 0.0 {
            return Err(PipelineError::Config("tolerances must not be negative".into()));
        }
        if !(0.0..=1.0).contains(&self.dispatch.simulated_success_rate) {
            return Err(PipelineError::Config(
                "dispatch.simulated_success_rate must be between 0 and 1".into(),
            ));
        }
        if self.dispatch.simulated_min_latency_ms > self.dispatch.simulated_max_latency_ms {
            return Err(PipelineError::Config(
                "dispatch.simulated_min_latency_ms exceeds simulated_max_latency_ms".into(),
            ));
        }
        for pattern in [&self.rules.identifier_pattern, &self.rules.batch_id_pattern]
            .into_iter()
            .flatten()
        {
            regex::Regex::new(pattern)?;
        }
        if let Some(variant) = self
            .template
            .variants
            .iter()
            .find(|v| v.statuses.is_empty() && v.quality_grades.is_empty())
        {
            return Err(PipelineError::Config(format!(
                "template variant '{}' needs statuses or quality_grades",
                variant.name
            )));
        }
        if let Some(limit) = self.rules.lead_times.iter().find(|l| l.max_days < 0) {
            return Err(PipelineError::Config(format!(
                "rules.lead_times {} -> {} has a negative max_days",
                limit.from, limit.to
            )));
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
