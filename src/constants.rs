// Preset values for the two record domains. Pipelines never read these
// directly; they reach the stages through `PipelineConfig`.

pub const DEFAULT_MAX_CONCURRENCY: usize = 5;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1_000;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 10_000;
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;
pub const DEFAULT_ATTEMPT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_DIMENSIONAL_TOLERANCE_PCT: f64 = 10.0;
pub const DEFAULT_PRICE_TOLERANCE_PCT: f64 = 5.0;
pub const DEFAULT_TOP_CODES: usize = 10;
pub const STEEL_DENSITY_KG_M3: f64 = 7850.0;

pub const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";
pub const PHONE_PATTERN: &str = r"^[\d\s\-\(\)\+x\.]+$";

pub const FLIGHT_IDENTIFIER_PATTERN: &str = r"^[A-Z0-9]{6}$";
pub const STEEL_IDENTIFIER_PATTERN: &str = r"^SO-\d{4}-\d{4}$";
pub const STEEL_BATCH_PATTERN: &str = r"^B-\d{6}$";

pub const FLIGHT_MIN_PASSENGER_NAME_LEN: usize = 2;
pub const STEEL_MAX_PRODUCTION_LEAD_DAYS: i64 = 30;
pub const STEEL_MAX_DELIVERY_LEAD_DAYS: i64 = 60;

pub const FLIGHT_AIRPORTS: &[&str] = &[
    "LAX", "JFK", "ORD", "DFW", "DEN", "ATL", "SFO", "SEA", "LAS", "MCO", "EWR", "CLT", "PHX",
    "IAH", "MIA", "BOS", "MSP", "FLL", "DTW", "PHL", "LGA", "BWI", "MDW", "TPA", "IAD", "SAN",
    "HNL", "PDX", "STL", "AUS",
];

pub const FLIGHT_STATUSES: &[&str] = &["Confirmed", "Cancelled", "Pending", "Checked-in", "Completed"];

pub const STEEL_GRADES: &[&str] = &[
    "A36", "A572-50", "A992", "A514", "A588", "A242", "A709-50", "S355", "S275", "S235", "S420",
    "S460", "Q235", "Q345", "304SS", "316SS", "409SS", "430SS", "201SS",
];

pub const STEEL_TYPES: &[&str] = &[
    "Hot Rolled",
    "Cold Rolled",
    "Galvanized",
    "Stainless Steel",
    "Carbon Steel",
    "Alloy Steel",
    "Tool Steel",
    "Spring Steel",
];

pub const STEEL_CARBON_GRADES: &[&str] = &["A36", "A572-50", "A992"];

pub const STEEL_STATUSES: &[&str] = &[
    "Pending",
    "In Production",
    "Quality Check",
    "Ready",
    "Shipped",
    "Delivered",
    "Cancelled",
    "Hold",
    "Rework Required",
];

pub const STEEL_QUALITY_GRADES: &[&str] = &["A", "B", "C", "Reject", "Rework"];

pub const STEEL_PRODUCTION_LINES: &[&str] = &[
    "Line-A1", "Line-A2", "Line-B1", "Line-B2", "Line-C1", "Line-C2", "Line-D1", "Line-D2",
    "Line-E1", "Line-E2",
];

pub const STEEL_WAREHOUSES: &[&str] = &[
    "WH-North",
    "WH-South",
    "WH-East",
    "WH-West",
    "WH-Central",
    "WH-Export",
    "WH-Domestic",
    "WH-Reserve",
];

pub const STEEL_STATUS_MESSAGES: &[(&str, &str)] = &[
    ("Pending", "Your order is pending approval and will enter production soon."),
    ("In Production", "Your order is currently being manufactured on our production line."),
    ("Quality Check", "Your order is undergoing final quality inspection."),
    ("Ready", "Your order has passed quality control and is ready for shipment."),
    ("Shipped", "Your order has been shipped and is on its way to you."),
    ("Delivered", "Your order has been successfully delivered."),
    ("Hold", "Your order is temporarily on hold. We will contact you shortly."),
    ("Rework Required", "Your order requires rework to meet quality standards."),
];

pub const DEFAULT_STATUS_MESSAGE: &str = "Please contact us for current status.";

pub const FLIGHT_SUBJECT: &str = "Booking Confirmation - {id}";
pub const FLIGHT_BODY: &str = "Dear {name},

Your reservation {id} from {primary_code} to {secondary_code} is {status}.
Booked on: {booking_date}
Travel date: {travel_date}
Fare: ${amount}

Thank you for flying with us.";

pub const STEEL_SUBJECT: &str = "Steel Order Confirmation - {id}";
pub const STEEL_BODY: &str = "Dear {name},

Thank you for your steel order. We are pleased to confirm the following details:

Order ID: {id}
Batch ID: {batch_id}
Steel Grade: {primary_code}
Steel Type: {secondary_code}
Dimensions: {thickness}mm x {width}mm x {length}mm
Weight: {weight} kg
Total Price: ${amount}

Production Line: {production_line}
Expected Production Date: {production_date}
Expected Delivery Date: {delivery_date}
Quality Grade: {quality_grade}
Warehouse: {warehouse}

Your order is currently: {status}
{status_message}

Best regards,
Production Team";

pub const STEEL_PRODUCTION_UPDATE_STATUSES: &[&str] =
    &["In Production", "Quality Check", "Hold", "Rework Required"];
pub const STEEL_PRODUCTION_UPDATE_SUBJECT: &str = "Production Update - Order {id}";
pub const STEEL_PRODUCTION_UPDATE_BODY: &str = "Dear {name},

We would like to update you on the production status of your steel order:

Order ID: {id}
Current Status: {status}
Production Line: {production_line}
Quality Grade: {quality_grade}

{status_message}

Best regards,
Production Team";

pub const STEEL_ALERT_QUALITY_GRADES: &[&str] = &["Reject", "Rework"];
pub const STEEL_QUALITY_ALERT_SUBJECT: &str = "Quality Alert - Order {id}";
pub const STEEL_QUALITY_ALERT_BODY: &str = "Dear {name},

We need to inform you about a quality issue with your steel order:

Order ID: {id}
Quality Grade: {quality_grade}
Issue: Quality grade below standard specifications

Our quality control team will contact you shortly with options including
rework, a replacement order or a partial refund.

Best regards,
Quality Control Team";

pub const STEEL_REJECT_GRADE: &str = "Reject";
pub const STEEL_REWORK_GRADE: &str = "Rework";

/// Statuses counted as finished work in the run summary
pub const COMPLETED_STATUSES: &[&str] = &["Ready", "Shipped", "Delivered", "Completed"];
