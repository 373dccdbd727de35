use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::series::PeriodPair;

/// Active organizations on one day, total and per product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrgUsageDay {
    pub day: NaiveDate,
    pub total_orgs: i64,
    pub card_scan_orgs: i64,
    pub visit_report_orgs: i64,
    pub crm_export_orgs: i64,
}

/// Licenses assigned on one day, total and per product family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LicenseAssignmentDay {
    pub day: NaiveDate,
    pub total: i64,
    pub data_quality: i64,
    pub business_cards: i64,
    pub visit_report: i64,
    pub data_enrichment: i64,
}

/// An organization exceeding its concurrent VisitReport licenses on a day.
#[derive(Debug, Clone, Serialize)]
pub struct ConcurrentExceedRow {
    pub org_id: i64,
    pub org_name: String,
    pub max_users: i64,
    pub distinct_users: i64,
    pub day: String,
}

/// A touchless organization ranked by target-activity volume.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveTouchlessRow {
    pub org_id: i64,
    pub org_name: String,
    pub crm_export_count: i64,
    pub visit_report_count: i64,
    pub card_scan_count: i64,
    pub target_activity_count: i64,
    pub distinct_users: i64,
    pub last_activity: String,
}

/// An organization with users slipping away from the grabber product.
#[derive(Debug, Clone, Serialize)]
pub struct SlippingAwayRow {
    pub org_id: i64,
    pub org_name: String,
    pub slipping_users: i64,
    pub total_users: i64,
    /// Share of users slipping away, in percent. 0 when the organization has
    /// no users at all.
    pub severity_pct: f64,
}

/// The most affected organization for one error type.
#[derive(Debug, Clone, Serialize)]
pub struct TopErrorOrgRow {
    pub activity: String,
    pub org_id: i64,
    pub org_name: String,
    pub error_count: i64,
    pub last_seen: String,
}

/// One error occurrence with user/org context. Doubles as the drill-down
/// payload attached to error-overview bars, hence Deserialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetailRow {
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub org_id: Option<i64>,
    pub org_name: Option<String>,
    pub activity: String,
    pub meta: Option<String>,
    pub in_current_period: bool,
    pub day: String,
    pub created: String,
}

/// Current-period error count for one error type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorCount {
    pub activity: String,
    pub count: i64,
}

/// The error-overview result: aggregated counts for the bar chart plus the
/// detail rows backing each bar's drill-down.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorOverview {
    pub counts: Vec<ErrorCount>,
    pub details: Vec<ErrorDetailRow>,
}

/// Per-product unique active users over the trial-day axis (day 1..=N).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductTrialUsage {
    pub product: String,
    pub user_counts: Vec<i64>,
}

/// Per-activity event counts over the trial-day axis (day 1..=N).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityTrialUsage {
    pub activity: String,
    pub event_counts: Vec<i64>,
}

/// Trial activity volume for one product category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductCount {
    pub product: String,
    pub count: i64,
}

/// One activity's frequency among trial users.
#[derive(Debug, Clone, Serialize)]
pub struct FrequentActivityRow {
    pub activity: String,
    pub activity_count: i64,
    pub user_count: i64,
}

/// How many trial organizations used a given product combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductMixCount {
    pub mix: String,
    pub org_count: i64,
}

/// The error period drill-down: aligned per-day counts plus the heading.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPeriodDrilldown {
    pub pair: PeriodPair,
    pub heading: String,
}
