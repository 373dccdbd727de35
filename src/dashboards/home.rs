//! Home overview dashboard: organization activity, trial starts, license
//! assignments, and the error overview with its click drill-downs.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use chrono::NaiveDate;

use super::types::{
    ActiveTouchlessRow, ConcurrentExceedRow, ErrorCount, ErrorDetailRow, ErrorOverview,
    ErrorPeriodDrilldown, LicenseAssignmentDay, OrgUsageDay, SlippingAwayRow, TopErrorOrgRow,
};
use super::{
    activity_in_clause, excluded_orgs_clause, internal_user_clause, param_refs, push_param,
    SqlParams,
};
use crate::catalog::Catalog;
use crate::date_util::{date_k_days_ago, parse_iso_date};
use crate::drilldown::{ClickEvent, ClickSelection};
use crate::error::Result;
use crate::query::{DateWindow, QueryParams};
use crate::series::{densify, DailyBucket, PeriodPair};
use crate::storage::Database;

/// Chart id of the error-overview bar chart; click events from any other
/// source are ignored by the drill-down resolvers below.
pub const ERRORS_GRAPH_ID: &str = "home-errors-graph";

/// Distinct active organizations per day, total and per product, zero-filled
/// across the whole window.
pub async fn active_orgs_by_day(
    db: &Database,
    query: &QueryParams,
    catalog: &Catalog,
) -> Result<Vec<OrgUsageDay>> {
    let window = query.window;
    let q = query.clone();
    let cat = catalog.clone();

    let raw: Vec<(String, i64, i64, i64, i64)> = db
        .reader()
        .call(move |conn| {
            let mut params = SqlParams::new();
            let start_idx = push_param(&mut params, window.start_key());
            let end_idx = push_param(&mut params, window.end_key());
            let cs_idx = push_param(&mut params, cat.card_scan_activity.clone());
            let vr_idx = push_param(&mut params, cat.visit_report_activity.clone());
            let dq_idx = push_param(&mut params, cat.crm_export_activity.clone());
            let targets: Vec<String> =
                cat.target_activities().iter().map(|s| s.to_string()).collect();
            let target_clause = activity_in_clause("a.activity", &targets, &mut params);
            let internal = internal_user_clause("a.organization_id", "u.username", &cat, &mut params);
            let excluded =
                excluded_orgs_clause("a.organization_id", &q.excluded_org_ids, &mut params);

            let sql = format!(
                "SELECT a.created_date_key,
                        COUNT(DISTINCT a.organization_id) AS total_orgs,
                        COUNT(DISTINCT CASE WHEN a.activity = ?{cs_idx} THEN a.organization_id END),
                        COUNT(DISTINCT CASE WHEN a.activity = ?{vr_idx} THEN a.organization_id END),
                        COUNT(DISTINCT CASE WHEN a.activity = ?{dq_idx} THEN a.organization_id END)
                 FROM fact_activities a
                 JOIN dim_users u ON u.user_id = a.user_id
                 WHERE a.created_date_key >= ?{start_idx} AND a.created_date_key <= ?{end_idx}
                   AND {target_clause}{internal}{excluded}
                 GROUP BY a.created_date_key
                 ORDER BY a.created_date_key"
            );
            let refs = param_refs(&params);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(refs.as_slice(), |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
            })?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
        })
        .await?;

    let mut totals = Vec::with_capacity(raw.len());
    let mut card_scans = Vec::with_capacity(raw.len());
    let mut visit_reports = Vec::with_capacity(raw.len());
    let mut crm_exports = Vec::with_capacity(raw.len());
    for (day_key, total, cs, vr, dq) in &raw {
        let day = parse_iso_date(day_key)?;
        totals.push(DailyBucket::new(day, *total));
        card_scans.push(DailyBucket::new(day, *cs));
        visit_reports.push(DailyBucket::new(day, *vr));
        crm_exports.push(DailyBucket::new(day, *dq));
    }

    let totals = densify(&totals, window, 0);
    let card_scans = densify(&card_scans, window, 0);
    let visit_reports = densify(&visit_reports, window, 0);
    let crm_exports = densify(&crm_exports, window, 0);

    Ok(totals
        .into_iter()
        .zip(card_scans)
        .zip(visit_reports)
        .zip(crm_exports)
        .map(|(((t, cs), vr), dq)| OrgUsageDay {
            day: t.day,
            total_orgs: t.value,
            card_scan_orgs: cs.value,
            visit_report_orgs: vr.value,
            crm_export_orgs: dq.value,
        })
        .collect())
}

/// Free trials started per day, current period aligned against the previous
/// one. The two periods are queried as separate bounded windows; the old
/// approach of fetching one combined range and halving the rows by count
/// broke whenever the two halves had different day counts.
pub async fn new_trials(
    db: &Database,
    query: &QueryParams,
    catalog: &Catalog,
) -> Result<PeriodPair> {
    let window = query.window;

    let current = trials_per_day(db, window, &query.excluded_org_ids, catalog).await?;
    let previous = trials_per_day(db, window.previous(), &query.excluded_org_ids, catalog).await?;

    Ok(PeriodPair::align(window, &current, &previous))
}

async fn trials_per_day(
    db: &Database,
    window: DateWindow,
    excluded_ids: &BTreeSet<i64>,
    catalog: &Catalog,
) -> Result<Vec<DailyBucket>> {
    let excluded_ids = excluded_ids.clone();
    let free_trial_id = catalog.free_trial_type_id;

    let raw: Vec<(String, i64)> = db
        .reader()
        .call(move |conn| {
            let mut params = SqlParams::new();
            let type_idx = push_param(&mut params, free_trial_id);
            let start_idx = push_param(&mut params, window.start_key());
            let end_idx = push_param(&mut params, window.end_key());
            let excluded =
                excluded_orgs_clause("s.organization_id", &excluded_ids, &mut params);

            let sql = format!(
                "SELECT s.valid_from_date_key, COUNT(DISTINCT s.organization_id)
                 FROM fact_org_subscriptions s
                 WHERE s.subscription_type_id = ?{type_idx}
                   AND s.valid_from_date_key >= ?{start_idx}
                   AND s.valid_from_date_key <= ?{end_idx}{excluded}
                 GROUP BY s.valid_from_date_key
                 ORDER BY s.valid_from_date_key"
            );
            let refs = param_refs(&params);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(refs.as_slice(), |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
        })
        .await?;

    raw.into_iter()
        .map(|(day_key, count)| Ok(DailyBucket::new(parse_iso_date(&day_key)?, count)))
        .collect()
}

/// Organizations that had more distinct VisitReport users on a day than
/// their concurrent license allows, newest first.
pub async fn concurrent_license_exceeders(
    db: &Database,
    query: &QueryParams,
    catalog: &Catalog,
) -> Result<Vec<ConcurrentExceedRow>> {
    let window = query.window;
    let q = query.clone();
    let cat = catalog.clone();

    let rows = db
        .reader()
        .call(move |conn| {
            let mut params = SqlParams::new();
            let type_idx = push_param(&mut params, cat.concurrent_vr_type_id);
            let start_idx = push_param(&mut params, window.start_key());
            let end_idx = push_param(&mut params, window.end_key());
            let vr_idx = push_param(&mut params, cat.visit_report_activity.clone());
            let internal = internal_user_clause("a.organization_id", "u.username", &cat, &mut params);
            let excluded =
                excluded_orgs_clause("a.organization_id", &q.excluded_org_ids, &mut params);

            let sql = format!(
                "SELECT o.organization_id, o.name, s.max_users,
                        COUNT(DISTINCT l.user_id) AS distinct_users,
                        a.created_date_key
                 FROM fact_org_subscriptions s
                 JOIN dim_organizations o ON o.organization_id = s.organization_id
                 JOIN fact_user_licenses l ON l.org_subscription_id = s.org_subscription_id
                 JOIN dim_users u ON u.user_id = l.user_id
                 JOIN fact_activities a ON a.user_id = l.user_id
                      AND a.organization_id = s.organization_id
                 WHERE s.subscription_type_id = ?{type_idx}
                   AND a.created_date_key >= ?{start_idx} AND a.created_date_key <= ?{end_idx}
                   AND a.activity = ?{vr_idx}
                   AND l.unassigned_at IS NULL{internal}{excluded}
                 GROUP BY a.created_date_key, o.organization_id, o.name, s.max_users
                 HAVING COUNT(DISTINCT l.user_id) > s.max_users
                 ORDER BY a.created_date_key DESC"
            );
            let refs = param_refs(&params);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(refs.as_slice(), |row| {
                Ok(ConcurrentExceedRow {
                    org_id: row.get(0)?,
                    org_name: row.get(1)?,
                    max_users: row.get(2)?,
                    distinct_users: row.get(3)?,
                    day: row.get(4)?,
                })
            })?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
        })
        .await?;
    Ok(rows)
}

/// Touchless non-enterprise organizations ranked by target-activity volume.
pub async fn most_active_touchless_orgs(
    db: &Database,
    query: &QueryParams,
    catalog: &Catalog,
) -> Result<Vec<ActiveTouchlessRow>> {
    let window = query.window;
    let q = query.clone();
    let cat = catalog.clone();

    let rows = db
        .reader()
        .call(move |conn| {
            let mut params = SqlParams::new();
            let start_idx = push_param(&mut params, window.start_key());
            let end_idx = push_param(&mut params, window.end_key());
            let dq_idx = push_param(&mut params, cat.crm_export_activity.clone());
            let vr_idx = push_param(&mut params, cat.visit_report_activity.clone());
            let cs_idx = push_param(&mut params, cat.card_scan_activity.clone());
            let internal = internal_user_clause("a.organization_id", "u.username", &cat, &mut params);
            let excluded =
                excluded_orgs_clause("a.organization_id", &q.excluded_org_ids, &mut params);

            let sql = format!(
                "SELECT o.organization_id, o.name,
                        SUM(CASE WHEN a.activity = ?{dq_idx} THEN 1 ELSE 0 END) AS dq_count,
                        SUM(CASE WHEN a.activity = ?{vr_idx} THEN 1 ELSE 0 END) AS vr_count,
                        SUM(CASE WHEN a.activity = ?{cs_idx} THEN 1 ELSE 0 END) AS cs_count,
                        COUNT(DISTINCT a.user_id) AS distinct_users,
                        MAX(a.created) AS last_activity
                 FROM fact_activities a
                 JOIN dim_organizations o ON o.organization_id = a.organization_id
                 JOIN dim_users u ON u.user_id = a.user_id
                 WHERE a.created_date_key >= ?{start_idx} AND a.created_date_key <= ?{end_idx}
                   AND o.is_touchless = 1 AND o.is_enterprise = 0{internal}{excluded}
                 GROUP BY o.organization_id, o.name
                 ORDER BY (dq_count + vr_count + cs_count) DESC"
            );
            let refs = param_refs(&params);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(refs.as_slice(), |row| {
                let dq: i64 = row.get(2)?;
                let vr: i64 = row.get(3)?;
                let cs: i64 = row.get(4)?;
                Ok(ActiveTouchlessRow {
                    org_id: row.get(0)?,
                    org_name: row.get(1)?,
                    crm_export_count: dq,
                    visit_report_count: vr,
                    card_scan_count: cs,
                    target_activity_count: dq + vr + cs,
                    distinct_users: row.get(5)?,
                    last_activity: row.get(6)?,
                })
            })?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
        })
        .await?;
    Ok(rows)
}

/// Organizations with grabber users who were active over the lookback window
/// but have gone quiet, with a severity ratio of slipping vs total users.
pub async fn slipping_away_orgs(
    db: &Database,
    excluded_ids: &BTreeSet<i64>,
    catalog: &Catalog,
) -> Result<Vec<SlippingAwayRow>> {
    let excluded_ids = excluded_ids.clone();
    let cat = catalog.clone();

    let raw: Vec<(i64, String, i64, i64)> = db
        .reader()
        .call(move |conn| {
            let mut params = SqlParams::new();
            let lookback_idx =
                push_param(&mut params, date_k_days_ago(cat.slipping_lookback_days));
            let grabber_clause =
                activity_in_clause("a.activity", &cat.grabber_activities, &mut params);
            let internal = internal_user_clause("a.organization_id", "u.username", &cat, &mut params);
            let excluded = excluded_orgs_clause("a.organization_id", &excluded_ids, &mut params);
            let quiet_idx = push_param(&mut params, date_k_days_ago(cat.slipping_quiet_days));
            let min_events_idx = push_param(&mut params, cat.slipping_min_events);

            let sql = format!(
                "WITH slipping AS (
                     SELECT a.organization_id, a.user_id
                     FROM fact_activities a
                     JOIN dim_users u ON u.user_id = a.user_id
                     WHERE a.created_date_key > ?{lookback_idx}
                       AND {grabber_clause}
                       AND u.is_deleted = 0{internal}{excluded}
                     GROUP BY a.user_id, a.organization_id
                     HAVING MAX(a.created_date_key) < ?{quiet_idx}
                        AND COUNT(*) > ?{min_events_idx}
                 )
                 SELECT o.organization_id, o.name,
                        COUNT(DISTINCT slipping.user_id) AS slipping_users,
                        COUNT(DISTINCT u.user_id) AS total_users
                 FROM dim_organizations o
                 JOIN slipping ON slipping.organization_id = o.organization_id
                 JOIN dim_users u ON u.organization_id = o.organization_id
                 GROUP BY o.organization_id, o.name
                 ORDER BY slipping_users DESC, o.name ASC"
            );
            let refs = param_refs(&params);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(refs.as_slice(), |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
        })
        .await?;

    Ok(raw
        .into_iter()
        .map(|(org_id, org_name, slipping_users, total_users)| SlippingAwayRow {
            org_id,
            org_name,
            slipping_users,
            total_users,
            severity_pct: if total_users > 0 {
                slipping_users as f64 / total_users as f64 * 100.0
            } else {
                0.0
            },
        })
        .collect())
}

/// Licenses newly assigned to users per day, total and per product family,
/// zero-filled across the window.
pub async fn assigned_licenses_by_day(
    db: &Database,
    window: DateWindow,
) -> Result<Vec<LicenseAssignmentDay>> {
    let raw: Vec<(String, i64, i64, i64, i64, i64)> = db
        .reader()
        .call(move |conn| {
            let sql = "SELECT l.assigned_date_key,
                              COUNT(*) AS total,
                              SUM(CASE WHEN l.subscription_name LIKE 'GRABBER%'
                                         OR l.subscription_name = 'DATA_QUALITY'
                                       THEN 1 ELSE 0 END) AS dq,
                              SUM(CASE WHEN l.subscription_name LIKE 'BUSINESS%'
                                         OR l.subscription_name LIKE 'CARD%'
                                       THEN 1 ELSE 0 END) AS bcs,
                              SUM(CASE WHEN l.subscription_name LIKE 'VISIT%'
                                       THEN 1 ELSE 0 END) AS vr,
                              SUM(CASE WHEN l.subscription_name = 'DATA_ENRICHMENT'
                                       THEN 1 ELSE 0 END) AS enrichment
                       FROM fact_user_licenses l
                       WHERE l.assigned_date_key >= ?1 AND l.assigned_date_key <= ?2
                       GROUP BY l.assigned_date_key
                       ORDER BY l.assigned_date_key";
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(
                rusqlite::params![window.start_key(), window.end_key()],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                },
            )?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
        })
        .await?;

    let mut by_day: BTreeMap<NaiveDate, (i64, i64, i64, i64, i64)> = BTreeMap::new();
    for (day_key, total, dq, bcs, vr, enrichment) in &raw {
        by_day.insert(parse_iso_date(day_key)?, (*total, *dq, *bcs, *vr, *enrichment));
    }

    let totals: Vec<DailyBucket> = by_day
        .iter()
        .map(|(day, v)| DailyBucket::new(*day, v.0))
        .collect();
    Ok(densify(&totals, window, 0)
        .into_iter()
        .map(|bucket| {
            let (_, dq, bcs, vr, enrichment) =
                by_day.get(&bucket.day).copied().unwrap_or_default();
            LicenseAssignmentDay {
                day: bucket.day,
                total: bucket.value,
                data_quality: dq,
                business_cards: bcs,
                visit_report: vr,
                data_enrichment: enrichment,
            }
        })
        .collect())
}

/// For each error type, the single organization that hit it the most.
pub async fn top_error_orgs(
    db: &Database,
    query: &QueryParams,
    catalog: &Catalog,
) -> Result<Vec<TopErrorOrgRow>> {
    let window = query.window;
    let q = query.clone();
    let cat = catalog.clone();

    let rows = db
        .reader()
        .call(move |conn| {
            let mut params = SqlParams::new();
            let start_idx = push_param(&mut params, window.start_key());
            let end_idx = push_param(&mut params, window.end_key());
            let error_clause =
                activity_in_clause("a.activity", &cat.error_activities, &mut params);
            let internal = internal_user_clause("a.organization_id", "u.username", &cat, &mut params);
            let excluded =
                excluded_orgs_clause("a.organization_id", &q.excluded_org_ids, &mut params);

            let sql = format!(
                "SELECT activity, org_id, org_name, act_count, last_act
                 FROM (
                     SELECT a.activity AS activity,
                            a.organization_id AS org_id,
                            o.name AS org_name,
                            COUNT(*) AS act_count,
                            MAX(a.created) AS last_act,
                            ROW_NUMBER() OVER (
                                PARTITION BY a.activity
                                ORDER BY COUNT(*) DESC
                            ) AS rn
                     FROM fact_activities a
                     JOIN dim_organizations o ON o.organization_id = a.organization_id
                     JOIN dim_users u ON u.user_id = a.user_id
                     WHERE a.created_date_key >= ?{start_idx} AND a.created_date_key <= ?{end_idx}
                       AND {error_clause}{internal}{excluded}
                     GROUP BY a.activity, a.organization_id, o.name
                 )
                 WHERE rn = 1
                 ORDER BY act_count DESC"
            );
            let refs = param_refs(&params);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(refs.as_slice(), |row| {
                Ok(TopErrorOrgRow {
                    activity: row.get(0)?,
                    org_id: row.get(1)?,
                    org_name: row.get(2)?,
                    error_count: row.get(3)?,
                    last_seen: row.get(4)?,
                })
            })?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
        })
        .await?;
    Ok(rows)
}

/// Error occurrences over the combined previous+current window, each row
/// flagged with its period in SQL, plus current-period counts per error type
/// for the overview bars. The detail rows are attached to the bars as the
/// drill-down payload.
pub async fn error_overview(
    db: &Database,
    query: &QueryParams,
    catalog: &Catalog,
) -> Result<ErrorOverview> {
    let window = query.window;
    let combined = window.combined();
    let q = query.clone();
    let cat = catalog.clone();

    let details = db
        .reader()
        .call(move |conn| {
            let mut params = SqlParams::new();
            let cur_start_idx = push_param(&mut params, window.start_key());
            let start_idx = push_param(&mut params, combined.start_key());
            let end_idx = push_param(&mut params, combined.end_key());
            let error_clause =
                activity_in_clause("a.activity", &cat.error_activities, &mut params);
            let internal = internal_user_clause("a.organization_id", "u.username", &cat, &mut params);
            let excluded =
                excluded_orgs_clause("a.organization_id", &q.excluded_org_ids, &mut params);

            let sql = format!(
                "SELECT u.user_id, u.username,
                        o.organization_id, o.name,
                        a.activity, a.meta,
                        CASE WHEN a.created_date_key >= ?{cur_start_idx} THEN 1 ELSE 0 END,
                        a.created_date_key, a.created
                 FROM fact_activities a
                 JOIN dim_users u ON u.user_id = a.user_id
                 JOIN dim_organizations o ON o.organization_id = a.organization_id
                 WHERE a.created_date_key >= ?{start_idx} AND a.created_date_key <= ?{end_idx}
                   AND {error_clause}{internal}{excluded}
                 ORDER BY a.created_date_key"
            );
            let refs = param_refs(&params);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(refs.as_slice(), |row| {
                Ok(ErrorDetailRow {
                    user_id: row.get(0)?,
                    username: row.get(1)?,
                    org_id: row.get(2)?,
                    org_name: row.get(3)?,
                    activity: row.get(4)?,
                    meta: row.get(5)?,
                    in_current_period: row.get::<_, i64>(6)? != 0,
                    day: row.get(7)?,
                    created: row.get(8)?,
                })
            })?;
            rows.collect::<std::result::Result<Vec<ErrorDetailRow>, _>>()
        })
        .await?;

    // Current-period counts per error type, largest first.
    let mut counter: BTreeMap<&str, i64> = BTreeMap::new();
    for row in details.iter().filter(|r| r.in_current_period) {
        *counter.entry(row.activity.as_str()).or_insert(0) += 1;
    }
    let mut counts: Vec<ErrorCount> = counter
        .into_iter()
        .map(|(activity, count)| ErrorCount {
            activity: activity.to_string(),
            count,
        })
        .collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.activity.cmp(&b.activity)));

    Ok(ErrorOverview { counts, details })
}

/// Drill-down table under the error overview: the clicked error's detail
/// rows, current period only. Foreign or empty events resolve to nothing.
pub fn errors_click_table(event: &ClickEvent) -> ClickSelection<ErrorDetailRow> {
    let Some(point) = event.selection(ERRORS_GRAPH_ID) else {
        return ClickSelection::empty();
    };

    let all_rows: Vec<ErrorDetailRow> = point
        .rows
        .iter()
        .filter_map(|v| serde_json::from_value(v.clone()).ok())
        .collect();
    let Some(first) = all_rows.first() else {
        return ClickSelection::empty();
    };

    let heading = format!("Error: {}", first.activity);
    let rows: Vec<ErrorDetailRow> = all_rows
        .into_iter()
        .filter(|r| r.in_current_period)
        .collect();
    ClickSelection::new(rows, heading)
}

/// Drill-down graph under the error overview: the clicked error's per-day
/// counts in both periods, densified and aligned for overlay plotting.
pub fn errors_click_period_pair(
    event: &ClickEvent,
    window: DateWindow,
) -> Result<Option<ErrorPeriodDrilldown>> {
    let Some(point) = event.selection(ERRORS_GRAPH_ID) else {
        return Ok(None);
    };

    let rows: Vec<ErrorDetailRow> = point
        .rows
        .iter()
        .filter_map(|v| serde_json::from_value(v.clone()).ok())
        .collect();
    let Some(first) = rows.first() else {
        return Ok(None);
    };
    let heading = format!("Error: {}", first.activity);

    // Per-day counts over the combined range; from_combined splits them on
    // the window start, which matches the rows' period flags.
    let mut counts: BTreeMap<NaiveDate, i64> = BTreeMap::new();
    for row in &rows {
        *counts.entry(parse_iso_date(&row.day)?).or_insert(0) += 1;
    }
    let combined: Vec<DailyBucket> = counts
        .into_iter()
        .map(|(day, value)| DailyBucket::new(day, value))
        .collect();
    let pair = PeriodPair::from_combined(window, &combined);

    Ok(Some(ErrorPeriodDrilldown { pair, heading }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drilldown::ClickPoint;
    use crate::storage::repository::{
        insert_activity, upsert_license, upsert_org_subscription, upsert_organization,
        upsert_subscription_type, upsert_user, ActivityRecord, LicenseRecord,
        OrgSubscriptionRecord, OrganizationRecord, SubscriptionTypeRecord, UserRecord,
    };

    async fn seed(db: &Database) {
        db.writer()
            .call(|conn| {
                upsert_organization(
                    conn,
                    &OrganizationRecord {
                        organization_id: 7,
                        name: "Acme".into(),
                        is_touchless: true,
                        is_enterprise: false,
                    },
                )?;
                upsert_organization(
                    conn,
                    &OrganizationRecord {
                        organization_id: 9,
                        name: "Snappy".into(),
                        is_touchless: false,
                        is_enterprise: false,
                    },
                )?;
                let users = [
                    (70, 7, "alice@acme.example"),
                    (71, 7, "bob@acme.example"),
                    (80, 9, "eve@snapaddy.com"),
                ];
                for (user_id, organization_id, username) in users {
                    upsert_user(
                        conn,
                        &UserRecord {
                            user_id,
                            organization_id,
                            username: username.into(),
                            is_deleted: false,
                        },
                    )?;
                }

                for (subscription_type_id, name) in [(16, "FREE_TRIAL"), (32, "VR_CONCURRENT")] {
                    upsert_subscription_type(
                        conn,
                        &SubscriptionTypeRecord {
                            subscription_type_id,
                            name: name.into(),
                        },
                    )?;
                }

                // Concurrent VisitReport subscription with room for one user.
                upsert_org_subscription(
                    conn,
                    &OrgSubscriptionRecord {
                        org_subscription_id: 200,
                        organization_id: 7,
                        subscription_type_id: 32,
                        max_users: Some(1),
                        valid_from: "2023-12-01T00:00:00".into(),
                        valid_until: None,
                    },
                )?;
                // Free trials on three different days.
                for (id, valid_from) in [
                    (300, "2024-01-16T00:00:00"),
                    (301, "2024-01-20T00:00:00"),
                    (302, "2024-01-10T00:00:00"),
                ] {
                    upsert_org_subscription(
                        conn,
                        &OrgSubscriptionRecord {
                            org_subscription_id: id,
                            organization_id: 7,
                            subscription_type_id: 16,
                            max_users: None,
                            valid_from: valid_from.into(),
                            valid_until: None,
                        },
                    )?;
                }
                for (license_id, user_id) in [(1, 70), (2, 71)] {
                    upsert_license(
                        conn,
                        &LicenseRecord {
                            license_id,
                            user_id,
                            org_subscription_id: 200,
                            subscription_name: "VISIT_REPORT_CONCURRENT".into(),
                            assigned_at: "2024-01-01T08:00:00".into(),
                            unassigned_at: None,
                        },
                    )?;
                }

                let activities = [
                    (70, 7, "VR_REPORT_START", "2024-01-02T10:00:00"),
                    (70, 7, "VR_REPORT_START", "2024-01-05T10:00:00"),
                    (71, 7, "VR_REPORT_START", "2024-01-05T11:00:00"),
                    (71, 7, "BCS_CARDS_SCAN_PROCESS", "2024-01-02T09:00:00"),
                    // Internal user, filtered out of every customer metric.
                    (80, 9, "VR_REPORT_START", "2024-01-02T09:30:00"),
                    (70, 7, "BCS_SCAN_ERROR", "2024-01-10T08:00:00"),
                    (70, 7, "BCS_SCAN_ERROR", "2024-01-12T08:00:00"),
                    (71, 7, "GRABBER_EXPORT_ERROR", "2023-12-20T08:00:00"),
                ];
                for (user_id, organization_id, activity, created) in activities {
                    insert_activity(
                        conn,
                        &ActivityRecord {
                            user_id,
                            organization_id,
                            activity: activity.into(),
                            meta: None,
                            created: created.into(),
                        },
                    )?;
                }
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();
    }

    fn params(start: &str, end: &str) -> QueryParams {
        QueryParams::new(DateWindow::parse(start, end).unwrap())
    }

    fn d(y: i32, m: u32, dd: u32) -> chrono::NaiveDate {
        chrono::NaiveDate::from_ymd_opt(y, m, dd).unwrap()
    }

    #[tokio::test]
    async fn test_active_orgs_by_day_densified_and_filtered() {
        let db = Database::open_memory().await.unwrap();
        seed(&db).await;
        let catalog = Catalog::default();

        let days = active_orgs_by_day(&db, &params("2024-01-01", "2024-01-10"), &catalog)
            .await
            .unwrap();
        assert_eq!(days.len(), 10);

        // Jan 1: nothing happened, still present with zeros.
        assert_eq!(days[0].day, d(2024, 1, 1));
        assert_eq!(days[0].total_orgs, 0);

        // Jan 2: only Acme counts; the snapaddy.com user's org is filtered.
        let jan2 = &days[1];
        assert_eq!(jan2.total_orgs, 1);
        assert_eq!(jan2.card_scan_orgs, 1);
        assert_eq!(jan2.visit_report_orgs, 1);
        assert_eq!(jan2.crm_export_orgs, 0);

        // Jan 10: the scan error is not a target activity.
        assert_eq!(days[9].total_orgs, 0);
    }

    #[tokio::test]
    async fn test_new_trials_alignment() {
        let db = Database::open_memory().await.unwrap();
        seed(&db).await;
        let catalog = Catalog::default();

        let pair = new_trials(&db, &params("2024-01-16", "2024-01-30"), &catalog)
            .await
            .unwrap();
        assert_eq!(pair.current.len(), pair.previous.len());

        // The Jan 16 trial sits on the boundary and ends up as the previous
        // series' last bucket.
        let moved = pair.previous.last().unwrap();
        assert_eq!(moved.day, d(2024, 1, 16));
        assert_eq!(moved.value, 1);

        let jan20 = pair.current.iter().find(|b| b.day == d(2024, 1, 20)).unwrap();
        assert_eq!(jan20.value, 1);
        let jan10 = pair.previous.iter().find(|b| b.day == d(2024, 1, 10)).unwrap();
        assert_eq!(jan10.value, 1);
    }

    #[tokio::test]
    async fn test_new_trials_single_day_selection() {
        let db = Database::open_memory().await.unwrap();
        seed(&db).await;
        let catalog = Catalog::default();

        // Picking a single day is valid input; there is no previous period to
        // compare against, so both sides come back empty rather than failing.
        let pair = new_trials(&db, &params("2024-01-16", "2024-01-16"), &catalog)
            .await
            .unwrap();
        assert!(pair.current.is_empty());
        assert!(pair.previous.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_license_exceeders() {
        let db = Database::open_memory().await.unwrap();
        seed(&db).await;
        let catalog = Catalog::default();

        let rows = concurrent_license_exceeders(&db, &params("2024-01-01", "2024-01-10"), &catalog)
            .await
            .unwrap();
        // Both licensed users ran reports on Jan 5 against a one-seat license;
        // Jan 2 had a single user and stays under the limit.
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].day, "2024-01-05");
        assert_eq!(rows[0].max_users, 1);
        assert_eq!(rows[0].distinct_users, 2);
        assert_eq!(rows[0].org_name, "Acme");
    }

    #[tokio::test]
    async fn test_most_active_touchless_orgs() {
        let db = Database::open_memory().await.unwrap();
        seed(&db).await;
        let catalog = Catalog::default();

        let rows = most_active_touchless_orgs(&db, &params("2024-01-01", "2024-01-10"), &catalog)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        let acme = &rows[0];
        assert_eq!(acme.org_id, 7);
        assert_eq!(acme.visit_report_count, 3);
        assert_eq!(acme.card_scan_count, 1);
        assert_eq!(acme.crm_export_count, 0);
        assert_eq!(acme.target_activity_count, 4);
        assert_eq!(acme.distinct_users, 2);
    }

    #[tokio::test]
    async fn test_slipping_away_orgs() {
        let db = Database::open_memory().await.unwrap();
        seed(&db).await;
        let catalog = Catalog::default();

        // User 70 was a heavy grabber user two months ago and has been quiet
        // since. The fixed-date fixture activities are older than the
        // lookback window and do not interfere.
        db.writer()
            .call(|conn| {
                let created = format!("{}T10:00:00", date_k_days_ago(60));
                for _ in 0..51 {
                    insert_activity(
                        conn,
                        &ActivityRecord {
                            user_id: 70,
                            organization_id: 7,
                            activity: "GRABBER_SEARCH".into(),
                            meta: None,
                            created: created.clone(),
                        },
                    )?;
                }
                Ok::<(), rusqlite::Error>(())
            })
            .await
            .unwrap();

        let rows = slipping_away_orgs(&db, &BTreeSet::new(), &catalog).await.unwrap();
        assert_eq!(rows.len(), 1);
        let acme = &rows[0];
        assert_eq!(acme.org_id, 7);
        assert_eq!(acme.slipping_users, 1);
        assert_eq!(acme.total_users, 2);
        assert!((acme.severity_pct - 50.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_assigned_licenses_by_day() {
        let db = Database::open_memory().await.unwrap();
        seed(&db).await;

        let window = DateWindow::parse("2024-01-01", "2024-01-10").unwrap();
        let days = assigned_licenses_by_day(&db, window).await.unwrap();
        assert_eq!(days.len(), 10);
        assert_eq!(days[0].total, 2);
        assert_eq!(days[0].visit_report, 2);
        assert_eq!(days[0].business_cards, 0);
        assert_eq!(days[1].total, 0);
    }

    #[tokio::test]
    async fn test_top_error_orgs() {
        let db = Database::open_memory().await.unwrap();
        seed(&db).await;
        let catalog = Catalog::default();

        let rows = top_error_orgs(&db, &params("2024-01-01", "2024-01-30"), &catalog)
            .await
            .unwrap();
        // The December export error is outside the window.
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].activity, "BCS_SCAN_ERROR");
        assert_eq!(rows[0].org_id, 7);
        assert_eq!(rows[0].error_count, 2);
    }

    #[tokio::test]
    async fn test_error_overview_flags_periods() {
        let db = Database::open_memory().await.unwrap();
        seed(&db).await;
        let catalog = Catalog::default();

        let overview = error_overview(&db, &params("2024-01-01", "2024-01-30"), &catalog)
            .await
            .unwrap();

        // Two current scan errors plus one export error from the previous
        // period (combined range reaches back to 2023-12-04).
        assert_eq!(overview.details.len(), 3);
        let current: Vec<_> = overview.details.iter().filter(|r| r.in_current_period).collect();
        assert_eq!(current.len(), 2);
        assert!(current.iter().all(|r| r.activity == "BCS_SCAN_ERROR"));

        // Counts cover the current period only.
        assert_eq!(overview.counts.len(), 1);
        assert_eq!(overview.counts[0].activity, "BCS_SCAN_ERROR");
        assert_eq!(overview.counts[0].count, 2);
    }

    fn click_with_rows(source: &str, rows: Vec<serde_json::Value>) -> ClickEvent {
        ClickEvent {
            source: source.into(),
            points: vec![ClickPoint {
                x: Some(serde_json::json!("BCS_SCAN_ERROR")),
                y: Some(rows.len() as f64),
                trace: None,
                rows,
            }],
        }
    }

    fn detail(day: &str, in_current_period: bool) -> ErrorDetailRow {
        ErrorDetailRow {
            user_id: Some(70),
            username: Some("alice@acme.example".into()),
            org_id: Some(7),
            org_name: Some("Acme".into()),
            activity: "BCS_SCAN_ERROR".into(),
            meta: None,
            in_current_period,
            day: day.into(),
            created: format!("{day}T08:00:00"),
        }
    }

    #[test]
    fn test_errors_click_table_filters_to_current_period() {
        let rows = vec![
            serde_json::to_value(detail("2024-01-10", true)).unwrap(),
            serde_json::to_value(detail("2023-12-20", false)).unwrap(),
        ];
        let selection = errors_click_table(&click_with_rows(ERRORS_GRAPH_ID, rows));
        assert_eq!(selection.heading, "Error: BCS_SCAN_ERROR");
        assert_eq!(selection.rows.len(), 1);
        assert!(selection.rows[0].in_current_period);
    }

    #[test]
    fn test_errors_click_table_foreign_source_is_empty() {
        let rows = vec![serde_json::to_value(detail("2024-01-10", true)).unwrap()];
        let selection = errors_click_table(&click_with_rows("some-other-graph", rows));
        assert!(selection.rows.is_empty());
        assert!(selection.heading.is_empty());
    }

    #[test]
    fn test_errors_click_table_no_rows_is_empty() {
        let selection = errors_click_table(&click_with_rows(ERRORS_GRAPH_ID, vec![]));
        assert!(selection.rows.is_empty());
        assert!(selection.heading.is_empty());
    }

    #[test]
    fn test_errors_click_period_pair() {
        let window = DateWindow::parse("2024-01-01", "2024-01-30").unwrap();
        let rows = vec![
            serde_json::to_value(detail("2024-01-10", true)).unwrap(),
            serde_json::to_value(detail("2024-01-10", true)).unwrap(),
            serde_json::to_value(detail("2023-12-20", false)).unwrap(),
        ];
        let drill = errors_click_period_pair(&click_with_rows(ERRORS_GRAPH_ID, rows), window)
            .unwrap()
            .unwrap();

        assert_eq!(drill.heading, "Error: BCS_SCAN_ERROR");
        assert_eq!(drill.pair.current.len(), drill.pair.previous.len());
        let jan10 = drill
            .pair
            .current
            .iter()
            .find(|b| b.day == d(2024, 1, 10))
            .unwrap();
        assert_eq!(jan10.value, 2);
        let dec20 = drill
            .pair
            .previous
            .iter()
            .find(|b| b.day == d(2023, 12, 20))
            .unwrap();
        assert_eq!(dec20.value, 1);
    }

    #[test]
    fn test_errors_click_period_pair_foreign_source() {
        let window = DateWindow::parse("2024-01-01", "2024-01-30").unwrap();
        let rows = vec![serde_json::to_value(detail("2024-01-10", true)).unwrap()];
        let drill =
            errors_click_period_pair(&click_with_rows("some-other-graph", rows), window).unwrap();
        assert!(drill.is_none());
    }
}
