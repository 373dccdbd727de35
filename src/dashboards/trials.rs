//! Free-trials dashboard: product and activity usage over the trial-day
//! axis, plus the product-mix and frequent-activity breakdowns.

use std::collections::{BTreeMap, BTreeSet};

use super::types::{
    ActivityTrialUsage, FrequentActivityRow, ProductCount, ProductMixCount, ProductTrialUsage,
};
use super::{
    activity_in_clause, activity_not_in_clause, excluded_orgs_clause, internal_user_clause,
    param_refs, push_param, SqlParams,
};
use crate::catalog::{product_prefix, Catalog};
use crate::drilldown::ClickEvent;
use crate::error::Result;
use crate::query::{DateWindow, QueryParams};
use crate::series::densify_indexed;
use crate::storage::Database;

/// Chart id of the product-usage bar chart on this dashboard.
pub const PRODUCTS_GRAPH_ID: &str = "trials-products-graph";

/// Shown under the product chart until a bar segment is clicked.
pub const DEFAULT_PRODUCT_PROMPT: &str =
    "Click a bar segment to show the selected product and trial day.";

/// Which day of its trial an activity happened on, zero-based.
const DAY_NR: &str =
    "CAST(julianday(a.created_date_key) - julianday(s.valid_from_date_key) AS INTEGER)";

/// Filter fragment limiting activity rows to free-trial organizations whose
/// trial started inside the window and is still valid past its end, and to
/// the first `trial_length_days` days of each trial.
fn trial_scope(
    window: DateWindow,
    excluded_ids: &BTreeSet<i64>,
    catalog: &Catalog,
    params: &mut SqlParams,
) -> String {
    let type_idx = push_param(params, catalog.free_trial_type_id);
    let start_idx = push_param(params, window.start_key());
    let end_idx = push_param(params, window.end_key());
    let len_idx = push_param(params, catalog.trial_length_days);
    let internal = internal_user_clause("a.organization_id", "u.username", catalog, params);
    let excluded = excluded_orgs_clause("a.organization_id", excluded_ids, params);
    format!(
        "s.subscription_type_id = ?{type_idx}
           AND s.valid_from_date_key >= ?{start_idx}
           AND (s.valid_until IS NULL OR s.valid_until > ?{end_idx})
           AND a.created_date_key >= s.valid_from_date_key
           AND {DAY_NR} < ?{len_idx}{internal}{excluded}"
    )
}

/// Distinct active users per product and trial day (day 1..=N), one densified
/// count vector per product, products in alphabetical order.
pub async fn product_usage_by_trial_day(
    db: &Database,
    query: &QueryParams,
    catalog: &Catalog,
) -> Result<Vec<ProductTrialUsage>> {
    let window = query.window;
    let q = query.clone();
    let cat = catalog.clone();

    let raw: Vec<(i64, String, i64)> = db
        .reader()
        .call(move |conn| {
            let mut params = SqlParams::new();
            let relevant =
                activity_in_clause("a.activity", &cat.relevant_trial_activities, &mut params);
            let scope = trial_scope(window, &q.excluded_org_ids, &cat, &mut params);

            let sql = format!(
                "SELECT DISTINCT {DAY_NR}, a.activity, a.user_id
                 FROM fact_activities a
                 JOIN fact_org_subscriptions s ON s.organization_id = a.organization_id
                 JOIN dim_users u ON u.user_id = a.user_id
                 WHERE {relevant}
                   AND {scope}"
            );
            let refs = param_refs(&params);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(refs.as_slice(), |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
        })
        .await?;

    // Distinct users per (product, trial day). The same user hitting two
    // activities of one product on one day counts once.
    let mut users: BTreeMap<(String, i64), BTreeSet<i64>> = BTreeMap::new();
    for (day_nr, activity, user_id) in &raw {
        let product = product_prefix(activity).to_string();
        users.entry((product, day_nr + 1)).or_default().insert(*user_id);
    }

    let mut per_product: BTreeMap<String, Vec<(i64, i64)>> = BTreeMap::new();
    for ((product, day), ids) in users {
        per_product.entry(product).or_default().push((day, ids.len() as i64));
    }

    Ok(per_product
        .into_iter()
        .map(|(product, sparse)| ProductTrialUsage {
            product,
            user_counts: densify_indexed(&sparse, 1, catalog.trial_length_days, 0),
        })
        .collect())
}

/// Heading for the table under the product chart. Foreign or empty events
/// keep the default prompt; a zero-height segment names the selection but
/// says there is nothing behind it.
pub fn resolve_product_selection(event: &ClickEvent) -> String {
    let Some(point) = event.selection(PRODUCTS_GRAPH_ID) else {
        return DEFAULT_PRODUCT_PROMPT.to_string();
    };
    let (Some(product), Some(day)) = (point.trace.as_deref(), point.x_label()) else {
        return DEFAULT_PRODUCT_PROMPT.to_string();
    };
    if point.is_zero() {
        format!("Product: {product} - Day {day} (no active users)")
    } else {
        format!("Product: {product} - Day {day}")
    }
}

/// Event counts per activity and trial day (day 1..=N), activities in
/// alphabetical order.
pub async fn activities_by_trial_day(
    db: &Database,
    query: &QueryParams,
    catalog: &Catalog,
) -> Result<Vec<ActivityTrialUsage>> {
    let window = query.window;
    let q = query.clone();
    let cat = catalog.clone();

    let raw: Vec<(String, i64, i64)> = db
        .reader()
        .call(move |conn| {
            let mut params = SqlParams::new();
            let relevant =
                activity_in_clause("a.activity", &cat.relevant_trial_activities, &mut params);
            let scope = trial_scope(window, &q.excluded_org_ids, &cat, &mut params);

            let sql = format!(
                "SELECT a.activity, {DAY_NR} AS day_nr, COUNT(*)
                 FROM fact_activities a
                 JOIN fact_org_subscriptions s ON s.organization_id = a.organization_id
                 JOIN dim_users u ON u.user_id = a.user_id
                 WHERE {relevant}
                   AND {scope}
                 GROUP BY a.activity, day_nr"
            );
            let refs = param_refs(&params);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(refs.as_slice(), |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
        })
        .await?;

    let mut per_activity: BTreeMap<String, Vec<(i64, i64)>> = BTreeMap::new();
    for (activity, day_nr, count) in raw {
        per_activity.entry(activity).or_default().push((day_nr + 1, count));
    }

    Ok(per_activity
        .into_iter()
        .map(|(activity, sparse)| ActivityTrialUsage {
            activity,
            event_counts: densify_indexed(&sparse, 1, catalog.trial_length_days, 0),
        })
        .collect())
}

/// Trial activity volume folded into product categories, ascending by count.
/// Prefixes outside the product list collapse into a trailing OTHER bucket,
/// present even when empty.
pub async fn activities_by_product(
    db: &Database,
    query: &QueryParams,
    catalog: &Catalog,
) -> Result<Vec<ProductCount>> {
    let window = query.window;
    let q = query.clone();
    let cat = catalog.clone();

    let raw: Vec<(String, i64)> = db
        .reader()
        .call(move |conn| {
            let mut params = SqlParams::new();
            let suggestions =
                activity_not_in_clause("a.activity", &cat.suggestion_activities, &mut params);
            let scope = trial_scope(window, &q.excluded_org_ids, &cat, &mut params);

            let sql = format!(
                "SELECT a.activity, COUNT(*)
                 FROM fact_activities a
                 JOIN fact_org_subscriptions s ON s.organization_id = a.organization_id
                 JOIN dim_users u ON u.user_id = a.user_id
                 WHERE {scope}{suggestions}
                 GROUP BY a.activity"
            );
            let refs = param_refs(&params);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(refs.as_slice(), |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
        })
        .await?;

    Ok(fold_into_products(&raw, catalog))
}

/// Fold per-activity counts into per-product counts.
fn fold_into_products(counts: &[(String, i64)], catalog: &Catalog) -> Vec<ProductCount> {
    let mut products: BTreeMap<&str, i64> = BTreeMap::new();
    let mut other = 0_i64;
    for (activity, count) in counts {
        let prefix = product_prefix(activity);
        if catalog.is_listed_product(prefix) {
            *products.entry(prefix).or_insert(0) += count;
        } else {
            other += count;
        }
    }

    let mut out: Vec<ProductCount> = products
        .into_iter()
        .map(|(product, count)| ProductCount {
            product: product.to_string(),
            count,
        })
        .collect();
    out.sort_by(|a, b| a.count.cmp(&b.count).then_with(|| a.product.cmp(&b.product)));
    out.push(ProductCount {
        product: "OTHER".to_string(),
        count: other,
    });
    out
}

/// The most frequent activities among trial users, with the number of
/// distinct users behind each, busiest first.
pub async fn frequent_trial_activities(
    db: &Database,
    query: &QueryParams,
    catalog: &Catalog,
) -> Result<Vec<FrequentActivityRow>> {
    let window = query.window;
    let q = query.clone();
    let cat = catalog.clone();

    let rows = db
        .reader()
        .call(move |conn| {
            let mut params = SqlParams::new();
            let suggestions =
                activity_not_in_clause("a.activity", &cat.suggestion_activities, &mut params);
            let scope = trial_scope(window, &q.excluded_org_ids, &cat, &mut params);

            let sql = format!(
                "SELECT a.activity, COUNT(*) AS activity_count, COUNT(DISTINCT a.user_id)
                 FROM fact_activities a
                 JOIN fact_org_subscriptions s ON s.organization_id = a.organization_id
                 JOIN dim_users u ON u.user_id = a.user_id
                 WHERE {scope}{suggestions}
                 GROUP BY a.activity
                 ORDER BY activity_count DESC, a.activity ASC"
            );
            let refs = param_refs(&params);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(refs.as_slice(), |row| {
                Ok(FrequentActivityRow {
                    activity: row.get(0)?,
                    activity_count: row.get(1)?,
                    user_count: row.get(2)?,
                })
            })?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
        })
        .await?;
    Ok(rows)
}

/// Which product combinations trial organizations actually touch: one row
/// per distinct mix (listed products only, `+`-joined in alphabetical
/// order), most common mix first. Organizations that used no listed product
/// are dropped.
pub async fn product_mix_per_org(
    db: &Database,
    query: &QueryParams,
    catalog: &Catalog,
) -> Result<Vec<ProductMixCount>> {
    let window = query.window;
    let q = query.clone();
    let cat = catalog.clone();

    let raw: Vec<(i64, String)> = db
        .reader()
        .call(move |conn| {
            let mut params = SqlParams::new();
            let relevant =
                activity_in_clause("a.activity", &cat.relevant_trial_activities, &mut params);
            let scope = trial_scope(window, &q.excluded_org_ids, &cat, &mut params);

            let sql = format!(
                "SELECT DISTINCT a.organization_id, a.activity
                 FROM fact_activities a
                 JOIN fact_org_subscriptions s ON s.organization_id = a.organization_id
                 JOIN dim_users u ON u.user_id = a.user_id
                 WHERE {relevant}
                   AND {scope}"
            );
            let refs = param_refs(&params);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(refs.as_slice(), |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
        })
        .await?;

    let mut per_org: BTreeMap<i64, BTreeSet<&str>> = BTreeMap::new();
    for (org_id, activity) in &raw {
        let prefix = product_prefix(activity);
        if catalog.is_listed_product(prefix) {
            per_org.entry(*org_id).or_default().insert(prefix);
        }
    }

    let mut mixes: BTreeMap<String, i64> = BTreeMap::new();
    for products in per_org.values() {
        if products.is_empty() {
            continue;
        }
        let mix = products.iter().copied().collect::<Vec<_>>().join("+");
        *mixes.entry(mix).or_insert(0) += 1;
    }

    let mut out: Vec<ProductMixCount> = mixes
        .into_iter()
        .map(|(mix, org_count)| ProductMixCount { mix, org_count })
        .collect();
    out.sort_by(|a, b| b.org_count.cmp(&a.org_count).then_with(|| a.mix.cmp(&b.mix)));
    Ok(out)
}
