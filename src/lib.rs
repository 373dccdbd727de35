pub mod catalog;
pub mod dashboards;
pub mod date_util;
pub mod drilldown;
pub mod error;
pub mod query;
pub mod series;
pub mod storage;

pub use catalog::Catalog;
pub use drilldown::{ClickEvent, ClickPoint, ClickSelection};
pub use error::{Error, Result};
pub use query::{DateWindow, QueryParams};
pub use series::{DailyBucket, PeriodPair};
pub use storage::Database;

pub use dashboards::types::{
    ActiveTouchlessRow, ActivityTrialUsage, ConcurrentExceedRow, ErrorCount, ErrorDetailRow,
    ErrorOverview, ErrorPeriodDrilldown, FrequentActivityRow, LicenseAssignmentDay, OrgUsageDay,
    ProductCount, ProductMixCount, ProductTrialUsage, SlippingAwayRow, TopErrorOrgRow,
};
pub use storage::repository::{ImportBatch, ImportStats};

use std::collections::BTreeSet;

use storage::repository;

/// Key in `app_config` holding the comma-separated excluded organization ids.
const EXCLUDED_ORGS_KEY: &str = "excluded_org_ids";

/// Main entry point for the usage data warehouse.
pub struct UsageDW {
    db: Database,
    catalog: Catalog,
}

impl UsageDW {
    pub fn new(db: Database, catalog: Catalog) -> Self {
        Self { db, catalog }
    }

    /// Access the database (for direct queries in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Query parameters for a window, applying the persisted organization
    /// exclusions. Unparseable ids in the stored list are skipped.
    pub async fn query_params(&self, window: DateWindow) -> Result<QueryParams> {
        let excluded = self.excluded_org_ids().await?;
        Ok(QueryParams::new(window).exclude_orgs(excluded))
    }

    pub async fn excluded_org_ids(&self) -> Result<BTreeSet<i64>> {
        let raw = self.config_get(EXCLUDED_ORGS_KEY).await?;
        Ok(raw
            .map(|s| {
                s.split(',')
                    .filter_map(|part| part.trim().parse().ok())
                    .collect()
            })
            .unwrap_or_default())
    }

    // ── Home dashboard ─────────────────────────────────────────────

    pub async fn active_orgs_by_day(&self, query: &QueryParams) -> Result<Vec<OrgUsageDay>> {
        dashboards::home::active_orgs_by_day(&self.db, query, &self.catalog).await
    }

    pub async fn new_trials(&self, query: &QueryParams) -> Result<PeriodPair> {
        dashboards::home::new_trials(&self.db, query, &self.catalog).await
    }

    pub async fn concurrent_license_exceeders(
        &self,
        query: &QueryParams,
    ) -> Result<Vec<ConcurrentExceedRow>> {
        dashboards::home::concurrent_license_exceeders(&self.db, query, &self.catalog).await
    }

    pub async fn most_active_touchless_orgs(
        &self,
        query: &QueryParams,
    ) -> Result<Vec<ActiveTouchlessRow>> {
        dashboards::home::most_active_touchless_orgs(&self.db, query, &self.catalog).await
    }

    pub async fn slipping_away_orgs(&self) -> Result<Vec<SlippingAwayRow>> {
        let excluded = self.excluded_org_ids().await?;
        dashboards::home::slipping_away_orgs(&self.db, &excluded, &self.catalog).await
    }

    pub async fn assigned_licenses_by_day(
        &self,
        window: DateWindow,
    ) -> Result<Vec<LicenseAssignmentDay>> {
        dashboards::home::assigned_licenses_by_day(&self.db, window).await
    }

    pub async fn top_error_orgs(&self, query: &QueryParams) -> Result<Vec<TopErrorOrgRow>> {
        dashboards::home::top_error_orgs(&self.db, query, &self.catalog).await
    }

    pub async fn error_overview(&self, query: &QueryParams) -> Result<ErrorOverview> {
        dashboards::home::error_overview(&self.db, query, &self.catalog).await
    }

    pub fn errors_click_table(&self, event: &ClickEvent) -> ClickSelection<ErrorDetailRow> {
        dashboards::home::errors_click_table(event)
    }

    pub fn errors_click_period_pair(
        &self,
        event: &ClickEvent,
        window: DateWindow,
    ) -> Result<Option<ErrorPeriodDrilldown>> {
        dashboards::home::errors_click_period_pair(event, window)
    }

    // ── Free-trials dashboard ──────────────────────────────────────

    pub async fn product_usage_by_trial_day(
        &self,
        query: &QueryParams,
    ) -> Result<Vec<ProductTrialUsage>> {
        dashboards::trials::product_usage_by_trial_day(&self.db, query, &self.catalog).await
    }

    pub fn resolve_product_selection(&self, event: &ClickEvent) -> String {
        dashboards::trials::resolve_product_selection(event)
    }

    pub async fn activities_by_trial_day(
        &self,
        query: &QueryParams,
    ) -> Result<Vec<ActivityTrialUsage>> {
        dashboards::trials::activities_by_trial_day(&self.db, query, &self.catalog).await
    }

    pub async fn activities_by_product(&self, query: &QueryParams) -> Result<Vec<ProductCount>> {
        dashboards::trials::activities_by_product(&self.db, query, &self.catalog).await
    }

    pub async fn frequent_trial_activities(
        &self,
        query: &QueryParams,
    ) -> Result<Vec<FrequentActivityRow>> {
        dashboards::trials::frequent_trial_activities(&self.db, query, &self.catalog).await
    }

    pub async fn product_mix_per_org(&self, query: &QueryParams) -> Result<Vec<ProductMixCount>> {
        dashboards::trials::product_mix_per_org(&self.db, query, &self.catalog).await
    }

    // ── Import ─────────────────────────────────────────────────────

    pub async fn import(&self, batch: ImportBatch) -> Result<ImportStats> {
        let stats = self
            .db
            .writer()
            .call(move |conn| repository::import_batch(conn, &batch))
            .await?;
        log::info!(
            "imported {} orgs, {} users, {} subscriptions, {} licenses, {} activities",
            stats.organizations,
            stats.users,
            stats.org_subscriptions,
            stats.licenses,
            stats.activities
        );
        Ok(stats)
    }

    // ── Config commands ────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        self.db
            .reader()
            .call({
                let key = key.to_string();
                move |conn| repository::get_config(conn, &key)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        self.db
            .writer()
            .call({
                let key = key.to_string();
                let value = value.to_string();
                move |conn| repository::set_config(conn, &key, &value)
            })
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        self.db
            .reader()
            .call(|conn| repository::list_config(conn))
            .await
            .map_err(|e| Error::Database(e.to_string()))
    }
}
