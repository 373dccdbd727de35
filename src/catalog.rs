use serde::{Deserialize, Serialize};

/// Activity and subscription constants the dashboards filter on.
///
/// These used to live as process-wide lookups; they are now passed into every
/// query function explicitly so tests and deployments can swap them out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    /// Target activity per product: at least one of these per day marks an
    /// organization as actively using that product.
    pub card_scan_activity: String,
    pub visit_report_activity: String,
    pub crm_export_activity: String,

    /// Error-type activity names (the `error_all` group).
    pub error_activities: Vec<String>,

    /// Grabber-family activity names (the `grabber_all` group), used by the
    /// slipping-away report.
    pub grabber_activities: Vec<String>,

    /// Activities that count toward trial product usage.
    pub relevant_trial_activities: Vec<String>,

    /// Assistant/suggestion/social activities excluded from the trial
    /// activity breakdowns.
    pub suggestion_activities: Vec<String>,

    /// Product prefixes shown individually; everything else folds into OTHER.
    pub product_list: Vec<String>,

    /// Subscription type id of the free trial.
    pub free_trial_type_id: i64,

    /// Subscription type id of the concurrent VisitReport license.
    pub concurrent_vr_type_id: i64,

    /// The in-house organization, always included regardless of the
    /// internal-username filter.
    pub internal_org_id: i64,

    /// Username suffix identifying internal users, filtered out of customer
    /// metrics (except within `internal_org_id`).
    pub internal_user_suffix: String,

    /// Trial days shown on the trial-day axis.
    pub trial_length_days: i64,

    /// Slipping-away report: how far back to look for grabber activity.
    pub slipping_lookback_days: i64,

    /// Slipping-away report: days of silence before a user counts as
    /// slipping away.
    pub slipping_quiet_days: i64,

    /// Slipping-away report: minimum events in the lookback window for a
    /// user to have been considered active at all.
    pub slipping_min_events: i64,
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            card_scan_activity: "BCS_CARDS_SCAN_PROCESS".into(),
            visit_report_activity: "VR_REPORT_START".into(),
            crm_export_activity: "GRABBER_EXPORT_CRM".into(),
            error_activities: vec![
                "BCS_SCAN_ERROR".into(),
                "GRABBER_EXPORT_ERROR".into(),
                "VR_SYNC_ERROR".into(),
                "LOGIN_ERROR".into(),
            ],
            grabber_activities: vec![
                "GRABBER_EXPORT_CRM".into(),
                "GRABBER_CONTACT_PARSE".into(),
                "GRABBER_SEARCH".into(),
            ],
            relevant_trial_activities: vec![
                "BCS_CARDS_SCAN_PROCESS".into(),
                "VR_REPORT_START".into(),
                "GRABBER_EXPORT_CRM".into(),
                "GRABBER_CONTACT_PARSE".into(),
                "EXPORT_DOWNLOAD".into(),
            ],
            suggestion_activities: vec![
                "ASSISTANT_EMAIL_SUGGESTION".into(),
                "SUGGESTIONS_SHOWN".into(),
                "SOCIAL_PROFILE_LOOKUP".into(),
            ],
            product_list: vec!["BCS".into(), "GRABBER".into(), "EXPORT".into(), "VR".into()],
            free_trial_type_id: 16,
            concurrent_vr_type_id: 32,
            internal_org_id: 1,
            internal_user_suffix: "@snapaddy.com".into(),
            trial_length_days: 14,
            slipping_lookback_days: 120,
            slipping_quiet_days: 30,
            slipping_min_events: 50,
        }
    }
}

impl Catalog {
    /// Load a catalog from a JSON file, falling back to the defaults when the
    /// path does not exist.
    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)
            .map_err(|e| crate::error::Error::Config(e.to_string()))?;
        serde_json::from_str(&raw).map_err(|e| crate::error::Error::Config(e.to_string()))
    }

    /// The three per-product target activities.
    pub fn target_activities(&self) -> [&str; 3] {
        [
            &self.card_scan_activity,
            &self.visit_report_activity,
            &self.crm_export_activity,
        ]
    }

    /// Whether a product prefix gets its own category.
    pub fn is_listed_product(&self, prefix: &str) -> bool {
        self.product_list.iter().any(|p| p == prefix)
    }
}

/// Product prefix of an activity name: the part before the first underscore
/// (`GRABBER_EXPORT_CRM` → `GRABBER`).
pub fn product_prefix(activity: &str) -> &str {
    activity.split('_').next().unwrap_or(activity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_prefix() {
        assert_eq!(product_prefix("GRABBER_EXPORT_CRM"), "GRABBER");
        assert_eq!(product_prefix("VR_REPORT_START"), "VR");
        assert_eq!(product_prefix("PLAIN"), "PLAIN");
        assert_eq!(product_prefix(""), "");
    }

    #[test]
    fn test_default_catalog() {
        let c = Catalog::default();
        assert_eq!(c.free_trial_type_id, 16);
        assert_eq!(c.trial_length_days, 14);
        assert!(c.is_listed_product("VR"));
        assert!(!c.is_listed_product("LOGIN"));
        assert_eq!(c.target_activities().len(), 3);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let c = Catalog::load(std::path::Path::new("/nonexistent/catalog.json")).unwrap();
        assert_eq!(c.internal_org_id, 1);
    }

    #[test]
    fn test_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        let mut c = Catalog::default();
        c.trial_length_days = 30;
        std::fs::write(&path, serde_json::to_string(&c).unwrap()).unwrap();
        let loaded = Catalog::load(&path).unwrap();
        assert_eq!(loaded.trial_length_days, 30);
    }
}
