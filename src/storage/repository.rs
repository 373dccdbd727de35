use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

/// Replicated record shapes, as the upstream replication job exports them.
/// Timestamps are ISO-8601 strings; the date key column is derived on insert.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrganizationRecord {
    pub organization_id: i64,
    pub name: String,
    #[serde(default)]
    pub is_touchless: bool,
    #[serde(default)]
    pub is_enterprise: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: i64,
    pub organization_id: i64,
    pub username: String,
    #[serde(default)]
    pub is_deleted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionTypeRecord {
    pub subscription_type_id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrgSubscriptionRecord {
    pub org_subscription_id: i64,
    pub organization_id: i64,
    pub subscription_type_id: i64,
    #[serde(default)]
    pub max_users: Option<i64>,
    pub valid_from: String,
    #[serde(default)]
    pub valid_until: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseRecord {
    pub license_id: i64,
    pub user_id: i64,
    pub org_subscription_id: i64,
    pub subscription_name: String,
    pub assigned_at: String,
    #[serde(default)]
    pub unassigned_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub user_id: i64,
    pub organization_id: i64,
    pub activity: String,
    #[serde(default)]
    pub meta: Option<String>,
    pub created: String,
}

fn to_date_key(timestamp: &str) -> String {
    timestamp.split(['T', ' ']).next().unwrap_or(timestamp).to_string()
}

// ── Upserts ────────────────────────────────────────────────────────

pub fn upsert_organization(
    conn: &Connection,
    org: &OrganizationRecord,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO dim_organizations
             (organization_id, name, is_touchless, is_enterprise, cached_at)
         VALUES (?1, ?2, ?3, ?4, datetime('now'))",
        params![
            org.organization_id,
            org.name,
            org.is_touchless as i32,
            org.is_enterprise as i32
        ],
    )?;
    Ok(())
}

pub fn upsert_user(conn: &Connection, user: &UserRecord) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO dim_users
             (user_id, organization_id, username, is_deleted, cached_at)
         VALUES (?1, ?2, ?3, ?4, datetime('now'))",
        params![
            user.user_id,
            user.organization_id,
            user.username,
            user.is_deleted as i32
        ],
    )?;
    Ok(())
}

pub fn upsert_subscription_type(
    conn: &Connection,
    st: &SubscriptionTypeRecord,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO dim_subscription_types (subscription_type_id, name)
         VALUES (?1, ?2)",
        params![st.subscription_type_id, st.name],
    )?;
    Ok(())
}

pub fn upsert_org_subscription(
    conn: &Connection,
    sub: &OrgSubscriptionRecord,
) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO fact_org_subscriptions
             (org_subscription_id, organization_id, subscription_type_id,
              max_users, valid_from, valid_from_date_key, valid_until)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            sub.org_subscription_id,
            sub.organization_id,
            sub.subscription_type_id,
            sub.max_users,
            sub.valid_from,
            to_date_key(&sub.valid_from),
            sub.valid_until
        ],
    )?;
    Ok(())
}

pub fn upsert_license(conn: &Connection, lic: &LicenseRecord) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO fact_user_licenses
             (license_id, user_id, org_subscription_id, subscription_name,
              assigned_at, assigned_date_key, unassigned_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            lic.license_id,
            lic.user_id,
            lic.org_subscription_id,
            lic.subscription_name,
            lic.assigned_at,
            to_date_key(&lic.assigned_at),
            lic.unassigned_at
        ],
    )?;
    Ok(())
}

pub fn insert_activity(conn: &Connection, act: &ActivityRecord) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO fact_activities
             (user_id, organization_id, activity, meta, created, created_date_key)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            act.user_id,
            act.organization_id,
            act.activity,
            act.meta,
            act.created,
            to_date_key(&act.created)
        ],
    )?;
    Ok(())
}

// ── Batch import ───────────────────────────────────────────────────

/// One export file from the upstream replication job: any subset of the
/// record kinds, in any combination.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportBatch {
    #[serde(default)]
    pub organizations: Vec<OrganizationRecord>,
    #[serde(default)]
    pub users: Vec<UserRecord>,
    #[serde(default)]
    pub subscription_types: Vec<SubscriptionTypeRecord>,
    #[serde(default)]
    pub org_subscriptions: Vec<OrgSubscriptionRecord>,
    #[serde(default)]
    pub licenses: Vec<LicenseRecord>,
    #[serde(default)]
    pub activities: Vec<ActivityRecord>,
}

/// Rows written per table by one import.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ImportStats {
    pub organizations: usize,
    pub users: usize,
    pub subscription_types: usize,
    pub org_subscriptions: usize,
    pub licenses: usize,
    pub activities: usize,
}

/// Apply a whole batch inside one transaction. Dimensions are written before
/// facts so foreign keys resolve within the same batch.
pub fn import_batch(
    conn: &mut Connection,
    batch: &ImportBatch,
) -> Result<ImportStats, rusqlite::Error> {
    let tx = conn.transaction()?;
    for org in &batch.organizations {
        upsert_organization(&tx, org)?;
    }
    for user in &batch.users {
        upsert_user(&tx, user)?;
    }
    for st in &batch.subscription_types {
        upsert_subscription_type(&tx, st)?;
    }
    for sub in &batch.org_subscriptions {
        upsert_org_subscription(&tx, sub)?;
    }
    for lic in &batch.licenses {
        upsert_license(&tx, lic)?;
    }
    for act in &batch.activities {
        insert_activity(&tx, act)?;
    }
    tx.commit()?;
    Ok(ImportStats {
        organizations: batch.organizations.len(),
        users: batch.users.len(),
        subscription_types: batch.subscription_types.len(),
        org_subscriptions: batch.org_subscriptions.len(),
        licenses: batch.licenses.len(),
        activities: batch.activities.len(),
    })
}

// ── App config ─────────────────────────────────────────────────────

pub fn get_config(conn: &Connection, key: &str) -> Result<Option<String>, rusqlite::Error> {
    conn.query_row(
        "SELECT value FROM app_config WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
}

pub fn set_config(conn: &Connection, key: &str, value: &str) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT OR REPLACE INTO app_config (key, value) VALUES (?1, ?2)",
        params![key, value],
    )?;
    Ok(())
}

pub fn list_config(conn: &Connection) -> Result<Vec<(String, String)>, rusqlite::Error> {
    let mut stmt = conn.prepare("SELECT key, value FROM app_config ORDER BY key")?;
    let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}
