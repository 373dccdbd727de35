pub mod home;
pub mod trials;
pub mod types;

use std::collections::BTreeSet;

use crate::catalog::Catalog;

/// Positional SQL parameters accumulated while a query string is assembled.
/// Same pattern as building filtered task queries: each fragment pushes its
/// values and references them by index.
pub(crate) type SqlParams = Vec<Box<dyn rusqlite::types::ToSql>>;

pub(crate) fn push_param(
    params: &mut SqlParams,
    value: impl rusqlite::types::ToSql + 'static,
) -> usize {
    params.push(Box::new(value));
    params.len()
}

pub(crate) fn param_refs(params: &SqlParams) -> Vec<&dyn rusqlite::types::ToSql> {
    params.iter().map(|p| p.as_ref()).collect()
}

/// `AND <column> NOT IN (...)` for the excluded-organization set, or nothing
/// when the set is empty.
pub(crate) fn excluded_orgs_clause(
    column: &str,
    ids: &BTreeSet<i64>,
    params: &mut SqlParams,
) -> String {
    if ids.is_empty() {
        return String::new();
    }
    let placeholders: Vec<String> = ids
        .iter()
        .map(|id| format!("?{}", push_param(params, *id)))
        .collect();
    format!(" AND {column} NOT IN ({})", placeholders.join(","))
}

/// `<column> IN (...)` over a list of activity names. An empty list matches
/// nothing rather than producing invalid SQL.
pub(crate) fn activity_in_clause(
    column: &str,
    names: &[String],
    params: &mut SqlParams,
) -> String {
    if names.is_empty() {
        return "0 = 1".to_string();
    }
    let placeholders: Vec<String> = names
        .iter()
        .map(|name| format!("?{}", push_param(params, name.clone())))
        .collect();
    format!("{column} IN ({})", placeholders.join(","))
}

/// `AND NOT (<column> IN (...))` for activity exclusion lists; nothing when
/// the list is empty.
pub(crate) fn activity_not_in_clause(
    column: &str,
    names: &[String],
    params: &mut SqlParams,
) -> String {
    if names.is_empty() {
        return String::new();
    }
    let placeholders: Vec<String> = names
        .iter()
        .map(|name| format!("?{}", push_param(params, name.clone())))
        .collect();
    format!(" AND {column} NOT IN ({})", placeholders.join(","))
}

/// The internal-user filter: rows from the in-house org are always kept, all
/// other rows are dropped when the username carries the internal suffix.
pub(crate) fn internal_user_clause(
    org_column: &str,
    username_column: &str,
    catalog: &Catalog,
    params: &mut SqlParams,
) -> String {
    let org_idx = push_param(params, catalog.internal_org_id);
    let like_idx = push_param(params, format!("%{}", catalog.internal_user_suffix));
    format!(" AND ({org_column} = ?{org_idx} OR {username_column} NOT LIKE ?{like_idx})")
}
