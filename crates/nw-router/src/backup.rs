//! Backup and restore
//!
//! Snapshots the permanent policy layer plus a few opaque user-data blobs
//! into one JSON-serializable payload, and replays such a payload back
//! into storage. Restore and reset both require a restart: in-memory
//! state is reloaded from storage wholesale rather than patched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use nw_core::{codec, PolicyStore, RuleStorage, StoreError, KEY_FIREWALL, KEY_SWITCHES, KEY_URL_RULES};

/// Storage key for the opaque user-settings blob.
pub const KEY_USER_SETTINGS: &str = "userSettings";
/// Storage key for the selected filter-list names.
pub const KEY_SELECTED_LISTS: &str = "selectedFilterLists";
/// Storage key for the raw user-filter text.
pub const KEY_USER_FILTERS: &str = "userFilters";

/// One full user-data snapshot. Field names on the wire are camelCase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDataBackup {
    pub time_stamp: u64,
    pub version: String,
    #[serde(default)]
    pub user_settings: Value,
    #[serde(default)]
    pub selected_lists: Vec<String>,
    #[serde(default)]
    pub firewall_rules: String,
    #[serde(default)]
    pub url_rules: String,
    #[serde(default)]
    pub switches: String,
    #[serde(default)]
    pub user_filters: String,
}

/// Disposition of a restore or reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    RestartRequired,
}

/// Snapshot the permanent layer and the opaque user blobs.
pub fn backup_user_data(
    store: &PolicyStore,
    storage: &dyn RuleStorage,
    version: &str,
    time_stamp: u64,
) -> Result<UserDataBackup, StoreError> {
    let user_settings = storage
        .get(KEY_USER_SETTINGS)?
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or(Value::Null);
    let selected_lists = storage
        .get(KEY_SELECTED_LISTS)?
        .and_then(|raw| serde_json::from_str(&raw).ok())
        .unwrap_or_default();
    let user_filters = storage.get(KEY_USER_FILTERS)?.unwrap_or_default();

    Ok(UserDataBackup {
        time_stamp,
        version: version.to_string(),
        user_settings,
        selected_lists,
        firewall_rules: codec::serialize(&store.permanent_firewall),
        url_rules: codec::serialize(&store.permanent_url_rules),
        switches: codec::serialize(&store.permanent_switches),
        user_filters,
    })
}

/// Replace storage and in-memory state with a snapshot's content.
pub fn restore_user_data(
    store: &mut PolicyStore,
    storage: &mut dyn RuleStorage,
    data: &UserDataBackup,
) -> Result<RestoreOutcome, StoreError> {
    storage.clear()?;
    storage.set(KEY_FIREWALL, &data.firewall_rules)?;
    storage.set(KEY_SWITCHES, &data.switches)?;
    storage.set(KEY_URL_RULES, &data.url_rules)?;
    if !data.user_settings.is_null() {
        storage.set(KEY_USER_SETTINGS, &data.user_settings.to_string())?;
    }
    if !data.selected_lists.is_empty() {
        let lists = Value::from(data.selected_lists.clone());
        storage.set(KEY_SELECTED_LISTS, &lists.to_string())?;
    }
    if !data.user_filters.is_empty() {
        storage.set(KEY_USER_FILTERS, &data.user_filters)?;
    }
    store.reset();
    store.load(storage)?;
    Ok(RestoreOutcome::RestartRequired)
}

/// Wipe storage and reseed the out-of-the-box rules.
pub fn reset_user_data(
    store: &mut PolicyStore,
    storage: &mut dyn RuleStorage,
) -> Result<RestoreOutcome, StoreError> {
    storage.clear()?;
    store.reset();
    store.load(storage)?;
    Ok(RestoreOutcome::RestartRequired)
}

// =============================================================================
// Tests
// =============================================================================
