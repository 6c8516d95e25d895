//! Policy store
//!
//! Owns the session/permanent matrix pair for each policy kind and the
//! synchronization between them. The persistent key-value backend is an
//! external collaborator reached through the `RuleStorage` trait.

use std::collections::HashMap;
use std::collections::HashSet;

use crate::codec;
use crate::matrix::RuleMatrix;
use crate::types::{
    FirewallAction, HostPattern, KindPattern, RequestKind, RuleTriple, SwitchState, UrlAction,
};

/// Storage key for the firewall rule text.
pub const KEY_FIREWALL: &str = "dynamicFilteringString";
/// Storage key for the hostname switch text.
pub const KEY_SWITCHES: &str = "hostnameSwitchesString";
/// Storage key for the URL rule text.
pub const KEY_URL_RULES: &str = "urlFilteringString";

/// Error from the persistent backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Error from policy store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Persistent key-value backend, interface only.
pub trait RuleStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
    fn clear(&mut self) -> Result<(), StorageError>;
}

/// In-memory backend for tests and tooling.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: HashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RuleStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        self.entries.clear();
        Ok(())
    }
}

/// Out-of-the-box firewall rule text: requests with no page context are
/// left undecided explicitly, so the UI shows them as deliberate.
pub fn default_firewall_rules() -> String {
    [
        "behind-the-scene * * noop",
        "behind-the-scene * image noop",
        "behind-the-scene * 3p noop",
        "behind-the-scene * inline-script noop",
        "behind-the-scene * 1p-script noop",
        "behind-the-scene * 3p-script noop",
        "behind-the-scene * 3p-frame noop",
    ]
    .join("\n")
}

/// Out-of-the-box switch rule text.
pub fn default_switch_rules() -> String {
    "behind-the-scene no-large-media * false".to_string()
}

// =============================================================================
// Policy Store
// =============================================================================

/// All six matrices: one session/permanent pair per policy kind. Created
/// once at process start; `reset` clears everything on shutdown or wipe.
#[derive(Debug, Default)]
pub struct PolicyStore {
    pub session_firewall: RuleMatrix<FirewallAction>,
    pub permanent_firewall: RuleMatrix<FirewallAction>,
    pub session_switches: RuleMatrix<SwitchState>,
    pub permanent_switches: RuleMatrix<SwitchState>,
    pub session_url_rules: RuleMatrix<UrlAction>,
    pub permanent_url_rules: RuleMatrix<UrlAction>,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load persisted rule text into the permanent matrices, then
    /// initialize each session matrix as a value-copy of its permanent
    /// counterpart. Absent keys fall back to the default rule text.
    pub fn load(&mut self, storage: &dyn RuleStorage) -> Result<(), StoreError> {
        let firewall_text = storage
            .get(KEY_FIREWALL)?
            .unwrap_or_else(default_firewall_rules);
        self.permanent_firewall = codec::parse(&firewall_text);
        self.session_firewall.assign_from(&self.permanent_firewall);

        let switches_text = storage
            .get(KEY_SWITCHES)?
            .unwrap_or_else(default_switch_rules);
        self.permanent_switches = codec::parse(&switches_text);
        self.session_switches.assign_from(&self.permanent_switches);

        let url_text = storage.get(KEY_URL_RULES)?.unwrap_or_default();
        self.permanent_url_rules = codec::parse(&url_text);
        self.session_url_rules.assign_from(&self.permanent_url_rules);

        Ok(())
    }

    /// Write every dirty permanent matrix back to storage and clear its
    /// dirty flag. Session matrices are never persisted.
    pub fn persist(&mut self, storage: &mut dyn RuleStorage) -> Result<(), StoreError> {
        if self.permanent_firewall.is_dirty() {
            storage.set(KEY_FIREWALL, &codec::serialize(&self.permanent_firewall))?;
            self.permanent_firewall.mark_clean();
        }
        if self.permanent_switches.is_dirty() {
            storage.set(KEY_SWITCHES, &codec::serialize(&self.permanent_switches))?;
            self.permanent_switches.mark_clean();
        }
        if self.permanent_url_rules.is_dirty() {
            storage.set(KEY_URL_RULES, &codec::serialize(&self.permanent_url_rules))?;
            self.permanent_url_rules.mark_clean();
        }
        Ok(())
    }

    /// Commit a page's session firewall and switch rules to the permanent
    /// layer. Returns whether anything changed (the caller persists).
    pub fn save_rules(&mut self, src_hostname: &str, destinations: &HashSet<String>) -> bool {
        let firewall_changed = self.permanent_firewall.copy_rules_from(
            &self.session_firewall,
            src_hostname,
            Some(destinations),
        );
        let switches_changed =
            self.permanent_switches
                .copy_rules_from(&self.session_switches, src_hostname, None);
        firewall_changed || switches_changed
    }

    /// Discard a page's session overrides, restoring the permanent rules.
    pub fn revert_rules(&mut self, src_hostname: &str, destinations: &HashSet<String>) {
        self.session_firewall.copy_rules_from(
            &self.permanent_firewall,
            src_hostname,
            Some(destinations),
        );
        self.session_switches
            .copy_rules_from(&self.permanent_switches, src_hostname, None);
    }

    /// Commit session URL rules for a context to the permanent layer.
    pub fn save_url_rules(&mut self, context: &str, urls: &HashSet<String>) -> bool {
        self.permanent_url_rules
            .copy_rules_from(&self.session_url_rules, context, Some(urls))
    }

    /// True when a page's session decisions diverge from the permanent
    /// layer. Drives the "unsaved changes" indicator.
    pub fn matrix_is_dirty(&self, src_hostname: &str, destinations: &HashSet<String>) -> bool {
        if !self
            .session_firewall
            .has_same_rules(&self.permanent_firewall, src_hostname, Some(destinations))
        {
            return true;
        }
        !self
            .session_switches
            .has_same_rules(&self.permanent_switches, src_hostname, None)
    }

    /// Evaluated state of a named per-hostname switch, session layer.
    /// Switch triples carry the switch name in the destination slot, so
    /// the kind argument of the lookup is immaterial.
    pub fn switch_state(&self, name: &str, hostname: &str) -> SwitchState {
        self.session_switches
            .evaluate(hostname, name, RequestKind::Other)
            .action
    }

    /// Set a named switch explicitly for a hostname, session layer.
    /// Returns whether the stored state changed.
    pub fn toggle_switch(&mut self, name: &str, hostname: &str, on: bool) -> bool {
        let triple = RuleTriple::new(
            HostPattern::Exact(hostname.to_string()),
            HostPattern::Exact(name.to_string()),
            KindPattern::Any,
        );
        let state = if on { SwitchState::On } else { SwitchState::Off };
        self.session_switches.set(triple, state)
    }

    /// Apply rule-line additions and removals against one layer. Each line
    /// is offered to the firewall matrix first, then switches, then URL
    /// rules; lines claimed by none are skipped.
    pub fn modify_ruleset(&mut self, permanent: bool, to_add: &str, to_remove: &str) {
        let (firewall, switches, url_rules) = if permanent {
            (
                &mut self.permanent_firewall,
                &mut self.permanent_switches,
                &mut self.permanent_url_rules,
            )
        } else {
            (
                &mut self.session_firewall,
                &mut self.session_switches,
                &mut self.session_url_rules,
            )
        };

        for line in to_remove.lines() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.is_empty() {
                continue;
            }
            if !firewall.remove_from_parts(&parts)
                && !switches.remove_from_parts(&parts)
                && !url_rules.remove_from_parts(&parts)
            {
                log::debug!("modify_ruleset: unrecognized removal line: {line:?}");
            }
        }
        for line in to_add.lines() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.is_empty() {
                continue;
            }
            if !firewall.add_from_parts(&parts)
                && !switches.add_from_parts(&parts)
                && !url_rules.add_from_parts(&parts)
            {
                log::debug!("modify_ruleset: unrecognized addition line: {line:?}");
            }
        }
    }

    /// All rule lines of one layer, firewall then switches then URL rules.
    pub fn ruleset_lines(&self, permanent: bool) -> Vec<String> {
        let (firewall, switches, url_rules) = if permanent {
            (
                &self.permanent_firewall,
                &self.permanent_switches,
                &self.permanent_url_rules,
            )
        } else {
            (
                &self.session_firewall,
                &self.session_switches,
                &self.session_url_rules,
            )
        };
        let mut lines = Vec::new();
        for text in [
            codec::serialize(firewall),
            codec::serialize(switches),
            codec::serialize(url_rules),
        ] {
            lines.extend(text.lines().map(str::to_string));
        }
        lines
    }

    /// Clear all six matrices. Called on shutdown and administrative wipe.
    pub fn reset(&mut self) {
        self.session_firewall.reset();
        self.permanent_firewall.reset();
        self.session_switches.reset();
        self.permanent_switches.reset();
        self.session_url_rules.reset();
        self.permanent_url_rules.reset();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RequestKind, RuleTriple};

    fn triple(src: &str, des: &str, kind: &str) -> RuleTriple {
        RuleTriple::from_tokens(src, des, kind).unwrap()
    }

    #[test]
    fn test_load_seeds_defaults_and_copies_sessions() {
        let storage = MemoryStorage::new();
        let mut store = PolicyStore::new();
        store.load(&storage).unwrap();

        // Defaults land in the permanent layer and the session mirrors it.
        assert_eq!(store.permanent_firewall.len(), 7);
        assert_eq!(store.session_firewall, store.permanent_firewall);
        assert_eq!(store.permanent_switches.len(), 1);
        assert!(store.permanent_url_rules.is_empty());
        assert!(!store.permanent_firewall.is_dirty());
    }

    #[test]
    fn test_load_prefers_persisted_text() {
        let mut storage = MemoryStorage::new();
        storage.set(KEY_FIREWALL, "a.com * * block").unwrap();
        storage.set(KEY_SWITCHES, "").unwrap();

        let mut store = PolicyStore::new();
        store.load(&storage).unwrap();
        assert_eq!(store.permanent_firewall.len(), 1);
        assert!(store.permanent_switches.is_empty());
    }

    #[test]
    fn test_persist_writes_only_dirty_matrices() {
        let mut storage = MemoryStorage::new();
        let mut store = PolicyStore::new();
        store.load(&storage).unwrap();

        store
            .permanent_firewall
            .set(triple("a.com", "*", "*"), FirewallAction::Block);
        store.persist(&mut storage).unwrap();

        assert_eq!(
            storage.get(KEY_FIREWALL).unwrap().as_deref(),
            Some("a.com * * block")
        );
        // Switches were never touched after load.
        assert_eq!(storage.get(KEY_SWITCHES).unwrap(), None);
        assert!(!store.permanent_firewall.is_dirty());
    }

    #[test]
    fn test_save_then_dirty_indicator_clears() {
        let mut store = PolicyStore::new();
        store
            .session_firewall
            .set(triple("a.com", "b.com", "*"), FirewallAction::Block);

        let destinations: HashSet<String> = ["b.com".to_string()].into();
        assert!(store.matrix_is_dirty("a.com", &destinations));
        assert!(store.save_rules("a.com", &destinations));
        assert!(!store.matrix_is_dirty("a.com", &destinations));
    }

    #[test]
    fn test_revert_restores_session() {
        let mut store = PolicyStore::new();
        store
            .permanent_firewall
            .set(triple("a.com", "b.com", "*"), FirewallAction::Allow);
        store.session_firewall.assign_from(&store.permanent_firewall);

        store
            .session_firewall
            .set(triple("a.com", "b.com", "*"), FirewallAction::Block);
        store
            .session_switches
            .set(triple("a.com", "no-scripting", "*"), SwitchState::On);

        let destinations: HashSet<String> = ["b.com".to_string()].into();
        store.revert_rules("a.com", &destinations);

        assert_eq!(
            store.session_firewall.get(&triple("a.com", "b.com", "*")),
            Some(FirewallAction::Allow)
        );
        assert!(store.session_switches.is_empty());
    }

    #[test]
    fn test_modify_ruleset_chains_policy_kinds() {
        let mut store = PolicyStore::new();
        let to_add = "a.com b.com 3p block\n\
                      a.com no-scripting * true\n\
                      a.com https://cdn.com/x.js script block\n\
                      total nonsense line here\n";
        store.modify_ruleset(false, to_add, "");

        assert_eq!(store.session_firewall.len(), 1);
        assert_eq!(store.session_switches.len(), 1);
        assert_eq!(store.session_url_rules.len(), 1);
        assert!(store.permanent_firewall.is_empty());

        store.modify_ruleset(false, "", "a.com b.com 3p block");
        assert!(store.session_firewall.is_empty());
        assert_eq!(store.session_switches.len(), 1);
    }

    #[test]
    fn test_url_rules_evaluate_with_context() {
        let mut store = PolicyStore::new();
        store.modify_ruleset(true, "a.com https://cdn.com/x.js script block", "");

        let decision = store.permanent_url_rules.evaluate(
            "a.com",
            "https://cdn.com/x.js",
            RequestKind::Script,
        );
        assert_eq!(decision.action, UrlAction::Block);
        assert!(decision.is_own());
    }

    #[test]
    fn test_switch_state_and_toggle() {
        let mut store = PolicyStore::new();
        assert_eq!(store.switch_state("no-scripting", "a.com"), SwitchState::Unset);

        assert!(store.toggle_switch("no-scripting", "a.com", true));
        assert_eq!(store.switch_state("no-scripting", "a.com"), SwitchState::On);
        // Unrelated hostname and switch remain unset.
        assert_eq!(store.switch_state("no-scripting", "b.com"), SwitchState::Unset);
        assert_eq!(store.switch_state("no-large-media", "a.com"), SwitchState::Unset);

        assert!(store.toggle_switch("no-scripting", "a.com", false));
        assert_eq!(store.switch_state("no-scripting", "a.com"), SwitchState::Off);
        assert!(!store.toggle_switch("no-scripting", "a.com", false));
    }

    #[test]
    fn test_reset_clears_everything() {
        let storage = MemoryStorage::new();
        let mut store = PolicyStore::new();
        store.load(&storage).unwrap();
        store.reset();

        assert!(store.session_firewall.is_empty());
        assert!(store.permanent_firewall.is_empty());
        assert!(store.session_switches.is_empty());
        assert!(store.permanent_switches.is_empty());
    }
}
