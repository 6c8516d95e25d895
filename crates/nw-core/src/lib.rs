//! NetWarden Core Library
//!
//! This crate provides the rule engine for the NetWarden filtering agent:
//! the wildcard-capable rule matrix with precedence-ordered lookup, the
//! rule-text codec, and the session/permanent policy store.
//!
//! # Modules
//!
//! - `types`: Rule triples, request kinds, and per-policy action codes
//! - `matrix`: The rule matrix and its 8-tier lookup
//! - `codec`: Rule text serialization and tolerant parsing
//! - `store`: Session/permanent matrix pairs and the storage backend trait
//! - `host`: Hostname extraction and registrable-domain helpers

pub mod codec;
pub mod host;
pub mod matrix;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use matrix::{Decision, MatchTier, RuleMatrix};
pub use store::{
    MemoryStorage, PolicyStore, RuleStorage, StorageError, StoreError, KEY_FIREWALL, KEY_SWITCHES,
    KEY_URL_RULES,
};
pub use types::{
    FirewallAction, HostPattern, KindPattern, RequestKind, RuleAction, RuleTriple, SwitchState,
    TrafficCounts, UrlAction,
};
