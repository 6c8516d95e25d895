//! Rule Matrix
//!
//! Wildcard-capable mapping of (source, destination, kind) triples to
//! actions, with precedence-ordered lookup. Two instances of this type
//! (session and permanent) back every policy kind.

use std::collections::{HashMap, HashSet};

use crate::types::{HostPattern, KindPattern, RequestKind, RuleAction, RuleTriple};

// =============================================================================
// Match Tiers
// =============================================================================

/// The 8 specificity tiers of a lookup, most specific first. The order is
/// a fixed contract: persisted rule text relies on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchTier {
    SourceDestinationKind,
    SourceDestinationAny,
    SourceAnyKind,
    SourceAnyAny,
    AnyDestinationKind,
    AnyDestinationAny,
    AnyAnyKind,
    AnyAnyAny,
}

impl MatchTier {
    pub const ALL: [MatchTier; 8] = [
        Self::SourceDestinationKind,
        Self::SourceDestinationAny,
        Self::SourceAnyKind,
        Self::SourceAnyAny,
        Self::AnyDestinationKind,
        Self::AnyDestinationAny,
        Self::AnyAnyKind,
        Self::AnyAnyAny,
    ];

    /// 1-based tier number, 1 being the most specific.
    pub fn rank(self) -> u8 {
        match self {
            Self::SourceDestinationKind => 1,
            Self::SourceDestinationAny => 2,
            Self::SourceAnyKind => 3,
            Self::SourceAnyAny => 4,
            Self::AnyDestinationKind => 5,
            Self::AnyDestinationAny => 6,
            Self::AnyAnyKind => 7,
            Self::AnyAnyAny => 8,
        }
    }

    /// The key this tier probes for a concrete query.
    fn triple(self, source: &str, destination: &str, kind: RequestKind) -> RuleTriple {
        let src = || HostPattern::Exact(source.to_string());
        let des = || HostPattern::Exact(destination.to_string());
        let (source, destination, kind) = match self {
            Self::SourceDestinationKind => (src(), des(), KindPattern::Kind(kind)),
            Self::SourceDestinationAny => (src(), des(), KindPattern::Any),
            Self::SourceAnyKind => (src(), HostPattern::Any, KindPattern::Kind(kind)),
            Self::SourceAnyAny => (src(), HostPattern::Any, KindPattern::Any),
            Self::AnyDestinationKind => (HostPattern::Any, des(), KindPattern::Kind(kind)),
            Self::AnyDestinationAny => (HostPattern::Any, des(), KindPattern::Any),
            Self::AnyAnyKind => (HostPattern::Any, HostPattern::Any, KindPattern::Kind(kind)),
            Self::AnyAnyAny => (HostPattern::Any, HostPattern::Any, KindPattern::Any),
        };
        RuleTriple::new(source, destination, kind)
    }
}

// =============================================================================
// Decisions
// =============================================================================

/// Result of a matrix lookup: the winning action and which tier supplied
/// it (`None` when no stored triple matched).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision<A> {
    pub action: A,
    pub tier: Option<MatchTier>,
}

impl<A> Decision<A> {
    /// True when the decision came from an exact, non-inherited match.
    /// Callers use this to compare session and permanent layers.
    pub fn is_own(&self) -> bool {
        self.tier == Some(MatchTier::SourceDestinationKind)
    }
}

// =============================================================================
// Rule Matrix
// =============================================================================

/// In-memory rule store for one policy kind and one layer (session or
/// permanent). At most one action per distinct triple.
#[derive(Debug, Clone)]
pub struct RuleMatrix<A: RuleAction> {
    rules: HashMap<RuleTriple, A>,
    dirty: bool,
}

impl<A: RuleAction> Default for RuleMatrix<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: RuleAction> PartialEq for RuleMatrix<A> {
    /// Equality over stored rules only; the dirty flag is bookkeeping.
    fn eq(&self, other: &Self) -> bool {
        self.rules == other.rules
    }
}

impl<A: RuleAction> RuleMatrix<A> {
    pub fn new() -> Self {
        Self {
            rules: HashMap::new(),
            dirty: false,
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clear the dirty flag after the matrix has been persisted.
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RuleTriple, &A)> {
        self.rules.iter()
    }

    /// Exact-match projection; no wildcard expansion.
    pub fn get(&self, triple: &RuleTriple) -> Option<A> {
        self.rules.get(triple).copied()
    }

    /// Insert or overwrite. A no-op action may still be stored to mark an
    /// explicit override. Returns whether anything changed.
    pub fn set(&mut self, triple: RuleTriple, action: A) -> bool {
        if self.rules.get(&triple) == Some(&action) {
            return false;
        }
        self.rules.insert(triple, action);
        self.dirty = true;
        true
    }

    /// Delete if present; returns whether a removal occurred.
    pub fn remove(&mut self, triple: &RuleTriple) -> bool {
        let removed = self.rules.remove(triple).is_some();
        if removed {
            self.dirty = true;
        }
        removed
    }

    /// Drop all rules. Used on shutdown and administrative wipe.
    pub fn reset(&mut self) {
        if !self.rules.is_empty() {
            self.dirty = true;
        }
        self.rules.clear();
    }

    /// Value-copy from another matrix (session initialization from the
    /// permanent layer). Leaves this matrix clean.
    pub fn assign_from(&mut self, other: &Self) {
        self.rules = other.rules.clone();
        self.dirty = false;
    }

    // -------------------------------------------------------------------------
    // Lookup
    // -------------------------------------------------------------------------

    /// Precedence-ordered lookup. Inputs are concrete: wildcards are not
    /// valid query arguments. Walks the 8 tiers most specific first; the
    /// first stored triple wins. No match yields the no-decision action.
    pub fn evaluate(&self, source: &str, destination: &str, kind: RequestKind) -> Decision<A> {
        for tier in MatchTier::ALL {
            if let Some(&action) = self.rules.get(&tier.triple(source, destination, kind)) {
                return Decision {
                    action,
                    tier: Some(tier),
                };
            }
        }
        Decision {
            action: A::NOOP,
            tier: None,
        }
    }

    // -------------------------------------------------------------------------
    // Rule-line parsing
    // -------------------------------------------------------------------------

    fn entry_from_parts(parts: &[&str]) -> Option<(RuleTriple, A)> {
        if parts.len() != 4 {
            return None;
        }
        let action = A::from_token(parts[3])?;
        let kind = KindPattern::from_token(parts[2])?;
        let destination = HostPattern::from_token(parts[1]);
        if !A::accepts_destination(&destination) {
            return None;
        }
        let source = HostPattern::from_token(parts[0]);
        Some((RuleTriple::new(source, destination, kind), action))
    }

    /// Apply one whitespace-tokenized rule line. Returns `false` when the
    /// line does not belong to this matrix kind, so the caller can try the
    /// next policy kind in the chain.
    pub fn add_from_parts(&mut self, parts: &[&str]) -> bool {
        match Self::entry_from_parts(parts) {
            Some((triple, action)) => {
                self.set(triple, action);
                true
            }
            None => false,
        }
    }

    /// Remove the rule named by a tokenized line. Returns `false` when the
    /// line does not belong to this matrix kind; a recognized line whose
    /// triple is absent still returns `true`.
    pub fn remove_from_parts(&mut self, parts: &[&str]) -> bool {
        match Self::entry_from_parts(parts) {
            Some((triple, _)) => {
                self.remove(&triple);
                true
            }
            None => false,
        }
    }

    // -------------------------------------------------------------------------
    // Set algebra
    // -------------------------------------------------------------------------

    /// Keys of either matrix within the (source, destination-set) scope.
    /// The wildcard-source rows are in scope: saving or reverting a page's
    /// rules covers the global rows shown alongside them.
    fn scoped_keys(
        &self,
        other: &Self,
        src_hostname: &str,
        destinations: Option<&HashSet<String>>,
    ) -> HashSet<RuleTriple> {
        let in_scope = |triple: &&RuleTriple| {
            let src_ok = match &triple.source {
                HostPattern::Any => true,
                HostPattern::Exact(s) => s == src_hostname,
            };
            let des_ok = match &triple.destination {
                HostPattern::Any => true,
                HostPattern::Exact(d) => destinations.map_or(true, |set| set.contains(d)),
            };
            src_ok && des_ok
        };
        self.rules
            .keys()
            .filter(in_scope)
            .chain(other.rules.keys().filter(in_scope))
            .cloned()
            .collect()
    }

    /// Copy every entry of `other` whose source matches `src_hostname`
    /// (and whose destination is in the optional set) into this matrix,
    /// overwriting conflicts and deleting in-scope entries absent from
    /// `other`. Returns whether any change occurred. This is the engine
    /// behind both session→permanent "save" and permanent→session
    /// "revert".
    pub fn copy_rules_from(
        &mut self,
        other: &Self,
        src_hostname: &str,
        destinations: Option<&HashSet<String>>,
    ) -> bool {
        let mut changed = false;
        for triple in self.scoped_keys(other, src_hostname, destinations) {
            match other.rules.get(&triple) {
                Some(&action) => changed |= self.set(triple, action),
                None => changed |= self.remove(&triple),
            }
        }
        changed
    }

    /// True iff, for the provided destinations (all of them when `None`),
    /// this matrix's stored decisions equal the other's, scoped to
    /// `src_hostname`. Exact-match projection, not `evaluate`: an explicit
    /// no-op override on one side only counts as a difference.
    pub fn has_same_rules(
        &self,
        other: &Self,
        src_hostname: &str,
        destinations: Option<&HashSet<String>>,
    ) -> bool {
        self.scoped_keys(other, src_hostname, destinations)
            .iter()
            .all(|triple| self.rules.get(triple) == other.rules.get(triple))
    }
}

// =============================================================================
// Tests
// =============================================================================
