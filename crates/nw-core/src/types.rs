//! Core type definitions for NetWarden
//!
//! These types form the vocabulary of the rule matrix: the (source,
//! destination, kind) triples that key a decision, and the per-policy-kind
//! action codes bound to them.

// =============================================================================
// Request Kinds
// =============================================================================

/// Concrete request type tags understood by the firewall matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RequestKind {
    Image,
    Script,
    Stylesheet,
    Xhr,
    SubFrame,
    Font,
    Media,
    Websocket,
    InlineScript,
    FirstPartyScript,
    ThirdParty,
    ThirdPartyScript,
    ThirdPartyFrame,
    Other,
}

impl RequestKind {
    /// Parse from the canonical rule-text token.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "image" => Some(Self::Image),
            "script" => Some(Self::Script),
            "stylesheet" => Some(Self::Stylesheet),
            "xhr" | "xmlhttprequest" => Some(Self::Xhr),
            "sub_frame" => Some(Self::SubFrame),
            "font" => Some(Self::Font),
            "media" => Some(Self::Media),
            "websocket" => Some(Self::Websocket),
            "inline-script" => Some(Self::InlineScript),
            "1p-script" => Some(Self::FirstPartyScript),
            "3p" => Some(Self::ThirdParty),
            "3p-script" => Some(Self::ThirdPartyScript),
            "3p-frame" => Some(Self::ThirdPartyFrame),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// The canonical token emitted in rule text.
    pub fn as_token(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Script => "script",
            Self::Stylesheet => "stylesheet",
            Self::Xhr => "xhr",
            Self::SubFrame => "sub_frame",
            Self::Font => "font",
            Self::Media => "media",
            Self::Websocket => "websocket",
            Self::InlineScript => "inline-script",
            Self::FirstPartyScript => "1p-script",
            Self::ThirdParty => "3p",
            Self::ThirdPartyScript => "3p-script",
            Self::ThirdPartyFrame => "3p-frame",
            Self::Other => "other",
        }
    }
}

// =============================================================================
// Patterns
// =============================================================================

/// A source or destination slot in a rule triple: the universal wildcard
/// or a concrete token (hostname, switch name, or URL depending on the
/// matrix kind).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HostPattern {
    Any,
    Exact(String),
}

impl HostPattern {
    pub fn from_token(token: &str) -> Self {
        if token == "*" {
            Self::Any
        } else {
            Self::Exact(token.to_string())
        }
    }

    pub fn as_token(&self) -> &str {
        match self {
            Self::Any => "*",
            Self::Exact(s) => s,
        }
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }
}

/// The kind slot of a rule triple: a concrete tag or the wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KindPattern {
    Any,
    Kind(RequestKind),
}

impl KindPattern {
    pub fn from_token(token: &str) -> Option<Self> {
        if token == "*" {
            Some(Self::Any)
        } else {
            RequestKind::from_token(token).map(Self::Kind)
        }
    }

    pub fn as_token(&self) -> &'static str {
        match self {
            Self::Any => "*",
            Self::Kind(kind) => kind.as_token(),
        }
    }
}

// =============================================================================
// Rule Triples
// =============================================================================

/// The unique key of one stored decision. Wildcard slots never auto-expand
/// into concrete ones; expansion happens only at lookup time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuleTriple {
    pub source: HostPattern,
    pub destination: HostPattern,
    pub kind: KindPattern,
}

impl RuleTriple {
    pub fn new(source: HostPattern, destination: HostPattern, kind: KindPattern) -> Self {
        Self {
            source,
            destination,
            kind,
        }
    }

    /// Convenience constructor from raw tokens. Returns `None` when the
    /// kind token is not in the fixed vocabulary.
    pub fn from_tokens(source: &str, destination: &str, kind: &str) -> Option<Self> {
        Some(Self {
            source: HostPattern::from_token(source),
            destination: HostPattern::from_token(destination),
            kind: KindPattern::from_token(kind)?,
        })
    }
}

// =============================================================================
// Actions
// =============================================================================

/// Action vocabulary of one matrix kind.
///
/// Each policy kind (firewall, switches, URL rules) has its own closed set
/// of action codes sharing this interface. `from_token` returning `None` is
/// how rule-line parsing decides a line belongs to a different policy kind.
pub trait RuleAction: Copy + Eq + std::fmt::Debug + 'static {
    /// The "no decision" action; equivalent to absence for serialization.
    const NOOP: Self;

    fn from_token(token: &str) -> Option<Self>;

    fn as_token(self) -> &'static str;

    fn is_noop(self) -> bool {
        self == Self::NOOP
    }

    /// Whether a destination pattern is well-formed for this matrix kind.
    /// Lets the rule-line chain discriminate hostname rows from URL rows.
    fn accepts_destination(_destination: &HostPattern) -> bool {
        true
    }
}

/// Firewall action codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FirewallAction {
    /// No decision; defer to less specific rules.
    Noop = 0,
    Allow = 1,
    Block = 2,
    /// Block that exception rules may not override.
    Important = 3,
}

impl RuleAction for FirewallAction {
    const NOOP: Self = Self::Noop;

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "noop" => Some(Self::Noop),
            "allow" => Some(Self::Allow),
            "block" => Some(Self::Block),
            "important" => Some(Self::Important),
            _ => None,
        }
    }

    fn as_token(self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::Allow => "allow",
            Self::Block => "block",
            Self::Important => "important",
        }
    }

    fn accepts_destination(destination: &HostPattern) -> bool {
        // Hostname rows only; URL rows belong to the URL-rule matrix.
        match destination {
            HostPattern::Any => true,
            HostPattern::Exact(s) => !s.contains('/'),
        }
    }
}

/// Per-hostname switch state. Stored triples use the switch name as the
/// destination slot: `(hostname, switch-name, *) -> true|false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SwitchState {
    Unset = 0,
    On = 1,
    Off = 2,
}

impl RuleAction for SwitchState {
    const NOOP: Self = Self::Unset;

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "true" => Some(Self::On),
            "false" => Some(Self::Off),
            _ => None,
        }
    }

    fn as_token(self) -> &'static str {
        match self {
            Self::Unset => "unset",
            Self::On => "true",
            Self::Off => "false",
        }
    }

    fn accepts_destination(destination: &HostPattern) -> bool {
        match destination {
            HostPattern::Any => true,
            HostPattern::Exact(s) => !s.contains('/'),
        }
    }
}

/// URL-rule action codes. Destinations are full URLs; the matched triple
/// reported alongside the action is the captured context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum UrlAction {
    Noop = 0,
    Allow = 1,
    Block = 2,
}

impl RuleAction for UrlAction {
    const NOOP: Self = Self::Noop;

    fn from_token(token: &str) -> Option<Self> {
        match token {
            "noop" => Some(Self::Noop),
            "allow" => Some(Self::Allow),
            "block" => Some(Self::Block),
            _ => None,
        }
    }

    fn as_token(self) -> &'static str {
        match self {
            Self::Noop => "noop",
            Self::Allow => "allow",
            Self::Block => "block",
        }
    }

    fn accepts_destination(destination: &HostPattern) -> bool {
        match destination {
            HostPattern::Any => true,
            HostPattern::Exact(s) => s.contains('/'),
        }
    }
}

// =============================================================================
// Traffic Counts
// =============================================================================

/// Per-hostname request counters. Increments saturate instead of
/// wrapping on pathological pages.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrafficCounts {
    pub blocked: u32,
    pub allowed: u32,
}

impl TrafficCounts {
    pub fn record_blocked(&mut self) {
        self.blocked = self.blocked.saturating_add(1);
    }

    pub fn record_allowed(&mut self) {
        self.allowed = self.allowed.saturating_add(1);
    }

    pub fn total(&self) -> u64 {
        u64::from(self.blocked) + u64::from(self.allowed)
    }

    pub fn add(&mut self, other: &TrafficCounts) {
        self.blocked = self.blocked.saturating_add(other.blocked);
        self.allowed = self.allowed.saturating_add(other.allowed);
    }
}

// =============================================================================
// Tests
// =============================================================================
