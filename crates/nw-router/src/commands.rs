//! Command surface
//!
//! Keyboard-command entry points that sit beside the message router. The
//! interesting one is relax-blocking-mode: it steps the current page down
//! an ordered ladder of blocking profiles, then reloads the tab once the
//! flurry of keypresses settles.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use bitflags::bitflags;

use nw_core::host::hostname_from_url;
use nw_core::{
    FirewallAction, HostPattern, KindPattern, PolicyStore, RequestKind, RuleTriple, SwitchState,
};

use crate::scheduler::CoalescingScheduler;
use crate::tabs::{TabDriver, TabInfo};

/// Settle window for coalesced post-relax reloads, in milliseconds.
pub const RELAX_SETTLE_MS: u64 = 547;

const DASHBOARD_URL: &str = "dashboard.html";

/// Recognized keyboard commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ReloadTab,
    OpenDashboard,
    RelaxBlockingMode,
}

impl Command {
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "reload-tab" => Some(Self::ReloadTab),
            "open-dashboard" => Some(Self::OpenDashboard),
            "relax-blocking-mode" => Some(Self::RelaxBlockingMode),
            _ => None,
        }
    }

    pub fn as_token(self) -> &'static str {
        match self {
            Self::ReloadTab => "reload-tab",
            Self::OpenDashboard => "open-dashboard",
            Self::RelaxBlockingMode => "relax-blocking-mode",
        }
    }
}

bitflags! {
    /// One rung of the blocking-mode ladder. The content bits describe
    /// per-page policy; `RELOAD` marks rungs whose activation needs a
    /// page reload to take effect.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct BlockingProfile: u8 {
        const RELOAD = 0b00001;
        const NO_SCRIPTING = 0b00010;
        const BLOCK_3P = 0b00100;
        const BLOCK_3P_SCRIPT = 0b01000;
        const BLOCK_3P_FRAME = 0b10000;
    }
}

/// Out-of-the-box ladder, strictest first.
pub fn default_profiles() -> Vec<BlockingProfile> {
    [0b11111, 0b11010, 0b11001, 0b00001]
        .into_iter()
        .map(BlockingProfile::from_bits_truncate)
        .collect()
}

/// Executes commands against the policy store and the host's tabs.
pub struct CommandSurface {
    store: Rc<RefCell<PolicyStore>>,
    tabs: Rc<RefCell<dyn TabDriver>>,
    scheduler: CoalescingScheduler<i64>,
    profiles: Vec<BlockingProfile>,
    advanced_user: bool,
}

impl CommandSurface {
    pub fn new(
        store: Rc<RefCell<PolicyStore>>,
        tabs: Rc<RefCell<dyn TabDriver>>,
        advanced_user: bool,
    ) -> Self {
        Self {
            store,
            tabs,
            scheduler: CoalescingScheduler::new(),
            profiles: default_profiles(),
            advanced_user,
        }
    }

    pub fn set_profiles(&mut self, profiles: Vec<BlockingProfile>) {
        self.profiles = profiles;
    }

    /// Run one command against the currently focused tab.
    pub fn run(&self, command: Command) {
        let Some(tab) = self.tabs.borrow().current() else {
            return;
        };
        match command {
            Command::ReloadTab => self.tabs.borrow_mut().reload(tab.id, false),
            Command::OpenDashboard => self.tabs.borrow_mut().open(DASHBOARD_URL),
            Command::RelaxBlockingMode => {
                self.relax_blocking_mode(&tab);
            }
        }
    }

    /// Content bits currently in force for a hostname, session layer.
    /// The 3p rows only count for advanced users, matching who can set
    /// them from the UI.
    pub fn blocking_profile_of(&self, hostname: &str) -> BlockingProfile {
        let store = self.store.borrow();
        let mut bits = BlockingProfile::empty();
        if store.switch_state("no-scripting", hostname) == SwitchState::On {
            bits |= BlockingProfile::NO_SCRIPTING;
        }
        if self.advanced_user {
            for (kind, flag) in firewall_profile_rows() {
                let triple = wildcard_row(hostname, kind);
                if store.session_firewall.get(&triple) == Some(FirewallAction::Block) {
                    bits |= flag;
                }
            }
        }
        bits
    }

    /// Step the tab's page one rung down the ladder. Returns whether any
    /// policy changed. Reloads are coalesced per tab over the settle
    /// window, so hammering the hotkey reloads once.
    pub fn relax_blocking_mode(&self, tab: &TabInfo) -> bool {
        let Some(hostname) = hostname_from_url(&tab.url).map(str::to_string) else {
            return false;
        };
        let current = self.blocking_profile_of(&hostname) & !BlockingProfile::RELOAD;
        let Some(next) = self
            .profiles
            .iter()
            .copied()
            .find(|profile| (*profile & current) != current)
        else {
            // Already on the laxest rung.
            return false;
        };

        let mut store = self.store.borrow_mut();
        if current.contains(BlockingProfile::NO_SCRIPTING)
            && !next.contains(BlockingProfile::NO_SCRIPTING)
        {
            store.toggle_switch("no-scripting", &hostname, false);
        }
        if self.advanced_user {
            for (kind, flag) in firewall_profile_rows() {
                if current.contains(flag) && !next.contains(flag) {
                    store
                        .session_firewall
                        .set(wildcard_row(&hostname, kind), FirewallAction::Noop);
                }
            }
        }
        drop(store);

        if next.contains(BlockingProfile::RELOAD) {
            let tabs = Rc::clone(&self.tabs);
            self.scheduler.schedule(
                tab.id,
                Duration::from_millis(RELAX_SETTLE_MS),
                move |tab_id| tabs.borrow_mut().reload(tab_id, false),
            );
        }
        true
    }
}

fn firewall_profile_rows() -> [(RequestKind, BlockingProfile); 3] {
    [
        (RequestKind::ThirdParty, BlockingProfile::BLOCK_3P),
        (RequestKind::ThirdPartyScript, BlockingProfile::BLOCK_3P_SCRIPT),
        (RequestKind::ThirdPartyFrame, BlockingProfile::BLOCK_3P_FRAME),
    ]
}

fn wildcard_row(hostname: &str, kind: RequestKind) -> RuleTriple {
    RuleTriple::new(
        HostPattern::Exact(hostname.to_string()),
        HostPattern::Any,
        KindPattern::Kind(kind),
    )
}

// =============================================================================
// Tests
// =============================================================================
