//! Channel handlers
//!
//! The concrete handlers behind each named channel, wired to the policy
//! store, the page registry, and the host's tabs. Shared state is
//! `Rc<RefCell<..>>`: dispatch is single-threaded and cooperative, and
//! deferred replies re-borrow after resuming rather than holding borrows
//! across a suspension.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::{json, Map, Value};

use nw_core::host::{domain_from_hostname, domain_from_target, hostname_from_url};
use nw_core::{
    FirewallAction, PolicyStore, RuleAction, RuleStorage, RuleTriple, SwitchState, TrafficCounts,
    UrlAction,
};

use crate::backup;
use crate::channel::{ChannelHandler, HandlerError, Outcome, DEFAULT_CHANNEL};
use crate::request::{Request, SenderContext};
use crate::router::MessageRouter;
use crate::tabs::TabDriver;

/// Channel names of the privileged surface.
pub mod channels {
    pub const POPUP_PANEL: &str = "popupPanel";
    pub const CONTENT_SCRIPT: &str = "contentscript";
    pub const DASHBOARD: &str = "dashboard";
    pub const LOGGER_UI: &str = "loggerUI";
    pub const DOCUMENT_BLOCKED: &str = "documentBlocked";
}

/// Static application identity reported to the UI.
#[derive(Debug, Clone)]
pub struct AppInfo {
    pub name: String,
    pub version: String,
}

// =============================================================================
// Page Registry
// =============================================================================

/// Traffic bookkeeping for one bound page.
#[derive(Debug, Default)]
pub struct PageRecord {
    pub hostname: String,
    pub counts: HashMap<String, TrafficCounts>,
}

/// Per-tab page records plus the set of temporarily bypassed hostnames.
#[derive(Debug, Default)]
pub struct PageRegistry {
    pages: HashMap<i64, PageRecord>,
    bypassed: HashSet<String>,
}

impl PageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a tab to a page hostname, starting fresh counters.
    pub fn bind(&mut self, tab_id: i64, hostname: &str) {
        self.pages.insert(
            tab_id,
            PageRecord {
                hostname: hostname.to_string(),
                counts: HashMap::new(),
            },
        );
    }

    pub fn unbind(&mut self, tab_id: i64) {
        self.pages.remove(&tab_id);
    }

    /// Count one request outcome against a bound page. Unbound tabs are
    /// ignored.
    pub fn record(&mut self, tab_id: i64, destination: &str, blocked: bool) {
        let Some(page) = self.pages.get_mut(&tab_id) else {
            return;
        };
        let counts = page.counts.entry(destination.to_string()).or_default();
        if blocked {
            counts.record_blocked();
        } else {
            counts.record_allowed();
        }
    }

    pub fn page(&self, tab_id: i64) -> Option<&PageRecord> {
        self.pages.get(&tab_id)
    }

    /// Exempt a hostname from strict blocking until shutdown.
    pub fn bypass(&mut self, hostname: &str) {
        self.bypassed.insert(hostname.to_string());
    }

    pub fn is_bypassed(&self, hostname: &str) -> bool {
        self.bypassed.contains(hostname)
    }
}

// =============================================================================
// Shared State
// =============================================================================

/// Everything the handlers reach for, cheaply cloneable.
#[derive(Clone)]
pub struct SharedState {
    pub store: Rc<RefCell<PolicyStore>>,
    pub storage: Rc<RefCell<dyn RuleStorage>>,
    pub tabs: Rc<RefCell<dyn TabDriver>>,
    pub pages: Rc<RefCell<PageRegistry>>,
    pub app: Rc<AppInfo>,
}

impl SharedState {
    pub fn new(
        store: Rc<RefCell<PolicyStore>>,
        storage: Rc<RefCell<dyn RuleStorage>>,
        tabs: Rc<RefCell<dyn TabDriver>>,
        app: AppInfo,
    ) -> Self {
        Self {
            store,
            storage,
            tabs,
            pages: Rc::new(RefCell::new(PageRegistry::new())),
            app: Rc::new(app),
        }
    }

    fn persist(&self) -> Result<(), HandlerError> {
        let mut storage = self.storage.borrow_mut();
        self.store.borrow_mut().persist(&mut *storage)?;
        Ok(())
    }
}

/// Register the full channel surface on a router.
pub fn register_channels(router: &mut MessageRouter, state: &SharedState) {
    router.register(DEFAULT_CHANNEL, true, Box::new(DefaultHandler::new(state)));
    router.register(channels::POPUP_PANEL, true, Box::new(PopupHandler::new(state)));
    router.register(channels::DASHBOARD, true, Box::new(DashboardHandler::new(state)));
    router.register(channels::LOGGER_UI, true, Box::new(LoggerHandler::new(state)));
    router.register(
        channels::DOCUMENT_BLOCKED,
        true,
        Box::new(DocumentBlockedHandler::new(state)),
    );
    router.register(
        channels::CONTENT_SCRIPT,
        false,
        Box::new(ContentScriptHandler::new(state)),
    );
}

fn firewall_action_from_code(code: u8) -> Option<FirewallAction> {
    match code {
        0 => Some(FirewallAction::Noop),
        1 => Some(FirewallAction::Allow),
        2 => Some(FirewallAction::Block),
        3 => Some(FirewallAction::Important),
        _ => None,
    }
}

fn url_action_from_code(code: u8) -> Option<UrlAction> {
    match code {
        0 => Some(UrlAction::Noop),
        1 => Some(UrlAction::Allow),
        2 => Some(UrlAction::Block),
        _ => None,
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}

// =============================================================================
// Default Channel
// =============================================================================

/// Fallback handler for housekeeping requests any privileged page may send.
pub struct DefaultHandler {
    state: SharedState,
}

impl DefaultHandler {
    pub fn new(state: &SharedState) -> Self {
        Self { state: state.clone() }
    }
}

impl ChannelHandler for DefaultHandler {
    fn handle(&mut self, request: &Request, _sender: &SenderContext) -> Result<Outcome, HandlerError> {
        match request {
            Request::GetAppData => Ok(Outcome::Reply(json!({
                "name": self.state.app.name,
                "version": self.state.app.version,
            }))),
            Request::GetDomainNames { targets } => {
                let mut reply = Map::new();
                for target in targets {
                    reply.insert(target.clone(), Value::from(domain_from_target(target)));
                }
                Ok(Outcome::Reply(Value::Object(reply)))
            }
            Request::GotoUrl { url } => {
                self.state.tabs.borrow_mut().open(url);
                Ok(Outcome::Ack)
            }
            Request::ReloadTab {
                tab_id,
                bypass_cache,
                select,
            } => {
                let mut tabs = self.state.tabs.borrow_mut();
                tabs.reload(*tab_id, *bypass_cache);
                if *select {
                    tabs.select(*tab_id);
                }
                Ok(Outcome::Ack)
            }
            Request::ToggleHostnameSwitch { name, hostname, state } => {
                self.state.store.borrow_mut().toggle_switch(name, hostname, *state);
                Ok(Outcome::Ack)
            }
            _ => Ok(Outcome::Unhandled),
        }
    }
}

// =============================================================================
// Popup Panel
// =============================================================================

/// Firewall editing surface of the per-tab popup.
pub struct PopupHandler {
    state: SharedState,
}

impl PopupHandler {
    pub fn new(state: &SharedState) -> Self {
        Self { state: state.clone() }
    }
}

impl ChannelHandler for PopupHandler {
    fn handle(&mut self, request: &Request, _sender: &SenderContext) -> Result<Outcome, HandlerError> {
        match request {
            Request::GetPopupData { tab_id } => {
                let tab_id = *tab_id;
                let state = self.state.clone();
                Ok(Outcome::Deferred(Box::pin(async move {
                    Some(popup_data(&state, tab_id))
                })))
            }
            Request::SaveFirewallRules {
                src_hostname,
                des_hostnames,
            } => {
                let destinations: HashSet<String> = des_hostnames.iter().cloned().collect();
                let changed = self
                    .state
                    .store
                    .borrow_mut()
                    .save_rules(src_hostname, &destinations);
                if changed {
                    self.state.persist()?;
                }
                Ok(Outcome::Ack)
            }
            Request::RevertFirewallRules {
                src_hostname,
                des_hostnames,
                tab_id,
            } => {
                let destinations: HashSet<String> = des_hostnames.iter().cloned().collect();
                self.state
                    .store
                    .borrow_mut()
                    .revert_rules(src_hostname, &destinations);
                self.state.tabs.borrow_mut().reload(*tab_id, false);
                Ok(Outcome::Ack)
            }
            Request::ToggleFirewallRule {
                src_hostname,
                des_hostname,
                request_type,
                action,
                ..
            } => {
                let Some(action) = firewall_action_from_code(*action) else {
                    log::debug!("ignoring firewall toggle with unknown action code {action}");
                    return Ok(Outcome::Ack);
                };
                let Some(triple) =
                    RuleTriple::from_tokens(src_hostname, des_hostname, request_type)
                else {
                    log::debug!("ignoring firewall toggle with unknown type {request_type:?}");
                    return Ok(Outcome::Ack);
                };
                self.state
                    .store
                    .borrow_mut()
                    .session_firewall
                    .set(triple, action);
                Ok(Outcome::Ack)
            }
            _ => Ok(Outcome::Unhandled),
        }
    }
}

/// Assemble the popup payload for one tab: page traffic aggregated per
/// hostname and registrable domain, switch states, and the unsaved-rules
/// indicator.
fn popup_data(state: &SharedState, tab_id: i64) -> Value {
    let store = state.store.borrow();
    let pages = state.pages.borrow();

    let Some(page) = pages.page(tab_id) else {
        return json!({ "tabId": tab_id, "hostname": "" });
    };
    let hostname = page.hostname.clone();
    let domain = domain_from_hostname(&hostname).to_string();

    let mut page_counts = TrafficCounts::default();
    let mut domain_totals: HashMap<String, TrafficCounts> = HashMap::new();
    for (destination, counts) in &page.counts {
        page_counts.add(counts);
        domain_totals
            .entry(domain_from_hostname(destination).to_string())
            .or_default()
            .add(counts);
    }

    let mut hostname_dict = Map::new();
    for (destination, counts) in &page.counts {
        hostname_dict.insert(
            destination.clone(),
            json!({
                "domain": domain_from_hostname(destination),
                "blockCount": counts.blocked,
                "allowCount": counts.allowed,
            }),
        );
    }
    // Domain rows aggregate their subdomains, unless the domain itself
    // already appears as a destination.
    for (domain, counts) in &domain_totals {
        if !hostname_dict.contains_key(domain) {
            hostname_dict.insert(
                domain.clone(),
                json!({
                    "domain": domain,
                    "blockCount": counts.blocked,
                    "allowCount": counts.allowed,
                }),
            );
        }
    }

    let destinations: HashSet<String> = hostname_dict.keys().cloned().collect();

    json!({
        "appName": state.app.name,
        "appVersion": state.app.version,
        "tabId": tab_id,
        "hostname": hostname,
        "domain": domain,
        "pageBlockedRequestCount": page_counts.blocked,
        "pageAllowedRequestCount": page_counts.allowed,
        "hostnameDict": Value::Object(hostname_dict),
        "matrixIsDirty": store.matrix_is_dirty(&hostname, &destinations),
        "noScripting": store.switch_state("no-scripting", &hostname) == SwitchState::On,
        "noLargeMedia": store.switch_state("no-large-media", &hostname) == SwitchState::On,
    })
}

// =============================================================================
// Dashboard
// =============================================================================

/// Rule editor and user-data management surface.
pub struct DashboardHandler {
    state: SharedState,
}

impl DashboardHandler {
    pub fn new(state: &SharedState) -> Self {
        Self { state: state.clone() }
    }
}

impl ChannelHandler for DashboardHandler {
    fn handle(&mut self, request: &Request, _sender: &SenderContext) -> Result<Outcome, HandlerError> {
        match request {
            Request::GetRules => {
                let store = self.state.store.borrow();
                Ok(Outcome::Reply(json!({
                    "permanentRules": store.ruleset_lines(true),
                    "sessionRules": store.ruleset_lines(false),
                })))
            }
            Request::ModifyRuleset {
                permanent,
                to_add,
                to_remove,
            } => {
                {
                    let mut store = self.state.store.borrow_mut();
                    store.modify_ruleset(false, to_add, to_remove);
                    if *permanent {
                        store.modify_ruleset(true, to_add, to_remove);
                    }
                }
                if *permanent {
                    self.state.persist()?;
                }
                Ok(Outcome::Ack)
            }
            Request::BackupUserData => {
                let state = self.state.clone();
                Ok(Outcome::Deferred(Box::pin(async move {
                    let store = state.store.borrow();
                    let storage = state.storage.borrow();
                    let snapshot = backup::backup_user_data(
                        &store,
                        &*storage,
                        &state.app.version,
                        unix_millis(),
                    );
                    match snapshot.map(|data| serde_json::to_value(&data)) {
                        Ok(Ok(value)) => Some(value),
                        Ok(Err(e)) => {
                            log::error!("user data backup encoding failed: {e}");
                            None
                        }
                        Err(e) => {
                            log::error!("user data backup failed: {e}");
                            None
                        }
                    }
                })))
            }
            Request::RestoreUserData { user_data } => {
                let mut storage = self.state.storage.borrow_mut();
                backup::restore_user_data(
                    &mut self.state.store.borrow_mut(),
                    &mut *storage,
                    user_data,
                )?;
                Ok(Outcome::Reply(json!({ "what": "restartRequired" })))
            }
            Request::ResetUserData => {
                let mut storage = self.state.storage.borrow_mut();
                backup::reset_user_data(&mut self.state.store.borrow_mut(), &mut *storage)?;
                Ok(Outcome::Reply(json!({ "what": "restartRequired" })))
            }
            _ => Ok(Outcome::Unhandled),
        }
    }
}

// =============================================================================
// Logger UI
// =============================================================================

/// URL-rule inspection and editing from the request logger.
pub struct LoggerHandler {
    state: SharedState,
}

impl LoggerHandler {
    pub fn new(state: &SharedState) -> Self {
        Self { state: state.clone() }
    }
}

impl ChannelHandler for LoggerHandler {
    fn handle(&mut self, request: &Request, _sender: &SenderContext) -> Result<Outcome, HandlerError> {
        match request {
            Request::GetUrlFilteringData { context, urls, kind } => {
                let Some(kind) = nw_core::RequestKind::from_token(kind) else {
                    return Ok(Outcome::Reply(json!({ "rules": {}, "dirty": false })));
                };
                let store = self.state.store.borrow();
                let mut rules = Map::new();
                for url in urls {
                    let decision = store.session_url_rules.evaluate(context, url, kind);
                    rules.insert(
                        url.clone(),
                        json!({
                            "action": decision.action.as_token(),
                            "own": decision.is_own(),
                        }),
                    );
                }
                let scope: HashSet<String> = urls.iter().cloned().collect();
                let dirty = !store.session_url_rules.has_same_rules(
                    &store.permanent_url_rules,
                    context,
                    Some(&scope),
                );
                Ok(Outcome::Reply(json!({
                    "rules": Value::Object(rules),
                    "dirty": dirty,
                })))
            }
            Request::SetUrlFilteringRule {
                context,
                url,
                kind,
                action,
            } => {
                let Some(action) = url_action_from_code(*action) else {
                    log::debug!("ignoring URL rule with unknown action code {action}");
                    return Ok(Outcome::Ack);
                };
                let Some(triple) = RuleTriple::from_tokens(context, url, kind) else {
                    log::debug!("ignoring URL rule with unknown type {kind:?}");
                    return Ok(Outcome::Ack);
                };
                self.state
                    .store
                    .borrow_mut()
                    .session_url_rules
                    .set(triple, action);
                Ok(Outcome::Ack)
            }
            Request::SaveUrlFilteringRules { context, urls, .. } => {
                let scope: HashSet<String> = urls.iter().cloned().collect();
                let changed = self.state.store.borrow_mut().save_url_rules(context, &scope);
                if changed {
                    self.state.persist()?;
                }
                Ok(Outcome::Reply(Value::Bool(changed)))
            }
            _ => Ok(Outcome::Unhandled),
        }
    }
}

// =============================================================================
// Document Blocked
// =============================================================================

/// The strict-block interstitial page.
pub struct DocumentBlockedHandler {
    state: SharedState,
}

impl DocumentBlockedHandler {
    pub fn new(state: &SharedState) -> Self {
        Self { state: state.clone() }
    }
}

impl ChannelHandler for DocumentBlockedHandler {
    fn handle(&mut self, request: &Request, sender: &SenderContext) -> Result<Outcome, HandlerError> {
        match request {
            Request::CloseThisTab => {
                self.state.tabs.borrow_mut().close(sender.tab_id);
                Ok(Outcome::Ack)
            }
            Request::TemporarilyWhitelistDocument { hostname } => {
                self.state.pages.borrow_mut().bypass(hostname);
                Ok(Outcome::Ack)
            }
            _ => Ok(Outcome::Unhandled),
        }
    }
}

// =============================================================================
// Content Script
// =============================================================================

/// The only unprivileged channel. Read-only by construction: nothing here
/// touches a matrix, and declined requests are dropped by the router
/// rather than falling back.
pub struct ContentScriptHandler {
    state: SharedState,
}

impl ContentScriptHandler {
    pub fn new(state: &SharedState) -> Self {
        Self { state: state.clone() }
    }
}

impl ChannelHandler for ContentScriptHandler {
    fn handle(&mut self, request: &Request, _sender: &SenderContext) -> Result<Outcome, HandlerError> {
        match request {
            Request::RetrieveContentScriptParameters { url } => {
                let hostname = hostname_from_url(url).unwrap_or("");
                let store = self.state.store.borrow();
                Ok(Outcome::Reply(json!({
                    "hostname": hostname,
                    "noScripting": store.switch_state("no-scripting", hostname) == SwitchState::On,
                    "bypassed": self.state.pages.borrow().is_bypassed(hostname),
                })))
            }
            _ => Ok(Outcome::Unhandled),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router::DispatchResult;
    use crate::tabs::RecordingTabDriver;
    use nw_core::MemoryStorage;

    struct World {
        router: MessageRouter,
        state: SharedState,
        tabs: Rc<RefCell<RecordingTabDriver>>,
    }

    fn world() -> World {
        let storage = Rc::new(RefCell::new(MemoryStorage::new()));
        let store = Rc::new(RefCell::new(PolicyStore::new()));
        store.borrow_mut().load(&*storage.borrow()).unwrap();
        let tabs = Rc::new(RefCell::new(RecordingTabDriver::new()));
        let driver: Rc<RefCell<dyn TabDriver>> = tabs.clone();
        let state = SharedState::new(
            store,
            storage,
            driver,
            AppInfo {
                name: "netwarden".to_string(),
                version: "0.2.0".to_string(),
            },
        );
        let mut router = MessageRouter::new();
        register_channels(&mut router, &state);
        World { router, state, tabs }
    }

    fn trusted() -> SenderContext {
        SenderContext::trusted(1)
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_get_app_data() {
        let mut w = world();
        let result = w.router.dispatch("", &Request::GetAppData, &trusted()).await;
        assert_eq!(
            result,
            DispatchResult::Reply(json!({ "name": "netwarden", "version": "0.2.0" }))
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_get_domain_names() {
        let mut w = world();
        let request = Request::GetDomainNames {
            targets: vec!["sub.example.com".to_string(), "https://cdn.a.org/x".to_string()],
        };
        let result = w.router.dispatch("", &request, &trusted()).await;
        assert_eq!(
            result,
            DispatchResult::Reply(json!({
                "sub.example.com": "example.com",
                "https://cdn.a.org/x": "a.org",
            }))
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_toggle_switch_falls_back_from_popup_channel() {
        let mut w = world();
        let request = Request::ToggleHostnameSwitch {
            name: "no-scripting".to_string(),
            hostname: "a.com".to_string(),
            state: true,
        };
        let result = w.router.dispatch(channels::POPUP_PANEL, &request, &trusted()).await;
        assert_eq!(result, DispatchResult::Ack);
        assert_eq!(
            w.state.store.borrow().switch_state("no-scripting", "a.com"),
            SwitchState::On
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_popup_data_aggregates_traffic() {
        let mut w = world();
        {
            let mut pages = w.state.pages.borrow_mut();
            pages.bind(5, "a.com");
            pages.record(5, "cdn.b.com", true);
            pages.record(5, "cdn.b.com", true);
            pages.record(5, "cdn.b.com", false);
            pages.record(5, "img.b.com", true);
        }
        let result = w
            .router
            .dispatch(channels::POPUP_PANEL, &Request::GetPopupData { tab_id: 5 }, &trusted())
            .await;
        let DispatchResult::Reply(data) = result else {
            panic!("expected popup data");
        };
        assert_eq!(data["hostname"], "a.com");
        assert_eq!(data["pageBlockedRequestCount"], 3);
        assert_eq!(data["pageAllowedRequestCount"], 1);
        assert_eq!(data["hostnameDict"]["cdn.b.com"]["blockCount"], 2);
        // The registrable domain aggregates both subdomains.
        assert_eq!(data["hostnameDict"]["b.com"]["blockCount"], 3);
        assert_eq!(data["matrixIsDirty"], false);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_toggle_then_save_firewall_rules() {
        let mut w = world();
        let toggle = Request::ToggleFirewallRule {
            src_hostname: "a.com".to_string(),
            des_hostname: "cdn.b.com".to_string(),
            request_type: "*".to_string(),
            action: 2,
            tab_id: 5,
        };
        w.router.dispatch(channels::POPUP_PANEL, &toggle, &trusted()).await;

        let destinations: HashSet<String> = [String::from("cdn.b.com")].into();
        assert!(w.state.store.borrow().matrix_is_dirty("a.com", &destinations));

        let save = Request::SaveFirewallRules {
            src_hostname: "a.com".to_string(),
            des_hostnames: vec!["cdn.b.com".to_string()],
        };
        w.router.dispatch(channels::POPUP_PANEL, &save, &trusted()).await;
        assert!(!w.state.store.borrow().matrix_is_dirty("a.com", &destinations));
        let persisted = w
            .state
            .storage
            .borrow()
            .get(nw_core::KEY_FIREWALL)
            .unwrap()
            .unwrap();
        assert!(persisted.contains("a.com cdn.b.com * block"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_revert_firewall_rules_reloads_tab() {
        let mut w = world();
        let toggle = Request::ToggleFirewallRule {
            src_hostname: "a.com".to_string(),
            des_hostname: "cdn.b.com".to_string(),
            request_type: "*".to_string(),
            action: 2,
            tab_id: 5,
        };
        w.router.dispatch(channels::POPUP_PANEL, &toggle, &trusted()).await;

        let revert = Request::RevertFirewallRules {
            src_hostname: "a.com".to_string(),
            des_hostnames: vec!["cdn.b.com".to_string()],
            tab_id: 5,
        };
        w.router.dispatch(channels::POPUP_PANEL, &revert, &trusted()).await;

        let destinations: HashSet<String> = [String::from("cdn.b.com")].into();
        assert!(!w.state.store.borrow().matrix_is_dirty("a.com", &destinations));
        assert_eq!(w.tabs.borrow().reloads, vec![(5, false)]);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_dashboard_rules_round_trip() {
        let mut w = world();
        let modify = Request::ModifyRuleset {
            permanent: true,
            to_add: "a.com * * block\nb.com no-scripting * true".to_string(),
            to_remove: String::new(),
        };
        w.router.dispatch(channels::DASHBOARD, &modify, &trusted()).await;

        let result = w.router.dispatch(channels::DASHBOARD, &Request::GetRules, &trusted()).await;
        let DispatchResult::Reply(data) = result else {
            panic!("expected rules");
        };
        let permanent: Vec<String> =
            serde_json::from_value(data["permanentRules"].clone()).unwrap();
        assert!(permanent.contains(&"a.com * * block".to_string()));
        assert!(permanent.contains(&"b.com no-scripting * true".to_string()));
        // The permanent layer was persisted as part of the modification.
        assert!(w
            .state
            .storage
            .borrow()
            .get(nw_core::KEY_FIREWALL)
            .unwrap()
            .unwrap()
            .contains("a.com * * block"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_backup_restore_reset_flow() {
        let mut w = world();
        let modify = Request::ModifyRuleset {
            permanent: true,
            to_add: "a.com * * block".to_string(),
            to_remove: String::new(),
        };
        w.router.dispatch(channels::DASHBOARD, &modify, &trusted()).await;

        let result = w
            .router
            .dispatch(channels::DASHBOARD, &Request::BackupUserData, &trusted())
            .await;
        let DispatchResult::Reply(snapshot) = result else {
            panic!("expected backup payload");
        };
        let user_data: backup::UserDataBackup = serde_json::from_value(snapshot).unwrap();
        assert!(user_data.firewall_rules.contains("a.com * * block"));

        let result = w
            .router
            .dispatch(channels::DASHBOARD, &Request::ResetUserData, &trusted())
            .await;
        assert_eq!(result, DispatchResult::Reply(json!({ "what": "restartRequired" })));
        assert!(w.state.store.borrow().ruleset_lines(true).iter().all(|l| !l.contains("a.com")));

        let restore = Request::RestoreUserData { user_data };
        let result = w.router.dispatch(channels::DASHBOARD, &restore, &trusted()).await;
        assert_eq!(result, DispatchResult::Reply(json!({ "what": "restartRequired" })));
        assert!(w
            .state
            .store
            .borrow()
            .ruleset_lines(true)
            .contains(&"a.com * * block".to_string()));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_url_filtering_flow() {
        let mut w = world();
        let set = Request::SetUrlFilteringRule {
            context: "a.com".to_string(),
            url: "https://cdn.b.com/x.js".to_string(),
            kind: "script".to_string(),
            action: 2,
        };
        w.router.dispatch(channels::LOGGER_UI, &set, &trusted()).await;

        let get = Request::GetUrlFilteringData {
            context: "a.com".to_string(),
            urls: vec!["https://cdn.b.com/x.js".to_string()],
            kind: "script".to_string(),
        };
        let result = w.router.dispatch(channels::LOGGER_UI, &get, &trusted()).await;
        let DispatchResult::Reply(data) = result else {
            panic!("expected URL filtering data");
        };
        assert_eq!(data["rules"]["https://cdn.b.com/x.js"]["action"], "block");
        assert_eq!(data["rules"]["https://cdn.b.com/x.js"]["own"], true);
        assert_eq!(data["dirty"], true);

        let save = Request::SaveUrlFilteringRules {
            context: "a.com".to_string(),
            urls: vec!["https://cdn.b.com/x.js".to_string()],
            kind: "script".to_string(),
        };
        let result = w.router.dispatch(channels::LOGGER_UI, &save, &trusted()).await;
        assert_eq!(result, DispatchResult::Reply(Value::Bool(true)));
        assert!(w
            .state
            .storage
            .borrow()
            .get(nw_core::KEY_URL_RULES)
            .unwrap()
            .unwrap()
            .contains("a.com https://cdn.b.com/x.js script block"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_document_blocked_channel() {
        let mut w = world();
        let sender = SenderContext::trusted(12);
        w.router
            .dispatch(channels::DOCUMENT_BLOCKED, &Request::CloseThisTab, &sender)
            .await;
        assert_eq!(w.tabs.borrow().closed, vec![12]);

        let whitelist = Request::TemporarilyWhitelistDocument {
            hostname: "blocked.example".to_string(),
        };
        w.router.dispatch(channels::DOCUMENT_BLOCKED, &whitelist, &sender).await;
        assert!(w.state.pages.borrow().is_bypassed("blocked.example"));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_content_script_reads_but_cannot_mutate() {
        let mut w = world();
        w.state.store.borrow_mut().toggle_switch("no-scripting", "a.com", true);

        let read = Request::RetrieveContentScriptParameters {
            url: "https://a.com/page".to_string(),
        };
        let result = w
            .router
            .dispatch(channels::CONTENT_SCRIPT, &read, &SenderContext::untrusted(3))
            .await;
        let DispatchResult::Reply(data) = result else {
            panic!("expected content script parameters");
        };
        assert_eq!(data["hostname"], "a.com");
        assert_eq!(data["noScripting"], true);

        // A mutation request on the unprivileged channel is dropped, not
        // forwarded to the default channel.
        let toggle = Request::ToggleHostnameSwitch {
            name: "no-scripting".to_string(),
            hostname: "b.com".to_string(),
            state: true,
        };
        let result = w
            .router
            .dispatch(channels::CONTENT_SCRIPT, &toggle, &SenderContext::untrusted(3))
            .await;
        assert_eq!(result, DispatchResult::Dropped);
        assert_eq!(
            w.state.store.borrow().switch_state("no-scripting", "b.com"),
            SwitchState::Unset
        );
    }
}
