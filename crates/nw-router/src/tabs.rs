//! Tab driver
//!
//! Tab and window management belongs to the host application; handlers
//! reach it through this trait.

/// A browsing tab as the router sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    pub id: i64,
    pub url: String,
}

/// Host-side tab operations.
pub trait TabDriver {
    fn reload(&mut self, tab_id: i64, bypass_cache: bool);
    fn select(&mut self, tab_id: i64);
    fn open(&mut self, url: &str);
    fn close(&mut self, tab_id: i64);
    fn current(&self) -> Option<TabInfo>;
}

/// Test double that records every call.
#[derive(Debug, Default)]
pub struct RecordingTabDriver {
    pub reloads: Vec<(i64, bool)>,
    pub selected: Vec<i64>,
    pub opened: Vec<String>,
    pub closed: Vec<i64>,
    pub active: Option<TabInfo>,
}

impl RecordingTabDriver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TabDriver for RecordingTabDriver {
    fn reload(&mut self, tab_id: i64, bypass_cache: bool) {
        self.reloads.push((tab_id, bypass_cache));
    }

    fn select(&mut self, tab_id: i64) {
        self.selected.push(tab_id);
    }

    fn open(&mut self, url: &str) {
        self.opened.push(url.to_string());
    }

    fn close(&mut self, tab_id: i64) {
        self.closed.push(tab_id);
    }

    fn current(&self) -> Option<TabInfo> {
        self.active.clone()
    }
}
