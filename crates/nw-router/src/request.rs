//! Wire protocol
//!
//! The request vocabulary of the message router. Requests arrive as JSON
//! objects whose `what` field names the operation; unknown tags fold into
//! `Unknown`, a variant no handler claims, so forward-compatible senders
//! are dropped rather than rejected with a parse error.

use serde::{Deserialize, Serialize};

use crate::backup::UserDataBackup;

/// One routed message. Field names on the wire are camelCase.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "what", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Request {
    GetAppData,
    GetDomainNames {
        targets: Vec<String>,
    },
    GotoUrl {
        url: String,
    },
    ReloadTab {
        tab_id: i64,
        #[serde(default)]
        bypass_cache: bool,
        #[serde(default)]
        select: bool,
    },
    ToggleHostnameSwitch {
        name: String,
        hostname: String,
        #[serde(default)]
        state: bool,
    },
    GetPopupData {
        tab_id: i64,
    },
    SaveFirewallRules {
        src_hostname: String,
        des_hostnames: Vec<String>,
    },
    RevertFirewallRules {
        src_hostname: String,
        des_hostnames: Vec<String>,
        tab_id: i64,
    },
    ToggleFirewallRule {
        src_hostname: String,
        des_hostname: String,
        request_type: String,
        action: u8,
        tab_id: i64,
    },
    GetRules,
    ModifyRuleset {
        permanent: bool,
        to_add: String,
        to_remove: String,
    },
    BackupUserData,
    RestoreUserData {
        user_data: UserDataBackup,
    },
    ResetUserData,
    GetUrlFilteringData {
        context: String,
        urls: Vec<String>,
        #[serde(rename = "type")]
        kind: String,
    },
    SetUrlFilteringRule {
        context: String,
        url: String,
        #[serde(rename = "type")]
        kind: String,
        action: u8,
    },
    SaveUrlFilteringRules {
        context: String,
        urls: Vec<String>,
        #[serde(rename = "type")]
        kind: String,
    },
    RetrieveContentScriptParameters {
        url: String,
    },
    CloseThisTab,
    TemporarilyWhitelistDocument {
        hostname: String,
    },
    #[serde(other)]
    Unknown,
}

/// Identity of the message sender, established by the transport before
/// dispatch. `trusted` is true only for senders inside the privileged
/// surface; content frames are never trusted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderContext {
    pub trusted: bool,
    pub tab_id: i64,
    pub frame_id: i64,
    pub url: Option<String>,
}

impl SenderContext {
    pub fn trusted(tab_id: i64) -> Self {
        Self {
            trusted: true,
            tab_id,
            frame_id: 0,
            url: None,
        }
    }

    pub fn untrusted(tab_id: i64) -> Self {
        Self {
            trusted: false,
            tab_id,
            frame_id: 0,
            url: None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_tagged_request() {
        let req: Request = serde_json::from_value(json!({
            "what": "toggleFirewallRule",
            "srcHostname": "a.com",
            "desHostname": "b.com",
            "requestType": "image",
            "action": 2,
            "tabId": 7,
        }))
        .unwrap();
        match req {
            Request::ToggleFirewallRule {
                src_hostname,
                des_hostname,
                request_type,
                action,
                tab_id,
            } => {
                assert_eq!(src_hostname, "a.com");
                assert_eq!(des_hostname, "b.com");
                assert_eq!(request_type, "image");
                assert_eq!(action, 2);
                assert_eq!(tab_id, 7);
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn test_decode_defaults_optional_fields() {
        let req: Request = serde_json::from_value(json!({
            "what": "reloadTab",
            "tabId": 3,
        }))
        .unwrap();
        match req {
            Request::ReloadTab {
                tab_id,
                bypass_cache,
                select,
            } => {
                assert_eq!(tab_id, 3);
                assert!(!bypass_cache);
                assert!(!select);
            }
            other => panic!("unexpected request: {other:?}"),
        }
    }

    #[test]
    fn test_unknown_tag_folds_into_unknown() {
        let req: Request = serde_json::from_value(json!({
            "what": "launchElementPicker",
            "tabId": 1,
        }))
        .unwrap();
        assert!(matches!(req, Request::Unknown));
    }

    #[test]
    fn test_type_field_rename() {
        let req: Request = serde_json::from_value(json!({
            "what": "getUrlFilteringData",
            "context": "a.com",
            "urls": ["https://cdn.com/x.js"],
            "type": "script",
        }))
        .unwrap();
        match req {
            Request::GetUrlFilteringData { kind, .. } => assert_eq!(kind, "script"),
            other => panic!("unexpected request: {other:?}"),
        }
    }
}
