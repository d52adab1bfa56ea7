//! Localization-key push payloads.
//!
//! The push body never carries STI type, exposure date, or chain detail.
//! Only keys the client app resolves against its own string tables, plus the
//! bare ids a tap needs to open the right screen.

use std::collections::HashMap;

use exposure_core::types::NotificationKind;
use serde::{Deserialize, Serialize};

/// The three loc-key pairs a notification kind may use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocKeyPair {
    pub title: &'static str,
    pub body: &'static str,
}

impl NotificationKind {
    pub fn loc_keys(self) -> LocKeyPair {
        match self {
            NotificationKind::Exposure => LocKeyPair {
                title: "notification_exposure_title",
                body: "notification_exposure_body",
            },
            NotificationKind::Update => LocKeyPair {
                title: "notification_update_title",
                body: "notification_update_body",
            },
            NotificationKind::ReportDeleted => LocKeyPair {
                title: "notification_report_deleted_title",
                body: "notification_report_deleted_body",
            },
        }
    }

    pub fn as_push_type(self) -> &'static str {
        match self {
            NotificationKind::Exposure => "exposure",
            NotificationKind::Update => "update",
            NotificationKind::ReportDeleted => "report_deleted",
        }
    }
}

/// The `data` block of a push message: ids only, no sensitive fields.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushData {
    pub notification_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub extra: HashMap<String, String>,
}

/// One pending push, addressed to a single device token.
#[derive(Clone, Debug, PartialEq)]
pub struct PushMessage {
    pub token: String,
    pub title_loc_key: &'static str,
    pub body_loc_key: &'static str,
    pub data: PushData,
}

impl PushMessage {
    pub fn new(token: impl Into<String>, notification_id: impl Into<String>, kind: NotificationKind) -> Self {
        let loc = kind.loc_keys();
        Self {
            token: token.into(),
            title_loc_key: loc.title,
            body_loc_key: loc.body,
            data: PushData {
                notification_id: notification_id.into(),
                kind: kind.as_push_type().to_string(),
                extra: HashMap::new(),
            },
        }
    }

    /// The `(titleLocKey, bodyLocKey, type)` signature used to group
    /// messages before multicasting.
    pub fn group_signature(&self) -> (&'static str, &'static str, String) {
        (self.title_loc_key, self.body_loc_key, self.data.kind.clone())
    }
}
