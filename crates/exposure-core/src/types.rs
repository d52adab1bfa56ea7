//! Collection entities.
//!
//! Every document type here is explicit and validated at construction.
//! No dynamic document maps. Unknown fields on the wire are dropped, not
//! passed through.

use serde::{Deserialize, Serialize};

/// A sexually transmitted infection code.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Sti {
    Hiv,
    Syphilis,
    Gonorrhea,
    Chlamydia,
    Hpv,
    Herpes,
    Other,
}

/// How much of `(stiType, exposureDate)` a produced notification may carry.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum PrivacyLevel {
    Full,
    StiOnly,
    DateOnly,
    Anonymous,
}

impl PrivacyLevel {
    /// Whether `stiType` may appear on notifications produced from a report
    /// at this privacy level.
    pub fn includes_sti(self) -> bool {
        matches!(self, PrivacyLevel::Full | PrivacyLevel::StiOnly)
    }

    /// Whether `exposureDate` may appear on notifications produced from a
    /// report at this privacy level.
    pub fn includes_date(self) -> bool {
        matches!(self, PrivacyLevel::Full | PrivacyLevel::DateOnly)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum TestResult {
    Positive,
    Negative,
}

/// Report lifecycle state.
///
/// Legal transitions: `Pending -> Processing`, `Processing -> {Completed, Failed}`.
/// Any other transition is a programming error in the processor, not a
/// recoverable runtime condition.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum ReportStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ReportStatus {
    pub fn can_transition_to(self, next: ReportStatus) -> bool {
        matches!(
            (self, next),
            (ReportStatus::Pending, ReportStatus::Processing)
                | (ReportStatus::Processing, ReportStatus::Completed)
                | (ReportStatus::Processing, ReportStatus::Failed)
        )
    }
}

/// Notification kind.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum NotificationKind {
    Exposure,
    Update,
    ReportDeleted,
}

/// Test-status a chain node may carry for visualization.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum TestStatus {
    Positive,
    Negative,
    Unknown,
}

/// A user document.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub uid: String,
    pub anonymous_id: String,
    pub username: Option<String>,
    pub created_at: i64,
    pub fcm_token: Option<String>,
    pub hashed_interaction_id: String,
    pub hashed_notification_id: String,
}

impl User {
    /// `username`, if present, must be ASCII-printable and at most 50 chars.
    pub fn validate_username(username: &str) -> bool {
        username.len() <= 50 && username.chars().all(|c| c.is_ascii_graphic() || c == ' ')
    }
}

/// An interaction document.
///
/// `owner_id` and `partner_anonymous_id` are both `H_I` outputs. The
/// propagation engine discovers this as an edge `partner -> owner` only.
/// The store must never expose a query on `ownerId` that the propagator
/// could use as if it were `partnerAnonymousId`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Interaction {
    pub owner_id: String,
    pub partner_anonymous_id: String,
    pub partner_username_snapshot: Option<String>,
    pub recorded_at: i64,
}

/// A report document.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub reporter_id: String,
    pub reporter_interaction_hashed_id: String,
    pub reporter_notification_hashed_id: String,
    pub sti_types: Vec<Sti>,
    pub test_date: i64,
    pub privacy_level: PrivacyLevel,
    pub test_result: TestResult,
    pub reported_at: i64,
    pub status: ReportStatus,
    pub linked_report_id: Option<String>,
    pub notification_id: Option<String>,
    pub processed_at: Option<i64>,
    pub error: Option<String>,
}

/// One node in a chain-visualization path.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ChainNode {
    pub username: Option<String>,
    pub test_status: TestStatus,
    pub date: Option<i64>,
    pub is_current_user: bool,
    pub tested_positive_for: Option<Vec<Sti>>,
}

/// Chain-visualization data attached to a notification.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Default)]
pub struct ChainVisualization {
    pub nodes: Vec<ChainNode>,
    /// Present only when more than one minimum-length path reaches the
    /// recipient (group-event dedup).
    pub paths: Option<Vec<Vec<ChainNode>>>,
}

/// A notification document.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub recipient_id: String,
    pub kind: NotificationKind,
    pub sti_type: Option<Vec<Sti>>,
    pub exposure_date: Option<i64>,
    pub chain_data: ChainVisualization,
    /// `H_C(H_I(uid))` for each node on the primary (representative) path.
    pub chain_path: Vec<String>,
    /// `H_C(H_I(uid))` arrays for every minimum-length path, when more than
    /// one exists (serialized as a JSON string on the wire, kept structured
    /// here and serialized at the store boundary).
    pub chain_paths: Option<Vec<Vec<String>>>,
    pub hop_depth: u32,
    pub is_read: bool,
    pub received_at: i64,
    pub updated_at: i64,
    pub report_id: String,
    pub deleted_at: Option<i64>,
}

impl Notification {
    /// `hopDepth == length of the shortest recorded path - 1` and
    /// `chainPath.length == chainData.nodes.length`.
    pub fn check_invariants(&self) -> bool {
        self.chain_path.len() == self.chain_data.nodes.len()
            && self.chain_path.len() as u32 == self.hop_depth + 1
            && self
                .chain_data
                .nodes
                .last()
                .map(|n| n.is_current_user)
                .unwrap_or(false)
    }
}

/// A rate-limit document. Document id is `<uid>_<opKind>`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RateLimitDoc {
    pub count: u32,
    pub window_start: i64,
    pub expires_at: i64,
}

/// The rate-limited operation kinds.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RateLimitOp {
    PositiveReport,
    NegativeTest,
    DataExport,
    AccountRecovery,
}

impl RateLimitOp {
    /// Per-hour request limit for this operation kind.
    pub fn limit_per_hour(self) -> u32 {
        match self {
            RateLimitOp::PositiveReport => 5,
            RateLimitOp::NegativeTest => 10,
            RateLimitOp::DataExport => 3,
            RateLimitOp::AccountRecovery => 5,
        }
    }

    pub fn as_key_segment(self) -> &'static str {
        match self {
            RateLimitOp::PositiveReport => "positive_report",
            RateLimitOp::NegativeTest => "negative_test",
            RateLimitOp::DataExport => "data_export",
            RateLimitOp::AccountRecovery => "account_recovery",
        }
    }
}

/// A record written by the retention sweeper.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct CleanupLog {
    pub interactions_deleted: u64,
    pub notifications_deleted: u64,
    pub reports_deleted: u64,
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_status_only_moves_forward() {
        assert!(ReportStatus::Pending.can_transition_to(ReportStatus::Processing));
        assert!(ReportStatus::Processing.can_transition_to(ReportStatus::Completed));
        assert!(ReportStatus::Processing.can_transition_to(ReportStatus::Failed));
        assert!(!ReportStatus::Pending.can_transition_to(ReportStatus::Completed));
        assert!(!ReportStatus::Completed.can_transition_to(ReportStatus::Processing));
        assert!(!ReportStatus::Failed.can_transition_to(ReportStatus::Completed));
    }

    #[test]
    fn privacy_projection_matrix() {
        assert!(PrivacyLevel::Full.includes_sti() && PrivacyLevel::Full.includes_date());
        assert!(PrivacyLevel::StiOnly.includes_sti() && !PrivacyLevel::StiOnly.includes_date());
        assert!(!PrivacyLevel::DateOnly.includes_sti() && PrivacyLevel::DateOnly.includes_date());
        assert!(!PrivacyLevel::Anonymous.includes_sti() && !PrivacyLevel::Anonymous.includes_date());
    }

    #[test]
    fn username_validation() {
        assert!(User::validate_username("Jane Doe"));
        assert!(!User::validate_username(&"x".repeat(51)));
        assert!(!User::validate_username("emoji\u{1F600}"));
    }
}
