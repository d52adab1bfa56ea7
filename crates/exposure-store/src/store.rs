//! The abstract `Store` trait.
//!
//! One typed method per collection operation, mirroring the teacher's
//! `gossipd::storage::Storage` shape (`put_event`/`get_event`,
//! `put_descriptor`/`get_descriptor`, ...) generalized from one `events` tree
//! to the collections this engine persists. Implementations:
//! [`crate::mem::MemStore`] (in-memory, used by every test) and
//! [`crate::sled_store::SledStore`] (persisted, used by the daemon).

use crate::error::StoreError;
use exposure_core::types::{
    CleanupLog, Interaction, Notification, RateLimitDoc, RateLimitOp, Report, ReportStatus, User,
};

/// Platform cap on an `IN` query's value list.
pub const QUERY_IN_BATCH_CAP: usize = 30;

/// Platform cap on operations committed by a single batch.
pub const BATCH_OP_CAP: usize = 500;

/// Outcome of a rate-limit transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Rejected,
}

/// One write queued into a [`Batch`].
pub enum BatchOp {
    PutNotification { id: String, notification: Box<Notification> },
    UpdateNotification { id: String, notification: Box<Notification> },
    DeleteNotification { id: String },
    PutReport { id: String, report: Box<Report> },
    UpdateReport { id: String, report: Box<Report> },
    PutUser { uid: String, user: Box<User> },
    DeleteInteraction { id: String },
}

/// An accumulator of up to [`BATCH_OP_CAP`] operations, committed atomically.
///
/// Committing is terminal: a second `commit()` (or any `add_*` after commit)
/// is an error.
pub struct Batch {
    pub(crate) ops: Vec<BatchOp>,
    pub(crate) committed: bool,
}

impl Batch {
    pub fn new() -> Self {
        Self {
            ops: Vec::new(),
            committed: false,
        }
    }

    pub fn add(&mut self, op: BatchOp) -> Result<(), StoreError> {
        if self.committed {
            return Err(StoreError::Internal("batch already committed".into()));
        }
        if self.ops.len() >= BATCH_OP_CAP {
            return Err(StoreError::ResourceExhausted(format!(
                "batch exceeds cap of {BATCH_OP_CAP} operations"
            )));
        }
        self.ops.push(op);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}

/// Split a slice into chunks no larger than [`QUERY_IN_BATCH_CAP`], the way
/// `QueryIn` must internally page an unbounded `IN` list.
pub fn chunk_query_in(ids: &[String]) -> impl Iterator<Item = &[String]> {
    ids.chunks(QUERY_IN_BATCH_CAP)
}

/// The abstract document store.
pub trait Store: Send + Sync {
    // ---- users ---------------------------------------------------------
    fn get_user(&self, uid: &str) -> Result<Option<User>, StoreError>;
    fn put_user(&self, user: &User) -> Result<(), StoreError>;
    /// Clear an invalid FCM token on the owning user.
    fn clear_fcm_token(&self, uid: &str) -> Result<(), StoreError>;
    /// Batched `uid IN (...)` lookup, internally chunked by [`QUERY_IN_BATCH_CAP`].
    fn users_by_uids(&self, uids: &[String]) -> Result<Vec<User>, StoreError>;
    fn get_user_by_hashed_interaction_id(&self, hashed: &str) -> Result<Option<User>, StoreError>;
    fn get_user_by_hashed_notification_id(&self, hashed: &str) -> Result<Option<User>, StoreError>;
    fn delete_user(&self, uid: &str) -> Result<(), StoreError>;

    // ---- interactions ---------------------------------------------------
    fn put_interaction(&self, interaction: &Interaction) -> Result<String, StoreError>;
    /// `WHERE partnerAnonymousId == partner_id AND recordedAt IN [window_start, window_end]`.
    /// The only discovery query the propagator is allowed to issue.
    fn query_interactions_by_partner_window(
        &self,
        partner_id: &str,
        window_start: i64,
        window_end: i64,
    ) -> Result<Vec<Interaction>, StoreError>;
    fn delete_interactions_owned_by(&self, owner_or_partner_id: &str) -> Result<u64, StoreError>;
    fn delete_interactions_older_than(
        &self,
        cutoff: i64,
        page_size: usize,
    ) -> Result<u64, StoreError>;
    /// Every interaction naming `hashed_interaction_id` as either owner or
    /// partner. The GDPR export's view of "interactions involving me".
    /// Unlike `query_interactions_by_partner_window`, this is not a
    /// discovery query: it never drives propagation.
    fn query_interactions_involving(&self, hashed_interaction_id: &str) -> Result<Vec<Interaction>, StoreError>;

    // ---- notifications ---------------------------------------------------
    fn get_notification(&self, id: &str) -> Result<Option<Notification>, StoreError>;
    fn get_notification_by_recipient_report(
        &self,
        recipient_id: &str,
        report_id: &str,
    ) -> Result<Option<(String, Notification)>, StoreError>;
    fn query_notifications_by_recipient(
        &self,
        recipient_id: &str,
    ) -> Result<Vec<(String, Notification)>, StoreError>;
    fn query_notifications_by_report(
        &self,
        report_id: &str,
    ) -> Result<Vec<(String, Notification)>, StoreError>;
    /// `WHERE chainPath array-contains hashed_chain_node`, used by the
    /// update/retraction propagators to find already-notified recipients.
    fn query_notifications_containing_chain_hash(
        &self,
        hashed_chain_node: &str,
    ) -> Result<Vec<(String, Notification)>, StoreError>;
    fn put_notification(&self, id: &str, notification: &Notification) -> Result<(), StoreError>;
    fn update_notification(&self, id: &str, notification: &Notification) -> Result<(), StoreError>;
    fn delete_notifications_older_than(
        &self,
        cutoff: i64,
        page_size: usize,
    ) -> Result<u64, StoreError>;

    // ---- reports ---------------------------------------------------
    fn get_report(&self, id: &str) -> Result<Option<Report>, StoreError>;
    fn put_report(&self, id: &str, report: &Report) -> Result<(), StoreError>;
    fn update_report(&self, id: &str, report: &Report) -> Result<(), StoreError>;
    fn delete_report(&self, id: &str) -> Result<(), StoreError>;
    fn delete_reports_older_than(&self, cutoff: i64, page_size: usize) -> Result<u64, StoreError>;
    /// Every report filed by `reporter_id` (an `H_R(uid)` output). The
    /// GDPR export's view of "reports I filed".
    fn query_reports_by_reporter(&self, reporter_id: &str) -> Result<Vec<(String, Report)>, StoreError>;
    /// Reports in a given lifecycle state, polled by the trigger adapter to
    /// discover newly-created `pending` reports.
    fn query_reports_by_status(&self, status: ReportStatus) -> Result<Vec<(String, Report)>, StoreError>;

    // ---- rate limits ---------------------------------------------------
    /// Run the sliding-window check-and-increment transaction. Fails open
    /// (returns `Allowed`) on transient store errors. Callers must log the
    /// error themselves; this method never surfaces it.
    fn rate_limit_check(
        &self,
        uid: &str,
        op: RateLimitOp,
        now: i64,
        window_ms: i64,
        buffer_ms: i64,
    ) -> RateLimitDecision;
    fn get_rate_limit(&self, uid: &str, op: RateLimitOp) -> Result<Option<RateLimitDoc>, StoreError>;

    // ---- cleanup logs ---------------------------------------------------
    fn put_cleanup_log(&self, log: &CleanupLog) -> Result<(), StoreError>;

    // ---- batching ---------------------------------------------------
    fn commit_batch(&self, batch: Batch) -> Result<(), StoreError>;

    // ---- ids ---------------------------------------------------
    /// Generate a fresh, store-unique document id.
    fn new_id(&self) -> String;
}
