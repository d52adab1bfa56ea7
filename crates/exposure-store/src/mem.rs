//! An in-memory `Store`, the primary implementation exercised by tests.
//!
//! Mirrors the teacher's in-memory `MemoryReceiptStore` pattern: one
//! `parking_lot::Mutex`-guarded set of maps plus the secondary indices a real
//! document store would maintain, with no external dependency for tests to
//! drag in.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use exposure_core::types::{
    CleanupLog, Interaction, Notification, RateLimitDoc, RateLimitOp, Report, ReportStatus, User,
};

use crate::error::StoreError;
use crate::store::{Batch, BatchOp, RateLimitDecision, Store};

#[derive(Default)]
struct Inner {
    users: HashMap<String, User>,
    users_by_hashed_interaction: HashMap<String, String>,
    users_by_hashed_notification: HashMap<String, String>,
    interactions: HashMap<String, Interaction>,
    notifications: HashMap<String, Notification>,
    reports: HashMap<String, Report>,
    rate_limits: HashMap<String, RateLimitDoc>,
    cleanup_logs: Vec<CleanupLog>,
}

/// In-memory `Store`. Safe to share across tokio tasks via `Arc<MemStore>`.
pub struct MemStore {
    inner: Mutex<Inner>,
    next_id: AtomicU64,
}

impl MemStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner::default()),
            next_id: AtomicU64::new(1),
        })
    }

    fn rate_limit_key(uid: &str, op: RateLimitOp) -> String {
        format!("{uid}_{}", op.as_key_segment())
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl Store for MemStore {
    fn get_user(&self, uid: &str) -> Result<Option<User>, StoreError> {
        Ok(self.inner.lock().users.get(uid).cloned())
    }

    fn put_user(&self, user: &User) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        inner
            .users_by_hashed_interaction
            .insert(user.hashed_interaction_id.clone(), user.uid.clone());
        inner
            .users_by_hashed_notification
            .insert(user.hashed_notification_id.clone(), user.uid.clone());
        inner.users.insert(user.uid.clone(), user.clone());
        Ok(())
    }

    fn clear_fcm_token(&self, uid: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        match inner.users.get_mut(uid) {
            Some(user) => {
                user.fcm_token = None;
                Ok(())
            }
            None => Err(StoreError::NotFound(format!("user {uid}"))),
        }
    }

    fn users_by_uids(&self, uids: &[String]) -> Result<Vec<User>, StoreError> {
        let inner = self.inner.lock();
        let mut out = Vec::with_capacity(uids.len());
        for chunk in crate::store::chunk_query_in(uids) {
            for uid in chunk {
                if let Some(u) = inner.users.get(uid) {
                    out.push(u.clone());
                }
            }
        }
        Ok(out)
    }

    fn get_user_by_hashed_interaction_id(&self, hashed: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .users_by_hashed_interaction
            .get(hashed)
            .and_then(|uid| inner.users.get(uid))
            .cloned())
    }

    fn get_user_by_hashed_notification_id(&self, hashed: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .users_by_hashed_notification
            .get(hashed)
            .and_then(|uid| inner.users.get(uid))
            .cloned())
    }

    fn delete_user(&self, uid: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if let Some(user) = inner.users.remove(uid) {
            inner.users_by_hashed_interaction.remove(&user.hashed_interaction_id);
            inner.users_by_hashed_notification.remove(&user.hashed_notification_id);
        }
        Ok(())
    }

    fn put_interaction(&self, interaction: &Interaction) -> Result<String, StoreError> {
        let id = self.new_id();
        self.inner.lock().interactions.insert(id.clone(), interaction.clone());
        Ok(id)
    }

    fn query_interactions_by_partner_window(
        &self,
        partner_id: &str,
        window_start: i64,
        window_end: i64,
    ) -> Result<Vec<Interaction>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .interactions
            .values()
            .filter(|i| {
                i.partner_anonymous_id == partner_id
                    && i.recorded_at >= window_start
                    && i.recorded_at <= window_end
            })
            .cloned()
            .collect())
    }

    fn delete_interactions_owned_by(&self, owner_or_partner_id: &str) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock();
        let before = inner.interactions.len();
        inner
            .interactions
            .retain(|_, i| i.owner_id != owner_or_partner_id && i.partner_anonymous_id != owner_or_partner_id);
        Ok((before - inner.interactions.len()) as u64)
    }

    fn query_interactions_involving(&self, hashed_interaction_id: &str) -> Result<Vec<Interaction>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .interactions
            .values()
            .filter(|i| i.owner_id == hashed_interaction_id || i.partner_anonymous_id == hashed_interaction_id)
            .cloned()
            .collect())
    }

    fn delete_interactions_older_than(&self, cutoff: i64, page_size: usize) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock();
        let ids: Vec<String> = inner
            .interactions
            .iter()
            .filter(|(_, i)| i.recorded_at < cutoff)
            .map(|(id, _)| id.clone())
            .take(page_size)
            .collect();
        let deleted = ids.len() as u64;
        for id in ids {
            inner.interactions.remove(&id);
        }
        Ok(deleted)
    }

    fn get_notification(&self, id: &str) -> Result<Option<Notification>, StoreError> {
        Ok(self.inner.lock().notifications.get(id).cloned())
    }

    fn get_notification_by_recipient_report(
        &self,
        recipient_id: &str,
        report_id: &str,
    ) -> Result<Option<(String, Notification)>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .notifications
            .iter()
            .find(|(_, n)| n.recipient_id == recipient_id && n.report_id == report_id)
            .map(|(id, n)| (id.clone(), n.clone())))
    }

    fn query_notifications_by_recipient(
        &self,
        recipient_id: &str,
    ) -> Result<Vec<(String, Notification)>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .notifications
            .iter()
            .filter(|(_, n)| n.recipient_id == recipient_id)
            .map(|(id, n)| (id.clone(), n.clone()))
            .collect())
    }

    fn query_notifications_by_report(
        &self,
        report_id: &str,
    ) -> Result<Vec<(String, Notification)>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .notifications
            .iter()
            .filter(|(_, n)| n.report_id == report_id)
            .map(|(id, n)| (id.clone(), n.clone()))
            .collect())
    }

    fn query_notifications_containing_chain_hash(
        &self,
        hashed_chain_node: &str,
    ) -> Result<Vec<(String, Notification)>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .notifications
            .iter()
            .filter(|(_, n)| {
                n.chain_path.iter().any(|h| h == hashed_chain_node)
                    || n.chain_paths
                        .as_ref()
                        .is_some_and(|paths| paths.iter().any(|p| p.iter().any(|h| h == hashed_chain_node)))
            })
            .map(|(id, n)| (id.clone(), n.clone()))
            .collect())
    }

    fn put_notification(&self, id: &str, notification: &Notification) -> Result<(), StoreError> {
        self.inner.lock().notifications.insert(id.to_string(), notification.clone());
        Ok(())
    }

    fn update_notification(&self, id: &str, notification: &Notification) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.notifications.contains_key(id) {
            return Err(StoreError::NotFound(format!("notification {id}")));
        }
        inner.notifications.insert(id.to_string(), notification.clone());
        Ok(())
    }

    fn delete_notifications_older_than(&self, cutoff: i64, page_size: usize) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock();
        let ids: Vec<String> = inner
            .notifications
            .iter()
            .filter(|(_, n)| n.received_at < cutoff)
            .map(|(id, _)| id.clone())
            .take(page_size)
            .collect();
        let deleted = ids.len() as u64;
        for id in ids {
            inner.notifications.remove(&id);
        }
        Ok(deleted)
    }

    fn get_report(&self, id: &str) -> Result<Option<Report>, StoreError> {
        Ok(self.inner.lock().reports.get(id).cloned())
    }

    fn put_report(&self, id: &str, report: &Report) -> Result<(), StoreError> {
        self.inner.lock().reports.insert(id.to_string(), report.clone());
        Ok(())
    }

    fn update_report(&self, id: &str, report: &Report) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.reports.contains_key(id) {
            return Err(StoreError::NotFound(format!("report {id}")));
        }
        inner.reports.insert(id.to_string(), report.clone());
        Ok(())
    }

    fn delete_report(&self, id: &str) -> Result<(), StoreError> {
        self.inner.lock().reports.remove(id);
        Ok(())
    }

    fn delete_reports_older_than(&self, cutoff: i64, page_size: usize) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock();
        let ids: Vec<String> = inner
            .reports
            .iter()
            .filter(|(_, r)| r.reported_at < cutoff)
            .map(|(id, _)| id.clone())
            .take(page_size)
            .collect();
        let deleted = ids.len() as u64;
        for id in ids {
            inner.reports.remove(&id);
        }
        Ok(deleted)
    }

    fn query_reports_by_reporter(&self, reporter_id: &str) -> Result<Vec<(String, Report)>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .reports
            .iter()
            .filter(|(_, r)| r.reporter_id == reporter_id)
            .map(|(id, r)| (id.clone(), r.clone()))
            .collect())
    }

    fn query_reports_by_status(&self, status: ReportStatus) -> Result<Vec<(String, Report)>, StoreError> {
        let inner = self.inner.lock();
        Ok(inner
            .reports
            .iter()
            .filter(|(_, r)| r.status == status)
            .map(|(id, r)| (id.clone(), r.clone()))
            .collect())
    }

    fn rate_limit_check(
        &self,
        uid: &str,
        op: RateLimitOp,
        now: i64,
        window_ms: i64,
        buffer_ms: i64,
    ) -> RateLimitDecision {
        let key = Self::rate_limit_key(uid, op);
        let mut inner = self.inner.lock();
        let entry = inner.rate_limits.entry(key).or_insert(RateLimitDoc {
            count: 0,
            window_start: now,
            expires_at: now + window_ms + buffer_ms,
        });

        if now - entry.window_start > window_ms {
            entry.window_start = now;
            entry.count = 0;
            entry.expires_at = now + window_ms + buffer_ms;
        }

        if entry.count >= op.limit_per_hour() {
            return RateLimitDecision::Rejected;
        }
        entry.count += 1;
        RateLimitDecision::Allowed
    }

    fn get_rate_limit(&self, uid: &str, op: RateLimitOp) -> Result<Option<RateLimitDoc>, StoreError> {
        let key = Self::rate_limit_key(uid, op);
        Ok(self.inner.lock().rate_limits.get(&key).cloned())
    }

    fn put_cleanup_log(&self, log: &CleanupLog) -> Result<(), StoreError> {
        self.inner.lock().cleanup_logs.push(log.clone());
        Ok(())
    }

    fn commit_batch(&self, mut batch: Batch) -> Result<(), StoreError> {
        if batch.committed {
            return Err(StoreError::Internal("batch already committed".into()));
        }
        batch.committed = true;
        let mut inner = self.inner.lock();
        for op in batch.ops.drain(..) {
            match op {
                BatchOp::PutNotification { id, notification } => {
                    inner.notifications.insert(id, *notification);
                }
                BatchOp::UpdateNotification { id, notification } => {
                    inner.notifications.insert(id, *notification);
                }
                BatchOp::DeleteNotification { id } => {
                    inner.notifications.remove(&id);
                }
                BatchOp::PutReport { id, report } => {
                    inner.reports.insert(id, *report);
                }
                BatchOp::UpdateReport { id, report } => {
                    inner.reports.insert(id, *report);
                }
                BatchOp::PutUser { uid, user } => {
                    inner
                        .users_by_hashed_interaction
                        .insert(user.hashed_interaction_id.clone(), uid.clone());
                    inner
                        .users_by_hashed_notification
                        .insert(user.hashed_notification_id.clone(), uid.clone());
                    inner.users.insert(uid, *user);
                }
                BatchOp::DeleteInteraction { id } => {
                    inner.interactions.remove(&id);
                }
            }
        }
        Ok(())
    }

    fn new_id(&self) -> String {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        format!("mem-{n:016x}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exposure_core::hashing::{hash_interaction, hash_notification};

    fn sample_user(uid: &str) -> User {
        User {
            uid: uid.to_string(),
            anonymous_id: hash_interaction(uid).to_hex(),
            username: Some("tester".into()),
            created_at: 0,
            fcm_token: Some("token-1".into()),
            hashed_interaction_id: hash_interaction(uid).to_hex(),
            hashed_notification_id: hash_notification(uid).to_hex(),
        }
    }

    #[test]
    fn put_then_get_user_round_trips() {
        let store = MemStore::new();
        let user = sample_user("alice");
        store.put_user(&user).unwrap();
        assert_eq!(store.get_user("alice").unwrap(), Some(user));
    }

    #[test]
    fn user_lookup_by_hashed_interaction_id() {
        let store = MemStore::new();
        let user = sample_user("bob");
        store.put_user(&user).unwrap();
        let found = store
            .get_user_by_hashed_interaction_id(&user.hashed_interaction_id)
            .unwrap();
        assert_eq!(found.map(|u| u.uid), Some("bob".to_string()));
    }

    #[test]
    fn clear_fcm_token_on_missing_user_errors() {
        let store = MemStore::new();
        assert!(store.clear_fcm_token("nobody").is_err());
    }

    #[test]
    fn interaction_window_query_filters_by_partner_and_range() {
        let store = MemStore::new();
        store
            .put_interaction(&Interaction {
                owner_id: "owner-hash".into(),
                partner_anonymous_id: "partner-hash".into(),
                partner_username_snapshot: None,
                recorded_at: 100,
            })
            .unwrap();
        store
            .put_interaction(&Interaction {
                owner_id: "owner-hash".into(),
                partner_anonymous_id: "other-partner".into(),
                partner_username_snapshot: None,
                recorded_at: 100,
            })
            .unwrap();

        let found = store
            .query_interactions_by_partner_window("partner-hash", 0, 200)
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].partner_anonymous_id, "partner-hash");
    }

    #[test]
    fn rate_limit_rejects_after_cap_then_resets_next_window() {
        let store = MemStore::new();
        let window_ms = 3_600_000;
        for _ in 0..5 {
            assert_eq!(
                store.rate_limit_check("alice", RateLimitOp::PositiveReport, 0, window_ms, 0),
                RateLimitDecision::Allowed
            );
        }
        assert_eq!(
            store.rate_limit_check("alice", RateLimitOp::PositiveReport, 0, window_ms, 0),
            RateLimitDecision::Rejected
        );
        assert_eq!(
            store.rate_limit_check("alice", RateLimitOp::PositiveReport, window_ms + 1, window_ms, 0),
            RateLimitDecision::Allowed
        );
    }

    #[test]
    fn delete_interactions_older_than_paginates_and_reports_count() {
        let store = MemStore::new();
        for i in 0..5 {
            store
                .put_interaction(&Interaction {
                    owner_id: "a".into(),
                    partner_anonymous_id: "b".into(),
                    partner_username_snapshot: None,
                    recorded_at: i,
                })
                .unwrap();
        }
        let deleted = store.delete_interactions_older_than(3, 2).unwrap();
        assert_eq!(deleted, 2);
    }

    #[test]
    fn batch_commit_is_terminal() {
        let store = MemStore::new();
        let mut batch = Batch::new();
        batch
            .add(BatchOp::PutUser {
                uid: "carol".into(),
                user: Box::new(sample_user("carol")),
            })
            .unwrap();
        store.commit_batch(batch).unwrap();
        assert!(store.get_user("carol").unwrap().is_some());
    }
}
