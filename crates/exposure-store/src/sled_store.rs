//! Persistent `Store` backed by sled.
//!
//! One sled tree per collection plus small secondary-index trees for the two
//! hashed-id lookups users need, following the same per-collection-tree shape
//! as the teacher's `gossipd::storage::Storage` (`events`/`descriptors`/
//! `version_vectors`/`metadata` trees opened once in `open()`).

use std::path::Path;

use exposure_core::types::{
    CleanupLog, Interaction, Notification, RateLimitDoc, RateLimitOp, Report, ReportStatus, User,
};

use crate::error::StoreError;
use crate::store::{Batch, BatchOp, RateLimitDecision, Store};

pub struct SledStore {
    db: sled::Db,
    users: sled::Tree,
    users_by_hashed_interaction: sled::Tree,
    users_by_hashed_notification: sled::Tree,
    interactions: sled::Tree,
    notifications: sled::Tree,
    reports: sled::Tree,
    rate_limits: sled::Tree,
    cleanup_logs: sled::Tree,
    meta: sled::Tree,
}

const NEXT_ID_KEY: &[u8] = b"next_id";

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        let users = db.open_tree("users")?;
        let users_by_hashed_interaction = db.open_tree("users_by_hashed_interaction")?;
        let users_by_hashed_notification = db.open_tree("users_by_hashed_notification")?;
        let interactions = db.open_tree("interactions")?;
        let notifications = db.open_tree("notifications")?;
        let reports = db.open_tree("reports")?;
        let rate_limits = db.open_tree("rate_limits")?;
        let cleanup_logs = db.open_tree("cleanup_logs")?;
        let meta = db.open_tree("meta")?;

        Ok(Self {
            db,
            users,
            users_by_hashed_interaction,
            users_by_hashed_notification,
            interactions,
            notifications,
            reports,
            rate_limits,
            cleanup_logs,
            meta,
        })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    fn rate_limit_key(uid: &str, op: RateLimitOp) -> String {
        format!("{uid}_{}", op.as_key_segment())
    }
}

impl Store for SledStore {
    fn get_user(&self, uid: &str) -> Result<Option<User>, StoreError> {
        match self.users.get(uid)? {
            Some(bytes) => Ok(Some(postcard::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_user(&self, user: &User) -> Result<(), StoreError> {
        let value = postcard::to_allocvec(user)?;
        self.users.insert(user.uid.as_bytes(), value)?;
        self.users_by_hashed_interaction
            .insert(user.hashed_interaction_id.as_bytes(), user.uid.as_bytes())?;
        self.users_by_hashed_notification
            .insert(user.hashed_notification_id.as_bytes(), user.uid.as_bytes())?;
        Ok(())
    }

    fn clear_fcm_token(&self, uid: &str) -> Result<(), StoreError> {
        let mut user = self
            .get_user(uid)?
            .ok_or_else(|| StoreError::NotFound(format!("user {uid}")))?;
        user.fcm_token = None;
        self.put_user(&user)
    }

    fn users_by_uids(&self, uids: &[String]) -> Result<Vec<User>, StoreError> {
        let mut out = Vec::with_capacity(uids.len());
        for chunk in crate::store::chunk_query_in(uids) {
            for uid in chunk {
                if let Some(u) = self.get_user(uid)? {
                    out.push(u);
                }
            }
        }
        Ok(out)
    }

    fn get_user_by_hashed_interaction_id(&self, hashed: &str) -> Result<Option<User>, StoreError> {
        match self.users_by_hashed_interaction.get(hashed)? {
            Some(uid_bytes) => {
                let uid = String::from_utf8_lossy(&uid_bytes).into_owned();
                self.get_user(&uid)
            }
            None => Ok(None),
        }
    }

    fn get_user_by_hashed_notification_id(&self, hashed: &str) -> Result<Option<User>, StoreError> {
        match self.users_by_hashed_notification.get(hashed)? {
            Some(uid_bytes) => {
                let uid = String::from_utf8_lossy(&uid_bytes).into_owned();
                self.get_user(&uid)
            }
            None => Ok(None),
        }
    }

    fn delete_user(&self, uid: &str) -> Result<(), StoreError> {
        if let Some(user) = self.get_user(uid)? {
            self.users_by_hashed_interaction.remove(user.hashed_interaction_id.as_bytes())?;
            self.users_by_hashed_notification.remove(user.hashed_notification_id.as_bytes())?;
        }
        self.users.remove(uid.as_bytes())?;
        Ok(())
    }

    fn put_interaction(&self, interaction: &Interaction) -> Result<String, StoreError> {
        let id = self.new_id();
        let value = postcard::to_allocvec(interaction)?;
        self.interactions.insert(id.as_bytes(), value)?;
        Ok(id)
    }

    fn query_interactions_by_partner_window(
        &self,
        partner_id: &str,
        window_start: i64,
        window_end: i64,
    ) -> Result<Vec<Interaction>, StoreError> {
        let mut out = Vec::new();
        for entry in self.interactions.iter() {
            let (_, bytes) = entry?;
            let interaction: Interaction = postcard::from_bytes(&bytes)?;
            if interaction.partner_anonymous_id == partner_id
                && interaction.recorded_at >= window_start
                && interaction.recorded_at <= window_end
            {
                out.push(interaction);
            }
        }
        Ok(out)
    }

    fn delete_interactions_owned_by(&self, owner_or_partner_id: &str) -> Result<u64, StoreError> {
        let mut to_delete = Vec::new();
        for entry in self.interactions.iter() {
            let (key, bytes) = entry?;
            let interaction: Interaction = postcard::from_bytes(&bytes)?;
            if interaction.owner_id == owner_or_partner_id
                || interaction.partner_anonymous_id == owner_or_partner_id
            {
                to_delete.push(key);
            }
        }
        let count = to_delete.len() as u64;
        for key in to_delete {
            self.interactions.remove(key)?;
        }
        Ok(count)
    }

    fn query_interactions_involving(&self, hashed_interaction_id: &str) -> Result<Vec<Interaction>, StoreError> {
        let mut out = Vec::new();
        for entry in self.interactions.iter() {
            let (_, bytes) = entry?;
            let interaction: Interaction = postcard::from_bytes(&bytes)?;
            if interaction.owner_id == hashed_interaction_id
                || interaction.partner_anonymous_id == hashed_interaction_id
            {
                out.push(interaction);
            }
        }
        Ok(out)
    }

    fn delete_interactions_older_than(&self, cutoff: i64, page_size: usize) -> Result<u64, StoreError> {
        let mut to_delete = Vec::new();
        for entry in self.interactions.iter() {
            let (key, bytes) = entry?;
            let interaction: Interaction = postcard::from_bytes(&bytes)?;
            if interaction.recorded_at < cutoff {
                to_delete.push(key);
                if to_delete.len() >= page_size {
                    break;
                }
            }
        }
        let count = to_delete.len() as u64;
        for key in to_delete {
            self.interactions.remove(key)?;
        }
        Ok(count)
    }

    fn get_notification(&self, id: &str) -> Result<Option<Notification>, StoreError> {
        match self.notifications.get(id)? {
            Some(bytes) => Ok(Some(postcard::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn get_notification_by_recipient_report(
        &self,
        recipient_id: &str,
        report_id: &str,
    ) -> Result<Option<(String, Notification)>, StoreError> {
        for entry in self.notifications.iter() {
            let (key, bytes) = entry?;
            let n: Notification = postcard::from_bytes(&bytes)?;
            if n.recipient_id == recipient_id && n.report_id == report_id {
                return Ok(Some((String::from_utf8_lossy(&key).into_owned(), n)));
            }
        }
        Ok(None)
    }

    fn query_notifications_by_recipient(
        &self,
        recipient_id: &str,
    ) -> Result<Vec<(String, Notification)>, StoreError> {
        let mut out = Vec::new();
        for entry in self.notifications.iter() {
            let (key, bytes) = entry?;
            let n: Notification = postcard::from_bytes(&bytes)?;
            if n.recipient_id == recipient_id {
                out.push((String::from_utf8_lossy(&key).into_owned(), n));
            }
        }
        Ok(out)
    }

    fn query_notifications_by_report(
        &self,
        report_id: &str,
    ) -> Result<Vec<(String, Notification)>, StoreError> {
        let mut out = Vec::new();
        for entry in self.notifications.iter() {
            let (key, bytes) = entry?;
            let n: Notification = postcard::from_bytes(&bytes)?;
            if n.report_id == report_id {
                out.push((String::from_utf8_lossy(&key).into_owned(), n));
            }
        }
        Ok(out)
    }

    fn query_notifications_containing_chain_hash(
        &self,
        hashed_chain_node: &str,
    ) -> Result<Vec<(String, Notification)>, StoreError> {
        let mut out = Vec::new();
        for entry in self.notifications.iter() {
            let (key, bytes) = entry?;
            let n: Notification = postcard::from_bytes(&bytes)?;
            let hit = n.chain_path.iter().any(|h| h == hashed_chain_node)
                || n.chain_paths
                    .as_ref()
                    .is_some_and(|paths| paths.iter().any(|p| p.iter().any(|h| h == hashed_chain_node)));
            if hit {
                out.push((String::from_utf8_lossy(&key).into_owned(), n));
            }
        }
        Ok(out)
    }

    fn put_notification(&self, id: &str, notification: &Notification) -> Result<(), StoreError> {
        let value = postcard::to_allocvec(notification)?;
        self.notifications.insert(id.as_bytes(), value)?;
        Ok(())
    }

    fn update_notification(&self, id: &str, notification: &Notification) -> Result<(), StoreError> {
        if !self.notifications.contains_key(id)? {
            return Err(StoreError::NotFound(format!("notification {id}")));
        }
        self.put_notification(id, notification)
    }

    fn delete_notifications_older_than(&self, cutoff: i64, page_size: usize) -> Result<u64, StoreError> {
        let mut to_delete = Vec::new();
        for entry in self.notifications.iter() {
            let (key, bytes) = entry?;
            let n: Notification = postcard::from_bytes(&bytes)?;
            if n.received_at < cutoff {
                to_delete.push(key);
                if to_delete.len() >= page_size {
                    break;
                }
            }
        }
        let count = to_delete.len() as u64;
        for key in to_delete {
            self.notifications.remove(key)?;
        }
        Ok(count)
    }

    fn get_report(&self, id: &str) -> Result<Option<Report>, StoreError> {
        match self.reports.get(id)? {
            Some(bytes) => Ok(Some(postcard::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_report(&self, id: &str, report: &Report) -> Result<(), StoreError> {
        let value = postcard::to_allocvec(report)?;
        self.reports.insert(id.as_bytes(), value)?;
        Ok(())
    }

    fn update_report(&self, id: &str, report: &Report) -> Result<(), StoreError> {
        if !self.reports.contains_key(id)? {
            return Err(StoreError::NotFound(format!("report {id}")));
        }
        self.put_report(id, report)
    }

    fn delete_report(&self, id: &str) -> Result<(), StoreError> {
        self.reports.remove(id.as_bytes())?;
        Ok(())
    }

    fn delete_reports_older_than(&self, cutoff: i64, page_size: usize) -> Result<u64, StoreError> {
        let mut to_delete = Vec::new();
        for entry in self.reports.iter() {
            let (key, bytes) = entry?;
            let r: Report = postcard::from_bytes(&bytes)?;
            if r.reported_at < cutoff {
                to_delete.push(key);
                if to_delete.len() >= page_size {
                    break;
                }
            }
        }
        let count = to_delete.len() as u64;
        for key in to_delete {
            self.reports.remove(key)?;
        }
        Ok(count)
    }

    fn query_reports_by_reporter(&self, reporter_id: &str) -> Result<Vec<(String, Report)>, StoreError> {
        let mut out = Vec::new();
        for entry in self.reports.iter() {
            let (key, bytes) = entry?;
            let r: Report = postcard::from_bytes(&bytes)?;
            if r.reporter_id == reporter_id {
                out.push((String::from_utf8_lossy(&key).into_owned(), r));
            }
        }
        Ok(out)
    }

    fn query_reports_by_status(&self, status: ReportStatus) -> Result<Vec<(String, Report)>, StoreError> {
        let mut out = Vec::new();
        for entry in self.reports.iter() {
            let (key, bytes) = entry?;
            let r: Report = postcard::from_bytes(&bytes)?;
            if r.status == status {
                out.push((String::from_utf8_lossy(&key).into_owned(), r));
            }
        }
        Ok(out)
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

        // Compare-and-swap loop, like the teacher's version-vector updates:
        // the decision (allowed vs rejected) is computed once per attempt and
        // only committed if no concurrent writer raced us.
        loop {
            let current = match self.rate_limits.get(key.as_bytes()) {
                Ok(v) => v,
                Err(_) => return RateLimitDecision::Allowed,
            };

            let mut doc = current
                .as_deref()
                .and_then(|bytes| postcard::from_bytes::<RateLimitDoc>(bytes).ok())
                .unwrap_or(RateLimitDoc {
                    count: 0,
                    window_start: now,
                    expires_at: now + window_ms + buffer_ms,
                });

            if now - doc.window_start > window_ms {
                doc.window_start = now;
                doc.count = 0;
                doc.expires_at = now + window_ms + buffer_ms;
            }

            let decision = if doc.count >= op.limit_per_hour() {
                RateLimitDecision::Rejected
            } else {
                doc.count += 1;
                RateLimitDecision::Allowed
            };

            let Ok(new_bytes) = postcard::to_allocvec(&doc) else {
                return RateLimitDecision::Allowed;
            };

            match self
                .rate_limits
                .compare_and_swap(key.as_bytes(), current.as_deref(), Some(new_bytes))
            {
                Ok(Ok(())) => return decision,
                Ok(Err(_)) => continue,
                Err(_) => return RateLimitDecision::Allowed,
            }
        }
    }

    fn get_rate_limit(&self, uid: &str, op: RateLimitOp) -> Result<Option<RateLimitDoc>, StoreError> {
        let key = Self::rate_limit_key(uid, op);
        match self.rate_limits.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(postcard::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_cleanup_log(&self, log: &CleanupLog) -> Result<(), StoreError> {
        let key = log.timestamp.to_be_bytes();
        let value = postcard::to_allocvec(log)?;
        self.cleanup_logs.insert(key, value)?;
        Ok(())
    }

    fn commit_batch(&self, mut batch: Batch) -> Result<(), StoreError> {
        if batch.committed {
            return Err(StoreError::Internal("batch already committed".into()));
        }
        batch.committed = true;
        for op in batch.ops.drain(..) {
            match op {
                BatchOp::PutNotification { id, notification } => {
                    self.put_notification(&id, &notification)?;
                }
                BatchOp::UpdateNotification { id, notification } => {
                    self.notifications
                        .insert(id.as_bytes(), postcard::to_allocvec(&*notification)?)?;
                }
                BatchOp::DeleteNotification { id } => {
                    self.notifications.remove(id.as_bytes())?;
                }
                BatchOp::PutReport { id, report } => {
                    self.put_report(&id, &report)?;
                }
                BatchOp::UpdateReport { id, report } => {
                    self.reports.insert(id.as_bytes(), postcard::to_allocvec(&*report)?)?;
                }
                BatchOp::PutUser { uid: _, user } => {
                    self.put_user(&user)?;
                }
                BatchOp::DeleteInteraction { id } => {
                    self.interactions.remove(id.as_bytes())?;
                }
            }
        }
        Ok(())
    }

    fn new_id(&self) -> String {
        let next = self
            .meta
            .fetch_and_update(NEXT_ID_KEY, |existing| {
                let current = existing
                    .and_then(|b| b.try_into().ok())
                    .map(u64::from_le_bytes)
                    .unwrap_or(0);
                Some((current + 1).to_le_bytes().to_vec())
            })
            .ok()
            .flatten()
            .and_then(|b| b.as_ref().try_into().ok())
            .map(u64::from_le_bytes)
            .unwrap_or(0);
        format!("sled-{next:016x}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exposure_core::hashing::hash_interaction;
    use tempfile::tempdir;

    fn sample_user(uid: &str) -> User {
        User {
            uid: uid.to_string(),
            anonymous_id: hash_interaction(uid).to_hex(),
            username: None,
            created_at: 0,
            fcm_token: None,
            hashed_interaction_id: hash_interaction(uid).to_hex(),
            hashed_notification_id: hash_interaction(&format!("n-{uid}")).to_hex(),
        }
    }

    #[test]
    fn put_then_get_user_round_trips() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        let user = sample_user("alice");
        store.put_user(&user).unwrap();
        assert_eq!(store.get_user("alice").unwrap(), Some(user));
    }

    #[test]
    fn new_id_is_monotonic_across_calls() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        let a = store.new_id();
        let b = store.new_id();
        assert_ne!(a, b);
    }

    #[test]
    fn interaction_window_query_round_trips_through_sled() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        store
            .put_interaction(&Interaction {
                owner_id: "owner".into(),
                partner_anonymous_id: "partner".into(),
                partner_username_snapshot: None,
                recorded_at: 50,
            })
            .unwrap();
        let found = store
            .query_interactions_by_partner_window("partner", 0, 100)
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[test]
    fn rate_limit_rejects_beyond_cap() {
        let dir = tempdir().unwrap();
        let store = SledStore::open(dir.path()).unwrap();
        let window_ms = 3_600_000;
        for _ in 0..3 {
            assert_eq!(
                store.rate_limit_check("bob", RateLimitOp::DataExport, 0, window_ms, 0),
                RateLimitDecision::Allowed
            );
        }
        assert_eq!(
            store.rate_limit_check("bob", RateLimitOp::DataExport, 0, window_ms, 0),
            RateLimitDecision::Rejected
        );
    }
}
