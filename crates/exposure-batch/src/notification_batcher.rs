use thiserror::Error;

use exposure_core::types::Notification;
use exposure_store::{Batch, BatchOp, Store, StoreError};

#[derive(Debug, Error)]
pub enum NotificationBatchError {
    #[error("batch already committed")]
    AlreadyCommitted,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// One notification queued for creation, identified by the hashed ids of its
/// recipient-facing identity (kept distinct from the store document id,
/// which is assigned at commit time).
///
/// `existing_id`, when set, turns this entry into an upsert: the commit
/// writes `UpdateNotification` against that document id instead of minting
/// a fresh one. This is what makes re-running propagation over an
/// already-notified `(recipientId, reportId)` pair safe. See
/// `Store::get_notification_by_recipient_report`.
pub struct PendingNotification {
    pub data: Notification,
    pub hashed_interaction_id: String,
    pub hashed_notification_id: String,
    pub existing_id: Option<String>,
}

/// Per-index outcome of a commit: either the assigned/updated document id
/// or an error specific to that entry.
pub enum CommitResult {
    Created(String),
    Updated(String),
    Failed(String),
}

/// Collects notifications to write, committing all of them in ≤500-op
/// `Store` batches. Committing once is terminal.
pub struct NotificationBatcher {
    pending: Vec<PendingNotification>,
    committed: bool,
}

impl NotificationBatcher {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            committed: false,
        }
    }

    pub fn add(&mut self, notification: PendingNotification) -> Result<(), NotificationBatchError> {
        if self.committed {
            return Err(NotificationBatchError::AlreadyCommitted);
        }
        self.pending.push(notification);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Commit every queued notification, in ≤500-op `Store` batches.
    /// Returns one [`CommitResult`] per entry, in the order entries were
    /// added.
    pub fn commit(&mut self, store: &dyn Store) -> Result<Vec<CommitResult>, NotificationBatchError> {
        if self.committed {
            return Err(NotificationBatchError::AlreadyCommitted);
        }
        self.committed = true;

        let entries = std::mem::take(&mut self.pending);
        let mut results = Vec::with_capacity(entries.len());
        let mut assigned_ids = Vec::with_capacity(entries.len());

        for chunk in entries.chunks(exposure_store::BATCH_OP_CAP) {
            let mut batch = Batch::new();
            // (id, is_update) per entry, same order as the chunk.
            let mut ids_in_chunk: Vec<(String, bool)> = Vec::with_capacity(chunk.len());
            for entry in chunk {
                match &entry.existing_id {
                    Some(existing) => {
                        batch.add(BatchOp::UpdateNotification {
                            id: existing.clone(),
                            notification: Box::new(entry.data.clone()),
                        })?;
                        ids_in_chunk.push((existing.clone(), true));
                    }
                    None => {
                        let id = store.new_id();
                        batch.add(BatchOp::PutNotification {
                            id: id.clone(),
                            notification: Box::new(entry.data.clone()),
                        })?;
                        ids_in_chunk.push((id, false));
                    }
                }
            }
            match store.commit_batch(batch) {
                Ok(()) => {
                    for (id, is_update) in ids_in_chunk {
                        assigned_ids.push(if is_update {
                            CommitResult::Updated(id)
                        } else {
                            CommitResult::Created(id)
                        });
                    }
                }
                Err(e) => {
                    for _ in ids_in_chunk {
                        assigned_ids.push(CommitResult::Failed(e.to_string()));
                    }
                }
            }
        }
        results.append(&mut assigned_ids);
        Ok(results)
    }
}

impl Default for NotificationBatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use exposure_core::types::{ChainVisualization, NotificationKind};
    use exposure_store::MemStore;

    fn sample(recipient: &str) -> PendingNotification {
        PendingNotification {
            data: Notification {
                recipient_id: recipient.to_string(),
                kind: NotificationKind::Exposure,
                sti_type: None,
                exposure_date: None,
                chain_data: ChainVisualization::default(),
                chain_path: vec!["h1".into()],
                chain_paths: None,
                hop_depth: 0,
                is_read: false,
                received_at: 0,
                updated_at: 0,
                report_id: "report-1".into(),
                deleted_at: None,
            },
            hashed_interaction_id: "h-interaction".into(),
            hashed_notification_id: "h-notification".into(),
            existing_id: None,
        }
    }

    #[test]
    fn commit_assigns_one_id_per_entry_in_order() {
        let store = MemStore::new();
        let mut batcher = NotificationBatcher::new();
        batcher.add(sample("r1")).unwrap();
        batcher.add(sample("r2")).unwrap();

        let results = batcher.commit(store.as_ref()).unwrap();
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], CommitResult::Created(_)));
        assert!(matches!(results[1], CommitResult::Created(_)));
    }

    #[test]
    fn existing_id_upserts_instead_of_creating() {
        let store = MemStore::new();
        let mut first = NotificationBatcher::new();
        first.add(sample("r1")).unwrap();
        let first_results = first.commit(store.as_ref()).unwrap();
        let CommitResult::Created(id) = &first_results[0] else {
            panic!("expected a fresh create");
        };

        let mut second = NotificationBatcher::new();
        let mut upsert = sample("r1");
        upsert.existing_id = Some(id.clone());
        upsert.data.hop_depth = 2;
        second.add(upsert).unwrap();
        let second_results = second.commit(store.as_ref()).unwrap();

        assert!(matches!(&second_results[0], CommitResult::Updated(updated) if updated == id));
        assert_eq!(store.get_notification(id).unwrap().unwrap().hop_depth, 2);
    }

    #[test]
    fn second_commit_is_an_error() {
        let store = MemStore::new();
        let mut batcher = NotificationBatcher::new();
        batcher.add(sample("r1")).unwrap();
        batcher.commit(store.as_ref()).unwrap();

        assert!(matches!(
            batcher.commit(store.as_ref()),
            Err(NotificationBatchError::AlreadyCommitted)
        ));
    }

    #[test]
    fn add_after_commit_is_an_error() {
        let store = MemStore::new();
        let mut batcher = NotificationBatcher::new();
        batcher.add(sample("r1")).unwrap();
        batcher.commit(store.as_ref()).unwrap();

        assert!(matches!(
            batcher.add(sample("r2")),
            Err(NotificationBatchError::AlreadyCommitted)
        ));
    }
}
