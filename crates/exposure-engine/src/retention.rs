//! Retention Sweeper (C11): periodic bulk deletion of records older than
//! the retention horizon, in pages of [`exposure_store::BATCH_OP_CAP`],
//! recorded to `cleanupLogs`. Generalized from the teacher's
//! `gossipd::event_log`'s bounded compaction pass: page, delete, log,
//! never abort the whole sweep on one page's error.

use exposure_core::types::CleanupLog;
use exposure_store::Store;

/// Result of one sweep pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct SweepResult {
    pub interactions_deleted: u64,
    pub notifications_deleted: u64,
    pub reports_deleted: u64,
}

/// Run one retention sweep: delete `interactions`, `notifications`, and
/// `reports` whose time field is older than `now - retention_days`, paging
/// by `page_size`, and record the totals to `cleanupLogs`.
///
/// A page's store error is logged and the sweep continues. The "per-item
/// errors in a batch are recorded ... and do not fail the batch" rule
/// applies at page granularity here, since a single collection's delete is
/// itself a store-level batch.
pub fn sweep(store: &dyn Store, now: i64, retention_days: i64, page_size: usize) -> SweepResult {
    let cutoff = now - retention_days * exposure_core::time::DAY_MS;
    let mut result = SweepResult::default();

    loop {
        match store.delete_interactions_older_than(cutoff, page_size) {
            Ok(0) => break,
            Ok(n) => result.interactions_deleted += n,
            Err(err) => {
                tracing::error!(error = %err, "retention sweep: interactions page failed");
                break;
            }
        }
    }

    loop {
        match store.delete_notifications_older_than(cutoff, page_size) {
            Ok(0) => break,
            Ok(n) => result.notifications_deleted += n,
            Err(err) => {
                tracing::error!(error = %err, "retention sweep: notifications page failed");
                break;
            }
        }
    }

    loop {
        match store.delete_reports_older_than(cutoff, page_size) {
            Ok(0) => break,
            Ok(n) => result.reports_deleted += n,
            Err(err) => {
                tracing::error!(error = %err, "retention sweep: reports page failed");
                break;
            }
        }
    }

    if let Err(err) = store.put_cleanup_log(&CleanupLog {
        interactions_deleted: result.interactions_deleted,
        notifications_deleted: result.notifications_deleted,
        reports_deleted: result.reports_deleted,
        timestamp: now,
    }) {
        tracing::error!(error = %err, "retention sweep: failed to write cleanup log");
    }

    tracing::info!(
        interactions = result.interactions_deleted,
        notifications = result.notifications_deleted,
        reports = result.reports_deleted,
        "retention sweep complete"
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use exposure_core::hashing::hash_interaction;
    use exposure_core::types::Interaction;
    use exposure_store::MemStore;

    #[test]
    fn sweep_deletes_only_past_the_cutoff_and_logs_a_cleanup_record() {
        let store = MemStore::new();
        let day = exposure_core::time::DAY_MS;
        let now = 200 * day;

        store
            .put_interaction(&Interaction {
                owner_id: hash_interaction("b").to_hex(),
                partner_anonymous_id: hash_interaction("a").to_hex(),
                partner_username_snapshot: None,
                recorded_at: now - 181 * day,
            })
            .unwrap();
        store
            .put_interaction(&Interaction {
                owner_id: hash_interaction("d").to_hex(),
                partner_anonymous_id: hash_interaction("c").to_hex(),
                partner_username_snapshot: None,
                recorded_at: now - 10 * day,
            })
            .unwrap();

        let result = sweep(store.as_ref(), now, 180, 500);
        assert_eq!(result.interactions_deleted, 1);

        let remaining = store
            .query_interactions_by_partner_window(&hash_interaction("c").to_hex(), 0, now)
            .unwrap();
        assert_eq!(remaining.len(), 1);
    }
}
