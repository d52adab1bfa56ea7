//! Triggers & Scheduler Adapter (C12).
//!
//! The platform this was distilled from delivers an on-create trigger per
//! `reports/{id}` document at least once. This crate has no realtime
//! trigger transport of its own, so the adapter here polls `reports` for
//! `pending` documents on an interval and dispatches each to the Report
//! Processor: the same "convert an external signal into a call into C9"
//! shape, just with polling standing in for push delivery. Idempotency is
//! unaffected: [`crate::processor`] already re-reads `status` and exits on
//! `Completed`, so a report observed `pending` twice across two poll ticks
//! (e.g. a slow first run) is processed safely both times.

use exposure_core::types::{ReportStatus, TestResult};
use exposure_push::PushDispatcher;
use exposure_store::Store;

use crate::processor::{process_negative_report, process_positive_report};

/// One polling pass: fetch every `pending` report and dispatch it by
/// `testResult`. Returns the number of reports handed to a processor (not
/// the number that actually produced a notification; a report found
/// already `completed` by the time the processor re-reads it counts as
/// handled, not skipped, since the adapter did its job).
pub async fn poll_once<D: PushDispatcher>(store: &dyn Store, dispatcher: &D, now: i64) -> u64 {
    let pending = match store.query_reports_by_status(ReportStatus::Pending) {
        Ok(reports) => reports,
        Err(err) => {
            tracing::error!(error = %err, "trigger adapter: failed to list pending reports");
            return 0;
        }
    };

    let mut handled = 0u64;
    for (report_id, report) in pending {
        let outcome = match report.test_result {
            TestResult::Positive => process_positive_report(store, dispatcher, &report_id, now).await.map(|_| ()),
            TestResult::Negative => process_negative_report(store, dispatcher, &report_id, now).await.map(|_| ()),
        };
        match outcome {
            Ok(()) => handled += 1,
            Err(err) => {
                tracing::error!(report_id = %report_id, error = %err, "trigger adapter: report processing failed");
                if let Ok(Some(mut report)) = store.get_report(&report_id) {
                    if report.status != ReportStatus::Completed {
                        report.status = ReportStatus::Failed;
                        report.error = Some(err.to_string());
                        let _ = store.update_report(&report_id, &report);
                    }
                }
            }
        }
    }
    handled
}

#[cfg(test)]
mod tests {
    use super::*;
    use exposure_core::hashing::{hash_interaction, hash_notification, hash_report};
    use exposure_core::types::{PrivacyLevel, Report};
    use exposure_push::MockDispatcher;
    use exposure_store::MemStore;

    fn pending_positive_report(reporter: &str) -> Report {
        Report {
            reporter_id: hash_report(reporter).to_hex(),
            reporter_interaction_hashed_id: hash_interaction(reporter).to_hex(),
            reporter_notification_hashed_id: hash_notification(reporter).to_hex(),
            sti_types: vec![exposure_core::types::Sti::Hiv],
            test_date: 1_000_000_000,
            privacy_level: PrivacyLevel::Full,
            test_result: TestResult::Positive,
            reported_at: 1_000_000_000,
            status: ReportStatus::Pending,
            linked_report_id: None,
            notification_id: None,
            processed_at: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn poll_once_completes_every_pending_report_and_ignores_others() {
        let store = MemStore::new();
        store.put_report("report-1", &pending_positive_report("a")).unwrap();
        let mut completed = pending_positive_report("b");
        completed.status = ReportStatus::Completed;
        store.put_report("report-2", &completed).unwrap();

        let dispatcher = MockDispatcher::new();
        let handled = poll_once(store.as_ref(), &dispatcher, 2_000_000_000).await;
        assert_eq!(handled, 1);

        let refreshed = store.get_report("report-1").unwrap().unwrap();
        assert_eq!(refreshed.status, ReportStatus::Completed);
    }

    #[tokio::test]
    async fn poll_once_is_a_noop_on_an_empty_queue() {
        let store = MemStore::new();
        let dispatcher = MockDispatcher::new();
        assert_eq!(poll_once(store.as_ref(), &dispatcher, 0).await, 0);
    }
}
