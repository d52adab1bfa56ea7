//! Report Processor (C9): the trigger-invoked half of positive/negative/
//! retraction handling. The callable-synchronous half (validation, chain-
//! link detection, and mutation of the *reporter's own* prior notifications)
//! lives in [`crate::callable`], since `reportPositiveTest` must return
//! `linkedReportId` in the same round trip that creates the report.

use std::collections::HashSet;

use exposure_cache::{InteractionQueryCache, UserLookupCache};
use exposure_core::hashing::{hash_chain, HashDigest};
use exposure_core::types::{Notification, NotificationKind, Report, ReportStatus, Sti, TestStatus};
use exposure_batch::{CommitResult, FcmBatcher, NotificationBatcher, PendingNotification, PendingPush};
use exposure_propagate::bfs::propagate;
use exposure_push::{MulticastOutcome, PushDispatcher};
use exposure_store::Store;

use crate::chain::{build_chain_visualization, chain_path_hashes, is_intermediary, update_node_status};
use crate::error::EngineError;

/// Outcome of a completed (non-idempotent-skip) positive-report processing.
#[derive(Debug, Default)]
pub struct PositiveProcessResult {
    pub notifications_created: u64,
    pub notifications_updated: u64,
    pub downstream_updates_pushed: u64,
    pub push_outcome: MulticastOutcome,
}

/// Outcome of a completed negative-report processing.
#[derive(Debug, Default)]
pub struct NegativeProcessResult {
    pub notifications_updated: u64,
    pub push_outcome: MulticastOutcome,
}

/// Outcome of a completed retraction.
#[derive(Debug, Default)]
pub struct RetractionResult {
    pub notifications_marked: u64,
    pub push_outcome: MulticastOutcome,
}

fn intersect(a: &[Sti], b: &[Sti]) -> Vec<Sti> {
    let b_set: HashSet<Sti> = b.iter().copied().collect();
    a.iter().copied().filter(|s| b_set.contains(s)).collect()
}

/// Whether a notification's (possibly privacy-hidden) `stiType` overlaps
/// `report_stis`. An empty `report_stis` (a negative report filed without a
/// specific STI) is treated as "clears everything this notification names".
fn sti_overlaps(notification_sti: &Option<Vec<Sti>>, report_stis: &[Sti]) -> bool {
    match notification_sti {
        None => false,
        Some(existing) => report_stis.is_empty() || !intersect(existing, report_stis).is_empty(),
    }
}

/// Steps 5-7 of spec.md §4.9's positive-report handling: run the chain
/// propagator, upsert one notification per reached user, then propagate the
/// reporter's new positive status through any notification where they
/// already appear as an intermediary.
///
/// Idempotent: re-reads the report and exits immediately if it is already
/// `completed`. Safe to call from a redelivered trigger.
pub async fn process_positive_report<D: PushDispatcher>(
    store: &dyn Store,
    dispatcher: &D,
    report_id: &str,
    now: i64,
) -> Result<Option<PositiveProcessResult>, EngineError> {
    let mut report = store
        .get_report(report_id)?
        .ok_or_else(|| EngineError::NotFound(format!("report {report_id} not found")))?;

    if report.status == ReportStatus::Completed {
        return Ok(None);
    }
    if report.status == ReportStatus::Pending {
        report.status = ReportStatus::Processing;
        store.update_report(report_id, &report)?;
    }

    let incubation_days = exposure_core::incubation::effective_incubation_days(&report.sti_types)
        .ok_or_else(|| EngineError::InvalidArgument("report has no sti types".into()))?;

    let mut interaction_cache = InteractionQueryCache::new();
    let mut user_cache = UserLookupCache::new();

    let reached = propagate(
        store,
        &mut interaction_cache,
        &report.reporter_interaction_hashed_id,
        report.test_date,
        incubation_days,
        now,
    )?;
    tracing::info!(report_id, reached = reached.len(), "chain propagation complete");

    let mut batcher = NotificationBatcher::new();
    let mut recipients = Vec::with_capacity(reached.len());

    for (hashed_interaction_id, reached_user) in &reached {
        let Some(user) = user_cache.get_by_hashed_interaction_id(store, hashed_interaction_id)? else {
            tracing::debug!(hashed_interaction_id, "reached contact has no onboarded account, skipping");
            continue;
        };
        let recipient_id = user.hashed_notification_id.clone();

        let existing = store.get_notification_by_recipient_report(&recipient_id, report_id)?;
        let representative = reached_user.paths.first().expect("a reached user has at least one path");
        let chain_path = chain_path_hashes(representative);
        let chain_paths = if reached_user.paths.len() > 1 {
            Some(reached_user.paths.iter().map(chain_path_hashes).collect())
        } else {
            None
        };
        let chain_data = build_chain_visualization(store, &mut user_cache, &reached_user.paths)?;

        let (existing_id, received_at, is_read) = match &existing {
            Some((id, notification)) => (Some(id.clone()), notification.received_at, notification.is_read),
            None => (None, now, false),
        };
        let hop_depth = match &existing {
            // Never regress a recipient's hop depth on a redelivered/merged retry.
            Some((_, notification)) => notification.hop_depth.min(reached_user.hop_depth),
            None => reached_user.hop_depth,
        };

        let data = Notification {
            recipient_id: recipient_id.clone(),
            kind: NotificationKind::Exposure,
            sti_type: report.privacy_level.includes_sti().then(|| report.sti_types.clone()),
            exposure_date: report.privacy_level.includes_date().then_some(report.test_date),
            chain_data,
            chain_path,
            chain_paths,
            hop_depth,
            is_read,
            received_at,
            updated_at: now,
            report_id: report_id.to_string(),
            deleted_at: None,
        };

        batcher.add(PendingNotification {
            data,
            hashed_interaction_id: hashed_interaction_id.clone(),
            hashed_notification_id: recipient_id,
            existing_id,
        })?;
        recipients.push(user);
    }

    let commit_results = batcher.commit(store)?;
    let mut created = 0u64;
    let mut updated = 0u64;
    let mut fcm = FcmBatcher::new();
    let mut push_owners: Vec<String> = Vec::new();

    for (result, user) in commit_results.iter().zip(recipients.iter()) {
        match result {
            CommitResult::Created(id) => {
                created += 1;
                if let Some(token) = &user.fcm_token {
                    fcm.add(PendingPush {
                        token: token.clone(),
                        notification_id: id.clone(),
                        kind: NotificationKind::Exposure,
                    })?;
                    push_owners.push(user.uid.clone());
                }
            }
            CommitResult::Updated(id) => {
                updated += 1;
                if let Some(token) = &user.fcm_token {
                    fcm.add(PendingPush {
                        token: token.clone(),
                        notification_id: id.clone(),
                        kind: NotificationKind::Exposure,
                    })?;
                    push_owners.push(user.uid.clone());
                }
            }
            CommitResult::Failed(err) => {
                tracing::error!(error = %err, "failed to commit a notification write");
            }
        }
    }

    let mut push_outcome = fcm.send(dispatcher).await?;
    for &idx in &push_outcome.invalid_token_indices {
        store.clear_fcm_token(&push_owners[idx])?;
    }

    let downstream = propagate_positive_update(store, dispatcher, &report, now).await?;
    push_outcome.success_count += downstream.push_outcome.success_count;
    push_outcome.failure_count += downstream.push_outcome.failure_count;

    report.status = ReportStatus::Completed;
    report.processed_at = Some(now);
    store.update_report(report_id, &report)?;

    Ok(Some(PositiveProcessResult {
        notifications_created: created,
        notifications_updated: updated + downstream.notifications_updated,
        downstream_updates_pushed: downstream.push_outcome.success_count,
        push_outcome,
    }))
}

/// Step 6 of spec.md §4.9: scan notifications already naming the reporter
/// on their chain path and mark their node `POSITIVE`, pushing an `UPDATE`
/// to every downstream recipient for whom the reporter is a strict
/// intermediary.
async fn propagate_positive_update<D: PushDispatcher>(
    store: &dyn Store,
    dispatcher: &D,
    report: &Report,
    now: i64,
) -> Result<NegativeProcessResult, EngineError> {
    let reporter_h_i = HashDigest::from_hex(&report.reporter_interaction_hashed_id)
        .ok_or_else(|| EngineError::InvalidArgument("malformed reporterInteractionHashedId".into()))?;
    let target_hash = hash_chain(reporter_h_i).to_hex();

    let candidates = store.query_notifications_containing_chain_hash(&target_hash)?;
    let mut updated = 0u64;
    let mut fcm = FcmBatcher::new();
    let mut push_owners = Vec::new();

    for (id, mut notification) in candidates {
        if !sti_overlaps(&notification.sti_type, &report.sti_types) {
            continue;
        }
        let intersection = notification
            .sti_type
            .as_ref()
            .map(|existing| {
                if report.sti_types.is_empty() {
                    existing.clone()
                } else {
                    intersect(existing, &report.sti_types)
                }
            })
            .unwrap_or_default();

        let Some(idx) = update_node_status(&mut notification, &target_hash, TestStatus::Positive, Some(&intersection))
        else {
            continue;
        };
        if !is_intermediary(idx, notification.chain_path.len()) {
            continue;
        }

        notification.updated_at = now;
        store.update_notification(&id, &notification)?;
        updated += 1;

        if let Some(recipient) = store.get_user_by_hashed_notification_id(&notification.recipient_id)? {
            if let Some(token) = recipient.fcm_token {
                fcm.add(PendingPush {
                    token,
                    notification_id: id,
                    kind: NotificationKind::Update,
                })?;
                push_owners.push(recipient.uid);
            }
        }
    }

    let mut push_outcome = fcm.send(dispatcher).await?;
    for &idx in &push_outcome.invalid_token_indices {
        store.clear_fcm_token(&push_owners[idx])?;
    }
    push_outcome.invalid_token_indices.clear();

    Ok(NegativeProcessResult {
        notifications_updated: updated,
        push_outcome,
    })
}

/// spec.md §4.9's negative-report handling: optionally mutate the
/// referenced notification in place, then propagate the clearance through
/// any chain where the reporter is an intermediary. Never creates a
/// notification.
pub async fn process_negative_report<D: PushDispatcher>(
    store: &dyn Store,
    dispatcher: &D,
    report_id: &str,
    now: i64,
) -> Result<Option<NegativeProcessResult>, EngineError> {
    let mut report = store
        .get_report(report_id)?
        .ok_or_else(|| EngineError::NotFound(format!("report {report_id} not found")))?;

    if report.status == ReportStatus::Completed {
        return Ok(None);
    }
    if report.status == ReportStatus::Pending {
        report.status = ReportStatus::Processing;
        store.update_report(report_id, &report)?;
    }

    let mut updated = 0u64;

    if let Some(notification_id) = &report.notification_id {
        if let Some(mut notification) = store.get_notification(notification_id)? {
            if let Some(node) = notification.chain_data.nodes.last_mut() {
                node.test_status = TestStatus::Negative;
            }
            notification.kind = NotificationKind::Update;
            notification.updated_at = now;
            store.update_notification(notification_id, &notification)?;
            updated += 1;
        }
    }

    let downstream = propagate_negative_update(store, dispatcher, &report, now).await?;
    updated += downstream.notifications_updated;

    report.status = ReportStatus::Completed;
    report.processed_at = Some(now);
    store.update_report(report_id, &report)?;

    Ok(Some(NegativeProcessResult {
        notifications_updated: updated,
        push_outcome: downstream.push_outcome,
    }))
}

/// `propagateNegativeUpdate(uid, stiType)`: scan notifications where
/// `chainPath array-contains H_C(H_I(uid))`, clearing the matching node and
/// pushing `UPDATE` to downstream recipients for whom `uid` is a strict
/// intermediary.
async fn propagate_negative_update<D: PushDispatcher>(
    store: &dyn Store,
    dispatcher: &D,
    report: &Report,
    now: i64,
) -> Result<NegativeProcessResult, EngineError> {
    let reporter_h_i = HashDigest::from_hex(&report.reporter_interaction_hashed_id)
        .ok_or_else(|| EngineError::InvalidArgument("malformed reporterInteractionHashedId".into()))?;
    let target_hash = hash_chain(reporter_h_i).to_hex();

    let candidates = store.query_notifications_containing_chain_hash(&target_hash)?;
    let mut updated = 0u64;
    let mut fcm = FcmBatcher::new();
    let mut push_owners = Vec::new();

    for (id, mut notification) in candidates {
        if !sti_overlaps(&notification.sti_type, &report.sti_types) {
            continue;
        }
        let Some(idx) = update_node_status(&mut notification, &target_hash, TestStatus::Negative, None) else {
            continue;
        };
        notification.updated_at = now;
        store.update_notification(&id, &notification)?;
        updated += 1;

        if !is_intermediary(idx, notification.chain_path.len()) {
            continue;
        }
        if let Some(recipient) = store.get_user_by_hashed_notification_id(&notification.recipient_id)? {
            if let Some(token) = recipient.fcm_token {
                fcm.add(PendingPush {
                    token,
                    notification_id: id,
                    kind: NotificationKind::Update,
                })?;
                push_owners.push(recipient.uid);
            }
        }
    }

    let mut push_outcome = fcm.send(dispatcher).await?;
    for &idx in &push_outcome.invalid_token_indices {
        store.clear_fcm_token(&push_owners[idx])?;
    }
    push_outcome.invalid_token_indices.clear();

    Ok(NegativeProcessResult {
        notifications_updated: updated,
        push_outcome,
    })
}

/// `deleteExposureReport`: soft-delete every notification tied to
/// `report_id`, fan out `REPORT_DELETED` pushes, then delete the report
/// document itself.
pub async fn process_retraction<D: PushDispatcher>(
    store: &dyn Store,
    dispatcher: &D,
    report_id: &str,
    now: i64,
) -> Result<RetractionResult, EngineError> {
    let targets = store.query_notifications_by_report(report_id)?;

    let mut recipient_ids: Vec<String> = targets.iter().map(|(_, n)| n.recipient_id.clone()).collect();
    recipient_ids.sort();
    recipient_ids.dedup();

    let mut fcm = FcmBatcher::new();
    let mut push_owners = Vec::new();
    let mut marked = 0u64;

    for chunk in exposure_store::store::chunk_query_in(&recipient_ids) {
        let mut users_by_notification_id = std::collections::HashMap::new();
        for recipient_id in chunk {
            if let Some(user) = store.get_user_by_hashed_notification_id(recipient_id)? {
                users_by_notification_id.insert(recipient_id.clone(), user);
            }
        }

        for (id, mut notification) in targets
            .iter()
            .filter(|(_, n)| chunk.contains(&n.recipient_id))
            .cloned()
        {
            if notification.deleted_at.is_some() {
                continue;
            }
            notification.deleted_at = Some(now);
            notification.updated_at = now;
            store.update_notification(&id, &notification)?;
            marked += 1;

            if let Some(user) = users_by_notification_id.get(&notification.recipient_id) {
                if let Some(token) = &user.fcm_token {
                    fcm.add(PendingPush {
                        token: token.clone(),
                        notification_id: id,
                        kind: NotificationKind::ReportDeleted,
                    })?;
                    push_owners.push(user.uid.clone());
                }
            }
        }
    }

    let mut push_outcome = fcm.send(dispatcher).await?;
    for &idx in &push_outcome.invalid_token_indices {
        store.clear_fcm_token(&push_owners[idx])?;
    }

    store.delete_report(report_id)?;

    Ok(RetractionResult {
        notifications_marked: marked,
        push_outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use exposure_core::hashing::{hash_interaction, hash_notification};
    use exposure_core::types::{Interaction, PrivacyLevel, TestResult, User};
    use exposure_push::MockDispatcher;
    use exposure_store::MemStore;

    fn user(uid: &str) -> User {
        User {
            uid: uid.to_string(),
            anonymous_id: uid.to_string(),
            username: Some(uid.to_string()),
            created_at: 0,
            fcm_token: Some(format!("tok-{uid}")),
            hashed_interaction_id: hash_interaction(uid).to_hex(),
            hashed_notification_id: hash_notification(uid).to_hex(),
        }
    }

    fn edge(store: &MemStore, owner: &str, partner: &str, at: i64) {
        store
            .put_interaction(&Interaction {
                owner_id: hash_interaction(owner).to_hex(),
                partner_anonymous_id: hash_interaction(partner).to_hex(),
                partner_username_snapshot: None,
                recorded_at: at,
            })
            .unwrap();
    }

    fn positive_report(reporter: &str) -> Report {
        Report {
            reporter_id: format!("r-{reporter}"),
            reporter_interaction_hashed_id: hash_interaction(reporter).to_hex(),
            reporter_notification_hashed_id: hash_notification(reporter).to_hex(),
            sti_types: vec![Sti::Hiv],
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
    async fn two_hop_exposure_creates_notifications_with_expected_hop_depths() {
        let store = MemStore::new();
        for u in ["a", "b", "c"] {
            store.put_user(&user(u)).unwrap();
        }
        edge(&store, "b", "a", 1_000_000_000 - 3 * exposure_core::time::DAY_MS);
        edge(&store, "c", "b", 1_000_000_000 - 2 * exposure_core::time::DAY_MS);

        let report = positive_report("a");
        store.put_report("report-1", &report).unwrap();

        let dispatcher = MockDispatcher::new();
        let result = process_positive_report(store.as_ref(), &dispatcher, "report-1", 1_000_000_000 + 10_000)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.notifications_created, 2);

        let b_notification = store
            .get_notification_by_recipient_report(&hash_notification("b").to_hex(), "report-1")
            .unwrap()
            .unwrap()
            .1;
        assert_eq!(b_notification.hop_depth, 1);
        assert!(b_notification.check_invariants());

        let c_notification = store
            .get_notification_by_recipient_report(&hash_notification("c").to_hex(), "report-1")
            .unwrap()
            .unwrap()
            .1;
        assert_eq!(c_notification.hop_depth, 2);
        assert!(c_notification.check_invariants());

        let refreshed = store.get_report("report-1").unwrap().unwrap();
        assert_eq!(refreshed.status, ReportStatus::Completed);
    }

    #[tokio::test]
    async fn unidirectional_gate_yields_zero_notifications() {
        let store = MemStore::new();
        for u in ["a", "b"] {
            store.put_user(&user(u)).unwrap();
        }
        edge(&store, "b", "a", 1_000_000_000);
        let report = positive_report("b");
        store.put_report("report-1", &report).unwrap();

        let dispatcher = MockDispatcher::new();
        let result = process_positive_report(store.as_ref(), &dispatcher, "report-1", 1_000_000_000 + 10_000)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(result.notifications_created, 0);
    }

    #[tokio::test]
    async fn reprocessing_a_completed_report_is_a_no_op() {
        let store = MemStore::new();
        store.put_user(&user("a")).unwrap();
        store.put_user(&user("b")).unwrap();
        edge(&store, "b", "a", 1_000_000_000);
        let report = positive_report("a");
        store.put_report("report-1", &report).unwrap();

        let dispatcher = MockDispatcher::new();
        process_positive_report(store.as_ref(), &dispatcher, "report-1", 1_000_000_000 + 10_000)
            .await
            .unwrap();
        let second = process_positive_report(store.as_ref(), &dispatcher, "report-1", 1_000_000_000 + 20_000)
            .await
            .unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn retraction_soft_deletes_without_removing_the_document() {
        let store = MemStore::new();
        store.put_user(&user("a")).unwrap();
        store.put_user(&user("b")).unwrap();
        edge(&store, "b", "a", 1_000_000_000);
        let report = positive_report("a");
        store.put_report("report-1", &report).unwrap();

        let dispatcher = MockDispatcher::new();
        process_positive_report(store.as_ref(), &dispatcher, "report-1", 1_000_000_000 + 10_000)
            .await
            .unwrap();

        let (notif_id, _) = store
            .get_notification_by_recipient_report(&hash_notification("b").to_hex(), "report-1")
            .unwrap()
            .unwrap();

        process_retraction(store.as_ref(), &dispatcher, "report-1", 2_000_000_000)
            .await
            .unwrap();

        let notification = store.get_notification(&notif_id).unwrap().unwrap();
        assert_eq!(notification.deleted_at, Some(2_000_000_000));
        assert!(store.get_report("report-1").unwrap().is_none());
    }

    #[tokio::test]
    async fn negative_report_clears_downstream_intermediary_node() {
        let store = MemStore::new();
        for u in ["a", "b", "c"] {
            store.put_user(&user(u)).unwrap();
        }
        edge(&store, "b", "a", 1_000_000_000 - 3 * exposure_core::time::DAY_MS);
        edge(&store, "c", "b", 1_000_000_000 - 2 * exposure_core::time::DAY_MS);
        let report = positive_report("a");
        store.put_report("report-1", &report).unwrap();
        let dispatcher = MockDispatcher::new();
        process_positive_report(store.as_ref(), &dispatcher, "report-1", 1_000_000_000 + 10_000)
            .await
            .unwrap();

        let negative = Report {
            reporter_id: "r-b".into(),
            reporter_interaction_hashed_id: hash_interaction("b").to_hex(),
            reporter_notification_hashed_id: hash_notification("b").to_hex(),
            sti_types: vec![Sti::Hiv],
            test_date: 1_000_000_000,
            privacy_level: PrivacyLevel::Anonymous,
            test_result: TestResult::Negative,
            reported_at: 1_000_000_000 + 20_000,
            status: ReportStatus::Pending,
            linked_report_id: None,
            notification_id: None,
            processed_at: None,
            error: None,
        };
        store.put_report("report-2", &negative).unwrap();
        process_negative_report(store.as_ref(), &dispatcher, "report-2", 1_000_000_000 + 30_000)
            .await
            .unwrap();

        let c_notification = store
            .get_notification_by_recipient_report(&hash_notification("c").to_hex(), "report-1")
            .unwrap()
            .unwrap()
            .1;
        assert_eq!(c_notification.chain_data.nodes[1].test_status, TestStatus::Negative);
    }
}
