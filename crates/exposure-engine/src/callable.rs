//! Callable API (C10): the six authenticated entry points, taking a
//! [`CallerContext`] and a `serde_json::Value` input and returning a
//! `serde_json::Value` output, the same "untyped in, untyped out" shape the
//! platform's callable transport uses, with every field validated at this
//! boundary rather than trusted from the wire.
//!
//! `reportPositiveTest`'s chain-link detection and the mutation of the
//! reporter's own prior notifications (spec.md §4.9 step 3) happen here,
//! synchronously, because the callable must return `linkedReportId` in the
//! same round trip that creates the report. The heavier propagation (steps
//! 5-7) is left to [`crate::processor`], invoked asynchronously by
//! `exposure-daemon`'s trigger adapter.

use serde_json::{json, Value};

use exposure_core::hashing::{hash_chain, hash_report, HashDigest};
use exposure_core::time::{now_ms, RETENTION_MS};
use exposure_core::types::{NotificationKind, PrivacyLevel, RateLimitOp, Report, ReportStatus, Sti, TestResult};
use exposure_push::PushDispatcher;
use exposure_ratelimit::RateLimiter;
use exposure_store::{RateLimitDecision, Store};

use crate::chain::update_node_status;
use crate::error::EngineError;
use crate::processor::process_retraction;

/// The authenticated caller of a callable invocation.
#[derive(Clone, Debug)]
pub struct CallerContext {
    pub uid: String,
}

const MAX_STI_TYPES_BYTES: usize = 500;
const SAVED_ID_MIN_LEN: usize = 20;
const SAVED_ID_MAX_LEN: usize = 40;

fn require_rate_limit(limiter: &RateLimiter, uid: &str, op: RateLimitOp) -> Result<(), EngineError> {
    match limiter.check(uid, op) {
        RateLimitDecision::Allowed => Ok(()),
        RateLimitDecision::Rejected => Err(EngineError::RateLimited(format!(
            "{} limit exceeded for this hour",
            op.as_key_segment()
        ))),
    }
}

fn parse_sti_types(value: &Value) -> Result<Vec<Sti>, EngineError> {
    serde_json::from_value(value.clone())
        .map_err(|e| EngineError::InvalidArgument(format!("invalid stiTypes: {e}")))
}

fn intersect(a: &[Sti], b: &[Sti]) -> Vec<Sti> {
    let b_set: std::collections::HashSet<Sti> = b.iter().copied().collect();
    a.iter().copied().filter(|s| b_set.contains(s)).collect()
}

/// `reportPositiveTest`.
pub fn report_positive_test(
    store: &dyn Store,
    limiter: &RateLimiter,
    ctx: &CallerContext,
    input: &Value,
) -> Result<Value, EngineError> {
    require_rate_limit(limiter, &ctx.uid, RateLimitOp::PositiveReport)?;

    let sti_types_value = input
        .get("stiTypes")
        .ok_or_else(|| EngineError::InvalidArgument("stiTypes is required".into()))?;
    let sti_types = parse_sti_types(sti_types_value)?;
    if sti_types.is_empty() {
        return Err(EngineError::InvalidArgument("stiTypes must not be empty".into()));
    }
    if serde_json::to_vec(&sti_types).map(|b| b.len()).unwrap_or(usize::MAX) > MAX_STI_TYPES_BYTES {
        return Err(EngineError::InvalidArgument("stiTypes exceeds 500 bytes".into()));
    }

    let test_date = input
        .get("testDate")
        .and_then(Value::as_i64)
        .ok_or_else(|| EngineError::InvalidArgument("testDate is required".into()))?;
    let now = now_ms();
    if test_date > now {
        return Err(EngineError::InvalidArgument("testDate may not be in the future".into()));
    }
    if test_date <= now - RETENTION_MS {
        return Err(EngineError::InvalidArgument("testDate is older than the retention horizon".into()));
    }

    let privacy_level = match input.get("privacyLevel") {
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| EngineError::InvalidArgument(format!("invalid privacyLevel: {e}")))?,
        None => PrivacyLevel::Full,
    };

    let reporter = store
        .get_user(&ctx.uid)?
        .ok_or_else(|| EngineError::NotFound("reporter does not exist".into()))?;

    let target_hash = hash_chain(HashDigest::from_hex(&reporter.hashed_interaction_id).expect("stored H_I is valid hex")).to_hex();
    let consolidated = store.query_notifications_by_recipient(&reporter.hashed_notification_id)?;

    let mut linked_report_id: Option<String> = None;
    let mut linked_received_at = i64::MIN;
    for (id, mut notification) in consolidated {
        if notification.kind != NotificationKind::Exposure {
            continue;
        }
        let Some(existing_sti) = &notification.sti_type else {
            continue;
        };
        let overlap = intersect(existing_sti, &sti_types);
        if overlap.is_empty() {
            continue;
        }
        if notification.received_at > linked_received_at {
            linked_received_at = notification.received_at;
            linked_report_id = Some(notification.report_id.clone());
        }

        update_node_status(&mut notification, &target_hash, exposure_core::types::TestStatus::Positive, Some(&overlap));
        notification.updated_at = now;
        store.update_notification(&id, &notification)?;
    }

    let report = Report {
        reporter_id: hash_report(&ctx.uid).to_hex(),
        reporter_interaction_hashed_id: reporter.hashed_interaction_id.clone(),
        reporter_notification_hashed_id: reporter.hashed_notification_id.clone(),
        sti_types,
        test_date,
        privacy_level,
        test_result: TestResult::Positive,
        reported_at: now,
        status: ReportStatus::Pending,
        linked_report_id: linked_report_id.clone(),
        notification_id: None,
        processed_at: None,
        error: None,
    };
    let report_id = store.new_id();
    store.put_report(&report_id, &report)?;

    Ok(json!({ "reportId": report_id, "linkedReportId": linked_report_id }))
}

/// `reportNegativeTest`.
pub fn report_negative_test(
    store: &dyn Store,
    limiter: &RateLimiter,
    ctx: &CallerContext,
    input: &Value,
) -> Result<Value, EngineError> {
    require_rate_limit(limiter, &ctx.uid, RateLimitOp::NegativeTest)?;

    let sti_types = match input.get("stiType") {
        Some(v) if !v.is_null() => parse_sti_types(v)?,
        _ => Vec::new(),
    };
    let notification_id = input
        .get("notificationId")
        .and_then(Value::as_str)
        .map(str::to_string);

    let reporter = store
        .get_user(&ctx.uid)?
        .ok_or_else(|| EngineError::NotFound("reporter does not exist".into()))?;

    let now = now_ms();
    let report = Report {
        reporter_id: hash_report(&ctx.uid).to_hex(),
        reporter_interaction_hashed_id: reporter.hashed_interaction_id.clone(),
        reporter_notification_hashed_id: reporter.hashed_notification_id.clone(),
        sti_types,
        test_date: now,
        privacy_level: PrivacyLevel::Anonymous,
        test_result: TestResult::Negative,
        reported_at: now,
        status: ReportStatus::Pending,
        linked_report_id: None,
        notification_id,
        processed_at: None,
        error: None,
    };
    let report_id = store.new_id();
    store.put_report(&report_id, &report)?;

    Ok(json!({ "reportId": report_id }))
}

/// `getChainLinkInfo`: pure read, no rate limit (not one of §4.5's four
/// limited operations).
pub fn get_chain_link_info(store: &dyn Store, ctx: &CallerContext, input: &Value) -> Result<Value, EngineError> {
    let sti_filter = match input.get("stiType") {
        Some(v) if !v.is_null() => Some(parse_sti_types(v)?),
        _ => None,
    };

    let reporter = store
        .get_user(&ctx.uid)?
        .ok_or_else(|| EngineError::NotFound("caller does not exist".into()))?;

    let consolidated = store.query_notifications_by_recipient(&reporter.hashed_notification_id)?;
    let mut linked_report_id: Option<String> = None;
    let mut linked_received_at = i64::MIN;
    for (_, notification) in consolidated {
        if notification.kind != NotificationKind::Exposure {
            continue;
        }
        let Some(existing_sti) = &notification.sti_type else {
            continue;
        };
        let matches = match &sti_filter {
            Some(filter) => !intersect(existing_sti, filter).is_empty(),
            None => true,
        };
        if !matches {
            continue;
        }
        if notification.received_at > linked_received_at {
            linked_received_at = notification.received_at;
            linked_report_id = Some(notification.report_id.clone());
        }
    }

    Ok(json!({
        "hasExistingNotification": linked_report_id.is_some(),
        "linkedReportId": linked_report_id,
    }))
}

/// `deleteExposureReport`.
pub async fn delete_exposure_report<D: PushDispatcher>(
    store: &dyn Store,
    dispatcher: &D,
    ctx: &CallerContext,
    input: &Value,
) -> Result<Value, EngineError> {
    let report_id = input
        .get("reportId")
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::InvalidArgument("reportId is required".into()))?;

    let report = store
        .get_report(report_id)?
        .ok_or_else(|| EngineError::NotFound(format!("report {report_id} not found")))?;
    if report.reporter_id != hash_report(&ctx.uid).to_hex() {
        return Err(EngineError::PermissionDenied("caller does not own this report".into()));
    }

    let now = now_ms();
    let result = process_retraction(store, dispatcher, report_id, now).await?;

    Ok(json!({ "reportId": report_id, "notificationsMarked": result.notifications_marked }))
}

fn is_valid_saved_id(saved_id: &str) -> bool {
    (SAVED_ID_MIN_LEN..=SAVED_ID_MAX_LEN).contains(&saved_id.len())
        && saved_id.chars().all(|c| c.is_ascii_alphanumeric())
}

/// `recoverAccount`.
///
/// Minting a real platform auth token is out of this crate's scope (no
/// identity-provider client is part of the dependency stack); the token
/// returned here is a deterministic, non-secret placeholder derived from
/// `savedId`. See `DESIGN.md` for why this boundary was drawn here.
pub fn recover_account(
    store: &dyn Store,
    limiter: &RateLimiter,
    ctx: &CallerContext,
    input: &Value,
) -> Result<Value, EngineError> {
    require_rate_limit(limiter, &ctx.uid, RateLimitOp::AccountRecovery)?;

    let saved_id = input
        .get("savedId")
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::InvalidArgument("savedId is required".into()))?;
    if !is_valid_saved_id(saved_id) {
        return Err(EngineError::InvalidArgument(
            "savedId must be 20-40 alphanumeric characters".into(),
        ));
    }

    store
        .get_user(saved_id)?
        .ok_or_else(|| EngineError::NotFound("no account for this savedId".into()))?;

    let token = format!("recovery:{}", hash_report(saved_id).to_hex());
    Ok(json!({ "token": token }))
}

/// `exportUserData`: the GDPR export, returning the user record plus every
/// interaction, notification, and report naming them.
pub fn export_user_data(store: &dyn Store, limiter: &RateLimiter, ctx: &CallerContext) -> Result<Value, EngineError> {
    require_rate_limit(limiter, &ctx.uid, RateLimitOp::DataExport)?;

    let user = store
        .get_user(&ctx.uid)?
        .ok_or_else(|| EngineError::NotFound("caller does not exist".into()))?;

    let interactions = store.query_interactions_involving(&user.hashed_interaction_id)?;
    let notifications = store.query_notifications_by_recipient(&user.hashed_notification_id)?;
    let reports = store.query_reports_by_reporter(&hash_report(&ctx.uid).to_hex())?;

    Ok(json!({
        "user": user,
        "interactions": interactions,
        "notifications": notifications.into_iter().map(|(id, n)| json!({ "id": id, "notification": n })).collect::<Vec<_>>(),
        "reports": reports.into_iter().map(|(id, r)| json!({ "id": id, "report": r })).collect::<Vec<_>>(),
    }))
}
