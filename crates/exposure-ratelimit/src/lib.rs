//! Sliding-window per-`(uid, opKind)` request limiter.
//!
//! Generalized from the teacher's `membership::MembershipManager::check_rate_limit`
//! (an in-process `HashMap<PeerId, RateLimitState>` window, reset when
//! `now - window_start >= window`) into a store-transaction so the window
//! survives a daemon restart or a serverless cold start. Gossip peers
//! reconnect and rebuild state, so the teacher's variant can stay in-process;
//! an exposure-notification limiter cannot.

use std::sync::Arc;

use exposure_core::types::RateLimitOp;
use exposure_store::{RateLimitDecision, Store};

/// One hour, in milliseconds. The fixed window size for every operation kind.
pub const WINDOW_MS: i64 = 3_600_000;

/// Slack added to a window's `expiresAt` so a racing reader doesn't treat a
/// just-closed window as still-current.
pub const WINDOW_BUFFER_MS: i64 = 60_000;

/// A sliding-window limiter over a [`Store`]'s `rateLimits` collection.
pub struct RateLimiter {
    store: Arc<dyn Store>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Check and, if allowed, record one request for `(uid, op)` at `now`.
    ///
    /// Fails open: any store error already surfaces as `Allowed` from
    /// `Store::rate_limit_check` itself, so nothing here needs a fallback.
    /// Callers should still `warn!` on an unexpectedly high rejection
    /// rate, since a failed-open limiter degrades silently.
    pub fn check_at(&self, uid: &str, op: RateLimitOp, now: i64) -> RateLimitDecision {
        self.store.rate_limit_check(uid, op, now, WINDOW_MS, WINDOW_BUFFER_MS)
    }

    pub fn check(&self, uid: &str, op: RateLimitOp) -> RateLimitDecision {
        self.check_at(uid, op, exposure_core::time::now_ms())
    }
}
