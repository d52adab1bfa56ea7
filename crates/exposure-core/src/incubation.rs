//! Per-STI incubation windows.

use crate::time::{now_ms, DAY_MS, RETENTION_MS};
use crate::types::Sti;

/// Maximum incubation period, in days, for a single STI.
pub fn max_incubation_days(sti: Sti) -> u32 {
    match sti {
        Sti::Hiv => 30,
        Sti::Syphilis => 90,
        Sti::Gonorrhea => 14,
        Sti::Chlamydia => 21,
        Sti::Hpv => 180,
        Sti::Herpes => 21,
        Sti::Other => 30,
    }
}

/// The effective incubation for a multi-STI report is the max across the
/// reported set. An empty set has no defined incubation; callers must reject
/// empty `stiTypes` before reaching here.
pub fn effective_incubation_days(stis: &[Sti]) -> Option<u32> {
    stis.iter().copied().map(max_incubation_days).max()
}

/// The rolling exposure window for an interaction recorded at `interaction_at_ms`,
/// given an effective incubation of `incubation_days`, intersected with the
/// retention horizon and the present time.
///
/// `[max(t - d*day, now - 180*day), min(t + d*day, now)]`
pub fn exposure_window(interaction_at_ms: i64, incubation_days: u32) -> (i64, i64) {
    exposure_window_at(interaction_at_ms, incubation_days, now_ms())
}

/// As [`exposure_window`] but with an injectable `now`, for deterministic tests.
pub fn exposure_window_at(interaction_at_ms: i64, incubation_days: u32, now: i64) -> (i64, i64) {
    let span = incubation_days as i64 * DAY_MS;
    let retention_floor = now - RETENTION_MS;
    let window_start = (interaction_at_ms - span).max(retention_floor);
    let window_end = (interaction_at_ms + span).min(now);
    (window_start, window_end)
}
