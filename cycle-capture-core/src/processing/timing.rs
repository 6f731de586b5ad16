//! Cycle-clock arithmetic for aligning captures to cycle boundaries.

use std::time::Duration;

/// Resolve the tempo to use, falling back to `default_cps` when the clock
/// reports nothing usable.
pub fn effective_cps(reported: Option<f64>, default_cps: f64) -> f64 {
    match reported {
        Some(cps) if cps.is_finite() && cps > 0.0 => cps,
        _ => default_cps,
    }
}

/// Length of one cycle in seconds.
pub fn cycle_period(cps: f64) -> f64 {
    1.0 / cps
}

/// Seconds of audio needed for `cycles` whole cycles.
pub fn target_duration(cycles: u32, cycle_period: f64) -> f64 {
    cycles as f64 * cycle_period
}

/// Time to wait from cycle position `now` until the next cycle boundary.
///
/// A position already on a boundary waits zero.
pub fn boundary_wait_secs(now: f64, cycle_period: f64) -> f64 {
    if !now.is_finite() {
        return 0.0;
    }
    ((now.ceil() - now) * cycle_period).max(0.0)
}

/// `None` when the wait does not fit in a `Duration`, e.g. for a vanishingly
/// small tempo.
pub fn boundary_wait(now: f64, cycle_period: f64) -> Option<Duration> {
    as_duration(boundary_wait_secs(now, cycle_period))
}

/// Seconds as a `Duration`, or `None` if negative, NaN or out of range.
pub fn as_duration(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs).ok()
}
