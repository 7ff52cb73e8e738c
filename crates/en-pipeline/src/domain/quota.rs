//! # Quota Accounting
//!
//! Pure bookkeeping over lists of call timestamps. The platform enforces its
//! engine budgets with a hard lockout, so the accounting here must never be
//! optimistic: lists are pruned to the rolling window before being consulted,
//! subtraction saturates, and the legacy combined ceiling is checked next to
//! the per-bucket caps.

use shared_types::entities::KeySetHolder;
use shared_types::time::Timestamp;

/// Which platform rate-limiting regime is active. The two are mutually
/// exclusive, fixed per device capability at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaRegime {
    /// The engine caps how many key set files it processes per day; call
    /// counts are free.
    DailyFileCount,
    /// The engine caps how many times it may be called per day, split into
    /// foreground and background budgets.
    DailyCallCount,
}

/// Whether a pipeline run was initiated by the user or by the scheduler.
/// Selects the quota bucket and decides unseen-notification bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallContext {
    Foreground,
    Background,
}

/// Drop every timestamp older than `window` seconds before `now`.
pub fn prune_to_window(timestamps: &[Timestamp], now: Timestamp, window: u64) -> Vec<Timestamp> {
    let cutoff = now.saturating_sub(window);
    timestamps
        .iter()
        .copied()
        .filter(|&t| t >= cutoff)
        .collect()
}

/// Prepend a call at `now` and truncate to the bucket's cap. The list stays
/// newest-first so truncation drops the entries that will expire first
/// anyway.
pub fn record(timestamps: &[Timestamp], now: Timestamp, cap: usize) -> Vec<Timestamp> {
    let mut updated = Vec::with_capacity(timestamps.len() + 1);
    updated.push(now);
    updated.extend_from_slice(timestamps);
    updated.truncate(cap);
    updated
}

/// Calls left in one bucket, honoring the combined ceiling across both
/// buckets. Both lists must already belong to the same rolling window as
/// `now`.
pub fn bucket_remaining(
    bucket: &[Timestamp],
    other_bucket: &[Timestamp],
    now: Timestamp,
    window: u64,
    bucket_cap: usize,
    combined_cap: usize,
) -> usize {
    let bucket = prune_to_window(bucket, now, window);
    let other = prune_to_window(other_bucket, now, window);

    if bucket.len() + other.len() >= combined_cap {
        return 0;
    }
    bucket_cap.saturating_sub(bucket.len())
}

/// Holders handed to the engine within the rolling window.
pub fn processed_in_window(holders: &[KeySetHolder], now: Timestamp, window: u64) -> usize {
    let cutoff = now.saturating_sub(window);
    holders
        .iter()
        .filter(|h| matches!(h.process_date, Some(date) if date >= cutoff))
        .count()
}
