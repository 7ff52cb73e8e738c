//! # Pipeline Configuration
//!
//! Tunables of the client core. The quota caps mirror the platform engine's
//! documented limits; changing them does not lift the engine's own
//! enforcement, it only changes when we stop calling.

/// Configuration for the pipeline services.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Key sets the engine accepts per rolling 24 h window (file-count
    /// regime).
    pub max_daily_key_sets: usize,
    /// Foreground engine calls allowed per rolling 24 h window (call-count
    /// regime).
    pub max_foreground_calls: usize,
    /// Background engine calls allowed per rolling 24 h window (call-count
    /// regime).
    pub max_background_calls: usize,
    /// Combined foreground+background ceiling. Redundant with the bucket
    /// caps under current constants, enforced anyway.
    pub combined_call_cap: usize,
    /// Length of the rolling quota window, in seconds.
    pub quota_window_seconds: u64,
    /// Exposures older than this many days are not actionable.
    pub exposure_validity_days: u64,
    /// Manifest refresh frequency used before any configuration was fetched,
    /// in minutes.
    pub default_manifest_refresh_minutes: u32,
    /// Concurrent key set downloads within one acquisition batch.
    pub download_parallelism: usize,
    /// Support desk opening hour (UTC); failed-upload notifications outside
    /// opening hours are deferred to the next opening.
    pub support_desk_opens_hour: u8,
    /// Support desk closing hour (UTC).
    pub support_desk_closes_hour: u8,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_daily_key_sets: 15,
            max_foreground_calls: 9,
            max_background_calls: 6,
            combined_call_cap: 15,
            quota_window_seconds: 24 * 60 * 60,
            exposure_validity_days: 14,
            default_manifest_refresh_minutes: 240,
            download_parallelism: 4,
            support_desk_opens_hour: 8,
            support_desk_closes_hour: 20,
        }
    }
}
