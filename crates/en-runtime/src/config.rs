//! # Runtime Configuration
//!
//! Process-level settings loaded from the environment. Pipeline tunables
//! (quota caps, refresh windows, scoring floors) live in
//! [`en_pipeline::PipelineConfig`] and keep their defaults here; this module
//! only decides where the runtime keeps its data and how often the scheduler
//! fires.

use std::path::PathBuf;
use std::time::Duration;

use en_pipeline::QuotaRegime;
use tracing::warn;

/// Runtime settings for the `en-client` binary.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Path of the persistent key-value store file.
    pub store_path: PathBuf,
    /// Directory holding downloaded key set blobs.
    pub blob_dir: PathBuf,
    /// Directory the distribution adapter serves manifest, configuration,
    /// and key set files from.
    pub distribution_dir: PathBuf,
    /// Scratch directory downloads are staged into before adoption.
    pub staging_dir: PathBuf,
    /// How often the background scheduler runs a pipeline cycle.
    pub check_interval: Duration,
    /// Which platform rate-limiting regime the quota tracker enforces.
    pub quota_regime: QuotaRegime,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("data/en-store.bin"),
            blob_dir: PathBuf::from("data/keysets"),
            distribution_dir: PathBuf::from("data/distribution"),
            staging_dir: PathBuf::from("data/staging"),
            check_interval: Duration::from_secs(15 * 60),
            quota_regime: QuotaRegime::DailyCallCount,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from the environment, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("EN_STORE_PATH") {
            config.store_path = PathBuf::from(path);
        }
        if let Ok(dir) = std::env::var("EN_BLOB_DIR") {
            config.blob_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("EN_DISTRIBUTION_DIR") {
            config.distribution_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("EN_STAGING_DIR") {
            config.staging_dir = PathBuf::from(dir);
        }
        if let Ok(secs) = std::env::var("EN_CHECK_INTERVAL_SECS") {
            if let Ok(s) = secs.parse() {
                config.check_interval = Duration::from_secs(s);
            } else {
                warn!("EN_CHECK_INTERVAL_SECS must be a number of seconds");
            }
        }
        if let Ok(regime) = std::env::var("EN_QUOTA_REGIME") {
            if let Some(parsed) = parse_quota_regime(&regime) {
                config.quota_regime = parsed;
            } else {
                warn!("EN_QUOTA_REGIME must be \"file-count\" or \"call-count\"");
            }
        }

        config
    }
}

/// Parse the regime names accepted in `EN_QUOTA_REGIME`.
pub fn parse_quota_regime(value: &str) -> Option<QuotaRegime> {
    match value.trim().to_ascii_lowercase().as_str() {
        "file-count" | "file_count" => Some(QuotaRegime::DailyFileCount),
        "call-count" | "call_count" => Some(QuotaRegime::DailyCallCount),
        _ => None,
    }
}
