//! # Quota Tracker
//!
//! Accounting for the matching engine's daily budgets. The platform grants
//! one of two regimes: a cap on key set files per day with free calls, or
//! per-bucket call caps with free files. Exceeding either disables matching
//! for the rest of the day, so the tracker always rounds down.

use std::sync::Arc;

use tracing::debug;

use en_storage::StateStore;
use shared_types::entities::KeySetHolder;
use shared_types::errors::ExposureError;
use shared_types::keys;
use shared_types::Clock;

use crate::config::PipelineConfig;
use crate::domain::quota::{
    bucket_remaining, processed_in_window, record, CallContext, QuotaRegime,
};

/// Tracks engine call and key set budgets over a rolling window.
pub struct QuotaTracker {
    store: StateStore,
    clock: Arc<dyn Clock>,
    regime: QuotaRegime,
    config: PipelineConfig,
}

impl QuotaTracker {
    pub fn new(
        store: StateStore,
        clock: Arc<dyn Clock>,
        regime: QuotaRegime,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            clock,
            regime,
            config,
        }
    }

    /// The active rate-limiting regime.
    pub fn regime(&self) -> QuotaRegime {
        self.regime
    }

    /// Engine calls left in the given context's bucket. Unbounded under the
    /// file-count regime. Never negative.
    pub async fn calls_remaining(&self, context: CallContext) -> Result<usize, ExposureError> {
        if self.regime == QuotaRegime::DailyFileCount {
            return Ok(usize::MAX);
        }

        let foreground = self
            .store
            .read(keys::FOREGROUND_CALL_LOG)
            .await?
            .unwrap_or_default();
        let background = self
            .store
            .read(keys::BACKGROUND_CALL_LOG)
            .await?
            .unwrap_or_default();

        let now = self.clock.now();
        let window = self.config.quota_window_seconds;
        let remaining = match context {
            CallContext::Foreground => bucket_remaining(
                &foreground,
                &background,
                now,
                window,
                self.config.max_foreground_calls,
                self.config.combined_call_cap,
            ),
            CallContext::Background => bucket_remaining(
                &background,
                &foreground,
                now,
                window,
                self.config.max_background_calls,
                self.config.combined_call_cap,
            ),
        };
        debug!(?context, remaining, "[quota] calls remaining");
        Ok(remaining)
    }

    /// Key sets the engine will still accept today. Unbounded under the
    /// call-count regime.
    pub fn key_sets_remaining(&self, holders: &[KeySetHolder]) -> usize {
        if self.regime != QuotaRegime::DailyFileCount {
            return usize::MAX;
        }
        let processed = processed_in_window(
            holders,
            self.clock.now(),
            self.config.quota_window_seconds,
        );
        self.config.max_daily_key_sets.saturating_sub(processed)
    }

    /// Charge one engine call to the given context's bucket. Recorded under
    /// both regimes so a regime switch starts from honest books.
    pub async fn record_call(&self, context: CallContext) -> Result<(), ExposureError> {
        let (key, cap) = match context {
            CallContext::Foreground => {
                (keys::FOREGROUND_CALL_LOG, self.config.max_foreground_calls)
            }
            CallContext::Background => {
                (keys::BACKGROUND_CALL_LOG, self.config.max_background_calls)
            }
        };

        let mut guard = self.store.exclusive().await;
        let log = guard.read(key)?.unwrap_or_default();
        let updated = record(&log, self.clock.now(), cap);
        guard.write(key, &updated)?;
        Ok(())
    }
}
