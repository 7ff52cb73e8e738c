//! # Detection Pipeline
//!
//! The run that feeds unprocessed key sets to the matching engine and turns
//! its answer into an exposure report. Step order is load-bearing: selection,
//! then quota charge, then the engine call, then persistence, then report
//! building, then blob cleanup. Later steps rely on side effects of earlier
//! ones.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use en_storage::{BlobStore, StateStore};
use shared_types::engine::DetectionSummary;
use shared_types::entities::{ExposureReport, KeySetHolder, PipelineState};
use shared_types::errors::{EngineError, ExposureError};
use shared_types::keys;
use shared_types::time::{days_between, Timestamp};
use shared_types::Clock;

use crate::application::QuotaTracker;
use crate::config::PipelineConfig;
use crate::domain::quota::CallContext;
use crate::domain::results::{merge_results, partition_by_files, select_fifo, HolderResult};
use crate::domain::risk::last_day_above_minimum_score;
use crate::ports::{ExposureEngine, UserNotification, UserNotifier};

/// Runs the detection pipeline over stored holders.
pub struct DetectionService {
    store: StateStore,
    blobs: BlobStore,
    engine: Arc<dyn ExposureEngine>,
    notifier: Arc<dyn UserNotifier>,
    quota: Arc<QuotaTracker>,
    clock: Arc<dyn Clock>,
    config: PipelineConfig,
}

impl DetectionService {
    pub fn new(
        store: StateStore,
        blobs: BlobStore,
        engine: Arc<dyn ExposureEngine>,
        notifier: Arc<dyn UserNotifier>,
        quota: Arc<QuotaTracker>,
        clock: Arc<dyn Clock>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            blobs,
            engine,
            notifier,
            quota,
            clock,
            config,
        }
    }

    /// One detection run. Recoverable engine trouble is handled internally
    /// and still counts as success; only an unusable engine fails the run.
    pub async fn run(&self, context: CallContext) -> Result<(), ExposureError> {
        let run_id = Uuid::new_v4();
        let now = self.clock.now();

        let holders = self
            .store
            .read(keys::KEY_SET_HOLDERS)
            .await?
            .unwrap_or_default();
        let unprocessed: Vec<KeySetHolder> =
            holders.iter().filter(|h| !h.processed()).cloned().collect();
        let (valid, missing) =
            partition_by_files(unprocessed, |holder| self.blobs.has_blobs(holder));
        if !missing.is_empty() {
            warn!(
                run = %run_id,
                count = missing.len(),
                "[detection] holders without files on disk, dropping for re-download"
            );
        }
        let mut results: Vec<HolderResult> =
            missing.into_iter().map(HolderResult::invalid).collect();

        let calls_left = self.quota.calls_remaining(context).await?;
        let key_sets_left = self.quota.key_sets_remaining(&holders);
        let (selected, skipped) = select_fifo(valid, key_sets_left);
        results.extend(skipped.into_iter().map(HolderResult::unprocessed));

        if selected.is_empty() || calls_left == 0 {
            debug!(run = %run_id, calls_left, "[detection] nothing to process this run");
            results.extend(selected.into_iter().map(HolderResult::unprocessed));
            self.persist_results(&results).await?;
            self.store.write(keys::LAST_PROCESSING_ATTEMPT, &now).await?;
            self.cleanup_blobs(&results);
            return Ok(());
        }

        // Quota is charged before the engine sees anything; a crash between
        // the two wastes budget instead of overdrawing it.
        self.quota.record_call(context).await?;

        let risk_configuration = self
            .store
            .read(keys::RISK_CONFIGURATION)
            .await?
            .unwrap_or_default();
        let files: Vec<PathBuf> = selected
            .iter()
            .filter_map(|holder| self.blobs.blob_paths(holder))
            .flat_map(|(sig, bin)| [sig, bin])
            .collect();

        info!(
            run = %run_id,
            key_sets = selected.len(),
            "[detection] invoking matching engine"
        );
        let summary = match self.engine.detect_exposures(&risk_configuration, &files).await {
            Ok(summary) => {
                results.extend(
                    selected
                        .iter()
                        .cloned()
                        .map(|holder| HolderResult::processed(holder, now)),
                );
                summary
            }
            Err(engine_error) => {
                if let Some(fatal) = engine_error.fatal() {
                    warn!(
                        run = %run_id,
                        error = %engine_error,
                        "[detection] engine unusable, aborting run"
                    );
                    return Err(fatal);
                }
                self.recover_from_engine_error(&engine_error).await?;
                results.extend(selected.iter().cloned().map(HolderResult::invalid));
                None
            }
        };

        self.persist_results(&results).await?;

        let report_outcome = match &summary {
            Some(summary) => self.build_report(summary, context, now).await,
            None => Ok(()),
        };

        self.store.write(keys::LAST_PROCESSING_ATTEMPT, &now).await?;
        self.cleanup_blobs(&results);
        report_outcome
    }

    /// Expected engine trouble: the batch is invalidated for retry, and after
    /// a signature rejection the next acquisition cycle is routed to the
    /// fallback endpoint.
    async fn recover_from_engine_error(&self, error: &EngineError) -> Result<(), ExposureError> {
        warn!(
            %error,
            "[detection] engine rejected batch, key sets will be re-downloaded"
        );
        if *error == EngineError::SignatureValidation {
            let mut guard = self.store.exclusive().await;
            let mut state: PipelineState = guard.read(keys::PIPELINE_STATE)?.unwrap_or_default();
            state.use_fallback_endpoint = true;
            guard.write(keys::PIPELINE_STATE, &state)?;
        }
        Ok(())
    }

    /// Steps after a successful engine call: score the windows, apply the
    /// staleness, migration, and de-duplication rules, persist the report,
    /// notify the user.
    async fn build_report(
        &self,
        summary: &DetectionSummary,
        context: CallContext,
        now: Timestamp,
    ) -> Result<(), ExposureError> {
        let windows = match self.engine.exposure_windows(summary).await {
            Ok(windows) => windows,
            Err(engine_error) => {
                if let Some(fatal) = engine_error.fatal() {
                    return Err(fatal);
                }
                warn!(
                    error = %engine_error,
                    "[detection] could not expand windows, skipping report"
                );
                return Ok(());
            }
        };

        let risk_configuration = self
            .store
            .read(keys::RISK_CONFIGURATION)
            .await?
            .unwrap_or_default();
        let Some(exposure_day) = last_day_above_minimum_score(&windows, &risk_configuration)
        else {
            debug!("[detection] no day above minimum risk score");
            return Ok(());
        };

        let days_ago = days_between(exposure_day, now);
        if days_ago > self.config.exposure_validity_days {
            info!(days_ago, "[detection] exposure too old to act on, discarded");
            return Ok(());
        }

        let mut deliver: Option<u64> = None;
        {
            let mut guard = self.store.exclusive().await;
            let mut state: PipelineState = guard.read(keys::PIPELINE_STATE)?.unwrap_or_default();
            let previous = guard.read(keys::LATEST_EXPOSURE_REPORT)?;

            let already_known = !state.known_exposure_dates.insert(exposure_day);

            if state.ignore_first_v2_exposure {
                // The first hit after the engine upgrade duplicates what the
                // old version already showed. Remember the date, drop the
                // rest.
                state.ignore_first_v2_exposure = false;
                guard.write(keys::PIPELINE_STATE, &state)?;
                info!("[detection] suppressed first post-upgrade exposure");
                return Ok(());
            }
            guard.write(keys::PIPELINE_STATE, &state)?;

            let superseded = previous.is_some_and(|report| report.date >= exposure_day);
            if !already_known && !superseded {
                deliver = Some(days_ago);
            }

            // Monotonic advance: an older date never overwrites a newer one.
            if previous.map_or(true, |report| report.date < exposure_day) {
                guard.write(
                    keys::LATEST_EXPOSURE_REPORT,
                    &ExposureReport { date: exposure_day },
                )?;
            }
        }

        let Some(days_ago) = deliver else {
            debug!("[detection] exposure already known or superseded, not notifying");
            return Ok(());
        };

        if !self.notifier.is_authorized().await {
            return Err(ExposureError::internal(
                "exposure notification blocked: notifications not authorized",
            ));
        }
        if let Err(error) = self
            .notifier
            .notify(UserNotification::ExposureDetected { days_ago })
            .await
        {
            warn!(%error, "[detection] notification delivery failed");
        }
        if context == CallContext::Background {
            self.store.write(keys::UNSEEN_EXPOSURE_DATE, &now).await?;
        }
        info!(days_ago, "[detection] exposure report surfaced");
        Ok(())
    }

    /// Merge per-run results into the stored collection: untouched holders
    /// stay, invalid ones are dropped so the next cycle re-downloads them.
    async fn persist_results(&self, results: &[HolderResult]) -> Result<(), ExposureError> {
        let mut guard = self.store.exclusive().await;
        let stored = guard.read(keys::KEY_SET_HOLDERS)?.unwrap_or_default();
        let merged = merge_results(stored, results);
        guard.write(keys::KEY_SET_HOLDERS, &merged)?;
        Ok(())
    }

    /// Blob files of every key set this run consumed, successfully or not,
    /// are deleted; unselected holders keep theirs for the next cycle.
    fn cleanup_blobs(&self, results: &[HolderResult]) {
        for result in results.iter().filter(|r| r.consumed_blobs()) {
            self.blobs.remove_blobs(&result.holder);
        }
    }
}
