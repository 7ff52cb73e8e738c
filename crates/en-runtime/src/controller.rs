//! # Exposure Controller
//!
//! The facade the embedding application and the scheduler call into. One
//! instance owns the pipeline services and guarantees that at most one
//! pipeline cycle runs at a time: a caller arriving while a cycle is in
//! flight is handed the running cycle's outcome instead of starting a
//! second one.
//!
//! The controller also runs what has to happen before the first cycle of a
//! process: first-launch initialization and version-upgrade migrations.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::{debug, info};

use en_pipeline::{
    AcquisitionService, CallContext, DetectionService, ManifestService, RetryQueueService,
    UploadService,
};
use en_storage::StateStore;
use shared_types::entities::{DiagnosisKey, LabConfirmationKey, PipelineState};
use shared_types::errors::ExposureError;
use shared_types::keys;

/// A pipeline cycle all concurrent callers can await together.
type SharedCycle = Shared<BoxFuture<'static, Result<(), ExposureError>>>;

/// Entry point for everything the client core does.
pub struct ExposureController {
    store: StateStore,
    manifest: Arc<ManifestService>,
    acquisition: Arc<AcquisitionService>,
    detection: Arc<DetectionService>,
    uploads: Arc<UploadService>,
    retry_queue: Arc<RetryQueueService>,
    in_flight: Mutex<Option<SharedCycle>>,
}

impl ExposureController {
    pub fn new(
        store: StateStore,
        manifest: Arc<ManifestService>,
        acquisition: Arc<AcquisitionService>,
        detection: Arc<DetectionService>,
        uploads: Arc<UploadService>,
        retry_queue: Arc<RetryQueueService>,
    ) -> Self {
        Self {
            store,
            manifest,
            acquisition,
            detection,
            uploads,
            retry_queue,
            in_flight: Mutex::new(None),
        }
    }

    /// First-launch initialization and upgrade migrations. Runs before the
    /// first pipeline cycle of a process; calling it again is harmless.
    pub async fn initialize(&self) -> Result<(), ExposureError> {
        let current_version = env!("CARGO_PKG_VERSION");
        let mut guard = self.store.exclusive().await;

        if !guard.read(keys::FIRST_RUN_COMPLETED)?.unwrap_or(false) {
            if guard.read(keys::PIPELINE_STATE)?.is_none() {
                guard.write(keys::PIPELINE_STATE, &PipelineState::default())?;
            }
            guard.write(keys::FIRST_RUN_COMPLETED, &true)?;
            info!("[controller] first run initialized");
        }

        let previous_version = guard.read(keys::LAST_RAN_VERSION)?;
        if let Some(previous) = &previous_version {
            if crossed_engine_boundary(previous, current_version) {
                let mut state = guard.read(keys::PIPELINE_STATE)?.unwrap_or_default();
                state.ignore_first_v2_exposure = true;
                guard.write(keys::PIPELINE_STATE, &state)?;
                info!(
                    from = %previous,
                    to = current_version,
                    "[controller] engine generation upgrade, arming first-exposure suppression"
                );
            }
        }
        if previous_version.as_deref() != Some(current_version) {
            guard.write(keys::LAST_RAN_VERSION, &current_version.to_owned())?;
        }
        Ok(())
    }

    /// One full pipeline cycle: manifest, configuration, risk parameters,
    /// key set acquisition, detection. Concurrent callers are coalesced onto
    /// the cycle already in flight and all receive its outcome.
    pub async fn update_and_process(&self, context: CallContext) -> Result<(), ExposureError> {
        let cycle = {
            let mut in_flight = self.in_flight.lock();
            match in_flight.as_ref() {
                // peek() answers once the cycle has finished; only a live
                // cycle may be joined.
                Some(active) if active.peek().is_none() => {
                    debug!("[controller] joining pipeline cycle already in flight");
                    active.clone()
                }
                _ => {
                    info!(?context, "[controller] starting pipeline cycle");
                    let fresh = Self::pipeline_cycle(
                        Arc::clone(&self.manifest),
                        Arc::clone(&self.acquisition),
                        Arc::clone(&self.detection),
                        context,
                    )
                    .boxed()
                    .shared();
                    *in_flight = Some(fresh.clone());
                    fresh
                }
            }
        };
        cycle.await
    }

    async fn pipeline_cycle(
        manifest: Arc<ManifestService>,
        acquisition: Arc<AcquisitionService>,
        detection: Arc<DetectionService>,
        context: CallContext,
    ) -> Result<(), ExposureError> {
        let current = manifest.manifest().await?;
        manifest.configuration(&current).await?;
        manifest.risk_configuration(&current).await?;
        acquisition.acquire(&current.key_set_identifiers).await?;
        detection.run(context).await
    }

    /// A lab confirmation key for the user to read to the health authority,
    /// reusing the stored one while it is still valid.
    pub async fn request_lab_confirmation_key(&self) -> Result<LabConfirmationKey, ExposureError> {
        self.uploads.lab_confirmation_key().await
    }

    /// Upload the user's diagnosis keys under the current confirmation key.
    /// A failed upload is queued for retries; see
    /// [`ExposureController::drain_pending_uploads`].
    pub async fn upload_diagnosis_keys(
        &self,
        diagnosis_keys: Vec<DiagnosisKey>,
    ) -> Result<(), ExposureError> {
        let confirmation_key = self.uploads.lab_confirmation_key().await?;
        self.uploads
            .upload_diagnosis_keys(diagnosis_keys, confirmation_key)
            .await
    }

    /// Retry queued uploads and expire the ones past their deadline.
    pub async fn drain_pending_uploads(&self) -> Result<(), ExposureError> {
        self.retry_queue.drain().await
    }
}

/// Whether moving from `previous` to `current` crosses the 2.0.0 engine
/// generation boundary. The platform engine changed matching behavior there,
/// and the first detection after the upgrade tends to re-find the previous
/// generation's last exposure.
fn crossed_engine_boundary(previous: &str, current: &str) -> bool {
    const ENGINE_GENERATION_BOUNDARY: (u64, u64, u64) = (2, 0, 0);
    parse_version(previous) < ENGINE_GENERATION_BOUNDARY
        && parse_version(current) >= ENGINE_GENERATION_BOUNDARY
}

/// Parse a `major.minor.patch` version string. Anything unparseable is
/// treated as predating every boundary.
fn parse_version(version: &str) -> (u64, u64, u64) {
    let mut parts = version.split('.').map(str::parse::<u64>);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(Ok(major)), Some(Ok(minor)), Some(Ok(patch))) => (major, minor, patch),
        _ => (0, 0, 0),
    }
}
