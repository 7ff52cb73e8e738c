//! # Service Wiring
//!
//! Builds the full service graph over a store and a set of collaborators.
//! The pipeline services only meet each other here and in the tests; nothing
//! inside the pipeline knows the concrete adapter types.

use std::sync::Arc;

use en_pipeline::ports::outbound::{DistributionClient, ExposureEngine, UserNotifier};
use en_pipeline::{
    AcquisitionService, DetectionService, ManifestService, PipelineConfig, QuotaRegime,
    QuotaTracker, RetryQueueService, UploadService,
};
use en_storage::{BlobStore, StateStore};
use shared_types::time::Clock;

use crate::controller::ExposureController;

/// Everything the service graph is built from.
pub struct Collaborators {
    pub store: StateStore,
    pub blobs: BlobStore,
    pub client: Arc<dyn DistributionClient>,
    pub engine: Arc<dyn ExposureEngine>,
    pub notifier: Arc<dyn UserNotifier>,
    pub clock: Arc<dyn Clock>,
    pub quota_regime: QuotaRegime,
    pub config: PipelineConfig,
}

/// Wire the pipeline services and hand back the controller that fronts them.
pub fn build_controller(collaborators: Collaborators) -> Arc<ExposureController> {
    let Collaborators {
        store,
        blobs,
        client,
        engine,
        notifier,
        clock,
        quota_regime,
        config,
    } = collaborators;

    let quota = Arc::new(QuotaTracker::new(
        store.clone(),
        Arc::clone(&clock),
        quota_regime,
        config.clone(),
    ));
    let manifest = Arc::new(ManifestService::new(
        store.clone(),
        Arc::clone(&client),
        Arc::clone(&clock),
        config.clone(),
    ));
    let acquisition = Arc::new(AcquisitionService::new(
        store.clone(),
        blobs.clone(),
        Arc::clone(&client),
        Arc::clone(&clock),
        config.clone(),
    ));
    let detection = Arc::new(DetectionService::new(
        store.clone(),
        blobs,
        engine,
        Arc::clone(&notifier),
        quota,
        Arc::clone(&clock),
        config.clone(),
    ));
    let uploads = Arc::new(UploadService::new(
        store.clone(),
        Arc::clone(&client),
        Arc::clone(&clock),
    ));
    let retry_queue = Arc::new(RetryQueueService::new(
        store.clone(),
        client,
        notifier,
        clock,
        config,
    ));

    Arc::new(ExposureController::new(
        store,
        manifest,
        acquisition,
        detection,
        uploads,
        retry_queue,
    ))
}
