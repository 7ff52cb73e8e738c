//! # Storage Key Catalog
//!
//! Every persisted entity lives under exactly one stable string key. The
//! catalog pairs each key with its value type at compile time, so a read can
//! never deserialize a value as the wrong entity.

use std::marker::PhantomData;

use crate::engine::RiskConfiguration;
use crate::entities::{
    ApplicationManifest, ExposureReport, KeySetHolder, LabConfirmationKey, PendingUploadRequest,
    PipelineState, StoredConfiguration,
};
use crate::time::Timestamp;

/// A stable storage key tagged with the type stored under it.
pub struct StorageKey<T> {
    name: &'static str,
    _value: PhantomData<fn() -> T>,
}

impl<T> StorageKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _value: PhantomData,
        }
    }

    /// The stable string key.
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for StorageKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for StorageKey<T> {}

impl<T> std::fmt::Debug for StorageKey<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("StorageKey").field(&self.name).finish()
    }
}

/// All key set holders, one entry per identifier.
pub const KEY_SET_HOLDERS: StorageKey<Vec<KeySetHolder>> = StorageKey::new("key_set_holders");

/// Global pipeline flags and the known-exposure-dates set.
pub const PIPELINE_STATE: StorageKey<PipelineState> = StorageKey::new("pipeline_state");

/// Most recent persisted exposure report.
pub const LATEST_EXPOSURE_REPORT: StorageKey<ExposureReport> =
    StorageKey::new("latest_exposure_report");

/// When the detection pipeline last completed a run, successful or not.
pub const LAST_PROCESSING_ATTEMPT: StorageKey<Timestamp> =
    StorageKey::new("last_processing_attempt");

/// Exposure date of a notification delivered while the app was backgrounded,
/// cleared by the embedding app once the user has seen it.
pub const UNSEEN_EXPOSURE_DATE: StorageKey<Timestamp> =
    StorageKey::new("unseen_exposure_notification_date");

/// Timestamps of foreground engine calls inside the rolling window.
pub const FOREGROUND_CALL_LOG: StorageKey<Vec<Timestamp>> =
    StorageKey::new("foreground_api_call_dates");

/// Timestamps of background engine calls inside the rolling window.
pub const BACKGROUND_CALL_LOG: StorageKey<Vec<Timestamp>> =
    StorageKey::new("background_api_call_dates");

/// Upload requests waiting for a retry.
pub const PENDING_UPLOAD_REQUESTS: StorageKey<Vec<PendingUploadRequest>> =
    StorageKey::new("pending_upload_requests");

/// Cached distribution manifest.
pub const APPLICATION_MANIFEST: StorageKey<ApplicationManifest> =
    StorageKey::new("application_manifest");

/// Cached application configuration, sealed with its checksum.
pub const APPLICATION_CONFIGURATION: StorageKey<StoredConfiguration> =
    StorageKey::new("application_configuration");

/// Cached risk-calculation parameters.
pub const RISK_CONFIGURATION: StorageKey<RiskConfiguration> =
    StorageKey::new("risk_calculation_parameters");

/// Cached lab confirmation key, reused while still valid.
pub const LAB_CONFIRMATION_KEY: StorageKey<LabConfirmationKey> =
    StorageKey::new("lab_confirmation_key");

/// Version string of the build that last ran; drives upgrade migrations.
pub const LAST_RAN_VERSION: StorageKey<String> = StorageKey::new("last_ran_app_version");

/// Present once first-run initialization has completed.
pub const FIRST_RUN_COMPLETED: StorageKey<bool> = StorageKey::new("first_run_completed");
