//! # Outbound Ports (Driven Ports)
//!
//! The external collaborators the pipeline drives: the distribution service,
//! the platform matching engine, and the local notification service. Each
//! port has a mock next to it; the mocks record calls so tests can assert on
//! traffic, not just outcomes.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use en_storage::MockFileSystem;
use shared_types::engine::{DetectionSummary, ExposureWindow, RiskConfiguration};
use shared_types::entities::{
    ApplicationConfiguration, ApplicationManifest, DiagnosisKey, LabConfirmationKey,
};
use shared_types::errors::{EngineError, NetworkError, NotifyError};

/// A key set download sitting in staging, ready to be adopted into the blob
/// store. Transport details (zip, signatures, TLS) are the collaborator's
/// problem; what arrives here is already two plain files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedKeySet {
    /// Identifier the download belongs to.
    pub identifier: String,
    /// Staged signature file.
    pub signature_path: PathBuf,
    /// Staged binary file.
    pub binary_path: PathBuf,
}

/// Client of the manifest/configuration/key-set distribution service and the
/// diagnosis-key upload endpoint.
#[async_trait]
pub trait DistributionClient: Send + Sync {
    /// Fetch the current manifest.
    async fn fetch_manifest(&self) -> Result<ApplicationManifest, NetworkError>;

    /// Fetch the application configuration with the given identifier.
    async fn fetch_configuration(
        &self,
        identifier: &str,
    ) -> Result<ApplicationConfiguration, NetworkError>;

    /// Fetch the risk-calculation parameters with the given identifier.
    async fn fetch_risk_configuration(
        &self,
        identifier: &str,
    ) -> Result<RiskConfiguration, NetworkError>;

    /// Download one key set into staging. `use_fallback` selects the
    /// alternate endpoint after signature-validation trouble.
    async fn fetch_key_set(
        &self,
        identifier: &str,
        use_fallback: bool,
    ) -> Result<StagedKeySet, NetworkError>;

    /// Obtain a fresh lab confirmation key.
    async fn request_lab_confirmation_key(&self) -> Result<LabConfirmationKey, NetworkError>;

    /// Upload diagnosis keys, authorized by a confirmation key.
    async fn post_diagnosis_keys(
        &self,
        keys: &[DiagnosisKey],
        confirmation_key: &LabConfirmationKey,
    ) -> Result<(), NetworkError>;
}

/// The platform's proximity-matching engine. A black box: we hand it files
/// and parameters, it hands back summaries and windows.
#[async_trait]
pub trait ExposureEngine: Send + Sync {
    /// Run detection over the given key set files. `Ok(None)` means the call
    /// succeeded and nothing matched.
    async fn detect_exposures(
        &self,
        configuration: &RiskConfiguration,
        key_set_files: &[PathBuf],
    ) -> Result<Option<DetectionSummary>, EngineError>;

    /// Expand a summary into its exposure windows.
    async fn exposure_windows(
        &self,
        summary: &DetectionSummary,
    ) -> Result<Vec<ExposureWindow>, EngineError>;
}

/// When a failed-upload notification should reach the user. Computed here,
/// rendered by the collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMoment {
    /// The support desk is open; deliver right away.
    Immediate,
    /// Deliver at the next support-desk opening instead of waking the user
    /// at night with a call-us message nobody answers.
    NextOpeningHours,
}

/// The messages this core can ask the platform to show. Content decisions
/// only; presentation belongs to the collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserNotification {
    /// A qualifying new exposure was detected this many days ago.
    ExposureDetected { days_ago: u64 },
    /// A pending diagnosis-key upload expired without ever succeeding.
    UploadFailed { moment: DeliveryMoment },
}

/// Local notification service.
#[async_trait]
pub trait UserNotifier: Send + Sync {
    /// Whether the user allows local notifications at all.
    async fn is_authorized(&self) -> bool;

    /// Deliver a notification.
    async fn notify(&self, notification: UserNotification) -> Result<(), NotifyError>;
}

// =============================================================================
// MOCK IMPLEMENTATIONS
// Shared by the unit tests here and the integration suite.
// =============================================================================

/// Mock distribution client. Canned responses per call, a switchable failure
/// for each endpoint, and a record of everything fetched or posted.
///
/// `fetch_key_set` materializes its staged files on the given
/// [`MockFileSystem`] so a subsequent blob-store adoption finds them.
#[derive(Default)]
pub struct MockDistributionClient {
    pub manifest: Mutex<Option<ApplicationManifest>>,
    pub configuration: Mutex<Option<ApplicationConfiguration>>,
    pub risk_configuration: Mutex<Option<RiskConfiguration>>,
    pub lab_confirmation_key: Mutex<Option<LabConfirmationKey>>,

    staging_fs: Mutex<Option<Arc<MockFileSystem>>>,

    fail_manifest: AtomicBool,
    fail_key_sets: AtomicBool,
    fail_posts: AtomicBool,

    fetched_key_sets: Mutex<Vec<(String, bool)>>,
    posted_uploads: Mutex<Vec<(Vec<DiagnosisKey>, LabConfirmationKey)>>,
    manifest_fetches: Mutex<usize>,
}

impl MockDistributionClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach the filesystem staged downloads appear on.
    pub fn stage_on(&self, fs: Arc<MockFileSystem>) {
        *self.staging_fs.lock() = Some(fs);
    }

    pub fn set_manifest(&self, manifest: ApplicationManifest) {
        *self.manifest.lock() = Some(manifest);
    }

    pub fn set_configuration(&self, configuration: ApplicationConfiguration) {
        *self.configuration.lock() = Some(configuration);
    }

    pub fn set_risk_configuration(&self, configuration: RiskConfiguration) {
        *self.risk_configuration.lock() = Some(configuration);
    }

    pub fn set_lab_confirmation_key(&self, key: LabConfirmationKey) {
        *self.lab_confirmation_key.lock() = Some(key);
    }

    pub fn fail_manifest(&self, fail: bool) {
        self.fail_manifest.store(fail, Ordering::SeqCst);
    }

    pub fn fail_key_sets(&self, fail: bool) {
        self.fail_key_sets.store(fail, Ordering::SeqCst);
    }

    pub fn fail_posts(&self, fail: bool) {
        self.fail_posts.store(fail, Ordering::SeqCst);
    }

    /// Every `(identifier, use_fallback)` key set fetch so far.
    pub fn fetched_key_sets(&self) -> Vec<(String, bool)> {
        self.fetched_key_sets.lock().clone()
    }

    /// Every diagnosis-key upload posted so far.
    pub fn posted_uploads(&self) -> Vec<(Vec<DiagnosisKey>, LabConfirmationKey)> {
        self.posted_uploads.lock().clone()
    }

    pub fn manifest_fetches(&self) -> usize {
        *self.manifest_fetches.lock()
    }

    fn staging_dir(identifier: &str) -> PathBuf {
        Path::new("/staging").join(identifier)
    }
}

#[async_trait]
impl DistributionClient for MockDistributionClient {
    async fn fetch_manifest(&self) -> Result<ApplicationManifest, NetworkError> {
        *self.manifest_fetches.lock() += 1;
        if self.fail_manifest.load(Ordering::SeqCst) {
            return Err(NetworkError::NotReachable);
        }
        self.manifest.lock().clone().ok_or(NetworkError::InvalidResponse)
    }

    async fn fetch_configuration(
        &self,
        identifier: &str,
    ) -> Result<ApplicationConfiguration, NetworkError> {
        match self.configuration.lock().clone() {
            Some(cfg) if cfg.identifier == identifier => Ok(cfg),
            _ => Err(NetworkError::InvalidResponse),
        }
    }

    async fn fetch_risk_configuration(
        &self,
        identifier: &str,
    ) -> Result<RiskConfiguration, NetworkError> {
        match self.risk_configuration.lock().clone() {
            Some(cfg) if cfg.identifier == identifier => Ok(cfg),
            _ => Err(NetworkError::InvalidResponse),
        }
    }

    async fn fetch_key_set(
        &self,
        identifier: &str,
        use_fallback: bool,
    ) -> Result<StagedKeySet, NetworkError> {
        self.fetched_key_sets
            .lock()
            .push((identifier.to_owned(), use_fallback));
        if self.fail_key_sets.load(Ordering::SeqCst) {
            return Err(NetworkError::NotReachable);
        }

        let dir = Self::staging_dir(identifier);
        let staged = StagedKeySet {
            identifier: identifier.to_owned(),
            signature_path: dir.join("export.sig"),
            binary_path: dir.join("export.bin"),
        };
        if let Some(fs) = self.staging_fs.lock().as_ref() {
            fs.touch(staged.signature_path.clone());
            fs.touch(staged.binary_path.clone());
        }
        Ok(staged)
    }

    async fn request_lab_confirmation_key(&self) -> Result<LabConfirmationKey, NetworkError> {
        self.lab_confirmation_key
            .lock()
            .clone()
            .ok_or(NetworkError::ServerError)
    }

    async fn post_diagnosis_keys(
        &self,
        keys: &[DiagnosisKey],
        confirmation_key: &LabConfirmationKey,
    ) -> Result<(), NetworkError> {
        if self.fail_posts.load(Ordering::SeqCst) {
            return Err(NetworkError::NotReachable);
        }
        self.posted_uploads
            .lock()
            .push((keys.to_vec(), confirmation_key.clone()));
        Ok(())
    }
}

/// Mock matching engine with a canned summary and windows, an injectable
/// failure, and a record of every detection call's file list.
#[derive(Default)]
pub struct MockExposureEngine {
    pub summary: Mutex<Option<DetectionSummary>>,
    pub windows: Mutex<Vec<ExposureWindow>>,
    fail_with: Mutex<Option<EngineError>>,
    detect_calls: Mutex<Vec<Vec<PathBuf>>>,
}

impl MockExposureEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_summary(&self, summary: DetectionSummary) {
        *self.summary.lock() = Some(summary);
    }

    pub fn set_windows(&self, windows: Vec<ExposureWindow>) {
        *self.windows.lock() = windows;
    }

    /// Fail the next detection calls with this error.
    pub fn fail_with(&self, error: EngineError) {
        *self.fail_with.lock() = Some(error);
    }

    pub fn clear_failure(&self) {
        *self.fail_with.lock() = None;
    }

    /// File lists of every detection call so far.
    pub fn detect_calls(&self) -> Vec<Vec<PathBuf>> {
        self.detect_calls.lock().clone()
    }
}

#[async_trait]
impl ExposureEngine for MockExposureEngine {
    async fn detect_exposures(
        &self,
        _configuration: &RiskConfiguration,
        key_set_files: &[PathBuf],
    ) -> Result<Option<DetectionSummary>, EngineError> {
        self.detect_calls.lock().push(key_set_files.to_vec());
        if let Some(error) = self.fail_with.lock().clone() {
            return Err(error);
        }
        Ok(self.summary.lock().clone())
    }

    async fn exposure_windows(
        &self,
        _summary: &DetectionSummary,
    ) -> Result<Vec<ExposureWindow>, EngineError> {
        if let Some(error) = self.fail_with.lock().clone() {
            return Err(error);
        }
        Ok(self.windows.lock().clone())
    }
}

/// Mock notifier recording everything delivered.
pub struct MockUserNotifier {
    authorized: AtomicBool,
    fail_delivery: AtomicBool,
    delivered: Mutex<Vec<UserNotification>>,
}

impl Default for MockUserNotifier {
    fn default() -> Self {
        Self {
            authorized: AtomicBool::new(true),
            fail_delivery: AtomicBool::new(false),
            delivered: Mutex::new(Vec::new()),
        }
    }
}

impl MockUserNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_authorized(&self, authorized: bool) {
        self.authorized.store(authorized, Ordering::SeqCst);
    }

    pub fn fail_delivery(&self, fail: bool) {
        self.fail_delivery.store(fail, Ordering::SeqCst);
    }

    /// Every notification delivered so far.
    pub fn delivered(&self) -> Vec<UserNotification> {
        self.delivered.lock().clone()
    }
}

#[async_trait]
impl UserNotifier for MockUserNotifier {
    async fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::SeqCst)
    }

    async fn notify(&self, notification: UserNotification) -> Result<(), NotifyError> {
        if self.fail_delivery.load(Ordering::SeqCst) {
            return Err(NotifyError::Delivery("mock delivery failure".to_owned()));
        }
        self.delivered.lock().push(notification);
        Ok(())
    }
}
