//! # Core Domain Entities
//!
//! Defines the persisted records of the exposure-notification client.
//!
//! ## Clusters
//!
//! - **Acquisition & Detection**: `KeySetHolder`, `ExposureReport`,
//!   `PipelineState`
//! - **Upload**: `DiagnosisKey`, `LabConfirmationKey`, `PendingUploadRequest`
//! - **Distribution metadata**: `ApplicationManifest`,
//!   `ApplicationConfiguration`, `StoredConfiguration`

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

// =============================================================================
// CLUSTER A: ACQUISITION & DETECTION
// =============================================================================

/// Local bookkeeping record for one remote key set's download/processing
/// lifecycle. Exactly one holder exists per identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySetHolder {
    /// Stable identifier assigned by the distribution service.
    pub identifier: String,
    /// File name of the signature blob, `None` until downloaded.
    pub signature_filename: Option<String>,
    /// File name of the binary blob, `None` until downloaded.
    pub binary_filename: Option<String>,
    /// When this holder was created locally; drives FIFO processing order.
    pub creation_date: Timestamp,
    /// When this key set was handed to the matching engine. `None` means
    /// unprocessed. Set regardless of match outcome.
    pub process_date: Option<Timestamp>,
}

impl KeySetHolder {
    /// Holder for a freshly downloaded key set, files named after the
    /// identifier and not yet processed.
    pub fn downloaded(identifier: impl Into<String>, creation_date: Timestamp) -> Self {
        let identifier = identifier.into();
        Self {
            signature_filename: Some(format!("{identifier}.sig")),
            binary_filename: Some(format!("{identifier}.bin")),
            identifier,
            creation_date,
            process_date: None,
        }
    }

    /// Holder synthesized without a download, already marked processed so it
    /// never enters the detection batch nor the rolling quota window.
    pub fn ignored(
        identifier: impl Into<String>,
        creation_date: Timestamp,
        process_date: Timestamp,
    ) -> Self {
        Self {
            identifier: identifier.into(),
            signature_filename: None,
            binary_filename: None,
            creation_date,
            process_date: Some(process_date),
        }
    }

    /// Whether this key set has been handed to the engine.
    pub fn processed(&self) -> bool {
        self.process_date.is_some()
    }

    /// Signature and binary file names, when both have been downloaded.
    pub fn file_names(&self) -> Option<(&str, &str)> {
        match (&self.signature_filename, &self.binary_filename) {
            (Some(sig), Some(bin)) => Some((sig.as_str(), bin.as_str())),
            _ => None,
        }
    }
}

/// The user-facing outcome of a detection run: the most recent day whose
/// summed risk exceeded the configured minimum.
///
/// Only monotonically-advancing reports are persisted; an older date never
/// overwrites a newer one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureReport {
    /// Day of the exposure, aligned to 00:00 UTC.
    pub date: Timestamp,
}

/// The pipeline's global flags and de-duplication memory, persisted as one
/// record so a compound read-modify-write stays a single-key transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PipelineState {
    /// Set once the first batch of historical key sets has been ignored (or
    /// retroactively, when holders predate the flag's introduction).
    pub initial_batch_ignored: bool,
    /// Makes the next acquisition cycle fetch key sets from the alternate
    /// endpoint; flipped after an engine signature-validation failure.
    pub use_fallback_endpoint: bool,
    /// When set, the first exposure found by the new engine version is
    /// recorded but not surfaced, then the flag clears itself.
    pub ignore_first_v2_exposure: bool,
    /// Every exposure day ever discovered, surfaced or not. Consulted before
    /// notifying so the user never sees the same exposure twice.
    pub known_exposure_dates: BTreeSet<Timestamp>,
}

// =============================================================================
// CLUSTER B: UPLOAD
// =============================================================================

/// One of the user's own rotated proximity keys, uploaded after a positive
/// test so other devices can match against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosisKey {
    /// Raw key material.
    pub key_data: Vec<u8>,
    /// Interval number of the first interval this key was active.
    pub rolling_start_number: u32,
    /// Number of intervals the key was active.
    pub rolling_period: u32,
    /// Risk of transmission associated with this key.
    pub transmission_risk_level: u8,
}

/// Token proving a positive test result, required to authorize uploading
/// diagnosis keys. Obtained from the health authority and relayed verbally
/// through its support desk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabConfirmationKey {
    /// Human-readable code the user reads to the support desk.
    pub identifier: String,
    /// Server-side bucket the upload lands in.
    pub bucket_identifier: Vec<u8>,
    /// Shared secret confirming the key was issued by the authority.
    pub confirmation_key: Vec<u8>,
    /// Moment the key stops being accepted by the upload endpoint.
    pub valid_until: Timestamp,
}

impl LabConfirmationKey {
    /// Whether the upload endpoint still accepts this key.
    pub fn is_valid(&self, now: Timestamp) -> bool {
        self.valid_until > now
    }
}

/// A diagnosis-key upload that failed and is waiting to be retried.
///
/// Removed from storage when a retry succeeds or the expiry passes; the
/// expiry is the sole termination condition. Equality is full structural
/// identity, used to delete exactly the drained entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUploadRequest {
    /// Authorization token for the upload.
    pub lab_confirmation_key: LabConfirmationKey,
    /// Keys to upload, in their original order.
    pub diagnosis_keys: Vec<DiagnosisKey>,
    /// Taken from the confirmation key's own validity window.
    pub expiry_date: Timestamp,
}

impl PendingUploadRequest {
    /// Whether the retry window has closed.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expiry_date < now
    }
}

// =============================================================================
// CLUSTER C: DISTRIBUTION METADATA
// =============================================================================

/// Index document published by the distribution service. Immutable snapshot,
/// replaced wholesale on refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationManifest {
    /// Identifiers of every key set currently published.
    pub key_set_identifiers: Vec<String>,
    /// Identifier of the application configuration to fetch.
    pub app_configuration_identifier: String,
    /// Identifier of the risk-calculation parameter set to fetch.
    pub risk_parameters_identifier: String,
    /// When this snapshot was taken locally; drives cache expiry.
    pub creation_date: Timestamp,
}

/// Remote application configuration. Immutable snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationConfiguration {
    /// Matches the manifest's `app_configuration_identifier`.
    pub identifier: String,
    /// When this snapshot was taken locally.
    pub creation_date: Timestamp,
    /// How long a manifest stays fresh.
    pub manifest_refresh_frequency_minutes: u32,
}

/// Application configuration as persisted, sealed with a digest of its
/// serialized bytes. A digest mismatch on read is treated as a cache miss.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredConfiguration {
    /// The configuration itself.
    pub configuration: ApplicationConfiguration,
    /// SHA-256 over the serialized configuration.
    pub checksum: [u8; 32],
}
