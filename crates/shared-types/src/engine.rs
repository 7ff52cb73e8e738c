//! # Matching Engine Exchange Types
//!
//! Types crossing the boundary to the platform's proximity-matching engine:
//! what we hand it (risk parameters, key set files) and what it hands back
//! (summaries and exposure windows). The engine itself is a black box.

use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// How the diagnosis behind an exposure window was established. Discriminants
/// double as indexes into [`RiskConfiguration::report_type_weights`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum DiagnosisReportType {
    Unknown = 0,
    ConfirmedTest = 1,
    ConfirmedClinicalDiagnosis = 2,
    SelfReport = 3,
    Recursive = 4,
    Revoked = 5,
}

impl DiagnosisReportType {
    /// Index into the report-type weight list.
    pub fn weight_index(self) -> usize {
        self as usize
    }
}

/// Estimated infectiousness during an exposure window. Discriminants double
/// as indexes into [`RiskConfiguration::infectiousness_weights`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Infectiousness {
    None = 0,
    Standard = 1,
    High = 2,
}

impl Infectiousness {
    /// Index into the infectiousness weight list.
    pub fn weight_index(self) -> usize {
        self as usize
    }
}

/// One Bluetooth scan inside an exposure window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanInstance {
    /// Typical signal attenuation during the scan, in dB.
    pub typical_attenuation_db: u8,
    /// Minimum attenuation seen during the scan, in dB.
    pub min_attenuation_db: u8,
    /// Seconds elapsed since the previous scan; proxies exposure duration.
    pub seconds_since_last_scan: u32,
}

/// A time-bucketed proximity encounter, as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExposureWindow {
    /// Day of the encounter, aligned to 00:00 UTC.
    pub date: Timestamp,
    /// Scans that make up the window.
    pub scans: Vec<ScanInstance>,
    /// How the matched diagnosis was established.
    pub report_type: DiagnosisReportType,
    /// Estimated infectiousness of the matched person on that day.
    pub infectiousness: Infectiousness,
}

/// Aggregate result of one engine invocation over a batch of key set files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionSummary {
    /// Diagnosis keys that matched local observations.
    pub matched_key_count: u64,
    /// Highest raw risk score the engine attributed to any day.
    pub maximum_risk_score: f64,
}

/// Parameters steering the window-scoring algorithm, published by the health
/// authority and fetched per manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfiguration {
    /// Matches the manifest's `risk_parameters_identifier`.
    pub identifier: String,
    /// A day whose summed window scores reach this value counts as an
    /// exposure day.
    pub minimum_risk_score: f64,
    /// Windows scoring below this value are excluded from day sums.
    pub minimum_window_score: f64,
    /// Weight per [`DiagnosisReportType`], 6 entries.
    pub report_type_weights: Vec<f64>,
    /// Weight per [`Infectiousness`], 3 entries.
    pub infectiousness_weights: Vec<f64>,
    /// Upper bounds (dB) of the first three attenuation buckets; anything
    /// above the last threshold falls into the fourth bucket.
    pub attenuation_bucket_thresholds_db: [u8; 3],
    /// Weight applied to scan seconds per attenuation bucket, 4 entries.
    pub attenuation_bucket_weights: [f64; 4],
    /// The engine drops windows older than this many days.
    pub days_since_exposure_threshold: u32,
}

impl Default for RiskConfiguration {
    /// Compiled-in fallback so detection can score windows before the first
    /// successful parameter fetch.
    fn default() -> Self {
        Self {
            identifier: "default".to_owned(),
            minimum_risk_score: 900.0,
            minimum_window_score: 0.0,
            report_type_weights: vec![0.0, 1.0, 1.0, 1.0, 0.0, 0.0],
            infectiousness_weights: vec![0.0, 1.0, 1.0],
            attenuation_bucket_thresholds_db: [56, 62, 70],
            attenuation_bucket_weights: [1.0, 1.0, 0.3, 0.0],
            days_since_exposure_threshold: 14,
        }
    }
}
