//! # Window Scoring
//!
//! Turns the engine's exposure windows into the single day the user gets
//! told about. A window's score is its scan seconds weighted by attenuation
//! bucket, then scaled by report-type and infectiousness weights; days are
//! scored by summing their qualifying windows.

use std::collections::BTreeMap;

use shared_types::engine::{ExposureWindow, RiskConfiguration};
use shared_types::time::Timestamp;

/// The most recent day whose summed window scores reach the configured
/// minimum risk score, if any.
pub fn last_day_above_minimum_score(
    windows: &[ExposureWindow],
    config: &RiskConfiguration,
) -> Option<Timestamp> {
    if windows.is_empty() {
        return None;
    }

    let daily = daily_risk_scores(windows, config);
    daily
        .into_iter()
        .filter(|(_, score)| *score >= config.minimum_risk_score)
        .map(|(day, _)| day)
        .max()
}

/// Risk score per day. Windows scoring below the minimum window score do not
/// participate.
pub fn daily_risk_scores(
    windows: &[ExposureWindow],
    config: &RiskConfiguration,
) -> BTreeMap<Timestamp, f64> {
    let mut per_day = BTreeMap::new();
    for window in windows {
        let score = window_score(window, config);
        if score >= config.minimum_window_score {
            *per_day.entry(window.date).or_insert(0.0) += score;
        }
    }
    per_day
}

/// Score of a single exposure window.
pub fn window_score(window: &ExposureWindow, config: &RiskConfiguration) -> f64 {
    let scan_score: f64 = window
        .scans
        .iter()
        .map(|scan| {
            f64::from(scan.seconds_since_last_scan)
                * attenuation_weight(scan.typical_attenuation_db, config)
        })
        .sum();

    scan_score
        * weight_at(&config.report_type_weights, window.report_type.weight_index())
        * weight_at(
            &config.infectiousness_weights,
            window.infectiousness.weight_index(),
        )
}

/// Weight of the attenuation bucket the given dB value falls into. The three
/// thresholds split the range into four buckets, nearest first.
fn attenuation_weight(attenuation_db: u8, config: &RiskConfiguration) -> f64 {
    let thresholds = &config.attenuation_bucket_thresholds_db;
    let bucket = if attenuation_db <= thresholds[0] {
        0
    } else if attenuation_db <= thresholds[1] {
        1
    } else if attenuation_db <= thresholds[2] {
        2
    } else {
        3
    };
    config.attenuation_bucket_weights[bucket]
}

/// A weight list published by the server may be shorter than the enum it
/// indexes; anything off the end weighs nothing.
fn weight_at(weights: &[f64], index: usize) -> f64 {
    weights.get(index).copied().unwrap_or(0.0)
}
