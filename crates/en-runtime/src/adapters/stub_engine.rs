//! # Stub Matching Engine
//!
//! The proximity-matching engine is supplied by the host platform and is not
//! something this codebase can reimplement: it owns the radio-level scan
//! records the risk scores are computed from. This stub satisfies the port
//! with a "nothing matched" answer so the acquisition, quota, and reporting
//! machinery can be exercised without a platform binding.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::info;

use en_pipeline::ports::outbound::ExposureEngine;
use shared_types::engine::{DetectionSummary, ExposureWindow, RiskConfiguration};
use shared_types::errors::EngineError;

/// Matching engine that accepts every detection call and never matches.
#[derive(Debug, Default)]
pub struct StubEngine;

#[async_trait]
impl ExposureEngine for StubEngine {
    async fn detect_exposures(
        &self,
        _configuration: &RiskConfiguration,
        key_set_files: &[PathBuf],
    ) -> Result<Option<DetectionSummary>, EngineError> {
        info!(
            files = key_set_files.len(),
            "[engine] stub detection call, no matches"
        );
        Ok(None)
    }

    async fn exposure_windows(
        &self,
        _summary: &DetectionSummary,
    ) -> Result<Vec<ExposureWindow>, EngineError> {
        Ok(Vec::new())
    }
}
