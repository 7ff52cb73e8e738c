//! # Directory Distribution Client
//!
//! Serves the distribution surface out of a local directory tree, standing in
//! for the CDN and the health-authority API:
//!
//! ```text
//! <root>/manifest.json           ApplicationManifest
//! <root>/configuration.json      ApplicationConfiguration
//! <root>/risk_parameters.json    RiskConfiguration
//! <root>/keysets/<id>.sig        key set signature
//! <root>/keysets/<id>.bin        key set binary
//! <root>/uploads.jsonl           one line per posted diagnosis-key batch
//! ```
//!
//! Downloads are copied into a staging directory so the blob store can adopt
//! them by rename without disturbing the served tree. The fallback endpoint
//! is the same directory; the flag only matters against a real backend.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use en_pipeline::ports::outbound::{DistributionClient, StagedKeySet};
use shared_types::engine::RiskConfiguration;
use shared_types::entities::{
    ApplicationConfiguration, ApplicationManifest, DiagnosisKey, LabConfirmationKey,
};
use shared_types::errors::NetworkError;
use shared_types::time::{Clock, SECONDS_PER_DAY};

/// Distribution client backed by a directory tree.
pub struct DirDistributionClient {
    root: PathBuf,
    staging: PathBuf,
    clock: Arc<dyn Clock>,
}

impl DirDistributionClient {
    pub fn new(
        root: impl Into<PathBuf>,
        staging: impl Into<PathBuf>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            root: root.into(),
            staging: staging.into(),
            clock,
        }
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        filename: &str,
    ) -> Result<T, NetworkError> {
        let bytes = tokio::fs::read(self.root.join(filename))
            .await
            .map_err(io_error)?;
        serde_json::from_slice(&bytes).map_err(|_| NetworkError::InvalidResponse)
    }

    async fn stage_file(&self, source: &Path, target: &Path) -> Result<(), NetworkError> {
        tokio::fs::copy(source, target)
            .await
            .map_err(io_error)
            .map(|_| ())
    }
}

/// A missing file is the directory equivalent of a 404; everything else is
/// treated as the backend being unreachable.
fn io_error(error: std::io::Error) -> NetworkError {
    if error.kind() == std::io::ErrorKind::NotFound {
        NetworkError::ServerError
    } else {
        NetworkError::NotReachable
    }
}

#[async_trait]
impl DistributionClient for DirDistributionClient {
    async fn fetch_manifest(&self) -> Result<ApplicationManifest, NetworkError> {
        self.read_json("manifest.json").await
    }

    async fn fetch_configuration(
        &self,
        identifier: &str,
    ) -> Result<ApplicationConfiguration, NetworkError> {
        let configuration: ApplicationConfiguration = self.read_json("configuration.json").await?;
        if configuration.identifier != identifier {
            return Err(NetworkError::InvalidResponse);
        }
        Ok(configuration)
    }

    async fn fetch_risk_configuration(
        &self,
        identifier: &str,
    ) -> Result<RiskConfiguration, NetworkError> {
        let configuration: RiskConfiguration = self.read_json("risk_parameters.json").await?;
        if configuration.identifier != identifier {
            return Err(NetworkError::InvalidResponse);
        }
        Ok(configuration)
    }

    async fn fetch_key_set(
        &self,
        identifier: &str,
        _use_fallback: bool,
    ) -> Result<StagedKeySet, NetworkError> {
        let staged_dir = self.staging.join(identifier);
        tokio::fs::create_dir_all(&staged_dir)
            .await
            .map_err(io_error)?;

        let signature_path = staged_dir.join("export.sig");
        let binary_path = staged_dir.join("export.bin");
        let source_dir = self.root.join("keysets");
        self.stage_file(
            &source_dir.join(format!("{identifier}.sig")),
            &signature_path,
        )
        .await?;
        self.stage_file(&source_dir.join(format!("{identifier}.bin")), &binary_path)
            .await?;

        debug!(identifier, "[distribution] staged key set");
        Ok(StagedKeySet {
            identifier: identifier.to_owned(),
            signature_path,
            binary_path,
        })
    }

    async fn request_lab_confirmation_key(&self) -> Result<LabConfirmationKey, NetworkError> {
        // Stands in for the health authority's key issuance.
        let token = Uuid::new_v4().simple().to_string();
        Ok(LabConfirmationKey {
            identifier: format!("GGD-{}", token[..6].to_ascii_uppercase()),
            bucket_identifier: rand::random::<[u8; 16]>().to_vec(),
            confirmation_key: rand::random::<[u8; 32]>().to_vec(),
            valid_until: self.clock.now() + SECONDS_PER_DAY,
        })
    }

    async fn post_diagnosis_keys(
        &self,
        keys: &[DiagnosisKey],
        confirmation_key: &LabConfirmationKey,
    ) -> Result<(), NetworkError> {
        let record = serde_json::json!({
            "confirmation": confirmation_key.identifier,
            "key_count": keys.len(),
        });
        let mut line = record.to_string();
        line.push('\n');

        let mut log = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join("uploads.jsonl"))
            .await
            .map_err(io_error)?;
        log.write_all(line.as_bytes()).await.map_err(io_error)?;
        // tokio's File buffers writes on a background task; flush so the
        // appended line is on disk before the post is reported as done.
        log.flush().await.map_err(io_error)?;
        Ok(())
    }
}
