//! # Config/Manifest Cache
//!
//! TTL-cached retrieval of the distribution service's manifest and the two
//! documents it points at: the application configuration and the risk
//! parameters. Everything downstream keys off values served here, so a cache
//! entry is replaced wholesale or not at all.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use en_storage::StateStore;
use shared_types::engine::RiskConfiguration;
use shared_types::entities::{ApplicationConfiguration, ApplicationManifest, StoredConfiguration};
use shared_types::errors::ExposureError;
use shared_types::keys;
use shared_types::time::SECONDS_PER_MINUTE;
use shared_types::Clock;

use crate::config::PipelineConfig;
use crate::ports::DistributionClient;

/// Serves manifest, application configuration, and risk parameters, fetching
/// only when the cached copy is stale or missing.
pub struct ManifestService {
    store: StateStore,
    client: Arc<dyn DistributionClient>,
    clock: Arc<dyn Clock>,
    config: PipelineConfig,
}

impl ManifestService {
    pub fn new(
        store: StateStore,
        client: Arc<dyn DistributionClient>,
        clock: Arc<dyn Clock>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            client,
            clock,
            config,
        }
    }

    /// Current manifest, served from cache while younger than the refresh
    /// frequency the stored configuration dictates.
    pub async fn manifest(&self) -> Result<ApplicationManifest, ExposureError> {
        let now = self.clock.now();
        if let Some(manifest) = self.store.read(keys::APPLICATION_MANIFEST).await? {
            if now < manifest.creation_date + self.refresh_window().await? {
                debug!("[manifest] serving cached manifest");
                return Ok(manifest);
            }
        }

        let mut manifest = self.client.fetch_manifest().await?;
        // Expiry runs on the local clock, not the server's.
        manifest.creation_date = now;
        self.store.write(keys::APPLICATION_MANIFEST, &manifest).await?;
        info!(
            key_sets = manifest.key_set_identifiers.len(),
            "[manifest] refreshed manifest"
        );
        Ok(manifest)
    }

    /// Application configuration named by the manifest, cached by identifier.
    /// A manifest pointing at a new identifier forces a fetch; so does a
    /// stored copy that fails its checksum.
    pub async fn configuration(
        &self,
        manifest: &ApplicationManifest,
    ) -> Result<ApplicationConfiguration, ExposureError> {
        let identifier = manifest.app_configuration_identifier.as_str();
        if identifier.is_empty() {
            return Err(ExposureError::ServerError);
        }

        if let Some(stored) = self.verified_stored_configuration().await? {
            if stored.identifier == identifier {
                return Ok(stored);
            }
        }

        let mut configuration = self.client.fetch_configuration(identifier).await?;
        if configuration.identifier.is_empty() {
            return Err(ExposureError::ServerError);
        }
        configuration.creation_date = self.clock.now();

        let sealed = StoredConfiguration {
            checksum: configuration_checksum(&configuration)?,
            configuration,
        };
        self.store
            .write(keys::APPLICATION_CONFIGURATION, &sealed)
            .await?;
        info!(identifier, "[manifest] refreshed application configuration");
        Ok(sealed.configuration)
    }

    /// Risk-calculation parameters named by the manifest, cached by
    /// identifier. A fetch failure falls back to whatever set is already
    /// stored, or to the compiled-in defaults, so detection never stalls on
    /// parameters.
    pub async fn risk_configuration(
        &self,
        manifest: &ApplicationManifest,
    ) -> Result<RiskConfiguration, ExposureError> {
        let identifier = manifest.risk_parameters_identifier.as_str();
        let stored = self.store.read(keys::RISK_CONFIGURATION).await?;
        if let Some(stored) = &stored {
            if stored.identifier == identifier {
                return Ok(stored.clone());
            }
        }

        match self.client.fetch_risk_configuration(identifier).await {
            Ok(configuration) => {
                self.store
                    .write(keys::RISK_CONFIGURATION, &configuration)
                    .await?;
                info!(identifier, "[manifest] refreshed risk parameters");
                Ok(configuration)
            }
            Err(error) => {
                warn!(%error, "[manifest] risk parameter fetch failed, using stored set");
                Ok(stored.unwrap_or_default())
            }
        }
    }

    /// Refresh frequency in seconds, taken from the stored configuration when
    /// a verified one exists.
    async fn refresh_window(&self) -> Result<u64, ExposureError> {
        let minutes = match self.verified_stored_configuration().await? {
            Some(configuration) => configuration.manifest_refresh_frequency_minutes,
            None => self.config.default_manifest_refresh_minutes,
        };
        Ok(u64::from(minutes) * SECONDS_PER_MINUTE)
    }

    /// Stored configuration, only if its checksum still matches. A mismatch
    /// is treated as a cache miss.
    async fn verified_stored_configuration(
        &self,
    ) -> Result<Option<ApplicationConfiguration>, ExposureError> {
        let Some(stored) = self.store.read(keys::APPLICATION_CONFIGURATION).await? else {
            return Ok(None);
        };
        if configuration_checksum(&stored.configuration)? != stored.checksum {
            warn!("[manifest] stored configuration failed its checksum, discarding");
            return Ok(None);
        }
        Ok(Some(stored.configuration))
    }
}

/// SHA-256 over the configuration's serialized bytes.
fn configuration_checksum(
    configuration: &ApplicationConfiguration,
) -> Result<[u8; 32], ExposureError> {
    let bytes = serde_json::to_vec(configuration)
        .map_err(|e| ExposureError::internal(format!("configuration encoding failed: {e}")))?;
    Ok(Sha256::digest(&bytes).into())
}
