//! # Key Set Acquisition
//!
//! Turns the manifest's published identifiers into downloaded blobs and
//! stored holders. New identifiers are downloaded with bounded parallelism
//! and adopted one by one, so a failing batch keeps what already landed. The
//! very first batch a fresh install sees is not downloaded at all: it is
//! months of history the user cannot act on.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use en_storage::{BlobStore, StateStore};
use shared_types::entities::{KeySetHolder, PipelineState};
use shared_types::errors::ExposureError;
use shared_types::keys;
use shared_types::{Clock, SECONDS_PER_DAY};

use crate::config::PipelineConfig;
use crate::ports::{DistributionClient, StagedKeySet};

/// Downloads new key sets and maintains the holder collection.
pub struct AcquisitionService {
    store: StateStore,
    blobs: BlobStore,
    client: Arc<dyn DistributionClient>,
    clock: Arc<dyn Clock>,
    config: PipelineConfig,
}

impl AcquisitionService {
    pub fn new(
        store: StateStore,
        blobs: BlobStore,
        client: Arc<dyn DistributionClient>,
        clock: Arc<dyn Clock>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            blobs,
            client,
            clock,
            config,
        }
    }

    /// Bring local holder state up to date with the given published
    /// identifiers. Safe to call repeatedly with overlapping lists: exactly
    /// one holder ever exists per identifier.
    pub async fn acquire(&self, identifiers: &[String]) -> Result<(), ExposureError> {
        let (new_identifiers, use_fallback) = {
            let mut guard = self.store.exclusive().await;
            let holders = guard.read(keys::KEY_SET_HOLDERS)?.unwrap_or_default();
            let known: HashSet<&str> = holders.iter().map(|h| h.identifier.as_str()).collect();

            let mut seen = HashSet::new();
            let new_identifiers: Vec<String> = identifiers
                .iter()
                .filter(|id| !known.contains(id.as_str()) && seen.insert(id.as_str()))
                .cloned()
                .collect();
            if new_identifiers.is_empty() {
                debug!("[acquisition] no new key sets published");
                return Ok(());
            }

            let mut state: PipelineState = guard.read(keys::PIPELINE_STATE)?.unwrap_or_default();
            if !state.initial_batch_ignored {
                if holders.is_empty() {
                    // Backdated a full day so they count as processed outside
                    // the quota window and never reach the engine.
                    let now = self.clock.now();
                    let process_date = now.saturating_sub(SECONDS_PER_DAY);
                    let ignored: Vec<KeySetHolder> = new_identifiers
                        .iter()
                        .map(|id| KeySetHolder::ignored(id.clone(), now, process_date))
                        .collect();
                    state.initial_batch_ignored = true;
                    guard.write(keys::KEY_SET_HOLDERS, &ignored)?;
                    guard.write(keys::PIPELINE_STATE, &state)?;
                    info!(
                        count = ignored.len(),
                        "[acquisition] ignored initial key set batch"
                    );
                    return Ok(());
                }
                // Holders predate the flag's introduction; this install is
                // not fresh, so set it retroactively and download normally.
                state.initial_batch_ignored = true;
                guard.write(keys::PIPELINE_STATE, &state)?;
            }
            (new_identifiers, state.use_fallback_endpoint)
        };

        self.download_all(&new_identifiers, use_fallback).await
    }

    /// Download the given identifiers in bounded-parallel waves, adopting
    /// each finished download as it lands. The first failure aborts what is
    /// still in flight; holders already persisted stay.
    async fn download_all(
        &self,
        identifiers: &[String],
        use_fallback: bool,
    ) -> Result<(), ExposureError> {
        info!(
            count = identifiers.len(),
            use_fallback, "[acquisition] downloading new key sets"
        );

        for wave in identifiers.chunks(self.config.download_parallelism.max(1)) {
            let mut downloads = JoinSet::new();
            for identifier in wave {
                let client = Arc::clone(&self.client);
                let identifier = identifier.clone();
                downloads
                    .spawn(async move { client.fetch_key_set(&identifier, use_fallback).await });
            }

            while let Some(joined) = downloads.join_next().await {
                match joined {
                    Ok(Ok(staged)) => self.store_download(staged).await?,
                    Ok(Err(network_error)) => {
                        downloads.abort_all();
                        warn!(
                            error = %network_error,
                            "[acquisition] key set download failed, aborting batch"
                        );
                        return Err(network_error.into());
                    }
                    Err(join_error) => {
                        downloads.abort_all();
                        return Err(ExposureError::internal(format!(
                            "download task failed: {join_error}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Move a staged download into blob storage and append its holder. A
    /// relocation failure skips only this identifier; the manifest will offer
    /// it again next cycle.
    async fn store_download(&self, staged: StagedKeySet) -> Result<(), ExposureError> {
        let adopted = self.blobs.adopt_download(
            &staged.identifier,
            &staged.signature_path,
            &staged.binary_path,
        );
        let (signature_filename, binary_filename) = match adopted {
            Ok(names) => names,
            Err(error) => {
                warn!(
                    identifier = %staged.identifier,
                    %error,
                    "[acquisition] could not relocate download, skipping holder"
                );
                return Ok(());
            }
        };

        let mut guard = self.store.exclusive().await;
        let mut holders = guard.read(keys::KEY_SET_HOLDERS)?.unwrap_or_default();
        if holders.iter().any(|h| h.identifier == staged.identifier) {
            return Ok(());
        }
        holders.push(KeySetHolder {
            identifier: staged.identifier,
            signature_filename: Some(signature_filename),
            binary_filename: Some(binary_filename),
            creation_date: self.clock.now(),
            process_date: None,
        });
        guard.write(keys::KEY_SET_HOLDERS, &holders)?;
        Ok(())
    }
}
