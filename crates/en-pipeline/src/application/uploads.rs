//! # Diagnosis Key Upload & Retry Queue
//!
//! Uploading a positive user's own keys. The lab confirmation key is cached
//! while its validity window is open; a failed upload is never surfaced
//! directly but queued and retried serially until that window closes, at
//! which point the user is asked to contact the support desk instead.

use std::sync::Arc;

use tracing::{debug, info, warn};

use en_storage::StateStore;
use shared_types::entities::{DiagnosisKey, LabConfirmationKey, PendingUploadRequest};
use shared_types::errors::ExposureError;
use shared_types::keys;
use shared_types::time::Timestamp;
use shared_types::{Clock, SECONDS_PER_DAY};

use crate::config::PipelineConfig;
use crate::ports::{DeliveryMoment, DistributionClient, UserNotification, UserNotifier};

/// Requests lab confirmation keys and uploads diagnosis keys.
pub struct UploadService {
    store: StateStore,
    client: Arc<dyn DistributionClient>,
    clock: Arc<dyn Clock>,
}

impl UploadService {
    pub fn new(store: StateStore, client: Arc<dyn DistributionClient>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            client,
            clock,
        }
    }

    /// The current lab confirmation key, reusing the stored one while it is
    /// still accepted by the upload endpoint.
    pub async fn lab_confirmation_key(&self) -> Result<LabConfirmationKey, ExposureError> {
        let now = self.clock.now();
        if let Some(key) = self.store.read(keys::LAB_CONFIRMATION_KEY).await? {
            if key.is_valid(now) {
                debug!("[uploads] reusing stored lab confirmation key");
                return Ok(key);
            }
        }

        let key = self.client.request_lab_confirmation_key().await?;
        self.store.write(keys::LAB_CONFIRMATION_KEY, &key).await?;
        info!(identifier = %key.identifier, "[uploads] obtained lab confirmation key");
        Ok(key)
    }

    /// Upload diagnosis keys under the given confirmation key. A failed
    /// upload is queued for retry and reported as success; the retry queue
    /// owns the failure from here on.
    pub async fn upload_diagnosis_keys(
        &self,
        diagnosis_keys: Vec<DiagnosisKey>,
        confirmation_key: LabConfirmationKey,
    ) -> Result<(), ExposureError> {
        match self
            .client
            .post_diagnosis_keys(&diagnosis_keys, &confirmation_key)
            .await
        {
            Ok(()) => {
                info!(
                    count = diagnosis_keys.len(),
                    "[uploads] diagnosis keys uploaded"
                );
                Ok(())
            }
            Err(error) => {
                warn!(%error, "[uploads] upload failed, queuing for retry");
                let request = PendingUploadRequest {
                    expiry_date: confirmation_key.valid_until,
                    lab_confirmation_key: confirmation_key,
                    diagnosis_keys,
                };
                let mut guard = self.store.exclusive().await;
                let mut pending = guard
                    .read(keys::PENDING_UPLOAD_REQUESTS)?
                    .unwrap_or_default();
                pending.push(request);
                guard.write(keys::PENDING_UPLOAD_REQUESTS, &pending)?;
                Ok(())
            }
        }
    }
}

/// Drains the pending upload queue: expired requests notify the user and
/// leave, live ones are retried one at a time.
pub struct RetryQueueService {
    store: StateStore,
    client: Arc<dyn DistributionClient>,
    notifier: Arc<dyn UserNotifier>,
    clock: Arc<dyn Clock>,
    config: PipelineConfig,
}

impl RetryQueueService {
    pub fn new(
        store: StateStore,
        client: Arc<dyn DistributionClient>,
        notifier: Arc<dyn UserNotifier>,
        clock: Arc<dyn Clock>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            client,
            notifier,
            clock,
            config,
        }
    }

    /// One drain pass over the queue. Expiry is the only way a request ever
    /// leaves without succeeding.
    pub async fn drain(&self) -> Result<(), ExposureError> {
        let now = self.clock.now();
        let pending = self
            .store
            .read(keys::PENDING_UPLOAD_REQUESTS)
            .await?
            .unwrap_or_default();
        if pending.is_empty() {
            return Ok(());
        }

        let (expired, live): (Vec<PendingUploadRequest>, Vec<PendingUploadRequest>) =
            pending.into_iter().partition(|r| r.is_expired(now));

        for request in &expired {
            info!(
                identifier = %request.lab_confirmation_key.identifier,
                "[uploads] upload window closed, notifying user"
            );
            let moment = delivery_moment(now, &self.config);
            if let Err(error) = self
                .notifier
                .notify(UserNotification::UploadFailed { moment })
                .await
            {
                warn!(%error, "[uploads] failure notification not delivered");
            }
        }

        // Retries run one at a time to keep the endpoint load bounded and
        // the retry order deterministic.
        let mut completed = expired;
        for request in live {
            match self
                .client
                .post_diagnosis_keys(&request.diagnosis_keys, &request.lab_confirmation_key)
                .await
            {
                Ok(()) => {
                    info!(
                        identifier = %request.lab_confirmation_key.identifier,
                        "[uploads] retried upload succeeded"
                    );
                    completed.push(request);
                }
                Err(error) => {
                    warn!(%error, "[uploads] retry failed, keeping request queued");
                }
            }
        }

        if !completed.is_empty() {
            let mut guard = self.store.exclusive().await;
            let mut stored = guard
                .read(keys::PENDING_UPLOAD_REQUESTS)?
                .unwrap_or_default();
            stored.retain(|request| !completed.contains(request));
            guard.write(keys::PENDING_UPLOAD_REQUESTS, &stored)?;
        }
        Ok(())
    }
}

/// When a failed-upload notification should reach the user: right away while
/// the support desk is answering calls, otherwise at the next opening.
fn delivery_moment(now: Timestamp, config: &PipelineConfig) -> DeliveryMoment {
    let hour = ((now % SECONDS_PER_DAY) / 3_600) as u8;
    if (config.support_desk_opens_hour..config.support_desk_closes_hour).contains(&hour) {
        DeliveryMoment::Immediate
    } else {
        DeliveryMoment::NextOpeningHours
    }
}
