//! # Upload Flow
//!
//! The diagnosis-key upload path through the controller facades: confirmation
//! key caching, the silent retry queue behind a failed upload, and the
//! support-desk notification once the upload window closes.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use en_pipeline::ports::{
        DeliveryMoment, MockDistributionClient, MockExposureEngine, MockUserNotifier,
        UserNotification,
    };
    use en_pipeline::{PipelineConfig, QuotaRegime};
    use en_runtime::{build_controller, Collaborators, ExposureController};
    use en_storage::{BlobStore, FileSystem, MockFileSystem, StateStore};
    use shared_types::entities::{DiagnosisKey, LabConfirmationKey};
    use shared_types::keys;
    use shared_types::time::{Clock, ManualClock, Timestamp, SECONDS_PER_DAY};

    // Midday, inside support desk hours.
    const NOW: Timestamp = 200 * SECONDS_PER_DAY + 12 * 3_600;

    // =========================================================================
    // FIXTURE
    // =========================================================================

    struct Upload {
        controller: Arc<ExposureController>,
        store: StateStore,
        client: Arc<MockDistributionClient>,
        notifier: Arc<MockUserNotifier>,
        clock: Arc<ManualClock>,
    }

    fn upload_fixture() -> Upload {
        let store = StateStore::in_memory();
        let client = Arc::new(MockDistributionClient::new());
        let notifier = Arc::new(MockUserNotifier::new());
        let clock = Arc::new(ManualClock::new(NOW));

        let controller = build_controller(Collaborators {
            store: store.clone(),
            blobs: BlobStore::new(
                "/keysets",
                Arc::new(MockFileSystem::new()) as Arc<dyn FileSystem>,
            ),
            client: client.clone(),
            engine: Arc::new(MockExposureEngine::new()),
            notifier: notifier.clone(),
            clock: clock.clone() as Arc<dyn Clock>,
            quota_regime: QuotaRegime::DailyCallCount,
            config: PipelineConfig::default(),
        });

        Upload {
            controller,
            store,
            client,
            notifier,
            clock,
        }
    }

    fn confirmation_key(identifier: &str, valid_until: Timestamp) -> LabConfirmationKey {
        LabConfirmationKey {
            identifier: identifier.into(),
            bucket_identifier: vec![0x10; 16],
            confirmation_key: vec![0x20; 32],
            valid_until,
        }
    }

    fn batch(tag: u8) -> Vec<DiagnosisKey> {
        vec![DiagnosisKey {
            key_data: vec![tag; 16],
            rolling_start_number: 2_650_000,
            rolling_period: 144,
            transmission_risk_level: 4,
        }]
    }

    impl Upload {
        async fn pending(&self) -> Vec<shared_types::entities::PendingUploadRequest> {
            self.store
                .read(keys::PENDING_UPLOAD_REQUESTS)
                .await
                .unwrap()
                .unwrap_or_default()
        }
    }

    // =========================================================================
    // RETRY UNTIL SUCCESS
    // =========================================================================

    #[tokio::test]
    async fn test_failed_upload_succeeds_on_a_later_drain() {
        let u = upload_fixture();
        u.client
            .set_lab_confirmation_key(confirmation_key("GGD-1", NOW + 2 * SECONDS_PER_DAY));
        u.client.fail_posts(true);

        // The caller sees success; the failure lands in the queue.
        u.controller.upload_diagnosis_keys(batch(0xa1)).await.unwrap();
        assert!(u.client.posted_uploads().is_empty());
        assert_eq!(u.pending().await.len(), 1);

        u.client.fail_posts(false);
        u.controller.drain_pending_uploads().await.unwrap();

        let posted = u.client.posted_uploads();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].0, batch(0xa1));
        assert_eq!(posted[0].1.identifier, "GGD-1");
        assert!(u.pending().await.is_empty());
        assert!(u.notifier.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_queue_preserves_submission_order_across_failed_drains() {
        let u = upload_fixture();
        u.client
            .set_lab_confirmation_key(confirmation_key("GGD-1", NOW + 2 * SECONDS_PER_DAY));
        u.client.fail_posts(true);

        for tag in [0xa1, 0xa2, 0xa3] {
            u.controller.upload_diagnosis_keys(batch(tag)).await.unwrap();
        }

        // A drain that still cannot reach the endpoint changes nothing.
        u.controller.drain_pending_uploads().await.unwrap();
        let queued = u.pending().await;
        assert_eq!(queued.len(), 3);
        assert_eq!(queued[0].diagnosis_keys, batch(0xa1));
        assert_eq!(queued[2].diagnosis_keys, batch(0xa3));

        u.client.fail_posts(false);
        u.controller.drain_pending_uploads().await.unwrap();

        let posted = u.client.posted_uploads();
        assert_eq!(posted.len(), 3);
        assert_eq!(posted[0].0, batch(0xa1));
        assert_eq!(posted[1].0, batch(0xa2));
        assert_eq!(posted[2].0, batch(0xa3));
        assert!(u.pending().await.is_empty());
    }

    // =========================================================================
    // EXPIRY
    // =========================================================================

    #[tokio::test]
    async fn test_expired_request_notifies_instead_of_posting() {
        let u = upload_fixture();
        u.client
            .set_lab_confirmation_key(confirmation_key("GGD-1", NOW + 500));
        u.client.fail_posts(true);
        u.controller.upload_diagnosis_keys(batch(0xa1)).await.unwrap();

        // The upload window closes before the next drain.
        u.clock.advance(1_000);
        u.client.fail_posts(false);
        u.controller.drain_pending_uploads().await.unwrap();

        assert!(u.client.posted_uploads().is_empty());
        assert_eq!(
            u.notifier.delivered(),
            vec![UserNotification::UploadFailed {
                moment: DeliveryMoment::Immediate
            }]
        );
        assert!(u.pending().await.is_empty());
    }

    #[tokio::test]
    async fn test_after_hours_expiry_defers_the_notification() {
        let u = upload_fixture();
        u.client
            .set_lab_confirmation_key(confirmation_key("GGD-1", NOW + 500));
        u.client.fail_posts(true);
        u.controller.upload_diagnosis_keys(batch(0xa1)).await.unwrap();

        // 21:00, after the support desk has closed.
        u.clock.advance(9 * 3_600);
        u.controller.drain_pending_uploads().await.unwrap();

        assert_eq!(
            u.notifier.delivered(),
            vec![UserNotification::UploadFailed {
                moment: DeliveryMoment::NextOpeningHours
            }]
        );
    }
}
