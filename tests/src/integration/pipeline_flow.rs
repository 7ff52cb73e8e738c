//! # Pipeline Flow
//!
//! Acquisition, quota, and detection working against one shared store and
//! blob directory, the way the runtime wires them. The distribution service,
//! matching engine, and notifier are the pipeline's own mocks; everything
//! between them is real.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use en_pipeline::ports::{
        MockDistributionClient, MockExposureEngine, MockUserNotifier, UserNotification,
    };
    use en_pipeline::{
        AcquisitionService, CallContext, DetectionService, PipelineConfig, QuotaRegime,
        QuotaTracker,
    };
    use en_storage::{BlobStore, FileSystem, MockFileSystem, StateStore};
    use shared_types::engine::{
        DetectionSummary, DiagnosisReportType, ExposureWindow, Infectiousness, ScanInstance,
    };
    use shared_types::entities::PipelineState;
    use shared_types::keys;
    use shared_types::time::{start_of_day, Clock, ManualClock, Timestamp, SECONDS_PER_DAY};

    const NOW: Timestamp = 100 * SECONDS_PER_DAY;

    // =========================================================================
    // FIXTURE
    // =========================================================================

    struct Pipeline {
        acquisition: AcquisitionService,
        detection: DetectionService,
        store: StateStore,
        client: Arc<MockDistributionClient>,
        engine: Arc<MockExposureEngine>,
        notifier: Arc<MockUserNotifier>,
        fs: Arc<MockFileSystem>,
        clock: Arc<ManualClock>,
    }

    fn pipeline(regime: QuotaRegime) -> Pipeline {
        let store = StateStore::in_memory();
        let fs = Arc::new(MockFileSystem::new());
        let blobs = BlobStore::new("/keysets", fs.clone() as Arc<dyn FileSystem>);
        let client = Arc::new(MockDistributionClient::new());
        client.stage_on(fs.clone());
        let engine = Arc::new(MockExposureEngine::new());
        let notifier = Arc::new(MockUserNotifier::new());
        let clock = Arc::new(ManualClock::new(NOW));
        let config = PipelineConfig::default();

        let quota = Arc::new(QuotaTracker::new(
            store.clone(),
            clock.clone() as Arc<dyn Clock>,
            regime,
            config.clone(),
        ));
        let acquisition = AcquisitionService::new(
            store.clone(),
            blobs.clone(),
            client.clone(),
            clock.clone() as Arc<dyn Clock>,
            config.clone(),
        );
        let detection = DetectionService::new(
            store.clone(),
            blobs,
            engine.clone(),
            notifier.clone(),
            quota,
            clock.clone() as Arc<dyn Clock>,
            config,
        );

        Pipeline {
            acquisition,
            detection,
            store,
            client,
            engine,
            notifier,
            fs,
            clock,
        }
    }

    impl Pipeline {
        /// Pretend the install has already seen its first batch, so
        /// acquisitions download instead of ignoring.
        async fn mark_not_fresh(&self) {
            let state = PipelineState {
                initial_batch_ignored: true,
                ..PipelineState::default()
            };
            self.store
                .write(keys::PIPELINE_STATE, &state)
                .await
                .unwrap();
        }

        fn arm_exposure(&self, day: Timestamp) {
            self.engine.set_summary(DetectionSummary {
                matched_key_count: 1,
                maximum_risk_score: 1800.0,
            });
            self.engine.set_windows(vec![ExposureWindow {
                date: day,
                scans: vec![ScanInstance {
                    typical_attenuation_db: 50,
                    min_attenuation_db: 40,
                    seconds_since_last_scan: 1800,
                }],
                report_type: DiagnosisReportType::ConfirmedTest,
                infectiousness: Infectiousness::Standard,
            }]);
        }

        async fn state(&self) -> PipelineState {
            self.store
                .read(keys::PIPELINE_STATE)
                .await
                .unwrap()
                .unwrap_or_default()
        }

        async fn holders(&self) -> Vec<shared_types::entities::KeySetHolder> {
            self.store
                .read(keys::KEY_SET_HOLDERS)
                .await
                .unwrap()
                .unwrap_or_default()
        }

        fn identifiers(names: &[&str]) -> Vec<String> {
            names.iter().map(|n| n.to_string()).collect()
        }
    }

    // =========================================================================
    // FULL CYCLE
    // =========================================================================

    #[tokio::test]
    async fn test_full_cycle_from_download_to_notification() {
        let p = pipeline(QuotaRegime::DailyCallCount);
        p.mark_not_fresh().await;
        let exposure_day = start_of_day(NOW) - 3 * SECONDS_PER_DAY;
        p.arm_exposure(exposure_day);

        p.acquisition
            .acquire(&Pipeline::identifiers(&["ks-a", "ks-b", "ks-c"]))
            .await
            .unwrap();
        p.detection.run(CallContext::Foreground).await.unwrap();

        // All three were fetched from the primary endpoint.
        let mut fetched = p.client.fetched_key_sets();
        fetched.sort();
        assert_eq!(
            fetched,
            vec![
                ("ks-a".to_string(), false),
                ("ks-b".to_string(), false),
                ("ks-c".to_string(), false)
            ]
        );

        // One engine call saw all three signature/binary pairs.
        let calls = p.engine.detect_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 6);

        // Every holder is processed and its files are gone.
        let holders = p.holders().await;
        assert_eq!(holders.len(), 3);
        assert!(holders.iter().all(|h| h.process_date == Some(NOW)));
        assert!(!p.fs.contains(std::path::Path::new("/keysets/ks-a.sig")));
        assert!(!p.fs.contains(std::path::Path::new("/keysets/ks-c.bin")));

        // The exposure surfaced exactly once, three days old.
        let report = p
            .store
            .read(keys::LATEST_EXPOSURE_REPORT)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.date, exposure_day);
        assert_eq!(
            p.notifier.delivered(),
            vec![UserNotification::ExposureDetected { days_ago: 3 }]
        );
        assert!(p.state().await.known_exposure_dates.contains(&exposure_day));

        // Foreground runs never set the unseen marker.
        assert_eq!(
            p.store.read(keys::UNSEEN_EXPOSURE_DATE).await.unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_background_run_records_unseen_notification() {
        let p = pipeline(QuotaRegime::DailyCallCount);
        p.mark_not_fresh().await;
        p.arm_exposure(start_of_day(NOW) - SECONDS_PER_DAY);

        p.acquisition
            .acquire(&Pipeline::identifiers(&["ks-a"]))
            .await
            .unwrap();
        p.detection.run(CallContext::Background).await.unwrap();

        assert_eq!(
            p.store.read(keys::UNSEEN_EXPOSURE_DATE).await.unwrap(),
            Some(NOW)
        );
    }

    // =========================================================================
    // FIRST BATCH
    // =========================================================================

    #[tokio::test]
    async fn test_fresh_install_ignores_history_then_processes_new_sets() {
        let p = pipeline(QuotaRegime::DailyCallCount);

        // First published batch: no downloads, no engine traffic.
        p.acquisition
            .acquire(&Pipeline::identifiers(&["old-1", "old-2"]))
            .await
            .unwrap();
        p.detection.run(CallContext::Background).await.unwrap();

        assert!(p.client.fetched_key_sets().is_empty());
        assert!(p.engine.detect_calls().is_empty());
        let holders = p.holders().await;
        assert_eq!(holders.len(), 2);
        assert!(holders.iter().all(|h| h.processed()));
        assert!(p.state().await.initial_batch_ignored);

        // The next manifest adds one genuinely new key set.
        p.acquisition
            .acquire(&Pipeline::identifiers(&["old-1", "old-2", "new-1"]))
            .await
            .unwrap();
        p.detection.run(CallContext::Background).await.unwrap();

        assert_eq!(
            p.client.fetched_key_sets(),
            vec![("new-1".to_string(), false)]
        );
        let calls = p.engine.detect_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 2);
        assert_eq!(p.holders().await.len(), 3);
    }

    #[tokio::test]
    async fn test_overlapping_acquisitions_keep_one_holder_per_identifier() {
        let p = pipeline(QuotaRegime::DailyCallCount);
        p.mark_not_fresh().await;

        let ids = Pipeline::identifiers(&["ks-a", "ks-b"]);
        let (first, second) =
            futures::join!(p.acquisition.acquire(&ids), p.acquisition.acquire(&ids));
        first.unwrap();
        second.unwrap();

        let holders = p.holders().await;
        let mut names: Vec<&str> = holders.iter().map(|h| h.identifier.as_str()).collect();
        names.sort_unstable();
        assert_eq!(names, vec!["ks-a", "ks-b"]);

        // A third pass finds nothing new to fetch.
        let fetches_before = p.client.fetched_key_sets().len();
        p.acquisition.acquire(&ids).await.unwrap();
        assert_eq!(p.client.fetched_key_sets().len(), fetches_before);
    }

    // =========================================================================
    // QUOTA ACROSS RUNS
    // =========================================================================

    #[tokio::test]
    async fn test_foreground_call_budget_runs_out_and_replenishes() {
        let p = pipeline(QuotaRegime::DailyCallCount);
        p.mark_not_fresh().await;

        for i in 0..9 {
            p.acquisition
                .acquire(&Pipeline::identifiers(&[&format!("fg-{i}")]))
                .await
                .unwrap();
            p.detection.run(CallContext::Foreground).await.unwrap();
        }
        assert_eq!(p.engine.detect_calls().len(), 9);

        // The tenth run has a key set waiting but no budget left.
        p.acquisition
            .acquire(&Pipeline::identifiers(&["fg-9"]))
            .await
            .unwrap();
        p.detection.run(CallContext::Foreground).await.unwrap();
        assert_eq!(p.engine.detect_calls().len(), 9);
        let waiting = p.holders().await;
        assert!(waiting
            .iter()
            .any(|h| h.identifier == "fg-9" && !h.processed()));

        // Once the rolling window has passed, the budget is back.
        p.clock.advance(25 * 3_600);
        p.detection.run(CallContext::Foreground).await.unwrap();
        assert_eq!(p.engine.detect_calls().len(), 10);
        assert!(p
            .holders()
            .await
            .iter()
            .all(|h| h.identifier != "fg-9" || h.processed()));
    }

    #[tokio::test]
    async fn test_file_budget_prefers_oldest_key_sets() {
        let p = pipeline(QuotaRegime::DailyFileCount);
        p.mark_not_fresh().await;

        // 14 of the 15 file slots in the window are already spent.
        let mut spent = Vec::new();
        for i in 0..14 {
            let mut holder =
                shared_types::entities::KeySetHolder::downloaded(format!("done-{i}"), NOW - 5_000);
            holder.process_date = Some(NOW - 1_000);
            spent.push(holder);
        }
        p.store
            .write(keys::KEY_SET_HOLDERS, &spent)
            .await
            .unwrap();

        // Three arrivals, oldest first.
        for name in ["oldest", "middle", "newest"] {
            p.acquisition
                .acquire(&Pipeline::identifiers(&[name]))
                .await
                .unwrap();
            p.clock.advance(60);
        }

        p.detection.run(CallContext::Background).await.unwrap();

        assert_eq!(p.engine.detect_calls().len(), 1);
        let holders = p.holders().await;
        let processed: Vec<&str> = holders
            .iter()
            .filter(|h| !h.identifier.starts_with("done-") && h.processed())
            .map(|h| h.identifier.as_str())
            .collect();
        assert_eq!(processed, vec!["oldest"]);
    }

    // =========================================================================
    // RECOVERY AND REPORTING RULES
    // =========================================================================

    #[tokio::test]
    async fn test_signature_rejection_reroutes_next_download_to_fallback() {
        let p = pipeline(QuotaRegime::DailyCallCount);
        p.mark_not_fresh().await;

        p.acquisition
            .acquire(&Pipeline::identifiers(&["ks-a"]))
            .await
            .unwrap();
        p.engine
            .fail_with(shared_types::errors::EngineError::SignatureValidation);
        p.detection.run(CallContext::Background).await.unwrap();

        // The batch was invalidated for re-download and the endpoint flipped.
        assert!(p.holders().await.is_empty());
        assert!(p.state().await.use_fallback_endpoint);

        p.engine.clear_failure();
        p.acquisition
            .acquire(&Pipeline::identifiers(&["ks-a"]))
            .await
            .unwrap();
        p.detection.run(CallContext::Background).await.unwrap();

        assert_eq!(
            p.client.fetched_key_sets(),
            vec![("ks-a".to_string(), false), ("ks-a".to_string(), true)]
        );
        assert!(p.holders().await.iter().all(|h| h.processed()));
    }

    #[tokio::test]
    async fn test_report_date_never_regresses() {
        let p = pipeline(QuotaRegime::DailyCallCount);
        p.mark_not_fresh().await;
        let recent_day = start_of_day(NOW) - 5 * SECONDS_PER_DAY;
        let older_day = start_of_day(NOW) - 8 * SECONDS_PER_DAY;

        p.arm_exposure(recent_day);
        p.acquisition
            .acquire(&Pipeline::identifiers(&["ks-1"]))
            .await
            .unwrap();
        p.detection.run(CallContext::Foreground).await.unwrap();

        // A later run finds an older exposure.
        p.arm_exposure(older_day);
        p.acquisition
            .acquire(&Pipeline::identifiers(&["ks-2"]))
            .await
            .unwrap();
        p.detection.run(CallContext::Foreground).await.unwrap();

        let report = p
            .store
            .read(keys::LATEST_EXPOSURE_REPORT)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.date, recent_day);

        // Only the first exposure was ever surfaced, but both are remembered.
        assert_eq!(p.notifier.delivered().len(), 1);
        let state = p.state().await;
        assert!(state.known_exposure_dates.contains(&recent_day));
        assert!(state.known_exposure_dates.contains(&older_day));
    }
}
