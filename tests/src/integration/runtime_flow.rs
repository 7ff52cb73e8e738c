//! # Runtime Flow
//!
//! The whole client over real files: a file-backed store, blob directory,
//! and the directory distribution client, driven through the controller the
//! way the binary drives it. Only the matching engine and the notifier stay
//! mocked, since both front platform services.

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use en_pipeline::ports::{MockExposureEngine, MockUserNotifier, UserNotification};
    use en_pipeline::{CallContext, PipelineConfig, QuotaRegime};
    use en_runtime::adapters::DirDistributionClient;
    use en_runtime::{build_controller, Collaborators, ExposureController};
    use en_storage::{BlobStore, FileBackedKvStore, FileSystem, StateStore, StdFileSystem};
    use shared_types::engine::{
        DetectionSummary, DiagnosisReportType, ExposureWindow, Infectiousness, RiskConfiguration,
        ScanInstance,
    };
    use shared_types::entities::{
        ApplicationConfiguration, ApplicationManifest, DiagnosisKey,
    };
    use shared_types::keys;
    use shared_types::time::{start_of_day, Clock, ManualClock, Timestamp, SECONDS_PER_DAY};

    const NOW: Timestamp = 100 * SECONDS_PER_DAY + 12 * 3_600;

    // =========================================================================
    // FIXTURE
    // =========================================================================

    /// One simulated install: a served distribution tree plus the client's
    /// own store, staging, and blob directories, all under one tempdir.
    struct Deployment {
        dir: tempfile::TempDir,
        engine: Arc<MockExposureEngine>,
        notifier: Arc<MockUserNotifier>,
        clock: Arc<ManualClock>,
    }

    impl Deployment {
        fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                engine: Arc::new(MockExposureEngine::new()),
                notifier: Arc::new(MockUserNotifier::new()),
                clock: Arc::new(ManualClock::new(NOW)),
            }
        }

        fn dist(&self) -> PathBuf {
            self.dir.path().join("dist")
        }

        fn store_path(&self) -> PathBuf {
            self.dir.path().join("store.bin")
        }

        fn blob_dir(&self) -> PathBuf {
            self.dir.path().join("blobs")
        }

        /// Build the controller the way `main` builds it, reusing whatever
        /// the store file already holds.
        fn boot(&self) -> (Arc<ExposureController>, StateStore) {
            let store = StateStore::new(FileBackedKvStore::open(self.store_path()).unwrap());
            let controller = build_controller(Collaborators {
                store: store.clone(),
                blobs: BlobStore::new(
                    self.blob_dir(),
                    Arc::new(StdFileSystem) as Arc<dyn FileSystem>,
                ),
                client: Arc::new(DirDistributionClient::new(
                    self.dist(),
                    self.dir.path().join("staging"),
                    self.clock.clone() as Arc<dyn Clock>,
                )),
                engine: self.engine.clone(),
                notifier: self.notifier.clone(),
                clock: self.clock.clone() as Arc<dyn Clock>,
                quota_regime: QuotaRegime::DailyCallCount,
                config: PipelineConfig::default(),
            });
            (controller, store)
        }

        /// (Re)publish the distribution documents with the given key set list.
        fn publish_documents(&self, key_set_identifiers: &[&str]) {
            std::fs::create_dir_all(self.dist().join("keysets")).unwrap();

            let manifest = ApplicationManifest {
                key_set_identifiers: key_set_identifiers.iter().map(|s| s.to_string()).collect(),
                app_configuration_identifier: "cfg-1".into(),
                risk_parameters_identifier: "risk-1".into(),
                creation_date: 0,
            };
            let configuration = ApplicationConfiguration {
                identifier: "cfg-1".into(),
                creation_date: 0,
                manifest_refresh_frequency_minutes: 240,
            };
            let risk = RiskConfiguration {
                identifier: "risk-1".into(),
                ..RiskConfiguration::default()
            };

            std::fs::write(
                self.dist().join("manifest.json"),
                serde_json::to_vec(&manifest).unwrap(),
            )
            .unwrap();
            std::fs::write(
                self.dist().join("configuration.json"),
                serde_json::to_vec(&configuration).unwrap(),
            )
            .unwrap();
            std::fs::write(
                self.dist().join("risk_parameters.json"),
                serde_json::to_vec(&risk).unwrap(),
            )
            .unwrap();
        }

        fn publish_key_set(&self, identifier: &str) {
            let keysets = self.dist().join("keysets");
            std::fs::write(keysets.join(format!("{identifier}.sig")), b"sig-bytes").unwrap();
            std::fs::write(keysets.join(format!("{identifier}.bin")), b"bin-bytes").unwrap();
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
    }

    // =========================================================================
    // FULL STACK CYCLES
    // =========================================================================

    #[tokio::test]
    async fn test_cold_start_then_incremental_cycle_over_real_files() {
        let d = Deployment::new();
        d.publish_documents(&["day0-a", "day0-b"]);
        d.publish_key_set("day0-a");
        d.publish_key_set("day0-b");

        let (controller, store) = d.boot();
        controller.initialize().await.unwrap();
        controller
            .update_and_process(CallContext::Foreground)
            .await
            .unwrap();

        // Pre-install history is remembered but never downloaded.
        assert!(d.engine.detect_calls().is_empty());
        assert!(!d.blob_dir().join("day0-a.sig").exists());

        // The next manifest adds one key set; the cached copy has to expire
        // before the client sees it.
        d.publish_documents(&["day0-a", "day0-b", "day1-c"]);
        d.publish_key_set("day1-c");
        d.clock.advance(241 * 60);
        let exposure_day = start_of_day(d.clock.now()) - 2 * SECONDS_PER_DAY;
        d.arm_exposure(exposure_day);

        controller
            .update_and_process(CallContext::Foreground)
            .await
            .unwrap();

        // Exactly the new key set went to the engine, from the blob store.
        let calls = d.engine.detect_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 2);
        assert!(calls[0]
            .iter()
            .all(|path| path.starts_with(d.blob_dir())
                && path.to_string_lossy().contains("day1-c")));

        assert_eq!(
            d.notifier.delivered(),
            vec![UserNotification::ExposureDetected { days_ago: 2 }]
        );
        let report = store
            .read(keys::LATEST_EXPOSURE_REPORT)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(report.date, exposure_day);

        // Consumed blobs are deleted; the served tree keeps its files.
        assert!(!d.blob_dir().join("day1-c.sig").exists());
        assert!(d.dist().join("keysets/day1-c.sig").exists());
        assert!(d.store_path().exists());
    }

    #[tokio::test]
    async fn test_state_survives_a_process_restart() {
        let d = Deployment::new();
        d.publish_documents(&["ks-a"]);
        d.publish_key_set("ks-a");

        {
            let (controller, _) = d.boot();
            controller.initialize().await.unwrap();
            controller
                .update_and_process(CallContext::Background)
                .await
                .unwrap();
        }
        assert!(d.engine.detect_calls().is_empty());

        // Same install, new process over the same store file.
        let (controller, store) = d.boot();
        controller.initialize().await.unwrap();

        d.publish_documents(&["ks-a", "ks-b"]);
        d.publish_key_set("ks-b");
        d.clock.advance(241 * 60);
        controller
            .update_and_process(CallContext::Background)
            .await
            .unwrap();

        // ks-a stayed remembered across the restart; only ks-b was processed.
        let calls = d.engine.detect_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].len(), 2);
        assert!(calls[0][0].to_string_lossy().contains("ks-b"));

        let holders = store.read(keys::KEY_SET_HOLDERS).await.unwrap().unwrap();
        assert_eq!(holders.len(), 2);

        // The repeated initialize neither re-ran first-run setup nor armed
        // the upgrade suppression.
        let state = store.read(keys::PIPELINE_STATE).await.unwrap().unwrap();
        assert!(state.initial_batch_ignored);
        assert!(!state.ignore_first_v2_exposure);
    }

    #[tokio::test]
    async fn test_upload_round_trip_reaches_the_upload_journal() {
        let d = Deployment::new();
        std::fs::create_dir_all(d.dist()).unwrap();
        let (controller, _) = d.boot();

        let key = controller.request_lab_confirmation_key().await.unwrap();
        assert!(key.identifier.starts_with("GGD-"));

        controller
            .upload_diagnosis_keys(vec![DiagnosisKey {
                key_data: vec![0xaa; 16],
                rolling_start_number: 2_650_000,
                rolling_period: 144,
                transmission_risk_level: 4,
            }])
            .await
            .unwrap();

        let journal = std::fs::read_to_string(d.dist().join("uploads.jsonl")).unwrap();
        assert_eq!(journal.lines().count(), 1);
        assert!(journal.contains(&key.identifier));
    }
}
