//! # Background Scheduler
//!
//! Drives the pipeline while the process is up: one cycle per tick, then a
//! drain of the pending-upload queue. Failures are logged and the loop keeps
//! going; the next tick gets a fresh chance.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use en_pipeline::CallContext;

use crate::controller::ExposureController;

/// Periodic pipeline driver. Consumed by [`Scheduler::run`].
pub struct Scheduler {
    controller: Arc<ExposureController>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(
        controller: Arc<ExposureController>,
        interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            controller,
            interval,
            shutdown,
        }
    }

    /// Run until the shutdown signal flips. The first tick fires right away,
    /// so a freshly started process checks for new key sets immediately.
    pub async fn run(self) {
        let Scheduler {
            controller,
            interval,
            mut shutdown,
        } = self;

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval_secs = interval.as_secs(), "[scheduler] started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(error) = controller.update_and_process(CallContext::Background).await {
                        warn!(%error, "[scheduler] pipeline cycle failed");
                    }
                    if let Err(error) = controller.drain_pending_uploads().await {
                        warn!(%error, "[scheduler] upload retry drain failed");
                    }
                }
                changed = shutdown.changed() => {
                    // A dropped sender counts as a shutdown.
                    if changed.is_err() || *shutdown.borrow() {
                        info!("[scheduler] shutdown signal received");
                        break;
                    }
                }
            }
        }
    }
}
