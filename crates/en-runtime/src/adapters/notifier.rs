//! # Log Notifier
//!
//! Delivers user notifications to the process log. The host platform's
//! notification center is the real target; until one is bound, operators can
//! at least see what would have been shown.

use async_trait::async_trait;
use tracing::info;

use en_pipeline::ports::outbound::{DeliveryMoment, UserNotification, UserNotifier};
use shared_types::errors::NotifyError;

/// Notifier that writes every message to the log and is always authorized.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl UserNotifier for LogNotifier {
    async fn is_authorized(&self) -> bool {
        true
    }

    async fn notify(&self, notification: UserNotification) -> Result<(), NotifyError> {
        match notification {
            UserNotification::ExposureDetected { days_ago } => {
                info!(days_ago, "[notify] exposure detected");
            }
            UserNotification::UploadFailed { moment } => {
                let timing = match moment {
                    DeliveryMoment::Immediate => "now",
                    DeliveryMoment::NextOpeningHours => "at next opening hours",
                };
                info!(timing, "[notify] diagnosis-key upload expired");
            }
        }
        Ok(())
    }
}
