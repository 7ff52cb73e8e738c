//! # Pipeline Crate
//!
//! The exposure-notification client core:
//!
//! - [`application::manifest`]: TTL-cached manifest, application
//!   configuration, and risk-parameter retrieval.
//! - [`application::quota`]: engine-call and key-set budgets under the two
//!   platform rate-limiting regimes.
//! - [`application::acquisition`]: which key sets are new, the
//!   first-batch-ignore policy, downloads, holder bookkeeping.
//! - [`application::detection`]: batch selection, engine invocation, exposure
//!   reports, de-duplication, blob cleanup.
//! - [`application::uploads`]: diagnosis-key upload, the pending-upload retry
//!   queue, lab confirmation keys.
//!
//! Pure logic lives in [`domain`]; the collaborator interfaces (matching
//! engine, distribution client, user notifier) live in [`ports`] together
//! with their mocks.

pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use application::acquisition::AcquisitionService;
pub use application::detection::DetectionService;
pub use application::manifest::ManifestService;
pub use application::quota::QuotaTracker;
pub use application::uploads::{RetryQueueService, UploadService};
pub use config::PipelineConfig;
pub use domain::quota::{CallContext, QuotaRegime};
