//! # Application Services
//!
//! The orchestrating services of the pipeline. Each one composes the store,
//! the clock, and the outbound ports; the pure rules they apply live in
//! [`crate::domain`].

pub mod acquisition;
pub mod detection;
pub mod manifest;
pub mod quota;
pub mod uploads;

pub use acquisition::AcquisitionService;
pub use detection::DetectionService;
pub use manifest::ManifestService;
pub use quota::QuotaTracker;
pub use uploads::{RetryQueueService, UploadService};
