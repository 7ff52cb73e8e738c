//! # Ports
//!
//! Interfaces to the external collaborators this core drives, plus the mock
//! implementations the test suites share.

pub mod outbound;

pub use outbound::{
    DeliveryMoment, DistributionClient, ExposureEngine, MockDistributionClient,
    MockExposureEngine, MockUserNotifier, StagedKeySet, UserNotification, UserNotifier,
};
