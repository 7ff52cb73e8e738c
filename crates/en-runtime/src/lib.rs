//! # Runtime Library
//!
//! This library exposes the internal modules of the client runtime for
//! testing. The main entry point is the `en-client` binary.
//!
//! - [`controller`]: the facade the embedding application and the scheduler
//!   call into. Coalesces concurrent pipeline requests, runs first-launch
//!   initialization and version migrations.
//! - [`scheduler`]: the periodic background driver.
//! - [`adapters`]: concrete implementations of the pipeline's collaborator
//!   ports (distribution backend, matching engine, user notifier).
//! - [`wiring`]: builds the service graph the controller fronts.
//! - [`config`]: environment-driven runtime configuration.

pub mod adapters;
pub mod config;
pub mod controller;
pub mod scheduler;
pub mod wiring;

pub use config::RuntimeConfig;
pub use controller::ExposureController;
pub use scheduler::Scheduler;
pub use wiring::{build_controller, Collaborators};
