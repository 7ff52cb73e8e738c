//! # Adapter Implementations
//!
//! Concrete implementations of the pipeline's outbound ports:
//!
//! - [`DirDistributionClient`]: serves manifest, configuration, and key set
//!   files from a local directory tree, standing in for the CDN and the
//!   health-authority API.
//! - [`StubEngine`]: a matching engine that never reports a match. The real
//!   engine is supplied by the host platform; the stub lets the rest of the
//!   pipeline run end to end without one.
//! - [`LogNotifier`]: delivers user notifications to the log.

pub mod notifier;
pub mod sim_distribution;
pub mod stub_engine;

pub use notifier::*;
pub use sim_distribution::*;
pub use stub_engine::*;
