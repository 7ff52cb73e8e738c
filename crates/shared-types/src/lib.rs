//! # Shared Types Crate
//!
//! This crate contains the domain entities, engine exchange types, error
//! taxonomy, clock abstraction, and storage key catalog shared across the
//! exposure-notification client crates.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: every type that crosses a crate boundary is
//!   defined here.
//! - **Plain Data**: entities are serde-serializable records with no behavior
//!   beyond derived facts; all orchestration lives in the pipeline crates.
//! - **Closed Error Unions**: platform error surfaces (engine, network) are
//!   modeled as closed enums mapped once at their boundary.

pub mod entities;
pub mod engine;
pub mod errors;
pub mod keys;
pub mod time;

pub use entities::*;
pub use engine::*;
pub use errors::*;
pub use time::{Clock, ManualClock, SystemClock, Timestamp, SECONDS_PER_DAY};
