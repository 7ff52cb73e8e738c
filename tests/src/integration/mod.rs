//! # Integration Flows
//!
//! Exercises the pipeline across crate boundaries: the services share one
//! store and one blob directory exactly as they do in the runtime, with the
//! platform collaborators (engine, notifier, distribution) mocked or backed
//! by real temp directories depending on the flow.

pub mod pipeline_flow;
pub mod runtime_flow;
pub mod upload_flow;
