//! # Exposure-Notification Client Test Suite
//!
//! Unified test crate containing the cross-crate flows:
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── pipeline_flow.rs   # acquisition + quota + detection over one store
//!     ├── upload_flow.rs     # diagnosis-key uploads and the retry queue
//!     └── runtime_flow.rs    # controller + adapters over real files
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! # All tests
//! cargo test -p en-tests
//!
//! # By category
//! cargo test -p en-tests integration::pipeline_flow
//! cargo test -p en-tests integration::runtime_flow
//! ```

pub mod integration;
