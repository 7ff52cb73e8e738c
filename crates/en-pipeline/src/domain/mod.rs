//! # Domain Logic
//!
//! Pure, synchronous logic with no I/O: quota accounting, window scoring,
//! and the per-run holder result algebra. Everything here is exercised by
//! the async services in `application/`.

pub mod quota;
pub mod results;
pub mod risk;
