//! # sam-common
//!
//! Shared utilities and types for the SAM build environment tools.
//!
//! This crate provides common functionality used by `samctr` and `crtar`:
//! - The common error type
//! - Run root and container path layout
//! - Subprocess execution under a deadline

#![warn(missing_docs)]

pub mod error;
pub mod paths;
pub mod process;

pub use error::{SamError, SamResult};
pub use paths::RunRoot;
pub use process::{Cmd, CommandOutput, LONG_TIMEOUT, PROBE_TIMEOUT};
