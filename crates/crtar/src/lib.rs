//! # crtar
//!
//! Packs a finished software build into a tarball for CVMFS ingestion.
//!
//! This crate provides:
//! - Build output layout inside a writeable overlay
//! - Discovery of module files and EasyBuild installations
//! - Durable manifests for `tar --files-from`
//! - Lockfile-guarded archive creation

#![warn(missing_docs)]

pub mod archive;
pub mod cli;
pub mod discover;
pub mod layout;
pub mod lock;
pub mod manifest;

pub use archive::Archiver;
pub use layout::SourceLayout;
pub use lock::{Lockfile, lock_path_for};
pub use manifest::Manifest;
