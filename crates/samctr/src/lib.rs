//! # samctr
//!
//! Containerized build environment for CVMFS software repositories.
//!
//! `samctr` prepares a per-run scratch tree on the host, composes the bind
//! and fuse mounts a build container needs (optionally promoting read-only
//! CVMFS repositories to writeable overlays) and launches `apptainer`.
//!
//! ## Usage
//!
//! ```no_run
//! use samctr::config::Config;
//! use samctr::container::ApptainerPuller;
//! use samctr::runtime::{Overrides, PrepareContext, prepare};
//!
//! # async fn example() -> sam_common::SamResult<()> {
//! let config = Config::load(None)?;
//! let ctx = PrepareContext::resolve(config, Overrides::default())?;
//! let runtime = prepare(&ctx, &ApptainerPuller).await?;
//! println!("{}", runtime.container_sif.display());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod apptainer;
pub mod cli;
pub mod config;
pub mod container;
pub mod mounts;
pub mod runtime;
pub mod storage;

pub use mounts::{BindMount, FuseCmd, FuseMount, Permission, promote_writeable};
pub use storage::{StorageOptions, StorageState, setup_storage};
