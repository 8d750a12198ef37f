//! Mount model.
//!
//! This module handles:
//! - Bind mounts and bind spec parsing
//! - Fuse mount declarations and their `--fusemount` rendering
//! - Promotion of read-only CVMFS mounts to writeable overlays

mod bind;
mod fuse;
mod promote;

pub use bind::{BindMount, Permission};
pub use fuse::{FuseCmd, FuseMount};
pub use promote::{promote_writeable, DEFAULT_FUSE_CMD_RW};
