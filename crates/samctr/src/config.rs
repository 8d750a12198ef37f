//! `samctr` configuration file.
//!
//! Looked up at `--config`, else `<config_dir>/samctr/config.yaml`:
//!
//! ```yaml
//! image: docker://ghcr.io/eessi/build-node:debian12
//! nvidia: all
//! bind_paths:
//!   - /scratch:/scratch
//! fusemounts:
//!   - type: container
//!     fuse_cmd: cvmfs2
//!     fuse_arg: software.eessi.io
//!     ctr_mountpoint: /cvmfs/software.eessi.io
//! writeable_repos:
//!   - software.asc.ac.at
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use sam_common::{SamError, SamResult};

use crate::mounts::{DEFAULT_FUSE_CMD_RW, FuseMount};

/// Application name used for the config directory.
pub const APP_NAME: &str = "samctr";

/// Default GPU mode.
pub const DEFAULT_NVIDIA: &str = "all";

/// Decoded configuration. Empty strings and lists count as unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// `APPTAINER_HOME` override, `host:ctr`.
    pub apptainer_var_home: String,
    /// `APPTAINER_CACHEDIR` override.
    pub apptainer_var_cachedir: String,
    /// Prefix of freshly created run roots.
    pub root_tmp_dir_prefix: String,
    /// Bind specs added to every container.
    pub bind_paths: Vec<String>,
    /// GPU mode (`all` or `none`).
    pub nvidia: String,
    /// EESSI host injections directory.
    pub host_injections: String,
    /// Container image reference.
    pub image: String,
    /// Read-only fuse mounts.
    pub fusemounts: Vec<FuseMount>,
    /// Fuse backend for writeable repositories.
    pub fuse_cmd_rw: String,
    /// Repositories to mount writeable.
    pub writeable_repos: Vec<String>,
}

/// GPU support inside the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NvidiaMode {
    /// Require `nvidia-smi` on the host and pass `--nv`.
    #[default]
    All,
    /// No GPU setup.
    None,
}

impl FromStr for NvidiaMode {
    type Err = SamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "all" => Ok(Self::All),
            "none" => Ok(Self::None),
            other => Err(SamError::config(format!("nvidia mode {other:?} not supported"))),
        }
    }
}

impl fmt::Display for NvidiaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::None => write!(f, "none"),
        }
    }
}

impl Config {
    /// Default config file location.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(APP_NAME).join("config.yaml"))
    }

    /// Load the config file.
    ///
    /// An explicit path must exist. A missing file at the default location
    /// yields an empty config.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or decoded.
    pub fn load(path: Option<&Path>) -> SamResult<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match Self::default_path() {
                Some(p) => (p, false),
                None => {
                    tracing::debug!("No config directory, using empty config");
                    return Ok(Self::default());
                }
            },
        };

        if !explicit && !path.exists() {
            tracing::debug!(path = %path.display(), "No config file found");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path).map_err(|e| {
            SamError::config(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = Self::from_yaml(&contents).map_err(|e| {
            SamError::config(format!("failed to decode {}: {e}", path.display()))
        })?;

        tracing::info!(path = %path.display(), "Using config file");
        Ok(config)
    }

    /// Decode a YAML document. An empty document is an empty config.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is not a valid config.
    pub fn from_yaml(contents: &str) -> SamResult<Self> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents).map_err(|e| SamError::config(e.to_string()))
    }

    /// Check required values and fill defaults.
    ///
    /// Requires an image and at least one fully specified fuse mount, and a
    /// supported GPU mode. An empty `nvidia` becomes `all`; an empty
    /// `fuse_cmd_rw` becomes `fuse-overlayfs`.
    ///
    /// # Errors
    ///
    /// Returns [`SamError::Config`] describing the first problem found.
    pub fn validate(&mut self) -> SamResult<()> {
        if self.image.trim().is_empty() {
            return Err(SamError::config("image is required"));
        }

        if self.fusemounts.is_empty() {
            return Err(SamError::config(
                "fusemounts must be defined and contain at least one entry",
            ));
        }

        for (i, fm) in self.fusemounts.iter().enumerate() {
            let complete = [
                fm.mount_type.as_str(),
                fm.fuse_cmd.as_str(),
                fm.fuse_arg.as_str(),
                fm.ctr_mountpoint.as_str(),
            ]
            .iter()
            .all(|v| !v.trim().is_empty());
            if !complete {
                return Err(SamError::config(format!(
                    "fusemounts[{i}] must contain type, fuse_cmd, fuse_arg and ctr_mountpoint"
                )));
            }
        }

        if self.nvidia.trim().is_empty() {
            self.nvidia = DEFAULT_NVIDIA.to_string();
        }
        self.nvidia_mode()?;

        if self.fuse_cmd_rw.trim().is_empty() {
            self.fuse_cmd_rw = DEFAULT_FUSE_CMD_RW.to_string();
        }

        Ok(())
    }

    /// Parsed GPU mode.
    ///
    /// # Errors
    ///
    /// Returns an error for an unsupported mode.
    pub fn nvidia_mode(&self) -> SamResult<NvidiaMode> {
        if self.nvidia.trim().is_empty() {
            return Ok(NvidiaMode::default());
        }
        self.nvidia.parse()
    }
}
