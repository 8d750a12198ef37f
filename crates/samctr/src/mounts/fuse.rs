//! Fuse mounts handed to `apptainer --fusemount`.
//!
//! A fuse mount is declared in the config as e.g.
//!
//! ```yaml
//! type: container
//! fuse_cmd: cvmfs2
//! fuse_arg: software.eessi.io
//! ctr_mountpoint: /cvmfs/software.eessi.io
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use sam_common::paths::{CTR_TMP, CVMFS_RO_PREFIX, OVERLAY_UPPER, OVERLAY_WORK};

/// Fuse backend of a mount.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum FuseCmd {
    /// Read-only CVMFS client.
    #[default]
    Cvmfs2,
    /// Writeable overlay via fuse-overlayfs.
    FuseOverlayfs,
    /// Writeable overlay via unionfs-fuse.
    Unionfs,
    /// Any other backend, passed through verbatim and laid out like cvmfs2.
    Other(String),
}

impl FuseCmd {
    /// Backend name as used on the command line.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Cvmfs2 => "cvmfs2",
            Self::FuseOverlayfs => "fuse-overlayfs",
            Self::Unionfs => "unionfs",
            Self::Other(s) => s,
        }
    }

    /// Whether the backend layers a writeable overlay over a read-only repository.
    #[must_use]
    pub const fn is_overlay(&self) -> bool {
        matches!(self, Self::FuseOverlayfs | Self::Unionfs)
    }
}

impl From<&str> for FuseCmd {
    fn from(s: &str) -> Self {
        match s {
            "cvmfs2" => Self::Cvmfs2,
            "fuse-overlayfs" => Self::FuseOverlayfs,
            "unionfs" => Self::Unionfs,
            other => Self::Other(other.to_string()),
        }
    }
}

impl From<String> for FuseCmd {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<FuseCmd> for String {
    fn from(cmd: FuseCmd) -> Self {
        cmd.as_str().to_string()
    }
}

impl fmt::Display for FuseCmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for FuseCmd {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for FuseCmd {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}

/// A fuse filesystem mounted inside the container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct FuseMount {
    /// Mount type, e.g. `container`.
    #[serde(rename = "type", default)]
    pub mount_type: String,
    /// Fuse backend.
    pub fuse_cmd: FuseCmd,
    /// Backend argument; the repository identifier.
    #[serde(default)]
    pub fuse_arg: String,
    /// Mountpoint inside the container.
    #[serde(default)]
    pub ctr_mountpoint: String,
}

impl FuseMount {
    /// Create a fuse mount.
    pub fn new(
        mount_type: impl Into<String>,
        fuse_cmd: impl Into<FuseCmd>,
        fuse_arg: impl Into<String>,
        ctr_mountpoint: impl Into<String>,
    ) -> Self {
        Self {
            mount_type: mount_type.into(),
            fuse_cmd: fuse_cmd.into(),
            fuse_arg: fuse_arg.into(),
            ctr_mountpoint: ctr_mountpoint.into(),
        }
    }

    /// Backend arguments.
    ///
    /// Overlay backends stack the container-side scratch directories (the
    /// run root is mounted at `/tmp`) over the read-only repository.
    #[must_use]
    pub fn backend_args(&self) -> String {
        let repo = &self.fuse_arg;
        match self.fuse_cmd {
            FuseCmd::FuseOverlayfs => format!(
                "-o lowerdir={CVMFS_RO_PREFIX}/{repo} \
                 -o upperdir={CTR_TMP}/{repo}/{OVERLAY_UPPER} \
                 -o workdir={CTR_TMP}/{repo}/{OVERLAY_WORK}"
            ),
            FuseCmd::Unionfs => format!(
                "-o cow {CTR_TMP}/{repo}/{OVERLAY_UPPER}=RW:{CVMFS_RO_PREFIX}/{repo}=RO"
            ),
            FuseCmd::Cvmfs2 | FuseCmd::Other(_) => repo.clone(),
        }
    }

    /// The single `--fusemount` argument: `<type>:<cmd> <args> <mountpoint>`.
    #[must_use]
    pub fn fusemount_arg(&self) -> String {
        format!(
            "{}:{} {} {}",
            self.mount_type,
            self.fuse_cmd,
            self.backend_args(),
            self.ctr_mountpoint
        )
    }
}

impl fmt::Display for FuseMount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fusemount_arg())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cvmfs2_passes_repository() {
        let fm = FuseMount::new(
            "container",
            "cvmfs2",
            "software.eessi.io",
            "/cvmfs/software.eessi.io",
        );
        assert_eq!(
            fm.fusemount_arg(),
            "container:cvmfs2 software.eessi.io /cvmfs/software.eessi.io"
        );
    }

    #[test]
    fn fuse_overlayfs_args() {
        let fm = FuseMount::new("container", "fuse-overlayfs", "repo.example.org", "/cvmfs/repo.example.org");
        assert_eq!(
            fm.backend_args(),
            "-o lowerdir=/cvmfs_ro/repo.example.org \
             -o upperdir=/tmp/repo.example.org/overlay-upper \
             -o workdir=/tmp/repo.example.org/overlay-work"
        );
    }

    #[test]
    fn unionfs_args() {
        let fm = FuseMount::new("container", "unionfs", "repo.example.org", "/cvmfs/repo.example.org");
        assert_eq!(
            fm.backend_args(),
            "-o cow /tmp/repo.example.org/overlay-upper=RW:/cvmfs_ro/repo.example.org=RO"
        );
    }

    #[test]
    fn unknown_backend_is_preserved() {
        let cmd = FuseCmd::from("squashfuse");
        assert_eq!(cmd, FuseCmd::Other("squashfuse".to_string()));
        assert_eq!(cmd.to_string(), "squashfuse");
        assert!(!cmd.is_overlay());
        let fm = FuseMount::new("container", cmd, "img", "/mnt");
        assert_eq!(fm.backend_args(), "img");
    }

    #[test]
    fn deserialize_from_yaml() {
        let yaml = "type: container\nfuse_cmd: unionfs\nfuse_arg: r.org\nctr_mountpoint: /cvmfs/r.org\n";
        let fm: FuseMount = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(fm, FuseMount::new("container", "unionfs", "r.org", "/cvmfs/r.org"));
        assert!(fm.fuse_cmd.is_overlay());
    }

    #[test]
    fn fuse_cmd_is_required() {
        let yaml = "type: container\nfuse_arg: r.org\nctr_mountpoint: /cvmfs/r.org\n";
        assert!(serde_yaml::from_str::<FuseMount>(yaml).is_err());
    }
}
