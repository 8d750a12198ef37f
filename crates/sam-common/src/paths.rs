//! Standard filesystem paths for SAM.
//!
//! A run root holds all per-run scratch state on the host and is bind mounted
//! at `/tmp` inside the container:
//!
//! ```text
//! <root>
//! |-home
//! |-apptainer_cache
//! |-opt-eessi
//! |-var-lib-cvmfs
//! |-var-run-cvmfs
//! |-<repo>/overlay-upper
//! |-<repo>/overlay-work
//! ```

use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;

/// Container path the run root is mounted at.
pub const CTR_TMP: &str = "/tmp";

/// Container prefix under which read-only CVMFS repositories are mounted
/// once a writeable overlay takes over their regular mountpoint.
pub const CVMFS_RO_PREFIX: &str = "/cvmfs_ro";

/// Regular CVMFS container prefix.
pub const CVMFS_PREFIX: &str = "/cvmfs";

/// Container path of EESSI host injections.
pub const HOST_INJECTIONS_CTR: &str = "/opt/eessi";

/// Default prefix of freshly created run roots.
pub const DEFAULT_ROOT_PREFIX: &str = "sam.";

/// Overlay upper directory name inside a repository directory.
pub const OVERLAY_UPPER: &str = "overlay-upper";

/// Overlay work directory name inside a repository directory.
pub const OVERLAY_WORK: &str = "overlay-work";

/// Parent directory for new run roots (default: the system temp dir).
pub static SAM_SCRATCH_DIR: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("SAM_SCRATCH_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir())
});

/// Layout of a run root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRoot {
    /// The run root directory on the host.
    pub root: PathBuf,
}

impl RunRoot {
    /// Wrap an existing run root path.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Host side of the container home.
    #[must_use]
    pub fn home(&self) -> PathBuf {
        self.root.join("home")
    }

    /// Default apptainer cache directory.
    #[must_use]
    pub fn apptainer_cache(&self) -> PathBuf {
        self.root.join("apptainer_cache")
    }

    /// Scratch host injections directory.
    #[must_use]
    pub fn opt_eessi(&self) -> PathBuf {
        self.root.join("opt-eessi")
    }

    /// CVMFS client state directories (`var-lib-cvmfs`, `var-run-cvmfs`).
    #[must_use]
    pub fn cvmfs_state_dirs(&self) -> [PathBuf; 2] {
        [self.root.join("var-lib-cvmfs"), self.root.join("var-run-cvmfs")]
    }

    /// Directory for a repository.
    #[must_use]
    pub fn repo(&self, repo: &str) -> PathBuf {
        self.root.join(repo)
    }

    /// Overlay upper directory for a repository.
    #[must_use]
    pub fn overlay_upper(&self, repo: &str) -> PathBuf {
        self.repo(repo).join(OVERLAY_UPPER)
    }

    /// Overlay work directory for a repository.
    #[must_use]
    pub fn overlay_work(&self, repo: &str) -> PathBuf {
        self.repo(repo).join(OVERLAY_WORK)
    }

    /// Container path of a host path below the run root.
    ///
    /// Strips the root prefix, e.g. `<root>/opt-eessi` → `/opt-eessi`.
    /// Paths outside the root are returned unchanged.
    #[must_use]
    pub fn container_path(&self, host: &Path) -> PathBuf {
        host.strip_prefix(&self.root)
            .map_or_else(|_| host.to_path_buf(), |rel| Path::new("/").join(rel))
    }
}

/// Clean a path lexically and strip leading separators so the result can be
/// joined below a run root. Returns an empty string for empty input.
#[must_use]
pub fn safe_relative(p: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for component in Path::new(p).components() {
        match component {
            Component::Normal(s) => parts.push(s.to_str().unwrap_or_default()),
            Component::ParentDir => {
                parts.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    parts.retain(|s| !s.is_empty());
    parts.join("/")
}

/// Lexically normalize an absolute path (`//`, `.`, `..`, trailing `/`).
#[must_use]
pub fn clean_absolute(p: &str) -> PathBuf {
    let rel = safe_relative(p);
    Path::new("/").join(rel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_root_layout() {
        let root = RunRoot::new("/tmp/sam.abc");
        assert_eq!(root.home(), PathBuf::from("/tmp/sam.abc/home"));
        assert_eq!(
            root.apptainer_cache(),
            PathBuf::from("/tmp/sam.abc/apptainer_cache")
        );
        assert_eq!(
            root.overlay_upper("software.eessi.io"),
            PathBuf::from("/tmp/sam.abc/software.eessi.io/overlay-upper")
        );
        assert_eq!(
            root.overlay_work("software.eessi.io"),
            PathBuf::from("/tmp/sam.abc/software.eessi.io/overlay-work")
        );
    }

    #[test]
    fn container_path_strips_root() {
        let root = RunRoot::new("/tmp/sam.abc");
        assert_eq!(
            root.container_path(&root.opt_eessi()),
            PathBuf::from("/opt-eessi")
        );
        assert_eq!(
            root.container_path(Path::new("/elsewhere")),
            PathBuf::from("/elsewhere")
        );
    }

    #[test]
    fn safe_relative_strips_and_cleans() {
        assert_eq!(safe_relative(""), "");
        assert_eq!(safe_relative("repo.example.org"), "repo.example.org");
        assert_eq!(safe_relative("/cvmfs/repo.example.org/"), "cvmfs/repo.example.org");
        assert_eq!(safe_relative("a/./b/../c"), "a/c");
        assert_eq!(safe_relative("/"), "");
    }

    #[test]
    fn clean_absolute_normalizes() {
        assert_eq!(
            clean_absolute("/cvmfs//software.eessi.io/"),
            PathBuf::from("/cvmfs/software.eessi.io")
        );
        assert_eq!(clean_absolute("/cvmfs/"), PathBuf::from("/cvmfs"));
    }
}
