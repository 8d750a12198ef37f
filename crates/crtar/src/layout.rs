//! Build output layout inside a writeable overlay.
//!
//! Builds land in the overlay upper directory of the repository, which the
//! build container exposes below `/tmp`:
//!
//! ```text
//! <source_root>/<repo>/overlay-upper/versions/<version>/software/linux/<arch>
//! |-modules/...
//! |-software/<package>/<version>/easybuild/
//! ```

use std::path::PathBuf;

use sam_common::paths::{CTR_TMP, OVERLAY_UPPER};

/// Default software stack version.
pub const DEFAULT_VERSION: &str = "2023.06";

/// Default CPU architecture subdirectory.
pub const DEFAULT_CPU_ARCH_SUBDIR: &str = "x86_64/amd/zen4";

/// Default repository.
pub const DEFAULT_REPO: &str = "software.asc.ac.at";

/// Default source root.
pub const DEFAULT_SOURCE_ROOT: &str = CTR_TMP;

/// Location of one built version/architecture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLayout {
    /// Directory holding the repository overlays.
    pub source_root: PathBuf,
    /// CVMFS repository the software was built for.
    pub repo: String,
    /// Software stack version.
    pub version: String,
    /// CPU architecture subdirectory, e.g. `x86_64/amd/zen4`.
    pub cpu_arch_subdir: String,
}

impl Default for SourceLayout {
    fn default() -> Self {
        Self {
            source_root: PathBuf::from(DEFAULT_SOURCE_ROOT),
            repo: DEFAULT_REPO.to_string(),
            version: DEFAULT_VERSION.to_string(),
            cpu_arch_subdir: DEFAULT_CPU_ARCH_SUBDIR.to_string(),
        }
    }
}

impl SourceLayout {
    /// Working directory for archiving: `<root>/<repo>/overlay-upper/versions`.
    #[must_use]
    pub fn versions_dir(&self) -> PathBuf {
        self.source_root
            .join(&self.repo)
            .join(OVERLAY_UPPER)
            .join("versions")
    }

    /// Architecture directory of the version.
    #[must_use]
    pub fn arch_dir(&self) -> PathBuf {
        self.versions_dir()
            .join(&self.version)
            .join("software")
            .join("linux")
            .join(&self.cpu_arch_subdir)
    }

    /// Architecture subdirectory with `/` replaced by `-`.
    #[must_use]
    pub fn arch_slug(&self) -> String {
        self.cpu_arch_subdir.trim_matches('/').replace('/', "-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout() {
        let layout = SourceLayout::default();
        assert_eq!(
            layout.versions_dir(),
            PathBuf::from("/tmp/software.asc.ac.at/overlay-upper/versions")
        );
        assert_eq!(
            layout.arch_dir(),
            PathBuf::from(
                "/tmp/software.asc.ac.at/overlay-upper/versions/2023.06/software/linux/x86_64/amd/zen4"
            )
        );
        assert_eq!(layout.arch_slug(), "x86_64-amd-zen4");
    }
}
