//! Archive lockfiles.
//!
//! The ingestion service skips any archive whose lockfile exists, so an
//! archive is only complete once its lock is gone. A lock is created
//! exclusively before `tar` runs and removed after it succeeds; after a
//! failure it stays so the partial archive is never picked up.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};

use sam_common::{SamError, SamResult};

/// Archive suffix replaced by [`LOCK_SUFFIX`].
pub const ARCHIVE_SUFFIX: &str = ".tar.gz";

/// Lockfile suffix.
pub const LOCK_SUFFIX: &str = ".lock";

/// Lockfile path for an archive: `x.tar.gz` → `x.lock`.
#[must_use]
pub fn lock_path_for(archive: &Path) -> PathBuf {
    let name = archive.to_string_lossy();
    let stem = name.strip_suffix(ARCHIVE_SUFFIX).unwrap_or(&name);
    PathBuf::from(format!("{stem}{LOCK_SUFFIX}"))
}

/// A held archive lock.
#[derive(Debug)]
#[must_use = "a lock must be released or retained explicitly"]
pub struct Lockfile {
    path: PathBuf,
}

impl Lockfile {
    /// Exclusively create the lockfile for `archive`.
    ///
    /// # Errors
    ///
    /// Returns [`SamError::LockContention`] if the lockfile already exists,
    /// or [`SamError::Lockfile`] if it cannot be created.
    pub fn acquire(archive: &Path) -> SamResult<Self> {
        let path = lock_path_for(archive);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(_) => {
                tracing::debug!(path = %path.display(), "Acquired lockfile");
                Ok(Self { path })
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                tracing::error!(path = %path.display(), "Lockfile already present");
                Err(SamError::LockContention { path })
            }
            Err(source) => Err(SamError::Lockfile {
                operation: "acquire".to_string(),
                path,
                source,
            }),
        }
    }

    /// Path of the lockfile.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the lockfile, publishing the archive.
    ///
    /// # Errors
    ///
    /// Returns [`SamError::Lockfile`] if the file cannot be removed.
    pub fn release(self) -> SamResult<()> {
        std::fs::remove_file(&self.path).map_err(|source| SamError::Lockfile {
            operation: "release".to_string(),
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!(path = %self.path.display(), "Released lockfile");
        Ok(())
    }

    /// Leave the lockfile in place after a failure.
    pub fn retain(self) -> PathBuf {
        tracing::warn!(path = %self.path.display(), "Keeping lockfile after failure");
        self.path
    }
}
