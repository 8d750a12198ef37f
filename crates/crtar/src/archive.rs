//! Archive creation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local};

use sam_common::{Cmd, LONG_TIMEOUT, SamResult};

use crate::discover::discover;
use crate::layout::SourceLayout;
use crate::lock::{ARCHIVE_SUFFIX, Lockfile};
use crate::manifest::Manifest;

/// Default archive name.
pub const DEFAULT_NAME: &str = "unnamed";

/// Default output directory.
pub const DEFAULT_OUTPUT_DIR: &str = "/opt/adm/sw-archives";

/// Timestamp format in archive names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Patterns never included in an archive.
pub const EXCLUDES: [&str; 2] = [".cvmfscatalog", "*.wh.*"];

/// Archive path: `<outdir>/<name>-<arch-with-dashes>-<timestamp>.tar.gz`.
#[must_use]
pub fn archive_path(output_dir: &Path, name: &str, arch_slug: &str, at: &DateTime<Local>) -> PathBuf {
    output_dir.join(format!(
        "{name}-{arch_slug}-{}{ARCHIVE_SUFFIX}",
        at.format(TIMESTAMP_FORMAT)
    ))
}

/// `tar` invocation archiving the manifest entries relative to `workdir`.
#[must_use]
pub fn tar_cmd(program: &str, workdir: &Path, archive: &Path, manifest: &Path) -> Cmd {
    let mut files_from = std::ffi::OsString::from("--files-from=");
    files_from.push(manifest);

    Cmd::new(program)
        .args(EXCLUDES.iter().map(|p| format!("--exclude={p}")))
        .arg("-C")
        .arg(workdir)
        .arg("-czf")
        .arg(archive)
        .arg(files_from)
}

/// Packs one built version into a lock-protected archive.
#[derive(Debug, Clone)]
pub struct Archiver {
    /// Where the build output lives.
    pub layout: SourceLayout,
    /// Archive name prefix.
    pub name: String,
    /// Directory receiving the archive.
    pub output_dir: PathBuf,
    tar_program: String,
    timeout: Duration,
}

impl Archiver {
    /// Create an archiver using the system `tar`.
    pub fn new(layout: SourceLayout, name: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            layout,
            name: name.into(),
            output_dir: output_dir.into(),
            tar_program: "tar".to_string(),
            timeout: LONG_TIMEOUT,
        }
    }

    /// Use a different `tar` binary.
    #[must_use]
    pub fn with_tar_program(mut self, program: impl Into<String>) -> Self {
        self.tar_program = program.into();
        self
    }

    /// Override the archiving deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Archive path for a given time.
    #[must_use]
    pub fn archive_path_at(&self, at: &DateTime<Local>) -> PathBuf {
        archive_path(&self.output_dir, &self.name, &self.layout.arch_slug(), at)
    }

    /// Create the archive, named with the current local time.
    ///
    /// # Errors
    ///
    /// See [`Archiver::run_at`].
    pub async fn run(&self) -> SamResult<PathBuf> {
        self.run_at(&Local::now()).await
    }

    /// Create the archive named with the given time.
    ///
    /// Discovers the artifacts, writes the manifest into the versions
    /// directory, takes the lock and runs `tar`. On success the lock and
    /// manifest are removed; on failure both are kept.
    ///
    /// # Errors
    ///
    /// Fails on discovery or manifest errors, if the lock is already held,
    /// or if `tar` fails or times out.
    pub async fn run_at(&self, at: &DateTime<Local>) -> SamResult<PathBuf> {
        let entries = discover(&self.layout)?;
        let workdir = self.layout.versions_dir();
        let manifest = Manifest::write(&workdir, &entries)?;
        if manifest.is_empty() {
            tracing::warn!(path = %self.layout.arch_dir().display(), "No build artifacts found");
        }

        let archive = self.archive_path_at(at);
        let lock = Lockfile::acquire(&archive)?;

        tracing::info!(
            archive = %archive.display(),
            entries = manifest.len(),
            "Creating archive"
        );

        let result = tar_cmd(&self.tar_program, &workdir, &archive, manifest.path())
            .timeout(self.timeout)
            .run_captured()
            .await;

        match result {
            Ok(_) => {
                lock.release()?;
                manifest.remove()?;
                tracing::info!(archive = %archive.display(), "Archive created");
                Ok(archive)
            }
            Err(e) => {
                let lock_path = lock.retain();
                match manifest.keep() {
                    Ok(path) => tracing::error!(
                        archive = %archive.display(),
                        lockfile = %lock_path.display(),
                        manifest = %path.display(),
                        "Creating archive failed"
                    ),
                    Err(keep_err) => tracing::error!(
                        archive = %archive.display(),
                        lockfile = %lock_path.display(),
                        error = %keep_err,
                        "Creating archive failed; manifest lost"
                    ),
                }
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2025, 9, 1, 14, 3, 7).unwrap()
    }

    #[test]
    fn archive_name_format() {
        assert_eq!(
            archive_path(Path::new("/opt/adm/sw-archives"), "unnamed", "x86_64-amd-zen4", &at()),
            PathBuf::from("/opt/adm/sw-archives/unnamed-x86_64-amd-zen4-20250901140307.tar.gz")
        );
    }

    #[test]
    fn tar_argv_layout() {
        let cmd = tar_cmd(
            "tar",
            Path::new("/tmp/r/overlay-upper/versions"),
            Path::new("/out/a.tar.gz"),
            Path::new("/tmp/r/overlay-upper/versions/files.list.txt123"),
        );
        let args: Vec<_> = cmd.get_args().iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            vec![
                "--exclude=.cvmfscatalog",
                "--exclude=*.wh.*",
                "-C",
                "/tmp/r/overlay-upper/versions",
                "-czf",
                "/out/a.tar.gz",
                "--files-from=/tmp/r/overlay-upper/versions/files.list.txt123",
            ]
        );
    }

    #[test]
    fn archiver_uses_layout_slug() {
        let archiver = Archiver::new(SourceLayout::default(), "go", "/out");
        assert_eq!(
            archiver.archive_path_at(&at()),
            PathBuf::from("/out/go-x86_64-amd-zen4-20250901140307.tar.gz")
        );
    }
}
