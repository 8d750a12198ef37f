//! Common error types for the SAM tools.

use std::path::PathBuf;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`SamError`].
pub type SamResult<T> = Result<T, SamError>;

/// Common errors across the SAM crates.
#[derive(Error, Diagnostic, Debug)]
pub enum SamError {
    /// Bind specification was empty after trimming.
    #[error("Empty bind spec")]
    #[diagnostic(code(sam::bind::empty))]
    EmptyBindSpec,

    /// Bind specification does not follow `PATH | HOST:CTR | HOST:CTR:PERM`.
    #[error("Invalid bind spec: {spec:?}")]
    #[diagnostic(
        code(sam::bind::invalid_spec),
        help("Use PATH, HOST:CTR or HOST:CTR:PERM with non-empty components")
    )]
    InvalidBindSpec {
        /// The offending specification, untrimmed.
        spec: String,
    },

    /// Bind permission token is neither `ro` nor `rw`.
    #[error("Invalid bind perms {perms:?} in {spec:?} (expected ro or rw)")]
    #[diagnostic(code(sam::bind::invalid_perms))]
    InvalidBindPermission {
        /// The permission token.
        perms: String,
        /// The full specification.
        spec: String,
    },

    /// No repository name could be derived for an overlay fuse mount.
    #[error("Cannot determine repository name for {fuse_cmd} entry (mountpoint {mountpoint:?})")]
    #[diagnostic(
        code(sam::storage::repository_name),
        help("Set fuse_arg to the repository identifier, e.g. software.eessi.io")
    )]
    MissingRepositoryName {
        /// The fuse backend of the entry.
        fuse_cmd: String,
        /// The container mountpoint of the entry.
        mountpoint: String,
    },

    /// A mandatory directory could not be created.
    #[error("{operation}: failed to create {}: {source}", path.display())]
    #[diagnostic(code(sam::storage::create_dir))]
    CreateDir {
        /// What the directory was for.
        operation: String,
        /// The directory path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A caller-supplied host injections path does not exist.
    #[error("Host injections path {} does not exist: {source}", path.display())]
    #[diagnostic(
        code(sam::storage::host_injections),
        help("Create the directory on the host or pass an empty value to use a scratch directory")
    )]
    HostInjectionsMissing {
        /// The missing path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Invoking user could not be determined.
    #[error("Failed to determine user for the container home")]
    #[diagnostic(code(sam::storage::unknown_user), help("Set the USER environment variable"))]
    UnknownUser,

    /// Container image reference could not be converted.
    #[error("Invalid image reference {reference:?}: {reason}")]
    #[diagnostic(
        code(sam::image::invalid_reference),
        help("Image references need a transport prefix, e.g. docker://ghcr.io/org/image:tag")
    )]
    InvalidImageReference {
        /// The image reference.
        reference: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Lockfile already present for an archive.
    #[error("Lockfile {} already present", path.display())]
    #[diagnostic(
        code(sam::archive::locked),
        help("Another archiver run owns this archive name, or a previous run failed and left the lock behind")
    )]
    LockContention {
        /// Path of the existing lockfile.
        path: PathBuf,
    },

    /// Lockfile could not be created or removed.
    #[error("{operation} lockfile {}: {source}", path.display())]
    #[diagnostic(code(sam::archive::lockfile))]
    Lockfile {
        /// `acquire` or `release`.
        operation: String,
        /// Lockfile path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Manifest could not be written.
    #[error("Manifest {}: {source}", path.display())]
    #[diagnostic(code(sam::archive::manifest))]
    Manifest {
        /// Manifest path (or its directory if creation failed).
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Build-output discovery failed.
    #[error("Discovery under {} failed: {message}", path.display())]
    #[diagnostic(code(sam::archive::discovery))]
    Discovery {
        /// Directory being scanned.
        path: PathBuf,
        /// What went wrong.
        message: String,
    },

    /// External program could not be started.
    #[error("Failed to execute '{program}': {source}")]
    #[diagnostic(code(sam::process::spawn), help("Is '{program}' installed and on PATH?"))]
    Spawn {
        /// Program name.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// External program exited unsuccessfully.
    #[error("'{program}' failed (exit code {code}){}", stderr_suffix(stderr))]
    #[diagnostic(code(sam::process::failed))]
    CommandFailed {
        /// Program name.
        program: String,
        /// Exit code, or -1 if terminated by signal.
        code: i32,
        /// Captured standard error (empty when stdio was inherited).
        stderr: String,
    },

    /// Operation exceeded its deadline.
    #[error("Operation timed out after {duration:?}: {operation}")]
    #[diagnostic(code(sam::process::timeout))]
    Timeout {
        /// What was running.
        operation: String,
        /// The deadline that expired.
        duration: Duration,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(sam::io))]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(sam::config))]
    Config {
        /// The error message.
        message: String,
    },
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(":\n{trimmed}")
    }
}

impl SamError {
    /// Shorthand for a [`SamError::Config`].
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = SamError::InvalidBindSpec {
            spec: ":/uho:ro".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid bind spec: \":/uho:ro\"");
    }

    #[test]
    fn error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SamError = io_err.into();
        assert!(matches!(err, SamError::Io(_)));
    }

    #[test]
    fn command_failed_includes_stderr() {
        let err = SamError::CommandFailed {
            program: "tar".to_string(),
            code: 2,
            stderr: "tar: boom\n".to_string(),
        };
        assert_eq!(err.to_string(), "'tar' failed (exit code 2):\ntar: boom");

        let quiet = SamError::CommandFailed {
            program: "tar".to_string(),
            code: 2,
            stderr: String::new(),
        };
        assert_eq!(quiet.to_string(), "'tar' failed (exit code 2)");
    }

    #[test]
    fn lock_contention_names_path() {
        let err = SamError::LockContention {
            path: PathBuf::from("/out/a-x86_64-20250101000000.lock"),
        };
        assert!(err.to_string().contains("/out/a-x86_64-20250101000000.lock"));
    }
}
