//! External command execution under a deadline.
//!
//! Every subprocess is started from an argument vector (never through a
//! shell) and killed if it outlives its deadline.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Command;

use crate::error::{SamError, SamResult};

/// Deadline for long running operations (archiving, image pull, container runs).
pub const LONG_TIMEOUT: Duration = Duration::from_secs(72 * 60 * 60);

/// Deadline for quick probes.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Captured result of a finished command.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Exit status.
    pub status: ExitStatus,
    /// Standard output, lossily decoded.
    pub stdout: String,
    /// Standard error, lossily decoded.
    pub stderr: String,
}

impl CommandOutput {
    /// Non-empty, trimmed lines of standard output.
    pub fn stdout_lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines().map(str::trim).filter(|l| !l.is_empty())
    }
}

/// Builder for a command with a deadline.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: String,
    args: Vec<OsString>,
    envs: Vec<(String, String)>,
    current_dir: Option<PathBuf>,
    timeout: Duration,
}

impl Cmd {
    /// Create a new command builder with the [`LONG_TIMEOUT`] deadline.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            current_dir: None,
            timeout: LONG_TIMEOUT,
        }
    }

    /// Add a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add `KEY=VALUE` assignments to the inherited environment.
    /// Entries without `=` are ignored.
    #[must_use]
    pub fn env_assignments<I, S>(mut self, assignments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for a in assignments {
            if let Some((k, v)) = a.as_ref().split_once('=') {
                self.envs.push((k.to_string(), v.to_string()));
            }
        }
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn dir(mut self, dir: &Path) -> Self {
        self.current_dir = Some(dir.to_path_buf());
        self
    }

    /// Override the deadline.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Program name.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments, in order.
    #[must_use]
    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    /// Render the command line for display, quoting where a shell would need it.
    #[must_use]
    pub fn display(&self) -> String {
        std::iter::once(shell_quote(&self.program))
            .chain(self.args.iter().map(|a| shell_quote(&a.to_string_lossy())))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn build(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        if let Some(ref dir) = self.current_dir {
            cmd.current_dir(dir);
        }
        cmd.kill_on_drop(true);
        cmd
    }

    /// Run the command and capture its output.
    ///
    /// A non-zero exit logs standard error and returns
    /// [`SamError::CommandFailed`].
    pub async fn run_captured(self) -> SamResult<CommandOutput> {
        tracing::debug!(command = %self.display(), "Running command");

        let mut cmd = self.build();
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let output = tokio::time::timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| SamError::Timeout {
                operation: self.display(),
                duration: self.timeout,
            })?
            .map_err(|source| SamError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let result = CommandOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !result.status.success() {
            tracing::error!(
                program = %self.program,
                stderr = %result.stderr.trim(),
                "Subprocess failed"
            );
            return Err(SamError::CommandFailed {
                program: self.program,
                code: result.status.code().unwrap_or(-1),
                stderr: result.stderr,
            });
        }

        Ok(result)
    }

    /// Run the command with inherited stdio.
    pub async fn run_inherited(self) -> SamResult<ExitStatus> {
        tracing::info!(command = %self.display(), "Running command");

        let mut cmd = self.build();
        cmd.stdin(Stdio::inherit());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::inherit());

        let mut child = cmd.spawn().map_err(|source| SamError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        let status = tokio::time::timeout(self.timeout, child.wait())
            .await
            .map_err(|_| SamError::Timeout {
                operation: self.display(),
                duration: self.timeout,
            })??;

        if !status.success() {
            return Err(SamError::CommandFailed {
                program: self.program,
                code: status.code().unwrap_or(-1),
                stderr: String::new(),
            });
        }

        Ok(status)
    }
}

/// Quote a word for display in a POSIX shell.
#[must_use]
pub fn shell_quote(word: &str) -> String {
    let plain = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,@+%".contains(c));
    if plain {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_plain_and_special_words() {
        assert_eq!(shell_quote("tar"), "tar");
        assert_eq!(shell_quote("--exclude=*.wh.*"), "'--exclude=*.wh.*'");
        assert_eq!(shell_quote("a b"), "'a b'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn display_renders_argv() {
        let cmd = Cmd::new("apptainer")
            .arg("exec")
            .arg("container:cvmfs2 software.eessi.io /cvmfs/software.eessi.io");
        assert_eq!(
            cmd.display(),
            "apptainer exec 'container:cvmfs2 software.eessi.io /cvmfs/software.eessi.io'"
        );
    }

    #[tokio::test]
    async fn captured_output() {
        let out = Cmd::new("sh")
            .args(["-c", "printf 'a\\n\\nb\\n'"])
            .run_captured()
            .await
            .unwrap();
        assert_eq!(out.stdout_lines().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test_log::test(tokio::test)]
    async fn failure_carries_stderr() {
        let err = Cmd::new("sh")
            .args(["-c", "echo oops >&2; exit 3"])
            .run_captured()
            .await
            .unwrap_err();
        match err {
            SamError::CommandFailed { code, stderr, .. } => {
                assert_eq!(code, 3);
                assert_eq!(stderr.trim(), "oops");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let err = Cmd::new("definitely-not-a-real-program-sam")
            .run_captured()
            .await
            .unwrap_err();
        assert!(matches!(err, SamError::Spawn { .. }));
    }

    #[tokio::test]
    async fn deadline_kills_child() {
        let err = Cmd::new("sleep")
            .arg("5")
            .timeout(Duration::from_millis(100))
            .run_captured()
            .await
            .unwrap_err();
        assert!(matches!(err, SamError::Timeout { .. }));
    }

    #[tokio::test]
    async fn env_assignments_reach_child() {
        let out = Cmd::new("sh")
            .args(["-c", "printf %s \"$APPTAINER_CACHEDIR\""])
            .env_assignments(["APPTAINER_CACHEDIR=/tmp/cache", "garbage"])
            .run_captured()
            .await
            .unwrap();
        assert_eq!(out.stdout, "/tmp/cache");
    }

    #[tokio::test]
    async fn working_directory_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let out = Cmd::new("pwd").dir(dir.path()).run_captured().await.unwrap();
        let reported = std::path::PathBuf::from(out.stdout.trim());
        assert_eq!(
            reported.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }
}
