//! Apptainer command construction.
//!
//! Commands are built as argument vectors:
//!
//! ```text
//! apptainer <shell|exec> [--fusemount F]... [-B host:ctr:perm]... [opts]... <sif> [args]...
//! apptainer pull <sif> <image>
//! ```

use std::path::Path;

use sam_common::process::shell_quote;
use sam_common::{Cmd, LONG_TIMEOUT};

use crate::runtime::RuntimeState;

/// The container runtime binary.
pub const APPTAINER: &str = "apptainer";

/// What to run inside the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Interactive shell.
    Shell,
    /// Run a program with arguments.
    Exec(Vec<String>),
}

impl Action {
    /// Apptainer subcommand name.
    #[must_use]
    pub const fn subcommand(&self) -> &'static str {
        match self {
            Self::Shell => "shell",
            Self::Exec(_) => "exec",
        }
    }
}

/// Arguments for `apptainer shell|exec`.
#[must_use]
pub fn run_args(action: &Action, rs: &RuntimeState) -> Vec<String> {
    let mut args = vec![action.subcommand().to_string()];
    args.extend(rs.fusemount_args());
    args.extend(rs.bind_args());
    args.extend(rs.extra_opts.iter().cloned());
    args.push(rs.container_sif.to_string_lossy().into_owned());
    if let Action::Exec(program) = action {
        args.extend(program.iter().cloned());
    }
    args
}

/// Full `apptainer shell|exec` command with the runtime environment.
#[must_use]
pub fn run_cmd(action: &Action, rs: &RuntimeState) -> Cmd {
    Cmd::new(APPTAINER)
        .args(run_args(action, rs))
        .env_assignments(&rs.environ)
        .timeout(LONG_TIMEOUT)
}

/// Arguments for `apptainer pull`.
#[must_use]
pub fn pull_args(sif: &Path, image: &str) -> Vec<String> {
    vec![
        "pull".to_string(),
        sif.to_string_lossy().into_owned(),
        image.to_string(),
    ]
}

/// Full `apptainer pull` command.
#[must_use]
pub fn pull_cmd(sif: &Path, image: &str, environ: &[String]) -> Cmd {
    Cmd::new(APPTAINER)
        .args(pull_args(sif, image))
        .env_assignments(environ)
        .timeout(LONG_TIMEOUT)
}

/// Render a command line as it would be typed in a shell, prefixed with the
/// environment assignments.
#[must_use]
pub fn render(environ: &[String], cmd: &Cmd) -> String {
    environ
        .iter()
        .map(|assignment| match assignment.split_once('=') {
            Some((key, value)) => format!("{key}={}", shell_quote(value)),
            None => shell_quote(assignment),
        })
        .chain(std::iter::once(cmd.display()))
        .collect::<Vec<_>>()
        .join(" ")
}
