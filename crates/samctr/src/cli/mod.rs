//! CLI command definitions and handlers.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::Result;

use sam_common::SamError;

use crate::apptainer::{self, Action};
use crate::config::Config;
use crate::container::ApptainerPuller;
use crate::runtime::{Overrides, PrepareContext, RuntimeState, prepare};

/// samctr - containerized build environment for CVMFS software repositories
///
/// Wraps `apptainer shell` and `apptainer exec` with the fuse mounts, bind
/// mounts and scratch storage needed to build into a CVMFS repository through
/// a writeable overlay.
#[derive(Parser, Debug)]
#[command(name = "samctr")]
#[command(author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Options shared by all commands.
    #[command(flatten)]
    pub global: GlobalArgs,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by all commands.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Config file (default: <config dir>/samctr/config.yaml)
    #[arg(short = 'f', long, global = true, env = "SAMCTR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Container image to use in the build environment
    #[arg(short = 'c', long, global = true, env = "SAMCTR_IMAGE")]
    pub image: Option<String>,

    /// Extra bind mounts, comma separated HOST[:CTR[:ro|rw]]
    #[arg(short = 'b', long, global = true, env = "SAMCTR_EXTRA_BIND_PATHS")]
    pub extra_bind_paths: Option<String>,

    /// Path to EESSI host injections [default: /opt/eessi]
    #[arg(short = 'i', long, global = true, env = "SAMCTR_HOST_INJECTIONS")]
    pub host_injections: Option<PathBuf>,

    /// Resume an existing run root
    #[arg(short = 'r', long, global = true, env = "SAMCTR_RESUME")]
    pub resume: Option<PathBuf>,

    /// Prefix of the run root directory on the host [default: sam.]
    #[arg(short = 'p', long, global = true, env = "SAMCTR_ROOT_TMP_DIR_PREFIX")]
    pub root_tmp_dir_prefix: Option<String>,

    /// Nvidia GPU mode (all, none) [default: all]
    #[arg(short = 'n', long, global = true, env = "SAMCTR_NVIDIA")]
    pub nvidia: Option<String>,

    /// Print the command instead of running it
    #[arg(long, global = true)]
    pub to_stdout: bool,

    /// CVMFS repositories to mount with a writeable overlay
    #[arg(
        short = 'w',
        long = "writeable-repositories",
        global = true,
        value_delimiter = ',',
        env = "SAMCTR_WRITEABLE_REPOSITORIES"
    )]
    pub writeable_repositories: Vec<String>,

    /// Fuse implementation for writeable overlays [default: fuse-overlayfs]
    #[arg(long, global = true, env = "SAMCTR_FUSE")]
    pub fuse: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

impl GlobalArgs {
    /// Values that take precedence over the config file.
    #[must_use]
    pub fn overrides(&self) -> Overrides {
        Overrides {
            image: self.image.clone(),
            extra_bind_paths: self.extra_bind_paths.clone(),
            host_injections: self.host_injections.clone(),
            resume: self.resume.clone(),
            root_tmp_dir_prefix: self.root_tmp_dir_prefix.clone(),
            nvidia: self.nvidia.clone(),
            writeable_repos: self
                .writeable_repositories
                .iter()
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect(),
            fuse_cmd_rw: self.fuse.clone(),
            scratch_dir: None,
        }
    }
}

/// Available commands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start an interactive shell in the build container
    Shell,

    /// Run a command in the build container
    ///
    /// Example: samctr exec -- /bin/sh < build_cmd.sh
    Exec {
        /// Command and arguments
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },

    /// Pull the container image into the run root and print the SIF path
    Pull,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// The exit code of a launched container command is passed through.
    pub async fn execute(self) -> Result<ExitCode> {
        let config = Config::load(self.global.config.as_deref())?;
        let ctx = PrepareContext::resolve(config, self.global.overrides())?;
        let runtime = prepare(&ctx, &ApptainerPuller).await?;

        tracing::info!(
            root = %runtime.storage.root_tmp_dir.display(),
            sif = %runtime.container_sif.display(),
            "Build environment ready"
        );

        let action = match self.command {
            Commands::Pull => {
                println!("{}", runtime.container_sif.display());
                return Ok(ExitCode::SUCCESS);
            }
            Commands::Shell => Action::Shell,
            Commands::Exec { command } => Action::Exec(command),
        };

        launch(&action, &runtime, self.global.to_stdout).await
    }
}

async fn launch(action: &Action, runtime: &RuntimeState, to_stdout: bool) -> Result<ExitCode> {
    let cmd = apptainer::run_cmd(action, runtime);

    if to_stdout {
        println!("{}", apptainer::render(&runtime.environ, &cmd));
        return Ok(ExitCode::SUCCESS);
    }

    match cmd.run_inherited().await {
        Ok(_) => Ok(ExitCode::SUCCESS),
        Err(SamError::CommandFailed { code, .. }) => {
            tracing::warn!(code, "Container command exited with failure");
            Ok(ExitCode::from(u8::try_from(code).unwrap_or(1)))
        }
        Err(e) => Err(e.into()),
    }
}
