//! CLI definition and handler.

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;

use crate::archive::{Archiver, DEFAULT_NAME, DEFAULT_OUTPUT_DIR};
use crate::layout::{
    DEFAULT_CPU_ARCH_SUBDIR, DEFAULT_REPO, DEFAULT_SOURCE_ROOT, DEFAULT_VERSION, SourceLayout,
};

/// crtar - archive a finished build for CVMFS ingestion
///
/// Collects the module files and EasyBuild installations of one software
/// stack version from the writeable overlay of a repository and packs them
/// into a tarball guarded by a lockfile.
#[derive(Parser, Debug)]
#[command(name = "crtar")]
#[command(author, version, about)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Version of the EESSI based software stack
    #[arg(long, default_value = DEFAULT_VERSION, env = "CRTAR_EESSI_VERSION")]
    pub eessi_version: String,

    /// CPU architecture subdirectory to search
    #[arg(long, default_value = DEFAULT_CPU_ARCH_SUBDIR, env = "CRTAR_CPU_ARCH_SUBDIR")]
    pub cpu_arch_subdir: String,

    /// Name of the tarball being created
    #[arg(long, default_value = DEFAULT_NAME, env = "CRTAR_NAME")]
    pub name: String,

    /// Output directory for the tarball
    #[arg(long, default_value = DEFAULT_OUTPUT_DIR, env = "CRTAR_OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// CVMFS repository the software was built for
    #[arg(long, default_value = DEFAULT_REPO, env = "CRTAR_REPO")]
    pub repo: String,

    /// Directory holding the repository overlays
    #[arg(long, default_value = DEFAULT_SOURCE_ROOT, env = "CRTAR_SOURCE_ROOT")]
    pub source_root: PathBuf,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,
}

impl Cli {
    /// Build-output location selected on the command line.
    #[must_use]
    pub fn layout(&self) -> SourceLayout {
        SourceLayout {
            source_root: self.source_root.clone(),
            repo: self.repo.clone(),
            version: self.eessi_version.clone(),
            cpu_arch_subdir: self.cpu_arch_subdir.clone(),
        }
    }

    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        let archiver = Archiver::new(self.layout(), self.name.clone(), self.output_dir.clone());
        let archive = archiver.run().await?;
        println!("{}", archive.display());
        Ok(())
    }
}
