//! Runtime state handed from prepare to the launcher.

use std::path::PathBuf;

use crate::mounts::BindMount;
use crate::storage::StorageState;

/// Everything needed to launch the container, computed once per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeState {
    /// Host-side storage created by the orchestrator.
    pub storage: StorageState,
    /// Container image reference.
    pub image: String,
    /// Local SIF file for the image.
    pub container_sif: PathBuf,
    /// Merged bind mounts: config, CLI, storage, GPU.
    pub bind_mounts: Vec<BindMount>,
    /// `KEY=VALUE` assignments added to the apptainer environment.
    pub environ: Vec<String>,
    /// Additional apptainer options (e.g. `--nv`).
    pub extra_opts: Vec<String>,
}

impl RuntimeState {
    /// `--fusemount` arguments, one pair per fuse mount.
    #[must_use]
    pub fn fusemount_args(&self) -> Vec<String> {
        self.storage
            .fuse_mounts
            .iter()
            .flat_map(|fm| ["--fusemount".to_string(), fm.fusemount_arg()])
            .collect()
    }

    /// `-B` arguments, one pair per bind mount.
    #[must_use]
    pub fn bind_args(&self) -> Vec<String> {
        self.bind_mounts
            .iter()
            .flat_map(|bm| {
                tracing::debug!(bind = %bm, "Adding bind mount");
                ["-B".to_string(), bm.to_string()]
            })
            .collect()
    }
}

/// Fixed runtime state for tests.
#[cfg(test)]
pub(crate) fn sample() -> RuntimeState {
    use crate::mounts::FuseMount;

    RuntimeState {
        storage: StorageState {
            root_tmp_dir: PathBuf::from("/tmp/sam.x"),
            apptainer_var_home: "/tmp/sam.x/home:/home/u".to_string(),
            apptainer_var_cache_dir: "/tmp/sam.x/apptainer_cache".to_string(),
            bind_mounts: vec![BindMount::rw("/tmp/sam.x", "/tmp")],
            fuse_mounts: vec![FuseMount::new(
                "container",
                "cvmfs2",
                "software.eessi.io",
                "/cvmfs/software.eessi.io",
            )],
            runtime_env: vec![],
        },
        image: "docker://img:1".to_string(),
        container_sif: PathBuf::from("/tmp/sam.x/img_1.sif"),
        bind_mounts: vec![
            BindMount::ro("/data", "/mnt/data"),
            BindMount::rw("/tmp/sam.x", "/tmp"),
        ],
        environ: vec![],
        extra_opts: vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_args_pairs() {
        assert_eq!(
            sample().bind_args(),
            vec!["-B", "/data:/mnt/data:ro", "-B", "/tmp/sam.x:/tmp:rw"]
        );
    }

    #[test]
    fn fusemount_args_pairs() {
        assert_eq!(
            sample().fusemount_args(),
            vec![
                "--fusemount",
                "container:cvmfs2 software.eessi.io /cvmfs/software.eessi.io"
            ]
        );
    }
}
