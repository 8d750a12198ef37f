//! Nvidia GPU detection.

use sam_common::{Cmd, PROBE_TIMEOUT, SamError, SamResult};

use crate::config::NvidiaMode;
use crate::mounts::BindMount;

/// Apptainer flag enabling Nvidia support.
pub const NV_FLAG: &str = "--nv";

/// Extra apptainer options and binds for GPU use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GpuSetup {
    /// Options such as `--nv`.
    pub opts: Vec<String>,
    /// Read-only binds of host GPU tooling.
    pub binds: Vec<BindMount>,
}

impl GpuSetup {
    /// Setup for a probed `nvidia-smi` location.
    ///
    /// Returns `None` if the probe printed no path.
    #[must_use]
    pub fn from_probe_output(stdout: &str) -> Option<Self> {
        let path = stdout.lines().map(str::trim).find(|l| !l.is_empty())?;
        Some(Self {
            opts: vec![NV_FLAG.to_string()],
            binds: vec![BindMount::ro(path, path)],
        })
    }
}

/// Detect the host GPU for the given mode.
///
/// # Errors
///
/// In [`NvidiaMode::All`], fails if `nvidia-smi` cannot be found.
pub async fn detect(mode: NvidiaMode) -> SamResult<GpuSetup> {
    if mode == NvidiaMode::None {
        tracing::debug!("GPU support disabled");
        return Ok(GpuSetup::default());
    }

    let output = Cmd::new("which")
        .arg("nvidia-smi")
        .timeout(PROBE_TIMEOUT)
        .run_captured()
        .await
        .inspect_err(|e| tracing::error!(error = %e, "Failed to find host nvidia-smi"))?;

    let setup = GpuSetup::from_probe_output(&output.stdout).ok_or_else(|| SamError::CommandFailed {
        program: "which".to_string(),
        code: 0,
        stderr: "nvidia-smi not found".to_string(),
    })?;

    tracing::info!(binds = ?setup.binds, "Nvidia GPU support enabled");
    Ok(setup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mounts::Permission;

    #[test]
    fn probe_output_trailing_newline() {
        let setup = GpuSetup::from_probe_output("/usr/bin/nvidia-smi\n").unwrap();
        assert_eq!(setup.opts, vec!["--nv"]);
        assert_eq!(setup.binds.len(), 1);
        assert_eq!(setup.binds[0].host, "/usr/bin/nvidia-smi");
        assert_eq!(setup.binds[0].ctr, "/usr/bin/nvidia-smi");
        assert_eq!(setup.binds[0].perms, Permission::Ro);
    }

    #[test]
    fn empty_probe_output() {
        assert!(GpuSetup::from_probe_output("\n").is_none());
    }

    #[tokio::test]
    async fn disabled_mode_skips_probe() {
        assert_eq!(detect(NvidiaMode::None).await.unwrap(), GpuSetup::default());
    }
}
