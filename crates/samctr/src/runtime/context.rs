//! Resolution of config and command line into a runtime state.

use std::path::PathBuf;

use sam_common::paths::{DEFAULT_ROOT_PREFIX, HOST_INJECTIONS_CTR};
use sam_common::SamResult;

use super::gpu;
use super::state::RuntimeState;
use crate::config::{Config, NvidiaMode};
use crate::container::{self, ImagePuller};
use crate::mounts::{BindMount, FuseCmd, FuseMount, promote_writeable};
use crate::storage::{StorageOptions, setup_storage};

/// Default host injections directory on the host.
pub const DEFAULT_HOST_INJECTIONS: &str = HOST_INJECTIONS_CTR;

/// Values given on the command line (or via `SAMCTR_*`); they win over the
/// config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Container image.
    pub image: Option<String>,
    /// Comma separated bind specs.
    pub extra_bind_paths: Option<String>,
    /// Host injections directory.
    pub host_injections: Option<PathBuf>,
    /// Run root to resume.
    pub resume: Option<PathBuf>,
    /// Prefix for a fresh run root.
    pub root_tmp_dir_prefix: Option<String>,
    /// GPU mode.
    pub nvidia: Option<String>,
    /// Repositories to mount writeable.
    pub writeable_repos: Vec<String>,
    /// Fuse backend for writeable repositories.
    pub fuse_cmd_rw: Option<String>,
    /// Parent directory for a fresh run root.
    pub scratch_dir: Option<PathBuf>,
}

fn given(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|v| !v.trim().is_empty())
}

/// Validated inputs for [`prepare`].
#[derive(Debug, Clone)]
pub struct PrepareContext {
    /// Container image reference.
    pub image: String,
    /// Declared read-only fuse mounts.
    pub fuse_mounts: Vec<FuseMount>,
    /// Repositories to mount writeable.
    pub writeable_repos: Vec<String>,
    /// Writeable fuse backend.
    pub fuse_cmd_rw: FuseCmd,
    /// Binds from the config file.
    pub config_binds: Vec<BindMount>,
    /// Binds from the command line.
    pub cli_binds: Vec<BindMount>,
    /// GPU mode.
    pub nvidia: NvidiaMode,
    /// Storage inputs without the fuse mounts.
    pub storage: StorageOptions,
}

impl PrepareContext {
    /// Merge overrides into the config, validate, and parse all bind specs.
    ///
    /// Nothing is created on disk.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid config, bind spec or
    /// image reference.
    pub fn resolve(mut config: Config, overrides: Overrides) -> SamResult<Self> {
        if let Some(image) = given(overrides.image.as_ref()) {
            config.image = image.to_string();
        }
        if let Some(nvidia) = given(overrides.nvidia.as_ref()) {
            config.nvidia = nvidia.to_string();
        }
        if let Some(fuse) = given(overrides.fuse_cmd_rw.as_ref()) {
            config.fuse_cmd_rw = fuse.to_string();
        }
        if let Some(prefix) = given(overrides.root_tmp_dir_prefix.as_ref()) {
            config.root_tmp_dir_prefix = prefix.to_string();
        }
        if !overrides.writeable_repos.is_empty() {
            config.writeable_repos = overrides.writeable_repos.clone();
        }

        config.validate()?;

        container::sif_file_name(&config.image)?;

        let mut config_binds = Vec::new();
        for spec in config.bind_paths.iter().filter(|s| !s.trim().is_empty()) {
            let bind = BindMount::parse(spec).inspect_err(
                |e| tracing::error!(spec = %spec, error = %e, "Invalid bind path in config"),
            )?;
            config_binds.push(bind);
        }

        let cli_binds = match given(overrides.extra_bind_paths.as_ref()) {
            Some(list) => BindMount::parse_list(list).inspect_err(
                |e| tracing::error!(list = %list, error = %e, "Invalid bind path on command line"),
            )?,
            None => Vec::new(),
        };

        let host_injections = overrides
            .host_injections
            .filter(|p| !p.as_os_str().is_empty())
            .or_else(|| {
                Some(config.host_injections.trim())
                    .filter(|s| !s.is_empty())
                    .map(PathBuf::from)
            })
            .unwrap_or_else(|| PathBuf::from(DEFAULT_HOST_INJECTIONS));
        tracing::debug!(path = %host_injections.display(), "Host injections");

        let nvidia = config.nvidia_mode()?;
        let prefix = Some(config.root_tmp_dir_prefix.trim())
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_ROOT_PREFIX)
            .to_string();

        let storage = StorageOptions {
            root_tmp_dir: overrides.resume,
            root_tmp_dir_prefix: Some(prefix),
            scratch_dir: overrides.scratch_dir,
            host_injections: Some(host_injections),
            apptainer_var_home: Some(config.apptainer_var_home.clone()),
            apptainer_var_cache_dir: Some(config.apptainer_var_cachedir.clone()),
            fuse_mounts: Vec::new(),
        };

        Ok(Self {
            image: config.image,
            fuse_mounts: config.fusemounts,
            writeable_repos: config.writeable_repos,
            fuse_cmd_rw: FuseCmd::from(config.fuse_cmd_rw),
            config_binds,
            cli_binds,
            nvidia,
            storage,
        })
    }
}

/// Prepare everything needed to launch the container.
///
/// Promotes writeable repositories, sets up storage, detects the GPU, merges
/// bind mounts (config, command line, storage, GPU) and makes sure the image
/// is available as a SIF below the run root.
///
/// # Errors
///
/// Propagates storage, GPU detection and image pull failures.
pub async fn prepare<P: ImagePuller>(ctx: &PrepareContext, puller: &P) -> SamResult<RuntimeState> {
    let fuse_mounts = promote_writeable(&ctx.fuse_mounts, &ctx.writeable_repos, &ctx.fuse_cmd_rw);

    let opts = StorageOptions {
        fuse_mounts,
        ..ctx.storage.clone()
    };
    let storage = setup_storage(&opts)?;

    let gpu = gpu::detect(ctx.nvidia).await?;

    let bind_mounts: Vec<BindMount> = ctx
        .config_binds
        .iter()
        .chain(&ctx.cli_binds)
        .chain(&storage.bind_mounts)
        .chain(&gpu.binds)
        .cloned()
        .collect();

    let container_sif = container::sif_path(&ctx.image, &storage.root_tmp_dir)?;
    let environ = storage.runtime_env.clone();

    container::ensure_image(puller, &container_sif, &ctx.image, &environ)
        .await
        .inspect_err(|e| tracing::error!(image = %ctx.image, error = %e, "Container setup failed"))?;

    Ok(RuntimeState {
        storage,
        image: ctx.image.clone(),
        container_sif,
        bind_mounts,
        environ,
        extra_opts: gpu.opts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sam_common::SamError;
    use std::path::Path;

    struct WritePuller;

    impl ImagePuller for WritePuller {
        async fn pull(&self, sif: &Path, _image: &str, _environ: &[String]) -> SamResult<()> {
            std::fs::write(sif, b"SIF")?;
            Ok(())
        }
    }

    fn config() -> Config {
        Config {
            image: "docker://ghcr.io/org/img:1.0".to_string(),
            nvidia: "none".to_string(),
            bind_paths: vec!["/data:/mnt/data:ro".to_string(), "  ".to_string()],
            fusemounts: vec![FuseMount::new(
                "container",
                "cvmfs2",
                "software.asc.ac.at",
                "/cvmfs_ro/software.asc.ac.at",
            )],
            ..Config::default()
        }
    }

    fn overrides(tmp: &tempfile::TempDir) -> Overrides {
        let hi = tmp.path().join("host_injections");
        std::fs::create_dir_all(&hi).unwrap();
        Overrides {
            host_injections: Some(hi),
            scratch_dir: Some(tmp.path().to_path_buf()),
            ..Overrides::default()
        }
    }

    #[test]
    fn flags_win_over_config() {
        let ctx = PrepareContext::resolve(
            Config {
                fuse_cmd_rw: "unionfs".to_string(),
                host_injections: "/from/config".to_string(),
                ..config()
            },
            Overrides {
                image: Some("oras://other:2".to_string()),
                fuse_cmd_rw: Some("fuse-overlayfs".to_string()),
                writeable_repos: vec!["software.asc.ac.at".to_string()],
                ..Overrides::default()
            },
        )
        .unwrap();
        assert_eq!(ctx.image, "oras://other:2");
        assert_eq!(ctx.fuse_cmd_rw, FuseCmd::FuseOverlayfs);
        assert_eq!(ctx.writeable_repos, vec!["software.asc.ac.at"]);
        assert_eq!(ctx.storage.host_injections, Some(PathBuf::from("/from/config")));
        assert_eq!(ctx.config_binds, vec![BindMount::ro("/data", "/mnt/data")]);
    }

    #[test]
    fn host_injections_default() {
        let ctx = PrepareContext::resolve(config(), Overrides::default()).unwrap();
        assert_eq!(ctx.storage.host_injections, Some(PathBuf::from("/opt/eessi")));
        assert_eq!(ctx.storage.root_tmp_dir_prefix.as_deref(), Some("sam."));
    }

    #[test]
    fn invalid_cli_bind_rejected() {
        let err = PrepareContext::resolve(
            config(),
            Overrides {
                extra_bind_paths: Some("/a:/b:rx".to_string()),
                ..Overrides::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, SamError::InvalidBindPermission { .. }));
    }

    #[test]
    fn image_without_scheme_rejected() {
        let err = PrepareContext::resolve(
            Config {
                image: "ghcr.io/org/img".to_string(),
                ..config()
            },
            Overrides::default(),
        )
        .unwrap_err();
        assert!(matches!(err, SamError::InvalidImageReference { .. }));
    }

    #[tokio::test]
    async fn prepare_merges_binds_in_order() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = PrepareContext::resolve(
            config(),
            Overrides {
                extra_bind_paths: Some("/scratch, /src:/work".to_string()),
                writeable_repos: vec!["software.asc.ac.at".to_string()],
                ..overrides(&tmp)
            },
        )
        .unwrap();
        let rs = prepare(&ctx, &WritePuller).await.unwrap();

        assert!(rs.storage.root_tmp_dir.starts_with(tmp.path()));
        let ctrs: Vec<_> = rs.bind_mounts.iter().map(|b| b.ctr.as_str()).collect();
        assert_eq!(&ctrs[..4], &["/mnt/data", "/scratch", "/work", "/tmp"]);
        assert_eq!(ctrs[ctrs.len() - 3], "/opt/eessi");

        assert_eq!(rs.storage.fuse_mounts.len(), 2);
        assert_eq!(rs.storage.fuse_mounts[0].ctr_mountpoint, "/cvmfs_ro");
        assert_eq!(rs.storage.fuse_mounts[1].ctr_mountpoint, "/cvmfs/software.asc.ac.at");
        assert!(rs.storage.root_tmp_dir.join("software.asc.ac.at").is_dir());

        assert_eq!(rs.container_sif, rs.storage.root_tmp_dir.join("ghcr.io-org-img_1.0.sif"));
        assert!(rs.container_sif.exists());
        assert_eq!(rs.environ, rs.storage.runtime_env);
        assert!(rs.extra_opts.is_empty());
    }

    #[tokio::test]
    async fn resume_reuses_root_and_image() {
        let tmp = tempfile::tempdir().unwrap();
        let ctx = PrepareContext::resolve(config(), overrides(&tmp)).unwrap();
        let first = prepare(&ctx, &WritePuller).await.unwrap();

        let resumed = PrepareContext::resolve(
            config(),
            Overrides {
                resume: Some(first.storage.root_tmp_dir.clone()),
                ..overrides(&tmp)
            },
        )
        .unwrap();
        let second = prepare(&resumed, &WritePuller).await.unwrap();
        assert_eq!(first.storage.root_tmp_dir, second.storage.root_tmp_dir);
        assert_eq!(first.container_sif, second.container_sif);
    }
}
