//! Host-side storage preparation for the build container.
//!
//! [`setup_storage`] picks or creates the run root, lays out the scratch
//! directories below it and collects the bind mounts and environment the
//! container needs:
//!
//! - `<root>` → `/tmp`
//! - `<root>/home` → `/home/<user>` (unless `APPTAINER_HOME` is given)
//! - host injections (or `<root>/opt-eessi`) → `/opt/eessi` (`/opt-eessi`)
//! - `<root>/var-lib-cvmfs` → `/var/lib/cvmfs`
//! - `<root>/var-run-cvmfs` → `/var/run/cvmfs`

use std::ffi::CStr;
use std::fs::DirBuilder;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};

use sam_common::paths::{
    CTR_TMP, DEFAULT_ROOT_PREFIX, HOST_INJECTIONS_CTR, RunRoot, SAM_SCRATCH_DIR, safe_relative,
};
use sam_common::{SamError, SamResult};

use crate::mounts::{BindMount, FuseMount};

const DIR_MODE: u32 = 0o755;

/// Inputs to [`setup_storage`]. Empty strings count as unset.
#[derive(Debug, Clone, Default)]
pub struct StorageOptions {
    /// Existing run root to reuse ("resume"); created fresh when unset.
    pub root_tmp_dir: Option<PathBuf>,
    /// Prefix for a fresh run root (default `sam.`).
    pub root_tmp_dir_prefix: Option<String>,
    /// Parent directory for a fresh run root (default: system temp dir).
    pub scratch_dir: Option<PathBuf>,
    /// EESSI host injections directory on the host.
    pub host_injections: Option<PathBuf>,
    /// `APPTAINER_HOME` value, `host:ctr`.
    pub apptainer_var_home: Option<String>,
    /// `APPTAINER_CACHEDIR` value.
    pub apptainer_var_cache_dir: Option<String>,
    /// Fuse mounts, already promoted.
    pub fuse_mounts: Vec<FuseMount>,
}

/// Computed storage layout for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageState {
    /// The run root on the host.
    pub root_tmp_dir: PathBuf,
    /// Resolved `APPTAINER_HOME`.
    pub apptainer_var_home: String,
    /// Resolved `APPTAINER_CACHEDIR`.
    pub apptainer_var_cache_dir: String,
    /// Bind mounts required by the layout.
    pub bind_mounts: Vec<BindMount>,
    /// Fuse mounts to pass to the container.
    pub fuse_mounts: Vec<FuseMount>,
    /// `KEY=VALUE` assignments for the container runtime.
    pub runtime_env: Vec<String>,
}

fn non_empty<T: AsRef<Path>>(value: Option<&T>) -> Option<&Path> {
    value
        .map(AsRef::as_ref)
        .filter(|p| !p.as_os_str().is_empty())
}

fn non_empty_str(value: Option<&String>) -> Option<&str> {
    value.map(String::as_str).filter(|s| !s.is_empty())
}

/// Create a directory and its parents with mode 0755 if absent.
fn ensure_dir(path: &Path) -> std::io::Result<()> {
    DirBuilder::new().recursive(true).mode(DIR_MODE).create(path)
}

fn ensure_dir_for(operation: &str, path: &Path) -> SamResult<()> {
    ensure_dir(path).map_err(|source| SamError::CreateDir {
        operation: operation.to_string(),
        path: path.to_path_buf(),
        source,
    })
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Prepare host-side storage for the container.
///
/// # Errors
///
/// Fails if the run root or a mandatory subdirectory cannot be created, a
/// caller-supplied host injections path does not exist, the invoking user
/// cannot be determined, or an overlay mount has no usable repository name.
pub fn setup_storage(opts: &StorageOptions) -> SamResult<StorageState> {
    let root_dir = match non_empty(opts.root_tmp_dir.as_ref()) {
        Some(dir) => {
            ensure_dir_for("ensure run root", dir)?;
            tracing::info!(root = %dir.display(), "Reusing run root");
            dir.to_path_buf()
        }
        None => {
            let prefix = non_empty_str(opts.root_tmp_dir_prefix.as_ref()).unwrap_or(DEFAULT_ROOT_PREFIX);
            let parent = non_empty(opts.scratch_dir.as_ref()).unwrap_or(SAM_SCRATCH_DIR.as_path());
            create_run_root(parent, prefix)?
        }
    };
    let root = RunRoot::new(&root_dir);

    let mut state = StorageState {
        root_tmp_dir: root_dir.clone(),
        apptainer_var_home: String::new(),
        apptainer_var_cache_dir: String::new(),
        bind_mounts: vec![BindMount::rw(path_string(&root_dir), CTR_TMP)],
        fuse_mounts: opts.fuse_mounts.clone(),
        runtime_env: Vec::new(),
    };

    setup_fuse_mount_dirs(&root, &opts.fuse_mounts)?;

    // APPTAINER_HOME
    if let Some(home) = non_empty_str(opts.apptainer_var_home.as_ref()) {
        state.apptainer_var_home = home.to_string();
    } else {
        let host_home = root.home();
        ensure_dir_for("create apptainer host home", &host_home)?;
        let user = resolve_user(std::env::var("USER").ok())?;
        let ctr_home = format!("/home/{user}");
        state.apptainer_var_home = format!("{}:{ctr_home}", host_home.display());
        state
            .bind_mounts
            .push(BindMount::rw(path_string(&host_home), ctr_home));
    }
    state
        .runtime_env
        .push(format!("APPTAINER_HOME={}", state.apptainer_var_home));

    // APPTAINER_CACHEDIR
    if let Some(cache) = non_empty_str(opts.apptainer_var_cache_dir.as_ref()) {
        state.apptainer_var_cache_dir = cache.to_string();
    } else {
        let cache_dir = root.apptainer_cache();
        ensure_dir_for("create apptainer cache dir", &cache_dir)?;
        state.apptainer_var_cache_dir = path_string(&cache_dir);
    }
    state
        .runtime_env
        .push(format!("APPTAINER_CACHEDIR={}", state.apptainer_var_cache_dir));

    // Host injections
    if let Some(host_path) = non_empty(opts.host_injections.as_ref()) {
        std::fs::metadata(host_path).map_err(|source| SamError::HostInjectionsMissing {
            path: host_path.to_path_buf(),
            source,
        })?;
        state
            .bind_mounts
            .push(BindMount::rw(path_string(host_path), HOST_INJECTIONS_CTR));
    } else {
        let scratch = root.opt_eessi();
        ensure_dir_for("create host injections dir", &scratch)?;
        let ctr = root.container_path(&scratch);
        state
            .bind_mounts
            .push(BindMount::rw(path_string(&scratch), path_string(&ctr)));
    }

    // CVMFS client state
    for host_path in root.cvmfs_state_dirs() {
        ensure_dir_for("create cvmfs dir", &host_path)?;
        let base = host_path
            .file_name()
            .map(|n| n.to_string_lossy().replace('-', "/"))
            .unwrap_or_default();
        state
            .bind_mounts
            .push(BindMount::rw(path_string(&host_path), format!("/{base}")));
    }

    tracing::info!(
        root = %state.root_tmp_dir.display(),
        binds = state.bind_mounts.len(),
        fusemounts = state.fuse_mounts.len(),
        "Storage prepared"
    );
    Ok(state)
}

fn create_run_root(parent: &Path, prefix: &str) -> SamResult<PathBuf> {
    let create_err = |source: std::io::Error| SamError::CreateDir {
        operation: "create run root".to_string(),
        path: parent.join(format!("{prefix}*")),
        source,
    };

    ensure_dir(parent).map_err(create_err)?;
    let dir = tempfile::Builder::new()
        .prefix(prefix)
        .keep(true)
        .tempdir_in(parent)
        .map_err(create_err)?;
    let path = dir.path().to_path_buf();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(DIR_MODE))
        .map_err(create_err)?;

    tracing::info!(root = %path.display(), "Created run root");
    Ok(path)
}

/// Repository directory name of a fuse mount: the cleaned `fuse_arg`, or the
/// base name of the mountpoint.
fn repository_dir_name(fm: &FuseMount) -> String {
    let from_arg = safe_relative(&fm.fuse_arg);
    if !from_arg.is_empty() {
        return from_arg;
    }
    Path::new(&fm.ctr_mountpoint)
        .file_name()
        .map(|n| safe_relative(&n.to_string_lossy()))
        .unwrap_or_default()
}

/// Create the per-repository scratch directories.
///
/// Overlay backends get `overlay-upper`/`overlay-work`; failures there are
/// only logged since the fuse backend reports them at mount time. Any other
/// backend needs `<root>/<repo>` and fails hard without it.
fn setup_fuse_mount_dirs(root: &RunRoot, fuse_mounts: &[FuseMount]) -> SamResult<()> {
    for fm in fuse_mounts {
        tracing::debug!(
            mount_type = %fm.mount_type,
            fuse_cmd = %fm.fuse_cmd,
            fuse_arg = %fm.fuse_arg,
            mountpoint = %fm.ctr_mountpoint,
            "Preparing fuse mount directories"
        );

        let repo = repository_dir_name(fm);

        if fm.fuse_cmd.is_overlay() {
            if repo.is_empty() {
                return Err(SamError::MissingRepositoryName {
                    fuse_cmd: fm.fuse_cmd.to_string(),
                    mountpoint: fm.ctr_mountpoint.clone(),
                });
            }
            for dir in [root.overlay_upper(&repo), root.overlay_work(&repo)] {
                if let Err(e) = ensure_dir(&dir) {
                    tracing::warn!(
                        path = %dir.display(),
                        error = %e,
                        "Failed to create fuse overlay directory"
                    );
                }
            }
        } else {
            let dir = root.repo(&repo);
            ensure_dir_for(&format!("create repository dir for {}", fm.fuse_arg), &dir)?;
            tracing::debug!(path = %dir.display(), "Repository directory ready");
        }
    }
    Ok(())
}

/// Name of the invoking user: the `USER` override, else the passwd entry of
/// the real uid.
///
/// # Errors
///
/// Returns [`SamError::UnknownUser`] if neither resolves.
pub fn resolve_user(env_override: Option<String>) -> SamResult<String> {
    if let Some(user) = env_override.filter(|u| !u.is_empty()) {
        return Ok(user);
    }
    lookup_current_user().ok_or(SamError::UnknownUser)
}

#[allow(unsafe_code)]
fn lookup_current_user() -> Option<String> {
    // SAFETY: getuid has no preconditions; getpwuid_r writes only into the
    // provided buffers, and pw_name points into `buf` which outlives the read.
    unsafe {
        let uid = libc::getuid();
        let mut pwd: libc::passwd = std::mem::zeroed();
        let mut result: *mut libc::passwd = std::ptr::null_mut();
        let mut buf = vec![0 as libc::c_char; 4096];
        let rc = libc::getpwuid_r(uid, &raw mut pwd, buf.as_mut_ptr(), buf.len(), &raw mut result);
        if rc != 0 || result.is_null() || pwd.pw_name.is_null() {
            tracing::debug!(uid, rc, "No passwd entry for current uid");
            return None;
        }
        CStr::from_ptr(pwd.pw_name)
            .to_str()
            .ok()
            .map(str::to_string)
    }
}
