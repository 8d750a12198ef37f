//! Container image handling.
//!
//! Images are pulled once per run root into a SIF file named after the
//! image reference, e.g. `docker://ghcr.io/org/img:1.0` becomes
//! `<root>/ghcr.io-org-img_1.0.sif`.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};

use sam_common::{SamError, SamResult};

use crate::apptainer;

/// SIF file name for an image reference of the form `scheme://name`.
///
/// In the name `/` becomes `-`, `-` becomes `_` and `:` becomes `_`, each
/// applied to the original characters.
///
/// # Errors
///
/// Returns [`SamError::InvalidImageReference`] if the reference is empty or
/// has no scheme.
pub fn sif_file_name(image: &str) -> SamResult<String> {
    let invalid = |reason: &str| SamError::InvalidImageReference {
        reference: image.to_string(),
        reason: reason.to_string(),
    };

    if image.is_empty() {
        return Err(invalid("empty image reference"));
    }
    let (_, name) = image
        .rsplit_once("://")
        .ok_or_else(|| invalid("expected <scheme>://<name>"))?;
    if name.is_empty() {
        return Err(invalid("missing image name"));
    }

    let normalized: String = name
        .chars()
        .map(|c| match c {
            '/' => '-',
            '-' | ':' => '_',
            other => other,
        })
        .collect();
    Ok(format!("{normalized}.sif"))
}

/// Local SIF path for an image below the run root.
///
/// # Errors
///
/// See [`sif_file_name`].
pub fn sif_path(image: &str, root: &Path) -> SamResult<PathBuf> {
    Ok(root.join(sif_file_name(image)?))
}

/// Fetches a container image into a SIF file.
pub trait ImagePuller {
    /// Pull `image` into `sif`.
    fn pull(&self, sif: &Path, image: &str, environ: &[String]) -> impl Future<Output = SamResult<()>>;
}

/// Pulls with `apptainer pull`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApptainerPuller;

impl ImagePuller for ApptainerPuller {
    async fn pull(&self, sif: &Path, image: &str, environ: &[String]) -> SamResult<()> {
        apptainer::pull_cmd(sif, image, environ)
            .run_inherited()
            .await
            .map(|_| ())
    }
}

/// Make sure the SIF for `image` exists, pulling it if needed.
///
/// An existing SIF is reused as is.
///
/// # Errors
///
/// Fails if the pull fails or does not produce the SIF.
pub async fn ensure_image<P: ImagePuller>(
    puller: &P,
    sif: &Path,
    image: &str,
    environ: &[String],
) -> SamResult<()> {
    match std::fs::metadata(sif) {
        Ok(_) => {
            tracing::info!(sif = %sif.display(), "Reusing container image");
            return Ok(());
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    tracing::info!(image = %image, sif = %sif.display(), "Pulling container image");
    puller.pull(sif, image, environ).await?;

    std::fs::metadata(sif).map_err(|e| {
        SamError::Io(io::Error::new(
            e.kind(),
            format!("container pull completed but {} not found: {e}", sif.display()),
        ))
    })?;
    Ok(())
}
