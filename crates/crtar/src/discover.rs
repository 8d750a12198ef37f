//! Discovery of build artifacts.

use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use sam_common::{SamError, SamResult};

use crate::layout::SourceLayout;

/// Marker directory of an EasyBuild installation.
pub const EASYBUILD_MARKER: &str = "easybuild";

/// Every regular file and symlink below `<arch_dir>/modules`, sorted.
///
/// A missing modules directory yields an empty list.
///
/// # Errors
///
/// Returns [`SamError::Discovery`] if the tree cannot be walked.
pub fn find_modules(arch_dir: &Path) -> SamResult<Vec<PathBuf>> {
    let modules = arch_dir.join("modules");
    if !modules.exists() {
        tracing::debug!(path = %modules.display(), "No modules directory");
        return Ok(Vec::new());
    }

    let mut found = Vec::new();
    for entry in WalkDir::new(&modules).follow_links(false) {
        let entry = entry.map_err(|e| SamError::Discovery {
            path: e.path().map_or_else(|| modules.clone(), Path::to_path_buf),
            message: e.to_string(),
        })?;
        let ft = entry.file_type();
        if ft.is_file() || ft.is_symlink() {
            found.push(entry.into_path());
        }
    }
    found.sort();

    tracing::debug!(count = found.len(), "Found module files");
    Ok(found)
}

/// Every `<arch_dir>/software/<package>/<version>` directory that contains an
/// `easybuild` subdirectory, sorted.
///
/// # Errors
///
/// Returns [`SamError::Discovery`] if the glob pattern or a match cannot be
/// read.
pub fn find_software(arch_dir: &Path) -> SamResult<Vec<PathBuf>> {
    let base = arch_dir.join("software");
    let pattern = format!(
        "{}/*/*",
        glob::Pattern::escape(&base.to_string_lossy())
    );

    let matches = glob::glob(&pattern).map_err(|e| SamError::Discovery {
        path: base.clone(),
        message: e.to_string(),
    })?;

    let mut found = Vec::new();
    for m in matches {
        let candidate = m.map_err(|e| SamError::Discovery {
            path: e.path().to_path_buf(),
            message: e.error().to_string(),
        })?;
        if has_easybuild_dir(&candidate)? {
            found.push(candidate);
        } else {
            tracing::debug!(path = %candidate.display(), "Skipping directory without easybuild");
        }
    }
    found.sort();

    tracing::debug!(count = found.len(), "Found software installations");
    Ok(found)
}

fn has_easybuild_dir(dir: &Path) -> SamResult<bool> {
    let marker = dir.join(EASYBUILD_MARKER);
    match std::fs::symlink_metadata(&marker) {
        Ok(meta) => Ok(meta.is_dir()),
        Err(e) if matches!(e.kind(), io::ErrorKind::NotFound | io::ErrorKind::NotADirectory) => {
            Ok(false)
        }
        Err(e) => Err(SamError::Discovery {
            path: marker,
            message: e.to_string(),
        }),
    }
}

/// All artifacts of a built version: modules first, then software.
///
/// # Errors
///
/// Propagates discovery errors.
pub fn discover(layout: &SourceLayout) -> SamResult<Vec<PathBuf>> {
    let arch_dir = layout.arch_dir();
    tracing::info!(path = %arch_dir.display(), "Discovering build artifacts");

    let mut entries = find_modules(&arch_dir)?;
    entries.extend(find_software(&arch_dir)?);
    Ok(entries)
}
