//! Promotion of read-only CVMFS mounts to writeable overlays.
//!
//! A repository flagged writeable keeps its read-only mount, moved to
//! `/cvmfs_ro`, and gains a second mount from the writeable fuse backend at
//! its regular `/cvmfs/<repo>` location.

use std::collections::HashSet;

use sam_common::paths::{CVMFS_PREFIX, CVMFS_RO_PREFIX, clean_absolute};

use super::fuse::{FuseCmd, FuseMount};

/// Default writeable fuse backend.
pub const DEFAULT_FUSE_CMD_RW: &str = "fuse-overlayfs";

/// Build the final fuse mount list.
///
/// The result starts with every declared mount in order; promoted entries
/// have their mountpoint rewritten to `/cvmfs_ro`. One writeable entry per
/// match follows, in the order of `writeable_repos`. Identifiers that match
/// no declaration are ignored.
#[must_use]
pub fn promote_writeable(
    declared: &[FuseMount],
    writeable_repos: &[String],
    fuse_cmd_rw: &FuseCmd,
) -> Vec<FuseMount> {
    let mut result = declared.to_vec();
    let mut promoted = Vec::new();
    let mut seen = HashSet::new();

    for repo in writeable_repos {
        if !seen.insert(repo.as_str()) {
            tracing::debug!(repo = %repo, "Writeable repository listed twice, ignoring");
            continue;
        }

        let mut matched = false;
        for (i, original) in declared.iter().enumerate() {
            if original.fuse_arg != *repo {
                continue;
            }
            matched = true;

            let rel = original
                .ctr_mountpoint
                .strip_prefix(CVMFS_RO_PREFIX)
                .unwrap_or(&original.ctr_mountpoint);
            let mountpoint = clean_absolute(&format!("{CVMFS_PREFIX}/{rel}"));

            promoted.push(FuseMount {
                mount_type: original.mount_type.clone(),
                fuse_cmd: fuse_cmd_rw.clone(),
                fuse_arg: original.fuse_arg.clone(),
                ctr_mountpoint: mountpoint.to_string_lossy().into_owned(),
            });
            result[i].ctr_mountpoint = CVMFS_RO_PREFIX.to_string();

            tracing::debug!(
                repo = %repo,
                fuse_cmd = %fuse_cmd_rw,
                mountpoint = %mountpoint.display(),
                "Promoted repository to writeable overlay"
            );
        }

        if !matched {
            tracing::debug!(repo = %repo, "Writeable repository has no declared fuse mount");
        }
    }

    result.extend(promoted);
    result
}
