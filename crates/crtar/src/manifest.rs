//! Manifest of files handed to `tar --files-from`.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use sam_common::{SamError, SamResult};

/// Name prefix of manifest files.
pub const MANIFEST_PREFIX: &str = "files.list.txt";

/// A durably written manifest file.
///
/// Dropping the manifest deletes the file; [`Manifest::keep`] leaves it on
/// disk.
#[derive(Debug)]
pub struct Manifest {
    file: NamedTempFile,
    entries: usize,
}

impl Manifest {
    /// Write `entries` one per line to a new manifest in `dir`.
    ///
    /// Paths are written byte for byte. Entries that are empty or only
    /// whitespace are skipped. The file is flushed and synced before this
    /// returns.
    ///
    /// # Errors
    ///
    /// Returns [`SamError::Manifest`] if the file cannot be created or
    /// written.
    pub fn write<I, P>(dir: &Path, entries: I) -> SamResult<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let file = tempfile::Builder::new()
            .prefix(MANIFEST_PREFIX)
            .tempfile_in(dir)
            .map_err(|source| SamError::Manifest {
                path: dir.join(format!("{MANIFEST_PREFIX}*")),
                source,
            })?;

        let path = file.path().to_path_buf();
        let count = write_lines(file.as_file(), entries).map_err(|source| SamError::Manifest {
            path: path.clone(),
            source,
        })?;

        tracing::debug!(path = %path.display(), entries = count, "Wrote manifest");
        Ok(Self {
            file,
            entries: count,
        })
    }

    /// Path of the manifest file.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Number of entries written.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries
    }

    /// Whether no entries were written.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// Leave the manifest on disk and return its path.
    ///
    /// # Errors
    ///
    /// Returns [`SamError::Manifest`] if the file cannot be persisted.
    pub fn keep(self) -> SamResult<PathBuf> {
        let path = self.file.path().to_path_buf();
        self.file
            .keep()
            .map(|(_, path)| path)
            .map_err(|e| SamError::Manifest {
                path,
                source: e.error,
            })
    }

    /// Delete the manifest.
    ///
    /// # Errors
    ///
    /// Returns [`SamError::Manifest`] if the file cannot be removed.
    pub fn remove(self) -> SamResult<()> {
        let path = self.file.path().to_path_buf();
        self.file
            .close()
            .map_err(|source| SamError::Manifest { path, source })
    }
}

fn write_lines<I, P>(file: &File, entries: I) -> io::Result<usize>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut writer = BufWriter::new(file);
    let mut count = 0;
    for entry in entries {
        let line = entry.as_ref().as_os_str().as_bytes();
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        writer.write_all(line)?;
        writer.write_all(b"\n")?;
        count += 1;
    }
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_entries_and_skips_blanks() {
        let tmp = TempDir::new().unwrap();
        let manifest = Manifest::write(tmp.path(), ["/a/b", "", "  ", "\n", "/c/d"]).unwrap();

        let name = manifest.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("files.list.txt"), "{name}");
        assert_eq!(manifest.path().parent().unwrap(), tmp.path());
        assert_eq!(manifest.len(), 2);
        assert_eq!(std::fs::read_to_string(manifest.path()).unwrap(), "/a/b\n/c/d\n");
    }

    #[test]
    fn non_utf8_paths_are_written_verbatim() {
        use std::ffi::OsStr;

        let tmp = TempDir::new().unwrap();
        let latin1 = Path::new(OsStr::from_bytes(b"/m/all/Go/caf\xe9.lua"));
        let manifest = Manifest::write(tmp.path(), [latin1, Path::new("/m/all/ padded .lua")]).unwrap();

        assert_eq!(manifest.len(), 2);
        assert_eq!(
            std::fs::read(manifest.path()).unwrap(),
            b"/m/all/Go/caf\xe9.lua\n/m/all/ padded .lua\n"
        );
    }

    #[test]
    fn empty_manifest() {
        let tmp = TempDir::new().unwrap();
        let manifest = Manifest::write(tmp.path(), Vec::<PathBuf>::new()).unwrap();
        assert!(manifest.is_empty());
        assert_eq!(std::fs::read_to_string(manifest.path()).unwrap(), "");
    }

    #[test]
    fn keep_and_remove() {
        let tmp = TempDir::new().unwrap();
        let kept = Manifest::write(tmp.path(), ["/x"]).unwrap().keep().unwrap();
        assert!(kept.exists());

        let manifest = Manifest::write(tmp.path(), ["/y"]).unwrap();
        let path = manifest.path().to_path_buf();
        manifest.remove().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn missing_directory_is_manifest_error() {
        let tmp = TempDir::new().unwrap();
        let err = Manifest::write(&tmp.path().join("nope"), ["/x"]).unwrap_err();
        assert!(matches!(err, SamError::Manifest { .. }));
    }
}
