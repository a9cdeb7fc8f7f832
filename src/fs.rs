//! The small filesystem/stream boundary the core requires of the host,
//! per spec §6. `StdFileSystem` is the default implementation over
//! `std::fs`; hosts embedding this crate in a different environment can
//! swap in their own.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// A seekable, readable and writable stream, as required by segment and
/// archive I/O.
pub trait Stream: Read + Write + Seek {}
impl<T: Read + Write + Seek> Stream for T {}

/// Minimal filesystem surface the core requires of the host.
pub trait FileSystem {
    type ReadStream: Read + Seek;
    type RwStream: Stream;

    fn open_read(&self, path: &Path) -> Result<Self::ReadStream>;
    fn open_read_write(&self, path: &Path, create: bool) -> Result<Self::RwStream>;
    fn exists_file(&self, path: &Path) -> bool;
    fn exists_dir(&self, path: &Path) -> bool;
    fn create_dir_all(&self, path: &Path) -> Result<()>;
    /// Moves `src` to `dst`; overwrite is disallowed — the caller performs
    /// the zombie-rename dance itself when the target may already exist.
    fn rename(&self, src: &Path, dst: &Path) -> Result<()>;
    fn delete_file(&self, path: &Path) -> Result<()>;
    fn random_name(&self) -> String;
    /// Direct children of a directory, as used by `Archive::add_directory`'s
    /// recursive walk. Not part of spec's minimal filesystem surface, but
    /// required to implement that operation without pulling in a crate like
    /// `walkdir` for what the `FileSystem` boundary already owns.
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>>;
}

/// The default host implementation, backed directly by `std::fs`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFileSystem;

impl FileSystem for StdFileSystem {
    type ReadStream = File;
    type RwStream = File;

    fn open_read(&self, path: &Path) -> Result<File> {
        Ok(File::open(path)?)
    }

    fn open_read_write(&self, path: &Path, create: bool) -> Result<File> {
        let mut opts = OpenOptions::new();
        opts.read(true).write(true);
        if create {
            opts.create(true).truncate(true);
        }
        Ok(opts.open(path)?)
    }

    fn exists_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn exists_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn create_dir_all(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path)?;
        Ok(())
    }

    fn rename(&self, src: &Path, dst: &Path) -> Result<()> {
        fs::rename(src, dst)?;
        Ok(())
    }

    fn delete_file(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn random_name(&self) -> String {
        use std::time::{SystemTime, UNIX_EPOCH};
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let pid = std::process::id();
        format!("{pid:x}-{nanos:x}")
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        for entry in fs::read_dir(path)? {
            out.push(entry?.path());
        }
        Ok(out)
    }
}

/// Joins path segments, normalizing to forward slashes in the logical
/// (archive-internal) name space while leaving actual filesystem paths to
/// `Path`'s own platform-native joining.
pub fn join_name(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}

/// The segment filename for `base.zip` at 1-based segment index `n` out of
/// `total`: segment `total` (the last) is `base.zip` itself; segments
/// `1..total` are `base.z01`, `base.z02`, … (widening past two digits only
/// once `total >= 100`).
pub fn segment_path(base: &Path, segment_index: u32, total_segments: u32) -> PathBuf {
    if segment_index == total_segments {
        return base.to_path_buf();
    }
    let width = if total_segments >= 100 { 3 } else { 2 };
    let ext = format!("z{:0width$}", segment_index, width = width);
    base.with_extension(ext)
}

/// RAII replacement for the `goto ExitTry`-style cleanup an extraction
/// routine needs: on success, call [`ExtractGuard::dismiss`] and the
/// target is left alone; otherwise `Drop` removes it, but only if this
/// guard is the one that created it — a target that already existed
/// before the extraction attempt is never touched.
pub struct ExtractGuard<'fs, FS: FileSystem> {
    fs: &'fs FS,
    path: PathBuf,
    dismissed: bool,
}

impl<'fs, FS: FileSystem> ExtractGuard<'fs, FS> {
    /// Arms a guard over `path`, which this call is about to create.
    /// Returns `None` (nothing to guard) if `path` already exists.
    pub fn for_new_file(fs: &'fs FS, path: &Path) -> Option<Self> {
        if fs.exists_file(path) {
            None
        } else {
            Some(Self {
                fs,
                path: path.to_path_buf(),
                dismissed: false,
            })
        }
    }

    /// Marks the extraction as having succeeded: the target is kept.
    pub fn dismiss(mut self) {
        self.dismissed = true;
    }
}

impl<'fs, FS: FileSystem> Drop for ExtractGuard<'fs, FS> {
    fn drop(&mut self) {
        if !self.dismissed {
            let _ = self.fs.delete_file(&self.path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_naming_two_digit() {
        let base = Path::new("archive.zip");
        assert_eq!(segment_path(base, 1, 4), PathBuf::from("archive.z01"));
        assert_eq!(segment_path(base, 2, 4), PathBuf::from("archive.z02"));
        assert_eq!(segment_path(base, 4, 4), PathBuf::from("archive.zip"));
    }

    #[test]
    fn segment_naming_widens_past_99() {
        let base = Path::new("archive.zip");
        assert_eq!(segment_path(base, 1, 120), PathBuf::from("archive.z001"));
        assert_eq!(segment_path(base, 120, 120), PathBuf::from("archive.zip"));
    }
}
