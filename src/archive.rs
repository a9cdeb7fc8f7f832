//! The archive model: an ordered collection of entries, the options that
//! govern how they are read/written, and the small set of operations
//! listed in spec's Archive-model table. Generalizes the flat `Vec<Entry>`
//! the teacher kept on its `ZipReader`/`ZipWriter`
//! (`examples/KSD-CO-s-zip/src/reader.rs`, `src/writer.rs`) into a single
//! type that can be read, mutated, and re-saved.

use std::path::{Path, PathBuf};

use crate::cipher::EncryptionKind;
use crate::codec::{CompressionLevel, CompressionMethod};
use crate::encoding::AlternateEncodingPolicy;
use crate::entry::Entry;
use crate::error::{Result, ZipError};
use crate::fs::{ExtractGuard, FileSystem, StdFileSystem};
use crate::progress::{CancellationToken, ProgressCallback, ProgressEvent};

/// Minimum `max_segment_size`, per spec: archives are single-file below
/// this threshold.
pub const MIN_SEGMENT_SIZE: u64 = 65_536;

/// Whether ZIP64 extensions may, must, or must never be emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Zip64Policy {
    #[default]
    AsNeeded,
    Always,
    Never,
}

/// Archive-wide defaults and policies, applied to new entries unless
/// overridden per-entry.
#[derive(Clone)]
pub struct ArchiveOptions {
    pub default_compression: CompressionMethod,
    pub default_level: CompressionLevel,
    pub default_encryption: EncryptionKind,
    pub default_password: Option<String>,
    pub text_mode: bool,
    pub encoding_policy: AlternateEncodingPolicy,
    pub max_segment_size: u64,
    pub zip64_policy: Zip64Policy,
    pub case_sensitive_retrieval: bool,
    pub allow_duplicate_names: bool,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            default_compression: CompressionMethod::Deflate,
            default_level: CompressionLevel::Default,
            default_encryption: EncryptionKind::None,
            default_password: None,
            text_mode: false,
            encoding_policy: AlternateEncodingPolicy::default(),
            max_segment_size: 0,
            zip64_policy: Zip64Policy::default(),
            case_sensitive_retrieval: false,
            allow_duplicate_names: false,
        }
    }
}

/// Per-save overrides layered on top of [`ArchiveOptions`]: progress
/// reporting and cancellation, which make sense only for one particular
/// save call rather than the archive as a whole.
pub struct SaveOptions<'a> {
    pub progress: Option<ProgressCallback<'a>>,
    pub cancellation: Option<CancellationToken>,
}

impl<'a> Default for SaveOptions<'a> {
    fn default() -> Self {
        Self {
            progress: None,
            cancellation: None,
        }
    }
}

/// Metadata for an entry that already exists in a previously read archive,
/// as parsed from its central directory record. Distinct from [`Entry`],
/// which describes content staged to be (re-)written.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    pub name: String,
    pub comment: Vec<u8>,
    pub compression: CompressionMethod,
    pub encryption: EncryptionKind,
    pub gp_flag: u16,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub starting_disk: u32,
    pub local_header_offset: u64,
    pub external_attrs: u32,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub raw_extra: Vec<u8>,
}

impl DirectoryEntry {
    pub fn is_directory(&self) -> bool {
        self.name.ends_with('/')
            || (self.external_attrs & 0x10) != 0
            || (self.compressed_size == 0
                && self.uncompressed_size == 0
                && self.compression == CompressionMethod::Store)
    }
}

/// One slot in the archive's ordered item list: either an entry carried
/// over from a previously read archive (candidate for copy-through) or
/// one staged by the caller this session (always re-encoded).
pub enum ArchiveItem {
    Stored(DirectoryEntry),
    Staged(Entry),
}

impl ArchiveItem {
    pub fn name(&self) -> &str {
        match self {
            ArchiveItem::Stored(e) => &e.name,
            ArchiveItem::Staged(e) => &e.name,
        }
    }
}

/// Where an already-open archive's bytes live, kept around for
/// copy-through reads and the self-read-safety rule of the save
/// transaction (spec's step 7).
pub struct ArchiveSource {
    pub base_path: PathBuf,
    pub segment_paths: Vec<PathBuf>,
    pub archive_comment: Vec<u8>,
}

/// An ordered collection of entries plus the policies that govern how they
/// are read and (re-)written.
pub struct Archive<FS: FileSystem = StdFileSystem> {
    pub(crate) fs: FS,
    pub(crate) source: Option<ArchiveSource>,
    pub(crate) items: Vec<ArchiveItem>,
    pub options: ArchiveOptions,
    pub archive_comment: Vec<u8>,
}

impl Archive<StdFileSystem> {
    /// A fresh, empty, write-only archive backed by the real filesystem.
    pub fn new() -> Self {
        Self::with_fs(StdFileSystem)
    }

    /// Opens and parses an existing archive from `path` (and its sibling
    /// segments, if split) on the real filesystem.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_fs(StdFileSystem, path)
    }

    /// Recovers an archive whose central directory is missing, truncated,
    /// or otherwise unparseable — i.e. one `open` itself would reject — by
    /// scanning `path`'s local file headers from scratch. Treats `path` as
    /// a single, non-segmented file: a split archive missing its EOCD
    /// can't name its sibling segments, so there is nothing to recover
    /// this way until a readable directory names them.
    pub fn recover(path: impl AsRef<Path>) -> Result<Self> {
        Self::recover_with_fs(StdFileSystem, path)
    }
}

impl Default for Archive<StdFileSystem> {
    fn default() -> Self {
        Self::new()
    }
}

impl<FS: FileSystem> Archive<FS> {
    pub fn with_fs(fs: FS) -> Self {
        Self {
            fs,
            source: None,
            items: Vec::new(),
            options: ArchiveOptions::default(),
            archive_comment: Vec::new(),
        }
    }

    pub fn open_with_fs(fs: FS, path: impl AsRef<Path>) -> Result<Self> {
        let opened = crate::reader::open_directory(&fs, path.as_ref())?;
        Ok(Self {
            fs,
            source: Some(ArchiveSource {
                base_path: path.as_ref().to_path_buf(),
                segment_paths: opened.segment_paths,
                archive_comment: opened.comment.clone(),
            }),
            items: opened
                .entries
                .into_iter()
                .map(ArchiveItem::Stored)
                .collect(),
            options: ArchiveOptions::default(),
            archive_comment: opened.comment,
        })
    }

    /// As [`Archive::recover`], on an explicit [`FileSystem`].
    pub fn recover_with_fs(fs: FS, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let recovered = crate::reader::full_scan(&fs, std::slice::from_ref(&path))?;
        Ok(Self {
            fs,
            source: Some(ArchiveSource {
                base_path: path.clone(),
                segment_paths: vec![path],
                archive_comment: Vec::new(),
            }),
            items: recovered.into_iter().map(ArchiveItem::Stored).collect(),
            options: ArchiveOptions::default(),
            archive_comment: Vec::new(),
        })
    }

    pub fn entries(&self) -> impl Iterator<Item = &ArchiveItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    fn names_match(&self, a: &str, b: &str) -> bool {
        if self.options.case_sensitive_retrieval {
            a == b
        } else {
            a.eq_ignore_ascii_case(b) || a.to_lowercase() == b.to_lowercase()
        }
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.items.iter().position(|item| self.names_match(item.name(), name))
    }

    fn normalize_name(name: &str) -> String {
        // Strip a leading separator and any Windows volume letter, and
        // normalize to forward slashes, per spec's ingest rule.
        let stripped = name.trim_start_matches(['/', '\\']);
        let without_drive = match stripped.as_bytes() {
            [letter, b':', rest @ ..] if letter.is_ascii_alphabetic() => {
                std::str::from_utf8(rest).unwrap_or(stripped)
            }
            _ => stripped,
        };
        without_drive.replace('\\', "/")
    }

    fn check_duplicate(&self, name: &str) -> Result<()> {
        if !self.options.allow_duplicate_names && self.find(name).is_some() {
            return Err(ZipError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    fn stage(&mut self, entry: Entry) -> Result<()> {
        self.check_duplicate(&entry.name)?;
        self.items.push(ArchiveItem::Staged(entry));
        Ok(())
    }

    fn default_entry(&self, name: String, source: crate::entry::EntrySource) -> Entry {
        let mut entry = Entry::new(name, source)
            .with_compression(self.options.default_compression, self.options.default_level)
            .with_text_flag(self.options.text_mode);
        if self.options.default_encryption != EncryptionKind::None {
            if let Some(password) = &self.options.default_password {
                entry = entry.with_encryption(self.options.default_encryption, password.clone());
            }
        }
        entry
    }

    pub fn add_file(&mut self, path: impl AsRef<Path>, in_archive_dir: Option<&str>) -> Result<()> {
        let path = path.as_ref();
        if !self.fs.exists_file(path) {
            return Err(ZipError::NotFound(path.display().to_string()));
        }
        let base_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ZipError::InvalidArgument("path has no file name".into()))?;
        let name = Self::normalize_name(&crate::fs::join_name(
            in_archive_dir.unwrap_or(""),
            base_name,
        ));
        let entry = self.default_entry(name, crate::entry::EntrySource::from_path(path));
        self.stage(entry)
    }

    pub fn add_directory(&mut self, path: impl AsRef<Path>, in_archive_dir: Option<&str>) -> Result<()> {
        self.add_directory_recursive(path.as_ref(), in_archive_dir.unwrap_or(""))
    }

    fn add_directory_recursive(&mut self, path: &Path, archive_dir: &str) -> Result<()> {
        if !self.fs.exists_dir(path) {
            return Err(ZipError::NotFound(path.display().to_string()));
        }
        let dir_name = Self::normalize_name(&format!("{archive_dir}/"));
        if dir_name != "/" {
            let dir_entry = Entry::new(dir_name, crate::entry::EntrySource::from_bytes(Vec::new()));
            let mut dir_entry = dir_entry;
            dir_entry.is_directory = true;
            dir_entry.compression = CompressionMethod::Store;
            self.check_duplicate(&dir_entry.name)?;
            self.items.push(ArchiveItem::Staged(dir_entry));
        }
        for child in self.fs.read_dir(path)? {
            let child_name = child
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| ZipError::InvalidArgument("path has no file name".into()))?
                .to_string();
            let child_archive_dir = crate::fs::join_name(archive_dir, &child_name);
            if self.fs.exists_dir(&child) {
                self.add_directory_recursive(&child, &child_archive_dir)?;
            } else {
                self.add_file(&child, Some(archive_dir))?;
            }
        }
        Ok(())
    }

    pub fn add_bytes(&mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Result<()> {
        let name = Self::normalize_name(&name.into());
        let entry = self.default_entry(name, crate::entry::EntrySource::from_bytes(bytes.into()));
        self.stage(entry)
    }

    pub fn add_from_stream(
        &mut self,
        name: impl Into<String>,
        reader: impl std::io::Read + 'static,
    ) -> Result<()> {
        let name = Self::normalize_name(&name.into());
        let entry = self.default_entry(name, crate::entry::EntrySource::from_reader(reader));
        self.stage(entry)
    }

    pub fn add_with_write_delegate(
        &mut self,
        name: impl Into<String>,
        writer: impl FnMut(&mut dyn std::io::Write) -> std::io::Result<()> + 'static,
    ) -> Result<()> {
        let name = Self::normalize_name(&name.into());
        let entry = self.default_entry(name, crate::entry::EntrySource::from_write_delegate(writer));
        self.stage(entry)
    }

    /// Replaces an existing entry's content and options in place
    /// (remove+add semantics, keeping the name), per spec.
    pub fn update_item(&mut self, name: &str, mut entry: Entry) -> Result<()> {
        let index = self
            .find(name)
            .ok_or_else(|| ZipError::NotFound(name.to_string()))?;
        entry.name = self.items[index].name().to_string();
        self.items[index] = ArchiveItem::Staged(entry);
        Ok(())
    }

    pub fn update_file(&mut self, name: &str, path: impl AsRef<Path>) -> Result<()> {
        let entry = self.default_entry(name.to_string(), crate::entry::EntrySource::from_path(path.as_ref()));
        self.update_item(name, entry)
    }

    pub fn remove_entry(&mut self, name: &str) -> Result<()> {
        let index = self
            .find(name)
            .ok_or_else(|| ZipError::NotFound(name.to_string()))?;
        self.items.remove(index);
        Ok(())
    }

    /// Saves the archive to `path` (and sibling segments, if
    /// `max_segment_size > 0`), per the transaction algorithm.
    pub fn save(&mut self, path: impl AsRef<Path>, options: SaveOptions<'_>) -> Result<()> {
        crate::transaction::SaveTransaction::run(self, path.as_ref(), options)
    }

    /// Checks whether the archive's on-disk directory parses cleanly
    /// without fully decoding any entry content.
    pub fn check(&self) -> Result<()> {
        let Some(source) = &self.source else {
            return Ok(());
        };
        crate::reader::open_directory(&self.fs, &source.base_path).map(|_| ())
    }

    /// Rebuilds the central directory by a full scan of local headers,
    /// discarding whatever (possibly corrupt) directory is currently on
    /// disk. Used to recover from a truncated or overwritten directory.
    pub fn fix_directory(&mut self) -> Result<()> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| ZipError::InvalidArgument("archive has no backing file to fix".into()))?;
        let recovered = crate::reader::full_scan(&self.fs, &source.segment_paths)?;
        self.items = recovered.into_iter().map(ArchiveItem::Stored).collect();
        Ok(())
    }

    /// Checks `password` against the first encrypted entry found, without
    /// decrypting any entry content.
    pub fn check_password(&self, password: &str) -> Result<bool> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| ZipError::InvalidArgument("archive has no backing file to check against".into()))?;
        crate::reader::check_password(&self.fs, source, &self.items, password)
    }

    fn stored_entry(&self, name: &str) -> Result<&DirectoryEntry> {
        let index = self
            .find(name)
            .ok_or_else(|| ZipError::NotFound(name.to_string()))?;
        match &self.items[index] {
            ArchiveItem::Stored(entry) => Ok(entry),
            ArchiveItem::Staged(_) => Err(ZipError::InvalidArgument(format!(
                "{name} has not been saved yet; save the archive before extracting it"
            ))),
        }
    }

    /// Decodes one entry's content into `out`. `password` is required only
    /// for entries whose `encryption` is not `None`.
    pub fn extract_entry_to_writer(
        &self,
        name: &str,
        password: Option<&str>,
        out: &mut impl std::io::Write,
    ) -> Result<()> {
        let entry = self.stored_entry(name)?;
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| ZipError::InvalidArgument("archive has no backing file to extract from".into()))?;
        crate::reader::extract_entry(&self.fs, source, entry, password, out)
    }

    /// Decodes one entry's content to `dst` on the host filesystem. An
    /// `ExtractGuard` removes `dst` on failure, but only if this call is the
    /// one that created it — a pre-existing `dst` is left as-is, never worse
    /// than before the call.
    pub fn extract_entry_to_path(&self, name: &str, dst: impl AsRef<Path>, password: Option<&str>) -> Result<()> {
        let dst = dst.as_ref();
        if let Some(parent) = dst.parent() {
            if !parent.as_os_str().is_empty() {
                self.fs.create_dir_all(parent)?;
            }
        }
        let guard = ExtractGuard::for_new_file(&self.fs, dst);
        let mut stream = self.fs.open_read_write(dst, true)?;
        self.extract_entry_to_writer(name, password, &mut stream)?;
        drop(stream);
        if let Some(guard) = guard {
            guard.dismiss();
        }
        Ok(())
    }

    /// Extracts every stored entry into `dest_dir`, preserving the
    /// archive's relative paths and recreating directory entries.
    pub fn extract_all(
        &self,
        dest_dir: impl AsRef<Path>,
        password: Option<&str>,
        mut progress: Option<ProgressCallback<'_>>,
    ) -> Result<()> {
        let dest_dir = dest_dir.as_ref();
        self.fs.create_dir_all(dest_dir)?;
        for item in &self.items {
            let name = item.name();
            if let Some(cb) = progress.as_mut() {
                cb(ProgressEvent::ExtractingStarted { name });
            }
            let target = dest_dir.join(name);
            match item {
                ArchiveItem::Stored(entry) if entry.is_directory() => {
                    self.fs.create_dir_all(&target)?;
                }
                ArchiveItem::Stored(_) => {
                    self.extract_entry_to_path(name, &target, password)?;
                }
                ArchiveItem::Staged(_) => {
                    return Err(ZipError::InvalidArgument(format!(
                        "{name} has not been saved yet; save the archive before extracting it"
                    )));
                }
            }
            if let Some(cb) = progress.as_mut() {
                cb(ProgressEvent::ExtractingCompleted { name });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_bytes_rejects_duplicate_names_by_default() {
        let mut archive = Archive::new();
        archive.add_bytes("a.txt", b"one".to_vec()).unwrap();
        let err = archive.add_bytes("a.txt", b"two".to_vec()).unwrap_err();
        assert!(matches!(err, ZipError::DuplicateName(_)));
    }

    #[test]
    fn lookup_is_case_insensitive_by_default() {
        let mut archive = Archive::new();
        archive.add_bytes("Readme.TXT", b"hi".to_vec()).unwrap();
        assert!(archive.find("readme.txt").is_some());
    }

    #[test]
    fn normalize_name_strips_leading_slash_and_drive_letter() {
        assert_eq!(Archive::<StdFileSystem>::normalize_name("/a/b.txt"), "a/b.txt");
        assert_eq!(Archive::<StdFileSystem>::normalize_name("C:\\a\\b.txt"), "a/b.txt");
    }
}
