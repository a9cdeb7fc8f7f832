//! zipkit: a PKZIP archive engine.
//!
//! Reads, writes, and updates PKZIP archives — DEFLATE and BZIP2
//! compression, traditional PKZIP and WinZip AES-128/256 encryption,
//! ZIP64 extensions, and segmented ("split") archives — without shelling
//! out to an external `zip`/`unzip` binary.
//!
//! Generalizes `examples/KSD-CO-s-zip`'s single-file, Tokio-async
//! `ZipReader`/`ZipWriter` pair into a synchronous [`Archive`] that can be
//! opened, mutated in memory, and re-saved, with copy-through of
//! unmodified entries on update.
//!
//! # Quick start
//!
//! Building a new archive:
//!
//! ```no_run
//! use zipkit::{Archive, SaveOptions};
//!
//! let mut archive = Archive::new();
//! archive.add_bytes("hello.txt", b"hello, world".to_vec())?;
//! archive.add_file("Cargo.toml", None)?;
//! archive.save("out.zip", SaveOptions::default())?;
//! # Ok::<(), zipkit::ZipError>(())
//! ```
//!
//! Opening and updating one in place:
//!
//! ```no_run
//! use zipkit::{Archive, SaveOptions};
//!
//! let mut archive = Archive::open("out.zip")?;
//! archive.remove_entry("hello.txt")?;
//! archive.save("out.zip", SaveOptions::default())?;
//! # Ok::<(), zipkit::ZipError>(())
//! ```

pub mod archive;
pub mod cipher;
pub mod codec;
pub mod crc;
pub mod encoding;
pub mod entry;
pub mod error;
pub mod format;
pub mod fs;
pub mod progress;
pub mod reader;
pub mod segment;
pub mod timefmt;
pub mod transaction;

pub use archive::{Archive, ArchiveItem, ArchiveOptions, DirectoryEntry, SaveOptions, Zip64Policy};
pub use cipher::EncryptionKind;
pub use codec::{CompressionLevel, CompressionMethod};
pub use encoding::AlternateEncodingPolicy;
pub use entry::{Entry, EntryEncryption, EntrySource, EntryTimestamps};
pub use error::{Result, ZipError};
pub use fs::{FileSystem, StdFileSystem};
pub use progress::{CancellationToken, ProgressCallback, ProgressEvent};
pub use segment::SegmentPolicy;
