//! Error taxonomy for zipkit.

use thiserror::Error as ThisError;

/// Result type for zipkit operations.
pub type Result<T, E = ZipError> = std::result::Result<T, E>;

/// Errors that can occur while reading, writing or updating an archive.
#[derive(Debug, ThisError)]
pub enum ZipError {
    /// Underlying storage failure, propagated verbatim.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No end-of-central-directory signature found in the tail of the stream.
    #[error("not a zip archive (no end-of-central-directory record found)")]
    NotAZip,

    /// A signature mismatch at a known offset, a CRC mismatch, or a truncated segment.
    #[error("corrupt archive: {0}")]
    Corrupt(String),

    /// An entry declares a compression method this crate does not emit.
    #[error("unsupported compression method: {0}")]
    UnsupportedCompression(u16),

    /// An entry declares an encryption scheme this crate does not emit.
    #[error("unsupported encryption scheme: {0}")]
    UnsupportedEncryption(String),

    /// AES password-verification value mismatch, or PKZIP-weak check-byte mismatch.
    #[error("incorrect password")]
    BadPassword,

    /// An entry or the central directory would require ZIP64 under `Zip64Policy::Never`.
    #[error("zip64 extensions required but policy forbids them")]
    Zip64Required,

    /// An `add_*` operation's name collides with an existing entry under strict mode.
    #[error("duplicate entry name: {0}")]
    DuplicateName(String),

    /// A named entry could not be found in the archive.
    #[error("entry not found: {0}")]
    NotFound(String),

    /// Cooperative cancellation observed at a safe checkpoint.
    #[error("operation canceled")]
    Canceled,

    /// An invalid argument was supplied (segment size below the 64 KiB floor,
    /// target path is an existing directory, etc).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The directory could not be reconstructed even via full-scan recovery.
    #[error("archive is irreparably corrupt: {0}")]
    IrreparablyCorrupt(String),
}

impl ZipError {
    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        ZipError::Corrupt(msg.into())
    }
}
