//! Streaming content codecs: store, DEFLATE, BZIP2.
//!
//! Every codec implements plain `Read` for decoding. Encoders implement
//! `EntryEncoder`, a small trait generalized from `s-zip`'s
//! `AsyncCompressorWrite` (`examples/KSD-CO-s-zip/src/async_writer.rs`) so the
//! pipeline can `finish()` whichever codec is in play and recover the
//! underlying writer, the way `DeflateEncoder::finish()` does natively.

pub mod bzip2;
pub mod deflate;
pub mod store;

use std::io::{Read, Write};

use crate::error::{Result, ZipError};

/// PKZIP compression method identifiers, as stored in local/central headers.
pub const METHOD_STORE: u16 = 0;
pub const METHOD_DEFLATE: u16 = 8;
pub const METHOD_BZIP2: u16 = 12;
/// Sentinel compression method field used when AES encryption is active;
/// the real method is carried in the `0x9901` extra field instead.
pub const METHOD_AES: u16 = 99;

/// The content compression method an entry is stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Store,
    Deflate,
    Bzip2,
}

impl CompressionMethod {
    pub fn to_zip_method(self) -> u16 {
        match self {
            CompressionMethod::Store => METHOD_STORE,
            CompressionMethod::Deflate => METHOD_DEFLATE,
            CompressionMethod::Bzip2 => METHOD_BZIP2,
        }
    }

    pub fn from_zip_method(method: u16) -> Result<Self> {
        match method {
            METHOD_STORE => Ok(CompressionMethod::Store),
            METHOD_DEFLATE => Ok(CompressionMethod::Deflate),
            METHOD_BZIP2 => Ok(CompressionMethod::Bzip2),
            other => Err(ZipError::UnsupportedCompression(other)),
        }
    }
}

/// The four DEFLATE levels named in the spec; `None` forces store at the
/// archive level rather than emitting an empty DEFLATE stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionLevel {
    None,
    Fast,
    Default,
    Best,
}

/// An encoder that owns its downstream writer until `finish` hands it back.
///
/// Generalizes `s-zip`'s per-codec `AsyncCompressorWrite` trait
/// (`examples/KSD-CO-s-zip/src/async_writer.rs`) to the synchronous world.
pub trait EntryEncoder<W>: Write {
    fn finish(self: Box<Self>) -> Result<W>;
}

/// Build a boxed streaming decoder for the given method.
pub fn decoder<'a, R: Read + 'a>(method: CompressionMethod, inner: R) -> Box<dyn Read + 'a> {
    match method {
        CompressionMethod::Store => Box::new(store::StoreReader::new(inner)),
        CompressionMethod::Deflate => Box::new(deflate::DeflateReader::new(inner)),
        CompressionMethod::Bzip2 => Box::new(bzip2::Bzip2Reader::new(inner)),
    }
}

/// Build a boxed streaming encoder for the given method and level.
pub fn encoder<'a, W: Write + 'a>(
    method: CompressionMethod,
    level: CompressionLevel,
    inner: W,
) -> Box<dyn EntryEncoder<W> + 'a> {
    match method {
        CompressionMethod::Store => Box::new(store::StoreWriter::new(inner)),
        CompressionMethod::Deflate => Box::new(deflate::DeflateWriter::new(inner, level)),
        CompressionMethod::Bzip2 => Box::new(bzip2::Bzip2Writer::new(inner, level)),
    }
}
