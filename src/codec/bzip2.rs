//! BZIP2 codec, via the `bzip2` crate.
//!
//! No multi-block CRC shortcut is taken: the running stream CRC is
//! maintained by the shared `CrcReader`/`CrcWriter` tee outside this module,
//! over every uncompressed byte that passes through, exactly as for the
//! other codecs.

use std::io::{self, Read, Write};

use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use bzip2::Compression as BzCompression;

use super::{CompressionLevel, EntryEncoder};
use crate::error::Result;

fn level_to_bzip2(level: CompressionLevel) -> BzCompression {
    match level {
        CompressionLevel::None => BzCompression::fast(),
        CompressionLevel::Fast => BzCompression::fast(),
        CompressionLevel::Default => BzCompression::new(6),
        CompressionLevel::Best => BzCompression::best(),
    }
}

pub struct Bzip2Reader<R: Read> {
    inner: BzDecoder<R>,
}

impl<R: Read> Bzip2Reader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BzDecoder::new(inner),
        }
    }
}

impl<R: Read> Read for Bzip2Reader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

pub struct Bzip2Writer<W: Write> {
    inner: BzEncoder<W>,
}

impl<W: Write> Bzip2Writer<W> {
    pub fn new(inner: W, level: CompressionLevel) -> Self {
        Self {
            inner: BzEncoder::new(inner, level_to_bzip2(level)),
        }
    }
}

impl<W: Write> Write for Bzip2Writer<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> EntryEncoder<W> for Bzip2Writer<W> {
    fn finish(self: Box<Self>) -> Result<W> {
        Ok(self.inner.finish()?)
    }
}
