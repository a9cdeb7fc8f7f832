//! DEFLATE (RFC 1951) codec, via `flate2`.

use std::io::{self, Read, Write};

use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;

use super::{CompressionLevel, EntryEncoder};
use crate::error::Result;

fn level_to_flate2(level: CompressionLevel) -> Compression {
    match level {
        CompressionLevel::None => Compression::none(),
        CompressionLevel::Fast => Compression::fast(),
        CompressionLevel::Default => Compression::default(),
        CompressionLevel::Best => Compression::best(),
    }
}

pub struct DeflateReader<R: Read> {
    inner: DeflateDecoder<R>,
}

impl<R: Read> DeflateReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: DeflateDecoder::new(inner),
        }
    }
}

impl<R: Read> Read for DeflateReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

pub struct DeflateWriter<W: Write> {
    inner: DeflateEncoder<W>,
}

impl<W: Write> DeflateWriter<W> {
    pub fn new(inner: W, level: CompressionLevel) -> Self {
        Self {
            inner: DeflateEncoder::new(inner, level_to_flate2(level)),
        }
    }
}

impl<W: Write> Write for DeflateWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> EntryEncoder<W> for DeflateWriter<W> {
    fn finish(self: Box<Self>) -> Result<W> {
        Ok(self.inner.finish()?)
    }
}
