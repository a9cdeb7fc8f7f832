//! Running CRC32 over a stream, computed on the uncompressed bytes
//! regardless of which direction the pipeline is operating in.

use std::io::{self, Read, Write};

use crc32fast::Hasher;

/// Wraps a reader and accumulates a CRC32 over every byte that passes through.
pub struct CrcReader<R> {
    inner: R,
    hasher: Hasher,
    count: u64,
}

impl<R: Read> CrcReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
            count: 0,
        }
    }

    pub fn crc32(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    pub fn bytes_read(&self) -> u64 {
        self.count
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for CrcReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.hasher.update(&buf[..n]);
        self.count += n as u64;
        Ok(n)
    }
}

/// Wraps a writer and accumulates a CRC32 over every byte written through it.
pub struct CrcWriter<W> {
    inner: W,
    hasher: Hasher,
    count: u64,
}

impl<W: Write> CrcWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
            count: 0,
        }
    }

    pub fn crc32(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    pub fn bytes_written(&self) -> u64 {
        self.count
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CrcWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_writer_matches_crc32fast_direct() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let mut out = Vec::new();
        {
            let mut w = CrcWriter::new(&mut out);
            w.write_all(data).unwrap();
            assert_eq!(w.crc32(), crc32fast::hash(data));
            assert_eq!(w.bytes_written(), data.len() as u64);
        }
        assert_eq!(out, data);
    }

    #[test]
    fn crc_reader_matches_crc32fast_direct() {
        let data = b"another sentence of bytes to hash";
        let mut r = CrcReader::new(&data[..]);
        let mut buf = Vec::new();
        r.read_to_end(&mut buf).unwrap();
        assert_eq!(r.crc32(), crc32fast::hash(data));
    }
}
