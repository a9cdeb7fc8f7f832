//! Identity codec: bytes pass through unchanged.

use std::io::{self, Read, Write};

use super::EntryEncoder;
use crate::error::Result;

pub struct StoreReader<R> {
    inner: R,
}

impl<R: Read> StoreReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

impl<R: Read> Read for StoreReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

pub struct StoreWriter<W> {
    inner: W,
}

impl<W: Write> StoreWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: Write> Write for StoreWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> EntryEncoder<W> for StoreWriter<W> {
    fn finish(self: Box<Self>) -> Result<W> {
        Ok(self.inner)
    }
}
