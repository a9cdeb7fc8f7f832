//! Optional data descriptor (present when GP-bit 3 is set): 12 bytes, or
//! 24 with ZIP64-width sizes; an optional leading signature is always
//! emitted by this crate (APPNOTE marks it optional but recommends it,
//! and `examples/KSD-CO-s-zip/src/writer.rs` always writes it).

use std::io::{Read, Write};

use super::{read_u32_le, read_u64_le, SIG_DATA_DESCRIPTOR};
use crate::error::Result;

#[derive(Debug, Clone, Copy)]
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
}

impl DataDescriptor {
    pub fn write_to<W: Write>(&self, w: &mut W, zip64: bool) -> Result<()> {
        w.write_all(&SIG_DATA_DESCRIPTOR.to_le_bytes())?;
        w.write_all(&self.crc32.to_le_bytes())?;
        if zip64 {
            w.write_all(&self.compressed_size.to_le_bytes())?;
            w.write_all(&self.uncompressed_size.to_le_bytes())?;
        } else {
            w.write_all(&(self.compressed_size as u32).to_le_bytes())?;
            w.write_all(&(self.uncompressed_size as u32).to_le_bytes())?;
        }
        Ok(())
    }

    /// Reads a data descriptor, tolerating the optional leading signature.
    pub fn read_from<R: Read>(r: &mut R, zip64: bool) -> Result<Self> {
        let first = read_u32_le(r)?;
        let crc32 = if first == SIG_DATA_DESCRIPTOR {
            read_u32_le(r)?
        } else {
            first
        };
        let (compressed_size, uncompressed_size) = if zip64 {
            (read_u64_le(r)?, read_u64_le(r)?)
        } else {
            (read_u32_le(r)? as u64, read_u32_le(r)? as u64)
        };
        Ok(Self {
            crc32,
            compressed_size,
            uncompressed_size,
        })
    }
}
