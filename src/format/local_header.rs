//! Local file header (30 bytes fixed + name + extra), signature
//! `0x04034b50`. Generalizes the ad hoc byte-at-a-time writes in
//! `examples/KSD-CO-s-zip/src/writer.rs::start_entry` into a reusable
//! struct shared by the writer, the reader, and the full-scan recovery
//! path.

use std::io::{Read, Write};

use super::{read_u16_le, read_u32_le, SIG_LOCAL_FILE_HEADER};
use crate::error::{Result, ZipError};

#[derive(Debug, Clone)]
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub gp_flag: u16,
    pub compression_method: u16,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name: Vec<u8>,
    pub extra: Vec<u8>,
}

impl LocalFileHeader {
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&SIG_LOCAL_FILE_HEADER.to_le_bytes())?;
        w.write_all(&self.version_needed.to_le_bytes())?;
        w.write_all(&self.gp_flag.to_le_bytes())?;
        w.write_all(&self.compression_method.to_le_bytes())?;
        w.write_all(&self.last_mod_time.to_le_bytes())?;
        w.write_all(&self.last_mod_date.to_le_bytes())?;
        w.write_all(&self.crc32.to_le_bytes())?;
        w.write_all(&self.compressed_size.to_le_bytes())?;
        w.write_all(&self.uncompressed_size.to_le_bytes())?;
        w.write_all(&(self.name.len() as u16).to_le_bytes())?;
        w.write_all(&(self.extra.len() as u16).to_le_bytes())?;
        w.write_all(&self.name)?;
        w.write_all(&self.extra)?;
        Ok(())
    }

    /// Fixed-size portion, used to patch size/CRC fields in place after
    /// writing when the output stream is seekable.
    pub const FIXED_SIZE: u64 = 30;
    /// Offset, from the start of the fixed header, of the CRC32 field.
    pub const CRC_OFFSET: u64 = 14;

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let sig = read_u32_le(r)?;
        if sig != SIG_LOCAL_FILE_HEADER {
            return Err(ZipError::corrupt(format!(
                "bad local file header signature: {sig:#010x}"
            )));
        }
        let version_needed = read_u16_le(r)?;
        let gp_flag = read_u16_le(r)?;
        let compression_method = read_u16_le(r)?;
        let last_mod_time = read_u16_le(r)?;
        let last_mod_date = read_u16_le(r)?;
        let crc32 = read_u32_le(r)?;
        let compressed_size = read_u32_le(r)?;
        let uncompressed_size = read_u32_le(r)?;
        let name_len = read_u16_le(r)? as usize;
        let extra_len = read_u16_le(r)? as usize;
        let mut name = vec![0u8; name_len];
        r.read_exact(&mut name)?;
        let mut extra = vec![0u8; extra_len];
        r.read_exact(&mut extra)?;
        Ok(Self {
            version_needed,
            gp_flag,
            compression_method,
            last_mod_time,
            last_mod_date,
            crc32,
            compressed_size,
            uncompressed_size,
            name,
            extra,
        })
    }

    /// Total size in bytes of this header as written (fixed part + name + extra).
    pub fn encoded_len(&self) -> u64 {
        Self::FIXED_SIZE + self.name.len() as u64 + self.extra.len() as u64
    }
}
