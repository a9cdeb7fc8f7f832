//! Central directory header (46 bytes + name + extra + comment),
//! signature `0x02014b50`.

use std::io::{Read, Write};

use super::extra::{self, ExtraField};
use super::{read_u16_le, read_u32_le, SIG_CENTRAL_DIRECTORY_HEADER};
use crate::error::{Result, ZipError};

#[derive(Debug, Clone)]
pub struct CentralDirectoryHeader {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub gp_flag: u16,
    pub compression_method: u16,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub disk_number_start: u32,
    pub internal_attrs: u16,
    pub external_attrs: u32,
    pub local_header_offset: u64,
    pub name: Vec<u8>,
    pub extra: Vec<u8>,
    pub comment: Vec<u8>,
}

impl CentralDirectoryHeader {
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        let needs_zip64 = self.compressed_size > u32::MAX as u64
            || self.uncompressed_size > u32::MAX as u64
            || self.local_header_offset > u32::MAX as u64
            || self.disk_number_start > u16::MAX as u32;

        let mut extra = self.extra.clone();
        if needs_zip64 {
            let z64 = extra::encode_zip64(
                (self.uncompressed_size > u32::MAX as u64).then_some(self.uncompressed_size),
                (self.compressed_size > u32::MAX as u64).then_some(self.compressed_size),
                (self.local_header_offset > u32::MAX as u64).then_some(self.local_header_offset),
                (self.disk_number_start > u16::MAX as u32).then_some(self.disk_number_start),
            );
            extra.extend_from_slice(&z64);
        }

        w.write_all(&SIG_CENTRAL_DIRECTORY_HEADER.to_le_bytes())?;
        w.write_all(&self.version_made_by.to_le_bytes())?;
        w.write_all(&self.version_needed.to_le_bytes())?;
        w.write_all(&self.gp_flag.to_le_bytes())?;
        w.write_all(&self.compression_method.to_le_bytes())?;
        w.write_all(&self.last_mod_time.to_le_bytes())?;
        w.write_all(&self.last_mod_date.to_le_bytes())?;
        w.write_all(&self.crc32.to_le_bytes())?;
        w.write_all(&sentinel32(self.compressed_size).to_le_bytes())?;
        w.write_all(&sentinel32(self.uncompressed_size).to_le_bytes())?;
        w.write_all(&(self.name.len() as u16).to_le_bytes())?;
        w.write_all(&(extra.len() as u16).to_le_bytes())?;
        w.write_all(&(self.comment.len() as u16).to_le_bytes())?;
        w.write_all(&(if self.disk_number_start > u16::MAX as u32 {
            0xFFFFu16
        } else {
            self.disk_number_start as u16
        }).to_le_bytes())?;
        w.write_all(&self.internal_attrs.to_le_bytes())?;
        w.write_all(&self.external_attrs.to_le_bytes())?;
        w.write_all(&sentinel32(self.local_header_offset).to_le_bytes())?;
        w.write_all(&self.name)?;
        w.write_all(&extra)?;
        w.write_all(&self.comment)?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let sig = read_u32_le(r)?;
        if sig != SIG_CENTRAL_DIRECTORY_HEADER {
            return Err(ZipError::corrupt(format!(
                "bad central directory header signature: {sig:#010x}"
            )));
        }
        let version_made_by = read_u16_le(r)?;
        let version_needed = read_u16_le(r)?;
        let gp_flag = read_u16_le(r)?;
        let compression_method = read_u16_le(r)?;
        let last_mod_time = read_u16_le(r)?;
        let last_mod_date = read_u16_le(r)?;
        let crc32 = read_u32_le(r)?;
        let compressed_size_32 = read_u32_le(r)?;
        let uncompressed_size_32 = read_u32_le(r)?;
        let name_len = read_u16_le(r)? as usize;
        let extra_len = read_u16_le(r)? as usize;
        let comment_len = read_u16_le(r)? as usize;
        let disk_number_start_16 = read_u16_le(r)?;
        let internal_attrs = read_u16_le(r)?;
        let external_attrs = read_u32_le(r)?;
        let local_header_offset_32 = read_u32_le(r)?;

        let mut name = vec![0u8; name_len];
        r.read_exact(&mut name)?;
        let mut extra = vec![0u8; extra_len];
        r.read_exact(&mut extra)?;
        let mut comment = vec![0u8; comment_len];
        r.read_exact(&mut comment)?;

        let mut compressed_size = compressed_size_32 as u64;
        let mut uncompressed_size = uncompressed_size_32 as u64;
        let mut local_header_offset = local_header_offset_32 as u64;
        let mut disk_number_start = disk_number_start_16 as u32;

        // Per spec: consult the ZIP64 extra whenever present, regardless of
        // whether the classic fields actually sentineled.
        if let Some(payload) = extra::find_zip64_payload(&extra) {
            if let ExtraField::Zip64 {
                uncompressed_size: u,
                compressed_size: c,
                local_header_offset: o,
                disk_start: d,
            } = extra::decode_zip64(
                payload,
                uncompressed_size_32 == 0xFFFF_FFFF,
                compressed_size_32 == 0xFFFF_FFFF,
                local_header_offset_32 == 0xFFFF_FFFF,
                disk_number_start_16 == 0xFFFF,
            ) {
                if let Some(v) = u {
                    uncompressed_size = v;
                }
                if let Some(v) = c {
                    compressed_size = v;
                }
                if let Some(v) = o {
                    local_header_offset = v;
                }
                if let Some(v) = d {
                    disk_number_start = v;
                }
            }
        }

        Ok(Self {
            version_made_by,
            version_needed,
            gp_flag,
            compression_method,
            last_mod_time,
            last_mod_date,
            crc32,
            compressed_size,
            uncompressed_size,
            disk_number_start,
            internal_attrs,
            external_attrs,
            local_header_offset,
            name,
            extra,
            comment,
        })
    }

    pub fn encoded_len_hint(&self) -> u64 {
        46 + self.name.len() as u64 + self.extra.len() as u64 + self.comment.len() as u64
    }
}

fn sentinel32(v: u64) -> u32 {
    if v > u32::MAX as u64 {
        0xFFFF_FFFF
    } else {
        v as u32
    }
}
