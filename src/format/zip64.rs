//! ZIP64 end-of-central-directory record (56+ bytes) and locator (20 bytes).

use std::io::{Read, Write};

use super::{read_u16_le, read_u32_le, read_u64_le, SIG_ZIP64_EOCD, SIG_ZIP64_EOCD_LOCATOR};
use crate::error::{Result, ZipError};

#[derive(Debug, Clone)]
pub struct Zip64Eocd {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub central_dir_disk: u32,
    pub entries_on_disk: u64,
    pub total_entries: u64,
    pub central_dir_size: u64,
    pub central_dir_offset: u64,
}

impl Zip64Eocd {
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&SIG_ZIP64_EOCD.to_le_bytes())?;
        // size of remaining record, fixed at 44 since we emit no extensible data sector
        w.write_all(&44u64.to_le_bytes())?;
        w.write_all(&self.version_made_by.to_le_bytes())?;
        w.write_all(&self.version_needed.to_le_bytes())?;
        w.write_all(&self.disk_number.to_le_bytes())?;
        w.write_all(&self.central_dir_disk.to_le_bytes())?;
        w.write_all(&self.entries_on_disk.to_le_bytes())?;
        w.write_all(&self.total_entries.to_le_bytes())?;
        w.write_all(&self.central_dir_size.to_le_bytes())?;
        w.write_all(&self.central_dir_offset.to_le_bytes())?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let sig = read_u32_le(r)?;
        if sig != SIG_ZIP64_EOCD {
            return Err(ZipError::corrupt(format!(
                "bad ZIP64 EOCD signature: {sig:#010x}"
            )));
        }
        let record_size = read_u64_le(r)?;
        let version_made_by = read_u16_le(r)?;
        let version_needed = read_u16_le(r)?;
        let disk_number = read_u32_le(r)?;
        let central_dir_disk = read_u32_le(r)?;
        let entries_on_disk = read_u64_le(r)?;
        let total_entries = read_u64_le(r)?;
        let central_dir_size = read_u64_le(r)?;
        let central_dir_offset = read_u64_le(r)?;
        // Skip any extensible data sector beyond the fixed 44 bytes we understand.
        let consumed = 44u64;
        if record_size > consumed {
            let mut skip = vec![0u8; (record_size - consumed) as usize];
            r.read_exact(&mut skip)?;
        }
        Ok(Self {
            version_made_by,
            version_needed,
            disk_number,
            central_dir_disk,
            entries_on_disk,
            total_entries,
            central_dir_size,
            central_dir_offset,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Zip64EocdLocator {
    pub zip64_eocd_disk: u32,
    pub zip64_eocd_offset: u64,
    pub total_disks: u32,
}

impl Zip64EocdLocator {
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&SIG_ZIP64_EOCD_LOCATOR.to_le_bytes())?;
        w.write_all(&self.zip64_eocd_disk.to_le_bytes())?;
        w.write_all(&self.zip64_eocd_offset.to_le_bytes())?;
        w.write_all(&self.total_disks.to_le_bytes())?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let sig = read_u32_le(r)?;
        if sig != SIG_ZIP64_EOCD_LOCATOR {
            return Err(ZipError::corrupt(format!(
                "bad ZIP64 EOCD locator signature: {sig:#010x}"
            )));
        }
        let zip64_eocd_disk = read_u32_le(r)?;
        let zip64_eocd_offset = read_u64_le(r)?;
        let total_disks = read_u32_le(r)?;
        Ok(Self {
            zip64_eocd_disk,
            zip64_eocd_offset,
            total_disks,
        })
    }
}
