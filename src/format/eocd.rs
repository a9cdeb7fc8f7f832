//! End-of-central-directory record (22 bytes + comment), signature
//! `0x06054b50`. Locating it by backward scan generalizes
//! `examples/KSD-CO-s-zip/src/reader.rs::find_eocd`.

use std::io::{Read, Seek, SeekFrom, Write};

use super::{read_u16_le, read_u32_le, SIG_EOCD};
use crate::error::{Result, ZipError};

/// EOCD is 22 bytes fixed; comment can be up to 65,535 bytes, so the
/// maximum distance from end-of-file to the signature is 22 + 65535.
const MAX_EOCD_SEARCH: u64 = 22 + 65_535;

#[derive(Debug, Clone)]
pub struct Eocd {
    pub disk_number: u16,
    pub central_dir_disk: u16,
    pub entries_on_disk: u16,
    pub total_entries: u16,
    pub central_dir_size: u32,
    pub central_dir_offset: u32,
    pub comment: Vec<u8>,
}

impl Eocd {
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        w.write_all(&SIG_EOCD.to_le_bytes())?;
        w.write_all(&self.disk_number.to_le_bytes())?;
        w.write_all(&self.central_dir_disk.to_le_bytes())?;
        w.write_all(&self.entries_on_disk.to_le_bytes())?;
        w.write_all(&self.total_entries.to_le_bytes())?;
        w.write_all(&self.central_dir_size.to_le_bytes())?;
        w.write_all(&self.central_dir_offset.to_le_bytes())?;
        w.write_all(&(self.comment.len() as u16).to_le_bytes())?;
        w.write_all(&self.comment)?;
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        let sig = read_u32_le(r)?;
        if sig != SIG_EOCD {
            return Err(ZipError::corrupt(format!("bad EOCD signature: {sig:#010x}")));
        }
        let disk_number = read_u16_le(r)?;
        let central_dir_disk = read_u16_le(r)?;
        let entries_on_disk = read_u16_le(r)?;
        let total_entries = read_u16_le(r)?;
        let central_dir_size = read_u32_le(r)?;
        let central_dir_offset = read_u32_le(r)?;
        let comment_len = read_u16_le(r)? as usize;
        let mut comment = vec![0u8; comment_len];
        r.read_exact(&mut comment)?;
        Ok(Self {
            disk_number,
            central_dir_disk,
            entries_on_disk,
            total_entries,
            central_dir_size,
            central_dir_offset,
            comment,
        })
    }

    pub fn needs_zip64(&self) -> bool {
        self.total_entries == 0xFFFF
            || self.central_dir_size == 0xFFFF_FFFF
            || self.central_dir_offset == 0xFFFF_FFFF
    }
}

/// Scans backward from the end of `stream` for the EOCD signature,
/// returning its absolute offset. A candidate is accepted only if its
/// comment-length field accounts for every remaining byte to EOF — this
/// rejects a stray signature-like byte sequence embedded in trailing junk
/// or in an entry's own data, in favor of one further back whose comment
/// actually reaches the end of the file.
pub fn find_eocd<S: Read + Seek>(stream: &mut S) -> Result<u64> {
    let file_size = stream.seek(SeekFrom::End(0))?;
    let search_start = file_size.saturating_sub(MAX_EOCD_SEARCH);
    stream.seek(SeekFrom::Start(search_start))?;

    let mut buffer = Vec::new();
    stream.read_to_end(&mut buffer)?;

    let needle = SIG_EOCD.to_le_bytes();
    for i in (0..buffer.len().saturating_sub(3)).rev() {
        if buffer[i..i + 4] != needle {
            continue;
        }
        let Some(comment_len_bytes) = buffer.get(i + 20..i + 22) else {
            continue;
        };
        let comment_len = u16::from_le_bytes([comment_len_bytes[0], comment_len_bytes[1]]) as usize;
        if i + 22 + comment_len == buffer.len() {
            return Ok(search_start + i as u64);
        }
    }

    Err(ZipError::NotAZip)
}
