//! PKZIP binary structures: local/central headers, EOCD, ZIP64 records,
//! data descriptor, extra fields. All little-endian, per APPNOTE 6.3.x.

pub mod central_header;
pub mod data_descriptor;
pub mod eocd;
pub mod extra;
pub mod local_header;
pub mod zip64;

pub const SIG_LOCAL_FILE_HEADER: u32 = 0x0403_4b50;
pub const SIG_DATA_DESCRIPTOR: u32 = 0x0807_4b50;
pub const SIG_CENTRAL_DIRECTORY_HEADER: u32 = 0x0201_4b50;
pub const SIG_EOCD: u32 = 0x0605_4b50;
pub const SIG_ZIP64_EOCD: u32 = 0x0606_4b50;
pub const SIG_ZIP64_EOCD_LOCATOR: u32 = 0x0706_4b50;
/// First 4 bytes of segment 0 of a split archive.
pub const SIG_SPLIT_ARCHIVE: u32 = SIG_DATA_DESCRIPTOR;

/// General-purpose bit flags used by this crate.
pub mod gp_flag {
    /// Bit 0: entry is encrypted.
    pub const ENCRYPTED: u16 = 1 << 0;
    /// Bit 3: sizes/CRC are unknown at local-header-write time; a trailing
    /// data descriptor carries the real values.
    pub const DATA_DESCRIPTOR: u16 = 1 << 3;
    /// Bit 11: name/comment is UTF-8 rather than CP437.
    pub const UTF8: u16 = 1 << 11;
}

pub(crate) fn read_u16_le<R: std::io::Read>(r: &mut R) -> std::io::Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

pub(crate) fn read_u32_le<R: std::io::Read>(r: &mut R) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

pub(crate) fn read_u64_le<R: std::io::Read>(r: &mut R) -> std::io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}
