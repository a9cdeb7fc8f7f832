//! Extra-field `(tag:u16, len:u16, payload)` tuples.
//!
//! Generalizes the single-purpose ZIP64 extra-field parsing loop in
//! `examples/KSD-CO-s-zip/src/reader.rs::read_central_directory` into a
//! table-driven parser covering every tag this crate emits or must
//! recognize on read: ZIP64 (`0x0001`), NTFS timestamps (`0x000a`), Unix
//! extended timestamps (`0x5455`), and the WinZip AES marker (`0x9901`).

pub const TAG_ZIP64: u16 = 0x0001;
pub const TAG_NTFS: u16 = 0x000a;
pub const TAG_UNIX_EXT_TIME: u16 = 0x5455;
pub const TAG_AES: u16 = 0x9901;

/// One parsed extra-field record.
#[derive(Debug, Clone)]
pub enum ExtraField {
    /// ZIP64 sizes/offset/disk, present only for the 32-bit-sentineled
    /// subset the producer chose to include, in the fixed APPNOTE order:
    /// uncompressed size, compressed size, local header offset, disk start.
    Zip64 {
        uncompressed_size: Option<u64>,
        compressed_size: Option<u64>,
        local_header_offset: Option<u64>,
        disk_start: Option<u32>,
    },
    /// NTFS 64-bit timestamps, 100ns ticks since 1601-01-01.
    Ntfs {
        mtime: u64,
        atime: u64,
        ctime: u64,
    },
    /// Unix extended-timestamp extra field (seconds since 1970-01-01).
    UnixExtTime {
        mtime: Option<i32>,
        atime: Option<i32>,
        ctime: Option<i32>,
    },
    /// WinZip AES extra field: vendor version, "AE" vendor id, strength,
    /// and the real compression method (stored here since the classic
    /// method field is forced to 99 when AES is active).
    Aes {
        vendor_version: u16,
        strength: u8,
        actual_method: u16,
    },
    /// Any tag this crate does not interpret; preserved byte-for-byte so a
    /// copy-through re-save does not lose producer-specific extras.
    Unknown { tag: u16, payload: Vec<u8> },
}

/// Parse every extra-field record out of a raw extra-field blob.
///
/// `sentineled_u32` and `sentineled_u64` tell the ZIP64 branch which of the
/// classic fields were `0xFFFFFFFF`/`0xFFFF`, in order, since the ZIP64
/// extra field only carries the 64-bit values whose 32-bit counterpart
/// sentineled — but per spec this parser is invoked whenever a ZIP64 extra
/// is present at all, not only when a field sentineled.
pub fn parse_extra_fields(raw: &[u8]) -> Vec<ExtraField> {
    let mut out = Vec::new();
    let mut i = 0usize;
    while i + 4 <= raw.len() {
        let tag = u16::from_le_bytes([raw[i], raw[i + 1]]);
        let len = u16::from_le_bytes([raw[i + 2], raw[i + 3]]) as usize;
        let start = i + 4;
        if start + len > raw.len() {
            break;
        }
        let payload = &raw[start..start + len];
        out.push(match tag {
            TAG_NTFS => parse_ntfs(payload)
                .unwrap_or_else(|| ExtraField::Unknown { tag, payload: payload.to_vec() }),
            TAG_UNIX_EXT_TIME => parse_unix_ext_time(payload),
            TAG_AES => parse_aes(payload)
                .unwrap_or_else(|| ExtraField::Unknown { tag, payload: payload.to_vec() }),
            TAG_ZIP64 => ExtraField::Unknown { tag, payload: payload.to_vec() },
            _ => ExtraField::Unknown { tag, payload: payload.to_vec() },
        });
        i = start + len;
    }
    out
}

/// ZIP64 extra fields require knowing which classic 32-bit fields
/// sentineled, so they are parsed separately by the header decoders
/// (see `format::local_header`/`format::central_header`) rather than via
/// `parse_extra_fields`.
pub fn find_zip64_payload(raw: &[u8]) -> Option<&[u8]> {
    let mut i = 0usize;
    while i + 4 <= raw.len() {
        let tag = u16::from_le_bytes([raw[i], raw[i + 1]]);
        let len = u16::from_le_bytes([raw[i + 2], raw[i + 3]]) as usize;
        let start = i + 4;
        if start + len > raw.len() {
            break;
        }
        if tag == TAG_ZIP64 {
            return Some(&raw[start..start + len]);
        }
        i = start + len;
    }
    None
}

fn read_u64(buf: &[u8], at: usize) -> Option<u64> {
    buf.get(at..at + 8).map(|s| u64::from_le_bytes(s.try_into().unwrap()))
}

fn read_u32(buf: &[u8], at: usize) -> Option<u32> {
    buf.get(at..at + 4).map(|s| u32::from_le_bytes(s.try_into().unwrap()))
}

/// Decodes the ZIP64 extra payload given which classic fields sentineled,
/// in APPNOTE's fixed field order.
pub fn decode_zip64(
    payload: &[u8],
    uncompressed_sentineled: bool,
    compressed_sentineled: bool,
    offset_sentineled: bool,
    disk_sentineled: bool,
) -> ExtraField {
    let mut cursor = 0usize;
    let mut uncompressed_size = None;
    let mut compressed_size = None;
    let mut local_header_offset = None;
    let mut disk_start = None;

    if uncompressed_sentineled {
        if let Some(v) = read_u64(payload, cursor) {
            uncompressed_size = Some(v);
            cursor += 8;
        }
    }
    if compressed_sentineled {
        if let Some(v) = read_u64(payload, cursor) {
            compressed_size = Some(v);
            cursor += 8;
        }
    }
    if offset_sentineled {
        if let Some(v) = read_u64(payload, cursor) {
            local_header_offset = Some(v);
            cursor += 8;
        }
    }
    if disk_sentineled {
        if let Some(v) = read_u32(payload, cursor) {
            disk_start = Some(v);
        }
    }

    ExtraField::Zip64 {
        uncompressed_size,
        compressed_size,
        local_header_offset,
        disk_start,
    }
}

pub fn encode_zip64(
    uncompressed_size: Option<u64>,
    compressed_size: Option<u64>,
    local_header_offset: Option<u64>,
    disk_start: Option<u32>,
) -> Vec<u8> {
    let mut data = Vec::new();
    if let Some(v) = uncompressed_size {
        data.extend_from_slice(&v.to_le_bytes());
    }
    if let Some(v) = compressed_size {
        data.extend_from_slice(&v.to_le_bytes());
    }
    if let Some(v) = local_header_offset {
        data.extend_from_slice(&v.to_le_bytes());
    }
    if let Some(v) = disk_start {
        data.extend_from_slice(&v.to_le_bytes());
    }
    if data.is_empty() {
        return data;
    }
    let mut out = Vec::with_capacity(4 + data.len());
    out.extend_from_slice(&TAG_ZIP64.to_le_bytes());
    out.extend_from_slice(&(data.len() as u16).to_le_bytes());
    out.extend_from_slice(&data);
    out
}

fn parse_ntfs(payload: &[u8]) -> Option<ExtraField> {
    // reserved(4) + [tag(2) + size(2) + data] subfields; we only emit/read tag 0x0001
    let mut i = 4usize;
    while i + 4 <= payload.len() {
        let sub_tag = u16::from_le_bytes([payload[i], payload[i + 1]]);
        let sub_len = u16::from_le_bytes([payload[i + 2], payload[i + 3]]) as usize;
        let start = i + 4;
        if start + sub_len > payload.len() {
            break;
        }
        if sub_tag == 0x0001 && sub_len >= 24 {
            let mtime = u64::from_le_bytes(payload[start..start + 8].try_into().unwrap());
            let atime = u64::from_le_bytes(payload[start + 8..start + 16].try_into().unwrap());
            let ctime = u64::from_le_bytes(payload[start + 16..start + 24].try_into().unwrap());
            return Some(ExtraField::Ntfs { mtime, atime, ctime });
        }
        i = start + sub_len;
    }
    None
}

pub fn encode_ntfs(mtime: u64, atime: u64, ctime: u64) -> Vec<u8> {
    let mut sub = Vec::with_capacity(24);
    sub.extend_from_slice(&mtime.to_le_bytes());
    sub.extend_from_slice(&atime.to_le_bytes());
    sub.extend_from_slice(&ctime.to_le_bytes());

    let mut out = Vec::with_capacity(4 + 4 + 4 + 24);
    out.extend_from_slice(&TAG_NTFS.to_le_bytes());
    out.extend_from_slice(&((4 + 4 + sub.len()) as u16).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes()); // reserved
    out.extend_from_slice(&0x0001u16.to_le_bytes());
    out.extend_from_slice(&(sub.len() as u16).to_le_bytes());
    out.extend_from_slice(&sub);
    out
}

fn parse_unix_ext_time(payload: &[u8]) -> ExtraField {
    if payload.is_empty() {
        return ExtraField::UnixExtTime { mtime: None, atime: None, ctime: None };
    }
    let flags = payload[0];
    let mut cursor = 1usize;
    let mut read_i32 = |present: bool| -> Option<i32> {
        if present && cursor + 4 <= payload.len() {
            let v = i32::from_le_bytes(payload[cursor..cursor + 4].try_into().unwrap());
            cursor += 4;
            Some(v)
        } else {
            None
        }
    };
    let mtime = read_i32(flags & 0x01 != 0);
    let atime = read_i32(flags & 0x02 != 0);
    let ctime = read_i32(flags & 0x04 != 0);
    ExtraField::UnixExtTime { mtime, atime, ctime }
}

/// Encodes a local-header-style Unix extended-timestamp field (local
/// headers may carry all three; central-directory copies carry mtime only
/// per common practice, still APPNOTE-legal since the flag byte governs
/// which fields follow).
pub fn encode_unix_ext_time(mtime: Option<i32>, atime: Option<i32>, ctime: Option<i32>) -> Vec<u8> {
    let mut flags = 0u8;
    let mut data = Vec::new();
    if let Some(v) = mtime {
        flags |= 0x01;
        data.extend_from_slice(&v.to_le_bytes());
    }
    if let Some(v) = atime {
        flags |= 0x02;
        data.extend_from_slice(&v.to_le_bytes());
    }
    if let Some(v) = ctime {
        flags |= 0x04;
        data.extend_from_slice(&v.to_le_bytes());
    }
    let mut out = Vec::with_capacity(5 + data.len());
    out.extend_from_slice(&TAG_UNIX_EXT_TIME.to_le_bytes());
    out.extend_from_slice(&((1 + data.len()) as u16).to_le_bytes());
    out.push(flags);
    out.extend_from_slice(&data);
    out
}

fn parse_aes(payload: &[u8]) -> Option<ExtraField> {
    if payload.len() < 7 {
        return None;
    }
    let vendor_version = u16::from_le_bytes([payload[0], payload[1]]);
    if &payload[2..4] != b"AE" {
        return None;
    }
    let strength = payload[4];
    let actual_method = u16::from_le_bytes([payload[5], payload[6]]);
    Some(ExtraField::Aes { vendor_version, strength, actual_method })
}

pub fn encode_aes(strength_code: u8, actual_method: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(11);
    out.extend_from_slice(&TAG_AES.to_le_bytes());
    out.extend_from_slice(&7u16.to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes()); // vendor version AE-2
    out.extend_from_slice(b"AE");
    out.push(strength_code);
    out.extend_from_slice(&actual_method.to_le_bytes());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zip64_round_trip() {
        let encoded = encode_zip64(Some(5_000_000_000), Some(4_000_000_000), Some(123), None);
        let payload = find_zip64_payload(&encoded).unwrap();
        let decoded = decode_zip64(payload, true, true, true, false);
        match decoded {
            ExtraField::Zip64 { uncompressed_size, compressed_size, local_header_offset, disk_start } => {
                assert_eq!(uncompressed_size, Some(5_000_000_000));
                assert_eq!(compressed_size, Some(4_000_000_000));
                assert_eq!(local_header_offset, Some(123));
                assert_eq!(disk_start, None);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn ntfs_round_trip() {
        let encoded = encode_ntfs(1, 2, 3);
        let fields = parse_extra_fields(&encoded);
        assert!(matches!(fields[0], ExtraField::Ntfs { mtime: 1, atime: 2, ctime: 3 }));
    }

    #[test]
    fn aes_round_trip() {
        let encoded = encode_aes(0x03, 8);
        let fields = parse_extra_fields(&encoded);
        match fields[0] {
            ExtraField::Aes { strength, actual_method, .. } => {
                assert_eq!(strength, 0x03);
                assert_eq!(actual_method, 8);
            }
            _ => panic!("wrong variant"),
        }
    }
}
