//! Opens an archive: locates the EOCD (and its ZIP64 extension, if any),
//! parses the central directory, and — when that fails — reconstructs an
//! equivalent directory by scanning local headers from scratch.
//!
//! Generalizes the three-function split in
//! `examples/KSD-CO-s-zip/src/reader.rs` (`find_eocd` /
//! `read_zip64_eocd` / `read_central_directory`) from a single-file,
//! throwaway `Vec<ZipEntry>` builder into a segment-aware directory loader
//! that `Archive::open` and `Archive::fix_directory` both drive.

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::archive::{ArchiveItem, ArchiveSource, DirectoryEntry};
use crate::cipher::aes::AesStrength;
use crate::cipher::pkzip_weak::CheckByte;
use crate::cipher::EncryptionKind;
use crate::codec::{CompressionMethod, METHOD_AES};
use crate::encoding::decode_name;
use crate::entry::{decode_entry, CipherSource};
use crate::error::{Result, ZipError};
use crate::format::central_header::CentralDirectoryHeader;
use crate::format::eocd::{find_eocd, Eocd};
use crate::format::extra::{parse_extra_fields, ExtraField};
use crate::format::local_header::LocalFileHeader;
use crate::format::zip64::{Zip64Eocd, Zip64EocdLocator};
use crate::format::{gp_flag, SIG_CENTRAL_DIRECTORY_HEADER, SIG_LOCAL_FILE_HEADER};
use crate::fs::{segment_path, FileSystem};
use crate::segment::SegmentedReader;

pub struct OpenedArchive {
    pub segment_paths: Vec<PathBuf>,
    pub entries: Vec<DirectoryEntry>,
    pub comment: Vec<u8>,
}

fn central_header_to_directory_entry(header: CentralDirectoryHeader) -> DirectoryEntry {
    let fields = parse_extra_fields(&header.extra);
    let utf8 = header.gp_flag & gp_flag::UTF8 != 0;
    let name = decode_name(&header.name, utf8);

    let (compression, encryption) = classify_method(header.compression_method, header.gp_flag, &fields);

    DirectoryEntry {
        name,
        comment: header.comment,
        compression,
        encryption,
        gp_flag: header.gp_flag,
        crc32: header.crc32,
        compressed_size: header.compressed_size,
        uncompressed_size: header.uncompressed_size,
        starting_disk: header.disk_number_start,
        local_header_offset: header.local_header_offset,
        external_attrs: header.external_attrs,
        last_mod_time: header.last_mod_time,
        last_mod_date: header.last_mod_date,
        raw_extra: header.extra,
    }
}

/// Determines an entry's real compression method and encryption kind from
/// the header's method field, GP flags, and (for AES) the `0x9901` extra.
fn classify_method(method: u16, gp: u16, fields: &[ExtraField]) -> (CompressionMethod, EncryptionKind) {
    let encrypted = gp & gp_flag::ENCRYPTED != 0;
    if method == METHOD_AES {
        let aes = fields.iter().find_map(|f| match f {
            ExtraField::Aes { strength, actual_method, .. } => Some((*strength, *actual_method)),
            _ => None,
        });
        if let Some((strength, actual_method)) = aes {
            let kind = if strength == 0x01 {
                EncryptionKind::WinzipAes128
            } else {
                EncryptionKind::WinzipAes256
            };
            let compression = CompressionMethod::from_zip_method(actual_method).unwrap_or(CompressionMethod::Store);
            return (compression, kind);
        }
    }
    let compression = CompressionMethod::from_zip_method(method).unwrap_or(CompressionMethod::Store);
    let encryption = if encrypted {
        EncryptionKind::PkzipWeak
    } else {
        EncryptionKind::None
    };
    (compression, encryption)
}

/// Opens `base_path` (and its sibling segments, if split) and parses its
/// central directory.
pub fn open_directory<FS: FileSystem>(fs: &FS, base_path: &Path) -> Result<OpenedArchive> {
    let mut final_segment = fs.open_read(base_path)?;
    let local_eocd_offset = find_eocd(&mut final_segment)?;
    final_segment.seek(SeekFrom::Start(local_eocd_offset))?;
    let eocd = Eocd::read_from(&mut final_segment)?;

    let total_segments = eocd.disk_number as u32 + 1;
    let segment_paths: Vec<PathBuf> = (1..=total_segments)
        .map(|i| segment_path(base_path, i, total_segments))
        .collect();
    for path in &segment_paths {
        if !fs.exists_file(path) {
            return Err(ZipError::corrupt(format!(
                "missing segment {}",
                path.display()
            )));
        }
    }

    let mut reader = SegmentedReader::open(fs, segment_paths.clone())?;
    let final_size = reader.segment_size(reader.segment_count() - 1);
    let absolute_eocd_offset = reader.total_len() - final_size + local_eocd_offset;

    let (central_dir_offset, central_dir_size, total_entries) = if eocd.needs_zip64() {
        reader.seek(SeekFrom::Start(absolute_eocd_offset.saturating_sub(20)))?;
        let locator = Zip64EocdLocator::read_from(&mut reader)?;
        reader.seek(SeekFrom::Start(locator.zip64_eocd_offset))?;
        let zip64 = Zip64Eocd::read_from(&mut reader)?;
        (zip64.central_dir_offset, zip64.central_dir_size, zip64.total_entries)
    } else {
        (
            eocd.central_dir_offset as u64,
            eocd.central_dir_size as u64,
            eocd.total_entries as u64,
        )
    };

    reader.seek(SeekFrom::Start(central_dir_offset))?;
    let mut entries = Vec::with_capacity(total_entries as usize);
    let mut remaining = central_dir_size;
    for _ in 0..total_entries {
        if remaining == 0 {
            break;
        }
        let before = reader.stream_position()?;
        let header = CentralDirectoryHeader::read_from(&mut reader)?;
        let consumed = reader.stream_position()? - before;
        remaining = remaining.saturating_sub(consumed);
        entries.push(central_header_to_directory_entry(header));
    }

    Ok(OpenedArchive {
        segment_paths,
        entries,
        comment: eocd.comment,
    })
}

/// Rebuilds a directory-equivalent entry list by scanning for local file
/// header signatures from the start of the (possibly segmented) archive,
/// ignoring whatever central directory (if any) is currently on disk.
/// Used when the recorded directory is missing, truncated, or otherwise
/// untrustworthy.
pub fn full_scan<FS: FileSystem>(fs: &FS, segment_paths: &[PathBuf]) -> Result<Vec<DirectoryEntry>> {
    let mut reader = SegmentedReader::open(fs, segment_paths.to_vec())?;
    let total_len = reader.total_len();
    let mut entries = Vec::new();
    let mut pos: u64 = 0;

    while pos + 4 <= total_len {
        reader.seek(SeekFrom::Start(pos))?;
        let mut sig_buf = [0u8; 4];
        if reader.read_exact(&mut sig_buf).is_err() {
            break;
        }
        let sig = u32::from_le_bytes(sig_buf);
        if sig != SIG_LOCAL_FILE_HEADER {
            pos += 1;
            continue;
        }

        reader.seek(SeekFrom::Start(pos))?;
        let header = match LocalFileHeader::read_from(&mut reader) {
            Ok(h) => h,
            Err(_) => {
                pos += 1;
                continue;
            }
        };
        let data_start = reader.stream_position()?;
        let has_descriptor = header.gp_flag & gp_flag::DATA_DESCRIPTOR != 0;

        let (compressed_size, uncompressed_size, crc32, next_pos) = if has_descriptor {
            match locate_next_marker(&mut reader, data_start, total_len) {
                Some(marker_pos) => {
                    // Try the classic 16-byte (signature-inclusive) window
                    // first; `recode` only emits the 24-byte ZIP64-width one
                    // when a recoded entry's size actually needs it.
                    let classic_start = marker_pos.saturating_sub(16);
                    reader.seek(SeekFrom::Start(classic_start))?;
                    let mut desc_buf = [0u8; 16];
                    reader.read_exact(&mut desc_buf)?;
                    let desc_sig = u32::from_le_bytes(desc_buf[0..4].try_into().unwrap());
                    if desc_sig == crate::format::SIG_DATA_DESCRIPTOR {
                        let crc = u32::from_le_bytes(desc_buf[4..8].try_into().unwrap());
                        let comp = u32::from_le_bytes(desc_buf[8..12].try_into().unwrap()) as u64;
                        let uncomp = u32::from_le_bytes(desc_buf[12..16].try_into().unwrap()) as u64;
                        (comp, uncomp, crc, marker_pos)
                    } else if let Some(zip64_start) = marker_pos.checked_sub(24) {
                        reader.seek(SeekFrom::Start(zip64_start))?;
                        let mut zip64_buf = [0u8; 24];
                        reader.read_exact(&mut zip64_buf)?;
                        let zip64_sig = u32::from_le_bytes(zip64_buf[0..4].try_into().unwrap());
                        if zip64_sig == crate::format::SIG_DATA_DESCRIPTOR {
                            let crc = u32::from_le_bytes(zip64_buf[4..8].try_into().unwrap());
                            let comp = u64::from_le_bytes(zip64_buf[8..16].try_into().unwrap());
                            let uncomp = u64::from_le_bytes(zip64_buf[16..24].try_into().unwrap());
                            (comp, uncomp, crc, marker_pos)
                        } else {
                            let span = classic_start.saturating_sub(data_start);
                            (span, span, header.crc32, marker_pos)
                        }
                    } else {
                        let span = classic_start.saturating_sub(data_start);
                        (span, span, header.crc32, marker_pos)
                    }
                }
                None => {
                    let span = total_len.saturating_sub(data_start);
                    (span, span, header.crc32, total_len)
                }
            }
        } else {
            let comp = header.compressed_size as u64;
            (comp, header.uncompressed_size as u64, header.crc32, data_start + comp)
        };

        let fields = parse_extra_fields(&header.extra);
        let (compression, encryption) = classify_method(header.compression_method, header.gp_flag, &fields);
        let utf8 = header.gp_flag & gp_flag::UTF8 != 0;

        entries.push(DirectoryEntry {
            name: decode_name(&header.name, utf8),
            comment: Vec::new(),
            compression,
            encryption,
            gp_flag: header.gp_flag,
            crc32,
            compressed_size,
            uncompressed_size,
            starting_disk: reader.segment_for(pos),
            local_header_offset: pos,
            external_attrs: 0,
            last_mod_time: header.last_mod_time,
            last_mod_date: header.last_mod_date,
            raw_extra: header.extra,
        });

        pos = next_pos.max(pos + 1);
    }

    if entries.is_empty() {
        return Err(ZipError::IrreparablyCorrupt(
            "no local file headers found during full scan".into(),
        ));
    }
    Ok(entries)
}

/// Scans forward from `from` for the next local-file-header or
/// central-directory-header signature, returning its absolute offset.
fn locate_next_marker<R: Read + Seek>(reader: &mut R, from: u64, total_len: u64) -> Option<u64> {
    reader.seek(SeekFrom::Start(from)).ok()?;
    let mut window = [0u8; 4];
    let mut pos = from;
    let mut filled = 0usize;
    while pos < total_len {
        let mut byte = [0u8; 1];
        if reader.read_exact(&mut byte).is_err() {
            return None;
        }
        if filled < 4 {
            window[filled] = byte[0];
            filled += 1;
        } else {
            window.copy_within(1..4, 0);
            window[3] = byte[0];
        }
        if filled == 4 {
            let sig = u32::from_le_bytes(window);
            if sig == SIG_LOCAL_FILE_HEADER || sig == SIG_CENTRAL_DIRECTORY_HEADER {
                return Some(pos - 3);
            }
        }
        pos += 1;
    }
    None
}

/// PKZIP-weak encryption headers are checked against either the entry's
/// CRC32 or its DOS last-mod time, depending on whether GP-bit 3 (data
/// descriptor) was set when the header was written — `recode` always sets
/// the bit and checks against time, since the CRC isn't known until after
/// compression runs.
fn pkzip_weak_check_byte(entry: &DirectoryEntry) -> CheckByte {
    if entry.gp_flag & gp_flag::DATA_DESCRIPTOR != 0 {
        CheckByte::Time(entry.last_mod_time)
    } else {
        CheckByte::Crc(entry.crc32)
    }
}

/// Checks `password` against the first encrypted entry, without
/// decrypting any entry content.
pub fn check_password<FS: FileSystem>(
    fs: &FS,
    source: &ArchiveSource,
    items: &[ArchiveItem],
    password: &str,
) -> Result<bool> {
    let target = items.iter().find_map(|item| match item {
        ArchiveItem::Stored(e) if e.encryption != EncryptionKind::None => Some(e),
        _ => None,
    });
    let Some(entry) = target else {
        return Ok(true);
    };

    let mut reader = SegmentedReader::open(fs, source.segment_paths.clone())?;
    reader.seek(SeekFrom::Start(entry.local_header_offset))?;
    let header = LocalFileHeader::read_from(&mut reader)?;

    match entry.encryption {
        EncryptionKind::PkzipWeak => {
            let check = pkzip_weak_check_byte(entry);
            crate::cipher::pkzip_weak::PkzipWeakDecryptor::check_password(&mut reader, password, check)
        }
        EncryptionKind::WinzipAes128 | EncryptionKind::WinzipAes256 => {
            let strength = if entry.encryption == EncryptionKind::WinzipAes128 {
                AesStrength::Aes128
            } else {
                AesStrength::Aes256
            };
            let mut salt = vec![0u8; strength.salt_size()];
            reader.read_exact(&mut salt)?;
            let mut pv = [0u8; 2];
            reader.read_exact(&mut pv)?;
            crate::cipher::aes::AesDecryptor::check_password(password, strength, &salt, pv)
        }
        EncryptionKind::None => {
            let _ = header;
            Ok(true)
        }
    }
}

/// Decodes one stored entry's content into `out`: seeks to its local
/// header, skips past it, then runs the cipher/compression pipeline in
/// reverse (mirroring [`crate::entry::encode_entry`]).
pub fn extract_entry<FS: FileSystem>(
    fs: &FS,
    source: &ArchiveSource,
    entry: &DirectoryEntry,
    password: Option<&str>,
    out: &mut impl Write,
) -> Result<()> {
    let mut reader = SegmentedReader::open(fs, source.segment_paths.clone())?;
    reader.seek(SeekFrom::Start(entry.local_header_offset))?;
    LocalFileHeader::read_from(&mut reader)?;

    match entry.encryption {
        EncryptionKind::None => {
            let mut limited = (&mut reader).take(entry.compressed_size);
            decode_entry(CipherSource::none(&mut limited), entry.compression, entry.crc32, None, out)
        }
        EncryptionKind::PkzipWeak => {
            let password = password.ok_or(ZipError::BadPassword)?;
            let check = pkzip_weak_check_byte(entry);
            let mut limited = (&mut reader).take(entry.compressed_size);
            let cipher_source = CipherSource::pkzip_weak(&mut limited, password, check)?;
            decode_entry(cipher_source, entry.compression, entry.crc32, None, out)
        }
        EncryptionKind::WinzipAes128 | EncryptionKind::WinzipAes256 => {
            let password = password.ok_or(ZipError::BadPassword)?;
            let strength = if entry.encryption == EncryptionKind::WinzipAes128 {
                AesStrength::Aes128
            } else {
                AesStrength::Aes256
            };
            let mut salt = vec![0u8; strength.salt_size()];
            reader.read_exact(&mut salt)?;
            let mut pv = [0u8; 2];
            reader.read_exact(&mut pv)?;

            // The auth code trails the ciphertext, so its bytes aren't known
            // until the ciphertext has been fully read; buffer the rest of
            // the entry up front and split it, rather than trying to stream
            // past a boundary that isn't known until we're past it.
            let overhead = strength.salt_size() as u64 + 2 + 10;
            let ciphertext_len = entry.compressed_size.saturating_sub(overhead) as usize;
            let mut rest = vec![0u8; ciphertext_len + 10];
            reader.read_exact(&mut rest)?;
            let (ciphertext, auth_code) = rest.split_at(ciphertext_len);

            let cipher_source = CipherSource::aes(ciphertext, password, strength, &salt, pv)?;
            decode_entry(cipher_source, entry.compression, entry.crc32, Some(auth_code), out)
        }
    }
}
