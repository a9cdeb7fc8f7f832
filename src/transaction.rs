//! The save/update transaction: classifies entries as copy-through or
//! re-encoded, writes them (and the central directory) to a fresh set of
//! temp segments, and commits atomically. Generalizes the monolithic
//! "walk entries, write everything" loop in
//! `examples/KSD-CO-s-zip/src/writer.rs` into the seven-step algorithm
//! this crate's archive model requires (copy-through for unmodified
//! entries, ZIP64 promotion, segment rollover, zombie-rename commit).

use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::debug;

use crate::archive::{Archive, ArchiveItem, ArchiveSource, DirectoryEntry, SaveOptions, Zip64Policy};
use crate::cipher::EncryptionKind;
use crate::codec::{CompressionMethod, METHOD_AES};
use crate::encoding::encode_name;
use crate::entry::{aes_strength_for, encode_entry, CipherSink};
use crate::error::{Result, ZipError};
use crate::format::central_header::CentralDirectoryHeader;
use crate::format::data_descriptor::DataDescriptor;
use crate::format::eocd::Eocd;
use crate::format::extra::{encode_aes, encode_ntfs};
use crate::format::local_header::LocalFileHeader;
use crate::format::zip64::{Zip64Eocd, Zip64EocdLocator};
use crate::format::gp_flag;
use crate::fs::FileSystem;
use crate::progress::ProgressEvent;
use crate::segment::{SegmentPolicy, SegmentedReader, SegmentedWriter};
use crate::timefmt::{now_unix, unix_to_dos, unix_to_ntfs_ticks};

/// One entry as resolved for the central directory, regardless of whether
/// it was copied through or freshly recoded.
struct ResolvedEntry {
    name: String,
    comment: Vec<u8>,
    compression_method_field: u16,
    gp_flag: u16,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    starting_disk: u32,
    local_header_offset: u64,
    external_attrs: u32,
    last_mod_time: u16,
    last_mod_date: u16,
    extra: Vec<u8>,
    version_needed: u16,
    directory_entry: DirectoryEntry,
}

pub struct SaveTransaction;

impl SaveTransaction {
    pub fn run<FS: FileSystem>(archive: &mut Archive<FS>, dst: &Path, mut options: SaveOptions<'_>) -> Result<()> {
        let max_segment_size = archive.options.max_segment_size;
        if max_segment_size != 0 && max_segment_size < crate::archive::MIN_SEGMENT_SIZE {
            return Err(ZipError::InvalidArgument(format!(
                "max_segment_size must be 0 or at least {}",
                crate::archive::MIN_SEGMENT_SIZE
            )));
        }
        let policy = if max_segment_size == 0 {
            SegmentPolicy::single_file()
        } else {
            SegmentPolicy::segmented(max_segment_size)
        };

        // Self-read safety (step 7): open the prior segments for
        // copy-through reads before the new temp segments are created, and
        // keep that reader alive until commit — even when `dst` is the same
        // path the archive was opened from.
        let mut old_reader = match &archive.source {
            Some(source) => Some(SegmentedReader::open(&archive.fs, source.segment_paths.clone())?),
            None => None,
        };

        let mut writer = SegmentedWriter::new(&archive.fs, dst, policy)?;
        let total = archive.items.len() as u64;
        if let Some(cb) = options.progress.as_mut() {
            cb(ProgressEvent::Started { total_entries: total });
        }

        let mut resolved = Vec::with_capacity(archive.items.len());
        for (index, item) in archive.items.iter().enumerate() {
            if let Some(token) = &options.cancellation {
                if token.is_canceled() {
                    writer.abort();
                    return Err(ZipError::Canceled);
                }
            }
            let name = item.name().to_string();
            if let Some(cb) = options.progress.as_mut() {
                cb(ProgressEvent::BeforeEntry { name: &name, index: index as u64 });
            }

            let entry = match item {
                ArchiveItem::Stored(stored) => {
                    let old_reader = old_reader
                        .as_mut()
                        .ok_or_else(|| ZipError::InvalidArgument("copy-through entry with no backing archive".into()))?;
                    copy_through(old_reader, &mut writer, stored)?
                }
                ArchiveItem::Staged(staged) => recode(&mut writer, staged, &archive.options)?,
            };

            if let Some(cb) = options.progress.as_mut() {
                cb(ProgressEvent::AfterEntry { name: &name, index: index as u64 });
            }
            resolved.push(entry);
        }

        let central_dir_disk = writer.segment_index();
        let central_dir_offset = writer.total_offset();

        for entry in &resolved {
            write_central_header(&mut writer, entry, archive.options.zip64_policy, archive.options.encoding_policy)?;
        }

        let central_dir_size = writer.total_offset() - central_dir_offset;
        let needs_zip64 = archive.options.zip64_policy == Zip64Policy::Always
            || resolved.len() > 0xFFFF
            || central_dir_offset > u32::MAX as u64
            || central_dir_size > u32::MAX as u64
            || central_dir_disk > 0xFFFF;

        if needs_zip64 && archive.options.zip64_policy == Zip64Policy::Never {
            writer.abort();
            return Err(ZipError::Zip64Required);
        }

        if needs_zip64 {
            let zip64_eocd_offset = writer.total_offset();
            let zip64 = Zip64Eocd {
                version_made_by: 45,
                version_needed: 45,
                disk_number: writer.segment_index(),
                central_dir_disk,
                entries_on_disk: resolved.len() as u64,
                total_entries: resolved.len() as u64,
                central_dir_size,
                central_dir_offset,
            };
            zip64.write_to(&mut writer)?;
            Zip64EocdLocator {
                zip64_eocd_disk: writer.segment_index(),
                zip64_eocd_offset,
                total_disks: writer.segment_index() + 1,
            }
            .write_to(&mut writer)?;
        }

        let eocd = Eocd {
            disk_number: writer.segment_index() as u16,
            central_dir_disk: sentinel16(central_dir_disk),
            entries_on_disk: sentinel_count(resolved.len()),
            total_entries: sentinel_count(resolved.len()),
            central_dir_size: sentinel32(central_dir_size),
            central_dir_offset: sentinel32(central_dir_offset),
            comment: archive.archive_comment.clone(),
        };
        eocd.write_to(&mut writer)?;
        writer.flush()?;

        if let Some(cb) = options.progress.as_mut() {
            cb(ProgressEvent::SavingBeforeRename);
        }
        let final_paths = writer.commit()?;
        if let Some(cb) = options.progress.as_mut() {
            cb(ProgressEvent::SavingAfterRename);
        }
        drop(old_reader);

        // A re-save to the same path may produce fewer segments than the
        // archive it replaces (entries removed, a smaller max_segment_size,
        // better compression); any sibling segment left over from the prior
        // save that isn't part of the new segment set is now orphaned.
        if let Some(prior_source) = &archive.source {
            if prior_source.base_path == dst {
                let keep: std::collections::HashSet<&PathBuf> = final_paths.iter().collect();
                for old_path in &prior_source.segment_paths {
                    if !keep.contains(old_path) && archive.fs.exists_file(old_path) {
                        let _ = archive.fs.delete_file(old_path);
                    }
                }
            }
        }

        debug!("save committed {} segment(s) to {}", final_paths.len(), dst.display());

        archive.items = resolved
            .into_iter()
            .map(|e| ArchiveItem::Stored(e.directory_entry))
            .collect();
        archive.source = Some(ArchiveSource {
            base_path: dst.to_path_buf(),
            segment_paths: final_paths,
            archive_comment: archive.archive_comment.clone(),
        });

        if let Some(cb) = options.progress.as_mut() {
            cb(ProgressEvent::Finished);
        }
        Ok(())
    }
}

fn sentinel16(v: u32) -> u16 {
    if v >= 0xFFFF {
        0xFFFF
    } else {
        v as u16
    }
}

fn sentinel32(v: u64) -> u32 {
    if v > u32::MAX as u64 {
        0xFFFF_FFFF
    } else {
        v as u32
    }
}

fn sentinel_count(v: usize) -> u16 {
    if v >= 0xFFFF {
        0xFFFF
    } else {
        v as u16
    }
}

/// Byte-copies an unmodified entry (local header + data + optional
/// descriptor) from the prior archive into the new one, recomputing only
/// its starting disk and local-header offset.
fn copy_through<FS: FileSystem>(
    old_reader: &mut SegmentedReader<'_, FS>,
    writer: &mut SegmentedWriter<'_, FS>,
    stored: &DirectoryEntry,
) -> Result<ResolvedEntry> {
    old_reader.seek(SeekFrom::Start(stored.local_header_offset))?;
    let header = LocalFileHeader::read_from(old_reader)?;
    let descriptor_len = if stored.gp_flag & gp_flag::DATA_DESCRIPTOR != 0 {
        if stored.compressed_size > u32::MAX as u64 || stored.uncompressed_size > u32::MAX as u64 {
            24
        } else {
            16
        }
    } else {
        0
    };
    let span = header.encoded_len() + stored.compressed_size + descriptor_len;

    old_reader.seek(SeekFrom::Start(stored.local_header_offset))?;
    writer.begin_entry(span)?;
    let starting_disk = writer.segment_index();
    let local_header_offset = writer.segment_offset();

    let mut remaining = span;
    let mut buf = [0u8; 64 * 1024];
    while remaining > 0 {
        let chunk = remaining.min(buf.len() as u64) as usize;
        old_reader.read_exact(&mut buf[..chunk])?;
        writer.write_all(&buf[..chunk])?;
        remaining -= chunk as u64;
    }

    let mut directory_entry = stored.clone();
    directory_entry.starting_disk = starting_disk;
    directory_entry.local_header_offset = local_header_offset;

    Ok(ResolvedEntry {
        name: stored.name.clone(),
        comment: stored.comment.clone(),
        compression_method_field: if stored.encryption.is_aes() { METHOD_AES } else { stored.compression.to_zip_method() },
        gp_flag: stored.gp_flag,
        crc32: stored.crc32,
        compressed_size: stored.compressed_size,
        uncompressed_size: stored.uncompressed_size,
        starting_disk,
        local_header_offset,
        external_attrs: stored.external_attrs,
        last_mod_time: stored.last_mod_time,
        last_mod_date: stored.last_mod_date,
        extra: stored.raw_extra.clone(),
        version_needed: header.version_needed,
        directory_entry,
    })
}

fn version_needed_for(compression: CompressionMethod, encryption: EncryptionKind, zip64: bool) -> u16 {
    if encryption.is_aes() {
        51
    } else if zip64 {
        45
    } else if compression == CompressionMethod::Bzip2 {
        46
    } else {
        20
    }
}

/// Compresses, encrypts, and frames a staged entry, buffering its encoded
/// bytes so the total span is known before it is written to the
/// (possibly segmented) output — sidestepping the need to split a
/// still-being-compressed entry mid-write across a segment boundary.
fn recode<FS: FileSystem>(
    writer: &mut SegmentedWriter<'_, FS>,
    entry: &crate::entry::Entry,
    options: &crate::archive::ArchiveOptions,
) -> Result<ResolvedEntry> {
    let modified = entry.timestamps.modified.unwrap_or_else(now_unix);
    let (dos_time, dos_date) = unix_to_dos(modified);

    let mut extra = Vec::new();
    if entry.timestamps.modified.is_some() || entry.timestamps.accessed.is_some() || entry.timestamps.created.is_some() {
        let mtime = unix_to_ntfs_ticks(entry.timestamps.modified.unwrap_or(modified), 0);
        let atime = unix_to_ntfs_ticks(entry.timestamps.accessed.unwrap_or(modified), 0);
        let ctime = unix_to_ntfs_ticks(entry.timestamps.created.unwrap_or(modified), 0);
        extra.extend_from_slice(&encode_ntfs(mtime, atime, ctime));
    }

    let encryption_kind = entry.encryption.as_ref().map(|e| e.kind).unwrap_or(EncryptionKind::None);

    let (cipher_sink, aes_header): (CipherSink<Vec<u8>>, Option<(Vec<u8>, [u8; 2])>) = match &entry.encryption {
        None => (CipherSink::none(Vec::new()), None),
        Some(enc) => match enc.kind {
            EncryptionKind::None => (CipherSink::none(Vec::new()), None),
            EncryptionKind::PkzipWeak => {
                let check = crate::cipher::pkzip_weak::CheckByte::Time(dos_time);
                (CipherSink::pkzip_weak(Vec::new(), &enc.password, check)?, None)
            }
            EncryptionKind::WinzipAes128 | EncryptionKind::WinzipAes256 => {
                let strength = aes_strength_for(enc.kind).expect("AES kind maps to a strength");
                let (sink, salt, pv) = CipherSink::aes(Vec::new(), &enc.password, strength)?;
                (sink, Some((salt, pv)))
            }
        },
    };

    let encoded = encode_entry(&entry.source, cipher_sink, entry.compression, entry.level)?;

    let mut entry_data = Vec::new();
    if let Some((salt, pv)) = &aes_header {
        entry_data.extend_from_slice(salt);
        entry_data.extend_from_slice(pv);
    }
    entry_data.extend_from_slice(&encoded.sink);
    if let Some(auth_code) = encoded.aes_auth_code {
        entry_data.extend_from_slice(&auth_code);
    }

    if encryption_kind.is_aes() {
        let strength = aes_strength_for(encryption_kind).expect("AES kind maps to a strength");
        extra.extend_from_slice(&encode_aes(strength.to_winzip_code() as u8, entry.compression.to_zip_method()));
    }

    let name_decision = encode_name(&entry.name, options.encoding_policy);
    let mut gp = gp_flag::DATA_DESCRIPTOR;
    if name_decision.utf8_flag {
        gp |= gp_flag::UTF8;
    }
    if encryption_kind != EncryptionKind::None {
        gp |= gp_flag::ENCRYPTED;
    }

    let compression_method_field = if encryption_kind.is_aes() {
        METHOD_AES
    } else {
        entry.compression.to_zip_method()
    };

    // AE-2 carries integrity in the trailing HMAC alone; the CRC32 field is
    // always stored as zero so a reader never tries to check it directly.
    let stored_crc32 = if encryption_kind.is_aes() { 0 } else { encoded.crc32 };

    let zip64_entry = entry_data.len() as u64 > u32::MAX as u64 || encoded.uncompressed_size > u32::MAX as u64;
    let version_needed = version_needed_for(entry.compression, encryption_kind, zip64_entry);

    let local_header = LocalFileHeader {
        version_needed,
        gp_flag: gp,
        compression_method: compression_method_field,
        last_mod_time: dos_time,
        last_mod_date: dos_date,
        crc32: 0,
        compressed_size: 0,
        uncompressed_size: 0,
        name: name_decision.bytes.clone(),
        extra: extra.clone(),
    };

    let descriptor = DataDescriptor {
        crc32: stored_crc32,
        compressed_size: entry_data.len() as u64,
        uncompressed_size: encoded.uncompressed_size,
    };

    let mut blob = Vec::new();
    local_header.write_to(&mut blob)?;
    blob.extend_from_slice(&entry_data);
    descriptor.write_to(&mut blob, zip64_entry)?;

    writer.begin_entry(blob.len() as u64)?;
    let starting_disk = writer.segment_index();
    let local_header_offset = writer.segment_offset();
    writer.write_all(&blob)?;

    let external_attrs = entry.external_attrs();

    let directory_entry = DirectoryEntry {
        name: entry.name.clone(),
        comment: entry.comment.clone(),
        compression: entry.compression,
        encryption: encryption_kind,
        gp_flag: gp,
        crc32: stored_crc32,
        compressed_size: entry_data.len() as u64,
        uncompressed_size: encoded.uncompressed_size,
        starting_disk,
        local_header_offset,
        external_attrs,
        last_mod_time: dos_time,
        last_mod_date: dos_date,
        raw_extra: extra.clone(),
    };

    Ok(ResolvedEntry {
        name: entry.name.clone(),
        comment: entry.comment.clone(),
        compression_method_field,
        gp_flag: gp,
        crc32: stored_crc32,
        compressed_size: entry_data.len() as u64,
        uncompressed_size: encoded.uncompressed_size,
        starting_disk,
        local_header_offset,
        external_attrs,
        last_mod_time: dos_time,
        last_mod_date: dos_date,
        extra,
        version_needed,
        directory_entry,
    })
}

fn write_central_header<FS: FileSystem>(
    writer: &mut SegmentedWriter<'_, FS>,
    entry: &ResolvedEntry,
    zip64_policy: Zip64Policy,
    encoding_policy: crate::encoding::AlternateEncodingPolicy,
) -> Result<()> {
    if zip64_policy == Zip64Policy::Never
        && (entry.compressed_size > u32::MAX as u64
            || entry.uncompressed_size > u32::MAX as u64
            || entry.local_header_offset > u32::MAX as u64)
    {
        return Err(ZipError::Zip64Required);
    }

    // Central and local headers must agree on name bytes/UTF-8 flag; since
    // copy-through never re-derives the local header, re-derive the same
    // decision here rather than trusting `entry.gp_flag`'s bit 11, which may
    // have been set under a different archive's encoding policy.
    let name_decision = encode_name(&entry.name, encoding_policy);
    let gp_flag = (entry.gp_flag & !gp_flag::UTF8)
        | if name_decision.utf8_flag { gp_flag::UTF8 } else { 0 };

    let header = CentralDirectoryHeader {
        version_made_by: 0x0314, // host = 3 (Unix), spec version 20
        version_needed: entry.version_needed,
        gp_flag,
        compression_method: entry.compression_method_field,
        last_mod_time: entry.last_mod_time,
        last_mod_date: entry.last_mod_date,
        crc32: entry.crc32,
        compressed_size: entry.compressed_size,
        uncompressed_size: entry.uncompressed_size,
        disk_number_start: entry.starting_disk,
        internal_attrs: 0,
        external_attrs: entry.external_attrs,
        local_header_offset: entry.local_header_offset,
        name: name_decision.bytes,
        extra: entry.extra.clone(),
        comment: entry.comment.clone(),
    };
    header.write_to(writer)?;
    Ok(())
}
