//! End-to-end archive scenarios exercised against the real filesystem,
//! covering the save/read/extract round trip, encryption, segmentation,
//! self-save, and directory recovery.

use std::fs;
use std::io::Read;

use tempfile::tempdir;

use zipkit::{Archive, ArchiveOptions, EncryptionKind, ProgressEvent, SaveOptions, ZipError};

fn read_file(path: &std::path::Path) -> Vec<u8> {
    fs::read(path).unwrap()
}

#[test]
fn single_file_store_produces_a_well_formed_archive() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("one.zip");

    let mut archive = Archive::new();
    archive.options.default_compression = zipkit::CompressionMethod::Store;
    archive.add_bytes("greet.txt", b"hell".to_vec()).unwrap();
    archive.save(&out, SaveOptions::default()).unwrap();

    let bytes = read_file(&out);
    assert_eq!(&bytes[0..4], &[0x50, 0x4B, 0x03, 0x04]);

    let reopened = Archive::open(&out).unwrap();
    assert_eq!(reopened.len(), 1);
    assert!(reopened.find("greet.txt").is_some());
}

#[test]
fn two_files_deflate_aes256_round_trip_and_bad_password() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("secret.zip");

    let a_content = vec![b'A'; 5000];
    let b_content: Vec<u8> = (0..10000u32).map(|i| (i * 2654435761) as u8).collect();

    let mut archive = Archive::new();
    archive.options.default_encryption = EncryptionKind::WinzipAes256;
    archive.options.default_password = Some("Secret!".into());
    archive.add_bytes("a.txt", a_content.clone()).unwrap();
    archive.add_bytes("b.bin", b_content.clone()).unwrap();
    archive.save(&out, SaveOptions::default()).unwrap();

    let reopened = Archive::open(&out).unwrap();

    let mut sink = Vec::new();
    let err = reopened
        .extract_entry_to_writer("a.txt", Some("wrong password"), &mut sink)
        .unwrap_err();
    assert!(matches!(err, ZipError::BadPassword));

    let mut a_out = Vec::new();
    reopened
        .extract_entry_to_writer("a.txt", Some("Secret!"), &mut a_out)
        .unwrap();
    assert_eq!(a_out, a_content);

    let mut b_out = Vec::new();
    reopened
        .extract_entry_to_writer("b.bin", Some("Secret!"), &mut b_out)
        .unwrap();
    assert_eq!(b_out, b_content);
}

#[test]
fn pkzip_weak_round_trip_and_bad_password() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("classic.zip");

    let content = b"a traditionally encrypted entry".to_vec();

    let mut archive = Archive::new();
    archive.options.default_encryption = EncryptionKind::PkzipWeak;
    archive.options.default_password = Some("hunter2".into());
    archive.add_bytes("secret.txt", content.clone()).unwrap();
    archive.save(&out, SaveOptions::default()).unwrap();

    let reopened = Archive::open(&out).unwrap();
    assert!(reopened.check_password("hunter2").unwrap());
    assert!(!reopened.check_password("wrong").unwrap());

    let mut sink = Vec::new();
    let err = reopened
        .extract_entry_to_writer("secret.txt", Some("wrong"), &mut sink)
        .unwrap_err();
    assert!(matches!(err, ZipError::BadPassword));

    let mut out_bytes = Vec::new();
    reopened
        .extract_entry_to_writer("secret.txt", Some("hunter2"), &mut out_bytes)
        .unwrap();
    assert_eq!(out_bytes, content);
}

#[test]
fn segmented_archive_round_trips_byte_identically() {
    let dir = tempdir().unwrap();
    let out = dir.path().join("split.zip");

    let mut archive = Archive::new();
    archive.options.default_compression = zipkit::CompressionMethod::Store;
    archive.options.max_segment_size = 65536;

    let mut contents = Vec::new();
    for i in 0..10u32 {
        // Incompressible: a linear-congruential byte stream, not all zeros.
        let content: Vec<u8> = (0..20000u32).map(|j| ((i + 1) * 2654435761 + j) as u8).collect();
        archive.add_bytes(format!("file{i}.bin"), content.clone()).unwrap();
        contents.push(content);
    }
    archive.save(&out, SaveOptions::default()).unwrap();

    let segment0 = out.with_extension("z01");
    assert!(segment0.is_file());
    let seg0_bytes = read_file(&segment0);
    assert_eq!(&seg0_bytes[0..4], &[0x50, 0x4B, 0x07, 0x08]);

    let mut segment_count = 1; // base.zip itself
    let mut n = 1;
    loop {
        let width = 2;
        let candidate = out.with_extension(format!("z{:0width$}", n, width = width));
        if candidate.is_file() {
            segment_count += 1;
            n += 1;
        } else {
            break;
        }
    }
    assert!(segment_count >= 4, "expected at least 4 segments, found {segment_count}");

    let reopened = Archive::open(&out).unwrap();
    assert_eq!(reopened.len(), 10);
    for (i, expected) in contents.iter().enumerate() {
        let mut out_bytes = Vec::new();
        reopened
            .extract_entry_to_writer(&format!("file{i}.bin"), None, &mut out_bytes)
            .unwrap();
        assert_eq!(&out_bytes, expected);
    }
}

#[test]
fn self_save_adds_one_entry_and_leaves_prior_entries_untouched() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("x.zip");

    let mut archive = Archive::new();
    archive.add_bytes("existing.txt", b"already here".to_vec()).unwrap();
    archive.save(&path, SaveOptions::default()).unwrap();

    let prior_bytes = read_file(&path);

    let mut archive = Archive::open(&path).unwrap();
    archive.add_bytes("new.txt", b"freshly added".to_vec()).unwrap();

    let mut saw_temp_file_during_save = false;
    {
        let dir_path = dir.path();
        let progress = SaveOptions {
            progress: Some(Box::new(|event| {
                if matches!(event, ProgressEvent::SavingBeforeRename) {
                    if let Ok(entries) = fs::read_dir(dir_path) {
                        saw_temp_file_during_save = entries
                            .filter_map(|e| e.ok())
                            .any(|e| e.file_name().to_string_lossy().ends_with(".tmp"));
                    }
                }
            })),
            cancellation: None,
        };
        archive.save(&path, progress).unwrap();
    }
    assert!(saw_temp_file_during_save, "expected a .tmp segment to exist during save");
    assert!(path.is_file());
    assert!(fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .all(|e| !e.file_name().to_string_lossy().ends_with(".tmp")));

    assert_eq!(archive.len(), 2);

    let mut existing_out = Vec::new();
    archive
        .extract_entry_to_writer("existing.txt", None, &mut existing_out)
        .unwrap();
    assert_eq!(existing_out, b"already here");

    // Copy-through means the untouched entry's local file header signature
    // still opens the file at the same leading bytes as the original save.
    let final_bytes = read_file(&path);
    assert_eq!(&final_bytes[..4], &prior_bytes[..4]);
}

#[test]
fn directory_recovery_after_trailing_junk() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("damaged.zip");

    let mut archive = Archive::new();
    archive.add_bytes("a.txt", b"one".to_vec()).unwrap();
    archive.add_bytes("b.txt", b"two".to_vec()).unwrap();
    archive.save(&path, SaveOptions::default()).unwrap();

    {
        use std::io::Write as _;
        let mut f = fs::OpenOptions::new().append(true).open(&path).unwrap();
        let junk = vec![0x55u8; 4096];
        f.write_all(&junk).unwrap();
    }

    let err = Archive::open(&path).unwrap_err();
    assert!(matches!(err, ZipError::NotAZip));

    let mut recovered = Archive::recover(&path).unwrap();
    assert_eq!(recovered.len(), 2);
    assert!(recovered.find("a.txt").is_some());
    assert!(recovered.find("b.txt").is_some());

    let fixed = dir.path().join("fixed.zip");
    recovered.save(&fixed, SaveOptions::default()).unwrap();

    let reread = Archive::open(&fixed).unwrap();
    assert_eq!(reread.len(), 2);
    let mut out = Vec::new();
    reread.extract_entry_to_writer("a.txt", None, &mut out).unwrap();
    assert_eq!(out, b"one");
}

/// Counts how many `base.zNN` sibling segment files currently exist on
/// disk, not counting `base.zip` itself.
fn count_split_segments(base: &std::path::Path) -> usize {
    let mut n = 1;
    loop {
        let candidate = base.with_extension(format!("z{:02}", n));
        if candidate.is_file() {
            n += 1;
        } else {
            break;
        }
    }
    n - 1
}

#[test]
fn update_then_remove_last_entry_does_not_leave_dangling_segments() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("shrink.zip");

    let mut options = ArchiveOptions::default();
    options.default_compression = zipkit::CompressionMethod::Store;
    options.max_segment_size = 65536;

    let mut archive = Archive::new();
    archive.options = options;
    for i in 0..3u32 {
        let content: Vec<u8> = (0..30000u32).map(|j| ((i + 1) * 2654435761 + j) as u8).collect();
        archive.add_bytes(format!("part{i}.bin"), content).unwrap();
    }
    archive.save(&path, SaveOptions::default()).unwrap();
    let segments_before = count_split_segments(&path);
    assert!(segments_before >= 1, "expected the 90KB archive to split across segments");

    let mut archive = Archive::open(&path).unwrap();
    archive.remove_entry("part2.bin").unwrap();
    archive.save(&path, SaveOptions::default()).unwrap();

    let segments_after = count_split_segments(&path);
    assert!(
        segments_after <= segments_before,
        "shrinking an archive should never increase its segment count"
    );
    // No leftover segment beyond the new, smaller set.
    let dangling = path.with_extension(format!("z{:02}", segments_after + 1));
    assert!(!dangling.is_file(), "found a dangling segment: {}", dangling.display());

    let reopened = Archive::open(&path).unwrap();
    assert_eq!(reopened.len(), 2);
    assert!(reopened.find("part2.bin").is_none());
}

#[test]
fn extract_all_recreates_directories_and_files() {
    let dir = tempdir().unwrap();
    let archive_path = dir.path().join("tree.zip");
    let extract_dir = dir.path().join("out");

    let mut archive = Archive::new();
    archive.add_bytes("top.txt", b"top level".to_vec()).unwrap();
    archive.add_bytes("nested/inner.txt", b"inside a directory".to_vec()).unwrap();
    archive.save(&archive_path, SaveOptions::default()).unwrap();

    let reopened = Archive::open(&archive_path).unwrap();
    reopened.extract_all(&extract_dir, None, None).unwrap();

    let mut top = Vec::new();
    fs::File::open(extract_dir.join("top.txt")).unwrap().read_to_end(&mut top).unwrap();
    assert_eq!(top, b"top level");

    let mut nested = Vec::new();
    fs::File::open(extract_dir.join("nested/inner.txt"))
        .unwrap()
        .read_to_end(&mut nested)
        .unwrap();
    assert_eq!(nested, b"inside a directory");
}
