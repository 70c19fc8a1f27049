use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;
use std::sync::Arc;

use torrentzip::zip::{ArchiveVerifier, CompressedData, EndOfCentralDirectory, codec};
use torrentzip::{ArchiveAssembler, LocalFileReader, walk};

fn sample_entries() -> Vec<(&'static str, Vec<u8>)> {
    let mut noise = Vec::with_capacity(50_000);
    let mut state: u32 = 0x1234_5678;
    while noise.len() < 50_000 {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        noise.push((state >> 24) as u8);
    }

    vec![
        ("a.txt", b"hello".to_vec()),
        ("B/empty.dat", Vec::new()),
        ("b/text.txt", b"lorem ipsum dolor sit amet ".repeat(500)),
        ("noise.bin", noise),
    ]
}

fn build(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
    let mut zip = ArchiveAssembler::new();
    for (name, content) in entries {
        zip.add_entry(name, content).unwrap();
    }
    zip.finalize()
}

fn write_temp(bytes: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn standard_reader_recovers_every_entry() {
    let entries = sample_entries();
    let bytes = build(&entries);

    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
    assert_eq!(archive.len(), entries.len());
    assert!(archive.comment().starts_with(b"TORRENTZIPPED-"));
    assert_eq!(archive.comment().len(), 22);

    for (i, (name, content)) in entries.iter().enumerate() {
        let mut file = archive.by_index(i).unwrap();
        assert_eq!(file.name(), *name);
        assert_eq!(file.compression(), zip::CompressionMethod::Deflated);
        assert_eq!(file.crc32(), codec::crc32(content));
        assert_eq!(file.size(), content.len() as u64);

        let mut out = Vec::new();
        file.read_to_end(&mut out).unwrap();
        assert_eq!(&out, content);
    }
}

#[test]
fn comment_is_crc_of_emitted_directory() {
    let bytes = build(&sample_entries());

    let eocd_offset = bytes.len() - 44;
    let eocd = EndOfCentralDirectory::from_bytes(&bytes[eocd_offset..]).unwrap();
    let start = eocd.cd_offset as usize;
    let end = start + eocd.cd_size as usize;
    assert_eq!(end, eocd_offset);

    let expected = format!("TORRENTZIPPED-{:08X}", codec::crc32(&bytes[start..end]));
    assert_eq!(eocd.comment, expected.into_bytes());
}

#[tokio::test]
async fn verifier_accepts_assembled_archive() {
    let entries = sample_entries();
    let file = write_temp(&build(&entries));

    let reader = Arc::new(LocalFileReader::new(file.path()).unwrap());
    let report = ArchiveVerifier::new(reader).verify().await.unwrap();

    assert!(report.is_canonical(), "issues: {:?}", report.issues);
    assert_eq!(report.stored_crc, Some(report.computed_crc));
    let names: Vec<_> = report.entries.iter().map(|e| e.file_name.as_str()).collect();
    assert_eq!(names, ["a.txt", "B/empty.dat", "b/text.txt", "noise.bin"]);
}

#[tokio::test]
async fn verifier_accepts_empty_archive() {
    let file = write_temp(&ArchiveAssembler::new().finalize());
    let reader = Arc::new(LocalFileReader::new(file.path()).unwrap());
    let report = ArchiveVerifier::new(reader).verify().await.unwrap();
    assert!(report.is_canonical());
    assert!(report.entries.is_empty());
}

#[tokio::test]
async fn verifier_detects_tampering() {
    let mut bytes = build(&sample_entries());
    let eocd = EndOfCentralDirectory::from_bytes(&bytes[bytes.len() - 44..]).unwrap();

    // Set an external attribute bit on the first central header.
    bytes[eocd.cd_offset as usize + 38] = 0x20;
    let file = write_temp(&bytes);

    let reader = Arc::new(LocalFileReader::new(file.path()).unwrap());
    let report = ArchiveVerifier::new(reader).verify().await.unwrap();

    assert!(!report.is_canonical());
    assert_ne!(report.stored_crc, Some(report.computed_crc));
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].file_name, "a.txt");
}

#[tokio::test]
async fn verifier_checks_local_headers() {
    let mut bytes = build(&sample_entries());

    // Zero the modification time of the first local header only.
    bytes[10..12].copy_from_slice(&[0, 0]);
    let file = write_temp(&bytes);

    let reader = Arc::new(LocalFileReader::new(file.path()).unwrap());
    let report = ArchiveVerifier::new(reader).verify().await.unwrap();

    // The central directory and its comment are untouched.
    assert_eq!(report.stored_crc, Some(report.computed_crc));
    assert!(!report.is_canonical());
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].file_name, "a.txt");
    assert!(report.issues[0].problem.contains("local modification time"));
}

#[tokio::test]
async fn verifier_detects_gap_between_entries() {
    let mut zip = ArchiveAssembler::new();
    zip.add_entry("a", b"one").unwrap();
    zip.add_entry("b", b"two").unwrap();
    let bytes = zip.finalize();

    // Insert a stray byte before the central directory and shift the EOCD
    // offset so the directory still parses.
    let eocd_offset = bytes.len() - 44;
    let mut eocd = EndOfCentralDirectory::from_bytes(&bytes[eocd_offset..]).unwrap();
    let cd_offset = eocd.cd_offset as usize;
    let mut tampered = bytes[..cd_offset].to_vec();
    tampered.push(0);
    tampered.extend_from_slice(&bytes[cd_offset..eocd_offset]);
    eocd.cd_offset += 1;
    tampered.extend_from_slice(&eocd.encode());
    let file = write_temp(&tampered);

    let reader = Arc::new(LocalFileReader::new(file.path()).unwrap());
    let report = ArchiveVerifier::new(reader).verify().await.unwrap();
    assert_eq!(report.stored_crc, Some(report.computed_crc));
    assert!(!report.is_canonical());
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].file_name, "b");
}

#[tokio::test]
async fn verifier_accepts_maximum_entry_count() {
    let payload = CompressedData::new(b"").unwrap();
    let mut zip = ArchiveAssembler::new();
    for i in 0..u16::MAX {
        zip.push_compressed(format!("{i:05}"), payload.clone()).unwrap();
    }
    let bytes = zip.finalize();

    // 0xFFFF entries is a plain value here, not a ZIP64 marker.
    let eocd = EndOfCentralDirectory::from_bytes(&bytes[bytes.len() - 44..]).unwrap();
    assert_eq!(eocd.total_entries, 0xFFFF);
    let file = write_temp(&bytes);

    let reader = Arc::new(LocalFileReader::new(file.path()).unwrap());
    let report = ArchiveVerifier::new(reader).verify().await.unwrap();
    assert!(report.is_canonical(), "first issue: {:?}", report.issues.first());
    assert_eq!(report.entries.len(), 65535);
    assert_eq!(report.entries[65534].file_name, "65534");
}

#[tokio::test]
async fn foreign_archive_is_not_canonical() {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file("a.txt", zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(b"hello").unwrap();
    let bytes = writer.finish().unwrap().into_inner();
    let file = write_temp(&bytes);

    let reader = Arc::new(LocalFileReader::new(file.path()).unwrap());
    let report = ArchiveVerifier::new(reader).verify().await.unwrap();
    assert_eq!(report.stored_crc, None);
    assert!(!report.is_canonical());
}

fn populate(root: &Path, names: &[&str]) {
    for name in names {
        let path = root.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, format!("content of {name}\n").repeat(30)).unwrap();
    }
}

fn archive_dir(root: &Path) -> Vec<u8> {
    let files: Vec<_> = walk::collect_files(root)
        .unwrap()
        .into_iter()
        .map(|f| (f.name, f.path))
        .collect();
    let mut zip = ArchiveAssembler::new();
    zip.add_files(&files).unwrap();
    zip.finalize()
}

#[test]
fn directories_with_same_content_give_same_bytes() {
    let names = ["Readme.md", "src/main.c", "src/Util.h", "docs/a/b/c.txt", "zz"];

    let first = tempfile::tempdir().unwrap();
    populate(first.path(), &names);

    // Same files, created in the opposite order at a later time.
    let second = tempfile::tempdir().unwrap();
    let mut reversed = names;
    reversed.reverse();
    populate(second.path(), &reversed);

    let a = archive_dir(first.path());
    let b = archive_dir(second.path());
    assert_eq!(a, b);

    let archive = zip::ZipArchive::new(Cursor::new(a)).unwrap();
    let listed: Vec<_> = archive.file_names().collect();
    assert_eq!(listed.len(), names.len());
}
