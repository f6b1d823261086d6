mod common;

use common::*;
use containerfs::{Config, ErrorKind, FsError, ZipReader};

#[test]
fn stored_entries_are_byte_identical() {
    let archive = ZipBuilder::new()
        .file("hello.txt", b"Hello, World!")
        .finish();
    let reader = ZipReader::new("hello.zip", archive).unwrap();
    assert_eq!(reader.len(), 1);
    assert_eq!(
        listing(reader),
        [("hello.txt".to_owned(), Some(b"Hello, World!".to_vec()))]
    );
}

#[cfg(feature = "_deflate-any")]
#[test]
fn deflated_entries_pass_their_checksum() {
    let text = "the quick brown fox jumps over the lazy dog\n".repeat(100);
    let archive = ZipBuilder::new().deflated("fox.txt", text.as_bytes()).finish();
    let entry = ZipReader::new("fox.zip", archive)
        .unwrap()
        .next()
        .unwrap()
        .unwrap();
    assert_eq!(entry.content.unwrap(), text.as_bytes());
}

#[test]
fn implied_directories_come_first_and_once() {
    let archive = ZipBuilder::new()
        .file("a/b.txt", b"b")
        .file("a/c.txt", b"c")
        .directory("a/")
        .file("d/e/f.txt", b"f")
        .finish();
    let entries: Vec<_> = ZipReader::new("tree.zip", archive)
        .unwrap()
        .map(Result::unwrap)
        .collect();
    let paths: Vec<String> = entries.iter().map(|e| e.path.to_string()).collect();
    assert_eq!(paths, ["a", "a/b.txt", "a/c.txt", "d", "d/e", "d/e/f.txt"]);
    assert!(entries[0].is_dir());
    assert_eq!(entries[0].timestamp.unwrap().unix_timestamp(), DOS_UNIX);
}

#[test]
fn duplicate_files_keep_the_first() {
    let archive = ZipBuilder::new()
        .file("same.txt", b"first")
        .file("same.txt", b"second")
        .finish();
    assert_eq!(
        listing(ZipReader::new("dup.zip", archive).unwrap()),
        [("same.txt".to_owned(), Some(b"first".to_vec()))]
    );
}

#[test]
fn dos_timestamps() {
    let archive = ZipBuilder::new().file("t.txt", b"t").finish();
    let entry = ZipReader::new("t.zip", archive)
        .unwrap()
        .next()
        .unwrap()
        .unwrap();
    assert_eq!(entry.timestamp.unwrap().unix_timestamp(), DOS_UNIX);
}

#[test]
fn extended_timestamp_wins_over_dos_time() {
    // flags: modification time present; 1714635025 little-endian
    let extra = [0x55, 0x54, 5, 0, 1, 0x11, 0x41, 0x33, 0x66];
    let archive = ZipBuilder::new()
        .file("t.txt", b"t")
        .with_extra(&extra)
        .finish();
    let entry = ZipReader::new("t.zip", archive)
        .unwrap()
        .next()
        .unwrap()
        .unwrap();
    assert_eq!(entry.timestamp.unwrap().unix_timestamp(), RECORDED_UNIX);
}

#[test]
fn missing_end_record_is_structural() {
    let err = ZipReader::new("garbage.zip", vec![0u8; 100]).unwrap_err();
    assert!(matches!(err, FsError::NoCentralDirectory { .. }));
    assert_eq!(err.kind(), ErrorKind::Structural);
}

#[test]
fn unsupported_method_skips_one_entry() {
    let archive = ZipBuilder::new()
        .entry(b"odd.bin", b"????", Method::Raw(99), false)
        .file("fine.txt", b"fine")
        .finish();
    let results: Vec<_> = ZipReader::new("mixed.zip", archive).unwrap().collect();
    assert_eq!(results.len(), 2);
    assert!(matches!(
        results[0],
        Err(FsError::UnsupportedCompressionMethod { method: 99, .. })
    ));
    assert_eq!(results[1].as_ref().unwrap().path.to_string(), "fine.txt");
}

#[test]
fn encrypted_entries_are_unsupported() {
    let archive = ZipBuilder::new()
        .file("secret.txt", b"xxxx")
        .with_flags(1)
        .finish();
    let result = ZipReader::new("secret.zip", archive).unwrap().next().unwrap();
    assert!(matches!(result, Err(FsError::Unsupported { .. })));
}

#[test]
fn checksum_mismatch_is_an_integrity_error() {
    let archive = ZipBuilder::new()
        .file("bad.txt", b"payload")
        .with_crc(0xdeadbeef)
        .file("good.txt", b"payload")
        .finish();

    let results: Vec<_> = ZipReader::new("crc.zip", archive.clone()).unwrap().collect();
    assert_eq!(results.len(), 2);
    let err = results[0].as_ref().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Integrity);
    assert!(!err.is_fatal());
    assert!(results[1].is_ok());

    let strict: Vec<_> =
        ZipReader::with_config("crc.zip", archive.clone(), Config::default().strict(true))
            .unwrap()
            .collect();
    assert_eq!(strict.len(), 1);

    let unchecked = Config::default().verify_checksums(false);
    let results: Vec<_> = ZipReader::with_config("crc.zip", archive, unchecked)
        .unwrap()
        .collect();
    assert!(results.iter().all(Result::is_ok));
}

#[test]
fn prepended_data_is_skipped() {
    let archive = ZipBuilder::new()
        .prefix(&[0, 1, 2, 3])
        .file("inner.txt", b"inside")
        .comment(b"made by hand")
        .finish();
    let reader = ZipReader::new("sfx.exe", archive).unwrap();
    assert_eq!(reader.offset(), 4);
    assert_eq!(reader.comment(), b"made by hand");
    assert_eq!(
        listing(reader),
        [("inner.txt".to_owned(), Some(b"inside".to_vec()))]
    );
}

#[test]
fn data_descriptors() {
    let archive = ZipBuilder::new()
        .file("streamed.txt", b"streamed content")
        .with_data_descriptor()
        .file("after.txt", b"after")
        .finish();
    assert_eq!(
        listing(ZipReader::new("stream.zip", archive).unwrap()),
        [
            ("streamed.txt".to_owned(), Some(b"streamed content".to_vec())),
            ("after.txt".to_owned(), Some(b"after".to_vec())),
        ]
    );
}

#[test]
fn sizes_found_only_in_the_data_descriptor() {
    let archive = ZipBuilder::new()
        .file("streamed.txt", b"streamed content")
        .with_descriptor_only()
        .file("after.txt", b"after")
        .finish();
    assert_eq!(
        listing(ZipReader::new("stream.zip", archive).unwrap()),
        [
            ("streamed.txt".to_owned(), Some(b"streamed content".to_vec())),
            ("after.txt".to_owned(), Some(b"after".to_vec())),
        ]
    );
}

#[test]
fn zip64_records_and_extra_fields() {
    let archive = ZipBuilder::new()
        .file("big.txt", b"not really big")
        .with_zip64()
        .file("small.txt", b"small")
        .zip64_end()
        .finish();
    assert_eq!(
        listing(ZipReader::new("zip64.zip", archive).unwrap()),
        [
            ("big.txt".to_owned(), Some(b"not really big".to_vec())),
            ("small.txt".to_owned(), Some(b"small".to_vec())),
        ]
    );
}

#[test]
fn zip64_data_descriptors_have_wide_sizes() {
    let archive = ZipBuilder::new()
        .prefix(b"stub")
        .file("wide.txt", b"eight-byte sizes")
        .with_zip64()
        .with_data_descriptor()
        .zip64_end()
        .finish();
    let reader = ZipReader::new("wide.zip", archive).unwrap();
    assert_eq!(reader.offset(), 4);
    assert_eq!(
        listing(reader),
        [("wide.txt".to_owned(), Some(b"eight-byte sizes".to_vec()))]
    );
}

#[test]
fn end_record_inside_comment_is_not_used() {
    // An empty end record hidden in the comment, then bytes the comment does not announce.
    let mut comment = vec![0x50, 0x4b, 0x05, 0x06];
    comment.extend_from_slice(&[0; 18]);
    comment.extend_from_slice(b"zz");
    let archive = ZipBuilder::new()
        .file("only.txt", b"only")
        .comment(&comment)
        .trailing(&[0, 0])
        .finish();
    let reader = ZipReader::new("fake.zip", archive).unwrap();
    assert_eq!(reader.len(), 1);
    assert_eq!(reader.comment(), comment.as_slice());
    assert_eq!(
        listing(reader),
        [("only.txt".to_owned(), Some(b"only".to_vec()))]
    );
}

#[test]
fn entries_below_a_file_are_refused() {
    let archive = ZipBuilder::new()
        .file("a", b"plain file")
        .file("a/b.txt", b"b")
        .file("c.txt", b"c")
        .finish();
    let results: Vec<_> = ZipReader::new("clash.zip", archive).unwrap().collect();
    assert_eq!(results.len(), 3);
    let first = results[0].as_ref().unwrap();
    assert!(!first.is_dir());
    let err = results[1].as_ref().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);
    assert!(!err.is_fatal());
    assert_eq!(results[2].as_ref().unwrap().path.to_string(), "c.txt");
}

#[test]
fn parent_segments_are_rejected() {
    let archive = ZipBuilder::new()
        .file("../evil.txt", b"evil")
        .file("ok.txt", b"ok")
        .finish();
    let results: Vec<_> = ZipReader::new("evil.zip", archive).unwrap().collect();
    assert!(matches!(results[0], Err(FsError::UnsafePath { .. })));
    assert_eq!(results[1].as_ref().unwrap().path.to_string(), "ok.txt");
}

#[test]
fn absolute_and_backslash_names_are_normalized() {
    let archive = ZipBuilder::new()
        .file("/_/test.txt", b"1")
        .file("win\\dows.txt", b"2")
        .finish();
    let paths: Vec<String> = listing(ZipReader::new("names.zip", archive).unwrap())
        .into_iter()
        .map(|(path, _)| path)
        .collect();
    assert_eq!(paths, ["_", "_/test.txt", "win", "win/dows.txt"]);
}

#[test]
fn cp437_names() {
    // 0x81 is u-umlaut in code page 437
    let archive = ZipBuilder::new()
        .entry(b"gr\x81n.txt", b"green", Method::Stored, false)
        .finish();
    let entry = ZipReader::new("cp437.zip", archive)
        .unwrap()
        .next()
        .unwrap()
        .unwrap();
    assert_eq!(entry.path.to_string(), "gr\u{fc}n.txt");
}

#[test]
fn reading_twice_gives_the_same_entries() {
    let archive = ZipBuilder::new()
        .file("x/y.txt", b"y")
        .file("z.txt", b"z")
        .finish();
    let first = listing(ZipReader::new("a", archive.as_slice()).unwrap());
    let second = listing(ZipReader::new("b", archive.as_slice()).unwrap());
    assert_eq!(first, second);
}

#[test]
fn empty_archive() {
    let reader = ZipReader::new("empty.zip", ZipBuilder::new().finish()).unwrap();
    assert!(reader.is_empty());
    assert_eq!(reader.count(), 0);
}
