//! End-to-end pipeline scenarios: repository-shaped writes and reads with
//! hashing, compression, and encryption composed on storage handles.

use checksums::DigestAlgorithm;
use compress::{GzipCompress, GzipDecompress};
use crypto::{CipherDecrypt, CipherEncrypt, HashFilter, HASH_FILTER_TYPE};
use storage::{posix, ReadOptions, StorageOptions, WriteOptions};
use types::Buffer;
use vault_io::{Filter, SizeFilter, SIZE_FILTER_TYPE};

const PASSPHRASE: &[u8] = b"0123456789abcdef";

fn cluster_page(seed: u8) -> Vec<u8> {
    (0..8192u32).map(|offset| (offset as u8).wrapping_mul(seed).wrapping_add(seed)).collect()
}

#[test]
fn backup_write_then_restore_read() {
    let base = tempfile::tempdir().expect("tempdir");
    let storage = posix::storage(
        base.path().to_string_lossy().into_owned(),
        StorageOptions::new().write(true),
    )
    .expect("storage");

    let mut raw = Vec::new();
    for seed in 1..=5 {
        raw.extend_from_slice(&cluster_page(seed));
    }

    // Backup direction: observe the raw stream, then compress, then encrypt
    let mut write = storage
        .new_write("archive/000000010000000000000001.gz.enc", WriteOptions::new())
        .expect("new write");

    write
        .filter_group_mut()
        .push(Filter::sink(HashFilter::new(DigestAlgorithm::Sha256)))
        .expect("push hash");
    write
        .filter_group_mut()
        .push(Filter::sink(SizeFilter::new()))
        .expect("push size");
    write
        .filter_group_mut()
        .push(Filter::stream(GzipCompress::new(6, false).expect("compress")))
        .expect("push compress");
    write
        .filter_group_mut()
        .push(Filter::stream(CipherEncrypt::new(PASSPHRASE, None)))
        .expect("push cipher");

    write.open().expect("open");

    for chunk in raw.chunks(3000) {
        write.write(&Buffer::from_slice(chunk)).expect("write");
    }

    write.close().expect("close");

    let raw_hash = checksums::digest_hex(DigestAlgorithm::Sha256, &raw);
    assert_eq!(
        write
            .result(HASH_FILTER_TYPE)
            .expect("hash result")
            .as_str()
            .expect("hex"),
        raw_hash
    );
    assert_eq!(
        write
            .result(SIZE_FILTER_TYPE)
            .expect("size result")
            .as_uint()
            .expect("count"),
        raw.len() as u64
    );

    // What landed on disk is neither the raw stream nor plain gzip
    let stored = std::fs::read(
        base.path().join("archive/000000010000000000000001.gz.enc"),
    )
    .expect("stored file");
    assert!(stored.starts_with(b"Salted__"));
    assert!(stored.len() < raw.len(), "pages should compress");

    // Restore direction: decrypt, decompress, observe the output
    let mut read = storage
        .new_read("archive/000000010000000000000001.gz.enc", ReadOptions::new())
        .expect("new read");

    read.filter_group_mut()
        .push(Filter::stream(CipherDecrypt::new(PASSPHRASE)))
        .expect("push decipher");
    read.filter_group_mut()
        .push(Filter::stream(GzipDecompress::new(false)))
        .expect("push decompress");
    read.filter_group_mut()
        .push(Filter::sink(HashFilter::new(DigestAlgorithm::Sha256)))
        .expect("push hash");

    assert!(read.open().expect("open"));

    let mut restored = Vec::new();
    let mut chunk = Buffer::new(4096);

    while !read.eof() {
        chunk.clear_used();
        read.read(&mut chunk).expect("read");
        restored.extend_from_slice(chunk.bytes());
    }

    read.close().expect("close");

    assert_eq!(restored, raw);
    assert_eq!(
        read.result(HASH_FILTER_TYPE)
            .expect("hash result")
            .as_str()
            .expect("hex"),
        raw_hash
    );
}

#[test]
fn trailing_size_filter_reports_stored_bytes() {
    let base = tempfile::tempdir().expect("tempdir");
    let storage = posix::storage(
        base.path().to_string_lossy().into_owned(),
        StorageOptions::new().write(true),
    )
    .expect("storage");

    let raw = b"compressible content ".repeat(4000);

    let mut write = storage.new_write("sized.gz", WriteOptions::new()).expect("new write");
    write
        .filter_group_mut()
        .push(Filter::stream(GzipCompress::new(9, false).expect("compress")))
        .expect("push compress");
    // Trailing observer sees the stored (compressed) byte count
    write
        .filter_group_mut()
        .push(Filter::sink(SizeFilter::new()))
        .expect("push size");

    write.open().expect("open");
    write.write(&Buffer::from_slice(&raw)).expect("write");
    write.close().expect("close");

    let stored_size = write
        .result(SIZE_FILTER_TYPE)
        .expect("size result")
        .as_uint()
        .expect("count");

    let on_disk = std::fs::metadata(base.path().join("sized.gz")).expect("metadata").len();
    assert_eq!(stored_size, on_disk);
    assert!(stored_size < raw.len() as u64);
}
