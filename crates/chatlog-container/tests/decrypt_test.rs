//! Integration tests for file and directory decryption.
//!
//! Fixture containers are built with `encrypt_page` and cheap KDF rounds, so
//! every test exercises the same verify/decrypt path a real archive does.

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use chatlog_container::{Decryptor, FileOutcome, ProgressFn};
use chatlog_core::config::DecryptConfig;
use chatlog_core::ChatlogError;
use chatlog_crypto::{
    derive_keys_with, encrypt_page, KdfParams, Secret, PAGE_SIZE, PLAINTEXT_HEADER, RESERVE_SIZE,
};
use tempfile::TempDir;

const SECRET: [u8; 32] = [0x5c; 32];
const BODY_END: usize = PAGE_SIZE - RESERVE_SIZE;

fn fast_config() -> DecryptConfig {
    DecryptConfig {
        kdf_iterations: 16,
        ..Default::default()
    }
}

fn decryptor() -> Decryptor {
    Decryptor::with_config(Secret::from_bytes(SECRET), &fast_config())
}

fn plain_page(seed: u8) -> Vec<u8> {
    (0..PAGE_SIZE)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

/// Encrypt `pages` into a container. Empty entries become zero pages.
fn build_container(secret: [u8; 32], salt: [u8; 16], pages: &[Vec<u8>]) -> Vec<u8> {
    let params = KdfParams::from(&fast_config());
    let keys = derive_keys_with(&Secret::from_bytes(secret), &salt, &params).unwrap();

    let mut out = Vec::with_capacity(pages.len() * PAGE_SIZE);
    for (index, page) in pages.iter().enumerate() {
        if page.is_empty() {
            out.extend_from_slice(&[0u8; PAGE_SIZE]);
        } else {
            let iv: [u8; 16] = rand::random();
            out.extend_from_slice(&encrypt_page(&keys, index as u32, page, &iv).unwrap());
        }
    }
    out
}

fn write_file(path: &Path, bytes: &[u8]) -> PathBuf {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, bytes).unwrap();
    path.to_path_buf()
}

fn make_plain_db(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let conn = rusqlite::Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE contact (username TEXT, nick_name TEXT, remark TEXT, alias TEXT);
         INSERT INTO contact VALUES ('wxid_a', 'Alice', '', '');",
    )
    .unwrap();
}

#[test]
fn decrypts_every_page() {
    let tmp = TempDir::new().unwrap();
    let plain = [plain_page(1), plain_page(2), Vec::new(), plain_page(3)];
    let container = build_container(SECRET, [9; 16], &plain);
    let src = write_file(&tmp.path().join("message_0.db"), &container);
    let dst = tmp.path().join("out.db");

    let outcome = decryptor().decrypt_file(&src, &dst).unwrap();
    assert_eq!(
        outcome,
        FileOutcome::Decrypted {
            pages: 4,
            degraded_pages: 0
        }
    );

    let out = std::fs::read(&dst).unwrap();
    assert_eq!(out.len(), 4 * PAGE_SIZE);

    // page 0: header replaces the salt, body decrypted, trailer kept
    assert_eq!(&out[..16], PLAINTEXT_HEADER);
    assert_eq!(&out[16..BODY_END], &plain[0][16..BODY_END]);
    assert_eq!(&out[BODY_END..PAGE_SIZE], &container[BODY_END..PAGE_SIZE]);

    let page1 = &out[PAGE_SIZE..2 * PAGE_SIZE];
    assert_eq!(&page1[..BODY_END], &plain[1][..BODY_END]);

    let page2 = &out[2 * PAGE_SIZE..3 * PAGE_SIZE];
    assert!(page2.iter().all(|&b| b == 0), "zero page passes through");

    let page3 = &out[3 * PAGE_SIZE..];
    assert_eq!(&page3[..BODY_END], &plain[3][..BODY_END]);
}

#[test]
fn corrupt_page_is_written_through() {
    let tmp = TempDir::new().unwrap();
    let plain = [plain_page(1), plain_page(2), plain_page(3)];
    let mut container = build_container(SECRET, [4; 16], &plain);
    // flip a byte in page 1's tag
    container[2 * PAGE_SIZE - 10] ^= 0x55;
    let src = write_file(&tmp.path().join("message_1.db"), &container);
    let dst = tmp.path().join("out.db");

    let outcome = decryptor().decrypt_file(&src, &dst).unwrap();
    assert_eq!(
        outcome,
        FileOutcome::Decrypted {
            pages: 3,
            degraded_pages: 1
        }
    );

    let out = std::fs::read(&dst).unwrap();
    assert_eq!(&out[PAGE_SIZE..2 * PAGE_SIZE], &container[PAGE_SIZE..2 * PAGE_SIZE]);
    assert_eq!(&out[2 * PAGE_SIZE..3 * PAGE_SIZE - RESERVE_SIZE], &plain[2][..BODY_END]);
}

#[test]
fn short_final_page_is_padded() {
    let tmp = TempDir::new().unwrap();
    let plain = [plain_page(1), plain_page(2)];
    let mut container = build_container(SECRET, [4; 16], &plain);
    container.truncate(PAGE_SIZE + 100);
    let src = write_file(&tmp.path().join("message_1.db"), &container);
    let dst = tmp.path().join("out.db");

    let outcome = decryptor().decrypt_file(&src, &dst).unwrap();
    assert_eq!(
        outcome,
        FileOutcome::Decrypted {
            pages: 2,
            degraded_pages: 1
        }
    );
    assert_eq!(std::fs::metadata(&dst).unwrap().len(), 2 * PAGE_SIZE as u64);
}

#[test]
fn wrong_key_rejects_file() {
    let tmp = TempDir::new().unwrap();
    let container = build_container([0x11; 32], [1; 16], &[plain_page(1), plain_page(2)]);
    let src = write_file(&tmp.path().join("message_0.db"), &container);
    let dst = tmp.path().join("out.db");

    let err = decryptor().decrypt_file(&src, &dst).unwrap_err();
    assert!(matches!(err, ChatlogError::KeyInvalid { ref path } if path == &src));
    assert!(!dst.exists());
    assert!(!tmp.path().join("out.db.tmp").exists());
}

#[test]
fn plaintext_file_is_copied_through() {
    let tmp = TempDir::new().unwrap();
    let src = tmp.path().join("contact.db");
    make_plain_db(&src);
    let dst = tmp.path().join("copy.db");

    let outcome = decryptor().decrypt_file(&src, &dst).unwrap();
    let original = std::fs::read(&src).unwrap();
    assert_eq!(
        outcome,
        FileOutcome::Copied {
            bytes: original.len() as u64
        }
    );
    assert_eq!(std::fs::read(&dst).unwrap(), original);

    // running again over the copy is a no-op
    let again = tmp.path().join("again.db");
    decryptor().decrypt_file(&dst, &again).unwrap();
    assert_eq!(std::fs::read(&again).unwrap(), original);
}

// ── directory mode ───────────────────────────────────────────────────────────

fn build_archive(root: &Path) {
    let storage = root.join("db_storage");
    write_file(
        &storage.join("message/message_0.db"),
        &build_container(SECRET, [1; 16], &[plain_page(1), plain_page(2)]),
    );
    write_file(
        &storage.join("message/message_1.db"),
        &build_container(SECRET, [2; 16], &[plain_page(3)]),
    );
    // foreign key: reported as a failure, batch continues
    write_file(
        &storage.join("message/message_2.db"),
        &build_container([0x77; 32], [3; 16], &[plain_page(4)]),
    );
    // not a shard
    write_file(&storage.join("message/message_fts.db"), b"ignored");
    write_file(&storage.join("message/message_0.db-wal"), b"ignored");
    make_plain_db(&storage.join("contact/contact.db"));
}

#[test]
fn directory_decrypts_shards_and_contacts() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("account");
    let output = tmp.path().join("decrypted");
    build_archive(&input);

    let report = decryptor().decrypt_directory(&input, &output).unwrap();

    assert_eq!(report.total, 4);
    assert_eq!(report.succeeded, 3);
    assert!(!report.cancelled);
    assert_eq!(report.failures.len(), 1);
    assert!(report.failures[0].path.ends_with("message_2.db"));
    assert!(matches!(
        report.failures[0].error,
        ChatlogError::KeyInvalid { .. }
    ));

    assert!(output.join("message_0.db").is_file());
    assert!(output.join("message_1.db").is_file());
    assert!(output.join("contact.db").is_file());
    assert!(!output.join("message_2.db").exists());
    assert!(!output.join("message_fts.db").exists());

    let shard = std::fs::read(output.join("message_0.db")).unwrap();
    assert_eq!(&shard[..16], PLAINTEXT_HEADER);
}

#[test]
fn directory_accepts_storage_dir_directly() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("account");
    let output = tmp.path().join("decrypted");
    build_archive(&input);

    let report = decryptor()
        .decrypt_directory(&input.join("db_storage"), &output)
        .unwrap();
    assert_eq!(report.total, 4);
    assert_eq!(report.succeeded, 3);
}

#[test]
fn already_decrypted_directory_copies_everything() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("plain");
    let output = tmp.path().join("out");
    make_plain_db(&input.join("message/message_0.db"));
    make_plain_db(&input.join("message/message_1.db"));
    make_plain_db(&input.join("contact/contact.db"));

    let report = decryptor().decrypt_directory(&input, &output).unwrap();
    assert_eq!(report.total, 3);
    assert_eq!(report.succeeded, 3);

    for (src, dst) in [
        ("message/message_0.db", "message_0.db"),
        ("message/message_1.db", "message_1.db"),
        ("contact/contact.db", "contact.db"),
    ] {
        assert_eq!(
            std::fs::read(input.join(src)).unwrap(),
            std::fs::read(output.join(dst)).unwrap()
        );
    }
}

#[test]
fn empty_directory_reports_nothing() {
    let tmp = TempDir::new().unwrap();
    let report = decryptor()
        .decrypt_directory(tmp.path(), &tmp.path().join("out"))
        .unwrap();
    assert_eq!(report.total, 0);
    assert_eq!(report.succeeded, 0);
}

#[test]
fn progress_reports_each_file() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("account");
    build_archive(&input);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let progress: ProgressFn = Box::new(move |done, total, name| {
        sink.lock().unwrap().push((done, total, name.to_string()));
    });

    decryptor()
        .decrypt_directory_with(&input, &tmp.path().join("out"), Some(&progress), None)
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 4);
    assert_eq!(seen[0], (1, 4, "message_0.db".to_string()));
    assert_eq!(seen[3], (4, 4, "contact.db".to_string()));
}

#[test]
fn cancel_stops_before_next_file() {
    let tmp = TempDir::new().unwrap();
    let input = tmp.path().join("account");
    let output = tmp.path().join("out");
    build_archive(&input);

    let cancel = AtomicBool::new(true);
    let report = decryptor()
        .decrypt_directory_with(&input, &output, None, Some(&cancel))
        .unwrap();

    assert!(report.cancelled);
    assert_eq!(report.succeeded, 0);
    assert!(!output.join("message_0.db").exists());
}
