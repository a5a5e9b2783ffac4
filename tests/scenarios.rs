//! End-to-end scenarios against a real temporary directory, covering the
//! literal cases S1-S8 from spec.md §8.

use std::path::{Path, PathBuf};

use digup::config::Config;
use digup::digest::Digest;
use digup::digestfile;
use digup::reconcile::Reconciler;
use digup::record::{DigestIndex, FileInfo, RecordTable, Status};
use digup::review;
use digup::walker::Walker;

fn config_for(root: &Path, digest_file: &str, digest_type: Option<Digest>) -> Config {
    let mut cfg = Config::new(root.join(digest_file), digest_type);
    cfg.root = root.to_path_buf();
    cfg
}

fn scan(cfg: &Config, records: &mut RecordTable, index: DigestIndex) {
    let reconciler = Reconciler::new(cfg, index);
    let mut walker = Walker::new(cfg);
    walker.run(&cfg.root, records, &reconciler).unwrap();
}

/// S1 - empty tree, new SHA-1 file: the emitted digest file is just a
/// header and trailer, and that trailer's CRC verifies.
#[test]
fn s1_empty_tree_new_sha1_file() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config_for(dir.path(), "sha1sum.txt", Some(Digest::Sha1));

    let mut records = RecordTable::new();
    scan(&cfg, &mut records, DigestIndex::new());
    assert!(records.is_empty());

    let bytes = digestfile::serialize("digup", "2026-01-01 00:00:00 UTC", None, &records);
    let text = String::from_utf8(bytes.clone()).unwrap();
    assert!(text.starts_with("# digup last update:"));
    assert!(text.trim_end().ends_with("eof"));

    let mut confirm = || false;
    let parsed = digestfile::parse(&cfg.digest_file, &bytes, None, &mut confirm).unwrap();
    assert!(parsed.records.is_empty());
    assert!(review::is_clean(&parsed.records));
}

/// S2 - touched-only: mtime changes but content is identical.
#[test]
fn s2_touched_only() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("empty.txt"), b"").unwrap();

    let digest = Digest::Sha1.hash(b"");
    let mut records = RecordTable::new();
    records.insert(
        PathBuf::from("empty.txt"),
        FileInfo::unseen(1000, 0, Some(digest.clone()), None),
    );

    let cfg = config_for(dir.path(), "sha1sum.txt", Some(Digest::Sha1));
    scan(&cfg, &mut records, DigestIndex::new());

    let info = records.get(Path::new("empty.txt")).unwrap();
    assert_eq!(info.status, Status::Touched);
    assert_eq!(info.digest, Some(digest));
}

/// S3 - rename: `foo/a` disappears, `bar/a` appears with identical bytes.
#[test]
fn s3_rename() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("bar")).unwrap();
    std::fs::write(dir.path().join("bar/a"), b"content").unwrap();

    let digest = Digest::Sha1.hash(b"content");
    let mut records = RecordTable::new();
    records.insert(PathBuf::from("foo/a"), FileInfo::unseen(0, 7, Some(digest.clone()), None));
    let mut index = DigestIndex::new();
    index.insert(digest.clone(), PathBuf::from("foo/a"));

    let cfg = config_for(dir.path(), "sha1sum.txt", Some(Digest::Sha1));
    scan(&cfg, &mut records, index);

    let new_info = records.get(Path::new("bar/a")).unwrap();
    assert_eq!(new_info.status, Status::Renamed);
    assert_eq!(new_info.oldpath, Some(PathBuf::from("foo/a")));
    assert_eq!(records.get(Path::new("foo/a")).unwrap().status, Status::Oldpath);

    let bytes = digestfile::serialize("digup", "2026-01-01 00:00:00 UTC", None, &records);
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("bar/a"));
    assert!(!text.contains("foo/a"));
    assert!(!review::is_clean(&records));
}

/// S4 - a filename containing a literal newline survives a write/parse
/// round trip via the escape codec.
#[test]
fn s4_escaped_newline_filename() {
    let dir = tempfile::tempdir().unwrap();
    let weird_name = "line1\nline2";
    std::fs::write(dir.path().join(weird_name), b"hi").unwrap();

    let cfg = config_for(dir.path(), "sha1sum.txt", Some(Digest::Sha1));
    let mut records = RecordTable::new();
    scan(&cfg, &mut records, DigestIndex::new());
    assert!(records.contains(Path::new(weird_name)));

    let bytes = digestfile::serialize("digup", "2026-01-01 00:00:00 UTC", None, &records);
    let text = String::from_utf8_lossy(&bytes);
    assert!(text.contains("line1\\nline2"));

    let mut confirm = || false;
    let parsed = digestfile::parse(&cfg.digest_file, &bytes, None, &mut confirm).unwrap();
    assert!(parsed.records.contains(Path::new(weird_name)));
}

/// S5 - flipping a byte inside a recorded hex digest is caught by the
/// trailer CRC and aborts in batch mode.
#[test]
fn s5_crc_tamper_is_rejected() {
    let mut records = RecordTable::new();
    records.insert(
        PathBuf::from("a.txt"),
        FileInfo {
            status: Status::New,
            mtime: 0,
            size: 5,
            digest: Some(Digest::Sha1.hash(b"hello")),
            symlink_target: None,
            oldpath: None,
            error: None,
        },
    );
    let bytes = digestfile::serialize("digup", "2026-01-01 00:00:00 UTC", None, &records);
    let original_hex = Digest::Sha1.hash(b"hello").to_hex();
    let tampered_hex = format!("{}f", &original_hex[..original_hex.len() - 1]);
    let text = String::from_utf8(bytes).unwrap();
    assert_ne!(original_hex, tampered_hex);
    let tampered = text.replacen(&original_hex, &tampered_hex, 1).into_bytes();

    let mut confirm_abort = || false;
    let err = digestfile::parse(Path::new("sha1sum.txt"), &tampered, None, &mut confirm_abort).unwrap_err();
    assert!(matches!(err, digup::error::DigupError::CrcMismatch { .. }));
}

/// S6 - full-check overrides the mtime/size fast path: a corrupted digest
/// with matching metadata is a false negative (SEEN) unless `--check` forces
/// a full recompute (CHANGED).
#[test]
fn s6_full_check_overrides_mtime() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.txt");
    std::fs::write(&path, b"actual content").unwrap();
    let meta = std::fs::metadata(&path).unwrap();
    use std::os::unix::fs::MetadataExt;

    let stale_digest = Digest::Sha1.hash(b"stale content that does not match the file");

    let mut records_without_check = RecordTable::new();
    records_without_check.insert(
        PathBuf::from("a.txt"),
        FileInfo::unseen(meta.mtime(), meta.size() as i64, Some(stale_digest.clone()), None),
    );
    let cfg = config_for(dir.path(), "sha1sum.txt", Some(Digest::Sha1));
    scan(&cfg, &mut records_without_check, DigestIndex::new());
    assert_eq!(
        records_without_check.get(Path::new("a.txt")).unwrap().status,
        Status::Seen,
        "documented false negative: mtime/size agree so the stale digest is never checked"
    );

    let mut records_with_check = RecordTable::new();
    records_with_check.insert(
        PathBuf::from("a.txt"),
        FileInfo::unseen(meta.mtime(), meta.size() as i64, Some(stale_digest), None),
    );
    let mut cfg_check = cfg;
    cfg_check.full_check = true;
    scan(&cfg_check, &mut records_with_check, DigestIndex::new());
    assert_eq!(records_with_check.get(Path::new("a.txt")).unwrap().status, Status::Changed);
}

/// S7 - a cyclic symlink under `--links` does not hang the walker.
#[test]
fn s7_symlink_loop_terminates() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("sub")).unwrap();
    std::os::unix::fs::symlink(dir.path(), dir.path().join("sub/loop")).unwrap();

    let mut cfg = config_for(dir.path(), "sha1sum.txt", Some(Digest::Sha1));
    cfg.follow_symlinks = true;
    let mut records = RecordTable::new();
    scan(&cfg, &mut records, DigestIndex::new());

    // the cycle is detected and pruned rather than walked forever; the only
    // real content under the tree is nothing at all.
    assert!(records.is_empty());
}

/// S8 - batch exit code is clean iff every record is SEEN or TOUCHED.
#[test]
fn s8_batch_exit_code_clean_iff_seen_or_touched() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
    let meta = std::fs::metadata(dir.path().join("a.txt")).unwrap();
    use std::os::unix::fs::MetadataExt;

    let mut records = RecordTable::new();
    records.insert(
        PathBuf::from("a.txt"),
        FileInfo::unseen(meta.mtime(), meta.size() as i64, Some(Digest::Sha1.hash(b"hello")), None),
    );
    let cfg = config_for(dir.path(), "sha1sum.txt", Some(Digest::Sha1));
    scan(&cfg, &mut records, DigestIndex::new());
    assert!(review::is_clean(&records));

    std::fs::write(dir.path().join("b.txt"), b"new file").unwrap();
    scan(&cfg, &mut records, DigestIndex::new());
    assert!(!review::is_clean(&records));
}
