/*
 * Copyright (c) 2024 Jonathan Perkin <jonathan@perkin.org.uk>
 *
 * Permission to use, copy, modify, and distribute this software for any
 * purpose with or without fee is hereby granted, provided that the above
 * copyright notice and this permission notice appear in all copies.
 *
 * THE SOFTWARE IS PROVIDED "AS IS" AND THE AUTHOR DISCLAIMS ALL WARRANTIES
 * WITH REGARD TO THIS SOFTWARE INCLUDING ALL IMPLIED WARRANTIES OF
 * MERCHANTABILITY AND FITNESS. IN NO EVENT SHALL THE AUTHOR BE LIABLE FOR
 * ANY SPECIAL, DIRECT, INDIRECT, OR CONSEQUENTIAL DAMAGES OR ANY DAMAGES
 * WHATSOEVER RESULTING FROM LOSS OF USE, DATA OR PROFITS, WHETHER IN AN
 * ACTION OF CONTRACT, NEGLIGENCE OR OTHER TORTIOUS ACTION, ARISING OUT OF
 * OR IN CONNECTION WITH THE USE OR PERFORMANCE OF THIS SOFTWARE.
 */

/*!
 * The digest-file parser and serializer.
 *
 * The format is a sequence of `#:` metadata-comment lines (each carrying
 * one or more whitespace-separated `key value` pairs) paired with either a
 * digest-record line or a `symlink[\ ]` comment that commits the buffered
 * metadata into a record, terminated by a `#: crc 0xHHHHHHHH eof` trailer.
 * [`parse`] folds the format back into a [`RecordTable`]; [`serialize`]
 * emits one back out in canonical order.
 *
 * The running CRC-32 is accumulated line by line as bytes are read
 * (excluding the trailer line itself), mirroring the original tool's
 * `fprintfcrc` accumulator: whenever a `crc` key is parsed, the value
 * compared against it is the CRC of every byte read *before* that line.
 */

use std::path::{Path, PathBuf};

use crate::digest::{Digest, DigestValue};
use crate::error::{DigupError, DigupResult};
use crate::record::{FileInfo, RecordTable, Status};

/// Default digest-file names probed when `--file` is not given, in the
/// order spec.md §6 lists them. `sha128sum.txt` is a recognized alias for
/// SHA-1 (spec.md §9 Open Question (a)): accepted on read, never emitted.
const DEFAULT_NAMES: &[(&str, Digest)] = &[
    ("md5sum.txt", Digest::Md5),
    ("sha1sum.txt", Digest::Sha1),
    ("sha128sum.txt", Digest::Sha1),
    ("sha256sum.txt", Digest::Sha256),
    ("sha512sum.txt", Digest::Sha512),
];

/// Look in `dir` for exactly one of the default digest-file names. More
/// than one present is a fatal [`DigupError::AmbiguousDigestFile`].
pub fn probe_default_digest_file(dir: &Path) -> DigupResult<Option<(PathBuf, Digest)>> {
    let mut found = None;
    for (name, algo) in DEFAULT_NAMES {
        let candidate = dir.join(name);
        if candidate.is_file() {
            if found.is_some() {
                return Err(DigupError::AmbiguousDigestFile);
            }
            found = Some((candidate, *algo));
        }
    }
    Ok(found)
}

/// Result of a successful parse: the record table, the digest index built
/// from every indexable record, the algorithm inferred from the file's
/// records (`None` for an empty file), and any persistent option read from
/// it.
pub struct ParsedDigestFile {
    /// Every record loaded from the digest file.
    pub records: RecordTable,
    /// The inferred digest algorithm shared by every record, if any.
    pub algorithm: Option<Digest>,
    /// The `--exclude-marker` persistent option, if present in the file.
    pub exclude_marker: Option<String>,
}

#[derive(Default)]
struct Pending {
    mtime: i64,
    size: i64,
    symlink_target: Option<String>,
}

enum MetaOutcome {
    Continue,
    Eof,
    CommitSymlink(PathBuf),
}

/// Parse a digest file's raw bytes.
///
/// `restrict`, if set, marks every record whose path does not contain the
/// substring as [`Status::Skipped`] (spec.md §4.3's restrict filter).
/// `confirm_crc_mismatch` is called if the trailer CRC disagrees with the
/// body; returning `true` continues the parse despite the mismatch (the
/// interactive "Continue despite change (y/n)?" prompt), `false` aborts
/// with [`DigupError::CrcMismatch`]. Batch mode should pass a closure that
/// always returns `false`.
pub fn parse(
    digest_file_path: &Path,
    data: &[u8],
    restrict: Option<&str>,
    confirm_crc_mismatch: &mut dyn FnMut() -> bool,
) -> DigupResult<ParsedDigestFile> {
    let mut records = RecordTable::new();
    let mut algorithm: Option<Digest> = None;
    let mut exclude_marker: Option<String> = None;
    let mut pending = Pending::default();
    let mut running_crc: u32 = 0;
    let mut eof_seen = false;
    let mut linenum = 0usize;
    let mut pos = 0usize;

    while pos < data.len() {
        linenum += 1;

        let raw_end = match data[pos..].iter().position(|&b| b == b'\n') {
            Some(i) => pos + i + 1,
            None => data.len(),
        };
        let raw = &data[pos..raw_end];
        let crc_before = running_crc;
        running_crc = crc32_chain(running_crc, raw);

        let mut content_end = raw_end;
        if content_end > pos && data[content_end - 1] == b'\n' {
            content_end -= 1;
        }
        if content_end > pos && data[content_end - 1] == b'\r' {
            content_end -= 1;
        }
        let owned = String::from_utf8_lossy(&data[pos..content_end]).into_owned();
        let content = owned.trim_start();
        pos = raw_end;

        if eof_seen {
            tracing::warn!(
                path = %digest_file_path.display(),
                line = linenum,
                "superfluous line after eof"
            );
        }

        if let Some(rest) = content.strip_prefix("#:") {
            match parse_meta_tokens(
                digest_file_path,
                linenum,
                rest,
                &mut pending,
                crc_before,
                confirm_crc_mismatch,
                &mut exclude_marker,
            )? {
                MetaOutcome::Continue => {}
                MetaOutcome::Eof => eof_seen = true,
                MetaOutcome::CommitSymlink(path) => {
                    if records.contains(&path) {
                        return Err(DigupError::DuplicatePath {
                            path: digest_file_path.to_path_buf(),
                            line: linenum,
                            entry: path,
                        });
                    }
                    let info = FileInfo::unseen(pending.mtime, pending.size, None, pending.symlink_target.take());
                    records.insert(path, info);
                    pending = Pending::default();
                }
            }
            continue;
        }

        if content.starts_with('#') {
            continue;
        }

        let (path, digest_value) = parse_digest_record(digest_file_path, linenum, content)?;
        let this_algo = digest_value
            .algorithm()
            .expect("hex length was validated to correspond to a known algorithm");

        match algorithm {
            None => algorithm = Some(this_algo),
            Some(existing) if existing != this_algo => {
                return Err(DigupError::AlgorithmMismatch {
                    path: digest_file_path.to_path_buf(),
                    line: linenum,
                });
            }
            _ => {}
        }

        if records.contains(&path) {
            return Err(DigupError::DuplicatePath {
                path: digest_file_path.to_path_buf(),
                line: linenum,
                entry: path,
            });
        }

        let info = FileInfo::unseen(pending.mtime, pending.size, Some(digest_value), None);
        records.insert(path, info);
        pending = Pending::default();
    }

    if let Some(pattern) = restrict {
        apply_restrict(&mut records, pattern);
    }

    Ok(ParsedDigestFile {
        records,
        algorithm,
        exclude_marker,
    })
}

fn apply_restrict(records: &mut RecordTable, pattern: &str) {
    for (path, info) in records.iter_mut() {
        if !path.to_string_lossy().contains(pattern) {
            info.status = Status::Skipped;
        }
    }
}

fn parse_err(path: &Path, line: usize, message: &str) -> DigupError {
    DigupError::Parse {
        path: path.to_path_buf(),
        line,
        message: message.to_string(),
    }
}

#[allow(clippy::too_many_arguments)]
fn parse_meta_tokens(
    path: &Path,
    linenum: usize,
    content: &str,
    pending: &mut Pending,
    crc_before: u32,
    confirm_crc_mismatch: &mut dyn FnMut() -> bool,
    exclude_marker: &mut Option<String>,
) -> DigupResult<MetaOutcome> {
    let bytes = content.as_bytes();
    let mut p = 0usize;

    loop {
        while p < bytes.len() && bytes[p].is_ascii_whitespace() {
            p += 1;
        }
        if p >= bytes.len() {
            return Ok(MetaOutcome::Continue);
        }

        let word_start = p;
        while p < bytes.len() && (bytes[p].is_ascii_alphabetic() || bytes[p] == b'\\') {
            p += 1;
        }
        let word = &content[word_start..p];

        if p < bytes.len() && !bytes[p].is_ascii_whitespace() {
            return Err(parse_err(path, linenum, "unparseable digest comment line"));
        }

        match word {
            "option" => {
                while p < bytes.len() && bytes[p].is_ascii_whitespace() {
                    p += 1;
                }
                let key_start = p;
                while p < bytes.len() && bytes[p] != b'=' {
                    p += 1;
                }
                let key = &content[key_start..p];
                if key == "--exclude-marker" && p < bytes.len() {
                    p += 1;
                    *exclude_marker = Some(content[p..].to_string());
                    return Ok(MetaOutcome::Continue);
                }
                return Err(parse_err(path, linenum, "unknown persistent option line"));
            }
            "mtime" => {
                while p < bytes.len() && bytes[p].is_ascii_whitespace() {
                    p += 1;
                }
                let start = p;
                while p < bytes.len() && bytes[p].is_ascii_digit() {
                    p += 1;
                }
                if p < bytes.len() && !bytes[p].is_ascii_whitespace() {
                    return Err(parse_err(path, linenum, "unparseable digest comment line"));
                }
                pending.mtime = content[start..p]
                    .parse()
                    .map_err(|_| parse_err(path, linenum, "invalid mtime value"))?;
            }
            "size" => {
                while p < bytes.len() && bytes[p].is_ascii_whitespace() {
                    p += 1;
                }
                let start = p;
                while p < bytes.len() && bytes[p].is_ascii_digit() {
                    p += 1;
                }
                if p < bytes.len() && !bytes[p].is_ascii_whitespace() {
                    return Err(parse_err(path, linenum, "unparseable digest comment line"));
                }
                pending.size = content[start..p]
                    .parse()
                    .map_err(|_| parse_err(path, linenum, "invalid size value"))?;
            }
            "target" => {
                if p >= bytes.len() || !bytes[p].is_ascii_whitespace() {
                    return Err(parse_err(path, linenum, "unparseable digest comment line"));
                }
                p += 1;
                pending.symlink_target = Some(content[p..].to_string());
                return Ok(MetaOutcome::Continue);
            }
            "target\\" => {
                if p >= bytes.len() || !bytes[p].is_ascii_whitespace() {
                    return Err(parse_err(path, linenum, "unparseable digest comment line"));
                }
                p += 1;
                let decoded = crate::escape::decode(&content[p..])
                    .map_err(|source| DigupError::Escape { path: path.to_path_buf(), line: linenum, source })?;
                pending.symlink_target = Some(decoded);
                return Ok(MetaOutcome::Continue);
            }
            "symlink" => {
                if p >= bytes.len() || !bytes[p].is_ascii_whitespace() {
                    return Err(parse_err(path, linenum, "unparseable digest comment line"));
                }
                p += 1;
                return Ok(MetaOutcome::CommitSymlink(PathBuf::from(&content[p..])));
            }
            "symlink\\" => {
                if p >= bytes.len() || !bytes[p].is_ascii_whitespace() {
                    return Err(parse_err(path, linenum, "unparseable digest comment line"));
                }
                p += 1;
                let decoded = crate::escape::decode(&content[p..])
                    .map_err(|source| DigupError::Escape { path: path.to_path_buf(), line: linenum, source })?;
                return Ok(MetaOutcome::CommitSymlink(PathBuf::from(decoded)));
            }
            "crc" => {
                while p < bytes.len() && bytes[p].is_ascii_whitespace() {
                    p += 1;
                }
                if !content[p..].starts_with("0x") {
                    return Err(parse_err(path, linenum, "unparseable crc line"));
                }
                p += 2;
                let hex_start = p;
                while p < bytes.len() && bytes[p].is_ascii_hexdigit() {
                    p += 1;
                }
                if p - hex_start != 8 {
                    return Err(parse_err(path, linenum, "unparseable crc line"));
                }
                let declared = u32::from_str_radix(&content[hex_start..p], 16)
                    .map_err(|_| parse_err(path, linenum, "unparseable crc line"))?;
                if declared != crc_before && !confirm_crc_mismatch() {
                    return Err(DigupError::CrcMismatch { path: path.to_path_buf() });
                }
            }
            "eof" => return Ok(MetaOutcome::Eof),
            _ => return Err(parse_err(path, linenum, "unparseable digest comment line")),
        }
    }
}

fn parse_digest_record(path: &Path, linenum: usize, content: &str) -> DigupResult<(PathBuf, DigestValue)> {
    let bytes = content.as_bytes();
    let mut idx = 0usize;
    let escaped = bytes.first() == Some(&b'\\');
    if escaped {
        idx = 1;
    }

    let hex_start = idx;
    while idx < bytes.len() && bytes[idx].is_ascii_hexdigit() {
        idx += 1;
    }
    let hex_len = idx - hex_start;
    if !matches!(hex_len, 32 | 40 | 64 | 128) {
        return Err(parse_err(path, linenum, "no proper hex digest detected on line"));
    }

    if idx >= bytes.len() || !bytes[idx].is_ascii_whitespace() {
        return Err(parse_err(path, linenum, "digest is not followed by whitespace"));
    }
    idx += 1;

    if idx >= bytes.len() || (bytes[idx] != b' ' && bytes[idx] != b'*') {
        return Err(parse_err(path, linenum, "improper type indicator"));
    }
    idx += 1;

    let hex = &content[hex_start..hex_start + hex_len];
    let digest = DigestValue::from_hex(hex)
        .map_err(|source| DigupError::Digest { path: path.to_path_buf(), line: linenum, source })?;

    let raw_path = &content[idx..];
    let decoded = if escaped {
        crate::escape::decode(raw_path)
            .map_err(|source| DigupError::Escape { path: path.to_path_buf(), line: linenum, source })?
    } else {
        raw_path.to_string()
    };

    Ok((PathBuf::from(decoded), digest))
}

fn crc32_chain(prev: u32, bytes: &[u8]) -> u32 {
    let mut h = crc32fast::Hasher::new_with_initial(prev);
    h.update(bytes);
    h.finalize()
}

/// Emit `records` in canonical form: a header comment, any persistent
/// options, one metadata/record pair per active record in lexicographic
/// path order, and a trailing CRC-32 checksum line. Statuses Unseen,
/// Error, Oldpath and Skipped are never emitted (spec.md §4.4).
pub fn serialize(progname: &str, timestamp: &str, exclude_marker: Option<&str>, records: &RecordTable) -> Vec<u8> {
    let mut out = Vec::new();
    let mut crc: u32 = 0;

    write_crc(&mut out, &mut crc, format!("# {progname} last update: {timestamp}\n").as_bytes());

    if let Some(marker) = exclude_marker {
        write_crc(&mut out, &mut crc, format!("#: option --exclude-marker={marker}\n").as_bytes());
    }

    for (path, info) in records.iter() {
        if matches!(info.status, Status::Unseen | Status::Error | Status::Oldpath | Status::Skipped) {
            continue;
        }

        let path_str = path.to_string_lossy();

        if let Some(target) = &info.symlink_target {
            let (enc_target, target_escaped) = crate::escape::encode(target);
            if target_escaped {
                write_crc(
                    &mut out,
                    &mut crc,
                    format!("#: mtime {} size {} target\\ {enc_target}\n", info.mtime, info.size).as_bytes(),
                );
            } else {
                write_crc(
                    &mut out,
                    &mut crc,
                    format!("#: mtime {} size {} target {enc_target}\n", info.mtime, info.size).as_bytes(),
                );
            }

            let (enc_path, path_escaped) = crate::escape::encode(&path_str);
            if path_escaped {
                write_crc(&mut out, &mut crc, format!("#: symlink\\ {enc_path}\n").as_bytes());
            } else {
                write_crc(&mut out, &mut crc, format!("#: symlink {enc_path}\n").as_bytes());
            }
        } else {
            write_crc(&mut out, &mut crc, format!("#: mtime {} size {}\n", info.mtime, info.size).as_bytes());

            let digest = info
                .digest
                .as_ref()
                .expect("active non-symlink record must carry a digest (spec.md §3 invariant 2)");
            let (enc_path, path_escaped) = crate::escape::encode(&path_str);
            let prefix = if path_escaped { "\\" } else { "" };
            write_crc(&mut out, &mut crc, format!("{prefix}{}  {enc_path}\n", digest.to_hex()).as_bytes());
        }
    }

    out.extend_from_slice(format!("#: crc 0x{crc:08x} eof\n").as_bytes());
    out
}

fn write_crc(out: &mut Vec<u8>, crc: &mut u32, bytes: &[u8]) {
    *crc = crc32_chain(*crc, bytes);
    out.extend_from_slice(bytes);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn always_abort() -> bool {
        false
    }

    #[test]
    fn parse_simple_record() {
        let data = b"# digup last update: today\n\
#: mtime 1000 size 4\n\
d41d8cd98f00b204e9800998ecf8427e  empty.txt\n\
#: crc 0x00000000 eof\n";
        let mut confirm = always_abort;
        let parsed = parse(Path::new("sha1sum.txt"), data, None, &mut confirm);
        // CRC intentionally wrong above; expect CrcMismatch since confirm aborts.
        assert!(matches!(parsed, Err(DigupError::CrcMismatch { .. })));
    }

    #[test]
    fn parse_and_serialize_roundtrip() {
        let mut records = RecordTable::new();
        records.insert(
            PathBuf::from("a.txt"),
            FileInfo {
                status: Status::New,
                mtime: 1000,
                size: 5,
                digest: Some(DigestValue::from_hex("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa").unwrap()),
                symlink_target: None,
                oldpath: None,
                error: None,
            },
        );
        let bytes = serialize("digup", "2026-01-01 00:00:00 UTC", None, &records);
        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa  a.txt"));
        assert!(text.ends_with(&format!("#: crc 0x{:08x} eof\n", {
            // recompute expected crc by stripping the trailer and re-chaining
            let body_end = text.rfind("#: crc").unwrap();
            crc32fast::hash(text[..body_end].as_bytes())
        })));

        let mut confirm = always_abort;
        let parsed = parse(Path::new("sha1sum.txt"), &bytes, None, &mut confirm).unwrap();
        assert_eq!(parsed.records.len(), 1);
        let info = parsed.records.get(Path::new("a.txt")).unwrap();
        assert_eq!(info.mtime, 1000);
        assert_eq!(info.size, 5);
        assert_eq!(info.digest.as_ref().unwrap().to_hex(), "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
    }

    #[test]
    fn escaped_filename_roundtrip() {
        let mut records = RecordTable::new();
        records.insert(
            PathBuf::from("line1\nline2"),
            FileInfo {
                status: Status::New,
                mtime: 0,
                size: 0,
                digest: Some(DigestValue::from_hex("da39a3ee5e6b4b0d3255bfef95601890afd80709").unwrap()),
                symlink_target: None,
                oldpath: None,
                error: None,
            },
        );
        let bytes = serialize("digup", "2026-01-01 00:00:00 UTC", None, &records);
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("\\da39a3ee5e6b4b0d3255bfef95601890afd80709  line1\\nline2"));

        let mut confirm = always_abort;
        let parsed = parse(Path::new("sha1sum.txt"), &bytes, None, &mut confirm).unwrap();
        assert!(parsed.records.contains(Path::new("line1\nline2")));
    }

    #[test]
    fn symlink_record_roundtrip() {
        let mut records = RecordTable::new();
        records.insert(
            PathBuf::from("link"),
            FileInfo {
                status: Status::New,
                mtime: 42,
                size: 3,
                digest: None,
                symlink_target: Some("target".to_string()),
                oldpath: None,
                error: None,
            },
        );
        let bytes = serialize("digup", "2026-01-01 00:00:00 UTC", None, &records);
        let mut confirm = always_abort;
        let parsed = parse(Path::new("sha1sum.txt"), &bytes, None, &mut confirm).unwrap();
        let info = parsed.records.get(Path::new("link")).unwrap();
        assert_eq!(info.symlink_target.as_deref(), Some("target"));
        assert!(info.digest.is_none());
    }

    #[test]
    fn duplicate_path_is_fatal() {
        let data = b"#: mtime 0 size 0\n\
da39a3ee5e6b4b0d3255bfef95601890afd80709  a\n\
#: mtime 0 size 0\n\
da39a3ee5e6b4b0d3255bfef95601890afd80709  a\n";
        let mut confirm = always_abort;
        let err = parse(Path::new("sha1sum.txt"), data, None, &mut confirm).unwrap_err();
        assert!(matches!(err, DigupError::DuplicatePath { .. }));
    }

    #[test]
    fn algorithm_mismatch_is_fatal() {
        let data = b"#: mtime 0 size 0\n\
da39a3ee5e6b4b0d3255bfef95601890afd80709  a\n\
#: mtime 0 size 0\n\
d41d8cd98f00b204e9800998ecf8427e  b\n";
        let mut confirm = always_abort;
        let err = parse(Path::new("sha1sum.txt"), data, None, &mut confirm).unwrap_err();
        assert!(matches!(err, DigupError::AlgorithmMismatch { .. }));
    }

    #[test]
    fn restrict_marks_non_matching_as_skipped() {
        let data = b"#: mtime 0 size 0\n\
da39a3ee5e6b4b0d3255bfef95601890afd80709  src/a\n\
#: mtime 0 size 0\n\
d41d8cd98f00b204e9800998ecf8427e  docs/b\n";
        let mut confirm = always_abort;
        let parsed = parse(Path::new("sha1sum.txt"), data, Some("src/"), &mut confirm).unwrap();
        assert_eq!(parsed.records.get(Path::new("src/a")).unwrap().status, Status::Unseen);
        assert_eq!(parsed.records.get(Path::new("docs/b")).unwrap().status, Status::Skipped);
    }

    #[test]
    fn probe_default_digest_file_picks_unique_candidate() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sha256sum.txt"), b"").unwrap();
        let found = probe_default_digest_file(dir.path()).unwrap();
        assert_eq!(found, Some((dir.path().join("sha256sum.txt"), Digest::Sha256)));
    }

    #[test]
    fn probe_default_digest_file_rejects_ambiguity() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("md5sum.txt"), b"").unwrap();
        std::fs::write(dir.path().join("sha1sum.txt"), b"").unwrap();
        let err = probe_default_digest_file(dir.path()).unwrap_err();
        assert!(matches!(err, DigupError::AmbiguousDigestFile));
    }
}
