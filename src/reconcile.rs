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
 * Per-entry classification.
 *
 * [`Reconciler`] holds the configuration and the digest→path index built
 * once from the records loaded at startup, and exposes a file classifier
 * and a symlink classifier, each keyed by the entry's canonical (root- and
 * `./`-stripped) path. Every transition here is described in terms of the
 * state machine in [`crate::record::Status`]; see the module-level
 * documentation there for the full set of reachable states.
 */

use std::fs::File;
use std::io::Read;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use crate::config::Config;
use crate::record::{DigestIndex, FileInfo, RecordTable, Status};

/// Size of the read buffer used while streaming a file through its hasher.
const READ_BUFFER_SIZE: usize = 1024 * 1024;

/// Classifies discovered filesystem entries against a loaded record table.
pub struct Reconciler<'a> {
    config: &'a Config,
    digest_index: DigestIndex,
}

impl<'a> Reconciler<'a> {
    /// Build a reconciler from the configuration and the digest index
    /// derived from the records loaded at startup. The index is frozen for
    /// the whole scan: entries discovered during the walk are never added
    /// to it, matching the original tool's single load-time population.
    pub fn new(config: &'a Config, digest_index: DigestIndex) -> Self {
        Reconciler { config, digest_index }
    }

    /// Classify a regular file at `rel` (canonical path) / `abs` (path to
    /// open), mutating `records` in place.
    pub fn process_file(&self, rel: &Path, abs: &Path, records: &mut RecordTable) {
        let meta = match std::fs::symlink_metadata(abs) {
            Ok(m) => m,
            Err(err) => {
                tracing::warn!(path = %rel.display(), error = %err, "could not stat file");
                return;
            }
        };
        let mtime = meta.mtime();
        let size = meta.size() as i64;

        if records.contains(rel) {
            let status = records.get(rel).map(|i| i.status);
            if status != Some(Status::Unseen) {
                tracing::warn!(path = %rel.display(), "same file processed twice, this should never occur");
                return;
            }

            let unchanged = !self.config.full_check
                && (mtime - records.get(rel).unwrap().mtime).unsigned_abs() as u32 <= self.config.modify_window
                && size == records.get(rel).unwrap().size;

            if unchanged {
                let info = records.get_mut(rel).unwrap();
                info.status = Status::Seen;
                return;
            }

            let algorithm = records
                .get(rel)
                .unwrap()
                .digest
                .as_ref()
                .and_then(|d| d.algorithm())
                .or(self.config.digest_type)
                .unwrap_or(crate::digest::Digest::Sha256);

            match hash_file(abs, algorithm) {
                Ok((digest, bytes_read)) => {
                    let info = records.get_mut(rel).unwrap();
                    if bytes_read as i64 != size {
                        info.status = Status::Error;
                        info.mtime = mtime;
                        info.size = size;
                        info.error = Some(format!(
                            "read {bytes_read} bytes, expected {size}"
                        ));
                        return;
                    }
                    if info.digest.as_ref() == Some(&digest) {
                        info.status = Status::Touched;
                    } else {
                        info.status = Status::Changed;
                        info.digest = Some(digest);
                    }
                    info.mtime = mtime;
                    info.size = size;
                }
                Err(err) => {
                    let info = records.get_mut(rel).unwrap();
                    info.status = Status::Error;
                    info.mtime = mtime;
                    info.size = size;
                    info.error = Some(err.to_string());
                }
            }
            return;
        }

        let algorithm = self.config.digest_type.unwrap_or(crate::digest::Digest::Sha256);
        match hash_file(abs, algorithm) {
            Ok((digest, bytes_read)) => {
                if bytes_read as i64 != size {
                    let info = FileInfo {
                        status: Status::Error,
                        mtime,
                        size,
                        digest: None,
                        symlink_target: None,
                        oldpath: None,
                        error: Some(format!("read {bytes_read} bytes, expected {size}")),
                    };
                    records.insert(rel.to_path_buf(), info);
                    return;
                }
                let mut info = FileInfo {
                    status: Status::New,
                    mtime,
                    size,
                    digest: Some(digest.clone()),
                    symlink_target: None,
                    oldpath: None,
                    error: None,
                };
                self.classify_new_content(&digest, &mut info, records);
                records.insert(rel.to_path_buf(), info);
            }
            Err(err) => {
                let info = FileInfo {
                    status: Status::Error,
                    mtime,
                    size,
                    digest: None,
                    symlink_target: None,
                    oldpath: None,
                    error: Some(err.to_string()),
                };
                records.insert(rel.to_path_buf(), info);
            }
        }
    }

    /// Classify a symlink at `rel` / `abs`. Symlinks never participate in
    /// rename/copy detection: a symlink with no prior record is always New.
    pub fn process_symlink(&self, rel: &Path, abs: &Path, records: &mut RecordTable) {
        let meta = match std::fs::symlink_metadata(abs) {
            Ok(m) => m,
            Err(err) => {
                tracing::warn!(path = %rel.display(), error = %err, "could not stat symlink");
                return;
            }
        };
        let mtime = meta.mtime();
        let size = meta.size() as i64;

        if records.contains(rel) {
            let status = records.get(rel).map(|i| i.status);
            if status != Some(Status::Unseen) {
                tracing::warn!(path = %rel.display(), "same symlink processed twice, this should never occur");
                return;
            }

            let unchanged = !self.config.full_check
                && mtime == records.get(rel).unwrap().mtime
                && size == records.get(rel).unwrap().size;

            if unchanged {
                let info = records.get_mut(rel).unwrap();
                info.status = Status::Seen;
                return;
            }

            match std::fs::read_link(abs) {
                Ok(target) => {
                    let target = target.to_string_lossy().into_owned();
                    let info = records.get_mut(rel).unwrap();
                    if info.symlink_target.as_deref() == Some(target.as_str()) {
                        info.status = Status::Touched;
                    } else {
                        info.status = Status::Changed;
                        info.symlink_target = Some(target);
                    }
                    info.mtime = mtime;
                    info.size = size;
                }
                Err(err) => {
                    let info = records.get_mut(rel).unwrap();
                    info.status = Status::Error;
                    info.mtime = mtime;
                    info.size = size;
                    info.error = Some(format!("could not read symlink: {err}"));
                }
            }
            return;
        }

        match std::fs::read_link(abs) {
            Ok(target) => {
                let info = FileInfo {
                    status: Status::New,
                    mtime,
                    size,
                    digest: None,
                    symlink_target: Some(target.to_string_lossy().into_owned()),
                    oldpath: None,
                    error: None,
                };
                records.insert(rel.to_path_buf(), info);
            }
            Err(err) => {
                let info = FileInfo {
                    status: Status::Error,
                    mtime,
                    size,
                    digest: None,
                    symlink_target: None,
                    oldpath: None,
                    error: Some(format!("could not read symlink: {err}")),
                };
                records.insert(rel.to_path_buf(), info);
            }
        }
    }

    /// Given a newly computed digest with no prior record at its path,
    /// scan the digest index for rename/copy candidates and set `info`'s
    /// status and `oldpath` accordingly. Mirrors the original tool's
    /// candidate scan: iterating every candidate with this digest, a
    /// surviving one wins as Copied (the *last* survivor found, matching
    /// the reference implementation), and visiting a non-surviving
    /// candidate flips its own record to Oldpath.
    fn classify_new_content(&self, digest: &crate::digest::DigestValue, info: &mut FileInfo, records: &mut RecordTable) {
        let candidates = self.digest_index.candidates(digest);
        if candidates.is_empty() {
            return;
        }

        let mut surviving: Option<&Path> = None;
        let mut first = None;

        for candidate in candidates {
            if first.is_none() {
                first = Some(candidate.as_path());
            }
            if self.config.root.join(candidate).exists() {
                surviving = Some(candidate.as_path());
            } else if let Some(original) = records.get_mut(candidate) {
                match original.status {
                    Status::Unseen => original.status = Status::Oldpath,
                    Status::Oldpath => {}
                    _ => tracing::warn!(path = %candidate.display(), "renamed original file still existed when scanning"),
                }
            } else {
                tracing::warn!(path = %candidate.display(), "internal error: cannot find entry for matching file");
            }
        }

        if let Some(survivor) = surviving {
            info.status = Status::Copied;
            info.oldpath = Some(survivor.to_path_buf());
        } else if let Some(first) = first {
            info.status = Status::Renamed;
            info.oldpath = Some(first.to_path_buf());
        }
    }
}

fn hash_file(path: &Path, algorithm: crate::digest::Digest) -> std::io::Result<(crate::digest::DigestValue, u64)> {
    let mut file = File::open(path)?;
    let mut hasher = algorithm.hasher();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut total = 0u64;
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }
    Ok((hasher.finish(), total))
}
