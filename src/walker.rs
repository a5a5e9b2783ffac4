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
 * The depth-first filesystem walker.
 *
 * Sorts each directory's entries before recursing so that two scans of an
 * unchanged tree visit paths in the same order, appends `(dev, ino)` of
 * every directory currently being descended into to a loop-detection
 * stack, and dispatches each entry by type to the reconciler in
 * [`crate::reconcile`].
 */

use std::fs::{self, DirEntry};
use std::io;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::record::RecordTable;
use crate::reconcile::Reconciler;

/// Depth-first walker holding the open-ancestor stack used for symlink-loop
/// detection.
pub struct Walker<'a> {
    config: &'a Config,
    stack: Vec<(u64, u64)>,
}

impl<'a> Walker<'a> {
    /// A walker rooted implicitly at whatever path [`Walker::run`] is given.
    pub fn new(config: &'a Config) -> Self {
        Walker { config, stack: Vec::new() }
    }

    /// Walk `root`, handing every discovered entry to `reconciler` and
    /// mutating `records` in place. Returns once the whole tree (minus any
    /// loop-truncated subtrees) has been visited.
    pub fn run(&mut self, root: &Path, records: &mut RecordTable, reconciler: &Reconciler) -> io::Result<()> {
        let meta = fs::symlink_metadata(root)?;
        if meta.is_dir() {
            self.push_dir(root, &meta);
            self.walk_dir(root, records, reconciler)?;
            self.stack.pop();
        }
        Ok(())
    }

    fn push_dir(&mut self, path: &Path, meta: &fs::Metadata) -> bool {
        let key = (meta.dev(), meta.ino());
        if self.stack.contains(&key) {
            tracing::warn!(path = %path.display(), "filesystem loop detected, not descending");
            return false;
        }
        self.stack.push(key);
        true
    }

    fn walk_dir(&mut self, dir: &Path, records: &mut RecordTable, reconciler: &Reconciler) -> io::Result<()> {
        let mut entries: Vec<DirEntry> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
        entries.sort_by_key(|e| e.file_name());

        if let Some(marker) = &self.config.exclude_marker {
            if entries.iter().any(|e| e.file_name() == std::ffi::OsStr::new(marker)) {
                tracing::debug!(path = %dir.display(), marker, "exclude marker present, skipping directory");
                return Ok(());
            }
        }

        for entry in entries {
            let path = entry.path();
            let rel = canonical_relative(&self.config.root, &path);

            if rel == self.config.digest_file {
                continue;
            }

            let file_type = match entry.file_type() {
                Ok(ft) => ft,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "could not stat entry");
                    continue;
                }
            };

            // Directories are always descended into regardless of --restrict: the
            // pattern is matched against each leaf file/symlink path, not the
            // directory path that contains it.
            if file_type.is_dir() {
                let meta = fs::symlink_metadata(&path)?;
                if self.push_dir(&path, &meta) {
                    self.walk_dir(&path, records, reconciler)?;
                    self.stack.pop();
                }
                continue;
            }

            if !self.config.restrict_allows(&rel) {
                continue;
            }

            if file_type.is_symlink() {
                self.dispatch_symlink(&path, &rel, records, reconciler)?;
            } else if file_type.is_file() {
                reconciler.process_file(&rel, &path, records);
            } else {
                tracing::debug!(path = %path.display(), "skipping special file");
            }
        }

        Ok(())
    }

    fn dispatch_symlink(
        &mut self,
        path: &Path,
        rel: &Path,
        records: &mut RecordTable,
        reconciler: &Reconciler,
    ) -> io::Result<()> {
        if !self.config.follow_symlinks {
            reconciler.process_symlink(rel, path, records);
            return Ok(());
        }

        let meta = match fs::metadata(path) {
            Ok(m) => m,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "could not resolve symlink target");
                return Ok(());
            }
        };

        if meta.is_dir() {
            if self.push_dir(path, &meta) {
                self.walk_dir(path, records, reconciler)?;
                self.stack.pop();
            }
        } else if meta.is_file() {
            reconciler.process_file(rel, path, records);
        } else {
            tracing::debug!(path = %path.display(), "skipping special file behind followed symlink");
        }

        Ok(())
    }
}

/// Strip `root` and any leading `./` so stored paths are canonical and
/// comparable against the digest file's own recorded paths.
fn canonical_relative(root: &Path, path: &Path) -> PathBuf {
    let stripped = path.strip_prefix(root).unwrap_or(path);
    let mut s = stripped.to_string_lossy().into_owned();
    while let Some(rest) = s.strip_prefix("./") {
        s = rest.to_string();
    }
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::Digest;

    #[test]
    fn canonical_relative_strips_root_and_dot_slash() {
        let root = Path::new(".");
        assert_eq!(canonical_relative(root, Path::new("./a/b")), PathBuf::from("a/b"));
        assert_eq!(canonical_relative(root, Path::new("a/b")), PathBuf::from("a/b"));
    }

    #[test]
    fn walk_discovers_new_files_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), b"b").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/c.txt"), b"c").unwrap();

        let mut config = Config::new(dir.path().join("sha1sum.txt"), Some(Digest::Sha1));
        config.root = dir.path().to_path_buf();
        let reconciler = Reconciler::new(&config, crate::record::DigestIndex::new());
        let mut records = RecordTable::new();
        let mut walker = Walker::new(&config);
        walker.run(dir.path(), &mut records, &reconciler).unwrap();

        assert_eq!(records.len(), 3);
        assert!(records.contains(Path::new("a.txt")));
        assert!(records.contains(Path::new("sub/c.txt")));
    }

    #[test]
    fn exclude_marker_prunes_whole_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("skip")).unwrap();
        std::fs::write(dir.path().join("skip/.nodigup"), b"").unwrap();
        std::fs::write(dir.path().join("skip/file.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("keep.txt"), b"y").unwrap();

        let mut config = Config::new(dir.path().join("sha1sum.txt"), Some(Digest::Sha1));
        config.root = dir.path().to_path_buf();
        config.exclude_marker = Some(".nodigup".to_string());
        let reconciler = Reconciler::new(&config, crate::record::DigestIndex::new());
        let mut records = RecordTable::new();
        let mut walker = Walker::new(&config);
        walker.run(dir.path(), &mut records, &reconciler).unwrap();

        assert_eq!(records.len(), 1);
        assert!(records.contains(Path::new("keep.txt")));
    }
}
