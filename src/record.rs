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
 * The per-path record, the path table, and the digest-to-path index that
 * together form the reconciler's in-memory state.
 *
 * [`RecordTable`] owns every path and [`FileInfo`]; it is a `BTreeMap` so
 * iteration is already in lexicographic path order, satisfying the
 * ordering guarantee used by both review and serialization. [`DigestIndex`]
 * is a second, non-owning view keyed by digest, used only to detect
 * renames and copies.
 */

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::digest::DigestValue;

/// Sentinel for a size that has not yet been determined by a scan.
pub const SIZE_UNKNOWN: i64 = -1;

/// Classification state of a single path, per spec.md §3/§4.6.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Status {
    /// Present in the digest file, not yet seen on disk this run.
    Unseen,
    /// Seen on disk with metadata matching the record, no digest recomputed.
    Seen,
    /// Discovered on disk with no prior record.
    New,
    /// Metadata changed but content (digest/symlink target) is unchanged.
    Touched,
    /// Content changed.
    Changed,
    /// A read/open/readlink error occurred while processing this path.
    Error,
    /// Content recognized at a new path; the original path still exists.
    Copied,
    /// Content recognized at a new path; the original path no longer exists.
    Renamed,
    /// The original path of a file recognized as renamed elsewhere.
    Oldpath,
    /// Excluded from the scan by a `--restrict` pattern.
    Skipped,
}

/// The mutable per-path record. See spec.md §3 for the full invariant list.
#[derive(Clone, Debug)]
pub struct FileInfo {
    /// Current classification.
    pub status: Status,
    /// Modification time, seconds since epoch.
    pub mtime: i64,
    /// Byte size, or [`SIZE_UNKNOWN`] before a scan populates it.
    pub size: i64,
    /// Content digest. Mutually exclusive with `symlink_target`.
    pub digest: Option<DigestValue>,
    /// Symlink target. Mutually exclusive with `digest`.
    pub symlink_target: Option<String>,
    /// Prior path this content was recognized at, for Copied/Renamed.
    pub oldpath: Option<PathBuf>,
    /// Error message, set only when `status == Status::Error`.
    pub error: Option<String>,
}

impl FileInfo {
    /// A record freshly parsed from the digest file, not yet visited by
    /// the walker this run.
    pub fn unseen(mtime: i64, size: i64, digest: Option<DigestValue>, symlink_target: Option<String>) -> Self {
        FileInfo {
            status: Status::Unseen,
            mtime,
            size,
            digest,
            symlink_target,
            oldpath: None,
            error: None,
        }
    }

    /// Whether this record participates in the digest index used for
    /// rename/copy detection. Per spec.md §9(c), skipped records are
    /// excluded so content moving in from outside a restricted region is
    /// classified New rather than Renamed.
    pub fn indexable(&self) -> bool {
        self.status != Status::Skipped && self.digest.is_some()
    }
}

/// Path-ordered table of every known record, parsed or discovered.
#[derive(Clone, Debug, Default)]
pub struct RecordTable {
    inner: BTreeMap<PathBuf, FileInfo>,
}

impl RecordTable {
    /// An empty table.
    pub fn new() -> Self {
        RecordTable { inner: BTreeMap::new() }
    }

    /// Number of records, matching the "Total" count in the summary view.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Whether the table holds no records at all.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Insert a record, returning the previous value at this path if any.
    pub fn insert(&mut self, path: PathBuf, info: FileInfo) -> Option<FileInfo> {
        self.inner.insert(path, info)
    }

    /// Look up a record by path.
    pub fn get(&self, path: &Path) -> Option<&FileInfo> {
        self.inner.get(path)
    }

    /// Look up a record by path, mutably.
    pub fn get_mut(&mut self, path: &Path) -> Option<&mut FileInfo> {
        self.inner.get_mut(path)
    }

    /// Whether a path already has a record.
    pub fn contains(&self, path: &Path) -> bool {
        self.inner.contains_key(path)
    }

    /// Iterate all records in lexicographic path order.
    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &FileInfo)> {
        self.inner.iter()
    }

    /// Iterate all records mutably, in lexicographic path order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&PathBuf, &mut FileInfo)> {
        self.inner.iter_mut()
    }

    /// Count records matching a predicate, used by the review summary.
    pub fn count(&self, mut pred: impl FnMut(&FileInfo) -> bool) -> usize {
        self.inner.values().filter(|info| pred(info)).count()
    }
}

/// Digest-to-path multi-index, non-owning: it holds copies of the digest
/// value and clones of the path, never the [`FileInfo`] itself. Entries for
/// equal digests are appended in the order they were first seen, which for
/// a freshly parsed digest file coincides with the original path order
/// (spec.md §5's ordering guarantee (c)).
#[derive(Clone, Debug, Default)]
pub struct DigestIndex {
    inner: BTreeMap<DigestValue, Vec<PathBuf>>,
}

impl DigestIndex {
    /// An empty index.
    pub fn new() -> Self {
        DigestIndex { inner: BTreeMap::new() }
    }

    /// Build an index from every indexable record in a table (see
    /// [`FileInfo::indexable`]).
    pub fn from_table(table: &RecordTable) -> Self {
        let mut index = DigestIndex::new();
        for (path, info) in table.iter() {
            if info.indexable() {
                index.insert(info.digest.clone().expect("indexable implies digest"), path.clone());
            }
        }
        index
    }

    /// Append a path under a digest, preserving insertion order among
    /// duplicates.
    pub fn insert(&mut self, digest: DigestValue, path: PathBuf) {
        self.inner.entry(digest).or_default().push(path);
    }

    /// All paths recorded under a digest, leftmost (first-seen) first.
    pub fn candidates(&self, digest: &DigestValue) -> &[PathBuf] {
        self.inner.get(digest).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(status: Status) -> FileInfo {
        FileInfo {
            status,
            mtime: 0,
            size: 0,
            digest: None,
            symlink_target: None,
            oldpath: None,
            error: None,
        }
    }

    #[test]
    fn record_table_orders_lexicographically() {
        let mut table = RecordTable::new();
        table.insert(PathBuf::from("b/file"), info(Status::Unseen));
        table.insert(PathBuf::from("a/file"), info(Status::Unseen));
        let paths: Vec<_> = table.iter().map(|(p, _)| p.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("a/file"), PathBuf::from("b/file")]);
    }

    #[test]
    fn digest_index_preserves_insertion_order_for_duplicates() {
        let d = DigestValue::from_bytes(vec![1, 2, 3, 4]);
        let mut index = DigestIndex::new();
        index.insert(d.clone(), PathBuf::from("first"));
        index.insert(d.clone(), PathBuf::from("second"));
        assert_eq!(
            index.candidates(&d),
            &[PathBuf::from("first"), PathBuf::from("second")]
        );
    }

    #[test]
    fn skipped_records_are_not_indexable() {
        let mut rec = info(Status::Skipped);
        rec.digest = Some(DigestValue::from_bytes(vec![0; 16]));
        assert!(!rec.indexable());
    }
}
