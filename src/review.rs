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
 * Read-only queries over the record table, plus the summary counters and
 * the batch exit-code rule.
 *
 * This module specifies only the query *surface* (spec.md §1 excludes the
 * interactive dispatch shell itself, which lives in `src/bin/digup.rs`).
 * Every query iterates the table in path order (already guaranteed by
 * [`crate::record::RecordTable`] being a `BTreeMap`) and returns the lines
 * it would print, rather than writing to a stream directly, so the CLI and
 * tests can both drive it.
 */

use std::fmt::Write as _;

use crate::record::{RecordTable, Status};

/// One line of review output: either a bare classification line, or a
/// classification line paired with a `<-- oldpath` follow line (copied and
/// renamed entries).
pub struct ReviewLine {
    /// `"<path> <verb>."`
    pub line: String,
    /// `"<-- <oldpath>"`, present only for copied/renamed entries.
    pub oldpath_line: Option<String>,
}

fn lines_for(records: &RecordTable, status: Status, verb: &str) -> Vec<ReviewLine> {
    records
        .iter()
        .filter(|(_, info)| info.status == status)
        .map(|(path, info)| {
            let mut line = String::new();
            let _ = write!(line, "{} {verb}.", path.display());
            let oldpath_line = info
                .oldpath
                .as_ref()
                .map(|old| format!("<-- {}", old.display()));
            ReviewLine { line, oldpath_line }
        })
        .collect()
}

/// Newly discovered files with no prior record.
pub fn new_files(records: &RecordTable) -> Vec<ReviewLine> {
    lines_for(records, Status::New, "new")
}

/// Files whose content and metadata both matched the recorded state.
pub fn untouched(records: &RecordTable) -> Vec<ReviewLine> {
    lines_for(records, Status::Seen, "untouched")
}

/// Files whose metadata changed but content is unchanged.
pub fn touched(records: &RecordTable) -> Vec<ReviewLine> {
    lines_for(records, Status::Touched, "touched")
}

/// Files whose content changed.
pub fn changed(records: &RecordTable) -> Vec<ReviewLine> {
    lines_for(records, Status::Changed, "CHANGED")
}

/// Records present in the digest file that were never seen this scan.
pub fn deleted(records: &RecordTable) -> Vec<ReviewLine> {
    lines_for(records, Status::Unseen, "DELETED")
}

/// Files that could not be read or opened during the scan.
pub fn errors(records: &RecordTable) -> Vec<ReviewLine> {
    records
        .iter()
        .filter(|(_, info)| info.status == Status::Error)
        .map(|(path, info)| ReviewLine {
            line: format!(
                "{} ERROR. {}",
                path.display(),
                info.error.as_deref().unwrap_or("unknown error")
            ),
            oldpath_line: None,
        })
        .collect()
}

/// Content recognized at a new path whose original path still exists.
pub fn copied(records: &RecordTable) -> Vec<ReviewLine> {
    lines_for(records, Status::Copied, "copied")
}

/// Content recognized at a new path whose original path no longer exists.
pub fn renamed(records: &RecordTable) -> Vec<ReviewLine> {
    lines_for(records, Status::Renamed, "renamed")
}

/// Paths excluded from the scan by a `--restrict` pattern.
pub fn skipped(records: &RecordTable) -> Vec<ReviewLine> {
    lines_for(records, Status::Skipped, "skipped")
}

/// Non-zero status counters plus the table's total size, in the order the
/// original tool prints them.
pub struct Summary {
    /// `(label, count)` pairs, only for statuses with at least one record.
    pub counters: Vec<(&'static str, usize)>,
    /// Total record count, equal to the table size.
    pub total: usize,
}

/// Count every status bucket and assemble the summary view. `deleted` (the
/// "size minus everything accounted for" figure in the original tool) is
/// computed here directly from [`Status::Unseen`], per spec.md §9's
/// "redundant dual counters" note: the record table is the sole source of
/// truth, queried on demand rather than tracked by a separate counter.
pub fn summarize(records: &RecordTable) -> Summary {
    let mut counters = Vec::new();
    let mut push = |label: &'static str, status: Status| {
        let n = records.count(|info| info.status == status);
        if n > 0 {
            counters.push((label, n));
        }
    };
    push("New", Status::New);
    push("Untouched", Status::Seen);
    push("Touched", Status::Touched);
    push("Changed", Status::Changed);
    push("Errors", Status::Error);
    push("Renamed", Status::Renamed);
    push("Copied", Status::Copied);
    push("Skipped", Status::Skipped);
    push("Deleted", Status::Unseen);

    Summary {
        counters,
        total: records.len(),
    }
}

/// Whether the tree is content-identical to the recorded state modulo
/// mtime noise: every record is [`Status::Seen`] or [`Status::Touched`].
/// This is the batch exit-code rule (spec.md §4.7/§8).
pub fn is_clean(records: &RecordTable) -> bool {
    records.count(|info| !matches!(info.status, Status::Seen | Status::Touched)) == 0
}
