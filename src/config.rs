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
 * Run configuration.
 *
 * Everything that used to be a `gopt_*` global in the original tool lives
 * here instead, built once from parsed CLI flags and passed by reference
 * into the walker, reconciler and serializer (spec.md §9 redesign flag:
 * "global mutable option and counter state").
 */

use std::path::PathBuf;

use crate::digest::Digest;

/// Single source of truth for every CLI-controlled knob.
#[derive(Clone, Debug)]
pub struct Config {
    /// `--batch` / `-b`: non-interactive, exit code signals clean/dirty.
    pub batch: bool,
    /// `--check` / `-c`: recompute every digest regardless of mtime.
    pub full_check: bool,
    /// `--links` / `-l`: follow symlinks instead of recording their target.
    pub follow_symlinks: bool,
    /// `--modified` / `-m`: suppress unchanged entries in verbose output.
    pub only_modified: bool,
    /// `--update` / `-u`: auto-write in batch mode.
    pub update: bool,
    /// `--modify-window=N` (or `--windows` / `-w`, equivalent to 1).
    pub modify_window: u32,
    /// `--quiet` / `-q`, `--verbose` / `-v`: -1..2.
    pub verbose: i32,
    /// `--restrict=PAT` / `-r`: substring filter.
    pub restrict: Option<String>,
    /// `--type=...` / `-t`: algorithm to use for newly discovered files.
    pub digest_type: Option<Digest>,
    /// `--exclude-marker=NAME`: directories containing this entry are
    /// skipped entirely.
    pub exclude_marker: Option<String>,
    /// Root to scan; defaults to the current directory.
    pub root: PathBuf,
    /// Digest-file path, resolved from `--file` or default-name probing.
    pub digest_file: PathBuf,
}

impl Config {
    /// A configuration suitable for library use and tests: batch mode,
    /// no symlink following, no restrictions, zero modify-window.
    pub fn new(digest_file: PathBuf, digest_type: Option<Digest>) -> Self {
        Config {
            batch: true,
            full_check: false,
            follow_symlinks: false,
            only_modified: false,
            update: false,
            modify_window: 0,
            verbose: 2,
            restrict: None,
            digest_type,
            exclude_marker: None,
            root: PathBuf::from("."),
            digest_file,
        }
    }

    /// Whether a path survives the `--restrict` filter, if one is set.
    pub fn restrict_allows(&self, path: &std::path::Path) -> bool {
        match &self.restrict {
            None => true,
            Some(pat) => path.to_string_lossy().contains(pat.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restrict_allows_everything_when_unset() {
        let cfg = Config::new(PathBuf::from("sha1sum.txt"), None);
        assert!(cfg.restrict_allows(std::path::Path::new("anything/at/all")));
    }

    #[test]
    fn restrict_filters_by_substring() {
        let mut cfg = Config::new(PathBuf::from("sha1sum.txt"), None);
        cfg.restrict = Some("src/".to_string());
        assert!(cfg.restrict_allows(std::path::Path::new("src/lib.rs")));
        assert!(!cfg.restrict_allows(std::path::Path::new("tests/lib.rs")));
    }
}
