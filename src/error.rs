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
 * Crate-wide fatal error type.
 *
 * Per-record failures (a file that could not be opened or read) are never
 * represented here -- they are absorbed into [`crate::record::FileInfo::error`]
 * and the scan continues. `DigupError` covers only the failures that abort
 * the whole run: a malformed digest file, ambiguous digest-file selection,
 * or an invalid combination of CLI flags.
 */

use std::io;
use std::path::PathBuf;

/// Result type threaded through the parser, walker and CLI.
pub type DigupResult<T> = std::result::Result<T, DigupError>;

/// A fatal error that aborts the run without rewriting the digest file.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DigupError {
    /// I/O error opening, reading or writing the digest file itself.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// More than one default digest-file name exists and `--file` was not
    /// given.
    #[error("multiple digest files found in current directory, select one with --file")]
    AmbiguousDigestFile,

    /// No digest file was found and no `--type` was given to create one.
    #[error("no digest file found: specify --type to create a new one")]
    NoDigestFileType,

    /// A line in the digest file could not be parsed.
    #[error("\"{path}\" line {line}: {message}")]
    Parse {
        /// Path to the digest file being parsed.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// Human-readable description of the problem.
        message: String,
    },

    /// The same path appeared twice in the digest file.
    #[error("\"{path}\" line {line}: duplicate path {entry}")]
    DuplicatePath {
        /// Path to the digest file being parsed.
        path: PathBuf,
        /// 1-based line number of the second occurrence.
        line: usize,
        /// The duplicated record path.
        entry: PathBuf,
    },

    /// Two different digest algorithms appeared in the same file. The
    /// original tool called `exit(0)` here, which is almost certainly a
    /// bug; this is an intentional deviation to a proper fatal error.
    #[error("\"{path}\" line {line}: different digest types in file")]
    AlgorithmMismatch {
        /// Path to the digest file being parsed.
        path: PathBuf,
        /// 1-based line number of the conflicting record.
        line: usize,
    },

    /// The trailer CRC-32 did not match the body of the file, and the run
    /// was either in batch mode or the operator declined to continue.
    #[error("\"{path}\": crc32 value saved in file does not match")]
    CrcMismatch {
        /// Path to the digest file being parsed.
        path: PathBuf,
    },

    /// An escape sequence in a path or symlink target could not be decoded.
    #[error("\"{path}\" line {line}: {source}")]
    Escape {
        /// Path to the digest file being parsed.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// Underlying escape-codec error.
        #[source]
        source: crate::escape::EscapeError,
    },

    /// A hex digest could not be decoded.
    #[error("\"{path}\" line {line}: {source}")]
    Digest {
        /// Path to the digest file being parsed.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// Underlying digest-codec error.
        #[source]
        source: crate::digest::DigestError,
    },

    /// `--update` was given without `--batch`.
    #[error("--update requires --batch")]
    UpdateWithoutBatch,

    /// A CLI argument was invalid.
    #[error("invalid argument: {0}")]
    Argument(String),
}
