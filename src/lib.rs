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
 * # digup
 *
 * Incremental directory-integrity maintenance: given a rooted directory tree
 * and a sidecar digest file recording paths, digests and metadata, walk the
 * tree, classify every entry against the recorded state (untouched, touched,
 * changed, new, deleted, renamed, copied, errored or skipped), and rewrite
 * the digest file with fresh records.
 *
 * This crate is the reconciliation engine. Argument parsing, the interactive
 * command shell, and logging initialization live in the `digup` binary
 * (`src/bin/digup.rs`); this library exposes the pieces that make the
 * decisions: the digest hasher abstraction, the escape codec, the digest-file
 * parser and serializer, the filesystem walker, the reconciler, and the
 * read-only review surface.
 */

#![deny(missing_docs)]

pub mod config;
pub mod digest;
pub mod digestfile;
pub mod error;
pub mod escape;
pub mod reconcile;
pub mod record;
pub mod review;
pub mod walker;

pub use crate::config::Config;
pub use crate::digest::{Digest, DigestValue};
pub use crate::error::{DigupError, DigupResult};
pub use crate::reconcile::Reconciler;
pub use crate::record::{DigestIndex, FileInfo, RecordTable, Status};
pub use crate::walker::Walker;
