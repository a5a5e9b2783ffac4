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
 * Digest hashing and binary digest values.
 *
 * [`Digest`] selects one of five algorithms (four content hashes plus the
 * CRC-32 used for the digest-file trailer) behind a single streaming
 * [`Hasher`] capability, mirroring the original tool's `digest_ctx`: one
 * interface, a tagged union of contexts underneath.
 *
 * A stored [`DigestValue`] carries no algorithm tag of its own -- its byte
 * length is enough to recover the algorithm, since MD5/SHA-1/SHA-256/
 * SHA-512/CRC-32 produce 16/20/32/64/4 bytes respectively and those sizes
 * are disjoint.
 */

use std::fmt;
use std::io::{self, Read};

/// Result type for digest operations.
pub type DigestResult<T> = std::result::Result<T, DigestError>;

/// Errors produced while selecting, computing or decoding a digest.
#[derive(Debug, thiserror::Error)]
pub enum DigestError {
    /// I/O error while reading a file or stream for hashing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// An unrecognised algorithm name.
    #[error("unsupported digest type: {0}")]
    Unsupported(String),
    /// Hex string had an odd number of characters.
    #[error("odd-length hex string")]
    OddLength,
    /// Hex string contained a non-hex character.
    #[error("invalid hex character")]
    InvalidHexChar,
    /// Byte length does not correspond to any known algorithm.
    #[error("no algorithm has a {0}-byte digest")]
    UnknownSize(usize),
}

/// One of the five digest algorithms understood by the digest file format
/// and by the trailer checksum.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Digest {
    /// 128-bit MD5, 32 hex characters.
    Md5,
    /// 160-bit SHA-1, 40 hex characters.
    Sha1,
    /// 256-bit SHA-256, 64 hex characters.
    Sha256,
    /// 512-bit SHA-512, 128 hex characters.
    Sha512,
    /// 32-bit CRC-32 (IEEE 802.3), used only for the trailer line.
    Crc32,
}

impl Digest {
    /// Number of raw bytes a digest of this type produces.
    pub fn size(&self) -> usize {
        match self {
            Digest::Crc32 => 4,
            Digest::Md5 => 16,
            Digest::Sha1 => 20,
            Digest::Sha256 => 32,
            Digest::Sha512 => 64,
        }
    }

    /// Infer the algorithm from a previously stored digest's byte length.
    /// The five sizes are disjoint, so this is unambiguous.
    pub fn from_size(size: usize) -> Option<Digest> {
        match size {
            4 => Some(Digest::Crc32),
            16 => Some(Digest::Md5),
            20 => Some(Digest::Sha1),
            32 => Some(Digest::Sha256),
            64 => Some(Digest::Sha512),
            _ => None,
        }
    }

    /// Construct a fresh streaming [`Hasher`] for this algorithm.
    pub fn hasher(&self) -> Hasher {
        match self {
            Digest::Md5 => Hasher::Md5(<md5::Md5 as digest::Digest>::new()),
            Digest::Sha1 => Hasher::Sha1(<sha1::Sha1 as digest::Digest>::new()),
            Digest::Sha256 => {
                Hasher::Sha256(<sha2::Sha256 as digest::Digest>::new())
            }
            Digest::Sha512 => {
                Hasher::Sha512(<sha2::Sha512 as digest::Digest>::new())
            }
            Digest::Crc32 => Hasher::Crc32(crc32fast::Hasher::new()),
        }
    }

    /// Hash a complete in-memory buffer in one shot.
    pub fn hash(&self, buf: &[u8]) -> DigestValue {
        let mut h = self.hasher();
        h.update(buf);
        h.finish()
    }

    /// Hash the full contents of a reader, one shot, buffering internally.
    pub fn hash_reader<R: Read>(&self, reader: &mut R) -> DigestResult<DigestValue> {
        let mut h = self.hasher();
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = reader.read(&mut buf)?;
            if n == 0 {
                break;
            }
            h.update(&buf[..n]);
        }
        Ok(h.finish())
    }
}

impl std::str::FromStr for Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> DigestResult<Self> {
        match s.to_lowercase().as_str() {
            "md5" => Ok(Digest::Md5),
            "sha1" => Ok(Digest::Sha1),
            "sha256" => Ok(Digest::Sha256),
            "sha512" => Ok(Digest::Sha512),
            "crc32" => Ok(Digest::Crc32),
            _ => Err(DigestError::Unsupported(s.to_string())),
        }
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Digest::Md5 => write!(f, "MD5"),
            Digest::Sha1 => write!(f, "SHA1"),
            Digest::Sha256 => write!(f, "SHA256"),
            Digest::Sha512 => write!(f, "SHA512"),
            Digest::Crc32 => write!(f, "CRC32"),
        }
    }
}

/// A live streaming hash computation. Feed it bytes with [`update`](Hasher::update)
/// as they are read from disk, then call [`finish`](Hasher::finish) once.
pub enum Hasher {
    /// In-progress MD5 computation.
    Md5(md5::Md5),
    /// In-progress SHA-1 computation.
    Sha1(sha1::Sha1),
    /// In-progress SHA-256 computation.
    Sha256(sha2::Sha256),
    /// In-progress SHA-512 computation.
    Sha512(sha2::Sha512),
    /// In-progress CRC-32 computation.
    Crc32(crc32fast::Hasher),
}

impl Hasher {
    /// Feed another chunk of bytes into the computation.
    pub fn update(&mut self, buf: &[u8]) {
        use digest::Digest as _;
        match self {
            Hasher::Md5(h) => h.update(buf),
            Hasher::Sha1(h) => h.update(buf),
            Hasher::Sha256(h) => h.update(buf),
            Hasher::Sha512(h) => h.update(buf),
            Hasher::Crc32(h) => h.update(buf),
        }
    }

    /// Consume the hasher and produce the final digest value.
    pub fn finish(self) -> DigestValue {
        use digest::Digest as _;
        match self {
            Hasher::Md5(h) => DigestValue(h.finalize().to_vec()),
            Hasher::Sha1(h) => DigestValue(h.finalize().to_vec()),
            Hasher::Sha256(h) => DigestValue(h.finalize().to_vec()),
            Hasher::Sha512(h) => DigestValue(h.finalize().to_vec()),
            Hasher::Crc32(h) => DigestValue(h.finalize().to_be_bytes().to_vec()),
        }
    }
}

/// A fixed-length binary digest value. Its length implies its algorithm
/// (see [`Digest::from_size`]); equality and ordering are size-aware.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct DigestValue(Vec<u8>);

impl DigestValue {
    /// Wrap raw digest bytes. Does not validate that the length corresponds
    /// to a known algorithm; use [`Digest::from_size`] to check.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        DigestValue(bytes)
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Number of bytes in this digest.
    pub fn size(&self) -> usize {
        self.0.len()
    }

    /// The algorithm implied by this digest's length, if recognised.
    pub fn algorithm(&self) -> Option<Digest> {
        Digest::from_size(self.0.len())
    }

    /// Lowercase hex encoding of the digest bytes.
    pub fn to_hex(&self) -> String {
        hex_encode(&self.0)
    }

    /// Parse a lowercase (or uppercase) hex string into a digest value.
    pub fn from_hex(s: &str) -> DigestResult<Self> {
        Ok(DigestValue(hex_decode(s)?))
    }
}

impl fmt::Debug for DigestValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "DigestValue({})", self.to_hex())
    }
}

impl Ord for DigestValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for DigestValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Encode bytes as lowercase hex.
pub fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        use std::fmt::Write as _;
        let _ = write!(s, "{b:02x}");
        s
    })
}

/// Decode a hex string into bytes. Rejects odd-length input and any
/// non-hex character rather than returning a partial result.
pub fn hex_decode(s: &str) -> DigestResult<Vec<u8>> {
    let bytes = s.as_bytes();
    if bytes.len() % 2 != 0 {
        return Err(DigestError::OddLength);
    }
    let mut out = Vec::with_capacity(bytes.len() / 2);
    for chunk in bytes.chunks_exact(2) {
        let hi = hex_nibble(chunk[0])?;
        let lo = hex_nibble(chunk[1])?;
        out.push((hi << 4) | lo);
    }
    Ok(out)
}

fn hex_nibble(c: u8) -> DigestResult<u8> {
    match c {
        b'0'..=b'9' => Ok(c - b'0'),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'A'..=b'F' => Ok(c - b'A' + 10),
        _ => Err(DigestError::InvalidHexChar),
    }
}
