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
 * Escaping for filenames and symlink targets stored in the digest file.
 *
 * A path may contain a literal newline, which the line-oriented digest-file
 * format cannot represent directly. [`encode`] turns such paths into a
 * backslash-escaped form; [`decode`] reverses it. Only `\n` and `\\` are
 * recognised escapes -- anything else, including a bare trailing backslash,
 * is rejected.
 */

/// Errors produced while decoding an escaped path.
#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum EscapeError {
    /// A backslash was followed by a character other than `n` or `\`.
    #[error("invalid escape sequence '\\{0}'")]
    InvalidEscape(char),
    /// The string ended with a lone backslash.
    #[error("trailing backslash with no escape character")]
    TrailingBackslash,
}

/// Decode `\n` to a literal newline and `\\` to a literal backslash. Any
/// other backslash sequence is a parse error.
pub fn decode(s: &str) -> Result<String, EscapeError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(other) => return Err(EscapeError::InvalidEscape(other)),
            None => return Err(EscapeError::TrailingBackslash),
        }
    }
    Ok(out)
}

/// Encode a path for storage in the digest file. Returns the encoded string
/// together with whether escaping was actually needed -- the caller uses
/// that signal to decide whether to emit the `\`-form marker.
pub fn encode(s: &str) -> (String, bool) {
    if !s.contains('\n') && !s.contains('\\') {
        return (s.to_string(), false);
    }
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    (out, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_plain() {
        let p = "plain/path.txt";
        let (enc, escaped) = encode(p);
        assert!(!escaped);
        assert_eq!(enc, p);
        assert_eq!(decode(&enc).unwrap(), p);
    }

    #[test]
    fn roundtrip_newline() {
        let p = "line1\nline2";
        let (enc, escaped) = encode(p);
        assert!(escaped);
        assert_eq!(enc, "line1\\nline2");
        assert_eq!(decode(&enc).unwrap(), p);
    }

    #[test]
    fn roundtrip_backslash() {
        let p = "dir\\file";
        let (enc, escaped) = encode(p);
        assert!(escaped);
        assert_eq!(decode(&enc).unwrap(), p);
    }

    #[test]
    fn decode_rejects_unknown_escape() {
        assert_eq!(
            decode("x\\a"),
            Err(EscapeError::InvalidEscape('a'))
        );
    }

    #[test]
    fn decode_rejects_trailing_backslash() {
        assert_eq!(decode("x\\"), Err(EscapeError::TrailingBackslash));
    }

    #[test]
    fn encode_reports_no_escaping_needed_iff_clean() {
        assert!(!encode("clean").1);
        assert!(encode("has\\backslash").1);
        assert!(encode("has\nnewline").1);
    }
}
