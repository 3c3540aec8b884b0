//! Conversion between raw TextAsset payload bytes and the text that
//! locators and rules are matched against.
//!
//! The [`TextCodec::Escaped`] view renders the payload the way Python's
//! `unicode_escape` codec does: newlines, tabs, backslashes, control bytes
//! and every non-ASCII character become backslash escapes, so a whole asset
//! reads as a single ASCII line. Patch sets written against that view keep
//! working unchanged. [`TextCodec::Utf8`] matches against the payload text
//! as-is.

use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextCodec {
    /// Backslash-escaped ASCII view of the UTF-8 payload.
    #[default]
    Escaped,
    /// Plain UTF-8 text.
    Utf8,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    #[error("truncated \\{escape} escape at position {offset}")]
    TruncatedEscape { offset: usize, escape: char },

    #[error("escape at position {offset} names invalid code point U+{value:X}")]
    InvalidCodePoint { offset: usize, value: u32 },
}

impl TextCodec {
    /// Decode a payload into matchable text.
    pub fn decode(self, payload: &[u8]) -> Result<String, CodecError> {
        let text = std::str::from_utf8(payload)?;
        Ok(match self {
            TextCodec::Utf8 => text.to_string(),
            TextCodec::Escaped => escape(text),
        })
    }

    /// Encode (possibly rewritten) text back into payload bytes.
    pub fn encode(self, text: &str) -> Result<Vec<u8>, CodecError> {
        match self {
            TextCodec::Utf8 => Ok(text.as_bytes().to_vec()),
            TextCodec::Escaped => unescape(text).map(String::into_bytes),
        }
    }
}

impl fmt::Display for TextCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextCodec::Escaped => write!(f, "escaped"),
            TextCodec::Utf8 => write!(f, "utf8"),
        }
    }
}

impl FromStr for TextCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "escaped" | "unicode-escape" => Ok(TextCodec::Escaped),
            "utf8" | "utf-8" | "plain" => Ok(TextCodec::Utf8),
            other => Err(format!("unknown text codec '{other}' (expected escaped or utf8)")),
        }
    }
}

fn escape(text: &str) -> String {
    use std::fmt::Write as _;

    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ' '..='~' => out.push(c),
            c if (c as u32) < 0x100 => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c if (c as u32) < 0x10000 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => {
                let _ = write!(out, "\\U{:08x}", c as u32);
            }
        }
    }
    out
}

fn unescape(text: &str) -> Result<String, CodecError> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();

    while let Some((offset, c)) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }

        let Some((_, escape)) = chars.next() else {
            return Err(CodecError::TruncatedEscape {
                offset,
                escape: '\\',
            });
        };

        match escape {
            '\n' => {}
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\x0b'),
            '0'..='7' => {
                let mut value = escape.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|(_, d)| d.to_digit(8)) {
                        Some(d) => {
                            value = value * 8 + d;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.push(code_point(offset, value)?);
            }
            'x' | 'u' | 'U' => {
                let digits = match escape {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let mut value: u32 = 0;
                for _ in 0..digits {
                    let digit = chars
                        .next_if(|(_, d)| d.is_ascii_hexdigit())
                        .and_then(|(_, d)| d.to_digit(16))
                        .ok_or(CodecError::TruncatedEscape { offset, escape })?;
                    value = value * 16 + digit;
                }
                out.push(code_point(offset, value)?);
            }
            other => {
                // unknown escapes survive verbatim
                out.push('\\');
                out.push(other);
            }
        }
    }

    Ok(out)
}

fn code_point(offset: usize, value: u32) -> Result<char, CodecError> {
    char::from_u32(value).ok_or(CodecError::InvalidCodePoint { offset, value })
}
