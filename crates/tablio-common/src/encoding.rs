//! Text encodings accepted for CSV files
//!
//! Uploads and downloads are byte streams in one of a small set of encodings.
//! Decoding is strict: a malformed byte sequence is an error, never replaced.

use std::borrow::Cow;

use encoding_rs::{Encoding, SHIFT_JIS, UTF_8};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TablioError};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Encoding of a CSV byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(try_from = "String", into = "String")]
pub enum TextEncoding {
    #[default]
    Utf8,
    ShiftJis,
    /// Microsoft's Shift_JIS superset (Windows-31J)
    Cp932,
}

impl TextEncoding {
    /// Charset label used in `Content-Type` headers
    pub fn label(self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::ShiftJis => "shift_jis",
            TextEncoding::Cp932 => "cp932",
        }
    }

    /// The `encoding_rs` codec backing this encoding.
    ///
    /// The WHATWG `Shift_JIS` decoder already implements the Windows-31J
    /// extensions, so both Japanese variants share one codec.
    pub fn codec(self) -> &'static Encoding {
        match self {
            TextEncoding::Utf8 => UTF_8,
            TextEncoding::ShiftJis | TextEncoding::Cp932 => SHIFT_JIS,
        }
    }

    /// Decode bytes, failing on any malformed sequence
    pub fn decode(self, bytes: &[u8]) -> Result<Cow<'_, str>> {
        self.codec()
            .decode_without_bom_handling_and_without_replacement(bytes)
            .ok_or(TablioError::Decode {
                encoding: self.label(),
            })
    }

    /// Encode text, failing when a character has no mapping in the target encoding
    pub fn encode(self, text: &str) -> Result<Cow<'_, [u8]>> {
        if self == TextEncoding::Utf8 {
            return Ok(Cow::Borrowed(text.as_bytes()));
        }
        let (bytes, _, had_unmappable) = self.codec().encode(text);
        if had_unmappable {
            return Err(TablioError::Encode {
                encoding: self.label(),
            });
        }
        Ok(bytes)
    }

    /// Strip a leading UTF-8 byte order mark, if any
    pub fn strip_bom(self, bytes: &[u8]) -> &[u8] {
        match self {
            TextEncoding::Utf8 => bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes),
            _ => bytes,
        }
    }
}

impl std::str::FromStr for TextEncoding {
    type Err = TablioError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(TextEncoding::Utf8),
            "sjis" | "s-jis" | "shift_jis" | "shift-jis" => Ok(TextEncoding::ShiftJis),
            "cp932" | "windows-31j" | "ms932" => Ok(TextEncoding::Cp932),
            _ => Err(TablioError::UnknownEncoding(s.to_string())),
        }
    }
}

impl TryFrom<String> for TextEncoding {
    type Error = TablioError;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TextEncoding> for String {
    fn from(value: TextEncoding) -> Self {
        value.label().to_string()
    }
}

impl std::fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}
