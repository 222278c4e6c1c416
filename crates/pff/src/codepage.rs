//! ## ANSI codepages
//!
//! `PtypString8` values are stored in whatever 8-bit codepage the client used. The handle
//! carries one active [Codepage] and applies it whenever such a value is decoded.

use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodepageError {
    #[error("Cannot resolve codepage: {0:?}")]
    Unresolved(String),
    #[error("Unsupported codepage identifier: {0}")]
    UnsupportedId(u32),
    #[error("No decoder available for codepage {0}")]
    DecoderUnavailable(u16),
    #[error("Malformed {0} string")]
    Malformed(Codepage),
}

pub type CodepageResult<T> = Result<T, CodepageError>;

/// Codepages accepted for ANSI string decoding.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Default, Debug)]
pub enum Codepage {
    /// US-ASCII, identifier 20127
    Ascii,
    /// Thai
    Windows874,
    /// Japanese Shift-JIS
    Windows932,
    /// Simplified Chinese GBK
    Windows936,
    /// Korean
    Windows949,
    /// Traditional Chinese Big5
    Windows950,
    /// Central European
    Windows1250,
    /// Cyrillic
    Windows1251,
    /// Western European
    #[default]
    Windows1252,
    /// Greek
    Windows1253,
    /// Turkish
    Windows1254,
    /// Hebrew
    Windows1255,
    /// Arabic
    Windows1256,
    /// Baltic
    Windows1257,
    /// Vietnamese
    Windows1258,
}

impl Codepage {
    pub const ALL: [Codepage; 15] = [
        Codepage::Ascii,
        Codepage::Windows874,
        Codepage::Windows932,
        Codepage::Windows936,
        Codepage::Windows949,
        Codepage::Windows950,
        Codepage::Windows1250,
        Codepage::Windows1251,
        Codepage::Windows1252,
        Codepage::Windows1253,
        Codepage::Windows1254,
        Codepage::Windows1255,
        Codepage::Windows1256,
        Codepage::Windows1257,
        Codepage::Windows1258,
    ];

    /// Windows codepage identifier.
    pub fn id(self) -> u16 {
        match self {
            Codepage::Ascii => 20127,
            Codepage::Windows874 => 874,
            Codepage::Windows932 => 932,
            Codepage::Windows936 => 936,
            Codepage::Windows949 => 949,
            Codepage::Windows950 => 950,
            Codepage::Windows1250 => 1250,
            Codepage::Windows1251 => 1251,
            Codepage::Windows1252 => 1252,
            Codepage::Windows1253 => 1253,
            Codepage::Windows1254 => 1254,
            Codepage::Windows1255 => 1255,
            Codepage::Windows1256 => 1256,
            Codepage::Windows1257 => 1257,
            Codepage::Windows1258 => 1258,
        }
    }

    /// Canonical name, as accepted by [FromStr].
    pub fn name(self) -> &'static str {
        match self {
            Codepage::Ascii => "ascii",
            Codepage::Windows874 => "cp874",
            Codepage::Windows932 => "cp932",
            Codepage::Windows936 => "cp936",
            Codepage::Windows949 => "cp949",
            Codepage::Windows950 => "cp950",
            Codepage::Windows1250 => "cp1250",
            Codepage::Windows1251 => "cp1251",
            Codepage::Windows1252 => "cp1252",
            Codepage::Windows1253 => "cp1253",
            Codepage::Windows1254 => "cp1254",
            Codepage::Windows1255 => "cp1255",
            Codepage::Windows1256 => "cp1256",
            Codepage::Windows1257 => "cp1257",
            Codepage::Windows1258 => "cp1258",
        }
    }

    /// Decode an 8-bit string. A trailing NUL terminator, if present, is dropped.
    pub fn decode(self, buffer: &[u8]) -> CodepageResult<String> {
        let buffer = match buffer.split_last() {
            Some((0, rest)) => rest,
            _ => buffer,
        };

        match self {
            Codepage::Ascii => Ok(buffer
                .iter()
                .map(|&b| if b.is_ascii() { char::from(b) } else { '\u{FFFD}' })
                .collect()),
            _ => {
                let coding = codepage_strings::Coding::new(self.id())
                    .map_err(|_| CodepageError::DecoderUnavailable(self.id()))?;
                coding
                    .decode(buffer)
                    .map(|value| value.to_string())
                    .map_err(|_| CodepageError::Malformed(self))
            }
        }
    }
}

impl fmt::Display for Codepage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl TryFrom<u32> for Codepage {
    type Error = CodepageError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Codepage::ALL
            .into_iter()
            .find(|codepage| u32::from(codepage.id()) == value)
            .ok_or(CodepageError::UnsupportedId(value))
    }
}

impl FromStr for Codepage {
    type Err = CodepageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_lowercase();
        if matches!(name.as_str(), "ascii" | "us-ascii") {
            return Ok(Codepage::Ascii);
        }

        let digits = name
            .strip_prefix("cp")
            .or_else(|| name.strip_prefix("windows-"))
            .unwrap_or(&name);
        digits
            .parse::<u32>()
            .ok()
            .and_then(|id| Codepage::try_from(id).ok())
            .ok_or_else(|| CodepageError::Unresolved(s.to_string()))
    }
}

impl From<Codepage> for u16 {
    fn from(value: Codepage) -> Self {
        value.id()
    }
}
