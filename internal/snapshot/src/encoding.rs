//! Recovery of text from legacy byte strings.
//!
//! Legacy snapshots stored author names and comments as raw bytes with no
//! record of how they were encoded. Most of them are UTF-8, but some
//! installations wrote other encodings. Decoding is attempted against an
//! explicit, ordered list of candidates; the first one that decodes cleanly
//! wins. There is deliberately no lossy fallback.

use std::{fmt, str::FromStr};

use thiserror::Error;

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    Utf8,

    /// UTF-16 with an optional byte order mark. Without a BOM the data is
    /// assumed to be little endian. The BOM is not part of the result.
    Utf16,

    Utf16Le,
    Utf16Be,

    /// ISO-8859-1. Every byte sequence is valid Latin-1, so this should only
    /// ever be supplied as an explicit hint.
    Latin1,
}

impl Encoding {
    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Utf16 => "utf-16",
            Encoding::Utf16Le => "utf-16le",
            Encoding::Utf16Be => "utf-16be",
            Encoding::Latin1 => "latin-1",
        }
    }

    /// Decodes the given bytes, returning `None` if they are not well formed
    /// in this encoding.
    pub fn decode(&self, bytes: &[u8]) -> Option<String> {
        match self {
            Encoding::Utf8 => std::str::from_utf8(bytes).ok().map(String::from),
            Encoding::Utf16 => match bytes {
                [0xff, 0xfe, rest @ ..] => decode_utf16(rest, Endian::Little),
                [0xfe, 0xff, rest @ ..] => decode_utf16(rest, Endian::Big),
                _ => decode_utf16(bytes, Endian::Little),
            },
            Encoding::Utf16Le => decode_utf16(bytes, Endian::Little),
            Encoding::Utf16Be => decode_utf16(bytes, Endian::Big),
            Encoding::Latin1 => Some(bytes.iter().map(|b| char::from(*b)).collect()),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Encoding {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalised: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();

        match normalised.as_str() {
            "utf8" | "u8" => Ok(Encoding::Utf8),
            "utf16" | "u16" => Ok(Encoding::Utf16),
            "utf16le" => Ok(Encoding::Utf16Le),
            "utf16be" => Ok(Encoding::Utf16Be),
            "latin1" | "l1" | "iso88591" => Ok(Encoding::Latin1),
            _ => Err(Error::UnknownEncoding(s.to_string())),
        }
    }
}

#[derive(Clone, Copy)]
enum Endian {
    Big,
    Little,
}

fn decode_utf16(bytes: &[u8], endian: Endian) -> Option<String> {
    if bytes.len() % 2 != 0 {
        return None;
    }

    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| match endian {
            Endian::Big => u16::from_be_bytes([pair[0], pair[1]]),
            Endian::Little => u16::from_le_bytes([pair[0], pair[1]]),
        })
        .collect();

    String::from_utf16(&units).ok()
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{bytes:?} is not valid in any of {tried:?}")]
pub struct DecodeError {
    pub bytes: Vec<u8>,
    pub tried: Vec<Encoding>,
}

/// An ordered list of encodings to try.
///
/// The default list only contains UTF-8.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidates(Vec<Encoding>);

impl Default for Candidates {
    fn default() -> Self {
        Self(vec![Encoding::Utf8])
    }
}

impl Candidates {
    pub fn new<I>(encodings: I) -> Self
    where
        I: IntoIterator<Item = Encoding>,
    {
        encodings
            .into_iter()
            .fold(Self(Vec::new()), |candidates, encoding| {
                candidates.with_hint(encoding)
            })
    }

    /// Appends an encoding to try after the existing candidates.
    pub fn with_hint(mut self, encoding: Encoding) -> Self {
        if !self.0.contains(&encoding) {
            self.0.push(encoding);
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Encoding> {
        self.0.iter()
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<String, DecodeError> {
        self.0
            .iter()
            .find_map(|encoding| encoding.decode(bytes))
            .ok_or_else(|| DecodeError {
                bytes: bytes.to_vec(),
                tried: self.0.clone(),
            })
    }
}
