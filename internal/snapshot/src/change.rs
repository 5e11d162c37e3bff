use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::{encoding::Candidates, Error};

/// A string field as it was stored in a legacy snapshot: either raw bytes of
/// unknown encoding, or text that was already decoded when it was written.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub enum LegacyText {
    Bytes(Vec<u8>),
    Text(String),
}

impl LegacyText {
    pub fn recover(&self, candidates: &Candidates) -> Result<String, crate::DecodeError> {
        match self {
            LegacyText::Bytes(bytes) => candidates.decode(bytes),
            LegacyText::Text(text) => Ok(text.clone()),
        }
    }
}

impl Default for LegacyText {
    fn default() -> Self {
        LegacyText::Text(String::new())
    }
}

impl From<&str> for LegacyText {
    fn from(s: &str) -> Self {
        LegacyText::Text(s.to_string())
    }
}

impl From<String> for LegacyText {
    fn from(s: String) -> Self {
        LegacyText::Text(s)
    }
}

impl From<&[u8]> for LegacyText {
    fn from(bytes: &[u8]) -> Self {
        LegacyText::Bytes(bytes.to_vec())
    }
}

impl From<Vec<u8>> for LegacyText {
    fn from(bytes: Vec<u8>) -> Self {
        LegacyText::Bytes(bytes)
    }
}

/// A change as recorded by the pre-database change manager.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct LegacyChange {
    pub who: LegacyText,
    pub files: Vec<String>,
    pub comments: LegacyText,
    pub is_dir: bool,
    pub branch: Option<String>,
    pub revision: Option<String>,
    pub revlink: Option<String>,
    pub when: Option<SystemTime>,
    pub category: Option<String>,
    pub links: Vec<String>,
}

/// The text fields of a [`LegacyChange`] after encoding recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovered {
    pub author: String,
    pub comments: String,
}

impl LegacyChange {
    /// Recovers every text field of the change. `index` is the position of
    /// the change within its snapshot, and is only used for error reporting.
    pub fn recover(&self, index: usize, candidates: &Candidates) -> Result<Recovered, Error> {
        let field = |field: &'static str, text: &LegacyText| {
            text.recover(candidates).map_err(|source| Error::Decode {
                change: index,
                field,
                source,
            })
        };

        Ok(Recovered {
            author: field("who", &self.who)?,
            comments: field("comments", &self.comments)?,
        })
    }
}
