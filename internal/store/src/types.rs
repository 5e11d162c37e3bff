//! Types mapping to the database tables.
//!
//! The `New*` types are the inputs to the insert operations; the others are
//! what the read operations return.

use std::time::SystemTime;

pub type ID = i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub id: ID,
    pub author: String,
    pub files: Vec<String>,
    pub comments: String,
    pub is_dir: bool,
    pub branch: Option<String>,
    pub revision: Option<String>,
    pub revlink: Option<String>,
    pub when: SystemTime,
    pub category: Option<String>,
    pub repository: String,
    pub project: String,
    pub links: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChange {
    pub author: String,
    pub files: Vec<String>,
    pub comments: String,
    pub is_dir: bool,
    pub branch: Option<String>,
    pub revision: Option<String>,
    pub revlink: Option<String>,
    pub when: SystemTime,
    pub category: Option<String>,
    pub repository: String,
    pub project: String,
    pub links: Vec<String>,
}

impl NewChange {
    pub fn new<S>(author: S, when: SystemTime) -> Self
    where
        S: Into<String>,
    {
        Self {
            author: author.into(),
            files: Vec::new(),
            comments: String::new(),
            is_dir: false,
            branch: None,
            revision: None,
            revlink: None,
            when,
            category: None,
            repository: String::new(),
            project: String::new(),
            links: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub id: ID,
    pub level: i64,
    pub body: Vec<u8>,
    pub subdir: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPatch {
    pub body: Vec<u8>,
    pub level: i64,
    pub subdir: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceStamp {
    pub id: ID,
    pub branch: Option<String>,
    pub revision: Option<String>,
    pub patch: Option<Patch>,
    pub repository: String,
    pub project: String,
    pub change_ids: Vec<ID>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewSourceStamp {
    pub branch: Option<String>,
    pub revision: Option<String>,
    pub repository: String,
    pub project: String,
    pub change_ids: Vec<ID>,
    pub patch: Option<NewPatch>,
}
