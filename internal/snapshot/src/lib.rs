//! The legacy change snapshot format.
//!
//! Before changes were kept in the database, the build master serialised its
//! whole change history into a single snapshot file. This package reads and
//! writes that format, and recovers the text fields that were stored as bytes
//! of unknown encoding. Importing the changes into the database is the job of
//! `buildmaster-db-store`.

use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter, Read, Write},
    path::Path,
};

mod change;
pub use change::{LegacyChange, LegacyText, Recovered};

pub mod encoding;
pub use encoding::{Candidates, DecodeError, Encoding};

mod error;
pub use error::Error;

mod v1;

/// The name of the snapshot file within a build master's base directory.
pub const FILE_NAME: &str = "changes.snapshot";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub changes: Vec<LegacyChange>,
}

impl Snapshot {
    pub fn new(changes: Vec<LegacyChange>) -> Self {
        Self { changes }
    }

    pub fn read_from<R>(reader: R) -> Result<Self, Error>
    where
        R: Read,
    {
        Ok(Self {
            changes: v1::deserialize_from(reader)?,
        })
    }

    /// Loads the snapshot at the given path, returning `None` if there is no
    /// file there.
    pub fn load<P>(path: P) -> Result<Option<Self>, Error>
    where
        P: AsRef<Path>,
    {
        let file = match File::open(path.as_ref()) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshot = Self::read_from(BufReader::new(file))?;
        log::debug!(
            "loaded {} legacy changes from {}",
            snapshot.changes.len(),
            path.as_ref().display()
        );

        Ok(Some(snapshot))
    }

    pub fn write_to<W>(&self, writer: W) -> Result<(), Error>
    where
        W: Write,
    {
        v1::serialize_into(writer, &self.changes)
    }

    /// Writes the snapshot to the given path. The data is written to a
    /// sibling temporary file first and renamed into place.
    pub fn save<P>(&self, path: P) -> Result<(), Error>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let mut tmp = path.as_os_str().to_os_string();
        tmp.push(".tmp");

        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            self.write_to(&mut writer)?;
            writer.flush()?;
        }

        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Rewrites every byte field as text, using the given candidates to
    /// decode them. Returns the number of fields that were rewritten.
    ///
    /// Nothing is modified if any field cannot be decoded.
    pub fn recode(&mut self, candidates: &Candidates) -> Result<usize, Error> {
        let recovered = self
            .changes
            .iter()
            .enumerate()
            .map(|(index, change)| change.recover(index, candidates))
            .collect::<Result<Vec<Recovered>, Error>>()?;

        let mut rewritten = 0;
        for (change, recovered) in self.changes.iter_mut().zip(recovered.into_iter()) {
            if let LegacyText::Bytes(_) = change.who {
                change.who = LegacyText::Text(recovered.author);
                rewritten += 1;
            }
            if let LegacyText::Bytes(_) = change.comments {
                change.comments = LegacyText::Text(recovered.comments);
                rewritten += 1;
            }
        }

        Ok(rewritten)
    }
}
