//! v1 is the envelope the old change manager wrote: a version byte followed
//! by the bincode encoded changes. `bincode` requires that the data types be
//! exactly the same for deserialisation, so [`LegacyChange`] must not change
//! shape without introducing a v2.

use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::{Error, LegacyChange};

pub(crate) const VERSION: u8 = 1;

#[derive(Deserialize, Serialize)]
struct Ser {
    version: u8,
    changes: Vec<u8>,
}

pub(crate) fn deserialize_from<R>(reader: R) -> Result<Vec<LegacyChange>, Error>
where
    R: Read,
{
    let ser: Ser = bincode::deserialize_from(reader)?;

    if ser.version != VERSION {
        return Err(Error::UnknownSerialisationVersion(ser.version));
    }

    Ok(bincode::deserialize(&ser.changes)?)
}

pub(crate) fn serialize_into<W>(writer: W, changes: &[LegacyChange]) -> Result<(), Error>
where
    W: Write,
{
    let ser = Ser {
        version: VERSION,
        changes: bincode::serialize(changes)?,
    };

    Ok(bincode::serialize_into(writer, &ser)?)
}
