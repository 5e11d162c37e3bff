use thiserror::Error;

use crate::encoding::DecodeError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("cannot decode {field} of legacy change {change}: {source}")]
    Decode {
        change: usize,
        field: &'static str,
        #[source]
        source: DecodeError,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialisation error: {0:?}")]
    Serialisation(#[from] bincode::Error),

    #[error("unknown encoding: {0}")]
    UnknownEncoding(String),

    #[error("unknown serialised data version: {0}")]
    UnknownSerialisationVersion(u8),
}
