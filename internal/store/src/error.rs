use std::io;

use buildmaster_db_snapshot::DecodeError;
use rusqlite::ErrorCode;
use thiserror::Error;

use crate::schema::Version;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Base64(#[from] base64::DecodeError),

    #[error("database connector unavailable: {0}")]
    ConnectorUnavailable(String),

    #[error("cannot decode {field} of legacy change {change}: {source}")]
    Decode {
        change: usize,
        field: &'static str,
        #[source]
        source: DecodeError,
    },

    #[error("invalid migration registry: {0}")]
    InvalidRegistry(String),

    #[error("invalid database URL: {0:?}")]
    InvalidUrl(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("migration to schema version {version} failed: {source}")]
    MigrationStep {
        version: Version,
        #[source]
        source: Box<Error>,
    },

    #[error("table {table} does not match the model at column {column}")]
    ModelMismatch {
        table: &'static str,
        column: &'static str,
    },

    #[error("referential integrity error: {0}")]
    ReferentialIntegrity(String),

    #[error(transparent)]
    Rusqlite(rusqlite::Error),

    #[error("database schema version {current} is newer than the newest known version {target}")]
    SchemaTooNew { current: Version, target: Version },

    #[error(transparent)]
    Snapshot(buildmaster_db_snapshot::Error),

    #[error("unsupported database backend: {0}")]
    UnsupportedBackend(String),
}

impl Error {
    /// Returns true if the error originated in recovering the text of a
    /// legacy change, rather than in the database itself.
    pub fn is_decode(&self) -> bool {
        matches!(self, Error::Decode { .. })
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, msg)
                if failure.code == ErrorCode::ConstraintViolation =>
            {
                Self::ReferentialIntegrity(
                    msg.clone().unwrap_or_else(|| failure.to_string()),
                )
            }
            _ => Self::Rusqlite(err),
        }
    }
}

impl From<r2d2::Error> for Error {
    fn from(err: r2d2::Error) -> Self {
        Self::ConnectorUnavailable(err.to_string())
    }
}

impl From<buildmaster_db_snapshot::Error> for Error {
    fn from(err: buildmaster_db_snapshot::Error) -> Self {
        match err {
            buildmaster_db_snapshot::Error::Decode {
                change,
                field,
                source,
            } => Self::Decode {
                change,
                field,
                source,
            },
            err => Self::Snapshot(err),
        }
    }
}
