//! Persistent build master state: changes, patches and source stamps in a
//! relational database, along with the machinery to create and upgrade its
//! schema.

mod changes;

mod connector;
pub use connector::Connector;

mod dbspec;
pub use dbspec::{Backend, DbSpec};

mod error;
pub use error::Error;

pub mod model;
pub mod schema;

mod sourcestamps;
mod sql;

mod types;
pub use types::*;

#[cfg(test)]
mod test_support {
    use tempfile::TempDir;

    use crate::{schema::Manager, Connector, DbSpec};

    /// A started connector on an empty database in a fresh directory.
    pub(crate) fn started_connector() -> anyhow::Result<(TempDir, Connector)> {
        let dir = tempfile::tempdir()?;
        let connector = Connector::new(DbSpec::sqlite(dir.path().join("state.sqlite")));
        connector.start()?;

        Ok((dir, connector))
    }

    /// A started connector on a database upgraded to the newest schema.
    pub(crate) fn upgraded_connector() -> anyhow::Result<(TempDir, Connector)> {
        let (dir, connector) = started_connector()?;
        Manager::new(&connector, dir.path()).upgrade()?;

        Ok((dir, connector))
    }
}
