use std::{
    fmt,
    sync::{PoisonError, RwLock},
};

use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Transaction, TransactionBehavior};

use crate::{
    dbspec::{Backend, DbSpec},
    model::{self, Table},
    Error,
};

type Pool = r2d2::Pool<SqliteConnectionManager>;

/// Owns the connection pool for one database.
///
/// Every read and write goes through [`Connector::run`] or
/// [`Connector::run_in_transaction`], each of which borrows a single pooled
/// connection for the duration of the unit of work.
pub struct Connector {
    spec: DbSpec,
    pool: RwLock<Option<Pool>>,
}

impl Connector {
    pub fn new(spec: DbSpec) -> Self {
        Self {
            spec,
            pool: RwLock::new(None),
        }
    }

    pub fn spec(&self) -> &DbSpec {
        &self.spec
    }

    /// The tables the store expects once the schema is fully upgraded.
    pub fn model(&self) -> &'static [&'static Table] {
        model::TABLES
    }

    /// Builds the connection pool and checks that the database can actually
    /// be reached. Calling this on a started connector does nothing.
    pub fn start(&self) -> Result<(), Error> {
        let mut guard = self.pool.write().unwrap_or_else(PoisonError::into_inner);
        if guard.is_some() {
            return Ok(());
        }

        let busy_timeout = self.spec.busy_timeout();
        let manager = match self.spec.backend() {
            Backend::Sqlite { path } => {
                log::debug!("opening sqlite database at {}", path.display());
                SqliteConnectionManager::file(path)
            }
        }
        .with_init(move |conn| {
            conn.busy_timeout(busy_timeout)?;
            conn.execute_batch("PRAGMA foreign_keys = ON;")
        });

        let pool = r2d2::Pool::builder()
            .max_size(self.spec.max_connections())
            .min_idle(Some(0))
            .connection_timeout(self.spec.connect_timeout())
            .build(manager)?;

        // Building the pool doesn't open anything when min_idle is zero, so
        // make sure we can get at least one connection.
        drop(pool.get()?);

        *guard = Some(pool);
        Ok(())
    }

    /// Releases the pool. Connections currently borrowed by a unit of work
    /// are closed once that work completes. Safe to call at any time.
    pub fn stop(&self) {
        if self
            .pool
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
        {
            log::debug!("connection pool released");
        }
    }

    pub fn is_started(&self) -> bool {
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Runs `f` against a single pooled connection.
    pub fn run<F, T>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<T, Error>,
    {
        let mut conn = self.pool()?.get()?;
        f(&mut *conn)
    }

    /// Runs `f` inside a transaction on a single pooled connection. The
    /// transaction is committed if `f` succeeds and rolled back otherwise.
    pub fn run_in_transaction<F, T>(&self, f: F) -> Result<T, Error>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, Error>,
    {
        self.run(|conn| {
            let txn = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let result = f(&txn)?;
            txn.commit()?;

            Ok(result)
        })
    }

    fn pool(&self) -> Result<Pool, Error> {
        self.pool
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| Error::ConnectorUnavailable(String::from("connector is not started")))
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("spec", &self.spec)
            .field("started", &self.is_started())
            .finish()
    }
}

impl Drop for Connector {
    fn drop(&mut self) {
        self.stop();
    }
}
