use std::{fmt, path::Path};

use buildmaster_db_snapshot::Candidates;
use derive_more::{Display, From, Into};
use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::{
    model::{self, Table},
    Error,
};

use super::migrations;

/// A schema generation. Version 0 is an empty database.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, From, Into)]
pub struct Version(u32);

/// What a migration step can see beyond the database itself.
#[derive(Debug)]
pub struct StepContext<'a> {
    /// The build master's base directory, where legacy files live.
    pub basedir: &'a Path,

    /// Encodings to try when recovering legacy text.
    pub candidates: &'a Candidates,
}

pub type Apply = fn(&Transaction<'_>, &StepContext<'_>) -> Result<(), Error>;

/// One forward-only schema change, taking the database from `version - 1` to
/// `version`.
pub struct MigrationStep {
    version: Version,
    description: &'static str,
    apply: Apply,
}

impl MigrationStep {
    pub fn new(version: u32, description: &'static str, apply: Apply) -> Self {
        Self {
            version: Version(version),
            description,
            apply,
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn description(&self) -> &'static str {
        self.description
    }

    pub(crate) fn apply(&self, txn: &Transaction<'_>, ctx: &StepContext<'_>) -> Result<(), Error> {
        (self.apply)(txn, ctx)
    }
}

impl fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationStep")
            .field("version", &self.version)
            .field("description", &self.description)
            .finish()
    }
}

/// The ordered list of migration steps, and the persisted record of how many
/// of them have been applied.
#[derive(Debug)]
pub struct Registry {
    steps: Vec<MigrationStep>,
    model: Option<&'static [&'static Table]>,
}

impl Default for Registry {
    /// The migrations for the build master schema. After these have run, the
    /// database is expected to match [`model::TABLES`].
    fn default() -> Self {
        Self {
            steps: migrations::steps(),
            model: Some(model::TABLES),
        }
    }
}

impl Registry {
    /// Builds a registry from custom steps, which must be numbered 1, 2, 3...
    /// in order.
    pub fn new(steps: Vec<MigrationStep>) -> Result<Self, Error> {
        for (idx, step) in steps.iter().enumerate() {
            if u32::from(step.version) as usize != idx + 1 {
                return Err(Error::InvalidRegistry(format!(
                    "step {} has version {}; expected {}",
                    idx,
                    step.version,
                    idx + 1
                )));
            }
        }

        Ok(Self { steps, model: None })
    }

    /// Sets the tables the database must match once every step has been
    /// applied.
    pub fn with_model(mut self, tables: &'static [&'static Table]) -> Self {
        self.model = Some(tables);
        self
    }

    pub fn model(&self) -> Option<&'static [&'static Table]> {
        self.model
    }

    /// The newest version this registry can produce.
    pub fn target_version(&self) -> Version {
        self.steps
            .last()
            .map(|step| step.version)
            .unwrap_or(Version(0))
    }

    /// The steps needed to take a database at `current` to the target
    /// version, in the order they must be applied.
    pub fn pending_steps(&self, current: Version) -> &[MigrationStep] {
        let start = self
            .steps
            .iter()
            .position(|step| step.version > current)
            .unwrap_or_else(|| self.steps.len());

        &self.steps[start..]
    }

    /// Reads the persisted version. A database without a version table is at
    /// version 0.
    pub fn current_version(conn: &Connection) -> Result<Version, Error> {
        let exists: bool = conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = ?",
            [model::VERSION.name],
            |row| row.get(0),
        )?;
        if !exists {
            return Ok(Version(0));
        }

        let version: Option<u32> = conn
            .query_row(
                &format!("SELECT version FROM {} LIMIT 1", model::VERSION.name),
                [],
                |row| row.get(0),
            )
            .optional()?;

        Ok(Version(version.unwrap_or(0)))
    }

    /// Persists `version` as the current version. This should happen in the
    /// same transaction as the step that produced it.
    pub(crate) fn set_version(conn: &Connection, version: Version) -> Result<(), Error> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {} (version INTEGER NOT NULL)",
            model::VERSION.name
        ))?;

        let updated = conn.execute(
            &format!("UPDATE {} SET version = ?", model::VERSION.name),
            params![u32::from(version)],
        )?;
        if updated == 0 {
            conn.execute(
                &format!("INSERT INTO {} (version) VALUES (?)", model::VERSION.name),
                params![u32::from(version)],
            )?;
        }

        Ok(())
    }
}
