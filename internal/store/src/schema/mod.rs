//! Schema upgrades.
//!
//! [`Manager::upgrade`] takes a database from whatever version it is at to
//! the newest version the [`Registry`] knows about. Each step runs in its own
//! transaction together with the version bump that records it, so an upgrade
//! that fails (or crashes) part way through resumes from the last completed
//! step when it is run again.

use std::path::{Path, PathBuf};

use buildmaster_db_snapshot::{Candidates, Encoding};

use crate::{model, Connector, Error};

mod import;
mod migrations;

mod registry;
pub use registry::{Apply, MigrationStep, Registry, StepContext, Version};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Uninitialized,
    Checking,
    Applying(Version),
    UpToDate,
    Failed,
}

#[derive(Debug)]
pub struct Manager<'a> {
    connector: &'a Connector,
    registry: Registry,
    basedir: PathBuf,
    candidates: Candidates,
    state: State,
}

impl<'a> Manager<'a> {
    /// Creates a manager for the built in schema. Legacy files are looked for
    /// in `basedir`.
    pub fn new<P>(connector: &'a Connector, basedir: P) -> Self
    where
        P: AsRef<Path>,
    {
        Self {
            connector,
            registry: Registry::default(),
            basedir: basedir.as_ref().to_path_buf(),
            candidates: Candidates::default(),
            state: State::Uninitialized,
        }
    }

    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    /// Adds an encoding to try when legacy text isn't valid UTF-8.
    pub fn with_encoding_hint(mut self, encoding: Encoding) -> Self {
        self.candidates = self.candidates.with_hint(encoding);
        self
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn current_version(&self) -> Result<Version, Error> {
        self.connector.run(|conn| Registry::current_version(conn))
    }

    pub fn target_version(&self) -> Version {
        self.registry.target_version()
    }

    /// Applies every pending step. Calling this on an up to date database
    /// does nothing.
    ///
    /// Errors decoding legacy data are returned as [`Error::Decode`];
    /// anything else that goes wrong inside a step is wrapped in
    /// [`Error::MigrationStep`].
    pub fn upgrade(&mut self) -> Result<(), Error> {
        self.state = State::Checking;

        let result = self.apply_pending();
        if result.is_err() {
            self.state = State::Failed;
        }

        result
    }

    fn apply_pending(&mut self) -> Result<(), Error> {
        let current = self.current_version()?;
        let target = self.registry.target_version();
        if current > target {
            return Err(Error::SchemaTooNew { current, target });
        }

        let pending = self.registry.pending_steps(current);
        if pending.is_empty() {
            log::debug!("database schema is up to date at version {}", current);
            self.state = State::UpToDate;
            return Ok(());
        }

        log::info!(
            "upgrading database schema from version {} to {}",
            current,
            target
        );

        let ctx = StepContext {
            basedir: &self.basedir,
            candidates: &self.candidates,
        };

        let expected = self.registry.model();
        for step in pending {
            let version = step.version();
            self.state = State::Applying(version);
            log::info!("applying schema version {}: {}", version, step.description());

            self.connector
                .run_in_transaction(|txn| {
                    step.apply(txn, &ctx)?;
                    Registry::set_version(txn, version)?;

                    // The last step doesn't commit unless the result matches
                    // the model.
                    match expected {
                        Some(tables) if version == target => model::verify(txn, tables),
                        _ => Ok(()),
                    }
                })
                .map_err(|err| step_error(version, err))?;
        }

        log::info!("database schema upgraded to version {}", target);
        self.state = State::UpToDate;
        Ok(())
    }
}

fn step_error(version: Version, err: Error) -> Error {
    match err {
        Error::Decode { .. } | Error::ConnectorUnavailable(_) => err,
        err => Error::MigrationStep {
            version,
            source: Box::new(err),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, time::UNIX_EPOCH};

    use buildmaster_db_snapshot::{LegacyChange, Snapshot};
    use rusqlite::Transaction;

    use super::*;
    use crate::{dbspec::DbSpec, test_support::started_connector, NewSourceStamp};

    const SNOWMAN: &str = "Frosty the \u{2603}";

    fn utf16_with_bom(s: &str) -> Vec<u8> {
        let mut bytes = vec![0xff, 0xfe];
        for unit in s.encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        bytes
    }

    fn write_snapshot(basedir: &Path, who: Vec<u8>, comments: Vec<u8>) -> anyhow::Result<()> {
        Snapshot::new(vec![LegacyChange {
            who: who.into(),
            files: vec!["foo".into()],
            comments: comments.into(),
            branch: Some("b1".into()),
            revision: Some("12345".into()),
            when: Some(UNIX_EPOCH),
            ..Default::default()
        }])
        .save(basedir.join(buildmaster_db_snapshot::FILE_NAME))?;

        Ok(())
    }

    fn table_count(connector: &Connector, table: &str) -> Result<i64, Error> {
        connector.run(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
                [table],
                |row| row.get(0),
            )?)
        })
    }

    #[test]
    fn test_upgrade_empty() -> anyhow::Result<()> {
        let (dir, connector) = started_connector()?;
        let mut manager = Manager::new(&connector, dir.path());
        assert_eq!(manager.state(), State::Uninitialized);
        assert_eq!(manager.current_version()?, Version::from(0));

        manager.upgrade()?;

        assert_eq!(manager.state(), State::UpToDate);
        assert_eq!(manager.current_version()?, manager.target_version());
        for table in connector.model() {
            assert_eq!(table_count(&connector, table.name)?, 1, "{}", table.name);
        }

        Ok(())
    }

    #[test]
    fn test_upgrade_is_idempotent() -> anyhow::Result<()> {
        let (dir, connector) = started_connector()?;
        Manager::new(&connector, dir.path()).upgrade()?;

        let id = connector.create_source_stamp(&NewSourceStamp::default())?;

        let mut manager = Manager::new(&connector, dir.path());
        manager.upgrade()?;
        manager.upgrade()?;

        assert_eq!(manager.state(), State::UpToDate);
        assert_eq!(manager.current_version()?, Version::from(3));
        assert!(connector.get_source_stamp(id)?.is_some());

        Ok(())
    }

    #[test]
    fn test_schema_too_new() -> anyhow::Result<()> {
        let (dir, connector) = started_connector()?;
        connector.run_in_transaction(|txn| Registry::set_version(txn, Version::from(42)))?;

        let mut manager = Manager::new(&connector, dir.path());
        assert!(matches!(
            manager.upgrade(),
            Err(Error::SchemaTooNew { current, .. }) if current == Version::from(42)
        ));
        assert_eq!(manager.state(), State::Failed);

        Ok(())
    }

    #[test]
    fn test_import_unicode_change() -> anyhow::Result<()> {
        let (dir, connector) = started_connector()?;
        write_snapshot(
            dir.path(),
            SNOWMAN.as_bytes().to_vec(),
            SNOWMAN.as_bytes().to_vec(),
        )?;

        Manager::new(&connector, dir.path()).upgrade()?;

        let change = connector.get_change(1)?.expect("change 1 should exist");
        assert_eq!(change.author, SNOWMAN);
        assert_eq!(change.comments, SNOWMAN);
        assert_eq!(change.files, vec![String::from("foo")]);
        assert_eq!(change.branch.as_deref(), Some("b1"));
        assert_eq!(change.revision.as_deref(), Some("12345"));
        assert_eq!(change.when, UNIX_EPOCH);
        assert_eq!(change.repository, "");

        Ok(())
    }

    #[test]
    fn test_import_ascii_change() -> anyhow::Result<()> {
        let (dir, connector) = started_connector()?;
        write_snapshot(
            dir.path(),
            b"Frosty the Snowman".to_vec(),
            b"Frosty the Snowman".to_vec(),
        )?;

        Manager::new(&connector, dir.path()).upgrade()?;

        let change = connector.get_change(1)?.expect("change 1 should exist");
        assert_eq!(change.author, "Frosty the Snowman");
        assert_eq!(change.comments, "Frosty the Snowman");

        Ok(())
    }

    #[test]
    fn test_import_text_fields_unchanged() -> anyhow::Result<()> {
        let (dir, connector) = started_connector()?;
        Snapshot::new(vec![
            LegacyChange {
                who: "first".into(),
                comments: SNOWMAN.into(),
                ..Default::default()
            },
            LegacyChange {
                who: "second".into(),
                links: vec!["http://example.com/1".into()],
                ..Default::default()
            },
        ])
        .save(dir.path().join(buildmaster_db_snapshot::FILE_NAME))?;

        Manager::new(&connector, dir.path()).upgrade()?;

        let first = connector.get_change(1)?.expect("change 1 should exist");
        let second = connector.get_change(2)?.expect("change 2 should exist");
        assert_eq!(first.author, "first");
        assert_eq!(first.comments, SNOWMAN);
        assert_eq!(second.author, "second");
        assert_eq!(second.links, vec![String::from("http://example.com/1")]);
        assert_eq!(connector.last_change_id()?, Some(2));

        Ok(())
    }

    #[test]
    fn test_import_non_unicode_change() -> anyhow::Result<()> {
        let (dir, connector) = started_connector()?;
        write_snapshot(dir.path(), b"\xff\xff\x00".to_vec(), b"\xff\xff\x00".to_vec())?;

        let mut manager = Manager::new(&connector, dir.path());
        match manager.upgrade() {
            Err(Error::Decode {
                change,
                field,
                source,
            }) => {
                assert_eq!(change, 0);
                assert_eq!(field, "who");
                assert_eq!(source.bytes, b"\xff\xff\x00".to_vec());
            }
            other => panic!("unexpected result: {:?}", other),
        }

        // The whole first step was rolled back.
        assert_eq!(manager.state(), State::Failed);
        assert_eq!(manager.current_version()?, Version::from(0));
        assert_eq!(table_count(&connector, "changes")?, 0);

        Ok(())
    }

    #[test]
    fn test_import_utf16_change() -> anyhow::Result<()> {
        let (dir, connector) = started_connector()?;
        write_snapshot(dir.path(), utf16_with_bom(SNOWMAN), utf16_with_bom(SNOWMAN))?;

        // Without a hint, this isn't UTF-8 and must not be imported.
        let mut manager = Manager::new(&connector, dir.path());
        let err = manager.upgrade().unwrap_err();
        assert!(err.is_decode(), "unexpected error: {:?}", err);
        assert_eq!(manager.current_version()?, Version::from(0));

        // With one, it is.
        Manager::new(&connector, dir.path())
            .with_encoding_hint(Encoding::Utf16)
            .upgrade()?;

        let change = connector.get_change(1)?.expect("change 1 should exist");
        assert_eq!(change.author, SNOWMAN);
        assert_eq!(change.comments, SNOWMAN);

        Ok(())
    }

    #[test]
    fn test_corrupt_snapshot() -> anyhow::Result<()> {
        let (dir, connector) = started_connector()?;
        fs::write(dir.path().join(buildmaster_db_snapshot::FILE_NAME), b"\x07")?;

        let err = Manager::new(&connector, dir.path()).upgrade().unwrap_err();
        assert!(
            matches!(
                &err,
                Error::MigrationStep { version, source }
                    if *version == Version::from(1) && matches!(**source, Error::Snapshot(_))
            ),
            "unexpected error: {:?}",
            err
        );

        Ok(())
    }

    fn create_a(txn: &Transaction<'_>, _ctx: &StepContext<'_>) -> Result<(), Error> {
        Ok(txn.execute_batch("CREATE TABLE a (x INTEGER)")?)
    }

    fn create_b_badly(txn: &Transaction<'_>, _ctx: &StepContext<'_>) -> Result<(), Error> {
        txn.execute_batch("CREATE TABLE b (x INTEGER)")?;
        Ok(txn.execute_batch("THIS IS NOT SQL")?)
    }

    fn create_b(txn: &Transaction<'_>, _ctx: &StepContext<'_>) -> Result<(), Error> {
        Ok(txn.execute_batch("CREATE TABLE b (x INTEGER)")?)
    }

    fn create_c(txn: &Transaction<'_>, _ctx: &StepContext<'_>) -> Result<(), Error> {
        Ok(txn.execute_batch("CREATE TABLE c (x INTEGER)")?)
    }

    #[test]
    fn test_resume_after_failure() -> anyhow::Result<()> {
        let (dir, connector) = started_connector()?;

        let broken = Registry::new(vec![
            MigrationStep::new(1, "a", create_a),
            MigrationStep::new(2, "b", create_b_badly),
            MigrationStep::new(3, "c", create_c),
        ])?;
        let mut manager = Manager::new(&connector, dir.path()).with_registry(broken);

        let err = manager.upgrade().unwrap_err();
        assert!(
            matches!(&err, Error::MigrationStep { version, .. } if *version == Version::from(2)),
            "unexpected error: {:?}",
            err
        );
        assert!(!err.is_decode());
        assert_eq!(manager.state(), State::Failed);
        assert_eq!(manager.current_version()?, Version::from(1));
        assert_eq!(table_count(&connector, "a")?, 1);
        assert_eq!(table_count(&connector, "b")?, 0);
        assert_eq!(table_count(&connector, "c")?, 0);

        // If step 1 were applied again, creating table a would fail.
        let fixed = Registry::new(vec![
            MigrationStep::new(1, "a", create_a),
            MigrationStep::new(2, "b", create_b),
            MigrationStep::new(3, "c", create_c),
        ])?;
        let mut manager = Manager::new(&connector, dir.path()).with_registry(fixed);

        manager.upgrade()?;
        assert_eq!(manager.state(), State::UpToDate);
        assert_eq!(manager.current_version()?, Version::from(3));
        assert_eq!(table_count(&connector, "b")?, 1);
        assert_eq!(table_count(&connector, "c")?, 1);

        Ok(())
    }

    #[test]
    fn test_model_mismatch() -> anyhow::Result<()> {
        let (dir, connector) = started_connector()?;
        let registry =
            Registry::new(vec![MigrationStep::new(1, "a", create_a)])?.with_model(model::TABLES);

        let err = Manager::new(&connector, dir.path())
            .with_registry(registry)
            .upgrade()
            .unwrap_err();
        assert!(
            matches!(
                &err,
                Error::MigrationStep { source, .. }
                    if matches!(**source, Error::ModelMismatch { .. })
            ),
            "unexpected error: {:?}",
            err
        );

        Ok(())
    }

    #[test]
    fn test_model_mismatch_is_not_recorded() -> anyhow::Result<()> {
        let (dir, connector) = started_connector()?;
        let registry = || -> Result<Registry, Error> {
            Ok(Registry::new(vec![
                MigrationStep::new(1, "a", create_a),
                MigrationStep::new(2, "b", create_b),
            ])?
            .with_model(model::TABLES))
        };

        for _ in 0..2 {
            let mut manager = Manager::new(&connector, dir.path()).with_registry(registry()?);
            let err = manager.upgrade().unwrap_err();
            assert!(
                matches!(
                    &err,
                    Error::MigrationStep { version, source }
                        if *version == Version::from(2)
                            && matches!(**source, Error::ModelMismatch { .. })
                ),
                "unexpected error: {:?}",
                err
            );
            assert_eq!(manager.state(), State::Failed);

            // Step 1 stays applied; step 2 is rolled back.
            assert_eq!(manager.current_version()?, Version::from(1));
            assert_eq!(table_count(&connector, "a")?, 1);
            assert_eq!(table_count(&connector, "b")?, 0);
        }

        Ok(())
    }

    #[test]
    fn test_connector_not_started() {
        let connector = Connector::new(DbSpec::sqlite("/nonexistent/state.sqlite"));
        let mut manager = Manager::new(&connector, "/nonexistent");

        assert!(matches!(
            manager.upgrade(),
            Err(Error::ConnectorUnavailable(_))
        ));
        assert_eq!(manager.state(), State::Failed);
    }
}
