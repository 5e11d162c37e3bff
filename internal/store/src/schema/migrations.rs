//! The build master schema, one function per version.
//!
//! These are historical: once released, a step must never change, since
//! databases in the wild have already applied it.

use buildmaster_db_snapshot::Snapshot;
use rusqlite::Transaction;

use crate::Error;

use super::{
    import,
    registry::{MigrationStep, StepContext},
};

pub(crate) fn steps() -> Vec<MigrationStep> {
    vec![
        MigrationStep::new(1, "changes, and import of the legacy snapshot", v1),
        MigrationStep::new(2, "patches and source stamps", v2),
        MigrationStep::new(3, "repository and project tracking", v3),
    ]
}

fn v1(txn: &Transaction<'_>, ctx: &StepContext<'_>) -> Result<(), Error> {
    txn.execute_batch(
        "
        CREATE TABLE changes (
            changeid INTEGER PRIMARY KEY AUTOINCREMENT,
            author TEXT NOT NULL,
            comments TEXT NOT NULL,
            is_dir SMALLINT NOT NULL,
            branch TEXT,
            revision TEXT,
            revlink TEXT,
            when_timestamp INTEGER NOT NULL,
            category TEXT
        );

        CREATE TABLE change_files (
            changeid INTEGER NOT NULL REFERENCES changes (changeid),
            filename TEXT NOT NULL
        );

        CREATE TABLE change_links (
            changeid INTEGER NOT NULL REFERENCES changes (changeid),
            link TEXT NOT NULL
        );
        ",
    )?;

    let path = ctx.basedir.join(buildmaster_db_snapshot::FILE_NAME);
    match Snapshot::load(&path)? {
        Some(snapshot) => {
            let imported = import::import_snapshot(txn, &snapshot, ctx.candidates)?;
            log::info!("imported {} changes from {}", imported, path.display());
        }
        None => log::debug!("no legacy snapshot at {}", path.display()),
    }

    Ok(())
}

fn v2(txn: &Transaction<'_>, _ctx: &StepContext<'_>) -> Result<(), Error> {
    Ok(txn.execute_batch(
        "
        CREATE TABLE patches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            patchlevel INTEGER NOT NULL,
            patch_base64 TEXT NOT NULL,
            subdir TEXT
        );

        CREATE TABLE sourcestamps (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            branch TEXT,
            revision TEXT,
            patchid INTEGER REFERENCES patches (id)
        );

        CREATE TABLE sourcestamp_changes (
            sourcestampid INTEGER NOT NULL REFERENCES sourcestamps (id),
            changeid INTEGER NOT NULL REFERENCES changes (changeid),
            PRIMARY KEY (sourcestampid, changeid)
        );
        ",
    )?)
}

fn v3(txn: &Transaction<'_>, _ctx: &StepContext<'_>) -> Result<(), Error> {
    Ok(txn.execute_batch(
        "
        ALTER TABLE changes ADD COLUMN repository TEXT NOT NULL DEFAULT '';
        ALTER TABLE changes ADD COLUMN project TEXT NOT NULL DEFAULT '';

        ALTER TABLE sourcestamps ADD COLUMN repository TEXT NOT NULL DEFAULT '';
        ALTER TABLE sourcestamps ADD COLUMN project TEXT NOT NULL DEFAULT '';

        CREATE INDEX changes_branch ON changes (branch);
        CREATE INDEX changes_when_timestamp ON changes (when_timestamp);
        CREATE INDEX sourcestamp_changes_changeid ON sourcestamp_changes (changeid);
        ",
    )?)
}
