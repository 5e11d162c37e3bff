//! Imports the changes from a legacy snapshot into the version 1 tables.
//!
//! The statements here are written against the version 1 schema and must not
//! change along with the model.

use std::time::SystemTime;

use buildmaster_db_snapshot::{Candidates, Snapshot};
use rusqlite::{params, Connection};

use crate::{sql, Error, ID};

/// Inserts every change in the snapshot, in order, so that change IDs ascend
/// in snapshot order. Returns the number of changes imported.
///
/// This is expected to run inside the migration transaction: if any change
/// fails to decode, the error is returned and the caller rolls everything
/// back.
pub(crate) fn import_snapshot(
    conn: &Connection,
    snapshot: &Snapshot,
    candidates: &Candidates,
) -> Result<usize, Error> {
    let mut change_stmt = conn.prepare(
        "
        INSERT INTO
            changes
        (author, comments, is_dir, branch, revision, revlink, when_timestamp, category)
        VALUES
        (?, ?, ?, ?, ?, ?, ?, ?)
        ",
    )?;
    let mut file_stmt = conn.prepare("INSERT INTO change_files (changeid, filename) VALUES (?, ?)")?;
    let mut link_stmt = conn.prepare("INSERT INTO change_links (changeid, link) VALUES (?, ?)")?;

    let now = SystemTime::now();
    for (index, change) in snapshot.changes.iter().enumerate() {
        // Recover everything before writing anything for this change.
        let recovered = change.recover(index, candidates)?;

        let id: ID = change_stmt.insert(params![
            recovered.author,
            recovered.comments,
            change.is_dir,
            change.branch,
            change.revision,
            change.revlink,
            sql::from_time(change.when.as_ref().unwrap_or(&now)),
            change.category,
        ])?;

        for file in change.files.iter() {
            file_stmt.execute(params![id, file])?;
        }
        for link in change.links.iter() {
            link_stmt.execute(params![id, link])?;
        }

        log::trace!("imported legacy change {} as change {}", index, id);
    }

    Ok(snapshot.changes.len())
}
