use std::collections::BTreeSet;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rusqlite::{params, Connection, OptionalExtension};

use crate::{
    model::{PATCHES, SOURCESTAMPS, SOURCESTAMP_CHANGES},
    Connector, Error, NewSourceStamp, Patch, SourceStamp, ID,
};

impl Connector {
    /// Creates a source stamp, along with its patch (if any) and its links to
    /// existing changes, as a single transaction. Returns the new source stamp
    /// ID.
    ///
    /// Every change ID must already exist; if one doesn't, the whole insert
    /// is rolled back and [`Error::ReferentialIntegrity`] is returned.
    pub fn create_source_stamp(&self, stamp: &NewSourceStamp) -> Result<ID, Error> {
        self.run_in_transaction(|txn| {
            let patch_id: Option<ID> = match &stamp.patch {
                Some(patch) => Some(txn.prepare_cached(&PATCHES.insert_sql())?.insert(params![
                    patch.level,
                    STANDARD.encode(&patch.body),
                    patch.subdir,
                ])?),
                None => None,
            };

            let id = txn
                .prepare_cached(&SOURCESTAMPS.insert_sql())?
                .insert(params![
                    stamp.branch,
                    stamp.revision,
                    patch_id,
                    stamp.repository,
                    stamp.project,
                ])?;

            // The links are a set; repeating a change ID doesn't add a row.
            let change_ids: BTreeSet<ID> = stamp.change_ids.iter().copied().collect();
            let mut stmt = txn.prepare_cached(&SOURCESTAMP_CHANGES.insert_sql())?;
            for change_id in change_ids {
                stmt.execute(params![id, change_id])?;
            }

            log::debug!(
                "created source stamp {} with {} changes{}",
                id,
                stamp.change_ids.len(),
                if patch_id.is_some() { " and a patch" } else { "" }
            );
            Ok(id)
        })
    }

    pub fn get_source_stamp(&self, id: ID) -> Result<Option<SourceStamp>, Error> {
        self.run(|conn| get_source_stamp(conn, id))
    }
}

fn get_source_stamp(conn: &Connection, id: ID) -> Result<Option<SourceStamp>, Error> {
    let row = conn
        .prepare_cached(&format!("{} WHERE id = ?", SOURCESTAMPS.select_sql()))?
        .query_row([id], |row| {
            Ok((
                SourceStamp {
                    id: row.get("id")?,
                    branch: row.get("branch")?,
                    revision: row.get("revision")?,
                    patch: None,
                    repository: row.get("repository")?,
                    project: row.get("project")?,
                    change_ids: Vec::new(),
                },
                row.get::<_, Option<ID>>("patchid")?,
            ))
        })
        .optional()?;

    let (mut stamp, patch_id) = match row {
        Some(row) => row,
        None => return Ok(None),
    };

    if let Some(patch_id) = patch_id {
        stamp.patch = Some(get_patch(conn, patch_id)?);
    }

    let mut stmt = conn.prepare_cached(&format!(
        "SELECT changeid FROM {} WHERE sourcestampid = ? ORDER BY changeid",
        SOURCESTAMP_CHANGES.name
    ))?;
    stamp.change_ids = stmt
        .query_map([id], |row| row.get(0))?
        .collect::<Result<Vec<ID>, rusqlite::Error>>()?;

    Ok(Some(stamp))
}

fn get_patch(conn: &Connection, id: ID) -> Result<Patch, Error> {
    let (level, encoded, subdir) = conn
        .prepare_cached(&format!("{} WHERE id = ?", PATCHES.select_sql()))?
        .query_row([id], |row| {
            Ok((
                row.get::<_, i64>("patchlevel")?,
                row.get::<_, String>("patch_base64")?,
                row.get::<_, Option<String>>("subdir")?,
            ))
        })?;

    Ok(Patch {
        id,
        level,
        body: STANDARD.decode(encoded)?,
        subdir,
    })
}
