use rusqlite::{params, Connection, OptionalExtension};

use crate::{
    model::{CHANGES, CHANGE_FILES, CHANGE_LINKS},
    sql, Change, Connector, Error, NewChange, ID,
};

impl Connector {
    /// Inserts a change, along with its files and links, returning the new
    /// change ID.
    pub fn add_change(&self, change: &NewChange) -> Result<ID, Error> {
        self.run_in_transaction(|txn| {
            let id = txn.prepare_cached(&CHANGES.insert_sql())?.insert(params![
                change.author,
                change.comments,
                change.is_dir,
                change.branch,
                change.revision,
                change.revlink,
                sql::from_time(&change.when),
                change.category,
                change.repository,
                change.project,
            ])?;

            let mut stmt = txn.prepare_cached(&CHANGE_FILES.insert_sql())?;
            for file in change.files.iter() {
                stmt.execute(params![id, file])?;
            }

            let mut stmt = txn.prepare_cached(&CHANGE_LINKS.insert_sql())?;
            for link in change.links.iter() {
                stmt.execute(params![id, link])?;
            }

            log::trace!("added change {} by {}", id, &change.author);
            Ok(id)
        })
    }

    pub fn get_change(&self, id: ID) -> Result<Option<Change>, Error> {
        self.run(|conn| get_change(conn, id))
    }

    /// Returns the highest change ID in the store, if any.
    pub fn last_change_id(&self) -> Result<Option<ID>, Error> {
        self.run(|conn| {
            Ok(conn.query_row(
                &format!("SELECT MAX(changeid) FROM {}", CHANGES.name),
                [],
                |row| row.get(0),
            )?)
        })
    }
}

fn get_change(conn: &Connection, id: ID) -> Result<Option<Change>, Error> {
    let change = conn
        .prepare_cached(&format!("{} WHERE changeid = ?", CHANGES.select_sql()))?
        .query_row([id], |row| {
            Ok(Change {
                id: row.get("changeid")?,
                author: row.get("author")?,
                files: Vec::new(),
                comments: row.get("comments")?,
                is_dir: row.get("is_dir")?,
                branch: row.get("branch")?,
                revision: row.get("revision")?,
                revlink: row.get("revlink")?,
                when: sql::into_time(row.get("when_timestamp")?),
                category: row.get("category")?,
                repository: row.get("repository")?,
                project: row.get("project")?,
                links: Vec::new(),
            })
        })
        .optional()?;

    let mut change = match change {
        Some(change) => change,
        None => return Ok(None),
    };

    change.files = strings_for_change(conn, CHANGE_FILES.name, "filename", id)?;
    change.links = strings_for_change(conn, CHANGE_LINKS.name, "link", id)?;

    Ok(Some(change))
}

/// Returns one column of a change's child rows, in insertion order.
fn strings_for_change(
    conn: &Connection,
    table: &str,
    column: &str,
    id: ID,
) -> Result<Vec<String>, Error> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {} FROM {} WHERE changeid = ? ORDER BY rowid",
        column, table
    ))?;
    let values = stmt
        .query_map([id], |row| row.get(0))?
        .collect::<Result<Vec<String>, rusqlite::Error>>()?;

    Ok(values)
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;
    use crate::test_support::upgraded_connector;

    #[test]
    fn test_add_and_get_change() -> anyhow::Result<()> {
        let (_dir, connector) = upgraded_connector()?;

        let mut change = NewChange::new("warner", UNIX_EPOCH + Duration::from_secs(266738404));
        change.comments = String::from("fix the frobnicator");
        change.files = vec!["master/README.txt".into(), "slave/README.txt".into()];
        change.branch = Some("trunk".into());
        change.revision = Some("0e92a098b".into());
        change.revlink = Some("http://buildbot.net/rev/0e92a098b".into());
        change.category = Some("devel".into());
        change.repository = "git://warner".into();
        change.project = "Buildbot".into();
        change.links = vec!["http://example.com/review/1".into()];

        let id = connector.add_change(&change)?;
        let got = connector.get_change(id)?.expect("change should exist");

        assert_eq!(got.id, id);
        assert_eq!(got.author, change.author);
        assert_eq!(got.comments, change.comments);
        assert_eq!(got.files, change.files);
        assert_eq!(got.is_dir, false);
        assert_eq!(got.branch, change.branch);
        assert_eq!(got.revision, change.revision);
        assert_eq!(got.revlink, change.revlink);
        assert_eq!(got.when, change.when);
        assert_eq!(got.category, change.category);
        assert_eq!(got.repository, change.repository);
        assert_eq!(got.project, change.project);
        assert_eq!(got.links, change.links);

        Ok(())
    }

    #[test]
    fn test_ids_ascend() -> anyhow::Result<()> {
        let (_dir, connector) = upgraded_connector()?;
        assert_eq!(connector.last_change_id()?, None);

        let first = connector.add_change(&NewChange::new("one", UNIX_EPOCH))?;
        let second = connector.add_change(&NewChange::new("two", UNIX_EPOCH))?;

        assert!(second > first);
        assert_eq!(connector.last_change_id()?, Some(second));
        assert_eq!(connector.get_change(second + 1)?, None);

        Ok(())
    }
}
