//! Declarations of the tables at the newest schema version.
//!
//! Migrations are frozen DDL and don't use these, but everything that reads
//! or writes rows at runtime builds its statements from here, and the schema
//! manager checks the on-disk tables against them after an upgrade.

use rusqlite::Connection;

use crate::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: &'static str,

    /// Generated columns are assigned by the database and never appear in an
    /// insert.
    pub generated: bool,
}

impl Column {
    const fn new(name: &'static str, sql_type: &'static str) -> Self {
        Self {
            name,
            sql_type,
            generated: false,
        }
    }

    const fn id(name: &'static str) -> Self {
        Self {
            name,
            sql_type: "INTEGER",
            generated: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
}

impl Table {
    pub fn column_names(&self) -> impl Iterator<Item = &'static str> {
        self.columns.iter().map(|column| column.name)
    }

    /// An `INSERT` of every non-generated column, in declaration order.
    pub(crate) fn insert_sql(&self) -> String {
        let columns: Vec<&str> = self
            .columns
            .iter()
            .filter(|column| !column.generated)
            .map(|column| column.name)
            .collect();

        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.name,
            columns.join(", "),
            vec!["?"; columns.len()].join(", ")
        )
    }

    /// A `SELECT` of every column, to which a `WHERE` clause can be appended.
    pub(crate) fn select_sql(&self) -> String {
        format!(
            "SELECT {} FROM {}",
            self.column_names().collect::<Vec<_>>().join(", "),
            self.name
        )
    }
}

pub const VERSION: Table = Table {
    name: "version",
    columns: &[Column::new("version", "INTEGER")],
};

pub const CHANGES: Table = Table {
    name: "changes",
    columns: &[
        Column::id("changeid"),
        Column::new("author", "TEXT"),
        Column::new("comments", "TEXT"),
        Column::new("is_dir", "SMALLINT"),
        Column::new("branch", "TEXT"),
        Column::new("revision", "TEXT"),
        Column::new("revlink", "TEXT"),
        Column::new("when_timestamp", "INTEGER"),
        Column::new("category", "TEXT"),
        Column::new("repository", "TEXT"),
        Column::new("project", "TEXT"),
    ],
};

pub const CHANGE_FILES: Table = Table {
    name: "change_files",
    columns: &[
        Column::new("changeid", "INTEGER"),
        Column::new("filename", "TEXT"),
    ],
};

pub const CHANGE_LINKS: Table = Table {
    name: "change_links",
    columns: &[
        Column::new("changeid", "INTEGER"),
        Column::new("link", "TEXT"),
    ],
};

pub const PATCHES: Table = Table {
    name: "patches",
    columns: &[
        Column::id("id"),
        Column::new("patchlevel", "INTEGER"),
        Column::new("patch_base64", "TEXT"),
        Column::new("subdir", "TEXT"),
    ],
};

pub const SOURCESTAMPS: Table = Table {
    name: "sourcestamps",
    columns: &[
        Column::id("id"),
        Column::new("branch", "TEXT"),
        Column::new("revision", "TEXT"),
        Column::new("patchid", "INTEGER"),
        Column::new("repository", "TEXT"),
        Column::new("project", "TEXT"),
    ],
};

pub const SOURCESTAMP_CHANGES: Table = Table {
    name: "sourcestamp_changes",
    columns: &[
        Column::new("sourcestampid", "INTEGER"),
        Column::new("changeid", "INTEGER"),
    ],
};

pub const TABLES: &[&Table] = &[
    &VERSION,
    &CHANGES,
    &CHANGE_FILES,
    &CHANGE_LINKS,
    &PATCHES,
    &SOURCESTAMPS,
    &SOURCESTAMP_CHANGES,
];

/// Checks that every declared table exists with every declared column, and
/// that the column types agree. Extra columns in the database are ignored.
pub(crate) fn verify(conn: &Connection, tables: &[&Table]) -> Result<(), Error> {
    for table in tables {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table.name))?;
        let actual = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>("name")?, row.get::<_, String>("type")?))
            })?
            .collect::<Result<Vec<(String, String)>, rusqlite::Error>>()?;

        for column in table.columns {
            let matches = actual.iter().any(|(name, sql_type)| {
                name == column.name && sql_type.eq_ignore_ascii_case(column.sql_type)
            });

            if !matches {
                return Err(Error::ModelMismatch {
                    table: table.name,
                    column: column.name,
                });
            }
        }
    }

    Ok(())
}
