//! SQLite backing for the identifier allocator, plus insert-conflict
//! classification for the creation flows.

use rusqlite::{Connection, OptionalExtension};

use crate::idgen::{EntityKind, KeyedStore};

/// Identifier-keyed view over one workspace table. The kind→table mapping
/// is closed: adding an entity kind means adding an arm here.
pub struct SqliteKeys<'a> {
    conn: &'a Connection,
    table: &'static str,
}

impl<'a> SqliteKeys<'a> {
    pub fn for_kind(conn: &'a Connection, kind: EntityKind) -> Self {
        let table = match kind {
            EntityKind::Student => "students",
            EntityKind::Teacher => "teachers",
        };
        SqliteKeys { conn, table }
    }
}

impl KeyedStore for SqliteKeys<'_> {
    fn max_key_with_prefix(&self, prefix: &str) -> anyhow::Result<Option<String>> {
        // Zero-padded sequences make lexicographic order numeric order, so
        // MAX over the LIKE range is the latest issued identifier.
        let sql = format!(
            "SELECT id FROM {} WHERE id LIKE ?1 || '%' ORDER BY id DESC LIMIT 1",
            self.table
        );
        self.conn
            .query_row(&sql, [prefix], |r| r.get(0))
            .optional()
            .map_err(Into::into)
    }

    fn exists(&self, key: &str) -> anyhow::Result<bool> {
        let sql = format!("SELECT 1 FROM {} WHERE id = ?1", self.table);
        self.conn
            .query_row(&sql, [key], |r| r.get::<_, i64>(0))
            .optional()
            .map(|v| v.is_some())
            .map_err(Into::into)
    }
}

/// Outcome of a claiming insert, separated so callers can re-run allocation
/// on a lost uniqueness race without inspecting driver error codes
/// themselves.
#[derive(Debug)]
pub enum InsertError {
    /// Another writer claimed the key between our existence check and this
    /// insert.
    Conflict,
    Db(rusqlite::Error),
}

pub fn classify_insert(e: rusqlite::Error) -> InsertError {
    if let rusqlite::Error::SqliteFailure(f, _) = &e {
        if f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            || f.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
        {
            return InsertError::Conflict;
        }
    }
    InsertError::Db(e)
}
