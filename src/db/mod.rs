pub mod models;
pub mod queries;

use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Current schema generation, stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i32 = 1;

/// Handle to the library store. Owned by the top-level process and passed
/// by reference into the scanner and query paths.
pub struct Database {
    pub conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Run a bounded optimize pass, then release the connection.
    pub fn close(self) -> Result<()> {
        self.conn.pragma_update(None, "analysis_limit", 400)?;
        self.conn.execute_batch("PRAGMA optimize;")?;
        self.conn.close().map_err(|(_, e)| DbError::from(e))
    }

    fn init(&self) -> Result<()> {
        // WAL mode; the process is the only writer
        self.conn.pragma_update(None, "journal_mode", "WAL")?;
        self.conn.pragma_update(None, "synchronous", "NORMAL")?;
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        self.migrate()?;
        Ok(())
    }

    /// Stored schema generation (0 for a store that predates versioning).
    pub fn schema_version(&self) -> Result<i32> {
        Ok(self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?)
    }

    fn migrate(&self) -> Result<()> {
        let version = self.schema_version()?;

        if version < 1 {
            self.migrate_v1()?;
        }

        self.conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
        Ok(())
    }

    /// V1: albums + tracks
    fn migrate_v1(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS albums (
                id              INTEGER PRIMARY KEY,
                album_artist    TEXT NOT NULL DEFAULT '',
                name            TEXT NOT NULL DEFAULT '',
                year            INTEGER NOT NULL DEFAULT 0
            );

            -- Album triple identity
            CREATE UNIQUE INDEX IF NOT EXISTS idx_albums_triple
                ON albums(album_artist, name, year);
            CREATE INDEX IF NOT EXISTS idx_albums_year ON albums(year);

            CREATE TABLE IF NOT EXISTS tracks (
                id              INTEGER PRIMARY KEY,
                album_id        INTEGER NOT NULL REFERENCES albums(id),
                disc            INTEGER NOT NULL DEFAULT 0,
                track_number    INTEGER NOT NULL DEFAULT 0,
                path            TEXT NOT NULL UNIQUE
            );

            CREATE INDEX IF NOT EXISTS idx_tracks_album ON tracks(album_id);
            ",
        )?;
        Ok(())
    }
}
