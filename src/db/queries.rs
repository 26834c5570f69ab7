use super::models::{Album, LibraryStats, NewAlbum, NewTrack, Track};
use super::{Database, Result};
use rusqlite::{params, Row};

const ALBUM_COLUMNS: &str = "id, album_artist, name, year";

fn album_from_row(row: &Row<'_>) -> rusqlite::Result<Album> {
    Ok(Album {
        id: row.get(0)?,
        album_artist: row.get(1)?,
        name: row.get(2)?,
        year: row.get(3)?,
    })
}

fn sql_order(ascending: bool) -> &'static str {
    if ascending { "ASC" } else { "DESC" }
}

impl Database {
    // --- Albums ---

    /// Look up an album by its identity triple.
    pub fn find_album_id(&self, album: &NewAlbum) -> Result<Option<i64>> {
        let result = self.conn.query_row(
            "SELECT id FROM albums WHERE album_artist = ?1 AND name = ?2 AND year = ?3",
            params![album.album_artist, album.name, album.year],
            |row| row.get(0),
        );

        match result {
            Ok(id) => Ok(Some(id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Insert an album row. Returns the new id.
    pub fn insert_album(&self, album: &NewAlbum) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO albums (album_artist, name, year) VALUES (?1, ?2, ?3)",
            params![album.album_artist, album.name, album.year],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn album(&self, id: i64) -> Result<Option<Album>> {
        let result = self.conn.query_row(
            &format!("SELECT {ALBUM_COLUMNS} FROM albums WHERE id = ?1"),
            params![id],
            album_from_row,
        );

        match result {
            Ok(album) => Ok(Some(album)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn album_ids(&self) -> Result<Vec<i64>> {
        let mut stmt = self.conn.prepare("SELECT id FROM albums ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Delete every album no track points at. Returns the number removed.
    pub fn remove_empty_albums(&self) -> Result<usize> {
        let removed = self.conn.execute(
            "DELETE FROM albums
             WHERE id NOT IN (SELECT DISTINCT album_id FROM tracks)",
            [],
        )?;
        Ok(removed)
    }

    fn query_albums(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Album>> {
        let mut stmt = self.conn.prepare(sql)?;
        let albums = stmt
            .query_map(params, album_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(albums)
    }

    /// All albums, shuffled by SQLite on every call.
    pub fn random_albums(&self) -> Result<Vec<Album>> {
        self.query_albums(
            &format!("SELECT {ALBUM_COLUMNS} FROM albums ORDER BY RANDOM()"),
            [],
        )
    }

    /// A single random album, `None` when the library is empty.
    pub fn one_random_album(&self) -> Result<Option<Album>> {
        let result = self.conn.query_row(
            &format!("SELECT {ALBUM_COLUMNS} FROM albums ORDER BY RANDOM() LIMIT 1"),
            [],
            album_from_row,
        );

        match result {
            Ok(album) => Ok(Some(album)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn albums_by_artist(&self, ascending: bool) -> Result<Vec<Album>> {
        self.query_albums(
            &format!(
                "SELECT {ALBUM_COLUMNS} FROM albums ORDER BY album_artist {}",
                sql_order(ascending)
            ),
            [],
        )
    }

    pub fn albums_by_year(&self, ascending: bool) -> Result<Vec<Album>> {
        self.query_albums(
            &format!(
                "SELECT {ALBUM_COLUMNS} FROM albums ORDER BY year {}",
                sql_order(ascending)
            ),
            [],
        )
    }

    /// Case-insensitive substring match on album name or album artist.
    /// Case folding is Unicode-aware and the text matches literally (no wildcards).
    /// Always ordered by artist then name.
    pub fn search_albums(&self, text: &str) -> Result<Vec<Album>> {
        // SQLite's LIKE only folds ASCII letters, so the match runs here
        let needle = text.to_lowercase();
        let albums = self.query_albums(
            &format!("SELECT {ALBUM_COLUMNS} FROM albums ORDER BY album_artist ASC, name ASC"),
            [],
        )?;
        Ok(albums
            .into_iter()
            .filter(|a| {
                a.name.to_lowercase().contains(&needle)
                    || a.album_artist.to_lowercase().contains(&needle)
            })
            .collect())
    }

    /// Albums with `lo <= year <= hi`, ordered by year, artist, name.
    pub fn albums_in_years(&self, lo: i32, hi: i32) -> Result<Vec<Album>> {
        self.query_albums(
            &format!(
                "SELECT {ALBUM_COLUMNS} FROM albums
                 WHERE year BETWEEN ?1 AND ?2
                 ORDER BY year ASC, album_artist ASC, name ASC"
            ),
            params![lo, hi],
        )
    }

    /// Albums from exactly one year, ordered by artist, name.
    pub fn albums_from_year(&self, year: i32) -> Result<Vec<Album>> {
        self.query_albums(
            &format!(
                "SELECT {ALBUM_COLUMNS} FROM albums
                 WHERE year = ?1
                 ORDER BY album_artist ASC, name ASC"
            ),
            params![year],
        )
    }

    // --- Tracks ---

    pub fn find_track(&self, path: &str) -> Result<Option<Track>> {
        let result = self.conn.query_row(
            "SELECT id, album_id, disc, track_number, path FROM tracks WHERE path = ?1",
            params![path],
            |row| {
                Ok(Track {
                    id: row.get(0)?,
                    album_id: row.get(1)?,
                    disc: row.get(2)?,
                    track_number: row.get(3)?,
                    path: row.get(4)?,
                })
            },
        );

        match result {
            Ok(track) => Ok(Some(track)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Insert a track bound to `album_id`. Returns the new id.
    pub fn insert_track(&self, album_id: i64, t: &NewTrack) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO tracks (album_id, disc, track_number, path) VALUES (?1, ?2, ?3, ?4)",
            params![album_id, t.disc, t.track_number, t.path],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Delete the track stored under `path`. Returns whether a row was removed.
    pub fn delete_track(&self, path: &str) -> Result<bool> {
        let removed = self
            .conn
            .execute("DELETE FROM tracks WHERE path = ?1", params![path])?;
        Ok(removed > 0)
    }

    /// Track paths of one album in playback order: track number first, then disc.
    pub fn album_track_paths(&self, album_id: i64) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT path FROM tracks
             WHERE album_id = ?1
             ORDER BY track_number ASC, disc ASC",
        )?;
        let paths = stmt
            .query_map(params![album_id], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(paths)
    }

    /// Every stored track path, unordered.
    pub fn all_track_paths(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT path FROM tracks")?;
        let paths = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(paths)
    }

    /// Get library statistics.
    pub fn stats(&self) -> Result<LibraryStats> {
        let albums: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM albums", [], |row| row.get(0))?;
        let tracks: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tracks", [], |row| row.get(0))?;
        Ok(LibraryStats { albums, tracks })
    }
}
