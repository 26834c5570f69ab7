/// An album row read from the database. Detached copy, no link back to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Album {
    pub id: i64,
    pub album_artist: String,
    pub name: String,
    /// 0 when unknown
    pub year: i32,
}

/// Album candidate produced by tag extraction, not yet resolved against the store.
/// `(album_artist, name, year)` is the album's identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewAlbum {
    pub album_artist: String,
    pub name: String,
    pub year: i32,
}

/// Data for inserting a track (scan phase).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewTrack {
    pub disc: i32,
    pub track_number: i32,
    pub path: String,
}

/// A track row read from the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub id: i64,
    pub album_id: i64,
    pub disc: i32,
    pub track_number: i32,
    pub path: String,
}

/// Row counts for the `stats` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LibraryStats {
    pub albums: i64,
    pub tracks: i64,
}
