pub mod metadata;

use crate::db::Database;
use crate::SUPPORTED_EXTENSIONS;
use metadata::{MetadataError, TagReader};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Database error: {0}")]
    Db(#[from] crate::db::DbError),
    #[error(transparent)]
    Metadata(#[from] MetadataError),
    #[error("Stopped at {path} after {processed} files: {source}")]
    Aborted {
        path: PathBuf,
        processed: usize,
        #[source]
        source: Box<ScanError>,
    },
}

pub type Result<T> = std::result::Result<T, ScanError>;

/// What to do when a single file can't be indexed.
/// Database errors stop the scan under either policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    #[default]
    Abort,
    Continue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    Added,
    Skipped,
}

/// A file that could not be indexed.
#[derive(Debug)]
pub struct PathFailure {
    pub path: PathBuf,
    pub error: ScanError,
}

#[derive(Debug, Default)]
pub struct ScanReport {
    pub scanned: usize,
    pub added: usize,
    pub skipped: usize,
    pub failures: Vec<PathFailure>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TidyReport {
    pub checked: usize,
    pub removed_tracks: usize,
    pub removed_albums: usize,
}

/// True when the extension is one we index (case-insensitive).
pub fn is_audio_file(path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();
    SUPPORTED_EXTENSIONS.contains(&ext.as_str())
}

/// Every regular audio file under `root`, in file-name order per directory.
pub fn find_audio_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut audio_files = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        if entry.file_type().is_file() && is_audio_file(entry.path()) {
            audio_files.push(entry.into_path());
        }
    }

    Ok(audio_files)
}

/// Index one file: skip if its path is already known, otherwise read its tags,
/// resolve (or create) its album, and insert the track.
pub fn add_path(db: &Database, reader: &dyn TagReader, path: &Path) -> Result<FileAction> {
    let key = path.to_string_lossy();
    if db.find_track(&key)?.is_some() {
        return Ok(FileAction::Skipped);
    }

    let (album, track) = metadata::extract(reader, path)?;

    let album_id = match db.find_album_id(&album)? {
        Some(id) => id,
        None => {
            let id = db.insert_album(&album)?;
            log::debug!(
                "New album {} - {} ({}) -> id {}",
                album.album_artist, album.name, album.year, id
            );
            id
        }
    };

    db.insert_track(album_id, &track)?;
    Ok(FileAction::Added)
}

/// Scan `root` and add every audio file not yet in the library.
///
/// Already-indexed paths are skipped without re-reading their tags.
/// `progress` is called with `(processed, total)` after each file.
pub fn scan(
    db: &Database,
    reader: &dyn TagReader,
    root: &Path,
    policy: ErrorPolicy,
    mut progress: impl FnMut(usize, usize),
) -> Result<ScanReport> {
    let audio_files = find_audio_files(root)?;
    let total = audio_files.len();
    log::info!("Found {} audio files under {}", total, root.display());

    let mut report = ScanReport::default();

    for (i, path) in audio_files.into_iter().enumerate() {
        report.scanned += 1;

        match add_path(db, reader, &path) {
            Ok(FileAction::Added) => report.added += 1,
            Ok(FileAction::Skipped) => report.skipped += 1,
            Err(e @ ScanError::Db(_)) => return Err(e),
            Err(e) if policy == ErrorPolicy::Abort => {
                return Err(ScanError::Aborted {
                    path,
                    processed: i,
                    source: Box::new(e),
                });
            }
            Err(e) => {
                log::warn!("Error scanning {}: {}", path.display(), e);
                report.failures.push(PathFailure { path, error: e });
            }
        }

        progress(i + 1, total);
    }

    Ok(report)
}

/// Remove tracks whose file is gone, then albums left without tracks.
pub fn tidy(db: &Database, mut progress: impl FnMut(usize, usize)) -> Result<TidyReport> {
    let paths = db.all_track_paths()?;
    let total = paths.len();

    let mut report = TidyReport {
        checked: 0,
        removed_tracks: 0,
        removed_albums: 0,
    };

    for (i, path) in paths.iter().enumerate() {
        report.checked += 1;
        if !Path::new(path).try_exists()? {
            log::info!("Removing missing track {}", path);
            if db.delete_track(path)? {
                report.removed_tracks += 1;
            }
        }
        progress(i + 1, total);
    }

    report.removed_albums = db.remove_empty_albums()?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use metadata::{LoftyReader, MapReader};
    use std::fs;
    use tempfile::TempDir;

    /// Writes placeholder files and registers their tags with the reader.
    struct Library {
        dir: TempDir,
        reader: MapReader,
    }

    impl Library {
        fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
                reader: MapReader::default(),
            }
        }

        fn add(&mut self, rel: &str, artist: &str, album: &str, year: u32, disc: u32, track: u32) -> PathBuf {
            let path = self.dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, b"FAKE").unwrap();
            self.reader.insert(&path, artist, album, year, disc, track);
            path
        }

        fn root(&self) -> &Path {
            self.dir.path()
        }
    }

    fn album_triples(db: &Database) -> Vec<(String, String, i32)> {
        db.albums_by_artist(true)
            .unwrap()
            .into_iter()
            .map(|a| (a.album_artist, a.name, a.year))
            .collect()
    }

    #[test]
    fn test_find_audio_files_filters_extensions() {
        let mut lib = Library::new();
        lib.add("Neu/Neu/01.MP3", "Neu!", "Neu!", 1972, 1, 1);
        lib.add("Neu/Neu/02.flac", "Neu!", "Neu!", 1972, 1, 2);
        lib.add("Can/Soon/01.m4b", "Can", "Soon Over Babaluma", 1974, 1, 1);
        fs::write(lib.root().join("Neu/Neu/cover.jpg"), b"JPEG").unwrap();
        fs::write(lib.root().join("notes.txt"), b"text").unwrap();
        fs::create_dir_all(lib.root().join("empty.mp3")).unwrap();

        let files = find_audio_files(lib.root()).unwrap();
        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|p| p.is_file()));
    }

    #[test]
    fn test_find_audio_files_missing_root_errors() {
        let dir = TempDir::new().unwrap();
        let result = find_audio_files(&dir.path().join("nope"));
        assert!(matches!(result, Err(ScanError::Walk(_))));
    }

    #[test]
    fn test_is_audio_file_case_insensitive() {
        for name in ["a.mp3", "a.M4A", "a.m4p", "a.Alac", "a.FLAC", "a.ogg", "a.dsf", "a.m4b"] {
            assert!(is_audio_file(Path::new(name)), "{name}");
        }
        for name in ["a.wav", "a.jpg", "mp3", "a.mp3.part"] {
            assert!(!is_audio_file(Path::new(name)), "{name}");
        }
    }

    #[test]
    fn test_scan_groups_tracks_into_albums() {
        let mut lib = Library::new();
        lib.add("floyd/animals/1.flac", "Pink Floyd", "Animals", 1977, 1, 1);
        lib.add("floyd/animals/2.flac", "Pink Floyd", "Animals", 1977, 1, 2);
        lib.add("floyd/wall/1.flac", "Pink Floyd", "The Wall", 1979, 1, 1);
        let db = Database::open_in_memory().unwrap();

        let report = scan(&db, &lib.reader, lib.root(), ErrorPolicy::Abort, |_, _| {}).unwrap();
        assert_eq!(report.scanned, 3);
        assert_eq!(report.added, 3);
        assert_eq!(report.skipped, 0);
        assert!(report.failures.is_empty());

        let stats = db.stats().unwrap();
        assert_eq!((stats.albums, stats.tracks), (2, 3));
    }

    #[test]
    fn test_scan_is_idempotent() {
        let mut lib = Library::new();
        lib.add("a/1.mp3", "A", "First", 2001, 1, 1);
        lib.add("a/2.mp3", "A", "First", 2001, 1, 2);
        lib.add("b/1.mp3", "B", "Second", 2002, 1, 1);
        let db = Database::open_in_memory().unwrap();

        scan(&db, &lib.reader, lib.root(), ErrorPolicy::Abort, |_, _| {}).unwrap();
        let first = db.stats().unwrap();
        let first_albums = album_triples(&db);

        let report = scan(&db, &lib.reader, lib.root(), ErrorPolicy::Abort, |_, _| {}).unwrap();
        assert_eq!(report.added, 0);
        assert_eq!(report.skipped, 3);
        assert_eq!(db.stats().unwrap(), first);
        assert_eq!(album_triples(&db), first_albums);
    }

    #[test]
    fn test_scan_reads_tagged_files() {
        let dir = TempDir::new().unwrap();
        let write = |rel: &str, bytes: Vec<u8>| {
            let path = dir.path().join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, bytes).unwrap();
        };
        let animals = |track: &str| {
            metadata::fixture::mp3(
                4,
                &[
                    ("TPE2", "Pink Floyd"),
                    ("TALB", "Animals"),
                    ("TDRC", "1977"),
                    ("TPOS", "1/1"),
                    ("TRCK", track),
                ],
            )
        };
        write("floyd/animals/2.mp3", animals("2/5"));
        write("floyd/animals/1.mp3", animals("1/5"));
        write(
            "kraftwerk/ralf.mp3",
            metadata::fixture::mp3(
                3,
                &[("TPE2", "Kraftwerk"), ("TALB", "Ralf und Florian"), ("XDOR", "1973-10-01")],
            ),
        );
        let kind_of_blue = metadata::fixture::id3v2(
            4,
            &[("TPE2", "Miles Davis"), ("TALB", "Kind of Blue"), ("TDOR", "1959-08-17")],
        );
        write("miles/so_what.dsf", metadata::fixture::dsf(Some(kind_of_blue.as_slice())));
        fs::write(dir.path().join("notes.txt"), b"not audio").unwrap();
        let db = Database::open_in_memory().unwrap();

        let report = scan(&db, &LoftyReader, dir.path(), ErrorPolicy::Abort, |_, _| {}).unwrap();
        assert_eq!((report.scanned, report.added), (4, 4));
        assert!(report.failures.is_empty());

        assert_eq!(
            album_triples(&db),
            vec![
                ("Kraftwerk".to_string(), "Ralf und Florian".to_string(), 1973),
                ("Miles Davis".to_string(), "Kind of Blue".to_string(), 1959),
                ("Pink Floyd".to_string(), "Animals".to_string(), 1977),
            ]
        );

        let floyd = db.albums_by_artist(false).unwrap().remove(0);
        let root = dir.path().to_string_lossy();
        assert_eq!(
            db.album_track_paths(floyd.id).unwrap(),
            vec![
                format!("{root}/floyd/animals/1.mp3"),
                format!("{root}/floyd/animals/2.mp3"),
            ]
        );
    }

    #[test]
    fn test_scan_does_not_reread_known_paths() {
        let mut lib = Library::new();
        let path = lib.add("a/1.mp3", "A", "Old Name", 2001, 1, 1);
        let db = Database::open_in_memory().unwrap();
        scan(&db, &lib.reader, lib.root(), ErrorPolicy::Abort, |_, _| {}).unwrap();

        // Tags changed on disk; known path is still skipped
        lib.reader.insert(&path, "A", "New Name", 2001, 1, 1);
        scan(&db, &lib.reader, lib.root(), ErrorPolicy::Abort, |_, _| {}).unwrap();
        assert_eq!(album_triples(&db), vec![("A".to_string(), "Old Name".to_string(), 2001)]);
    }

    #[test]
    fn test_identity_resolution() {
        let mut lib = Library::new();
        let same1 = lib.add("x/1.ogg", "Kraftwerk", "Computer World", 1981, 1, 1);
        let same2 = lib.add("y/2.ogg", "Kraftwerk", "Computer World", 1981, 1, 2);
        let other_year = lib.add("z/1.ogg", "Kraftwerk", "Computer World", 2009, 1, 1);
        let other_artist = lib.add("w/1.ogg", "Señor Coconut", "Computer World", 1981, 1, 1);
        let db = Database::open_in_memory().unwrap();

        for p in [&same1, &same2, &other_year, &other_artist] {
            assert_eq!(add_path(&db, &lib.reader, p).unwrap(), FileAction::Added);
        }
        assert_eq!(add_path(&db, &lib.reader, &same1).unwrap(), FileAction::Skipped);

        let album_of = |p: &PathBuf| db.find_track(&p.to_string_lossy()).unwrap().unwrap().album_id;
        assert_eq!(album_of(&same1), album_of(&same2));
        assert_ne!(album_of(&same1), album_of(&other_year));
        assert_ne!(album_of(&same1), album_of(&other_artist));
        assert_eq!(db.stats().unwrap().albums, 3);
    }

    #[test]
    fn test_scan_reports_progress() {
        let mut lib = Library::new();
        lib.add("1.mp3", "A", "B", 1, 0, 1);
        lib.add("2.mp3", "A", "B", 1, 0, 2);
        let db = Database::open_in_memory().unwrap();

        let mut seen = Vec::new();
        scan(&db, &lib.reader, lib.root(), ErrorPolicy::Abort, |done, total| {
            seen.push((done, total))
        })
        .unwrap();
        assert_eq!(seen, vec![(1, 2), (2, 2)]);
    }

    #[test]
    fn test_scan_abort_stops_at_first_bad_file() {
        let mut lib = Library::new();
        lib.add("a.mp3", "A", "Good", 2000, 0, 1);
        // No tags registered: the reader fails for this file
        fs::write(lib.root().join("b.mp3"), b"FAKE").unwrap();
        lib.add("c.mp3", "C", "Never Reached", 2000, 0, 1);
        let db = Database::open_in_memory().unwrap();

        let err = scan(&db, &lib.reader, lib.root(), ErrorPolicy::Abort, |_, _| {}).unwrap_err();
        match err {
            ScanError::Aborted { path, processed, source } => {
                assert!(path.ends_with("b.mp3"));
                assert_eq!(processed, 1);
                assert!(matches!(*source, ScanError::Metadata(_)));
            }
            other => panic!("unexpected error: {other}"),
        }

        // The file before the failure stays committed
        assert_eq!(db.stats().unwrap().tracks, 1);
    }

    #[test]
    fn test_scan_continue_records_failures() {
        let mut lib = Library::new();
        lib.add("a.mp3", "A", "Good", 2000, 0, 1);
        fs::write(lib.root().join("b.mp3"), b"FAKE").unwrap();
        lib.add("c.mp3", "C", "Also Good", 2000, 0, 1);
        let db = Database::open_in_memory().unwrap();

        let report = scan(&db, &lib.reader, lib.root(), ErrorPolicy::Continue, |_, _| {}).unwrap();
        assert_eq!(report.scanned, 3);
        assert_eq!(report.added, 2);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].path.ends_with("b.mp3"));
        assert_eq!(db.stats().unwrap().tracks, 2);
    }

    #[test]
    fn test_tidy_removes_missing_tracks_and_orphaned_albums() {
        let mut lib = Library::new();
        let kept = lib.add("a/1.mp3", "A", "Stays", 1990, 1, 1);
        let gone = lib.add("b/1.mp3", "B", "Goes", 1991, 1, 1);
        let db = Database::open_in_memory().unwrap();
        scan(&db, &lib.reader, lib.root(), ErrorPolicy::Abort, |_, _| {}).unwrap();

        fs::remove_file(&gone).unwrap();
        let report = tidy(&db, |_, _| {}).unwrap();
        assert_eq!(
            report,
            TidyReport { checked: 2, removed_tracks: 1, removed_albums: 1 }
        );

        assert!(db.find_track(&gone.to_string_lossy()).unwrap().is_none());
        let track = db.find_track(&kept.to_string_lossy()).unwrap().unwrap();
        assert!(db.album(track.album_id).unwrap().is_some());
        assert_eq!(album_triples(&db), vec![("A".to_string(), "Stays".to_string(), 1990)]);
    }

    #[test]
    fn test_tidy_keeps_album_with_remaining_tracks() {
        let mut lib = Library::new();
        let first = lib.add("a/1.mp3", "A", "Half Gone", 1990, 1, 1);
        lib.add("a/2.mp3", "A", "Half Gone", 1990, 1, 2);
        let db = Database::open_in_memory().unwrap();
        scan(&db, &lib.reader, lib.root(), ErrorPolicy::Abort, |_, _| {}).unwrap();

        fs::remove_file(&first).unwrap();
        let report = tidy(&db, |_, _| {}).unwrap();
        assert_eq!(report.removed_tracks, 1);
        assert_eq!(report.removed_albums, 0);
        assert_eq!(db.stats().unwrap().albums, 1);
    }

    #[test]
    fn test_tidy_on_empty_library() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(tidy(&db, |_, _| {}).unwrap(), TidyReport::default());
    }
}
