use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use musli::config::AppConfig;
use musli::db::Database;
use musli::db::models::Album;
use musli::player::{self, PlayerOutput};
use musli::query::{self, AlbumSort};
use musli::scanner::metadata::LoftyReader;
use musli::scanner::{self, ErrorPolicy, FileAction};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "musli", version, about = "Offline album library and launcher")]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SortName {
    Random,
    Artist,
    Year,
}

impl From<SortName> for AlbumSort {
    fn from(s: SortName) -> Self {
        match s {
            SortName::Random => AlbumSort::Random,
            SortName::Artist => AlbumSort::Artist,
            SortName::Year => AlbumSort::Year,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Scan the music directory and add new files to the library
    Scan {
        /// Directory to scan (defaults to config file music_dir)
        dir: Option<PathBuf>,

        /// Record unreadable files and keep going instead of stopping
        #[arg(long)]
        keep_going: bool,
    },

    /// Remove entries whose files no longer exist
    Tidy,

    /// Add a single file to the library
    Add {
        file: PathBuf,
    },

    /// Remove a single file from the library
    Delete {
        file: PathBuf,
    },

    /// List all albums
    List {
        #[arg(short, long, value_enum, default_value = "artist")]
        sort: SortName,

        /// Descending order
        #[arg(long)]
        desc: bool,
    },

    /// Find albums whose name or artist contains TEXT (case-insensitive)
    Search {
        text: String,
    },

    /// Albums from a year ("1977"), or a range ("1970 1980" / "1970-1980")
    Year {
        #[arg(num_args = 1..=2, required = true)]
        years: Vec<String>,
    },

    /// Print an album's track paths in playback order
    Tracks {
        album_id: i64,
    },

    /// Play an album with the configured player
    Play {
        album_id: i64,
    },

    /// Play one random album
    Random,

    /// Show library statistics
    Stats,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = AppConfig::load();

    // Resolve database path: CLI > config > XDG default
    let db_path = cli
        .db_path
        .or(config.db_path.clone())
        .unwrap_or_else(musli::config::default_db_path);
    log::info!("Database: {}", db_path.display());

    let db = Database::open(&db_path).context("Failed to open database")?;
    let outcome = run(&db, &config, cli.command);
    db.close().context("Failed to close database")?;
    outcome
}

fn run(db: &Database, config: &AppConfig, command: Commands) -> Result<()> {
    match command {
        Commands::Scan { dir, keep_going } => {
            let root = absolute(&dir.unwrap_or_else(|| config.music_dir.clone()))?;
            let policy = if keep_going {
                ErrorPolicy::Continue
            } else {
                config.on_error
            };
            println!("Scanning: {}", root.display());

            let pb = progress_bar("Scanning...");
            let result = scanner::scan(db, &LoftyReader, &root, policy, |done, total| {
                pb.set_length(total as u64);
                pb.set_position(done as u64);
            });
            pb.finish_and_clear();
            let report = result.context("Scan failed")?;

            println!(
                "Scan complete: {} scanned, {} new, {} already indexed, {} failed",
                report.scanned,
                report.added,
                report.skipped,
                report.failures.len()
            );
            for failure in &report.failures {
                println!("  {}: {}", failure.path.display(), failure.error);
            }
        }

        Commands::Tidy => {
            println!("Scrubbing library");
            let pb = progress_bar("Checking...");
            let result = scanner::tidy(db, |done, total| {
                pb.set_length(total as u64);
                pb.set_position(done as u64);
            });
            pb.finish_and_clear();
            let report = result.context("Tidy failed")?;

            println!(
                "Tidy complete: {} checked, {} tracks removed, {} albums removed",
                report.checked, report.removed_tracks, report.removed_albums
            );
        }

        Commands::Add { file } => {
            let path = absolute(&file)?;
            match scanner::add_path(db, &LoftyReader, &path)
                .with_context(|| format!("Failed to add {}", path.display()))?
            {
                FileAction::Added => println!("Added {}", path.display()),
                FileAction::Skipped => println!("Already in library: {}", path.display()),
            }
        }

        Commands::Delete { file } => {
            let path = absolute(&file)?;
            if db
                .delete_track(&path.to_string_lossy())
                .context("Delete failed")?
            {
                let removed = db.remove_empty_albums().context("Delete failed")?;
                println!("Removed {} ({} empty albums removed)", path.display(), removed);
            } else {
                println!("Not in library: {}", path.display());
            }
        }

        Commands::List { sort, desc } => {
            let albums = query::fetch_albums(db, sort.into(), !desc).context("Query failed")?;
            print_album_table(&albums);
        }

        Commands::Search { text } => {
            let albums = db.search_albums(&text).context("Query failed")?;
            if albums.is_empty() {
                println!("No albums matching \"{}\".", text);
                return Ok(());
            }
            print_album_table(&albums);
        }

        Commands::Year { years } => {
            let args: Vec<&str> = years.iter().map(String::as_str).collect();
            let albums = query::albums_by_year_range(db, &args).context("Query failed")?;
            if albums.is_empty() {
                println!("No albums for {}.", years.join(" "));
                return Ok(());
            }
            print_album_table(&albums);
        }

        Commands::Tracks { album_id } => {
            for path in db.album_track_paths(album_id).context("Query failed")? {
                println!("{}", path);
            }
        }

        Commands::Play { album_id } => {
            let album = db
                .album(album_id)
                .context("Query failed")?
                .with_context(|| format!("No album with id {}", album_id))?;
            play_album(db, config, &album)?;
        }

        Commands::Random => match db.one_random_album().context("Query failed")? {
            Some(album) => play_album(db, config, &album)?,
            None => println!("Library is empty. Run `musli scan` first."),
        },

        Commands::Stats => {
            let stats = db.stats().context("Failed to get stats")?;
            println!("Library Statistics");
            println!("==================");
            println!("Albums:  {}", stats.albums);
            println!("Tracks:  {}", stats.tracks);
        }
    }

    Ok(())
}

fn play_album(db: &Database, config: &AppConfig, album: &Album) -> Result<()> {
    let paths = db.album_track_paths(album.id).context("Query failed")?;
    println!("{} - {} ({})", album.album_artist, album.name, album.year);

    let output = if config.debug {
        PlayerOutput::LogFile(std::env::current_dir()?)
    } else if config.show_stdout {
        PlayerOutput::Stdout
    } else if config.show_stderr {
        PlayerOutput::Stderr
    } else {
        PlayerOutput::Detached
    };
    player::play(&config.exec_cmd, &paths, &output).context("Playback failed")?;
    Ok(())
}

/// Tracks are stored under the path the scanner produced, which is absolute when
/// the music directory is.
fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).with_context(|| format!("Bad path {}", path.display()))
}

fn progress_bar(message: &'static str) -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message(message);
    pb
}

/// Print a table of albums.
fn print_album_table(albums: &[Album]) {
    println!("{:>6}  {:<30} {:<40} {:>4}", "Id", "Artist", "Album", "Year");
    println!("{}", "-".repeat(84));

    for a in albums {
        let year = if a.year > 0 { a.year.to_string() } else { "?".to_string() };
        println!(
            "{:>6}  {:<30} {:<40} {:>4}",
            a.id,
            truncate(&a.album_artist, 30),
            truncate(&a.name, 40),
            year
        );
    }
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let head: String = s.chars().take(width - 3).collect();
        format!("{}...", head)
    } else {
        s.to_string()
    }
}
