use std::path::{Path, PathBuf};

use directories::{BaseDirs, ProjectDirs, UserDirs};
use serde::Deserialize;

use crate::scanner::ErrorPolicy;

/// Application configuration loaded from TOML config file.
/// Every field has a default, so the file is optional.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root of the music collection (used when `scan` has no CLI arg).
    /// `$VAR`, `${VAR}` and a leading `~` are expanded.
    pub music_dir: PathBuf,
    /// Custom database path (overrides XDG default).
    pub db_path: Option<PathBuf>,
    /// Player command; track paths are appended as arguments.
    pub exec_cmd: String,
    /// Relay the player's stdout.
    pub show_stdout: bool,
    /// Relay the player's stderr.
    pub show_stderr: bool,
    /// Capture player output to a timestamped log file.
    pub debug: bool,
    /// What a scan does when one file can't be read.
    pub on_error: ErrorPolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            music_dir: default_music_dir(),
            db_path: None,
            exec_cmd: "mpv".to_string(),
            show_stdout: false,
            show_stderr: false,
            debug: false,
            on_error: ErrorPolicy::Abort,
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/musli/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Load config from an explicit path, falling back to defaults on any error.
    pub fn load_from(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                return Self::default();
            }
        };

        match Self::parse(&contents) {
            Ok(config) => {
                log::info!("Loaded config from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        let mut config: AppConfig = toml::from_str(contents)?;
        config.music_dir = expand_path(&config.music_dir.to_string_lossy());
        config.db_path = config
            .db_path
            .map(|p| expand_path(&p.to_string_lossy()));
        Ok(config)
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

fn default_music_dir() -> PathBuf {
    if let Some(audio) = UserDirs::new().and_then(|d| d.audio_dir().map(Path::to_path_buf)) {
        return audio;
    }
    BaseDirs::new()
        .map(|d| d.home_dir().join("Music"))
        .unwrap_or_else(|| PathBuf::from("Music"))
}

/// Resolve the default database path using XDG data directory.
pub fn default_db_path() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        dirs.data_dir().join("library.db")
    } else {
        // Fallback: current directory
        PathBuf::from("library.db")
    }
}

/// Expand a leading `~` and `$VAR` / `${VAR}` references from the environment.
/// Unset variables expand to nothing.
fn expand_path(raw: &str) -> PathBuf {
    expand_with(raw, |name| std::env::var(name).ok())
}

fn expand_with(raw: &str, lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    if rest == "~" || rest.starts_with("~/") {
        out.push_str(&lookup("HOME").unwrap_or_default());
        rest = &rest[1..];
    }

    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];

        let (name, consumed) = if let Some(braced) = after.strip_prefix('{') {
            match braced.find('}') {
                Some(end) => (&braced[..end], end + 2),
                None => (braced, braced.len() + 1),
            }
        } else {
            let end = after
                .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
                .unwrap_or(after.len());
            (&after[..end], end)
        };

        if name.is_empty() && consumed == 0 {
            out.push('$');
        } else {
            out.push_str(&lookup(name).unwrap_or_default());
        }
        rest = &after[consumed..];
    }
    out.push_str(rest);

    PathBuf::from(out)
}
