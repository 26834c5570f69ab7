pub mod config;
pub mod db;
pub mod player;
pub mod query;
pub mod scanner;

/// Audio file extensions we index (matched case-insensitively)
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "mp3", "m4a", "m4b", "m4p", "alac", "flac", "ogg", "dsf",
];

/// Application name for XDG paths
pub const APP_NAME: &str = "musli";
