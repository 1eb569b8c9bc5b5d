pub mod backfill;
pub mod config;
pub mod db;
pub mod playlist;

/// Application name for XDG paths
pub const APP_NAME: &str = "songhistory";

/// Playlist endpoint queried once per (date, hour)
pub const PLAYLIST_URL: &str = "https://www.br.de/radio/bayern-1/welle110~playlist.html";

/// Station every scraped transmission is attributed to.
/// The playlist page doesn't name the station, so this is configuration.
pub const DEFAULT_STATION: &str = "Bayern 1";

/// Stand-in for an artist or title the page left blank
pub const UNKNOWN_FIELD: &str = "UNKNOWN";

/// Default store file name inside the XDG data directory
pub const DB_FILE_NAME: &str = "song_history.db";

/// Raw page dump written beside the store when a unit fails unexpectedly
pub const DUMP_FILE_NAME: &str = "troublesome_content.txt";

/// Oldest SQLite that supports `INSERT ... RETURNING`
pub const MIN_SQLITE_VERSION: &[u32] = &[3, 35, 0];
