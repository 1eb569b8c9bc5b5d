use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

/// Application configuration loaded from TOML config file.
/// All fields have sensible defaults; the config file is optional.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Custom database path (overrides XDG default).
    pub db_path: Option<PathBuf>,
    /// Where to dump the raw page when a unit can't be processed.
    /// Defaults to a file beside the database.
    pub dump_path: Option<PathBuf>,
    /// Playlist scraping settings.
    pub scrape: ScrapeConfig,
}

/// Playlist scraping configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    /// Endpoint that serves one hour of playlist per POST.
    pub playlist_url: String,
    /// Station name recorded with every transmission.
    pub station: String,
    /// Pause after each request in milliseconds.
    pub delay_ms: u64,
    /// Upper bound on a single request, connect through body.
    pub timeout_secs: u64,
    /// Stop after walking back this many days, even if more history exists.
    pub max_days: Option<u32>,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            playlist_url: crate::PLAYLIST_URL.to_string(),
            station: crate::DEFAULT_STATION.to_string(),
            delay_ms: 0,
            timeout_secs: 30,
            max_days: None,
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/songhistory/config.toml`.
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

    /// Load config from an explicit path, falling back to defaults on error.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!("Failed to read {}: {}. Using defaults.", path.display(), e);
                Self::default()
            }
        }
    }

    /// Dump path: config value, else `troublesome_content.txt` next to the database.
    pub fn resolve_dump_path(&self, db_path: &Path) -> PathBuf {
        self.dump_path
            .clone()
            .unwrap_or_else(|| db_path.with_file_name(crate::DUMP_FILE_NAME))
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Resolve the default database path using XDG data directory.
pub fn default_db_path() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir).ok();
        data_dir.join(crate::DB_FILE_NAME)
    } else {
        // Fallback: current directory
        PathBuf::from(crate::DB_FILE_NAME)
    }
}
