use std::ops::AddAssign;

use serde::Serialize;

/// One scraped playback event, ready to be resolved against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmissionRecord {
    pub artist_name: String,
    pub song_title: String,
    pub station_name: String,
    /// Day and time of day as shown on the page, e.g. "01.05.2023 10:04".
    pub timestamp: String,
}

/// Row ids a record resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedIds {
    pub artist_id: i64,
    pub song_id: i64,
    pub station_id: i64,
    pub transmission_id: i64,
}

/// Rows created during a session, per entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub artists_added: u64,
    pub songs_added: u64,
    pub stations_added: u64,
    pub transmissions_added: u64,
}

impl SessionStats {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl AddAssign for SessionStats {
    fn add_assign(&mut self, rhs: Self) {
        self.artists_added += rhs.artists_added;
        self.songs_added += rhs.songs_added;
        self.stations_added += rhs.stations_added;
        self.transmissions_added += rhs.transmissions_added;
    }
}

/// Result of upserting one record.
#[derive(Debug, Clone, Copy)]
pub struct UpsertOutcome {
    pub ids: ResolvedIds,
    pub created: SessionStats,
}

/// Transmissions per song (report).
#[derive(Debug, Clone, Serialize)]
pub struct SongTransmissionCount {
    pub artist_name: String,
    pub song_title: String,
    pub transmission_count: i64,
}

/// Songs per artist (report).
#[derive(Debug, Clone, Serialize)]
pub struct ArtistSongCount {
    pub artist_name: String,
    pub song_count: i64,
}

/// One (artist, title) pair (report).
#[derive(Debug, Clone, Serialize)]
pub struct SongListing {
    pub artist_name: String,
    pub song_title: String,
}

/// One stored playback, in the order it was scraped (report).
#[derive(Debug, Clone, Serialize)]
pub struct TransmissionListing {
    pub station_name: String,
    pub transmission_datetime: String,
    pub artist_name: String,
    pub song_title: String,
}

/// Row counts of the four tables.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub artists: i64,
    pub songs: i64,
    pub stations: i64,
    pub transmissions: i64,
}
