use super::models::{
    ArtistSongCount, SongListing, SongTransmissionCount, StoreStats, TransmissionListing,
};
use super::{Database, Result};

impl Database {
    /// Number of transmissions per song, least played first.
    pub fn transmissions_per_song(&self) -> Result<Vec<SongTransmissionCount>> {
        let mut stmt = self.conn.prepare(
            "SELECT a.artist_name, s.song_title, t.cnt
             FROM songs s
             JOIN (SELECT song_id, COUNT(*) AS cnt
                   FROM transmissions
                   GROUP BY song_id) t ON t.song_id = s.song_id
             JOIN artists a ON a.artist_id = s.artist_id
             WHERE t.cnt > 0
             ORDER BY t.cnt, a.artist_name, s.song_title",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(SongTransmissionCount {
                    artist_name: row.get(0)?,
                    song_title: row.get(1)?,
                    transmission_count: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Number of distinct songs per artist, fewest first.
    pub fn songs_per_artist(&self) -> Result<Vec<ArtistSongCount>> {
        let mut stmt = self.conn.prepare(
            "SELECT a.artist_name, s.cnt
             FROM artists a
             JOIN (SELECT artist_id, COUNT(*) AS cnt
                   FROM songs
                   GROUP BY artist_id) s ON s.artist_id = a.artist_id
             WHERE s.cnt > 0
             ORDER BY s.cnt, a.artist_name",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(ArtistSongCount {
                    artist_name: row.get(0)?,
                    song_count: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Every known song, grouped by artist.
    pub fn songs(&self) -> Result<Vec<SongListing>> {
        let mut stmt = self.conn.prepare(
            "SELECT a.artist_name, s.song_title
             FROM songs s
             JOIN artists a ON a.artist_id = s.artist_id
             ORDER BY a.artist_name, s.song_title",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(SongListing {
                    artist_name: row.get(0)?,
                    song_title: row.get(1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Every stored transmission with its station and song, in insertion order.
    pub fn transmissions(&self) -> Result<Vec<TransmissionListing>> {
        let mut stmt = self.conn.prepare(
            "SELECT st.station_name, t.transmission_datetime, a.artist_name, s.song_title
             FROM transmissions t
             JOIN stations st ON st.station_id = t.station_id
             JOIN songs s ON s.song_id = t.song_id
             JOIN artists a ON a.artist_id = s.artist_id
             ORDER BY t.transmission_id",
        )?;

        let rows = stmt
            .query_map([], |row| {
                Ok(TransmissionListing {
                    station_name: row.get(0)?,
                    transmission_datetime: row.get(1)?,
                    artist_name: row.get(2)?,
                    song_title: row.get(3)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }

    /// Row counts of all four tables.
    pub fn stats(&self) -> Result<StoreStats> {
        let count = |table: &str| -> Result<i64> {
            Ok(self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?)
        };

        Ok(StoreStats {
            artists: count("artists")?,
            songs: count("songs")?,
            stations: count("stations")?,
            transmissions: count("transmissions")?,
        })
    }
}
