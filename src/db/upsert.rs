//! Resolve-or-create for the four entities behind a transmission.
//!
//! Every entity is looked up by its natural key first and only inserted when
//! nothing matches, so replaying an already ingested page creates no rows.
//! Lookup and insert are separate statements; that is only safe because a
//! single writer ingests at a time.

use rusqlite::{Connection, ToSql};

use super::models::{ResolvedIds, SessionStats, TransmissionRecord, UpsertOutcome};
use super::{Database, Result, StoreError};

impl Database {
    /// Resolve or create artist, song, station and transmission for one record.
    pub fn upsert_transmission(&self, rec: &TransmissionRecord) -> Result<UpsertOutcome> {
        upsert_transmission(&self.conn, rec)
    }
}

pub fn upsert_transmission(conn: &Connection, rec: &TransmissionRecord) -> Result<UpsertOutcome> {
    let mut created = SessionStats::default();

    let (artist_id, new) = resolve(
        conn,
        "artist",
        || format!("{:?}", rec.artist_name),
        "SELECT artist_id FROM artists WHERE artist_name = ?1",
        "INSERT INTO artists (artist_name) VALUES (?1) RETURNING artist_id",
        &[&rec.artist_name],
    )?;
    if new {
        created.artists_added += 1;
    }

    let (song_id, new) = resolve(
        conn,
        "song",
        || format!("{:?} (artist: {:?})", rec.song_title, rec.artist_name),
        "SELECT song_id FROM songs WHERE artist_id = ?1 AND song_title = ?2",
        "INSERT INTO songs (artist_id, song_title) VALUES (?1, ?2) RETURNING song_id",
        &[&artist_id, &rec.song_title],
    )?;
    if new {
        created.songs_added += 1;
    }

    let (station_id, new) = resolve(
        conn,
        "station",
        || format!("{:?}", rec.station_name),
        "SELECT station_id FROM stations WHERE station_name = ?1",
        "INSERT INTO stations (station_name) VALUES (?1) RETURNING station_id",
        &[&rec.station_name],
    )?;
    if new {
        created.stations_added += 1;
    }

    let (transmission_id, new) = resolve(
        conn,
        "transmission",
        || format!("song {song_id} on station {station_id} at {:?}", rec.timestamp),
        "SELECT transmission_id FROM transmissions
         WHERE song_id = ?1 AND station_id = ?2 AND transmission_datetime = ?3",
        "INSERT INTO transmissions (song_id, station_id, transmission_datetime)
         VALUES (?1, ?2, ?3) RETURNING transmission_id",
        &[&song_id, &station_id, &rec.timestamp],
    )?;
    if new {
        created.transmissions_added += 1;
    }

    Ok(UpsertOutcome {
        ids: ResolvedIds { artist_id, song_id, station_id, transmission_id },
        created,
    })
}

/// Look a row up by its natural key and insert it if absent.
/// Returns the row id and whether it was just created.
fn resolve(
    conn: &Connection,
    entity: &'static str,
    describe_key: impl FnOnce() -> String,
    select_sql: &str,
    insert_sql: &str,
    args: &[&dyn ToSql],
) -> Result<(i64, bool)> {
    let ids = conn
        .prepare_cached(select_sql)?
        .query_map(args, |row| row.get::<_, i64>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    match ids.as_slice() {
        [] => {
            let id: i64 = conn
                .prepare_cached(insert_sql)?
                .query_row(args, |row| row.get(0))?;
            log::trace!("Created {entity} {id}");
            Ok((id, true))
        }
        [id] => Ok((*id, false)),
        _ => Err(StoreError::DuplicateRows { entity, key: describe_key() }),
    }
}
