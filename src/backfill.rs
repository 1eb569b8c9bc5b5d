//! Walk the playlist history backwards and ingest every hour on the way.
//!
//! Starting at `start_date` hour 23, each unit is fetched, extracted and
//! upserted before the next one is requested. Hours go 23 down to 0, then
//! the previous day. The walk ends when a page says there is no data, when
//! the day limit is hit, or when a unit fails; a failing unit's raw body is
//! dumped for inspection first. Every completed unit is committed, so a run
//! killed part way keeps everything up to the last finished hour.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;

use crate::db::models::SessionStats;
use crate::db::{Database, StoreError};
use crate::playlist::extract::{extract, ExtractError, Extraction};
use crate::playlist::fetch::PlaylistSource;
use crate::playlist::RawPage;

#[derive(Error, Debug)]
pub enum BackfillError {
    #[error("Failed to extract playlist for {date} hour {hour}: {source}")]
    Extract {
        date: NaiveDate,
        hour: u8,
        #[source]
        source: ExtractError,
    },
    #[error("Failed to store playlist for {date} hour {hour}: {source}")]
    Store {
        date: NaiveDate,
        hour: u8,
        #[source]
        source: StoreError,
    },
}

pub struct BackfillOptions {
    /// First day to ingest, usually yesterday (today is still incomplete).
    pub start_date: NaiveDate,
    pub station: String,
    /// Pause after every processed unit.
    pub delay: Duration,
    /// Stop after this many days even if the source has more.
    pub max_days: Option<u32>,
    pub dump_path: PathBuf,
}

/// Why the walk ended.
#[derive(Debug)]
pub enum StopReason {
    /// The source had nothing for this unit (error status, missing day
    /// marker or an unreachable endpoint).
    Exhausted { date: NaiveDate, hour: u8 },
    DayLimit,
    Fatal(BackfillError),
}

#[derive(Debug)]
pub struct BackfillReport {
    /// Oldest and newest day with at least one processed unit.
    pub date_min: Option<NaiveDate>,
    pub date_max: Option<NaiveDate>,
    pub units_processed: u64,
    pub stats: SessionStats,
    pub stop: StopReason,
}

impl BackfillReport {
    pub fn is_fatal(&self) -> bool {
        matches!(self.stop, StopReason::Fatal(_))
    }
}

/// Run the backfill until the history runs out or something fails.
///
/// Always returns a report; a fatal failure is carried in
/// [`BackfillReport::stop`] so the caller can print what was gathered first.
pub fn run_backfill(
    db: &Database,
    source: &impl PlaylistSource,
    opts: &BackfillOptions,
) -> BackfillReport {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {elapsed} {msg}")
            .unwrap(),
    );
    pb.enable_steady_tick(Duration::from_millis(120));

    let mut date_min = None;
    let mut date_max = None;
    let mut units_processed = 0;
    let mut stats = SessionStats::default();
    let mut date = opts.start_date;
    let mut days_walked = 0u32;

    let stop = 'days: loop {
        if opts.max_days.is_some_and(|max| days_walked >= max) {
            log::info!("Reached the limit of {days_walked} days");
            break StopReason::DayLimit;
        }

        for hour in (0..24u8).rev() {
            pb.set_message(format!("{date} {hour:02}:00"));

            let page = match source.fetch(date, hour) {
                Ok(page) => page,
                Err(e) => {
                    log::warn!("{e}; treating as end of history");
                    break 'days StopReason::Exhausted { date, hour };
                }
            };

            match process_unit(db, &page, &opts.station, &mut stats, &pb) {
                Ok(true) => {
                    units_processed += 1;
                    if date_max.is_none() {
                        date_max = Some(date);
                    }
                    date_min = Some(date);
                }
                Ok(false) => {
                    log::info!("No playlist data for {date} hour {hour}, stopping");
                    break 'days StopReason::Exhausted { date, hour };
                }
                Err(e) => {
                    log::error!("Error processing content for {date} hour {hour}");
                    dump_page(&opts.dump_path, &page);
                    break 'days StopReason::Fatal(e);
                }
            }

            // Keep the server happy between requests
            thread::sleep(opts.delay);
        }

        days_walked += 1;
        date = match date.pred_opt() {
            Some(prev) => prev,
            None => break StopReason::Exhausted { date, hour: 0 },
        };
    };

    pb.finish_and_clear();

    BackfillReport { date_min, date_max, units_processed, stats, stop }
}

/// Extract and store one unit, then commit it. Returns false when the page
/// has no data. Rows created before a failure still count towards `stats`.
fn process_unit(
    db: &Database,
    page: &RawPage,
    station: &str,
    stats: &mut SessionStats,
    pb: &ProgressBar,
) -> Result<bool, BackfillError> {
    let (date, hour) = (page.date, page.hour);

    let records = match extract(page, station)
        .map_err(|source| BackfillError::Extract { date, hour, source })?
    {
        Extraction::NoData => return Ok(false),
        Extraction::Empty => {
            log::debug!("{date} hour {hour}: no songs");
            Vec::new()
        }
        Extraction::Songs(records) => records,
    };

    for rec in &records {
        let outcome = db
            .upsert_transmission(rec)
            .map_err(|source| BackfillError::Store { date, hour, source })?;
        *stats += outcome.created;
        pb.suspend(|| {
            println!("{}: {} - {}", rec.timestamp, rec.artist_name, rec.song_title);
        });
    }

    db.checkpoint()
        .map_err(|source| BackfillError::Store { date, hour, source })?;
    Ok(true)
}

/// Best effort: a failed dump is logged, not raised.
fn dump_page(path: &Path, page: &RawPage) {
    match std::fs::write(path, &page.body) {
        Ok(()) => log::error!("Dumped {} bytes of raw content to {}", page.body.len(), path.display()),
        Err(e) => log::error!("Could not dump raw content to {}: {e}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playlist::fetch::FetchError;
    use crate::playlist::fixtures::{empty_hour_page, no_data_page, page, playlist_page};
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Serves canned pages. Days in `open_days` answer with an empty hour
    /// unless a page was registered; everything else has no data.
    #[derive(Default)]
    struct FakeSource {
        open_days: Vec<NaiveDate>,
        pages: HashMap<(NaiveDate, u8), RawPage>,
        unreachable: Option<(NaiveDate, u8)>,
        calls: RefCell<Vec<(NaiveDate, u8)>>,
        /// Store file to count transmissions in, from a separate
        /// connection, every time a page is requested.
        observe: Option<std::path::PathBuf>,
        seen_transmissions: RefCell<Vec<i64>>,
    }

    impl FakeSource {
        fn with_page(mut self, date: NaiveDate, hour: u8, html: String) -> Self {
            self.pages.insert((date, hour), page(date, hour, html));
            self
        }
    }

    impl PlaylistSource for FakeSource {
        fn fetch(&self, date: NaiveDate, hour: u8) -> Result<RawPage, FetchError> {
            self.calls.borrow_mut().push((date, hour));
            if let Some(path) = &self.observe {
                let reader = Database::open(path, &crate::db::OpenOptions::read_only()).unwrap();
                self.seen_transmissions.borrow_mut().push(count(&reader, "transmissions"));
            }
            if self.unreachable == Some((date, hour)) {
                return Err(FetchError {
                    date,
                    hour,
                    source: Box::new(std::io::Error::other("connection refused")),
                });
            }
            if let Some(p) = self.pages.get(&(date, hour)) {
                return Ok(p.clone());
            }
            let html = if self.open_days.contains(&date) {
                empty_hour_page(&date.format("%d.%m.%Y").to_string())
            } else {
                no_data_page()
            };
            Ok(page(date, hour, html))
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2023, 5, d).unwrap()
    }

    fn options(start: NaiveDate, dump_path: PathBuf) -> BackfillOptions {
        BackfillOptions {
            start_date: start,
            station: "Bayern 1".to_string(),
            delay: Duration::ZERO,
            max_days: None,
            dump_path,
        }
    }

    fn count(db: &Database, table: &str) -> i64 {
        db.conn
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_walks_hours_backwards_then_previous_day() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let source = FakeSource { open_days: vec![day(2)], ..Default::default() };

        let report = run_backfill(&db, &source, &options(day(2), dir.path().join("dump.txt")));

        let calls = source.calls.borrow();
        assert_eq!(calls.len(), 25);
        assert_eq!(calls[0], (day(2), 23));
        assert_eq!(calls[23], (day(2), 0));
        assert_eq!(calls[24], (day(1), 23));
        assert!(matches!(report.stop, StopReason::Exhausted { date, hour: 23 } if date == day(1)));
        assert_eq!(report.units_processed, 24);
    }

    #[test]
    fn test_stop_reports_range_of_processed_units() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("dump.txt");
        let db = Database::open_in_memory().unwrap();

        // 2 May is complete; 1 May has data from hour 23 down to 11 only
        let mut source = FakeSource { open_days: vec![day(2)], ..Default::default() };
        for hour in 11..24 {
            source = source.with_page(day(1), hour, empty_hour_page("01.05.2023"));
        }
        source = source.with_page(
            day(1),
            12,
            playlist_page("01.05.2023", &[("12:03", "Queen", "Bohemian Rhapsody")]),
        );

        let report = run_backfill(&db, &source, &options(day(2), dump.clone()));

        assert!(matches!(report.stop, StopReason::Exhausted { date, hour: 10 } if date == day(1)));
        assert_eq!(report.date_max, Some(day(2)));
        assert_eq!(report.date_min, Some(day(1)));
        assert_eq!(report.units_processed, 24 + 13);
        assert_eq!(report.stats.transmissions_added, 1);
        assert!(!report.is_fatal());
        assert!(!dump.exists());
    }

    #[test]
    fn test_immediate_stop_has_no_range() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let source = FakeSource::default();

        let report = run_backfill(&db, &source, &options(day(2), dir.path().join("dump.txt")));

        assert_eq!(report.date_min, None);
        assert_eq!(report.date_max, None);
        assert!(report.stats.is_empty());
        assert_eq!(source.calls.borrow().len(), 1);
    }

    #[test]
    fn test_rerun_creates_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let source = FakeSource { open_days: vec![day(1)], ..Default::default() }.with_page(
            day(1),
            10,
            playlist_page("01.05.2023", &[("10:04", "Queen", "Bohemian Rhapsody")]),
        );
        let opts = options(day(1), dir.path().join("dump.txt"));

        let first = run_backfill(&db, &source, &opts);
        assert_eq!(
            first.stats,
            SessionStats { artists_added: 1, songs_added: 1, stations_added: 1, transmissions_added: 1 }
        );

        let second = run_backfill(&db, &source, &opts);
        assert!(second.stats.is_empty());
        assert_eq!(count(&db, "transmissions"), 1);
    }

    #[test]
    fn test_same_artist_two_hours() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let source = FakeSource { open_days: vec![day(1)], ..Default::default() }
            .with_page(day(1), 11, playlist_page("01.05.2023", &[("11:02", "Queen", "B")]))
            .with_page(day(1), 10, playlist_page("01.05.2023", &[("10:04", "Queen", "A")]));

        let report = run_backfill(&db, &source, &options(day(1), dir.path().join("dump.txt")));

        assert_eq!(report.stats.artists_added, 1);
        assert_eq!(report.stats.songs_added, 2);
        assert_eq!(report.stats.transmissions_added, 2);
        assert_eq!(count(&db, "artists"), 1);
        assert_eq!(count(&db, "songs"), 2);
    }

    #[test]
    fn test_fatal_unit_dumps_exact_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("dump.txt");
        let db = Database::open_in_memory().unwrap();

        let garbage = vec![b'<', b'h', 0xff, 0xfe, b'>', 0x00, 0x80];
        let mut source = FakeSource { open_days: vec![day(1)], ..Default::default() }.with_page(
            day(1),
            23,
            playlist_page("01.05.2023", &[("23:01", "Queen", "A")]),
        );
        source.pages.insert(
            (day(1), 22),
            RawPage { date: day(1), hour: 22, status: 200, body: garbage.clone() },
        );

        let report = run_backfill(&db, &source, &options(day(1), dump.clone()));

        assert!(report.is_fatal());
        assert!(matches!(
            report.stop,
            StopReason::Fatal(BackfillError::Extract { hour: 22, .. })
        ));
        assert_eq!(std::fs::read(&dump).unwrap(), garbage);
        // Work before the failing unit is still reported
        assert_eq!(report.stats.transmissions_added, 1);
        assert_eq!(report.date_max, Some(day(1)));
        assert_eq!(source.calls.borrow().len(), 2);
    }

    #[test]
    fn test_unreachable_source_stops_without_dump() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("dump.txt");
        let db = Database::open_in_memory().unwrap();
        let source = FakeSource {
            open_days: vec![day(1)],
            unreachable: Some((day(1), 20)),
            ..Default::default()
        };

        let report = run_backfill(&db, &source, &options(day(1), dump.clone()));

        assert!(matches!(report.stop, StopReason::Exhausted { hour: 20, .. }));
        assert_eq!(report.units_processed, 3);
        assert!(!dump.exists());
    }

    #[test]
    fn test_day_limit() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().unwrap();
        let source = FakeSource { open_days: vec![day(3), day(2), day(1)], ..Default::default() };
        let mut opts = options(day(3), dir.path().join("dump.txt"));
        opts.max_days = Some(2);

        let report = run_backfill(&db, &source, &opts);

        assert!(matches!(report.stop, StopReason::DayLimit));
        assert_eq!(report.date_max, Some(day(3)));
        assert_eq!(report.date_min, Some(day(2)));
        assert_eq!(source.calls.borrow().len(), 48);
    }

    #[test]
    fn test_store_failure_dumps_page_and_keeps_earlier_rows() {
        let dir = tempfile::tempdir().unwrap();
        let dump = dir.path().join("dump.txt");
        let db = Database::open_in_memory().unwrap();
        db.conn
            .execute_batch(
                "CREATE TRIGGER reject_late_show BEFORE INSERT ON transmissions
                 WHEN NEW.transmission_datetime = '01.05.2023 23:30'
                 BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
            )
            .unwrap();

        let html = playlist_page(
            "01.05.2023",
            &[("23:02", "Queen", "A"), ("23:30", "Queen", "B"), ("23:55", "Queen", "C")],
        );
        let source = FakeSource { open_days: vec![day(1)], ..Default::default() }
            .with_page(day(1), 23, html.clone());

        let report = run_backfill(&db, &source, &options(day(1), dump.clone()));

        assert!(matches!(
            report.stop,
            StopReason::Fatal(BackfillError::Store { hour: 23, .. })
        ));
        assert_eq!(std::fs::read(&dump).unwrap(), html.into_bytes());
        // Only the record that made it through is counted
        assert_eq!(report.stats.transmissions_added, 1);
        assert_eq!(report.stats.songs_added, 1);
        assert_eq!(report.units_processed, 0);
        assert_eq!(count(&db, "transmissions"), 1);
        assert_eq!(source.calls.borrow().len(), 1);
    }

    #[test]
    fn test_finished_units_are_committed_during_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");
        crate::db::initialize_schema(&path).unwrap();
        let db = Database::open(&path, &crate::db::OpenOptions::read_write()).unwrap();

        let source = FakeSource {
            observe: Some(path.clone()),
            ..Default::default()
        }
        .with_page(day(1), 23, playlist_page("01.05.2023", &[("23:02", "Queen", "A")]))
        .with_page(
            day(1),
            22,
            playlist_page("01.05.2023", &[("22:10", "ABBA", "Waterloo"), ("22:40", "Nena", "Irgendwie")]),
        );

        let report = run_backfill(&db, &source, &options(day(1), dir.path().join("dump.txt")));
        assert!(matches!(report.stop, StopReason::Exhausted { hour: 21, .. }));

        // Before hour 23, after hour 23, after hour 22
        assert_eq!(*source.seen_transmissions.borrow(), vec![0, 1, 3]);
    }
}
