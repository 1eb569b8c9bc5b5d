use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use songhistory::backfill::{BackfillOptions, BackfillReport, StopReason};
use songhistory::db::{Database, OpenOptions};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "songhistory", version, about = "Radio playlist history scraper")]
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

#[derive(Clone, ValueEnum)]
enum ReportKind {
    /// How often each song was played, least played first
    TransmissionsPerSong,
    /// How many distinct songs each artist has, fewest first
    SongsPerArtist,
    /// Every known song, grouped by artist
    Songs,
    /// Every stored transmission in scrape order
    Transmissions,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty database (fails if it already exists)
    Init,

    /// Walk the playlist history back from yesterday and store every song
    Scrape {
        /// First day to ingest (YYYY-MM-DD, defaults to yesterday)
        #[arg(long)]
        start_date: Option<NaiveDate>,

        /// Stop after this many days
        #[arg(long)]
        max_days: Option<u32>,

        /// Pause between requests in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,
    },

    /// Run an aggregate query against the database (read-only)
    Report {
        #[arg(value_enum, default_value = "transmissions-per-song")]
        kind: ReportKind,

        /// Print rows as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show row counts (read-only)
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
    let config = songhistory::config::AppConfig::load();

    // Resolve database path: CLI > config > XDG default
    let db_path = cli.db_path
        .or(config.db_path.clone())
        .unwrap_or_else(songhistory::config::default_db_path);
    log::info!("Database: {}", db_path.display());

    match cli.command {
        Commands::Init => {
            songhistory::db::initialize_schema(&db_path)
                .context("Failed to initialize database")?;
            println!("Created {}", db_path.display());
        }

        Commands::Scrape { start_date, max_days, delay_ms } => {
            let opts = OpenOptions::read_write()
                .min_version(songhistory::MIN_SQLITE_VERSION)
                .initializer(songhistory::db::initialize_schema);
            let db = Database::open(&db_path, &opts).context("Failed to open database")?;

            let fetcher = songhistory::playlist::fetch::HttpFetcher::new(
                config.scrape.playlist_url.as_str(),
                Duration::from_secs(config.scrape.timeout_secs),
            );
            let backfill = BackfillOptions {
                // Start from yesterday, today's playlist is still incomplete
                start_date: start_date.unwrap_or_else(yesterday),
                station: config.scrape.station.clone(),
                delay: Duration::from_millis(delay_ms.unwrap_or(config.scrape.delay_ms)),
                max_days: max_days.or(config.scrape.max_days),
                dump_path: config.resolve_dump_path(&db_path),
            };

            let report = songhistory::backfill::run_backfill(&db, &fetcher, &backfill);
            print_summary(&report);
            let closed = db.close();

            if let StopReason::Fatal(e) = report.stop {
                return Err(e).context(format!(
                    "Scrape aborted, raw content dumped to {}",
                    backfill.dump_path.display()
                ));
            }
            closed.context("Failed to commit database")?;
        }

        Commands::Report { kind, json } => {
            let db = Database::open(&db_path, &OpenOptions::read_only())
                .context("Failed to open database")?;

            match kind {
                ReportKind::TransmissionsPerSong => {
                    let rows = db.transmissions_per_song().context("Query failed")?;
                    if !print_json(json, &rows)? {
                        println!("{:>6}  {:<30} {}", "Plays", "Artist", "Title");
                        println!("{}", "-".repeat(80));
                        for r in &rows {
                            println!(
                                "{:>6}  {:<30} {}",
                                r.transmission_count,
                                truncate(&r.artist_name, 30),
                                r.song_title
                            );
                        }
                    }
                }
                ReportKind::SongsPerArtist => {
                    let rows = db.songs_per_artist().context("Query failed")?;
                    if !print_json(json, &rows)? {
                        println!("{:>6}  {}", "Songs", "Artist");
                        println!("{}", "-".repeat(50));
                        for r in &rows {
                            println!("{:>6}  {}", r.song_count, r.artist_name);
                        }
                    }
                }
                ReportKind::Songs => {
                    let rows = db.songs().context("Query failed")?;
                    if !print_json(json, &rows)? {
                        for r in &rows {
                            println!("{:<30} {}", truncate(&r.artist_name, 30), r.song_title);
                        }
                    }
                }
                ReportKind::Transmissions => {
                    let rows = db.transmissions().context("Query failed")?;
                    if !print_json(json, &rows)? {
                        for r in &rows {
                            println!(
                                "{:<12} {:<17} {:<30} {}",
                                truncate(&r.station_name, 12),
                                r.transmission_datetime,
                                truncate(&r.artist_name, 30),
                                r.song_title
                            );
                        }
                    }
                }
            }
        }

        Commands::Stats => {
            let db = Database::open(&db_path, &OpenOptions::read_only())
                .context("Failed to open database")?;
            let stats = db.stats().context("Failed to get stats")?;
            println!("Song History Statistics");
            println!("=======================");
            println!("Artists:        {}", stats.artists);
            println!("Songs:          {}", stats.songs);
            println!("Stations:       {}", stats.stations);
            println!("Transmissions:  {}", stats.transmissions);
        }
    }

    Ok(())
}

fn yesterday() -> NaiveDate {
    let today = Local::now().date_naive();
    today.pred_opt().unwrap_or(today)
}

/// Print the end-of-run summary, whatever ended the run.
fn print_summary(report: &BackfillReport) {
    let fmt_date = |d: Option<NaiveDate>| d.map_or_else(|| "-".to_string(), |d| d.to_string());

    println!();
    match &report.stop {
        StopReason::Exhausted { date, hour } => {
            println!("Finished! No more playlist data at {date} hour {hour}.")
        }
        StopReason::DayLimit => println!("Finished! Reached the day limit."),
        StopReason::Fatal(e) => println!("Aborted: {e}"),
    }
    println!(
        "Processed dates in range {}...{} ({} hours)",
        fmt_date(report.date_min),
        fmt_date(report.date_max),
        report.units_processed
    );
    println!("  # artists added:       {}", report.stats.artists_added);
    println!("  # songs added:         {}", report.stats.songs_added);
    println!("  # stations added:      {}", report.stats.stations_added);
    println!("  # transmissions added: {}", report.stats.transmissions_added);
}

/// Print rows as JSON when requested. Returns whether anything was printed.
fn print_json<T: Serialize>(json: bool, rows: &[T]) -> Result<bool> {
    if json {
        println!("{}", serde_json::to_string_pretty(rows)?);
    }
    Ok(json)
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let cut: String = s.chars().take(width - 3).collect();
        format!("{cut}...")
    } else {
        s.to_string()
    }
}
