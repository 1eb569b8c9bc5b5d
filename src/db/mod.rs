pub mod models;
pub mod queries;
pub mod upsert;

use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("SQLite {actual} is older than the required {required}")]
    VersionTooOld { required: String, actual: String },
    #[error("Version specifier {required} doesn't match the shape of SQLite version {actual}")]
    VersionSpecMismatch { required: String, actual: String },
    #[error("Database file does not exist: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Database already exists, will not modify it: {}", .0.display())]
    AlreadyExists(PathBuf),
    #[error("Multiple {entity} rows match {key}")]
    DuplicateRows { entity: &'static str, key: String },
    #[error("Session transaction was rolled back by SQLite, pending writes are lost")]
    TransactionLost,
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Creates the schema for a store file that doesn't exist yet.
pub type Initializer = fn(&Path) -> Result<()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    ReadWrite,
    /// Enforced by SQLite: every write fails.
    ReadOnly,
}

/// How to open a session on the store.
#[derive(Clone, Copy)]
pub struct OpenOptions<'a> {
    pub mode: AccessMode,
    pub min_version: Option<&'a [u32]>,
    pub initializer: Option<Initializer>,
}

impl<'a> OpenOptions<'a> {
    pub fn read_write() -> Self {
        Self { mode: AccessMode::ReadWrite, min_version: None, initializer: None }
    }

    pub fn read_only() -> Self {
        Self { mode: AccessMode::ReadOnly, min_version: None, initializer: None }
    }

    pub fn min_version(mut self, version: &'a [u32]) -> Self {
        self.min_version = Some(version);
        self
    }

    pub fn initializer(mut self, init: Initializer) -> Self {
        self.initializer = Some(init);
        self
    }
}

/// An open session on the store.
///
/// Read-write sessions always have a transaction open. [`Database::checkpoint`]
/// commits it and starts the next one; the last one is committed exactly once,
/// by [`Database::close`] or on drop, whichever comes first, so work done
/// before an early return or a propagated error is kept.
pub struct Database {
    pub conn: Connection,
    mode: AccessMode,
    closed: bool,
}

impl Database {
    pub fn open(path: &Path, opts: &OpenOptions<'_>) -> Result<Self> {
        if let Some(required) = opts.min_version {
            check_version(&sqlite_version(), required)?;
        }

        if !path.exists() && opts.mode == AccessMode::ReadWrite {
            if let Some(init) = opts.initializer {
                log::info!("Initializing new database at {}", path.display());
                init(path)?;
            }
        }

        if !path.exists() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }

        let access = match opts.mode {
            AccessMode::ReadWrite => OpenFlags::SQLITE_OPEN_READ_WRITE,
            AccessMode::ReadOnly => OpenFlags::SQLITE_OPEN_READ_ONLY,
        };
        let conn = Connection::open_with_flags(path, access | OpenFlags::SQLITE_OPEN_NO_MUTEX)?;

        let db = Self { conn, mode: opts.mode, closed: false };
        db.begin()?;
        log::debug!("Opened {} ({:?})", path.display(), opts.mode);
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        create_schema(&conn, SCHEMA)?;
        let db = Self { conn, mode: AccessMode::ReadWrite, closed: false };
        db.begin()?;
        Ok(db)
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    fn begin(&self) -> Result<()> {
        self.conn.pragma_update(None, "foreign_keys", "ON")?;
        if self.mode == AccessMode::ReadWrite {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }

    /// Make everything written so far durable and keep the session open.
    /// No-op for read-only sessions.
    pub fn checkpoint(&self) -> Result<()> {
        if self.mode == AccessMode::ReadOnly {
            return Ok(());
        }
        self.commit_open_transaction()?;
        self.conn.execute_batch("BEGIN")?;
        Ok(())
    }

    /// Commit pending writes and release the session.
    pub fn close(mut self) -> Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        log::debug!("Closing database connection");
        if self.mode == AccessMode::ReadWrite {
            self.commit_open_transaction()?;
        }
        Ok(())
    }

    // SQLite rolls the transaction back by itself after errors like
    // SQLITE_FULL or SQLITE_IOERR; the connection is then in autocommit.
    fn commit_open_transaction(&self) -> Result<()> {
        if self.conn.is_autocommit() {
            log::error!("No open transaction to commit, writes since the last commit were rolled back");
            return Err(StoreError::TransactionLost);
        }
        self.conn.execute_batch("COMMIT")?;
        Ok(())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            log::error!("Failed to commit pending writes: {e}");
        }
    }
}

/// Version of the linked SQLite library as `[major, minor, patch]`.
pub fn sqlite_version() -> Vec<u32> {
    let n = rusqlite::version_number() as u32;
    vec![n / 1_000_000, (n / 1000) % 1000, n % 1000]
}

/// Fail unless `actual` is at least `required`, compared component-wise.
/// Both must have the same number of components.
pub fn check_version(actual: &[u32], required: &[u32]) -> Result<()> {
    let fmt = |v: &[u32]| v.iter().map(u32::to_string).collect::<Vec<_>>().join(".");

    if actual.len() != required.len() {
        return Err(StoreError::VersionSpecMismatch {
            required: fmt(required),
            actual: fmt(actual),
        });
    }
    if actual < required {
        return Err(StoreError::VersionTooOld {
            required: fmt(required),
            actual: fmt(actual),
        });
    }
    Ok(())
}

/// Create a new store file with the full schema.
/// Refuses to touch a file that already exists.
pub fn initialize_schema(path: &Path) -> Result<()> {
    create_store(path, SCHEMA)
}

/// Create `path` and apply `schema` atomically. A failed attempt removes
/// the file again so the next run starts from scratch.
fn create_store(path: &Path, schema: &str) -> Result<()> {
    if path.exists() {
        return Err(StoreError::AlreadyExists(path.to_path_buf()));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).ok();
    }

    let created = Connection::open(path)
        .map_err(StoreError::from)
        .and_then(|conn| create_schema(&conn, schema));
    if let Err(e) = created {
        log::error!("Schema creation failed, removing {}", path.display());
        std::fs::remove_file(path).ok();
        return Err(e);
    }
    Ok(())
}

fn create_schema(conn: &Connection, schema: &str) -> Result<()> {
    conn.execute_batch(&format!("BEGIN;\n{schema}\nCOMMIT;"))?;
    Ok(())
}

const SCHEMA: &str = "
        CREATE TABLE artists (
            artist_id   INTEGER PRIMARY KEY AUTOINCREMENT,
            artist_name TEXT NOT NULL,
            UNIQUE (artist_name)
        );

        CREATE TABLE songs (
            song_id    INTEGER PRIMARY KEY AUTOINCREMENT,
            artist_id  INTEGER NOT NULL
                REFERENCES artists (artist_id) ON UPDATE RESTRICT ON DELETE RESTRICT,
            song_title TEXT NOT NULL,
            UNIQUE (artist_id, song_title)
        );

        CREATE TABLE stations (
            station_id   INTEGER PRIMARY KEY AUTOINCREMENT,
            station_name TEXT NOT NULL,
            UNIQUE (station_name)
        );

        CREATE TABLE transmissions (
            transmission_id       INTEGER PRIMARY KEY AUTOINCREMENT,
            song_id               INTEGER NOT NULL
                REFERENCES songs (song_id) ON UPDATE RESTRICT ON DELETE RESTRICT,
            station_id            INTEGER NOT NULL
                REFERENCES stations (station_id) ON UPDATE RESTRICT ON DELETE RESTRICT,
            transmission_datetime TEXT NOT NULL,
            UNIQUE (song_id, station_id, transmission_datetime)
        );

        PRAGMA user_version = 1;
";
