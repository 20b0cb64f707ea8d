//! Store module for sensorlog.
//!
//! The [`Store`] owns the SQLite connection that every other component works
//! through. There is no process-wide connection: callers open a store, pass
//! it explicitly to the sensor directory, the ingestion pipeline and the
//! query layer, and drop it when done.
//!
//! # Schema
//!
//! ```text
//! sensors(sensor_id INTEGER PRIMARY KEY, name TEXT UNIQUE NOT NULL)
//!   + unique index on the trimmed, uppercased name
//! sensor_data(sensor_id, date, temp, rh)
//!   PRIMARY KEY (sensor_id, date), FOREIGN KEY sensor_id -> sensors
//! ```
//!
//! `date` is stored as `YYYY-MM-DD HH:MM:SS` text, so lexical order is time
//! order and range filters can compare strings.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use sensorlog::store::Store;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::open("sensor_data.db")?;
//! println!("{} readings", store.reading_count(None)?);
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OptionalExtension, Transaction, params};

use crate::error::{Result, StoreError};

/// Returns the SQL expression that normalizes `operand` as a sensor name.
///
/// The same expression backs the unique index, so lookups and the
/// uniqueness constraint always agree on which names are equivalent.
pub(crate) fn normalized_sql(operand: &str) -> String {
    format!("UPPER(TRIM({operand}, {NAME_PADDING}))")
}

/// Default database file used by the CLI.
pub const DEFAULT_DB_PATH: &str = "sensor_data.db";

/// How long a writer waits on a locked database before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Characters stripped from both ends of a sensor name before matching:
/// space, tab, LF, VT, FF, CR.
const NAME_PADDING: &str = "char(32, 9, 10, 11, 12, 13)";

// language=sql
const SENSORS_TABLE: &str = r"
    CREATE TABLE IF NOT EXISTS sensors (
        sensor_id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT UNIQUE NOT NULL
    );
";

// language=sql
const READINGS_TABLE: &str = r"
    CREATE TABLE IF NOT EXISTS sensor_data (
        sensor_id INTEGER NOT NULL,
        date DATETIME NOT NULL,
        temp DECIMAL(3,1) NOT NULL,
        rh INTEGER NOT NULL,
        FOREIGN KEY (sensor_id) REFERENCES sensors(sensor_id),
        PRIMARY KEY (sensor_id, date)
    );
";

/// Handle to a sensorlog SQLite database.
///
/// # Thread Safety
///
/// A `Store` wraps a single `rusqlite::Connection` and is meant to be used
/// from one thread. Separate processes may open the same file; uniqueness
/// constraints in the schema keep concurrent imports consistent.
#[derive(Debug)]
pub struct Store {
    /// Database location, `:memory:` for in-memory stores.
    path: PathBuf,
    /// The wrapped SQLite connection.
    connection: Connection,
}

impl Store {
    /// Opens (or creates) the database at `path` and ensures the schema.
    ///
    /// The connection runs with foreign keys enforced, WAL journaling so
    /// readers are not blocked by an import, and a busy timeout.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Open`] if the file cannot be opened or the
    /// schema cannot be applied (for example when an existing database holds
    /// two sensor names that differ only by case).
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let open_error = |source| StoreError::Open {
            path: path.clone(),
            source,
        };

        let connection = Connection::open(&path).map_err(open_error)?;
        initialize(&connection, true).map_err(open_error)?;
        tracing::debug!(path = %path.display(), "opened store");

        Ok(Self { path, connection })
    }

    /// Opens a private in-memory database with the full schema.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Open`] if SQLite fails to initialise.
    pub fn open_in_memory() -> Result<Self> {
        let path = PathBuf::from(":memory:");
        let open_error = |source| StoreError::Open {
            path: path.clone(),
            source,
        };

        let connection = Connection::open_in_memory().map_err(open_error)?;
        initialize(&connection, false).map_err(open_error)?;

        Ok(Self { path, connection })
    }

    /// Returns the database location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the underlying connection for read-only tooling.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Starts a transaction; it rolls back unless committed.
    pub(crate) fn transaction(&mut self) -> Result<Transaction<'_>> {
        Ok(self.connection.transaction()?)
    }

    /// Counts stored readings, optionally for a single sensor.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if the query fails.
    pub fn reading_count(&self, sensor_id: Option<i64>) -> Result<u64> {
        let count: i64 = self
            .connection
            // language=sql
            .prepare_cached(
                r"SELECT COUNT(*) FROM sensor_data WHERE ?1 IS NULL OR sensor_id = ?1",
            )?
            .query_row(params![sensor_id], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Counts registered sensors.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if the query fails.
    pub fn sensor_count(&self) -> Result<u64> {
        let count: i64 = self
            .connection
            // language=sql
            .prepare_cached(r"SELECT COUNT(*) FROM sensors")?
            .query_row([], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Returns whether a sensor with this ID exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if the query fails.
    pub fn has_sensor(&self, sensor_id: i64) -> Result<bool> {
        Ok(self
            .connection
            // language=sql
            .prepare_cached(r"SELECT 1 FROM sensors WHERE sensor_id = ?1")?
            .query_row(params![sensor_id], |_| Ok(()))
            .optional()?
            .is_some())
    }
}

/// Applies connection settings and the schema.
fn initialize(connection: &Connection, on_disk: bool) -> rusqlite::Result<()> {
    connection.pragma_update(None, "foreign_keys", "ON")?;
    connection.busy_timeout(BUSY_TIMEOUT)?;
    if on_disk {
        let mode: String =
            connection.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::trace!(%mode, "journal mode");
    }
    connection.execute_batch(SENSORS_TABLE)?;
    // Equivalent names may not coexist, whatever their case or padding.
    connection.execute_batch(&format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS sensors_name_key ON sensors ({});",
        normalized_sql("name")
    ))?;
    connection.execute_batch(READINGS_TABLE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_in_memory_creates_schema() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.sensor_count().unwrap(), 0);
        assert_eq!(store.reading_count(None).unwrap(), 0);
        assert_eq!(store.path(), Path::new(":memory:"));
    }

    #[test]
    fn test_open_file_is_reopenable() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("store.db");

        {
            let store = Store::open(&db_path).unwrap();
            store
                .connection()
                .execute("INSERT INTO sensors (name) VALUES ('Kitchen')", [])
                .unwrap();
        }

        let store = Store::open(&db_path).unwrap();
        assert_eq!(store.sensor_count().unwrap(), 1);
        assert!(store.has_sensor(1).unwrap());
        assert!(!store.has_sensor(2).unwrap());
    }

    #[test]
    fn test_open_unwritable_location_fails() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("missing_dir").join("store.db");

        let err = Store::open(&db_path).unwrap_err();
        assert!(err.to_string().contains("failed to open database"));
    }

    #[test]
    fn test_foreign_keys_enforced() {
        let store = Store::open_in_memory().unwrap();
        let result = store.connection().execute(
            "INSERT INTO sensor_data (sensor_id, date, temp, rh) VALUES (99, '2024-01-01 10:00:00', 20.0, 40)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_normalized_name_unique() {
        let store = Store::open_in_memory().unwrap();
        store
            .connection()
            .execute("INSERT INTO sensors (name) VALUES ('Kitchen')", [])
            .unwrap();
        let result = store
            .connection()
            .execute("INSERT INTO sensors (name) VALUES (' KITCHEN' || char(9))", []);
        assert!(result.is_err());
    }

    #[test]
    fn test_transaction_rolls_back_on_drop() {
        let mut store = Store::open_in_memory().unwrap();
        {
            let tx = store.transaction().unwrap();
            tx.execute("INSERT INTO sensors (name) VALUES ('Attic')", [])
                .unwrap();
        }
        assert_eq!(store.sensor_count().unwrap(), 0);
    }
}
