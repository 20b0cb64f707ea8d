//! Error types for sensorlog.
//!
//! Structural failures (missing input, bad header, storage faults) are
//! [`SensorlogError`] values and abort the whole run. Problems with a single
//! CSV row are [`RowError`] values: they are rendered into the load summary
//! and never propagate past the batch boundary.

use std::path::PathBuf;

use thiserror::Error;

/// The main error type for all sensorlog operations.
#[derive(Error, Debug)]
pub enum SensorlogError {
    /// Error opening or writing the SQLite store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Structural error while ingesting a CSV source.
    #[error("{0}")]
    Ingest(#[from] IngestError),

    /// Error in the read query path.
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// Invalid CSV layout configuration.
    #[error("layout error: {0}")]
    Layout(#[from] LayoutError),
}

/// Errors raised by the storage layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The database file could not be opened or initialised.
    #[error("failed to open database '{}': {source}", path.display())]
    Open {
        /// The database path.
        path: PathBuf,
        /// The underlying SQLite error.
        #[source]
        source: rusqlite::Error,
    },

    /// A statement or transaction failed.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// Sensor creation kept colliding with concurrent writers.
    #[error("could not resolve sensor '{reference}' after {attempts} attempts")]
    SensorContention {
        /// The reference being resolved.
        reference: String,
        /// How many lookup/insert rounds were tried.
        attempts: u32,
    },
}

/// Structural errors that abort an import before or during streaming.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The CSV file does not exist.
    #[error("file not found: {}", path.display())]
    NotFound {
        /// The missing path.
        path: PathBuf,
    },

    /// The CSV file exists but could not be opened.
    #[error("failed to open '{}': {source}", path.display())]
    Io {
        /// The path that failed to open.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The source is empty, unreadable, or lacks required columns.
    #[error("schema error: {reason}")]
    Schema {
        /// What is wrong with the header.
        reason: String,
    },

    /// The target sensor does not exist.
    #[error("sensor {sensor_id} does not exist")]
    UnknownSensor {
        /// The requested sensor ID.
        sensor_id: i64,
    },
}

/// Errors raised by the read query path.
#[derive(Error, Debug)]
pub enum QueryError {
    /// A date filter could not be parsed.
    #[error("invalid date '{input}': expected YYYY-MM-DD[ HH:MM[:SS]]")]
    InvalidDate {
        /// The rejected text.
        input: String,
    },

    /// The start bound is after the end bound.
    #[error("invalid date range: start {start} is after end {end}")]
    InvalidRange {
        /// The start bound.
        start: String,
        /// The end bound.
        end: String,
    },
}

/// Errors in a [`CsvLayout`](crate::schema::CsvLayout).
#[derive(Error, Debug)]
pub enum LayoutError {
    /// A column name is empty.
    #[error("column name for {field} must not be empty")]
    EmptyColumn {
        /// Which field the column maps to.
        field: &'static str,
    },

    /// Two fields map to the same column.
    #[error("column '{column}' is mapped more than once")]
    DuplicateColumn {
        /// The duplicated column name.
        column: String,
    },
}

/// Reasons a single CSV data row is rejected.
///
/// The `Display` form is what ends up after `Row {n}: ` in the load summary.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RowError {
    /// The record could not be decoded by the CSV reader.
    #[error("malformed record: {reason}")]
    Malformed {
        /// Reader diagnostic.
        reason: String,
    },

    /// A required cell is absent from the record.
    #[error("missing value for column '{column}'")]
    MissingField {
        /// The column name.
        column: String,
    },

    /// The timestamp does not match the expected format.
    #[error("invalid date '{value}' (expected {format})")]
    InvalidTimestamp {
        /// The rejected cell.
        value: String,
        /// The expected `strftime` format.
        format: String,
    },

    /// The temperature is not a decimal number.
    #[error("invalid temperature '{value}'")]
    InvalidTemperature {
        /// The rejected cell.
        value: String,
    },

    /// The humidity is not an integer.
    #[error("invalid relative humidity '{value}'")]
    InvalidHumidity {
        /// The rejected cell.
        value: String,
    },

    /// The temperature is outside the plausible ambient range.
    #[error("temperature {value} outside human living range ({min}..={max})")]
    TemperatureOutOfRange {
        /// The parsed temperature.
        value: f64,
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },

    /// The humidity is not a valid percentage.
    #[error("relative humidity {value} is not a valid percentage")]
    HumidityOutOfRange {
        /// The parsed humidity.
        value: i64,
    },
}

/// Type alias for `Result<T, SensorlogError>`.
pub type Result<T> = std::result::Result<T, SensorlogError>;

impl From<rusqlite::Error> for SensorlogError {
    fn from(error: rusqlite::Error) -> Self {
        SensorlogError::Store(StoreError::Sqlite(error))
    }
}
