//! CSV ingestion pipeline.
//!
//! [`Loader`] streams a CSV export into the `sensor_data` table for one
//! sensor. Every data row is parsed, range-checked and inserted
//! independently: a bad row is skipped and reported, never fatal. Only
//! structural problems (missing file, unusable header, storage faults) abort
//! the run.
//!
//! # Lifecycle
//!
//! ```text
//! OPEN ─▶ VALIDATING_HEADER ─┬─▶ FAILED (schema)
//!                            └─▶ STREAMING ⟲ per row ─┬─▶ COMMITTED
//!                                                     └─▶ FAILED (storage)
//! ```
//!
//! The whole batch runs in one transaction. If any write fails structurally
//! the transaction is dropped and no row from the batch becomes visible.
//!
//! # Counting
//!
//! - `loaded` counts rows that created a new reading
//! - `duplicates` counts valid rows whose `(sensor, timestamp)` was already
//!   stored (by an earlier import or earlier in the same file)
//! - `skipped` counts rows rejected by parsing or validation; each one has a
//!   matching `"Row {n}: {reason}"` entry in `errors`
//!
//! Row numbers follow spreadsheet numbering: the header is row 1, the first
//! data row is row 2.
//!
//! # Example
//!
//! ```rust
//! use sensorlog::ingest::Loader;
//! use sensorlog::sensor::SensorRef;
//! use sensorlog::store::Store;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = Store::open_in_memory()?;
//! let sensor_id = store.sensors().resolve_or_create(&SensorRef::Name("Kitchen".into()))?;
//!
//! let csv = "Date,Temperature_Celsius(℃),Relative_Humidity(%)\n\
//!            01/01/2024 10:00,\"21,5\",45\n\
//!            31/13/2024 10:01,21.7,46\n";
//! let summary = Loader::new().load(&mut store, sensor_id, csv.as_bytes())?;
//! assert_eq!(summary.loaded, 1);
//! assert_eq!(summary.skipped, 1);
//! # Ok(())
//! # }
//! ```

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use rusqlite::params;
use serde::Serialize;

use crate::error::{IngestError, Result, RowError};
use crate::reading::{self, Reading};
use crate::schema::{ColumnIndices, CsvLayout};
use crate::store::Store;

// language=sql
const INSERT_READING: &str = r"
    INSERT INTO sensor_data (sensor_id, date, temp, rh)
    VALUES (?1, ?2, ?3, ?4)
    ON CONFLICT (sensor_id, date) DO NOTHING
";

/// Outcome of a completed import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    /// Rows that created a new reading.
    pub loaded: u64,
    /// Rows rejected by parsing or validation.
    pub skipped: u64,
    /// Valid rows whose reading already existed.
    pub duplicates: u64,
    /// One `"Row {n}: {reason}"` message per skipped row, in file order.
    pub errors: Vec<String>,
}

impl LoadSummary {
    /// Total number of data rows seen.
    pub fn rows(&self) -> u64 {
        self.loaded + self.skipped + self.duplicates
    }

    fn reject(&mut self, row: usize, error: &RowError) {
        tracing::debug!(row, %error, "skipping row");
        self.skipped += 1;
        self.errors.push(format!("Row {row}: {error}"));
    }
}

/// Observer for coarse import progress.
///
/// Receives percentages in steps of ten (10 through 100), each at most once,
/// always ending with 100 for a committed import. Progress is informational
/// only and has no influence on the [`LoadSummary`].
pub trait Progress {
    /// Called when the import crosses a new percentage step.
    fn report(&mut self, percent: u8);
}

/// A [`Progress`] that ignores every report.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn report(&mut self, _percent: u8) {}
}

impl<F: FnMut(u8)> Progress for F {
    fn report(&mut self, percent: u8) {
        self(percent);
    }
}

/// Turns row counts into 10% progress steps.
#[derive(Debug)]
struct ProgressSteps {
    total: usize,
    done: usize,
    /// Last reported step; 0 counts as reported so the first report is real
    /// progress.
    last_step: u8,
}

impl ProgressSteps {
    fn new(total: usize) -> Self {
        Self {
            total,
            done: 0,
            last_step: 0,
        }
    }

    /// Records one processed row and reports a step if one was crossed.
    fn advance<P: Progress + ?Sized>(&mut self, progress: &mut P) {
        self.done += 1;
        let percent = self.done * 100 / self.total.max(1);
        #[allow(clippy::cast_possible_truncation)] // percent <= 100
        let step = (percent.min(100) / 10 * 10) as u8;
        self.emit(step, progress);
    }

    /// Reports 100% unless it was already reported.
    fn finish<P: Progress + ?Sized>(&mut self, progress: &mut P) {
        self.emit(100, progress);
    }

    fn emit<P: Progress + ?Sized>(&mut self, step: u8, progress: &mut P) {
        if step > self.last_step {
            self.last_step = step;
            progress.report(step);
        }
    }
}

/// Imports CSV exports into a [`Store`].
#[derive(Debug, Clone, Default)]
pub struct Loader {
    layout: CsvLayout,
}

impl Loader {
    /// Creates a loader for the standard export layout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a loader for a custom layout.
    ///
    /// # Errors
    ///
    /// Returns a layout error if `layout` fails [`CsvLayout::validate`].
    pub fn with_layout(layout: CsvLayout) -> Result<Self> {
        layout.validate()?;
        Ok(Self { layout })
    }

    /// Returns the layout this loader expects.
    pub fn layout(&self) -> &CsvLayout {
        &self.layout
    }

    /// Imports the CSV file at `path` for `sensor_id`.
    ///
    /// # Errors
    ///
    /// See [`Loader::load_with_progress`]; additionally returns
    /// [`IngestError::NotFound`] if `path` does not exist.
    pub fn load_path<P: AsRef<Path>, G: Progress + ?Sized>(
        &self,
        store: &mut Store,
        sensor_id: i64,
        path: P,
        progress: &mut G,
    ) -> Result<LoadSummary> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| match source.kind() {
            io::ErrorKind::NotFound => IngestError::NotFound {
                path: path.to_path_buf(),
            },
            _ => IngestError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;

        tracing::debug!(path = %path.display(), sensor_id, "loading file");
        self.load_with_progress(store, sensor_id, BufReader::new(file), progress)
    }

    /// Imports CSV data from `source` for `sensor_id`, without progress.
    ///
    /// # Errors
    ///
    /// See [`Loader::load_with_progress`].
    pub fn load<R: Read>(&self, store: &mut Store, sensor_id: i64, source: R) -> Result<LoadSummary> {
        self.load_with_progress(store, sensor_id, source, &mut NoProgress)
    }

    /// Imports CSV data from `source` for `sensor_id`.
    ///
    /// Row-level problems are collected in the returned [`LoadSummary`].
    ///
    /// # Errors
    ///
    /// - [`IngestError::UnknownSensor`] if `sensor_id` is not registered
    /// - [`IngestError::Schema`] if the source is empty, unreadable or lacks
    ///   a required column; nothing is written
    /// - [`StoreError`](crate::error::StoreError) if the batch cannot be
    ///   written; the transaction is rolled back
    pub fn load_with_progress<R: Read, G: Progress + ?Sized>(
        &self,
        store: &mut Store,
        sensor_id: i64,
        source: R,
        progress: &mut G,
    ) -> Result<LoadSummary> {
        if !store.has_sensor(sensor_id)? {
            return Err(IngestError::UnknownSensor { sensor_id }.into());
        }

        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(Trim::All)
            .from_reader(source);

        let headers = reader
            .headers()
            .map_err(|e| IngestError::Schema {
                reason: format!("source is unreadable: {e}"),
            })?
            .clone();
        let columns = self.layout.locate(&headers)?;

        // Buffered so progress can be expressed against a known total.
        let mut records = Vec::new();
        for record in reader.into_records() {
            match record {
                Err(e) if e.is_io_error() => {
                    return Err(IngestError::Schema {
                        reason: format!("source is unreadable: {e}"),
                    }
                    .into());
                }
                other => records.push(other),
            }
        }
        tracing::debug!(rows = records.len(), sensor_id, "header accepted, streaming rows");

        let mut summary = LoadSummary::default();
        let mut steps = ProgressSteps::new(records.len());

        let tx = store.transaction()?;
        {
            let mut insert = tx.prepare_cached(INSERT_READING)?;

            for (index, record) in records.into_iter().enumerate() {
                let row = index + 2;
                let parsed = record
                    .map_err(|e| RowError::Malformed {
                        reason: e.to_string(),
                    })
                    .and_then(|record| self.parse_row(sensor_id, &record, columns));

                match parsed {
                    Ok(reading) => {
                        let inserted = insert.execute(params![
                            reading.sensor_id,
                            reading.timestamp,
                            reading.temperature,
                            reading.humidity,
                        ])?;
                        if inserted == 0 {
                            summary.duplicates += 1;
                        } else {
                            summary.loaded += 1;
                        }
                    }
                    Err(error) => summary.reject(row, &error),
                }

                steps.advance(progress);
            }
        }
        tx.commit()?;
        steps.finish(progress);

        tracing::info!(
            sensor_id,
            loaded = summary.loaded,
            skipped = summary.skipped,
            duplicates = summary.duplicates,
            "import committed"
        );
        Ok(summary)
    }

    /// Parses and validates one data record.
    fn parse_row(
        &self,
        sensor_id: i64,
        record: &StringRecord,
        columns: ColumnIndices,
    ) -> std::result::Result<Reading, RowError> {
        let timestamp = reading::parse_timestamp(
            cell(record, columns.date, &self.layout.date_column)?,
            &self.layout.timestamp_format,
        )?;
        let temperature = reading::parse_temperature(cell(
            record,
            columns.temperature,
            &self.layout.temperature_column,
        )?)?;
        let humidity =
            reading::parse_humidity(cell(record, columns.humidity, &self.layout.humidity_column)?)?;

        Ok(Reading {
            sensor_id,
            timestamp,
            temperature,
            humidity,
        })
    }
}

fn cell<'r>(record: &'r StringRecord, index: usize, column: &str) -> std::result::Result<&'r str, RowError> {
    record.get(index).ok_or_else(|| RowError::MissingField {
        column: column.to_string(),
    })
}
