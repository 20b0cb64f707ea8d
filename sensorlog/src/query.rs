//! Read-only query projection over stored readings.
//!
//! This is the contract a charting front-end consumes: pick a sensor
//! (defaulting to the alphabetically-first one), optionally bound the time
//! range, and get the matching readings back in ascending time order as
//! three parallel sequences.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use sensorlog::query::{SeriesQuery, parse_bound, Bound};
//! use sensorlog::store::Store;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::open("sensor_data.db")?;
//! let query = SeriesQuery {
//!     sensor_id: None,
//!     start: Some(parse_bound("2024-01-01", Bound::Start)?),
//!     end: None,
//! };
//! let series = store.query(&query)?;
//! if series.is_empty() {
//!     println!("No data available!");
//! }
//! for (date, temp) in series.date.iter().zip(&series.temp) {
//!     println!("{date}: {temp}");
//! }
//! # Ok(())
//! # }
//! ```

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rusqlite::{OptionalExtension, params};
use serde::Serialize;

use crate::error::{QueryError, Result};
use crate::reading::Temperature;
use crate::sensor::Sensor;
use crate::store::Store;

/// Accepted date-time spellings for query bounds, most specific first.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

/// Which end of a range a bound is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// Inclusive lower bound; a bare date means its first second.
    Start,
    /// Inclusive upper bound; a bare date means its last second.
    End,
}

/// Filters for [`Store::query`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesQuery {
    /// Sensor to read; `None` applies the default sensor policy.
    pub sensor_id: Option<i64>,
    /// Inclusive lower bound.
    pub start: Option<NaiveDateTime>,
    /// Inclusive upper bound.
    pub end: Option<NaiveDateTime>,
}

impl SeriesQuery {
    /// Checks that the bounds are ordered.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidRange`] if `start` is after `end`.
    pub fn validate(&self) -> std::result::Result<(), QueryError> {
        match (self.start, self.end) {
            (Some(start), Some(end)) if start > end => Err(QueryError::InvalidRange {
                start: start.to_string(),
                end: end.to_string(),
            }),
            _ => Ok(()),
        }
    }
}

/// Readings of one sensor as parallel sequences, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Series {
    /// The sensor the readings belong to, `None` if no sensor matched.
    pub sensor: Option<Sensor>,
    /// Reading timestamps.
    pub date: Vec<NaiveDateTime>,
    /// Temperatures in °C.
    pub temp: Vec<f64>,
    /// Relative humidities in percent.
    pub rh: Vec<u8>,
}

impl Series {
    /// Returns `true` when no reading matched; callers show "no data".
    pub fn is_empty(&self) -> bool {
        self.date.is_empty()
    }

    /// Number of readings.
    pub fn len(&self) -> usize {
        self.date.len()
    }
}

impl Store {
    /// Selects the readings matching `query`, ordered by ascending time.
    ///
    /// An empty store, an unknown sensor, or a range without readings all
    /// yield an empty [`Series`] rather than an error.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidRange`] for inverted bounds and
    /// [`StoreError::Sqlite`](crate::error::StoreError::Sqlite) if the
    /// database query fails.
    pub fn query(&self, query: &SeriesQuery) -> Result<Series> {
        query.validate()?;

        let directory = self.sensors();
        let sensor = match query.sensor_id {
            Some(id) => directory.find(id)?,
            None => directory.default_sensor()?,
        };
        let Some(sensor) = sensor else {
            tracing::debug!(sensor_id = ?query.sensor_id, "no sensor to query");
            return Ok(Series::default());
        };

        let mut series = Series::default();
        {
            let mut statement = self
                .connection()
                // language=sql
                .prepare_cached(
                    r"
                    SELECT date, temp, rh FROM sensor_data
                    WHERE sensor_id = ?1
                      AND (?2 IS NULL OR date >= ?2)
                      AND (?3 IS NULL OR date <= ?3)
                    ORDER BY date ASC
                    ",
                )?;
            let rows = statement.query_map(params![sensor.id, query.start, query.end], |row| {
                Ok((
                    row.get::<_, NaiveDateTime>(0)?,
                    row.get::<_, Temperature>(1)?,
                    row.get::<_, u8>(2)?,
                ))
            })?;

            for row in rows {
                let (date, temp, rh) = row?;
                series.date.push(date);
                series.temp.push(temp.celsius());
                series.rh.push(rh);
            }
        }

        series.sensor = Some(sensor);
        Ok(series)
    }

    /// Returns the oldest and newest stored timestamps across all sensors.
    ///
    /// Both are `None` when nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`](crate::error::StoreError::Sqlite) if
    /// the query fails.
    pub fn date_bounds(&self) -> Result<(Option<NaiveDateTime>, Option<NaiveDateTime>)> {
        Ok(self
            .connection()
            // language=sql
            .prepare_cached(r"SELECT MIN(date), MAX(date) FROM sensor_data")?
            .query_row([], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?
            .unwrap_or((None, None)))
    }
}

/// Parses a query bound.
///
/// Accepts `YYYY-MM-DD HH:MM[:SS]`, the HTML `datetime-local` spelling
/// `YYYY-MM-DDTHH:MM[:SS]`, or a bare `YYYY-MM-DD`, which covers the whole
/// day for either bound.
///
/// # Errors
///
/// Returns [`QueryError::InvalidDate`] if no format matches.
pub fn parse_bound(input: &str, bound: Bound) -> std::result::Result<NaiveDateTime, QueryError> {
    let text = input.trim();

    if let Some(datetime) = DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
    {
        return Ok(datetime);
    }

    let invalid = || QueryError::InvalidDate {
        input: input.to_string(),
    };
    let date = NaiveDate::parse_from_str(text, "%Y-%m-%d").map_err(|_| invalid())?;
    match bound {
        Bound::Start => Ok(date.and_time(NaiveTime::MIN)),
        Bound::End => date.and_hms_opt(23, 59, 59).ok_or_else(invalid),
    }
}
