//! Reading value types and per-field parsing.
//!
//! A [`Reading`] is one timestamped temperature/humidity sample for a
//! sensor. Parsing a CSV cell and checking its plausible range happen here so
//! the ingestion pipeline only has to stitch fields together.

use std::fmt;

use chrono::NaiveDateTime;
use rusqlite::ToSql;
use rusqlite::types::{FromSql, FromSqlResult, ToSqlOutput, ValueRef};
use serde::Serialize;

use crate::error::RowError;

/// Lowest plausible ambient temperature, in °C.
pub const MIN_TEMPERATURE: f64 = -50.0;

/// Highest plausible ambient temperature, in °C.
pub const MAX_TEMPERATURE: f64 = 60.0;

/// Highest relative humidity, in percent.
pub const MAX_HUMIDITY: i64 = 100;

/// One temperature/humidity sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Reading {
    /// The sensor this sample belongs to.
    pub sensor_id: i64,
    /// Sample time, minute precision.
    pub timestamp: NaiveDateTime,
    /// Temperature in °C.
    pub temperature: Temperature,
    /// Relative humidity in percent.
    pub humidity: u8,
}

/// A temperature with one fractional digit, held as tenths of a degree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(into = "f64")]
pub struct Temperature(i32);

impl Temperature {
    /// Rounds `celsius` to the nearest tenth.
    ///
    /// Callers are expected to range-check first; the value is clamped to
    /// the `i32` domain.
    #[allow(clippy::cast_possible_truncation)] // validated range is far inside i32
    pub fn from_celsius(celsius: f64) -> Self {
        Self((celsius * 10.0).round() as i32)
    }

    /// Returns the value in °C.
    pub fn celsius(self) -> f64 {
        f64::from(self.0) / 10.0
    }

    /// Returns the value in tenths of a degree.
    pub fn tenths(self) -> i32 {
        self.0
    }
}

impl From<Temperature> for f64 {
    fn from(temperature: Temperature) -> Self {
        temperature.celsius()
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}", self.celsius())
    }
}

/// Stored as a `REAL` in the `temp` column.
impl ToSql for Temperature {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.celsius()))
    }
}

impl FromSql for Temperature {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        f64::column_result(value).map(Self::from_celsius)
    }
}

/// Parses a timestamp cell with the given `strftime` format.
///
/// # Errors
///
/// Returns [`RowError::InvalidTimestamp`] if the cell does not match.
pub fn parse_timestamp(value: &str, format: &str) -> Result<NaiveDateTime, RowError> {
    NaiveDateTime::parse_from_str(value, format).map_err(|_| RowError::InvalidTimestamp {
        value: value.to_string(),
        format: format.to_string(),
    })
}

/// Parses and range-checks a temperature cell.
///
/// Both `.` and `,` are accepted as the fractional separator, so `21.5` and
/// `21,5` are the same reading.
///
/// # Errors
///
/// Returns [`RowError::InvalidTemperature`] if the cell is not a finite
/// decimal and [`RowError::TemperatureOutOfRange`] if it lies outside
/// [`MIN_TEMPERATURE`]..=[`MAX_TEMPERATURE`].
pub fn parse_temperature(value: &str) -> Result<Temperature, RowError> {
    let celsius: f64 = value
        .replace(',', ".")
        .parse()
        .ok()
        .filter(|v: &f64| v.is_finite())
        .ok_or_else(|| RowError::InvalidTemperature {
            value: value.to_string(),
        })?;

    if !(MIN_TEMPERATURE..=MAX_TEMPERATURE).contains(&celsius) {
        return Err(RowError::TemperatureOutOfRange {
            value: celsius,
            min: MIN_TEMPERATURE,
            max: MAX_TEMPERATURE,
        });
    }

    Ok(Temperature::from_celsius(celsius))
}

/// Parses and range-checks a relative humidity cell.
///
/// # Errors
///
/// Returns [`RowError::InvalidHumidity`] if the cell is not an integer and
/// [`RowError::HumidityOutOfRange`] if it is not within `0..=100`.
pub fn parse_humidity(value: &str) -> Result<u8, RowError> {
    let percent: i64 = value.parse().map_err(|_| RowError::InvalidHumidity {
        value: value.to_string(),
    })?;

    if !(0..=MAX_HUMIDITY).contains(&percent) {
        return Err(RowError::HumidityOutOfRange { value: percent });
    }

    u8::try_from(percent).map_err(|_| RowError::HumidityOutOfRange { value: percent })
}
