//! CSV layout configuration.
//!
//! The exporter that produces the CSV files names its columns with English
//! labels and embedded units. Those names and the timestamp format are fixed
//! constants; [`CsvLayout::default`] carries them and the ingestion pipeline
//! uses it unless told otherwise.

use csv::StringRecord;
use serde::{Deserialize, Serialize};

use crate::error::{IngestError, LayoutError};

/// Header of the timestamp column.
pub const DATE_COLUMN: &str = "Date";

/// Header of the temperature column.
pub const TEMPERATURE_COLUMN: &str = "Temperature_Celsius(℃)";

/// Header of the humidity column.
pub const HUMIDITY_COLUMN: &str = "Relative_Humidity(%)";

/// Timestamp format of the date column: `day/month/year hour:minute`.
pub const TIMESTAMP_FORMAT: &str = "%d/%m/%Y %H:%M";

/// Column names and timestamp format of an importable CSV file.
///
/// # Example
///
/// ```rust
/// use sensorlog::schema::CsvLayout;
///
/// let layout = CsvLayout::default();
/// assert_eq!(layout.date_column, "Date");
/// assert!(layout.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvLayout {
    /// Header of the timestamp column.
    pub date_column: String,
    /// Header of the temperature column.
    pub temperature_column: String,
    /// Header of the humidity column.
    pub humidity_column: String,
    /// `strftime` format of the timestamp cells.
    pub timestamp_format: String,
}

/// Positions of the required columns within a header row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnIndices {
    /// Index of the timestamp column.
    pub date: usize,
    /// Index of the temperature column.
    pub temperature: usize,
    /// Index of the humidity column.
    pub humidity: usize,
}

impl Default for CsvLayout {
    fn default() -> Self {
        Self {
            date_column: DATE_COLUMN.to_string(),
            temperature_column: TEMPERATURE_COLUMN.to_string(),
            humidity_column: HUMIDITY_COLUMN.to_string(),
            timestamp_format: TIMESTAMP_FORMAT.to_string(),
        }
    }
}

impl CsvLayout {
    /// Returns the required column names in display order.
    pub fn columns(&self) -> [&str; 3] {
        [
            self.date_column.as_str(),
            self.temperature_column.as_str(),
            self.humidity_column.as_str(),
        ]
    }

    /// Validates the layout.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::EmptyColumn`] if a column name is blank and
    /// [`LayoutError::DuplicateColumn`] if two fields share a column.
    pub fn validate(&self) -> Result<(), LayoutError> {
        let fields = ["date", "temperature", "humidity"];
        for (field, column) in fields.into_iter().zip(self.columns()) {
            if column.trim().is_empty() {
                return Err(LayoutError::EmptyColumn { field });
            }
        }

        let columns = self.columns();
        for (i, column) in columns.iter().enumerate() {
            if columns[i + 1..].contains(column) {
                return Err(LayoutError::DuplicateColumn {
                    column: (*column).to_string(),
                });
            }
        }

        Ok(())
    }

    /// Locates the required columns in a header row.
    ///
    /// Header cells are compared after trimming; extra columns are ignored
    /// and order does not matter.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Schema`] if the header is empty or any
    /// required column is missing.
    pub fn locate(&self, headers: &StringRecord) -> Result<ColumnIndices, IngestError> {
        if headers.iter().all(|h| h.trim().is_empty()) {
            return Err(IngestError::Schema {
                reason: "source is empty or has no header row".to_string(),
            });
        }

        let position = |name: &str| headers.iter().position(|h| h.trim() == name);
        let [date, temperature, humidity] = self.columns().map(position);

        match (date, temperature, humidity) {
            (Some(date), Some(temperature), Some(humidity)) => Ok(ColumnIndices {
                date,
                temperature,
                humidity,
            }),
            _ => {
                let missing: Vec<&str> = self
                    .columns()
                    .into_iter()
                    .filter(|name| position(*name).is_none())
                    .collect();
                Err(IngestError::Schema {
                    reason: format!(
                        "CSV must contain columns: {} (missing: {})",
                        self.columns().join(", "),
                        missing.join(", ")
                    ),
                })
            }
        }
    }
}
