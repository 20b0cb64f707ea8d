//! Subcommand implementations.
//!
//! Each command writes its human-readable report to `out` and returns an
//! error for structural failures; `main` turns that into `Error: ...` and a
//! non-zero exit.

use std::error::Error;
use std::io::{self, Write};
use std::path::Path;

use clap::ValueEnum;
use sensorlog::query::{Bound, parse_bound};
use sensorlog::{LoadSummary, Loader, SensorRef, Series, SeriesQuery, Store};

/// Timestamp format used when printing readings, identical to storage.
const OUTPUT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Result type of every command.
pub type CommandResult = Result<(), Box<dyn Error>>;

/// Output format for query results.
#[derive(Clone, ValueEnum)]
pub enum OutputFormat {
    /// Comma-separated values.
    Csv,
    /// JSON object of parallel arrays.
    Json,
}

/// Implements `sensorlog import <sensor> <csv_file>`.
pub fn import(db: &Path, sensor: &str, csv_file: &Path, out: &mut dyn Write) -> CommandResult {
    writeln!(out, "Connecting database: {}", db.display())?;
    let mut store = Store::open(db)?;

    let reference: SensorRef = sensor.parse()?;
    let sensor_id = store.sensors().resolve_or_create(&reference)?;
    writeln!(out, "Sensor '{sensor}' (ID: {sensor_id})")?;

    writeln!(out, "Loading data from: {}", csv_file.display())?;
    let mut progress_error = None;
    let summary = Loader::new().load_path(&mut store, sensor_id, csv_file, &mut |percent: u8| {
        if progress_error.is_none() {
            progress_error = write_progress(out, percent).err();
        }
    })?;
    if let Some(e) = progress_error {
        return Err(e.into());
    }

    write_summary(out, &summary)?;
    writeln!(out)?;
    writeln!(out, "Operation completed")?;

    Ok(())
}

/// Writes progress steps on one line, ending it at 100%.
fn write_progress(out: &mut dyn Write, percent: u8) -> io::Result<()> {
    if percent >= 100 {
        writeln!(out, "100%")
    } else {
        write!(out, "{percent}% ... ")?;
        out.flush()
    }
}

fn write_summary(out: &mut dyn Write, summary: &LoadSummary) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "Loaded rows:\t{}", summary.loaded)?;
    writeln!(out, "Skipped rows:\t{}", summary.skipped)?;
    writeln!(out, "Duplicate rows:\t{}", summary.duplicates)?;

    if !summary.errors.is_empty() {
        writeln!(out)?;
        writeln!(out, "Errors:")?;
        for error in &summary.errors {
            writeln!(out, " - {error}")?;
        }
    }
    Ok(())
}

/// Implements `sensorlog query`.
pub fn query(
    db: &Path,
    sensor_id: Option<i64>,
    start: Option<&str>,
    end: Option<&str>,
    format: &OutputFormat,
    out: &mut dyn Write,
) -> CommandResult {
    let store = Store::open(db)?;

    let query = SeriesQuery {
        sensor_id,
        start: start.map(|s| parse_bound(s, Bound::Start)).transpose()?,
        end: end.map(|s| parse_bound(s, Bound::End)).transpose()?,
    };
    let series = store.query(&query)?;
    tracing::debug!(?query, points = series.len(), "query complete");

    if series.is_empty() {
        return Err("No data available!".into());
    }

    match format {
        OutputFormat::Csv => write_csv(out, &series)?,
        OutputFormat::Json => writeln!(
            out,
            "{}",
            serde_json::to_string_pretty(&series_json(&series))?
        )?,
    }

    Ok(())
}

fn write_csv(out: &mut dyn Write, series: &Series) -> io::Result<()> {
    if let Some(sensor) = &series.sensor {
        writeln!(
            out,
            "# sensor={}, id={}, points={}",
            sensor.name,
            sensor.id,
            series.len()
        )?;
    }
    writeln!(out, "date,temp,rh")?;
    for ((date, temp), rh) in series.date.iter().zip(&series.temp).zip(&series.rh) {
        writeln!(out, "{},{temp:.1},{rh}", date.format(OUTPUT_TIMESTAMP_FORMAT))?;
    }
    Ok(())
}

fn series_json(series: &Series) -> serde_json::Value {
    let dates: Vec<String> = series
        .date
        .iter()
        .map(|d| d.format(OUTPUT_TIMESTAMP_FORMAT).to_string())
        .collect();

    serde_json::json!({
        "sensor": series.sensor,
        "date": dates,
        "temp": series.temp,
        "rh": series.rh,
    })
}

/// Implements `sensorlog sensors`.
pub fn sensors(db: &Path, out: &mut dyn Write) -> CommandResult {
    let store = Store::open(db)?;
    let sensors = store.sensors().list()?;

    writeln!(out, "Database: {}", db.display())?;
    writeln!(out, "Sensors: {}", sensors.len())?;
    for sensor in &sensors {
        let count = store.reading_count(Some(sensor.id))?;
        writeln!(out, "  {:>4}  {} ({count} readings)", sensor.id, sensor.name)?;
    }

    let (min, max) = store.date_bounds()?;
    let [min, max] = [min, max].map(|bound| {
        bound.map_or_else(|| "-".to_string(), |d| d.format(OUTPUT_TIMESTAMP_FORMAT).to_string())
    });
    writeln!(out)?;
    writeln!(out, "Date range: {min} .. {max}")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::{TempDir, tempdir};

    const HEADER: &str = "Date,Temperature_Celsius(℃),Relative_Humidity(%)";

    /// Helper to lay out a database path and a CSV export in a temp dir.
    fn setup(body: &str) -> (TempDir, PathBuf, PathBuf) {
        let temp_dir = tempdir().unwrap();
        let db = temp_dir.path().join("sensor_data.db");
        let csv = temp_dir.path().join("export.csv");
        fs::write(&csv, format!("{HEADER}\n{body}")).unwrap();
        (temp_dir, db, csv)
    }

    fn run_import(db: &Path, sensor: &str, csv: &Path) -> (CommandResult, String) {
        let mut out = Vec::new();
        let result = import(db, sensor, csv, &mut out);
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_import_with_skipped_rows_succeeds() {
        let (_temp_dir, db, csv) = setup(
            "01/01/2024 10:00,21.5,45\n\
             01/01/2024 10:00,99,45\n\
             31/13/2024 10:00,20,50\n",
        );

        let (result, output) = run_import(&db, "LivingRoom", &csv);

        assert!(result.is_ok());
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], format!("Connecting database: {}", db.display()));
        assert_eq!(lines[1], "Sensor 'LivingRoom' (ID: 1)");
        assert_eq!(lines[2], format!("Loading data from: {}", csv.display()));
        assert_eq!(lines[3], "30% ... 60% ... 100%");
        assert!(output.contains("Loaded rows:\t1\n"));
        assert!(output.contains("Skipped rows:\t2\n"));
        assert!(output.contains("Duplicate rows:\t0\n"));
        assert!(output.contains(" - Row 3: temperature"));
        assert!(output.contains(" - Row 4: invalid date '31/13/2024 10:00'"));
        assert_eq!(lines.last(), Some(&"Operation completed"));
    }

    #[test]
    fn test_import_missing_file_fails() {
        let (temp_dir, db, _) = setup("");
        let missing = temp_dir.path().join("absent.csv");

        let (result, output) = run_import(&db, "Kitchen", &missing);

        let err = result.unwrap_err();
        assert!(err.to_string().starts_with("file not found"));
        assert!(!output.contains("Operation completed"));
    }

    #[test]
    fn test_import_bad_schema_fails() {
        let temp_dir = tempdir().unwrap();
        let db = temp_dir.path().join("sensor_data.db");
        let csv = temp_dir.path().join("wrong.csv");
        fs::write(&csv, "Timestamp,Temp\n01/01/2024 10:00,21.5\n").unwrap();

        let (result, _) = run_import(&db, "Kitchen", &csv);

        assert!(result.unwrap_err().to_string().starts_with("schema error"));
    }

    #[test]
    fn test_query_outputs_csv() {
        let (_temp_dir, db, csv) = setup("01/01/2024 10:00,21.5,45\n01/01/2024 11:00,22,46\n");
        run_import(&db, "Kitchen", &csv).0.unwrap();

        let mut out = Vec::new();
        query(&db, None, Some("2024-01-01 11:00"), None, &OutputFormat::Csv, &mut out).unwrap();
        let output = String::from_utf8(out).unwrap();

        assert_eq!(
            output,
            "# sensor=Kitchen, id=1, points=1\ndate,temp,rh\n2024-01-01 11:00:00,22.0,46\n"
        );
    }

    #[test]
    fn test_query_outputs_json() {
        let (_temp_dir, db, csv) = setup("01/01/2024 10:00,21.5,45\n");
        run_import(&db, "Kitchen", &csv).0.unwrap();

        let mut out = Vec::new();
        query(&db, Some(1), None, None, &OutputFormat::Json, &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();

        assert_eq!(value["date"], serde_json::json!(["2024-01-01 10:00:00"]));
        assert_eq!(value["temp"], serde_json::json!([21.5]));
        assert_eq!(value["rh"], serde_json::json!([45]));
    }

    #[test]
    fn test_query_without_data_fails() {
        let temp_dir = tempdir().unwrap();
        let db = temp_dir.path().join("sensor_data.db");

        let mut out = Vec::new();
        let err = query(&db, None, None, None, &OutputFormat::Csv, &mut out).unwrap_err();

        assert_eq!(err.to_string(), "No data available!");
        assert!(out.is_empty());
    }

    #[test]
    fn test_sensors_lists_alphabetically() {
        let (_temp_dir, db, csv) = setup("01/01/2024 10:00,21.5,45\n");
        run_import(&db, "Zebra", &csv).0.unwrap();
        run_import(&db, "Attic", &csv).0.unwrap();

        let mut out = Vec::new();
        sensors(&db, &mut out).unwrap();
        let output = String::from_utf8(out).unwrap();

        let attic = output.find("Attic").unwrap();
        let zebra = output.find("Zebra").unwrap();
        assert!(attic < zebra);
        assert!(output.contains("Sensors: 2\n"));
        assert!(output.contains("Date range: 2024-01-01 10:00:00 .. 2024-01-01 10:00:00"));
    }
}
