//! Example demonstrating a full import and query cycle.
//!
//! This example shows how to:
//! - Open a store and register sensors by name
//! - Import an export with a progress callback
//! - Inspect rejected rows
//! - Re-import the same file without duplicating readings
//! - Query a date range back out

use sensorlog::query::{Bound, parse_bound};
use sensorlog::{Loader, SensorRef, SeriesQuery, Store};
use std::fs;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("sensorlog import demo");

    let temp_dir = tempfile::tempdir()?;
    let db_path = temp_dir.path().join("sensor_data.db");
    let csv_path = temp_dir.path().join("living_room.csv");

    // A short export with one bad date and one implausible temperature
    fs::write(
        &csv_path,
        "Date,Temperature_Celsius(℃),Relative_Humidity(%)\n\
         14/02/2024 07:00,\"19,8\",52\n\
         14/02/2024 07:30,20.1,51\n\
         14/02/2024 08:00,85.0,50\n\
         30/02/2024 08:30,20.6,49\n\
         15/02/2024 07:00,19.2,55\n",
    )?;

    let mut store = Store::open(&db_path)?;
    let sensor_id = store
        .sensors()
        .resolve_or_create(&"Living Room".parse::<SensorRef>()?)?;
    println!("\nSensor 'Living Room' has ID {sensor_id}");

    let loader = Loader::new();
    let summary = loader.load_path(&mut store, sensor_id, &csv_path, &mut |percent: u8| {
        println!("  {percent:>3}%");
    })?;

    println!("\nFirst import:");
    println!("  loaded:     {}", summary.loaded);
    println!("  skipped:    {}", summary.skipped);
    println!("  duplicates: {}", summary.duplicates);
    for error in &summary.errors {
        println!("  {error}");
    }

    let again = loader.load_path(&mut store, sensor_id, &csv_path, &mut |_: u8| {})?;
    println!(
        "\nSecond import: loaded {}, duplicates {}",
        again.loaded, again.duplicates
    );

    // Same sensor, different spelling
    let same = store
        .sensors()
        .resolve_or_create(&SensorRef::Name("  LIVING ROOM ".to_string()))?;
    assert_eq!(same, sensor_id);

    let series = store.query(&SeriesQuery {
        sensor_id: Some(sensor_id),
        start: Some(parse_bound("2024-02-14", Bound::Start)?),
        end: Some(parse_bound("2024-02-14", Bound::End)?),
    })?;

    println!("\nReadings on 2024-02-14:");
    for ((date, temp), rh) in series.date.iter().zip(&series.temp).zip(&series.rh) {
        println!("  {date}  {temp:>5.1} °C  {rh:>3} %");
    }

    Ok(())
}
