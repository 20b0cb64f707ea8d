//! # sensorlog
//!
//! Idempotent CSV ingestion of temperature/humidity readings into SQLite.
//!
//! sensorlog loads timestamped exports from ambient sensors into a relational
//! store keyed by sensor and timestamp, and serves the stored series back
//! filtered by sensor and date range, ready for charting.
//!
//! ## Key Properties
//!
//! - Re-importing a file never duplicates readings: `(sensor, timestamp)` is
//!   the primary key and existing pairs are left untouched
//! - Bad rows are skipped and reported with their spreadsheet row number;
//!   only a missing file, an unusable header or a storage fault aborts a run
//! - Each import is a single transaction
//! - Sensors are referenced by ID or by name, matched case- and
//!   whitespace-insensitively, and created on first use
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sensorlog::{Loader, SensorRef, SeriesQuery, Store};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut store = Store::open("sensor_data.db")?;
//!
//! // Resolve (or create) the target sensor
//! let sensor_id = store.sensors().resolve_or_create(&"LivingRoom".parse::<SensorRef>()?)?;
//!
//! // Import an export
//! let summary = Loader::new().load_path(&mut store, sensor_id, "export.csv", &mut |percent: u8| {
//!     println!("{percent}%");
//! })?;
//! println!("loaded {}, skipped {}", summary.loaded, summary.skipped);
//!
//! // Read it back
//! let series = store.query(&SeriesQuery { sensor_id: Some(sensor_id), ..Default::default() })?;
//! println!("{} readings", series.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`Store`] - Owns the SQLite connection and schema
//! - [`SensorDirectory`] - Resolves sensor references to IDs
//! - [`Loader`] - The ingestion pipeline
//! - [`Series`] - Query result as parallel sequences
//!
//! ## Modules
//!
//! - [`store`] - Connection lifecycle and schema
//! - [`sensor`] - Sensor directory and default sensor policy
//! - [`ingest`] - CSV ingestion pipeline and progress reporting
//! - [`reading`] - Reading types and field validation
//! - [`schema`] - CSV column layout
//! - [`query`] - Read query contract
//! - [`error`] - Error types

pub mod error;
pub mod ingest;
pub mod query;
pub mod reading;
pub mod schema;
pub mod sensor;
pub mod store;

// Re-export primary API types at crate root for convenience.
pub use error::{Result, SensorlogError};
pub use ingest::{LoadSummary, Loader, NoProgress, Progress};
pub use query::{Series, SeriesQuery};
pub use reading::{Reading, Temperature};
pub use schema::CsvLayout;
pub use sensor::{Sensor, SensorDirectory, SensorRef};
pub use store::Store;
