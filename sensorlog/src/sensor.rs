//! Sensor directory.
//!
//! Maps the sensor reference a human typed (a numeric ID or a free-text
//! name) to the stable `sensor_id` used as foreign key by every reading.
//!
//! # Resolution Flow
//!
//! 1. If the reference is integer-valued (`7`, `007`, `7.0`), look it up by
//!    exact `sensor_id`
//! 2. Otherwise (or if no such ID exists) trim and uppercase the reference
//!    text as typed and compare it against the trimmed, uppercased names of
//!    the stored sensors
//! 3. If nothing matches, insert a sensor named by the literal reference
//!
//! A unique index on the normalized name guarantees equivalent names never
//! coexist. When a concurrent import creates the same sensor between our
//! lookup and our insert, the insert trips that index and the lookup runs
//! again.
//!
//! # Example
//!
//! ```rust
//! use sensorlog::sensor::SensorRef;
//! use sensorlog::store::Store;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::open_in_memory()?;
//! let directory = store.sensors();
//!
//! let id = directory.resolve_or_create(&"LivingRoom".parse::<SensorRef>()?)?;
//! assert_eq!(directory.resolve_or_create(&" livingroom ".parse::<SensorRef>()?)?, id);
//! assert_eq!(directory.resolve_or_create(&SensorRef::from(id))?, id);
//! # Ok(())
//! # }
//! ```

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use rusqlite::{Connection, ErrorCode, OptionalExtension, Row, params};
use serde::Serialize;

use crate::error::{Result, StoreError};
use crate::store::{Store, normalized_sql};

/// How many lookup/insert rounds to try before giving up on a contended name.
const MAX_RESOLVE_ATTEMPTS: u32 = 3;

/// A registered sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sensor {
    /// Stable, auto-assigned identifier.
    pub id: i64,
    /// Name as first given, case preserved.
    pub name: String,
}

/// Integer-valued references beyond this magnitude are treated as names;
/// larger `f64` values no longer hold every integer exactly.
const MAX_DECIMAL_ID: f64 = 9_007_199_254_740_992.0;

/// A user-supplied reference to a sensor.
///
/// Both variants keep the text as typed: it is what name matching compares
/// and what a newly created sensor is called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorRef {
    /// An integer-valued reference such as `"7"`, `"007"` or `"7.0"`.
    Id {
        /// The sensor ID the text denotes.
        id: i64,
        /// The reference as typed.
        text: String,
    },
    /// A sensor name, matched case- and whitespace-insensitively.
    Name(String),
}

impl SensorRef {
    /// Returns the text used when the reference is treated as a name.
    fn as_name(&self) -> &str {
        match self {
            SensorRef::Id { text, .. } => text,
            SensorRef::Name(name) => name,
        }
    }
}

/// Integer-valued text becomes [`SensorRef::Id`], anything else a name.
impl FromStr for SensorRef {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match integer_value(s) {
            Some(id) => SensorRef::Id {
                id,
                text: s.to_string(),
            },
            None => SensorRef::Name(s.to_string()),
        })
    }
}

impl From<i64> for SensorRef {
    fn from(id: i64) -> Self {
        SensorRef::Id {
            id,
            text: id.to_string(),
        }
    }
}

impl fmt::Display for SensorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_name())
    }
}

/// Reads `text` as an integer the way SQLite's INTEGER affinity would:
/// `"+5"`, `"005"` and `"5.0"` are all 5.
fn integer_value(text: &str) -> Option<i64> {
    let text = text.trim();
    if let Ok(id) = text.parse::<i64>() {
        return Some(id);
    }

    let value: f64 = text.parse().ok()?;
    if value.is_finite() && value.fract() == 0.0 && value.abs() < MAX_DECIMAL_ID {
        #[allow(clippy::cast_possible_truncation)] // integral and within 2^53
        let id = value as i64;
        return Some(id);
    }
    None
}

/// Read/create access to the `sensors` table.
///
/// Borrowed from a [`Store`] via [`Store::sensors`].
#[derive(Debug, Clone, Copy)]
pub struct SensorDirectory<'a> {
    connection: &'a Connection,
}

impl Store {
    /// Returns the sensor directory of this store.
    pub fn sensors(&self) -> SensorDirectory<'_> {
        SensorDirectory {
            connection: self.connection(),
        }
    }
}

impl SensorDirectory<'_> {
    /// Resolves `reference` to a sensor ID, creating the sensor if needed.
    ///
    /// Repeated calls with equivalent references return the same ID and
    /// never create a second sensor.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] on storage failures and
    /// [`StoreError::SensorContention`] if concurrent writers keep winning
    /// the insert race.
    pub fn resolve_or_create(&self, reference: &SensorRef) -> Result<i64> {
        self.resolve_or_insert(reference, |name| self.create(name))
    }

    /// Lookup/insert loop behind [`SensorDirectory::resolve_or_create`].
    ///
    /// A uniqueness violation from `insert` means another writer created an
    /// equivalent sensor first, so the lookup runs again.
    fn resolve_or_insert<F>(&self, reference: &SensorRef, mut insert: F) -> Result<i64>
    where
        F: FnMut(&str) -> rusqlite::Result<i64>,
    {
        for attempt in 1..=MAX_RESOLVE_ATTEMPTS {
            if let Some(id) = self.resolve(reference)? {
                return Ok(id);
            }

            match insert(reference.as_name()) {
                Ok(id) => {
                    tracing::info!(sensor_id = id, name = %reference, "created sensor");
                    return Ok(id);
                }
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    tracing::debug!(attempt, name = %reference, "sensor created concurrently, resolving again");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::SensorContention {
            reference: reference.to_string(),
            attempts: MAX_RESOLVE_ATTEMPTS,
        }
        .into())
    }

    /// Resolves `reference` without creating anything.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if a lookup fails.
    pub fn resolve(&self, reference: &SensorRef) -> Result<Option<i64>> {
        if let SensorRef::Id { id, .. } = reference
            && self.find(*id)?.is_some()
        {
            return Ok(Some(*id));
        }

        Ok(self
            .connection
            // language=sql
            .prepare_cached(&format!(
                r"SELECT sensor_id FROM sensors WHERE {} = {} ORDER BY sensor_id LIMIT 1",
                normalized_sql("name"),
                normalized_sql("?1"),
            ))?
            .query_row(params![reference.as_name()], |row| row.get(0))
            .optional()?)
    }

    /// Looks up a sensor by ID.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if the query fails.
    pub fn find(&self, id: i64) -> Result<Option<Sensor>> {
        Ok(self
            .connection
            // language=sql
            .prepare_cached(r"SELECT sensor_id, name FROM sensors WHERE sensor_id = ?1")?
            .query_row(params![id], sensor_from_row)
            .optional()?)
    }

    /// Lists all sensors, alphabetically by name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if the query fails.
    pub fn list(&self) -> Result<Vec<Sensor>> {
        self.connection
            // language=sql
            .prepare_cached(r"SELECT sensor_id, name FROM sensors ORDER BY name, sensor_id")?
            .query_map([], sensor_from_row)?
            .map(|r| r.map_err(Into::into))
            .collect()
    }

    /// Default sensor policy: the alphabetically-first sensor name.
    ///
    /// Names compare with SQLite's default binary collation, so uppercase
    /// sorts before lowercase. Ties cannot happen because names are unique.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if the query fails.
    pub fn default_sensor(&self) -> Result<Option<Sensor>> {
        Ok(self
            .connection
            // language=sql
            .prepare_cached(
                r"SELECT sensor_id, name FROM sensors ORDER BY name, sensor_id LIMIT 1",
            )?
            .query_row([], sensor_from_row)
            .optional()?)
    }

    fn create(&self, name: &str) -> rusqlite::Result<i64> {
        self.connection
            // language=sql
            .prepare_cached(r"INSERT INTO sensors (name) VALUES (?1)")?
            .insert(params![name])
    }
}

fn sensor_from_row(row: &Row<'_>) -> rusqlite::Result<Sensor> {
    Ok(Sensor {
        id: row.get(0)?,
        name: row.get(1)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SensorlogError;

    fn name(s: &str) -> SensorRef {
        SensorRef::Name(s.to_string())
    }

    fn id(id: i64, text: &str) -> SensorRef {
        SensorRef::Id {
            id,
            text: text.to_string(),
        }
    }

    #[test]
    fn test_parse_reference() {
        assert_eq!("42".parse::<SensorRef>().unwrap(), id(42, "42"));
        assert_eq!(" 7 ".parse::<SensorRef>().unwrap(), id(7, " 7 "));
        assert_eq!("007".parse::<SensorRef>().unwrap(), id(7, "007"));
        assert_eq!("+5".parse::<SensorRef>().unwrap(), id(5, "+5"));
        assert_eq!("5.0".parse::<SensorRef>().unwrap(), id(5, "5.0"));
        assert_eq!("inf".parse::<SensorRef>().unwrap(), name("inf"));
        assert_eq!(
            "Living Room".parse::<SensorRef>().unwrap(),
            name("Living Room")
        );
        assert_eq!("4.5".parse::<SensorRef>().unwrap(), name("4.5"));
    }

    #[test]
    fn test_creates_sensor_with_literal_name() {
        let store = Store::open_in_memory().unwrap();
        let directory = store.sensors();

        let id = directory.resolve_or_create(&name(" LivingRoom ")).unwrap();
        let sensor = directory.find(id).unwrap().unwrap();
        assert_eq!(sensor.name, " LivingRoom ");
        assert_eq!(store.sensor_count().unwrap(), 1);
    }

    #[test]
    fn test_name_match_is_case_and_whitespace_insensitive() {
        let store = Store::open_in_memory().unwrap();
        let directory = store.sensors();

        let id = directory.resolve_or_create(&name("LivingRoom")).unwrap();
        for variant in ["livingroom", "  LIVINGROOM", "LivingRoom\t", "livingRoom "] {
            assert_eq!(directory.resolve_or_create(&name(variant)).unwrap(), id);
        }
        assert_eq!(store.sensor_count().unwrap(), 1);
    }

    #[test]
    fn test_resolve_by_id() {
        let store = Store::open_in_memory().unwrap();
        let directory = store.sensors();

        let kitchen = directory.resolve_or_create(&name("Kitchen")).unwrap();
        let attic = directory.resolve_or_create(&name("Attic")).unwrap();
        assert_ne!(kitchen, attic);

        assert_eq!(
            directory.resolve_or_create(&SensorRef::from(attic)).unwrap(),
            attic
        );
        assert_eq!(store.sensor_count().unwrap(), 2);
    }

    #[test]
    fn test_unknown_id_is_created_as_name() {
        let store = Store::open_in_memory().unwrap();
        let directory = store.sensors();

        let id = directory.resolve_or_create(&SensorRef::from(500)).unwrap();
        let sensor = directory.find(id).unwrap().unwrap();
        assert_eq!(sensor.name, "500");

        // The same text now resolves to the created row, by name.
        assert_eq!(
            directory.resolve_or_create(&SensorRef::from(500)).unwrap(),
            id
        );
        assert_eq!(store.sensor_count().unwrap(), 1);
    }

    #[test]
    fn test_zero_padded_reference_keeps_literal_name() {
        let store = Store::open_in_memory().unwrap();
        let directory = store.sensors();

        let created = directory.resolve_or_create(&"007".parse().unwrap()).unwrap();
        assert_eq!(directory.find(created).unwrap().unwrap().name, "007");

        assert_eq!(
            directory.resolve_or_create(&"007".parse().unwrap()).unwrap(),
            created
        );
        assert_eq!(store.sensor_count().unwrap(), 1);
    }

    #[test]
    fn test_numeric_looking_name_matches_itself() {
        let store = Store::open_in_memory().unwrap();
        for stored in ["007", "+5", " 05"] {
            store
                .connection()
                .execute("INSERT INTO sensors (name) VALUES (?1)", params![stored])
                .unwrap();
        }
        let directory = store.sensors();

        for (text, expected) in [("007", 1), ("+5", 2), (" 05", 3)] {
            assert_eq!(
                directory.resolve_or_create(&text.parse().unwrap()).unwrap(),
                expected
            );
        }
        assert_eq!(store.sensor_count().unwrap(), 3);
    }

    #[test]
    fn test_integer_valued_decimal_resolves_by_id() {
        let store = Store::open_in_memory().unwrap();
        let directory = store.sensors();
        let kitchen = directory.resolve_or_create(&name("Kitchen")).unwrap();

        let text = format!("{kitchen}.0");
        assert_eq!(
            directory.resolve_or_create(&text.parse().unwrap()).unwrap(),
            kitchen
        );
        assert_eq!(store.sensor_count().unwrap(), 1);
    }

    #[test]
    fn test_concurrent_creation_resolves_to_existing() {
        let store = Store::open_in_memory().unwrap();
        let directory = store.sensors();
        let mut rival = None;

        let id = directory
            .resolve_or_insert(&name("Porch"), |text| {
                // Another writer registers an equivalent name first.
                if rival.is_none() {
                    store
                        .connection()
                        .execute("INSERT INTO sensors (name) VALUES ('PORCH ')", [])
                        .unwrap();
                    rival = Some(store.connection().last_insert_rowid());
                }
                directory.create(text)
            })
            .unwrap();

        assert_eq!(Some(id), rival);
        assert_eq!(store.sensor_count().unwrap(), 1);
    }

    #[test]
    fn test_contention_after_repeated_conflicts() {
        let store = Store::open_in_memory().unwrap();
        store
            .connection()
            .execute_batch(
                "CREATE TRIGGER name_taken BEFORE INSERT ON sensors \
                 BEGIN SELECT RAISE(ABORT, 'name taken'); END;",
            )
            .unwrap();

        let err = store
            .sensors()
            .resolve_or_create(&name("Porch"))
            .unwrap_err();

        assert!(matches!(
            err,
            SensorlogError::Store(StoreError::SensorContention { attempts: 3, .. })
        ));
        assert_eq!(store.sensor_count().unwrap(), 0);
    }

    #[test]
    fn test_resolve_does_not_create() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.sensors().resolve(&name("Garage")).unwrap(), None);
        assert_eq!(store.sensor_count().unwrap(), 0);
    }

    #[test]
    fn test_list_and_default_sensor_alphabetical() {
        let store = Store::open_in_memory().unwrap();
        let directory = store.sensors();
        assert_eq!(directory.default_sensor().unwrap(), None);

        directory.resolve_or_create(&name("Kitchen")).unwrap();
        let attic = directory.resolve_or_create(&name("Attic")).unwrap();
        directory.resolve_or_create(&name("Bedroom")).unwrap();

        let names: Vec<_> = directory
            .list()
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, ["Attic", "Bedroom", "Kitchen"]);

        let default = directory.default_sensor().unwrap().unwrap();
        assert_eq!(default.id, attic);
    }
}
