//! Delimited-text implementation of the table collaborators.

use crate::error::EnvError;
use crate::storage::{IntersectionStorage, TrajectoryStorage};
use crate::types::{FlowSpeedBounds, Intersection, State, StateId};
use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use serde::{Deserialize, Deserializer};
use std::fs::File;
use std::path::Path;

/// Column order of the persisted state table.
pub const STATE_COLUMNS: [&str; 11] = [
    "id", "x", "y", "z", "time", "track", "velocity", "heading",
    "min_flowspeed", "max_flowspeed", "done",
];

/// Columns a state table must carry; the rest are backfilled.
const REQUIRED_STATE_COLUMNS: [&str; 8] =
    ["id", "x", "y", "z", "time", "track", "velocity", "heading"];

/// Column order of the persisted intersection table.
pub const INTERSECTION_COLUMNS: [&str; 19] = [
    "id1", "id2", "x", "y", "z", "sdiff", "tdiff", "hdiff",
    "t1_angle", "t1_vel", "h1_angle", "t2_angle", "t2_vel", "h2_angle",
    "h1_vel", "h2_vel", "flow_x", "flow_y", "weight",
];

/// Reads and writes full state / intersection tables as delimited text.
#[derive(Debug, Clone)]
pub struct CsvStorage {
    delimiter: u8,
}

impl CsvStorage {
    /// Comma-delimited storage.
    pub fn new() -> Self {
        Self { delimiter: b',' }
    }

    /// Storage using a custom field delimiter.
    pub fn with_delimiter(delimiter: u8) -> Self {
        Self { delimiter }
    }

    fn open_reader(&self, path: &Path) -> Result<csv::Reader<File>, EnvError> {
        let file = File::open(path).map_err(|e| EnvError::io(path, e))?;
        Ok(ReaderBuilder::new()
            .delimiter(self.delimiter)
            .trim(Trim::All)
            .from_reader(file))
    }

    fn open_writer(&self, path: &Path, header: &[&str]) -> Result<csv::Writer<File>, EnvError> {
        let file = File::create(path).map_err(|e| EnvError::io(path, e))?;
        let mut writer = WriterBuilder::new()
            .delimiter(self.delimiter)
            .has_headers(false)
            .from_writer(file);
        // Header is written by hand so an empty table still carries it
        writer
            .write_record(header)
            .map_err(|e| EnvError::csv(path, e))?;
        Ok(writer)
    }
}

impl Default for CsvStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// Fails with the first required column missing from `headers`.
fn require_columns(path: &Path, headers: &StringRecord, columns: &[&str]) -> Result<(), EnvError> {
    for column in columns {
        if !headers.iter().any(|h| h == *column) {
            return Err(EnvError::MissingColumn {
                path: path.to_path_buf(),
                column: (*column).to_string(),
            });
        }
    }
    Ok(())
}

/// A state row as found on disk, before backfilling.
#[derive(Debug, Deserialize)]
struct StateRow {
    id: StateId,
    x: f64,
    y: f64,
    z: f64,
    time: f64,
    track: f64,
    velocity: f64,
    heading: f64,
    #[serde(default)]
    min_flowspeed: Option<f64>,
    #[serde(default)]
    max_flowspeed: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    done: bool,
}

impl StateRow {
    fn into_state(self, defaults: FlowSpeedBounds) -> State {
        State {
            id: self.id,
            x: self.x,
            y: self.y,
            z: self.z,
            time: self.time,
            track: self.track,
            velocity: self.velocity,
            heading: self.heading,
            min_flowspeed: self.min_flowspeed.unwrap_or(defaults.min),
            max_flowspeed: self.max_flowspeed.unwrap_or(defaults.max),
            done: self.done,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawFlag {
    Bool(bool),
    Int(i64),
    Text(String),
}

/// Accepts `true`/`false` in any case as well as `1`/`0`.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match RawFlag::deserialize(deserializer)? {
        RawFlag::Bool(flag) => Ok(flag),
        RawFlag::Int(flag) => Ok(flag != 0),
        RawFlag::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" | "" => Ok(false),
            other => Err(serde::de::Error::custom(format!("invalid done flag: {other}"))),
        },
    }
}

impl TrajectoryStorage for CsvStorage {
    fn read_states(&self, path: &Path, defaults: FlowSpeedBounds) -> Result<Vec<State>, EnvError> {
        let mut reader = self.open_reader(path)?;
        let headers = reader.headers().map_err(|e| EnvError::csv(path, e))?.clone();
        require_columns(path, &headers, &REQUIRED_STATE_COLUMNS)?;

        reader
            .deserialize::<StateRow>()
            .map(|row| {
                row.map(|r| r.into_state(defaults))
                    .map_err(|e| EnvError::csv(path, e))
            })
            .collect()
    }

    fn write_states(&self, path: &Path, states: &[State]) -> Result<(), EnvError> {
        let mut writer = self.open_writer(path, &STATE_COLUMNS)?;
        for state in states {
            writer.serialize(state).map_err(|e| EnvError::csv(path, e))?;
        }
        writer.flush().map_err(|e| EnvError::io(path, e))
    }
}

impl IntersectionStorage for CsvStorage {
    fn read_intersections(&self, path: &Path) -> Result<Vec<Intersection>, EnvError> {
        let mut reader = self.open_reader(path)?;
        let headers = reader.headers().map_err(|e| EnvError::csv(path, e))?.clone();
        require_columns(path, &headers, &INTERSECTION_COLUMNS)?;

        reader
            .deserialize::<Intersection>()
            .map(|row| row.map_err(|e| EnvError::csv(path, e)))
            .collect()
    }

    fn write_intersections(&self, path: &Path, rows: &[Intersection]) -> Result<(), EnvError> {
        let mut writer = self.open_writer(path, &INTERSECTION_COLUMNS)?;
        for row in rows {
            writer.serialize(row).map_err(|e| EnvError::csv(path, e))?;
        }
        writer.flush().map_err(|e| EnvError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sample_state(id: u64, done: bool) -> State {
        State {
            id: StateId(id),
            x: 10.0 * id as f64,
            y: -4.5,
            z: 0.0,
            time: 2.5 * id as f64,
            track: 45.0,
            velocity: 3.2,
            heading: 30.0,
            min_flowspeed: 0.5,
            max_flowspeed: 12.0,
            done,
        }
    }

    fn sample_intersection() -> Intersection {
        Intersection {
            id1: StateId(3),
            id2: StateId(1),
            x: 1.0,
            y: 2.0,
            z: 0.0,
            sdiff: 14.1,
            tdiff: 20.0,
            hdiff: 90.0,
            t1_angle: 90.0,
            t1_vel: 5.0,
            h1_angle: 0.0,
            t2_angle: 270.0,
            t2_vel: 5.0,
            h2_angle: 90.0,
            h1_vel: 0.0,
            h2_vel: -10.0,
            flow_x: 5.0,
            flow_y: 0.0,
            weight: 0.75,
        }
    }

    #[test]
    fn test_states_written_and_read_back() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("states.csv");
        let storage = CsvStorage::new();
        let states = vec![sample_state(0, true), sample_state(1, false)];

        storage.write_states(&path, &states).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with(
            "id,x,y,z,time,track,velocity,heading,min_flowspeed,max_flowspeed,done"
        ));

        let loaded = storage.read_states(&path, FlowSpeedBounds::default()).unwrap();
        assert_eq!(loaded, states);
    }

    #[test]
    fn test_legacy_states_backfill_bounds() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("legacy.csv");
        fs::write(
            &path,
            "id,x,y,z,time,track,velocity,heading,done\n\
             0.0,1.0,2.0,0.0,0.0,90.0,5.0,0.0,True\n\
             1.0,3.0,4.0,0.0,1.0,270.0,5.0,90.0,False\n",
        )
        .unwrap();

        let loaded = CsvStorage::new()
            .read_states(&path, FlowSpeedBounds::new(0.25, 40.0))
            .unwrap();

        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].id, StateId(0));
        assert!(loaded[0].done);
        assert!(!loaded[1].done);
        assert!(loaded.iter().all(|s| s.min_flowspeed == 0.25 && s.max_flowspeed == 40.0));
    }

    #[test]
    fn test_states_without_done_column_are_unprocessed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bare.csv");
        fs::write(&path, "id,x,y,z,time,track,velocity,heading\n7,0,0,0,0,10,1,20\n").unwrap();

        let loaded = CsvStorage::new()
            .read_states(&path, FlowSpeedBounds::default())
            .unwrap();
        assert_eq!(loaded[0].id, StateId(7));
        assert!(!loaded[0].done);
    }

    #[test]
    fn test_missing_required_column_names_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.csv");
        fs::write(&path, "id,x,y,z,time,track,velocity\n0,0,0,0,0,0,0\n").unwrap();

        let err = CsvStorage::new()
            .read_states(&path, FlowSpeedBounds::default())
            .unwrap_err();
        match &err {
            EnvError::MissingColumn { column, .. } => assert_eq!(column, "heading"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(err.path(), path.as_path());
        assert!(err.to_string().contains("broken.csv"));
    }

    #[test]
    fn test_unreadable_file_reports_path() {
        let err = CsvStorage::new()
            .read_intersections(Path::new("/nonexistent/flow_rider_intersections.csv"))
            .unwrap_err();
        assert!(matches!(err, EnvError::Io { .. }));
        assert!(err.to_string().contains("flow_rider_intersections.csv"));
    }

    #[test]
    fn test_intersections_keep_column_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("intersections.csv");
        let storage = CsvStorage::new();

        storage.write_intersections(&path, &[sample_intersection()]).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        let header = text.lines().next().unwrap();
        assert_eq!(header, INTERSECTION_COLUMNS.join(","));

        let loaded = storage.read_intersections(&path).unwrap();
        assert_eq!(loaded, vec![sample_intersection()]);
    }

    #[test]
    fn test_empty_table_still_has_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.csv");
        let storage = CsvStorage::with_delimiter(b';');

        storage.write_intersections(&path, &[]).unwrap();
        let loaded = storage.read_intersections(&path).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_intersections_accept_float_ids() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("intersections.csv");
        let mut text = INTERSECTION_COLUMNS.join(",");
        text.push_str("\n3.0,1.0,1,2,0,14.1,20,90,90,5,0,270,5,90,0,-10,5,0,0.75\n");
        fs::write(&path, text).unwrap();

        let loaded = CsvStorage::new().read_intersections(&path).unwrap();
        assert_eq!(loaded, vec![sample_intersection()]);
    }

    #[test]
    fn test_fractional_id_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("intersections.csv");
        let mut text = INTERSECTION_COLUMNS.join(",");
        text.push_str("\n3.5,1,1,2,0,14.1,20,90,90,5,0,270,5,90,0,-10,5,0,0.75\n");
        fs::write(&path, text).unwrap();

        assert!(CsvStorage::new().read_intersections(&path).is_err());
    }
}
