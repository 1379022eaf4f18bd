//! Record types shared by the core engines and the persistence collaborators.

use serde::{Deserialize, Deserializer, Serialize};

/// Identifier of a trajectory sample.
///
/// Assigned sequentially by the trajectory store and never reused.
/// Deserializes from an integer, or from a whole float (`3.0`) as written
/// by dataframe tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct StateId(pub u64);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Int(u64),
    Float(f64),
}

impl<'de> Deserialize<'de> for StateId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match RawId::deserialize(deserializer)? {
            RawId::Int(id) => Ok(StateId(id)),
            RawId::Float(id) if id >= 0.0 && id.fract() == 0.0 && id <= u64::MAX as f64 => {
                Ok(StateId(id as u64))
            }
            RawId::Float(id) => Err(serde::de::Error::custom(format!("invalid state id: {id}"))),
        }
    }
}

impl StateId {
    /// Returns the id that follows this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for StateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Physically plausible range for a vehicle's speed through the flow (m/s).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlowSpeedBounds {
    pub min: f64,
    pub max: f64,
}

impl FlowSpeedBounds {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// True if `speed` lies strictly between the bounds. NaN is never inside.
    #[inline]
    pub fn strictly_contains(&self, speed: f64) -> bool {
        speed > self.min && speed < self.max
    }
}

impl Default for FlowSpeedBounds {
    fn default() -> Self {
        Self { min: 0.0, max: 100.0 }
    }
}

/// One vehicle observation.
///
/// Angles are compass azimuths in degrees (0 = grid north, clockwise).
/// `track`/`velocity` describe motion over the ground, `heading` is where
/// the vehicle points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub id: StateId,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub time: f64,
    pub track: f64,
    pub velocity: f64,
    pub heading: f64,
    pub min_flowspeed: f64,
    pub max_flowspeed: f64,
    pub done: bool,
}

impl State {
    /// Position as `[x, y, z]`.
    #[inline]
    pub fn position(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// Flow-speed bounds carried by this sample.
    #[inline]
    pub fn flow_speed_bounds(&self) -> FlowSpeedBounds {
        FlowSpeedBounds::new(self.min_flowspeed, self.max_flowspeed)
    }
}

/// A validated pair of states and the flow vector their geometry implies.
///
/// Field order is the column order of the persisted intersection table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Intersection {
    pub id1: StateId,
    pub id2: StateId,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub sdiff: f64,
    pub tdiff: f64,
    pub hdiff: f64,
    pub t1_angle: f64,
    pub t1_vel: f64,
    pub h1_angle: f64,
    pub t2_angle: f64,
    pub t2_vel: f64,
    pub h2_angle: f64,
    pub h1_vel: f64,
    pub h2_vel: f64,
    pub flow_x: f64,
    pub flow_y: f64,
    pub weight: f64,
}

/// Affine layout of a north-referenced raster grid.
///
/// Equivalent to the geotransform `(origin_x, cell_width, 0, origin_y, 0, cell_height)`.
/// A negative `cell_height` means row 0 is the northern edge.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridLayout {
    pub origin_x: f64,
    pub origin_y: f64,
    pub cell_width: f64,
    pub cell_height: f64,
    pub ncols: usize,
    pub nrows: usize,
}

impl GridLayout {
    /// Real-space coordinates of the centre of cell `(row, col)`.
    #[inline]
    pub fn cell_center(&self, row: usize, col: usize) -> (f64, f64) {
        (
            self.origin_x + (col as f64 + 0.5) * self.cell_width,
            self.origin_y + (row as f64 + 0.5) * self.cell_height,
        )
    }

    /// The six-term affine transform.
    pub fn geotransform(&self) -> [f64; 6] {
        [self.origin_x, self.cell_width, 0.0, self.origin_y, 0.0, self.cell_height]
    }

    pub fn cell_count(&self) -> usize {
        self.ncols * self.nrows
    }
}

/// A single-band raster: layout plus row-major values, NaN marks missing cells.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterBand {
    pub layout: GridLayout,
    pub values: Vec<f64>,
}

impl RasterBand {
    /// A band with every cell missing.
    pub fn blank(layout: GridLayout) -> Self {
        Self {
            layout,
            values: vec![f64::NAN; layout.cell_count()],
        }
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.layout.ncols + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        let ncols = self.layout.ncols;
        self.values[row * ncols + col] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_center_north_up() {
        let layout = GridLayout {
            origin_x: 100.0,
            origin_y: 500.0,
            cell_width: 10.0,
            cell_height: -10.0,
            ncols: 4,
            nrows: 3,
        };
        assert_eq!(layout.cell_center(0, 0), (105.0, 495.0));
        assert_eq!(layout.cell_center(2, 3), (135.0, 475.0));
        assert_eq!(layout.geotransform(), [100.0, 10.0, 0.0, 500.0, 0.0, -10.0]);
    }

    #[test]
    fn test_flow_speed_bounds_are_strict() {
        let bounds = FlowSpeedBounds::new(0.0, 10.0);
        assert!(bounds.strictly_contains(5.0));
        assert!(!bounds.strictly_contains(0.0));
        assert!(!bounds.strictly_contains(10.0));
        assert!(!bounds.strictly_contains(f64::NAN));
    }

    #[test]
    fn test_blank_band_is_missing() {
        let layout = GridLayout {
            origin_x: 0.0,
            origin_y: 0.0,
            cell_width: 1.0,
            cell_height: 1.0,
            ncols: 2,
            nrows: 2,
        };
        let mut band = RasterBand::blank(layout);
        assert!(band.values.iter().all(|v| v.is_nan()));
        band.set(1, 0, 3.5);
        assert_eq!(band.get(1, 0), 3.5);
    }
}
