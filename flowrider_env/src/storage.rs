//! Persistence collaborator interfaces.
//!
//! The engines never touch files directly: they hand full tables and grids
//! to these traits at explicit read/write boundaries.

use crate::error::EnvError;
use crate::types::{FlowSpeedBounds, Intersection, RasterBand, State};
use std::path::Path;

/// Full-table persistence of trajectory samples.
pub trait TrajectoryStorage {
    /// Reads every state from `path`.
    ///
    /// Tables written before per-sample flow-speed bounds existed are
    /// backfilled with `defaults` rather than rejected.
    fn read_states(&self, path: &Path, defaults: FlowSpeedBounds) -> Result<Vec<State>, EnvError>;

    /// Writes every state to `path`, replacing any existing file.
    fn write_states(&self, path: &Path, states: &[State]) -> Result<(), EnvError>;
}

/// Full-table persistence of intersections.
pub trait IntersectionStorage {
    fn read_intersections(&self, path: &Path) -> Result<Vec<Intersection>, EnvError>;

    fn write_intersections(&self, path: &Path, rows: &[Intersection]) -> Result<(), EnvError>;
}

/// Single-band georeferenced raster persistence.
pub trait RasterStorage {
    /// Reads a raster; cells equal to the file's no-data value come back as NaN.
    fn read_raster(&self, path: &Path) -> Result<RasterBand, EnvError>;

    /// Writes a raster, substituting `nodata` for NaN cells.
    fn write_raster(&self, path: &Path, band: &RasterBand, nodata: f64) -> Result<(), EnvError>;
}
