//! flowrider Environment Abstraction Layer
//!
//! This crate provides the "Sans-IO" boundary of flowrider: the engines in
//! `flowrider_core` compute on in-memory tables and grids, and everything
//! that touches the outside world goes through the types here.
//!
//! - Time (`now()`) via [`FlowContext`]
//! - Trajectory and intersection tables via [`TrajectoryStorage`] and [`IntersectionStorage`]
//! - Georeferenced grids via [`RasterStorage`]
//!
//! # Example
//!
//! ```ignore
//! use flowrider_env::{CsvStorage, FlowSpeedBounds, TrajectoryStorage};
//!
//! let storage = CsvStorage::new();
//! let states = storage.read_states("flow_rider_states.csv".as_ref(), FlowSpeedBounds::default())?;
//! ```

mod ascii_grid;
mod context;
mod csv_impl;
mod error;
mod storage;
mod system_impl;
mod types;

pub use ascii_grid::AsciiGridStorage;
pub use context::FlowContext;
pub use csv_impl::{CsvStorage, INTERSECTION_COLUMNS, STATE_COLUMNS};
pub use error::EnvError;
pub use storage::{IntersectionStorage, RasterStorage, TrajectoryStorage};
pub use system_impl::SystemContext;
pub use types::{FlowSpeedBounds, GridLayout, Intersection, RasterBand, State, StateId};
