//! flowrider Core - Ambient Flow Estimation from Vehicle Tracks
//!
//! A vehicle moving through wind or current goes over the ground along its
//! *track* while pointing along its *heading*. Two samples with different
//! headings taken in the same flow pin down the flow vector exactly. This
//! library turns a stream of such samples into gridded flow estimates:
//! 1. **Trajectory Store**: append-only table of samples
//! 2. **Intersection Engine**: pair search, solve, validation and weighting
//! 3. **Spatial Assimilator**: k-nearest aggregation onto a raster grid

pub mod config;
pub mod error;
pub mod flow_assimilation;
pub mod flow_grid;
pub mod flow_intersections;
pub mod flow_policy;
pub mod flow_solver;
pub mod flow_states;
pub mod rider;

// Re-export key types for convenience
pub use config::{AssimilationConfig, FileConfig, FlowConfig, IntersectionConfig};
pub use error::FlowError;
pub use flow_assimilation::{Assimilator, CellStats, FlowIndex};
pub use flow_grid::{resolve_layout, BoundsPolicy, FlowGrids, Raster};
pub use flow_intersections::{BatchStats, FlowSummary, IntersectionEngine};
pub use flow_policy::{IntersectionPolicies, PairGeometry, PostValidation, PreValidation, Weighting};
pub use flow_solver::{calc, FlowSolution, Leg};
pub use flow_states::{Observation, TrajectoryStore};
pub use rider::{read_prototype, FlowRider};
