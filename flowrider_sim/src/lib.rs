//! flowrider Deterministic Simulation Harness
//!
//! Runs the estimator against flow fields whose truth is known, so that the
//! whole pipeline can be scored end to end and replayed bit-for-bit.
//!
//! # Core Principle
//!
//! All sources of non-determinism are controlled:
//! - **Time**: a virtual clock stamps every sample
//! - **Randomness**: placement and sensor noise derive from a single 64-bit seed
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ScenarioRunner                         │
//! │  ┌──────────────────────┐        ┌───────────────────────┐  │
//! │  │       Oracle         │  obs   │       FlowRider       │  │
//! │  │  FlowField + fleet   │──────► │  store → pairs → grid │  │
//! │  └──────────────────────┘        └───────────┬───────────┘  │
//! │             │ truth                          │ grids        │
//! │             └──────────────► score ◄─────────┘              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use flowrider_sim::{ScenarioRunner, scenarios::ScenarioId};
//!
//! let result = ScenarioRunner::new(42).run(ScenarioId::Vortex)?;
//! println!("rmse = {}", result.rmse);
//! ```

mod context;
mod error;
mod exporter;
mod oracle;
pub mod params;
mod runner;
pub mod scenarios;

pub use context::SimContext;
pub use error::SimError;
pub use exporter::{GridExport, SimExport};
pub use oracle::{FlowField, NoiseModel, Oracle, Vehicle};
pub use runner::{score, ScenarioMetrics, ScenarioResult, ScenarioRunner};
