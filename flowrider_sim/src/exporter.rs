//! JSON exporter for offline plotting.
//!
//! Exports the estimated grids, the true field sampled at the same cell
//! centres, and the raw tables of a run.

use crate::oracle::FlowField;
use crate::runner::ScenarioResult;
use flowrider_core::{FlowGrids, Raster};
use flowrider_env::{GridLayout, Intersection, State};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// One named grid, row-major. Missing cells are `null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridExport {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

impl GridExport {
    fn from_raster(name: &str, raster: &Raster) -> Self {
        let values = raster
            .to_band()
            .values
            .into_iter()
            .map(|v| if v.is_nan() { None } else { Some(v) })
            .collect();
        Self {
            name: name.to_string(),
            values,
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Layout shared by every grid
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout: Option<GridLayout>,

    /// Estimated grids followed by `truth_x` and `truth_y`
    pub grids: Vec<GridExport>,

    pub states: Vec<State>,

    pub intersections: Vec<Intersection>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub rmse: Option<f64>,

    pub coverage: f64,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            layout: None,
            grids: Vec::new(),
            states: Vec::new(),
            intersections: Vec::new(),
            passed: false,
            rmse: None,
            coverage: 0.0,
        }
    }

    /// Adds the eight estimated grids and the true field on the same layout.
    pub fn add_grids(&mut self, grids: &FlowGrids, field: &FlowField) {
        let layout = grids.layout();
        self.layout = Some(layout);
        self.grids = grids
            .bands()
            .iter()
            .map(|(name, raster)| GridExport::from_raster(name, raster))
            .collect();

        let mut truth_x = Vec::with_capacity(layout.cell_count());
        let mut truth_y = Vec::with_capacity(layout.cell_count());
        for row in 0..layout.nrows {
            for col in 0..layout.ncols {
                let (x, y) = layout.cell_center(row, col);
                let v = field.velocity_at(x, y);
                truth_x.push(Some(v.x));
                truth_y.push(Some(v.y));
            }
        }
        self.grids.push(GridExport { name: "truth_x".to_string(), values: truth_x });
        self.grids.push(GridExport { name: "truth_y".to_string(), values: truth_y });
    }

    /// Adds the state and intersection tables.
    pub fn add_tables(&mut self, states: &[State], intersections: &[Intersection]) {
        self.states = states.to_vec();
        self.intersections = intersections.to_vec();
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, result: &ScenarioResult) {
        self.passed = result.passed;
        self.rmse = result.rmse.is_finite().then_some(result.rmse);
        self.coverage = result.coverage;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
