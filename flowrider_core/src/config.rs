//! Runtime configuration for the flowrider engines.
//!
//! Wind and water have very different autocorrelation scales, so every
//! threshold here is expected to be tuned per deployment. Values are
//! validated once, when the configuration is loaded, never inside the
//! per-pair loops.

use crate::error::FlowError;
use crate::flow_policy::{IntersectionPolicies, PostValidation, PreValidation, Weighting};
use flowrider_env::FlowSpeedBounds;
use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    pub intersections: IntersectionConfig,
    pub assimilation: AssimilationConfig,
    pub files: FileConfig,
}

/// Pair search, plausibility bounds and weighting ramps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntersectionConfig {
    /// Maximum spatial separation of a pair (m)
    pub max_dist: f64,

    /// Maximum time separation of a pair (s)
    pub max_time_diff: f64,

    /// Minimum folded heading difference of a pair (degrees)
    pub min_heading_diff: f64,

    /// Default lower bound on speed through the flow (m/s)
    pub min_flowspeed: f64,

    /// Default upper bound on speed through the flow (m/s)
    pub max_flowspeed: f64,

    /// Separation at which the space score reaches zero (m)
    pub space_zero: f64,

    /// Time separation at which the time score reaches zero (s)
    pub time_zero: f64,

    /// Distance from perpendicular at which the heading score reaches zero (degrees)
    pub heading_zero: f64,
}

impl Default for IntersectionConfig {
    fn default() -> Self {
        Self {
            max_dist: 1000.0,
            max_time_diff: 3600.0,
            min_heading_diff: 20.0,
            min_flowspeed: 0.0,
            max_flowspeed: 100.0,
            space_zero: 1000.0,
            time_zero: 3600.0,
            heading_zero: 90.0,
        }
    }
}

impl IntersectionConfig {
    /// Default per-sample flow-speed bounds.
    pub fn flow_speed_bounds(&self) -> FlowSpeedBounds {
        FlowSpeedBounds::new(self.min_flowspeed, self.max_flowspeed)
    }
}

/// Grid derivation and neighbour aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssimilationConfig {
    /// Neighbours aggregated per cell
    pub k_nearest: usize,

    /// Rows and columns of a grid derived from the trajectory extent
    pub grid_size: usize,

    /// Margin added around the trajectory extent (m)
    pub space_pad: f64,

    /// Re-derive bounds on every assimilation instead of fixing them once
    pub dynamic_bounds: bool,

    /// Value written for missing cells
    pub nodata: f64,
}

impl Default for AssimilationConfig {
    fn default() -> Self {
        Self {
            k_nearest: 20,
            grid_size: 50,
            space_pad: 100.0,
            dynamic_bounds: false,
            nodata: -9999.0,
        }
    }
}

/// Default file names used by `FlowRider::read`/`write`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub states_file: String,
    pub intersections_file: String,
    pub flow_x_mean: String,
    pub flow_y_mean: String,
    pub flow_x_sd: String,
    pub flow_y_sd: String,
    pub flow_x_med: String,
    pub flow_y_med: String,
    pub flow_vel: String,
    pub flow_az: String,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            states_file: "flow_rider_states.csv".to_string(),
            intersections_file: "flow_rider_intersections.csv".to_string(),
            flow_x_mean: "flow_x_mean.asc".to_string(),
            flow_y_mean: "flow_y_mean.asc".to_string(),
            flow_x_sd: "flow_x_sd.asc".to_string(),
            flow_y_sd: "flow_y_sd.asc".to_string(),
            flow_x_med: "flow_x_med.asc".to_string(),
            flow_y_med: "flow_y_med.asc".to_string(),
            flow_vel: "flow_vel.asc".to_string(),
            flow_az: "flow_az.asc".to_string(),
        }
    }
}

fn require_non_negative(name: &str, value: f64) -> Result<(), FlowError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(FlowError::config(format!("{name} must be finite and >= 0, got {value}")))
    }
}

fn require_positive(name: &str, value: f64) -> Result<(), FlowError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(FlowError::config(format!("{name} must be finite and > 0, got {value}")))
    }
}

impl FlowConfig {
    /// Checks every numeric setting.
    pub fn validate(&self) -> Result<(), FlowError> {
        let i = &self.intersections;
        require_non_negative("max_dist", i.max_dist)?;
        require_non_negative("max_time_diff", i.max_time_diff)?;
        if !(0.0..=180.0).contains(&i.min_heading_diff) {
            return Err(FlowError::config(format!(
                "min_heading_diff must lie in [0, 180], got {}",
                i.min_heading_diff
            )));
        }
        if !i.min_flowspeed.is_finite() || !i.max_flowspeed.is_finite() {
            return Err(FlowError::config("flow speed bounds must be finite"));
        }
        if i.min_flowspeed >= i.max_flowspeed {
            return Err(FlowError::config(format!(
                "min_flowspeed ({}) must be below max_flowspeed ({})",
                i.min_flowspeed, i.max_flowspeed
            )));
        }
        require_positive("space_zero", i.space_zero)?;
        require_positive("time_zero", i.time_zero)?;
        require_positive("heading_zero", i.heading_zero)?;

        let a = &self.assimilation;
        if a.k_nearest == 0 {
            return Err(FlowError::config("k_nearest must be at least 1"));
        }
        if a.grid_size == 0 {
            return Err(FlowError::config("grid_size must be at least 1"));
        }
        require_non_negative("space_pad", a.space_pad)?;
        if a.nodata.is_nan() {
            return Err(FlowError::config("nodata must be a number"));
        }
        Ok(())
    }

    /// Reference policies built from this configuration.
    pub fn policies(&self) -> Result<IntersectionPolicies, FlowError> {
        self.validate()?;
        let i = &self.intersections;
        Ok(IntersectionPolicies {
            pre: PreValidation::Thresholds {
                max_dist: i.max_dist,
                max_time_diff: i.max_time_diff,
                min_heading_diff: i.min_heading_diff,
            },
            post: PostValidation::FlowSpeedBounds,
            weighting: Weighting::LinearRamps {
                space_zero: i.space_zero,
                time_zero: i.time_zero,
                heading_zero: i.heading_zero,
            },
        })
    }
}
