//! Flow-estimation scenarios.

use crate::error::SimError;
use crate::oracle::{FlowField, NoiseModel};

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// FR-001: uniform current, perfect sensors
    CalmUniform,

    /// FR-002: uniform current, noisy compass and GNSS
    NoisyUniform,

    /// FR-003: eastward current strengthening to the north
    Shear,

    /// FR-004: single clockwise eddy
    Vortex,
}

/// Everything a run needs to know about a scenario.
#[derive(Debug, Clone, Copy)]
pub struct ScenarioSetup {
    pub field: FlowField,
    pub noise: Option<NoiseModel>,
    /// Number of vehicles
    pub vehicles: usize,
    /// Vehicle speed through the flow (m/s)
    pub speed: f64,
    /// Vehicles start within this distance of the origin (m)
    pub spawn_half_extent: f64,
    /// Largest acceptable RMSE of the assimilated mean flow (m/s)
    pub max_rmse: f64,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::CalmUniform,
            ScenarioId::NoisyUniform,
            ScenarioId::Shear,
            ScenarioId::Vortex,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::CalmUniform => "calm_uniform",
            ScenarioId::NoisyUniform => "noisy_uniform",
            ScenarioId::Shear => "shear",
            ScenarioId::Vortex => "vortex",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::CalmUniform => "Uniform 2 m/s current, noise-free sensors; must be recovered exactly",
            ScenarioId::NoisyUniform => "Uniform current with 1 degree compass and 0.1 m/s speed noise",
            ScenarioId::Shear => "Eastward current from 0.5 to 2.5 m/s across the survey area",
            ScenarioId::Vortex => "Rankine eddy, 1.5 m/s peak at 300 m radius",
        }
    }

    /// Field, fleet and acceptance threshold for this scenario.
    pub fn setup(&self) -> Result<ScenarioSetup, SimError> {
        let uniform = FlowField::Uniform { x: 1.6, y: 1.2 };
        let setup = match self {
            ScenarioId::CalmUniform => ScenarioSetup {
                field: uniform,
                noise: None,
                vehicles: 3,
                speed: 8.0,
                spawn_half_extent: 400.0,
                max_rmse: 1e-6,
            },
            ScenarioId::NoisyUniform => ScenarioSetup {
                field: uniform,
                noise: Some(NoiseModel::new(1.0, 0.1, 1.0)?),
                vehicles: 3,
                speed: 8.0,
                spawn_half_extent: 400.0,
                max_rmse: 0.5,
            },
            ScenarioId::Shear => ScenarioSetup {
                field: FlowField::Shear { base: 1.5, gradient: 0.002 },
                noise: None,
                vehicles: 4,
                speed: 8.0,
                spawn_half_extent: 500.0,
                max_rmse: 1.0,
            },
            ScenarioId::Vortex => ScenarioSetup {
                field: FlowField::Vortex { cx: 0.0, cy: 0.0, peak: 1.5, radius: 300.0 },
                noise: None,
                vehicles: 4,
                speed: 8.0,
                spawn_half_extent: 500.0,
                max_rmse: 1.5,
            },
        };
        Ok(setup)
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "calm_uniform" | "calmuniform" | "fr-001" => Ok(ScenarioId::CalmUniform),
            "noisy_uniform" | "noisyuniform" | "fr-002" => Ok(ScenarioId::NoisyUniform),
            "shear" | "fr-003" => Ok(ScenarioId::Shear),
            "vortex" | "fr-004" => Ok(ScenarioId::Vortex),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for id in ScenarioId::all() {
            assert_eq!(id.name().parse::<ScenarioId>(), Ok(id));
            assert!(id.setup().is_ok());
        }
        assert_eq!("FR-003".parse::<ScenarioId>(), Ok(ScenarioId::Shear));
        assert!("tornado".parse::<ScenarioId>().is_err());
    }
}
