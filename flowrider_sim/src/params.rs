//! Parameter files.
//!
//! A parameter file is TOML with the same sections as [`FlowConfig`]; any
//! key left out keeps its default. Wind and water deployments normally keep
//! separate files.
//!
//! ```toml
//! [intersections]
//! max_dist = 500.0
//! max_time_diff = 1800.0
//!
//! [assimilation]
//! k_nearest = 10
//! dynamic_bounds = true
//! ```

use crate::error::SimError;
use flowrider_core::FlowConfig;
use std::path::Path;
use tracing::info;

/// Parses and validates a parameter document.
pub fn parse_config(text: &str, origin: &Path) -> Result<FlowConfig, SimError> {
    let config: FlowConfig = toml::from_str(text).map_err(|source| SimError::ParamsParse {
        path: origin.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

/// Reads, parses and validates the parameter file at `path`.
pub fn load_config(path: &Path) -> Result<FlowConfig, SimError> {
    let text = std::fs::read_to_string(path).map_err(|source| SimError::ParamsIo {
        path: path.to_path_buf(),
        source,
    })?;
    let config = parse_config(&text, path)?;
    info!(path = %path.display(), "Loaded parameter file");
    Ok(config)
}

/// Configuration from `path` if given, defaults otherwise.
pub fn load_or_default(path: Option<&Path>) -> Result<FlowConfig, SimError> {
    match path {
        Some(path) => load_config(path),
        None => Ok(FlowConfig::default()),
    }
}
