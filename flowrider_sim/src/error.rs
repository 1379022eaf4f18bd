//! Harness errors.

use flowrider_core::FlowError;
use flowrider_env::EnvError;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error("Failed to read parameter file {path}: {source}")]
    ParamsIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid parameter file {path}: {source}")]
    ParamsParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Noise {parameter} must be a finite, non-negative std, got {value}")]
    NoiseStd { parameter: &'static str, value: f64 },

    #[error("Invalid noise model: {0}")]
    Noise(#[from] rand_distr::NormalError),
}
