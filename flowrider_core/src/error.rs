//! Errors surfaced by the flowrider engines.

use flowrider_env::EnvError;

/// Errors that can occur while configuring or driving the engines.
///
/// Degenerate pairs, short neighbour lists and empty tables are not errors:
/// they show up as discarded pairs and missing (NaN) grid cells.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid grid layout: {0}")]
    InvalidLayout(String),

    #[error("Cannot derive grid bounds: no states recorded and no layout supplied")]
    NoGridExtent,

    #[error(transparent)]
    Env(#[from] EnvError),
}

impl FlowError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
