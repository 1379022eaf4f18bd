//! Error types for the flowrider environment abstraction.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised at the persistence boundary.
///
/// Every variant names the file it concerns so failures can be reported
/// against the offending path.
#[derive(Debug, Error)]
pub enum EnvError {
    /// The file could not be opened, created or read
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A delimited table could not be parsed or written
    #[error("Malformed table {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A required column is absent from the table header
    #[error("Missing column `{column}` in {path}")]
    MissingColumn { path: PathBuf, column: String },

    /// A raster header or body could not be interpreted
    #[error("Malformed raster {path}: {reason}")]
    MalformedRaster { path: PathBuf, reason: String },
}

impl EnvError {
    /// Creates an I/O error bound to a path.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Creates a table error bound to a path.
    pub fn csv(path: impl AsRef<Path>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Creates a raster error bound to a path.
    pub fn raster(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::MalformedRaster {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// The file this error refers to.
    pub fn path(&self) -> &Path {
        match self {
            Self::Io { path, .. }
            | Self::Csv { path, .. }
            | Self::MissingColumn { path, .. }
            | Self::MalformedRaster { path, .. } => path,
        }
    }
}
