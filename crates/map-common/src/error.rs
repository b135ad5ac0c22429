//! Error types shared by the downloader and the mosaic builder.

use std::path::PathBuf;
use thiserror::Error;

use crate::Layer;

/// Result type alias using MapError.
pub type MapResult<T> = Result<T, MapError>;

/// Primary error type.
///
/// Per-tile network trouble is not an error: the fetcher reports it as a
/// download outcome and moves on.
#[derive(Debug, Error)]
pub enum MapError {
    // === Configuration Errors ===
    #[error("There is no version information for layer {0}")]
    MissingVersion(Layer),

    #[error("Invalid value for '{key}': {message}")]
    InvalidSetting { key: String, message: String },

    #[error("Failed to read config file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    // === Storage Errors ===
    #[error("Storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // === Assembly Errors ===
    #[error("Missing block image: {0}")]
    MissingBlock(PathBuf),

    #[error("Placeholder image not found: {0}")]
    MissingPlaceholder(PathBuf),

    #[error("No tiles found for zoom {0}")]
    EmptyRegion(u32),

    #[error("Composition of {output} failed: {message}")]
    Composition { output: PathBuf, message: String },
}

/// Coarse classification used to decide what aborts a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Storage,
    Assembly,
}

impl MapError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MapError::MissingVersion(_)
            | MapError::InvalidSetting { .. }
            | MapError::ConfigRead { .. }
            | MapError::ConfigParse { .. } => ErrorKind::Configuration,

            MapError::Storage { .. } => ErrorKind::Storage,

            MapError::MissingBlock(_)
            | MapError::MissingPlaceholder(_)
            | MapError::EmptyRegion(_)
            | MapError::Composition { .. } => ErrorKind::Assembly,
        }
    }

    /// Shorthand for an invalid configuration value.
    pub fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        MapError::InvalidSetting {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Attach a path to an I/O failure.
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        MapError::Storage {
            path: path.into(),
            source,
        }
    }

    /// Composition failure for `output`.
    pub fn composition(output: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        MapError::Composition {
            output: output.into(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            MapError::MissingVersion(Layer::Satellite).kind(),
            ErrorKind::Configuration
        );
        assert_eq!(
            MapError::storage("/tmp/x", std::io::Error::other("disk full")).kind(),
            ErrorKind::Storage
        );
        assert_eq!(
            MapError::MissingBlock(PathBuf::from("prepare/0_0.jpg")).kind(),
            ErrorKind::Assembly
        );
    }

    #[test]
    fn test_messages_name_the_culprit() {
        let err = MapError::MissingVersion(Layer::Satellite);
        assert_eq!(err.to_string(), "There is no version information for layer sat");

        let err = MapError::MissingBlock(PathBuf::from("prepare/2_1.jpg"));
        assert!(err.to_string().contains("prepare/2_1.jpg"));
    }
}
