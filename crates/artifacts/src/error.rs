//! Error types for artifact directory operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while creating or writing inside an artifact directory.
#[derive(Debug, Error)]
pub enum ArtifactError {
    /// A directory could not be created
    #[error("failed to create artifact directory {path}")]
    CreateDir {
        /// Directory that could not be created
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A directory could not be listed
    #[error("failed to list artifact directory {path}")]
    ReadDir {
        /// Directory that could not be listed
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file inside the artifact tree could not be written
    #[error("failed to write artifact file {path}")]
    Write {
        /// File that could not be written
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Sub-directory names must be a single path component
    #[error("invalid artifact directory name: '{0}'")]
    InvalidName(String),
}

/// Result type for artifact operations.
pub type Result<T> = std::result::Result<T, ArtifactError>;
