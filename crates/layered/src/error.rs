//! Error types for the configuration engine.
//!
//! Variants map onto three families:
//! - missing data ([`ConfigError::KeyNotFound`], [`ConfigError::PresetNotFound`])
//! - rejected values ([`ConfigError::SecretNotHandled`],
//!   [`ConfigError::UnsupportedReference`], [`ConfigError::OverridesNotMapping`],
//!   [`ConfigError::CannotCreateKey`])
//! - misuse ([`ConfigError::ThreadViolation`], [`ConfigError::PresetCycle`])

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the configuration engine
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file to load does not exist
    #[error("configuration file '{0}' does not exist")]
    MissingFile(PathBuf),

    /// Lookup of a path that is not in the document, without a default
    #[error("key '{path}' not found{}", .file.as_ref().map(|f| format!(" in {}", f.display())).unwrap_or_default())]
    KeyNotFound { path: String, file: Option<PathBuf> },

    /// The path expression could not be parsed
    #[error("invalid configuration path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// A secret reference was read without declaring the read secret-handled
    #[error("'{reference}' is a secret reference, but the read was not declared as secret-handled")]
    SecretNotHandled { reference: String },

    /// `*@` references are rejected
    #[error("'*@' references are not supported: '{reference}'")]
    UnsupportedReference { reference: String },

    /// A tagged reference whose payload is not a string
    #[error("invalid '!{tag}' reference: expected a string path")]
    InvalidReference { tag: String },

    /// A reference chain that does not terminate
    #[error("reference chain through '{path}' is deeper than {limit} levels")]
    ReferenceDepth { path: String, limit: usize },

    /// The environment variable holding the secrets directory is not set
    #[error("secrets directory variable '{var}' is not set")]
    SecretDirUnset { var: String },

    /// Write attempted from a thread that does not own the store
    #[error("set_config({path}) cannot be called from a thread other than the one owning the configuration")]
    ThreadViolation { path: String },

    /// The named preset does not exist
    #[error("preset '{0}' does not exist")]
    PresetNotFound(String),

    /// The preset exists but is not a mapping
    #[error("preset '{0}' must be a mapping of config keys to values")]
    InvalidPreset(String),

    /// `extends` entries loop back onto a preset being applied
    #[error("preset cycle detected: {}", .0.join(" -> "))]
    PresetCycle(Vec<String>),

    /// The overrides file is not a mapping
    #[error("wrong type for the variable overrides file {path}: expected a mapping, got {found}")]
    OverridesNotMapping { path: PathBuf, found: &'static str },

    /// Overrides may only create top-level keys
    #[error("config key '{0}' does not exist, and cannot be created from a nested path")]
    CannotCreateKey(String),

    /// A value could not be converted to the requested type
    #[error("value at '{path}' has an unexpected type")]
    Convert {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// A file could not be read
    #[error("failed to read {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file could not be written
    #[error("failed to write {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file does not contain valid YAML
    #[error("invalid YAML in {path}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The document could not be serialized
    #[error("failed to serialize the configuration")]
    Serialize(#[source] serde_yaml::Error),

    #[error(transparent)]
    Artifact(#[from] artifacts::ArtifactError),
}

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;
