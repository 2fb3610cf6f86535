//! Error types for role invocations.
//!
//! Lookup mistakes (unknown group, command or argument) are reported as
//! errors to the caller, never as process exits.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while building or running a role invocation
#[derive(Debug, Error)]
pub enum RoleError {
    /// The invocation does not name a role
    #[error("role not set for '{group} {command}'")]
    MissingRoleName { group: String, command: String },

    /// No command group with this name is registered
    #[error("unknown command group '{0}'")]
    UnknownGroup(String),

    /// The group has no such command
    #[error("unknown command '{command}' in group '{group}'")]
    UnknownCommand { group: String, command: String },

    /// The command does not declare this argument
    #[error("'{group} {command}' has no argument '{arg}'")]
    UnknownArgument {
        group: String,
        command: String,
        arg: String,
    },

    /// A required argument was not provided
    #[error("'{group} {command}' requires the argument '{arg}'")]
    MissingArgument {
        group: String,
        command: String,
        arg: String,
    },

    /// A declared default or constant is not valid YAML
    #[error("invalid default value for '{name}'")]
    InvalidDefault {
        name: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// The command-args file has no entry for the requested command
    #[error("key '{key}' not found in the command arguments. Available keys: {}", .available.join(", "))]
    CommandArgsKeyNotFound { key: String, available: Vec<String> },

    /// A command-args entry or `--extra` value is not a mapping
    #[error("{what} must be a mapping")]
    NotAMapping { what: String },

    /// `show_args` names an argument that is not in the selected mapping
    #[error("argument '{arg}' not found in '{key}'")]
    ShowArgNotFound { key: String, arg: String },

    /// The command-args file does not exist
    #[error("no command arguments file at {}: pass one or set {env}", path.display())]
    NoCommandArgsFile { path: PathBuf, env: &'static str },

    /// The playbook extra-vars file could not be parsed
    #[error("could not parse the playbook extra vars file {path} as YAML")]
    ExtraVars {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Remote execution requires passing the inventory through /proc
    #[error("remote playbook execution is only supported on unix")]
    RemoteUnsupported,

    /// The playbook executable could not be started
    #[error("failed to execute {program}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// A file operation failed
    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization of a generated file failed
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Config(#[from] layered::ConfigError),

    #[error(transparent)]
    Artifact(#[from] artifacts::ArtifactError),
}

impl RoleError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Result type for role operations
pub type Result<T> = std::result::Result<T, RoleError>;
