//! Centralized path resolution for keel
//!
//! # Environment Variables
//!
//! - `KEEL_TESTING_DIR` - Project directory holding `config.yaml` and
//!   `command_args.yml` (default: current directory)
//! - `KEEL_REPO_DIR` - Repository root with `projects/*/toolbox` and the
//!   repository-level `variable_overrides.yaml` (default: current directory)
//! - `KEEL_FROM_COMMAND_ARGS_FILE` - Command-args file override
//! - `ARTIFACT_DIR` / `KEEL_BASE_DIR` - Artifact directory, see [`artifact_dir`]

use anyhow::{Context, Result};
use artifacts::{ArtifactDir, ENV_ARTIFACT_DIR};
use rolekit::command_args::{COMMAND_ARGS_FILE, ENV_FROM_COMMAND_ARGS_FILE};
use std::path::{Path, PathBuf};

/// Environment variable for the project directory
pub const ENV_TESTING_DIR: &str = "KEEL_TESTING_DIR";

/// Environment variable for the repository root
pub const ENV_REPO_DIR: &str = "KEEL_REPO_DIR";

/// Get the project directory
///
/// Priority:
/// 1. `KEEL_TESTING_DIR` env var
/// 2. Current directory
pub fn testing_dir() -> Result<PathBuf> {
    dir_from_env(ENV_TESTING_DIR)
}

/// Get the repository root
///
/// Priority:
/// 1. `KEEL_REPO_DIR` env var
/// 2. Current directory
pub fn repo_dir() -> Result<PathBuf> {
    dir_from_env(ENV_REPO_DIR)
}

fn dir_from_env(var: &str) -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(var) {
        let path = expand(&dir);
        log::debug!("Using {} from the environment: {}", var, path.display());
        return Ok(path);
    }

    std::env::current_dir().context("Could not determine the current directory")
}

/// Get the artifact directory, creating it if needed
///
/// Priority:
/// 1. `ARTIFACT_DIR` env var (with `~` and variable expansion)
/// 2. `$KEEL_BASE_DIR/keel_<date>`
pub fn artifact_dir() -> Result<ArtifactDir> {
    if let Ok(dir) = std::env::var(ENV_ARTIFACT_DIR) {
        let path = expand(&dir);
        return ArtifactDir::open(&path)
            .with_context(|| format!("Failed to open the artifact dir {}", path.display()));
    }

    ArtifactDir::from_env().context("Failed to create the artifact dir")
}

/// Get the command-args file
///
/// Priority:
/// 1. Explicit path (command line)
/// 2. `KEEL_FROM_COMMAND_ARGS_FILE` env var
/// 3. `<testing_dir>/command_args.yml`
pub fn command_args_file(explicit: Option<&Path>, testing_dir: &Path) -> PathBuf {
    if let Some(path) = explicit {
        return expand(&path.to_string_lossy());
    }
    if let Ok(file) = std::env::var(ENV_FROM_COMMAND_ARGS_FILE) {
        return expand(&file);
    }
    testing_dir.join(COMMAND_ARGS_FILE)
}

/// Expand ~ and environment variables in a path string.
///
/// Unknown variables are left as-is.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================
