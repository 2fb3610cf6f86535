//! # artifacts
//!
//! Handle on the hierarchical artifact tree a test run writes into.
//!
//! Every step of a run (a role invocation, a parallel scope, a preset
//! application) stores its logs in a sub-directory named
//! `NNN__<name>`, where `NNN` is the number of indexed entries already
//! present. Allocation of that index is serialized inside the process so
//! that concurrent allocations never collide.
//!
//! Plain-text marker files (`FAILURE`, `SKIPPED`, ...) let CI log scraping
//! summarize outcomes without parsing console output.

pub mod error;

pub use error::{ArtifactError, Result};

use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Environment variable naming the current artifact directory
pub const ENV_ARTIFACT_DIR: &str = "ARTIFACT_DIR";

/// Environment variable naming the parent of generated artifact directories
pub const ENV_BASE_DIR: &str = "KEEL_BASE_DIR";

/// Marker file appended to when a step fails
pub const FAILURE_MARKER: &str = "FAILURE";

/// Marker file written when a step is skipped on purpose
pub const SKIPPED_MARKER: &str = "SKIPPED";

/// Separator between the index and the name of an indexed sub-directory
const INDEX_SEPARATOR: &str = "__";

static ALLOCATION: Mutex<()> = Mutex::new(());

/// A directory of the artifact tree.
///
/// The handle is cheap to clone and is passed explicitly to everything that
/// writes artifacts; the process environment is never used as the source of
/// truth once the handle exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDir {
    path: PathBuf,
}

impl ArtifactDir {
    /// Open (and create if needed) an artifact directory
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        fs::create_dir_all(&path).map_err(|source| ArtifactError::CreateDir {
            path: path.clone(),
            source,
        })?;
        Ok(Self { path })
    }

    /// Resolve the artifact directory from the environment.
    ///
    /// `ARTIFACT_DIR` wins; otherwise a timestamped directory is created
    /// under `KEEL_BASE_DIR` (default `/tmp`).
    pub fn from_env() -> Result<Self> {
        if let Ok(dir) = std::env::var(ENV_ARTIFACT_DIR) {
            log::debug!("Using artifact dir from {}: {}", ENV_ARTIFACT_DIR, dir);
            return Self::open(dir);
        }

        let base = std::env::var(ENV_BASE_DIR).unwrap_or_else(|_| "/tmp".to_string());
        let path = default_location(Path::new(&base), "%Y%m%d");
        log::debug!("Using generated artifact dir: {}", path.display());
        Self::open(path)
    }

    /// Path of this directory
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last component of the path
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Path of an entry inside this directory
    pub fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }

    /// Number of indexed (`*__*`) entries currently present
    pub fn next_index(&self) -> Result<usize> {
        let entries = fs::read_dir(&self.path).map_err(|source| ArtifactError::ReadDir {
            path: self.path.clone(),
            source,
        })?;

        Ok(entries
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().contains(INDEX_SEPARATOR))
            .count())
    }

    /// Allocate and create the next indexed sub-directory, `NNN__<name>`
    pub fn next_child(&self, name: &str) -> Result<Self> {
        validate_name(name)?;

        let _guard = match ALLOCATION.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let index = self.next_index()?;
        let child = Self::open(self.path.join(format!("{index:03}{INDEX_SEPARATOR}{name}")))?;
        log::debug!("Allocated artifact dir {}", child.path.display());
        Ok(child)
    }

    /// Open a named (non-indexed) sub-directory
    pub fn child(&self, name: &str) -> Result<Self> {
        validate_name(name)?;
        Self::open(self.path.join(name))
    }

    /// Replace the content of a file inside this directory
    pub fn write(&self, file: &str, contents: &str) -> Result<PathBuf> {
        let path = self.path.join(file);
        fs::write(&path, contents).map_err(|source| ArtifactError::Write {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }

    /// Append one line to a file inside this directory
    pub fn append_line(&self, file: &str, line: &str) -> Result<()> {
        let path = self.path.join(file);
        let write = || -> std::io::Result<()> {
            let mut f = OpenOptions::new().create(true).append(true).open(&path)?;
            writeln!(f, "{line}")
        };
        write().map_err(|source| ArtifactError::Write { path, source })
    }

    /// Append a line to the `FAILURE` marker
    pub fn mark_failure(&self, line: &str) -> Result<()> {
        self.append_line(FAILURE_MARKER, line)
    }

    /// Whether a `FAILURE` marker exists
    pub fn has_failure(&self) -> bool {
        self.path.join(FAILURE_MARKER).exists()
    }
}

/// Timestamped artifact directory location under `base`
pub fn default_location(base: &Path, timestamp_format: &str) -> PathBuf {
    base.join(format!("keel_{}", Local::now().format(timestamp_format)))
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains('/') || name == "." || name == ".." {
        return Err(ArtifactError::InvalidName(name.to_string()));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================
