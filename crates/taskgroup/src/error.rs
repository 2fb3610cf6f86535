//! Error types for parallel scopes

use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum ParallelError {
    /// The closure registering the tasks failed; nothing ran
    #[error("failed to prepare the '{scope}' parallel execution: {message}")]
    Setup {
        scope: String,
        message: String,
        #[source]
        source: BoxError,
    },

    /// The first task failure of the scope (error or panic)
    #[error("task #{index} of the '{scope}' parallel execution failed: {message}")]
    Task {
        scope: String,
        index: usize,
        message: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to create the thread pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Artifact(#[from] artifacts::ArtifactError),
}

impl ParallelError {
    pub(crate) fn setup(scope: &str, err: anyhow::Error) -> Self {
        Self::Setup {
            scope: scope.to_string(),
            message: format!("{err:#}"),
            source: err.into(),
        }
    }

    pub(crate) fn task(scope: &str, index: usize, err: anyhow::Error) -> Self {
        Self::Task {
            scope: scope.to_string(),
            index,
            message: format!("{err:#}"),
            source: err.into(),
        }
    }
}

/// Result type for parallel scopes
pub type Result<T> = std::result::Result<T, ParallelError>;
