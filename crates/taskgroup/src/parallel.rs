//! Fail-fast parallel scopes
//!
//! A scope collects closures, then runs all of them at once on a dedicated
//! rayon pool. The first failure cancels the scope's [`CancelToken`]; tasks
//! that have not started yet are skipped, running ones are joined. What
//! happens next depends on the scope policy:
//!
//! - exit on exception: the failure is logged, appended to the `FAILURE`
//!   marker and the process exits with code 1
//! - otherwise: the first failure is returned as [`ParallelError::Task`]

use crate::context::{CancelToken, TaskContext};
use crate::error::{ParallelError, Result};
use artifacts::ArtifactDir;
use rayon::prelude::*;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;

type Task<'a> = Box<dyn FnOnce(&TaskContext) -> anyhow::Result<()> + Send + 'a>;

/// Exit code of a scope terminated by a task failure
pub const FAILURE_EXIT_CODE: i32 = 1;

// ============================================================================
// Task registration
// ============================================================================

/// Tasks registered inside [`Parallel::scope`]
#[derive(Default)]
pub struct TaskSet<'a> {
    tasks: Vec<Task<'a>>,
}

impl<'a> TaskSet<'a> {
    /// Register a task. Nothing runs until the registering closure returns.
    pub fn delayed<F>(&mut self, task: F) -> &mut Self
    where
        F: FnOnce(&TaskContext) -> anyhow::Result<()> + Send + 'a,
    {
        self.tasks.push(Box::new(task));
        self
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

// ============================================================================
// Scope
// ============================================================================

/// A named parallel scope
#[derive(Debug, Clone)]
pub struct Parallel {
    name: String,
    exit_on_exception: bool,
    dedicated_dir: bool,
    exit: fn(i32) -> !,
}

impl Parallel {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exit_on_exception: true,
            dedicated_dir: true,
            exit: std::process::exit,
        }
    }

    /// Terminate the process on the first failure (default) or return it
    pub fn exit_on_exception(mut self, enabled: bool) -> Self {
        self.exit_on_exception = enabled;
        self
    }

    /// Run the tasks inside a fresh `NNN__<name>` artifact directory (default)
    pub fn dedicated_dir(mut self, enabled: bool) -> Self {
        self.dedicated_dir = enabled;
        self
    }

    /// Replace the function called to terminate the process
    pub fn with_exit(mut self, exit: fn(i32) -> !) -> Self {
        self.exit = exit;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register tasks with `build`, then run them all concurrently.
    ///
    /// When `build` fails, no task runs and its error is returned.
    pub fn scope<'a, F>(&self, artifacts: &ArtifactDir, build: F) -> Result<()>
    where
        F: FnOnce(&mut TaskSet<'a>) -> anyhow::Result<()>,
    {
        let mut set = TaskSet::default();
        if let Err(err) = build(&mut set) {
            log::warn!(
                "The '{}' Parallel execution was not started: {:#}",
                self.name,
                err
            );
            return Err(ParallelError::setup(&self.name, err));
        }

        let dir = if self.dedicated_dir {
            artifacts.next_child(&self.name)?
        } else {
            artifacts.clone()
        };

        log::info!(
            "Running {} task(s) of the '{}' Parallel execution in {}",
            set.len(),
            self.name,
            dir.path().display()
        );

        let Some((index, err)) = self.execute(set.tasks, &dir)? else {
            return Ok(());
        };
        let failure = ParallelError::task(&self.name, index, err);

        if self.exit_on_exception {
            log::error!("{failure}");
            log::error!(
                "Exception caught during the '{}' Parallel execution. Exiting.",
                self.name
            );
            if let Err(e) = dir.mark_failure(&format!("[{}] {failure}", self.name)) {
                log::warn!("Could not record the failure of '{}': {e}", self.name);
            }
            (self.exit)(FAILURE_EXIT_CODE);
        }

        Err(failure)
    }

    /// Run every task and return the first failure, if any
    fn execute(
        &self,
        tasks: Vec<Task<'_>>,
        dir: &ArtifactDir,
    ) -> Result<Option<(usize, anyhow::Error)>> {
        if tasks.is_empty() {
            return Ok(None);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(tasks.len())
            .thread_name({
                let name = self.name.clone();
                move |i| format!("{name}-{i}")
            })
            .build()?;

        let cancel = CancelToken::new();
        let first_failure: Mutex<Option<(usize, anyhow::Error)>> = Mutex::new(None);

        pool.install(|| {
            tasks
                .into_par_iter()
                .enumerate()
                .for_each(|(index, task)| {
                    if cancel.is_cancelled() {
                        log::debug!("'{}' task #{index} skipped after a failure", self.name);
                        return;
                    }

                    let ctx = TaskContext {
                        artifact_dir: dir.clone(),
                        cancel: cancel.clone(),
                        index,
                    };
                    let outcome = match panic::catch_unwind(AssertUnwindSafe(|| task(&ctx))) {
                        Ok(outcome) => outcome,
                        Err(payload) => Err(anyhow::anyhow!(
                            "task panicked: {}",
                            panic_message(payload.as_ref())
                        )),
                    };

                    if let Err(err) = outcome {
                        log::error!("'{}' task #{index} failed: {err:#}", self.name);
                        {
                            let mut slot = match first_failure.lock() {
                                Ok(guard) => guard,
                                Err(poisoned) => poisoned.into_inner(),
                            };
                            if slot.is_none() {
                                *slot = Some((index, err));
                            }
                        }
                        // Recorded before cancelling: siblings failing on
                        // cancellation never win the slot
                        cancel.cancel();
                    }
                });
        });

        Ok(match first_failure.into_inner() {
            Ok(failure) => failure,
            Err(poisoned) => poisoned.into_inner(),
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
