//! # taskgroup
//!
//! Structured, fail-fast parallelism for test orchestration steps.
//!
//! ## Core Concepts
//!
//! - **Parallel**: a named scope whose tasks all start together on a pool
//!   sized to the task count
//! - **TaskContext**: the scope's artifact directory and cancellation token,
//!   handed to every task
//! - **Failure policy**: exit the process with code 1 (default) or return the
//!   first failure to the caller
//! - **BestEffort**: a sequential chain where every step runs and the first
//!   failure is reported at the end
//!
//! ## Example
//!
//! ```ignore
//! use taskgroup::Parallel;
//!
//! Parallel::new("deploy").scope(&artifacts, |p| {
//!     for name in ["operator", "workload"] {
//!         p.delayed(move |ctx| deploy(name, &ctx.artifact_dir));
//!     }
//!     Ok(())
//! })?;
//! ```

pub mod best_effort;
pub mod context;
pub mod error;
pub mod parallel;

pub use best_effort::BestEffort;
pub use context::{CancelToken, TaskContext};
pub use error::{ParallelError, Result};
pub use parallel::{FAILURE_EXIT_CODE, Parallel, TaskSet};
