//! # Rolekit
//!
//! Maps a typed command call onto a single ad-hoc Ansible role execution.
//!
//! ## Core Concepts
//!
//! - **Registry**: static [`CommandGroup`] descriptors, registered explicitly
//! - **Invocation**: one command call; with mapped params every argument
//!   becomes `<role>_<arg>`
//! - **PreparedEnvironment**: private environment and artifact directory
//! - **GeneratedPlaybook**: single play, single role, local or remote
//! - **RoleInvoker**: runs it all through a [`PlaybookRunner`] and returns a
//!   [`RoleResult`]
//!
//! ## Example
//!
//! ```ignore
//! use rolekit::{InvokerSettings, Registry, RoleInvoker};
//!
//! let registry = Registry::new().register(&CLUSTER);
//! let invocation = registry.invocation("cluster", "capture_environment", Mapping::new())?;
//!
//! let invoker = RoleInvoker::with_process_runner(InvokerSettings::from_env(repo_dir));
//! let result = invoker.invoke(&invocation)?;
//! std::process::exit(result.exit_code);
//! ```
//!
//! The process environment is never modified: every invocation works on its
//! own copy.

pub mod command_args;
pub mod environment;
pub mod error;
pub mod invocation;
pub mod invoker;
pub mod playbook;
pub mod registry;
pub mod runner;

pub use command_args::{CommandArgsFile, FromConfig, parse_extra, show_args, strip_private};
pub use environment::{InvokerSettings, PreparedEnvironment};
pub use error::{Result, RoleError};
pub use invocation::{CommandArgs, Invocation, command_key};
pub use invoker::{RoleInvoker, RoleResult};
pub use playbook::GeneratedPlaybook;
pub use registry::{ArgSpec, CommandGroup, CommandSpec, Registry, RoleConstant};
pub use runner::{PlaybookOutput, PlaybookRunner, ProcessRunner};
