//! # Layered
//!
//! Layered YAML configuration for test runs.
//!
//! ## Core Concepts
//!
//! - **ConfigStore**: the process-wide document, persisted after every write
//! - **Reference**: a value pointing at another path (`@a.b`, `{@a.b}`,
//!   `*$@secret`, or the `!ref`/`!template`/`!secret`/`!literal` tags)
//! - **Preset**: a named bundle of overrides under `ci_presets`, possibly
//!   extending other presets
//! - **Overrides**: flat `variable_overrides.yaml` files applied last
//!
//! ## Example
//!
//! ```ignore
//! use layered::{ConfigStore, PresetResolver, StoreOptions};
//! use artifacts::ArtifactDir;
//!
//! let artifacts = ArtifactDir::from_env()?;
//! let store = ConfigStore::open("config.yaml", StoreOptions::from_env(artifacts))?;
//!
//! PresetResolver::new(&store).apply("light")?;
//! let nodes = store.get("cluster.nodes")?;
//! store.set("tests.count", 3)?;
//! ```
//!
//! Writes are only accepted from the thread that opened the store; reads
//! may come from anywhere.

pub mod entrypoint;
pub mod error;
pub mod overrides;
pub mod path;
pub mod preset;
pub mod reference;
pub mod skip;
pub mod store;

pub use entrypoint::{InitOptions, init, seed_config_file};
pub use error::{ConfigError, Result};
pub use overrides::{OverrideOptions, apply_config_overrides, save_config_overrides};
pub use path::{ConfigPath, Segment};
pub use preset::PresetResolver;
pub use reference::{Reference, TemplatePart, render_value};
pub use skip::SkipDecision;
pub use store::{ConfigStore, GetOptions, StoreOptions, running_in_ci};

// Re-exported so that callers build values without naming serde_yaml
pub use serde_yaml::{Mapping, Value};
