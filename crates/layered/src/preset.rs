//! Named presets: bundles of config overrides under `ci_presets`
//!
//! ```yaml
//! ci_presets:
//!   names: []
//!   light:
//!     extends: [small]
//!     tests.count: 1
//!   small:
//!     cluster.nodes: 2
//! ```

use crate::error::{ConfigError, Result};
use crate::path::ConfigPath;
use crate::reference::render_value;
use crate::store::ConfigStore;
use serde_yaml::{Mapping, Value};

/// Top-level key holding the presets
pub const PRESETS_KEY: &str = "ci_presets";

/// List of the presets applied so far
pub const PRESET_NAMES_PATH: &str = "ci_presets.names";

/// Preset key listing the presets to apply first
pub const EXTENDS_KEY: &str = "extends";

/// Audit file in the artifact directory
pub const PRESETS_APPLIED_FILE: &str = "presets_applied";

/// Top-level keys carrying presets requested from a pull-request comment
pub const PR_ARG_PREFIX: &str = "PR_POSITIONAL_ARG_";

/// Applies presets onto a [`ConfigStore`]
pub struct PresetResolver<'a> {
    store: &'a ConfigStore,
}

impl<'a> PresetResolver<'a> {
    pub fn new(store: &'a ConfigStore) -> Self {
        Self { store }
    }

    /// Apply the preset `name`, its `extends` first
    pub fn apply(&self, name: &str) -> Result<()> {
        let mut chain = Vec::new();
        self.apply_chain(name, &mut chain)
    }

    fn apply_chain(&self, name: &str, chain: &mut Vec<String>) -> Result<()> {
        if chain.iter().any(|applying| applying == name) {
            let mut cycle = chain.clone();
            cycle.push(name.to_string());
            return Err(ConfigError::PresetCycle(cycle));
        }

        let values = self.lookup(name)?;
        log::info!(
            "Applying preset '{name}' ==> {}",
            render_value(&Value::Mapping(values.clone()))
        );

        self.record_name(name)?;

        chain.push(name.to_string());
        if let Some(extends) = values.get(EXTENDS_KEY) {
            for parent in extends_list(name, extends)? {
                self.apply_chain(&parent, chain)?;
            }
        }
        chain.pop();

        for (key, value) in &values {
            let Some(key) = key.as_str() else {
                return Err(ConfigError::InvalidPreset(name.to_string()));
            };
            if key == EXTENDS_KEY {
                continue;
            }

            let msg = format!("preset[{name}] {key} --> {}", render_value(value));
            log::info!("{msg}");
            self.store
                .artifact_dir()
                .append_line(PRESETS_APPLIED_FILE, &msg)?;

            self.set_creating_top_level(key, value.clone())?;
        }

        Ok(())
    }

    fn lookup(&self, name: &str) -> Result<Mapping> {
        let path = format!("{PRESETS_KEY}[\"{name}\"]");
        match self.store.get_raw(&path) {
            Ok(Value::Mapping(values)) => Ok(values),
            Ok(Value::Null)
            | Err(ConfigError::KeyNotFound { .. } | ConfigError::InvalidPath { .. }) => {
                log::error!("Preset '{name}' does not exist");
                Err(ConfigError::PresetNotFound(name.to_string()))
            }
            Ok(_) => Err(ConfigError::InvalidPreset(name.to_string())),
            Err(err) => Err(err),
        }
    }

    fn record_name(&self, name: &str) -> Result<()> {
        let mut names = match self.store.get_raw(PRESET_NAMES_PATH) {
            Ok(Value::Sequence(names)) => names,
            Ok(Value::Null) | Err(ConfigError::KeyNotFound { .. }) => Vec::new(),
            Ok(other) => vec![other],
            Err(err) => return Err(err),
        };

        if names.iter().any(|n| n.as_str() == Some(name)) {
            return Ok(());
        }

        names.push(Value::from(name));
        self.store
            .upsert(PRESET_NAMES_PATH, Value::Sequence(names), true)
    }

    fn set_creating_top_level(&self, key: &str, value: Value) -> Result<()> {
        let creatable = ConfigPath::parse(key)?.top_level_key().is_some();
        if creatable && !self.store.contains(key) {
            log::debug!("Creating top-level key '{key}' from a preset");
            return self.store.upsert(key, value, false);
        }
        self.store.set_with(key, value, false)
    }

    /// Apply the presets listed in the `PR_POSITIONAL_ARG_<n>` keys, `n != 0`
    pub fn apply_from_pr_args(&self) -> Result<()> {
        let Value::Mapping(root) = self.store.document() else {
            return Ok(());
        };

        let first = format!("{PR_ARG_PREFIX}0");
        for key in root.keys().filter_map(Value::as_str) {
            if !key.starts_with(PR_ARG_PREFIX) || key == first {
                continue;
            }

            let presets = match self.store.get(key)? {
                Value::Null => continue,
                value => render_value(&value),
            };
            for preset in presets.split_whitespace() {
                self.apply(preset)?;
            }
        }
        Ok(())
    }

    /// Apply `profile` when the CI job name designates a `suffix` run.
    ///
    /// `job_name` is `None` outside CI. Returns whether the profile was applied.
    pub fn detect_light_profile(
        &self,
        profile: &str,
        suffix: &str,
        job_name: Option<&str>,
    ) -> Result<bool> {
        let Some(job_name) = job_name else {
            log::info!("Not running in CI, no light environment to detect.");
            return Ok(false);
        };

        if job_name != suffix && !job_name.ends_with(&format!("-{suffix}")) {
            return Ok(false);
        }

        log::info!("Running a '{suffix}' test ({job_name}), applying the '{profile}' profile");
        self.apply(profile)?;
        Ok(true)
    }
}

fn extends_list(name: &str, extends: &Value) -> Result<Vec<String>> {
    match extends {
        Value::String(parent) => Ok(vec![parent.clone()]),
        Value::Sequence(parents) => parents
            .iter()
            .map(|p| {
                p.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ConfigError::InvalidPreset(name.to_string()))
            })
            .collect(),
        Value::Null => Ok(Vec::new()),
        _ => Err(ConfigError::InvalidPreset(name.to_string())),
    }
}
