//! Variable override files
//!
//! A `variable_overrides.yaml` file is a flat mapping of config path to
//! value, applied on top of the document after the presets.

use crate::error::{ConfigError, Result};
use crate::path::ConfigPath;
use crate::reference::{Reference, render_value};
use crate::store::{ConfigStore, parse_document};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::Path;

/// Name of override files, in the repository and in the artifact directory
pub const VARIABLE_OVERRIDES_FILE: &str = "variable_overrides.yaml";

/// Top-level key receiving the overrides when they are not applied
pub const OVERRIDES_KEY: &str = "overrides";

#[derive(Debug, Clone, Copy)]
pub struct OverrideOptions {
    /// Skip keys missing from the document instead of creating them
    pub ignore_not_found: bool,
    /// Log each applied override
    pub log: bool,
}

impl Default for OverrideOptions {
    fn default() -> Self {
        Self {
            ignore_not_found: false,
            log: true,
        }
    }
}

/// Apply the overrides of `path` onto the store. A missing file is a no-op.
pub fn apply_config_overrides(store: &ConfigStore, path: &Path, options: OverrideOptions) -> Result<()> {
    if !path.exists() {
        log::debug!(
            "apply_config_overrides: {} does not exist, nothing to override.",
            path.display()
        );
        return Ok(());
    }

    for (key, value) in load_overrides(path)? {
        let key = render_value(&key);

        if store.contains(&key) {
            store.set_with(&key, value.clone(), false)?;
        } else {
            if options.ignore_not_found {
                log::debug!("config override: {key} not in the configuration, ignoring it");
                continue;
            }
            if ConfigPath::parse(&key)?.top_level_key().is_none() {
                return Err(ConfigError::CannotCreateKey(key));
            }
            store.upsert(&key, value.clone(), false)?;
        }

        if options.log {
            if Reference::looks_secret(&value) {
                log::info!("config override: {key} --> {}", render_value(&value));
            } else {
                let actual = store.get_quiet(&key)?;
                log::info!("config override: {key} --> {}", render_value(&actual));
            }
        }
    }

    Ok(())
}

/// Store the overrides of `path` (or `{}`) under the top-level `overrides`
/// key, without applying them
pub fn save_config_overrides(store: &ConfigStore, path: &Path) -> Result<()> {
    let overrides = if path.exists() {
        load_overrides(path)?
    } else {
        log::debug!(
            "save_config_overrides: {} does not exist, nothing to save.",
            path.display()
        );
        Mapping::new()
    };

    store.upsert(OVERRIDES_KEY, Value::Mapping(overrides), false)
}

/// Read an override file, which must hold a mapping
pub fn load_overrides(path: &Path) -> Result<Mapping> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    match parse_document(path, &content)? {
        Value::Mapping(mapping) => Ok(mapping),
        other => {
            log::error!(
                "Wrong type for the variable overrides file. Expected a mapping, got {}",
                value_kind(&other)
            );
            Err(ConfigError::OverridesNotMapping {
                path: path.to_path_buf(),
                found: value_kind(&other),
            })
        }
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}
