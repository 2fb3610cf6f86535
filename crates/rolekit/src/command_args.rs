//! Command arguments sourced from a command-args file
//!
//! The file maps `"[prefix/]group command[/suffix]"` keys to argument
//! mappings. Values may reference the configuration (`@path`, `{@path}`),
//! and are resolved against the [`ConfigStore`] when selected.
//!
//! ```yaml
//! busy_cluster create_namespaces:
//!   prefix: "@busy_cluster.namespace_prefix"
//!   count: "@busy_cluster.namespaces"
//!   _comment: keys starting with '_' are not passed to the command
//! ```

use crate::error::{Result, RoleError};
use crate::invocation::{CommandArgs, Invocation, command_key};
use crate::registry::Registry;
use layered::reference::ReferenceResolver;
use layered::{ConfigStore, render_value};
use serde_yaml::{Mapping, Value};
use std::fs;
use std::path::{Path, PathBuf};

/// Command-args file used when none is given
pub const ENV_FROM_COMMAND_ARGS_FILE: &str = "KEEL_FROM_COMMAND_ARGS_FILE";

/// Default name of the command-args file in the project directory
pub const COMMAND_ARGS_FILE: &str = "command_args.yml";

/// Which command to look up, and how
#[derive(Debug, Clone, Default)]
pub struct FromConfig {
    pub group: String,
    pub command: String,
    pub prefix: String,
    pub suffix: String,
    /// Merged over the file's arguments
    pub extra: Mapping,
}

impl FromConfig {
    pub fn new(group: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn key(&self) -> String {
        command_key(&self.group, &self.command, &self.prefix, &self.suffix)
    }
}

/// A parsed command-args file
#[derive(Debug, Clone)]
pub struct CommandArgsFile {
    path: PathBuf,
    entries: Mapping,
}

impl CommandArgsFile {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Err(RoleError::NoCommandArgsFile {
                path,
                env: ENV_FROM_COMMAND_ARGS_FILE,
            });
        }
        let content = fs::read_to_string(&path)
            .map_err(|e| RoleError::io(format!("failed to read {}", path.display()), e))?;
        let entries = match serde_yaml::from_str::<Value>(&content)? {
            Value::Mapping(entries) => entries,
            Value::Null => Mapping::new(),
            _ => {
                return Err(RoleError::NotAMapping {
                    what: format!("command args file {}", path.display()),
                });
            }
        };
        Ok(Self { path, entries })
    }

    pub fn from_entries(path: impl Into<PathBuf>, entries: Mapping) -> Self {
        Self {
            path: path.into(),
            entries,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.keys().map(render_value).collect();
        keys.sort();
        keys
    }

    /// The arguments of `request`, merged with its `extra` and resolved
    /// against the configuration. `_`-prefixed keys are kept.
    pub fn select(&self, store: &ConfigStore, request: &FromConfig) -> Result<Mapping> {
        let key = request.key();
        let Some(entry) = self.entries.get(key.as_str()) else {
            return Err(RoleError::CommandArgsKeyNotFound {
                available: self.keys(),
                key,
            });
        };

        let mut args = match entry {
            Value::Mapping(args) => args.clone(),
            Value::Null => Mapping::new(),
            _ => {
                return Err(RoleError::NotAMapping {
                    what: format!("command args entry '{key}'"),
                });
            }
        };
        args.extend(request.extra.clone());

        let resolver = ReferenceResolver::new(store, false, 0);
        let mut resolved = Mapping::new();
        for (name, value) in args {
            resolved.insert(name, resolve_deep(&resolver, &value)?);
        }
        Ok(resolved)
    }

    /// Select the arguments of `request` and bind them to the registered
    /// command
    pub fn invocation(&self, registry: &Registry, store: &ConfigStore, request: &FromConfig) -> Result<Invocation> {
        let args = strip_private(self.select(store, request)?);
        let invocation = registry.invocation(&request.group, &request.command, args.clone())?;

        Ok(invocation.with_command_args(CommandArgs {
            key: request.key(),
            args,
        }))
    }
}

fn resolve_deep(resolver: &ReferenceResolver<'_, ConfigStore>, value: &Value) -> Result<Value> {
    Ok(match value {
        Value::Mapping(map) => {
            let mut out = Mapping::new();
            for (k, v) in map {
                out.insert(k.clone(), resolve_deep(resolver, v)?);
            }
            Value::Mapping(out)
        }
        Value::Sequence(items) => Value::Sequence(
            items
                .iter()
                .map(|item| resolve_deep(resolver, item))
                .collect::<Result<_>>()?,
        ),
        other => resolver.resolve(other)?,
    })
}

/// Drop the `_`-prefixed keys
pub fn strip_private(args: Mapping) -> Mapping {
    args.into_iter()
        .filter(|(key, _)| !key.as_str().is_some_and(|k| k.starts_with('_')))
        .collect()
}

/// Text printed in show-args mode: the whole mapping, or one argument
pub fn show_args(args: &Mapping, key: &str, arg: Option<&str>) -> Result<String> {
    match arg {
        None => Ok(serde_yaml::to_string(args)?),
        Some(arg) => args
            .get(arg)
            .map(render_value)
            .ok_or_else(|| RoleError::ShowArgNotFound {
                key: key.to_string(),
                arg: arg.to_string(),
            }),
    }
}

/// Parse an `--extra` value: YAML flow mapping such as `{a: 1, b: x}`
pub fn parse_extra(text: &str) -> Result<Mapping> {
    match serde_yaml::from_str::<Value>(text)? {
        Value::Mapping(extra) => Ok(extra),
        Value::Null => Ok(Mapping::new()),
        other => Err(RoleError::NotAMapping {
            what: format!("--extra (got '{}')", render_value(&other)),
        }),
    }
}
