//! The invocation descriptor: one role call, built once, consumed once

use crate::error::{Result, RoleError};
use serde_yaml::{Mapping, Value};

/// Where the arguments of an invocation came from, when resolved from a
/// command-args file
#[derive(Debug, Clone, PartialEq)]
pub struct CommandArgs {
    /// `[prefix/]group command[/suffix]`
    pub key: String,
    pub args: Mapping,
}

/// A typed call of one command, mapped onto one role
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub role: String,
    pub group: String,
    pub command: String,
    pub args: Mapping,
    pub constants: Vec<(String, Value)>,
    /// Prefix every argument and constant with `<role>_`
    pub mapped_params: bool,
    pub skip_config_generation: bool,
    pub command_args: Option<CommandArgs>,
}

impl Invocation {
    pub fn new(role: impl Into<String>, group: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            group: group.into(),
            command: command.into(),
            args: Mapping::new(),
            constants: Vec::new(),
            mapped_params: false,
            skip_config_generation: false,
            command_args: None,
        }
    }

    pub fn with_arg(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.args.insert(Value::from(name), value.into());
        self
    }

    pub fn with_args(mut self, args: Mapping) -> Self {
        self.args.extend(args);
        self
    }

    pub fn with_constant(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.constants.push((name.to_string(), value.into()));
        self
    }

    pub fn mapped_params(mut self, mapped: bool) -> Self {
        self.mapped_params = mapped;
        self
    }

    pub fn with_command_args(mut self, command_args: CommandArgs) -> Self {
        self.command_args = Some(command_args);
        self
    }

    /// Variables handed to the role
    pub fn role_vars(&self) -> Result<Mapping> {
        if self.role.is_empty() {
            return Err(RoleError::MissingRoleName {
                group: self.group.clone(),
                command: self.command.clone(),
            });
        }

        if !self.mapped_params {
            return Ok(self.args.clone());
        }

        let mut vars = Mapping::new();
        for (name, value) in &self.args {
            let Some(name) = name.as_str() else { continue };
            if name == "self" {
                continue;
            }
            vars.insert(Value::from(format!("{}_{name}", self.role)), value.clone());
        }
        for (name, value) in &self.constants {
            vars.insert(Value::from(format!("{}_{name}", self.role)), value.clone());
        }
        Ok(vars)
    }

    /// `group__command`, the base name of the invocation's artifact directory
    pub fn artifact_dirname(&self) -> String {
        format!("{}__{}", self.group, self.command)
    }

    /// `[prefix/]group command[/suffix]`
    pub fn command_name(&self, prefix: &str, suffix: &str) -> String {
        command_key(&self.group, &self.command, prefix, suffix)
    }
}

/// Key of a command in a command-args file
pub fn command_key(group: &str, command: &str, prefix: &str, suffix: &str) -> String {
    let mut key = format!("{group} {command}");
    if !prefix.is_empty() {
        key = format!("{prefix}/{key}");
    }
    if !suffix.is_empty() {
        key = format!("{key}/{suffix}");
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapped_params() {
        let invocation = Invocation::new("busy_cluster_create_namespaces", "busy_cluster", "create_namespaces")
            .with_arg("self", "ignored")
            .with_arg("prefix", "busy-namespace")
            .with_arg("count", 10)
            .with_constant("labels_default", "keel=true")
            .mapped_params(true);

        let vars = invocation.role_vars().unwrap();
        let keys: Vec<&str> = vars.keys().filter_map(Value::as_str).collect();
        assert_eq!(
            keys,
            vec![
                "busy_cluster_create_namespaces_prefix",
                "busy_cluster_create_namespaces_count",
                "busy_cluster_create_namespaces_labels_default",
            ]
        );
        assert_eq!(
            vars.get("busy_cluster_create_namespaces_count"),
            Some(&Value::from(10))
        );
    }

    #[test]
    fn test_unmapped_params_are_used_as_is() {
        let invocation = Invocation::new("role", "group", "command")
            .with_arg("a", 1)
            .with_constant("c", 2);

        let vars = invocation.role_vars().unwrap();
        assert_eq!(vars.len(), 1);
        assert_eq!(vars.get("a"), Some(&Value::from(1)));
    }

    #[test]
    fn test_missing_role_name() {
        let err = Invocation::new("", "group", "command").role_vars().unwrap_err();
        assert!(matches!(err, RoleError::MissingRoleName { .. }));
    }

    #[test]
    fn test_command_key() {
        assert_eq!(command_key("g", "c", "", ""), "g c");
        assert_eq!(command_key("g", "c", "pre", "suf"), "pre/g c/suf");
        assert_eq!(
            Invocation::new("r", "cluster", "capture").artifact_dirname(),
            "cluster__capture"
        );
    }
}
