//! Static command registry
//!
//! Each command group exports a `static` [`CommandGroup`] and the binary
//! registers the groups it ships explicitly:
//!
//! ```ignore
//! pub static CLUSTER: CommandGroup = CommandGroup {
//!     name: "cluster",
//!     doc: "Commands relating to cluster management",
//!     commands: &[CommandSpec {
//!         name: "capture_environment",
//!         role: "cluster_capture_environment",
//!         doc: "Captures the cluster environment",
//!         mapped_params: true,
//!         skip_config_generation: false,
//!         constants: &[],
//!         args: &[],
//!     }],
//! };
//!
//! let registry = Registry::new().register(&CLUSTER);
//! ```

use crate::error::{Result, RoleError};
use crate::invocation::{Invocation, command_key};
use serde_yaml::{Mapping, Value};

/// A declared argument. Defaults are YAML text, parsed on use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub name: &'static str,
    pub doc: &'static str,
    pub default: Option<&'static str>,
}

impl ArgSpec {
    pub const fn required(name: &'static str, doc: &'static str) -> Self {
        Self {
            name,
            doc,
            default: None,
        }
    }

    pub const fn optional(name: &'static str, doc: &'static str, default: &'static str) -> Self {
        Self {
            name,
            doc,
            default: Some(default),
        }
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }

    pub fn default_value(&self) -> Result<Option<Value>> {
        self.default.map(|text| parse_yaml(self.name, text)).transpose()
    }
}

/// A value always passed to the role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleConstant {
    pub name: &'static str,
    pub doc: &'static str,
    pub value: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub role: &'static str,
    pub doc: &'static str,
    pub mapped_params: bool,
    /// Leave the command out of the generated default args
    pub skip_config_generation: bool,
    pub constants: &'static [RoleConstant],
    pub args: &'static [ArgSpec],
}

impl CommandSpec {
    pub fn arg(&self, name: &str) -> Option<&ArgSpec> {
        self.args.iter().find(|arg| arg.name == name)
    }

    /// Check `args` against the declaration and build the invocation.
    ///
    /// Arguments are ordered as declared; missing optional ones take their
    /// default.
    pub fn bind(&self, group: &str, mut args: Mapping) -> Result<Invocation> {
        for name in args.keys() {
            let name = name.as_str().unwrap_or_default();
            if self.arg(name).is_none() {
                return Err(RoleError::UnknownArgument {
                    group: group.to_string(),
                    command: self.name.to_string(),
                    arg: name.to_string(),
                });
            }
        }

        let mut bound = Mapping::new();
        for spec in self.args {
            let value = match args.remove(spec.name) {
                Some(value) => value,
                None => spec.default_value()?.ok_or_else(|| RoleError::MissingArgument {
                    group: group.to_string(),
                    command: self.name.to_string(),
                    arg: spec.name.to_string(),
                })?,
            };
            bound.insert(Value::from(spec.name), value);
        }

        let mut invocation = Invocation::new(self.role, group, self.name)
            .with_args(bound)
            .mapped_params(self.mapped_params);
        invocation.skip_config_generation = self.skip_config_generation;
        for constant in self.constants {
            invocation = invocation.with_constant(constant.name, parse_yaml(constant.name, constant.value)?);
        }

        Ok(invocation)
    }

    /// Default arguments, `null` for the required ones
    pub fn default_args(&self) -> Result<Mapping> {
        let mut defaults = Mapping::new();
        for spec in self.args {
            defaults.insert(Value::from(spec.name), spec.default_value()?.unwrap_or(Value::Null));
        }
        Ok(defaults)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandGroup {
    pub name: &'static str,
    pub doc: &'static str,
    pub commands: &'static [CommandSpec],
}

impl CommandGroup {
    /// Find a command; `-` and `_` are interchangeable in the name
    pub fn command(&self, name: &str) -> Option<&'static CommandSpec> {
        let name = name.replace('-', "_");
        self.commands.iter().find(|command| command.name == name)
    }
}

/// The command groups known to the binary
#[derive(Debug, Clone, Default)]
pub struct Registry {
    groups: Vec<&'static CommandGroup>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, group: &'static CommandGroup) -> Self {
        self.groups.push(group);
        self
    }

    pub fn groups(&self) -> &[&'static CommandGroup] {
        &self.groups
    }

    pub fn group(&self, name: &str) -> Result<&'static CommandGroup> {
        self.groups
            .iter()
            .copied()
            .find(|group| group.name == name)
            .ok_or_else(|| RoleError::UnknownGroup(name.to_string()))
    }

    pub fn command(&self, group: &str, command: &str) -> Result<&'static CommandSpec> {
        self.group(group)?
            .command(command)
            .ok_or_else(|| RoleError::UnknownCommand {
                group: group.to_string(),
                command: command.to_string(),
            })
    }

    /// Look up a command and bind its arguments
    pub fn invocation(&self, group: &str, command: &str, args: Mapping) -> Result<Invocation> {
        let group = self.group(group)?;
        let spec = group.command(command).ok_or_else(|| RoleError::UnknownCommand {
            group: group.name.to_string(),
            command: command.to_string(),
        })?;
        spec.bind(group.name, args)
    }

    /// Command-args document holding the default arguments of every
    /// command that does not opt out
    pub fn default_args(&self) -> Result<Mapping> {
        let mut document = Mapping::new();
        for group in &self.groups {
            for command in group.commands.iter().filter(|c| !c.skip_config_generation) {
                document.insert(
                    Value::from(command_key(group.name, command.name, "", "")),
                    Value::Mapping(command.default_args()?),
                );
            }
        }
        Ok(document)
    }
}

fn parse_yaml(name: &str, text: &str) -> Result<Value> {
    serde_yaml::from_str(text).map_err(|source| RoleError::InvalidDefault {
        name: name.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    static SAMPLE: CommandGroup = CommandGroup {
        name: "sample",
        doc: "Sample commands",
        commands: &[
            CommandSpec {
                name: "deploy_app",
                role: "sample_deploy_app",
                doc: "Deploys the app",
                mapped_params: true,
                skip_config_generation: false,
                constants: &[RoleConstant {
                    name: "retries",
                    doc: "Number of retries",
                    value: "3",
                }],
                args: &[
                    ArgSpec::required("namespace", "Target namespace"),
                    ArgSpec::optional("replicas", "Number of replicas", "1"),
                    ArgSpec::optional("labels", "Labels to apply", "{}"),
                ],
            },
            CommandSpec {
                name: "internal",
                role: "sample_internal",
                doc: "Not part of the generated args",
                mapped_params: false,
                skip_config_generation: true,
                constants: &[],
                args: &[],
            },
        ],
    };

    fn registry() -> Registry {
        Registry::new().register(&SAMPLE)
    }

    fn args(yaml: &str) -> Mapping {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_bind_fills_defaults_in_order() {
        let invocation = registry()
            .invocation("sample", "deploy-app", args("{labels: {a: b}, namespace: ns}"))
            .unwrap();

        let names: Vec<&str> = invocation.args.keys().filter_map(Value::as_str).collect();
        assert_eq!(names, vec!["namespace", "replicas", "labels"]);
        assert_eq!(invocation.args.get("replicas"), Some(&Value::from(1)));
        assert_eq!(invocation.constants, vec![("retries".to_string(), Value::from(3))]);
        assert!(invocation.mapped_params);
        assert_eq!(invocation.role, "sample_deploy_app");
    }

    #[test]
    fn test_lookup_errors() {
        let registry = registry();

        assert!(matches!(
            registry.invocation("nope", "x", Mapping::new()),
            Err(RoleError::UnknownGroup(_))
        ));
        assert!(matches!(
            registry.invocation("sample", "nope", Mapping::new()),
            Err(RoleError::UnknownCommand { .. })
        ));
        assert!(matches!(
            registry.invocation("sample", "deploy_app", args("{namespace: ns, bogus: 1}")),
            Err(RoleError::UnknownArgument { .. })
        ));
        assert!(matches!(
            registry.invocation("sample", "deploy_app", Mapping::new()),
            Err(RoleError::MissingArgument { arg, .. }) if arg == "namespace"
        ));
    }

    #[test]
    fn test_default_args_skip_opted_out_commands() {
        let defaults = registry().default_args().unwrap();

        assert_eq!(defaults.len(), 1);
        let deploy = defaults.get("sample deploy_app").unwrap();
        assert_eq!(deploy.get("namespace"), Some(&Value::Null));
        assert_eq!(deploy.get("replicas"), Some(&Value::from(1)));
    }
}
