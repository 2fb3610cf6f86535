use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "keel")]
#[command(version)]
#[command(about = "Layered configuration and role orchestration for infrastructure tests", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Read, update and layer the project configuration
    #[command(subcommand)]
    Config(ConfigCommand),

    /// Run one toolbox command
    Run(RunArgs),

    /// Run a toolbox command with the arguments of the command-args file
    FromConfig(FromConfigArgs),

    /// Run several command-args entries concurrently
    Parallel(ParallelArgs),

    /// Inspect the toolbox commands
    #[command(subcommand)]
    Toolbox(ToolboxCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Config Commands
// ============================================================================

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Seed the configuration into the artifact dir, then apply the
    /// overrides and the presets
    Init {
        /// Apply the presets named by PR_POSITIONAL_ARG_<n> variables
        #[arg(long)]
        apply_preset_from_pr_args: bool,

        /// Store the overrides under 'overrides' instead of applying them
        #[arg(long)]
        no_overrides: bool,
    },

    /// Print a configuration value (references resolved)
    Get {
        /// Config path, e.g. `tests.mode` or `ci_presets["light"]`
        path: String,

        /// Value printed when the path does not exist
        #[arg(long)]
        default: Option<String>,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Update an existing configuration value
    Set {
        /// Config path
        path: String,

        /// New value, in YAML syntax
        value: String,
    },

    /// Apply one or more presets
    ApplyPreset {
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Apply a variable overrides file
    ApplyOverrides {
        /// Overrides file (default: variable_overrides.yaml in the artifact dir)
        file: Option<PathBuf>,

        /// Skip the keys missing from the configuration
        #[arg(long)]
        ignore_not_found: bool,
    },

    /// List the defined and the applied presets
    Presets,

    /// Check a subcommand against the exec list; exits 0 either way
    Skip {
        subcommand: String,
    },

    /// Print the path of the active configuration file
    Path,
}

// ============================================================================
// Toolbox Commands
// ============================================================================

#[derive(Parser)]
pub struct RunArgs {
    /// Command group, e.g. `busy_cluster`
    pub group: String,

    /// Command, e.g. `create_namespaces`
    pub command: String,

    /// Command argument (value in YAML syntax)
    #[arg(long = "arg", value_name = "NAME=VALUE", value_parser = parse_key_val)]
    pub args: Vec<(String, String)>,
}

#[derive(Parser)]
pub struct FromConfigArgs {
    pub group: String,

    pub command: String,

    /// Key prefix in the command-args file (`prefix/group command`)
    #[arg(long, default_value = "")]
    pub prefix: String,

    /// Key suffix in the command-args file (`group command/suffix`)
    #[arg(long, default_value = "")]
    pub suffix: String,

    /// Arguments merged over the file's, as a YAML mapping
    #[arg(long)]
    pub extra: Option<String>,

    /// Print the arguments (or only ARG) instead of running
    #[arg(long, num_args = 0..=1, default_missing_value = "", value_name = "ARG")]
    pub show_args: Option<String>,

    /// Command-args file
    #[arg(long)]
    pub command_args_file: Option<PathBuf>,

    /// Exec-list entry gating this run; a skipped entry exits 0
    #[arg(long)]
    pub subcommand: Option<String>,
}

#[derive(Parser)]
pub struct ParallelArgs {
    /// Name of the parallel scope
    pub name: String,

    /// Command-args entries to run, each as "group command"
    #[arg(required = true)]
    pub entries: Vec<String>,

    /// Report the first failure instead of terminating at once
    #[arg(long)]
    pub no_exit_on_exception: bool,

    /// Run inside the current artifact dir instead of a new NNN__<name>
    #[arg(long)]
    pub no_dedicated_dir: bool,

    /// Command-args file
    #[arg(long)]
    pub command_args_file: Option<PathBuf>,

    /// Exec-list entry gating this run; a skipped entry exits 0
    #[arg(long)]
    pub subcommand: Option<String>,
}

#[derive(Subcommand)]
pub enum ToolboxCommand {
    /// List the command groups and their commands
    List,

    /// Show the arguments of a group or a command
    Describe {
        group: String,
        command: Option<String>,
    },

    /// Print a command-args document with the default arguments
    GenerateArgs {
        /// Write to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("invalid NAME=VALUE: no '=' found in '{s}'"))?;
    if key.is_empty() {
        return Err(format!("invalid NAME=VALUE: empty name in '{s}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_key_val() {
        assert_eq!(
            parse_key_val("labels={a: b}").unwrap(),
            ("labels".to_string(), "{a: b}".to_string())
        );
        assert_eq!(
            parse_key_val("expr=a=b").unwrap(),
            ("expr".to_string(), "a=b".to_string())
        );
        assert!(parse_key_val("novalue").is_err());
        assert!(parse_key_val("=x").is_err());
    }

    #[test]
    fn test_run_args() {
        let cli = Cli::try_parse_from([
            "keel",
            "run",
            "busy_cluster",
            "create_namespaces",
            "--arg",
            "count=3",
            "--arg",
            "prefix=load",
        ])
        .unwrap();

        let Command::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.group, "busy_cluster");
        assert_eq!(args.args.len(), 2);
        assert_eq!(args.args[0], ("count".to_string(), "3".to_string()));
    }

    #[test]
    fn test_show_args_optional_value() {
        let cli = Cli::try_parse_from(["keel", "from-config", "cluster", "capture_environment", "--show-args"])
            .unwrap();
        let Command::FromConfig(args) = cli.command else {
            panic!("expected from-config");
        };
        assert_eq!(args.show_args.as_deref(), Some(""));
    }
}
