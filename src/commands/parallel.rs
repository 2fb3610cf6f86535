//! Parallel command - run command-args entries concurrently

use anyhow::{Context, Result};
use artifacts::ENV_ARTIFACT_DIR;
use rolekit::environment::ENV_EXTRA_LOGS_DIR;
use rolekit::{FromConfig, Invocation, InvokerSettings, RoleInvoker};
use taskgroup::{Parallel, TaskContext};

use super::Project;
use crate::Context as AppContext;
use crate::cli::ParallelArgs;
use crate::toolbox;
use crate::ui;

pub fn run(ctx: &AppContext, args: ParallelArgs) -> Result<i32> {
    let project = Project::from_env()?;
    let store = project.store()?;

    if let Some(subcommand) = &args.subcommand
        && super::skipped(&store, subcommand, &project.artifacts)?
    {
        return Ok(0);
    }

    let file = project.command_args(args.command_args_file.as_deref())?;
    let registry = toolbox::registry();
    let settings = project.invoker_settings(Some(&store));

    Parallel::new(&args.name)
        .exit_on_exception(!args.no_exit_on_exception)
        .dedicated_dir(!args.no_dedicated_dir)
        .scope(&project.artifacts, |p| {
            for entry in &args.entries {
                let request = parse_entry(entry)?;
                let invocation = file
                    .invocation(&registry, &store, &request)
                    .with_context(|| format!("Failed to prepare '{entry}'"))?;
                let settings = settings.clone();
                p.delayed(move |task| run_task(settings, &invocation, task));
            }
            Ok(())
        })?;

    if !ctx.quiet {
        ui::success(&format!(
            "{} command(s) of '{}' succeeded",
            args.entries.len(),
            args.name
        ));
    }
    Ok(0)
}

/// `[prefix/]group command[/suffix]`
fn parse_entry(entry: &str) -> Result<FromConfig> {
    let mut words = entry.split_whitespace();
    let (Some(group), Some(command), None) = (words.next(), words.next(), words.next()) else {
        anyhow::bail!("Invalid entry '{}': expected \"group command\"", entry);
    };

    let (prefix, group) = group.rsplit_once('/').unwrap_or(("", group));
    let (command, suffix) = command.split_once('/').unwrap_or((command, ""));

    let mut request = FromConfig::new(group, command);
    request.prefix = prefix.to_string();
    request.suffix = suffix.to_string();
    Ok(request)
}

fn run_task(mut settings: InvokerSettings, invocation: &Invocation, task: &TaskContext) -> Result<()> {
    task.check_cancelled()?;

    // Every task allocates its own logs dir inside the scope's
    settings.base_env.insert(
        ENV_ARTIFACT_DIR.to_string(),
        task.artifact_dir.path().display().to_string(),
    );
    settings.base_env.remove(ENV_EXTRA_LOGS_DIR);

    let result = RoleInvoker::with_process_runner(settings).invoke(invocation)?;
    if !result.success() {
        anyhow::bail!(
            "{} {} failed with exit code {} (logs: {})",
            invocation.group,
            invocation.command,
            result.exit_code,
            result.extra_logs_dir.display()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_entry() {
        let request = parse_entry("busy_cluster create_namespaces").unwrap();
        assert_eq!(request.key(), "busy_cluster create_namespaces");

        let request = parse_entry("sutest/cluster capture_environment/after").unwrap();
        assert_eq!(request.prefix, "sutest");
        assert_eq!(request.group, "cluster");
        assert_eq!(request.command, "capture_environment");
        assert_eq!(request.suffix, "after");
    }

    #[test]
    fn test_parse_entry_rejects_bad_shapes() {
        assert!(parse_entry("cluster").is_err());
        assert!(parse_entry("cluster capture_environment extra").is_err());
    }
}
