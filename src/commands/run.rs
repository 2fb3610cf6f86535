//! Run and from-config commands - invoke one toolbox role

use anyhow::{Context, Result};
use layered::{ConfigStore, Mapping, Value};
use rolekit::{FromConfig, Invocation, RoleInvoker, RoleResult, parse_extra, show_args, strip_private};

use super::{Project, parse_value};
use crate::Context as AppContext;
use crate::cli::{FromConfigArgs, RunArgs};
use crate::toolbox;
use crate::ui;

pub fn run(ctx: &AppContext, args: RunArgs) -> Result<i32> {
    let project = Project::from_env()?;

    let mut mapping = Mapping::new();
    for (name, value) in &args.args {
        mapping.insert(Value::from(name.as_str()), parse_value(value));
    }

    let invocation = toolbox::registry().invocation(&args.group, &args.command, mapping)?;
    invoke(ctx, &project, None, &invocation)
}

pub fn from_config(ctx: &AppContext, args: FromConfigArgs) -> Result<i32> {
    let project = Project::from_env()?;
    let store = project.store()?;

    if let Some(subcommand) = &args.subcommand
        && super::skipped(&store, subcommand, &project.artifacts)?
    {
        return Ok(0);
    }

    let file = project.command_args(args.command_args_file.as_deref())?;

    let mut request = FromConfig::new(&args.group, &args.command);
    request.prefix = args.prefix;
    request.suffix = args.suffix;
    if let Some(extra) = &args.extra {
        request.extra = parse_extra(extra)?;
    }

    if let Some(arg) = &args.show_args {
        let selected = strip_private(file.select(&store, &request)?);
        let arg = (!arg.is_empty()).then_some(arg.as_str());
        println!("{}", show_args(&selected, &request.key(), arg)?.trim_end());
        return Ok(0);
    }

    let invocation = file.invocation(&toolbox::registry(), &store, &request)?;
    invoke(ctx, &project, Some(&store), &invocation)
}

fn invoke(ctx: &AppContext, project: &Project, store: Option<&ConfigStore>, invocation: &Invocation) -> Result<i32> {
    let invoker = RoleInvoker::with_process_runner(project.invoker_settings(store));
    let result = invoker
        .invoke(invocation)
        .with_context(|| format!("Failed to run {} {}", invocation.group, invocation.command))?;

    report(ctx, invocation, &result);
    Ok(result.exit_code)
}

fn report(ctx: &AppContext, invocation: &Invocation, result: &RoleResult) {
    let name = format!("{} {}", invocation.group, invocation.command);

    if result.interrupted {
        ui::warn(&format!("{name} was interrupted"));
    } else if result.success() {
        if !ctx.quiet {
            ui::success(&format!("{name} succeeded"));
        }
    } else {
        ui::error(&format!("{name} failed with exit code {}", result.exit_code));
    }

    if ctx.verbose > 0 || !result.success() {
        ui::kv("logs", &result.extra_logs_dir.display().to_string());
    }
}
