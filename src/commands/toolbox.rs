//! Toolbox command - inspect the registered command groups

use anyhow::{Context, Result};
use colored::Colorize;
use rolekit::{CommandGroup, CommandSpec};
use std::fs;
use std::path::Path;

use crate::Context as AppContext;
use crate::cli::ToolboxCommand;
use crate::toolbox;
use crate::ui;

pub fn run(ctx: &AppContext, cmd: ToolboxCommand) -> Result<i32> {
    match cmd {
        ToolboxCommand::List => list(),
        ToolboxCommand::Describe { group, command } => describe(&group, command.as_deref()),
        ToolboxCommand::GenerateArgs { output } => generate_args(ctx, output.as_deref()),
    }?;
    Ok(0)
}

fn list() -> Result<()> {
    for group in toolbox::registry().groups() {
        ui::section(group.name);
        ui::dim(group.doc);
        for command in group.commands {
            println!("  {:<24} {}", command.name.bold(), command.doc.dimmed());
        }
    }
    Ok(())
}

fn describe(group: &str, command: Option<&str>) -> Result<()> {
    let registry = toolbox::registry();
    let group = registry.group(group)?;

    match command {
        Some(name) => {
            let command = registry.command(group.name, name)?;
            describe_command(group, command);
        }
        None => {
            for command in group.commands {
                describe_command(group, command);
            }
        }
    }
    Ok(())
}

fn describe_command(group: &CommandGroup, command: &CommandSpec) {
    ui::header(&format!("{} {}", group.name, command.name));
    println!("  {}", command.doc);
    ui::kv("role", command.role);

    if !command.args.is_empty() {
        ui::section("Arguments");
        for arg in command.args {
            match arg.default {
                Some(default) => println!("  {} = {}  {}", arg.name.bold(), default, arg.doc.dimmed()),
                None => println!("  {} {}  {}", arg.name.bold(), "(required)".yellow(), arg.doc.dimmed()),
            }
        }
    }

    if !command.constants.is_empty() {
        ui::section("Constants");
        for constant in command.constants {
            println!("  {} = {}  {}", constant.name, constant.value, constant.doc.dimmed());
        }
    }
}

fn generate_args(ctx: &AppContext, output: Option<&Path>) -> Result<()> {
    let defaults = toolbox::registry().default_args()?;
    let content = serde_yaml::to_string(&defaults).context("Failed to serialize the default args")?;

    match output {
        Some(path) => {
            fs::write(path, &content).with_context(|| format!("Failed to write {}", path.display()))?;
            if !ctx.quiet {
                ui::success(&format!("Default args written to {}", path.display()));
            }
        }
        None => print!("{content}"),
    }
    Ok(())
}
