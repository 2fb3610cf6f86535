//! Config command - read, update and layer the project configuration

use anyhow::{Context, Result};
use colored::Colorize;
use layered::overrides::VARIABLE_OVERRIDES_FILE;
use layered::preset::{PRESET_NAMES_PATH, PRESETS_KEY};
use layered::{GetOptions, OverrideOptions, PresetResolver, Value, render_value};

use super::{Project, format_value, parse_value};
use crate::Context as AppContext;
use crate::cli::ConfigCommand;
use crate::ui;

/// Keys of `ci_presets` that are bookkeeping, not presets
const RESERVED_PRESET_KEYS: &[&str] = &["names", "to_apply", "variable_overrides"];

pub fn run(ctx: &AppContext, cmd: ConfigCommand) -> Result<i32> {
    let project = Project::from_env()?;

    match cmd {
        ConfigCommand::Init {
            apply_preset_from_pr_args,
            no_overrides,
        } => init(ctx, &project, apply_preset_from_pr_args, no_overrides),
        ConfigCommand::Get {
            path,
            default,
            json,
        } => get(&project, &path, default.as_deref(), json),
        ConfigCommand::Set { path, value } => set(ctx, &project, &path, &value),
        ConfigCommand::ApplyPreset { names } => apply_presets(ctx, &project, &names),
        ConfigCommand::ApplyOverrides {
            file,
            ignore_not_found,
        } => {
            let store = project.store()?;
            let file = file.unwrap_or_else(|| project.artifacts.join(VARIABLE_OVERRIDES_FILE));
            layered::apply_config_overrides(
                &store,
                &file,
                OverrideOptions {
                    ignore_not_found,
                    log: true,
                },
            )
            .with_context(|| format!("Failed to apply the overrides of {}", file.display()))?;
            if !ctx.quiet {
                ui::success(&format!("Applied {}", file.display()));
            }
            Ok(0)
        }
        ConfigCommand::Presets => presets(&project),
        ConfigCommand::Skip { subcommand } => {
            let store = project.store()?;
            let skipped = super::skipped(&store, &subcommand, &project.artifacts)?;
            println!("{}", if skipped { "skip" } else { "run" });
            Ok(0)
        }
        ConfigCommand::Path => {
            let store = project.store()?;
            println!("{}", store.path().display());
            Ok(0)
        }
    }
}

fn init(ctx: &AppContext, project: &Project, pr_args: bool, no_overrides: bool) -> Result<i32> {
    let mut options = project.init_options();
    options.apply_preset_from_pr_args = pr_args;
    options.apply_config_overrides = !no_overrides;

    let store = layered::init(&options).context("Failed to initialize the configuration")?;

    if !ctx.quiet {
        ui::success(&format!("Configuration ready: {}", store.path().display()));
        let applied = store.get_with(PRESET_NAMES_PATH, GetOptions::quiet().with_default(Value::Null).no_warn())?;
        if let Value::Sequence(names) = applied {
            let names: Vec<String> = names.iter().map(render_value).collect();
            ui::kv("presets", &names.join(", "));
        }
    }
    Ok(0)
}

fn get(project: &Project, path: &str, default: Option<&str>, json: bool) -> Result<i32> {
    let store = project.store()?;

    let mut options = GetOptions::quiet();
    if let Some(default) = default {
        options = options.with_default(parse_value(default));
    }

    let value = store.get_with(path, options)?;
    println!("{}", format_value(&value, json)?);
    Ok(0)
}

fn set(ctx: &AppContext, project: &Project, path: &str, value: &str) -> Result<i32> {
    let store = project.store()?;
    let value = parse_value(value);

    store.set_with(path, value.clone(), false)?;

    if !ctx.quiet {
        ui::success(&format!("{path} = {}", render_value(&value)));
    }
    Ok(0)
}

fn apply_presets(ctx: &AppContext, project: &Project, names: &[String]) -> Result<i32> {
    let store = project.store()?;
    let presets = PresetResolver::new(&store);

    for name in names {
        presets
            .apply(name)
            .with_context(|| format!("Failed to apply the preset '{name}'"))?;
        if !ctx.quiet {
            ui::success(&format!("Applied preset '{name}'"));
        }
    }
    Ok(0)
}

fn presets(project: &Project) -> Result<i32> {
    let store = project.store()?;

    let defined = store.get_raw(PRESETS_KEY).unwrap_or(Value::Null);
    let applied: Vec<String> = match store.get_raw(PRESET_NAMES_PATH) {
        Ok(Value::Sequence(names)) => names.iter().map(render_value).collect(),
        _ => Vec::new(),
    };

    let Value::Mapping(defined) = defined else {
        ui::info("No presets defined.");
        return Ok(0);
    };

    ui::header("Presets");
    for name in defined.keys().map(render_value) {
        if RESERVED_PRESET_KEYS.contains(&name.as_str()) {
            continue;
        }
        if applied.contains(&name) {
            println!("  {} {}", "✓".green(), name.bold());
        } else {
            println!("    {name}");
        }
    }
    Ok(0)
}
