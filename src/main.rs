mod cli;
mod commands;
mod paths;
mod toolbox;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use std::io;
use std::process::ExitCode;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
    };

    match dispatch(&ctx, cli.command) {
        Ok(code) => exit_code(code),
        Err(err) => {
            ui::error(&format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}

/// Run a command; the returned code becomes the process exit code
fn dispatch(ctx: &Context, command: Command) -> Result<i32> {
    match command {
        Command::Config(cmd) => commands::config::run(ctx, cmd),
        Command::Run(args) => commands::run::run(ctx, args),
        Command::FromConfig(args) => commands::run::from_config(ctx, args),
        Command::Parallel(args) => commands::parallel::run(ctx, args),
        Command::Toolbox(cmd) => commands::toolbox::run(ctx, cmd),
        Command::Completions { shell } => {
            generate(shell, &mut Cli::command(), "keel", &mut io::stdout());
            Ok(0)
        }
    }
}

/// Role exit codes pass through; anything outside 0..=255 is a failure
fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}
