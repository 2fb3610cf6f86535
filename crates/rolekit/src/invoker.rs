//! Runs one invocation end to end.
//!
//! Each stage is its own type: [`Invocation`] → [`PreparedEnvironment`] →
//! [`GeneratedPlaybook`] → [`PlaybookOutput`] → [`RoleResult`].

use crate::environment::{InvokerSettings, PreparedEnvironment, shell_quote};
use crate::error::Result;
use crate::invocation::Invocation;
use crate::playbook::GeneratedPlaybook;
use crate::runner::{PlaybookRunner, ProcessRunner, flush_stdio};
use std::path::PathBuf;

/// Outcome of a role invocation, for the dispatcher to turn into an exit code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub extra_logs_dir: PathBuf,
    pub interrupted: bool,
}

impl RoleResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

pub struct RoleInvoker<R: PlaybookRunner = ProcessRunner> {
    settings: InvokerSettings,
    runner: R,
}

impl RoleInvoker<ProcessRunner> {
    /// Invoker spawning `ansible-playbook` with inherited output
    pub fn with_process_runner(settings: InvokerSettings) -> Self {
        Self::new(settings, ProcessRunner::default())
    }
}

impl<R: PlaybookRunner> RoleInvoker<R> {
    pub fn new(settings: InvokerSettings, runner: R) -> Self {
        Self { settings, runner }
    }

    pub fn settings(&self) -> &InvokerSettings {
        &self.settings
    }

    /// Prepare, generate, run and record one invocation
    pub fn invoke(&self, invocation: &Invocation) -> Result<RoleResult> {
        let prepared = PreparedEnvironment::prepare(invocation, &self.settings)?;
        let playbook = GeneratedPlaybook::generate(&invocation.role, &prepared, &self.settings.playbook_dir)?;
        let argv = playbook.command();

        flush_stdio();
        let output = self.runner.run(&argv, &prepared.env);
        drop(playbook);

        let (output, result) = match output {
            Ok(output) => (Some(output), Ok(())),
            Err(err) => (None, Err(err)),
        };
        let exit_code = output.as_ref().map_or(-1, |o| o.exit_code);

        if exit_code != 0 {
            let invoked: Vec<String> = self.settings.argv.iter().map(|a| shell_quote(a)).collect();
            let marked = prepared.extra_logs_dir.mark_failure(&format!(
                "[{}] {} --> {exit_code}",
                prepared.extra_logs_dir.name(),
                invoked.join(" ")
            ));
            if let Err(err) = marked {
                log::warn!("Failed to write the failure marker: {err}");
            }
        }
        result?;

        let output = output.unwrap_or_default();
        if output.interrupted {
            log::warn!("Interrupted :/");
        }

        Ok(RoleResult {
            exit_code: output.exit_code,
            stdout: output.stdout,
            stderr: output.stderr,
            extra_logs_dir: prepared.extra_logs_dir.path().to_path_buf(),
            interrupted: output.interrupted,
        })
    }
}
