//! Playbook execution
//!
//! [`PlaybookRunner`] is the seam between the invoker and the outside world:
//! [`ProcessRunner`] spawns the real child, tests substitute their own.

use crate::error::{Result, RoleError};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};

/// Outcome of one playbook run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybookOutput {
    pub exit_code: i32,
    /// Empty unless the runner captures output
    pub stdout: String,
    pub stderr: String,
    /// The child was killed by SIGINT or SIGTERM
    pub interrupted: bool,
}

/// Runs a playbook command line with a given environment
pub trait PlaybookRunner: Send + Sync {
    fn run(&self, argv: &[String], env: &BTreeMap<String, String>) -> Result<PlaybookOutput>;
}

/// Runs the command as a child process, with exactly the given environment.
///
/// While the child runs, SIGINT and SIGTERM are ignored by this process so
/// that an interruption reaches the child and is reported through its exit
/// status.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner {
    pub capture_output: bool,
}

impl ProcessRunner {
    pub fn capturing() -> Self {
        Self {
            capture_output: true,
        }
    }
}

impl PlaybookRunner for ProcessRunner {
    fn run(&self, argv: &[String], env: &BTreeMap<String, String>) -> Result<PlaybookOutput> {
        let Some((program, args)) = argv.split_first() else {
            return Err(RoleError::Spawn {
                program: String::new(),
                source: io::Error::new(io::ErrorKind::InvalidInput, "empty command line"),
            });
        };

        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let resolved = which::which_in(program, env.get("PATH"), cwd).map_err(|e| RoleError::Spawn {
            program: program.clone(),
            source: io::Error::new(io::ErrorKind::NotFound, e.to_string()),
        })?;

        log::debug!("Running {}", argv.join(" "));

        let mut cmd = Command::new(&resolved);
        cmd.args(args).env_clear().envs(env);
        restore_default_signals(&mut cmd);

        flush_stdio();
        let _guard = SignalGuard::acquire();

        let spawn_err = |source| RoleError::Spawn {
            program: program.clone(),
            source,
        };

        if self.capture_output {
            let output = cmd.output().map_err(spawn_err)?;
            let (exit_code, interrupted) = exit_code(output.status);
            Ok(PlaybookOutput {
                exit_code,
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                interrupted,
            })
        } else {
            let status = cmd
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .map_err(spawn_err)?;
            let (exit_code, interrupted) = exit_code(status);
            Ok(PlaybookOutput {
                exit_code,
                interrupted,
                ..PlaybookOutput::default()
            })
        }
    }
}

/// Flush our own buffered output so that it comes before the child's
pub fn flush_stdio() {
    let _ = io::stdout().flush();
    let _ = io::stderr().flush();
}

/// Exit code of the child; an interruption maps to 1
fn exit_code(status: ExitStatus) -> (i32, bool) {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            if signal == libc::SIGINT || signal == libc::SIGTERM {
                return (1, true);
            }
            return (128 + signal, false);
        }
    }
    (status.code().unwrap_or(1), false)
}

// ============================================================================
// Signals
// ============================================================================

#[cfg(unix)]
const INTERRUPT_SIGNALS: [libc::c_int; 2] = [libc::SIGINT, libc::SIGTERM];

#[cfg(unix)]
struct SignalState {
    active: usize,
    previous: Vec<(libc::c_int, libc::sighandler_t)>,
}

#[cfg(unix)]
static SIGNAL_STATE: std::sync::Mutex<SignalState> = std::sync::Mutex::new(SignalState {
    active: 0,
    previous: Vec::new(),
});

/// Ignores the interrupt signals while at least one child runs
struct SignalGuard;

impl SignalGuard {
    #[cfg(unix)]
    fn acquire() -> Self {
        let mut state = match SIGNAL_STATE.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if state.active == 0 {
            state.previous = INTERRUPT_SIGNALS
                .iter()
                // SAFETY: installing SIG_IGN has no preconditions
                .map(|&sig| (sig, unsafe { libc::signal(sig, libc::SIG_IGN) }))
                .collect();
        }
        state.active += 1;
        Self
    }

    #[cfg(not(unix))]
    fn acquire() -> Self {
        Self
    }
}

#[cfg(unix)]
impl Drop for SignalGuard {
    fn drop(&mut self) {
        let mut state = match SIGNAL_STATE.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.active = state.active.saturating_sub(1);
        if state.active == 0 {
            for (sig, handler) in state.previous.drain(..) {
                // SAFETY: restores a handler previously returned by signal()
                unsafe { libc::signal(sig, handler) };
            }
        }
    }
}

/// The child starts with the default interrupt handlers, not our ignored ones
#[cfg(unix)]
fn restore_default_signals(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;

    // SAFETY: signal() is async-signal-safe, as required between fork and exec
    unsafe {
        cmd.pre_exec(|| {
            for sig in INTERRUPT_SIGNALS {
                libc::signal(sig, libc::SIG_DFL);
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn restore_default_signals(_cmd: &mut Command) {}
