//! External command execution.
//!
//! Every sensor reading starts as the stdout of a CLI tool. [`CommandRunner`]
//! is the seam between the fetchers and the process boundary: production code
//! uses [`SystemRunner`], tests use [`ScriptedRunner`].

use std::collections::{HashMap, VecDeque};
use std::process::{Command, Stdio};
use std::sync::Mutex;

use log::{debug, warn};

use crate::config::Elevation;
use crate::error::{Result, SamplerError};

/// Runs one external command and returns its standard output.
pub trait CommandRunner: Send {
    /// Execute `program` with `args`. Non-zero exit and launch failures are
    /// errors; stdout is returned untouched.
    fn run(&self, program: &str, args: &[&str]) -> Result<String>;
}

/// Render an argv the way it appears in logs and errors.
pub fn display_argv(program: &str, args: &[&str]) -> String {
    let mut out = String::from(program);
    for arg in args {
        out.push(' ');
        out.push_str(arg);
    }
    out
}

// ---------------------------------------------------------------------------
// Privilege
// ---------------------------------------------------------------------------

/// Whether this process already runs with root privileges.
#[cfg(unix)]
pub fn running_as_root() -> bool {
    // SAFETY: geteuid() has no preconditions and cannot fail.
    unsafe { libc::geteuid() == 0 }
}

#[cfg(not(unix))]
pub fn running_as_root() -> bool {
    false
}

/// Check if a command exists by running `which`.
pub fn command_exists(name: &str) -> bool {
    Command::new("which")
        .arg(name)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// System runner
// ---------------------------------------------------------------------------

/// Runs commands on the host, prefixing `sudo -n` when elevation is needed.
#[derive(Debug, Clone)]
pub struct SystemRunner {
    elevate: bool,
}

impl SystemRunner {
    pub fn new(elevation: Elevation) -> Self {
        let elevate = match elevation {
            Elevation::Auto => !running_as_root(),
            Elevation::Sudo => true,
            Elevation::None => false,
        };
        Self { elevate }
    }

    /// Whether commands are wrapped in `sudo`.
    pub fn elevates(&self) -> bool {
        self.elevate
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        let command = display_argv(program, args);
        let mut cmd = if self.elevate {
            let mut c = Command::new("sudo");
            c.arg("-n").arg(program);
            c
        } else {
            Command::new(program)
        };
        debug!("exec: {command} (elevated: {})", self.elevate);

        let output = cmd
            .args(args)
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output()
            .map_err(|source| {
                warn!("failed to launch `{command}`: {source}");
                SamplerError::Launch {
                    command: command.clone(),
                    source,
                }
            })?;

        if !output.status.success() {
            warn!("`{command}` exited with {}", output.status);
            return Err(SamplerError::Execution {
                command,
                status: output.status.to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

// ---------------------------------------------------------------------------
// Scripted runner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
enum Reply {
    Stdout(String),
    Fail(String),
}

impl Reply {
    fn into_result(self, command: &str) -> Result<String> {
        match self {
            Reply::Stdout(s) => Ok(s),
            Reply::Fail(status) => Err(SamplerError::Execution {
                command: command.to_string(),
                status,
            }),
        }
    }
}

#[derive(Debug, Default)]
struct Script {
    once: HashMap<String, VecDeque<Reply>>,
    always: HashMap<String, Reply>,
    calls: Vec<String>,
}

/// Deterministic runner that answers by exact argv.
///
/// One-shot replies queued with [`ScriptedRunner::respond_once`] /
/// [`ScriptedRunner::fail_once`] are consumed first; otherwise the standing
/// reply set with [`ScriptedRunner::respond`] / [`ScriptedRunner::fail`] is
/// used. Unknown commands fail as if the tool were not installed.
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    script: Mutex<Script>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_script<T>(&self, f: impl FnOnce(&mut Script) -> T) -> T {
        let mut guard = match self.script.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut guard)
    }

    /// Standing stdout for `argv`.
    pub fn respond(&self, argv: &str, stdout: impl Into<String>) -> &Self {
        let reply = Reply::Stdout(stdout.into());
        self.with_script(|s| s.always.insert(argv.to_string(), reply));
        self
    }

    /// Standing failure for `argv`.
    pub fn fail(&self, argv: &str) -> &Self {
        let reply = Reply::Fail("exit status: 1".to_string());
        self.with_script(|s| s.always.insert(argv.to_string(), reply));
        self
    }

    /// Stdout returned once for `argv`, ahead of the standing reply.
    pub fn respond_once(&self, argv: &str, stdout: impl Into<String>) -> &Self {
        let reply = Reply::Stdout(stdout.into());
        self.with_script(|s| {
            s.once
                .entry(argv.to_string())
                .or_default()
                .push_back(reply)
        });
        self
    }

    /// Failure returned once for `argv`, ahead of the standing reply.
    pub fn fail_once(&self, argv: &str) -> &Self {
        let reply = Reply::Fail("exit status: 1".to_string());
        self.with_script(|s| {
            s.once
                .entry(argv.to_string())
                .or_default()
                .push_back(reply)
        });
        self
    }

    /// Every argv run so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.with_script(|s| s.calls.clone())
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        let command = display_argv(program, args);
        let reply = self.with_script(|s| {
            s.calls.push(command.clone());
            s.once
                .get_mut(&command)
                .and_then(VecDeque::pop_front)
                .or_else(|| s.always.get(&command).cloned())
        });
        match reply {
            Some(r) => r.into_result(&command),
            None => Err(SamplerError::Launch {
                command,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no scripted reply"),
            }),
        }
    }
}

impl<R: CommandRunner + Sync + ?Sized> CommandRunner for std::sync::Arc<R> {
    fn run(&self, program: &str, args: &[&str]) -> Result<String> {
        (**self).run(program, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // SystemRunner
    // -----------------------------------------------------------------------

    #[test]
    fn system_runner_echo() {
        let runner = SystemRunner::new(Elevation::None);
        let out = runner.run("echo", &["hello"]).unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[test]
    fn system_runner_failing_status() {
        let runner = SystemRunner::new(Elevation::None);
        let err = runner.run("false", &[]).unwrap_err();
        assert!(matches!(err, SamplerError::Execution { ref command, .. } if command == "false"));
    }

    #[test]
    fn system_runner_nonexistent() {
        let runner = SystemRunner::new(Elevation::None);
        let err = runner.run("/nonexistent/binary", &["-x"]).unwrap_err();
        assert!(matches!(err, SamplerError::Launch { .. }));
        assert!(err.is_execution());
    }

    #[test]
    fn system_runner_empty_output() {
        let runner = SystemRunner::new(Elevation::None);
        assert_eq!(runner.run("true", &[]).unwrap(), "");
    }

    #[test]
    fn elevation_modes() {
        assert!(SystemRunner::new(Elevation::Sudo).elevates());
        assert!(!SystemRunner::new(Elevation::None).elevates());
        assert_eq!(
            SystemRunner::new(Elevation::Auto).elevates(),
            !running_as_root()
        );
    }

    #[test]
    fn command_exists_checks() {
        assert!(command_exists("echo"));
        assert!(!command_exists("nonexistent_binary_xyz_12345"));
    }

    // -----------------------------------------------------------------------
    // ScriptedRunner
    // -----------------------------------------------------------------------

    #[test]
    fn scripted_once_then_standing() {
        let runner = ScriptedRunner::new();
        runner.respond("virsh hostname", "node-a\n");
        runner.fail_once("virsh hostname");
        assert!(runner.run("virsh", &["hostname"]).is_err());
        assert_eq!(runner.run("virsh", &["hostname"]).unwrap(), "node-a\n");
        assert_eq!(runner.run("virsh", &["hostname"]).unwrap(), "node-a\n");
        assert_eq!(runner.calls().len(), 3);
    }

    #[test]
    fn scripted_unknown_command_is_launch_failure() {
        let runner = ScriptedRunner::new();
        let err = runner.run("nvidia-smi", &["-q"]).unwrap_err();
        assert!(matches!(err, SamplerError::Launch { .. }));
    }
}
