//! Interpreter entry that runs an external interpreter program.
//!
//! The child gets the call surface over its own stdio: every stdout line that
//! starts with `{` is a call envelope and is answered with one reply line on
//! the child's stdin. Any other stdout line is script output and goes to the
//! durable log under the role's tag. Stderr is drained into the diagnostic
//! log, and its tail is kept for the failure message.

use super::{InterpreterEntry, RunContext};
use crate::bridge::router::CallRouter;
use crate::config::InterpreterConfig;
use crate::error::{BridgeError, Result};
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::{Mutex, PoisonError};
use std::thread;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Clone)]
pub struct SubprocessInterpreter {
    program: PathBuf,
    home_env: String,
}

impl SubprocessInterpreter {
    /// `home_env` names the variable that receives the launch home
    /// directory (`PYTHONHOME` for CPython).
    pub fn new(program: impl Into<PathBuf>, home_env: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            home_env: home_env.into(),
        }
    }

    pub fn from_config(config: &InterpreterConfig) -> Self {
        Self::new(config.program.clone(), config.home_env.clone())
    }

    fn command(&self, ctx: &RunContext) -> Command {
        let spec = ctx.spec();
        let mut cmd = Command::new(&self.program);
        cmd.arg(&spec.script)
            .args(&spec.args)
            .current_dir(&spec.work_dir)
            .env("HOME", &spec.home_dir)
            .env("CAPBRIDGE_ROLE", ctx.role())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if !self.home_env.is_empty() {
            cmd.env(&self.home_env, &spec.home_dir);
        }
        cmd
    }

    fn failure(ctx: &RunContext, reason: String) -> BridgeError {
        BridgeError::InterpreterLaunchFailure {
            role: ctx.role().to_owned(),
            reason,
        }
    }
}

impl InterpreterEntry for SubprocessInterpreter {
    fn run(&self, ctx: &RunContext) -> Result<()> {
        let mut child = self.command(ctx).spawn().map_err(|e| {
            Self::failure(ctx, format!("failed to spawn {}: {e}", self.program.display()))
        })?;
        ctx.register_pid(child.id());
        tracing::info!(role = %ctx.role(), pid = child.id(), "interpreter process spawned");

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            terminate(&mut child);
            let _ = child.wait();
            ctx.clear_pid();
            return Err(Self::failure(ctx, "child stdio was not captured".to_owned()));
        };

        let tail = Mutex::new(VecDeque::with_capacity(STDERR_TAIL_LINES));
        let status = thread::scope(|scope| -> Result<ExitStatus> {
            let calls = thread::Builder::new()
                .name(format!("interpreter-{}-calls", ctx.role()))
                .spawn_scoped(scope, || serve_calls(ctx.router(), ctx.role(), stdout, stdin));
            let diag = thread::Builder::new()
                .name(format!("interpreter-{}-stderr", ctx.role()))
                .spawn_scoped(scope, || drain_stderr(ctx.role(), stderr, &tail));
            if let Err(e) = calls.and(diag) {
                terminate(&mut child);
                let _ = child.wait();
                return Err(e.into());
            }
            supervise(&mut child, ctx)
        });
        ctx.clear_pid();
        let status = status?;

        if status.success() || ctx.stop_token().is_requested() {
            tracing::info!(role = %ctx.role(), %status, "interpreter process exited");
            return Ok(());
        }
        let tail: Vec<String> = tail
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .into_iter()
            .collect();
        let mut reason = format!("interpreter exited with {status}");
        if !tail.is_empty() {
            reason.push_str(": ");
            reason.push_str(&tail.join(" | "));
        }
        Err(Self::failure(ctx, reason))
    }
}

/// Waits for the child, forwarding a stop request once as SIGTERM.
fn supervise(child: &mut Child, ctx: &RunContext) -> Result<ExitStatus> {
    let mut signalled = false;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(status);
        }
        if signalled {
            thread::sleep(POLL_INTERVAL);
        } else if ctx.stop_token().wait_timeout(POLL_INTERVAL) {
            tracing::info!(role = %ctx.role(), "forwarding stop request to interpreter");
            terminate(child);
            signalled = true;
        }
    }
}

fn serve_calls(router: &CallRouter, role: &str, stdout: impl Read, mut stdin: ChildStdin) {
    for line in BufReader::new(stdout).lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(role = %role, error = %e, "failed to read interpreter output");
                break;
            }
        };
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if !trimmed.starts_with('{') {
            router.script_output(role, trimmed);
            continue;
        }
        let reply = router.route_json(trimmed);
        if let Err(e) = writeln!(stdin, "{reply}").and_then(|()| stdin.flush()) {
            tracing::debug!(role = %role, error = %e, "interpreter closed its input");
            break;
        }
    }
}

fn drain_stderr(role: &str, stderr: impl Read, tail: &Mutex<VecDeque<String>>) {
    for line in BufReader::new(stderr).lines().map_while(std::result::Result::ok) {
        tracing::info!(role = %role, stream = "stderr", "{line}");
        let mut tail = tail.lock().unwrap_or_else(PoisonError::into_inner);
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    let Ok(pid) = libc::pid_t::try_from(child.id()) else {
        return;
    };
    // SAFETY: pid belongs to a child we have not yet reaped.
    if unsafe { libc::kill(pid, libc::SIGTERM) } != 0 {
        tracing::warn!(pid, error = %std::io::Error::last_os_error(), "SIGTERM failed");
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    if let Err(e) = child.kill() {
        tracing::warn!(error = %e, "failed to terminate interpreter process");
    }
}
