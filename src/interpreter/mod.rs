//! Interpreter process lifecycle.
//!
//! An interpreter run belongs to a named role. [`InterpreterManager`] keeps
//! at most one live run per role, each on its own dedicated thread. The
//! thread loads the call surface, hands it to an [`InterpreterEntry`] along
//! with the launch parameters, and blocks until the entry returns.
//!
//! ```text
//! NotStarted → Running → Stopped
//!                 ↑         │
//!                 └─────────┘  (fresh start)
//! ```

mod lifecycle;
mod subprocess;
mod surface;

pub use lifecycle::InterpreterManager;
pub use subprocess::SubprocessInterpreter;
pub use surface::{RegistrySurfaceLoader, SurfaceLoader};

use crate::bridge::router::CallRouter;
use crate::error::{BridgeError, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

/// Role used by the primary script runner.
pub const PRIMARY_ROLE: &str = "primary";

/// Role used by the long-running device manager.
pub const MANAGER_ROLE: &str = "manager";

/// Prefix of the anonymous pool roles (`interpreter-0`, `interpreter-1`, ...).
pub const POOL_ROLE_PREFIX: &str = "interpreter-";

/// Lifecycle state of a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// No run has ever been started for this role.
    NotStarted,
    /// A run thread owns the role.
    Running,
    /// The last run finished, failed, or was stopped.
    Stopped,
}

impl RunState {
    /// Returns `true` if a transition from `self` to `target` is valid.
    pub fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::NotStarted, Self::Running)
                | (Self::Running, Self::Stopped)
                | (Self::Stopped, Self::Running)
                // Thread could not be spawned at all.
                | (Self::NotStarted, Self::Stopped)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::NotStarted => "not_started",
            Self::Running => "running",
            Self::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

/// Startup parameters for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Working directory of the interpreter.
    pub work_dir: PathBuf,
    /// Interpreter home (runtime files, site packages).
    pub home_dir: PathBuf,
    /// Script to execute, relative to `work_dir` or absolute.
    pub script: PathBuf,
    /// Arguments passed to the script.
    pub args: Vec<String>,
}

impl LaunchSpec {
    pub fn new(
        work_dir: impl Into<PathBuf>,
        home_dir: impl Into<PathBuf>,
        script: impl Into<PathBuf>,
        args: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            work_dir: work_dir.into(),
            home_dir: home_dir.into(),
            script: script.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Rejects empty paths. An empty argument list is fine.
    pub fn validate(&self) -> Result<()> {
        for (name, path) in [
            ("work_dir", &self.work_dir),
            ("home_dir", &self.home_dir),
            ("script", &self.script),
        ] {
            if path.as_os_str().is_empty() {
                return Err(BridgeError::InvalidArgument(format!("{name} is empty")));
            }
        }
        if self.args.iter().any(|a| a.contains('\0')) {
            return Err(BridgeError::InvalidArgument(
                "arguments must not contain NUL".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Result of a start request. Lifecycle failures never surface as `Err`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new run thread was spawned.
    Launched,
    /// The role already has a live run; nothing changed.
    AlreadyRunning,
    /// The run thread could not be spawned; the role is `Stopped`.
    LaunchFailed(String),
}

/// Snapshot of a role's run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDescriptor {
    pub role: String,
    pub state: RunState,
    /// Parameters of the current or last run.
    pub spec: Option<LaunchSpec>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Why the last run failed, if it did.
    pub last_error: Option<String>,
    /// OS process id registered by the running entry, if any.
    pub pid: Option<u32>,
    /// Number of runs launched for this role.
    pub runs: u64,
}

impl RunDescriptor {
    fn new(role: &str) -> Self {
        Self {
            role: role.to_owned(),
            state: RunState::NotStarted,
            spec: None,
            started_at: None,
            finished_at: None,
            last_error: None,
            pid: None,
            runs: 0,
        }
    }
}

/// Cooperative stop signal for one run.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    pub fn is_requested(&self) -> bool {
        *self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits up to `timeout` for a stop request. Returns `true` if requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let guard = flag.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = cvar
            .wait_timeout_while(guard, timeout, |requested| !*requested)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

/// What an entry gets to work with during one run.
pub struct RunContext {
    role: String,
    spec: LaunchSpec,
    router: Arc<CallRouter>,
    stop: StopToken,
    pid: Arc<AtomicU32>,
}

impl RunContext {
    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn spec(&self) -> &LaunchSpec {
        &self.spec
    }

    /// The loaded call surface.
    pub fn router(&self) -> &Arc<CallRouter> {
        &self.router
    }

    pub fn stop_token(&self) -> &StopToken {
        &self.stop
    }

    /// Declares the OS process hosting the interpreter, so liveness checks
    /// can see it die.
    pub fn register_pid(&self, pid: u32) {
        self.pid.store(pid, Ordering::Release);
    }

    pub fn clear_pid(&self) {
        self.pid.store(0, Ordering::Release);
    }
}

/// Runs the interpreter on the calling (dedicated) thread.
pub trait InterpreterEntry: Send + Sync {
    /// Blocks until the interpreter exits. Should return soon after
    /// `ctx.stop_token()` is requested.
    fn run(&self, ctx: &RunContext) -> Result<()>;
}

/// Returns `true` if `pid` names a live process (or one we may not signal).
#[cfg(unix)]
pub(crate) fn process_alive(pid: u32) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: signal 0 performs only the existence and permission check.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub(crate) fn process_alive(_pid: u32) -> bool {
    true
}
