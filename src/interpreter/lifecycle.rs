//! Per-role run bookkeeping and the dedicated execution threads.

use super::{
    InterpreterEntry, LaunchSpec, POOL_ROLE_PREFIX, RunContext, RunDescriptor, RunState,
    StartOutcome, StopToken, SurfaceLoader, process_alive,
};
use crate::error::{BridgeError, Result};
use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

struct RoleSlot {
    descriptor: RunDescriptor,
    stop: StopToken,
    pid: Arc<AtomicU32>,
    thread: Option<JoinHandle<()>>,
}

impl RoleSlot {
    fn new(role: &str) -> Self {
        Self {
            descriptor: RunDescriptor::new(role),
            stop: StopToken::new(),
            pid: Arc::new(AtomicU32::new(0)),
            thread: None,
        }
    }

    fn thread_alive(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn registered_pid(&self) -> Option<u32> {
        match self.pid.load(Ordering::Acquire) {
            0 => None,
            pid => Some(pid),
        }
    }

    fn is_live(&self) -> bool {
        self.descriptor.state == RunState::Running
            && self.thread_alive()
            && self.registered_pid().is_none_or(process_alive)
    }

    fn snapshot(&self) -> RunDescriptor {
        let mut descriptor = self.descriptor.clone();
        descriptor.pid = self.registered_pid();
        descriptor
    }
}

struct Shared {
    roles: Mutex<HashMap<String, RoleSlot>>,
    exited: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, RoleSlot>> {
        self.roles.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Marks run `generation` of `role` as finished. A stale generation (the
    /// role was restarted meanwhile) is ignored.
    fn finish(&self, role: &str, generation: u64, failure: Option<String>) {
        let mut roles = self.lock();
        if let Some(slot) = roles.get_mut(role)
            && slot.descriptor.runs == generation
        {
            slot.descriptor.state = RunState::Stopped;
            slot.descriptor.finished_at = Some(chrono::Utc::now());
            slot.descriptor.last_error = failure;
            slot.pid.store(0, Ordering::Release);
        }
        drop(roles);
        self.exited.notify_all();
    }
}

/// Starts, observes and stops interpreter runs, one per role.
///
/// Each run gets its own named thread (`interpreter-<role>`). A start for a
/// role that is still live is a logged no-op.
pub struct InterpreterManager {
    shared: Arc<Shared>,
    loader: Arc<dyn SurfaceLoader>,
    entry: Arc<dyn InterpreterEntry>,
    pool_size: usize,
    spawned: Arc<AtomicUsize>,
}

impl InterpreterManager {
    pub fn new(
        loader: Arc<dyn SurfaceLoader>,
        entry: Arc<dyn InterpreterEntry>,
        pool_size: usize,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                roles: Mutex::new(HashMap::new()),
                exited: Condvar::new(),
            }),
            loader,
            entry,
            pool_size: pool_size.max(1),
            spawned: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Starts an interpreter for `role` unless one is already live.
    ///
    /// Failures after the thread is spawned (surface load, interpreter error
    /// or panic) are logged and recorded in the role's descriptor; they never
    /// reach the caller.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidArgument`] for an empty role or invalid
    /// launch parameters. Nothing is spawned in that case.
    pub fn start(&self, role: &str, spec: LaunchSpec) -> Result<StartOutcome> {
        if role.trim().is_empty() {
            return Err(BridgeError::InvalidArgument("role is empty".to_owned()));
        }
        spec.validate()?;

        let mut roles = self.shared.lock();
        let slot = roles
            .entry(role.to_owned())
            .or_insert_with(|| RoleSlot::new(role));

        if slot.is_live() {
            let err = BridgeError::AlreadyRunning {
                role: role.to_owned(),
            };
            tracing::info!(role = %role, "{err}; start ignored");
            return Ok(StartOutcome::AlreadyRunning);
        }

        // Reap the previous carrier, which has already marked itself Stopped
        // or is about to exit.
        if let Some(old) = slot.thread.take()
            && old.is_finished()
        {
            let _ = old.join();
        }

        let generation = slot.descriptor.runs + 1;
        let stop = StopToken::new();
        let pid = Arc::new(AtomicU32::new(0));
        let ctx_parts = (role.to_owned(), spec.clone(), stop.clone(), Arc::clone(&pid));
        let shared = Arc::clone(&self.shared);
        let loader = Arc::clone(&self.loader);
        let entry = Arc::clone(&self.entry);

        let spawn = thread::Builder::new()
            .name(format!("interpreter-{role}"))
            .spawn(move || {
                let (role, spec, stop, pid) = ctx_parts;
                let outcome = panic::catch_unwind(AssertUnwindSafe(|| -> Result<()> {
                    let router = loader.load(&role)?;
                    let ctx = RunContext {
                        role: role.clone(),
                        spec,
                        router,
                        stop,
                        pid,
                    };
                    entry.run(&ctx)
                }));
                let failure = match outcome {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(e.to_string()),
                    Err(payload) => Some(format!("panicked: {}", panic_message(&*payload))),
                };
                match &failure {
                    Some(reason) => {
                        let err = BridgeError::InterpreterLaunchFailure {
                            role: role.clone(),
                            reason: reason.clone(),
                        };
                        tracing::error!(role = %role, "{err}");
                    }
                    None => tracing::info!(role = %role, "interpreter exited"),
                }
                shared.finish(&role, generation, failure);
            });

        match spawn {
            Ok(handle) => {
                self.spawned.fetch_add(1, Ordering::Relaxed);
                slot.descriptor.state = RunState::Running;
                slot.descriptor.spec = Some(spec);
                slot.descriptor.started_at = Some(chrono::Utc::now());
                slot.descriptor.finished_at = None;
                slot.descriptor.last_error = None;
                slot.descriptor.runs = generation;
                slot.stop = stop;
                slot.pid = pid;
                slot.thread = Some(handle);
                tracing::info!(role = %role, run = generation, "interpreter launched");
                Ok(StartOutcome::Launched)
            }
            Err(e) => {
                let reason = format!("could not spawn thread: {e}");
                let err = BridgeError::InterpreterLaunchFailure {
                    role: role.to_owned(),
                    reason: reason.clone(),
                };
                tracing::error!(role = %role, "{err}");
                slot.descriptor.state = RunState::Stopped;
                slot.descriptor.finished_at = Some(chrono::Utc::now());
                slot.descriptor.last_error = Some(reason.clone());
                Ok(StartOutcome::LaunchFailed(reason))
            }
        }
    }

    /// Starts `spec` in the first pool role that is not live.
    ///
    /// A role that another caller claims between the idle check and the
    /// start is skipped like a busy one.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidState`] when every pool role is busy, or
    /// the errors of [`start`](Self::start).
    pub fn start_in_idle_slot(&self, spec: LaunchSpec) -> Result<(String, StartOutcome)> {
        for index in 0..self.pool_size {
            let role = format!("{POOL_ROLE_PREFIX}{index}");
            if self.is_running(&role) {
                continue;
            }
            match self.start(&role, spec.clone())? {
                StartOutcome::AlreadyRunning => {
                    tracing::debug!(role = %role, "pool role claimed concurrently; trying next");
                }
                outcome => return Ok((role, outcome)),
            }
        }
        Err(BridgeError::InvalidState(format!(
            "all {} interpreter slots are busy",
            self.pool_size
        )))
    }

    /// `true` only while the role's run is live: state `Running`, carrier
    /// thread not finished, and the registered process (if any) still alive.
    pub fn is_running(&self, role: &str) -> bool {
        self.shared.lock().get(role).is_some_and(RoleSlot::is_live)
    }

    /// Asks the role's current run to stop. Returns `false` if it is not live.
    pub fn request_stop(&self, role: &str) -> bool {
        let roles = self.shared.lock();
        match roles.get(role) {
            Some(slot) if slot.is_live() => {
                slot.stop.request();
                tracing::info!(role = %role, "interpreter stop requested");
                true
            }
            _ => false,
        }
    }

    /// Waits until the role is no longer `Running`. Returns `true` if it
    /// stopped (or never ran) within `timeout`.
    pub fn wait(&self, role: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut roles = self.shared.lock();
        loop {
            let running = roles
                .get(role)
                .is_some_and(|slot| slot.descriptor.state == RunState::Running);
            if !running {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            roles = self
                .shared
                .exited
                .wait_timeout(roles, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Snapshot of the role, or `None` if it was never started.
    pub fn descriptor(&self, role: &str) -> Option<RunDescriptor> {
        self.shared.lock().get(role).map(RoleSlot::snapshot)
    }

    /// Every role ever started, sorted by name.
    pub fn roles(&self) -> Vec<String> {
        let mut roles: Vec<String> = self.shared.lock().keys().cloned().collect();
        roles.sort();
        roles
    }

    /// Total execution threads spawned over the manager's lifetime.
    pub fn spawned_threads(&self) -> usize {
        self.spawned.load(Ordering::Relaxed)
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }
}

impl Drop for InterpreterManager {
    fn drop(&mut self) {
        for slot in self.shared.lock().values() {
            if slot.is_live() {
                slot.stop.request();
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
