//! Integration tests: interpreter runs against the real call surface.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use capbridge::facade::battery::BatteryStatus;
use capbridge::interpreter::{RegistrySurfaceLoader, RunContext};
use capbridge::output::{MemoryLogSink, OutputRelay};
use capbridge::platform::sim::SimHost;
use capbridge::{
    BridgeError, CallEnvelope, CallName, FacadeKind, FacadeRegistry, InterpreterEntry,
    InterpreterManager, LaunchSpec, Result, RunState, StartOutcome,
};

const WAIT: Duration = Duration::from_secs(10);

struct Harness {
    host: Arc<SimHost>,
    log: Arc<MemoryLogSink>,
    loader: Arc<RegistrySurfaceLoader>,
}

impl Harness {
    fn new(preload: Vec<FacadeKind>) -> Self {
        let host = Arc::new(SimHost::new());
        let log = Arc::new(MemoryLogSink::default());
        let loader = Arc::new(RegistrySurfaceLoader::new(
            Arc::new(FacadeRegistry::new(host.clone())),
            Arc::new(OutputRelay::new("script", log.clone(), None)),
            preload,
        ));
        Self { host, log, loader }
    }

    fn manager(&self, entry: Arc<dyn InterpreterEntry>) -> InterpreterManager {
        InterpreterManager::new(self.loader.clone(), entry, 4)
    }
}

fn spec() -> LaunchSpec {
    LaunchSpec::new("/data/scripts", "/data/runtime", "main.py", ["--role", "test"])
}

/// Logs through the call surface, then fails.
struct FailingScript;

impl InterpreterEntry for FailingScript {
    fn run(&self, ctx: &RunContext) -> Result<()> {
        let reply = ctx.router().route(&CallEnvelope::new(
            "log-1",
            CallName::OutputLog,
            serde_json::json!({ "message": "script started" })
                .as_object()
                .cloned()
                .unwrap_or_default(),
        ));
        assert!(reply.ok);
        Err(BridgeError::InvalidState("script raised SystemExit(1)".to_owned()))
    }
}

/// Polls the battery once per stop-token tick until asked to stop.
struct PollingScript {
    seen: Arc<Mutex<Vec<serde_json::Value>>>,
    runs: AtomicUsize,
}

impl InterpreterEntry for PollingScript {
    fn run(&self, ctx: &RunContext) -> Result<()> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        loop {
            let reply = ctx.router().route(&CallEnvelope::new(
                "poll",
                CallName::BatteryPoll,
                serde_json::Map::new(),
            ));
            self.seen
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(reply.value);
            if ctx.stop_token().wait_timeout(Duration::from_millis(20)) {
                return Ok(());
            }
        }
    }
}

#[test]
fn failing_run_is_recorded_and_never_escapes_start() {
    let harness = Harness::new(vec![FacadeKind::Battery]);
    let manager = harness.manager(Arc::new(FailingScript));

    let outcome = manager.start("primary", spec()).expect("start never errors");
    assert_eq!(outcome, StartOutcome::Launched);
    assert!(manager.wait("primary", WAIT));

    assert!(!manager.is_running("primary"));
    let descriptor = manager.descriptor("primary").expect("descriptor");
    assert_eq!(descriptor.state, RunState::Stopped);
    assert_eq!(descriptor.spec, Some(spec()));
    assert!(descriptor.finished_at.is_some());
    assert!(
        descriptor
            .last_error
            .expect("failure recorded")
            .contains("SystemExit(1)")
    );
    assert_eq!(harness.log.lines(), ["script: script started"]);
}

#[test]
fn running_script_sees_live_readings_and_stops_cooperatively() {
    let harness = Harness::new(vec![FacadeKind::Battery]);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let entry = Arc::new(PollingScript {
        seen: seen.clone(),
        runs: AtomicUsize::new(0),
    });
    let manager = harness.manager(entry.clone());

    assert_eq!(
        manager.start("manager", spec()).expect("start"),
        StartOutcome::Launched
    );
    assert!(manager.is_running("manager"));
    assert_eq!(
        manager.start("manager", spec()).expect("second start"),
        StartOutcome::AlreadyRunning
    );
    assert_eq!(manager.spawned_threads(), 1);

    // The preloaded battery facade is already listening.
    let deadline = std::time::Instant::now() + WAIT;
    while harness.host.active_subscriptions() == 0 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    harness.host.push_battery(BatteryStatus {
        level_pct: 42,
        ..BatteryStatus::default()
    });
    let deadline = std::time::Instant::now() + WAIT;
    loop {
        let found = seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .any(|v| v.as_str().is_some_and(|s| s.contains("level_pct=42")));
        if found {
            break;
        }
        assert!(std::time::Instant::now() < deadline, "reading never reached script");
        std::thread::sleep(Duration::from_millis(10));
    }

    assert!(manager.request_stop("manager"));
    assert!(manager.wait("manager", WAIT));
    assert!(!manager.is_running("manager"));
    let descriptor = manager.descriptor("manager").expect("descriptor");
    assert_eq!(descriptor.last_error, None);
    assert_eq!(entry.runs.load(Ordering::SeqCst), 1);
}

#[test]
fn unavailable_preload_is_a_launch_failure() {
    let harness = Harness::new(vec![FacadeKind::Speech]);
    harness.host.set_unavailable(FacadeKind::Speech, true);
    let manager = harness.manager(Arc::new(FailingScript));

    assert_eq!(
        manager.start("primary", spec()).expect("start"),
        StartOutcome::Launched
    );
    assert!(manager.wait("primary", WAIT));
    let error = manager
        .descriptor("primary")
        .and_then(|d| d.last_error)
        .expect("failure recorded");
    assert!(error.contains("speech"), "{error}");
    // The entry never ran.
    assert!(harness.log.lines().is_empty());
}

#[cfg(unix)]
#[test]
fn process_killed_out_of_band_is_not_running() {
    use capbridge::interpreter::SubprocessInterpreter;

    let dir = tempfile::tempdir().expect("tempdir");
    // Ignores SIGTERM so only an outside SIGKILL ends it.
    std::fs::write(
        dir.path().join("stubborn.sh"),
        "trap '' TERM\nwhile :; do sleep 0.05; done\n",
    )
    .expect("write script");
    let harness = Harness::new(Vec::new());
    let manager = harness.manager(Arc::new(SubprocessInterpreter::new("sh", "")));
    let spec = LaunchSpec::new(dir.path(), dir.path(), "stubborn.sh", Vec::<String>::new());
    assert_eq!(
        manager.start("primary", spec).expect("start"),
        StartOutcome::Launched
    );

    let deadline = std::time::Instant::now() + WAIT;
    let pid = loop {
        if let Some(pid) = manager.descriptor("primary").and_then(|d| d.pid) {
            break pid;
        }
        assert!(std::time::Instant::now() < deadline, "pid never registered");
        std::thread::sleep(Duration::from_millis(10));
    };
    assert!(manager.is_running("primary"));

    let pid = libc::pid_t::try_from(pid).expect("pid fits pid_t");
    // SAFETY: pid is the live child registered by the run above.
    assert_eq!(unsafe { libc::kill(pid, libc::SIGKILL) }, 0);

    let deadline = std::time::Instant::now() + WAIT;
    while manager.is_running("primary") {
        assert!(
            std::time::Instant::now() < deadline,
            "killed process still reported running"
        );
        std::thread::sleep(Duration::from_millis(10));
    }
    assert!(manager.wait("primary", WAIT));
    let descriptor = manager.descriptor("primary").expect("descriptor");
    assert_eq!(descriptor.state, RunState::Stopped);
    assert_eq!(descriptor.pid, None);
    assert!(descriptor.last_error.is_some());
}
